//! Operation plans: what each generated function does, independent of how a
//! backend realizes it.

use std::fmt;

use brine_struct_schema::ScalarType;
use serde::Serialize;

use crate::ir::{Field, StructId};

/// Types that appear in generated signatures, all C-ABI compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CType {
    Void,
    Bool,
    U64,
    Scalar(ScalarType),
    /// `uint8_t*` wire buffer.
    Bytes,
    /// Pointer to a generated struct.
    Struct(String),
    Ptr(Box<CType>),
}

impl CType {
    pub fn ptr(inner: CType) -> CType {
        CType::Ptr(Box::new(inner))
    }

    pub fn c_decl(&self) -> String {
        match self {
            CType::Void => "void".to_string(),
            CType::Bool => "bool".to_string(),
            CType::U64 => "uint64_t".to_string(),
            CType::Scalar(ty) => ty.c_type().to_string(),
            CType::Bytes => "uint8_t*".to_string(),
            CType::Struct(name) => format!("{}*", crate::symbols::c_struct(name)),
            CType::Ptr(inner) => format!("{}*", inner.c_decl()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty:   CType,
}

impl Param {
    pub fn new(name: &str, ty: CType) -> Param {
        Param { name: name.to_string(), ty }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret:    CType,
}

impl Signature {
    /// C prototype without the trailing semicolon.
    pub fn c_prototype(&self, symbol: &str) -> String {
        let params = if self.params.is_empty() {
            "void".to_string()
        } else {
            self.params
                .iter()
                .map(|p| format!("{} {}", p.ty.c_decl(), p.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{} {}({})", self.ret.c_decl(), symbol, params)
    }
}

/// One generated function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function<Op> {
    pub symbol:    String,
    pub signature: Signature,
    pub internal:  bool,
    pub op:        Op,
}

/// Where a field lives inside its struct's native layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub name:   String,
    pub index:  u32,
    pub offset: usize,
}

impl Slot {
    pub fn of(field: &Field) -> Slot {
        Slot {
            name:   field.name.clone(),
            index:  field.slot_offset,
            offset: field.byte_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldShape {
    Scalar(ScalarType),
    /// Hidden element count of the array in `data`.
    Count { data: Slot, element: ScalarType },
    /// Heap buffer of `element`s whose length lives in `count`.
    Array { element: ScalarType, count: Slot },
    Nested { struct_name: String, id: StructId },
}

impl FieldShape {
    pub fn is_pointer(&self) -> bool {
        matches!(self, FieldShape::Array { .. } | FieldShape::Nested { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GetPolicy {
    /// Hand out the stored value or pointer as is.
    Live,
    /// Hand out a fresh copy of the array buffer.
    CopyArray,
    /// Hand out a serialize/deserialize copy of the nested struct.
    CopyStruct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetPolicy {
    Overwrite,
    /// Replace the array contents, growing or shrinking its buffer.
    Grow,
    /// Store a serialize/deserialize copy of the incoming struct.
    CopyStruct,
    /// Resize the paired array to a new element count.
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldOp {
    Get(GetPolicy),
    GetItem,
    Set(SetPolicy),
    SetItem,
    Serialize,
    Deserialize,
}

/// Every function generated for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPlan {
    pub struct_name: String,
    pub struct_id:   StructId,
    pub slot:        Slot,
    pub shape:       FieldShape,
    pub is_mutable:  bool,
    pub functions:   Vec<Function<FieldOp>>,
}

impl FieldPlan {
    pub fn function(&self, op: FieldOp) -> Option<&Function<FieldOp>> {
        self.functions.iter().find(|f| f.op == op)
    }

    pub fn serializer(&self) -> Option<&str> {
        self.function(FieldOp::Serialize).map(|f| f.symbol.as_str())
    }

    pub fn deserializer(&self) -> Option<&str> {
        self.function(FieldOp::Deserialize).map(|f| f.symbol.as_str())
    }
}

/// A field as the struct-level operations see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub slot:         Slot,
    pub shape:        FieldShape,
    pub is_mutable:   bool,
    /// Field-level wire helpers; count fields have none.
    pub serializer:   Option<String>,
    pub deserializer: Option<String>,
}

/// A constructor parameter group, in finalized field order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CtorArg {
    Scalar { slot: Slot, ty: ScalarType },
    /// Contributes `(data, count)`.
    Array { slot: Slot, element: ScalarType, count: Slot },
    /// Copied in through the nested struct's wire form; null stays null.
    Nested { slot: Slot, id: StructId, struct_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructOp {
    Create,
    Destroy,
    Serialize,
    Deserialize,
    WireSize,
    Discard,
}

/// Every function generated for one struct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructPlan {
    pub name:      String,
    pub id:        StructId,
    pub size:      usize,
    pub align:     usize,
    pub members:   Vec<Member>,
    pub ctor_args: Vec<CtorArg>,
    pub functions: Vec<Function<StructOp>>,
}

impl StructPlan {
    pub fn function(&self, op: StructOp) -> Option<&Function<StructOp>> {
        self.functions.iter().find(|f| f.op == op)
    }

    /// Members that appear on the wire, in order.
    pub fn wire_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.serializer.is_some())
    }
}

impl<Op> fmt::Display for Function<Op> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.signature.c_prototype(&self.symbol))
    }
}
