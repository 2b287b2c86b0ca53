//! Compile-time description of the structs a module generates code for.
//!
//! `Struct` and `Field` are pure data. They are built by the schema front
//! end (or any other caller) through [`Module`](crate::module::Module),
//! frozen by the layout engine in [`layout`](crate::layout), and then only
//! read by the operation generators and binding emitters.

use brine_struct_schema::{ByteOrder, ScalarType};
use serde::{Deserialize, Serialize};

use crate::error::StructError;

/// Index of a struct inside its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StructId(pub u32);

/// Index of a field inside its struct's field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldId(pub u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The machine the generated operations are laid out for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Size of a data pointer in bytes, 4 or 8.
    pub pointer_width: u8,
    pub byte_order:    ByteOrder,
}

impl Target {
    pub const fn host() -> Target {
        Target {
            pointer_width: std::mem::size_of::<usize>() as u8,
            byte_order:    ByteOrder::host(),
        }
    }

    pub fn pointer_size(&self) -> usize {
        self.pointer_width as usize
    }

    pub fn validate(&self) -> Result<(), StructError> {
        match self.pointer_width {
            4 | 8 => Ok(()),
            other => Err(StructError::Config(format!(
                "pointer width must be 4 or 8 bytes, got {}",
                other
            ))),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::host()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Scalar(ScalarType),
    /// Pointer to an instance of another struct of the same module.
    StructRef(StructId),
    /// Pointer to a growable buffer of scalars, paired with a count field.
    RepeatedScalar(ScalarType),
    /// Arrays of structs are representable but rejected by the layout engine.
    RepeatedStruct(StructId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name:        String,
    pub ty:          FieldType,
    pub is_mutable:  bool,
    pub is_struct:   bool,
    pub is_count:    bool,
    /// On a repeated field, its hidden count field.
    pub count_field: Option<FieldId>,
    /// On a count field, the repeated field it counts for.
    pub counts_for:  Option<FieldId>,
    pub parent:      StructId,
    /// Position in the finalized field order.
    pub slot_offset: u32,
    /// Byte offset in the native layout, valid once finalized.
    pub byte_offset: usize,
}

impl Field {
    pub fn is_repeated(&self) -> bool {
        matches!(self.ty, FieldType::RepeatedScalar(_))
    }

    /// Scalar type stored in the slot itself (count fields are `uint64`).
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.ty {
            FieldType::Scalar(ty) => Some(ty),
            _ => None,
        }
    }

    /// Element type of a repeated field.
    pub fn element_type(&self) -> Option<ScalarType> {
        match self.ty {
            FieldType::RepeatedScalar(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn nested_struct(&self) -> Option<StructId> {
        match self.ty {
            FieldType::StructRef(id) => Some(id),
            _ => None,
        }
    }

    /// True when the slot holds a pointer: repeated buffers and nested structs.
    pub fn is_pointer(&self) -> bool {
        !matches!(self.ty, FieldType::Scalar(_))
    }

    /// Bytes the slot occupies in the native struct.
    pub fn storage_size(&self, target: &Target) -> usize {
        match self.ty {
            FieldType::Scalar(ty) => ty.width(),
            _ => target.pointer_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Struct {
    pub(crate) id:        StructId,
    pub(crate) name:      String,
    pub(crate) packed:    bool,
    pub(crate) fields:    Vec<Field>,
    pub(crate) finalized: bool,
    pub(crate) size:      usize,
    pub(crate) align:     usize,
}

impl Struct {
    pub fn new(id: StructId, name: &str) -> Self {
        Struct {
            id,
            name:      name.to_string(),
            packed:    false,
            fields:    Vec::new(),
            finalized: false,
            size:      0,
            align:     1,
        }
    }

    pub fn id(&self) -> StructId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Fields in declaration order until finalized, size order afterwards.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn native_slot_count(&self) -> usize {
        self.fields.len()
    }

    /// Total native size in bytes, including tail padding.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// The count field paired with a repeated field.
    pub fn count_of(&self, field: &Field) -> Option<&Field> {
        field.count_field.map(|id| self.field(id))
    }

    /// The repeated field a count field belongs to.
    pub fn data_of(&self, count: &Field) -> Option<&Field> {
        count.counts_for.map(|id| self.field(id))
    }
}
