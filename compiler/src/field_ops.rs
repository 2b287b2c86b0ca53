//! Plans the getter, setter, item accessors and wire helpers of one field.
//!
//! | field                 | get              | set         | items | wire |
//! |-----------------------|------------------|-------------|-------|------|
//! | scalar                | live             | overwrite*  |       | yes  |
//! | count                 | live             | resize*     |       |      |
//! | array                 | live* / copy     | grow*       | yes   | yes  |
//! | struct                | live* / copy     | copy*       |       | yes  |
//!
//! `*` marks what only mutable fields get; immutable arrays and structs hand
//! out copies instead of live pointers. Item setters exist on mutable arrays
//! only.

use crate::{
    error::StructError,
    ir::{Field, FieldType, Struct},
    module::Module,
    plan::{CType, FieldOp, FieldPlan, FieldShape, Function, GetPolicy, Param, SetPolicy, Signature, Slot},
    symbols,
};

fn codegen_error(s: &Struct, f: &Field, msg: &str) -> StructError {
    StructError::FieldCodegen {
        struct_name: s.name().to_string(),
        field:       f.name.clone(),
        msg:         msg.to_string(),
    }
}

/// Classifies a finalized field, following its count/data link.
pub fn field_shape(module: &Module, s: &Struct, f: &Field) -> Result<FieldShape, StructError> {
    if f.is_count {
        let data = s
            .data_of(f)
            .ok_or_else(|| codegen_error(s, f, "count field is not linked to an array"))?;
        let element = data
            .element_type()
            .ok_or_else(|| codegen_error(s, f, "count field is linked to a non-repeated field"))?;
        return Ok(FieldShape::Count { data: Slot::of(data), element });
    }
    match f.ty {
        FieldType::Scalar(ty) => Ok(FieldShape::Scalar(ty)),
        FieldType::RepeatedScalar(element) => {
            let count = s
                .count_of(f)
                .ok_or_else(|| codegen_error(s, f, "repeated field has no count field"))?;
            Ok(FieldShape::Array { element, count: Slot::of(count) })
        }
        FieldType::StructRef(id) => {
            let nested = module
                .structs()
                .get(id.0 as usize)
                .ok_or_else(|| codegen_error(s, f, "nested struct does not exist"))?;
            if !nested.is_finalized() {
                return Err(StructError::NotFinalized(nested.name().to_string()));
            }
            Ok(FieldShape::Nested { struct_name: nested.name().to_string(), id })
        }
        FieldType::RepeatedStruct(_) => Err(StructError::RepeatedStructNotSupported {
            struct_name: s.name().to_string(),
            field:       f.name.clone(),
        }),
    }
}

/// The type a getter hands out and a setter takes.
fn value_type(shape: &FieldShape) -> CType {
    match shape {
        FieldShape::Scalar(ty) => CType::Scalar(*ty),
        FieldShape::Count { .. } => CType::U64,
        FieldShape::Array { element, .. } => CType::ptr(CType::Scalar(*element)),
        FieldShape::Nested { struct_name, .. } => CType::Struct(struct_name.clone()),
    }
}

pub fn plan_field(module: &Module, s: &Struct, f: &Field) -> Result<FieldPlan, StructError> {
    if !s.is_finalized() {
        return Err(StructError::NotFinalized(s.name().to_string()));
    }
    let shape = field_shape(module, s, f)?;
    let name = s.name();
    let this = || Param::new("self", CType::Struct(name.to_string()));
    let value = value_type(&shape);
    let mut functions = Vec::new();

    let mut push = |symbol: String, params: Vec<Param>, ret: CType, internal: bool, op: FieldOp| {
        functions.push(Function {
            symbol,
            signature: Signature { params, ret },
            internal,
            op,
        });
    };

    // Getter
    let get_policy = match (&shape, f.is_mutable) {
        (FieldShape::Array { .. }, false) => GetPolicy::CopyArray,
        (FieldShape::Nested { .. }, false) => GetPolicy::CopyStruct,
        _ => GetPolicy::Live,
    };
    push(
        symbols::getter(name, &f.name),
        vec![this(), Param::new("out", CType::ptr(value.clone()))],
        CType::Bool,
        false,
        FieldOp::Get(get_policy),
    );

    // Item getter
    if let FieldShape::Array { element, .. } = &shape {
        push(
            symbols::item_getter(name, &f.name),
            vec![this(), Param::new("index", CType::U64), Param::new("out", CType::ptr(CType::Scalar(*element)))],
            CType::Bool,
            false,
            FieldOp::GetItem,
        );
    }

    // Setters
    if f.is_mutable {
        match &shape {
            FieldShape::Scalar(_) => push(
                symbols::setter(name, &f.name),
                vec![this(), Param::new("value", value.clone())],
                CType::Bool,
                false,
                FieldOp::Set(SetPolicy::Overwrite),
            ),
            FieldShape::Count { .. } => push(
                symbols::setter(name, &f.name),
                vec![this(), Param::new("count", CType::U64)],
                CType::Bool,
                false,
                FieldOp::Set(SetPolicy::Resize),
            ),
            FieldShape::Array { element, .. } => {
                push(
                    symbols::setter(name, &f.name),
                    vec![this(), Param::new("data", value.clone()), Param::new("count", CType::U64)],
                    CType::Bool,
                    false,
                    FieldOp::Set(SetPolicy::Grow),
                );
                push(
                    symbols::item_setter(name, &f.name),
                    vec![this(), Param::new("index", CType::U64), Param::new("value", CType::Scalar(*element))],
                    CType::Bool,
                    false,
                    FieldOp::SetItem,
                );
            }
            FieldShape::Nested { .. } => push(
                symbols::setter(name, &f.name),
                vec![this(), Param::new("value", value.clone())],
                CType::Bool,
                false,
                FieldOp::Set(SetPolicy::CopyStruct),
            ),
        }
    }

    // Wire helpers; count fields travel inside their array
    if !f.is_count {
        push(
            symbols::field_serializer(name, &f.name),
            vec![this(), Param::new("buffer", CType::Bytes)],
            CType::U64,
            true,
            FieldOp::Serialize,
        );
        push(
            symbols::field_deserializer(name, &f.name),
            vec![this(), Param::new("buffer", CType::Bytes)],
            CType::U64,
            true,
            FieldOp::Deserialize,
        );
    }

    Ok(FieldPlan {
        struct_name: name.to_string(),
        struct_id: s.id(),
        slot: Slot::of(f),
        shape,
        is_mutable: f.is_mutable,
        functions,
    })
}
