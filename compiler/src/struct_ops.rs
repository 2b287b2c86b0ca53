use tracing::trace;

use crate::{
    error::StructError,
    field_ops::field_shape,
    ir::Struct,
    module::Module,
    plan::{CType, CtorArg, FieldShape, Function, Member, Param, Signature, Slot, StructOp, StructPlan},
    symbols,
};

/// Plans the constructor, destructor and wire functions of a struct.
///
/// The wire functions call the field-level helpers by name, so the plans of
/// every field must be generated alongside this one.
pub fn plan_struct(module: &Module, s: &Struct) -> Result<StructPlan, StructError> {
    if !s.is_finalized() {
        return Err(StructError::NotFinalized(s.name().to_string()));
    }
    if module.has_nested_cycle(s.id()) {
        return Err(StructError::NestedStructCycle(s.name().to_string()));
    }

    let name = s.name();
    let mut members = Vec::with_capacity(s.fields().len());
    let mut ctor_args = Vec::new();
    let mut ctor_params = Vec::new();

    for f in s.fields() {
        let shape = field_shape(module, s, f)?;
        let slot = Slot::of(f);

        if !f.is_mutable {
            match &shape {
                FieldShape::Scalar(ty) => {
                    ctor_params.push(Param::new(&f.name, CType::Scalar(*ty)));
                    ctor_args.push(CtorArg::Scalar { slot: slot.clone(), ty: *ty });
                }
                FieldShape::Array { element, count } => {
                    ctor_params.push(Param::new(&f.name, CType::ptr(CType::Scalar(*element))));
                    ctor_params.push(Param::new(&count.name, CType::U64));
                    ctor_args.push(CtorArg::Array {
                        slot:    slot.clone(),
                        element: *element,
                        count:   count.clone(),
                    });
                }
                FieldShape::Nested { struct_name, id } => {
                    ctor_params.push(Param::new(&f.name, CType::Struct(struct_name.clone())));
                    ctor_args.push(CtorArg::Nested {
                        slot:        slot.clone(),
                        id:          *id,
                        struct_name: struct_name.clone(),
                    });
                }
                FieldShape::Count { .. } => {}
            }
        }

        let (serializer, deserializer) = if f.is_count {
            (None, None)
        } else {
            (
                Some(symbols::field_serializer(name, &f.name)),
                Some(symbols::field_deserializer(name, &f.name)),
            )
        };
        members.push(Member {
            slot,
            shape,
            is_mutable: f.is_mutable,
            serializer,
            deserializer,
        });
    }

    let this = || Param::new("self", CType::Struct(name.to_string()));
    let function = |symbol: String, params: Vec<Param>, ret: CType, internal: bool, op: StructOp| Function {
        symbol,
        signature: Signature { params, ret },
        internal,
        op,
    };

    let functions = vec![
        function(symbols::create(name), ctor_params, CType::Struct(name.to_string()), false, StructOp::Create),
        function(symbols::destroy(name), vec![this()], CType::Void, false, StructOp::Destroy),
        function(symbols::serialize(name), vec![this()], CType::Bytes, false, StructOp::Serialize),
        function(
            symbols::deserialize(name),
            vec![Param::new("buffer", CType::Bytes)],
            CType::Struct(name.to_string()),
            false,
            StructOp::Deserialize,
        ),
        function(symbols::wire_size(name), vec![this()], CType::U64, true, StructOp::WireSize),
        function(symbols::discard(name), vec![this()], CType::Void, true, StructOp::Discard),
    ];

    trace!(struct_name = name, functions = functions.len(), "planned struct");
    Ok(StructPlan {
        name: name.to_string(),
        id: s.id(),
        size: s.size(),
        align: s.align(),
        members,
        ctor_args,
        functions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_schema, CompileOptions};

    #[test]
    fn constructor_takes_immutable_fields() {
        let module = compile_schema(
            "struct A { mutable float f; int16 n; repeated int32 xs; mutable repeated int8 ys; }",
            &CompileOptions::default(),
        )
        .unwrap();
        let plan = plan_struct(&module, module.find("A").unwrap()).unwrap();
        let create = plan.function(StructOp::Create).unwrap();
        assert_eq!(create.to_string(), "A_t* create_A(int16_t n, int32_t* xs, uint64_t xs_count)");
        assert_eq!(plan.ctor_args.len(), 2);
        let wire: Vec<&str> = plan.wire_members().map(|m| m.slot.name.as_str()).collect();
        assert_eq!(wire, vec!["n", "f", "xs", "ys"]);
    }

    #[test]
    fn constructor_takes_immutable_struct_fields() {
        let module = compile_schema(
            "struct Inner { int32 v; } struct Outer { Inner frozen; int8 k; mutable Inner live; }",
            &CompileOptions::default(),
        )
        .unwrap();
        let plan = plan_struct(&module, module.find("Outer").unwrap()).unwrap();
        let create = plan.function(StructOp::Create).unwrap();
        assert_eq!(create.to_string(), "Outer_t* create_Outer(int8_t k, Inner_t* frozen)");
        assert!(matches!(
            &plan.ctor_args[1],
            CtorArg::Nested { struct_name, slot, .. } if struct_name == "Inner" && slot.name == "frozen"
        ));
    }

    #[test]
    fn no_arg_constructor_is_void() {
        let module = compile_schema("struct A { mutable int8 x; }", &CompileOptions::default()).unwrap();
        let plan = plan_struct(&module, module.find("A").unwrap()).unwrap();
        assert_eq!(plan.function(StructOp::Create).unwrap().to_string(), "A_t* create_A(void)");
        assert!(plan.function(StructOp::Discard).unwrap().internal);
    }

    #[test]
    fn rejects_cycles_built_through_the_ir() {
        let mut module = Module::new("m", crate::ir::Target::host());
        let a = module.get_or_create_struct("A");
        let b = module.get_or_create_struct("B");
        module.add_field(a, "b", "B", false, true).unwrap();
        module.add_field(b, "a", "A", false, true).unwrap();
        module.finalize_all().unwrap();
        let err = plan_struct(&module, module.get(a)).unwrap_err();
        assert!(matches!(err, StructError::NestedStructCycle(ref n) if n == "A"));
    }
}
