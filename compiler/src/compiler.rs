use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::StructError,
    ir::Target,
    module::{Builtins, Module},
    parser::parse_schema,
    tokenizer::tokenize_schema,
    types::Schema,
    verifier::verify_schema,
};

/// Everything that shapes a compilation besides the schema text itself.
///
/// Deserializable from a JSON config file; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub module_name: String,
    pub target:      Target,
    pub builtins:    Builtins,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            module_name: "structs".to_string(),
            target:      Target::host(),
            builtins:    Builtins::default(),
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> Result<CompileOptions, StructError> {
        let options: CompileOptions = serde_json::from_str(text)?;
        options.target.validate()?;
        Ok(options)
    }
}

/// Compile a textual schema into a finalized `Module`.
/// Returns `Err(StructError)` if tokenization/parsing/verification/layout fails.
pub fn compile_schema(text: &str, options: &CompileOptions) -> Result<Module, StructError> {
    let tokens = tokenize_schema(text)?;
    let schema = parse_schema(&tokens)?;
    verify_schema(&schema)?;
    lower_schema(&schema, options)
}

/// Builds the IR for a verified schema and finalizes every struct.
pub fn lower_schema(schema: &Schema, options: &CompileOptions) -> Result<Module, StructError> {
    options.target.validate()?;
    let mut module = Module::new(&options.module_name, options.target);
    module.set_builtins(options.builtins.clone());

    // Declare all structs first so fields can refer forward
    for def in &schema.definitions {
        module.get_or_create_struct(&def.name);
    }

    for def in &schema.definitions {
        let sid = module.get_or_create_struct(&def.name);
        module.set_packed(sid, def.is_packed)?;
        for field in &def.fields {
            module.add_field(sid, &field.name, &field.type_, field.is_repeated, field.is_mutable)?;
        }
    }

    module.finalize_all()?;
    debug!(module = %module.name(), "lowered schema");
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brine_struct_schema::ByteOrder;

    #[test]
    fn options_from_json() {
        let options = CompileOptions::from_json(
            r#"{ "module_name": "shapes", "target": { "pointer_width": 4, "byte_order": "big" } }"#,
        )
        .unwrap();
        assert_eq!(options.module_name, "shapes");
        assert_eq!(options.target.pointer_width, 4);
        assert_eq!(options.target.byte_order, ByteOrder::Big);
        assert_eq!(options.builtins, Builtins::default());
    }

    #[test]
    fn options_reject_bad_target() {
        let err = CompileOptions::from_json(r#"{ "target": { "pointer_width": 3, "byte_order": "little" } }"#);
        assert!(matches!(err, Err(StructError::Config(_))));
    }

    #[test]
    fn lowers_forward_references() {
        let module = compile_schema(
            "struct Line { mutable Point a; Point b; } struct Point { int32 x; int32 y; }",
            &CompileOptions::default(),
        )
        .unwrap();
        let line = module.find("Line").unwrap();
        let point = module.struct_id("Point").unwrap();
        assert!(line.is_finalized());
        assert!(line.fields().iter().all(|f| f.is_struct && f.nested_struct() == Some(point)));
    }
}
