use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}, column {column}: {msg}")]
    ParseError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("Verifier error: {0}")]
    VerifierError(String),

    #[error("Unknown type \"{type_name}\" for field \"{field}\" of struct \"{struct_name}\"")]
    UnknownFieldType {
        struct_name: String,
        field:       String,
        type_name:   String,
    },

    #[error("Struct \"{0}\" contains itself through its nested struct fields")]
    NestedStructCycle(String),

    #[error("Field \"{field}\" of struct \"{struct_name}\" is a repeated struct, which is not supported")]
    RepeatedStructNotSupported {
        struct_name: String,
        field:       String,
    },

    #[error("Field \"{field}\" is declared twice in struct \"{struct_name}\"")]
    DuplicateField {
        struct_name: String,
        field:       String,
    },

    #[error("Struct \"{0}\" is already finalized")]
    AlreadyFinalized(String),

    #[error("Struct \"{0}\" must be finalized before code generation")]
    NotFinalized(String),

    #[error("Unknown struct \"{0}\"")]
    UnknownStruct(String),

    #[error("Code generation failed for field \"{field}\" of struct \"{struct_name}\": {msg}")]
    FieldCodegen {
        struct_name: String,
        field:       String,
        msg:         String,
    },

    #[error("Code generation failed for {} item(s): {}", .0.len(), .0.join("; "))]
    CodegenFailed(Vec<String>),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
