use brine_struct_compiler::{StructError, Target};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Compile(#[from] StructError),

    #[error("Unknown symbol \"{0}\"")]
    UnknownSymbol(String),

    #[error("Unknown struct \"{0}\"")]
    UnknownStruct(String),

    #[error("Bad arguments for \"{symbol}\": {msg}")]
    ArgumentMismatch {
        symbol: String,
        msg:    String,
    },

    #[error("Module is laid out for {target:?} but this process runs on {host:?}")]
    TargetMismatch {
        target: Target,
        host:   Target,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
