//! brine-struct-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser + verifier for `.bst` struct schema files,
//!  2) The struct IR (`ir`) and the layout engine that finalizes it (`layout`),
//!  3) The field and struct operation generators (`field_ops`, `struct_ops`),
//!     which describe every generated function as a plan (`plan`),
//!  4) Pass orchestration over a module (`pass`) feeding a `CodeEmitter`,
//!  5) A C source backend (`gen_c`) and Rust FFI bindings (`gen_rust`),
//!  6) Error types (`StructError`).

pub mod error;
pub mod types;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod verifier;
pub mod ir;
pub mod layout;
pub mod module;
pub mod compiler;
pub mod symbols;
pub mod plan;
pub mod field_ops;
pub mod struct_ops;
pub mod traits;
pub mod pass;
pub mod gen_c;
pub mod gen_rust;

pub use compiler::{compile_schema, lower_schema, CompileOptions};
pub use error::StructError;
pub use gen_c::{compile_module_to_c, CSource, CSourceEmitter};
pub use gen_rust::compile_module_to_rust;
pub use ir::{Field, FieldId, FieldType, Struct, StructId, Target};
pub use module::{Builtins, Module};
pub use pass::{emit, Pass, PassManager};
pub use traits::CodeEmitter;
