//! brine-struct
//!
//! In-process runtime for Brine Struct modules. Every function the compiler
//! plans for a module (constructors, destructors, accessors, item accessors,
//! count setters, serializers and deserializers) is realized over raw
//! `malloc`ed memory with the same contract as the generated C code.
//!
//! ```
//! use brine_struct::{Arg, NativeModule, Ret};
//! use brine_struct_compiler::{compile_schema, CompileOptions};
//! use brine_struct_schema::Scalar;
//!
//! let module = compile_schema("struct Point { int32 x; mutable int32 y; }", &CompileOptions::default()).unwrap();
//! let native = NativeModule::load(&module).unwrap();
//! unsafe {
//!     let p = native.call("create_Point", &[Arg::Scalar(Scalar::Int32(3))]).unwrap().as_ptr().unwrap();
//!     native.call("set_Point_y", &[Arg::Ptr(p), Arg::Scalar(Scalar::Int32(4))]).unwrap();
//!     let value = native.snapshot("Point", p).unwrap();
//!     assert_eq!(format!("{:?}", value), "Point { x: 3, y: 4 }");
//!     assert_eq!(native.call("destroy_Point", &[Arg::Ptr(p)]).unwrap(), Ret::Void);
//! }
//! ```

pub mod alloc;
pub mod decode;
pub mod error;
mod ops;
pub mod runtime;

pub use alloc::{Allocator, SystemAllocator};
pub use decode::{decode_to_json, decode_value};
pub use error::RuntimeError;
pub use runtime::{Arg, NativeModule, Ret, RuntimeEmitter};

pub use brine_struct_compiler::{compile_schema, CompileOptions, Module, StructError};
pub use brine_struct_schema::{Scalar, ScalarType, Value};
