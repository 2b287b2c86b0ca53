//! Shared scalar types and wire primitives for the Brine Struct format.
//!
//! A serialized struct is a little-endian, length-prefixed byte string:
//!
//! ```text
//! [u64 total length][field payloads in finalized field order]
//! ```
//!
//! Scalars are written at their native width after byte-order
//! normalization, repeated fields as `[u64 count][elements]`, and nested
//! structs recursively in their own length-prefixed form.
//!
//! ```
//! use brine_struct_schema::*;
//!
//! let mut bytes = [0u8; 12];
//! let mut out = WireWriter::new(&mut bytes);
//! out.write_u64(12).unwrap();
//! out.write_scalar(Scalar::Int32(5)).unwrap();
//! assert_eq!(bytes, [12, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0]);
//!
//! let mut bb = WireReader::new(&bytes);
//! assert_eq!(bb.read_u64(), Ok(12));
//! assert_eq!(bb.read_scalar(ScalarType::Int32), Ok(Scalar::Int32(5)));
//! ```

pub mod bb;
pub mod scalar;
pub mod value;

pub use bb::*;
pub use scalar::*;
pub use value::*;

/// Size of the length prefix that starts every serialized struct, and of
/// the element count that starts every serialized repeated field.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Byte order used on the wire, independent of host or target.
pub const WIRE_ORDER: ByteOrder = ByteOrder::Little;
