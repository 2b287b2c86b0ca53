use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WIRE_ORDER;

/// Byte order of a host, a compilation target, or the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// The byte order of the machine running this code.
    pub const fn host() -> ByteOrder {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Converts `bytes` between `order` and the wire byte order, in place.
///
/// The conversion is its own inverse, so the same call is used on the way
/// out and on the way in. When `order` already matches the wire order this
/// is a no-op; otherwise the bytes are reversed.
pub fn normalize(bytes: &mut [u8], order: ByteOrder) {
    if order != WIRE_ORDER {
        bytes.reverse();
    }
}

/// The scalar element types a schema field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
}

impl ScalarType {
    pub const ALL: [ScalarType; 11] = [
        ScalarType::Bool,
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::UInt8,
        ScalarType::UInt16,
        ScalarType::UInt32,
        ScalarType::UInt64,
        ScalarType::Float,
        ScalarType::Double,
    ];

    /// Storage size in bytes, both in native memory and on the wire.
    pub const fn width(self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Double => 8,
        }
    }

    /// Spelling used in schema source.
    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt8 => "uint8",
            ScalarType::UInt16 => "uint16",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<ScalarType> {
        ScalarType::ALL.iter().copied().find(|ty| ty.name() == name)
    }

    /// The matching C type from `<stdint.h>` / `<stdbool.h>`.
    pub const fn c_type(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8_t",
            ScalarType::Int16 => "int16_t",
            ScalarType::Int32 => "int32_t",
            ScalarType::Int64 => "int64_t",
            ScalarType::UInt8 => "uint8_t",
            ScalarType::UInt16 => "uint16_t",
            ScalarType::UInt32 => "uint32_t",
            ScalarType::UInt64 => "uint64_t",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    pub const fn rust_type(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "i8",
            ScalarType::Int16 => "i16",
            ScalarType::Int32 => "i32",
            ScalarType::Int64 => "i64",
            ScalarType::UInt8 => "u8",
            ScalarType::UInt16 => "u16",
            ScalarType::UInt32 => "u32",
            ScalarType::UInt64 => "u64",
            ScalarType::Float => "f32",
            ScalarType::Double => "f64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single scalar value tagged with its type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
}

impl Scalar {
    pub fn ty(&self) -> ScalarType {
        match self {
            Scalar::Bool(_) => ScalarType::Bool,
            Scalar::Int8(_) => ScalarType::Int8,
            Scalar::Int16(_) => ScalarType::Int16,
            Scalar::Int32(_) => ScalarType::Int32,
            Scalar::Int64(_) => ScalarType::Int64,
            Scalar::UInt8(_) => ScalarType::UInt8,
            Scalar::UInt16(_) => ScalarType::UInt16,
            Scalar::UInt32(_) => ScalarType::UInt32,
            Scalar::UInt64(_) => ScalarType::UInt64,
            Scalar::Float(_) => ScalarType::Float,
            Scalar::Double(_) => ScalarType::Double,
        }
    }

    /// The all-zero value of `ty`.
    pub fn zero(ty: ScalarType) -> Scalar {
        Scalar::from_native_bytes(ty, &[0u8; 8][..ty.width()])
    }

    /// Host-order bytes of this value. Only the first `ty().width()` bytes
    /// of the returned array are meaningful.
    pub fn to_native_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        match *self {
            Scalar::Bool(v) => out[0] = v as u8,
            Scalar::Int8(v) => out[..1].copy_from_slice(&v.to_ne_bytes()),
            Scalar::Int16(v) => out[..2].copy_from_slice(&v.to_ne_bytes()),
            Scalar::Int32(v) => out[..4].copy_from_slice(&v.to_ne_bytes()),
            Scalar::Int64(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::UInt8(v) => out[0] = v,
            Scalar::UInt16(v) => out[..2].copy_from_slice(&v.to_ne_bytes()),
            Scalar::UInt32(v) => out[..4].copy_from_slice(&v.to_ne_bytes()),
            Scalar::UInt64(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::Float(v) => out[..4].copy_from_slice(&v.to_ne_bytes()),
            Scalar::Double(v) => out.copy_from_slice(&v.to_ne_bytes()),
        }
        out
    }

    /// Rebuilds a value of `ty` from host-order bytes. `bytes` must hold at
    /// least `ty.width()` bytes; any non-zero byte reads as `true` for bools.
    pub fn from_native_bytes(ty: ScalarType, bytes: &[u8]) -> Scalar {
        let mut raw = [0u8; 8];
        raw[..ty.width()].copy_from_slice(&bytes[..ty.width()]);
        match ty {
            ScalarType::Bool => Scalar::Bool(raw[0] != 0),
            ScalarType::Int8 => Scalar::Int8(raw[0] as i8),
            ScalarType::Int16 => Scalar::Int16(i16::from_ne_bytes([raw[0], raw[1]])),
            ScalarType::Int32 => Scalar::Int32(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
            ScalarType::Int64 => Scalar::Int64(i64::from_ne_bytes(raw)),
            ScalarType::UInt8 => Scalar::UInt8(raw[0]),
            ScalarType::UInt16 => Scalar::UInt16(u16::from_ne_bytes([raw[0], raw[1]])),
            ScalarType::UInt32 => Scalar::UInt32(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
            ScalarType::UInt64 => Scalar::UInt64(u64::from_ne_bytes(raw)),
            ScalarType::Float => Scalar::Float(f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
            ScalarType::Double => Scalar::Double(f64::from_ne_bytes(raw)),
        }
    }

    /// Reads a value of `ty` from native memory.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `ty.width()` bytes. No alignment is
    /// required.
    pub unsafe fn read_from(ty: ScalarType, ptr: *const u8) -> Scalar {
        let mut raw = [0u8; 8];
        std::ptr::copy_nonoverlapping(ptr, raw.as_mut_ptr(), ty.width());
        Scalar::from_native_bytes(ty, &raw)
    }

    /// Writes this value into native memory.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `self.ty().width()` bytes. No
    /// alignment is required.
    pub unsafe fn write_to(&self, ptr: *mut u8) {
        let raw = self.to_native_bytes();
        std::ptr::copy_nonoverlapping(raw.as_ptr(), ptr, self.ty().width());
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int8(v) => write!(f, "{}", v),
            Scalar::Int16(v) => write!(f, "{}", v),
            Scalar::Int32(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::UInt8(v) => write!(f, "{}", v),
            Scalar::UInt16(v) => write!(f, "{}", v),
            Scalar::UInt32(v) => write!(f, "{}", v),
            Scalar::UInt64(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Double(v) => write!(f, "{}", v),
        }
    }
}
