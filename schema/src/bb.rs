use std::fmt;

use crate::scalar::{normalize, ByteOrder, Scalar, ScalarType};

/// Returned when a read or write would run past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    pub index: usize,
    pub wanted: usize,
    pub len: usize,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "needed {} bytes at offset {} but the buffer holds {}",
            self.wanted, self.index, self.len
        )
    }
}

impl std::error::Error for OutOfBounds {}

/// A wire buffer meant for reading.
///
/// Example usage:
///
/// ```
/// let mut bb = brine_struct_schema::WireReader::new(&[3, 0, 0, 0, 0, 0, 0, 0, 7]);
/// assert_eq!(bb.read_u64(), Ok(3));
/// assert_eq!(bb.read_bytes(1), Ok(&[7u8][..]));
/// ```
///
pub struct WireReader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> WireReader<'a> {
    /// Create a new WireReader that wraps the provided byte slice.
    pub fn new(data: &'a [u8]) -> WireReader<'a> {
        WireReader { data, index: 0 }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the current index into the underlying byte slice. This starts
    /// off as 0 and ends up as `self.data().len()` when everything has been
    /// read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Try to read `len` raw bytes starting at the current index.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], OutOfBounds> {
        let end = self.index.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let value = &self.data[self.index..end];
                self.index = end;
                Ok(value)
            }
            None => Err(OutOfBounds {
                index: self.index,
                wanted: len,
                len: self.data.len(),
            }),
        }
    }

    /// Try to read a normalized unsigned 64-bit integer (a length prefix or
    /// an element count).
    pub fn read_u64(&mut self) -> Result<u64, OutOfBounds> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_bytes(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Try to read one normalized scalar of type `ty`.
    pub fn read_scalar(&mut self, ty: ScalarType) -> Result<Scalar, OutOfBounds> {
        let mut raw = [0u8; 8];
        raw[..ty.width()].copy_from_slice(self.read_bytes(ty.width())?);
        normalize(&mut raw[..ty.width()], ByteOrder::host());
        Ok(Scalar::from_native_bytes(ty, &raw))
    }
}

/// A wire buffer meant for writing into caller-provided memory.
pub struct WireWriter<'a> {
    data: &'a mut [u8],
    index: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> WireWriter<'a> {
        WireWriter { data, index: 0 }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), OutOfBounds> {
        let end = self.index + value.len();
        if end > self.data.len() {
            return Err(OutOfBounds {
                index: self.index,
                wanted: value.len(),
                len: self.data.len(),
            });
        }
        self.data[self.index..end].copy_from_slice(value);
        self.index = end;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), OutOfBounds> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_scalar(&mut self, value: Scalar) -> Result<(), OutOfBounds> {
        let width = value.ty().width();
        let mut raw = value.to_native_bytes();
        normalize(&mut raw[..width], ByteOrder::host());
        self.write_bytes(&raw[..width])
    }
}

#[test]
fn read_bytes() {
    let read = |bytes, len| WireReader::new(bytes).read_bytes(len).map(|b| b.to_vec());
    assert_eq!(read(&[], 0), Ok(vec![]));
    assert!(read(&[], 1).is_err());
    assert_eq!(read(&[0], 0), Ok(vec![]));
    assert_eq!(read(&[0], 1), Ok(vec![0]));
    assert!(read(&[0], 2).is_err());
    assert!(read(&[0], usize::MAX).is_err());
}

#[test]
fn read_u64() {
    let read = |bytes| WireReader::new(bytes).read_u64();
    assert!(read(&[]).is_err());
    assert!(read(&[1, 0, 0, 0, 0, 0, 0]).is_err());
    assert_eq!(read(&[1, 0, 0, 0, 0, 0, 0, 0]), Ok(1));
    assert_eq!(read(&[0, 1, 0, 0, 0, 0, 0, 0]), Ok(256));
    assert_eq!(read(&[255, 255, 255, 255, 255, 255, 255, 255]), Ok(u64::MAX));
}

#[test]
fn read_scalar() {
    let read = |bytes, ty| WireReader::new(bytes).read_scalar(ty);
    assert_eq!(read(&[5, 0, 0, 0], ScalarType::Int32), Ok(Scalar::Int32(5)));
    assert_eq!(read(&[0xfe, 0xff], ScalarType::Int16), Ok(Scalar::Int16(-2)));
    assert_eq!(read(&[1], ScalarType::Bool), Ok(Scalar::Bool(true)));
    assert_eq!(read(&[0, 0, 0xc0, 0x3f], ScalarType::Float), Ok(Scalar::Float(1.5)));
    assert!(read(&[5, 0, 0], ScalarType::Int32).is_err());
}

#[test]
fn read_sequence() {
    let data = [2, 0, 0, 0, 0, 0, 0, 0, 10, 0, 20, 0];
    let mut bb = WireReader::new(&data);
    assert_eq!(bb.read_u64(), Ok(2));
    assert_eq!(bb.read_scalar(ScalarType::UInt16), Ok(Scalar::UInt16(10)));
    assert_eq!(bb.read_scalar(ScalarType::UInt16), Ok(Scalar::UInt16(20)));
    assert_eq!(bb.index(), data.len());
    assert!(bb.read_bytes(1).is_err());
}

#[test]
fn write_scalar() {
    let mut data = [0u8; 4];
    let mut out = WireWriter::new(&mut data);
    out.write_scalar(Scalar::UInt32(0x0000_0005)).unwrap();
    assert_eq!(out.len(), 4);
    assert_eq!(data, [5, 0, 0, 0]);
}

#[test]
fn write_past_end() {
    let mut data = [0u8; 10];
    let mut out = WireWriter::new(&mut data);
    out.write_u64(1).unwrap();
    assert_eq!(
        out.write_scalar(Scalar::Int32(1)),
        Err(OutOfBounds { index: 8, wanted: 4, len: 10 })
    );
    assert_eq!(out.len(), 8);
}
