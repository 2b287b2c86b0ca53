use brine_struct_compiler::{FieldType, Module, Struct};
use brine_struct_schema::{Value, WireReader, LENGTH_PREFIX_SIZE};

use crate::error::RuntimeError;

fn decode_error(s: &Struct, what: &str, e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Decode(format!("{}.{}: {}", s.name(), what, e))
}

/// Absent nested structs are written as a bare zero prefix; only `nested`
/// calls accept one.
fn decode_struct(module: &Module, s: &Struct, bb: &mut WireReader, nested: bool) -> Result<Value, RuntimeError> {
    let start = bb.index();
    let expected = bb.read_u64().map_err(|e| decode_error(s, "<length>", e))?;
    if expected == 0 && nested {
        return Ok(Value::Null);
    }
    if expected < LENGTH_PREFIX_SIZE as u64 {
        return Err(decode_error(s, "<length>", format!("{} is shorter than the prefix itself", expected)));
    }

    let mut fields = Vec::new();
    for f in s.fields().iter().filter(|f| !f.is_count) {
        let value = match f.ty {
            FieldType::Scalar(ty) => Value::Scalar(bb.read_scalar(ty).map_err(|e| decode_error(s, &f.name, e))?),
            FieldType::RepeatedScalar(ty) => {
                let count = bb.read_u64().map_err(|e| decode_error(s, &f.name, e))?;
                let remaining = (bb.data().len() - bb.index()) / ty.width();
                if count > remaining as u64 {
                    return Err(decode_error(s, &f.name, format!("{} elements do not fit in the buffer", count)));
                }
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(bb.read_scalar(ty).map_err(|e| decode_error(s, &f.name, e))?);
                }
                Value::Array(ty, items)
            }
            FieldType::StructRef(id) => decode_struct(module, module.get(id), bb, true)?,
            FieldType::RepeatedStruct(_) => {
                return Err(decode_error(s, &f.name, "repeated structs have no wire form"));
            }
        };
        fields.push((f.name.clone(), value));
    }

    let consumed = (bb.index() - start) as u64;
    if consumed != expected {
        return Err(RuntimeError::Decode(format!(
            "{}: length prefix says {} bytes but the fields take {}",
            s.name(),
            expected,
            consumed
        )));
    }
    Ok(Value::Object(s.name().to_string(), fields))
}

/// Decodes a serialized instance of `struct_name` without running any
/// generated code. The module may target any machine; the wire format is
/// the same everywhere.
pub fn decode_value(module: &Module, struct_name: &str, bytes: &[u8]) -> Result<Value, RuntimeError> {
    let s = module
        .find(struct_name)
        .ok_or_else(|| RuntimeError::UnknownStruct(struct_name.to_string()))?;
    let mut bb = WireReader::new(bytes);
    let value = decode_struct(module, s, &mut bb, false)?;
    if bb.index() != bytes.len() {
        return Err(RuntimeError::Decode(format!(
            "{} trailing bytes after \"{}\"",
            bytes.len() - bb.index(),
            struct_name
        )));
    }
    Ok(value)
}

/// Decode a serialized struct into a pretty-printed JSON string.
pub fn decode_to_json(module: &Module, struct_name: &str, bytes: &[u8]) -> Result<String, RuntimeError> {
    let value = decode_value(module, struct_name, bytes)?;
    Ok(serde_json::to_string_pretty(&value)?)
}
