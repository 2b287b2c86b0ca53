use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

use crate::scalar::{Scalar, ScalarType};

/// This type holds dynamic struct data decoded from the wire.
///
/// Values mirror the shape of a serialized struct: scalars, repeated
/// scalars, nested structs and absent nested structs. Field order is the
/// finalized field order the bytes were written in.
#[derive(Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Array(ScalarType, Vec<Scalar>),
    Object(String, Vec<(String, Value)>),
    Null,
}

impl Value {
    /// A convenience method to extract the value out of a [Scalar](#variant.Scalar).
    /// Returns `None` for other value kinds.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match *self {
            Value::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// A convenience method to get the elements out of an [Array](#variant.Array).
    /// Returns an empty slice for other value kinds.
    pub fn as_array(&self) -> &[Scalar] {
        match *self {
            Value::Array(_, ref values) => values.as_slice(),
            _ => &[],
        }
    }

    /// A convenience method to extract the length out of an [Array](#variant.Array).
    /// Returns `0` for other value kinds.
    pub fn len(&self) -> usize {
        match *self {
            Value::Array(_, ref values) => values.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A convenience method to extract a field out of an [Object](#variant.Object).
    /// Returns `None` for other value kinds or if the field isn't present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match *self {
            Value::Object(_, ref fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// The struct name of an [Object](#variant.Object), `""` otherwise.
    pub fn struct_name(&self) -> &str {
        match *self {
            Value::Object(ref name, _) => name,
            _ => "",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Scalar(value) => write!(f, "{}", value),
            Value::Array(_, values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Value::Object(name, fields) => {
                write!(f, "{} {{", name)?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {:?}", field, value)?;
                }
                write!(f, " }}")
            }
            Value::Null => write!(f, "null"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(value) => value.serialize(serializer),
            Value::Array(_, values) => values.serialize(serializer),
            Value::Object(_, fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (field, value) in fields {
                    map.serialize_entry(field, value)?;
                }
                map.end()
            }
            Value::Null => serializer.serialize_unit(),
        }
    }
}

#[test]
fn debug_format() {
    let value = Value::Object(
        "Test".to_owned(),
        vec![
            ("n".to_owned(), Value::Scalar(Scalar::Int16(5))),
            (
                "arr".to_owned(),
                Value::Array(ScalarType::Int32, vec![Scalar::Int32(10), Scalar::Int32(20)]),
            ),
            ("next".to_owned(), Value::Null),
        ],
    );
    assert_eq!(format!("{:?}", value), "Test { n: 5, arr: [10, 20], next: null }");
    assert_eq!(value.get("arr").map(Value::len), Some(2));
    assert!(value.get("next").is_some_and(Value::is_null));
    assert_eq!(value.struct_name(), "Test");
}
