//! Names of the generated functions.

pub fn create(s: &str) -> String {
    format!("create_{}", s)
}

pub fn destroy(s: &str) -> String {
    format!("destroy_{}", s)
}

pub fn serialize(s: &str) -> String {
    format!("serialize_{}", s)
}

pub fn deserialize(s: &str) -> String {
    format!("deserialize_{}", s)
}

pub fn getter(s: &str, f: &str) -> String {
    format!("get_{}_{}", s, f)
}

pub fn setter(s: &str, f: &str) -> String {
    format!("set_{}_{}", s, f)
}

pub fn item_getter(s: &str, f: &str) -> String {
    format!("get_{}_{}_item", s, f)
}

pub fn item_setter(s: &str, f: &str) -> String {
    format!("set_{}_{}_item", s, f)
}

pub fn field_serializer(s: &str, f: &str) -> String {
    format!("__serialize_{}_{}", s, f)
}

pub fn field_deserializer(s: &str, f: &str) -> String {
    format!("__deserialize_{}_{}", s, f)
}

pub fn wire_size(s: &str) -> String {
    format!("__wire_size_{}", s)
}

pub fn discard(s: &str) -> String {
    format!("__discard_{}", s)
}

/// Native type name of a struct in generated C.
pub fn c_struct(s: &str) -> String {
    format!("{}_t", s)
}

/// Internal symbols are not exported from the generated module.
pub fn is_internal(symbol: &str) -> bool {
    symbol.starts_with("__")
}
