use std::collections::HashMap;

use brine_struct_schema::ScalarType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::StructError,
    ir::{FieldId, FieldType, Struct, StructId, Target},
    layout::contains_cycle,
};

/// Names of the allocator entry points generated code calls into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Builtins {
    pub malloc:  String,
    pub realloc: String,
    pub free:    String,
}

impl Default for Builtins {
    fn default() -> Self {
        Builtins {
            malloc:  "malloc".to_string(),
            realloc: "realloc".to_string(),
            free:    "free".to_string(),
        }
    }
}

/// A compilation unit: every struct generated together, plus the target they
/// are laid out for.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    name:        String,
    source_file: Option<String>,
    target:      Target,
    builtins:    Builtins,
    structs:     Vec<Struct>,
    #[serde(skip)]
    index:       HashMap<String, StructId>,
}

impl Module {
    pub fn new(name: &str, target: Target) -> Self {
        Module {
            name: name.to_string(),
            source_file: None,
            target,
            builtins: Builtins::default(),
            structs: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn set_builtins(&mut self, builtins: Builtins) {
        self.builtins = builtins;
    }

    /// Renames one allocator builtin (`malloc`, `realloc` or `free`).
    pub fn set_builtin_name(&mut self, builtin: &str, name: &str) -> Result<(), StructError> {
        let slot = match builtin {
            "malloc" => &mut self.builtins.malloc,
            "realloc" => &mut self.builtins.realloc,
            "free" => &mut self.builtins.free,
            other => return Err(StructError::Config(format!("unknown builtin \"{}\"", other))),
        };
        *slot = name.to_string();
        Ok(())
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn set_source_file_name(&mut self, path: &str) {
        self.source_file = Some(path.to_string());
    }

    /// Returns the struct called `name`, declaring an empty one if needed so
    /// that fields may refer to structs defined later in the source.
    pub fn get_or_create_struct(&mut self, name: &str) -> StructId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = StructId(self.structs.len() as u32);
        self.structs.push(Struct::new(id, name));
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn struct_id(&self, name: &str) -> Option<StructId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, id: StructId) -> &Struct {
        &self.structs[id.0 as usize]
    }

    pub fn find(&self, name: &str) -> Option<&Struct> {
        self.struct_id(name).map(|id| self.get(id))
    }

    /// Structs in declaration order.
    pub fn structs(&self) -> &[Struct] {
        &self.structs
    }

    fn get_mut(&mut self, id: StructId) -> &mut Struct {
        &mut self.structs[id.0 as usize]
    }

    /// Resolves a type name to a field type. Only structs already known to
    /// the module resolve.
    pub fn parse_type(&self, type_name: &str, repeated: bool) -> Option<FieldType> {
        if let Some(scalar) = ScalarType::from_name(type_name) {
            return Some(if repeated {
                FieldType::RepeatedScalar(scalar)
            } else {
                FieldType::Scalar(scalar)
            });
        }
        let id = self.struct_id(type_name)?;
        Some(if repeated {
            FieldType::RepeatedStruct(id)
        } else {
            FieldType::StructRef(id)
        })
    }

    pub fn add_field(
        &mut self,
        sid: StructId,
        name: &str,
        type_name: &str,
        repeated: bool,
        mutable: bool,
    ) -> Result<FieldId, StructError> {
        let Some(ty) = self.parse_type(type_name, repeated) else {
            return Err(StructError::UnknownFieldType {
                struct_name: self.get(sid).name().to_string(),
                field:       name.to_string(),
                type_name:   type_name.to_string(),
            });
        };
        self.get_mut(sid).add_field(name, ty, mutable)
    }

    pub fn set_packed(&mut self, sid: StructId, packed: bool) -> Result<(), StructError> {
        self.get_mut(sid).set_packed(packed)
    }

    pub fn finalize_struct(&mut self, sid: StructId) -> Result<(), StructError> {
        let target = self.target;
        self.get_mut(sid).finalize(&target)
    }

    /// Finalizes every struct that is not finalized yet.
    pub fn finalize_all(&mut self) -> Result<(), StructError> {
        let target = self.target;
        for s in self.structs.iter_mut().filter(|s| !s.is_finalized()) {
            s.finalize(&target)?;
        }
        debug!(module = %self.name, structs = self.structs.len(), "finalized module");
        Ok(())
    }

    /// True when `sid` reaches itself through struct-valued fields.
    pub fn has_nested_cycle(&self, sid: StructId) -> bool {
        contains_cycle(&self.structs, sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_types() {
        let mut module = Module::new("m", Target::host());
        let point = module.get_or_create_struct("Point");
        assert_eq!(module.parse_type("int32", false), Some(FieldType::Scalar(ScalarType::Int32)));
        assert_eq!(module.parse_type("double", true), Some(FieldType::RepeatedScalar(ScalarType::Double)));
        assert_eq!(module.parse_type("Point", false), Some(FieldType::StructRef(point)));
        assert_eq!(module.parse_type("Line", false), None);
    }

    #[test]
    fn unknown_type_fails_the_field() {
        let mut module = Module::new("m", Target::host());
        let sid = module.get_or_create_struct("A");
        let err = module.add_field(sid, "x", "int24", false, false).unwrap_err();
        assert!(matches!(err, StructError::UnknownFieldType { ref struct_name, .. } if struct_name == "A"));
        assert!(module.get(sid).fields().is_empty());
    }

    #[test]
    fn renames_builtins() {
        let mut module = Module::new("m", Target::host());
        module.set_builtin_name("malloc", "my_malloc").unwrap();
        assert_eq!(module.builtins().malloc, "my_malloc");
        assert!(module.set_builtin_name("calloc", "x").is_err());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut module = Module::new("m", Target::host());
        let a = module.get_or_create_struct("A");
        let b = module.get_or_create_struct("B");
        assert_eq!(module.get_or_create_struct("A"), a);
        assert_ne!(a, b);
        assert_eq!(module.structs().len(), 2);
    }
}
