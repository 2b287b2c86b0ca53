use std::collections::HashMap;
use brine_struct_schema::ScalarType;
use crate::{
    types::{Schema, Definition},
    utils::quote,
    error::StructError,
};

pub const RESERVED_NAMES: [&str; 4] = ["struct", "packed", "mutable", "repeated"];

/// Suffix of the hidden element-count field paired with every repeated field.
pub const COUNT_SUFFIX: &str = "_count";

/// Returns `Ok(())` if verification passed, or the first problem found otherwise.
pub fn verify_schema(schema: &Schema) -> Result<(), StructError> {
    let mut defined_types: Vec<String> = ScalarType::ALL.iter().map(|t| t.name().to_string()).collect();
    let mut definitions_map: HashMap<String, &Definition> = HashMap::new();

    // 1) Check duplicate / reserved type names
    for def in &schema.definitions {
        if defined_types.contains(&def.name) {
            return Err(StructError::VerifierError(format!(
                "The type {} is defined twice",
                quote(&def.name)
            )));
        }
        if RESERVED_NAMES.contains(&def.name.as_str()) {
            return Err(StructError::VerifierError(format!(
                "The type name {} is reserved",
                quote(&def.name)
            )));
        }
        defined_types.push(def.name.clone());
        definitions_map.insert(def.name.clone(), def);
    }

    // 2) Check the fields inside each definition
    for def in &schema.definitions {
        if def.fields.is_empty() {
            return Err(StructError::VerifierError(format!(
                "The struct {} has no fields",
                quote(&def.name)
            )));
        }

        let mut names: Vec<String> = Vec::new();
        for field in &def.fields {
            if !defined_types.contains(&field.type_) {
                return Err(StructError::UnknownFieldType {
                    struct_name: def.name.clone(),
                    field:       field.name.clone(),
                    type_name:   field.type_.clone(),
                });
            }
            if field.is_repeated && definitions_map.contains_key(&field.type_) {
                return Err(StructError::RepeatedStructNotSupported {
                    struct_name: def.name.clone(),
                    field:       field.name.clone(),
                });
            }

            // Repeated fields also claim the name of their hidden count field
            let mut claimed = vec![field.name.clone()];
            if field.is_repeated {
                claimed.push(format!("{}{}", field.name, COUNT_SUFFIX));
            }
            for name in claimed {
                if names.contains(&name) {
                    return Err(StructError::DuplicateField {
                        struct_name: def.name.clone(),
                        field:       name,
                    });
                }
                names.push(name);
            }
        }
    }

    // 3) Check that structs do not contain themselves recursively
    let mut state: HashMap<String, u8> = HashMap::new();
    fn check_recursion(
        name: &str,
        definitions_map: &HashMap<String, &Definition>,
        state: &mut HashMap<String, u8>,
    ) -> Result<(), StructError> {
        let definition = match definitions_map.get(name) {
            Some(def) => def,
            None => return Ok(()),
        };
        if let Some(&s) = state.get(name) {
            if s == 1 {
                return Err(StructError::NestedStructCycle(name.to_string()));
            } else if s == 2 {
                return Ok(());
            }
        }
        state.insert(name.to_string(), 1);
        for field in &definition.fields {
            check_recursion(&field.type_, definitions_map, state)?;
        }
        state.insert(name.to_string(), 2);
        Ok(())
    }

    for def in &schema.definitions {
        check_recursion(&def.name, &definitions_map, &mut state)?;
    }

    Ok(())
}
