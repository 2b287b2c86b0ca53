use tracing::trace;

use crate::{
    error::StructError,
    ir::{Field, FieldId, FieldType, Struct, StructId, Target},
    verifier::COUNT_SUFFIX,
};

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

impl Struct {
    pub fn set_packed(&mut self, packed: bool) -> Result<(), StructError> {
        if self.finalized {
            return Err(StructError::AlreadyFinalized(self.name.clone()));
        }
        self.packed = packed;
        Ok(())
    }

    /// Appends a field, synthesizing the hidden `<name>_count` field right
    /// before every repeated scalar field.
    ///
    /// Returns the id of the declared field (not of its count field).
    pub fn add_field(&mut self, name: &str, ty: FieldType, is_mutable: bool) -> Result<FieldId, StructError> {
        if self.finalized {
            return Err(StructError::AlreadyFinalized(self.name.clone()));
        }
        if let FieldType::RepeatedStruct(_) = ty {
            return Err(StructError::RepeatedStructNotSupported {
                struct_name: self.name.clone(),
                field:       name.to_string(),
            });
        }

        let count_name = format!("{}{}", name, COUNT_SUFFIX);
        let mut claimed = vec![name];
        if let FieldType::RepeatedScalar(_) = ty {
            claimed.push(&count_name);
        }
        for n in claimed {
            if self.field_by_name(n).is_some() {
                return Err(StructError::DuplicateField {
                    struct_name: self.name.clone(),
                    field:       n.to_string(),
                });
            }
        }

        let mut field = Field {
            name: name.to_string(),
            ty,
            is_mutable,
            is_struct: matches!(ty, FieldType::StructRef(_)),
            is_count: false,
            count_field: None,
            counts_for: None,
            parent: self.id,
            slot_offset: 0,
            byte_offset: 0,
        };

        if let FieldType::RepeatedScalar(_) = ty {
            let count_id = FieldId(self.fields.len() as u32);
            let data_id = FieldId(count_id.0 + 1);
            self.fields.push(Field {
                name:        count_name,
                ty:          FieldType::Scalar(brine_struct_schema::ScalarType::UInt64),
                is_mutable,
                is_struct:   false,
                is_count:    true,
                count_field: None,
                counts_for:  Some(data_id),
                parent:      self.id,
                slot_offset: count_id.0,
                byte_offset: 0,
            });
            field.count_field = Some(count_id);
        }

        let id = FieldId(self.fields.len() as u32);
        field.slot_offset = id.0;
        trace!(struct_name = %self.name, field = name, "added field");
        self.fields.push(field);
        Ok(id)
    }

    /// Freezes the field order and computes the native layout.
    ///
    /// Fields are stable-sorted by ascending storage size, so declaration
    /// order breaks ties and a count field stays ahead of its array when both
    /// are pointer sized. Count/data links are re-targeted to the new indices.
    pub fn finalize(&mut self, target: &Target) -> Result<(), StructError> {
        if self.finalized {
            return Err(StructError::AlreadyFinalized(self.name.clone()));
        }
        target.validate()?;

        let mut order: Vec<usize> = (0..self.fields.len()).collect();
        order.sort_by_key(|&i| self.fields[i].storage_size(target));

        let mut remap = vec![0u32; self.fields.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new as u32;
        }

        let mut old_fields: Vec<Option<Field>> = std::mem::take(&mut self.fields).into_iter().map(Some).collect();
        let mut fields = Vec::with_capacity(order.len());
        for &old in &order {
            if let Some(mut field) = old_fields[old].take() {
                field.count_field = field.count_field.map(|id| FieldId(remap[id.index()]));
                field.counts_for = field.counts_for.map(|id| FieldId(remap[id.index()]));
                fields.push(field);
            }
        }

        let mut offset = 0;
        let mut max_align = 1;
        for (slot, field) in fields.iter_mut().enumerate() {
            let size = field.storage_size(target);
            let align = if self.packed { 1 } else { size };
            offset = align_up(offset, align);
            field.slot_offset = slot as u32;
            field.byte_offset = offset;
            offset += size;
            max_align = max_align.max(align);
        }

        self.fields = fields;
        self.align = max_align;
        self.size = align_up(offset, max_align);
        self.finalized = true;
        trace!(struct_name = %self.name, size = self.size, "finalized struct");
        Ok(())
    }
}

/// Walks struct-valued fields looking for a path back to `start`.
pub fn contains_cycle(structs: &[Struct], start: StructId) -> bool {
    fn visit(structs: &[Struct], current: StructId, start: StructId, seen: &mut Vec<StructId>) -> bool {
        let Some(s) = structs.get(current.0 as usize) else {
            return false;
        };
        for field in s.fields() {
            if let Some(nested) = field.nested_struct() {
                if nested == start {
                    return true;
                }
                if !seen.contains(&nested) {
                    seen.push(nested);
                    if visit(structs, nested, start, seen) {
                        return true;
                    }
                }
            }
        }
        false
    }
    visit(structs, start, start, &mut Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brine_struct_schema::{ByteOrder, ScalarType};

    const TARGET64: Target = Target { pointer_width: 8, byte_order: ByteOrder::Little };

    fn test_struct() -> Struct {
        let mut s = Struct::new(StructId(0), "Test");
        s.add_field("f", FieldType::Scalar(ScalarType::Float), true).unwrap();
        s.add_field("n", FieldType::Scalar(ScalarType::Int16), false).unwrap();
        s.add_field("arr", FieldType::RepeatedScalar(ScalarType::Int32), true).unwrap();
        s
    }

    fn names(s: &Struct) -> Vec<&str> {
        s.fields().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn count_field_precedes_array() {
        let s = test_struct();
        assert_eq!(names(&s), vec!["f", "n", "arr_count", "arr"]);
        let count = &s.fields()[2];
        assert!(count.is_count && count.is_mutable);
        assert_eq!(count.counts_for, Some(FieldId(3)));
        assert_eq!(s.fields()[3].count_field, Some(FieldId(2)));
    }

    #[test]
    fn finalize_sorts_by_size() {
        let mut s = test_struct();
        s.finalize(&TARGET64).unwrap();
        assert_eq!(names(&s), vec!["n", "f", "arr_count", "arr"]);
        let offsets: Vec<usize> = s.fields().iter().map(|f| f.byte_offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(s.size(), 24);
        for (i, f) in s.fields().iter().enumerate() {
            assert_eq!(f.slot_offset as usize, i);
        }
        let sizes: Vec<usize> = s.fields().iter().map(|f| f.storage_size(&TARGET64)).collect();
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn finalize_retargets_links() {
        let mut s = Struct::new(StructId(0), "S");
        s.add_field("big", FieldType::Scalar(ScalarType::Double), false).unwrap();
        s.add_field("xs", FieldType::RepeatedScalar(ScalarType::UInt8), true).unwrap();
        s.add_field("b", FieldType::Scalar(ScalarType::Bool), false).unwrap();
        s.finalize(&Target { pointer_width: 4, byte_order: ByteOrder::Little }).unwrap();
        assert_eq!(names(&s), vec!["b", "xs", "big", "xs_count"]);
        let xs = s.field_by_name("xs").unwrap();
        assert_eq!(s.count_of(xs).unwrap().name, "xs_count");
        let count = s.field_by_name("xs_count").unwrap();
        assert_eq!(s.data_of(count).unwrap().name, "xs");
    }

    #[test]
    fn packed_layout_has_no_padding() {
        let mut s = Struct::new(StructId(0), "P");
        s.set_packed(true).unwrap();
        s.add_field("a", FieldType::Scalar(ScalarType::UInt8), false).unwrap();
        s.add_field("b", FieldType::Scalar(ScalarType::UInt16), false).unwrap();
        s.add_field("c", FieldType::Scalar(ScalarType::UInt8), false).unwrap();
        s.finalize(&TARGET64).unwrap();
        assert_eq!(names(&s), vec!["a", "c", "b"]);
        assert_eq!(s.field_by_name("b").unwrap().byte_offset, 2);
        assert_eq!(s.size(), 4);
    }

    #[test]
    fn finalize_is_single_shot() {
        let mut s = test_struct();
        s.finalize(&TARGET64).unwrap();
        let before = s.clone();
        assert!(matches!(s.finalize(&TARGET64), Err(StructError::AlreadyFinalized(_))));
        assert_eq!(s, before);
        assert!(matches!(
            s.add_field("late", FieldType::Scalar(ScalarType::Int8), false),
            Err(StructError::AlreadyFinalized(_))
        ));
    }

    #[test]
    fn rejects_duplicates_and_repeated_structs() {
        let mut s = test_struct();
        assert!(matches!(
            s.add_field("arr_count", FieldType::Scalar(ScalarType::UInt64), false),
            Err(StructError::DuplicateField { .. })
        ));
        assert!(matches!(
            s.add_field("items", FieldType::RepeatedStruct(StructId(1)), false),
            Err(StructError::RepeatedStructNotSupported { .. })
        ));
        assert_eq!(s.fields().len(), 4);
    }

    #[test]
    fn rejects_bad_pointer_width() {
        let mut s = test_struct();
        let target = Target { pointer_width: 2, byte_order: ByteOrder::Little };
        assert!(matches!(s.finalize(&target), Err(StructError::Config(_))));
        assert!(!s.is_finalized());
    }

    #[test]
    fn detects_cycles() {
        let mut a = Struct::new(StructId(0), "A");
        a.add_field("b", FieldType::StructRef(StructId(1)), true).unwrap();
        let mut b = Struct::new(StructId(1), "B");
        b.add_field("a", FieldType::StructRef(StructId(0)), true).unwrap();
        let mut c = Struct::new(StructId(2), "C");
        c.add_field("a", FieldType::StructRef(StructId(0)), true).unwrap();
        let structs = vec![a, b, c];
        assert!(contains_cycle(&structs, StructId(0)));
        assert!(!contains_cycle(&structs, StructId(2)));
    }
}
