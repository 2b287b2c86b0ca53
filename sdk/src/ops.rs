//! The generated operations, realized over raw memory.
//!
//! Every function mirrors the C backend statement for statement, including
//! its failure behavior: null inputs, failed allocations, out-of-range
//! indices and size mismatches return `false`, null or 0 and leave the
//! instance as it was.

use std::{mem, ptr, slice};

use brine_struct_compiler::plan::{CtorArg, FieldPlan, FieldShape, GetPolicy, StructPlan};
use brine_struct_schema::{normalize, ByteOrder, Scalar, ScalarType, WireReader, WireWriter, LENGTH_PREFIX_SIZE};

use crate::runtime::{arg_ptr, arg_u64, arg_scalar, Arg, NativeModule};

const PTR_SIZE: usize = mem::size_of::<usize>();

unsafe fn load_u64(base: *const u8, offset: usize) -> u64 {
    (base.add(offset) as *const u64).read_unaligned()
}

unsafe fn store_u64(base: *mut u8, offset: usize, value: u64) {
    (base.add(offset) as *mut u64).write_unaligned(value)
}

unsafe fn load_ptr(base: *const u8, offset: usize) -> *mut u8 {
    (base.add(offset) as *const *mut u8).read_unaligned()
}

unsafe fn store_ptr(base: *mut u8, offset: usize, value: *mut u8) {
    (base.add(offset) as *mut *mut u8).write_unaligned(value)
}

/// Reads the normalized length prefix at the start of a wire buffer.
pub(crate) unsafe fn read_wire_u64(buffer: *const u8) -> u64 {
    let mut raw = [0u8; 8];
    ptr::copy_nonoverlapping(buffer, raw.as_mut_ptr(), 8);
    normalize(&mut raw, ByteOrder::host());
    u64::from_ne_bytes(raw)
}

/// Bytes of `count` elements, or `None` when that does not fit in memory.
fn array_bytes(element: ScalarType, count: u64) -> Option<usize> {
    usize::try_from(count).ok()?.checked_mul(element.width())
}

fn slot_size(shape: &FieldShape) -> usize {
    match shape {
        FieldShape::Scalar(ty) => ty.width(),
        FieldShape::Count { .. } => 8,
        FieldShape::Array { .. } | FieldShape::Nested { .. } => PTR_SIZE,
    }
}

impl NativeModule {
    fn alloc_zeroed_struct(&self, plan: &StructPlan) -> *mut u8 {
        let this = self.allocator.malloc(plan.size.max(1));
        if !this.is_null() {
            unsafe { this.write_bytes(0, plan.size) };
        }
        this
    }

    /// Deep copy through the wire format, as the C getters and setters do.
    unsafe fn copy_struct(&self, plan: &StructPlan, this: *mut u8) -> *mut u8 {
        let wire = self.serialize(plan, this);
        if wire.is_null() {
            return ptr::null_mut();
        }
        let copy = self.deserialize_raw(plan, wire);
        self.allocator.free(wire);
        copy
    }

    pub(crate) unsafe fn get_field(&self, plan: &FieldPlan, policy: GetPolicy, this: *mut u8, out: *mut u8) -> bool {
        if this.is_null() || out.is_null() {
            return false;
        }
        let offset = plan.slot.offset;
        match (policy, &plan.shape) {
            (GetPolicy::CopyArray, FieldShape::Array { element, count }) => {
                let Some(size) = array_bytes(*element, load_u64(this, count.offset)) else {
                    return false;
                };
                let copy = self.allocator.malloc(size.max(1));
                if copy.is_null() {
                    return false;
                }
                if size > 0 {
                    ptr::copy_nonoverlapping(load_ptr(this, offset), copy, size);
                }
                store_ptr(out, 0, copy);
                true
            }
            (GetPolicy::CopyStruct, FieldShape::Nested { id, .. }) => {
                let nested = load_ptr(this, offset);
                if nested.is_null() {
                    store_ptr(out, 0, ptr::null_mut());
                    return true;
                }
                let Some(nested_plan) = self.plan_by_id(*id) else {
                    return false;
                };
                let copy = self.copy_struct(nested_plan, nested);
                if copy.is_null() {
                    return false;
                }
                store_ptr(out, 0, copy);
                true
            }
            (_, shape) => {
                ptr::copy_nonoverlapping(this.add(offset), out, slot_size(shape));
                true
            }
        }
    }

    pub(crate) unsafe fn get_item(&self, plan: &FieldPlan, this: *mut u8, index: u64, out: *mut u8) -> bool {
        let FieldShape::Array { element, count } = &plan.shape else {
            return false;
        };
        if this.is_null() || out.is_null() {
            return false;
        }
        if index >= load_u64(this, count.offset) {
            return false;
        }
        let data = load_ptr(this, plan.slot.offset);
        let width = element.width();
        ptr::copy_nonoverlapping(data.add(index as usize * width), out, width);
        true
    }

    pub(crate) unsafe fn set_scalar(&self, plan: &FieldPlan, this: *mut u8, value: Option<Scalar>) -> bool {
        let FieldShape::Scalar(ty) = plan.shape else {
            return false;
        };
        match value {
            Some(value) if !this.is_null() && value.ty() == ty => {
                value.write_to(this.add(plan.slot.offset));
                true
            }
            _ => false,
        }
    }

    /// Replaces the array contents: a fresh buffer when there is none, the
    /// same buffer for an equal count, a reallocated one otherwise.
    pub(crate) unsafe fn set_array(&self, plan: &FieldPlan, this: *mut u8, data: *mut u8, count: u64) -> bool {
        let FieldShape::Array { element, count: count_slot } = &plan.shape else {
            return false;
        };
        if this.is_null() {
            return false;
        }
        if count > 0 && data.is_null() {
            return false;
        }
        let Some(size) = array_bytes(*element, count) else {
            return false;
        };
        let offset = plan.slot.offset;
        let current = load_ptr(this, offset);
        if current.is_null() {
            let buffer = self.allocator.malloc(size.max(1));
            if buffer.is_null() {
                return false;
            }
            store_ptr(this, offset, buffer);
        } else if load_u64(this, count_slot.offset) != count {
            let buffer = self.allocator.realloc(current, size.max(1));
            if buffer.is_null() {
                return false;
            }
            store_ptr(this, offset, buffer);
        }
        store_u64(this, count_slot.offset, count);
        if size > 0 {
            ptr::copy(data, load_ptr(this, offset), size);
        }
        true
    }

    /// Resizes the paired array. The count is written before the
    /// reallocation and put back right after it, before the result is checked.
    pub(crate) unsafe fn set_count(&self, plan: &FieldPlan, this: *mut u8, count: u64) -> bool {
        let FieldShape::Count { data, element } = &plan.shape else {
            return false;
        };
        if this.is_null() || count == 0 {
            return false;
        }
        let Some(size) = array_bytes(*element, count) else {
            return false;
        };
        let offset = plan.slot.offset;
        let old_count = load_u64(this, offset);
        store_u64(this, offset, count);
        let buffer = self.allocator.realloc(load_ptr(this, data.offset), size);
        store_u64(this, offset, old_count);
        if buffer.is_null() {
            return false;
        }
        if count > old_count {
            let width = element.width();
            let kept = old_count as usize * width;
            buffer.add(kept).write_bytes(0, size - kept);
        }
        store_ptr(this, data.offset, buffer);
        store_u64(this, offset, count);
        true
    }

    pub(crate) unsafe fn set_struct(&self, plan: &FieldPlan, this: *mut u8, value: *mut u8) -> bool {
        let FieldShape::Nested { id, .. } = &plan.shape else {
            return false;
        };
        if this.is_null() || value.is_null() {
            return false;
        }
        let Some(nested_plan) = self.plan_by_id(*id) else {
            return false;
        };
        let copy = self.copy_struct(nested_plan, value);
        if copy.is_null() {
            return false;
        }
        store_ptr(this, plan.slot.offset, copy);
        true
    }

    pub(crate) unsafe fn set_item(&self, plan: &FieldPlan, this: *mut u8, index: u64, value: Option<Scalar>) -> bool {
        let FieldShape::Array { element, count } = &plan.shape else {
            return false;
        };
        let Some(value) = value.filter(|v| v.ty() == *element) else {
            return false;
        };
        if this.is_null() {
            return false;
        }
        if index >= load_u64(this, count.offset) {
            return false;
        }
        let data = load_ptr(this, plan.slot.offset);
        value.write_to(data.add(index as usize * element.width()));
        true
    }

    /// Writes one field's wire payload. Returns the bytes written, 0 on failure.
    unsafe fn serialize_field(&self, plan: &FieldPlan, this: *mut u8, out: &mut WireWriter) -> u64 {
        let offset = plan.slot.offset;
        match &plan.shape {
            FieldShape::Scalar(ty) => {
                let value = Scalar::read_from(*ty, this.add(offset));
                match out.write_scalar(value) {
                    Ok(()) => ty.width() as u64,
                    Err(_) => 0,
                }
            }
            FieldShape::Array { element, count } => {
                let n = load_u64(this, count.offset);
                let data = load_ptr(this, offset);
                if out.write_u64(n).is_err() {
                    return 0;
                }
                let width = element.width();
                for i in 0..n as usize {
                    let value = Scalar::read_from(*element, data.add(i * width));
                    if out.write_scalar(value).is_err() {
                        return 0;
                    }
                }
                LENGTH_PREFIX_SIZE as u64 + n * width as u64
            }
            FieldShape::Nested { id, .. } => {
                let nested = load_ptr(this, offset);
                if nested.is_null() {
                    return match out.write_u64(0) {
                        Ok(()) => LENGTH_PREFIX_SIZE as u64,
                        Err(_) => 0,
                    };
                }
                let Some(nested_plan) = self.plan_by_id(*id) else {
                    return 0;
                };
                let wire = self.serialize(nested_plan, nested);
                if wire.is_null() {
                    return 0;
                }
                let size = read_wire_u64(wire);
                let written = out.write_bytes(slice::from_raw_parts(wire, size as usize));
                self.allocator.free(wire);
                match written {
                    Ok(()) => size,
                    Err(_) => 0,
                }
            }
            // Travels inside its array
            FieldShape::Count { .. } => 0,
        }
    }

    /// Reads one field's wire payload. Returns the bytes consumed, 0 on failure.
    unsafe fn deserialize_field(&self, plan: &FieldPlan, this: *mut u8, input: &mut WireReader) -> u64 {
        let offset = plan.slot.offset;
        match &plan.shape {
            FieldShape::Scalar(ty) => match input.read_scalar(*ty) {
                Ok(value) => {
                    value.write_to(this.add(offset));
                    ty.width() as u64
                }
                Err(_) => 0,
            },
            FieldShape::Array { element, count } => {
                let Ok(n) = input.read_u64() else {
                    return 0;
                };
                let Some(size) = array_bytes(*element, n) else {
                    return 0;
                };
                if size > input.data().len() - input.index() {
                    return 0;
                }
                let data = self.allocator.malloc(size.max(1));
                if data.is_null() {
                    return 0;
                }
                let width = element.width();
                for i in 0..n as usize {
                    match input.read_scalar(*element) {
                        Ok(value) => value.write_to(data.add(i * width)),
                        Err(_) => {
                            self.allocator.free(data);
                            return 0;
                        }
                    }
                }
                store_ptr(this, offset, data);
                store_u64(this, count.offset, n);
                (LENGTH_PREFIX_SIZE + size) as u64
            }
            FieldShape::Nested { id, .. } => {
                let start = input.index();
                let Ok(size) = input.read_u64() else {
                    return 0;
                };
                if size == 0 {
                    store_ptr(this, offset, ptr::null_mut());
                    return LENGTH_PREFIX_SIZE as u64;
                }
                let Some(nested_plan) = self.plan_by_id(*id) else {
                    return 0;
                };
                let end = match usize::try_from(size).ok().and_then(|s| start.checked_add(s)) {
                    Some(end) if end <= input.data().len() && size >= LENGTH_PREFIX_SIZE as u64 => end,
                    _ => return 0,
                };
                let nested = self.deserialize_slice(nested_plan, &input.data()[start..end]);
                if nested.is_null() {
                    return 0;
                }
                if input.read_bytes(end - input.index()).is_err() {
                    self.discard(nested_plan, nested);
                    return 0;
                }
                store_ptr(this, offset, nested);
                size
            }
            FieldShape::Count { .. } => 0,
        }
    }

    fn member_plan(&self, symbol: Option<&str>) -> Option<&FieldPlan> {
        self.field_function(symbol?).map(|(plan, _)| plan)
    }

    pub(crate) unsafe fn create(&self, plan: &StructPlan, args: &[Arg]) -> *mut u8 {
        let this = self.alloc_zeroed_struct(plan);
        if this.is_null() {
            return this;
        }
        let mut args = args.iter();
        for ctor_arg in &plan.ctor_args {
            match ctor_arg {
                CtorArg::Scalar { slot, .. } => match args.next().and_then(arg_scalar) {
                    Some(value) => value.write_to(this.add(slot.offset)),
                    None => {
                        self.discard(plan, this);
                        return ptr::null_mut();
                    }
                },
                CtorArg::Array { slot, element, count } => {
                    let data = args.next().map(arg_ptr).unwrap_or(ptr::null_mut());
                    let n = args.next().map(arg_u64).unwrap_or(0);
                    if n > 0 && data.is_null() {
                        self.discard(plan, this);
                        return ptr::null_mut();
                    }
                    let Some(size) = array_bytes(*element, n) else {
                        self.discard(plan, this);
                        return ptr::null_mut();
                    };
                    let buffer = self.allocator.malloc(size.max(1));
                    if buffer.is_null() {
                        self.discard(plan, this);
                        return ptr::null_mut();
                    }
                    if size > 0 {
                        ptr::copy_nonoverlapping(data, buffer, size);
                    }
                    store_ptr(this, slot.offset, buffer);
                    store_u64(this, count.offset, n);
                }
                CtorArg::Nested { slot, id, .. } => {
                    let value = args.next().map(arg_ptr).unwrap_or(ptr::null_mut());
                    if value.is_null() {
                        continue;
                    }
                    let copy = match self.plan_by_id(*id) {
                        Some(nested_plan) => self.copy_struct(nested_plan, value),
                        None => ptr::null_mut(),
                    };
                    if copy.is_null() {
                        self.discard(plan, this);
                        return ptr::null_mut();
                    }
                    store_ptr(this, slot.offset, copy);
                }
            }
        }
        this
    }

    /// Frees array buffers and the instance. Nested structs belong to the
    /// caller and are left alone.
    pub(crate) unsafe fn destroy(&self, plan: &StructPlan, this: *mut u8) {
        if this.is_null() {
            return;
        }
        for m in &plan.members {
            if let FieldShape::Array { .. } = m.shape {
                self.allocator.free(load_ptr(this, m.slot.offset));
            }
        }
        self.allocator.free(this);
    }

    /// Like `destroy`, but also releases nested structs. Used on instances
    /// the runtime built itself and never handed out.
    pub(crate) unsafe fn discard(&self, plan: &StructPlan, this: *mut u8) {
        if this.is_null() {
            return;
        }
        for m in &plan.members {
            match &m.shape {
                FieldShape::Array { .. } => self.allocator.free(load_ptr(this, m.slot.offset)),
                FieldShape::Nested { id, .. } => {
                    if let Some(nested_plan) = self.plan_by_id(*id) {
                        self.discard(nested_plan, load_ptr(this, m.slot.offset));
                    }
                }
                _ => {}
            }
        }
        self.allocator.free(this);
    }

    pub(crate) unsafe fn wire_size(&self, plan: &StructPlan, this: *mut u8) -> u64 {
        let mut size = LENGTH_PREFIX_SIZE as u64;
        for m in plan.wire_members() {
            size += match &m.shape {
                FieldShape::Scalar(ty) => ty.width() as u64,
                FieldShape::Array { element, count } => {
                    LENGTH_PREFIX_SIZE as u64 + element.width() as u64 * load_u64(this, count.offset)
                }
                FieldShape::Nested { id, .. } => {
                    let nested = load_ptr(this, m.slot.offset);
                    match self.plan_by_id(*id) {
                        Some(nested_plan) if !nested.is_null() => self.wire_size(nested_plan, nested),
                        _ => LENGTH_PREFIX_SIZE as u64,
                    }
                }
                FieldShape::Count { .. } => 0,
            };
        }
        size
    }

    pub(crate) unsafe fn serialize(&self, plan: &StructPlan, this: *mut u8) -> *mut u8 {
        if this.is_null() {
            return ptr::null_mut();
        }
        let total = self.wire_size(plan, this);
        let Ok(len) = usize::try_from(total) else {
            return ptr::null_mut();
        };
        let buffer = self.allocator.malloc(len);
        if buffer.is_null() {
            return buffer;
        }
        let mut out = WireWriter::new(slice::from_raw_parts_mut(buffer, len));
        let mut ok = out.write_u64(total).is_ok();
        for m in plan.wire_members() {
            if !ok {
                break;
            }
            ok = match self.member_plan(m.serializer.as_deref()) {
                Some(field) => self.serialize_field(field, this, &mut out) != 0,
                None => false,
            };
        }
        if !ok {
            self.allocator.free(buffer);
            return ptr::null_mut();
        }
        buffer
    }

    /// Deserializes from a raw buffer, trusting its length prefix.
    pub(crate) unsafe fn deserialize_raw(&self, plan: &StructPlan, buffer: *mut u8) -> *mut u8 {
        if buffer.is_null() {
            return ptr::null_mut();
        }
        let expected = read_wire_u64(buffer);
        let Ok(len) = usize::try_from(expected) else {
            return ptr::null_mut();
        };
        if len < LENGTH_PREFIX_SIZE {
            return ptr::null_mut();
        }
        self.deserialize_slice(plan, slice::from_raw_parts(buffer, len))
    }

    /// Deserializes from `bytes`, which must hold the whole serialization.
    pub(crate) unsafe fn deserialize_slice(&self, plan: &StructPlan, bytes: &[u8]) -> *mut u8 {
        let mut input = WireReader::new(bytes);
        let Ok(expected) = input.read_u64() else {
            return ptr::null_mut();
        };
        let Some(claimed) = usize::try_from(expected).ok().filter(|&len| len <= bytes.len()) else {
            return ptr::null_mut();
        };
        let mut input = WireReader::new(&bytes[..claimed]);
        if input.read_u64().is_err() {
            return ptr::null_mut();
        }

        let this = self.alloc_zeroed_struct(plan);
        if this.is_null() {
            return this;
        }
        for m in plan.wire_members() {
            let read = match self.member_plan(m.deserializer.as_deref()) {
                Some(field) => self.deserialize_field(field, this, &mut input),
                None => 0,
            };
            if read == 0 {
                self.discard(plan, this);
                return ptr::null_mut();
            }
        }
        if self.wire_size(plan, this) != expected {
            self.discard(plan, this);
            return ptr::null_mut();
        }
        this
    }
}
