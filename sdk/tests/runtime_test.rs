#![cfg(test)]

use std::{
    ptr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use brine_struct::{
    compile_schema,
    Allocator,
    Arg,
    CompileOptions,
    NativeModule,
    Ret,
    RuntimeError,
    Scalar,
    SystemAllocator,
    Value,
};

const TEST_SCHEMA: &str = "struct Test { mutable float f; int16 n; mutable repeated int32 arr; }";

/// System allocator that counts calls and can be told to fail.
#[derive(Default)]
struct CountingAllocator {
    mallocs:      AtomicUsize,
    reallocs:     AtomicUsize,
    frees:        AtomicUsize,
    fail_malloc:  AtomicBool,
    fail_realloc: AtomicBool,
}

unsafe impl Allocator for CountingAllocator {
    fn malloc(&self, size: usize) -> *mut u8 {
        self.mallocs.fetch_add(1, Ordering::SeqCst);
        if self.fail_malloc.load(Ordering::SeqCst) {
            return ptr::null_mut();
        }
        SystemAllocator.malloc(size)
    }

    unsafe fn realloc(&self, p: *mut u8, size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::SeqCst);
        if self.fail_realloc.load(Ordering::SeqCst) {
            return ptr::null_mut();
        }
        SystemAllocator.realloc(p, size)
    }

    unsafe fn free(&self, p: *mut u8) {
        if !p.is_null() {
            self.frees.fetch_add(1, Ordering::SeqCst);
        }
        SystemAllocator.free(p)
    }
}

impl CountingAllocator {
    fn counts(&self) -> (usize, usize, usize) {
        (
            self.mallocs.load(Ordering::SeqCst),
            self.reallocs.load(Ordering::SeqCst),
            self.frees.load(Ordering::SeqCst),
        )
    }
}

fn load(schema: &str) -> NativeModule {
    let module = compile_schema(schema, &CompileOptions::default()).expect("compile_schema failed");
    NativeModule::load(&module).expect("load failed")
}

fn load_counting(schema: &str) -> (NativeModule, Arc<CountingAllocator>) {
    let module = compile_schema(schema, &CompileOptions::default()).expect("compile_schema failed");
    let allocator = Arc::new(CountingAllocator::default());
    let native = NativeModule::load_with(&module, allocator.clone()).expect("load failed");
    (native, allocator)
}

unsafe fn call_bool(native: &NativeModule, symbol: &str, args: &[Arg]) -> bool {
    native.call(symbol, args).unwrap().as_bool().unwrap()
}

unsafe fn call_ptr(native: &NativeModule, symbol: &str, args: &[Arg]) -> *mut u8 {
    native.call(symbol, args).unwrap().as_ptr().unwrap()
}

unsafe fn create_test(native: &NativeModule, n: i16) -> *mut u8 {
    let this = call_ptr(native, "create_Test", &[Arg::Scalar(Scalar::Int16(n))]);
    assert!(!this.is_null());
    this
}

unsafe fn set_arr(native: &NativeModule, this: *mut u8, values: &mut [i32]) -> bool {
    call_bool(
        native,
        "set_Test_arr",
        &[Arg::Ptr(this), Arg::ptr(values.as_mut_ptr()), Arg::U64(values.len() as u64)],
    )
}

unsafe fn arr_count(native: &NativeModule, this: *mut u8) -> u64 {
    let mut count = 0u64;
    assert!(call_bool(native, "get_Test_arr_count", &[Arg::Ptr(this), Arg::ptr(&mut count as *mut u64)]));
    count
}

unsafe fn arr_items(native: &NativeModule, this: *mut u8) -> Vec<i32> {
    let count = arr_count(native, this);
    (0..count)
        .map(|i| {
            let mut out = 0i32;
            assert!(call_bool(native, "get_Test_arr_item", &[Arg::Ptr(this), Arg::U64(i), Arg::ptr(&mut out as *mut i32)]));
            out
        })
        .collect()
}

#[test]
fn test_scenario() {
    let native = load(TEST_SCHEMA);
    unsafe {
        let t = create_test(&native, 7);

        // Mutable scalar
        assert!(call_bool(&native, "set_Test_f", &[Arg::Ptr(t), Arg::Scalar(Scalar::Float(1.5))]));
        let mut f = 0f32;
        assert!(call_bool(&native, "get_Test_f", &[Arg::Ptr(t), Arg::ptr(&mut f as *mut f32)]));
        assert_eq!(f, 1.5);

        // Immutable scalar: getter only
        let mut n = 0i16;
        assert!(call_bool(&native, "get_Test_n", &[Arg::Ptr(t), Arg::ptr(&mut n as *mut i16)]));
        assert_eq!(n, 7);
        assert!(matches!(
            native.call("set_Test_n", &[Arg::Ptr(t), Arg::Scalar(Scalar::Int16(1))]),
            Err(RuntimeError::UnknownSymbol(_))
        ));

        // Mutable array starts empty
        assert_eq!(arr_count(&native, t), 0);
        let mut values = [1, 2, 3];
        assert!(set_arr(&native, t, &mut values));
        assert_eq!(arr_items(&native, t), vec![1, 2, 3]);

        assert!(call_bool(&native, "set_Test_arr_item", &[Arg::Ptr(t), Arg::U64(1), Arg::Scalar(Scalar::Int32(20))]));
        assert_eq!(arr_items(&native, t), vec![1, 20, 3]);

        // Live getter hands out the stored buffer
        let mut live: *mut i32 = ptr::null_mut();
        assert!(call_bool(&native, "get_Test_arr", &[Arg::Ptr(t), Arg::ptr(&mut live as *mut *mut i32)]));
        assert_eq!(*live.add(1), 20);

        // Growing through the count setter zero-fills
        assert!(call_bool(&native, "set_Test_arr_count", &[Arg::Ptr(t), Arg::U64(5)]));
        assert_eq!(arr_items(&native, t), vec![1, 20, 3, 0, 0]);

        let bytes = native.serialize_to_vec("Test", t).unwrap().unwrap();
        assert_eq!(bytes.len(), 8 + 2 + 4 + 8 + 5 * 4);
        assert_eq!(&bytes[..8], &(bytes.len() as u64).to_le_bytes());
        assert_eq!(&bytes[8..10], &7i16.to_le_bytes());
        assert_eq!(&bytes[10..14], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[14..22], &5u64.to_le_bytes());

        let copy = native.deserialize_from_slice("Test", &bytes).unwrap();
        assert!(!copy.is_null());
        assert_eq!(native.snapshot("Test", copy).unwrap(), native.snapshot("Test", t).unwrap());
        assert_eq!(format!("{:?}", native.snapshot("Test", copy).unwrap()), "Test { n: 7, f: 1.5, arr: [1, 20, 3, 0, 0] }");

        native.call("destroy_Test", &[Arg::Ptr(copy)]).unwrap();
        native.call("destroy_Test", &[Arg::Ptr(t)]).unwrap();
    }
}

#[test]
fn test_bounds() {
    let native = load(TEST_SCHEMA);
    unsafe {
        let t = create_test(&native, 1);
        let mut out = 0i32;
        let out_ptr = Arg::ptr(&mut out as *mut i32);
        assert!(!call_bool(&native, "get_Test_arr_item", &[Arg::Ptr(t), Arg::U64(0), out_ptr]));

        let mut values = [4, 5];
        assert!(set_arr(&native, t, &mut values));
        assert!(call_bool(&native, "get_Test_arr_item", &[Arg::Ptr(t), Arg::U64(1), out_ptr]));
        assert!(!call_bool(&native, "get_Test_arr_item", &[Arg::Ptr(t), Arg::U64(2), out_ptr]));
        assert!(!call_bool(&native, "get_Test_arr_item", &[Arg::Ptr(t), Arg::U64(u64::MAX), out_ptr]));
        assert!(!call_bool(&native, "set_Test_arr_item", &[Arg::Ptr(t), Arg::U64(2), Arg::Scalar(Scalar::Int32(9))]));
        assert!(!call_bool(&native, "get_Test_arr_item", &[Arg::Ptr(t), Arg::U64(0), Arg::Ptr(ptr::null_mut())]));
        assert_eq!(arr_items(&native, t), vec![4, 5]);

        // Zero is not a valid count
        assert!(!call_bool(&native, "set_Test_arr_count", &[Arg::Ptr(t), Arg::U64(0)]));
        assert_eq!(arr_count(&native, t), 2);

        native.call("destroy_Test", &[Arg::Ptr(t)]).unwrap();
    }
}

#[test]
fn test_growable_array_paths() {
    let (native, allocator) = load_counting(TEST_SCHEMA);
    unsafe {
        let t = create_test(&native, 0);
        let (m0, r0, _) = allocator.counts();

        // Fresh buffer
        let mut three = [1, 2, 3];
        assert!(set_arr(&native, t, &mut three));
        assert_eq!(allocator.counts().0, m0 + 1);
        assert_eq!(allocator.counts().1, r0);

        // Same count reuses the buffer
        let mut other = [7, 8, 9];
        assert!(set_arr(&native, t, &mut other));
        assert_eq!(allocator.counts().0, m0 + 1);
        assert_eq!(allocator.counts().1, r0);
        assert_eq!(arr_items(&native, t), vec![7, 8, 9]);

        // Different count reallocates
        let mut five = [1, 1, 2, 3, 5];
        assert!(set_arr(&native, t, &mut five));
        assert_eq!(allocator.counts().1, r0 + 1);
        assert_eq!(arr_count(&native, t), 5);

        // Shrinking works the same way
        let mut two = [6, 6];
        assert!(set_arr(&native, t, &mut two));
        assert_eq!(arr_items(&native, t), vec![6, 6]);

        // Failed realloc keeps buffer and count
        allocator.fail_realloc.store(true, Ordering::SeqCst);
        let mut four = [0, 0, 0, 0];
        assert!(!set_arr(&native, t, &mut four));
        assert_eq!(arr_items(&native, t), vec![6, 6]);
        allocator.fail_realloc.store(false, Ordering::SeqCst);

        // Null data with a non-zero count is refused
        assert!(!call_bool(&native, "set_Test_arr", &[Arg::Ptr(t), Arg::Ptr(ptr::null_mut()), Arg::U64(2)]));

        native.call("destroy_Test", &[Arg::Ptr(t)]).unwrap();
    }
}

#[test]
fn test_count_setter_failure_restores_count() {
    let (native, allocator) = load_counting(TEST_SCHEMA);
    unsafe {
        let t = create_test(&native, 0);
        let mut values = [1, 2];
        assert!(set_arr(&native, t, &mut values));

        allocator.fail_realloc.store(true, Ordering::SeqCst);
        assert!(!call_bool(&native, "set_Test_arr_count", &[Arg::Ptr(t), Arg::U64(10)]));
        allocator.fail_realloc.store(false, Ordering::SeqCst);
        assert_eq!(arr_items(&native, t), vec![1, 2]);

        assert!(call_bool(&native, "set_Test_arr_count", &[Arg::Ptr(t), Arg::U64(1)]));
        assert_eq!(arr_items(&native, t), vec![1]);

        native.call("destroy_Test", &[Arg::Ptr(t)]).unwrap();
    }
}

#[test]
fn test_endianness() {
    let native = load("struct E { int32 v; }");
    unsafe {
        let e = call_ptr(&native, "create_E", &[Arg::Scalar(Scalar::Int32(5))]);
        let bytes = native.serialize_to_vec("E", e).unwrap().unwrap();
        assert_eq!(bytes, vec![12, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0]);
        native.call("destroy_E", &[Arg::Ptr(e)]).unwrap();
    }
}

#[test]
fn test_corrupted_length_prefix() {
    let native = load(TEST_SCHEMA);
    unsafe {
        let t = create_test(&native, 3);
        let mut values = [1, 2, 3];
        assert!(set_arr(&native, t, &mut values));
        let mut bytes = native.serialize_to_vec("Test", t).unwrap().unwrap();
        native.call("destroy_Test", &[Arg::Ptr(t)]).unwrap();

        bytes[0] += 1;
        assert!(native.deserialize_from_slice("Test", &bytes).unwrap().is_null());

        // Through the raw entry point, with room for the claimed length
        bytes.push(0);
        let raw = call_ptr(&native, "deserialize_Test", &[Arg::ptr(bytes.as_mut_ptr())]);
        assert!(raw.is_null());

        bytes.pop();
        bytes[0] -= 1;
        let ok = call_ptr(&native, "deserialize_Test", &[Arg::ptr(bytes.as_mut_ptr())]);
        assert!(!ok.is_null());
        native.call("destroy_Test", &[Arg::Ptr(ok)]).unwrap();
    }
}

#[test]
fn test_constructor_copies_immutable_arrays() {
    let (native, allocator) = load_counting("struct Imm { repeated uint16 xs; uint8 tag; }");
    unsafe {
        let mut source = [10u16, 20, 30];
        let imm = call_ptr(
            &native,
            "create_Imm",
            &[Arg::Scalar(Scalar::UInt8(1)), Arg::ptr(source.as_mut_ptr()), Arg::U64(3)],
        );
        assert!(!imm.is_null());
        source[0] = 99;

        // Copying getter: a new caller-owned buffer every call
        let mut first: *mut u16 = ptr::null_mut();
        let mut second: *mut u16 = ptr::null_mut();
        assert!(call_bool(&native, "get_Imm_xs", &[Arg::Ptr(imm), Arg::ptr(&mut first as *mut *mut u16)]));
        assert!(call_bool(&native, "get_Imm_xs", &[Arg::Ptr(imm), Arg::ptr(&mut second as *mut *mut u16)]));
        assert_ne!(first, second);
        assert_eq!(std::slice::from_raw_parts(first, 3), &[10, 20, 30]);
        *first = 0;
        assert_eq!(*second, 10);
        native.free(first as *mut u8);
        native.free(second as *mut u8);

        // No setters on immutable arrays
        assert!(native.signature("set_Imm_xs").is_none());
        assert!(native.signature("set_Imm_xs_item").is_none());

        // Null data with a count fails construction without leaking
        let (m, _, f) = allocator.counts();
        let null = call_ptr(&native, "create_Imm", &[Arg::Scalar(Scalar::UInt8(0)), Arg::Ptr(ptr::null_mut()), Arg::U64(2)]);
        assert!(null.is_null());
        let (m2, _, f2) = allocator.counts();
        assert_eq!(m2 - m, f2 - f);

        native.call("destroy_Imm", &[Arg::Ptr(imm)]).unwrap();
    }
}

#[test]
fn test_constructor_allocation_failure() {
    let (native, allocator) = load_counting(TEST_SCHEMA);
    allocator.fail_malloc.store(true, Ordering::SeqCst);
    let t = unsafe { call_ptr(&native, "create_Test", &[Arg::Scalar(Scalar::Int16(1))]) };
    assert!(t.is_null());
}

const NESTED_SCHEMA: &str = "
    struct Inner { mutable int32 v; }
    struct Outer { mutable Inner live; Inner frozen; }
";

unsafe fn inner_v(native: &NativeModule, inner: *mut u8) -> i32 {
    let mut v = 0i32;
    assert!(call_bool(native, "get_Inner_v", &[Arg::Ptr(inner), Arg::ptr(&mut v as *mut i32)]));
    v
}

unsafe fn get_nested(native: &NativeModule, symbol: &str, outer: *mut u8) -> *mut u8 {
    let mut out: *mut u8 = ptr::null_mut();
    assert!(call_bool(native, symbol, &[Arg::Ptr(outer), Arg::ptr(&mut out as *mut *mut u8)]));
    out
}

#[test]
fn test_destructor_is_shallow() {
    let (native, allocator) = load_counting(NESTED_SCHEMA);
    unsafe {
        let outer = call_ptr(&native, "create_Outer", &[Arg::Ptr(ptr::null_mut())]);
        let inner = call_ptr(&native, "create_Inner", &[]);
        assert!(call_bool(&native, "set_Inner_v", &[Arg::Ptr(inner), Arg::Scalar(Scalar::Int32(4))]));

        // The setter stores a copy, not the caller's instance
        assert!(call_bool(&native, "set_Outer_live", &[Arg::Ptr(outer), Arg::Ptr(inner)]));
        let stored = get_nested(&native, "get_Outer_live", outer);
        assert_ne!(stored, inner);
        assert_eq!(get_nested(&native, "get_Outer_live", outer), stored);
        assert_eq!(inner_v(&native, stored), 4);

        // Mutable getter is live
        assert!(call_bool(&native, "set_Inner_v", &[Arg::Ptr(stored), Arg::Scalar(Scalar::Int32(8))]));
        assert_eq!(inner_v(&native, get_nested(&native, "get_Outer_live", outer)), 8);
        assert_eq!(inner_v(&native, inner), 4);

        // Destroying the outer frees only the outer block
        let (_, _, frees) = allocator.counts();
        native.call("destroy_Outer", &[Arg::Ptr(outer)]).unwrap();
        assert_eq!(allocator.counts().2, frees + 1);
        assert_eq!(inner_v(&native, stored), 8);

        native.call("destroy_Inner", &[Arg::Ptr(stored)]).unwrap();
        native.call("destroy_Inner", &[Arg::Ptr(inner)]).unwrap();

        // Null is refused
        let outer = call_ptr(&native, "create_Outer", &[Arg::Ptr(ptr::null_mut())]);
        assert!(!call_bool(&native, "set_Outer_live", &[Arg::Ptr(outer), Arg::Ptr(ptr::null_mut())]));
        native.call("destroy_Outer", &[Arg::Ptr(outer)]).unwrap();
    }
}

#[test]
fn test_constructor_copies_nested_structs() {
    let (native, allocator) = load_counting(NESTED_SCHEMA);
    unsafe {
        let inner = call_ptr(&native, "create_Inner", &[]);
        assert!(call_bool(&native, "set_Inner_v", &[Arg::Ptr(inner), Arg::Scalar(Scalar::Int32(6))]));

        let outer = call_ptr(&native, "create_Outer", &[Arg::Ptr(inner)]);
        assert!(!outer.is_null());
        assert!(call_bool(&native, "set_Inner_v", &[Arg::Ptr(inner), Arg::Scalar(Scalar::Int32(7))]));

        let frozen = get_nested(&native, "get_Outer_frozen", outer);
        assert_ne!(frozen, inner);
        assert_eq!(inner_v(&native, frozen), 6);
        assert_eq!(
            format!("{:?}", native.snapshot("Outer", outer).unwrap()),
            "Outer { live: null, frozen: Inner { v: 6 } }"
        );
        native.call("destroy_Inner", &[Arg::Ptr(frozen)]).unwrap();

        // Out of memory yields null
        allocator.fail_malloc.store(true, Ordering::SeqCst);
        assert!(call_ptr(&native, "create_Outer", &[Arg::Ptr(inner)]).is_null());
        allocator.fail_malloc.store(false, Ordering::SeqCst);

        // Null stays null
        let empty = call_ptr(&native, "create_Outer", &[Arg::Ptr(ptr::null_mut())]);
        assert!(get_nested(&native, "get_Outer_frozen", empty).is_null());

        native.call("destroy_Outer", &[Arg::Ptr(empty)]).unwrap();
        native.call("destroy_Outer", &[Arg::Ptr(outer)]).unwrap();
        native.call("destroy_Inner", &[Arg::Ptr(inner)]).unwrap();
    }
}

fn inner_record(v: i32) -> Vec<u8> {
    let mut out = 12u64.to_le_bytes().to_vec();
    out.extend_from_slice(&v.to_le_bytes());
    out
}

#[test]
fn test_nested_wire_format_and_copies() {
    let native = load(NESTED_SCHEMA);
    let mut bytes = 32u64.to_le_bytes().to_vec();
    bytes.extend(inner_record(1));
    bytes.extend(inner_record(2));

    unsafe {
        let outer = native.deserialize_from_slice("Outer", &bytes).unwrap();
        assert!(!outer.is_null());
        assert_eq!(native.serialize_to_vec("Outer", outer).unwrap().unwrap(), bytes);

        // Immutable nested structs are handed out as fresh copies
        let a = get_nested(&native, "get_Outer_frozen", outer);
        let b = get_nested(&native, "get_Outer_frozen", outer);
        assert_ne!(a, b);
        assert!(call_bool(&native, "set_Inner_v", &[Arg::Ptr(a), Arg::Scalar(Scalar::Int32(50))]));
        assert_eq!(inner_v(&native, b), 2);
        assert_eq!(inner_v(&native, get_nested(&native, "get_Outer_frozen", outer)), 2);
        assert!(native.signature("set_Outer_frozen").is_none());

        let value = native.snapshot("Outer", outer).unwrap();
        assert_eq!(format!("{:?}", value), "Outer { live: Inner { v: 1 }, frozen: Inner { v: 2 } }");

        native.call("destroy_Inner", &[Arg::Ptr(a)]).unwrap();
        native.call("destroy_Inner", &[Arg::Ptr(b)]).unwrap();
    }
}

#[test]
fn test_null_nested_round_trip() {
    let native = load(NESTED_SCHEMA);
    unsafe {
        let outer = call_ptr(&native, "create_Outer", &[Arg::Ptr(ptr::null_mut())]);
        let bytes = native.serialize_to_vec("Outer", outer).unwrap().unwrap();
        let mut expected = 24u64.to_le_bytes().to_vec();
        expected.extend_from_slice(&[0; 16]);
        assert_eq!(bytes, expected);

        let copy = native.deserialize_from_slice("Outer", &bytes).unwrap();
        assert!(!copy.is_null());
        assert!(get_nested(&native, "get_Outer_live", copy).is_null());
        assert!(get_nested(&native, "get_Outer_frozen", copy).is_null());
        assert_eq!(native.snapshot("Outer", copy).unwrap().get("live"), Some(&Value::Null));

        native.call("destroy_Outer", &[Arg::Ptr(copy)]).unwrap();
        native.call("destroy_Outer", &[Arg::Ptr(outer)]).unwrap();
    }
}

#[test]
fn test_failed_nested_deserialize_releases_everything() {
    let (native, allocator) = load_counting(NESTED_SCHEMA);
    let mut bytes = 32u64.to_le_bytes().to_vec();
    bytes.extend(inner_record(1));
    let mut bad = inner_record(2);
    bad[0] = 13;
    bytes.extend(bad);

    let (m, _, f) = allocator.counts();
    let outer = native.deserialize_from_slice("Outer", &bytes).unwrap();
    assert!(outer.is_null());
    let (m2, _, f2) = allocator.counts();
    assert_eq!(m2 - m, f2 - f);
}

#[test]
fn test_argument_errors() {
    let native = load(TEST_SCHEMA);
    let err = unsafe { native.call("set_Test_f", &[Arg::Ptr(ptr::null_mut()), Arg::Scalar(Scalar::Double(1.0))]) };
    assert!(matches!(err, Err(RuntimeError::ArgumentMismatch { .. })));
    let err = unsafe { native.call("no_such_function", &[]) };
    assert!(matches!(err, Err(RuntimeError::UnknownSymbol(_))));
    assert_eq!(
        unsafe { native.call("destroy_Test", &[Arg::Ptr(ptr::null_mut())]) }.unwrap(),
        Ret::Void
    );
}
