// example/src/main.rs

use brine_struct::{decode_to_json, Arg, NativeModule, Ret, RuntimeError};
use brine_struct_compiler::{compile_module_to_c, compile_schema, CompileOptions};
use brine_struct_schema::Scalar;

const SCHEMA: &str = include_str!("../test.bst");

/// Calls a generated function that reports success as a `bool`.
unsafe fn check(native: &NativeModule, symbol: &str, args: &[Arg]) -> Result<(), RuntimeError> {
    match native.call(symbol, args)? {
        Ret::Bool(true) => Ok(()),
        other => Err(RuntimeError::Decode(format!("{} returned {:?}", symbol, other))),
    }
}

/// Calls a generated function that returns a pointer, rejecting null.
unsafe fn instance(native: &NativeModule, symbol: &str, args: &[Arg]) -> Result<*mut u8, RuntimeError> {
    match native.call(symbol, args)? {
        Ret::Ptr(p) if !p.is_null() => Ok(p),
        other => Err(RuntimeError::Decode(format!("{} returned {:?}", symbol, other))),
    }
}

fn main() -> Result<(), RuntimeError> {
    let module = compile_schema(SCHEMA, &CompileOptions { module_name: "test".into(), ..Default::default() })?;

    for s in module.structs() {
        println!("struct {} (size {}, align {})", s.name(), s.size(), s.align());
        for f in s.fields() {
            println!("  {:>3}  {}", f.byte_offset, f.name);
        }
    }

    let c = compile_module_to_c(&module)?;
    println!("{} declares {} lines", c.header_name, c.header.lines().count());

    let native = NativeModule::load(&module)?;
    unsafe {
        let test = instance(&native, "create_Test", &[Arg::Scalar(Scalar::Int16(42))])?;
        check(&native, "set_Test_f", &[Arg::Ptr(test), Arg::Scalar(Scalar::Float(0.25))])?;

        let mut values = [3, 1, 4, 1, 5];
        check(
            &native,
            "set_Test_arr",
            &[Arg::Ptr(test), Arg::ptr(values.as_mut_ptr()), Arg::U64(values.len() as u64)],
        )?;
        check(&native, "set_Test_arr_item", &[Arg::Ptr(test), Arg::U64(4), Arg::Scalar(Scalar::Int32(9))])?;
        check(&native, "set_Test_arr_count", &[Arg::Ptr(test), Arg::U64(7)])?;

        let color = instance(
            &native,
            "create_Color",
            &[
                Arg::Scalar(Scalar::UInt8(10)),
                Arg::Scalar(Scalar::UInt8(20)),
                Arg::Scalar(Scalar::UInt8(30)),
            ],
        )?;
        check(&native, "set_Color_alpha", &[Arg::Ptr(color), Arg::Scalar(Scalar::UInt8(255))])?;
        check(&native, "set_Test_tint", &[Arg::Ptr(test), Arg::Ptr(color)])?;
        native.call("destroy_Color", &[Arg::Ptr(color)])?;

        let bytes = native
            .serialize_to_vec("Test", test)?
            .ok_or_else(|| RuntimeError::Decode("serialize_Test failed".to_string()))?;
        println!("serialized {} bytes", bytes.len());
        println!("{}", decode_to_json(&module, "Test", &bytes)?);

        let copy = native.deserialize_from_slice("Test", &bytes)?;
        println!("copy = {:?}", native.snapshot("Test", copy)?);

        // destroy is shallow: the nested tints are ours to free
        for this in [test, copy] {
            let mut tint: *mut u8 = std::ptr::null_mut();
            check(&native, "get_Test_tint", &[Arg::Ptr(this), Arg::ptr(&mut tint as *mut *mut u8)])?;
            native.call("destroy_Color", &[Arg::Ptr(tint)])?;
            native.call("destroy_Test", &[Arg::Ptr(this)])?;
        }
    }

    Ok(())
}
