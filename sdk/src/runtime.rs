use std::{collections::HashMap, ptr, sync::Arc};

use brine_struct_compiler::{
    emit,
    plan::{CType, FieldOp, FieldPlan, SetPolicy, Signature, StructOp, StructPlan},
    CodeEmitter,
    Module,
    StructError,
    StructId,
    Target,
};
use brine_struct_schema::{Scalar, Value};
use tracing::{debug, trace};

use crate::{
    alloc::{Allocator, SystemAllocator},
    decode::decode_value,
    error::RuntimeError,
};

/// An argument to a generated function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Scalar(Scalar),
    U64(u64),
    /// Struct instance, wire buffer, array buffer or out-parameter.
    Ptr(*mut u8),
}

impl Arg {
    pub fn ptr<T>(p: *mut T) -> Arg {
        Arg::Ptr(p as *mut u8)
    }
}

impl From<Scalar> for Arg {
    fn from(value: Scalar) -> Arg {
        Arg::Scalar(value)
    }
}

/// What a generated function returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ret {
    Void,
    Bool(bool),
    U64(u64),
    Ptr(*mut u8),
}

impl Ret {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Ret::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ptr(self) -> Option<*mut u8> {
        match self {
            Ret::Ptr(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_u64(self) -> Option<u64> {
        match self {
            Ret::U64(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Symbol {
    Field(usize, FieldOp),
    Struct(usize, StructOp),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    symbol:   Symbol,
    internal: bool,
}

/// Collects plans into a [`NativeModule`].
pub struct RuntimeEmitter {
    allocator: Arc<dyn Allocator>,
    fields:    Vec<FieldPlan>,
    structs:   Vec<StructPlan>,
    symbols:   HashMap<String, Entry>,
}

impl RuntimeEmitter {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        RuntimeEmitter {
            allocator,
            fields: Vec::new(),
            structs: Vec::new(),
            symbols: HashMap::new(),
        }
    }

    fn define(&mut self, name: &str, symbol: Symbol, internal: bool) -> Result<(), String> {
        if self.symbols.contains_key(name) {
            return Err(format!("symbol \"{}\" is generated twice", name));
        }
        self.symbols.insert(name.to_string(), Entry { symbol, internal });
        Ok(())
    }
}

impl CodeEmitter for RuntimeEmitter {
    type Output = NativeModule;

    fn emit_field(&mut self, _module: &Module, plan: &FieldPlan) -> Result<(), StructError> {
        let index = self.fields.len();
        for function in &plan.functions {
            self.define(&function.symbol, Symbol::Field(index, function.op), function.internal)
                .map_err(|msg| StructError::FieldCodegen {
                    struct_name: plan.struct_name.clone(),
                    field: plan.slot.name.clone(),
                    msg,
                })?;
        }
        self.fields.push(plan.clone());
        Ok(())
    }

    fn emit_struct(&mut self, _module: &Module, plan: &StructPlan) -> Result<(), StructError> {
        let index = self.structs.len();
        for function in &plan.functions {
            self.define(&function.symbol, Symbol::Struct(index, function.op), function.internal)
                .map_err(|msg| StructError::CodegenFailed(vec![format!("{}: {}", plan.name, msg)]))?;
        }
        self.structs.push(plan.clone());
        Ok(())
    }

    fn finish(self, module: &Module) -> Result<NativeModule, StructError> {
        let by_id = self.structs.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        Ok(NativeModule {
            module: module.clone(),
            allocator: self.allocator,
            fields: self.fields,
            structs: self.structs,
            by_id,
            symbols: self.symbols,
        })
    }
}

/// Every generated function of a module, realized in-process.
///
/// Instances, arrays and wire buffers live in memory from the module's
/// [`Allocator`] and are passed around as raw pointers, exactly as the C
/// functions would see them.
pub struct NativeModule {
    module:               Module,
    pub(crate) allocator: Arc<dyn Allocator>,
    pub(crate) fields:    Vec<FieldPlan>,
    pub(crate) structs:   Vec<StructPlan>,
    by_id:                HashMap<StructId, usize>,
    symbols:              HashMap<String, Entry>,
}

impl NativeModule {
    pub fn load(module: &Module) -> Result<NativeModule, RuntimeError> {
        Self::load_with(module, Arc::new(SystemAllocator))
    }

    /// Realizes a module whose memory comes from `allocator`. The module must
    /// be laid out for the host.
    pub fn load_with(module: &Module, allocator: Arc<dyn Allocator>) -> Result<NativeModule, RuntimeError> {
        let host = Target::host();
        if *module.target() != host {
            return Err(RuntimeError::TargetMismatch { target: *module.target(), host });
        }
        let native = emit(module, RuntimeEmitter::new(allocator))?;
        debug!(module = module.name(), symbols = native.symbols.len(), "loaded native module");
        Ok(native)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Public symbols, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .symbols
            .iter()
            .filter(|(_, e)| !e.internal)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn signature(&self, symbol: &str) -> Option<&Signature> {
        match self.symbols.get(symbol)?.symbol {
            Symbol::Field(i, op) => self.fields[i].function(op).map(|f| &f.signature),
            Symbol::Struct(i, op) => self.structs[i].function(op).map(|f| &f.signature),
        }
    }

    pub fn struct_plan(&self, name: &str) -> Option<&StructPlan> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub(crate) fn plan_by_id(&self, id: StructId) -> Option<&StructPlan> {
        self.by_id.get(&id).map(|&i| &self.structs[i])
    }

    /// Resolves a field-level helper by name, internal ones included.
    pub(crate) fn field_function(&self, symbol: &str) -> Option<(&FieldPlan, FieldOp)> {
        match self.symbols.get(symbol)?.symbol {
            Symbol::Field(i, op) => Some((&self.fields[i], op)),
            Symbol::Struct(..) => None,
        }
    }

    /// Calls the public generated function `symbol`.
    ///
    /// # Safety
    /// Pointer arguments must satisfy the contract of the C function: struct
    /// pointers come from this module's constructors or deserializers (or are
    /// null), out-parameters point to writable memory of the right type, array
    /// arguments are valid for `count` elements, and wire buffers are valid for
    /// the length their prefix claims.
    pub unsafe fn call(&self, symbol: &str, args: &[Arg]) -> Result<Ret, RuntimeError> {
        let entry = match self.symbols.get(symbol) {
            Some(entry) if !entry.internal => *entry,
            _ => return Err(RuntimeError::UnknownSymbol(symbol.to_string())),
        };
        trace!(symbol, "call");

        match entry.symbol {
            Symbol::Field(i, op) => {
                let plan = &self.fields[i];
                let function = plan
                    .function(op)
                    .ok_or_else(|| RuntimeError::UnknownSymbol(symbol.to_string()))?;
                check_args(symbol, &function.signature, args)?;
                let this = arg_ptr(&args[0]);
                let ok = match op {
                    FieldOp::Get(policy) => self.get_field(plan, policy, this, arg_ptr(&args[1])),
                    FieldOp::GetItem => self.get_item(plan, this, arg_u64(&args[1]), arg_ptr(&args[2])),
                    FieldOp::Set(SetPolicy::Overwrite) => self.set_scalar(plan, this, arg_scalar(&args[1])),
                    FieldOp::Set(SetPolicy::Grow) => self.set_array(plan, this, arg_ptr(&args[1]), arg_u64(&args[2])),
                    FieldOp::Set(SetPolicy::Resize) => self.set_count(plan, this, arg_u64(&args[1])),
                    FieldOp::Set(SetPolicy::CopyStruct) => self.set_struct(plan, this, arg_ptr(&args[1])),
                    FieldOp::SetItem => self.set_item(plan, this, arg_u64(&args[1]), arg_scalar(&args[2])),
                    FieldOp::Serialize | FieldOp::Deserialize => {
                        return Err(RuntimeError::UnknownSymbol(symbol.to_string()))
                    }
                };
                Ok(Ret::Bool(ok))
            }
            Symbol::Struct(i, op) => {
                let plan = &self.structs[i];
                let function = plan
                    .function(op)
                    .ok_or_else(|| RuntimeError::UnknownSymbol(symbol.to_string()))?;
                check_args(symbol, &function.signature, args)?;
                Ok(match op {
                    StructOp::Create => Ret::Ptr(self.create(plan, args)),
                    StructOp::Destroy => {
                        self.destroy(plan, arg_ptr(&args[0]));
                        Ret::Void
                    }
                    StructOp::Serialize => Ret::Ptr(self.serialize(plan, arg_ptr(&args[0]))),
                    StructOp::Deserialize => Ret::Ptr(self.deserialize_raw(plan, arg_ptr(&args[0]))),
                    StructOp::WireSize | StructOp::Discard => {
                        return Err(RuntimeError::UnknownSymbol(symbol.to_string()))
                    }
                })
            }
        }
    }

    /// Serializes an instance of `name` into an owned byte vector. Returns
    /// `None` when the generated serializer fails.
    ///
    /// # Safety
    /// `this` must be null or a live instance of `name` from this module.
    pub unsafe fn serialize_to_vec(&self, name: &str, this: *mut u8) -> Result<Option<Vec<u8>>, RuntimeError> {
        let plan = self
            .struct_plan(name)
            .ok_or_else(|| RuntimeError::UnknownStruct(name.to_string()))?;
        let buffer = self.serialize(plan, this);
        if buffer.is_null() {
            return Ok(None);
        }
        let len = crate::ops::read_wire_u64(buffer) as usize;
        let bytes = std::slice::from_raw_parts(buffer, len).to_vec();
        self.allocator.free(buffer);
        Ok(Some(bytes))
    }

    /// Deserializes `bytes` into a new instance of `name`, or null when the
    /// buffer is not a valid serialization. Never reads past `bytes`.
    pub fn deserialize_from_slice(&self, name: &str, bytes: &[u8]) -> Result<*mut u8, RuntimeError> {
        let plan = self
            .struct_plan(name)
            .ok_or_else(|| RuntimeError::UnknownStruct(name.to_string()))?;
        Ok(unsafe { self.deserialize_slice(plan, bytes) })
    }

    /// Reads an instance back as a dynamic value, through its serializer.
    ///
    /// # Safety
    /// `this` must be a live instance of `name` from this module.
    pub unsafe fn snapshot(&self, name: &str, this: *mut u8) -> Result<Value, RuntimeError> {
        match self.serialize_to_vec(name, this)? {
            Some(bytes) => decode_value(&self.module, name, &bytes),
            None => Err(RuntimeError::Decode(format!("could not serialize \"{}\"", name))),
        }
    }

    /// Releases a buffer handed out by a copying getter or a serializer.
    ///
    /// # Safety
    /// `ptr` must be null or a live buffer from this module.
    pub unsafe fn free(&self, ptr: *mut u8) {
        self.allocator.free(ptr);
    }
}

fn arg_matches(ty: &CType, arg: &Arg) -> bool {
    match (ty, arg) {
        (CType::U64, Arg::U64(_)) => true,
        (CType::U64, Arg::Scalar(Scalar::UInt64(_))) => true,
        (CType::Scalar(t), Arg::Scalar(s)) => s.ty() == *t,
        (CType::Bool, Arg::Scalar(Scalar::Bool(_))) => true,
        (CType::Bytes | CType::Struct(_) | CType::Ptr(_), Arg::Ptr(_)) => true,
        _ => false,
    }
}

fn check_args(symbol: &str, signature: &Signature, args: &[Arg]) -> Result<(), RuntimeError> {
    if args.len() != signature.params.len() {
        return Err(RuntimeError::ArgumentMismatch {
            symbol: symbol.to_string(),
            msg:    format!("expected {} arguments, got {}", signature.params.len(), args.len()),
        });
    }
    for (param, arg) in signature.params.iter().zip(args) {
        if !arg_matches(&param.ty, arg) {
            return Err(RuntimeError::ArgumentMismatch {
                symbol: symbol.to_string(),
                msg:    format!("\"{}\" expects {}, got {:?}", param.name, param.ty.c_decl(), arg),
            });
        }
    }
    Ok(())
}

pub(crate) fn arg_ptr(arg: &Arg) -> *mut u8 {
    match arg {
        Arg::Ptr(p) => *p,
        _ => ptr::null_mut(),
    }
}

pub(crate) fn arg_u64(arg: &Arg) -> u64 {
    match arg {
        Arg::U64(v) | Arg::Scalar(Scalar::UInt64(v)) => *v,
        _ => 0,
    }
}

pub(crate) fn arg_scalar(arg: &Arg) -> Option<Scalar> {
    match arg {
        Arg::Scalar(s) => Some(*s),
        Arg::U64(v) => Some(Scalar::UInt64(*v)),
        Arg::Ptr(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brine_struct_compiler::{compile_schema, CompileOptions};

    fn load(text: &str) -> NativeModule {
        NativeModule::load(&compile_schema(text, &CompileOptions::default()).unwrap()).unwrap()
    }

    #[test]
    fn internal_symbols_are_hidden() {
        let native = load("struct A { int8 x; }");
        assert_eq!(
            native.symbols(),
            vec!["create_A", "deserialize_A", "destroy_A", "get_A_x", "serialize_A"]
        );
        let err = unsafe { native.call("__wire_size_A", &[Arg::Ptr(ptr::null_mut())]) }.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownSymbol(_)));
    }

    #[test]
    fn arguments_are_checked() {
        let native = load("struct A { int8 x; }");
        let err = unsafe { native.call("create_A", &[Arg::Scalar(Scalar::Int16(1))]) }.unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentMismatch { .. }));
        let err = unsafe { native.call("create_A", &[]) }.unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentMismatch { .. }));
    }

    #[test]
    fn rejects_foreign_targets() {
        let options = CompileOptions {
            target: Target { pointer_width: 4, byte_order: Target::host().byte_order },
            ..Default::default()
        };
        let module = compile_schema("struct A { int8 x; }", &options).unwrap();
        if Target::host().pointer_width != 4 {
            assert!(matches!(NativeModule::load(&module), Err(RuntimeError::TargetMismatch { .. })));
        }
    }

    #[test]
    fn null_struct_fails_closed() {
        let native = load("struct A { mutable int32 x; }");
        let mut out = 0i32;
        let got = unsafe { native.call("get_A_x", &[Arg::Ptr(ptr::null_mut()), Arg::ptr(&mut out as *mut i32)]) };
        assert_eq!(got.unwrap(), Ret::Bool(false));
        let set = unsafe { native.call("set_A_x", &[Arg::Ptr(ptr::null_mut()), Arg::Scalar(Scalar::Int32(1))]) };
        assert_eq!(set.unwrap(), Ret::Bool(false));
        let wire = unsafe { native.call("serialize_A", &[Arg::Ptr(ptr::null_mut())]) };
        assert_eq!(wire.unwrap(), Ret::Ptr(ptr::null_mut()));
    }
}
