//! Runs generators over a module: every field of a struct, then the struct.

use tracing::{debug, error};

use crate::{
    error::StructError,
    field_ops::plan_field,
    ir::{Field, Struct},
    module::Module,
    struct_ops::plan_struct,
    traits::CodeEmitter,
};

pub trait Pass {
    fn name(&self) -> &str;

    fn run_on_field(&mut self, _module: &Module, _s: &Struct, _f: &Field) -> Result<(), StructError> {
        Ok(())
    }

    fn run_on_struct(&mut self, _module: &Module, _s: &Struct) -> Result<(), StructError> {
        Ok(())
    }
}

impl Module {
    /// Visits every struct in declaration order. A struct whose fields failed
    /// is not visited itself; other structs still are.
    ///
    /// Returns every failure, each prefixed with the struct (and field) it
    /// belongs to.
    pub fn visit(&self, pass: &mut dyn Pass) -> Vec<String> {
        let mut failures = Vec::new();
        for s in self.structs() {
            let mut fields_ok = true;
            for f in s.fields() {
                if let Err(e) = pass.run_on_field(self, s, f) {
                    error!(pass = pass.name(), struct_name = s.name(), field = %f.name, "{}", e);
                    failures.push(format!("{}.{}: {}", s.name(), f.name, e));
                    fields_ok = false;
                }
            }
            if !fields_ok {
                continue;
            }
            if let Err(e) = pass.run_on_struct(self, s) {
                error!(pass = pass.name(), struct_name = s.name(), "{}", e);
                failures.push(format!("{}: {}", s.name(), e));
            }
        }
        failures
    }
}

/// Runs passes in registration order, stopping at the first pass that fails.
#[derive(Default)]
pub struct PassManager<'a> {
    passes: Vec<Box<dyn Pass + 'a>>,
}

impl<'a> PassManager<'a> {
    pub fn new() -> Self {
        PassManager { passes: Vec::new() }
    }

    pub fn register_pass(&mut self, pass: Box<dyn Pass + 'a>) {
        self.passes.push(pass);
    }

    pub fn run_on_module(&mut self, module: &Module) -> Result<(), StructError> {
        for pass in self.passes.iter_mut() {
            debug!(pass = pass.name(), module = module.name(), "running pass");
            let failures = module.visit(pass.as_mut());
            if !failures.is_empty() {
                return Err(StructError::CodegenFailed(failures));
            }
        }
        Ok(())
    }
}

/// Plans every field and struct and hands the plans to a backend.
pub struct EmitPass<'e, E: CodeEmitter> {
    emitter: &'e mut E,
}

impl<'e, E: CodeEmitter> EmitPass<'e, E> {
    pub fn new(emitter: &'e mut E) -> Self {
        EmitPass { emitter }
    }
}

impl<'e, E: CodeEmitter> Pass for EmitPass<'e, E> {
    fn name(&self) -> &str {
        "emit"
    }

    fn run_on_field(&mut self, module: &Module, s: &Struct, f: &Field) -> Result<(), StructError> {
        let plan = plan_field(module, s, f)?;
        self.emitter.emit_field(module, &plan)
    }

    fn run_on_struct(&mut self, module: &Module, s: &Struct) -> Result<(), StructError> {
        let plan = plan_struct(module, s)?;
        self.emitter.emit_struct(module, &plan)
    }
}

/// Generates the whole module with `emitter`.
pub fn emit<E: CodeEmitter>(module: &Module, mut emitter: E) -> Result<E::Output, StructError> {
    {
        let mut passes = PassManager::new();
        passes.register_pass(Box::new(EmitPass::new(&mut emitter)));
        passes.run_on_module(module)?;
    }
    emitter.finish(module)
}
