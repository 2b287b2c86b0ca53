use crate::{
    error::StructError,
    module::Module,
    plan::{FieldPlan, StructPlan},
};

/// A backend that turns operation plans into something runnable.
///
/// Plans arrive field by field, each struct's fields before the struct
/// itself, in module declaration order. `finish` is called once after every
/// plan was accepted.
pub trait CodeEmitter {
    type Output;

    fn emit_field(&mut self, module: &Module, plan: &FieldPlan) -> Result<(), StructError>;

    fn emit_struct(&mut self, module: &Module, plan: &StructPlan) -> Result<(), StructError>;

    fn finish(self, module: &Module) -> Result<Self::Output, StructError>;
}
