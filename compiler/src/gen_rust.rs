use crate::{
    error::StructError,
    module::Module,
    plan::{CType, FieldPlan, Function, StructPlan},
    traits::CodeEmitter,
};

/// Converts a string to PascalCase.
/// - If the string contains underscores, it splits on underscores and converts each word
///   so that its first letter is uppercase and the rest lowercase.
/// - Otherwise, it ensures only the first letter is uppercase.
fn to_pascal_case(s: &str) -> String {
    if s.contains('_') {
        s.split('_')
         .filter(|word| !word.is_empty())
         .map(|word| {
             let mut chars = word.chars();
             match chars.next() {
                 None => String::new(),
                 Some(first) => first.to_uppercase().to_string() + &chars.as_str().to_lowercase(),
             }
         })
         .collect::<String>()
    } else {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => first.to_uppercase().to_string() + chars.as_str(),
        }
    }
}

/// Converts a string to snake_case.
/// Acronyms stay together (e.g. "sessionID" becomes "session_id").
fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut snake = String::new();
    for i in 0..chars.len() {
        let c = chars[i];
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                if !prev.is_uppercase() || (i + 1 < chars.len() && chars[i + 1].is_lowercase()) {
                    snake.push('_');
                }
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    snake
}

/// Escapes Rust reserved keywords by suffixing with an underscore.
fn escape_rust_keyword(s: &str) -> String {
    let keywords = [
        "as", "break", "const", "continue", "crate", "else",
        "enum", "extern", "false", "fn", "for", "if", "impl",
        "in", "let", "loop", "match", "mod", "move", "mut",
        "pub", "ref", "return", "self", "Self", "static",
        "struct", "super", "trait", "true", "type", "unsafe",
        "use", "where", "while",
    ];
    if keywords.contains(&s) {
        format!("{}_", s)
    } else {
        s.to_string()
    }
}

fn rust_type(ty: &CType) -> String {
    match ty {
        CType::Void => "()".to_string(),
        CType::Bool => "bool".to_string(),
        CType::U64 => "u64".to_string(),
        CType::Scalar(scalar) => scalar.rust_type().to_string(),
        CType::Bytes => "*mut u8".to_string(),
        CType::Struct(name) => format!("*mut {}", to_pascal_case(name)),
        CType::Ptr(inner) => format!("*mut {}", rust_type(inner)),
    }
}

/// Renders `extern "C"` declarations for the public functions of a module.
#[derive(Debug, Default)]
pub struct RustBindingsEmitter {
    types:     Vec<String>,
    functions: Vec<String>,
}

impl RustBindingsEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare<Op>(&mut self, function: &Function<Op>) {
        if function.internal {
            return;
        }
        let params: Vec<String> = function
            .signature
            .params
            .iter()
            .map(|p| format!("{}: {}", escape_rust_keyword(&to_snake_case(&p.name)), rust_type(&p.ty)))
            .collect();
        let ret = match function.signature.ret {
            CType::Void => String::new(),
            ref other => format!(" -> {}", rust_type(other)),
        };
        self.functions.push(format!("    pub fn {}({}){};", function.symbol, params.join(", "), ret));
    }
}

impl CodeEmitter for RustBindingsEmitter {
    type Output = String;

    fn emit_field(&mut self, _module: &Module, plan: &FieldPlan) -> Result<(), StructError> {
        for function in &plan.functions {
            self.declare(function);
        }
        Ok(())
    }

    fn emit_struct(&mut self, _module: &Module, plan: &StructPlan) -> Result<(), StructError> {
        self.types.push(format!(
            "/// Opaque handle to a `{0}_t`.\n#[repr(C)]\npub struct {1} {{\n    _private: [u8; 0],\n}}\n",
            plan.name,
            to_pascal_case(&plan.name)
        ));
        for function in &plan.functions {
            self.declare(function);
        }
        Ok(())
    }

    fn finish(self, module: &Module) -> Result<String, StructError> {
        let mut rust_code: Vec<String> = Vec::new();
        rust_code.push("// Generated by brine-struct. Do not edit.".to_string());
        rust_code.push(format!("pub mod {} {{", escape_rust_keyword(&to_snake_case(module.name()))));
        rust_code.push("#![allow(non_snake_case, non_camel_case_types, dead_code)]".to_string());
        rust_code.push("".to_string());
        rust_code.extend(self.types);
        rust_code.push("extern \"C\" {".to_string());
        rust_code.extend(self.functions);
        rust_code.push("}".to_string());
        rust_code.push("}".to_string());
        Ok(rust_code.join("\n"))
    }
}

/// Compiles a finalized module into Rust FFI bindings for its C functions.
pub fn compile_module_to_rust(module: &Module) -> Result<String, StructError> {
    crate::pass::emit(module, RustBindingsEmitter::new())
}
