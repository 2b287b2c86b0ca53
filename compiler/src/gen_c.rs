//! C source backend: one header with the public prototypes and one source
//! file implementing every generated function.

use brine_struct_schema::ByteOrder;
use tracing::debug;

use crate::{
    error::StructError,
    module::{Builtins, Module},
    plan::{CtorArg, FieldOp, FieldPlan, FieldShape, Function, GetPolicy, SetPolicy, StructOp, StructPlan},
    symbols,
    traits::CodeEmitter,
};

/// Generated C translation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CSource {
    pub header_name: String,
    pub header:      String,
    pub source:      String,
}

#[derive(Debug, Default)]
pub struct CSourceEmitter {
    definitions: String,
    prototypes:  String,
    internals:   String,
    bodies:      String,
}

impl CSourceEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare<Op>(&mut self, function: &Function<Op>) {
        if function.internal {
            self.internals.push_str(&format!("static {};\n", function));
        } else {
            self.prototypes.push_str(&format!("{};\n", function));
        }
    }

    fn define<Op>(&mut self, function: &Function<Op>, body: &str) {
        let storage = if function.internal { "static " } else { "" };
        self.bodies.push_str(&format!("{}{} {{\n{}}}\n\n", storage, function, body));
    }
}

/// C type stored in a struct slot.
fn slot_type(shape: &FieldShape) -> String {
    match shape {
        FieldShape::Scalar(ty) => ty.c_type().to_string(),
        FieldShape::Count { .. } => "uint64_t".to_string(),
        FieldShape::Array { element, .. } => format!("{}*", element.c_type()),
        FieldShape::Nested { struct_name, .. } => format!("{}*", symbols::c_struct(struct_name)),
    }
}

fn field_body(plan: &FieldPlan, op: FieldOp, b: &Builtins) -> String {
    let f = &plan.slot.name;
    let mut code = String::new();
    let mut line = |text: &str| {
        code.push_str("    ");
        code.push_str(text);
        code.push('\n');
    };

    match (op, &plan.shape) {
        (FieldOp::Get(GetPolicy::CopyArray), FieldShape::Array { element, count }) => {
            line("if (self == NULL || out == NULL) return false;");
            line(&format!("size_t size = sizeof({}) * self->{};", element.c_type(), count.name));
            line(&format!("{0}* copy = ({0}*){1}(size ? size : 1);", element.c_type(), b.malloc));
            line("if (copy == NULL) return false;");
            line(&format!("if (size > 0) memcpy(copy, self->{}, size);", f));
            line("*out = copy;");
            line("return true;");
        }
        (FieldOp::Get(GetPolicy::CopyStruct), FieldShape::Nested { struct_name, .. }) => {
            line("if (self == NULL || out == NULL) return false;");
            line(&format!("if (self->{} == NULL) {{ *out = NULL; return true; }}", f));
            line(&format!("uint8_t* wire = {}(self->{});", symbols::serialize(struct_name), f));
            line("if (wire == NULL) return false;");
            line(&format!("{}* copy = {}(wire);", symbols::c_struct(struct_name), symbols::deserialize(struct_name)));
            line(&format!("{}(wire);", b.free));
            line("if (copy == NULL) return false;");
            line("*out = copy;");
            line("return true;");
        }
        (FieldOp::Get(_), _) => {
            line("if (self == NULL || out == NULL) return false;");
            line(&format!("*out = self->{};", f));
            line("return true;");
        }
        (FieldOp::GetItem, FieldShape::Array { count, .. }) => {
            line("if (self == NULL || out == NULL) return false;");
            line(&format!("if (index >= self->{}) return false;", count.name));
            line(&format!("*out = self->{}[index];", f));
            line("return true;");
        }
        (FieldOp::SetItem, FieldShape::Array { count, .. }) => {
            line("if (self == NULL) return false;");
            line(&format!("if (index >= self->{}) return false;", count.name));
            line(&format!("self->{}[index] = value;", f));
            line("return true;");
        }
        (FieldOp::Set(SetPolicy::Grow), FieldShape::Array { element, count }) => {
            let t = element.c_type();
            line("if (self == NULL) return false;");
            line("if (count > 0 && data == NULL) return false;");
            line(&format!("size_t size = sizeof({}) * count;", t));
            line(&format!("if (self->{} == NULL) {{", f));
            line(&format!("    {0}* buffer = ({0}*){1}(size ? size : 1);", t, b.malloc));
            line("    if (buffer == NULL) return false;");
            line(&format!("    self->{} = buffer;", f));
            line(&format!("}} else if (self->{} != count) {{", count.name));
            line(&format!("    {0}* buffer = ({0}*){1}(self->{2}, size ? size : 1);", t, b.realloc, f));
            line("    if (buffer == NULL) return false;");
            line(&format!("    self->{} = buffer;", f));
            line("}");
            line(&format!("self->{} = count;", count.name));
            line(&format!("if (size > 0) memcpy(self->{}, data, size);", f));
            line("return true;");
        }
        (FieldOp::Set(SetPolicy::Resize), FieldShape::Count { data, element }) => {
            let t = element.c_type();
            line("if (self == NULL) return false;");
            line("if (count == 0) return false;");
            line(&format!("uint64_t old_count = self->{};", f));
            line(&format!("self->{} = count;", f));
            line(&format!("{0}* buffer = ({0}*){1}(self->{2}, sizeof({0}) * count);", t, b.realloc, data.name));
            line(&format!("self->{} = old_count;", f));
            line("if (buffer == NULL) return false;");
            line(&format!(
                "if (count > old_count) memset(buffer + old_count, 0, sizeof({}) * (count - old_count));",
                t
            ));
            line(&format!("self->{} = buffer;", data.name));
            line(&format!("self->{} = count;", f));
            line("return true;");
        }
        (FieldOp::Set(SetPolicy::CopyStruct), FieldShape::Nested { struct_name, .. }) => {
            line("if (self == NULL || value == NULL) return false;");
            line(&format!("uint8_t* wire = {}(value);", symbols::serialize(struct_name)));
            line("if (wire == NULL) return false;");
            line(&format!("{}* copy = {}(wire);", symbols::c_struct(struct_name), symbols::deserialize(struct_name)));
            line(&format!("{}(wire);", b.free));
            line("if (copy == NULL) return false;");
            line(&format!("self->{} = copy;", f));
            line("return true;");
        }
        (FieldOp::Set(_), _) => {
            line("if (self == NULL) return false;");
            line(&format!("self->{} = value;", f));
            line("return true;");
        }
        (FieldOp::Serialize, FieldShape::Scalar(ty)) => {
            line(&format!("memcpy(buffer, &self->{}, sizeof({}));", f, ty.c_type()));
            line(&format!("brine_normalize(buffer, sizeof({}));", ty.c_type()));
            line(&format!("return sizeof({});", ty.c_type()));
        }
        (FieldOp::Serialize, FieldShape::Array { element, count }) => {
            let t = element.c_type();
            line(&format!("uint64_t count = self->{};", count.name));
            line("brine_write_u64(buffer, count);");
            line("uint8_t* cursor = buffer + 8;");
            line("for (uint64_t i = 0; i < count; i++) {");
            line(&format!("    memcpy(cursor, &self->{}[i], sizeof({}));", f, t));
            line(&format!("    brine_normalize(cursor, sizeof({}));", t));
            line(&format!("    cursor += sizeof({});", t));
            line("}");
            line(&format!("return 8 + sizeof({}) * count;", t));
        }
        (FieldOp::Serialize, FieldShape::Nested { struct_name, .. }) => {
            line(&format!("if (self->{} == NULL) {{ brine_write_u64(buffer, 0); return 8; }}", f));
            line(&format!("uint8_t* wire = {}(self->{});", symbols::serialize(struct_name), f));
            line("if (wire == NULL) return 0;");
            line("uint64_t size = brine_read_u64(wire);");
            line("memcpy(buffer, wire, size);");
            line(&format!("{}(wire);", b.free));
            line("return size;");
        }
        (FieldOp::Deserialize, FieldShape::Scalar(ty)) => {
            line(&format!("uint8_t tmp[sizeof({})];", ty.c_type()));
            line("memcpy(tmp, buffer, sizeof(tmp));");
            line("brine_normalize(tmp, sizeof(tmp));");
            line(&format!("memcpy(&self->{}, tmp, sizeof(tmp));", f));
            line("return sizeof(tmp);");
        }
        (FieldOp::Deserialize, FieldShape::Array { element, count }) => {
            let t = element.c_type();
            line("uint64_t count = brine_read_u64(buffer);");
            line(&format!("size_t size = sizeof({}) * count;", t));
            line(&format!("{0}* data = ({0}*){1}(size ? size : 1);", t, b.malloc));
            line("if (data == NULL) return 0;");
            line("uint8_t* cursor = buffer + 8;");
            line(&format!("uint8_t tmp[sizeof({})];", t));
            line("for (uint64_t i = 0; i < count; i++) {");
            line("    memcpy(tmp, cursor, sizeof(tmp));");
            line("    brine_normalize(tmp, sizeof(tmp));");
            line("    memcpy(&data[i], tmp, sizeof(tmp));");
            line("    cursor += sizeof(tmp);");
            line("}");
            line(&format!("self->{} = data;", f));
            line(&format!("self->{} = count;", count.name));
            line("return 8 + size;");
        }
        (FieldOp::Deserialize, FieldShape::Nested { struct_name, .. }) => {
            line("uint64_t size = brine_read_u64(buffer);");
            line(&format!("if (size == 0) {{ self->{} = NULL; return 8; }}", f));
            line(&format!("{}* nested = {}(buffer);", symbols::c_struct(struct_name), symbols::deserialize(struct_name)));
            line("if (nested == NULL) return 0;");
            line(&format!("self->{} = nested;", f));
            line("return size;");
        }
        (op, shape) => {
            line(&format!("/* {:?} is not generated for {:?} */", op, shape));
        }
    }
    code
}

fn struct_body(plan: &StructPlan, op: StructOp, b: &Builtins) -> String {
    let t = symbols::c_struct(&plan.name);
    let mut code = String::new();
    let mut line = |text: &str| {
        code.push_str("    ");
        code.push_str(text);
        code.push('\n');
    };

    match op {
        StructOp::Create => {
            line(&format!("{0}* self = ({0}*){1}(sizeof({0}));", t, b.malloc));
            line("if (self == NULL) return NULL;");
            line(&format!("memset(self, 0, sizeof({}));", t));
            for arg in &plan.ctor_args {
                match arg {
                    CtorArg::Scalar { slot, .. } => line(&format!("self->{0} = {0};", slot.name)),
                    CtorArg::Array { slot, element, count } => {
                        let (f, n, et) = (&slot.name, &count.name, element.c_type());
                        line(&format!("if ({} > 0 && {} == NULL) {{ {}(self); return NULL; }}", n, f, symbols::discard(&plan.name)));
                        line(&format!("self->{0} = ({1}*){2}((sizeof({1}) * {3}) ? sizeof({1}) * {3} : 1);", f, et, b.malloc, n));
                        line(&format!("if (self->{} == NULL) {{ {}(self); return NULL; }}", f, symbols::discard(&plan.name)));
                        line(&format!("if ({0} > 0) memcpy(self->{1}, {1}, sizeof({2}) * {0});", n, f, et));
                        line(&format!("self->{0} = {0};", n));
                    }
                    CtorArg::Nested { slot, struct_name, .. } => {
                        let (f, discard) = (&slot.name, symbols::discard(&plan.name));
                        line(&format!("if ({} != NULL) {{", f));
                        line(&format!("    uint8_t* wire = {}({});", symbols::serialize(struct_name), f));
                        line(&format!("    if (wire == NULL) {{ {}(self); return NULL; }}", discard));
                        line(&format!("    self->{} = {}(wire);", f, symbols::deserialize(struct_name)));
                        line(&format!("    {}(wire);", b.free));
                        line(&format!("    if (self->{} == NULL) {{ {}(self); return NULL; }}", f, discard));
                        line("}");
                    }
                }
            }
            line("return self;");
        }
        StructOp::Destroy | StructOp::Discard => {
            line("if (self == NULL) return;");
            for m in &plan.members {
                match &m.shape {
                    FieldShape::Array { .. } => line(&format!("{}(self->{});", b.free, m.slot.name)),
                    FieldShape::Nested { struct_name, .. } if op == StructOp::Discard => {
                        line(&format!("{}(self->{});", symbols::discard(struct_name), m.slot.name))
                    }
                    _ => {}
                }
            }
            line(&format!("{}(self);", b.free));
        }
        StructOp::WireSize => {
            if !plan.wire_members().any(|m| m.shape.is_pointer()) {
                line("(void)self;");
            }
            line("uint64_t size = 8;");
            for m in plan.wire_members() {
                let f = &m.slot.name;
                match &m.shape {
                    FieldShape::Scalar(ty) => line(&format!("size += sizeof({});", ty.c_type())),
                    FieldShape::Array { element, count } => {
                        line(&format!("size += 8 + sizeof({}) * self->{};", element.c_type(), count.name))
                    }
                    FieldShape::Nested { struct_name, .. } => line(&format!(
                        "size += self->{0} == NULL ? 8 : {1}(self->{0});",
                        f,
                        symbols::wire_size(struct_name)
                    )),
                    FieldShape::Count { .. } => {}
                }
            }
            line("return size;");
        }
        StructOp::Serialize => {
            line("if (self == NULL) return NULL;");
            line(&format!("uint64_t total = {}(self);", symbols::wire_size(&plan.name)));
            line(&format!("uint8_t* buffer = (uint8_t*){}(total);", b.malloc));
            line("if (buffer == NULL) return NULL;");
            line("brine_write_u64(buffer, total);");
            line("uint64_t cursor = 8;");
            line("uint64_t written;");
            for m in plan.wire_members() {
                if let Some(serializer) = &m.serializer {
                    line(&format!("written = {}(self, buffer + cursor);", serializer));
                    line(&format!("if (written == 0) {{ {}(buffer); return NULL; }}", b.free));
                    line("cursor += written;");
                }
            }
            line("return buffer;");
        }
        StructOp::Deserialize => {
            let discard = symbols::discard(&plan.name);
            line("if (buffer == NULL) return NULL;");
            line("uint64_t expected = brine_read_u64(buffer);");
            line(&format!("{0}* self = ({0}*){1}(sizeof({0}));", t, b.malloc));
            line("if (self == NULL) return NULL;");
            line(&format!("memset(self, 0, sizeof({}));", t));
            line("uint64_t cursor = 8;");
            line("uint64_t read;");
            for m in plan.wire_members() {
                if let Some(deserializer) = &m.deserializer {
                    line(&format!("read = {}(self, buffer + cursor);", deserializer));
                    line(&format!("if (read == 0) {{ {}(self); return NULL; }}", discard));
                    line("cursor += read;");
                }
            }
            line(&format!(
                "if ({}(self) != expected) {{ {}(self); return NULL; }}",
                symbols::wire_size(&plan.name),
                discard
            ));
            line("return self;");
        }
    }
    code
}

fn wire_helpers(order: ByteOrder) -> String {
    let normalize = match order {
        // Wire order already
        ByteOrder::Little => "    (void)bytes;\n    (void)size;\n".to_string(),
        ByteOrder::Big => concat!(
            "    for (size_t i = 0; i < size / 2; i++) {\n",
            "        uint8_t b = bytes[i];\n",
            "        bytes[i] = bytes[size - 1 - i];\n",
            "        bytes[size - 1 - i] = b;\n",
            "    }\n"
        )
        .to_string(),
    };
    format!(
        concat!(
            "static void brine_normalize(uint8_t* bytes, size_t size) {{\n{}}}\n\n",
            "static uint64_t brine_read_u64(const uint8_t* buffer) {{\n",
            "    uint8_t tmp[8];\n",
            "    memcpy(tmp, buffer, 8);\n",
            "    brine_normalize(tmp, 8);\n",
            "    uint64_t value;\n",
            "    memcpy(&value, tmp, 8);\n",
            "    return value;\n",
            "}}\n\n",
            "static void brine_write_u64(uint8_t* buffer, uint64_t value) {{\n",
            "    memcpy(buffer, &value, 8);\n",
            "    brine_normalize(buffer, 8);\n",
            "}}\n\n",
        ),
        normalize
    )
}

fn guard_name(module: &str) -> String {
    let cleaned: String = module
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("BRINE_{}_H", cleaned)
}

impl CodeEmitter for CSourceEmitter {
    type Output = CSource;

    fn emit_field(&mut self, module: &Module, plan: &FieldPlan) -> Result<(), StructError> {
        for function in &plan.functions {
            self.declare(function);
            let body = field_body(plan, function.op, module.builtins());
            self.define(function, &body);
        }
        Ok(())
    }

    fn emit_struct(&mut self, module: &Module, plan: &StructPlan) -> Result<(), StructError> {
        let packed = module.get(plan.id).is_packed();
        let t = symbols::c_struct(&plan.name);
        self.definitions.push_str(&format!("struct {} {{\n", t));
        for m in &plan.members {
            self.definitions.push_str(&format!("    {} {};\n", slot_type(&m.shape), m.slot.name));
        }
        let attribute = if packed { " __attribute__((packed))" } else { "" };
        self.definitions.push_str(&format!("}}{};\n\n", attribute));

        for function in &plan.functions {
            self.declare(function);
            let body = struct_body(plan, function.op, module.builtins());
            self.define(function, &body);
        }
        Ok(())
    }

    fn finish(self, module: &Module) -> Result<CSource, StructError> {
        let guard = guard_name(module.name());
        let header_name = format!("{}.h", module.name());
        let b = module.builtins();

        let mut header = String::new();
        header.push_str("// Generated by brine-struct. Do not edit.\n");
        if let Some(source) = module.source_file() {
            header.push_str(&format!("// Source: {}\n", source));
        }
        header.push_str(&format!("#ifndef {0}\n#define {0}\n\n", guard));
        header.push_str("#include <stdbool.h>\n#include <stdint.h>\n\n");
        header.push_str("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n");
        for s in module.structs() {
            let t = symbols::c_struct(s.name());
            header.push_str(&format!("typedef struct {0} {0};\n", t));
        }
        header.push('\n');
        header.push_str(&self.prototypes);
        header.push_str("\n#ifdef __cplusplus\n}\n#endif\n\n");
        header.push_str(&format!("#endif // {}\n", guard));

        let mut source = String::new();
        source.push_str("// Generated by brine-struct. Do not edit.\n");
        source.push_str(&format!("#include \"{}\"\n\n", header_name));
        source.push_str("#include <stddef.h>\n#include <string.h>\n\n");
        source.push_str(&format!("void* {}(size_t size);\n", b.malloc));
        source.push_str(&format!("void* {}(void* ptr, size_t size);\n", b.realloc));
        source.push_str(&format!("void {}(void* ptr);\n\n", b.free));
        source.push_str(&self.definitions);
        source.push_str(&wire_helpers(module.target().byte_order));
        source.push_str(&self.internals);
        source.push('\n');
        source.push_str(&self.bodies);

        debug!(module = module.name(), bytes = source.len(), "generated C source");
        Ok(CSource { header_name, header, source })
    }
}

/// Generates the C header and source for a finalized module.
pub fn compile_module_to_c(module: &Module) -> Result<CSource, StructError> {
    crate::pass::emit(module, CSourceEmitter::new())
}
