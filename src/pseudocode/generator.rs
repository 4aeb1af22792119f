// Tue Jan 13 2026 - Alex

use crate::bytecode::{Constant, Function, Instruction, OpCode};
use crate::config::Config;
use crate::lua::is_identifier;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

/// Globals worth keeping as a named local when loaded
const KNOWN_GLOBALS: &[&str] = &[
    "print", "warn", "error", "require", "loadstring", "type", "tostring", "tonumber", "next", "pairs", "ipairs",
    "rawget", "rawset", "rawequal", "getfenv", "setfenv",
];

/// Highest register a Lua 5.1 frame can address
const MAX_REGISTER: i32 = 255;

static STRING_LOCAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^local R(\d+) = "([^"]+)"$"#).expect("string local pattern"));

/// Best-effort Lua source from a devirtualized function tree.
///
/// Each prototype becomes one `function` block. Values are propagated
/// through a per-register symbol map, so only side effects and named
/// locals produce lines. Control flow is reconstructed only as loose
/// `if`/`for` headers.
pub struct PseudocodeGenerator {
    indent: String,
    header: bool,
}

impl PseudocodeGenerator {
    pub fn new() -> Self {
        Self {
            indent: "    ".to_string(),
            header: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_indent(config.pseudocode_indent.as_str())
            .with_header(config.pseudocode_header)
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn generate(&self, root: &Function) -> String {
        let named;
        let root = if root.name.is_empty() {
            let mut copy = root.clone();
            copy.assign_names();
            named = copy;
            &named
        } else {
            root
        };

        let mut output = String::new();
        if self.header {
            output.push_str(&format!(
                "-- Devirtualized pseudocode: {} function(s), {} instruction(s)\n\n",
                root.function_count(),
                root.total_instructions()
            ));
        }

        let mut temps = 0;
        self.write_function(root, &mut temps, &mut output);
        output.trim_end().to_string()
    }

    fn write_function(&self, function: &Function, temps: &mut usize, output: &mut String) {
        let mut lines = Translator::new(function, temps).translate();
        clean_redundant_lines(&mut lines);

        let mut params: Vec<String> = (0..function.num_params).map(|i| format!("arg{}", i)).collect();
        if function.is_vararg == 2 {
            params.push("...".to_string());
        }

        output.push_str(&format!("function {}({})\n", function.name, params.join(", ")));
        for line in &lines {
            output.push_str(&format!("{}{}\n", self.indent, line));
        }
        output.push_str("end\n");

        for child in &function.functions {
            self.write_function(child, temps, output);
        }
    }
}

impl Default for PseudocodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-function instruction walker
struct Translator<'f, 't> {
    function: &'f Function,
    registers: HashMap<i32, String>,
    /// Registers holding `obj:method` from a `Self` instruction
    methods: HashSet<i32>,
    temps: &'t mut usize,
}

impl<'f, 't> Translator<'f, 't> {
    fn new(function: &'f Function, temps: &'t mut usize) -> Self {
        Self {
            function,
            registers: HashMap::new(),
            methods: HashSet::new(),
            temps,
        }
    }

    fn translate(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for instruction in &self.function.instructions {
            if let Some(line) = self.instruction(instruction) {
                lines.push(line);
            }
            if instruction.opcode == OpCode::Call && instruction.c == 1 {
                self.propagate_call_result(instruction.a, &lines);
            }
        }
        lines
    }

    fn next_temp(&mut self) -> usize {
        let temp = *self.temps;
        *self.temps += 1;
        temp
    }

    fn set(&mut self, register: i32, value: String) {
        self.methods.remove(&register);
        self.registers.insert(register, value);
    }

    fn clear(&mut self, register: i32) {
        self.methods.remove(&register);
        self.registers.remove(&register);
    }

    fn register(&self, register: i32) -> String {
        self.registers
            .get(&register)
            .cloned()
            .unwrap_or_else(|| format!("R{}", register))
    }

    fn constant(&self, index: i32) -> String {
        self.function
            .constant(index)
            .map(Constant::to_string)
            .unwrap_or_else(|| format!("K{}", index))
    }

    fn rk(&self, operand: i32) -> String {
        if operand >= 256 {
            self.constant(operand - 256)
        } else {
            self.register(operand)
        }
    }

    /// Constant string usable as a bare field or method name
    fn field_name(&self, operand: i32) -> Option<&'f str> {
        if operand < 256 {
            return None;
        }
        self.function
            .constant(operand - 256)
            .and_then(Constant::as_str)
            .filter(|name| is_identifier(name))
    }

    fn global_name(&self, index: i32) -> String {
        match self.function.constant(index) {
            Some(Constant::String(name)) => name.clone(),
            _ => format!("_G[{}]", self.constant(index)),
        }
    }

    fn registers_list(&self, from: i32, to: i32) -> Vec<String> {
        register_span(from, to).map(|r| self.register(r)).collect()
    }

    fn instruction(&mut self, instruction: &Instruction) -> Option<String> {
        let (a, b, c) = (instruction.a, instruction.b, instruction.c);

        match instruction.opcode {
            OpCode::Move => {
                if let Some(value) = self.registers.get(&b).cloned() {
                    self.set(a, value);
                    if a != b {
                        self.clear(b);
                    }
                }
                None
            }
            OpCode::LoadK => {
                let value = self.constant(b);
                self.set(a, value);
                None
            }
            OpCode::LoadBool => {
                self.set(a, (b != 0).to_string());
                None
            }
            OpCode::LoadNil => {
                for r in register_span(a, b) {
                    self.set(r, "nil".to_string());
                }
                None
            }
            OpCode::GetGlobal => {
                let name = self.global_name(b);
                self.set(a, name.clone());
                KNOWN_GLOBALS
                    .contains(&name.as_str())
                    .then(|| format!("local R{} = {}", a, name))
            }
            OpCode::SetGlobal => Some(format!("{} = {}", self.global_name(b), self.register(a))),
            OpCode::GetUpval => {
                self.set(a, format!("upvalue{}", b));
                Some(format!("local R{} = upvalue{}", a, b))
            }
            OpCode::SetUpval => Some(format!("upvalue{} = {}", b, self.register(a))),
            OpCode::GetTable => {
                let object = self.register(b);
                let value = match self.field_name(c) {
                    Some(name) => format!("{}.{}", object, name),
                    None => format!("{}[{}]", object, self.rk(c)),
                };
                self.set(a, value);
                None
            }
            OpCode::SetTable => {
                let key = match self.field_name(b) {
                    Some(name) => format!(".{}", name),
                    None => format!("[{}]", self.rk(b)),
                };
                Some(format!("{}{} = {}", self.register(a), key, self.rk(c)))
            }
            OpCode::NewTable => {
                self.clear(a);
                Some(format!("local R{} = {{}}", a))
            }
            OpCode::Self_ => {
                let object = self.register(b);
                match self.field_name(c) {
                    Some(name) => {
                        self.set(a, format!("{}:{}", object, name));
                        self.methods.insert(a);
                    }
                    None => self.set(a, format!("{}[{}]", object, self.rk(c))),
                }
                self.set(a.saturating_add(1), object);
                None
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
                let value = format!("{} {} {}", self.rk(b), arithmetic_symbol(instruction.opcode), self.rk(c));
                self.set(a, value);
                None
            }
            OpCode::Unm | OpCode::Not | OpCode::Len => {
                let prefix = match instruction.opcode {
                    OpCode::Unm => "-",
                    OpCode::Not => "not ",
                    _ => "#",
                };
                match self.registers.get(&b).cloned() {
                    Some(value) => {
                        self.set(a, format!("{}{}", prefix, value));
                        None
                    }
                    None => Some(format!("local R{} = {}R{}", a, prefix, b)),
                }
            }
            OpCode::Concat => {
                let value = self.registers_list(b, c).join(" .. ");
                self.set(a, value);
                None
            }
            OpCode::Eq | OpCode::Lt | OpCode::Le => {
                let symbol = comparison_symbol(instruction.opcode, a);
                Some(format!("if {} {} {} then", self.rk(b), symbol, self.rk(c)))
            }
            OpCode::Test => Some(format!("if {} then", truth(self.register(a), c))),
            OpCode::TestSet => {
                let value = self.register(b);
                self.set(a, value.clone());
                Some(format!("if {} then", truth(value, c)))
            }
            OpCode::Call => self.call(a, b, c),
            OpCode::TailCall => Some(format!("return {}", self.call_expression(a, b))),
            OpCode::Return => Some(match b {
                1 => "return".to_string(),
                0 => format!("return {}, ...", self.register(a)),
                _ => format!("return {}", self.registers_list(a, a.saturating_add(b).saturating_sub(2)).join(", ")),
            }),
            OpCode::ForPrep => {
                let header = format!(
                    "for i_{} = {}, {}, {} do",
                    *self.temps,
                    self.register(a),
                    self.register(a.saturating_add(1)),
                    self.register(a.saturating_add(2))
                );
                let var = format!("i_{}", self.next_temp());
                self.set(a.saturating_add(3), var);
                Some(header)
            }
            OpCode::TForLoop => {
                let mut vars = Vec::new();
                for r in register_span(a.saturating_add(3), a.saturating_add(2).saturating_add(c)) {
                    let var = format!("v{}", self.next_temp());
                    self.set(r, var.clone());
                    vars.push(var);
                }
                Some(format!("for {} in {} do", vars.join(", "), self.register(a)))
            }
            OpCode::Closure => {
                let name = usize::try_from(b)
                    .ok()
                    .and_then(|index| self.function.functions.get(index))
                    .map(|child| child.name.clone())
                    .unwrap_or_else(|| format!("closure{}", b));
                self.set(a, name.clone());
                Some(format!("local R{} = {}", a, name))
            }
            OpCode::VarArg => {
                if b == 0 {
                    self.set(a, "...".to_string());
                    return None;
                }
                let mut vars = Vec::new();
                for r in register_span(a, a.saturating_add(b).saturating_sub(2)) {
                    let var = format!("arg{}", self.next_temp());
                    self.set(r, var.clone());
                    vars.push(var);
                }
                Some(format!("local {} = ...", vars.join(", ")))
            }
            _ => None,
        }
    }

    fn call_expression(&self, a: i32, b: i32) -> String {
        let function = self.register(a);
        // `obj:m` already carries its receiver
        let first = a.saturating_add(if self.methods.contains(&a) { 2 } else { 1 });

        let args = match b {
            0 => self
                .registers
                .get(&first)
                .map(|arg| vec![arg.clone()])
                .unwrap_or_default(),
            _ => self.registers_list(first, a.saturating_add(b).saturating_sub(1)),
        };
        format!("{}({})", function, args.join(", "))
    }

    fn call(&mut self, a: i32, b: i32, c: i32) -> Option<String> {
        let mut call = self.call_expression(a, b);
        if self.register(a) == "loadstring" {
            call.push_str("()");
        }

        match c {
            1 => Some(call),
            0 => {
                self.set(a, call);
                None
            }
            _ => {
                let last = a.saturating_add(c).saturating_sub(2);
                for r in register_span(a, last) {
                    self.clear(r);
                }
                let results = register_span(a, last).map(|r| format!("R{}", r)).join(", ");
                Some(format!("local {} = {}", results, call))
            }
        }
    }

    /// A discarded call to one of the loader builtins stays addressable
    fn propagate_call_result(&mut self, a: i32, lines: &[String]) {
        if let Some(last) = lines.last() {
            if ["print(", "require(", "loadstring("].iter().any(|p| last.starts_with(p)) {
                self.set(a, last.clone());
            }
        }
    }
}

/// `from..=to` clipped to the register file, empty when the operands are out of range
fn register_span(from: i32, to: i32) -> RangeInclusive<i32> {
    from.max(0)..=to.min(MAX_REGISTER)
}

fn arithmetic_symbol(opcode: OpCode) -> &'static str {
    match opcode {
        OpCode::Sub => "-",
        OpCode::Mul => "*",
        OpCode::Div => "/",
        OpCode::Mod => "%",
        OpCode::Pow => "^",
        _ => "+",
    }
}

fn comparison_symbol(opcode: OpCode, a: i32) -> &'static str {
    match (opcode, a == 0) {
        (OpCode::Eq, true) => "==",
        (OpCode::Eq, false) => "~=",
        (OpCode::Lt, true) => "<",
        (OpCode::Lt, false) => ">",
        (OpCode::Le, true) => "<=",
        _ => ">=",
    }
}

fn truth(value: String, c: i32) -> String {
    if c == 0 {
        format!("not {}", value)
    } else {
        value
    }
}

/// Drops locals that only feed the very next `print` and repeated prints
fn clean_redundant_lines(lines: &mut Vec<String>) {
    let mut i = lines.len();
    while i > 0 {
        i -= 1;
        let Some(next) = lines.get(i + 1) else {
            continue;
        };

        let line = &lines[i];
        let print_alias = line.starts_with("local R") && line.contains(" = print") && next.starts_with("print(");
        let printed_string = STRING_LOCAL
            .captures(line)
            .is_some_and(|captures| *next == format!("print(\"{}\")", &captures[2]));

        if print_alias || printed_string {
            lines.remove(i);
        }
    }

    let mut seen = HashSet::new();
    lines.retain(|line| !line.starts_with("print(") || seen.insert(line.clone()));
}
