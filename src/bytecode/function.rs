// Tue Jan 13 2026 - Alex

use crate::bytecode::instruction::Instruction;
use crate::lua::printer::{escape_string, format_number};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Constant {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Constant::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::Nil => "nil",
            Constant::Boolean(_) => "boolean",
            Constant::Number(_) => "number",
            Constant::String(_) => "string",
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "nil"),
            Constant::Boolean(b) => write!(f, "{}", b),
            Constant::Number(n) => write!(f, "{}", format_number(*n)),
            Constant::String(s) => write!(f, "\"{}\"", escape_string(s.as_bytes())),
        }
    }
}

/// A function prototype and everything nested in it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub functions: Vec<Function>,
    pub num_params: u8,
    pub num_upvalues: u8,
    pub is_vararg: u8,
    pub max_stack_size: u8,
}

impl Function {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives every prototype a stable `func_xxxxxxxx` name in depth-first order
    pub fn assign_names(&mut self) {
        let mut counter = 0u32;
        self.assign_names_from(&mut counter);
    }

    fn assign_names_from(&mut self, counter: &mut u32) {
        self.name = format!("func_{:08x}", *counter);
        *counter += 1;
        for child in &mut self.functions {
            child.assign_names_from(counter);
        }
    }

    pub fn constant(&self, index: i32) -> Option<&Constant> {
        usize::try_from(index).ok().and_then(|i| self.constants.get(i))
    }

    /// Number of prototypes in this tree, including self
    pub fn function_count(&self) -> usize {
        1 + self.functions.iter().map(Function::function_count).sum::<usize>()
    }

    pub fn total_instructions(&self) -> usize {
        self.instructions.len() + self.functions.iter().map(Function::total_instructions).sum::<usize>()
    }

    pub fn unresolved_count(&self) -> usize {
        self.instructions.iter().filter(|i| !i.is_resolved()).count()
            + self.functions.iter().map(Function::unresolved_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_display() {
        assert_eq!(Constant::Nil.to_string(), "nil");
        assert_eq!(Constant::Boolean(true).to_string(), "true");
        assert_eq!(Constant::Number(1.0).to_string(), "1");
        assert_eq!(Constant::Number(0.5).to_string(), "0.5");
        assert_eq!(Constant::String("a\"b".to_string()).to_string(), "\"a\\\"b\"");
    }

    #[test]
    fn test_assign_names_depth_first() {
        let mut root = Function::new();
        let mut child = Function::new();
        child.functions.push(Function::new());
        root.functions.push(child);
        root.functions.push(Function::new());
        root.assign_names();

        assert_eq!(root.name, "func_00000000");
        assert_eq!(root.functions[0].name, "func_00000001");
        assert_eq!(root.functions[0].functions[0].name, "func_00000002");
        assert_eq!(root.functions[1].name, "func_00000003");
        assert_eq!(root.function_count(), 4);
    }

    #[test]
    fn test_constant_lookup_rejects_negative() {
        let mut function = Function::new();
        function.constants.push(Constant::Nil);
        assert_eq!(function.constant(0), Some(&Constant::Nil));
        assert_eq!(function.constant(-1), None);
        assert_eq!(function.constant(1), None);
    }
}
