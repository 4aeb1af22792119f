// Tue Jan 13 2026 - Alex

use crate::lua::visit::{walk_expression_mut, VisitorMut};
use crate::lua::{Block, Expression, FunctionBody, IfClause, Statement};
use std::collections::HashMap;

/// Prefix of every name the renamer invents
pub const SYNTHETIC_PREFIX: &str = "_L";

pub fn is_synthetic(name: &str) -> bool {
    name.starts_with(SYNTHETIC_PREFIX)
}

/// Scope-aware local renamer.
///
/// Every declared local (locals, parameters, loop variables, local
/// functions) gets a unique name: the mapped role name when one is known,
/// `_L<n>` otherwise. References resolve through the scope chain, and names
/// never declared (globals) are left alone.
pub struct Renamer {
    names: HashMap<String, String>,
    scopes: Vec<HashMap<String, String>>,
    counter: usize,
}

impl Renamer {
    pub fn new() -> Self {
        Self::with_names(HashMap::new())
    }

    pub fn with_names(names: HashMap<String, String>) -> Self {
        Self {
            names,
            scopes: vec![HashMap::new()],
            counter: 0,
        }
    }

    /// Renames in place, returning the number of declarations seen
    pub fn rename(mut self, block: &mut Block) -> usize {
        self.visit_block_mut(block);
        self.counter
    }

    fn define(&mut self, name: &mut String) {
        let fresh = match self.names.get(name.as_str()) {
            Some(role) => role.clone(),
            None => format!("{}{}", SYNTHETIC_PREFIX, self.counter),
        };
        self.counter += 1;

        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(std::mem::take(name), fresh.clone());
        }
        *name = fresh;
    }

    fn resolve(&self, name: &mut String) {
        if let Some(renamed) = self.scopes.iter().rev().find_map(|scope| scope.get(name.as_str())) {
            *name = renamed.clone();
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    fn scoped_block(&mut self, block: &mut Block) {
        self.scopes.push(HashMap::new());
        self.visit_block_mut(block);
        self.scopes.pop();
    }

    fn function_body(&mut self, function: &mut FunctionBody) {
        self.scopes.push(HashMap::new());
        for param in &mut function.params {
            self.define(param);
        }
        self.visit_block_mut(&mut function.body);
        self.scopes.pop();
    }

    fn clause(&mut self, clause: &mut IfClause) {
        self.visit_expression_mut(&mut clause.condition);
        self.scoped_block(&mut clause.body);
    }
}

impl Default for Renamer {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitorMut for Renamer {
    fn visit_statement_mut(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::Local { names, values } => {
                for value in values.iter_mut() {
                    self.visit_expression_mut(value);
                }
                for name in names.iter_mut() {
                    self.define(name);
                }
            }
            Statement::LocalFunction { name, function } => {
                self.define(name);
                self.function_body(function);
            }
            Statement::Function { name, function } => {
                if let Some(root) = name.path.first_mut() {
                    // `function f()` only renames when f is a known local
                    if self.is_defined(root) {
                        self.resolve(root);
                    }
                }
                self.function_body(function);
            }
            Statement::Assign { targets, values } => {
                for value in values.iter_mut() {
                    self.visit_expression_mut(value);
                }
                for target in targets.iter_mut() {
                    self.visit_expression_mut(target);
                }
            }
            Statement::Do(body) => self.scoped_block(body),
            Statement::While { condition, body } => {
                self.visit_expression_mut(condition);
                self.scoped_block(body);
            }
            Statement::Repeat { body, condition } => {
                // the condition sees the body's locals
                self.scopes.push(HashMap::new());
                self.visit_block_mut(body);
                self.visit_expression_mut(condition);
                self.scopes.pop();
            }
            Statement::If {
                clause,
                else_ifs,
                else_body,
            } => {
                self.clause(clause);
                for else_if in else_ifs.iter_mut() {
                    self.clause(else_if);
                }
                if let Some(body) = else_body {
                    self.scoped_block(body);
                }
            }
            Statement::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.visit_expression_mut(start);
                self.visit_expression_mut(limit);
                if let Some(step) = step {
                    self.visit_expression_mut(step);
                }
                self.scopes.push(HashMap::new());
                self.define(var);
                self.visit_block_mut(body);
                self.scopes.pop();
            }
            Statement::GenericFor { names, exprs, body } => {
                for expr in exprs.iter_mut() {
                    self.visit_expression_mut(expr);
                }
                self.scopes.push(HashMap::new());
                for name in names.iter_mut() {
                    self.define(name);
                }
                self.visit_block_mut(body);
                self.scopes.pop();
            }
            Statement::Call(call) => self.visit_expression_mut(call),
            Statement::Return(values) => {
                for value in values.iter_mut() {
                    self.visit_expression_mut(value);
                }
            }
            Statement::Break | Statement::Goto(_) | Statement::Label(_) => {}
        }
    }

    fn visit_expression_mut(&mut self, expr: &mut Expression) {
        match expr {
            Expression::Name(name) => self.resolve(name),
            Expression::Function(function) => self.function_body(function),
            _ => walk_expression_mut(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::{parse, print_block};

    fn rename(source: &str) -> String {
        let mut block = parse(source).unwrap();
        Renamer::new().rename(&mut block);
        print_block(&block)
    }

    #[test]
    fn test_locals_and_globals() {
        assert_eq!(rename("local a = 1\nprint(a, b)"), "local _L0 = 1\nprint(_L0, b)\n");
    }

    #[test]
    fn test_shadowing_gets_fresh_names() {
        let out = rename("local a = 1\ndo\n    local a = a\n    f(a)\nend\nf(a)");
        assert_eq!(out, "local _L0 = 1\ndo\n    local _L1 = _L0\n    f(_L1)\nend\nf(_L0)\n");
    }

    #[test]
    fn test_functions_and_loops() {
        let out = rename("local function g(x, y) return x + y end\nfor i = 1, 2 do g(i) end");
        assert_eq!(
            out,
            "local function _L0(_L1, _L2)\n    return _L1 + _L2\nend\nfor _L3 = 1, 2 do\n    _L0(_L3)\nend\n"
        );
    }

    #[test]
    fn test_assignment_resolves_values_first() {
        assert_eq!(rename("local a\na = a + 1\nx = a"), "local _L0\n_L0 = _L0 + 1\nx = _L0\n");
    }

    #[test]
    fn test_identified_names() {
        let mut block = parse("local a, b = 1, 2\nreturn a, b").unwrap();
        Renamer::new().rename(&mut block);

        let names = HashMap::from([("_L1".to_string(), "stk".to_string())]);
        Renamer::with_names(names).rename(&mut block);
        assert_eq!(print_block(&block), "local _L0, stk = 1, 2\nreturn _L0, stk\n");
    }

    #[test]
    fn test_repeat_condition_sees_body_locals() {
        let out = rename("repeat local done = f() until done");
        assert_eq!(out, "repeat\n    local _L0 = f()\nuntil _L0\n");
    }

    #[test]
    fn test_synthetic_prefix() {
        assert!(is_synthetic("_L12"));
        assert!(!is_synthetic("stk"));
    }
}
