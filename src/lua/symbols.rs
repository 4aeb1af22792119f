// Tue Jan 13 2026 - Alex

use crate::lua::ast::*;
use crate::lua::visit::{walk_expression, walk_function, walk_statement, Visitor};
use std::collections::HashMap;

/// Usage statistics of a single variable name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolInfo {
    /// Value bound where the name was declared (or first assigned)
    pub value: Option<Expression>,
    pub reads: usize,
    /// Writes after the declaration
    pub assignments: usize,
    /// Pre-order ordinal of the declaring statement
    pub declaration: Option<usize>,
}

/// Flat name table for a tree whose locals have unique names.
///
/// Statements are numbered in pre-order as they are entered, so any walker
/// that counts statements the same way can tell whether it is standing on
/// the declaring statement of a name.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
        }
    }

    pub fn collect(block: &Block) -> Self {
        let mut collector = SymbolCollector {
            table: SymbolTable::new(),
            ordinal: 0,
        };
        collector.visit_block(block);
        collector.table
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn reads(&self, name: &str) -> usize {
        self.symbols.get(name).map_or(0, |info| info.reads)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn entry(&mut self, name: &str) -> &mut SymbolInfo {
        self.symbols.entry(name.to_string()).or_default()
    }

    fn declare(&mut self, name: &str, value: Option<Expression>, ordinal: usize) {
        let info = self.entry(name);
        if info.declaration.is_some() {
            info.assignments += 1;
        } else {
            info.declaration = Some(ordinal);
            info.value = value;
        }
    }
}

struct SymbolCollector {
    table: SymbolTable,
    ordinal: usize,
}

impl SymbolCollector {
    fn declare_function(&mut self, function: &FunctionBody, ordinal: usize) {
        for param in &function.params {
            self.table.declare(param, None, ordinal);
        }
        walk_function(self, function);
    }
}

impl Visitor for SymbolCollector {
    fn visit_statement(&mut self, stmt: &Statement) {
        let ordinal = self.ordinal;
        self.ordinal += 1;

        match stmt {
            Statement::Local { names, values } => {
                for value in values {
                    self.visit_expression(value);
                }
                for (i, name) in names.iter().enumerate() {
                    self.table.declare(name, values.get(i).cloned(), ordinal);
                }
            }
            Statement::LocalFunction { name, function } => {
                self.table
                    .declare(name, Some(Expression::Function(function.clone())), ordinal);
                self.declare_function(function, ordinal);
            }
            Statement::Function { function, .. } => {
                self.declare_function(function, ordinal);
            }
            Statement::Assign { targets, values } => {
                for target in targets {
                    if !matches!(target, Expression::Name(_)) {
                        self.visit_expression(target);
                    }
                }
                for value in values {
                    self.visit_expression(value);
                }
                for (i, target) in targets.iter().enumerate() {
                    if let Expression::Name(name) = target {
                        self.table.declare(name, values.get(i).cloned(), ordinal);
                    }
                }
            }
            Statement::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.visit_expression(start);
                self.visit_expression(limit);
                if let Some(step) = step {
                    self.visit_expression(step);
                }
                self.table.declare(var, None, ordinal);
                self.visit_block(body);
            }
            Statement::GenericFor { names, exprs, body } => {
                for expr in exprs {
                    self.visit_expression(expr);
                }
                for name in names {
                    self.table.declare(name, None, ordinal);
                }
                self.visit_block(body);
            }
            _ => walk_statement(self, stmt),
        }
    }

    fn visit_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Name(name) => self.table.entry(name).reads += 1,
            Expression::Function(function) => {
                let ordinal = self.ordinal.saturating_sub(1);
                self.declare_function(function, ordinal);
            }
            _ => walk_expression(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::parser::parse;

    #[test]
    fn test_reads_and_assignments() {
        let block = parse("local a = b[c]\nlocal d = a + 1\na = 2\nprint(d, d)").unwrap();
        let table = SymbolTable::collect(&block);

        let a = table.get("a").unwrap();
        assert_eq!(a.reads, 1);
        assert_eq!(a.assignments, 1);
        assert_eq!(a.declaration, Some(0));
        assert!(matches!(a.value, Some(Expression::Index { .. })));

        assert_eq!(table.reads("d"), 2);
        assert_eq!(table.reads("b"), 1);
        assert_eq!(table.reads("print"), 1);
    }

    #[test]
    fn test_first_assignment_declares_undeclared_name() {
        let block = parse("x = y\nif z then x = 1 end").unwrap();
        let table = SymbolTable::collect(&block);
        let x = table.get("x").unwrap();
        assert_eq!(x.declaration, Some(0));
        assert_eq!(x.assignments, 1);
        assert_eq!(x.reads, 0);
        assert_eq!(x.value, Some(Expression::name("y")));
    }

    #[test]
    fn test_index_targets_are_reads() {
        let block = parse("t[k] = v").unwrap();
        let table = SymbolTable::collect(&block);
        assert_eq!(table.reads("t"), 1);
        assert_eq!(table.reads("k"), 1);
        assert_eq!(table.reads("v"), 1);
    }

    #[test]
    fn test_statement_ordinals_are_preorder() {
        let block = parse("if a then local b = 1 end\nlocal c = 2").unwrap();
        let table = SymbolTable::collect(&block);
        assert_eq!(table.get("b").unwrap().declaration, Some(1));
        assert_eq!(table.get("c").unwrap().declaration, Some(2));
    }
}
