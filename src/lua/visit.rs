// Tue Jan 13 2026 - Alex

//! Read-only and mutating tree walkers.
//!
//! Implementors override the `visit_*` hooks they care about and call the
//! matching `walk_*` function to continue into children. Calling `walk_*`
//! before inspecting a node gives post-order behaviour, calling it after
//! gives pre-order. Children are always visited left to right in source
//! order: assignment targets before values, a call's function before its
//! arguments, a table before its key.

use crate::lua::ast::*;

pub trait Visitor {
    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        walk_statement(self, stmt);
    }

    fn visit_expression(&mut self, expr: &Expression) {
        walk_expression(self, expr);
    }

    fn visit_function(&mut self, function: &FunctionBody) {
        walk_function(self, function);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &Block) {
    for stmt in &block.statements {
        visitor.visit_statement(stmt);
    }
}

pub fn walk_function<V: Visitor + ?Sized>(visitor: &mut V, function: &FunctionBody) {
    visitor.visit_block(&function.body);
}

pub fn walk_statement<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Statement) {
    match stmt {
        Statement::Local { values, .. } => {
            for value in values {
                visitor.visit_expression(value);
            }
        }
        Statement::LocalFunction { function, .. } | Statement::Function { function, .. } => {
            visitor.visit_function(function);
        }
        Statement::Assign { targets, values } => {
            for target in targets {
                visitor.visit_expression(target);
            }
            for value in values {
                visitor.visit_expression(value);
            }
        }
        Statement::Call(call) => visitor.visit_expression(call),
        Statement::Do(body) => visitor.visit_block(body),
        Statement::While { condition, body } => {
            visitor.visit_expression(condition);
            visitor.visit_block(body);
        }
        Statement::Repeat { body, condition } => {
            visitor.visit_block(body);
            visitor.visit_expression(condition);
        }
        Statement::If {
            clause,
            else_ifs,
            else_body,
        } => {
            visitor.visit_expression(&clause.condition);
            visitor.visit_block(&clause.body);
            for else_if in else_ifs {
                visitor.visit_expression(&else_if.condition);
                visitor.visit_block(&else_if.body);
            }
            if let Some(body) = else_body {
                visitor.visit_block(body);
            }
        }
        Statement::NumericFor {
            start,
            limit,
            step,
            body,
            ..
        } => {
            visitor.visit_expression(start);
            visitor.visit_expression(limit);
            if let Some(step) = step {
                visitor.visit_expression(step);
            }
            visitor.visit_block(body);
        }
        Statement::GenericFor { exprs, body, .. } => {
            for expr in exprs {
                visitor.visit_expression(expr);
            }
            visitor.visit_block(body);
        }
        Statement::Return(values) => {
            for value in values {
                visitor.visit_expression(value);
            }
        }
        Statement::Break | Statement::Goto(_) | Statement::Label(_) => {}
    }
}

pub fn walk_expression<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expression) {
    match expr {
        Expression::Member { table, .. } => visitor.visit_expression(table),
        Expression::Index { table, key } => {
            visitor.visit_expression(table);
            visitor.visit_expression(key);
        }
        Expression::Call { function, args } => {
            visitor.visit_expression(function);
            for arg in args {
                visitor.visit_expression(arg);
            }
        }
        Expression::MethodCall { object, args, .. } => {
            visitor.visit_expression(object);
            for arg in args {
                visitor.visit_expression(arg);
            }
        }
        Expression::Function(function) => visitor.visit_function(function),
        Expression::Table(fields) => {
            for field in fields {
                match field {
                    TableField::Positional(value) | TableField::Named(_, value) => {
                        visitor.visit_expression(value);
                    }
                    TableField::Keyed(key, value) => {
                        visitor.visit_expression(key);
                        visitor.visit_expression(value);
                    }
                }
            }
        }
        Expression::Binary { left, right, .. } => {
            visitor.visit_expression(left);
            visitor.visit_expression(right);
        }
        Expression::Unary { operand, .. } => visitor.visit_expression(operand),
        Expression::Paren(inner) => visitor.visit_expression(inner),
        Expression::Nil
        | Expression::Boolean(_)
        | Expression::Number(_)
        | Expression::String(_)
        | Expression::Vararg
        | Expression::Name(_) => {}
    }
}

pub trait VisitorMut {
    fn visit_block_mut(&mut self, block: &mut Block) {
        walk_block_mut(self, block);
    }

    fn visit_statement_mut(&mut self, stmt: &mut Statement) {
        walk_statement_mut(self, stmt);
    }

    fn visit_expression_mut(&mut self, expr: &mut Expression) {
        walk_expression_mut(self, expr);
    }

    fn visit_function_mut(&mut self, function: &mut FunctionBody) {
        walk_function_mut(self, function);
    }
}

pub fn walk_block_mut<V: VisitorMut + ?Sized>(visitor: &mut V, block: &mut Block) {
    for stmt in &mut block.statements {
        visitor.visit_statement_mut(stmt);
    }
}

pub fn walk_function_mut<V: VisitorMut + ?Sized>(visitor: &mut V, function: &mut FunctionBody) {
    visitor.visit_block_mut(&mut function.body);
}

pub fn walk_statement_mut<V: VisitorMut + ?Sized>(visitor: &mut V, stmt: &mut Statement) {
    match stmt {
        Statement::Local { values, .. } => {
            for value in values {
                visitor.visit_expression_mut(value);
            }
        }
        Statement::LocalFunction { function, .. } | Statement::Function { function, .. } => {
            visitor.visit_function_mut(function);
        }
        Statement::Assign { targets, values } => {
            for target in targets {
                visitor.visit_expression_mut(target);
            }
            for value in values {
                visitor.visit_expression_mut(value);
            }
        }
        Statement::Call(call) => visitor.visit_expression_mut(call),
        Statement::Do(body) => visitor.visit_block_mut(body),
        Statement::While { condition, body } => {
            visitor.visit_expression_mut(condition);
            visitor.visit_block_mut(body);
        }
        Statement::Repeat { body, condition } => {
            visitor.visit_block_mut(body);
            visitor.visit_expression_mut(condition);
        }
        Statement::If {
            clause,
            else_ifs,
            else_body,
        } => {
            visitor.visit_expression_mut(&mut clause.condition);
            visitor.visit_block_mut(&mut clause.body);
            for else_if in else_ifs {
                visitor.visit_expression_mut(&mut else_if.condition);
                visitor.visit_block_mut(&mut else_if.body);
            }
            if let Some(body) = else_body {
                visitor.visit_block_mut(body);
            }
        }
        Statement::NumericFor {
            start,
            limit,
            step,
            body,
            ..
        } => {
            visitor.visit_expression_mut(start);
            visitor.visit_expression_mut(limit);
            if let Some(step) = step {
                visitor.visit_expression_mut(step);
            }
            visitor.visit_block_mut(body);
        }
        Statement::GenericFor { exprs, body, .. } => {
            for expr in exprs {
                visitor.visit_expression_mut(expr);
            }
            visitor.visit_block_mut(body);
        }
        Statement::Return(values) => {
            for value in values {
                visitor.visit_expression_mut(value);
            }
        }
        Statement::Break | Statement::Goto(_) | Statement::Label(_) => {}
    }
}

pub fn walk_expression_mut<V: VisitorMut + ?Sized>(visitor: &mut V, expr: &mut Expression) {
    match expr {
        Expression::Member { table, .. } => visitor.visit_expression_mut(table),
        Expression::Index { table, key } => {
            visitor.visit_expression_mut(table);
            visitor.visit_expression_mut(key);
        }
        Expression::Call { function, args } => {
            visitor.visit_expression_mut(function);
            for arg in args {
                visitor.visit_expression_mut(arg);
            }
        }
        Expression::MethodCall { object, args, .. } => {
            visitor.visit_expression_mut(object);
            for arg in args {
                visitor.visit_expression_mut(arg);
            }
        }
        Expression::Function(function) => visitor.visit_function_mut(function),
        Expression::Table(fields) => {
            for field in fields {
                match field {
                    TableField::Positional(value) | TableField::Named(_, value) => {
                        visitor.visit_expression_mut(value);
                    }
                    TableField::Keyed(key, value) => {
                        visitor.visit_expression_mut(key);
                        visitor.visit_expression_mut(value);
                    }
                }
            }
        }
        Expression::Binary { left, right, .. } => {
            visitor.visit_expression_mut(left);
            visitor.visit_expression_mut(right);
        }
        Expression::Unary { operand, .. } => visitor.visit_expression_mut(operand),
        Expression::Paren(inner) => visitor.visit_expression_mut(inner),
        Expression::Nil
        | Expression::Boolean(_)
        | Expression::Number(_)
        | Expression::String(_)
        | Expression::Vararg
        | Expression::Name(_) => {}
    }
}
