// Tue Jan 13 2026 - Alex

use crate::lua::ast::*;
use itertools::Itertools;

/// Renders an AST back into Lua source
pub struct Printer {
    indent: String,
    level: usize,
    output: String,
}

impl Printer {
    pub fn new() -> Self {
        Self {
            indent: "    ".to_string(),
            level: 0,
            output: String::new(),
        }
    }

    pub fn with_indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    pub fn print(mut self, block: &Block) -> String {
        self.write_block(block);
        self.output
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.level {
            self.output.push_str(&self.indent);
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn write_block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.write_statement(stmt);
        }
    }

    fn write_nested(&mut self, block: &Block) {
        self.level += 1;
        self.write_block(block);
        self.level -= 1;
    }

    fn write_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Local { names, values } => {
                let mut text = format!("local {}", names.join(", "));
                if !values.is_empty() {
                    text.push_str(" = ");
                    text.push_str(&expression_list(values));
                }
                self.line(&text);
            }
            Statement::LocalFunction { name, function } => {
                self.line(&format!("local function {}({})", name, parameter_list(function, false)));
                self.write_nested(&function.body);
                self.line("end");
            }
            Statement::Function { name, function } => {
                let mut target = name.path.join(".");
                if let Some(method) = &name.method {
                    target.push(':');
                    target.push_str(method);
                }
                let params = parameter_list(function, name.method.is_some());
                self.line(&format!("function {}({})", target, params));
                self.write_nested(&function.body);
                self.line("end");
            }
            Statement::Assign { targets, values } => {
                self.line(&format!("{} = {}", expression_list(targets), expression_list(values)));
            }
            Statement::Call(call) => {
                let text = expression_to_string(call);
                self.line(&text);
            }
            Statement::Do(body) => {
                self.line("do");
                self.write_nested(body);
                self.line("end");
            }
            Statement::While { condition, body } => {
                self.line(&format!("while {} do", expression_to_string(condition)));
                self.write_nested(body);
                self.line("end");
            }
            Statement::Repeat { body, condition } => {
                self.line("repeat");
                self.write_nested(body);
                self.line(&format!("until {}", expression_to_string(condition)));
            }
            Statement::If {
                clause,
                else_ifs,
                else_body,
            } => {
                self.line(&format!("if {} then", expression_to_string(&clause.condition)));
                self.write_nested(&clause.body);
                for else_if in else_ifs {
                    self.line(&format!("elseif {} then", expression_to_string(&else_if.condition)));
                    self.write_nested(&else_if.body);
                }
                if let Some(body) = else_body {
                    self.line("else");
                    self.write_nested(body);
                }
                self.line("end");
            }
            Statement::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                let mut header = format!(
                    "for {} = {}, {}",
                    var,
                    expression_to_string(start),
                    expression_to_string(limit)
                );
                if let Some(step) = step {
                    header.push_str(", ");
                    header.push_str(&expression_to_string(step));
                }
                header.push_str(" do");
                self.line(&header);
                self.write_nested(body);
                self.line("end");
            }
            Statement::GenericFor { names, exprs, body } => {
                self.line(&format!("for {} in {} do", names.join(", "), expression_list(exprs)));
                self.write_nested(body);
                self.line("end");
            }
            Statement::Return(values) => {
                if values.is_empty() {
                    self.line("return");
                } else {
                    self.line(&format!("return {}", expression_list(values)));
                }
            }
            Statement::Break => self.line("break"),
            Statement::Goto(label) => self.line(&format!("goto {}", label)),
            Statement::Label(label) => self.line(&format!("::{}::", label)),
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn print_block(block: &Block) -> String {
    Printer::new().print(block)
}

pub fn expression_to_string(expr: &Expression) -> String {
    let mut out = String::new();
    write_expression(&mut out, expr);
    out
}

fn expression_list(exprs: &[Expression]) -> String {
    exprs.iter().map(expression_to_string).join(", ")
}

fn parameter_list(function: &FunctionBody, skip_self: bool) -> String {
    let mut params: Vec<&str> = function
        .params
        .iter()
        .skip(if skip_self { 1 } else { 0 })
        .map(String::as_str)
        .collect();
    if function.is_vararg {
        params.push("...");
    }
    params.join(", ")
}

/// Lua spelling of a number literal
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "(0/0)".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "math.huge".to_string()
        } else {
            "-math.huge".to_string()
        }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Escapes raw bytes into the body of a double-quoted Lua string
pub fn escape_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
    out
}

fn write_string(out: &mut String, literal: &StringLiteral) {
    match literal.delimiter {
        StringDelimiter::Double => {
            out.push('"');
            out.push_str(&literal.raw);
            out.push('"');
        }
        StringDelimiter::Single => {
            out.push('\'');
            out.push_str(&literal.raw);
            out.push('\'');
        }
        StringDelimiter::Long(level) => {
            let eq = "=".repeat(level);
            out.push('[');
            out.push_str(&eq);
            out.push('[');
            if literal.raw.starts_with('\n') {
                out.push('\n');
            }
            out.push_str(&literal.raw);
            out.push(']');
            out.push_str(&eq);
            out.push(']');
        }
    }
}

fn precedence(expr: &Expression) -> Option<u8> {
    match expr {
        Expression::Binary { op, .. } => Some(op.priority().0),
        Expression::Unary { .. } => Some(UNARY_PRIORITY),
        Expression::Number(n) if n.is_sign_negative() && *n != 0.0 => Some(UNARY_PRIORITY),
        _ => None,
    }
}

fn write_operand(out: &mut String, expr: &Expression, parent: BinaryOp, is_left: bool) {
    let (left, right) = parent.priority();
    let needs_parens = match precedence(expr) {
        Some(child) if child < left => true,
        Some(child) if child == left => {
            let right_assoc = left > right;
            if is_left {
                right_assoc
            } else {
                !right_assoc
            }
        }
        _ => false,
    };

    if needs_parens {
        out.push('(');
        write_expression(out, expr);
        out.push(')');
    } else {
        write_expression(out, expr);
    }
}

fn write_prefix(out: &mut String, expr: &Expression) {
    match expr {
        Expression::Name(_)
        | Expression::Member { .. }
        | Expression::Index { .. }
        | Expression::Call { .. }
        | Expression::MethodCall { .. }
        | Expression::Paren(_) => write_expression(out, expr),
        _ => {
            out.push('(');
            write_expression(out, expr);
            out.push(')');
        }
    }
}

fn write_arguments(out: &mut String, args: &[Expression]) {
    out.push('(');
    out.push_str(&expression_list(args));
    out.push(')');
}

fn write_expression(out: &mut String, expr: &Expression) {
    match expr {
        Expression::Nil => out.push_str("nil"),
        Expression::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Expression::Number(n) => out.push_str(&format_number(*n)),
        Expression::String(s) => write_string(out, s),
        Expression::Vararg => out.push_str("..."),
        Expression::Name(name) => out.push_str(name),
        Expression::Member { table, key } => {
            write_prefix(out, table);
            out.push('.');
            out.push_str(key);
        }
        Expression::Index { table, key } => {
            write_prefix(out, table);
            out.push('[');
            write_expression(out, key);
            out.push(']');
        }
        Expression::Call { function, args } => {
            write_prefix(out, function);
            write_arguments(out, args);
        }
        Expression::MethodCall { object, method, args } => {
            write_prefix(out, object);
            out.push(':');
            out.push_str(method);
            write_arguments(out, args);
        }
        Expression::Function(function) => {
            let mut printer = Printer::new();
            printer.level = 1;
            printer.write_block(&function.body);
            out.push_str(&format!("function({})\n", parameter_list(function, false)));
            out.push_str(&printer.output);
            out.push_str("end");
        }
        Expression::Table(fields) => {
            out.push('{');
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match field {
                    TableField::Positional(value) => write_expression(out, value),
                    TableField::Named(name, value) => {
                        out.push_str(name);
                        out.push_str(" = ");
                        write_expression(out, value);
                    }
                    TableField::Keyed(key, value) => {
                        out.push('[');
                        write_expression(out, key);
                        out.push_str("] = ");
                        write_expression(out, value);
                    }
                }
            }
            out.push('}');
        }
        Expression::Binary { op, left, right } => {
            write_operand(out, left, *op, true);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_operand(out, right, *op, false);
        }
        Expression::Unary { op, operand } => {
            out.push_str(op.symbol());
            let wrap = matches!(precedence(operand), Some(p) if p < UNARY_PRIORITY)
                || (*op == UnaryOp::Negate && matches!(**operand, Expression::Unary { op: UnaryOp::Negate, .. }))
                || (*op == UnaryOp::Negate && matches!(**operand, Expression::Number(n) if n.is_sign_negative()));
            if wrap {
                out.push('(');
                write_expression(out, operand);
                out.push(')');
            } else {
                write_expression(out, operand);
            }
        }
        Expression::Paren(inner) => {
            out.push('(');
            write_expression(out, inner);
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::parser::{parse, parse_expression};

    fn roundtrip_expr(source: &str) -> String {
        expression_to_string(&parse_expression(source).unwrap())
    }

    #[test]
    fn test_parenthesizes_by_precedence() {
        assert_eq!(roundtrip_expr("(a + b) * c"), "(a + b) * c");
        assert_eq!(roundtrip_expr("a - (b - c)"), "a - (b - c)");
        assert_eq!(roundtrip_expr("(a .. b) .. c"), "(a .. b) .. c");
        assert_eq!(roundtrip_expr("a .. b .. c"), "a .. b .. c");
        assert_eq!(roundtrip_expr("(-x) ^ 2"), "(-x) ^ 2");
    }

    #[test]
    fn test_prefix_wrapping() {
        assert_eq!(roundtrip_expr("(\"x\"):rep(2)"), "(\"x\"):rep(2)");
        assert_eq!(roundtrip_expr("(f())"), "(f())");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(f64::INFINITY), "math.huge");
    }

    #[test]
    fn test_statements_reparse() {
        let source = "local a = {1, x = 2}\nif a then\n    print(a.x)\nelse\n    return\nend\n";
        let printed = print_block(&parse(source).unwrap());
        assert_eq!(printed, source);
        assert_eq!(parse(&printed).unwrap(), parse(source).unwrap());
    }

    #[test]
    fn test_raw_strings_survive() {
        let source = "local s = \"\\4\\8\\0abc\"\n";
        assert_eq!(print_block(&parse(source).unwrap()), source);
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string(b"a\"b\n\x01"), "a\\\"b\\n\\001");
    }
}
