// Tue Jan 13 2026 - Alex

use crate::lua::ast::*;
use crate::lua::error::EvalError;
use crate::lua::parser::parse_expression;
use crate::lua::printer::expression_to_string;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Vec<u8>),
    Table(Vec<Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
        }
    }

    /// Lua's implicit string-to-number coercion
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(bytes) => parse_number(&String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }

    fn to_concat_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::String(bytes) => Some(bytes.clone()),
            Value::Number(n) => Some(crate::lua::printer::format_number(*n).into_bytes()),
            _ => None,
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    text.parse::<f64>().ok()
}

/// Evaluates side-effect free expressions over literals.
///
/// Only a handful of pure builtins are understood; anything touching
/// variables or unknown functions is rejected.
pub struct LiteralEvaluator;

impl LiteralEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates `return <expr>` (or a bare expression) to a number
    pub fn evaluate_source(&self, source: &str) -> Result<f64, EvalError> {
        let trimmed = source.trim();
        let body = trimmed.strip_prefix("return").unwrap_or(trimmed);
        let expr = parse_expression(body)?;
        self.evaluate_number(&expr)
    }

    pub fn evaluate_number(&self, expr: &Expression) -> Result<f64, EvalError> {
        let value = self.evaluate(expr)?;
        value
            .to_number()
            .ok_or_else(|| EvalError::NotANumber(expression_to_string(expr)))
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value, EvalError> {
        Ok(self
            .evaluate_multi(expr)?
            .into_iter()
            .next()
            .unwrap_or(Value::Nil))
    }

    fn evaluate_multi(&self, expr: &Expression) -> Result<Vec<Value>, EvalError> {
        let value = match expr {
            Expression::Nil => Value::Nil,
            Expression::Boolean(b) => Value::Boolean(*b),
            Expression::Number(n) => Value::Number(*n),
            Expression::String(s) => Value::String(s.bytes()),
            Expression::Paren(inner) => self.evaluate(inner)?,
            Expression::Table(fields) => {
                let mut items = Vec::new();
                for field in fields {
                    match field {
                        TableField::Positional(value) => items.push(self.evaluate(value)?),
                        _ => return Err(EvalError::Unsupported(expression_to_string(expr))),
                    }
                }
                Value::Table(items)
            }
            Expression::Unary { op, operand } => self.unary(*op, self.evaluate(operand)?, expr)?,
            Expression::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let l = self.evaluate(left)?;
                    if l.is_truthy() {
                        self.evaluate(right)?
                    } else {
                        l
                    }
                }
                BinaryOp::Or => {
                    let l = self.evaluate(left)?;
                    if l.is_truthy() {
                        l
                    } else {
                        self.evaluate(right)?
                    }
                }
                _ => self.binary(*op, self.evaluate(left)?, self.evaluate(right)?, expr)?,
            },
            Expression::Call { function, args } => {
                let name = builtin_name(function)
                    .ok_or_else(|| EvalError::Unsupported(expression_to_string(function)))?;
                let args = self.evaluate_args(args)?;
                return self.call_builtin(&name, args);
            }
            Expression::MethodCall { object, method, args } => {
                let receiver = self.evaluate(object)?;
                if !matches!(receiver, Value::String(_)) {
                    return Err(EvalError::Unsupported(expression_to_string(expr)));
                }
                let mut all = vec![receiver];
                all.extend(self.evaluate_args(args)?);
                return self.call_builtin(&format!("string.{}", method), all);
            }
            _ => return Err(EvalError::Unsupported(expression_to_string(expr))),
        };
        Ok(vec![value])
    }

    fn evaluate_args(&self, args: &[Expression]) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if i + 1 == args.len() {
                values.extend(self.evaluate_multi(arg)?);
            } else {
                values.push(self.evaluate(arg)?);
            }
        }
        Ok(values)
    }

    fn unary(&self, op: UnaryOp, value: Value, expr: &Expression) -> Result<Value, EvalError> {
        match op {
            UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
            UnaryOp::Negate => value
                .to_number()
                .map(|n| Value::Number(-n))
                .ok_or_else(|| EvalError::NotANumber(expression_to_string(expr))),
            UnaryOp::Length => match value {
                Value::String(bytes) => Ok(Value::Number(bytes.len() as f64)),
                Value::Table(items) => Ok(Value::Number(items.len() as f64)),
                other => Err(EvalError::BadArgument(format!("# on {}", other.type_name()))),
            },
        }
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value, expr: &Expression) -> Result<Value, EvalError> {
        if op == BinaryOp::Concat {
            let mut bytes = left
                .to_concat_bytes()
                .ok_or_else(|| EvalError::BadArgument(format!("concatenate {}", left.type_name())))?;
            let tail = right
                .to_concat_bytes()
                .ok_or_else(|| EvalError::BadArgument(format!("concatenate {}", right.type_name())))?;
            bytes.extend(tail);
            return Ok(Value::String(bytes));
        }

        match op {
            BinaryOp::Eq => return Ok(Value::Boolean(left == right)),
            BinaryOp::Ne => return Ok(Value::Boolean(left != right)),
            _ => {}
        }

        if op.is_comparison() {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| EvalError::BadArgument(format!("compare {} with {}", left.type_name(), right.type_name())))?;

            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Value::Boolean(result));
        }

        let not_a_number = || EvalError::NotANumber(expression_to_string(expr));
        let a = left.to_number().ok_or_else(not_a_number)?;
        let b = right.to_number().ok_or_else(not_a_number)?;

        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a - (a / b).floor() * b,
            BinaryOp::Pow => a.powf(b),
            _ => return Err(EvalError::Unsupported(expression_to_string(expr))),
        };
        Ok(Value::Number(result))
    }

    fn call_builtin(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
        let number_arg = |i: usize| -> Result<f64, EvalError> {
            args.get(i)
                .and_then(Value::to_number)
                .ok_or_else(|| EvalError::BadArgument(format!("#{} to '{}'", i + 1, name)))
        };
        let string_arg = |i: usize| -> Result<Vec<u8>, EvalError> {
            match args.get(i) {
                Some(Value::String(bytes)) => Ok(bytes.clone()),
                Some(Value::Number(n)) => Ok(crate::lua::printer::format_number(*n).into_bytes()),
                _ => Err(EvalError::BadArgument(format!("#{} to '{}'", i + 1, name))),
            }
        };

        let result = match name {
            "tonumber" => {
                let value = match (args.first(), args.get(1)) {
                    (Some(Value::String(bytes)), Some(base)) => {
                        let base = base.to_number().unwrap_or(10.0) as u32;
                        let text = String::from_utf8_lossy(bytes);
                        i64::from_str_radix(text.trim(), base)
                            .map(|v| Value::Number(v as f64))
                            .unwrap_or(Value::Nil)
                    }
                    (Some(value), _) => value.to_number().map(Value::Number).unwrap_or(Value::Nil),
                    (None, _) => return Err(EvalError::BadArgument("#1 to 'tonumber'".to_string())),
                };
                vec![value]
            }
            "math.floor" => vec![Value::Number(number_arg(0)?.floor())],
            "math.abs" => vec![Value::Number(number_arg(0)?.abs())],
            "string.len" => vec![Value::Number(string_arg(0)?.len() as f64)],
            "string.byte" => {
                let bytes = string_arg(0)?;
                let len = bytes.len() as i64;
                let start = args.get(1).and_then(Value::to_number).unwrap_or(1.0) as i64;
                let end = args.get(2).and_then(Value::to_number).map(|n| n as i64).unwrap_or(start);
                let resolve = |i: i64| if i < 0 { len + i + 1 } else { i };
                let (start, end) = (resolve(start).max(1), resolve(end).min(len));
                (start..=end)
                    .filter_map(|i| bytes.get((i - 1) as usize))
                    .map(|&b| Value::Number(b as f64))
                    .collect()
            }
            "select" => match args.first() {
                Some(Value::String(selector)) if selector == b"#" => {
                    vec![Value::Number((args.len() - 1) as f64)]
                }
                Some(_) => {
                    let n = number_arg(0)?;
                    let count = args.len() as i64 - 1;
                    let index = if n < 0.0 { count + n as i64 + 1 } else { n as i64 };
                    if index < 1 {
                        return Err(EvalError::BadArgument("#1 to 'select'".to_string()));
                    }
                    args.iter().skip(index as usize).cloned().collect()
                }
                None => return Err(EvalError::BadArgument("#1 to 'select'".to_string())),
            },
            other => return Err(EvalError::UnknownFunction(other.to_string())),
        };
        Ok(result)
    }
}

impl Default for LiteralEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// `name` or `lib.name` of a called builtin
fn builtin_name(function: &Expression) -> Option<String> {
    match function {
        Expression::Name(name) => Some(name.clone()),
        Expression::Member { table, key } => table.as_name().map(|lib| format!("{}.{}", lib, key)),
        Expression::Paren(inner) => builtin_name(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> f64 {
        LiteralEvaluator::new().evaluate_source(source).unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("return 1 + 2 * 3"), 7.0);
        assert_eq!(eval("return (1 + 2) * 3"), 9.0);
        assert_eq!(eval("return 2 ^ 10"), 1024.0);
        assert_eq!(eval("return -7 % 3"), 2.0);
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("return 3 + tonumber(\"4\")"), 7.0);
        assert_eq!(eval("return tonumber(\"ff\", 16)"), 255.0);
        assert_eq!(eval("return math.floor(7 / 2)"), 3.0);
        assert_eq!(eval("return math.abs(-5)"), 5.0);
        assert_eq!(eval("return string.len(\"abcd\")"), 4.0);
        assert_eq!(eval("return string.byte(\"A\")"), 65.0);
        assert_eq!(eval("return (\"AB\"):byte(2)"), 66.0);
        assert_eq!(eval("return select(\"#\", 1, 2, 3)"), 3.0);
        assert_eq!(eval("return #\"hello\" + #{1, 2}"), 7.0);
    }

    #[test]
    fn test_rejects_variables() {
        let evaluator = LiteralEvaluator::new();
        assert!(matches!(evaluator.evaluate_source("return x + 1"), Err(EvalError::Unsupported(_))));
        assert!(matches!(
            evaluator.evaluate_source("return os.time()"),
            Err(EvalError::UnknownFunction(_))
        ));
        assert!(matches!(evaluator.evaluate_source("return \"a\""), Err(EvalError::NotANumber(_))));
    }
}
