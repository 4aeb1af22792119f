// Tue Jan 13 2026 - Alex

use std::fmt;

/// A sequence of statements (chunk, function body, loop body, ...)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
        }
    }

    pub fn from_statements(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Block,
}

impl FunctionBody {
    pub fn new(params: Vec<String>, is_vararg: bool, body: Block) -> Self {
        Self { params, is_vararg, body }
    }
}

/// `function a.b.c:m() end` target path
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionName {
    pub path: Vec<String>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub condition: Expression,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Local {
        names: Vec<String>,
        values: Vec<Expression>,
    },
    LocalFunction {
        name: String,
        function: FunctionBody,
    },
    Function {
        name: FunctionName,
        function: FunctionBody,
    },
    Assign {
        targets: Vec<Expression>,
        values: Vec<Expression>,
    },
    Call(Expression),
    Do(Block),
    While {
        condition: Expression,
        body: Block,
    },
    Repeat {
        body: Block,
        condition: Expression,
    },
    If {
        clause: IfClause,
        else_ifs: Vec<IfClause>,
        else_body: Option<Block>,
    },
    NumericFor {
        var: String,
        start: Expression,
        limit: Expression,
        step: Option<Expression>,
        body: Block,
    },
    GenericFor {
        names: Vec<String>,
        exprs: Vec<Expression>,
        body: Block,
    },
    Return(Vec<Expression>),
    Break,
    Goto(String),
    Label(String),
}

impl Statement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Local { .. } => "local",
            Statement::LocalFunction { .. } => "local function",
            Statement::Function { .. } => "function",
            Statement::Assign { .. } => "assign",
            Statement::Call(_) => "call",
            Statement::Do(_) => "do",
            Statement::While { .. } => "while",
            Statement::Repeat { .. } => "repeat",
            Statement::If { .. } => "if",
            Statement::NumericFor { .. } => "numeric for",
            Statement::GenericFor { .. } => "generic for",
            Statement::Return(_) => "return",
            Statement::Break => "break",
            Statement::Goto(_) => "goto",
            Statement::Label(_) => "label",
        }
    }

    /// Builds `if cond then body else else_body end`
    pub fn if_else(condition: Expression, body: Block, else_body: Block) -> Self {
        Statement::If {
            clause: IfClause { condition, body },
            else_ifs: Vec::new(),
            else_body: Some(else_body),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringDelimiter {
    Double,
    Single,
    /// `[==[ ... ]==]` with the number of `=` signs
    Long(usize),
}

/// String literal kept as written in the source: escapes are not resolved,
/// so encoded payloads round-trip byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub raw: String,
    pub delimiter: StringDelimiter,
}

impl StringLiteral {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            delimiter: StringDelimiter::Double,
        }
    }

    pub fn with_delimiter(raw: impl Into<String>, delimiter: StringDelimiter) -> Self {
        Self {
            raw: raw.into(),
            delimiter,
        }
    }

    /// Resolves escape sequences into the bytes the string denotes
    pub fn bytes(&self) -> Vec<u8> {
        if let StringDelimiter::Long(_) = self.delimiter {
            return self.raw.as_bytes().to_vec();
        }

        let mut out = Vec::with_capacity(self.raw.len());
        let bytes = self.raw.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if b != b'\\' || i + 1 >= bytes.len() {
                out.push(b);
                i += 1;
                continue;
            }

            let esc = bytes[i + 1];
            i += 2;
            match esc {
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'a' => out.push(0x07),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0C),
                b'v' => out.push(0x0B),
                b'x' => {
                    let mut value = 0u32;
                    let mut digits = 0;
                    while digits < 2 && i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        value = value * 16 + (bytes[i] as char).to_digit(16).unwrap_or(0);
                        i += 1;
                        digits += 1;
                    }
                    out.push(value as u8);
                }
                b'0'..=b'9' => {
                    let mut value = (esc - b'0') as u32;
                    let mut digits = 1;
                    while digits < 3 && i < bytes.len() && bytes[i].is_ascii_digit() {
                        value = value * 10 + (bytes[i] - b'0') as u32;
                        i += 1;
                        digits += 1;
                    }
                    out.push(value as u8);
                }
                b'\n' => out.push(b'\n'),
                other => out.push(other),
            }
        }

        out
    }

    pub fn value(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableField {
    Positional(Expression),
    Named(String, Expression),
    Keyed(Expression, Expression),
}

impl TableField {
    pub fn value(&self) -> &Expression {
        match self {
            TableField::Positional(value) => value,
            TableField::Named(_, value) => value,
            TableField::Keyed(_, value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Nil,
    Boolean(bool),
    Number(f64),
    String(StringLiteral),
    Vararg,
    Name(String),
    Member {
        table: Box<Expression>,
        key: String,
    },
    Index {
        table: Box<Expression>,
        key: Box<Expression>,
    },
    Call {
        function: Box<Expression>,
        args: Vec<Expression>,
    },
    MethodCall {
        object: Box<Expression>,
        method: String,
        args: Vec<Expression>,
    },
    Function(FunctionBody),
    Table(Vec<TableField>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Paren(Box<Expression>),
}

impl Expression {
    pub fn name(value: impl Into<String>) -> Self {
        Expression::Name(value.into())
    }

    pub fn member(table: Expression, key: impl Into<String>) -> Self {
        Expression::Member {
            table: Box::new(table),
            key: key.into(),
        }
    }

    pub fn index(table: Expression, key: Expression) -> Self {
        Expression::Index {
            table: Box::new(table),
            key: Box::new(key),
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(function: Expression, args: Vec<Expression>) -> Self {
        Expression::Call {
            function: Box::new(function),
            args,
        }
    }

    pub fn string(raw: impl Into<String>) -> Self {
        Expression::String(StringLiteral::new(raw))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expression::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expression::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_name(&self, expected: &str) -> bool {
        matches!(self, Expression::Name(name) if name == expected)
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::Nil | Expression::Boolean(_) | Expression::Number(_) | Expression::String(_)
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Expression::Call { .. } | Expression::MethodCall { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// (left, right) binding priorities, as in the reference Lua parser
    pub fn priority(&self) -> (u8, u8) {
        match self {
            BinaryOp::Add | BinaryOp::Sub => (6, 6),
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (7, 7),
            BinaryOp::Pow => (10, 9),
            BinaryOp::Concat => (5, 4),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => (3, 3),
            BinaryOp::And => (2, 2),
            BinaryOp::Or => (1, 1),
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Operator that keeps the meaning when both operands are swapped
    pub fn mirrored(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Ge => BinaryOp::Le,
            other => *other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    Length,
}

pub const UNARY_PRIORITY: u8 = 8;

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "not ",
            UnaryOp::Length => "#",
        }
    }
}
