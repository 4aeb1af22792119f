// Tue Jan 13 2026 - Alex

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod symbols;
pub mod visit;

pub use ast::{
    BinaryOp, Block, Expression, FunctionBody, FunctionName, IfClause,
    Statement, StringDelimiter, StringLiteral, TableField, UnaryOp,
};
pub use error::{EvalError, ParseError};
pub use eval::{LiteralEvaluator, Value};
pub use lexer::is_identifier;
pub use parser::{parse, parse_expression};
pub use printer::{expression_to_string, print_block, Printer};
pub use symbols::{SymbolInfo, SymbolTable};
pub use visit::{Visitor, VisitorMut};
