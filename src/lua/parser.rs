// Tue Jan 13 2026 - Alex

use crate::lua::ast::*;
use crate::lua::error::ParseError;
use crate::lua::lexer::{tokenize, Token, TokenKind};

pub fn parse(source: &str) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens);
    parser.parse_chunk()
}

/// Parses a single expression (the whole input must be consumed)
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens);
    let expr = parser.parse_expression()?;
    if !parser.is_at_end() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse_chunk(&mut self) -> Result<Block, ParseError> {
        let block = self.parse_block()?;
        if !self.is_at_end() {
            return Err(self.unexpected());
        }
        Ok(block)
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();

        loop {
            match self.peek().kind {
                TokenKind::Eof
                | TokenKind::End
                | TokenKind::Else
                | TokenKind::ElseIf
                | TokenKind::Until => break,
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Return => {
                    statements.push(self.parse_return()?);
                    break;
                }
                _ => statements.push(self.parse_statement()?),
            }
        }

        Ok(Block::from_statements(statements))
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match &self.peek().kind {
            TokenKind::Local => self.parse_local(),
            TokenKind::Function => self.parse_function_statement(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.expect(&TokenKind::End, "'end'")?;
                Ok(Statement::Do(body))
            }
            TokenKind::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            TokenKind::Goto => {
                self.advance();
                Ok(Statement::Goto(self.expect_name()?))
            }
            TokenKind::DoubleColon => {
                self.advance();
                let name = self.expect_name()?;
                self.expect(&TokenKind::DoubleColon, "'::'")?;
                Ok(Statement::Label(name))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_local(&mut self) -> Result<Statement, ParseError> {
        self.advance();

        if self.check(&TokenKind::Function) {
            self.advance();
            let name = self.expect_name()?;
            let function = self.parse_function_body()?;
            return Ok(Statement::LocalFunction { name, function });
        }

        let mut names = vec![self.expect_name()?];
        while self.matches(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }

        let values = if self.matches(&TokenKind::Equal) {
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        Ok(Statement::Local { names, values })
    }

    fn parse_function_statement(&mut self) -> Result<Statement, ParseError> {
        self.advance();

        let mut path = vec![self.expect_name()?];
        while self.matches(&TokenKind::Dot) {
            path.push(self.expect_name()?);
        }
        let method = if self.matches(&TokenKind::Colon) {
            Some(self.expect_name()?)
        } else {
            None
        };

        let mut function = self.parse_function_body()?;
        if method.is_some() {
            function.params.insert(0, "self".to_string());
        }

        Ok(Statement::Function {
            name: FunctionName { path, method },
            function,
        })
    }

    fn parse_function_body(&mut self) -> Result<FunctionBody, ParseError> {
        self.expect(&TokenKind::LeftParen, "'('")?;

        let mut params = Vec::new();
        let mut is_vararg = false;

        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.matches(&TokenKind::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(&TokenKind::RightParen, "')'")?;
        let body = self.parse_block()?;
        self.expect(&TokenKind::End, "'end'")?;

        Ok(FunctionBody::new(params, is_vararg, body))
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let clause = self.parse_if_clause()?;

        let mut else_ifs = Vec::new();
        let mut else_body = None;

        loop {
            if self.matches(&TokenKind::ElseIf) {
                else_ifs.push(self.parse_if_clause()?);
            } else if self.matches(&TokenKind::Else) {
                else_body = Some(self.parse_block()?);
                self.expect(&TokenKind::End, "'end'")?;
                break;
            } else {
                self.expect(&TokenKind::End, "'end'")?;
                break;
            }
        }

        Ok(Statement::If {
            clause,
            else_ifs,
            else_body,
        })
    }

    fn parse_if_clause(&mut self) -> Result<IfClause, ParseError> {
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::Then, "'then'")?;
        let body = self.parse_block()?;
        Ok(IfClause { condition, body })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        self.expect(&TokenKind::End, "'end'")?;
        Ok(Statement::While { condition, body })
    }

    fn parse_repeat(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let body = self.parse_block()?;
        self.expect(&TokenKind::Until, "'until'")?;
        let condition = self.parse_expression()?;
        Ok(Statement::Repeat { body, condition })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let first = self.expect_name()?;

        if self.matches(&TokenKind::Equal) {
            let start = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let limit = self.parse_expression()?;
            let step = if self.matches(&TokenKind::Comma) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(&TokenKind::Do, "'do'")?;
            let body = self.parse_block()?;
            self.expect(&TokenKind::End, "'end'")?;
            return Ok(Statement::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.matches(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        self.expect(&TokenKind::In, "'in'")?;
        let exprs = self.parse_expression_list()?;
        self.expect(&TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        self.expect(&TokenKind::End, "'end'")?;

        Ok(Statement::GenericFor { names, exprs, body })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        self.advance();

        let values = match self.peek().kind {
            TokenKind::Eof
            | TokenKind::End
            | TokenKind::Else
            | TokenKind::ElseIf
            | TokenKind::Until
            | TokenKind::Semicolon => Vec::new(),
            _ => self.parse_expression_list()?,
        };
        self.matches(&TokenKind::Semicolon);

        Ok(Statement::Return(values))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.peek().line;
        let first = self.parse_suffixed_expression()?;

        if self.check(&TokenKind::Equal) || self.check(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.matches(&TokenKind::Comma) {
                targets.push(self.parse_suffixed_expression()?);
            }
            self.expect(&TokenKind::Equal, "'='")?;
            let values = self.parse_expression_list()?;

            for target in &targets {
                if !matches!(
                    target,
                    Expression::Name(_) | Expression::Member { .. } | Expression::Index { .. }
                ) {
                    return Err(ParseError::UnexpectedToken("non-assignable target".to_string(), line));
                }
            }

            return Ok(Statement::Assign { targets, values });
        }

        if first.is_call() {
            Ok(Statement::Call(first))
        } else {
            Err(ParseError::Expected {
                expected: "function call or assignment".to_string(),
                found: self.peek().kind.to_string(),
                line,
            })
        }
    }

    fn parse_expression_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut exprs = vec![self.parse_expression()?];
        while self.matches(&TokenKind::Comma) {
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_subexpression(0)
    }

    /// Precedence climbing over the Lua operator priority table
    fn parse_subexpression(&mut self, limit: u8) -> Result<Expression, ParseError> {
        let mut left = if let Some(op) = self.unary_operator() {
            self.advance();
            let operand = self.parse_subexpression(UNARY_PRIORITY)?;
            Expression::Unary {
                op,
                operand: Box::new(operand),
            }
        } else {
            self.parse_simple_expression()?
        };

        while let Some(op) = self.binary_operator() {
            let (left_priority, right_priority) = op.priority();
            if left_priority <= limit {
                break;
            }
            self.advance();
            let right = self.parse_subexpression(right_priority)?;
            left = Expression::binary(op, left, right);
        }

        Ok(left)
    }

    fn unary_operator(&self) -> Option<UnaryOp> {
        match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Hash => Some(UnaryOp::Length),
            _ => None,
        }
    }

    fn binary_operator(&self) -> Option<BinaryOp> {
        let op = match self.peek().kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Caret => BinaryOp::Pow,
            TokenKind::DotDot => BinaryOp::Concat,
            TokenKind::EqualEqual => BinaryOp::Eq,
            TokenKind::TildeEqual => BinaryOp::Ne,
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEqual => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEqual => BinaryOp::Ge,
            TokenKind::And => BinaryOp::And,
            TokenKind::Or => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    fn parse_simple_expression(&mut self) -> Result<Expression, ParseError> {
        let expr = match &self.peek().kind {
            TokenKind::Nil => Expression::Nil,
            TokenKind::True => Expression::Boolean(true),
            TokenKind::False => Expression::Boolean(false),
            TokenKind::Number(n) => Expression::Number(*n),
            TokenKind::String(s) => Expression::String(s.clone()),
            TokenKind::Ellipsis => Expression::Vararg,
            TokenKind::LeftBrace => return self.parse_table(),
            TokenKind::Function => {
                self.advance();
                return Ok(Expression::Function(self.parse_function_body()?));
            }
            _ => return self.parse_suffixed_expression(),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, ParseError> {
        match &self.peek().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expression::Name(name))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                // Parentheses only matter when they truncate a multi-value expression
                if matches!(
                    inner,
                    Expression::Call { .. } | Expression::MethodCall { .. } | Expression::Vararg
                ) {
                    Ok(Expression::Paren(Box::new(inner)))
                } else {
                    Ok(inner)
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_suffixed_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            match &self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let key = self.expect_name()?;
                    expr = Expression::member(expr, key);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket, "']'")?;
                    expr = Expression::index(expr, key);
                }
                TokenKind::Colon => {
                    self.advance();
                    let method = self.expect_name()?;
                    let args = self.parse_call_arguments()?;
                    expr = Expression::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                    };
                }
                TokenKind::LeftParen | TokenKind::String(_) | TokenKind::LeftBrace => {
                    let args = self.parse_call_arguments()?;
                    expr = Expression::call(expr, args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        match &self.peek().kind {
            TokenKind::String(s) => {
                let arg = Expression::String(s.clone());
                self.advance();
                Ok(vec![arg])
            }
            TokenKind::LeftBrace => Ok(vec![self.parse_table()?]),
            TokenKind::LeftParen => {
                self.advance();
                if self.matches(&TokenKind::RightParen) {
                    return Ok(Vec::new());
                }
                let args = self.parse_expression_list()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(args)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_table(&mut self) -> Result<Expression, ParseError> {
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        let mut fields = Vec::new();

        while !self.check(&TokenKind::RightBrace) {
            let field = match &self.peek().kind {
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket, "']'")?;
                    self.expect(&TokenKind::Equal, "'='")?;
                    TableField::Keyed(key, self.parse_expression()?)
                }
                TokenKind::Name(name) if self.peek_kind_at(1) == Some(&TokenKind::Equal) => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    TableField::Named(name, self.parse_expression()?)
                }
                _ => TableField::Positional(self.parse_expression()?),
            };
            fields.push(field);

            if !self.matches(&TokenKind::Comma) && !self.matches(&TokenKind::Semicolon) {
                break;
            }
        }

        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(Expression::Table(fields))
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn expect(&mut self, kind: &TokenKind, description: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::Expected {
                expected: description.to_string(),
                found: self.peek().kind.to_string(),
                line: self.peek().line,
            })
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Name(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(ParseError::Expected {
                expected: "name".to_string(),
                found: self.peek().kind.to_string(),
                line: self.peek().line,
            })
        }
    }

    fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedToken(self.peek().kind.to_string(), self.peek().line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_and_assignment() {
        let block = parse("local a, b = 1, 2\na = b").unwrap();
        assert_eq!(block.len(), 2);
        assert!(matches!(&block.statements[0], Statement::Local { names, values } if names.len() == 2 && values.len() == 2));
        assert!(matches!(&block.statements[1], Statement::Assign { .. }));
    }

    #[test]
    fn test_operator_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expression::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expression::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_right_associative_operators() {
        let expr = parse_expression("a .. b .. c").unwrap();
        match expr {
            Expression::Binary { op: BinaryOp::Concat, left, right } => {
                assert!(left.is_name("a"));
                assert!(matches!(*right, Expression::Binary { op: BinaryOp::Concat, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unary_binds_tighter_than_binary() {
        let expr = parse_expression("-x ^ 2").unwrap();
        assert!(matches!(expr, Expression::Unary { op: UnaryOp::Negate, .. }));
        let expr = parse_expression("not a == b").unwrap();
        assert!(matches!(expr, Expression::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_if_elseif_else() {
        let block = parse("if a then x() elseif b then y() else z() end").unwrap();
        match &block.statements[0] {
            Statement::If { else_ifs, else_body, .. } => {
                assert_eq!(else_ifs.len(), 1);
                assert!(else_body.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loops_and_labels() {
        let source = "for i = 1, 10, 2 do break end\nfor k, v in pairs(t) do end\nrepeat goto done until true\n::done::";
        let block = parse(source).unwrap();
        assert!(matches!(&block.statements[0], Statement::NumericFor { step: Some(_), .. }));
        assert!(matches!(&block.statements[1], Statement::GenericFor { names, .. } if names.len() == 2));
        assert!(matches!(&block.statements[2], Statement::Repeat { .. }));
        assert_eq!(block.statements[3], Statement::Label("done".to_string()));
    }

    #[test]
    fn test_call_forms() {
        let block = parse("f\"s\"\nobj:m{1}\nt.a.b(1)[2] = 3").unwrap();
        assert!(matches!(&block.statements[0], Statement::Call(Expression::Call { .. })));
        assert!(matches!(&block.statements[1], Statement::Call(Expression::MethodCall { .. })));
        assert!(matches!(&block.statements[2], Statement::Assign { .. }));
    }

    #[test]
    fn test_table_constructor() {
        let expr = parse_expression("{1, x = 2, [3] = 4; 5}").unwrap();
        match expr {
            Expression::Table(fields) => {
                assert_eq!(fields.len(), 4);
                assert!(matches!(fields[1], TableField::Named(..)));
                assert!(matches!(fields[2], TableField::Keyed(..)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_functions() {
        let block = parse("local function f(a, ...) return a end\nfunction t.x:y() end").unwrap();
        assert!(matches!(&block.statements[0], Statement::LocalFunction { function, .. } if function.is_vararg));
        match &block.statements[1] {
            Statement::Function { name, function } => {
                assert_eq!(name.path, vec!["t", "x"]);
                assert_eq!(name.method.as_deref(), Some("y"));
                assert_eq!(function.params, vec!["self"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bare_expression() {
        assert!(parse("x + 1").is_err());
        assert!(parse("if a then").is_err());
    }
}
