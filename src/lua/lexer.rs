// Tue Jan 13 2026 - Alex

use crate::lua::ast::{StringDelimiter, StringLiteral};
use crate::lua::error::ParseError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Name(String),
    Number(f64),
    String(StringLiteral),

    // Keywords
    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Hash,
    EqualEqual,
    TildeEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Equal,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    DotDot,
    Ellipsis,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Name(name) => return write!(f, "{}", name),
            TokenKind::Number(n) => return write!(f, "{}", n),
            TokenKind::String(s) => return write!(f, "\"{}\"", s.raw),
            TokenKind::And => "and",
            TokenKind::Break => "break",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::ElseIf => "elseif",
            TokenKind::End => "end",
            TokenKind::False => "false",
            TokenKind::For => "for",
            TokenKind::Function => "function",
            TokenKind::Goto => "goto",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Local => "local",
            TokenKind::Nil => "nil",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Repeat => "repeat",
            TokenKind::Return => "return",
            TokenKind::Then => "then",
            TokenKind::True => "true",
            TokenKind::Until => "until",
            TokenKind::While => "while",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Hash => "#",
            TokenKind::EqualEqual => "==",
            TokenKind::TildeEqual => "~=",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::Equal => "=",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::DoubleColon => "::",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Ellipsis => "...",
            TokenKind::Eof => "<eof>",
        };
        write!(f, "{}", text)
    }
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "and" => TokenKind::And,
        "break" => TokenKind::Break,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "elseif" => TokenKind::ElseIf,
        "end" => TokenKind::End,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "function" => TokenKind::Function,
        "goto" => TokenKind::Goto,
        "if" => TokenKind::If,
        "in" => TokenKind::In,
        "local" => TokenKind::Local,
        "nil" => TokenKind::Nil,
        "not" => TokenKind::Not,
        "or" => TokenKind::Or,
        "repeat" => TokenKind::Repeat,
        "return" => TokenKind::Return,
        "then" => TokenKind::Then,
        "true" => TokenKind::True,
        "until" => TokenKind::Until,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

/// True when `name` can be written as a bare name (`t.name`, `name = ...`)
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && keyword(name).is_none()
}

/// Lua 5.1 tokenizer (plus `goto` and `::label::`)
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        // Shebang line
        if self.peek() == Some('#') && self.peek_at(1) == Some('!') {
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.pos += 1;
            }
        }

        loop {
            self.skip_trivia()?;
            let line = self.line;

            let c = match self.peek() {
                Some(c) => c,
                None => {
                    tokens.push(Token::new(TokenKind::Eof, line));
                    break;
                }
            };

            let kind = match c {
                'a'..='z' | 'A'..='Z' | '_' => self.read_name(),
                '0'..='9' => self.read_number()?,
                '.' if self.peek_at(1).map_or(false, |d| d.is_ascii_digit()) => self.read_number()?,
                '"' | '\'' => self.read_string(c)?,
                '[' if matches!(self.peek_at(1), Some('[') | Some('=')) => {
                    match self.long_bracket_level() {
                        Some(level) => {
                            let content = self.read_long_bracket(level)?;
                            TokenKind::String(StringLiteral::with_delimiter(content, StringDelimiter::Long(level)))
                        }
                        None => {
                            self.pos += 1;
                            TokenKind::LeftBracket
                        }
                    }
                }
                _ => self.read_symbol(c)?,
            };

            tokens.push(Token::new(kind, line));
        }

        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '-' && self.peek_at(1) == Some('-') {
                self.pos += 2;
                if self.peek() == Some('[') {
                    if let Some(level) = self.long_bracket_level() {
                        self.read_long_bracket(level)?;
                        continue;
                    }
                }
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }

            break;
        }
        Ok(())
    }

    /// Level of a `[==[` opener at the current position, if it is one
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some('[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some('=') {
            level += 1;
        }
        if self.peek_at(1 + level) == Some('[') {
            Some(level)
        } else {
            None
        }
    }

    fn read_long_bracket(&mut self, level: usize) -> Result<String, ParseError> {
        let start_line = self.line;
        self.pos += level + 2;

        // A newline right after the opener is skipped
        if self.peek() == Some('\r') {
            self.bump();
        }
        if self.peek() == Some('\n') {
            self.bump();
        }

        let mut content = String::new();
        loop {
            let c = self.bump().ok_or(ParseError::UnterminatedLongBracket(start_line))?;
            if c == ']' {
                let mut eq = 0;
                while self.peek_at(eq) == Some('=') {
                    eq += 1;
                }
                if eq == level && self.peek_at(eq) == Some(']') {
                    self.pos += eq + 1;
                    return Ok(content);
                }
            }
            content.push(c);
        }
    }

    fn read_name(&mut self) -> TokenKind {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        keyword(&ident).unwrap_or(TokenKind::Name(ident))
    }

    fn read_number(&mut self) -> Result<TokenKind, ParseError> {
        let mut text = String::new();

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            return u64::from_str_radix(&text, 16)
                .map(|v| TokenKind::Number(v as f64))
                .map_err(|_| ParseError::MalformedNumber(format!("0x{}", text), self.line));
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.pos += 1;
            } else if (c == 'e' || c == 'E') && !text.contains(['e', 'E']) {
                text.push(c);
                self.pos += 1;
                if let Some(sign) = self.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.pos += 1;
                    }
                }
            } else {
                break;
            }
        }

        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ParseError::MalformedNumber(text, self.line))
    }

    fn read_string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let start_line = self.line;
        self.pos += 1;
        let mut raw = String::new();

        loop {
            let c = self.bump().ok_or(ParseError::UnterminatedString(start_line))?;
            if c == quote {
                break;
            }
            if c == '\n' {
                return Err(ParseError::UnterminatedString(start_line));
            }
            raw.push(c);
            if c == '\\' {
                let esc = self.bump().ok_or(ParseError::UnterminatedString(start_line))?;
                raw.push(esc);
            }
        }

        let delimiter = if quote == '"' {
            StringDelimiter::Double
        } else {
            StringDelimiter::Single
        };
        Ok(TokenKind::String(StringLiteral::with_delimiter(raw, delimiter)))
    }

    fn read_symbol(&mut self, c: char) -> Result<TokenKind, ParseError> {
        let next = self.peek_at(1);
        let (kind, len) = match (c, next) {
            ('=', Some('=')) => (TokenKind::EqualEqual, 2),
            ('~', Some('=')) => (TokenKind::TildeEqual, 2),
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            (':', Some(':')) => (TokenKind::DoubleColon, 2),
            ('.', Some('.')) => {
                if self.peek_at(2) == Some('.') {
                    (TokenKind::Ellipsis, 3)
                } else {
                    (TokenKind::DotDot, 2)
                }
            }
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('#', _) => (TokenKind::Hash, 1),
            ('<', _) => (TokenKind::Less, 1),
            ('>', _) => (TokenKind::Greater, 1),
            ('=', _) => (TokenKind::Equal, 1),
            ('(', _) => (TokenKind::LeftParen, 1),
            (')', _) => (TokenKind::RightParen, 1),
            ('{', _) => (TokenKind::LeftBrace, 1),
            ('}', _) => (TokenKind::RightBrace, 1),
            ('[', _) => (TokenKind::LeftBracket, 1),
            (']', _) => (TokenKind::RightBracket, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            (':', _) => (TokenKind::Colon, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('.', _) => (TokenKind::Dot, 1),
            _ => {
                let column = self.column();
                return Err(ParseError::UnexpectedCharacter(c, self.line, column));
            }
        };
        self.pos += len;
        Ok(kind)
    }

    fn column(&self) -> usize {
        let line_start = self.chars[..self.pos]
            .iter()
            .rposition(|&c| c == '\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        self.pos - line_start + 1
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            kinds("local x = nil"),
            vec![
                TokenKind::Local,
                TokenKind::Name("x".to_string()),
                TokenKind::Equal,
                TokenKind::Nil,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0x1F 1.5 2e3 .5")[..4], [
            TokenKind::Number(31.0),
            TokenKind::Number(1.5),
            TokenKind::Number(2000.0),
            TokenKind::Number(0.5),
        ]);
    }

    #[test]
    fn test_string_keeps_raw_escapes() {
        let tokens = kinds(r#""\4\8\12""#);
        match &tokens[0] {
            TokenKind::String(s) => assert_eq!(s.raw, r"\4\8\12"),
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("--[==[ block\n comment ]==] a -- line\n b");
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_long_string() {
        let tokens = kinds("[[\nhello]]");
        match &tokens[0] {
            TokenKind::String(s) => {
                assert_eq!(s.raw, "hello");
                assert_eq!(s.delimiter, StringDelimiter::Long(0));
            }
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_multi_char_symbols() {
        assert_eq!(
            kinds("... .. ~= :: ==")[..5],
            [
                TokenKind::Ellipsis,
                TokenKind::DotDot,
                TokenKind::TildeEqual,
                TokenKind::DoubleColon,
                TokenKind::EqualEqual
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("_print2"));
        assert!(!is_identifier("2d"));
        assert!(!is_identifier("end"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(tokenize("a $ b"), Err(ParseError::UnexpectedCharacter('$', 1, _))));
    }
}
