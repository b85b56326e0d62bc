//! Hand-written lexer and recursive-descent parser for matcher script.
//!
//! Unparsable artifact text is a fatal syntax error: the gate pipeline
//! short-circuits with an empty gate map, so diagnostics here carry
//! stable codes and one-based source positions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{BinOp, Expr, FnDecl, Program, Span, Stmt, UnaryOp};

pub type ParseResult<T> = Result<T, ParseError>;

/// Stable parse error codes for deterministic diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorCode {
    UnexpectedCharacter,
    UnterminatedString,
    InvalidNumber,
    UnexpectedToken,
    UnexpectedEnd,
}

impl ParseErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnexpectedCharacter => "unexpected_character",
            Self::UnterminatedString => "unterminated_string",
            Self::InvalidNumber => "invalid_number",
            Self::UnexpectedToken => "unexpected_token",
            Self::UnexpectedEnd => "unexpected_end",
        }
    }
}

/// Deterministic parse error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub code: ParseErrorCode,
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(code: ParseErrorCode, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            code,
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(
                f,
                "{}: {} (line {}, column {})",
                self.code.as_str(),
                self.message,
                span.line,
                span.column
            ),
            None => write!(f, "{}: {}", self.code.as_str(), self.message),
        }
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    Fn,
    Let,
    If,
    Else,
    For,
    While,
    In,
    Return,
    Import,
    True,
    False,
    NoneKw,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Eof,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::Int(number) => format!("integer `{number}`"),
            Self::Str(_) => "string literal".to_string(),
            Self::Fn => "`fn`".to_string(),
            Self::Let => "`let`".to_string(),
            Self::If => "`if`".to_string(),
            Self::Else => "`else`".to_string(),
            Self::For => "`for`".to_string(),
            Self::While => "`while`".to_string(),
            Self::In => "`in`".to_string(),
            Self::Return => "`return`".to_string(),
            Self::Import => "`import`".to_string(),
            Self::True => "`true`".to_string(),
            Self::False => "`false`".to_string(),
            Self::NoneKw => "`none`".to_string(),
            Self::And => "`and`".to_string(),
            Self::Or => "`or`".to_string(),
            Self::Not => "`not`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::LBrace => "`{`".to_string(),
            Self::RBrace => "`}`".to_string(),
            Self::LBracket => "`[`".to_string(),
            Self::RBracket => "`]`".to_string(),
            Self::Comma => "`,`".to_string(),
            Self::Semi => "`;`".to_string(),
            Self::Colon => "`:`".to_string(),
            Self::Dot => "`.`".to_string(),
            Self::Assign => "`=`".to_string(),
            Self::EqEq => "`==`".to_string(),
            Self::NotEq => "`!=`".to_string(),
            Self::Lt => "`<`".to_string(),
            Self::Le => "`<=`".to_string(),
            Self::Gt => "`>`".to_string(),
            Self::Ge => "`>=`".to_string(),
            Self::Plus => "`+`".to_string(),
            Self::Minus => "`-`".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    span: Span,
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    match ident {
        "fn" => Some(TokenKind::Fn),
        "let" => Some(TokenKind::Let),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "for" => Some(TokenKind::For),
        "while" => Some(TokenKind::While),
        "in" => Some(TokenKind::In),
        "return" => Some(TokenKind::Return),
        "import" => Some(TokenKind::Import),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "none" => Some(TokenKind::NoneKw),
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        _ => None,
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while let Some(&ch) = self.chars.peek() {
                if ch.is_whitespace() {
                    self.bump();
                } else if ch == '#' {
                    while let Some(&ch) = self.chars.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                } else {
                    break;
                }
            }
            let span = self.position();
            let Some(ch) = self.bump() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span,
                });
                return Ok(tokens);
            };
            let kind = match ch {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semi,
                ':' => TokenKind::Colon,
                '.' => TokenKind::Dot,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '=' => {
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        TokenKind::EqEq
                    } else {
                        TokenKind::Assign
                    }
                }
                '!' => {
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        TokenKind::NotEq
                    } else {
                        return Err(ParseError::new(
                            ParseErrorCode::UnexpectedCharacter,
                            "`!` is only valid as part of `!=`",
                            Some(span),
                        ));
                    }
                }
                '<' => {
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '"' => self.lex_string(span)?,
                ch if ch.is_ascii_digit() => self.lex_number(ch, span)?,
                ch if ch.is_ascii_alphabetic() || ch == '_' => {
                    let mut ident = String::new();
                    ident.push(ch);
                    while let Some(&next) = self.chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            ident.push(next);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    keyword_for(&ident).unwrap_or(TokenKind::Ident(ident))
                }
                other => {
                    return Err(ParseError::new(
                        ParseErrorCode::UnexpectedCharacter,
                        format!("unexpected character `{other}`"),
                        Some(span),
                    ));
                }
            };
            tokens.push(Token { kind, span });
        }
    }

    fn lex_string(&mut self, start: Span) -> ParseResult<TokenKind> {
        let mut text = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ParseError::new(
                    ParseErrorCode::UnterminatedString,
                    "string literal is not terminated",
                    Some(start),
                ));
            };
            match ch {
                '"' => return Ok(TokenKind::Str(text)),
                '\n' => {
                    return Err(ParseError::new(
                        ParseErrorCode::UnterminatedString,
                        "string literal is not terminated before end of line",
                        Some(start),
                    ));
                }
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(ParseError::new(
                            ParseErrorCode::UnterminatedString,
                            "string literal ends in a bare escape",
                            Some(start),
                        ));
                    };
                    match escaped {
                        '"' => text.push('"'),
                        '\\' => text.push('\\'),
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        other => {
                            return Err(ParseError::new(
                                ParseErrorCode::UnexpectedCharacter,
                                format!("unknown escape `\\{other}` in string literal"),
                                Some(start),
                            ));
                        }
                    }
                }
                other => text.push(other),
            }
        }
    }

    fn lex_number(&mut self, first: char, start: Span) -> ParseResult<TokenKind> {
        let mut digits = String::new();
        digits.push(first);
        while let Some(&next) = self.chars.peek() {
            if next.is_ascii_digit() {
                digits.push(next);
                self.bump();
            } else {
                break;
            }
        }
        digits.parse::<i64>().map(TokenKind::Int).map_err(|_| {
            ParseError::new(
                ParseErrorCode::InvalidNumber,
                format!("integer literal `{digits}` is out of range"),
                Some(start),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse artifact source text into a [`Program`].
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();
    while !parser.check(&TokenKind::Eof) {
        statements.push(parser.parse_stmt()?);
    }
    Ok(Program { statements })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|token| &token.kind)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let found = self.peek();
            Err(ParseError::new(
                if found.kind == TokenKind::Eof {
                    ParseErrorCode::UnexpectedEnd
                } else {
                    ParseErrorCode::UnexpectedToken
                },
                format!("expected {}, found {}", kind.describe(), found.kind.describe()),
                Some(found.span),
            ))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, token.span))
            }
            other => Err(ParseError::new(
                if other == TokenKind::Eof {
                    ParseErrorCode::UnexpectedEnd
                } else {
                    ParseErrorCode::UnexpectedToken
                },
                format!("expected {what}, found {}", other.describe()),
                Some(token.span),
            )),
        }
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.peek().span;
        match &self.peek().kind {
            TokenKind::Import => {
                self.advance();
                let (module, _) = self.expect_ident("module name")?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Import { module, span })
            }
            TokenKind::Fn => self.parse_fn(span),
            TokenKind::Let => {
                self.advance();
                let (name, _) = self.expect_ident("binding name")?;
                self.expect(&TokenKind::Assign)?;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Let { name, expr, span })
            }
            TokenKind::If => self.parse_if(span),
            TokenKind::For => {
                self.advance();
                let (var, _) = self.expect_ident("loop variable")?;
                self.expect(&TokenKind::In)?;
                let iterable = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::For {
                    var,
                    iterable,
                    body,
                    span,
                })
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body, span })
            }
            TokenKind::Return => {
                self.advance();
                let expr = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Return { expr, span })
            }
            TokenKind::Ident(_) if self.peek_kind_at(1) == Some(&TokenKind::Assign) => {
                let (name, _) = self.expect_ident("assignment target")?;
                self.expect(&TokenKind::Assign)?;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Assign { name, expr, span })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Expr { expr, span })
            }
        }
    }

    fn parse_fn(&mut self, span: Span) -> ParseResult<Stmt> {
        self.expect(&TokenKind::Fn)?;
        let (name, _) = self.expect_ident("routine name")?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident("parameter name")?;
                params.push(param);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::Fn(FnDecl {
            name,
            params,
            body,
            span,
        }))
    }

    fn parse_if(&mut self, span: Span) -> ParseResult<Stmt> {
        self.expect(&TokenKind::If)?;
        let cond = self.parse_expr()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.consume(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let nested_span = self.peek().span;
                vec![self.parse_if(nested_span)?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            span,
        })
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                let span = self.peek().span;
                return Err(ParseError::new(
                    ParseErrorCode::UnexpectedEnd,
                    "block is not closed before end of input",
                    Some(span),
                ));
            }
            statements.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(statements)
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let span = self.advance().span;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.check(&TokenKind::And) {
            let span = self.advance().span;
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Not) {
            let span = self.advance().span;
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match &self.peek().kind {
            TokenKind::EqEq => Some(BinOp::Eq),
            TokenKind::NotEq => Some(BinOp::Ne),
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Le => Some(BinOp::Le),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::Ge => Some(BinOp::Ge),
            TokenKind::In => Some(BinOp::In),
            TokenKind::Not if self.peek_kind_at(1) == Some(&TokenKind::In) => Some(BinOp::NotIn),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        let span = self.advance().span;
        if op == BinOp::NotIn {
            self.expect(&TokenKind::In)?;
        }
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Minus) {
            let span = self.advance().span;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match &self.peek().kind {
                TokenKind::LParen => {
                    let span = self.peek().span;
                    let Expr::Ident(name, _) = &expr else {
                        return Err(ParseError::new(
                            ParseErrorCode::UnexpectedToken,
                            "only named routines can be called",
                            Some(span),
                        ));
                    };
                    let name = name.clone();
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        target: None,
                        name,
                        args,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    let span = self.advance().span;
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                TokenKind::Dot => {
                    let span = self.advance().span;
                    let (name, _) = self.expect_ident("method name")?;
                    self.expect(&TokenKind::LParen)?;
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        target: Some(Box::new(expr)),
                        name,
                        args,
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::NoneKw => {
                self.advance();
                Ok(Expr::NoneLit(token.span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true, token.span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false, token.span))
            }
            TokenKind::Int(number) => {
                self.advance();
                Ok(Expr::Int(number, token.span))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Expr::Str(text, token.span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name, token.span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                        if self.check(&TokenKind::RBracket) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::List(items, token.span))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key_token = self.peek().clone();
                        let TokenKind::Str(key) = key_token.kind else {
                            return Err(ParseError::new(
                                ParseErrorCode::UnexpectedToken,
                                format!(
                                    "map keys must be string literals, found {}",
                                    key_token.kind.describe()
                                ),
                                Some(key_token.span),
                            ));
                        };
                        self.advance();
                        self.expect(&TokenKind::Colon)?;
                        let value = self.parse_expr()?;
                        entries.push((key, value));
                        if !self.consume(&TokenKind::Comma) {
                            break;
                        }
                        if self.check(&TokenKind::RBrace) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                Ok(Expr::Map(entries, token.span))
            }
            TokenKind::Eof => Err(ParseError::new(
                ParseErrorCode::UnexpectedEnd,
                "expected an expression, found end of input",
                Some(token.span),
            )),
            other => Err(ParseError::new(
                ParseErrorCode::UnexpectedToken,
                format!("expected an expression, found {}", other.describe()),
                Some(token.span),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;

    #[test]
    fn parses_routine_with_params_and_body() {
        let program = parse_program(
            "fn validate_logic(text, pattern, options) {\n    return {\"is_match\": true};\n}\n",
        )
        .expect("parse");
        assert_eq!(program.routine_names(), vec!["validate_logic"]);
        let Stmt::Fn(decl) = &program.statements[0] else {
            panic!("expected fn declaration");
        };
        assert_eq!(decl.params, vec!["text", "pattern", "options"]);
    }

    #[test]
    fn parses_imports_and_else_if_chains() {
        let source = r#"
import regex;
fn f(x) {
    if x == 1 {
        return "one";
    } else if x == 2 {
        return "two";
    } else {
        return "many";
    }
}
"#;
        let program = parse_program(source).expect("parse");
        assert!(matches!(&program.statements[0], Stmt::Import { module, .. } if module == "regex"));
    }

    #[test]
    fn parses_membership_and_not_in() {
        let program = parse_program("fn f(p) { return \"|\" in p and \"x\" not in p; }")
            .expect("parse");
        assert_eq!(program.routine_names(), vec!["f"]);
    }

    #[test]
    fn rejects_unterminated_string_with_position() {
        let error = parse_program("fn f() { return \"abc; }").expect_err("must fail");
        assert_eq!(error.code, ParseErrorCode::UnterminatedString);
        assert_eq!(error.span.expect("span").line, 1);
    }

    #[test]
    fn rejects_non_string_map_keys() {
        let error = parse_program("fn f() { return {key: 1}; }").expect_err("must fail");
        assert_eq!(error.code, ParseErrorCode::UnexpectedToken);
        assert!(error.message.contains("string literals"));
    }

    #[test]
    fn rejects_bare_bang() {
        let error = parse_program("fn f(x) { return x ! 1; }").expect_err("must fail");
        assert_eq!(error.code, ParseErrorCode::UnexpectedCharacter);
    }

    #[test]
    fn method_calls_and_indexing_chain() {
        let program = parse_program("fn f(m) { return m.get(\"k\", none)[0].trim(); }")
            .expect("parse");
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn comments_are_ignored() {
        let program = parse_program("# leading comment\nfn f() { return 1; } # trailing\n")
            .expect("parse");
        assert_eq!(program.routine_names(), vec!["f"]);
    }
}
