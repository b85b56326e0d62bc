//! Syntax tree for the matcher-script artifact language.
//!
//! Matcher script is the deliberately small language synthesized
//! artifacts are written in: brace-delimited routine declarations over
//! strings, integers, booleans, lists, and string-keyed maps, with two
//! injected capability handles (`regex`, `wildcard`). The parser in
//! `parser.rs` emits this representation; the structural safety scanner
//! and the sandbox interpreter both walk it.

use serde::{Deserialize, Serialize};

/// One-based line/column position of a syntax element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A parsed artifact: the ordered top-level statements of one source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Top-level routine declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import name;` statement. Capability imports are injected by the sandbox
    /// and ignored at execution time; forbidden modules are flagged by
    /// the safety scanner before execution is ever attempted.
    Import { module: String, span: Span },
    Fn(FnDecl),
    Let { name: String, expr: Expr, span: Span },
    Assign { name: String, expr: Expr, span: Span },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
        span: Span,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    While { cond: Expr, body: Vec<Stmt>, span: Span },
    Return { expr: Option<Expr>, span: Span },
    Expr { expr: Expr, span: Span },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Membership: substring, list element, or map key.
    In,
    NotIn,
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NoneLit(Span),
    Bool(bool, Span),
    Int(i64, Span),
    Str(String, Span),
    List(Vec<Expr>, Span),
    /// Map literal with string-literal keys, in source order.
    Map(Vec<(String, Expr)>, Span),
    Ident(String, Span),
    /// Call expression. `target` is `None` for a bare-name call
    /// (`len(x)`, user routines) and `Some` for a method or capability
    /// call (`text.trim()`, `regex.search(p, t)`).
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::NoneLit(span)
            | Self::Bool(_, span)
            | Self::Int(_, span)
            | Self::Str(_, span)
            | Self::List(_, span)
            | Self::Map(_, span)
            | Self::Ident(_, span) => *span,
            Self::Call { span, .. }
            | Self::Index { span, .. }
            | Self::Unary { span, .. }
            | Self::Binary { span, .. } => *span,
        }
    }
}

impl Program {
    /// Names of all top-level routine declarations, in source order.
    pub fn routine_names(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Fn(decl) => Some(decl.name.as_str()),
                _ => None,
            })
            .collect()
    }
}
