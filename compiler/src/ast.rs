// AST node types for hlsopt .hls source files.
//
// Every node carries a `SimpleSpan` for error reporting in downstream phases.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete source file: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Set(SetStmt),
    Array(ArrayDecl),
    Loop(LoopStmt),
    Region(RegionStmt),
}

// ── set_stmt: 'set' IDENT '=' (INT | IDENT) ──

#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub name: Ident,
    pub value: SetValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Int(i64, Span),
    Ident(Ident),
}

// ── array_decl: 'array' IDENT '[' INT (',' INT)* ']' ':' IDENT ('@' INT)? ──

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDecl {
    pub name: Ident,
    pub shape: Vec<(i64, Span)>,
    pub element_type: Ident,
    pub memory_space: Option<(i64, Span)>,
}

// ── loop_stmt: 'loop' IDENT '=' int 'to' int ('step' int)? 'pipeline'? '{' body '}' ──

#[derive(Debug, Clone, PartialEq)]
pub struct LoopStmt {
    pub var: Ident,
    pub lower: i64,
    pub upper: i64,
    pub step: Option<(i64, Span)>,
    pub pipeline: bool,
    pub body: Vec<LoopBodyItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopBodyItem {
    Loop(LoopStmt),
    Access(AccessStmt),
}

/// `read A[i, j + 1]` / `write A[...]`
#[derive(Debug, Clone, PartialEq)]
pub struct AccessStmt {
    pub is_write: bool,
    pub array: Ident,
    pub indices: Vec<IndexExpr>,
    pub span: Span,
}

// ── Index expressions ──

#[derive(Debug, Clone, PartialEq)]
pub enum IndexExpr {
    Int(i64, Span),
    Var(Ident),
    Neg(Box<IndexExpr>, Span),
    Binary(IndexOp, Box<IndexExpr>, Box<IndexExpr>, Span),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Add,
    Sub,
    Mul,
    Mod,
    FloorDiv,
    CeilDiv,
}

impl IndexExpr {
    pub fn span(&self) -> Span {
        match self {
            IndexExpr::Int(_, s) | IndexExpr::Neg(_, s) | IndexExpr::Binary(_, _, _, s) => *s,
            IndexExpr::Var(id) => id.span,
        }
    }
}

// ── region_stmt: 'region' IDENT '{' node_decl* '}' ──

#[derive(Debug, Clone, PartialEq)]
pub struct RegionStmt {
    pub name: Ident,
    pub nodes: Vec<NodeDecl>,
}

/// `node NAME(in, ...) -> (out, ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDecl {
    pub name: Ident,
    pub inputs: Vec<Ident>,
    pub outputs: Vec<Ident>,
    pub span: Span,
}
