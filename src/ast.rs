//! Parsed surface-syntax tree (§4.2), pre-validation.
//!
//! The parser never resolves names or classifies arrows as forward vs.
//! backward by target kind — it only records what the source text says.
//! Resolution and classification happen in `ir::builder`.

use crate::span::Spanned;

#[derive(Clone, Debug)]
pub struct Ratio {
    pub lhs: u64,
    pub rhs: u64,
    pub ref_name: String,
}

#[derive(Clone, Debug)]
pub struct NodeDecl {
    pub name: Spanned<String>,
    /// `{NUMBER}` — the declared width, when present.
    pub declared_width: Option<u64>,
    pub ratio: Option<Ratio>,
}

/// One arrow in a cycle line: `-> target`, `-(func)-> target`, or
/// `<-(func)- target` (backward).
#[derive(Clone, Debug)]
pub struct ArrowAST {
    pub target: Spanned<String>,
    pub function: Option<String>,
    pub backward: bool,
}

/// A cycle line: an (optionally omitted, branch-continuing) source and
/// one or more arrows.
#[derive(Clone, Debug)]
pub struct Line {
    pub source: Option<Spanned<String>>,
    pub arrows: Vec<ArrowAST>,
}

/// A statement inside a `cycle { ... }` block: a plain line, or an
/// `if`/`else` conditional gate around nested lines.
#[derive(Clone, Debug)]
pub enum CycleStmt {
    Line(Line),
    If {
        cond: Spanned<String>,
        then_branch: Vec<CycleStmt>,
        else_branch: Vec<CycleStmt>,
    },
}

#[derive(Clone, Debug, Default)]
pub struct CycleAST {
    pub stmts: Vec<CycleStmt>,
}

#[derive(Clone, Debug, Default)]
pub struct DeclarationsAST {
    pub producers: Vec<NodeDecl>,
    pub consumers: Vec<NodeDecl>,
    pub layers: Vec<NodeDecl>,
    pub cycle: Option<CycleAST>,
}

/// Optional top-level `harmonic name { decls }` wrapper.
#[derive(Clone, Debug)]
pub struct HarmonicAST {
    pub name: String,
    pub decls: DeclarationsAST,
}
