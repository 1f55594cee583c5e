// AST node types for `.mir` source files.
//
// A `.mir` file declares kernels, configuration settings, arguments and
// instructions, one statement per line. Every node carries a `SimpleSpan`
// for error reporting in the builder and the catalog loader.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

use crate::types::{Place, Type, TypeParseError};

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete `.mir` program: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// ── Statements ──

/// A top-level statement with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Set(SetStmt),
    Kernel(KernelStmt),
    Arg(ArgStmt),
    Inst(InstStmt),
}

// ── set_stmt: 'set' IDENT '=' set_value ──

#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub name: Ident,
    pub value: SetValue,
}

/// RHS of a `set` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Ident(Ident),
    Places(Vec<PlaceLit>, Span),
}

// ── kernel_stmt: 'kernel' IDENT IDENT? '@' place sig_list '->' sig_list ──

#[derive(Debug, Clone, PartialEq)]
pub struct KernelStmt {
    pub op: Ident,
    pub alias: Option<Ident>,
    pub place: PlaceLit,
    pub inputs: Vec<ParamSig>,
    pub outputs: Vec<ParamSig>,
}

/// `Formal: target/precision/layout` inside a kernel signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub formal: Ident,
    pub ty: PlaceLit,
}

// ── arg_stmt: 'arg' IDENT (':' place)? ──

#[derive(Debug, Clone, PartialEq)]
pub struct ArgStmt {
    pub name: Ident,
    pub ty: Option<PlaceLit>,
}

// ── inst_stmt: 'inst' IDENT binding_list '->' binding_list ('@' place)? ──

#[derive(Debug, Clone, PartialEq)]
pub struct InstStmt {
    pub op: Ident,
    pub inputs: Vec<BindingExpr>,
    pub outputs: Vec<BindingExpr>,
    /// Place of the kernel to pick; the first candidate when absent.
    pub place: Option<PlaceLit>,
    pub span: Span,
}

/// `Formal: name` or `Formal: [name, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingExpr {
    pub formal: Ident,
    pub arguments: Vec<Ident>,
    pub span: Span,
}

// ── Leaves ──

/// `target/precision/layout`, kept as identifiers until the builder
/// resolves them (so unknown names get a proper diagnostic).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceLit {
    pub target: Ident,
    pub precision: Ident,
    pub layout: Ident,
    pub span: Span,
}

impl PlaceLit {
    pub fn to_place(&self) -> Result<Place, TypeParseError> {
        Ok(Place::new(
            self.target.name.parse()?,
            self.precision.name.parse()?,
            self.layout.name.parse()?,
        ))
    }

    pub fn to_type(&self) -> Result<Type, TypeParseError> {
        Ok(Type::new(
            self.target.name.parse()?,
            self.precision.name.parse()?,
            self.layout.name.parse()?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
