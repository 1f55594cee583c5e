// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used by the front end, the graph builder, the
// pass pipeline and the CLI. A diagnostic may point at source text (span),
// at a graph node, or at both.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;
use crate::id::NodeId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0102`, `W0200`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered diagnostic codes.
pub mod codes {
    use super::DiagCode;

    // E00xx — front end
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error

    // E01xx — settings, catalog, graph construction
    pub const E0100: DiagCode = DiagCode("E0100"); // unknown target/precision/layout
    pub const E0101: DiagCode = DiagCode("E0101"); // unknown operator
    pub const E0102: DiagCode = DiagCode("E0102"); // undefined argument
    pub const E0103: DiagCode = DiagCode("E0103"); // argument has more than one producer
    pub const E0104: DiagCode = DiagCode("E0104"); // no kernel for valid places
    pub const E0105: DiagCode = DiagCode("E0105"); // duplicate argument
    pub const E0106: DiagCode = DiagCode("E0106"); // duplicate kernel
    pub const E0107: DiagCode = DiagCode("E0107"); // malformed setting value
    pub const E0108: DiagCode = DiagCode("E0108"); // invalid operator descriptor
    pub const E0109: DiagCode = DiagCode("E0109"); // graph fails structural check

    // E02xx — passes
    pub const E0200: DiagCode = DiagCode("E0200"); // empty valid places
    pub const E0201: DiagCode = DiagCode("E0201"); // pass failed

    // W01xx — settings
    pub const W0100: DiagCode = DiagCode("W0100"); // unknown setting

    // W02xx — passes
    pub const W0200: DiagCode = DiagCode("W0200"); // io_copy kernel left unnarrowed
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Option<Span>,
    pub node: Option<NodeId>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, location or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span: None,
            node: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a source location.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach the graph node the diagnostic is about.
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(node) = self.node {
            write!(f, " (node {})", node)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Whether any diagnostic in `diags` is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

/// 1-based line and column of byte `offset` in `source`.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let col = before.rfind('\n').map_or(offset, |nl| offset - nl - 1) + 1;
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_node() {
        let d = Diagnostic::warning(codes::W0200, "no io_copy kernel matches").with_node(NodeId(7));
        assert_eq!(
            format!("{d}"),
            "warning[W0200]: no io_copy kernel matches (node #7)"
        );
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(codes::E0102, "undefined argument 'x'")
            .with_span(dummy_span())
            .with_hint("declare it with `arg x: <place>`");

        assert_eq!(d.code, Some(codes::E0102));
        assert!(d.is_error());
        assert!(d.span.is_some());
        assert_eq!(
            format!("{d}"),
            "error[E0102]: undefined argument 'x'\n  hint: declare it with `arg x: <place>`"
        );
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let warn = Diagnostic::warning(codes::W0100, "unknown setting");
        assert!(!has_errors(std::slice::from_ref(&warn)));
        let err = Diagnostic::error(codes::E0101, "unknown operator");
        assert!(has_errors(&[warn, err]));
    }

    #[test]
    fn line_col_positions() {
        let src = "arg x\ninst relu(X: x) -> (Out: y)";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 4), (1, 5));
        assert_eq!(line_col(src, 6), (2, 1));
        assert_eq!(line_col(src, 11), (2, 6));
    }
}
