//! Compile-time diagnostic taxonomy (spec §7).
//!
//! Every phase of the pipeline — lexer, parser, semantic pre-pass, IR
//! builder, backend — reports failures as `Diagnostic`s instead of
//! panicking or short-circuiting the whole compile. The parser recovers
//! and keeps going (spec §4.2); every other phase collects as many
//! diagnostics as it can before returning them.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    LexError,
    ParseErrorUnexpectedToken,
    ParseErrorMissingToken,
    ParseErrorUnsupportedFeature,
    DuplicateName,
    UnresolvedIdentifier,
    UnresolvedQualifiedIdentifier,
    ReturnMissing,
    TypeMismatch,
    CtorAmbiguous,
    CtorNotFound,
    AccessDenied,
    UnresolvedSymbol,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::LexError => "LexError",
            DiagnosticKind::ParseErrorUnexpectedToken => "ParseError(UnexpectedToken)",
            DiagnosticKind::ParseErrorMissingToken => "ParseError(MissingToken)",
            DiagnosticKind::ParseErrorUnsupportedFeature => "ParseError(UnsupportedFeature)",
            DiagnosticKind::DuplicateName => "DuplicateName",
            DiagnosticKind::UnresolvedIdentifier => "UnresolvedIdentifier",
            DiagnosticKind::UnresolvedQualifiedIdentifier => "UnresolvedQualifiedIdentifier",
            DiagnosticKind::ReturnMissing => "ReturnMissing",
            DiagnosticKind::TypeMismatch => "TypeMismatch",
            DiagnosticKind::CtorAmbiguous => "CtorAmbiguous",
            DiagnosticKind::CtorNotFound => "CtorNotFound",
            DiagnosticKind::AccessDenied => "AccessDenied",
            DiagnosticKind::UnresolvedSymbol => "UnresolvedSymbol",
        };
        write!(f, "{s}")
    }
}

/// A single compile diagnostic: `{file, line, col, message}` per spec §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: PathBuf,
    /// 1-based line, per spec §4.1.
    pub line: usize,
    /// 1-based column, per spec §4.1.
    pub col: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        file: impl Into<PathBuf>,
        line: usize,
        col: usize,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            file: file.into(),
            line,
            col,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.col,
            self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

/// An accumulating sink threaded through every compiler phase. Phases keep
/// running after a local failure (the parser synchronizes and resumes;
/// later phases just skip the offending item) so the caller sees every
/// independent error in one pass (spec §8, "diagnostic aggregation").
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }
}
