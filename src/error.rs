use std::fmt;

use serde::Serialize;
use ts_rs::TS;

use crate::ast::Span;
use crate::code_frame;

/// A compilation error with source location.
///
/// `detail` holds the rendered code frame. It is filled by the module that
/// owns the source the span points into, see [`CompileError::with_frame`].
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Syntax,
    Reference,
    Type,
    Range,
    Resolution,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Lex => "LexError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Resolution => "ResolutionError",
        }
    }
}

impl CompileError {
    fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            detail: String::new(),
        }
    }

    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lex, message, span)
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Syntax, message, span)
    }

    pub fn reference(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Reference, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type, message, span)
    }

    pub fn range(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Range, message, span)
    }

    pub fn resolution(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Resolution, message, span)
    }

    /// Render the code frame against `source` unless one is already attached.
    pub fn with_frame(mut self, source: &str, specifier: &str) -> Self {
        if self.detail.is_empty() {
            self.detail = code_frame::render(source, self.span, specifier, &self.message);
        }
        self
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic {
            level: Level::Error,
            message: self.message,
            location: self.span,
            detail: self.detail,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Level {
    Warning,
    Error,
}

/// Structured message returned to callers of [`crate::translate`].
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub location: Span,
    pub detail: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, location: Span, source: &str, specifier: &str) -> Self {
        let message = message.into();
        let detail = code_frame::render(source, location, specifier, &message);
        Self {
            level: Level::Warning,
            message,
            location,
            detail,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ast::Position;

    fn at(col: usize, len: usize) -> Span {
        Span {
            start_index: col - 1,
            end_index: col - 1 + len,
            start: Position { line: 1, column: col },
            end: Position { line: 1, column: col + len },
        }
    }

    #[test]
    fn display_names_the_kind() {
        let e = CompileError::type_error("Expected boolean but got number", at(1, 1));
        assert_eq!(e.to_string(), "TypeError: Expected boolean but got number");
        assert_eq!(CompileError::resolution("x", at(1, 1)).kind.name(), "ResolutionError");
    }

    #[test]
    fn first_frame_wins() {
        let e = CompileError::reference("y is not declared", at(5, 1))
            .with_frame("let y;", "inner")
            .with_frame("something else", "outer");
        assert!(e.detail.contains("--> inner:1:5"), "{}", e.detail);
        assert_eq!(e.to_string(), "ReferenceError: y is not declared");
    }

    #[test]
    fn diagnostic_serializes_camel_case_location() {
        let d = CompileError::syntax("Unexpected token", at(2, 3))
            .with_frame("a bcd", "f")
            .into_diagnostic();
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["location"]["startIndex"], 1);
        assert_eq!(json["location"]["end"]["column"], 5);
    }
}
