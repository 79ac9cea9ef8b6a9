use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use vellum::parser::ParseError;

/// Which class of defect rejected the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing required attribute, invalid nesting, wrong child arity.
    Structural,
    /// Unresolvable import or component reference, circular expansion.
    Resolution,
    /// Expression content that cannot be reduced to a usable value.
    Value,
}

impl ErrorKind {
    fn label(&self) -> &'static str {
        match self {
            ErrorKind::Structural => "structural error",
            ErrorKind::Resolution => "resolution error",
            ErrorKind::Value => "value error",
        }
    }
}

/// A compile error with source location information. Compilation of a
/// document aborts at the first one; there is no partial output.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Range<usize>,
    pub file_id: usize,
    pub notes: Vec<String>,
}

impl CompileError {
    pub fn structural(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        CompileError {
            kind: ErrorKind::Structural,
            message: message.into(),
            span,
            file_id,
            notes: Vec::new(),
        }
    }

    pub fn resolution(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        CompileError {
            kind: ErrorKind::Resolution,
            message: message.into(),
            span,
            file_id,
            notes: Vec::new(),
        }
    }

    pub fn value(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        CompileError {
            kind: ErrorKind::Value,
            message: message.into(),
            span,
            file_id,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(format!("{}: {}", self.kind.label(), self.message))
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(error: ParseError) -> Self {
        CompileError {
            kind: ErrorKind::Structural,
            message: error.message,
            span: error.span,
            file_id: error.file_id,
            notes: error.notes,
        }
    }
}
