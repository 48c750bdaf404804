// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Kiln compiler diagnostics.
//!
//! Every stage error maps to one [`ErrorKind`] through [`Classify`] and to a
//! [`Diagnostic`] through [`ToDiagnostic`]. Rendering is left to the tool
//! embedding the compiler; [`json`] produces a machine-readable report.

pub mod codes;
pub mod convert;
pub mod json;
mod kind;

pub use kind::ErrorKind;

use kiln_ast::Span;
use serde::Serialize;

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub span: Span,
    pub style: LabelStyle,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// Where the error is.
    Primary,
    /// A related location.
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Note,
}

/// An error code like K0005.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorCode(pub String);

// ============================================================================
// Builder API
// ============================================================================

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
        }
    }

    /// Error diagnostic carrying the code of `kind`.
    pub fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::error(message).with_code(kind.code())
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(ErrorCode(code.into()));
        self
    }

    pub fn with_label(mut self, span: Span, style: LabelStyle, msg: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            style,
            message: Some(msg.into()),
        });
        self
    }

    pub fn with_primary(self, span: Span, msg: impl Into<String>) -> Self {
        self.with_label(span, LabelStyle::Primary, msg)
    }

    pub fn with_secondary(self, span: Span, msg: impl Into<String>) -> Self {
        self.with_label(span, LabelStyle::Secondary, msg)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Returns the primary span (first primary label, or first label).
    pub fn primary_span(&self) -> Option<Span> {
        self.labels
            .iter()
            .find(|l| l.style == LabelStyle::Primary)
            .or(self.labels.first())
            .map(|l| l.span)
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

/// The kind of a compiler error, independent of its message.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Convert a compiler error into a rich diagnostic.
pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_span_prefers_primary_labels() {
        let diag = Diagnostic::of_kind(ErrorKind::BorrowConflict, "conflict")
            .with_secondary(Span::new(0, 2), "first borrow")
            .with_primary(Span::new(5, 9), "second borrow");
        assert_eq!(diag.code, Some(ErrorCode("K0005".into())));
        assert_eq!(diag.primary_span(), Some(Span::new(5, 9)));
        assert_eq!(Diagnostic::error("bare").primary_span(), None);
    }
}
