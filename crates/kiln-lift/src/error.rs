// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lifting errors.

use kiln_ast::Span;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiftError {
    /// A function that captures bindings used as a value anywhere but as a
    /// direct call argument, where it could outlive what it captures.
    #[error("`{function}` captures `{binding}` and cannot be used as a value here")]
    EscapingCapture {
        function: String,
        binding: String,
        span: Span,
    },
}

impl LiftError {
    pub fn span(&self) -> Span {
        match self {
            LiftError::EscapingCapture { span, .. } => *span,
        }
    }
}
