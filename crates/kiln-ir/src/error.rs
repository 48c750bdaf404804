// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering errors.
//!
//! Earlier stages reject every source program that could reach these; they
//! guard against a stage handing over a program that is not fully resolved.

use kiln_ast::Span;
use kiln_types::{TypeError, TypeExpr};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LowerError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("call of removed function `{name}`")]
    MissingFunction { name: String, span: Span },
    #[error("no type argument for `{var}` when instantiating `{function}`")]
    UnresolvedInstance { function: String, var: String, span: Span },
    #[error("function value `{name}` was not resolved to a call or a table handle")]
    UnresolvedFunctionValue { name: String, span: Span },
    #[error("{ty} has no field {index}")]
    InvalidField { ty: TypeExpr, index: usize, span: Span },
}

impl LowerError {
    pub fn span(&self) -> Span {
        match self {
            LowerError::Type(e) => e.span(),
            LowerError::MissingFunction { span, .. }
            | LowerError::UnresolvedInstance { span, .. }
            | LowerError::UnresolvedFunctionValue { span, .. }
            | LowerError::InvalidField { span, .. } => *span,
        }
    }
}
