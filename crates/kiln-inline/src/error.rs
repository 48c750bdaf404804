// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Inlining errors.

use kiln_ast::Span;
use kiln_dispatch::DispatchError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InlineError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("template `{function}` calls itself and cannot be expanded")]
    RecursiveTemplate { function: String, span: Span },
    /// A function value that cannot be resolved to a direct call, outside
    /// liberal mode or when no table entry can stand for it.
    #[error("function value `{value}` in `{function}` cannot be inlined{}", reason_suffix(.reason))]
    NonInlinableIndirectCall {
        function: String,
        value: String,
        reason: Option<String>,
        span: Span,
    },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl InlineError {
    pub fn span(&self) -> Span {
        match self {
            InlineError::Dispatch(e) => e.span(),
            InlineError::RecursiveTemplate { span, .. } | InlineError::NonInlinableIndirectCall { span, .. } => *span,
        }
    }
}
