// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Resolution errors.

use kiln_ast::Span;
use kiln_types::{TypeError, TypeExpr};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("cannot find `{name}` in this scope")]
    UnresolvedName { name: String, span: Span },
    #[error("module `{module}` is not available to import")]
    UnknownModule { module: String, span: Span },
    #[error("clauses {first} and {second} of `{function}` have identical patterns")]
    AmbiguousOverload {
        function: String,
        first: usize,
        second: usize,
        span: Span,
    },
    #[error("no clause of `{function}` is proven to match every argument")]
    NonExhaustiveMatch { function: String, span: Span },
    #[error("clauses of `{function}` disagree: {reason}")]
    ClauseConflict {
        function: String,
        reason: String,
        span: Span,
    },
    #[error("`{function}` takes {expected} arguments, found {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("{ty} is not callable")]
    NotCallable { ty: TypeExpr, span: Span },
    #[error("no variant `{variant}` in scope")]
    UnknownVariant { variant: String, span: Span },
    #[error("variant `{variant}` belongs to several types; name the type")]
    AmbiguousVariant { variant: String, span: Span },
    #[error("no field or getter `{field}` on {ty}")]
    UnknownField {
        ty: TypeExpr,
        field: String,
        span: Span,
    },
    #[error("getter `{function}` must be declared pure")]
    ImpureGetter { function: String, span: Span },
    #[error("expression is not a place")]
    NotAPlace { span: Span },
    #[error("cannot assign through `{name}`, which is not mutable")]
    AssignToImmutable { name: String, span: Span },
    #[error("`break` outside of a loop or template")]
    BreakOutsideLoop { span: Span },
    #[error("`break` out of a loop cannot carry a value")]
    BreakValueInLoop { span: Span },
    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop { span: Span },
    #[error("`{function}` must return {expected}")]
    MissingReturn {
        function: String,
        expected: TypeExpr,
        span: Span,
    },
    #[error("`{function}` crosses the host boundary with {ty}")]
    UnexportableType {
        function: String,
        ty: TypeExpr,
        span: Span,
    },
    #[error("host function `{function}`: {reason}")]
    InvalidHostSignature {
        function: String,
        reason: String,
        span: Span,
    },
    #[error("nested function `{function}`: {reason}")]
    InvalidNested {
        function: String,
        reason: String,
        span: Span,
    },
    #[error("generic function `{function}` cannot be used as a value")]
    GenericFunctionValue { function: String, span: Span },
    #[error("cannot cast {from} to {to}")]
    InvalidCast {
        from: TypeExpr,
        to: TypeExpr,
        span: Span,
    },
    #[error("`{name}` is declared more than once")]
    DuplicateName { name: String, span: Span },
}

impl DispatchError {
    pub fn span(&self) -> Span {
        match self {
            DispatchError::Type(e) => e.span(),
            DispatchError::UnresolvedName { span, .. }
            | DispatchError::UnknownModule { span, .. }
            | DispatchError::AmbiguousOverload { span, .. }
            | DispatchError::NonExhaustiveMatch { span, .. }
            | DispatchError::ClauseConflict { span, .. }
            | DispatchError::ArgumentCount { span, .. }
            | DispatchError::NotCallable { span, .. }
            | DispatchError::UnknownVariant { span, .. }
            | DispatchError::AmbiguousVariant { span, .. }
            | DispatchError::UnknownField { span, .. }
            | DispatchError::ImpureGetter { span, .. }
            | DispatchError::NotAPlace { span }
            | DispatchError::AssignToImmutable { span, .. }
            | DispatchError::BreakOutsideLoop { span }
            | DispatchError::BreakValueInLoop { span }
            | DispatchError::ContinueOutsideLoop { span }
            | DispatchError::MissingReturn { span, .. }
            | DispatchError::UnexportableType { span, .. }
            | DispatchError::InvalidHostSignature { span, .. }
            | DispatchError::InvalidNested { span, .. }
            | DispatchError::GenericFunctionValue { span, .. }
            | DispatchError::InvalidCast { span, .. }
            | DispatchError::DuplicateName { span, .. } => *span,
        }
    }
}
