// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type errors.

use kiln_ast::Span;

use crate::ty::{Lifetime, TypeExpr};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch {
        expected: TypeExpr,
        found: TypeExpr,
        span: Span,
    },
    #[error("borrow with lifetime {found} does not outlive the required {expected}")]
    LifetimeMismatch {
        expected: Lifetime,
        found: Lifetime,
        span: Span,
    },
    #[error("undefined type `{name}`")]
    UndefinedType { name: String, span: Span },
    #[error("type `{name}` is declared more than once")]
    DuplicateType { name: String, span: Span },
    #[error("type `{name}` expects {expected} type arguments, found {found}")]
    TypeArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("packed type `{name}` needs {bits} bits; packed fields must total fewer than 64")]
    PackedSizeExceeded { name: String, bits: u32, span: Span },
    #[error("`{kind}` cannot be a packed field; use bool, u8, u16 or u32")]
    InvalidPackedKind { kind: String, span: Span },
    #[error("{ty} is storage-only and cannot be used as a value")]
    StorageOnly { ty: TypeExpr, span: Span },
    #[error("type variable `{var}` is never resolved")]
    UnresolvedTypeVar { var: String, span: Span },
    #[error("type `{name}` contains itself and has no finite size")]
    InfiniteSize { name: String, span: Span },
}

impl TypeError {
    pub fn span(&self) -> Span {
        match self {
            TypeError::Mismatch { span, .. }
            | TypeError::LifetimeMismatch { span, .. }
            | TypeError::UndefinedType { span, .. }
            | TypeError::DuplicateType { span, .. }
            | TypeError::TypeArity { span, .. }
            | TypeError::PackedSizeExceeded { span, .. }
            | TypeError::InvalidPackedKind { span, .. }
            | TypeError::StorageOnly { span, .. }
            | TypeError::UnresolvedTypeVar { span, .. }
            | TypeError::InfiniteSize { span, .. } => *span,
        }
    }
}
