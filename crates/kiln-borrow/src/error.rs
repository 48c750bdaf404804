// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Borrow and lifetime errors.

use kiln_ast::Span;
use kiln_types::TypeError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BorrowError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("borrow of `{local}` outlives it in `{function}`")]
    LifetimeEscape {
        function: String,
        local: String,
        span: Span,
    },
    #[error("cannot borrow `{local}` as {requested} while it is already borrowed as {existing}")]
    BorrowConflict {
        function: String,
        local: String,
        requested: BorrowMode,
        existing: BorrowMode,
        /// Where the borrow still alive was taken.
        first: Span,
        span: Span,
    },
    #[error("loop in `{function}` has no reachable `continue`")]
    LoopWithoutContinue { function: String, span: Span },
}

impl BorrowError {
    pub fn span(&self) -> Span {
        match self {
            BorrowError::Type(e) => e.span(),
            BorrowError::LifetimeEscape { span, .. }
            | BorrowError::BorrowConflict { span, .. }
            | BorrowError::LoopWithoutContinue { span, .. } => *span,
        }
    }
}

/// Whether a borrow is shared (read-only) or exclusive (mutable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BorrowMode {
    Shared,
    Exclusive,
}

impl BorrowMode {
    pub fn from_mutable(mutable: bool) -> Self {
        if mutable {
            BorrowMode::Exclusive
        } else {
            BorrowMode::Shared
        }
    }

    /// Whether a borrow in `self` mode may coexist with one in `other`.
    pub fn compatible(self, other: BorrowMode) -> bool {
        self == BorrowMode::Shared && other == BorrowMode::Shared
    }
}

impl std::fmt::Display for BorrowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BorrowMode::Shared => write!(f, "shared"),
            BorrowMode::Exclusive => write!(f, "mutable"),
        }
    }
}
