// SPDX-License-Identifier: (MIT OR Apache-2.0)

use std::fmt;

use serde::Serialize;

/// Every way compilation of a module can fail. All are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorKind {
    TypeMismatch,
    AmbiguousOverload,
    NonExhaustiveMatch,
    LifetimeEscape,
    BorrowConflict,
    EscapingCapture,
    /// Only reported outside liberal mode, or for values no table entry can
    /// stand for.
    NonInlinableIndirectCall,
    UnexportableType,
    PackedSizeExceeded,
    LoopWithoutContinue,
    UnresolvedName,
    InvalidDeclaration,
    RecursiveTemplate,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 13] = [
        ErrorKind::TypeMismatch,
        ErrorKind::AmbiguousOverload,
        ErrorKind::NonExhaustiveMatch,
        ErrorKind::LifetimeEscape,
        ErrorKind::BorrowConflict,
        ErrorKind::EscapingCapture,
        ErrorKind::NonInlinableIndirectCall,
        ErrorKind::UnexportableType,
        ErrorKind::PackedSizeExceeded,
        ErrorKind::LoopWithoutContinue,
        ErrorKind::UnresolvedName,
        ErrorKind::InvalidDeclaration,
        ErrorKind::RecursiveTemplate,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "K0001",
            ErrorKind::AmbiguousOverload => "K0002",
            ErrorKind::NonExhaustiveMatch => "K0003",
            ErrorKind::LifetimeEscape => "K0004",
            ErrorKind::BorrowConflict => "K0005",
            ErrorKind::EscapingCapture => "K0006",
            ErrorKind::NonInlinableIndirectCall => "K0007",
            ErrorKind::UnexportableType => "K0008",
            ErrorKind::PackedSizeExceeded => "K0009",
            ErrorKind::LoopWithoutContinue => "K0010",
            ErrorKind::UnresolvedName => "K0011",
            ErrorKind::InvalidDeclaration => "K0012",
            ErrorKind::RecursiveTemplate => "K0013",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
