// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error code registry.
//!
//! Maps error codes (K0001, K0005, etc.) to titles and categories.

use std::collections::HashMap;

use crate::ErrorKind;

/// Registry of all known error codes.
pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

/// Information about a single error code.
#[derive(Debug)]
pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub title: &'static str,
    pub category: ErrorCategory,
}

/// Error category for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Resolution,
    Type,
    Dispatch,
    Ownership,
    Inlining,
    Host,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Resolution => write!(f, "Resolution"),
            ErrorCategory::Type => write!(f, "Type"),
            ErrorCategory::Dispatch => write!(f, "Dispatch"),
            ErrorCategory::Ownership => write!(f, "Ownership"),
            ErrorCategory::Inlining => write!(f, "Inlining"),
            ErrorCategory::Host => write!(f, "Host"),
        }
    }
}

macro_rules! register_codes {
    ($($kind:expr => ($title:literal, $cat:expr)),* $(,)?) => {{
        let mut map = HashMap::new();
        $(
            let kind: ErrorKind = $kind;
            map.insert(kind.code(), ErrorCodeInfo {
                code: kind.code(),
                kind,
                title: $title,
                category: $cat,
            });
        )*
        map
    }};
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        use ErrorCategory::*;

        Self {
            codes: register_codes! {
                ErrorKind::TypeMismatch => ("mismatched types", Type),
                ErrorKind::PackedSizeExceeded => ("packed type too wide", Type),
                ErrorKind::AmbiguousOverload => ("ambiguous clauses", Dispatch),
                ErrorKind::NonExhaustiveMatch => ("no clause matches", Dispatch),
                ErrorKind::LifetimeEscape => ("borrow outlives its referent", Ownership),
                ErrorKind::BorrowConflict => ("conflicting borrows", Ownership),
                ErrorKind::EscapingCapture => ("capturing function escapes", Ownership),
                ErrorKind::LoopWithoutContinue => ("loop without continue", Ownership),
                ErrorKind::NonInlinableIndirectCall => ("function value cannot be inlined", Inlining),
                ErrorKind::RecursiveTemplate => ("recursive template", Inlining),
                ErrorKind::UnexportableType => ("type cannot cross the host boundary", Host),
                ErrorKind::UnresolvedName => ("undefined name", Resolution),
                ErrorKind::InvalidDeclaration => ("invalid declaration", Resolution),
            },
        }
    }
}

impl ErrorCodeRegistry {
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    pub fn all(&self) -> impl Iterator<Item = &ErrorCodeInfo> {
        self.codes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_registered_code() {
        let registry = ErrorCodeRegistry::default();
        for kind in ErrorKind::ALL {
            let info = registry.get(kind.code()).unwrap_or_else(|| panic!("{kind} is not registered"));
            assert_eq!(info.kind, kind);
        }
        assert_eq!(registry.all().count(), ErrorKind::ALL.len());
        assert_eq!(registry.get("K0005").map(|i| i.category), Some(ErrorCategory::Ownership));
    }
}
