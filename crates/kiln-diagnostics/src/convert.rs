// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions from stage error types to `ErrorKind` and `Diagnostic`.

use kiln_borrow::BorrowError;
use kiln_dispatch::DispatchError;
use kiln_inline::InlineError;
use kiln_ir::LowerError;
use kiln_lift::LiftError;
use kiln_types::TypeError;

use crate::{Classify, Diagnostic, ErrorKind, ToDiagnostic};

// ============================================================================
// Type Errors
// ============================================================================

impl Classify for TypeError {
    fn kind(&self) -> ErrorKind {
        match self {
            TypeError::Mismatch { .. }
            | TypeError::TypeArity { .. }
            | TypeError::StorageOnly { .. }
            | TypeError::UnresolvedTypeVar { .. } => ErrorKind::TypeMismatch,
            TypeError::LifetimeMismatch { .. } => ErrorKind::LifetimeEscape,
            TypeError::UndefinedType { .. } => ErrorKind::UnresolvedName,
            TypeError::PackedSizeExceeded { .. } => ErrorKind::PackedSizeExceeded,
            TypeError::DuplicateType { .. } | TypeError::InvalidPackedKind { .. } | TypeError::InfiniteSize { .. } => {
                ErrorKind::InvalidDeclaration
            }
        }
    }
}

impl ToDiagnostic for TypeError {
    fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::of_kind(self.kind(), self.to_string());
        match self {
            TypeError::Mismatch { expected, .. } => diag.with_primary(self.span(), format!("expected {expected}")),
            TypeError::StorageOnly { .. } => diag
                .with_primary(self.span(), "storage-only type")
                .with_help("store it in a product, sum or packed field and read it back as a stack type"),
            TypeError::PackedSizeExceeded { bits, .. } => diag
                .with_primary(self.span(), format!("{bits} bits"))
                .with_note("packed fields share one u64 carrier and must total fewer than 64 bits"),
            TypeError::UnresolvedTypeVar { .. } => {
                diag.with_primary(self.span(), "cannot infer").with_help("pass the type argument explicitly")
            }
            TypeError::UndefinedType { .. } => diag.with_primary(self.span(), "not found in this module"),
            _ => diag.with_primary(self.span(), "here"),
        }
    }
}

// ============================================================================
// Dispatch Errors
// ============================================================================

impl Classify for DispatchError {
    fn kind(&self) -> ErrorKind {
        use DispatchError::*;

        match self {
            Type(e) => e.kind(),
            UnresolvedName { .. } | UnknownModule { .. } | UnknownVariant { .. } | UnknownField { .. } => {
                ErrorKind::UnresolvedName
            }
            AmbiguousOverload { .. } | AmbiguousVariant { .. } => ErrorKind::AmbiguousOverload,
            NonExhaustiveMatch { .. } => ErrorKind::NonExhaustiveMatch,
            ArgumentCount { .. }
            | NotCallable { .. }
            | NotAPlace { .. }
            | AssignToImmutable { .. }
            | MissingReturn { .. }
            | GenericFunctionValue { .. }
            | InvalidCast { .. } => ErrorKind::TypeMismatch,
            UnexportableType { .. } | InvalidHostSignature { .. } => ErrorKind::UnexportableType,
            ClauseConflict { .. }
            | ImpureGetter { .. }
            | BreakOutsideLoop { .. }
            | BreakValueInLoop { .. }
            | ContinueOutsideLoop { .. }
            | InvalidNested { .. }
            | DuplicateName { .. } => ErrorKind::InvalidDeclaration,
        }
    }
}

impl ToDiagnostic for DispatchError {
    fn to_diagnostic(&self) -> Diagnostic {
        use DispatchError::*;

        let diag = Diagnostic::of_kind(self.kind(), self.to_string());
        let span = self.span();
        match self {
            Type(e) => e.to_diagnostic(),
            UnresolvedName { .. } => diag.with_primary(span, "not found in this scope"),
            AmbiguousOverload { second, .. } => diag
                .with_primary(span, format!("clause {second} can never be chosen"))
                .with_help("remove one of the clauses or give them different patterns"),
            NonExhaustiveMatch { function, .. } => diag
                .with_primary(span, "arguments may match no clause")
                .with_help(format!("add a final clause of `{function}` with plain parameters")),
            UnexportableType { ty, .. } => diag
                .with_primary(span, format!("{ty} cannot cross the host boundary"))
                .with_help("pass it behind a pointer or borrow"),
            ImpureGetter { function, .. } => diag
                .with_primary(span, "called as a getter here")
                .with_help(format!("declare `{function}` as `pure`")),
            AssignToImmutable { name, .. } => diag
                .with_primary(span, "cannot assign")
                .with_help(format!("declare `{name}` as mutable")),
            ContinueOutsideLoop { .. } | BreakOutsideLoop { .. } => diag.with_primary(span, "not inside a loop"),
            _ => diag.with_primary(span, "here"),
        }
    }
}

// ============================================================================
// Borrow Errors
// ============================================================================

impl Classify for BorrowError {
    fn kind(&self) -> ErrorKind {
        match self {
            BorrowError::Type(e) => e.kind(),
            BorrowError::LifetimeEscape { .. } => ErrorKind::LifetimeEscape,
            BorrowError::BorrowConflict { .. } => ErrorKind::BorrowConflict,
            BorrowError::LoopWithoutContinue { .. } => ErrorKind::LoopWithoutContinue,
        }
    }
}

impl ToDiagnostic for BorrowError {
    fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::of_kind(self.kind(), self.to_string());
        match self {
            BorrowError::Type(e) => e.to_diagnostic(),
            BorrowError::LifetimeEscape { local, span, .. } => diag
                .with_primary(*span, format!("escapes while `{local}` is dropped"))
                .with_note("a returned borrow must come from a parameter or a static"),
            BorrowError::BorrowConflict { local, requested, existing, first, span, .. } => diag
                .with_primary(*span, format!("{requested} borrow of `{local}` here"))
                .with_secondary(*first, format!("{existing} borrow is still alive")),
            BorrowError::LoopWithoutContinue { span, .. } => diag
                .with_primary(*span, "this loop never repeats")
                .with_help("add a `continue`, or replace the loop with a block"),
        }
    }
}

// ============================================================================
// Lift Errors
// ============================================================================

impl Classify for LiftError {
    fn kind(&self) -> ErrorKind {
        match self {
            LiftError::EscapingCapture { .. } => ErrorKind::EscapingCapture,
        }
    }
}

impl ToDiagnostic for LiftError {
    fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LiftError::EscapingCapture { binding, span, .. } => Diagnostic::of_kind(self.kind(), self.to_string())
                .with_primary(*span, format!("may outlive `{binding}`"))
                .with_help("pass the function directly as a call argument"),
        }
    }
}

// ============================================================================
// Inline Errors
// ============================================================================

impl Classify for InlineError {
    fn kind(&self) -> ErrorKind {
        match self {
            InlineError::Dispatch(e) => e.kind(),
            InlineError::RecursiveTemplate { .. } => ErrorKind::RecursiveTemplate,
            InlineError::NonInlinableIndirectCall { .. } => ErrorKind::NonInlinableIndirectCall,
        }
    }
}

impl ToDiagnostic for InlineError {
    fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::of_kind(self.kind(), self.to_string());
        match self {
            InlineError::Dispatch(e) => e.to_diagnostic(),
            InlineError::RecursiveTemplate { span, .. } => diag
                .with_primary(*span, "expands into itself")
                .with_help("drop the `template` flag to compile it as a function"),
            InlineError::NonInlinableIndirectCall { reason: None, span, .. } => diag
                .with_primary(*span, "the callee is only known at run time")
                .with_help("enable liberal mode to call it through the function table"),
            InlineError::NonInlinableIndirectCall { span, .. } => {
                diag.with_primary(*span, "no table entry can stand for this value")
            }
        }
    }
}

// ============================================================================
// Lower Errors
// ============================================================================

impl Classify for LowerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LowerError::Type(e) => e.kind(),
            LowerError::MissingFunction { .. } => ErrorKind::UnresolvedName,
            LowerError::UnresolvedInstance { .. } | LowerError::InvalidField { .. } => ErrorKind::TypeMismatch,
            LowerError::UnresolvedFunctionValue { .. } => ErrorKind::NonInlinableIndirectCall,
        }
    }
}

impl ToDiagnostic for LowerError {
    fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LowerError::Type(e) => e.to_diagnostic(),
            _ => Diagnostic::of_kind(self.kind(), self.to_string()).with_primary(self.span(), "here"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ast::Span;
    use kiln_borrow::BorrowMode;
    use kiln_types::TypeExpr;
    use pretty_assertions::assert_eq;

    use crate::LabelStyle;

    #[test]
    fn wrapped_errors_keep_their_kind() {
        let packed = TypeError::PackedSizeExceeded { name: "Flags".into(), bits: 90, span: Span::new(3, 8) };
        let wrapped = InlineError::Dispatch(DispatchError::Type(packed.clone()));
        assert_eq!(wrapped.kind(), ErrorKind::PackedSizeExceeded);
        assert_eq!(wrapped.to_diagnostic(), packed.to_diagnostic());
        assert_eq!(BorrowError::Type(packed).kind(), ErrorKind::PackedSizeExceeded);
    }

    #[test]
    fn borrow_conflicts_point_at_both_borrows() {
        let err = BorrowError::BorrowConflict {
            function: "main".into(),
            local: "x".into(),
            requested: BorrowMode::Exclusive,
            existing: BorrowMode::Shared,
            first: Span::new(10, 12),
            span: Span::new(20, 26),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_ref().map(|c| c.0.as_str()), Some("K0005"));
        let styles: Vec<_> = diag.labels.iter().map(|l| (l.style, l.span)).collect();
        assert_eq!(
            styles,
            vec![(LabelStyle::Primary, Span::new(20, 26)), (LabelStyle::Secondary, Span::new(10, 12))]
        );
    }

    #[test]
    fn host_signature_errors_are_unexportable_types() {
        let err = DispatchError::UnexportableType {
            function: "area".into(),
            ty: TypeExpr::named("Shape"),
            span: Span::default(),
        };
        assert_eq!(err.kind(), ErrorKind::UnexportableType);
        let reason = DispatchError::InvalidHostSignature {
            function: "id".into(),
            reason: "host functions cannot be generic".into(),
            span: Span::default(),
        };
        assert_eq!(reason.kind(), ErrorKind::UnexportableType);
    }

    #[test]
    fn liberal_mode_is_suggested_only_without_a_reason() {
        let err = |reason: Option<&str>| InlineError::NonInlinableIndirectCall {
            function: "main".into(),
            value: "double".into(),
            reason: reason.map(str::to_string),
            span: Span::default(),
        };
        assert!(err(None).to_diagnostic().help.is_some_and(|h| h.contains("liberal")));
        assert_eq!(err(Some("it captures bindings of an enclosing function")).to_diagnostic().help, None);
    }
}
