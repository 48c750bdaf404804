// SPDX-License-Identifier: (MIT OR Apache-2.0)

use kiln_ast::Span;
use kiln_borrow::BorrowError;
use kiln_diagnostics::{Classify, Diagnostic, ErrorKind, ToDiagnostic};
use kiln_dispatch::DispatchError;
use kiln_inline::InlineError;
use kiln_ir::LowerError;
use kiln_lift::LiftError;

/// The first fatal error of one module's pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Borrow(#[from] BorrowError),
    #[error(transparent)]
    Lift(#[from] LiftError),
    #[error(transparent)]
    Inline(#[from] InlineError),
    #[error(transparent)]
    Lower(#[from] LowerError),
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::Dispatch(e) => e.span(),
            CompileError::Borrow(e) => e.span(),
            CompileError::Lift(e) => e.span(),
            CompileError::Inline(e) => e.span(),
            CompileError::Lower(e) => e.span(),
        }
    }

    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Dispatch(_) => "dispatch",
            CompileError::Borrow(_) => "borrow",
            CompileError::Lift(_) => "lift",
            CompileError::Inline(_) => "inline",
            CompileError::Lower(_) => "lower",
        }
    }
}

impl Classify for CompileError {
    fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Dispatch(e) => e.kind(),
            CompileError::Borrow(e) => e.kind(),
            CompileError::Lift(e) => e.kind(),
            CompileError::Inline(e) => e.kind(),
            CompileError::Lower(e) => e.kind(),
        }
    }
}

impl ToDiagnostic for CompileError {
    fn to_diagnostic(&self) -> Diagnostic {
        match self {
            CompileError::Dispatch(e) => e.to_diagnostic(),
            CompileError::Borrow(e) => e.to_diagnostic(),
            CompileError::Lift(e) => e.to_diagnostic(),
            CompileError::Inline(e) => e.to_diagnostic(),
            CompileError::Lower(e) => e.to_diagnostic(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("module `{module}` failed to compile: {source}")]
    Module {
        module: String,
        #[source]
        source: CompileError,
    },
    #[error("module `{0}` is given more than once")]
    DuplicateModule(String),
    #[error("module `{module}` imports `{import}`, which is not part of the build")]
    UnknownImport { module: String, import: String },
    #[error("import cycle between {}", .modules.join(", "))]
    ImportCycle { modules: Vec<String> },
}
