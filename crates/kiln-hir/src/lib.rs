// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typed, name-resolved program tree.
//!
//! Produced by dispatch resolution and rewritten whole by the lifter and the
//! inliner. Every expression carries its type; every call names the group
//! and clause it reaches.

mod expr;
mod interface;
mod program;
pub mod visit;

pub use expr::{
    BreakTarget, CallTarget, FnRef, HirExpr, HirExprKind, HirStmt, HirStmtKind, MatchArm, Pattern,
};
pub use interface::{ExportedFunction, ModuleInterface};
pub use program::{
    BindingRef, FunctionClause, FunctionGroup, GroupFlags, GroupOrigin, HirProgram, Local,
    LocalKind, LocalTable,
};

use serde::{Deserialize, Serialize};

/// A function group within one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// A local slot within one clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

/// Target of a `break` out of an inlined body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelId(pub u32);
