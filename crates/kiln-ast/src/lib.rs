// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Syntax tree consumed by the Kiln semantic core.
//!
//! The parser lives outside this workspace; it produces one [`Module`] per
//! source file. Every later stage reads these nodes and never writes them.

pub mod build;
pub mod expr;
pub mod item;
pub mod span;
pub mod stmt;
pub mod ty;

pub use expr::{BinOp, Expr, ExprKind, FieldInit, NumSuffix, UnaryOp, VariantPattern};
pub use item::{
    FnClause, FnFlags, ImportDecl, ImportKind, ImportName, Item, ItemKind, Linkage, Module, Param,
    ParamPattern, TypeDecl,
};
pub use span::{LineMap, Span};
pub use stmt::{Stmt, StmtKind};
pub use ty::TypeAnnot;

/// Unique identifier for syntax nodes.
///
/// Assigned by the parser; diagnostics use it to point back at source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    pub const DUMMY: NodeId = NodeId(u32::MAX);
}
