// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement nodes.

use crate::expr::Expr;
use crate::item::FnClause;
use crate::ty::TypeAnnot;
use crate::{NodeId, Span};

#[derive(Debug, Clone)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Expression statement. The last one of a block is the block's value.
    Expr(Expr),
    Let {
        name: String,
        is_mut: bool,
        ty: Option<TypeAnnot>,
        init: Expr,
    },
    Assign { target: Expr, value: Expr },
    Return(Option<Expr>),
    /// Leaves the innermost loop, or yields the value of a template body.
    Break(Option<Expr>),
    /// Restarts the innermost loop.
    Continue,
    /// Runs its body; only `continue` starts another iteration.
    Loop(Vec<Stmt>),
    /// Nested function definition.
    FnDef(FnClause),
}
