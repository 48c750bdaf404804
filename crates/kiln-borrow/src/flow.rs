// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Every loop must be able to reach a `continue`.

use kiln_hir::visit::{self, Child};
use kiln_hir::{HirExpr, HirStmt, HirStmtKind};

use crate::error::BorrowError;

pub(crate) fn check_loops(function: &str, body: &HirExpr) -> Result<(), BorrowError> {
    let mut missing = None;
    for_each_loop_in_expr(body, &mut |stmt, loop_body| {
        if missing.is_none() && !reaches_continue(loop_body) {
            missing = Some(stmt.span);
        }
    });
    match missing {
        Some(span) => Err(BorrowError::LoopWithoutContinue { function: function.to_string(), span }),
        None => Ok(()),
    }
}

fn for_each_loop_in_expr(expr: &HirExpr, f: &mut impl FnMut(&HirStmt, &[HirStmt])) {
    for child in visit::children(expr) {
        match child {
            Child::Expr(e) => for_each_loop_in_expr(e, f),
            Child::Stmts(stmts) => for_each_loop(stmts, f),
        }
    }
}

fn for_each_loop(stmts: &[HirStmt], f: &mut impl FnMut(&HirStmt, &[HirStmt])) {
    for stmt in stmts {
        if let HirStmtKind::Loop(body) = &stmt.kind {
            f(stmt, body);
            for_each_loop(body, f);
        }
        for e in visit::stmt_exprs(stmt) {
            for_each_loop_in_expr(e, f);
        }
    }
}

/// Whether some `continue` of this loop runs before control leaves `stmts`.
fn reaches_continue(stmts: &[HirStmt]) -> bool {
    for stmt in stmts {
        match &stmt.kind {
            HirStmtKind::Continue => return true,
            // Continues inside an inner loop restart that loop.
            HirStmtKind::Loop(_) => {}
            _ => {
                if visit::stmt_exprs(stmt).into_iter().any(expr_reaches_continue) {
                    return true;
                }
            }
        }
        if diverges(stmt) {
            return false;
        }
    }
    false
}

fn expr_reaches_continue(expr: &HirExpr) -> bool {
    visit::children(expr).into_iter().any(|child| match child {
        Child::Expr(e) => expr_reaches_continue(e),
        Child::Stmts(stmts) => reaches_continue(stmts),
    })
}

fn diverges(stmt: &HirStmt) -> bool {
    match &stmt.kind {
        HirStmtKind::Return(_) | HirStmtKind::Break { .. } | HirStmtKind::Continue => true,
        HirStmtKind::Loop(body) => !visit::loop_breaks(body),
        HirStmtKind::Let { init: e, .. } | HirStmtKind::Expr(e) => e.ty.is_never(),
        HirStmtKind::Assign { value, .. } => value.ty.is_never(),
        HirStmtKind::FnDef(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ast::Span;
    use kiln_hir::{BreakTarget, HirExprKind};
    use kiln_types::TypeExpr;

    fn stmt(kind: HirStmtKind) -> HirStmt {
        HirStmt::new(kind, Span::default())
    }

    fn body(stmts: Vec<HirStmt>) -> HirExpr {
        HirExpr::new(HirExprKind::Block { stmts, value: None }, TypeExpr::Void, Span::default())
    }

    fn brk() -> HirStmt {
        stmt(HirStmtKind::Break { target: BreakTarget::Loop, value: None })
    }

    #[test]
    fn continue_after_a_break_is_unreachable() {
        let looped = stmt(HirStmtKind::Loop(vec![brk(), stmt(HirStmtKind::Continue)]));
        let err = check_loops("f", &body(vec![looped])).unwrap_err();
        assert!(matches!(err, BorrowError::LoopWithoutContinue { .. }));
    }

    #[test]
    fn inner_continue_belongs_to_the_inner_loop() {
        let inner = stmt(HirStmtKind::Loop(vec![stmt(HirStmtKind::Continue)]));
        let outer = stmt(HirStmtKind::Loop(vec![stmt(HirStmtKind::Expr(body(vec![brk()]))), inner]));
        assert!(check_loops("f", &body(vec![outer])).is_err());

        let inner = stmt(HirStmtKind::Loop(vec![brk(), stmt(HirStmtKind::Continue)]));
        assert!(check_loops("f", &body(vec![inner])).is_err());
    }

    #[test]
    fn continue_in_a_branch_counts() {
        let branch = HirExpr::new(
            HirExprKind::If {
                cond: Box::new(HirExpr::new(HirExprKind::Int(1), TypeExpr::i32(), Span::default())),
                then_branch: Box::new(body(vec![stmt(HirStmtKind::Continue)])),
                else_branch: None,
            },
            TypeExpr::Void,
            Span::default(),
        );
        let looped = stmt(HirStmtKind::Loop(vec![stmt(HirStmtKind::Expr(branch)), brk()]));
        assert!(check_loops("f", &body(vec![looped])).is_ok());
    }
}
