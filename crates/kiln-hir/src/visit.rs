// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tree walkers shared by the passes.

use crate::expr::{BreakTarget, HirExpr, HirExprKind, HirStmt, HirStmtKind};

/// Calls `f` on `expr` and every expression below it, parents first.
pub fn walk_expr<'a>(expr: &'a HirExpr, f: &mut impl FnMut(&'a HirExpr)) {
    f(expr);
    match &expr.kind {
        HirExprKind::Int(_)
        | HirExprKind::Float(_)
        | HirExprKind::Local(_)
        | HirExprKind::FnHandle { .. } => {}
        HirExprKind::FnRef(r) => r.bound.iter().for_each(|e| walk_expr(e, f)),
        HirExprKind::Call { args, .. } => args.iter().for_each(|e| walk_expr(e, f)),
        HirExprKind::IndirectCall { callee, args } => {
            walk_expr(callee, f);
            args.iter().for_each(|e| walk_expr(e, f));
        }
        HirExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, f);
            walk_expr(rhs, f);
        }
        HirExprKind::Unary { operand: e, .. }
        | HirExprKind::Ref { place: e, .. }
        | HirExprKind::Deref(e)
        | HirExprKind::Field { object: e, .. }
        | HirExprKind::PackedField { object: e, .. }
        | HirExprKind::Cast(e)
        | HirExprKind::Inlined { body: e, .. } => walk_expr(e, f),
        HirExprKind::Variant { payload, .. } => {
            if let Some(p) = payload {
                walk_expr(p, f);
            }
        }
        HirExprKind::Product(fields) => fields.iter().for_each(|e| walk_expr(e, f)),
        HirExprKind::Block { stmts, value } => {
            walk_stmts(stmts, f);
            if let Some(v) = value {
                walk_expr(v, f);
            }
        }
        HirExprKind::If { cond, then_branch, else_branch } => {
            walk_expr(cond, f);
            walk_expr(then_branch, f);
            if let Some(e) = else_branch {
                walk_expr(e, f);
            }
        }
        HirExprKind::Match { scrutinees, arms } => {
            scrutinees.iter().for_each(|e| walk_expr(e, f));
            arms.iter().for_each(|arm| walk_expr(&arm.body, f));
        }
    }
}

pub fn walk_stmts<'a>(stmts: &'a [HirStmt], f: &mut impl FnMut(&'a HirExpr)) {
    for stmt in stmts {
        match &stmt.kind {
            HirStmtKind::Let { init: e, .. } | HirStmtKind::Expr(e) => walk_expr(e, f),
            HirStmtKind::Assign { place, value } => {
                walk_expr(place, f);
                walk_expr(value, f);
            }
            HirStmtKind::Return(v) | HirStmtKind::Break { value: v, .. } => {
                if let Some(v) = v {
                    walk_expr(v, f);
                }
            }
            HirStmtKind::Loop(body) => walk_stmts(body, f),
            HirStmtKind::Continue | HirStmtKind::FnDef(_) => {}
        }
    }
}

/// Calls `f` on every expression below `expr` and then on `expr`.
///
/// Children are visited first, so `f` may replace a node without the
/// replacement being walked again.
pub fn walk_expr_mut(expr: &mut HirExpr, f: &mut impl FnMut(&mut HirExpr)) {
    match &mut expr.kind {
        HirExprKind::Int(_)
        | HirExprKind::Float(_)
        | HirExprKind::Local(_)
        | HirExprKind::FnHandle { .. } => {}
        HirExprKind::FnRef(r) => r.bound.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        HirExprKind::Call { args, .. } => args.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        HirExprKind::IndirectCall { callee, args } => {
            walk_expr_mut(callee, f);
            args.iter_mut().for_each(|e| walk_expr_mut(e, f));
        }
        HirExprKind::Binary { lhs, rhs, .. } => {
            walk_expr_mut(lhs, f);
            walk_expr_mut(rhs, f);
        }
        HirExprKind::Unary { operand: e, .. }
        | HirExprKind::Ref { place: e, .. }
        | HirExprKind::Deref(e)
        | HirExprKind::Field { object: e, .. }
        | HirExprKind::PackedField { object: e, .. }
        | HirExprKind::Cast(e)
        | HirExprKind::Inlined { body: e, .. } => walk_expr_mut(e, f),
        HirExprKind::Variant { payload, .. } => {
            if let Some(p) = payload {
                walk_expr_mut(p, f);
            }
        }
        HirExprKind::Product(fields) => fields.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        HirExprKind::Block { stmts, value } => {
            walk_stmts_mut(stmts, f);
            if let Some(v) = value {
                walk_expr_mut(v, f);
            }
        }
        HirExprKind::If { cond, then_branch, else_branch } => {
            walk_expr_mut(cond, f);
            walk_expr_mut(then_branch, f);
            if let Some(e) = else_branch {
                walk_expr_mut(e, f);
            }
        }
        HirExprKind::Match { scrutinees, arms } => {
            scrutinees.iter_mut().for_each(|e| walk_expr_mut(e, f));
            arms.iter_mut().for_each(|arm| walk_expr_mut(&mut arm.body, f));
        }
    }
    f(expr);
}

pub fn walk_stmts_mut(stmts: &mut [HirStmt], f: &mut impl FnMut(&mut HirExpr)) {
    for stmt in stmts {
        match &mut stmt.kind {
            HirStmtKind::Let { init: e, .. } | HirStmtKind::Expr(e) => walk_expr_mut(e, f),
            HirStmtKind::Assign { place, value } => {
                walk_expr_mut(place, f);
                walk_expr_mut(value, f);
            }
            HirStmtKind::Return(v) | HirStmtKind::Break { value: v, .. } => {
                if let Some(v) = v {
                    walk_expr_mut(v, f);
                }
            }
            HirStmtKind::Loop(body) => walk_stmts_mut(body, f),
            HirStmtKind::Continue | HirStmtKind::FnDef(_) => {}
        }
    }
}

/// A direct child of an expression.
pub enum Child<'a> {
    Expr(&'a HirExpr),
    Stmts(&'a [HirStmt]),
}

/// Direct children of `expr`, in evaluation order.
pub fn children(expr: &HirExpr) -> Vec<Child<'_>> {
    let mut out = Vec::new();
    match &expr.kind {
        HirExprKind::Int(_)
        | HirExprKind::Float(_)
        | HirExprKind::Local(_)
        | HirExprKind::FnHandle { .. } => {}
        HirExprKind::FnRef(r) => out.extend(r.bound.iter().map(Child::Expr)),
        HirExprKind::Call { args, .. } => out.extend(args.iter().map(Child::Expr)),
        HirExprKind::IndirectCall { callee, args } => {
            out.push(Child::Expr(callee));
            out.extend(args.iter().map(Child::Expr));
        }
        HirExprKind::Binary { lhs, rhs, .. } => {
            out.push(Child::Expr(lhs));
            out.push(Child::Expr(rhs));
        }
        HirExprKind::Unary { operand: e, .. }
        | HirExprKind::Ref { place: e, .. }
        | HirExprKind::Deref(e)
        | HirExprKind::Field { object: e, .. }
        | HirExprKind::PackedField { object: e, .. }
        | HirExprKind::Cast(e)
        | HirExprKind::Inlined { body: e, .. } => out.push(Child::Expr(e)),
        HirExprKind::Variant { payload, .. } => out.extend(payload.as_deref().map(Child::Expr)),
        HirExprKind::Product(fields) => out.extend(fields.iter().map(Child::Expr)),
        HirExprKind::Block { stmts, value } => {
            out.push(Child::Stmts(stmts));
            out.extend(value.as_deref().map(Child::Expr));
        }
        HirExprKind::If { cond, then_branch, else_branch } => {
            out.push(Child::Expr(cond));
            out.push(Child::Expr(then_branch));
            out.extend(else_branch.as_deref().map(Child::Expr));
        }
        HirExprKind::Match { scrutinees, arms } => {
            out.extend(scrutinees.iter().map(Child::Expr));
            out.extend(arms.iter().map(|a| Child::Expr(&a.body)));
        }
    }
    out
}

/// Expressions held directly by a statement.
pub fn stmt_exprs(stmt: &HirStmt) -> Vec<&HirExpr> {
    match &stmt.kind {
        HirStmtKind::Let { init: e, .. } | HirStmtKind::Expr(e) => vec![e],
        HirStmtKind::Assign { place, value } => vec![place, value],
        HirStmtKind::Return(v) | HirStmtKind::Break { value: v, .. } => v.iter().collect(),
        HirStmtKind::Loop(_) | HirStmtKind::Continue | HirStmtKind::FnDef(_) => Vec::new(),
    }
}

/// Whether some `break` in `body` leaves this loop.
///
/// Breaks of inner loops and labelled breaks out of inlined bodies do not
/// count.
pub fn loop_breaks(body: &[HirStmt]) -> bool {
    fn in_stmt(stmt: &HirStmt) -> bool {
        match &stmt.kind {
            HirStmtKind::Break { target: BreakTarget::Loop, .. } => true,
            HirStmtKind::Loop(_) => false,
            _ => stmt_exprs(stmt).into_iter().any(in_expr),
        }
    }
    fn in_expr(expr: &HirExpr) -> bool {
        children(expr).into_iter().any(|c| match c {
            Child::Expr(e) => in_expr(e),
            Child::Stmts(stmts) => stmts.iter().any(in_stmt),
        })
    }
    body.iter().any(in_stmt)
}

/// Every `return` statement below `expr`, in evaluation order.
pub fn returns(expr: &HirExpr) -> Vec<&HirStmt> {
    fn in_stmt<'a>(stmt: &'a HirStmt, out: &mut Vec<&'a HirStmt>) {
        match &stmt.kind {
            HirStmtKind::Loop(body) => body.iter().for_each(|s| in_stmt(s, out)),
            HirStmtKind::Return(_) => {
                stmt_exprs(stmt).into_iter().for_each(|e| in_expr(e, out));
                out.push(stmt);
            }
            _ => stmt_exprs(stmt).into_iter().for_each(|e| in_expr(e, out)),
        }
    }
    fn in_expr<'a>(expr: &'a HirExpr, out: &mut Vec<&'a HirStmt>) {
        for child in children(expr) {
            match child {
                Child::Expr(e) => in_expr(e, out),
                Child::Stmts(stmts) => stmts.iter().for_each(|s| in_stmt(s, out)),
            }
        }
    }
    let mut out = Vec::new();
    in_expr(expr, &mut out);
    out
}
