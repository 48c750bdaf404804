// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Pattern tests: match expressions, clause entry and dispatchers.
//!
//! Arms become an `if` chain in order. Conditions are `i32`s; a test on a
//! variant payload only runs once the discriminant matched.

use kiln_ast::Span;
use kiln_hir::{MatchArm, Pattern};
use kiln_types::layout::sum_repr;
use kiln_types::{StackKind, TypeExpr};

use crate::error::LowerError;
use crate::ir::{IrExpr, IrExprKind, IrLocalId, IrStmt};
use crate::lower::{equals, FunctionLowerer};

impl FunctionLowerer<'_> {
    pub(crate) fn lower_match(
        &mut self,
        scrutinees: &[kiln_hir::HirExpr],
        arms: &[MatchArm],
        ty: TypeExpr,
        span: Span,
    ) -> Result<IrExpr, LowerError> {
        let mut stmts = Vec::with_capacity(scrutinees.len());
        let mut values = Vec::with_capacity(scrutinees.len());
        for scrutinee in scrutinees {
            let value = self.expr(scrutinee)?;
            let slot = self.temp("scrutinee", value.ty.clone());
            values.push(IrExpr::read_local(slot, value.ty.clone()));
            stmts.push(IrStmt::Let { local: slot, value });
        }

        let mut rows = Vec::with_capacity(arms.len());
        for arm in arms {
            let mut tests = Vec::new();
            let mut binds = Vec::new();
            for (pattern, value) in arm.patterns.iter().zip(&values) {
                self.pattern(pattern, value.clone(), span, &mut tests, &mut binds)?;
            }
            let body = self.expr(&arm.body)?;
            let body = if binds.is_empty() { body } else { IrExpr::block(binds, body) };
            rows.push((tests, body));
        }
        match chain(rows, &ty) {
            Some(chain) => Ok(IrExpr::block(stmts, chain)),
            None => Ok(IrExpr::new(IrExprKind::Block { stmts, value: None }, ty)),
        }
    }

    /// Adds the conditions under which `pattern` matches `value` to `tests`
    /// and its bindings to `binds`.
    pub(crate) fn pattern(
        &mut self,
        pattern: &Pattern,
        value: IrExpr,
        span: Span,
        tests: &mut Vec<IrExpr>,
        binds: &mut Vec<IrStmt>,
    ) -> Result<(), LowerError> {
        match pattern {
            Pattern::Bind { local } => binds.push(IrStmt::Let { local: IrLocalId(local.0), value }),
            Pattern::Wildcard => {}
            Pattern::Literal { value: literal, binding } => {
                let kind = self.stack_kind(&value.ty, span)?;
                tests.push(equals(value.clone(), IrExpr::int(*literal, kind), kind));
                if let Some(b) = binding {
                    binds.push(IrStmt::Let { local: IrLocalId(b.0), value });
                }
            }
            Pattern::Variant { index, inner, .. } => {
                let variants = match self.expand(&value.ty, span)? {
                    TypeExpr::Sum { variants } => variants,
                    other => return Err(LowerError::InvalidField { ty: other, index: *index, span }),
                };
                let repr = sum_repr(&variants);
                let discriminant = IrExpr::new(
                    IrExprKind::Discriminant { value: Box::new(value.clone()), repr },
                    TypeExpr::Stack(StackKind::Usize),
                );
                tests.push(equals(discriminant, IrExpr::int(*index as i64, StackKind::Usize), StackKind::Usize));
                if let Some(inner) = inner {
                    let payload_ty = variants.get(*index).map(|(_, t)| t.clone()).unwrap_or(TypeExpr::Void);
                    let payload = IrExpr::new(IrExprKind::Payload(Box::new(value)), payload_ty);
                    self.pattern(inner, payload, span, tests, binds)?;
                }
            }
        }
        Ok(())
    }
}

/// Builds the `if` chain for rows of (tests, body). The last row and a row
/// without tests run unconditionally; rows after the latter are dropped.
pub(crate) fn chain(rows: Vec<(Vec<IrExpr>, IrExpr)>, ty: &TypeExpr) -> Option<IrExpr> {
    let last = rows.len().checked_sub(1)?;
    let mut result: Option<IrExpr> = None;
    for (i, (tests, body)) in rows.into_iter().enumerate().rev() {
        result = Some(match (result, all(tests)) {
            (Some(rest), Some(cond)) if i != last => IrExpr::new(
                IrExprKind::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(body),
                    else_branch: Some(Box::new(rest)),
                },
                ty.clone(),
            ),
            _ => body,
        });
    }
    result
}

/// Conjunction that stops at the first failing test.
fn all(tests: Vec<IrExpr>) -> Option<IrExpr> {
    let mut tests = tests.into_iter().rev();
    let mut cond = tests.next()?;
    for test in tests {
        cond = IrExpr::new(
            IrExprKind::If {
                cond: Box::new(test),
                then_branch: Box::new(cond),
                else_branch: Some(Box::new(IrExpr::int(0, StackKind::I32))),
            },
            TypeExpr::i32(),
        );
    }
    Some(cond)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrConst;

    fn flag(v: i64) -> IrExpr {
        IrExpr::int(v, StackKind::I32)
    }

    #[test]
    fn rows_after_an_unconditional_row_are_dropped() {
        let rows = vec![(vec![flag(1)], flag(10)), (vec![], flag(20)), (vec![flag(1)], flag(30))];
        let chain = chain(rows, &TypeExpr::i32()).unwrap();
        match chain.kind {
            IrExprKind::If { else_branch: Some(rest), .. } => {
                assert_eq!(rest.kind, IrExprKind::Const(IrConst::Int(20, StackKind::I32)));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn conjunction_nests_later_tests_inside_earlier_ones() {
        let cond = all(vec![flag(1), flag(2)]).unwrap();
        match cond.kind {
            IrExprKind::If { cond, then_branch, .. } => {
                assert_eq!(cond.kind, IrExprKind::Const(IrConst::Int(1, StackKind::I32)));
                assert_eq!(then_branch.kind, IrExprKind::Const(IrConst::Int(2, StackKind::I32)));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }
}
