// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expansion of template and getter calls into their callers.
//!
//! A call becomes an `Inlined` block around a `Match` of the arguments
//! against the clauses the call may reach. The callee's locals are copied
//! into the caller. In a template, `break value` yields the block's value
//! and `return` still leaves the enclosing function; in a getter, `return`
//! yields the block's value.

use std::collections::HashMap;

use kiln_hir::visit;
use kiln_hir::{
    BreakTarget, CallTarget, FunctionGroup, HirExpr, HirExprKind, HirStmt, HirStmtKind, LabelId, Local, LocalId,
    LocalKind, LocalTable, MatchArm, Pattern,
};
use kiln_ast::Span;
use kiln_dispatch::DispatchError;
use kiln_types::{Substitution, TypeExpr, TypeTable, Unifier};

use crate::InlineError;

/// Hands out labels unique across the program.
#[derive(Debug, Default)]
pub(crate) struct Labels {
    next: u32,
}

impl Labels {
    pub(crate) fn starting_after(program: &kiln_hir::HirProgram) -> Self {
        let mut next = 0;
        for body in program.groups().iter().flat_map(|g| g.clauses.iter()).filter_map(|c| c.body.as_ref()) {
            visit::walk_expr(body, &mut |e| {
                if let HirExprKind::Inlined { label, .. } = e.kind {
                    next = next.max(label.0 + 1);
                }
            });
        }
        Self { next }
    }

    pub(crate) fn fresh(&mut self) -> LabelId {
        let id = LabelId(self.next);
        self.next += 1;
        id
    }
}

/// Checks the `return`s an expansion carries into `function` against its
/// result type.
pub(crate) fn check_returns(
    expanded: &HirExpr,
    function: &str,
    ret: &TypeExpr,
    types: &TypeTable,
) -> Result<(), InlineError> {
    for stmt in visit::returns(expanded) {
        let HirStmtKind::Return(value) = &stmt.kind else { continue };
        match value {
            Some(value) => {
                Unifier::new(types).unify(ret, &value.ty, value.span).map_err(DispatchError::from)?;
            }
            None if ret.is_void() => {}
            None => {
                return Err(DispatchError::MissingReturn {
                    function: function.to_string(),
                    expected: ret.clone(),
                    span: stmt.span,
                }
                .into())
            }
        }
    }
    Ok(())
}

/// Expands a call of `callee` reaching `target`, or returns `None` when a
/// reached clause has no body.
#[allow(clippy::too_many_arguments)]
pub(crate) fn expand_call(
    callee: &FunctionGroup,
    target: &CallTarget,
    subst: &Substitution,
    args: Vec<HirExpr>,
    ty: TypeExpr,
    span: Span,
    locals: &mut LocalTable,
    labels: &mut Labels,
) -> Option<HirExpr> {
    let label = labels.fresh();
    let mut arms = Vec::new();
    for index in target.clauses() {
        let clause = callee.clauses.get(index)?;
        let mut body = clause.body.clone()?;

        let mut map = HashMap::new();
        for (id, local) in clause.locals.iter() {
            let kind = match local.kind {
                LocalKind::Param => LocalKind::Binding,
                other => other,
            };
            let copy = locals.push(Local { name: local.name.clone(), ty: subst.apply(&local.ty), mutable: local.mutable, kind });
            map.insert(id, copy);
        }
        let patterns = clause.patterns.iter().map(|p| remap_pattern(p, &map)).collect();

        let mut inner_labels = HashMap::new();
        visit::walk_expr(&body, &mut |e| {
            if let HirExprKind::Inlined { label, .. } = e.kind {
                inner_labels.insert(label, LabelId(0));
            }
        });
        for fresh in inner_labels.values_mut() {
            *fresh = labels.fresh();
        }

        let rewrite = Rewrite { map: &map, labels: &inner_labels, subst, result: label, is_template: callee.is_template() };
        rewrite.expr(&mut body);
        arms.push(MatchArm { patterns, body });
    }
    let matched = HirExpr::new(HirExprKind::Match { scrutinees: args, arms }, ty.clone(), span);
    Some(HirExpr::new(HirExprKind::Inlined { label, body: Box::new(matched) }, ty, span))
}

fn remap_pattern(pattern: &Pattern, map: &HashMap<LocalId, LocalId>) -> Pattern {
    let local = |id: &LocalId| map.get(id).copied().unwrap_or(*id);
    match pattern {
        Pattern::Bind { local: id } => Pattern::Bind { local: local(id) },
        Pattern::Literal { value, binding } => Pattern::Literal { value: *value, binding: binding.as_ref().map(local) },
        Pattern::Variant { variant, index, inner } => Pattern::Variant {
            variant: variant.clone(),
            index: *index,
            inner: inner.as_ref().map(|p| Box::new(remap_pattern(p, map))),
        },
        Pattern::Wildcard => Pattern::Wildcard,
    }
}

/// Moves a callee body into the caller's locals, labels and types.
struct Rewrite<'a> {
    map: &'a HashMap<LocalId, LocalId>,
    labels: &'a HashMap<LabelId, LabelId>,
    subst: &'a Substitution,
    result: LabelId,
    is_template: bool,
}

impl Rewrite<'_> {
    fn expr(&self, body: &mut HirExpr) {
        visit::walk_expr_mut(body, &mut |e| {
            e.ty = self.subst.apply(&e.ty);
            match &mut e.kind {
                HirExprKind::Local(id) => *id = self.local(*id),
                HirExprKind::Call { subst, .. } => *subst = subst.then(self.subst),
                HirExprKind::Inlined { label, .. } => *label = self.label(*label),
                HirExprKind::Match { arms, .. } => {
                    for arm in arms {
                        arm.patterns = arm.patterns.iter().map(|p| remap_pattern(p, self.map)).collect();
                    }
                }
                HirExprKind::Block { stmts, .. } => self.stmts(stmts),
                _ => {}
            }
        });
    }

    fn local(&self, id: LocalId) -> LocalId {
        self.map.get(&id).copied().unwrap_or(id)
    }

    fn label(&self, id: LabelId) -> LabelId {
        self.labels.get(&id).copied().unwrap_or(id)
    }

    /// Statement-level rewrites; expressions were handled by the walk.
    fn stmts(&self, stmts: &mut [HirStmt]) {
        for stmt in stmts {
            match &mut stmt.kind {
                HirStmtKind::Let { local, .. } => *local = self.local(*local),
                HirStmtKind::Break { target, .. } => {
                    *target = match *target {
                        BreakTarget::TemplateResult => BreakTarget::Label(self.result),
                        BreakTarget::Label(l) => BreakTarget::Label(self.label(l)),
                        BreakTarget::Loop => BreakTarget::Loop,
                    }
                }
                HirStmtKind::Return(value) if !self.is_template => {
                    let value = value.take();
                    stmt.kind = HirStmtKind::Break { target: BreakTarget::Label(self.result), value };
                }
                HirStmtKind::Loop(body) => self.stmts(body),
                _ => {}
            }
        }
    }
}
