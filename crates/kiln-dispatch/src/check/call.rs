// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Calls: argument typing, type-argument inference and clause selection.

use kiln_ast::{Expr, ExprKind, Span, TypeAnnot, UnaryOp};
use kiln_hir::{CallTarget, GroupId, HirExpr, HirExprKind, Pattern};
use kiln_types::{Substitution, TypeError, TypeExpr, Unifier};

use super::{Checker, Resolved};
use crate::collect;
use crate::error::DispatchError;
use crate::pattern::{Decider, Decision, Knowledge};

/// An argument not yet checked, or one the caller already built (the
/// receiver of a getter).
pub(super) enum PendingArg<'e> {
    Syntax(&'e Expr),
    Typed(HirExpr),
}

impl Checker<'_> {
    pub(super) fn check_call(
        &mut self,
        callee: &Expr,
        type_args: &[TypeAnnot],
        args: &[Expr],
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let pending = || args.iter().map(PendingArg::Syntax).collect::<Vec<_>>();
        match &callee.kind {
            ExprKind::Ident(name) => match self.resolve_name(name) {
                Some(Resolved::Function(group)) => return self.call_group(group, type_args, pending(), span, false),
                Some(Resolved::Local(id)) => {
                    let ty = self.frame.local(id).map(|l| l.ty.clone()).unwrap_or(TypeExpr::Void);
                    let callee = HirExpr::local(id, ty, callee.span);
                    return self.indirect_call(callee, type_args, args, span);
                }
                None => return Err(DispatchError::UnresolvedName { name: name.clone(), span: callee.span }),
            },
            ExprKind::Field { object, field } => {
                if let ExprKind::Ident(alias) = &object.kind {
                    if let Some(group) = self.namespace_member(alias, field) {
                        return self.call_group(group, type_args, pending(), span, false);
                    }
                }
            }
            _ => {}
        }
        let callee = self.check_expr(callee, None)?;
        self.indirect_call(callee, type_args, args, span)
    }

    /// A call through a function-typed value.
    fn indirect_call(
        &mut self,
        callee: HirExpr,
        type_args: &[TypeAnnot],
        args: &[Expr],
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let expanded = self.expand(&callee.ty, span)?;
        let signature = match (&expanded, type_args.is_empty()) {
            (TypeExpr::Exponential { .. }, true) => expanded.uncurry(args.len()),
            _ => None,
        };
        let Some((params, ret)) = signature else {
            return Err(DispatchError::NotCallable { ty: callee.ty, span });
        };
        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&params) {
            let value = self.check_expr(arg, Some(param))?;
            Unifier::new(self.types).unify(param, &value.ty, arg.span)?;
            values.push(value);
        }
        let kind = HirExprKind::IndirectCall { callee: Box::new(callee), args: values };
        Ok(HirExpr::new(kind, ret, span))
    }

    /// A direct call of `group`: infers type arguments and picks the
    /// clauses the call may reach.
    pub(super) fn call_group(
        &mut self,
        group: GroupId,
        type_args: &[TypeAnnot],
        args: Vec<PendingArg<'_>>,
        span: Span,
        getter: bool,
    ) -> Result<HirExpr, DispatchError> {
        let g = self.group(group)?;
        let name = g.name.clone();
        let type_params = g.type_params.clone();
        let params = g.params.clone();
        let ret = g.ret.clone();
        let nested = g.is_nested();
        let patterns: Vec<Vec<Pattern>> = g.clauses.iter().map(|c| c.patterns.clone()).collect();

        if args.len() != params.len() {
            return Err(DispatchError::ArgumentCount {
                function: name,
                expected: params.len(),
                found: args.len(),
                span,
            });
        }

        let mut seed = Substitution::new();
        if nested {
            // Nested functions share the enclosing function's type parameters.
            for p in &type_params {
                seed.insert(p.clone(), TypeExpr::TypeVar(p.clone()));
            }
        } else if !type_args.is_empty() {
            if type_args.len() > type_params.len() {
                return Err(TypeError::TypeArity {
                    name,
                    expected: type_params.len(),
                    found: type_args.len(),
                    span,
                }
                .into());
            }
            for (param, annot) in type_params.iter().zip(type_args) {
                let ty = collect::resolve_annot(self.types, annot, &self.frame.type_params, span)?;
                seed.insert(param.clone(), ty);
            }
        }

        let mut unifier = Unifier::new(self.types).with_substitution(seed);
        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.into_iter().zip(&params) {
            let hint = unifier.substitution().apply(param);
            let value = self.check_pending(arg, &hint)?;
            unifier.unify(param, &value.ty, value.span)?;
            values.push(value);
        }
        let subst = unifier.into_substitution();
        subst
            .args_for(&type_params)
            .map_err(|var| TypeError::UnresolvedTypeVar { var, span })?;

        let types: Vec<TypeExpr> = params.iter().map(|p| subst.apply(p)).collect();
        let knowledge: Vec<Knowledge> = values.iter().map(|v| self.knowledge_of(v)).collect();
        let rows: Vec<&[Pattern]> = patterns.iter().map(Vec::as_slice).collect();
        let target = match Decider::new(self.types).decide(&rows, &knowledge, &types) {
            Some(Decision::Static(clause)) => {
                tracing::trace!(function = %name, clause, "static dispatch");
                CallTarget::Clause { group, clause }
            }
            Some(Decision::Runtime(candidates)) => {
                tracing::debug!(function = %name, ?candidates, "runtime dispatch");
                CallTarget::Dispatch { group, candidates }
            }
            None => return Err(DispatchError::NonExhaustiveMatch { function: name, span }),
        };
        let ret = subst.apply(&ret);
        let kind = HirExprKind::Call { target, subst, args: values, getter };
        Ok(HirExpr::new(kind, ret, span))
    }

    /// `place.field` where the type has no such field: a call of the
    /// one-parameter pure function `field`.
    pub(super) fn getter_call(&mut self, place: HirExpr, field: &str, span: Span) -> Result<HirExpr, DispatchError> {
        let unknown = |place: &HirExpr| DispatchError::UnknownField { ty: place.ty.clone(), field: field.to_string(), span };
        let Some(group) = self.lookup_function(field) else {
            return Err(unknown(&place));
        };
        let g = self.group(group)?;
        if g.arity() != 1 || g.is_template() {
            return Err(unknown(&place));
        }
        if !g.flags.is_pure {
            return Err(DispatchError::ImpureGetter { function: g.name.clone(), span });
        }
        let param = g.params[0].clone();
        let receiver = match self.expand(&param, span)? {
            TypeExpr::Borrow { mutable, .. } => {
                if mutable {
                    self.require_mutable(&place, span, false)?;
                }
                let ty = TypeExpr::borrow(mutable, place.ty.clone());
                HirExpr::new(HirExprKind::Ref { mutable, place: Box::new(place) }, ty, span)
            }
            _ => place,
        };
        self.call_group(group, &[], vec![PendingArg::Typed(receiver)], span, true)
    }

    /// What is known about `expr` before it runs.
    pub(super) fn knowledge_of(&self, expr: &HirExpr) -> Knowledge {
        match &expr.kind {
            HirExprKind::Int(v) => Knowledge::Literal(*v),
            HirExprKind::Unary { op: UnaryOp::Neg, operand } => match operand.kind {
                HirExprKind::Int(v) => Knowledge::Literal(v.wrapping_neg()),
                _ => Knowledge::Unknown,
            },
            HirExprKind::Variant { index, payload, .. } => Knowledge::Variant {
                index: *index,
                payload: Box::new(payload.as_deref().map_or(Knowledge::Unknown, |p| self.knowledge_of(p))),
            },
            HirExprKind::Local(id) => self.frame.knowledge.get(id).cloned().unwrap_or(Knowledge::Unknown),
            HirExprKind::Block { stmts, value: Some(value) } if stmts.is_empty() => self.knowledge_of(value),
            _ => Knowledge::Unknown,
        }
    }
}
