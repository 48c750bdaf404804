// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression typing.

use kiln_ast::{BinOp, Expr, ExprKind, FieldInit, NumSuffix, Span, UnaryOp, VariantPattern};
use kiln_hir::{HirExpr, HirExprKind, Local, LocalKind, MatchArm, Pattern};
use kiln_types::{StackKind, Substitution, TypeError, TypeExpr, Unifier};

use super::call::PendingArg;
use super::{storage_read_type, Checker, Resolved, Scope, VOID};
use crate::collect;
use crate::error::DispatchError;
use crate::pattern::{Decider, Decision, Knowledge};

/// A declared type with its parameters replaced by fresh variables.
struct OpenDecl {
    name: String,
    vars: Vec<String>,
    body: TypeExpr,
    seed: Substitution,
}

impl OpenDecl {
    fn close(&self, subst: &Substitution, span: Span) -> Result<TypeExpr, DispatchError> {
        let args = subst
            .args_for(&self.vars)
            .map_err(|var| TypeError::UnresolvedTypeVar { var: var.trim_start_matches('?').to_string(), span })?;
        Ok(TypeExpr::Named { name: self.name.clone(), args })
    }
}

fn suffix_kind(suffix: NumSuffix) -> StackKind {
    match suffix {
        NumSuffix::I32 => StackKind::I32,
        NumSuffix::U32 => StackKind::U32,
        NumSuffix::I64 => StackKind::I64,
        NumSuffix::U64 => StackKind::U64,
        NumSuffix::Isize => StackKind::Isize,
        NumSuffix::Usize => StackKind::Usize,
        NumSuffix::F32 => StackKind::F32,
        NumSuffix::F64 => StackKind::F64,
    }
}

fn is_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Int { .. } | ExprKind::Float { .. } => true,
        ExprKind::Unary { operand, .. } => is_literal(operand),
        _ => false,
    }
}

fn is_place_syntax(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Field { .. } | ExprKind::Deref(_))
}

fn mismatch(expected: TypeExpr, found: TypeExpr, span: Span) -> DispatchError {
    TypeError::Mismatch { expected, found, span }.into()
}

/// Reads of narrow storage come back as the matching stack kind.
fn widen(expr: HirExpr) -> HirExpr {
    match expr.ty {
        TypeExpr::Heap(kind) => {
            let span = expr.span;
            HirExpr::new(HirExprKind::Cast(Box::new(expr)), TypeExpr::Stack(kind.widened()), span)
        }
        _ => expr,
    }
}

impl Checker<'_> {
    pub(super) fn expand(&self, ty: &TypeExpr, span: Span) -> Result<TypeExpr, DispatchError> {
        Ok(self.types.expand(ty, span)?)
    }

    pub(super) fn check_expr(&mut self, expr: &Expr, expected: Option<&TypeExpr>) -> Result<HirExpr, DispatchError> {
        let span = expr.span;
        let hint = expected.filter(|t| !t.is_void());
        match &expr.kind {
            ExprKind::Int { value, suffix } => {
                let kind = match suffix {
                    Some(s) => suffix_kind(*s),
                    None => self.literal_kind(hint, false).unwrap_or(StackKind::I32),
                };
                if kind.is_float() {
                    return Ok(HirExpr::new(HirExprKind::Float(*value as f64), TypeExpr::Stack(kind), span));
                }
                Ok(HirExpr::new(HirExprKind::Int(*value), TypeExpr::Stack(kind), span))
            }
            ExprKind::Float { value, suffix } => {
                let kind = match suffix {
                    Some(s) => suffix_kind(*s),
                    None => self.literal_kind(hint, true).unwrap_or(StackKind::F64),
                };
                if !kind.is_float() {
                    return Err(mismatch(TypeExpr::Stack(StackKind::F64), TypeExpr::Stack(kind), span));
                }
                Ok(HirExpr::new(HirExprKind::Float(*value), TypeExpr::Stack(kind), span))
            }
            ExprKind::Ident(name) => match self.resolve_name(name) {
                Some(Resolved::Local(id)) => {
                    let ty = self.frame.local(id).map(|l| l.ty.clone()).unwrap_or(TypeExpr::Void);
                    Ok(HirExpr::local(id, ty, span))
                }
                Some(Resolved::Function(group)) => self.function_value(group, span),
                None => Err(DispatchError::UnresolvedName { name: name.clone(), span }),
            },
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, hint, span),
            ExprKind::Unary { op, operand } => {
                let operand = self.check_expr(operand, hint)?;
                let kind = self.stack_kind_of(&operand.ty, span)?;
                if *op == UnaryOp::BitNot && !kind.is_integer() {
                    return Err(mismatch(TypeExpr::i32(), operand.ty, span));
                }
                let ty = operand.ty.clone();
                Ok(HirExpr::new(HirExprKind::Unary { op: *op, operand: Box::new(operand) }, ty, span))
            }
            ExprKind::Call { callee, type_args, args } => self.check_call(callee, type_args, args, span),
            ExprKind::Field { object, field } => {
                if let ExprKind::Ident(alias) = &object.kind {
                    if let Some(group) = self.namespace_member(alias, field) {
                        return self.function_value(group, span);
                    }
                }
                let object = self.check_expr(object, None)?;
                self.read_field(object, field, span)
            }
            ExprKind::Ref { mutable, expr: inner } => {
                let place = if is_place_syntax(inner) {
                    let place = self.check_place(inner)?;
                    if *mutable {
                        self.require_mutable(&place, span, false)?;
                    }
                    place
                } else {
                    self.check_expr(inner, None)?
                };
                let ty = TypeExpr::borrow(*mutable, place.ty.clone());
                Ok(HirExpr::new(HirExprKind::Ref { mutable: *mutable, place: Box::new(place) }, ty, span))
            }
            ExprKind::Deref(inner) => {
                let inner = self.check_expr(inner, None)?;
                let pointee = self.pointee(&inner, span)?;
                Ok(widen(HirExpr::new(HirExprKind::Deref(Box::new(inner)), pointee, span)))
            }
            ExprKind::Variant { ty, variant, payload } => {
                self.check_variant(ty.as_deref(), variant, payload.as_deref(), hint, span)
            }
            ExprKind::Product { ty, fields } => self.check_product(ty.as_deref(), fields, hint, span),
            ExprKind::Block(stmts) => self.check_block(stmts, expected, span),
            ExprKind::If { cond, then_branch, else_branch } => {
                let cond = self.check_condition(cond)?;
                let (then_branch, else_branch, ty) = match else_branch {
                    None => {
                        let then_branch = self.check_expr(then_branch, Some(&VOID))?;
                        (then_branch, None, TypeExpr::Void)
                    }
                    Some(else_branch) => {
                        let then_branch = self.check_expr(then_branch, expected)?;
                        let else_branch = self.check_expr(else_branch, expected)?;
                        let ty = self.join_branches(&then_branch.ty, &else_branch.ty, expected, span)?;
                        (then_branch, Some(Box::new(else_branch)), ty)
                    }
                };
                let kind = HirExprKind::If { cond: Box::new(cond), then_branch: Box::new(then_branch), else_branch };
                Ok(HirExpr::new(kind, ty, span))
            }
            ExprKind::IfIs { scrutinee, pattern, then_branch, else_branch } => {
                self.check_if_is(scrutinee, pattern, then_branch, else_branch.as_deref(), expected, span)
            }
            ExprKind::Cast { expr: inner, ty } => {
                let target = collect::resolve_annot(self.types, ty, &self.frame.type_params, span)?;
                let inner = self.check_expr(inner, None)?;
                let from = self.expand(&inner.ty, span)?;
                let to = self.expand(&target, span)?;
                let allowed = match (&from, &to) {
                    (TypeExpr::Never, _) | (TypeExpr::Stack(_), TypeExpr::Stack(_)) => true,
                    (TypeExpr::Borrow { .. } | TypeExpr::RawPointer { .. }, TypeExpr::RawPointer { .. }) => true,
                    (TypeExpr::FatBorrow { .. } | TypeExpr::FatPointer { .. }, TypeExpr::FatPointer { .. }) => true,
                    (TypeExpr::RawPointer { .. }, TypeExpr::Stack(k)) | (TypeExpr::Stack(k), TypeExpr::RawPointer { .. }) => {
                        matches!(k, StackKind::Usize | StackKind::Isize)
                    }
                    _ => false,
                };
                if !allowed {
                    return Err(DispatchError::InvalidCast { from: inner.ty, to: target, span });
                }
                Ok(HirExpr::new(HirExprKind::Cast(Box::new(inner)), target, span))
            }
        }
    }

    fn literal_kind(&self, hint: Option<&TypeExpr>, float: bool) -> Option<StackKind> {
        let kind = match self.types.expand(hint?, Span::default()).ok()? {
            TypeExpr::Stack(kind) => kind,
            TypeExpr::Heap(kind) => kind.widened(),
            _ => return None,
        };
        (kind.is_float() == float).then_some(kind)
    }

    fn stack_kind_of(&self, ty: &TypeExpr, span: Span) -> Result<StackKind, DispatchError> {
        match self.expand(ty, span)? {
            TypeExpr::Stack(kind) => Ok(kind),
            _ => Err(mismatch(TypeExpr::i32(), ty.clone(), span)),
        }
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        hint: Option<&TypeExpr>,
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let hint = if op.is_comparison() { None } else { hint };
        // Literals take their type from the other operand.
        let (lhs, rhs) = if is_literal(lhs) && !is_literal(rhs) {
            let rhs = self.check_expr(rhs, hint)?;
            (self.check_expr(lhs, Some(&rhs.ty))?, rhs)
        } else {
            let lhs = self.check_expr(lhs, hint)?;
            let rhs = self.check_expr(rhs, Some(&lhs.ty))?;
            (lhs, rhs)
        };
        let operand = Unifier::new(self.types).join(&lhs.ty, &rhs.ty, span)?;
        if !operand.is_never() {
            let kind = self.stack_kind_of(&operand, span)?;
            let integer_only = matches!(op, BinOp::Rem | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr);
            if integer_only && !kind.is_integer() {
                return Err(mismatch(TypeExpr::i32(), operand, span));
            }
        }
        let ty = if op.is_comparison() { TypeExpr::i32() } else { operand };
        Ok(HirExpr::new(HirExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, ty, span))
    }

    fn check_condition(&mut self, cond: &Expr) -> Result<HirExpr, DispatchError> {
        let cond = self.check_expr(cond, None)?;
        if !cond.ty.is_never() && !self.stack_kind_of(&cond.ty, cond.span)?.is_integer() {
            return Err(mismatch(TypeExpr::i32(), cond.ty, cond.span));
        }
        Ok(cond)
    }

    fn join_branches(
        &self,
        a: &TypeExpr,
        b: &TypeExpr,
        expected: Option<&TypeExpr>,
        span: Span,
    ) -> Result<TypeExpr, DispatchError> {
        if a.is_never() && b.is_never() {
            return Ok(TypeExpr::Never);
        }
        if expected.is_some_and(TypeExpr::is_void) {
            return Ok(TypeExpr::Void);
        }
        Ok(Unifier::new(self.types).join(a, b, span)?)
    }

    // ------------------------------------------------------------------
    // Places
    // ------------------------------------------------------------------

    /// An assignable location, typed by its declared storage.
    pub(super) fn check_place(&mut self, expr: &Expr) -> Result<HirExpr, DispatchError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Ident(name) => match self.resolve_name(name) {
                Some(Resolved::Local(id)) => {
                    let ty = self.frame.local(id).map(|l| l.ty.clone()).unwrap_or(TypeExpr::Void);
                    Ok(HirExpr::local(id, ty, span))
                }
                Some(Resolved::Function(_)) => Err(DispatchError::NotAPlace { span }),
                None => Err(DispatchError::UnresolvedName { name: name.clone(), span }),
            },
            ExprKind::Field { object, field } => {
                let object = if is_place_syntax(object) { self.check_place(object)? } else { self.check_expr(object, None)? };
                let (object, inner) = self.auto_deref(object, span)?;
                self.field_of(object, &inner, field, span)?.ok_or(DispatchError::NotAPlace { span })
            }
            ExprKind::Deref(inner) => {
                let inner = self.check_expr(inner, None)?;
                let pointee = self.pointee(&inner, span)?;
                Ok(HirExpr::new(HirExprKind::Deref(Box::new(inner)), pointee, span))
            }
            _ => Err(DispatchError::NotAPlace { span }),
        }
    }

    /// Fails unless `place` can be written, or borrowed mutably.
    pub(super) fn require_mutable(&self, place: &HirExpr, span: Span, assigning: bool) -> Result<(), DispatchError> {
        let immutable = |name: String| DispatchError::AssignToImmutable { name, span };
        match &place.kind {
            HirExprKind::Local(id) => match self.frame.local(*id) {
                Some(local) if local.mutable => Ok(()),
                Some(local) => Err(immutable(local.name.clone())),
                None => Ok(()),
            },
            HirExprKind::Field { object, .. } | HirExprKind::PackedField { object, .. } => {
                self.require_mutable(object, span, assigning)
            }
            HirExprKind::Deref(inner) => match self.expand(&inner.ty, span)? {
                TypeExpr::Borrow { mutable: true, .. } | TypeExpr::RawPointer { mutable: true, .. } => Ok(()),
                _ => {
                    let name = inner
                        .base_local()
                        .and_then(|id| self.frame.local(id))
                        .map(|l| format!("*{}", l.name))
                        .unwrap_or_else(|| "*_".to_string());
                    Err(immutable(name))
                }
            },
            _ if assigning => Err(DispatchError::NotAPlace { span }),
            _ => Ok(()),
        }
    }

    fn pointee(&self, expr: &HirExpr, span: Span) -> Result<TypeExpr, DispatchError> {
        match self.expand(&expr.ty, span)? {
            TypeExpr::Borrow { inner, .. } | TypeExpr::RawPointer { inner, .. } => Ok(*inner),
            _ => Err(mismatch(TypeExpr::borrow(false, expr.ty.clone()), expr.ty.clone(), span)),
        }
    }

    /// Dereferences through borrows and pointers; returns the final
    /// expression and its expanded type.
    pub(super) fn auto_deref(&self, mut expr: HirExpr, span: Span) -> Result<(HirExpr, TypeExpr), DispatchError> {
        loop {
            match self.expand(&expr.ty, span)? {
                TypeExpr::Borrow { inner, .. } | TypeExpr::RawPointer { inner, .. } => {
                    expr = HirExpr::new(HirExprKind::Deref(Box::new(expr)), *inner, span);
                }
                other => return Ok((expr, other)),
            }
        }
    }

    /// A stored field of `object`, if its type has one named `field`.
    fn field_of(
        &self,
        object: HirExpr,
        expanded: &TypeExpr,
        field: &str,
        span: Span,
    ) -> Result<Option<HirExpr>, DispatchError> {
        let by_name = |name: &Option<String>, i: usize| match name {
            Some(n) => n == field,
            None => field.parse::<usize>() == Ok(i),
        };
        Ok(match expanded {
            TypeExpr::Product { fields } => fields.iter().enumerate().find(|(i, (n, _))| by_name(n, *i)).map(|(index, (_, ty))| {
                HirExpr::new(HirExprKind::Field { object: Box::new(object), index }, ty.clone(), span)
            }),
            TypeExpr::Packed { fields } => fields.iter().position(|(n, _)| n == field).map(|index| {
                HirExpr::new(HirExprKind::PackedField { object: Box::new(object), index }, TypeExpr::u32(), span)
            }),
            _ => None,
        })
    }

    /// `object.field`: a stored field, or else a getter call.
    fn read_field(&mut self, object: HirExpr, field: &str, span: Span) -> Result<HirExpr, DispatchError> {
        let (place, expanded) = self.auto_deref(object, span)?;
        if let Some(read) = self.field_of(place.clone(), &expanded, field, span)? {
            return Ok(widen(read));
        }
        self.getter_call(place, field, span)
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    fn open_decl(&self, name: &str, hint: Option<&TypeExpr>, span: Span) -> Result<OpenDecl, DispatchError> {
        let def = self
            .types
            .get(name)
            .ok_or_else(|| TypeError::UndefinedType { name: name.to_string(), span })?;
        let vars: Vec<String> = def.params.iter().map(|p| format!("?{p}")).collect();
        let fresh: Vec<TypeExpr> = vars.iter().cloned().map(TypeExpr::TypeVar).collect();
        let body = self.expand(&Substitution::from_pairs(&def.params, &fresh).apply(&def.body), span)?;
        let seed = match hint {
            Some(TypeExpr::Named { name: n, args }) if n == name && args.len() == vars.len() => {
                Substitution::from_pairs(&vars, args)
            }
            _ => Substitution::new(),
        };
        Ok(OpenDecl { name: name.to_string(), vars, body, seed })
    }

    /// The declared sum a variant constructor or pattern refers to.
    fn variant_owner(&self, ty: Option<&str>, variant: &str, hint: Option<&TypeExpr>, span: Span) -> Result<String, DispatchError> {
        if let Some(name) = ty {
            return Ok(name.to_string());
        }
        if let Some(TypeExpr::Named { name, .. }) = hint {
            if let Some(TypeExpr::Sum { variants }) = self.types.get(name).map(|d| &d.body) {
                if variants.iter().any(|(v, _)| v == variant) {
                    return Ok(name.clone());
                }
            }
        }
        match self.types.sums_with_variant(variant).as_slice() {
            [] => Err(DispatchError::UnknownVariant { variant: variant.to_string(), span }),
            [def] => Ok(def.name.clone()),
            _ => Err(DispatchError::AmbiguousVariant { variant: variant.to_string(), span }),
        }
    }

    fn check_variant(
        &mut self,
        ty: Option<&str>,
        variant: &str,
        payload: Option<&Expr>,
        hint: Option<&TypeExpr>,
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let owner = self.variant_owner(ty, variant, hint, span)?;
        let decl = self.open_decl(&owner, hint, span)?;
        let TypeExpr::Sum { variants } = &decl.body else {
            return Err(DispatchError::UnknownVariant { variant: variant.to_string(), span });
        };
        let Some(index) = variants.iter().position(|(v, _)| v == variant) else {
            return Err(DispatchError::UnknownVariant { variant: variant.to_string(), span });
        };
        let declared = variants[index].1.clone();
        let mut unifier = Unifier::new(self.types).with_substitution(decl.seed.clone());
        let payload = match payload {
            Some(p) => {
                let slot = storage_read_type(&declared);
                let value = self.check_expr(p, Some(&unifier.substitution().apply(&slot)))?;
                if declared.is_void() {
                    return Err(mismatch(TypeExpr::Void, value.ty, span));
                }
                unifier.unify(&slot, &value.ty, span)?;
                Some(Box::new(value))
            }
            None if declared.is_void() => None,
            None => return Err(mismatch(declared, TypeExpr::Void, span)),
        };
        let ty = decl.close(unifier.substitution(), span)?;
        let kind = HirExprKind::Variant { variant: variant.to_string(), index, payload };
        Ok(HirExpr::new(kind, ty, span))
    }

    fn check_product(
        &mut self,
        ty: Option<&str>,
        inits: &[FieldInit],
        hint: Option<&TypeExpr>,
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let (decl, result_ty) = match ty {
            Some(name) => (Some(self.open_decl(name, hint, span)?), None),
            None => match hint.map(|h| self.expand(h, span)).transpose()? {
                Some(expanded @ (TypeExpr::Product { .. } | TypeExpr::Packed { .. })) => {
                    (None, Some((hint.cloned().unwrap_or(TypeExpr::Void), expanded)))
                }
                _ => {
                    let mut values = Vec::with_capacity(inits.len());
                    let mut fields = Vec::with_capacity(inits.len());
                    for init in inits {
                        let value = self.check_expr(&init.value, None)?;
                        fields.push((init.name.clone(), value.ty.clone()));
                        values.push(value);
                    }
                    return Ok(HirExpr::new(HirExprKind::Product(values), TypeExpr::Product { fields }, span));
                }
            },
        };
        let (seed, body) = match (&decl, &result_ty) {
            (Some(decl), _) => (decl.seed.clone(), decl.body.clone()),
            (None, Some((_, expanded))) => (Substitution::new(), expanded.clone()),
            (None, None) => (Substitution::new(), TypeExpr::Void),
        };
        let slots: Vec<(Option<String>, TypeExpr)> = match &body {
            TypeExpr::Product { fields } => fields.iter().map(|(n, t)| (n.clone(), storage_read_type(t))).collect(),
            TypeExpr::Packed { fields } => fields.iter().map(|(n, _)| (Some(n.clone()), TypeExpr::u32())).collect(),
            other => return Err(mismatch(other.clone(), TypeExpr::Product { fields: Vec::new() }, span)),
        };
        let order = match field_order(&slots, inits) {
            Some(order) => order,
            None => {
                let mut fields = Vec::with_capacity(inits.len());
                for init in inits {
                    let value = self.check_expr(&init.value, None)?;
                    fields.push((init.name.clone(), value.ty));
                }
                let expected = result_ty.map(|(t, _)| t).unwrap_or_else(|| TypeExpr::named(ty.unwrap_or_default()));
                return Err(mismatch(expected, TypeExpr::Product { fields }, span));
            }
        };
        let mut unifier = Unifier::new(self.types).with_substitution(seed);
        let mut values = Vec::with_capacity(slots.len());
        for (slot, init) in slots.iter().zip(order) {
            let value = self.check_expr(&init.value, Some(&unifier.substitution().apply(&slot.1)))?;
            unifier.unify(&slot.1, &value.ty, init.value.span)?;
            values.push(value);
        }
        let ty = match (decl, result_ty) {
            (Some(decl), _) => decl.close(unifier.substitution(), span)?,
            (None, Some((ty, _))) => ty,
            (None, None) => TypeExpr::Void,
        };
        Ok(HirExpr::new(HirExprKind::Product(values), ty, span))
    }

    // ------------------------------------------------------------------
    // Narrowing
    // ------------------------------------------------------------------

    fn check_if_is(
        &mut self,
        scrutinee: &Expr,
        pattern: &VariantPattern,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        expected: Option<&TypeExpr>,
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let scrutinee = self.check_expr(scrutinee, None)?;
        let (scrutinee, expanded) = self.auto_deref(scrutinee, span)?;
        let TypeExpr::Sum { variants } = expanded else {
            let expected = TypeExpr::named(pattern.ty.clone().unwrap_or_else(|| pattern.variant.clone()));
            return Err(mismatch(expected, scrutinee.ty, span));
        };
        if let (Some(name), TypeExpr::Named { name: found, .. }) = (&pattern.ty, &scrutinee.ty) {
            if name != found {
                return Err(mismatch(TypeExpr::named(name.clone()), scrutinee.ty.clone(), span));
            }
        }
        let Some(index) = variants.iter().position(|(v, _)| *v == pattern.variant) else {
            return Err(DispatchError::UnknownVariant { variant: pattern.variant.clone(), span });
        };
        let payload_ty = variants[index].1.clone();
        let known = self.knowledge_of(&scrutinee);
        let narrowed = match &scrutinee.kind {
            HirExprKind::Local(id) if self.frame.local(*id).is_some_and(|l| !l.mutable) => Some(*id),
            _ => None,
        };
        let branch_hint = if else_branch.is_some() { expected } else { Some(&VOID) };

        self.frame.scopes.push(Scope::default());
        let binding = pattern.binding.as_ref().map(|name| {
            let local = Local { name: name.clone(), ty: payload_ty.clone(), mutable: false, kind: LocalKind::Binding };
            self.frame.declare(name, local)
        });
        let then_branch = self.with_knowledge(narrowed, Knowledge::variant(index), |c| c.check_expr(then_branch, branch_hint));
        self.frame.scopes.pop();
        let then_branch = then_branch?;

        let excluded = match &known {
            Knowledge::Excluding(already) => {
                let mut all = already.clone();
                all.push(index);
                all.sort_unstable();
                all.dedup();
                Knowledge::Excluding(all)
            }
            _ => Knowledge::Excluding(vec![index]),
        };
        let else_branch = match else_branch {
            Some(e) => self.with_knowledge(narrowed, excluded, |c| c.check_expr(e, branch_hint))?,
            None => HirExpr::unit(span),
        };
        let ty = self.join_branches(&then_branch.ty, &else_branch.ty, branch_hint, span)?;

        let then_pattern = Pattern::Variant {
            variant: pattern.variant.clone(),
            index,
            inner: binding.map(|local| Box::new(Pattern::Bind { local })),
        };
        let then_row = [then_pattern.clone()];
        let else_row = [Pattern::Wildcard];
        let rows: [&[Pattern]; 2] = [&then_row, &else_row];
        let decision = Decider::new(self.types).decide(&rows, &[known], &[scrutinee.ty.clone()]);
        let then_arm = MatchArm { patterns: vec![then_pattern], body: then_branch };
        let else_arm = MatchArm { patterns: vec![Pattern::Wildcard], body: else_branch };
        let arms = match decision {
            Some(Decision::Static(0)) => vec![then_arm],
            Some(Decision::Static(_)) => vec![else_arm],
            _ => vec![then_arm, else_arm],
        };
        tracing::trace!(variant = %pattern.variant, arms = arms.len(), "narrowing");
        let ty = match arms.as_slice() {
            [only] if only.body.ty.is_never() => TypeExpr::Never,
            _ => ty,
        };
        let kind = HirExprKind::Match { scrutinees: vec![scrutinee], arms };
        Ok(HirExpr::new(kind, ty, span))
    }

    /// Runs `f` with `local` known to be `knowledge`, then restores it.
    fn with_knowledge<R>(
        &mut self,
        local: Option<kiln_hir::LocalId>,
        knowledge: Knowledge,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let Some(local) = local else {
            return f(self);
        };
        let previous = self.frame.knowledge.insert(local, knowledge);
        let result = f(self);
        match previous {
            Some(k) => self.frame.knowledge.insert(local, k),
            None => self.frame.knowledge.remove(&local),
        };
        result
    }

    pub(super) fn function_value(&self, group: kiln_hir::GroupId, span: Span) -> Result<HirExpr, DispatchError> {
        let g = self.group(group)?;
        if g.is_generic() && !g.is_nested() {
            return Err(DispatchError::GenericFunctionValue { function: g.name.clone(), span });
        }
        let ty = g.signature();
        Ok(HirExpr::new(HirExprKind::FnRef(kiln_hir::FnRef { group, bound: Vec::new() }), ty, span))
    }

    pub(super) fn check_pending(&mut self, arg: PendingArg<'_>, hint: &TypeExpr) -> Result<HirExpr, DispatchError> {
        match arg {
            PendingArg::Syntax(expr) => self.check_expr(expr, Some(hint)),
            PendingArg::Typed(hir) => Ok(hir),
        }
    }
}

/// Initializers in declaration order, or `None` when they do not name
/// every field exactly once.
fn field_order<'e>(slots: &[(Option<String>, TypeExpr)], inits: &'e [FieldInit]) -> Option<Vec<&'e FieldInit>> {
    if inits.len() != slots.len() {
        return None;
    }
    if inits.iter().all(|i| i.name.is_none()) {
        return Some(inits.iter().collect());
    }
    slots
        .iter()
        .map(|(name, _)| {
            let name = name.as_ref()?;
            let mut found = inits.iter().filter(|i| i.name.as_ref() == Some(name));
            let first = found.next()?;
            found.next().is_none().then_some(first)
        })
        .collect()
}
