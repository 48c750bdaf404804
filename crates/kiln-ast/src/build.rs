// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terse constructors for syntax trees.
//!
//! Used by tests across the workspace and by front ends that synthesize
//! code. Every node gets a fresh `NodeId` and an empty span.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::expr::{BinOp, Expr, ExprKind, FieldInit, NumSuffix, UnaryOp, VariantPattern};
use crate::item::{
    FnClause, FnFlags, ImportDecl, ImportKind, ImportName, Item, ItemKind, Linkage, Module, Param,
    ParamPattern, TypeDecl,
};
use crate::stmt::{Stmt, StmtKind};
use crate::ty::TypeAnnot;
use crate::{NodeId, Span};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn fresh_id() -> NodeId {
    NodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

fn expr(kind: ExprKind) -> Expr {
    Expr { id: fresh_id(), kind, span: Span::default() }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt { id: fresh_id(), kind, span: Span::default() }
}

// ── Types ───────────────────────────────────────────────────────────────

pub fn ty(name: &str) -> TypeAnnot {
    TypeAnnot::named(name)
}

// ── Expressions ─────────────────────────────────────────────────────────

pub fn int(value: i64) -> Expr {
    expr(ExprKind::Int { value, suffix: None })
}

pub fn int_as(value: i64, suffix: NumSuffix) -> Expr {
    expr(ExprKind::Int { value, suffix: Some(suffix) })
}

pub fn float(value: f64) -> Expr {
    expr(ExprKind::Float { value, suffix: None })
}

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Ident(name.to_string()))
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    call_expr(ident(name), Vec::new(), args)
}

pub fn call_with_types(name: &str, type_args: Vec<TypeAnnot>, args: Vec<Expr>) -> Expr {
    call_expr(ident(name), type_args, args)
}

pub fn call_expr(callee: Expr, type_args: Vec<TypeAnnot>, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call { callee: Box::new(callee), type_args, args })
}

pub fn field(object: Expr, name: &str) -> Expr {
    expr(ExprKind::Field { object: Box::new(object), field: name.to_string() })
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn neg(operand: Expr) -> Expr {
    expr(ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) })
}

pub fn ref_(target: Expr) -> Expr {
    expr(ExprKind::Ref { mutable: false, expr: Box::new(target) })
}

pub fn ref_mut(target: Expr) -> Expr {
    expr(ExprKind::Ref { mutable: true, expr: Box::new(target) })
}

pub fn deref(target: Expr) -> Expr {
    expr(ExprKind::Deref(Box::new(target)))
}

pub fn variant(ty: Option<&str>, name: &str, payload: Option<Expr>) -> Expr {
    expr(ExprKind::Variant {
        ty: ty.map(str::to_string),
        variant: name.to_string(),
        payload: payload.map(Box::new),
    })
}

pub fn product(ty: Option<&str>, fields: Vec<(Option<&str>, Expr)>) -> Expr {
    expr(ExprKind::Product {
        ty: ty.map(str::to_string),
        fields: fields
            .into_iter()
            .map(|(name, value)| FieldInit { name: name.map(str::to_string), value })
            .collect(),
    })
}

pub fn block(stmts: Vec<Stmt>) -> Expr {
    expr(ExprKind::Block(stmts))
}

pub fn if_(cond: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Expr {
    expr(ExprKind::If {
        cond: Box::new(cond),
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
    })
}

pub fn if_is(
    scrutinee: Expr,
    ty: Option<&str>,
    variant: &str,
    binding: Option<&str>,
    then_branch: Expr,
    else_branch: Option<Expr>,
) -> Expr {
    expr(ExprKind::IfIs {
        scrutinee: Box::new(scrutinee),
        pattern: VariantPattern {
            ty: ty.map(str::to_string),
            variant: variant.to_string(),
            binding: binding.map(str::to_string),
        },
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
    })
}

pub fn cast(target: Expr, to: TypeAnnot) -> Expr {
    expr(ExprKind::Cast { expr: Box::new(target), ty: to })
}

// ── Statements ──────────────────────────────────────────────────────────

pub fn let_(name: &str, init: Expr) -> Stmt {
    stmt(StmtKind::Let { name: name.to_string(), is_mut: false, ty: None, init })
}

pub fn let_mut(name: &str, init: Expr) -> Stmt {
    stmt(StmtKind::Let { name: name.to_string(), is_mut: true, ty: None, init })
}

pub fn let_typed(name: &str, is_mut: bool, annot: TypeAnnot, init: Expr) -> Stmt {
    stmt(StmtKind::Let { name: name.to_string(), is_mut, ty: Some(annot), init })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    stmt(StmtKind::Assign { target, value })
}

pub fn expr_stmt(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}

pub fn ret(value: Expr) -> Stmt {
    stmt(StmtKind::Return(Some(value)))
}

pub fn ret_void() -> Stmt {
    stmt(StmtKind::Return(None))
}

pub fn brk(value: Option<Expr>) -> Stmt {
    stmt(StmtKind::Break(value))
}

pub fn cont() -> Stmt {
    stmt(StmtKind::Continue)
}

pub fn loop_(body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Loop(body))
}

pub fn fn_def(clause: FnClause) -> Stmt {
    stmt(StmtKind::FnDef(clause))
}

// ── Parameters ──────────────────────────────────────────────────────────

fn param(pattern: ParamPattern, is_mut: bool) -> Param {
    Param { pattern, is_mut, span: Span::default() }
}

pub fn bind(name: &str, annot: TypeAnnot) -> Param {
    param(ParamPattern::Bind { name: name.to_string(), ty: Some(annot) }, false)
}

pub fn bind_mut(name: &str, annot: TypeAnnot) -> Param {
    param(ParamPattern::Bind { name: name.to_string(), ty: Some(annot) }, true)
}

/// A binding whose type comes from a sibling clause.
pub fn bind_untyped(name: &str) -> Param {
    param(ParamPattern::Bind { name: name.to_string(), ty: None }, false)
}

pub fn lit(name: &str, value: i64) -> Param {
    param(ParamPattern::Literal { name: Some(name.to_string()), value }, false)
}

pub fn variant_param(ty: &str, variant: &str, binding: Option<&str>) -> Param {
    let inner = binding.map(|b| Box::new(ParamPattern::Bind { name: b.to_string(), ty: None }));
    param(
        ParamPattern::Variant { ty: Some(ty.to_string()), variant: variant.to_string(), inner },
        false,
    )
}

pub fn wildcard(annot: Option<TypeAnnot>) -> Param {
    param(ParamPattern::Wildcard { ty: annot }, false)
}

// ── Items ───────────────────────────────────────────────────────────────

/// Fluent builder for [`FnClause`].
#[derive(Debug, Clone)]
pub struct ClauseBuilder {
    clause: FnClause,
}

pub fn clause(name: &str) -> ClauseBuilder {
    ClauseBuilder {
        clause: FnClause {
            name: name.to_string(),
            type_params: Vec::new(),
            params: Vec::new(),
            ret_ty: None,
            body: Vec::new(),
            flags: FnFlags::default(),
            span: Span::default(),
        },
    }
}

impl ClauseBuilder {
    pub fn type_params(mut self, names: &[&str]) -> Self {
        self.clause.type_params = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn param(mut self, p: Param) -> Self {
        self.clause.params.push(p);
        self
    }

    pub fn returns(mut self, annot: TypeAnnot) -> Self {
        self.clause.ret_ty = Some(annot);
        self
    }

    pub fn body(mut self, stmts: Vec<Stmt>) -> Self {
        self.clause.body = stmts;
        self
    }

    pub fn pure(mut self) -> Self {
        self.clause.flags.is_pure = true;
        self
    }

    pub fn template(mut self) -> Self {
        self.clause.flags.is_template = true;
        self
    }

    pub fn export(mut self) -> Self {
        self.clause.flags.linkage = Linkage::Export;
        self
    }

    pub fn import(mut self, module: &str) -> Self {
        self.clause.flags.linkage = Linkage::Import { module: module.to_string() };
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.clause.span = span;
        self
    }

    pub fn build(self) -> FnClause {
        self.clause
    }

    pub fn item(self) -> Item {
        let span = self.clause.span;
        Item { id: fresh_id(), kind: ItemKind::Fn(self.clause), span }
    }
}

pub fn type_item(name: &str, type_params: &[&str], body: TypeAnnot) -> Item {
    Item {
        id: fresh_id(),
        kind: ItemKind::Type(TypeDecl {
            name: name.to_string(),
            type_params: type_params.iter().map(|p| p.to_string()).collect(),
            body,
        }),
        span: Span::default(),
    }
}

/// `type Option<T> = Some(T) | None` style sum declaration.
pub fn sum_item(name: &str, type_params: &[&str], variants: Vec<(&str, Option<TypeAnnot>)>) -> Item {
    let body = TypeAnnot::Sum(variants.into_iter().map(|(v, p)| (v.to_string(), p)).collect());
    type_item(name, type_params, body)
}

pub fn import_item(module: &str, kind: ImportKind) -> Item {
    Item {
        id: fresh_id(),
        kind: ItemKind::Import(ImportDecl { module: module.to_string(), kind }),
        span: Span::default(),
    }
}

pub fn import_with(module: &str, names: &[(&str, Option<&str>)]) -> Item {
    let names = names
        .iter()
        .map(|(name, alias)| ImportName { name: name.to_string(), alias: alias.map(str::to_string) })
        .collect();
    import_item(module, ImportKind::With(names))
}

pub fn module(name: &str, items: Vec<Item>) -> Module {
    Module { name: name.to_string(), items }
}
