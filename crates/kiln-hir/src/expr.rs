// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typed expressions, statements and patterns.

use kiln_ast::{BinOp, Span, UnaryOp};
use kiln_types::{Substitution, TypeExpr};

use crate::{GroupId, LabelId, LocalId};

#[derive(Debug, Clone, PartialEq)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: TypeExpr,
    pub span: Span,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: TypeExpr, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn local(id: LocalId, ty: TypeExpr, span: Span) -> Self {
        Self::new(HirExprKind::Local(id), ty, span)
    }

    pub fn unit(span: Span) -> Self {
        Self::new(HirExprKind::Block { stmts: Vec::new(), value: None }, TypeExpr::Void, span)
    }

    /// The local a place expression is rooted at, looking through fields.
    ///
    /// Stops at a dereference, which leaves the local's own storage.
    pub fn place_root(&self) -> Option<LocalId> {
        match &self.kind {
            HirExprKind::Local(id) => Some(*id),
            HirExprKind::Field { object, .. } | HirExprKind::PackedField { object, .. } => {
                object.place_root()
            }
            _ => None,
        }
    }

    /// Like [`place_root`](Self::place_root) but also looks through derefs.
    pub fn base_local(&self) -> Option<LocalId> {
        match &self.kind {
            HirExprKind::Local(id) => Some(*id),
            HirExprKind::Field { object, .. } | HirExprKind::PackedField { object, .. } => {
                object.base_local()
            }
            HirExprKind::Deref(inner) => inner.base_local(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirExprKind {
    Int(i64),
    Float(f64),
    Local(LocalId),
    /// A function used as a value.
    FnRef(FnRef),
    /// Index into the indirect-call table.
    FnHandle { group: GroupId, handle: u32 },
    Call {
        target: CallTarget,
        subst: Substitution,
        args: Vec<HirExpr>,
        /// Written as field access (`shape.area`).
        getter: bool,
    },
    /// Call through a function-typed value.
    IndirectCall {
        callee: Box<HirExpr>,
        args: Vec<HirExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
    Ref {
        mutable: bool,
        place: Box<HirExpr>,
    },
    Deref(Box<HirExpr>),
    /// Product field by declaration index.
    Field {
        object: Box<HirExpr>,
        index: usize,
    },
    /// Packed field by declaration index; reads are widened to `u32`.
    PackedField {
        object: Box<HirExpr>,
        index: usize,
    },
    /// Sum construction; the expression type is the sum.
    Variant {
        variant: String,
        index: usize,
        payload: Option<Box<HirExpr>>,
    },
    /// Fields in declaration order.
    Product(Vec<HirExpr>),
    Block {
        stmts: Vec<HirStmt>,
        value: Option<Box<HirExpr>>,
    },
    If {
        cond: Box<HirExpr>,
        then_branch: Box<HirExpr>,
        else_branch: Option<Box<HirExpr>>,
    },
    /// Ordered arms; the first whose patterns match runs.
    ///
    /// Resolution already pruned arms that cannot match and proved the
    /// remaining ones exhaustive, so the last arm needs no test.
    Match {
        scrutinees: Vec<HirExpr>,
        arms: Vec<MatchArm>,
    },
    Cast(Box<HirExpr>),
    /// An expanded call; `break` to `label` yields the value.
    Inlined {
        label: LabelId,
        body: Box<HirExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnRef {
    pub group: GroupId,
    /// Leading arguments fixed by lambda lifting.
    pub bound: Vec<HirExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// Selected at compile time.
    Clause { group: GroupId, clause: usize },
    /// Selected at run time among `candidates`, tried in order.
    Dispatch { group: GroupId, candidates: Vec<usize> },
}

impl CallTarget {
    pub fn group(&self) -> GroupId {
        match self {
            CallTarget::Clause { group, .. } | CallTarget::Dispatch { group, .. } => *group,
        }
    }

    pub fn set_group(&mut self, id: GroupId) {
        match self {
            CallTarget::Clause { group, .. } | CallTarget::Dispatch { group, .. } => *group = id,
        }
    }

    /// Clauses this call may reach.
    pub fn clauses(&self) -> Vec<usize> {
        match self {
            CallTarget::Clause { clause, .. } => vec![*clause],
            CallTarget::Dispatch { candidates, .. } => candidates.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub patterns: Vec<Pattern>,
    pub body: HirExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Bind { local: LocalId },
    Literal { value: i64, binding: Option<LocalId> },
    Variant {
        variant: String,
        index: usize,
        inner: Option<Box<Pattern>>,
    },
    Wildcard,
}

impl Pattern {
    /// Matches every value of its type.
    pub fn is_catch_all(&self) -> bool {
        matches!(self, Pattern::Bind { .. } | Pattern::Wildcard)
    }

    pub fn bindings(&self, out: &mut Vec<LocalId>) {
        match self {
            Pattern::Bind { local } => out.push(*local),
            Pattern::Literal { binding, .. } => out.extend(binding.iter().copied()),
            Pattern::Variant { inner, .. } => {
                if let Some(inner) = inner {
                    inner.bindings(out);
                }
            }
            Pattern::Wildcard => {}
        }
    }

    /// Same shape, ignoring which locals are bound.
    pub fn same_shape(&self, other: &Pattern) -> bool {
        match (self, other) {
            (a, b) if a.is_catch_all() && b.is_catch_all() => true,
            (Pattern::Literal { value: a, .. }, Pattern::Literal { value: b, .. }) => a == b,
            (
                Pattern::Variant { index: a, inner: ia, .. },
                Pattern::Variant { index: b, inner: ib, .. },
            ) => {
                a == b
                    && match (ia, ib) {
                        (None, None) => true,
                        (Some(x), None) | (None, Some(x)) => x.is_catch_all(),
                        (Some(x), Some(y)) => x.same_shape(y),
                    }
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirStmt {
    pub kind: HirStmtKind,
    pub span: Span,
}

impl HirStmt {
    pub fn new(kind: HirStmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirStmtKind {
    Let { local: LocalId, init: HirExpr },
    Assign { place: HirExpr, value: HirExpr },
    Expr(HirExpr),
    /// Returns from the enclosing function, also from inside inlined bodies.
    Return(Option<HirExpr>),
    Break {
        target: BreakTarget,
        value: Option<HirExpr>,
    },
    Continue,
    Loop(Vec<HirStmt>),
    /// Marks where a nested function was declared. Removed by lifting.
    FnDef(GroupId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakTarget {
    /// Innermost enclosing loop.
    Loop,
    /// Result of the template body being checked; rewritten on expansion.
    TemplateResult,
    Label(LabelId),
}
