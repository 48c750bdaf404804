// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression nodes.

use crate::stmt::Stmt;
use crate::ty::TypeAnnot;
use crate::{NodeId, Span};

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int { value: i64, suffix: Option<NumSuffix> },
    Float { value: f64, suffix: Option<NumSuffix> },
    /// Local, parameter, function, or namespace name.
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `f(args)` or `f(u32, args)` with leading explicit type arguments.
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeAnnot>,
        args: Vec<Expr>,
    },
    /// Product field, packed field, getter call, or `namespace.item`.
    Field { object: Box<Expr>, field: String },
    /// `&x` / `&mut x`
    Ref { mutable: bool, expr: Box<Expr> },
    /// `*x`
    Deref(Box<Expr>),
    /// `Circle(2.0)`, `Shape.Empty`
    Variant {
        ty: Option<String>,
        variant: String,
        payload: Option<Box<Expr>>,
    },
    /// `Point(x: 1, y: 2)` / `(1, 2)`
    Product {
        ty: Option<String>,
        fields: Vec<FieldInit>,
    },
    Block(Vec<Stmt>),
    /// Taken when the condition is non-zero.
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// `if s is Circle(r) { .. } else { .. }`
    IfIs {
        scrutinee: Box<Expr>,
        pattern: VariantPattern,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// `x as u64`
    Cast { expr: Box<Expr>, ty: TypeAnnot },
}

#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: Option<String>,
    pub value: Expr,
}

/// The narrowed variant of an `if ... is` test.
#[derive(Debug, Clone)]
pub struct VariantPattern {
    pub ty: Option<String>,
    pub variant: String,
    pub binding: Option<String>,
}

/// Numeric literal suffix (`10u64`, `1.5f32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumSuffix {
    I32,
    U32,
    I64,
    U64,
    Isize,
    Usize,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    // Comparisons yield i32 (0 or 1).
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    BitNot,
}
