// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowered program: a flat table of concrete functions with structured
//! bodies.

use kiln_ast::{BinOp, Linkage, UnaryOp};
use kiln_types::{StackKind, SumRepr, TypeExpr, TypeTable};

/// Index into [`IrProgram::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// A local slot of one function; parameters come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrLocalId(pub u32);

/// Target of a labelled break; unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrLabel(pub u32);

#[derive(Debug, Clone)]
pub struct IrProgram {
    pub module: String,
    pub functions: Vec<IrFunction>,
    /// Indirect-call table; a handle is an index into it.
    pub indirect: Vec<FuncId>,
    pub types: TypeTable,
}

impl IrProgram {
    pub fn function(&self, id: FuncId) -> Option<&IrFunction> {
        self.functions.get(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub id: FuncId,
    pub name: String,
    pub params: Vec<IrLocalId>,
    pub ret: TypeExpr,
    pub locals: Vec<IrLocal>,
    /// `None` for functions provided by the host or another module.
    pub body: Option<IrExpr>,
    pub linkage: Linkage,
    pub indirect_callable: bool,
    /// Parameters a returned borrow may point into. Callers may rely on
    /// the result living as long as each of these arguments.
    pub returns_borrow_of: Vec<usize>,
}

impl IrFunction {
    pub fn param_types(&self) -> Vec<TypeExpr> {
        self.params.iter().filter_map(|p| self.local(*p)).map(|l| l.ty.clone()).collect()
    }

    pub fn local(&self, id: IrLocalId) -> Option<&IrLocal> {
        self.locals.get(id.0 as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrLocal {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IrConst {
    Int(i64, StackKind),
    Float(f64, StackKind),
}

/// A storage location.
#[derive(Debug, Clone, PartialEq)]
pub enum IrPlace {
    Local(IrLocalId),
    /// Memory a pointer or borrow value points to.
    Deref(Box<IrExpr>),
    /// Bytes at `offset` within `base`.
    Field { base: Box<IrPlace>, offset: u32, ty: TypeExpr },
    /// Bits `shift..shift + width` of the carrier word stored at `base`.
    Bits { base: Box<IrPlace>, shift: u32, width: u32, carrier: StackKind },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrExpr {
    pub kind: IrExprKind,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrExprKind {
    Const(IrConst),
    Read(IrPlace),
    AddressOf(IrPlace),
    /// Index into the indirect-call table.
    Handle(u32),
    Call { func: FuncId, args: Vec<IrExpr> },
    /// Call through a table index.
    CallIndirect { callee: Box<IrExpr>, args: Vec<IrExpr> },
    Binary { op: BinOp, operands: StackKind, lhs: Box<IrExpr>, rhs: Box<IrExpr> },
    Unary { op: UnaryOp, operand: Box<IrExpr> },
    Cast(Box<IrExpr>),
    /// Fields with their byte offsets.
    Product(Vec<(u32, IrExpr)>),
    Variant { discriminant: u32, payload: Option<Box<IrExpr>>, repr: SumRepr },
    Discriminant { value: Box<IrExpr>, repr: SumRepr },
    /// Payload of a tagged-pointer sum already known to hold a variant
    /// with one.
    Payload(Box<IrExpr>),
    Block { stmts: Vec<IrStmt>, value: Option<Box<IrExpr>> },
    /// `cond` is an `i32`; zero takes the else branch.
    If { cond: Box<IrExpr>, then_branch: Box<IrExpr>, else_branch: Option<Box<IrExpr>> },
    /// `break` to `label` leaves `body` with a value.
    Labeled { label: IrLabel, body: Box<IrExpr> },
}

impl IrExpr {
    pub fn new(kind: IrExprKind, ty: TypeExpr) -> Self {
        Self { kind, ty }
    }

    pub fn read_local(id: IrLocalId, ty: TypeExpr) -> Self {
        Self::new(IrExprKind::Read(IrPlace::Local(id)), ty)
    }

    pub fn int(value: i64, kind: StackKind) -> Self {
        Self::new(IrExprKind::Const(IrConst::Int(value, kind)), TypeExpr::Stack(kind))
    }

    pub fn block(stmts: Vec<IrStmt>, value: IrExpr) -> Self {
        let ty = value.ty.clone();
        Self::new(IrExprKind::Block { stmts, value: Some(Box::new(value)) }, ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrStmt {
    Let { local: IrLocalId, value: IrExpr },
    Store { place: IrPlace, value: IrExpr },
    Expr(IrExpr),
    Return(Option<IrExpr>),
    Break { label: IrLabel, value: Option<IrExpr> },
    BreakLoop,
    Continue,
    Loop(Vec<IrStmt>),
}
