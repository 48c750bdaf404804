// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering of one clause body under one instance substitution.

use kiln_ast::{BinOp, Span};
use kiln_hir::{BreakTarget, HirExpr, HirExprKind, HirProgram, HirStmt, HirStmtKind, LocalTable};
use kiln_types::layout::{packed_carrier, packed_offsets, sum_repr};
use kiln_types::{StackKind, Substitution, TypeExpr};

use crate::error::LowerError;
use crate::ir::{FuncId, IrConst, IrExpr, IrExprKind, IrLabel, IrLocal, IrLocalId, IrPlace, IrStmt};
use crate::mono::{Instance, Instances, Part};

pub(crate) struct FunctionLowerer<'a> {
    pub(crate) program: &'a HirProgram,
    pub(crate) instances: &'a mut Instances,
    subst: Substitution,
    pub(crate) locals: Vec<IrLocal>,
}

impl<'a> FunctionLowerer<'a> {
    /// Starts with one slot per clause local, so HIR local ids carry over.
    pub(crate) fn new(
        program: &'a HirProgram,
        instances: &'a mut Instances,
        subst: Substitution,
        clause_locals: Option<&LocalTable>,
    ) -> Self {
        let locals = clause_locals
            .into_iter()
            .flat_map(|table| table.iter())
            .map(|(_, l)| IrLocal { name: l.name.clone(), ty: subst.apply(&l.ty).erase_lifetimes() })
            .collect();
        Self { program, instances, subst, locals }
    }

    pub(crate) fn ty(&self, ty: &TypeExpr) -> TypeExpr {
        self.subst.apply(ty).erase_lifetimes()
    }

    pub(crate) fn temp(&mut self, name: &str, ty: TypeExpr) -> IrLocalId {
        let id = IrLocalId(self.locals.len() as u32);
        self.locals.push(IrLocal { name: format!("%{name}{}", id.0), ty });
        id
    }

    pub(crate) fn expand(&self, ty: &TypeExpr, span: Span) -> Result<TypeExpr, LowerError> {
        Ok(self.program.types.expand(ty, span)?)
    }

    pub(crate) fn stack_kind(&self, ty: &TypeExpr, span: Span) -> Result<StackKind, LowerError> {
        Ok(self.expand(ty, span)?.stack_kind().unwrap_or(StackKind::I32))
    }

    /// Function id for the instance of `group` a call or value with type
    /// arguments `subst` refers to.
    fn instance(
        &mut self,
        group: kiln_hir::GroupId,
        subst: &Substitution,
        part: impl FnOnce(&kiln_hir::FunctionGroup) -> Part,
        span: Span,
    ) -> Result<FuncId, LowerError> {
        let Some(g) = self.program.group(group) else {
            return Err(LowerError::MissingFunction { name: self.program.name_of(group).to_string(), span });
        };
        let args = subst
            .then(&self.subst)
            .args_for(&g.type_params)
            .map_err(|var| LowerError::UnresolvedInstance { function: g.name.clone(), var, span })?;
        let args: Vec<TypeExpr> = args.iter().map(TypeExpr::erase_lifetimes).collect();
        let instance = Instance { group, args, part: part(g) };
        if !instance.args.is_empty() {
            tracing::trace!(function = %instance.name(g), "instance");
        }
        Ok(self.instances.request(instance))
    }

    pub(crate) fn expr(&mut self, e: &HirExpr) -> Result<IrExpr, LowerError> {
        let ty = self.ty(&e.ty);
        let kind = match &e.kind {
            HirExprKind::Int(v) => IrExprKind::Const(IrConst::Int(*v, self.stack_kind(&ty, e.span)?)),
            HirExprKind::Float(v) => IrExprKind::Const(IrConst::Float(*v, self.stack_kind(&ty, e.span)?)),
            HirExprKind::Local(id) => IrExprKind::Read(IrPlace::Local(IrLocalId(id.0))),
            HirExprKind::FnRef(r) => {
                return Err(LowerError::UnresolvedFunctionValue {
                    name: self.program.name_of(r.group).to_string(),
                    span: e.span,
                })
            }
            HirExprKind::FnHandle { group, .. } => {
                // Same type arguments as the function the value appears in.
                let params = self.program.group(*group).map(|g| g.type_params.clone()).unwrap_or_default();
                let vars: Vec<TypeExpr> = params.iter().map(|p| TypeExpr::TypeVar(p.clone())).collect();
                let identity = Substitution::from_pairs(&params, &vars);
                let func = self.instance(*group, &identity, Part::for_value, e.span)?;
                IrExprKind::Handle(self.instances.handle(func))
            }
            HirExprKind::Call { target, subst, args, .. } => {
                let func = self.instance(target.group(), subst, |g| Part::for_call(g, target), e.span)?;
                IrExprKind::Call { func, args: self.exprs(args)? }
            }
            HirExprKind::IndirectCall { callee, args } => {
                IrExprKind::CallIndirect { callee: Box::new(self.expr(callee)?), args: self.exprs(args)? }
            }
            HirExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let operands = self.stack_kind(&lhs.ty, e.span)?;
                IrExprKind::Binary { op: *op, operands, lhs: Box::new(lhs), rhs: Box::new(self.expr(rhs)?) }
            }
            HirExprKind::Unary { op, operand } => IrExprKind::Unary { op: *op, operand: Box::new(self.expr(operand)?) },
            HirExprKind::Ref { place, .. } => IrExprKind::AddressOf(self.place(place)?),
            HirExprKind::Deref(_) | HirExprKind::Field { .. } | HirExprKind::PackedField { .. } => {
                IrExprKind::Read(self.place(e)?)
            }
            HirExprKind::Variant { index, payload, .. } => {
                let repr = match self.expand(&ty, e.span)? {
                    TypeExpr::Sum { variants } => sum_repr(&variants),
                    other => return Err(LowerError::InvalidField { ty: other, index: *index, span: e.span }),
                };
                let payload = payload.as_deref().map(|p| self.expr(p)).transpose()?.map(Box::new);
                IrExprKind::Variant { discriminant: *index as u32, payload, repr }
            }
            HirExprKind::Product(fields) => {
                let declared = match self.expand(&ty, e.span)? {
                    TypeExpr::Product { fields } => fields,
                    other => return Err(LowerError::InvalidField { ty: other, index: 0, span: e.span }),
                };
                let (offsets, _) = self.program.types.field_offsets(&declared, e.span)?;
                let values = self.exprs(fields)?;
                IrExprKind::Product(offsets.into_iter().zip(values).collect())
            }
            HirExprKind::Block { stmts, value } => IrExprKind::Block {
                stmts: self.stmts(stmts)?,
                value: value.as_deref().map(|v| self.expr(v)).transpose()?.map(Box::new),
            },
            HirExprKind::If { cond, then_branch, else_branch } => IrExprKind::If {
                cond: Box::new(self.expr(cond)?),
                then_branch: Box::new(self.expr(then_branch)?),
                else_branch: else_branch.as_deref().map(|b| self.expr(b)).transpose()?.map(Box::new),
            },
            HirExprKind::Match { scrutinees, arms } => return self.lower_match(scrutinees, arms, ty, e.span),
            HirExprKind::Cast(inner) => IrExprKind::Cast(Box::new(self.expr(inner)?)),
            HirExprKind::Inlined { label, body } => {
                IrExprKind::Labeled { label: IrLabel(label.0), body: Box::new(self.expr(body)?) }
            }
        };
        Ok(IrExpr::new(kind, ty))
    }

    fn exprs(&mut self, exprs: &[HirExpr]) -> Result<Vec<IrExpr>, LowerError> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn place(&mut self, e: &HirExpr) -> Result<IrPlace, LowerError> {
        match &e.kind {
            HirExprKind::Local(id) => Ok(IrPlace::Local(IrLocalId(id.0))),
            HirExprKind::Deref(inner) => Ok(IrPlace::Deref(Box::new(self.expr(inner)?))),
            HirExprKind::Field { object, index } => {
                let base = self.place(object)?;
                let (offset, ty) = match self.expand(&self.ty(&object.ty), e.span)? {
                    TypeExpr::Product { fields } => {
                        let (offsets, _) = self.program.types.field_offsets(&fields, e.span)?;
                        let found = offsets.get(*index).copied().zip(fields.get(*index).map(|(_, t)| t.clone()));
                        match found {
                            Some(found) => found,
                            None => {
                                let ty = TypeExpr::Product { fields };
                                return Err(LowerError::InvalidField { ty, index: *index, span: e.span });
                            }
                        }
                    }
                    TypeExpr::Union { members } => match members.get(*index).map(|(_, t)| t.clone()) {
                        Some(ty) => (0, ty),
                        None => {
                            let ty = TypeExpr::Union { members };
                            return Err(LowerError::InvalidField { ty, index: *index, span: e.span });
                        }
                    },
                    other => return Err(LowerError::InvalidField { ty: other, index: *index, span: e.span }),
                };
                Ok(IrPlace::Field { base: Box::new(base), offset, ty })
            }
            HirExprKind::PackedField { object, index } => {
                let base = self.place(object)?;
                let fields = match self.expand(&self.ty(&object.ty), e.span)? {
                    TypeExpr::Packed { fields } => fields,
                    other => return Err(LowerError::InvalidField { ty: other, index: *index, span: e.span }),
                };
                let Some(&(shift, width)) = packed_offsets(&fields).get(*index) else {
                    let ty = TypeExpr::Packed { fields };
                    return Err(LowerError::InvalidField { ty, index: *index, span: e.span });
                };
                Ok(IrPlace::Bits { base: Box::new(base), shift, width, carrier: packed_carrier(&fields) })
            }
            _ => {
                // A temporary: spill it and use the spill slot.
                let value = self.expr(e)?;
                let slot = self.temp("spill", value.ty.clone());
                let addr = IrExpr::new(
                    IrExprKind::AddressOf(IrPlace::Local(slot)),
                    TypeExpr::pointer(false, value.ty.clone()),
                );
                Ok(IrPlace::Deref(Box::new(IrExpr::block(vec![IrStmt::Let { local: slot, value }], addr))))
            }
        }
    }

    pub(crate) fn stmts(&mut self, stmts: &[HirStmt]) -> Result<Vec<IrStmt>, LowerError> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let lowered = match &stmt.kind {
                HirStmtKind::Let { local, init } => IrStmt::Let { local: IrLocalId(local.0), value: self.expr(init)? },
                HirStmtKind::Assign { place, value } => {
                    IrStmt::Store { place: self.place(place)?, value: self.expr(value)? }
                }
                HirStmtKind::Expr(e) => IrStmt::Expr(self.expr(e)?),
                HirStmtKind::Return(value) => IrStmt::Return(self.opt_expr(value.as_ref())?),
                HirStmtKind::Break { target: BreakTarget::Loop, .. } => IrStmt::BreakLoop,
                HirStmtKind::Break { target: BreakTarget::Label(label), value } => {
                    IrStmt::Break { label: IrLabel(label.0), value: self.opt_expr(value.as_ref())? }
                }
                // Only template bodies break to their result, and templates
                // are gone after inlining.
                HirStmtKind::Break { target: BreakTarget::TemplateResult, value } => {
                    IrStmt::Return(self.opt_expr(value.as_ref())?)
                }
                HirStmtKind::Continue => IrStmt::Continue,
                HirStmtKind::Loop(body) => IrStmt::Loop(self.stmts(body)?),
                HirStmtKind::FnDef(_) => continue,
            };
            out.push(lowered);
        }
        Ok(out)
    }

    fn opt_expr(&mut self, e: Option<&HirExpr>) -> Result<Option<IrExpr>, LowerError> {
        e.map(|e| self.expr(e)).transpose()
    }
}

/// `lhs == rhs` as an `i32`.
pub(crate) fn equals(lhs: IrExpr, rhs: IrExpr, operands: StackKind) -> IrExpr {
    IrExpr::new(
        IrExprKind::Binary { op: BinOp::Eq, operands, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        TypeExpr::i32(),
    )
}
