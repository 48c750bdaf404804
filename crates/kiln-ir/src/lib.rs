// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering of inlined programs to a flat table of concrete functions.
//!
//! - Generic groups are instantiated for the type arguments calls use
//! - A multi-clause group becomes one function per clause (`name#k`) and,
//!   when a call only knows its clause at run time, a dispatcher `name`
//! - Field access, packed fields and sums follow `kiln_types::layout`
//! - Region summaries become the per-function borrow guarantees

mod error;
mod ir;
mod lower;
mod matching;
mod mono;

pub use error::LowerError;
pub use ir::{FuncId, IrConst, IrExpr, IrExprKind, IrFunction, IrLabel, IrLocal, IrLocalId, IrPlace, IrProgram, IrStmt};

use std::collections::BTreeSet;

use kiln_ast::Linkage;
use kiln_borrow::BorrowReport;
use kiln_hir::{FunctionGroup, HirProgram, Pattern};
use kiln_types::Substitution;

use lower::FunctionLowerer;
use matching::chain;
use mono::{Instance, Instances, Part};

pub fn lower_program(program: &HirProgram, report: &BorrowReport) -> Result<IrProgram, LowerError> {
    let _span = tracing::debug_span!("lower", module = %program.module).entered();

    let mut instances = Instances::default();
    for group in program.groups().iter().filter(|g| !g.is_generic() && !g.is_template()) {
        if group.clauses.len() <= 1 {
            instances.request(Instance { group: group.id, args: Vec::new(), part: Part::Whole });
            continue;
        }
        if group.is_exported() {
            instances.request(Instance { group: group.id, args: Vec::new(), part: Part::Dispatcher });
        }
        for k in 0..group.clauses.len() {
            instances.request(Instance { group: group.id, args: Vec::new(), part: Part::Clause(k) });
        }
    }

    let mut functions = Vec::new();
    while let Some((id, instance)) = instances.next() {
        let Some(group) = program.group(instance.group) else {
            return Err(LowerError::MissingFunction {
                name: program.name_of(instance.group).to_string(),
                span: Default::default(),
            });
        };
        let function = lower_instance(program, report, &mut instances, group, id, &instance)?;
        tracing::trace!(function = %function.name, id = id.0, "lowered");
        functions.push(function);
    }
    for id in &instances.indirect {
        if let Some(f) = functions.get_mut(id.0 as usize) {
            f.indirect_callable = true;
        }
    }

    tracing::debug!(functions = functions.len(), indirect = instances.indirect.len(), "lowered module");
    Ok(IrProgram {
        module: program.module.clone(),
        functions,
        indirect: instances.indirect,
        types: program.types.clone(),
    })
}

fn lower_instance(
    program: &HirProgram,
    report: &BorrowReport,
    instances: &mut Instances,
    group: &FunctionGroup,
    id: FuncId,
    instance: &Instance,
) -> Result<IrFunction, LowerError> {
    let subst = Substitution::from_pairs(&group.type_params, &instance.args);
    let name = instance.name(group);
    let guarantees = |clauses: &mut dyn Iterator<Item = usize>| -> Vec<usize> {
        let mut params = BTreeSet::new();
        for k in clauses {
            if let Some(summary) = report.regions.get(&(group.id, k)) {
                params.extend(summary.return_borrows_from.iter().copied());
            }
        }
        params.into_iter().collect()
    };

    let (params, locals, body, linkage, returns_borrow_of) = match instance.part {
        Part::Whole | Part::Clause(_) => {
            let k = match instance.part {
                Part::Clause(k) => k,
                _ => 0,
            };
            let Some(clause) = group.clauses.get(k) else {
                return Err(LowerError::MissingFunction { name, span: group.span });
            };
            let mut lower = FunctionLowerer::new(program, instances, subst.clone(), Some(&clause.locals));
            let mut params = Vec::with_capacity(clause.patterns.len());
            let mut entry = Vec::new();
            for (pattern, ty) in clause.patterns.iter().zip(&group.params) {
                match pattern {
                    Pattern::Bind { local } => params.push(IrLocalId(local.0)),
                    other => {
                        let ty = lower.ty(ty);
                        let slot = lower.temp("arg", ty.clone());
                        params.push(slot);
                        // The caller already chose this clause; only bindings remain.
                        let mut tests = Vec::new();
                        lower.pattern(other, IrExpr::read_local(slot, ty), clause.span, &mut tests, &mut entry)?;
                    }
                }
            }
            let body = match clause.body.as_ref() {
                Some(body) => {
                    let body = lower.expr(body)?;
                    Some(if entry.is_empty() { body } else { IrExpr::block(entry, body) })
                }
                None => None,
            };
            let linkage = match instance.part {
                Part::Whole => group.flags.linkage.clone(),
                _ => Linkage::Internal,
            };
            (params, lower.locals, body, linkage, guarantees(&mut std::iter::once(k)))
        }
        Part::Dispatcher => {
            let mut lower = FunctionLowerer::new(program, instances, subst.clone(), None);
            let params: Vec<IrLocalId> = group.params.iter().map(|ty| {
                let ty = lower.ty(ty);
                lower.temp("arg", ty)
            }).collect();
            let args: Vec<IrExpr> = params
                .iter()
                .map(|p| IrExpr::read_local(*p, lower.locals[p.0 as usize].ty.clone()))
                .collect();
            let ret = lower.ty(&group.ret);
            let mut rows = Vec::with_capacity(group.clauses.len());
            for (k, clause) in group.clauses.iter().enumerate() {
                let mut tests = Vec::new();
                let mut ignored = Vec::new();
                for (pattern, value) in clause.patterns.iter().zip(&args) {
                    lower.pattern(pattern, value.clone(), clause.span, &mut tests, &mut ignored)?;
                }
                let func = lower.instances.request(Instance {
                    group: group.id,
                    args: instance.args.clone(),
                    part: Part::Clause(k),
                });
                let call = IrExpr::new(IrExprKind::Call { func, args: args.clone() }, ret.clone());
                rows.push((tests, call));
            }
            tracing::debug!(function = %name, clauses = rows.len(), "dispatcher");
            let body = chain(rows, &ret);
            (params, lower.locals, body, group.flags.linkage.clone(), guarantees(&mut (0..group.clauses.len())))
        }
    };

    Ok(IrFunction {
        id,
        name,
        params,
        ret: subst.apply(&group.ret).erase_lifetimes(),
        locals,
        body,
        linkage,
        indirect_callable: false,
        returns_borrow_of,
    })
}
