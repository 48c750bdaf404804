// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lambda lifting.
//!
//! Turns every nested function into a top-level group:
//! 1. Rewrite signatures: one leading parameter per capture, by value or
//!    by reference as capture analysis decided
//! 2. Rewrite bodies: uses of a by-reference capture dereference the new
//!    parameter
//! 3. Rewrite call sites and function values: pass the captures
//!
//! Runs after borrow checking, before inlining. The output has no nested
//! groups and no `FnDef` statements.

mod error;

pub use error::LiftError;

use std::collections::{HashMap, HashSet};

use kiln_ast::Span;
use kiln_borrow::{BorrowReport, Capture, CaptureMode};
use kiln_hir::visit;
use kiln_hir::{
    BindingRef, FunctionGroup, GroupId, GroupOrigin, HirExpr, HirExprKind, HirProgram, HirStmt, HirStmtKind, Local,
    LocalId, LocalKind, LocalTable, Pattern,
};
use kiln_types::TypeExpr;

// ── Types ───────────────────────────────────────────────────────────────

/// How a clause reaches a binding it hands to a lifted callee.
#[derive(Debug, Clone, Copy)]
enum Access {
    /// Declared in this clause.
    Own(LocalId),
    /// Received as a capture parameter in `mode`.
    Param(LocalId, CaptureMode),
}

/// Capture parameters of one lifted clause, by the binding they stand for.
type Inputs = HashMap<BindingRef, LocalId>;

// ── Public API ──────────────────────────────────────────────────────────

/// Lifts every nested group of `program`.
///
/// `report` must come from borrow-checking this same program.
pub fn lift_program(mut program: HirProgram, report: &BorrowReport) -> Result<HirProgram, LiftError> {
    let _span = tracing::debug_span!("lift", module = %program.module).entered();

    let nested: Vec<GroupId> = program.groups().iter().filter(|g| g.is_nested()).map(|g| g.id).collect();
    if nested.is_empty() {
        return Ok(program);
    }
    let names = lifted_names(&program);

    let mut inputs: HashMap<(GroupId, usize), Inputs> = HashMap::new();
    for id in &nested {
        let captures = report.captures_of(*id);
        let Some(group) = program.group_mut(*id) else { continue };
        let name = names.get(id).cloned().unwrap_or_else(|| group.name.clone());
        tracing::debug!(function = %name, captures = captures.len(), "lifted");
        for (index, clause_inputs) in lift_signature(group, captures, name).into_iter().enumerate() {
            inputs.insert((*id, index), clause_inputs);
        }
    }

    let modes: HashMap<GroupId, HashMap<BindingRef, CaptureMode>> = report
        .captures
        .iter()
        .map(|(g, set)| (*g, set.iter().map(|c| (c.binding, c.mode)).collect()))
        .collect();
    let empty = Inputs::new();
    for id in program.group_ids() {
        let Some(mut group) = program.take_group(id) else { continue };
        let captured = modes.get(&id);
        for (index, clause) in group.clauses.iter_mut().enumerate() {
            let Some(body) = clause.body.as_mut() else { continue };
            let site = CallSite {
                group: id,
                clause: index,
                inputs: inputs.get(&(id, index)).unwrap_or(&empty),
                modes: captured,
                locals: &clause.locals,
            };
            site.rewrite(body, report, &program)?;
        }
        program.insert_group(group);
    }
    Ok(program)
}

// ── Names ───────────────────────────────────────────────────────────────

/// `parent$name`, with the parent's own lifted name when it is nested too.
fn lifted_names(program: &HirProgram) -> HashMap<GroupId, String> {
    fn name_of(program: &HirProgram, id: GroupId, out: &mut HashMap<GroupId, String>) -> String {
        if let Some(name) = out.get(&id) {
            return name.clone();
        }
        let Some(group) = program.group(id) else { return String::new() };
        let name = match group.origin {
            GroupOrigin::Nested { parent, .. } => format!("{}${}", name_of(program, parent, out), group.name),
            _ => group.name.clone(),
        };
        out.insert(id, name.clone());
        name
    }

    let mut out = HashMap::new();
    for group in program.groups() {
        name_of(program, group.id, &mut out);
    }
    out.retain(|id, _| program.group(*id).is_some_and(|g| g.is_nested()));
    out
}

// ── Signatures ──────────────────────────────────────────────────────────

fn passed_type(capture: &Capture) -> TypeExpr {
    match capture.mode {
        CaptureMode::ByValue => capture.ty.clone(),
        CaptureMode::ByRef => TypeExpr::borrow(false, capture.ty.clone()),
        CaptureMode::ByMutableRef => TypeExpr::borrow(true, capture.ty.clone()),
    }
}

/// Prepends capture parameters to `group` and rewrites its bodies to use
/// them. Returns the capture parameters of each clause.
fn lift_signature(group: &mut FunctionGroup, captures: &[Capture], name: String) -> Vec<Inputs> {
    let parent = match group.origin {
        GroupOrigin::Nested { parent, .. } => parent,
        _ => group.id,
    };
    group.origin = GroupOrigin::Lifted { parent };
    group.name = name;
    group.params.splice(0..0, captures.iter().map(passed_type));

    let mut all = Vec::with_capacity(group.clauses.len());
    for clause in &mut group.clauses {
        let mut inputs = Inputs::new();
        // Local to (value type, parameter type).
        let mut derefs: HashMap<LocalId, (TypeExpr, TypeExpr)> = HashMap::new();
        let mut prefix = Vec::with_capacity(captures.len());
        for capture in captures {
            let local = match clause.locals.captured(capture.binding) {
                Some(id) => id,
                // Only needed to pass on to a nested callee.
                None => clause.locals.push(Local {
                    name: capture.name.clone(),
                    ty: capture.ty.clone(),
                    mutable: false,
                    kind: LocalKind::Captured(capture.binding),
                }),
            };
            if let Some(l) = clause.locals.get_mut(local) {
                l.kind = LocalKind::Param;
                l.ty = passed_type(capture);
                if capture.mode != CaptureMode::ByValue {
                    l.mutable = false;
                    derefs.insert(local, (capture.ty.clone(), passed_type(capture)));
                }
            }
            inputs.insert(capture.binding, local);
            prefix.push(Pattern::Bind { local });
        }
        clause.patterns.splice(0..0, prefix);

        if let Some(body) = clause.body.as_mut() {
            if !derefs.is_empty() {
                visit::walk_expr_mut(body, &mut |e| {
                    if let HirExprKind::Local(id) = e.kind {
                        if let Some((value_ty, param_ty)) = derefs.get(&id) {
                            let param = HirExpr::local(id, param_ty.clone(), e.span);
                            *e = HirExpr::new(HirExprKind::Deref(Box::new(param)), value_ty.clone(), e.span);
                        }
                    }
                });
            }
        }
        all.push(inputs);
    }
    all
}

// ── Call sites ──────────────────────────────────────────────────────────

struct CallSite<'a> {
    group: GroupId,
    clause: usize,
    inputs: &'a Inputs,
    /// Modes this clause's group received its captures in.
    modes: Option<&'a HashMap<BindingRef, CaptureMode>>,
    locals: &'a LocalTable,
}

impl CallSite<'_> {
    fn rewrite(&self, body: &mut HirExpr, report: &BorrowReport, program: &HirProgram) -> Result<(), LiftError> {
        self.check_escapes(body, report, program)?;

        let mut failed = None;
        visit::walk_expr_mut(body, &mut |e| {
            if failed.is_some() {
                return;
            }
            let span = e.span;
            let (group, args) = match &mut e.kind {
                HirExprKind::Call { target, args, .. } => (target.group(), args),
                HirExprKind::FnRef(r) => (r.group, &mut r.bound),
                HirExprKind::Block { stmts, .. } => {
                    strip_defs(stmts);
                    return;
                }
                _ => return,
            };
            let captures = report.captures_of(group);
            if captures.is_empty() {
                return;
            }
            match captures.iter().map(|c| self.argument(c, span)).collect::<Option<Vec<_>>>() {
                Some(extra) => {
                    args.splice(0..0, extra);
                }
                None => {
                    failed = Some(LiftError::EscapingCapture {
                        function: program.name_of(group).to_string(),
                        binding: captures[0].name.clone(),
                        span,
                    })
                }
            }
        });
        match failed {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn access(&self, binding: BindingRef) -> Option<Access> {
        if binding.group == self.group && binding.clause == self.clause {
            return Some(Access::Own(binding.local));
        }
        let local = *self.inputs.get(&binding)?;
        let mode = self.modes.and_then(|m| m.get(&binding)).copied().unwrap_or(CaptureMode::ByRef);
        Some(Access::Param(local, mode))
    }

    /// The argument passing `capture` from this clause.
    fn argument(&self, capture: &Capture, span: Span) -> Option<HirExpr> {
        let ty = capture.ty.clone();
        let place = match self.access(capture.binding)? {
            Access::Own(local) | Access::Param(local, CaptureMode::ByValue) => HirExpr::local(local, ty.clone(), span),
            Access::Param(local, _) => {
                let param_ty = self.locals.get(local).map(|l| l.ty.clone())?;
                let param = HirExpr::local(local, param_ty, span);
                HirExpr::new(HirExprKind::Deref(Box::new(param)), ty.clone(), span)
            }
        };
        Some(match capture.mode {
            CaptureMode::ByValue => place,
            CaptureMode::ByRef | CaptureMode::ByMutableRef => {
                let mutable = capture.mode == CaptureMode::ByMutableRef;
                let kind = HirExprKind::Ref { mutable, place: Box::new(place) };
                HirExpr::new(kind, TypeExpr::borrow(mutable, ty), span)
            }
        })
    }

    /// Capturing function values may only be passed straight to a call.
    fn check_escapes(&self, body: &HirExpr, report: &BorrowReport, program: &HirProgram) -> Result<(), LiftError> {
        let mut passed: HashSet<*const HirExpr> = HashSet::new();
        let mut values = Vec::new();
        visit::walk_expr(body, &mut |e| match &e.kind {
            HirExprKind::Call { args, .. } | HirExprKind::IndirectCall { args, .. } => {
                passed.extend(args.iter().map(|a| a as *const HirExpr));
            }
            HirExprKind::FnRef(r) => values.push((e as *const HirExpr, r.group, e.span)),
            _ => {}
        });
        for (ptr, group, span) in values {
            let captures = report.captures_of(group);
            if !captures.is_empty() && !passed.contains(&ptr) {
                return Err(LiftError::EscapingCapture {
                    function: program.name_of(group).to_string(),
                    binding: captures[0].name.clone(),
                    span,
                });
            }
        }
        Ok(())
    }
}

/// Drops `FnDef` markers; the groups they mark are top-level now.
fn strip_defs(stmts: &mut Vec<HirStmt>) {
    stmts.retain(|s| !matches!(s.kind, HirStmtKind::FnDef(_)));
    for stmt in stmts {
        if let HirStmtKind::Loop(body) = &mut stmt.kind {
            strip_defs(body);
        }
    }
}

#[cfg(test)]
mod tests;
