// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Which enclosing bindings each nested function uses, and how.
//!
//! A nested function captures every binding of an enclosing function it
//! names, plus whatever the nested functions it calls capture from outside
//! it. The mode decides how the lifter passes the binding in.

use std::collections::{BTreeMap, BTreeSet};

use kiln_ast::Span;
use kiln_hir::visit;
use kiln_hir::{BindingRef, GroupId, HirExpr, HirExprKind, HirProgram, HirStmt, HirStmtKind, LocalId, LocalKind};
use kiln_types::{TypeExpr, TypeTable};

/// How a captured binding reaches the nested function.
///
/// Ordered from the least to the most demanding; merging two uses keeps
/// the larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CaptureMode {
    /// Copied in; the binding is immutable and a stack value.
    ByValue,
    ByRef,
    /// Assigned or mutably borrowed inside.
    ByMutableRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub binding: BindingRef,
    pub name: String,
    /// Type of the binding itself, not of how it is passed.
    pub ty: TypeExpr,
    pub mode: CaptureMode,
}

/// Captures of one nested function, ordered by binding.
pub type CaptureSet = Vec<Capture>;

/// Captures of every nested group in `program`.
///
/// Groups that capture nothing map to an empty set; groups that are not
/// nested are absent.
pub fn analyze_captures(program: &HirProgram) -> BTreeMap<GroupId, CaptureSet> {
    let mut sets: BTreeMap<GroupId, BTreeMap<BindingRef, Capture>> = BTreeMap::new();
    let mut callees: BTreeMap<GroupId, BTreeSet<GroupId>> = BTreeMap::new();

    for group in program.groups().iter().filter(|g| g.is_nested()) {
        let set = sets.entry(group.id).or_default();
        let calls = callees.entry(group.id).or_default();
        for clause in &group.clauses {
            let Some(body) = &clause.body else { continue };
            let mutated = mutated_locals(body);
            for (id, local) in clause.locals.iter() {
                let LocalKind::Captured(binding) = local.kind else { continue };
                let mode = if mutated.contains(&id) {
                    CaptureMode::ByMutableRef
                } else if !local.mutable && is_stack(&program.types, &local.ty) {
                    CaptureMode::ByValue
                } else {
                    CaptureMode::ByRef
                };
                merge(set, Capture { binding, name: local.name.clone(), ty: local.ty.clone(), mode });
            }
            calls.extend(nested_callees(program, body));
        }
    }

    // A call of a nested function needs its captures at the call site, so
    // the caller captures whatever is not its own.
    loop {
        let mut changed = false;
        for (caller, called) in &callees {
            for callee in called {
                if callee == caller {
                    continue;
                }
                let inherited: Vec<Capture> = sets
                    .get(callee)
                    .map(|set| set.values().filter(|c| c.binding.group != *caller).cloned().collect())
                    .unwrap_or_default();
                let set = sets.entry(*caller).or_default();
                for capture in inherited {
                    changed |= merge(set, capture);
                }
            }
        }
        if !changed {
            break;
        }
    }

    sets.into_iter()
        .map(|(group, set)| {
            let captures: CaptureSet = set.into_values().collect();
            if !captures.is_empty() {
                tracing::debug!(
                    function = %program.name_of(group),
                    captures = ?captures.iter().map(|c| (c.name.as_str(), c.mode)).collect::<Vec<_>>(),
                    "captures"
                );
            }
            (group, captures)
        })
        .collect()
}

/// Adds `capture`, keeping the stronger mode. Returns whether anything changed.
fn merge(set: &mut BTreeMap<BindingRef, Capture>, capture: Capture) -> bool {
    match set.get_mut(&capture.binding) {
        Some(existing) if existing.mode >= capture.mode => false,
        Some(existing) => {
            existing.mode = capture.mode;
            true
        }
        None => {
            set.insert(capture.binding, capture);
            true
        }
    }
}

fn is_stack(types: &TypeTable, ty: &TypeExpr) -> bool {
    matches!(types.expand(ty, Span::default()), Ok(TypeExpr::Stack(_)))
}

/// Locals assigned or mutably borrowed anywhere in `body`.
pub(crate) fn mutated_locals(body: &HirExpr) -> BTreeSet<LocalId> {
    fn assigned(stmts: &[HirStmt], out: &mut BTreeSet<LocalId>) {
        for stmt in stmts {
            match &stmt.kind {
                HirStmtKind::Assign { place, .. } => out.extend(place.place_root()),
                HirStmtKind::Loop(body) => assigned(body, out),
                _ => {}
            }
        }
    }

    let mut out = BTreeSet::new();
    visit::walk_expr(body, &mut |e| match &e.kind {
        HirExprKind::Ref { mutable: true, place } => out.extend(place.place_root()),
        HirExprKind::Block { stmts, .. } => assigned(stmts, &mut out),
        _ => {}
    });
    out
}

/// Nested groups `body` calls or takes as values.
fn nested_callees(program: &HirProgram, body: &HirExpr) -> BTreeSet<GroupId> {
    let mut out = BTreeSet::new();
    visit::walk_expr(body, &mut |e| {
        let group = match &e.kind {
            HirExprKind::Call { target, .. } => target.group(),
            HirExprKind::FnRef(r) => r.group,
            _ => return,
        };
        if program.group(group).is_some_and(|g| g.is_nested()) {
            out.insert(group);
        }
    });
    out
}
