// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Inlining of templates, getters and function values.
//!
//! Runs over lifted programs. Template and getter calls are expanded in
//! place, function values known at compile time become direct calls, and
//! callees taking such values are specialized. What remains is either
//! rejected or, in liberal mode, turned into indices into the indirect-call
//! table.

mod error;
mod expand;
mod graph;
mod specialize;

pub use error::InlineError;

use std::collections::{BTreeSet, HashMap};

use kiln_hir::visit;
use kiln_hir::{GroupId, HirExprKind, HirProgram};

use expand::Labels;
use graph::CallGraph;
use specialize::Specializer;

/// A program with every template gone and every remaining function value
/// resolved to a table index.
#[derive(Debug, Clone)]
pub struct InlineOutput {
    pub program: HirProgram,
    /// Functions reachable through the indirect-call table, by index.
    pub indirect: Vec<GroupId>,
}

pub fn inline_program(mut program: HirProgram, liberal: bool) -> Result<InlineOutput, InlineError> {
    let _span = tracing::debug_span!("inline", module = %program.module, liberal).entered();
    reject_recursive_templates(&program)?;

    let mut labels = Labels::starting_after(&program);
    let mut specializer = Specializer::default();
    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut changed = expand_calls(&mut program, &mut labels)?;
        changed |= specialize::propagate(&mut program)?;
        changed |= specializer.run(&mut program);
        if !changed {
            break;
        }
    }
    tracing::trace!(rounds, "fixed point");

    let removed = remove_dead(&mut program, &specializer.sources);
    let indirect = assign_handles(&mut program, &removed, liberal)?;
    tracing::debug!(groups = program.groups().len(), handles = indirect.len(), "inlined");
    Ok(InlineOutput { program, indirect })
}

fn reject_recursive_templates(program: &HirProgram) -> Result<(), InlineError> {
    let graph = CallGraph::build(program);
    let is_template = |id: GroupId| program.group(id).is_some_and(|g| g.is_template());
    for group in program.groups().iter().filter(|g| g.is_template()) {
        if graph.reaches_within(group.id, group.id, is_template) {
            return Err(InlineError::RecursiveTemplate { function: group.name.clone(), span: group.span });
        }
    }
    Ok(())
}

/// Expands every call of a template, and every getter-style call of a
/// getter that is not recursive.
///
/// The `return`s a template brings along are checked against the caller,
/// unless the caller is itself a template.
fn expand_calls(program: &mut HirProgram, labels: &mut Labels) -> Result<bool, InlineError> {
    let graph = CallGraph::build(program);
    let mut changed = false;
    let mut failure = None;
    for id in program.group_ids() {
        let Some(mut group) = program.take_group(id) else { continue };
        let ret = (!group.is_template()).then(|| group.ret.clone());
        for clause in &mut group.clauses {
            let Some(body) = clause.body.as_mut() else { continue };
            let locals = &mut clause.locals;
            visit::walk_expr_mut(body, &mut |e| {
                if failure.is_some() {
                    return;
                }
                let HirExprKind::Call { target, subst, args, getter } = &mut e.kind else { return };
                let Some(callee) = program.group(target.group()) else { return };
                let expand = callee.is_template() || (*getter && callee.is_getter() && !graph.is_recursive(callee.id));
                if !expand || callee.clauses.iter().any(|c| c.body.is_none()) {
                    return;
                }
                let (target, subst, args) = (target.clone(), subst.clone(), std::mem::take(args));
                let (ty, span) = (e.ty.clone(), e.span);
                let Some(expanded) = expand::expand_call(callee, &target, &subst, args, ty, span, locals, labels)
                else {
                    return;
                };
                if let Some(ret) = &ret {
                    if let Err(err) = expand::check_returns(&expanded, &group.name, ret, &program.types) {
                        failure = Some(err);
                    }
                }
                tracing::trace!(function = %callee.name, "expanded");
                *e = expanded;
                changed = true;
            });
        }
        program.insert_group(group);
        if let Some(err) = failure {
            return Err(err);
        }
    }
    Ok(changed)
}

/// Drops templates and specialized-away functions nothing refers to any
/// more. Returns the names of everything removed.
fn remove_dead(program: &mut HirProgram, sources: &BTreeSet<GroupId>) -> HashMap<GroupId, String> {
    let mut removed = HashMap::new();
    loop {
        let referenced = CallGraph::build(program).referenced_elsewhere();
        let dead: Vec<GroupId> = program
            .groups()
            .iter()
            .filter(|g| {
                g.is_template() || (sources.contains(&g.id) && !g.is_exported() && !referenced.contains(&g.id))
            })
            .map(|g| g.id)
            .collect();
        if dead.is_empty() {
            return removed;
        }
        for id in dead {
            removed.insert(id, program.name_of(id).to_string());
        }
        program.retain_groups(|g| !removed.contains_key(&g.id));
    }
}

/// Turns every function value left into an index into the indirect-call
/// table, or fails outside liberal mode.
fn assign_handles(
    program: &mut HirProgram,
    removed: &HashMap<GroupId, String>,
    liberal: bool,
) -> Result<Vec<GroupId>, InlineError> {
    let names: HashMap<GroupId, (String, bool)> = program
        .groups()
        .iter()
        .map(|g| (g.id, (g.name.clone(), g.is_template())))
        .chain(removed.iter().map(|(id, name)| (*id, (name.clone(), true))))
        .collect();
    let mut table: Vec<GroupId> = Vec::new();
    let mut failure = None;
    for group in program.groups_mut() {
        let function = group.name.clone();
        for body in group.clauses.iter_mut().filter_map(|c| c.body.as_mut()) {
            visit::walk_expr_mut(body, &mut |e| {
                let HirExprKind::FnRef(r) = &e.kind else { return };
                if failure.is_some() {
                    return;
                }
                let (value, template) = names.get(&r.group).cloned().unwrap_or_default();
                let reason = if !r.bound.is_empty() {
                    Some(Some("it captures bindings of an enclosing function".to_string()))
                } else if template {
                    Some(Some("templates have no callable body".to_string()))
                } else if !liberal {
                    Some(None)
                } else {
                    None
                };
                if let Some(reason) = reason {
                    failure = Some(InlineError::NonInlinableIndirectCall {
                        function: function.clone(),
                        value,
                        reason,
                        span: e.span,
                    });
                    return;
                }
                let group = r.group;
                let handle = match table.iter().position(|g| *g == group) {
                    Some(i) => i,
                    None => {
                        tracing::debug!(function = %value, handle = table.len(), "indirect handle");
                        table.push(group);
                        table.len() - 1
                    }
                };
                e.kind = HirExprKind::FnHandle { group, handle: handle as u32 };
            });
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(table),
    }
}

#[cfg(test)]
mod tests;
