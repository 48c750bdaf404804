// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Function values known at compile time.
//!
//! A local or match column holding a known function is replaced by the
//! function itself, a call through a known function becomes a direct call,
//! and a call passing a known function to a function-typed parameter is
//! redirected to a copy of the callee with that parameter fixed.

use std::collections::{BTreeSet, HashMap, HashSet};

use kiln_ast::Linkage;
use kiln_hir::visit;
use kiln_hir::{
    CallTarget, FnRef, FunctionGroup, GroupId, GroupOrigin, HirExpr, HirExprKind, HirProgram, HirStmt,
    HirStmtKind, Local, LocalId, LocalKind, Pattern,
};
use kiln_types::{Substitution, TypeExpr, TypeTable, Unifier};

use crate::error::InlineError;
use crate::graph::CallGraph;

// ----------------------------------------------------------------------------
// Propagation

/// A function referenced as a value somewhere in the program.
struct ValueTarget {
    /// How it is called when nothing is known about its arguments.
    target: Result<CallTarget, InlineError>,
    type_params: Vec<String>,
    params: Vec<TypeExpr>,
    ret: TypeExpr,
}

/// Replaces uses of function-valued locals bound once to a known function.
///
/// Returns whether any body changed.
pub(crate) fn propagate(program: &mut HirProgram) -> Result<bool, InlineError> {
    let targets = value_targets(program);
    let types = program.types.clone();
    let mut changed = false;
    for group in program.groups_mut() {
        for clause in &mut group.clauses {
            let Some(body) = clause.body.as_mut() else { continue };
            let known = known_values(body, &clause.locals);
            let mut failure = None;
            visit::walk_expr_mut(body, &mut |e| {
                if failure.is_some() {
                    return;
                }
                match rewrite_value(e, &known, &targets, &types) {
                    Ok(true) => changed = true,
                    Ok(false) => {}
                    Err(err) => failure = Some(err),
                }
            });
            if let Some(err) = failure {
                return Err(err);
            }
        }
    }
    Ok(changed)
}

fn value_targets(program: &HirProgram) -> HashMap<GroupId, ValueTarget> {
    let mut referenced = BTreeSet::new();
    for body in program.groups().iter().flat_map(|g| g.clauses.iter()).filter_map(|c| c.body.as_ref()) {
        visit::walk_expr(body, &mut |e| {
            if let HirExprKind::FnRef(r) = &e.kind {
                referenced.insert(r.group);
            }
        });
    }
    referenced
        .into_iter()
        .filter_map(|id| {
            let group = program.group(id)?;
            let target = kiln_dispatch::resolve_unknown(program, id).map_err(InlineError::from);
            Some((
                id,
                ValueTarget {
                    target,
                    type_params: group.type_params.clone(),
                    params: group.params.clone(),
                    ret: group.ret.clone(),
                },
            ))
        })
        .collect()
}

/// Locals that can only ever hold one known function.
fn known_values(body: &HirExpr, locals: &kiln_hir::LocalTable) -> HashMap<LocalId, HirExpr> {
    let mut known = HashMap::new();
    let immutable = |id: LocalId| locals.get(id).is_some_and(|l| !l.mutable);
    visit::walk_expr(body, &mut |e| match &e.kind {
        HirExprKind::Block { stmts, .. } => let_values(stmts, &immutable, &mut known),
        HirExprKind::Match { scrutinees, arms } => {
            for (column, scrutinee) in scrutinees.iter().enumerate() {
                if !matches!(scrutinee.kind, HirExprKind::FnRef(_)) {
                    continue;
                }
                for arm in arms {
                    if let Some(Pattern::Bind { local }) = arm.patterns.get(column) {
                        if immutable(*local) {
                            known.insert(*local, scrutinee.clone());
                        }
                    }
                }
            }
        }
        _ => {}
    });
    known
}

fn let_values(stmts: &[HirStmt], immutable: &impl Fn(LocalId) -> bool, known: &mut HashMap<LocalId, HirExpr>) {
    for stmt in stmts {
        match &stmt.kind {
            HirStmtKind::Let { local, init } if immutable(*local) && matches!(init.kind, HirExprKind::FnRef(_)) => {
                known.insert(*local, init.clone());
            }
            HirStmtKind::Loop(body) => let_values(body, immutable, known),
            _ => {}
        }
    }
}

fn rewrite_value(
    e: &mut HirExpr,
    known: &HashMap<LocalId, HirExpr>,
    targets: &HashMap<GroupId, ValueTarget>,
    types: &TypeTable,
) -> Result<bool, InlineError> {
    match &mut e.kind {
        HirExprKind::Local(id) => match known.get(id) {
            Some(value) => {
                e.kind = value.kind.clone();
                Ok(true)
            }
            None => Ok(false),
        },
        HirExprKind::IndirectCall { callee, args } => {
            let HirExprKind::FnRef(r) = &callee.kind else { return Ok(false) };
            let Some(value) = targets.get(&r.group) else { return Ok(false) };
            let target = value.target.clone()?;
            let subst = value.substitution(r.bound.len(), &callee.ty, types);
            let mut all = r.bound.clone();
            all.append(args);
            e.kind = HirExprKind::Call { target, subst, args: all, getter: false };
            Ok(true)
        }
        HirExprKind::Match { scrutinees, arms } => {
            let columns: Vec<usize> = (0..scrutinees.len())
                .filter(|&c| matches!(scrutinees[c].kind, HirExprKind::FnRef(_)))
                .filter(|&c| {
                    arms.iter().all(|arm| match arm.patterns.get(c) {
                        Some(Pattern::Bind { local }) => known.contains_key(local),
                        Some(Pattern::Wildcard) => true,
                        _ => false,
                    })
                })
                .collect();
            for &c in columns.iter().rev() {
                scrutinees.remove(c);
                for arm in arms.iter_mut() {
                    arm.patterns.remove(c);
                }
            }
            Ok(!columns.is_empty())
        }
        HirExprKind::Block { stmts, .. } => Ok(drop_lets(stmts, known)),
        _ => Ok(false),
    }
}

impl ValueTarget {
    /// Type arguments for a call through a value of type `found` with
    /// `bound` leading arguments already fixed.
    fn substitution(&self, bound: usize, found: &TypeExpr, types: &TypeTable) -> Substitution {
        let params = self.params.get(bound..).unwrap_or_default().to_vec();
        let expected = TypeExpr::function(params, self.ret.clone());
        let mut unifier = Unifier::new(types);
        let mut subst = match unifier.unify(&expected, found, Default::default()) {
            Ok(_) => unifier.into_substitution(),
            Err(_) => Substitution::new(),
        };
        for p in &self.type_params {
            if subst.get(p).is_none() {
                subst.insert(p.clone(), TypeExpr::TypeVar(p.clone()));
            }
        }
        subst
    }
}

/// Removes `let` statements of propagated locals, also inside loops.
fn drop_lets(stmts: &mut Vec<HirStmt>, known: &HashMap<LocalId, HirExpr>) -> bool {
    let before = stmts.len();
    stmts.retain(|s| !matches!(&s.kind, HirStmtKind::Let { local, .. } if known.contains_key(local)));
    let mut changed = stmts.len() != before;
    for stmt in stmts.iter_mut() {
        if let HirStmtKind::Loop(body) = &mut stmt.kind {
            changed |= drop_lets(body, known);
        }
    }
    changed
}

// ----------------------------------------------------------------------------
// Specialization

/// Which parameter of which function, fixed to which function value.
type Key = (GroupId, usize, GroupId);

#[derive(Debug, Default)]
pub(crate) struct Specializer {
    cache: HashMap<Key, GroupId>,
    /// Functions that have at least one specialized copy.
    pub(crate) sources: BTreeSet<GroupId>,
}

impl Specializer {
    /// One pass over every body. Returns whether any call was redirected.
    pub(crate) fn run(&mut self, program: &mut HirProgram) -> bool {
        let graph = CallGraph::build(program);
        let mut wanted: Vec<(Key, Vec<TypeExpr>)> = Vec::new();
        let mut seen = HashSet::new();
        for body in program.groups().iter().flat_map(|g| g.clauses.iter()).filter_map(|c| c.body.as_ref()) {
            visit::walk_expr(body, &mut |e| {
                let HirExprKind::Call { target, args, .. } = &e.kind else { return };
                let callee = target.group();
                let Some((index, value)) = fixable_argument(program, &graph, callee, args) else { return };
                let key = (callee, index, value.group);
                if !self.cache.contains_key(&key) && seen.insert(key) {
                    wanted.push((key, value.bound.iter().map(|b| b.ty.clone()).collect()));
                }
            });
        }

        for (key, bound) in wanted {
            if let Some(id) = specialize(program, key, &bound) {
                self.cache.insert(key, id);
                self.sources.insert(key.0);
            }
        }

        let mut changed = false;
        for group in program.groups_mut() {
            for body in group.clauses.iter_mut().filter_map(|c| c.body.as_mut()) {
                visit::walk_expr_mut(body, &mut |e| {
                    let HirExprKind::Call { target, args, .. } = &mut e.kind else { return };
                    let callee = target.group();
                    let found = args.iter().enumerate().find_map(|(index, arg)| match &arg.kind {
                        HirExprKind::FnRef(r) => self.cache.get(&(callee, index, r.group)).map(|&to| (index, to)),
                        _ => None,
                    });
                    let Some((index, specialized)) = found else { return };
                    if let HirExprKind::FnRef(r) = args.remove(index).kind {
                        args.splice(0..0, r.bound);
                    }
                    target.set_group(specialized);
                    changed = true;
                });
            }
        }
        changed
    }
}

/// The first argument that is a known function passed to a function-typed
/// parameter of a callee that can be copied.
fn fixable_argument<'e>(
    program: &HirProgram,
    graph: &CallGraph,
    callee: GroupId,
    args: &'e [HirExpr],
) -> Option<(usize, &'e FnRef)> {
    let group = program.group(callee)?;
    if group.is_template() || group.clauses.iter().any(|c| c.body.is_none()) || graph.is_recursive(callee) {
        return None;
    }
    args.iter().enumerate().find_map(|(index, arg)| {
        let HirExprKind::FnRef(r) = &arg.kind else { return None };
        let param = program.types.expand(group.params.get(index)?, group.span).ok()?;
        matches!(param, TypeExpr::Exponential { .. }).then_some((index, r))
    })
}

/// Copies `from` with parameter `index` replaced by `value`, whose bound
/// arguments become leading parameters.
fn specialize(program: &mut HirProgram, (from, index, value): Key, bound: &[TypeExpr]) -> Option<GroupId> {
    let mut specialized: FunctionGroup = program.group(from)?.clone();
    let value_name = program.name_of(value).to_string();
    let id = program.reserve_group();
    specialized.id = id;
    specialized.name = format!("{}${}", specialized.name, value_name);
    specialized.origin = GroupOrigin::Specialized { from };
    specialized.flags.linkage = Linkage::Internal;
    specialized.params.remove(index);
    specialized.params.splice(0..0, bound.iter().cloned());

    for clause in &mut specialized.clauses {
        let fixed = match clause.patterns.remove(index) {
            Pattern::Bind { local } => Some(local),
            _ => None,
        };
        let leading: Vec<LocalId> = bound
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                clause.locals.push(Local {
                    name: format!("{value_name}.{i}"),
                    ty: ty.clone(),
                    mutable: false,
                    kind: LocalKind::Param,
                })
            })
            .collect();
        clause.patterns.splice(0..0, leading.iter().map(|&local| Pattern::Bind { local }));

        let Some(fixed) = fixed else { continue };
        if let Some(local) = clause.locals.get_mut(fixed) {
            local.kind = LocalKind::Temp;
        }
        let bound: Vec<HirExpr> = leading
            .iter()
            .zip(bound)
            .map(|(&local, ty)| HirExpr::local(local, ty.clone(), clause.span))
            .collect();
        if let Some(body) = clause.body.as_mut() {
            visit::walk_expr_mut(body, &mut |e| {
                if e.kind == HirExprKind::Local(fixed) {
                    e.kind = HirExprKind::FnRef(FnRef { group: value, bound: bound.clone() });
                }
            });
        }
    }

    tracing::debug!(function = %specialized.name, parameter = index, "specialized");
    program.insert_group(specialized);
    Some(id)
}
