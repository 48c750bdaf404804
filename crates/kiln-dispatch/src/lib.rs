// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Name resolution, body typing and clause selection.
//!
//! Turns a syntax-tree module into a [`HirProgram`]: clauses sharing a name
//! become one group, every body is typed, and every call names the clause it
//! reaches or, when argument values are only known at run time, the ordered
//! list of clauses it may reach.

mod check;
mod collect;
mod error;
mod pattern;

pub use error::DispatchError;
pub use pattern::{Decider, Decision, Knowledge};

use kiln_ast::{ItemKind, Module};
use kiln_hir::{CallTarget, GroupId, GroupOrigin, HirProgram, ModuleInterface, Pattern};
use kiln_types::TypeTable;

use check::Checker;
use collect::GlobalScope;

/// Resolves and types one module against the interfaces it may import.
pub fn resolve_module(module: &Module, imports: &[ModuleInterface]) -> Result<HirProgram, DispatchError> {
    let _span = tracing::debug_span!("dispatch", module = %module.name).entered();

    let mut types = TypeTable::new();
    types.declare_all(module.items.iter().filter_map(|item| match &item.kind {
        ItemKind::Type(decl) => Some((decl, item.span)),
        _ => None,
    }))?;

    let mut program = HirProgram::new(module.name.clone(), TypeTable::new());
    let mut globals = GlobalScope::default();
    for item in &module.items {
        if let ItemKind::Import(decl) = &item.kind {
            collect::import_module(decl, item.span, imports, &mut program, &mut globals)?;
        }
    }

    let clauses = module.items.iter().filter_map(|item| match &item.kind {
        ItemKind::Fn(clause) => Some(clause),
        _ => None,
    });
    let mut source = Vec::new();
    for (name, members) in collect::group_by_name(clauses) {
        let id = program.reserve_group();
        if globals.functions.insert(name.clone(), id).is_some() || globals.namespaces.contains_key(&name) {
            return Err(DispatchError::DuplicateName { name, span: members[0].span });
        }
        let group = collect::build_group(id, &name, &members, &types, None, GroupOrigin::Source)?;
        tracing::trace!(function = %name, clauses = members.len(), "group");
        program.insert_group(group);
        source.push((id, members));
    }

    for (id, members) in &source {
        let is_extern = program.group(*id).is_some_and(|g| g.is_extern());
        if is_extern {
            continue;
        }
        for (index, clause) in members.iter().enumerate() {
            Checker::check_clause(&types, &mut program, &globals, *id, index, &clause.body)?;
        }
    }

    program.types = types;
    tracing::debug!(groups = program.groups().len(), "resolved");
    Ok(program)
}

/// Target for a call of `group` whose arguments are all unknown.
///
/// Used when a later stage turns an indirect call into a direct one.
pub fn resolve_unknown(program: &HirProgram, group: GroupId) -> Result<CallTarget, DispatchError> {
    let Some(g) = program.group(group) else {
        return Err(DispatchError::UnresolvedName { name: program.name_of(group).to_string(), span: Default::default() });
    };
    let rows: Vec<&[Pattern]> = g.clauses.iter().map(|c| c.patterns.as_slice()).collect();
    let knowledge = vec![Knowledge::Unknown; g.arity()];
    match Decider::new(&program.types).decide(&rows, &knowledge, &g.params) {
        Some(Decision::Static(clause)) => Ok(CallTarget::Clause { group, clause }),
        Some(Decision::Runtime(candidates)) => Ok(CallTarget::Dispatch { group, candidates }),
        None => Err(DispatchError::NonExhaustiveMatch { function: g.name.clone(), span: g.span }),
    }
}
