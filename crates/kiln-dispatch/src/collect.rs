// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Grouping clauses into function groups and building their patterns.

use std::collections::HashMap;

use kiln_ast::{
    FnClause, ImportDecl, ImportKind, Linkage, Param, ParamPattern, Span, TypeAnnot,
};
use kiln_hir::{
    FunctionClause, FunctionGroup, GroupFlags, GroupId, GroupOrigin, HirProgram, Local, LocalKind,
    LocalTable, ModuleInterface, Pattern,
};
use kiln_types::{TypeExpr, TypeTable};

use crate::error::DispatchError;

/// Names visible at module level.
#[derive(Debug, Default)]
pub(crate) struct GlobalScope {
    pub functions: HashMap<String, GroupId>,
    /// `import geometry as geo` makes `geo.area` resolvable.
    pub namespaces: HashMap<String, HashMap<String, GroupId>>,
}

/// Clauses sharing a name, gathered in declaration order.
pub(crate) fn group_by_name<'m>(clauses: impl IntoIterator<Item = &'m FnClause>) -> Vec<(String, Vec<&'m FnClause>)> {
    let mut groups: Vec<(String, Vec<&FnClause>)> = Vec::new();
    for clause in clauses {
        match groups.iter_mut().find(|(name, _)| *name == clause.name) {
            Some((_, members)) => members.push(clause),
            None => groups.push((clause.name.clone(), vec![clause])),
        }
    }
    groups
}

/// Builds a group's signature and patterns from its clauses.
///
/// `outer_type_params` are in scope for nested functions, which inherit
/// them and may not declare their own.
pub(crate) fn build_group(
    id: GroupId,
    name: &str,
    clauses: &[&FnClause],
    table: &TypeTable,
    outer_type_params: Option<&[String]>,
    origin: GroupOrigin,
) -> Result<FunctionGroup, DispatchError> {
    let first = clauses[0];
    let conflict = |reason: String, span: Span| DispatchError::ClauseConflict {
        function: name.to_string(),
        reason,
        span,
    };

    let type_params = match outer_type_params {
        Some(outer) => {
            if let Some(c) = clauses.iter().find(|c| !c.type_params.is_empty()) {
                return Err(DispatchError::InvalidNested {
                    function: name.to_string(),
                    reason: "nested functions cannot declare type parameters".into(),
                    span: c.span,
                });
            }
            outer.to_vec()
        }
        None => first.type_params.clone(),
    };
    for clause in &clauses[1..] {
        if clause.params.len() != first.params.len() {
            return Err(conflict(
                format!("expected {} parameters, found {}", first.params.len(), clause.params.len()),
                clause.span,
            ));
        }
        if outer_type_params.is_none() && clause.type_params != first.type_params {
            return Err(conflict("type parameters differ".into(), clause.span));
        }
        if clause.flags != first.flags {
            return Err(conflict("flags differ".into(), clause.span));
        }
    }

    let mut params = Vec::with_capacity(first.params.len());
    for position in 0..first.params.len() {
        params.push(param_type(name, position, clauses, table, &type_params)?);
    }

    let ret = resolve_ret(first, table, &type_params)?;
    for clause in &clauses[1..] {
        if resolve_ret(clause, table, &type_params)? != ret {
            return Err(conflict("return types differ".into(), clause.span));
        }
    }
    for ty in &params {
        table.check_computable(ty, first.span)?;
    }
    table.check_computable(&ret, first.span)?;

    let mut built = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let mut locals = LocalTable::new();
        let mut patterns = Vec::with_capacity(clause.params.len());
        for (param, ty) in clause.params.iter().zip(&params) {
            patterns.push(build_pattern(&param.pattern, param, ty, table, &mut locals, LocalKind::Param)?);
        }
        built.push(FunctionClause { patterns, body: None, locals, span: clause.span });
    }

    for (i, a) in built.iter().enumerate() {
        for (j, b) in built.iter().enumerate().skip(i + 1) {
            if a.patterns.iter().zip(&b.patterns).all(|(p, q)| p.same_shape(q)) {
                return Err(DispatchError::AmbiguousOverload {
                    function: name.to_string(),
                    first: i,
                    second: j,
                    span: b.span,
                });
            }
        }
    }

    let group = FunctionGroup {
        id,
        name: name.to_string(),
        type_params,
        params,
        ret,
        clauses: built,
        flags: GroupFlags {
            is_pure: first.flags.is_pure,
            is_template: first.flags.is_template,
            linkage: first.flags.linkage.clone(),
        },
        origin,
        span: first.span,
    };
    validate_linkage(&group, clauses, table)?;
    Ok(group)
}

fn resolve_ret(clause: &FnClause, table: &TypeTable, type_params: &[String]) -> Result<TypeExpr, DispatchError> {
    Ok(match &clause.ret_ty {
        Some(annot) => table.resolve(annot, type_params, clause.span)?,
        None => TypeExpr::Void,
    })
}

/// The type of one parameter position, taken from the first clause that
/// states it and checked against the others.
fn param_type(
    name: &str,
    position: usize,
    clauses: &[&FnClause],
    table: &TypeTable,
    type_params: &[String],
) -> Result<TypeExpr, DispatchError> {
    let mut found: Option<TypeExpr> = None;
    let mut has_literal = false;
    for clause in clauses {
        let param = &clause.params[position];
        let stated = match &param.pattern {
            ParamPattern::Bind { ty: Some(annot), .. } | ParamPattern::Wildcard { ty: Some(annot) } => {
                Some(table.resolve(annot, type_params, param.span)?)
            }
            ParamPattern::Variant { ty, variant, .. } => Some(variant_type(ty.as_deref(), variant, table, param.span)?),
            ParamPattern::Literal { .. } => {
                has_literal = true;
                None
            }
            _ => None,
        };
        match (&found, stated) {
            (None, Some(ty)) => found = Some(ty),
            (Some(existing), Some(ty)) if table.expand(existing, param.span)? != table.expand(&ty, param.span)? => {
                return Err(DispatchError::ClauseConflict {
                    function: name.to_string(),
                    reason: format!("parameter {} is {} in one clause and {} in another", position + 1, existing, ty),
                    span: param.span,
                });
            }
            _ => {}
        }
    }
    match found {
        Some(ty) => Ok(ty),
        None if has_literal => Ok(TypeExpr::i32()),
        None => Err(DispatchError::ClauseConflict {
            function: name.to_string(),
            reason: format!("no clause states the type of parameter {}", position + 1),
            span: clauses[0].span,
        }),
    }
}

/// The sum type a variant pattern names, looked up by variant when the
/// type is left out.
pub(crate) fn variant_type(ty: Option<&str>, variant: &str, table: &TypeTable, span: Span) -> Result<TypeExpr, DispatchError> {
    if let Some(name) = ty {
        let def = table.get(name).ok_or_else(|| kiln_types::TypeError::UndefinedType { name: name.to_string(), span })?;
        if !def.params.is_empty() {
            return Err(kiln_types::TypeError::TypeArity {
                name: name.to_string(),
                expected: def.params.len(),
                found: 0,
                span,
            }
            .into());
        }
        return Ok(TypeExpr::named(name));
    }
    match table.sums_with_variant(variant).as_slice() {
        [] => Err(DispatchError::UnknownVariant { variant: variant.to_string(), span }),
        [def] if def.params.is_empty() => Ok(TypeExpr::named(def.name.clone())),
        [def] => Err(kiln_types::TypeError::TypeArity {
            name: def.name.clone(),
            expected: def.params.len(),
            found: 0,
            span,
        }
        .into()),
        _ => Err(DispatchError::AmbiguousVariant { variant: variant.to_string(), span }),
    }
}

pub(crate) fn build_pattern(
    pattern: &ParamPattern,
    param: &Param,
    ty: &TypeExpr,
    table: &TypeTable,
    locals: &mut LocalTable,
    kind: LocalKind,
) -> Result<Pattern, DispatchError> {
    let span = param.span;
    let bind = |name: &str, ty: &TypeExpr, locals: &mut LocalTable| {
        locals.push(Local { name: name.to_string(), ty: ty.clone(), mutable: param.is_mut, kind })
    };
    Ok(match pattern {
        ParamPattern::Bind { name, .. } => Pattern::Bind { local: bind(name, ty, locals) },
        ParamPattern::Wildcard { .. } => Pattern::Wildcard,
        ParamPattern::Literal { name, value } => {
            match table.expand(ty, span)? {
                TypeExpr::Stack(k) if k.is_integer() => {}
                other => {
                    return Err(kiln_types::TypeError::Mismatch { expected: TypeExpr::i32(), found: other, span }.into())
                }
            }
            let binding = name.as_deref().map(|n| bind(n, ty, locals));
            Pattern::Literal { value: *value, binding }
        }
        ParamPattern::Variant { variant, inner, .. } => {
            let variants = match table.expand(ty, span)? {
                TypeExpr::Sum { variants } => variants,
                _ => return Err(DispatchError::UnknownVariant { variant: variant.clone(), span }),
            };
            let index = variants
                .iter()
                .position(|(v, _)| v == variant)
                .ok_or_else(|| DispatchError::UnknownVariant { variant: variant.clone(), span })?;
            let payload_ty = variants[index].1.clone();
            let inner = match inner {
                Some(inner) => {
                    let inner_param = Param { pattern: (**inner).clone(), is_mut: false, span };
                    Some(Box::new(build_pattern(inner, &inner_param, &payload_ty, table, locals, LocalKind::Binding)?))
                }
                None => None,
            };
            Pattern::Variant { variant: variant.clone(), index, inner }
        }
    })
}

/// Host-boundary rules for exported and imported functions.
fn validate_linkage(group: &FunctionGroup, clauses: &[&FnClause], table: &TypeTable) -> Result<(), DispatchError> {
    let host = |reason: &str| DispatchError::InvalidHostSignature {
        function: group.name.clone(),
        reason: reason.to_string(),
        span: group.span,
    };
    match &group.flags.linkage {
        Linkage::Internal => return Ok(()),
        Linkage::Export => {
            if group.flags.is_template {
                return Err(host("templates have no callable body to export"));
            }
        }
        Linkage::Import { .. } => {
            if clauses.len() > 1 || clauses.iter().any(|c| !c.body.is_empty()) {
                return Err(host("imported functions are a single clause without a body"));
            }
        }
    }
    if group.is_generic() {
        return Err(host("host functions cannot be generic"));
    }
    if clauses.iter().any(|c| c.params.iter().any(|p| !matches!(p.pattern, ParamPattern::Bind { .. }))) {
        return Err(host("host functions take plain parameters"));
    }
    for ty in &group.params {
        if !table.is_exportable(ty) {
            return Err(DispatchError::UnexportableType {
                function: group.name.clone(),
                ty: ty.clone(),
                span: group.span,
            });
        }
    }
    if !group.ret.is_void() && !table.is_exportable(&group.ret) {
        return Err(DispatchError::UnexportableType {
            function: group.name.clone(),
            ty: group.ret.clone(),
            span: group.span,
        });
    }
    Ok(())
}

/// Adds imported signatures to `program` and makes them visible.
pub(crate) fn import_module(
    decl: &ImportDecl,
    span: Span,
    interfaces: &[ModuleInterface],
    program: &mut HirProgram,
    globals: &mut GlobalScope,
) -> Result<(), DispatchError> {
    let iface = interfaces
        .iter()
        .find(|i| i.module == decl.module)
        .ok_or_else(|| DispatchError::UnknownModule { module: decl.module.clone(), span })?;

    let add = |program: &mut HirProgram, name: &str| -> Result<GroupId, DispatchError> {
        let func = iface
            .function(name)
            .ok_or_else(|| DispatchError::UnresolvedName { name: format!("{}.{}", decl.module, name), span })?;
        let id = program.reserve_group();
        let mut locals = LocalTable::new();
        let patterns = func
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| Pattern::Bind {
                local: locals.push(Local { name: format!("p{i}"), ty: ty.clone(), mutable: false, kind: LocalKind::Param }),
            })
            .collect();
        program.insert_group(FunctionGroup {
            id,
            name: func.name.clone(),
            type_params: Vec::new(),
            params: func.params.clone(),
            ret: func.ret.clone(),
            clauses: vec![FunctionClause { patterns, body: None, locals, span }],
            flags: GroupFlags {
                is_pure: false,
                is_template: false,
                linkage: Linkage::Import { module: decl.module.clone() },
            },
            origin: GroupOrigin::Imported { module: decl.module.clone() },
            span,
        });
        Ok(id)
    };

    let bring = |globals: &mut GlobalScope, local_name: String, id: GroupId| {
        if globals.functions.insert(local_name.clone(), id).is_some() {
            return Err(DispatchError::DuplicateName { name: local_name, span });
        }
        Ok(())
    };

    match &decl.kind {
        ImportKind::Namespace { alias } => {
            let mut members = HashMap::new();
            for func in &iface.functions {
                members.insert(func.name.clone(), add(program, &func.name)?);
            }
            let alias = alias.clone().unwrap_or_else(|| decl.module.clone());
            if globals.namespaces.insert(alias.clone(), members).is_some() {
                return Err(DispatchError::DuplicateName { name: alias, span });
            }
        }
        ImportKind::With(names) => {
            for item in names {
                let id = add(program, &item.name)?;
                bring(globals, item.alias.clone().unwrap_or_else(|| item.name.clone()), id)?;
            }
        }
        ImportKind::Without(excluded) => {
            for name in excluded {
                if iface.function(name).is_none() {
                    return Err(DispatchError::UnresolvedName { name: format!("{}.{}", decl.module, name), span });
                }
            }
            for func in &iface.functions {
                if !excluded.contains(&func.name) {
                    let id = add(program, &func.name)?;
                    bring(globals, func.name.clone(), id)?;
                }
            }
        }
    }
    Ok(())
}

/// Reads an annotation in a function body, with the frame's type
/// parameters in scope.
pub(crate) fn resolve_annot(
    table: &TypeTable,
    annot: &TypeAnnot,
    type_params: &[String],
    span: Span,
) -> Result<TypeExpr, DispatchError> {
    let ty = table.resolve(annot, type_params, span)?;
    table.check_computable(&ty, span)?;
    Ok(ty)
}
