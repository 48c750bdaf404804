// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Function groups and the program that owns them.

use kiln_ast::{Linkage, Span};
use kiln_types::{TypeExpr, TypeTable};

use crate::expr::{HirExpr, Pattern};
use crate::{GroupId, LocalId};

/// One module after resolution.
///
/// Groups are kept sorted by id; new groups get fresh, larger ids so a
/// stage can append while it walks.
#[derive(Debug, Clone, PartialEq)]
pub struct HirProgram {
    pub module: String,
    pub types: TypeTable,
    groups: Vec<FunctionGroup>,
    next_group: u32,
}

impl HirProgram {
    pub fn new(module: impl Into<String>, types: TypeTable) -> Self {
        Self { module: module.into(), types, groups: Vec::new(), next_group: 0 }
    }

    pub fn reserve_group(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    pub fn insert_group(&mut self, group: FunctionGroup) {
        match self.groups.binary_search_by_key(&group.id, |g| g.id) {
            Ok(i) => self.groups[i] = group,
            Err(i) => self.groups.insert(i, group),
        }
    }

    pub fn group(&self, id: GroupId) -> Option<&FunctionGroup> {
        self.groups.binary_search_by_key(&id, |g| g.id).ok().map(|i| &self.groups[i])
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut FunctionGroup> {
        match self.groups.binary_search_by_key(&id, |g| g.id) {
            Ok(i) => Some(&mut self.groups[i]),
            Err(_) => None,
        }
    }

    pub fn take_group(&mut self, id: GroupId) -> Option<FunctionGroup> {
        match self.groups.binary_search_by_key(&id, |g| g.id) {
            Ok(i) => Some(self.groups.remove(i)),
            Err(_) => None,
        }
    }

    pub fn groups(&self) -> &[FunctionGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut FunctionGroup> {
        self.groups.iter_mut()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.iter().map(|g| g.id).collect()
    }

    pub fn retain_groups(&mut self, keep: impl FnMut(&FunctionGroup) -> bool) {
        self.groups.retain(keep);
    }

    /// Top-level group by source name.
    pub fn find(&self, name: &str) -> Option<&FunctionGroup> {
        self.groups.iter().find(|g| g.name == name && !g.is_nested())
    }

    pub fn name_of(&self, id: GroupId) -> &str {
        self.group(id).map(|g| g.name.as_str()).unwrap_or("<removed>")
    }
}

/// Every clause sharing one name, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionGroup {
    pub id: GroupId,
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<TypeExpr>,
    pub ret: TypeExpr,
    pub clauses: Vec<FunctionClause>,
    pub flags: GroupFlags,
    pub origin: GroupOrigin,
    pub span: Span,
}

impl FunctionGroup {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn is_template(&self) -> bool {
        self.flags.is_template
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.origin, GroupOrigin::Nested { .. })
    }

    pub fn is_extern(&self) -> bool {
        matches!(self.flags.linkage, Linkage::Import { .. })
    }

    pub fn is_exported(&self) -> bool {
        self.flags.linkage == Linkage::Export
    }

    /// One parameter, pure, not a template.
    pub fn is_getter(&self) -> bool {
        self.params.len() == 1 && self.flags.is_pure && !self.flags.is_template
    }

    /// The group's value type.
    pub fn signature(&self) -> TypeExpr {
        TypeExpr::function(self.params.clone(), self.ret.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFlags {
    pub is_pure: bool,
    pub is_template: bool,
    pub linkage: Linkage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOrigin {
    Source,
    /// Declared inside `clause` of `parent`.
    Nested { parent: GroupId, clause: usize },
    Lifted { parent: GroupId },
    /// Copy of `from` with a function-valued parameter fixed.
    Specialized { from: GroupId },
    /// Signature published by another module.
    Imported { module: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionClause {
    pub patterns: Vec<Pattern>,
    /// `None` for functions provided by the host or another module.
    pub body: Option<HirExpr>,
    pub locals: LocalTable,
    pub span: Span,
}

/// Identifies the declaration of a binding across nested functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingRef {
    pub group: GroupId,
    pub clause: usize,
    pub local: LocalId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: TypeExpr,
    pub mutable: bool,
    pub kind: LocalKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Param,
    Let,
    /// Bound by a pattern inside a parameter or match arm.
    Binding,
    /// Stands for a binding of an enclosing function.
    Captured(BindingRef),
    Temp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalTable {
    locals: Vec<Local>,
}

impl LocalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, local: Local) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(local);
        id
    }

    pub fn get(&self, id: LocalId) -> Option<&Local> {
        self.locals.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: LocalId) -> Option<&mut Local> {
        self.locals.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &Local)> {
        self.locals.iter().enumerate().map(|(i, l)| (LocalId(i as u32), l))
    }

    /// The local standing for `binding`, if this clause captured it.
    pub fn captured(&self, binding: BindingRef) -> Option<LocalId> {
        self.iter()
            .find(|(_, l)| l.kind == LocalKind::Captured(binding))
            .map(|(id, _)| id)
    }
}
