// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Instances of groups with concrete type arguments.
//!
//! Reachability drives instantiation: every concrete group is a root, and a
//! generic group is instantiated only for the type arguments some lowered
//! call uses.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write;

use kiln_hir::{CallTarget, FunctionGroup, GroupId};
use kiln_types::TypeExpr;

use crate::ir::FuncId;

/// Which function of a group an instance stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Part {
    /// A group with one clause.
    Whole,
    /// One clause of a multi-clause group, called when the clause is known.
    Clause(usize),
    /// Tests the clauses of a multi-clause group in order at run time.
    Dispatcher,
}

impl Part {
    pub(crate) fn for_call(group: &FunctionGroup, target: &CallTarget) -> Part {
        match target {
            _ if group.clauses.len() <= 1 => Part::Whole,
            CallTarget::Clause { clause, .. } => Part::Clause(*clause),
            CallTarget::Dispatch { .. } => Part::Dispatcher,
        }
    }

    /// The function standing for the whole group.
    pub(crate) fn for_value(group: &FunctionGroup) -> Part {
        if group.clauses.len() <= 1 {
            Part::Whole
        } else {
            Part::Dispatcher
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Instance {
    pub(crate) group: GroupId,
    pub(crate) args: Vec<TypeExpr>,
    pub(crate) part: Part,
}

impl Instance {
    /// `name`, `name<u32,i64>`, `name#1`.
    pub(crate) fn name(&self, group: &FunctionGroup) -> String {
        let mut name = group.name.clone();
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            let _ = write!(name, "<{}>", args.join(","));
        }
        if let Part::Clause(k) = self.part {
            let _ = write!(name, "#{k}");
        }
        name
    }
}

/// Function ids handed out so far, and those still to be lowered.
#[derive(Debug, Default)]
pub(crate) struct Instances {
    ids: HashMap<Instance, FuncId>,
    queue: VecDeque<(FuncId, Instance)>,
    next: u32,
    pub(crate) indirect: Vec<FuncId>,
}

impl Instances {
    pub(crate) fn request(&mut self, instance: Instance) -> FuncId {
        if let Some(id) = self.ids.get(&instance) {
            return *id;
        }
        let id = FuncId(self.next);
        self.next += 1;
        self.ids.insert(instance.clone(), id);
        self.queue.push_back((id, instance));
        id
    }

    /// Next instance to lower. Instances come out in id order.
    pub(crate) fn next(&mut self) -> Option<(FuncId, Instance)> {
        self.queue.pop_front()
    }

    /// Table index for `id`, registering it on first use.
    pub(crate) fn handle(&mut self, id: FuncId) -> u32 {
        let index = match self.indirect.iter().position(|f| *f == id) {
            Some(i) => i,
            None => {
                self.indirect.push(id);
                self.indirect.len() - 1
            }
        };
        index as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ast::Span;
    use kiln_hir::{GroupFlags, GroupOrigin};

    fn group(name: &str) -> FunctionGroup {
        FunctionGroup {
            id: GroupId(0),
            name: name.to_string(),
            type_params: vec!["T".to_string(), "U".to_string()],
            params: Vec::new(),
            ret: TypeExpr::Void,
            clauses: Vec::new(),
            flags: GroupFlags::default(),
            origin: GroupOrigin::Source,
            span: Span::default(),
        }
    }

    #[test]
    fn instance_names_carry_type_arguments_and_clause() {
        let g = group("pair");
        let instance = Instance { group: g.id, args: vec![TypeExpr::u32(), TypeExpr::i32()], part: Part::Clause(1) };
        assert_eq!(instance.name(&g), "pair<u32,i32>#1");
        let whole = Instance { group: g.id, args: Vec::new(), part: Part::Whole };
        assert_eq!(whole.name(&g), "pair");
    }

    #[test]
    fn requests_are_deduplicated() {
        let mut instances = Instances::default();
        let a = Instance { group: GroupId(3), args: Vec::new(), part: Part::Whole };
        let b = Instance { group: GroupId(3), args: vec![TypeExpr::u32()], part: Part::Whole };
        let first = instances.request(a.clone());
        assert_eq!(instances.request(b), FuncId(1));
        assert_eq!(instances.request(a), first);
        assert_eq!(instances.handle(FuncId(1)), 0);
        assert_eq!(instances.handle(first), 1);
        assert_eq!(instances.handle(FuncId(1)), 0);
        assert_eq!(instances.next().map(|(id, _)| id), Some(FuncId(0)));
    }
}
