// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Which groups each group refers to.

use std::collections::{BTreeMap, BTreeSet};

use kiln_hir::visit;
use kiln_hir::{GroupId, HirExprKind, HirProgram};

/// References between groups through calls and function values.
#[derive(Debug, Default)]
pub(crate) struct CallGraph {
    edges: BTreeMap<GroupId, BTreeSet<GroupId>>,
}

impl CallGraph {
    pub(crate) fn build(program: &HirProgram) -> Self {
        let mut edges: BTreeMap<GroupId, BTreeSet<GroupId>> = BTreeMap::new();
        for group in program.groups() {
            let out = edges.entry(group.id).or_default();
            for body in group.clauses.iter().filter_map(|c| c.body.as_ref()) {
                visit::walk_expr(body, &mut |e| match &e.kind {
                    HirExprKind::Call { target, .. } => {
                        out.insert(target.group());
                    }
                    HirExprKind::FnRef(r) => {
                        out.insert(r.group);
                    }
                    HirExprKind::FnHandle { group, .. } => {
                        out.insert(*group);
                    }
                    _ => {}
                });
            }
        }
        Self { edges }
    }

    /// Whether a path of at least one edge leads from `from` to `to`.
    pub(crate) fn reaches(&self, from: GroupId, to: GroupId) -> bool {
        self.reaches_within(from, to, |_| true)
    }

    /// Like [`reaches`](Self::reaches), stepping only onto groups `allowed`
    /// accepts.
    pub(crate) fn reaches_within(&self, from: GroupId, to: GroupId, allowed: impl Fn(GroupId) -> bool) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<GroupId> = self.edges.get(&from).into_iter().flatten().copied().collect();
        while let Some(g) = stack.pop() {
            if !allowed(g) {
                continue;
            }
            if g == to {
                return true;
            }
            if seen.insert(g) {
                stack.extend(self.edges.get(&g).into_iter().flatten().copied());
            }
        }
        false
    }

    pub(crate) fn is_recursive(&self, group: GroupId) -> bool {
        self.reaches(group, group)
    }

    /// Groups referred to from some other group.
    pub(crate) fn referenced_elsewhere(&self) -> BTreeSet<GroupId> {
        self.edges
            .iter()
            .flat_map(|(from, to)| to.iter().filter(move |t| *t != from).copied())
            .collect()
    }
}
