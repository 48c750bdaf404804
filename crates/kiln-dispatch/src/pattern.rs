// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ordered clause selection and exhaustiveness.
//!
//! A call site knows something about each argument at compile time: an exact
//! literal, a variant, a set of excluded variants, or nothing. Clauses are
//! tried in declaration order against that knowledge. The first clause that
//! surely matches ends the search; clauses that may match before it become
//! runtime candidates.

use std::collections::BTreeSet;

use kiln_ast::Span;
use kiln_hir::Pattern;
use kiln_types::{TypeExpr, TypeTable};

/// What is known about a value at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Knowledge {
    Literal(i64),
    Variant { index: usize, payload: Box<Knowledge> },
    /// A sum value known not to be any of these variants.
    Excluding(Vec<usize>),
    Unknown,
}

impl Knowledge {
    pub fn variant(index: usize) -> Self {
        Knowledge::Variant { index, payload: Box::new(Knowledge::Unknown) }
    }
}

/// How a call site reaches its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Static(usize),
    /// Test these clauses in order; the last one needs no test.
    Runtime(Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Yes,
    No,
    Maybe,
}

/// The set of values a column can take.
enum Space {
    Literal(i64),
    Integer,
    Sum {
        variants: Vec<(String, TypeExpr)>,
        allowed: Vec<(usize, Knowledge)>,
    },
    Opaque,
}

pub struct Decider<'a> {
    table: &'a TypeTable,
}

impl<'a> Decider<'a> {
    pub fn new(table: &'a TypeTable) -> Self {
        Self { table }
    }

    /// Picks the clauses a call may reach, or `None` when some argument
    /// value is matched by no clause.
    pub fn decide(
        &self,
        clauses: &[&[Pattern]],
        knowledge: &[Knowledge],
        types: &[TypeExpr],
    ) -> Option<Decision> {
        let mut candidates = Vec::new();
        for (k, patterns) in clauses.iter().enumerate() {
            match self.clause_status(patterns, knowledge, types) {
                Status::No => {}
                Status::Yes if candidates.is_empty() => return Some(Decision::Static(k)),
                Status::Yes => {
                    candidates.push(k);
                    return Some(Decision::Runtime(candidates));
                }
                Status::Maybe => candidates.push(k),
            }
        }
        if candidates.is_empty() {
            return None;
        }
        let rows: Vec<Vec<Pattern>> = candidates.iter().map(|&k| clauses[k].to_vec()).collect();
        let cols: Vec<(Knowledge, TypeExpr)> =
            knowledge.iter().cloned().zip(types.iter().cloned()).collect();
        if !self.exhaustive(&rows, &cols) {
            return None;
        }
        if candidates.len() == 1 {
            Some(Decision::Static(candidates[0]))
        } else {
            Some(Decision::Runtime(candidates))
        }
    }

    fn clause_status(&self, patterns: &[Pattern], knowledge: &[Knowledge], types: &[TypeExpr]) -> Status {
        let mut all_yes = true;
        for ((pattern, know), ty) in patterns.iter().zip(knowledge).zip(types) {
            match self.status(pattern, know, ty) {
                Status::No => return Status::No,
                Status::Maybe => all_yes = false,
                Status::Yes => {}
            }
        }
        if all_yes {
            Status::Yes
        } else {
            Status::Maybe
        }
    }

    fn status(&self, pattern: &Pattern, know: &Knowledge, ty: &TypeExpr) -> Status {
        match pattern {
            Pattern::Bind { .. } | Pattern::Wildcard => Status::Yes,
            Pattern::Literal { value, .. } => match know {
                Knowledge::Literal(v) if v == value => Status::Yes,
                Knowledge::Literal(_) => Status::No,
                _ => Status::Maybe,
            },
            Pattern::Variant { index, inner, .. } => {
                let variants = self.variants(ty);
                match self.normalize(know, variants.as_deref()) {
                    Knowledge::Variant { index: known, payload } => {
                        if known != *index {
                            return Status::No;
                        }
                        match (inner, variants.as_ref().and_then(|v| v.get(*index))) {
                            (Some(inner), Some((_, payload_ty))) => {
                                self.status(inner, &payload, payload_ty)
                            }
                            _ => Status::Yes,
                        }
                    }
                    Knowledge::Excluding(excluded) if excluded.contains(index) => Status::No,
                    _ => Status::Maybe,
                }
            }
        }
    }

    /// A sum with every variant but one excluded is that variant.
    fn normalize(&self, know: &Knowledge, variants: Option<&[(String, TypeExpr)]>) -> Knowledge {
        if let (Knowledge::Excluding(excluded), Some(variants)) = (know, variants) {
            let remaining: Vec<usize> =
                (0..variants.len()).filter(|i| !excluded.contains(i)).collect();
            if let [only] = remaining.as_slice() {
                return Knowledge::variant(*only);
            }
        }
        know.clone()
    }

    fn variants(&self, ty: &TypeExpr) -> Option<Vec<(String, TypeExpr)>> {
        match self.table.expand(ty, Span::default()) {
            Ok(TypeExpr::Sum { variants }) => Some(variants),
            _ => None,
        }
    }

    fn space(&self, know: &Knowledge, ty: &TypeExpr) -> Space {
        let expanded = self.table.expand(ty, Span::default()).unwrap_or(TypeExpr::Never);
        match (know, expanded) {
            (Knowledge::Literal(v), _) => Space::Literal(*v),
            (Knowledge::Variant { index, payload }, TypeExpr::Sum { variants }) => Space::Sum {
                variants,
                allowed: vec![(*index, (**payload).clone())],
            },
            (Knowledge::Excluding(excluded), TypeExpr::Sum { variants }) => Space::Sum {
                allowed: (0..variants.len())
                    .filter(|i| !excluded.contains(i))
                    .map(|i| (i, Knowledge::Unknown))
                    .collect(),
                variants,
            },
            (_, TypeExpr::Sum { variants }) => Space::Sum {
                allowed: (0..variants.len()).map(|i| (i, Knowledge::Unknown)).collect(),
                variants,
            },
            (_, TypeExpr::Stack(kind)) if kind.is_integer() => Space::Integer,
            _ => Space::Opaque,
        }
    }

    /// Whether every value in the column spaces is matched by some row.
    fn exhaustive(&self, rows: &[Vec<Pattern>], cols: &[(Knowledge, TypeExpr)]) -> bool {
        let Some(((know, ty), rest)) = cols.split_first() else {
            return !rows.is_empty();
        };
        // A column of catch-alls needs no case split. This also keeps
        // recursive sum types from expanding forever.
        if rows.iter().all(|r| r[0].is_catch_all()) {
            let tails: Vec<Vec<Pattern>> = rows.iter().map(|r| r[1..].to_vec()).collect();
            return self.exhaustive(&tails, rest);
        }
        match self.space(know, ty) {
            Space::Literal(v) => {
                let tails = specialize_literal(rows, Some(v));
                self.exhaustive(&tails, rest)
            }
            Space::Integer => {
                let literals: BTreeSet<i64> = rows
                    .iter()
                    .filter_map(|r| match r[0] {
                        Pattern::Literal { value, .. } => Some(value),
                        _ => None,
                    })
                    .collect();
                literals
                    .into_iter()
                    .all(|v| self.exhaustive(&specialize_literal(rows, Some(v)), rest))
                    && self.exhaustive(&specialize_literal(rows, None), rest)
            }
            Space::Sum { variants, allowed } => allowed.into_iter().all(|(index, payload)| {
                let payload_ty = variants[index].1.clone();
                let specialized: Vec<Vec<Pattern>> = rows
                    .iter()
                    .filter_map(|r| {
                        let head = match &r[0] {
                            Pattern::Bind { .. } | Pattern::Wildcard => Pattern::Wildcard,
                            Pattern::Variant { index: i, inner, .. } if *i == index => inner
                                .as_deref()
                                .cloned()
                                .unwrap_or(Pattern::Wildcard),
                            _ => return None,
                        };
                        let mut row = vec![head];
                        row.extend_from_slice(&r[1..]);
                        Some(row)
                    })
                    .collect();
                let mut sub_cols = vec![(payload, payload_ty)];
                sub_cols.extend_from_slice(rest);
                self.exhaustive(&specialized, &sub_cols)
            }),
            Space::Opaque => {
                let tails = specialize_literal(rows, None);
                self.exhaustive(&tails, rest)
            }
        }
    }
}

/// Rows that match literal `v` (or, for `None`, any value no literal
/// names), with the first column removed.
fn specialize_literal(rows: &[Vec<Pattern>], v: Option<i64>) -> Vec<Vec<Pattern>> {
    rows.iter()
        .filter(|r| match (&r[0], v) {
            (p, _) if p.is_catch_all() => true,
            (Pattern::Literal { value, .. }, Some(v)) => *value == v,
            _ => false,
        })
        .map(|r| r[1..].to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ast::TypeDecl;
    use kiln_ast::{build::ty, TypeAnnot};
    use kiln_hir::LocalId;

    fn shapes() -> TypeTable {
        let decl = TypeDecl {
            name: "Shape".into(),
            type_params: vec![],
            body: TypeAnnot::Sum(vec![
                ("Circle".into(), Some(ty("f32"))),
                ("Square".into(), Some(ty("f32"))),
                ("Empty".into(), None),
            ]),
        };
        let mut table = TypeTable::new();
        table.declare_all([(&decl, Span::default())]).unwrap();
        table
    }

    fn bind() -> Pattern {
        Pattern::Bind { local: LocalId(0) }
    }

    fn lit(value: i64) -> Pattern {
        Pattern::Literal { value, binding: None }
    }

    fn var(index: usize) -> Pattern {
        let names = ["Circle", "Square", "Empty"];
        Pattern::Variant { variant: names[index].into(), index, inner: None }
    }

    #[test]
    fn first_matching_clause_wins() {
        let table = TypeTable::new();
        let d = Decider::new(&table);
        let u32_ty = [TypeExpr::u32()];
        let zero_then_any: [&[Pattern]; 2] = [&[lit(0)], &[bind()]];
        assert_eq!(
            d.decide(&zero_then_any, &[Knowledge::Literal(0)], &u32_ty),
            Some(Decision::Static(0))
        );
        assert_eq!(
            d.decide(&zero_then_any, &[Knowledge::Literal(4)], &u32_ty),
            Some(Decision::Static(1))
        );

        // Reordered: the catch-all now shadows the literal.
        let any_then_zero: [&[Pattern]; 2] = [&[bind()], &[lit(0)]];
        assert_eq!(
            d.decide(&any_then_zero, &[Knowledge::Literal(0)], &u32_ty),
            Some(Decision::Static(0))
        );
    }

    #[test]
    fn unknown_literal_argument_dispatches_at_runtime() {
        let table = TypeTable::new();
        let d = Decider::new(&table);
        let clauses: [&[Pattern]; 2] = [&[lit(0)], &[bind()]];
        assert_eq!(
            d.decide(&clauses, &[Knowledge::Unknown], &[TypeExpr::u32()]),
            Some(Decision::Runtime(vec![0, 1]))
        );
        let only_literals: [&[Pattern]; 2] = [&[lit(0)], &[lit(1)]];
        assert_eq!(d.decide(&only_literals, &[Knowledge::Unknown], &[TypeExpr::u32()]), None);
    }

    #[test]
    fn all_variants_close_a_sum() {
        let table = shapes();
        let d = Decider::new(&table);
        let shape = [TypeExpr::named("Shape")];
        let all: [&[Pattern]; 3] = [&[var(0)], &[var(1)], &[var(2)]];
        assert_eq!(
            d.decide(&all, &[Knowledge::Unknown], &shape),
            Some(Decision::Runtime(vec![0, 1, 2]))
        );
        let missing: [&[Pattern]; 2] = [&[var(0)], &[var(1)]];
        assert_eq!(d.decide(&missing, &[Knowledge::Unknown], &shape), None);
        // Excluding the missing variant makes the pair exhaustive.
        assert_eq!(
            d.decide(&missing, &[Knowledge::Excluding(vec![2])], &shape),
            Some(Decision::Runtime(vec![0, 1]))
        );
        assert_eq!(
            d.decide(&missing, &[Knowledge::variant(1)], &shape),
            Some(Decision::Static(1))
        );
    }

    #[test]
    fn trailing_catch_all_is_enough() {
        let table = shapes();
        let d = Decider::new(&table);
        let clauses: [&[Pattern]; 2] = [&[var(0)], &[Pattern::Wildcard]];
        assert_eq!(
            d.decide(&clauses, &[Knowledge::Unknown], &[TypeExpr::named("Shape")]),
            Some(Decision::Runtime(vec![0, 1]))
        );
        assert_eq!(
            d.decide(&clauses, &[Knowledge::variant(2)], &[TypeExpr::named("Shape")]),
            Some(Decision::Static(1))
        );
    }

    #[test]
    fn second_column_decides_after_first_is_known() {
        let table = TypeTable::new();
        let d = Decider::new(&table);
        let types = [TypeExpr::i32(), TypeExpr::i32()];
        let clauses: [&[Pattern]; 2] = [&[bind(), lit(0)], &[bind(), bind()]];
        assert_eq!(
            d.decide(&clauses, &[Knowledge::Literal(5), Knowledge::Literal(0)], &types),
            Some(Decision::Static(0))
        );
        assert_eq!(
            d.decide(&clauses, &[Knowledge::Unknown, Knowledge::Literal(3)], &types),
            Some(Decision::Static(1))
        );
    }
}
