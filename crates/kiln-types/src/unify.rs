// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Structural unification with one-directional coercions.

use std::collections::BTreeMap;

use kiln_ast::Span;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::table::TypeTable;
use crate::ty::{Lifetime, TypeExpr};

/// Answers `outlives` questions for borrow lifetimes.
///
/// Implemented by the borrow checker over the regions of one function body.
pub trait RegionOrder {
    /// Whether a borrow living for `longer` may be used where `shorter` is
    /// required.
    fn outlives(&self, longer: Lifetime, shorter: Lifetime) -> bool;
}

/// Type-variable bindings for one call site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Substitution {
    map: BTreeMap<String, TypeExpr>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `params[i]` to `args[i]`.
    pub fn from_pairs(params: &[String], args: &[TypeExpr]) -> Self {
        Self {
            map: params.iter().cloned().zip(args.iter().cloned()).collect(),
        }
    }

    pub fn get(&self, var: &str) -> Option<&TypeExpr> {
        self.map.get(var)
    }

    pub fn insert(&mut self, var: String, ty: TypeExpr) {
        self.map.insert(var, ty);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypeExpr)> {
        self.map.iter()
    }

    /// Replaces bound variables. Unbound variables are left in place and
    /// results are not substituted again.
    pub fn apply(&self, ty: &TypeExpr) -> TypeExpr {
        if self.map.is_empty() {
            return ty.clone();
        }
        ty.map(&|t| match t {
            TypeExpr::TypeVar(v) => self.map.get(v).cloned(),
            _ => None,
        })
    }

    /// Applies `outer` to every bound type; used when a generic body that
    /// calls another generic function is itself instantiated.
    pub fn then(&self, outer: &Substitution) -> Substitution {
        Substitution {
            map: self.map.iter().map(|(k, v)| (k.clone(), outer.apply(v))).collect(),
        }
    }

    /// Arguments for `params` in order, or the first unbound name.
    pub fn args_for(&self, params: &[String]) -> Result<Vec<TypeExpr>, String> {
        params
            .iter()
            .map(|p| self.map.get(p).cloned().ok_or_else(|| p.clone()))
            .collect()
    }
}

/// Unifies an expected type against a found type.
///
/// Type variables on the expected side bind into the substitution; those on
/// the found side are rigid. `&mut T` is accepted where `&T` is expected.
pub struct Unifier<'a> {
    table: &'a TypeTable,
    regions: Option<&'a dyn RegionOrder>,
    subst: Substitution,
}

impl<'a> Unifier<'a> {
    pub fn new(table: &'a TypeTable) -> Self {
        Self { table, regions: None, subst: Substitution::new() }
    }

    /// A unifier that also checks borrow lifetimes.
    pub fn with_regions(table: &'a TypeTable, regions: &'a dyn RegionOrder) -> Self {
        Self { table, regions: Some(regions), subst: Substitution::new() }
    }

    pub fn with_substitution(mut self, subst: Substitution) -> Self {
        self.subst = subst;
        self
    }

    pub fn substitution(&self) -> &Substitution {
        &self.subst
    }

    pub fn into_substitution(self) -> Substitution {
        self.subst
    }

    /// Returns the unified type: `expected` under the substitution, or
    /// `found` when `expected` is `never`.
    pub fn unify(
        &mut self,
        expected: &TypeExpr,
        found: &TypeExpr,
        span: Span,
    ) -> Result<TypeExpr, TypeError> {
        self.unify_inner(expected, found, true, span)?;
        if expected.is_never() {
            return Ok(found.clone());
        }
        Ok(self.subst.apply(expected))
    }

    /// Common type of two branches; `never` yields to the other side.
    pub fn join(&mut self, a: &TypeExpr, b: &TypeExpr, span: Span) -> Result<TypeExpr, TypeError> {
        if a.is_never() {
            return Ok(b.clone());
        }
        if b.is_never() {
            return Ok(a.clone());
        }
        match self.unify(a, b, span) {
            Ok(ty) => Ok(ty),
            // `&mut T` on the left, `&T` on the right.
            Err(_) => self.unify(b, a, span),
        }
    }

    fn mismatch(expected: &TypeExpr, found: &TypeExpr, span: Span) -> TypeError {
        TypeError::Mismatch { expected: expected.clone(), found: found.clone(), span }
    }

    fn unify_inner(
        &mut self,
        expected: &TypeExpr,
        found: &TypeExpr,
        bind: bool,
        span: Span,
    ) -> Result<(), TypeError> {
        use TypeExpr::*;

        if expected.is_never() || found.is_never() {
            return Ok(());
        }
        if let TypeVar(var) = expected {
            if bind {
                if let Some(bound) = self.subst.get(var).cloned() {
                    return self.unify_inner(&bound, found, false, span);
                }
                self.subst.insert(var.clone(), found.clone());
                return Ok(());
            }
        }

        match (expected, found) {
            (Void, Void) => Ok(()),
            (Stack(a), Stack(b)) if a == b => Ok(()),
            (Heap(a), Heap(b)) if a == b => Ok(()),
            (TypeVar(a), TypeVar(b)) if a == b => Ok(()),

            (
                Borrow { mutable: m1, lifetime: l1, inner: i1 },
                Borrow { mutable: m2, lifetime: l2, inner: i2 },
            )
            | (
                FatBorrow { mutable: m1, lifetime: l1, inner: i1 },
                FatBorrow { mutable: m2, lifetime: l2, inner: i2 },
            ) => {
                if *m1 && !*m2 {
                    return Err(Self::mismatch(expected, found, span));
                }
                self.check_lifetime(*l1, *l2, span)?;
                self.unify_inner(i1, i2, bind, span)
            }
            (RawPointer { mutable: m1, inner: i1 }, RawPointer { mutable: m2, inner: i2 })
            | (FatPointer { mutable: m1, inner: i1 }, FatPointer { mutable: m2, inner: i2 }) => {
                if *m1 && !*m2 {
                    return Err(Self::mismatch(expected, found, span));
                }
                self.unify_inner(i1, i2, bind, span)
            }

            (Product { fields: a }, Product { fields: b }) => {
                if a.len() != b.len() {
                    return Err(Self::mismatch(expected, found, span));
                }
                for ((na, ta), (nb, tb)) in a.iter().zip(b) {
                    if let (Some(na), Some(nb)) = (na, nb) {
                        if na != nb {
                            return Err(Self::mismatch(expected, found, span));
                        }
                    }
                    self.unify_inner(ta, tb, bind, span)?;
                }
                Ok(())
            }
            (Packed { fields: a }, Packed { fields: b }) if a == b => Ok(()),
            (Sum { variants: a }, Sum { variants: b })
            | (Union { members: a }, Union { members: b }) => {
                if a.len() != b.len() {
                    return Err(Self::mismatch(expected, found, span));
                }
                for ((na, ta), (nb, tb)) in a.iter().zip(b) {
                    if na != nb {
                        return Err(Self::mismatch(expected, found, span));
                    }
                    self.unify_inner(ta, tb, bind, span)?;
                }
                Ok(())
            }
            (Exponential { domain: d1, codomain: c1 }, Exponential { domain: d2, codomain: c2 }) => {
                self.unify_inner(d1, d2, bind, span)?;
                self.unify_inner(c1, c2, bind, span)
            }

            (Named { name: n1, args: a1 }, Named { name: n2, args: a2 }) if n1 == n2 => {
                if a1.len() != a2.len() {
                    return Err(Self::mismatch(expected, found, span));
                }
                for (x, y) in a1.iter().zip(a2) {
                    self.unify_inner(x, y, bind, span)?;
                }
                Ok(())
            }
            (Named { .. }, _) => {
                let expanded = self.table.expand(expected, span)?;
                self.unify_inner(&expanded, found, bind, span)
                    .map_err(|_| Self::mismatch(expected, found, span))
            }
            (_, Named { .. }) => {
                let expanded = self.table.expand(found, span)?;
                self.unify_inner(expected, &expanded, bind, span)
                    .map_err(|_| Self::mismatch(expected, found, span))
            }

            _ => Err(Self::mismatch(expected, found, span)),
        }
    }

    fn check_lifetime(&self, required: Lifetime, actual: Lifetime, span: Span) -> Result<(), TypeError> {
        if required == Lifetime::Erased || actual == Lifetime::Erased || required == actual {
            return Ok(());
        }
        match self.regions {
            Some(order) if !order.outlives(actual, required) => Err(TypeError::LifetimeMismatch {
                expected: required,
                found: actual,
                span,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{RegionId, StackKind};

    fn sp() -> Span {
        Span::default()
    }

    #[test]
    fn never_unifies_with_anything() {
        let table = TypeTable::new();
        let mut u = Unifier::new(&table);
        assert_eq!(u.unify(&TypeExpr::u32(), &TypeExpr::Never, sp()).unwrap(), TypeExpr::u32());
        assert_eq!(u.unify(&TypeExpr::Never, &TypeExpr::u32(), sp()).unwrap(), TypeExpr::u32());
        assert_eq!(u.join(&TypeExpr::Never, &TypeExpr::i32(), sp()).unwrap(), TypeExpr::i32());
    }

    #[test]
    fn signed_and_unsigned_do_not_unify() {
        let table = TypeTable::new();
        let mut u = Unifier::new(&table);
        let err = u.unify(&TypeExpr::u32(), &TypeExpr::i32(), sp()).unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
        assert!(u
            .unify(&TypeExpr::Stack(StackKind::U64), &TypeExpr::Stack(StackKind::I64), sp())
            .is_err());
    }

    #[test]
    fn type_vars_bind_on_expected_side() {
        let table = TypeTable::new();
        let mut u = Unifier::new(&table);
        let t = TypeExpr::TypeVar("T".into());
        u.unify(&t, &TypeExpr::u32(), sp()).unwrap();
        assert_eq!(u.substitution().get("T"), Some(&TypeExpr::u32()));
        // Second use must agree with the first binding.
        assert!(u.unify(&t, &TypeExpr::i32(), sp()).is_err());
        // Found-side variables are rigid.
        assert!(u.unify(&TypeExpr::u32(), &TypeExpr::TypeVar("U".into()), sp()).is_err());
    }

    #[test]
    fn mutable_borrow_coerces_to_shared() {
        let table = TypeTable::new();
        let mut u = Unifier::new(&table);
        let shared = TypeExpr::borrow(false, TypeExpr::u32());
        let exclusive = TypeExpr::borrow(true, TypeExpr::u32());
        assert!(u.unify(&shared, &exclusive, sp()).is_ok());
        assert!(u.unify(&exclusive, &shared, sp()).is_err());
    }

    struct Nested;

    // r0 is the outer block, r1 nested inside it.
    impl RegionOrder for Nested {
        fn outlives(&self, longer: Lifetime, shorter: Lifetime) -> bool {
            let depth = |l: Lifetime| match l {
                Lifetime::Static => 0,
                Lifetime::Param => 1,
                Lifetime::Region(RegionId(r)) => 2 + r,
                Lifetime::Erased => 0,
            };
            depth(longer) <= depth(shorter)
        }
    }

    #[test]
    fn lifetimes_coerce_longer_to_shorter_only() {
        let table = TypeTable::new();
        let order = Nested;
        let mut u = Unifier::with_regions(&table, &order);
        let at = |l| TypeExpr::Borrow { mutable: false, lifetime: l, inner: Box::new(TypeExpr::u32()) };
        let outer = at(Lifetime::Region(RegionId(0)));
        let inner = at(Lifetime::Region(RegionId(1)));
        assert!(u.unify(&inner, &outer, sp()).is_ok());
        assert!(matches!(
            u.unify(&outer, &inner, sp()),
            Err(TypeError::LifetimeMismatch { .. })
        ));
        assert!(u.unify(&at(Lifetime::Param), &inner, sp()).is_err());
        assert!(u.unify(&at(Lifetime::Erased), &inner, sp()).is_ok());
    }

    #[test]
    fn substitution_composes() {
        let inner = Substitution::from_pairs(&["T".into()], &[TypeExpr::TypeVar("U".into())]);
        let outer = Substitution::from_pairs(&["U".into()], &[TypeExpr::u32()]);
        assert_eq!(inner.then(&outer).get("T"), Some(&TypeExpr::u32()));
        assert_eq!(inner.args_for(&["T".into(), "V".into()]), Err("V".to_string()));
    }
}
