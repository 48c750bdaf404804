// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Declared types and annotation resolution.

use std::collections::{BTreeMap, BTreeSet};

use kiln_ast::{Span, TypeAnnot, TypeDecl};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ty::{HeapKind, Lifetime, PackedKind, StackKind, TypeExpr};

/// Packed fields must total strictly fewer bits than this.
pub const PACKED_BIT_LIMIT: u32 = 64;

/// Generic declarations nest at most this deep before expansion gives up.
const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: TypeExpr,
    pub span: Span,
}

/// All type declarations of one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTable {
    defs: BTreeMap<String, TypeDef>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every declaration, then resolves the bodies.
    ///
    /// Names are registered first so declarations may refer to each other
    /// in any order.
    pub fn declare_all<'a>(
        &mut self,
        decls: impl IntoIterator<Item = (&'a TypeDecl, Span)>,
    ) -> Result<(), TypeError> {
        let decls: Vec<_> = decls.into_iter().collect();
        for (decl, span) in &decls {
            if self.defs.contains_key(&decl.name) || is_builtin(&decl.name) {
                return Err(TypeError::DuplicateType { name: decl.name.clone(), span: *span });
            }
            self.defs.insert(
                decl.name.clone(),
                TypeDef {
                    name: decl.name.clone(),
                    params: decl.type_params.clone(),
                    body: TypeExpr::Void,
                    span: *span,
                },
            );
        }
        for (decl, span) in &decls {
            let body = self.resolve_in(&decl.body, &decl.type_params, Some(&decl.name), *span)?;
            if let Some(def) = self.defs.get_mut(&decl.name) {
                def.body = body;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.defs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.defs.values()
    }

    /// Resolves an annotation; `type_params` are the names in scope as
    /// type variables.
    pub fn resolve(
        &self,
        annot: &TypeAnnot,
        type_params: &[String],
        span: Span,
    ) -> Result<TypeExpr, TypeError> {
        self.resolve_in(annot, type_params, None, span)
    }

    fn resolve_in(
        &self,
        annot: &TypeAnnot,
        type_params: &[String],
        owner: Option<&str>,
        span: Span,
    ) -> Result<TypeExpr, TypeError> {
        let sub = |a: &TypeAnnot| self.resolve_in(a, type_params, owner, span);
        Ok(match annot {
            TypeAnnot::Named { name, args } => {
                if args.is_empty() {
                    if let Some(builtin) = builtin(name) {
                        return Ok(builtin);
                    }
                    if type_params.iter().any(|p| p == name) {
                        return Ok(TypeExpr::TypeVar(name.clone()));
                    }
                }
                let def = self
                    .defs
                    .get(name)
                    .ok_or_else(|| TypeError::UndefinedType { name: name.clone(), span })?;
                if def.params.len() != args.len() {
                    return Err(TypeError::TypeArity {
                        name: name.clone(),
                        expected: def.params.len(),
                        found: args.len(),
                        span,
                    });
                }
                TypeExpr::Named {
                    name: name.clone(),
                    args: args.iter().map(sub).collect::<Result<_, _>>()?,
                }
            }
            TypeAnnot::Borrow { mutable, inner } => TypeExpr::Borrow {
                mutable: *mutable,
                lifetime: Lifetime::Erased,
                inner: Box::new(sub(inner)?),
            },
            TypeAnnot::FatBorrow { mutable, inner } => TypeExpr::FatBorrow {
                mutable: *mutable,
                lifetime: Lifetime::Erased,
                inner: Box::new(sub(inner)?),
            },
            TypeAnnot::Pointer { mutable, inner } => {
                TypeExpr::RawPointer { mutable: *mutable, inner: Box::new(sub(inner)?) }
            }
            TypeAnnot::FatPointer { mutable, inner } => {
                TypeExpr::FatPointer { mutable: *mutable, inner: Box::new(sub(inner)?) }
            }
            TypeAnnot::Product(fields) => TypeExpr::Product {
                fields: fields
                    .iter()
                    .map(|(n, t)| Ok((n.clone(), sub(t)?)))
                    .collect::<Result<_, TypeError>>()?,
            },
            TypeAnnot::Packed(fields) => {
                let mut resolved = Vec::with_capacity(fields.len());
                for (name, kind) in fields {
                    let kind = PackedKind::from_name(kind)
                        .ok_or_else(|| TypeError::InvalidPackedKind { kind: kind.clone(), span })?;
                    resolved.push((name.clone(), kind));
                }
                let bits: u32 = resolved.iter().map(|(_, k)| k.bits()).sum();
                if bits >= PACKED_BIT_LIMIT {
                    return Err(TypeError::PackedSizeExceeded {
                        name: owner.unwrap_or("packed").to_string(),
                        bits,
                        span,
                    });
                }
                TypeExpr::Packed { fields: resolved }
            }
            TypeAnnot::Sum(variants) => TypeExpr::Sum {
                variants: variants
                    .iter()
                    .map(|(n, p)| {
                        let payload = match p {
                            Some(p) => sub(p)?,
                            None => TypeExpr::Void,
                        };
                        Ok((n.clone(), payload))
                    })
                    .collect::<Result<_, TypeError>>()?,
            },
            TypeAnnot::Union(members) => TypeExpr::Union {
                members: members
                    .iter()
                    .map(|(n, t)| Ok((n.clone(), sub(t)?)))
                    .collect::<Result<_, TypeError>>()?,
            },
            TypeAnnot::Function { params, ret } => TypeExpr::function(
                params.iter().map(sub).collect::<Result<_, _>>()?,
                sub(ret)?,
            ),
        })
    }

    /// Replaces a top-level `Named` with its declared body.
    ///
    /// Other types come back unchanged. Follows aliases of aliases.
    pub fn expand(&self, ty: &TypeExpr, span: Span) -> Result<TypeExpr, TypeError> {
        let mut cur = ty.clone();
        for _ in 0..MAX_EXPANSION_DEPTH {
            let TypeExpr::Named { name, args } = &cur else {
                return Ok(cur);
            };
            let def = self
                .defs
                .get(name)
                .ok_or_else(|| TypeError::UndefinedType { name: name.clone(), span })?;
            cur = instantiate(&def.body, &def.params, args);
        }
        let name = match ty {
            TypeExpr::Named { name, .. } => name.clone(),
            other => other.to_string(),
        };
        Err(TypeError::InfiniteSize { name, span })
    }

    /// Expands and auto-dereferences through borrows and raw pointers.
    pub fn expand_deref(&self, ty: &TypeExpr, span: Span) -> Result<TypeExpr, TypeError> {
        let mut cur = self.expand(ty, span)?;
        for _ in 0..MAX_EXPANSION_DEPTH {
            match cur {
                TypeExpr::Borrow { inner, .. } | TypeExpr::RawPointer { inner, .. } => {
                    cur = self.expand(&inner, span)?;
                }
                other => return Ok(other),
            }
        }
        Ok(cur)
    }

    /// Declared sum types with a variant called `variant`, in name order.
    pub fn sums_with_variant(&self, variant: &str) -> Vec<&TypeDef> {
        self.defs
            .values()
            .filter(|def| match &def.body {
                TypeExpr::Sum { variants } => variants.iter().any(|(v, _)| v == variant),
                _ => false,
            })
            .collect()
    }

    /// Rejects heap kinds in a computed position.
    pub fn check_computable(&self, ty: &TypeExpr, span: Span) -> Result<(), TypeError> {
        match self.expand(ty, span)? {
            TypeExpr::Heap(kind) => Err(TypeError::StorageOnly { ty: TypeExpr::Heap(kind), span }),
            _ => Ok(()),
        }
    }

    /// True when a value of `ty` may hold a borrow, looking through
    /// declared types. Type variables count as holding one.
    pub fn contains_borrow(&self, ty: &TypeExpr) -> bool {
        self.holds_borrow(ty, &mut BTreeSet::new())
    }

    fn holds_borrow(&self, ty: &TypeExpr, seen: &mut BTreeSet<String>) -> bool {
        match ty {
            TypeExpr::Borrow { .. } | TypeExpr::FatBorrow { .. } | TypeExpr::TypeVar(_) => true,
            TypeExpr::Product { fields } => fields.iter().any(|(_, t)| self.holds_borrow(t, seen)),
            TypeExpr::Sum { variants } => variants.iter().any(|(_, t)| self.holds_borrow(t, seen)),
            TypeExpr::Union { members } => members.iter().any(|(_, t)| self.holds_borrow(t, seen)),
            TypeExpr::Named { name, args } => {
                // A type already being looked at adds nothing new.
                if !seen.insert(ty.to_string()) {
                    return false;
                }
                match self.defs.get(name) {
                    Some(def) => self.holds_borrow(&instantiate(&def.body, &def.params, args), seen),
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Whether `ty` may appear in a host import or export signature.
    pub fn is_exportable(&self, ty: &TypeExpr) -> bool {
        match self.expand(ty, Span::default()) {
            Ok(
                TypeExpr::Stack(_)
                | TypeExpr::Borrow { .. }
                | TypeExpr::FatBorrow { .. }
                | TypeExpr::RawPointer { .. }
                | TypeExpr::FatPointer { .. },
            ) => true,
            _ => false,
        }
    }
}

/// Substitutes declared parameters with arguments.
pub(crate) fn instantiate(body: &TypeExpr, params: &[String], args: &[TypeExpr]) -> TypeExpr {
    if params.is_empty() {
        return body.clone();
    }
    body.map(&|t| match t {
        TypeExpr::TypeVar(v) => params.iter().position(|p| p == v).map(|i| args[i].clone()),
        _ => None,
    })
}

fn builtin(name: &str) -> Option<TypeExpr> {
    match name {
        "void" => Some(TypeExpr::Void),
        "never" => Some(TypeExpr::Never),
        _ => StackKind::from_name(name)
            .map(TypeExpr::Stack)
            .or_else(|| HeapKind::from_name(name).map(TypeExpr::Heap)),
    }
}

fn is_builtin(name: &str) -> bool {
    builtin(name).is_some() || name == "bool"
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ast::build::ty;

    fn packed(fields: &[(&str, &str)]) -> TypeDecl {
        TypeDecl {
            name: "Flags".into(),
            type_params: vec![],
            body: TypeAnnot::Packed(
                fields.iter().map(|(n, k)| (n.to_string(), k.to_string())).collect(),
            ),
        }
    }

    #[test]
    fn packed_under_limit_is_accepted() {
        let decl = packed(&[("b1", "bool"), ("b2", "bool"), ("u8", "u8"), ("u16", "u16")]);
        let mut table = TypeTable::new();
        table.declare_all([(&decl, Span::default())]).unwrap();

        let decl = packed(&[
            ("b1", "bool"),
            ("b2", "bool"),
            ("u8", "u8"),
            ("u16", "u16"),
            ("w", "u32"),
        ]);
        let mut table = TypeTable::new();
        table.declare_all([(&decl, Span::default())]).unwrap();
    }

    #[test]
    fn packed_over_limit_is_rejected() {
        let decl = packed(&[
            ("b1", "bool"),
            ("b2", "bool"),
            ("u8", "u8"),
            ("u16", "u16"),
            ("w", "u32"),
            ("x", "u32"),
        ]);
        let mut table = TypeTable::new();
        let err = table.declare_all([(&decl, Span::new(3, 9))]).unwrap_err();
        assert_eq!(
            err,
            TypeError::PackedSizeExceeded { name: "Flags".into(), bits: 90, span: Span::new(3, 9) }
        );
    }

    #[test]
    fn packed_exactly_64_bits_is_rejected() {
        let decl = packed(&[("a", "u32"), ("b", "u32")]);
        let mut table = TypeTable::new();
        assert!(matches!(
            table.declare_all([(&decl, Span::default())]),
            Err(TypeError::PackedSizeExceeded { bits: 64, .. })
        ));
    }

    #[test]
    fn generic_declarations_expand_with_arguments() {
        let decl = TypeDecl {
            name: "Option".into(),
            type_params: vec!["T".into()],
            body: TypeAnnot::Sum(vec![("Some".into(), Some(ty("T"))), ("None".into(), None)]),
        };
        let mut table = TypeTable::new();
        table.declare_all([(&decl, Span::default())]).unwrap();

        let annot = TypeAnnot::generic("Option", vec![ty("u32")]);
        let resolved = table.resolve(&annot, &[], Span::default()).unwrap();
        let expanded = table.expand(&resolved, Span::default()).unwrap();
        assert_eq!(
            expanded,
            TypeExpr::Sum {
                variants: vec![("Some".into(), TypeExpr::u32()), ("None".into(), TypeExpr::Void)]
            }
        );
    }

    #[test]
    fn borrows_are_found_inside_declared_types() {
        let holder = TypeDecl {
            name: "Holder".into(),
            type_params: vec![],
            body: TypeAnnot::Product(vec![(Some("a".into()), TypeAnnot::borrow(ty("u32")))]),
        };
        let option = TypeDecl {
            name: "Option".into(),
            type_params: vec!["T".into()],
            body: TypeAnnot::Sum(vec![("Some".into(), Some(ty("T"))), ("None".into(), None)]),
        };
        let list = TypeDecl {
            name: "List".into(),
            type_params: vec![],
            body: TypeAnnot::Sum(vec![
                ("Cons".into(), Some(ty("List"))),
                ("Nil".into(), None),
            ]),
        };
        let mut table = TypeTable::new();
        let decls = [&holder, &option, &list];
        table.declare_all(decls.into_iter().map(|d| (d, Span::default()))).unwrap();

        assert!(table.contains_borrow(&TypeExpr::named("Holder")));
        let some_borrow = TypeExpr::Named {
            name: "Option".into(),
            args: vec![TypeExpr::borrow(false, TypeExpr::u32())],
        };
        assert!(table.contains_borrow(&some_borrow));
        let some_int = TypeExpr::Named { name: "Option".into(), args: vec![TypeExpr::u32()] };
        assert!(!table.contains_borrow(&some_int));
        let both = TypeExpr::Product { fields: vec![(None, some_int), (None, some_borrow)] };
        assert!(table.contains_borrow(&both));
        assert!(!table.contains_borrow(&TypeExpr::named("List")));
    }

    #[test]
    fn unknown_and_duplicate_names() {
        let table = TypeTable::new();
        assert!(matches!(
            table.resolve(&ty("Shape"), &[], Span::default()),
            Err(TypeError::UndefinedType { .. })
        ));

        let decl = TypeDecl { name: "u32".into(), type_params: vec![], body: ty("i32") };
        let mut table = TypeTable::new();
        assert!(matches!(
            table.declare_all([(&decl, Span::default())]),
            Err(TypeError::DuplicateType { .. })
        ));
    }

    #[test]
    fn heap_kinds_are_storage_only() {
        let table = TypeTable::new();
        let heap = table.resolve(&ty("u8"), &[], Span::default()).unwrap();
        assert!(matches!(
            table.check_computable(&heap, Span::default()),
            Err(TypeError::StorageOnly { .. })
        ));
        let inside = TypeExpr::Product { fields: vec![(Some("b".into()), heap)] };
        assert!(table.check_computable(&inside, Span::default()).is_ok());
    }

    #[test]
    fn exportable_types() {
        let decl = TypeDecl {
            name: "Shape".into(),
            type_params: vec![],
            body: TypeAnnot::Sum(vec![("Circle".into(), Some(ty("f32"))), ("Empty".into(), None)]),
        };
        let mut table = TypeTable::new();
        table.declare_all([(&decl, Span::default())]).unwrap();

        assert!(table.is_exportable(&TypeExpr::u32()));
        assert!(!table.is_exportable(&TypeExpr::named("Shape")));
        assert!(table.is_exportable(&TypeExpr::pointer(false, TypeExpr::named("Shape"))));
        assert!(!table.is_exportable(&TypeExpr::Void));
    }
}
