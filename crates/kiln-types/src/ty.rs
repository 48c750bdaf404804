// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Canonical type representation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed-width numeric types usable in arithmetic and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StackKind {
    I32,
    U32,
    F32,
    I64,
    U64,
    F64,
    Isize,
    Usize,
}

impl StackKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i32" => StackKind::I32,
            "u32" => StackKind::U32,
            "f32" => StackKind::F32,
            "i64" => StackKind::I64,
            "u64" => StackKind::U64,
            "f64" => StackKind::F64,
            "isize" => StackKind::Isize,
            "usize" => StackKind::Usize,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            StackKind::I32 => "i32",
            StackKind::U32 => "u32",
            StackKind::F32 => "f32",
            StackKind::I64 => "i64",
            StackKind::U64 => "u64",
            StackKind::F64 => "f64",
            StackKind::Isize => "isize",
            StackKind::Usize => "usize",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, StackKind::F32 | StackKind::F64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    pub fn is_signed(self) -> bool {
        matches!(self, StackKind::I32 | StackKind::I64 | StackKind::Isize | StackKind::F32 | StackKind::F64)
    }

    /// Width on wasm32.
    pub fn bits(self) -> u32 {
        match self {
            StackKind::I64 | StackKind::U64 | StackKind::F64 => 64,
            _ => 32,
        }
    }
}

/// Narrow storage-only integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeapKind {
    I8,
    U8,
    I16,
    U16,
}

impl HeapKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => HeapKind::I8,
            "u8" => HeapKind::U8,
            "i16" => HeapKind::I16,
            "u16" => HeapKind::U16,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            HeapKind::I8 => "i8",
            HeapKind::U8 => "u8",
            HeapKind::I16 => "i16",
            HeapKind::U16 => "u16",
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            HeapKind::I8 | HeapKind::U8 => 1,
            HeapKind::I16 | HeapKind::U16 => 2,
        }
    }

    /// The stack kind a load of this storage produces.
    pub fn widened(self) -> StackKind {
        match self {
            HeapKind::I8 | HeapKind::I16 => StackKind::I32,
            HeapKind::U8 | HeapKind::U16 => StackKind::U32,
        }
    }
}

/// Field kinds allowed inside a packed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackedKind {
    Bool,
    U8,
    U16,
    U32,
}

impl PackedKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => PackedKind::Bool,
            "u8" => PackedKind::U8,
            "u16" => PackedKind::U16,
            "u32" => PackedKind::U32,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PackedKind::Bool => "bool",
            PackedKind::U8 => "u8",
            PackedKind::U16 => "u16",
            PackedKind::U32 => "u32",
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            PackedKind::Bool => 1,
            PackedKind::U8 => 8,
            PackedKind::U16 => 16,
            PackedKind::U32 => 32,
        }
    }
}

/// Identifier of an inferred region inside one function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

/// The lifetime attached to a borrow type.
///
/// There is no surface syntax for lifetimes; the type checker produces
/// `Erased` and `Param`, and the borrow checker substitutes inferred regions
/// when it needs to compare them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lifetime {
    Static,
    /// The single elided lifetime shared by every borrow parameter.
    Param,
    Region(RegionId),
    /// Not tracked at this point; compares equal to everything.
    Erased,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Static => write!(f, "'static"),
            Lifetime::Param => write!(f, "'param"),
            Lifetime::Region(r) => write!(f, "'r{}", r.0),
            Lifetime::Erased => write!(f, "'_"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeExpr {
    Void,
    Never,
    Stack(StackKind),
    Heap(HeapKind),
    Borrow {
        mutable: bool,
        lifetime: Lifetime,
        inner: Box<TypeExpr>,
    },
    /// Borrowed slice: pointer plus length.
    FatBorrow {
        mutable: bool,
        lifetime: Lifetime,
        inner: Box<TypeExpr>,
    },
    RawPointer { mutable: bool, inner: Box<TypeExpr> },
    FatPointer { mutable: bool, inner: Box<TypeExpr> },
    Product { fields: Vec<(Option<String>, TypeExpr)> },
    Packed { fields: Vec<(String, PackedKind)> },
    /// Payload is `Void` for variants without one.
    Sum { variants: Vec<(String, TypeExpr)> },
    Union { members: Vec<(String, TypeExpr)> },
    /// Curried function type; `(A, B) -> C` is `A -> (B -> C)` and a
    /// nullary function has a `Void` domain.
    Exponential {
        domain: Box<TypeExpr>,
        codomain: Box<TypeExpr>,
    },
    TypeVar(String),
    /// Reference to a declared type, expanded through the `TypeTable`.
    Named { name: String, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn i32() -> Self {
        TypeExpr::Stack(StackKind::I32)
    }

    pub fn u32() -> Self {
        TypeExpr::Stack(StackKind::U32)
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named { name: name.into(), args: Vec::new() }
    }

    pub fn borrow(mutable: bool, inner: TypeExpr) -> Self {
        TypeExpr::Borrow { mutable, lifetime: Lifetime::Erased, inner: Box::new(inner) }
    }

    pub fn pointer(mutable: bool, inner: TypeExpr) -> Self {
        TypeExpr::RawPointer { mutable, inner: Box::new(inner) }
    }

    /// Builds the curried function type for a parameter list.
    pub fn function(params: Vec<TypeExpr>, ret: TypeExpr) -> Self {
        if params.is_empty() {
            return TypeExpr::Exponential {
                domain: Box::new(TypeExpr::Void),
                codomain: Box::new(ret),
            };
        }
        params.into_iter().rev().fold(ret, |codomain, domain| TypeExpr::Exponential {
            domain: Box::new(domain),
            codomain: Box::new(codomain),
        })
    }

    /// Splits a function type into `arity` parameters and the result.
    pub fn uncurry(&self, arity: usize) -> Option<(Vec<TypeExpr>, TypeExpr)> {
        if arity == 0 {
            return match self {
                TypeExpr::Exponential { domain, codomain } if **domain == TypeExpr::Void => {
                    Some((Vec::new(), (**codomain).clone()))
                }
                _ => None,
            };
        }
        let mut params = Vec::with_capacity(arity);
        let mut cur = self;
        for _ in 0..arity {
            match cur {
                TypeExpr::Exponential { domain, codomain } => {
                    params.push((**domain).clone());
                    cur = codomain;
                }
                _ => return None,
            }
        }
        Some((params, cur.clone()))
    }

    pub fn is_never(&self) -> bool {
        matches!(self, TypeExpr::Never)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeExpr::Void)
    }

    pub fn stack_kind(&self) -> Option<StackKind> {
        match self {
            TypeExpr::Stack(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_borrow(&self) -> bool {
        matches!(self, TypeExpr::Borrow { .. } | TypeExpr::FatBorrow { .. })
    }

    pub fn has_type_vars(&self) -> bool {
        let mut vars = BTreeSet::new();
        self.collect_type_vars(&mut vars);
        !vars.is_empty()
    }

    pub fn collect_type_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            TypeExpr::TypeVar(v) => {
                out.insert(v.clone());
            }
            TypeExpr::Borrow { inner, .. }
            | TypeExpr::FatBorrow { inner, .. }
            | TypeExpr::RawPointer { inner, .. }
            | TypeExpr::FatPointer { inner, .. } => inner.collect_type_vars(out),
            TypeExpr::Product { fields } => {
                fields.iter().for_each(|(_, t)| t.collect_type_vars(out))
            }
            TypeExpr::Sum { variants } => {
                variants.iter().for_each(|(_, t)| t.collect_type_vars(out))
            }
            TypeExpr::Union { members } => {
                members.iter().for_each(|(_, t)| t.collect_type_vars(out))
            }
            TypeExpr::Exponential { domain, codomain } => {
                domain.collect_type_vars(out);
                codomain.collect_type_vars(out);
            }
            TypeExpr::Named { args, .. } => args.iter().for_each(|t| t.collect_type_vars(out)),
            TypeExpr::Void
            | TypeExpr::Never
            | TypeExpr::Stack(_)
            | TypeExpr::Heap(_)
            | TypeExpr::Packed { .. } => {}
        }
    }

    /// Rewrites every borrow lifetime with `f`.
    pub fn map_lifetimes(&self, f: &impl Fn(Lifetime) -> Lifetime) -> TypeExpr {
        self.map(&|ty| match ty {
            TypeExpr::Borrow { mutable, lifetime, inner } => Some(TypeExpr::Borrow {
                mutable: *mutable,
                lifetime: f(*lifetime),
                inner: Box::new(inner.map_lifetimes(f)),
            }),
            TypeExpr::FatBorrow { mutable, lifetime, inner } => Some(TypeExpr::FatBorrow {
                mutable: *mutable,
                lifetime: f(*lifetime),
                inner: Box::new(inner.map_lifetimes(f)),
            }),
            _ => None,
        })
    }

    pub fn erase_lifetimes(&self) -> TypeExpr {
        self.map_lifetimes(&|_| Lifetime::Erased)
    }

    /// Structural rebuild. `f` may replace a node; `None` recurses into it.
    pub fn map(&self, f: &impl Fn(&TypeExpr) -> Option<TypeExpr>) -> TypeExpr {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self {
            TypeExpr::Borrow { mutable, lifetime, inner } => TypeExpr::Borrow {
                mutable: *mutable,
                lifetime: *lifetime,
                inner: Box::new(inner.map(f)),
            },
            TypeExpr::FatBorrow { mutable, lifetime, inner } => TypeExpr::FatBorrow {
                mutable: *mutable,
                lifetime: *lifetime,
                inner: Box::new(inner.map(f)),
            },
            TypeExpr::RawPointer { mutable, inner } => {
                TypeExpr::RawPointer { mutable: *mutable, inner: Box::new(inner.map(f)) }
            }
            TypeExpr::FatPointer { mutable, inner } => {
                TypeExpr::FatPointer { mutable: *mutable, inner: Box::new(inner.map(f)) }
            }
            TypeExpr::Product { fields } => TypeExpr::Product {
                fields: fields.iter().map(|(n, t)| (n.clone(), t.map(f))).collect(),
            },
            TypeExpr::Sum { variants } => TypeExpr::Sum {
                variants: variants.iter().map(|(n, t)| (n.clone(), t.map(f))).collect(),
            },
            TypeExpr::Union { members } => TypeExpr::Union {
                members: members.iter().map(|(n, t)| (n.clone(), t.map(f))).collect(),
            },
            TypeExpr::Exponential { domain, codomain } => TypeExpr::Exponential {
                domain: Box::new(domain.map(f)),
                codomain: Box::new(codomain.map(f)),
            },
            TypeExpr::Named { name, args } => TypeExpr::Named {
                name: name.clone(),
                args: args.iter().map(|t| t.map(f)).collect(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Void => write!(f, "void"),
            TypeExpr::Never => write!(f, "never"),
            TypeExpr::Stack(k) => write!(f, "{}", k.name()),
            TypeExpr::Heap(k) => write!(f, "{}", k.name()),
            TypeExpr::Borrow { mutable, inner, .. } => {
                write!(f, "&{}{}", if *mutable { "mut " } else { "" }, inner)
            }
            TypeExpr::FatBorrow { mutable, inner, .. } => {
                write!(f, "&{}[{}]", if *mutable { "mut " } else { "" }, inner)
            }
            TypeExpr::RawPointer { mutable, inner } => {
                write!(f, "*{}{}", if *mutable { "mut " } else { "" }, inner)
            }
            TypeExpr::FatPointer { mutable, inner } => {
                write!(f, "*{}[{}]", if *mutable { "mut " } else { "" }, inner)
            }
            TypeExpr::Product { fields } => {
                write!(f, "(")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match name {
                        Some(n) => write!(f, "{}: {}", n, ty)?,
                        None => write!(f, "{}", ty)?,
                    }
                }
                write!(f, ")")
            }
            TypeExpr::Packed { fields } => {
                write!(f, "packed [")?;
                for (i, (name, kind)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, kind.name())?;
                }
                write!(f, "]")
            }
            TypeExpr::Sum { variants } => {
                for (i, (name, payload)) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    if payload.is_void() {
                        write!(f, "{}", name)?;
                    } else {
                        write!(f, "{}({})", name, payload)?;
                    }
                }
                Ok(())
            }
            TypeExpr::Union { members } => {
                write!(f, "union [")?;
                for (i, (name, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "]")
            }
            TypeExpr::Exponential { domain, codomain } => {
                if matches!(**domain, TypeExpr::Exponential { .. }) {
                    write!(f, "({}) -> {}", domain, codomain)
                } else {
                    write!(f, "{} -> {}", domain, codomain)
                }
            }
            TypeExpr::TypeVar(name) => write!(f, "{}", name),
            TypeExpr::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_types_are_right_nested() {
        let f = TypeExpr::function(vec![TypeExpr::u32(), TypeExpr::i32()], TypeExpr::Void);
        match &f {
            TypeExpr::Exponential { domain, codomain } => {
                assert_eq!(**domain, TypeExpr::u32());
                assert!(matches!(**codomain, TypeExpr::Exponential { .. }));
            }
            other => panic!("expected exponential, got {other}"),
        }
        let (params, ret) = f.uncurry(2).unwrap();
        assert_eq!(params, vec![TypeExpr::u32(), TypeExpr::i32()]);
        assert_eq!(ret, TypeExpr::Void);
    }

    #[test]
    fn nullary_function_has_void_domain() {
        let f = TypeExpr::function(vec![], TypeExpr::u32());
        assert_eq!(f.uncurry(0), Some((vec![], TypeExpr::u32())));
        assert_eq!(f.uncurry(1), Some((vec![TypeExpr::Void], TypeExpr::u32())));
    }

    #[test]
    fn display_shapes() {
        let shape = TypeExpr::Sum {
            variants: vec![
                ("Circle".into(), TypeExpr::Stack(StackKind::F32)),
                ("Empty".into(), TypeExpr::Void),
            ],
        };
        assert_eq!(shape.to_string(), "Circle(f32) | Empty");
        let b = TypeExpr::borrow(true, TypeExpr::named("Shape"));
        assert_eq!(b.to_string(), "&mut Shape");
    }

    #[test]
    fn erase_lifetimes_reaches_nested_borrows() {
        let ty = TypeExpr::Product {
            fields: vec![(
                None,
                TypeExpr::Borrow {
                    mutable: false,
                    lifetime: Lifetime::Param,
                    inner: Box::new(TypeExpr::u32()),
                },
            )],
        };
        assert_eq!(
            ty.erase_lifetimes(),
            TypeExpr::Product { fields: vec![(None, TypeExpr::borrow(false, TypeExpr::u32()))] }
        );
    }
}
