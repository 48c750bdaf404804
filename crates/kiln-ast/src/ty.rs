// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Surface type annotations.
//!
//! Annotations are unresolved: names are plain strings and borrows carry no
//! lifetime. `kiln-types` turns them into `TypeExpr`s.

/// A type as written in source.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeAnnot {
    /// `u32`, `void`, `never`, `Shape`, `Option<T>`, or a type parameter.
    Named { name: String, args: Vec<TypeAnnot> },
    /// `&T` / `&mut T`
    Borrow { mutable: bool, inner: Box<TypeAnnot> },
    /// `&[T]` / `&mut [T]`
    FatBorrow { mutable: bool, inner: Box<TypeAnnot> },
    /// `*T` / `*mut T`
    Pointer { mutable: bool, inner: Box<TypeAnnot> },
    /// `*[T]` / `*mut [T]`
    FatPointer { mutable: bool, inner: Box<TypeAnnot> },
    /// `(x: f32, y: f32)` or `(u32, u32)`
    Product(Vec<(Option<String>, TypeAnnot)>),
    /// `packed [flag: bool, level: u8]`: field name and kind name.
    Packed(Vec<(String, String)>),
    /// `Circle(f32) | Empty`
    Sum(Vec<(String, Option<TypeAnnot>)>),
    /// `union [bits: u32, value: f32]`
    Union(Vec<(String, TypeAnnot)>),
    /// `(A, B) -> C`
    Function { params: Vec<TypeAnnot>, ret: Box<TypeAnnot> },
}

impl TypeAnnot {
    pub fn named(name: impl Into<String>) -> Self {
        TypeAnnot::Named { name: name.into(), args: Vec::new() }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeAnnot>) -> Self {
        TypeAnnot::Named { name: name.into(), args }
    }

    pub fn borrow(inner: TypeAnnot) -> Self {
        TypeAnnot::Borrow { mutable: false, inner: Box::new(inner) }
    }

    pub fn borrow_mut(inner: TypeAnnot) -> Self {
        TypeAnnot::Borrow { mutable: true, inner: Box::new(inner) }
    }

    pub fn pointer(inner: TypeAnnot) -> Self {
        TypeAnnot::Pointer { mutable: false, inner: Box::new(inner) }
    }

    pub fn function(params: Vec<TypeAnnot>, ret: TypeAnnot) -> Self {
        TypeAnnot::Function { params, ret: Box::new(ret) }
    }
}
