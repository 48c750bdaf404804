// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Top-level items: type declarations, function clauses, imports.

use crate::stmt::Stmt;
use crate::ty::TypeAnnot;
use crate::{NodeId, Span};

/// One parsed source module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub items: Vec<Item>,
}

/// A top-level item.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: NodeId,
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ItemKind {
    Type(TypeDecl),
    Fn(FnClause),
    Import(ImportDecl),
}

/// `type Shape<T> = ...`
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub body: TypeAnnot,
}

/// One clause of a function definition.
///
/// Several clauses with the same name form a single function that
/// dispatches on its argument patterns in declaration order.
#[derive(Debug, Clone)]
pub struct FnClause {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<Param>,
    /// `None` means `void`.
    pub ret_ty: Option<TypeAnnot>,
    /// Empty for host imports.
    pub body: Vec<Stmt>,
    pub flags: FnFlags,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FnFlags {
    /// `pure fn`: side-effect free; required for getters.
    pub is_pure: bool,
    /// `template fn`: always expanded at the call site.
    pub is_template: bool,
    pub linkage: Linkage,
}

/// Host boundary role of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Linkage {
    #[default]
    Internal,
    /// `host fn` / `export fn`: callable by the host.
    Export,
    /// `import host "env" fn`: provided by the host.
    Import { module: String },
}

/// A function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub pattern: ParamPattern,
    /// `mut n: u32`: the binding may be reassigned in the body.
    pub is_mut: bool,
    pub span: Span,
}

/// What a parameter position matches.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamPattern {
    /// `n: u32`: always matches and binds. The type may be left out when
    /// another clause of the same function names it.
    Bind { name: String, ty: Option<TypeAnnot> },
    /// `n: 0`: matches only that compile-time value.
    Literal { name: Option<String>, value: i64 },
    /// `s: Circle(r)`: matches one variant of a sum type.
    Variant {
        ty: Option<String>,
        variant: String,
        inner: Option<Box<ParamPattern>>,
    },
    /// `_`
    Wildcard { ty: Option<TypeAnnot> },
}

/// `import geometry with {area as surface}` and friends.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub module: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    /// `import geometry` / `import geometry as geo`: access as `geo.area`.
    Namespace { alias: Option<String> },
    /// Named allowlist.
    With(Vec<ImportName>),
    /// Everything except the listed names.
    Without(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}
