// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type representation and unification for the Kiln language.
//!
//! Every stage after parsing works on [`TypeExpr`]. Surface annotations are
//! resolved through a [`TypeTable`], compared through a [`Unifier`] and laid
//! out for wasm32 by [`layout`].

mod error;
pub mod layout;
mod table;
mod ty;
mod unify;

pub use error::TypeError;
pub use layout::{Layout, SumRepr, POINTER_SIZE};
pub use table::{TypeDef, TypeTable, PACKED_BIT_LIMIT};
pub use ty::{HeapKind, Lifetime, PackedKind, RegionId, StackKind, TypeExpr};
pub use unify::{RegionOrder, Substitution, Unifier};
