// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Memory layout for wasm32.
//!
//! Pointers, `isize` and `usize` are 4 bytes. Products use C layout with
//! natural alignment. Function values are table indices.

use kiln_ast::Span;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::table::TypeTable;
use crate::ty::{PackedKind, StackKind, TypeExpr};

pub const POINTER_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub size: u32,
    pub align: u32,
}

impl Layout {
    pub const fn new(size: u32, align: u32) -> Self {
        Self { size, align }
    }

    const WORD: Layout = Layout::new(4, 4);
}

/// Machine representation of a sum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SumRepr {
    /// Every variant is payload-free: the value is the discriminant.
    Word,
    /// `[discriminant: usize, pointer: *mut payload]`
    TaggedPointer,
}

pub fn sum_repr(variants: &[(String, TypeExpr)]) -> SumRepr {
    if variants.iter().all(|(_, payload)| payload.is_void()) {
        SumRepr::Word
    } else {
        SumRepr::TaggedPointer
    }
}

/// Bit offset and width of each packed field, low bits first.
pub fn packed_offsets(fields: &[(String, PackedKind)]) -> Vec<(u32, u32)> {
    let mut offset = 0;
    fields
        .iter()
        .map(|(_, kind)| {
            let at = offset;
            offset += kind.bits();
            (at, kind.bits())
        })
        .collect()
}

/// Total packed width decides whether the carrier is a u32 or a u64.
pub fn packed_carrier(fields: &[(String, PackedKind)]) -> StackKind {
    let bits: u32 = fields.iter().map(|(_, k)| k.bits()).sum();
    if bits <= 32 {
        StackKind::U32
    } else {
        StackKind::U64
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    offset.div_ceil(align) * align
}

impl TypeTable {
    pub fn layout_of(&self, ty: &TypeExpr, span: Span) -> Result<Layout, TypeError> {
        self.layout_at(ty, span, 0)
    }

    /// Byte offset of every product field, plus the whole layout.
    pub fn field_offsets(
        &self,
        fields: &[(Option<String>, TypeExpr)],
        span: Span,
    ) -> Result<(Vec<u32>, Layout), TypeError> {
        self.fields_at(fields, span, 0)
    }

    fn fields_at(
        &self,
        fields: &[(Option<String>, TypeExpr)],
        span: Span,
        depth: usize,
    ) -> Result<(Vec<u32>, Layout), TypeError> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut align = 1;
        for (_, ty) in fields {
            let field = self.layout_at(ty, span, depth + 1)?;
            offset = align_to(offset, field.align);
            offsets.push(offset);
            offset += field.size;
            align = align.max(field.align);
        }
        Ok((offsets, Layout::new(align_to(offset, align), align)))
    }

    fn layout_at(&self, ty: &TypeExpr, span: Span, depth: usize) -> Result<Layout, TypeError> {
        if depth > 64 {
            return Err(TypeError::InfiniteSize { name: ty.to_string(), span });
        }
        Ok(match ty {
            TypeExpr::Void | TypeExpr::Never => Layout::new(0, 1),
            TypeExpr::Stack(kind) => {
                let bytes = kind.bits() / 8;
                Layout::new(bytes, bytes)
            }
            TypeExpr::Heap(kind) => Layout::new(kind.bytes(), kind.bytes()),
            TypeExpr::Borrow { .. } | TypeExpr::RawPointer { .. } | TypeExpr::Exponential { .. } => {
                Layout::WORD
            }
            TypeExpr::FatBorrow { .. } | TypeExpr::FatPointer { .. } => {
                Layout::new(2 * POINTER_SIZE, POINTER_SIZE)
            }
            TypeExpr::Product { fields } => self.fields_at(fields, span, depth)?.1,
            TypeExpr::Packed { fields } => match packed_carrier(fields) {
                StackKind::U32 => Layout::new(4, 4),
                _ => Layout::new(8, 8),
            },
            TypeExpr::Sum { variants } => match sum_repr(variants) {
                SumRepr::Word => Layout::WORD,
                SumRepr::TaggedPointer => Layout::new(2 * POINTER_SIZE, POINTER_SIZE),
            },
            TypeExpr::Union { members } => {
                let mut size = 0;
                let mut align = 1;
                for (_, member) in members {
                    let l = self.layout_at(member, span, depth + 1)?;
                    size = size.max(l.size);
                    align = align.max(l.align);
                }
                Layout::new(align_to(size, align), align)
            }
            TypeExpr::TypeVar(var) => {
                return Err(TypeError::UnresolvedTypeVar { var: var.clone(), span })
            }
            TypeExpr::Named { .. } => {
                let expanded = self.expand(ty, span)?;
                self.layout_at(&expanded, span, depth + 1)?
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::HeapKind;

    #[test]
    fn product_fields_are_aligned() {
        let table = TypeTable::new();
        let fields = vec![
            (Some("tag".to_string()), TypeExpr::Heap(HeapKind::U8)),
            (Some("value".to_string()), TypeExpr::Stack(StackKind::F64)),
            (Some("count".to_string()), TypeExpr::u32()),
        ];
        let (offsets, layout) = table.field_offsets(&fields, Span::default()).unwrap();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(layout, Layout::new(24, 8));
    }

    #[test]
    fn sum_representation_follows_payloads() {
        let plain = vec![("Red".to_string(), TypeExpr::Void), ("Blue".to_string(), TypeExpr::Void)];
        assert_eq!(sum_repr(&plain), SumRepr::Word);

        let mut shape = plain.clone();
        shape.push(("Circle".to_string(), TypeExpr::Stack(StackKind::F32)));
        assert_eq!(sum_repr(&shape), SumRepr::TaggedPointer);

        let table = TypeTable::new();
        let layout = table.layout_of(&TypeExpr::Sum { variants: shape }, Span::default()).unwrap();
        assert_eq!(layout, Layout::new(8, 4));
    }

    #[test]
    fn packed_fields_are_bit_ranges() {
        let fields = vec![
            ("b1".to_string(), PackedKind::Bool),
            ("level".to_string(), PackedKind::U8),
            ("wide".to_string(), PackedKind::U32),
        ];
        assert_eq!(packed_offsets(&fields), vec![(0, 1), (1, 8), (9, 32)]);
        assert_eq!(packed_carrier(&fields), StackKind::U64);
    }
}
