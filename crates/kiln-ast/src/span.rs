// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Byte-offset source locations.

use std::fmt;

/// Half-open byte range `[start, end)` into the module source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Maps byte offsets to 1-based line/column pairs.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Offset of the first byte of every line.
    starts: Vec<usize>,
    len: usize,
}

impl LineMap {
    pub fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineMap { starts, len: source.len() }
    }

    /// Line and column (both 1-based) of `offset`. Offsets past the end clamp
    /// to the last position.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = self.starts.partition_point(|&s| s <= offset).saturating_sub(1);
        (line + 1, offset - self.starts[line] + 1)
    }

    /// Text of a 1-based line without its newline.
    pub fn line<'a>(&self, source: &'a str, line: usize) -> Option<&'a str> {
        let start = *self.starts.get(line.checked_sub(1)?)?;
        let end = self.starts.get(line).map_or(source.len(), |&next| next - 1);
        source.get(start..end)
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_join() {
        let a = Span::new(4, 9);
        let b = Span::new(1, 6);
        assert_eq!(a.to(b), Span::new(1, 9));
        assert!(Span::new(3, 3).is_empty());
    }

    #[test]
    fn offsets_across_lines() {
        let src = "fn a\nfn bc\n\nx";
        let map = LineMap::new(src);
        assert_eq!(map.line_count(), 4);
        assert_eq!(map.line_col(0), (1, 1));
        assert_eq!(map.line_col(4), (1, 5));
        assert_eq!(map.line_col(5), (2, 1));
        assert_eq!(map.line_col(12), (4, 1));
        assert_eq!(map.line_col(500), (4, 2));
    }

    #[test]
    fn line_text() {
        let src = "first\nsecond\n";
        let map = LineMap::new(src);
        assert_eq!(map.line(src, 1), Some("first"));
        assert_eq!(map.line(src, 2), Some("second"));
        assert_eq!(map.line(src, 3), Some(""));
        assert_eq!(map.line(src, 0), None);
        assert_eq!(map.line(src, 4), None);
    }
}
