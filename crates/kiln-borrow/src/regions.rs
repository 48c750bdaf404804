// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Regions of one function body.
//!
//! A region is identified with the lexical depth of the block it ends
//! with. Shallower regions outlive deeper ones, so `outlives` is a depth
//! comparison and the meet of two regions is the deeper one.

use kiln_types::{Lifetime, RegionId, RegionOrder};

/// Lives as long as the program.
pub const STATIC_DEPTH: usize = 0;
/// Provided by the caller; outlives the whole body.
pub const PARAM_DEPTH: usize = 1;
/// The outermost block of the body. Parameters are stored here.
pub const BODY_DEPTH: usize = 2;

#[derive(Debug, Default)]
pub struct RegionTable {
    depths: Vec<usize>,
}

impl RegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, depth: usize) -> RegionId {
        let id = RegionId(self.depths.len() as u32);
        self.depths.push(depth);
        id
    }

    pub fn depth(&self, region: RegionId) -> usize {
        self.depths.get(region.0 as usize).copied().unwrap_or(STATIC_DEPTH)
    }

    /// The longest region both `a` and `b` outlive.
    pub fn meet(&mut self, a: RegionId, b: RegionId) -> RegionId {
        if a == b {
            return a;
        }
        let (da, db) = (self.depth(a), self.depth(b));
        match da.cmp(&db) {
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Equal => self.fresh(da),
        }
    }

    fn lifetime_depth(&self, lifetime: Lifetime) -> Option<usize> {
        match lifetime {
            Lifetime::Static => Some(STATIC_DEPTH),
            Lifetime::Param => Some(PARAM_DEPTH),
            Lifetime::Region(r) => Some(self.depth(r)),
            Lifetime::Erased => None,
        }
    }
}

impl RegionOrder for RegionTable {
    fn outlives(&self, longer: Lifetime, shorter: Lifetime) -> bool {
        match (self.lifetime_depth(longer), self.lifetime_depth(shorter)) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deeper_regions_do_not_outlive_parameters() {
        let mut regions = RegionTable::new();
        let param = regions.fresh(PARAM_DEPTH);
        let local = regions.fresh(BODY_DEPTH);
        assert!(regions.outlives(Lifetime::Region(param), Lifetime::Param));
        assert!(!regions.outlives(Lifetime::Region(local), Lifetime::Param));
        assert!(regions.outlives(Lifetime::Static, Lifetime::Region(local)));
        assert_eq!(regions.meet(param, local), local);
        let other = regions.fresh(BODY_DEPTH);
        let met = regions.meet(local, other);
        assert_eq!(regions.depth(met), BODY_DEPTH);
    }
}
