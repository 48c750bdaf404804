// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Borrow and lifetime analysis for Kiln.
//!
//! This crate verifies, for every function body:
//! - borrows never outlive their referent, including through returns
//! - shared XOR exclusive access to the same storage
//! - every loop can reach a `continue`
//!
//! It also computes what each nested function captures, which the lifter
//! turns into parameters.

mod captures;
mod check;
mod error;
mod flow;
pub mod regions;

pub use captures::{analyze_captures, Capture, CaptureMode, CaptureSet};
pub use check::RegionSummary;
pub use error::{BorrowError, BorrowMode};

use std::collections::BTreeMap;

use kiln_hir::{GroupId, HirProgram};

use check::BodyChecker;

/// Result of borrow analysis.
#[derive(Debug, Clone, Default)]
pub struct BorrowReport {
    /// Captures of every nested group.
    pub captures: BTreeMap<GroupId, CaptureSet>,
    /// Per clause, keyed by group and clause index.
    pub regions: BTreeMap<(GroupId, usize), RegionSummary>,
}

impl BorrowReport {
    pub fn captures_of(&self, group: GroupId) -> &[Capture] {
        self.captures.get(&group).map_or(&[], Vec::as_slice)
    }
}

/// Checks every body in `program`, stopping at the first violation.
///
/// Template bodies are only checked for loop flow; their borrows are
/// checked where they are expanded.
pub fn check_program(program: &HirProgram) -> Result<BorrowReport, BorrowError> {
    let _span = tracing::debug_span!("borrow", module = %program.module).entered();

    let captures = analyze_captures(program);
    let mut regions = BTreeMap::new();
    for group in program.groups() {
        for (index, clause) in group.clauses.iter().enumerate() {
            let Some(body) = &clause.body else { continue };
            flow::check_loops(&group.name, body)?;
            if group.is_template() {
                continue;
            }
            let Some(checker) = BodyChecker::new(program, &captures, group, index) else { continue };
            let summary = checker.check(body)?;
            if !summary.return_borrows_from.is_empty() {
                tracing::trace!(function = %group.name, clause = index, from = ?summary.return_borrows_from, "returned borrows");
            }
            regions.insert((group.id, index), summary);
        }
    }
    tracing::debug!(clauses = regions.len(), "borrows checked");
    Ok(BorrowReport { captures, regions })
}

#[cfg(test)]
mod tests;
