// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Region inference and aliasing checks for one clause.
//!
//! Walks the body once in evaluation order. Every value that holds a borrow
//! carries a [`Flow`]: the region it is valid for, the loans it keeps alive
//! and the parameters it may point into. Loans are lexical: a loan held by
//! a local lasts until the local's block ends, a loan taken for a call
//! argument lasts for the call.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use kiln_ast::Span;
use kiln_hir::{
    BindingRef, BreakTarget, FunctionClause, FunctionGroup, GroupId, HirExpr, HirExprKind, HirProgram,
    HirStmt, HirStmtKind, LabelId, LocalId, LocalKind, Pattern,
};
use kiln_types::{Lifetime, RegionId, RegionOrder, TypeExpr};

use crate::captures::{CaptureMode, CaptureSet};
use crate::error::{BorrowError, BorrowMode};
use crate::regions::{RegionTable, BODY_DEPTH, PARAM_DEPTH};

/// Parameters a clause's returned borrows may point into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSummary {
    /// Indices into the parameter list.
    pub return_borrows_from: BTreeSet<usize>,
}

#[derive(Debug, Clone)]
struct Loan {
    root: LocalId,
    mode: BorrowMode,
    span: Span,
}

#[derive(Debug, Clone, Default)]
struct Flow {
    region: Option<RegionId>,
    loans: Vec<Loan>,
    params: BTreeSet<usize>,
}

#[derive(Debug)]
struct LocalState {
    /// Depth of the block the local is stored in.
    depth: usize,
    flow: Flow,
}

type Result<T> = std::result::Result<T, BorrowError>;

pub(crate) struct BodyChecker<'a> {
    program: &'a HirProgram,
    captures: &'a BTreeMap<GroupId, CaptureSet>,
    group: &'a FunctionGroup,
    clause_index: usize,
    clause: &'a FunctionClause,
    regions: RegionTable,
    states: HashMap<LocalId, LocalState>,
    /// Locals declared in each open block, innermost last.
    scopes: Vec<Vec<LocalId>>,
    /// Loans taken by the arguments of calls being evaluated.
    pending: Vec<Vec<Loan>>,
    labels: HashMap<LabelId, Vec<Flow>>,
    summary: RegionSummary,
}

impl<'a> BodyChecker<'a> {
    pub(crate) fn new(
        program: &'a HirProgram,
        captures: &'a BTreeMap<GroupId, CaptureSet>,
        group: &'a FunctionGroup,
        clause_index: usize,
    ) -> Option<Self> {
        let clause = group.clauses.get(clause_index)?;
        let mut checker = Self {
            program,
            captures,
            group,
            clause_index,
            clause,
            regions: RegionTable::new(),
            states: HashMap::new(),
            scopes: Vec::new(),
            pending: Vec::new(),
            labels: HashMap::new(),
            summary: RegionSummary::default(),
        };
        checker.declare_inputs();
        Some(checker)
    }

    fn declare_inputs(&mut self) {
        for (index, pattern) in self.clause.patterns.iter().enumerate() {
            let mut bound = Vec::new();
            pattern.bindings(&mut bound);
            for local in bound {
                let region = self.regions.fresh(PARAM_DEPTH);
                let flow = Flow { region: Some(region), loans: Vec::new(), params: BTreeSet::from([index]) };
                self.states.insert(local, LocalState { depth: BODY_DEPTH, flow });
            }
        }
        for (id, local) in self.clause.locals.iter() {
            if let LocalKind::Captured(_) = local.kind {
                let region = self.regions.fresh(PARAM_DEPTH);
                let flow = Flow { region: Some(region), ..Flow::default() };
                self.states.insert(id, LocalState { depth: PARAM_DEPTH, flow });
            }
        }
    }

    pub(crate) fn check(mut self, body: &HirExpr) -> Result<RegionSummary> {
        let flow = match &body.kind {
            HirExprKind::Block { stmts, value } => self.block(stmts, value.as_deref(), true)?,
            _ => self.expr(body)?,
        };
        if !body.ty.is_never() {
            let ret = self.group.ret.clone();
            self.check_return(&ret, flow, body.span)?;
        }
        Ok(self.summary)
    }

    fn depth(&self) -> usize {
        self.scopes.len() + PARAM_DEPTH
    }

    fn name(&self, local: LocalId) -> String {
        self.clause.locals.get(local).map(|l| l.name.clone()).unwrap_or_else(|| format!("_{}", local.0))
    }

    fn describe(&self, flow: &Flow) -> String {
        flow.loans.first().map(|l| self.name(l.root)).unwrap_or_else(|| "temporary".to_string())
    }

    fn escape(&self, flow: &Flow, span: Span) -> BorrowError {
        BorrowError::LifetimeEscape { function: self.group.name.clone(), local: self.describe(flow), span }
    }

    fn merge(&mut self, into: &mut Flow, other: Flow) {
        into.region = match (into.region, other.region) {
            (Some(a), Some(b)) => Some(self.regions.meet(a, b)),
            (a, b) => a.or(b),
        };
        into.loans.extend(other.loans);
        into.params.extend(other.params);
    }

    // ------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------

    fn is_union(&self, local: LocalId) -> bool {
        let Some(l) = self.clause.locals.get(local) else { return false };
        matches!(self.program.types.expand(&l.ty, Span::default()), Ok(TypeExpr::Union { .. }))
    }

    /// Records a new loan of `root`, failing if a live loan excludes it.
    fn take_loan(&self, root: LocalId, mode: BorrowMode, span: Span) -> Result<Option<Loan>> {
        if self.is_union(root) {
            return Ok(None);
        }
        let held = self
            .scopes
            .iter()
            .flatten()
            .filter_map(|id| self.states.get(id))
            .flat_map(|s| s.flow.loans.iter());
        let mut live = held.chain(self.pending.iter().flatten());
        if let Some(existing) = live.find(|l| l.root == root && !mode.compatible(l.mode)) {
            return Err(BorrowError::BorrowConflict {
                function: self.group.name.clone(),
                local: self.name(root),
                requested: mode,
                existing: existing.mode,
                first: existing.span,
                span,
            });
        }
        Ok(Some(Loan { root, mode, span }))
    }

    /// The local standing for `binding` in this clause.
    fn local_for(&self, binding: BindingRef) -> Option<LocalId> {
        if binding.group == self.group.id && binding.clause == self.clause_index {
            Some(binding.local)
        } else {
            self.clause.locals.captured(binding)
        }
    }

    /// Borrows of its captures a call of nested `group` takes.
    fn capture_loans(&mut self, group: GroupId, span: Span) -> Result<Vec<Loan>> {
        let Some(captures) = self.captures.get(&group) else { return Ok(Vec::new()) };
        let mut loans = Vec::new();
        for capture in captures {
            let mode = match capture.mode {
                CaptureMode::ByValue => continue,
                CaptureMode::ByRef => BorrowMode::Shared,
                CaptureMode::ByMutableRef => BorrowMode::Exclusive,
            };
            let Some(root) = self.local_for(capture.binding) else { continue };
            loans.extend(self.take_loan(root, mode, span)?);
        }
        Ok(loans)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self, stmts: &[HirStmt], value: Option<&HirExpr>, is_body: bool) -> Result<Flow> {
        self.scopes.push(Vec::new());
        let result = self.block_inner(stmts, value);
        self.pop_scope();
        let flow = result?;
        if !is_body {
            if let Some(region) = flow.region {
                if self.regions.depth(region) > self.depth() {
                    return Err(self.escape(&flow, value.map_or(Span::default(), |v| v.span)));
                }
            }
        }
        Ok(flow)
    }

    fn block_inner(&mut self, stmts: &[HirStmt], value: Option<&HirExpr>) -> Result<Flow> {
        self.stmts(stmts)?;
        match value {
            Some(v) => self.expr(v),
            None => Ok(Flow::default()),
        }
    }

    fn pop_scope(&mut self) {
        if let Some(ids) = self.scopes.pop() {
            for id in ids {
                self.states.remove(&id);
            }
        }
    }

    fn declare(&mut self, local: LocalId, flow: Flow) {
        let depth = self.depth();
        self.states.insert(local, LocalState { depth, flow });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(local);
        }
    }

    fn stmts(&mut self, stmts: &[HirStmt]) -> Result<()> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &HirStmt) -> Result<()> {
        match &stmt.kind {
            HirStmtKind::Let { local, init } => {
                let flow = self.expr(init)?;
                self.declare(*local, flow);
            }
            HirStmtKind::Assign { place, value } => {
                let flow = self.expr(value)?;
                let target = self.place(place)?;
                self.assign(place, target, flow, stmt.span)?;
            }
            HirStmtKind::Expr(e) => {
                self.expr(e)?;
            }
            HirStmtKind::Return(value) => {
                if let Some(value) = value {
                    let flow = self.expr(value)?;
                    let ret = self.group.ret.clone();
                    self.check_return(&ret, flow, value.span)?;
                }
            }
            HirStmtKind::Break { target, value } => {
                let flow = match value {
                    Some(v) => self.expr(v)?,
                    None => Flow::default(),
                };
                if let BreakTarget::Label(label) = target {
                    self.labels.entry(*label).or_default().push(flow);
                }
            }
            HirStmtKind::Loop(body) => {
                self.scopes.push(Vec::new());
                let result = self.stmts(body);
                self.pop_scope();
                result?;
            }
            HirStmtKind::Continue | HirStmtKind::FnDef(_) => {}
        }
        Ok(())
    }

    /// Stores a value holding `flow` into `place`.
    ///
    /// The referent must outlive the storage it is written to: the block of
    /// a local, or whatever a dereferenced borrow is valid for.
    fn assign(&mut self, place: &HirExpr, target: Flow, flow: Flow, span: Span) -> Result<()> {
        let Some(region) = flow.region else { return Ok(()) };
        let depth = self.regions.depth(region);
        match place.place_root() {
            Some(root) => {
                let Some(storage) = self.states.get(&root).map(|s| s.depth) else { return Ok(()) };
                if depth > storage {
                    return Err(self.escape(&flow, span));
                }
                let mut merged = self.states.get_mut(&root).map(|s| std::mem::take(&mut s.flow)).unwrap_or_default();
                self.merge(&mut merged, flow);
                if let Some(state) = self.states.get_mut(&root) {
                    state.flow = merged;
                }
            }
            None => {
                if let Some(pointee) = target.region {
                    if depth > self.regions.depth(pointee) {
                        return Err(self.escape(&flow, span));
                    }
                }
            }
        }
        Ok(())
    }

    /// A returned value may only point into what the caller provided.
    fn check_return(&mut self, ret: &TypeExpr, flow: Flow, span: Span) -> Result<()> {
        if !self.program.types.contains_borrow(ret) {
            return Ok(());
        }
        let Some(region) = flow.region else { return Ok(()) };
        self.summary.return_borrows_from.extend(flow.params.iter().copied());
        if !self.regions.outlives(Lifetime::Region(region), Lifetime::Param) {
            return Err(self.escape(&flow, span));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &HirExpr) -> Result<Flow> {
        let flow = self.expr_inner(expr)?;
        // Function values keep the loans of their captures; other values
        // without a borrow in them keep nothing.
        let keeps = self.program.types.contains_borrow(&expr.ty) || matches!(expr.kind, HirExprKind::FnRef(_));
        Ok(if keeps { flow } else { Flow::default() })
    }

    fn expr_inner(&mut self, expr: &HirExpr) -> Result<Flow> {
        match &expr.kind {
            HirExprKind::Int(_) | HirExprKind::Float(_) | HirExprKind::FnHandle { .. } => Ok(Flow::default()),
            HirExprKind::Local(id) => Ok(self.states.get(id).map(|s| s.flow.clone()).unwrap_or_default()),
            HirExprKind::FnRef(r) => {
                let implicit = match self.program.group(r.group) {
                    Some(g) if g.is_nested() => Some(r.group),
                    _ => None,
                };
                let mut flow = self.arguments(&r.bound, implicit, expr.span)?;
                flow.region = None;
                flow.params.clear();
                Ok(flow)
            }
            HirExprKind::Call { target, args, .. } => {
                let group = target.group();
                let implicit = match self.program.group(group) {
                    Some(g) if g.is_nested() => Some(group),
                    _ => None,
                };
                self.call_result(args, implicit, expr.span)
            }
            HirExprKind::IndirectCall { callee, args } => {
                let callee_flow = self.expr(callee)?;
                self.pending.push(callee_flow.loans);
                let result = self.call_result(args, None, expr.span);
                self.pending.pop();
                result
            }
            HirExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                Ok(Flow::default())
            }
            HirExprKind::Unary { operand, .. } => {
                self.expr(operand)?;
                Ok(Flow::default())
            }
            HirExprKind::Ref { mutable, place } => self.borrow(*mutable, place, expr.span),
            HirExprKind::Deref(inner) | HirExprKind::Cast(inner) => self.expr(inner),
            HirExprKind::Field { object, .. } | HirExprKind::PackedField { object, .. } => self.expr(object),
            HirExprKind::Variant { payload, .. } => match payload {
                Some(p) => self.expr(p),
                None => Ok(Flow::default()),
            },
            HirExprKind::Product(fields) => {
                let mut flow = Flow::default();
                for field in fields {
                    let f = self.expr(field)?;
                    self.merge(&mut flow, f);
                }
                Ok(flow)
            }
            HirExprKind::Block { stmts, value } => self.block(stmts, value.as_deref(), false),
            HirExprKind::If { cond, then_branch, else_branch } => {
                self.expr(cond)?;
                let mut flow = self.expr(then_branch)?;
                if let Some(e) = else_branch {
                    let other = self.expr(e)?;
                    self.merge(&mut flow, other);
                }
                Ok(flow)
            }
            HirExprKind::Match { scrutinees, arms } => {
                let mut inputs = Vec::with_capacity(scrutinees.len());
                for s in scrutinees {
                    inputs.push(self.expr(s)?);
                }
                let mut flow = Flow::default();
                for arm in arms {
                    self.scopes.push(Vec::new());
                    for (pattern, input) in arm.patterns.iter().zip(&inputs) {
                        self.bind(pattern, input);
                    }
                    let result = self.expr(&arm.body);
                    self.pop_scope();
                    let arm_flow = result?;
                    self.merge(&mut flow, arm_flow);
                }
                Ok(flow)
            }
            HirExprKind::Inlined { label, body } => {
                self.labels.insert(*label, Vec::new());
                let mut flow = self.expr(body)?;
                for broke in self.labels.remove(label).unwrap_or_default() {
                    self.merge(&mut flow, broke);
                }
                Ok(flow)
            }
        }
    }

    fn bind(&mut self, pattern: &Pattern, input: &Flow) {
        let mut bound = Vec::new();
        pattern.bindings(&mut bound);
        for local in bound {
            self.declare(local, input.clone());
        }
    }

    /// Evaluates call arguments with their loans held until the call ends.
    fn arguments(&mut self, args: &[HirExpr], implicit: Option<GroupId>, span: Span) -> Result<Flow> {
        self.pending.push(Vec::new());
        let result = self.arguments_inner(args, implicit, span);
        let taken = self.pending.pop().unwrap_or_default();
        let mut flow = result?;
        flow.loans = taken;
        Ok(flow)
    }

    fn arguments_inner(&mut self, args: &[HirExpr], implicit: Option<GroupId>, span: Span) -> Result<Flow> {
        let mut flow = Flow::default();
        for arg in args {
            let f = self.expr(arg)?;
            if let Some(frame) = self.pending.last_mut() {
                frame.extend(f.loans.iter().cloned());
            }
            let Flow { region, params, .. } = f;
            self.merge(&mut flow, Flow { region, loans: Vec::new(), params });
        }
        if let Some(group) = implicit {
            let loans = self.capture_loans(group, span)?;
            if let Some(frame) = self.pending.last_mut() {
                frame.extend(loans);
            }
        }
        Ok(flow)
    }

    /// A call result may point into any borrow argument, so it lives for
    /// the meet of their regions.
    fn call_result(&mut self, args: &[HirExpr], implicit: Option<GroupId>, span: Span) -> Result<Flow> {
        let mut flow = self.arguments(args, implicit, span)?;
        if flow.region.is_none() {
            flow.region = Some(self.regions.fresh(PARAM_DEPTH));
        }
        Ok(flow)
    }

    fn borrow(&mut self, mutable: bool, place: &HirExpr, span: Span) -> Result<Flow> {
        let mode = BorrowMode::from_mutable(mutable);
        if let Some(root) = place.place_root() {
            let depth = self.states.get(&root).map_or(BODY_DEPTH, |s| s.depth);
            let loan = self.take_loan(root, mode, span)?;
            let region = self.regions.fresh(depth);
            return Ok(Flow { region: Some(region), loans: loan.into_iter().collect(), params: BTreeSet::new() });
        }
        // Reborrow through a dereference: as long-lived as the borrow
        // dereferenced, and a loan of the local holding it.
        let mut flow = self.place(place)?;
        if let Some(base) = place.base_local() {
            flow.loans.extend(self.take_loan(base, mode, span)?);
        }
        Ok(flow)
    }

    /// Flow of the borrow a place dereferences, if it does.
    fn place(&mut self, place: &HirExpr) -> Result<Flow> {
        match &place.kind {
            HirExprKind::Deref(inner) => self.expr(inner),
            HirExprKind::Field { object, .. } | HirExprKind::PackedField { object, .. } => self.place(object),
            HirExprKind::Local(_) => Ok(Flow::default()),
            _ => self.expr(place),
        }
    }
}
