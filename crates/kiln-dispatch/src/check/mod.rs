// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Body checking: names, types and call targets for every clause.

mod call;
mod expr;

use std::collections::HashMap;

use kiln_ast::{FnClause, Span, Stmt, StmtKind};
use kiln_hir::{
    visit, BindingRef, BreakTarget, FunctionGroup, GroupId, GroupOrigin, HirExpr, HirExprKind,
    HirProgram, HirStmt, HirStmtKind, Local, LocalId, LocalKind, LocalTable, Pattern,
};
use kiln_types::{TypeExpr, TypeTable, Unifier};

use crate::collect::{self, GlobalScope};
use crate::error::DispatchError;
use crate::pattern::Knowledge;

/// Hint for expressions in statement position.
static VOID: TypeExpr = TypeExpr::Void;

// ============================================================================
// Frames and scopes
// ============================================================================

#[derive(Debug, Default)]
struct Scope {
    locals: HashMap<String, LocalId>,
    functions: HashMap<String, GroupId>,
}

/// One function body being checked. Nested functions push a frame on top
/// of their parent's.
#[derive(Debug)]
struct Frame {
    group: GroupId,
    clause: usize,
    name: String,
    locals: LocalTable,
    scopes: Vec<Scope>,
    ret: TypeExpr,
    is_template: bool,
    loop_depth: usize,
    type_params: Vec<String>,
    /// Compile-time values of immutable locals.
    knowledge: HashMap<LocalId, Knowledge>,
}

impl Frame {
    fn new(group: &FunctionGroup, clause: usize) -> Self {
        let source = &group.clauses[clause];
        let mut scope = Scope::default();
        let mut knowledge = HashMap::new();
        for pattern in &source.patterns {
            bind_pattern(pattern, &source.locals, &mut scope, &mut knowledge);
        }
        Self {
            group: group.id,
            clause,
            name: group.name.clone(),
            locals: source.locals.clone(),
            scopes: vec![scope],
            ret: group.ret.clone(),
            is_template: group.is_template(),
            loop_depth: 0,
            type_params: group.type_params.clone(),
            knowledge,
        }
    }

    fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.get(id)
    }

    fn lookup_local(&self, name: &str) -> Option<LocalId> {
        self.scopes.iter().rev().find_map(|s| s.locals.get(name).copied())
    }

    fn lookup_function(&self, name: &str) -> Option<GroupId> {
        self.scopes.iter().rev().find_map(|s| s.functions.get(name).copied())
    }

    fn declare(&mut self, name: &str, local: Local) -> LocalId {
        let id = self.locals.push(local);
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.insert(name.to_string(), id);
        }
        id
    }

    /// Where the binding behind `local` was declared.
    fn binding_of(&self, local: LocalId) -> BindingRef {
        match self.local(local).map(|l| l.kind) {
            Some(LocalKind::Captured(root)) => root,
            _ => BindingRef { group: self.group, clause: self.clause, local },
        }
    }
}

fn bind_pattern(
    pattern: &Pattern,
    locals: &LocalTable,
    scope: &mut Scope,
    knowledge: &mut HashMap<LocalId, Knowledge>,
) {
    let mut bound = Vec::new();
    pattern.bindings(&mut bound);
    for id in bound {
        if let Some(local) = locals.get(id) {
            scope.locals.insert(local.name.clone(), id);
        }
    }
    if let Pattern::Literal { value, binding: Some(id) } = pattern {
        if locals.get(*id).is_some_and(|l| !l.mutable) {
            knowledge.insert(*id, Knowledge::Literal(*value));
        }
    }
}

/// A name resolved against the scopes.
enum Resolved {
    Local(LocalId),
    Function(GroupId),
}

// ============================================================================
// Checker
// ============================================================================

pub(crate) struct Checker<'a> {
    types: &'a TypeTable,
    program: &'a mut HirProgram,
    globals: &'a GlobalScope,
    frame: Frame,
    outer: Vec<Frame>,
}

impl<'a> Checker<'a> {
    /// Checks clause `clause` of `group` and stores its body.
    pub(crate) fn check_clause(
        types: &'a TypeTable,
        program: &'a mut HirProgram,
        globals: &'a GlobalScope,
        group: GroupId,
        clause: usize,
        body: &[Stmt],
    ) -> Result<(), DispatchError> {
        let Some(frame) = program.group(group).map(|g| Frame::new(g, clause)) else {
            return Ok(());
        };
        let mut checker = Checker { types, program, globals, frame, outer: Vec::new() };
        let body = checker.check_function_body(body)?;
        let Checker { program, frame, .. } = checker;
        store_body(program, group, clause, body, frame.locals);
        Ok(())
    }

    fn span_of_frame(&self) -> Span {
        self.program.group(self.frame.group).map(|g| g.span).unwrap_or_default()
    }

    /// Checks a whole clause body against the frame's return type.
    fn check_function_body(&mut self, stmts: &[Stmt]) -> Result<HirExpr, DispatchError> {
        let ret = self.frame.ret.clone();
        let body = self.check_block(stmts, Some(&ret), self.span_of_frame())?;
        let span = body.span;
        if body.ty.is_never() {
            return Ok(body);
        }
        if ret.is_never() {
            return Err(kiln_types::TypeError::Mismatch { expected: ret, found: body.ty, span }.into());
        }
        if body.ty.is_void() && !ret.is_void() {
            return Err(DispatchError::MissingReturn { function: self.frame.name.clone(), expected: ret, span });
        }
        if !ret.is_void() {
            Unifier::new(self.types).unify(&ret, &body.ty, span)?;
        }
        Ok(body)
    }

    // ------------------------------------------------------------------
    // Name lookup
    // ------------------------------------------------------------------

    fn resolve_name(&mut self, name: &str) -> Option<Resolved> {
        if let Some(id) = self.frame.lookup_local(name) {
            return Some(Resolved::Local(id));
        }
        if let Some(id) = self.frame.lookup_function(name) {
            return Some(Resolved::Function(id));
        }
        for depth in (0..self.outer.len()).rev() {
            let frame = &self.outer[depth];
            if let Some(id) = frame.lookup_local(name) {
                let root = frame.binding_of(id);
                let Some(decl) = frame.local(id).cloned() else {
                    return None;
                };
                return Some(Resolved::Local(self.capture(root, decl)));
            }
            if let Some(id) = frame.lookup_function(name) {
                return Some(Resolved::Function(id));
            }
        }
        self.globals.functions.get(name).copied().map(Resolved::Function)
    }

    /// The current frame's stand-in for a binding of an enclosing function.
    fn capture(&mut self, root: BindingRef, decl: Local) -> LocalId {
        if let Some(id) = self.frame.locals.captured(root) {
            return id;
        }
        self.frame.locals.push(Local {
            name: decl.name,
            ty: decl.ty,
            mutable: decl.mutable,
            kind: LocalKind::Captured(root),
        })
    }

    fn lookup_function(&self, name: &str) -> Option<GroupId> {
        if let Some(id) = self.frame.lookup_function(name) {
            return Some(id);
        }
        self.outer
            .iter()
            .rev()
            .find_map(|f| f.lookup_function(name))
            .or_else(|| self.globals.functions.get(name).copied())
    }

    fn is_local_name(&self, name: &str) -> bool {
        self.frame.lookup_local(name).is_some() || self.outer.iter().any(|f| f.lookup_local(name).is_some())
    }

    fn namespace_member(&self, alias: &str, member: &str) -> Option<GroupId> {
        if self.is_local_name(alias) {
            return None;
        }
        self.globals.namespaces.get(alias).and_then(|m| m.get(member)).copied()
    }

    fn group(&self, id: GroupId) -> Result<&FunctionGroup, DispatchError> {
        self.program
            .group(id)
            .ok_or_else(|| DispatchError::UnresolvedName { name: format!("group {}", id.0), span: Span::default() })
    }

    // ------------------------------------------------------------------
    // Blocks and statements
    // ------------------------------------------------------------------

    /// Checks `stmts` in a new scope. The last expression statement gives
    /// the block's value unless `expected` is `void`.
    fn check_block(&mut self, stmts: &[Stmt], expected: Option<&TypeExpr>, span: Span) -> Result<HirExpr, DispatchError> {
        self.frame.scopes.push(Scope::default());
        let result = self.check_block_inner(stmts, expected, span);
        self.frame.scopes.pop();
        result
    }

    fn check_block_inner(
        &mut self,
        stmts: &[Stmt],
        expected: Option<&TypeExpr>,
        span: Span,
    ) -> Result<HirExpr, DispatchError> {
        let nested = self.declare_nested(stmts)?;
        let wants_value = !expected.is_some_and(TypeExpr::is_void);
        let mut out = Vec::with_capacity(stmts.len());
        let mut value = None;
        let mut diverges = false;
        for (i, stmt) in stmts.iter().enumerate() {
            if wants_value && i + 1 == stmts.len() {
                if let StmtKind::Expr(e) = &stmt.kind {
                    let v = self.check_expr(e, expected)?;
                    diverges |= v.ty.is_never();
                    value = Some(Box::new(v));
                    break;
                }
            }
            if let Some(hir) = self.check_stmt(stmt, &nested)? {
                diverges |= stmt_diverges(&hir);
                out.push(hir);
            }
        }
        let ty = match &value {
            _ if diverges => TypeExpr::Never,
            Some(v) => v.ty.clone(),
            None => TypeExpr::Void,
        };
        Ok(HirExpr::new(HirExprKind::Block { stmts: out, value }, ty, span))
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) -> Result<Vec<HirStmt>, DispatchError> {
        self.frame.scopes.push(Scope::default());
        let result = self.check_stmts_inner(stmts);
        self.frame.scopes.pop();
        result
    }

    fn check_stmts_inner(&mut self, stmts: &[Stmt]) -> Result<Vec<HirStmt>, DispatchError> {
        let nested = self.declare_nested(stmts)?;
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if let Some(hir) = self.check_stmt(stmt, &nested)? {
                out.push(hir);
            }
        }
        Ok(out)
    }

    fn check_stmt(&mut self, stmt: &Stmt, nested: &NestedDecls) -> Result<Option<HirStmt>, DispatchError> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::Expr(e) => HirStmtKind::Expr(self.check_expr(e, Some(&VOID))?),
            StmtKind::Let { name, is_mut, ty, init } => {
                let declared = match ty {
                    Some(annot) => Some(collect::resolve_annot(self.types, annot, &self.frame.type_params, span)?),
                    None => None,
                };
                let init = self.check_expr(init, declared.as_ref())?;
                let ty = match &declared {
                    Some(declared) => Unifier::new(self.types).unify(declared, &init.ty, span)?,
                    None => init.ty.clone(),
                };
                if !init.ty.is_never() {
                    self.types.check_computable(&ty, span)?;
                }
                let known = if *is_mut { Knowledge::Unknown } else { self.knowledge_of(&init) };
                let local = self.frame.declare(name, Local { name: name.clone(), ty, mutable: *is_mut, kind: LocalKind::Let });
                if known != Knowledge::Unknown {
                    self.frame.knowledge.insert(local, known);
                }
                HirStmtKind::Let { local, init }
            }
            StmtKind::Assign { target, value } => {
                let place = self.check_place(target)?;
                self.require_mutable(&place, span, true)?;
                let slot = storage_read_type(&place.ty);
                let value = self.check_expr(value, Some(&slot))?;
                Unifier::new(self.types).unify(&slot, &value.ty, span)?;
                HirStmtKind::Assign { place, value }
            }
            StmtKind::Return(value) => {
                if self.frame.is_template {
                    // Leaves the function the template is expanded into; checked
                    // against that function's result once expanded.
                    let ret = self.frame.ret.clone();
                    let value = value.as_ref().map(|v| self.check_expr(v, Some(&ret))).transpose()?;
                    HirStmtKind::Return(value)
                } else {
                    let ret = self.frame.ret.clone();
                    HirStmtKind::Return(self.check_result_value(value.as_ref(), &ret, span)?)
                }
            }
            StmtKind::Break(value) => {
                if self.frame.loop_depth > 0 {
                    if value.is_some() {
                        return Err(DispatchError::BreakValueInLoop { span });
                    }
                    HirStmtKind::Break { target: BreakTarget::Loop, value: None }
                } else if self.frame.is_template {
                    let ret = self.frame.ret.clone();
                    let value = self.check_result_value(value.as_ref(), &ret, span)?;
                    HirStmtKind::Break { target: BreakTarget::TemplateResult, value }
                } else {
                    return Err(DispatchError::BreakOutsideLoop { span });
                }
            }
            StmtKind::Continue => {
                if self.frame.loop_depth == 0 {
                    return Err(DispatchError::ContinueOutsideLoop { span });
                }
                HirStmtKind::Continue
            }
            StmtKind::Loop(body) => {
                self.frame.loop_depth += 1;
                let body = self.check_stmts(body);
                self.frame.loop_depth -= 1;
                HirStmtKind::Loop(body?)
            }
            StmtKind::FnDef(clause) => {
                let Some(&(group, index)) = nested.positions.get(&(clause as *const FnClause)) else {
                    return Ok(None);
                };
                self.check_nested_clause(group, index, clause)?;
                if index > 0 {
                    return Ok(None);
                }
                HirStmtKind::FnDef(group)
            }
        };
        Ok(Some(HirStmt::new(kind, span)))
    }

    /// A returned or template-result value against `ret`.
    fn check_result_value(
        &mut self,
        value: Option<&kiln_ast::Expr>,
        ret: &TypeExpr,
        span: Span,
    ) -> Result<Option<HirExpr>, DispatchError> {
        match value {
            Some(v) => {
                let hir = self.check_expr(v, Some(ret))?;
                Unifier::new(self.types).unify(ret, &hir.ty, span)?;
                Ok(Some(hir))
            }
            None if ret.is_void() => Ok(None),
            None => Err(DispatchError::MissingReturn {
                function: self.frame.name.clone(),
                expected: ret.clone(),
                span,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Nested functions
    // ------------------------------------------------------------------

    /// Declares the nested functions of a block up front so they can call
    /// each other regardless of order.
    fn declare_nested(&mut self, stmts: &[Stmt]) -> Result<NestedDecls, DispatchError> {
        let clauses = stmts.iter().filter_map(|s| match &s.kind {
            StmtKind::FnDef(clause) => Some(clause),
            _ => None,
        });
        let mut decls = NestedDecls::default();
        for (name, members) in collect::group_by_name(clauses) {
            let id = self.program.reserve_group();
            let origin = GroupOrigin::Nested { parent: self.frame.group, clause: self.frame.clause };
            let group = collect::build_group(id, &name, &members, self.types, Some(self.frame.type_params.as_slice()), origin)?;
            if group.flags != Default::default() {
                return Err(DispatchError::InvalidNested {
                    function: name,
                    reason: "nested functions cannot carry flags".into(),
                    span: group.span,
                });
            }
            tracing::trace!(function = %name, parent = %self.frame.name, "nested function");
            self.program.insert_group(group);
            if let Some(scope) = self.frame.scopes.last_mut() {
                if scope.functions.insert(name.clone(), id).is_some() {
                    return Err(DispatchError::DuplicateName { name, span: members[0].span });
                }
            }
            for (index, clause) in members.into_iter().enumerate() {
                decls.positions.insert(clause as *const FnClause, (id, index));
            }
        }
        Ok(decls)
    }

    fn check_nested_clause(&mut self, group: GroupId, index: usize, clause: &FnClause) -> Result<(), DispatchError> {
        let frame = Frame::new(self.group(group)?, index);
        let parent = std::mem::replace(&mut self.frame, frame);
        self.outer.push(parent);
        let body = self.check_function_body(&clause.body);
        if let Some(parent) = self.outer.pop() {
            let frame = std::mem::replace(&mut self.frame, parent);
            store_body(self.program, group, index, body?, frame.locals);
        }
        Ok(())
    }
}

/// Reserved nested groups of one block, keyed by clause address.
#[derive(Default)]
struct NestedDecls {
    positions: HashMap<*const FnClause, (GroupId, usize)>,
}

fn store_body(program: &mut HirProgram, group: GroupId, clause: usize, body: HirExpr, locals: LocalTable) {
    if let Some(slot) = program.group_mut(group).and_then(|g| g.clauses.get_mut(clause)) {
        slot.body = Some(body);
        slot.locals = locals;
    }
}

/// The type a value must have to be stored through a place of type `ty`.
fn storage_read_type(ty: &TypeExpr) -> TypeExpr {
    match ty {
        TypeExpr::Heap(kind) => TypeExpr::Stack(kind.widened()),
        other => other.clone(),
    }
}

fn stmt_diverges(stmt: &HirStmt) -> bool {
    match &stmt.kind {
        HirStmtKind::Return(_) | HirStmtKind::Break { .. } | HirStmtKind::Continue => true,
        HirStmtKind::Loop(body) => !visit::loop_breaks(body),
        HirStmtKind::Let { init: e, .. } | HirStmtKind::Expr(e) => e.ty.is_never(),
        HirStmtKind::Assign { value, .. } => value.ty.is_never(),
        HirStmtKind::FnDef(_) => false,
    }
}
