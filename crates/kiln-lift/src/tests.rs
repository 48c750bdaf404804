// SPDX-License-Identifier: (MIT OR Apache-2.0)

use kiln_ast::build::*;
use kiln_ast::{BinOp, Item, TypeAnnot};
use kiln_hir::visit;
use kiln_hir::{GroupOrigin, HirExpr, HirExprKind, HirProgram, HirStmtKind, LocalKind};
use kiln_types::TypeExpr;
use pretty_assertions::assert_eq;

use crate::{lift_program, LiftError};

fn lift(items: Vec<Item>) -> Result<HirProgram, LiftError> {
    let program = kiln_dispatch::resolve_module(&module("m", items), &[]).unwrap();
    let report = kiln_borrow::check_program(&program).unwrap();
    lift_program(program, &report)
}

fn body<'p>(program: &'p HirProgram, name: &str) -> &'p HirExpr {
    program.find(name).unwrap().clauses[0].body.as_ref().unwrap()
}

fn calls_to<'p>(program: &'p HirProgram, caller: &str, callee: &str) -> Vec<&'p [HirExpr]> {
    let callee = program.find(callee).unwrap().id;
    let mut out = Vec::new();
    visit::walk_expr(body(program, caller), &mut |e| {
        if let HirExprKind::Call { target, args, .. } = &e.kind {
            if target.group() == callee {
                out.push(args.as_slice());
            }
        }
    });
    out
}

fn counter(extra: Vec<kiln_ast::Stmt>) -> Item {
    let inc = clause("inc").body(vec![assign(ident("n"), binary(BinOp::Add, ident("n"), int(1)))]).build();
    let mut stmts = vec![let_typed("n", true, ty("u32"), int(0)), fn_def(inc)];
    stmts.extend(extra);
    stmts.push(ret(ident("n")));
    clause("main").returns(ty("u32")).body(stmts).item()
}

#[test]
fn mutated_capture_becomes_a_mutable_borrow_parameter() {
    let program = lift(vec![counter(vec![expr_stmt(call("inc", vec![]))])]).unwrap();
    let inc = program.find("main$inc").unwrap();
    assert!(matches!(inc.origin, GroupOrigin::Lifted { .. }));
    assert_eq!(inc.params, vec![TypeExpr::borrow(true, TypeExpr::u32())]);
    let clause = &inc.clauses[0];
    assert!(clause.locals.iter().all(|(_, l)| !matches!(l.kind, LocalKind::Captured(_))));

    let stmts = match &clause.body.as_ref().unwrap().kind {
        HirExprKind::Block { stmts, .. } => stmts,
        other => panic!("expected block, got {other:?}"),
    };
    match &stmts[0].kind {
        HirStmtKind::Assign { place, .. } => assert!(matches!(place.kind, HirExprKind::Deref(_))),
        other => panic!("expected assignment, got {other:?}"),
    }

    let calls = calls_to(&program, "main", "main$inc");
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0][0].kind, HirExprKind::Ref { mutable: true, .. }));

    let mut defs = 0;
    visit::walk_expr(body(&program, "main"), &mut |e| {
        if let HirExprKind::Block { stmts, .. } = &e.kind {
            defs += stmts.iter().filter(|s| matches!(s.kind, HirStmtKind::FnDef(_))).count();
        }
    });
    assert_eq!(defs, 0);
}

#[test]
fn callers_pass_inherited_captures_through() {
    let twice = clause("twice")
        .body(vec![expr_stmt(call("inc", vec![])), expr_stmt(call("inc", vec![]))])
        .build();
    let program = lift(vec![counter(vec![fn_def(twice), expr_stmt(call("twice", vec![]))])]).unwrap();
    let calls = calls_to(&program, "main$twice", "main$inc");
    assert_eq!(calls.len(), 2);
    // `&mut *n`: a reborrow of twice's own parameter.
    match &calls[0][0].kind {
        HirExprKind::Ref { mutable: true, place } => assert!(matches!(place.kind, HirExprKind::Deref(_))),
        other => panic!("expected reborrow, got {other:?}"),
    }
    // The lifted program still passes the borrow checker.
    kiln_borrow::check_program(&program).unwrap();
}

#[test]
fn immutable_stack_captures_are_copied() {
    let scale = clause("scale")
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(BinOp::Mul, ident("x"), ident("k")))])
        .build();
    let main = clause("main")
        .returns(ty("u32"))
        .body(vec![
            let_typed("k", false, ty("u32"), int(3)),
            fn_def(scale),
            ret(call("scale", vec![int(2)])),
        ])
        .item();
    let program = lift(vec![main]).unwrap();
    assert_eq!(program.find("main$scale").unwrap().params, vec![TypeExpr::u32(), TypeExpr::u32()]);
    let calls = calls_to(&program, "main", "main$scale");
    assert!(matches!(calls[0][0].kind, HirExprKind::Local(_)));
    assert!(matches!(calls[0][1].kind, HirExprKind::Int(2)));
}

#[test]
fn capturing_function_value_may_only_be_a_call_argument() {
    let apply = clause("apply")
        .param(bind("f", TypeAnnot::function(vec![], ty("void"))))
        .body(vec![expr_stmt(call("f", vec![]))])
        .item();
    let passed = lift(vec![apply.clone(), counter(vec![expr_stmt(call("apply", vec![ident("inc")]))])]).unwrap();
    let calls = calls_to(&passed, "main", "apply");
    match &calls[0][0].kind {
        HirExprKind::FnRef(r) => assert_eq!(r.bound.len(), 1),
        other => panic!("expected function value, got {other:?}"),
    }

    let stored = lift(vec![apply, counter(vec![let_("g", ident("inc"))])]).unwrap_err();
    match stored {
        LiftError::EscapingCapture { function, binding, .. } => {
            assert_eq!(function, "main$inc");
            assert_eq!(binding, "n");
        }
    }
}
