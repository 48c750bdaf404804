// SPDX-License-Identifier: (MIT OR Apache-2.0)

use kiln_ast::build::*;
use kiln_ast::{BinOp, Item, NumSuffix, TypeAnnot};
use kiln_dispatch::DispatchError;
use kiln_hir::visit;
use kiln_hir::{BreakTarget, GroupOrigin, HirExpr, HirExprKind, HirProgram, HirStmtKind, LabelId, Pattern};
use kiln_types::{StackKind, TypeError, TypeExpr};
use pretty_assertions::assert_eq;

use crate::{inline_program, InlineError, InlineOutput};

fn inline(items: Vec<Item>, liberal: bool) -> Result<InlineOutput, InlineError> {
    let program = kiln_dispatch::resolve_module(&module("m", items), &[]).unwrap();
    let report = kiln_borrow::check_program(&program).unwrap();
    let lifted = kiln_lift::lift_program(program, &report).unwrap();
    inline_program(lifted, liberal)
}

fn body<'p>(program: &'p HirProgram, name: &str) -> &'p HirExpr {
    program.find(name).unwrap().clauses[0].body.as_ref().unwrap()
}

fn inlined(expr: &HirExpr) -> Vec<(LabelId, &HirExpr)> {
    let mut out = Vec::new();
    visit::walk_expr(expr, &mut |e| {
        if let HirExprKind::Inlined { label, body } = &e.kind {
            out.push((*label, body.as_ref()));
        }
    });
    out
}

fn breaks_to(expr: &HirExpr, label: LabelId) -> usize {
    let mut count = 0;
    visit::walk_expr(expr, &mut |e| {
        if let HirExprKind::Block { stmts, .. } = &e.kind {
            count += stmts
                .iter()
                .filter(|s| matches!(s.kind, HirStmtKind::Break { target: BreakTarget::Label(l), .. } if l == label))
                .count();
        }
    });
    count
}

fn count(expr: &HirExpr, pred: impl Fn(&HirExpr) -> bool) -> usize {
    let mut n = 0;
    visit::walk_expr(expr, &mut |e| {
        if pred(e) {
            n += 1;
        }
    });
    n
}

fn calls(program: &HirProgram, caller: &str, callee: &str) -> usize {
    let Some(callee) = program.find(callee).map(|g| g.id) else { return 0 };
    count(body(program, caller), |e| matches!(&e.kind, HirExprKind::Call { target, .. } if target.group() == callee))
}

fn u32_fn() -> TypeAnnot {
    TypeAnnot::function(vec![ty("u32")], ty("u32"))
}

fn double() -> Item {
    clause("double")
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(BinOp::Mul, ident("x"), int(2)))])
        .item()
}

#[test]
fn template_calls_expand_into_labelled_blocks() {
    let pick = clause("pick").template().param(bind("x", ty("u32"))).returns(ty("u32")).body(vec![brk(Some(ident("x")))]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(binary(BinOp::Add, call("pick", vec![int(3)]), int(1)))]);
    let out = inline(vec![pick.item(), main.item()], false).unwrap();
    assert!(out.program.find("pick").is_none());

    let main = body(&out.program, "main");
    assert_eq!(count(main, |e| matches!(e.kind, HirExprKind::Call { .. })), 0);
    let blocks = inlined(main);
    assert_eq!(blocks.len(), 1);
    let (label, expansion) = blocks[0];
    assert_eq!(breaks_to(expansion, label), 1);
    match &expansion.kind {
        HirExprKind::Match { scrutinees, arms } => {
            assert!(matches!(scrutinees[..], [HirExpr { kind: HirExprKind::Int(3), .. }]));
            assert_eq!(arms.len(), 1);
        }
        other => panic!("expected match, got {other:?}"),
    }
}

#[test]
fn return_inside_a_getter_yields_the_inlined_value() {
    let twice = clause("twice")
        .pure()
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(BinOp::Mul, ident("x"), int(2)))]);
    let main = clause("main")
        .returns(ty("u32"))
        .body(vec![let_typed("v", false, ty("u32"), int(4)), ret(field(ident("v"), "twice"))]);
    let out = inline(vec![twice.item(), main.item()], false).unwrap();
    assert_eq!(calls(&out.program, "main", "twice"), 0);
    let main = body(&out.program, "main");
    let blocks = inlined(main);
    assert_eq!(blocks.len(), 1);
    assert_eq!(breaks_to(blocks[0].1, blocks[0].0), 1);
    let returns = count(main, |e| match &e.kind {
        HirExprKind::Block { stmts, .. } => stmts.iter().any(|s| matches!(s.kind, HirStmtKind::Return(_))),
        _ => false,
    });
    // Only main's own `return` is left.
    assert_eq!(returns, 1);
    assert!(out.program.find("twice").is_some());
}

#[test]
fn expanded_clauses_keep_their_order() {
    let by_zero = clause("calc")
        .template()
        .param(bind("x", ty("u32")))
        .param(lit("y", 0))
        .returns(ty("u32"))
        .body(vec![brk(Some(int(0)))]);
    let general = clause("calc")
        .template()
        .param(bind("x", ty("u32")))
        .param(bind("y", ty("u32")))
        .returns(ty("u32"))
        .body(vec![brk(Some(binary(BinOp::Sub, ident("x"), ident("y"))))]);
    let main = clause("main")
        .param(bind("n", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(
            BinOp::Add,
            call("calc", vec![int(5), int(0)]),
            call("calc", vec![int(5), ident("n")]),
        ))]);
    let out = inline(vec![by_zero.item(), general.item(), main.item()], false).unwrap();
    let blocks = inlined(body(&out.program, "main"));
    assert_eq!(blocks.len(), 2);

    let arms = |e: &HirExpr| match &e.kind {
        HirExprKind::Match { arms, .. } => arms.iter().map(|a| a.patterns[1].clone()).collect::<Vec<_>>(),
        other => panic!("expected match, got {other:?}"),
    };
    let known = arms(blocks[0].1);
    assert_eq!(known.len(), 1);
    assert!(matches!(known[0], Pattern::Literal { value: 0, .. }));
    let runtime = arms(blocks[1].1);
    assert_eq!(runtime.len(), 2);
    assert!(matches!(runtime[0], Pattern::Literal { value: 0, .. }));
    assert!(matches!(runtime[1], Pattern::Bind { .. }));
}

#[test]
fn function_arguments_of_templates_become_direct_calls() {
    let twice = clause("twice")
        .template()
        .param(bind("f", u32_fn()))
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![brk(Some(call("f", vec![call("f", vec![ident("x")])])))]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("twice", vec![ident("double"), int(1)]))]);
    let out = inline(vec![double(), twice.item(), main.item()], false).unwrap();
    let main = body(&out.program, "main");
    assert_eq!(count(main, |e| matches!(e.kind, HirExprKind::IndirectCall { .. })), 0);
    assert_eq!(count(main, |e| matches!(e.kind, HirExprKind::FnRef(_))), 0);
    assert_eq!(calls(&out.program, "main", "double"), 2);
    match &inlined(main)[0].1.kind {
        HirExprKind::Match { scrutinees, arms } => {
            assert_eq!(scrutinees.len(), 1);
            assert_eq!(arms[0].patterns.len(), 1);
        }
        other => panic!("expected match, got {other:?}"),
    }
    assert!(out.indirect.is_empty());
}

#[test]
fn known_function_arguments_are_specialized() {
    let apply = clause("apply")
        .param(bind("f", u32_fn()))
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(call("f", vec![ident("x")]))]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("apply", vec![ident("double"), int(3)]))]);
    let out = inline(vec![double(), apply.item(), main.item()], false).unwrap();
    let program = &out.program;

    assert!(program.find("apply").is_none());
    let specialized = program.find("apply$double").unwrap();
    assert!(matches!(specialized.origin, GroupOrigin::Specialized { .. }));
    assert_eq!(specialized.params, vec![TypeExpr::u32()]);
    assert_eq!(calls(program, "apply$double", "double"), 1);
    assert_eq!(count(body(program, "apply$double"), |e| matches!(e.kind, HirExprKind::IndirectCall { .. })), 0);

    assert_eq!(calls(program, "main", "apply$double"), 1);
    assert!(out.indirect.is_empty());
}

#[test]
fn specialized_copies_take_the_captures_of_lifted_values() {
    let apply = clause("apply")
        .param(bind("f", TypeAnnot::function(vec![], ty("void"))))
        .body(vec![expr_stmt(call("f", vec![]))])
        .item();
    let inc = clause("inc").body(vec![assign(ident("n"), binary(BinOp::Add, ident("n"), int(1)))]).build();
    let main = clause("main")
        .returns(ty("u32"))
        .body(vec![
            let_typed("n", true, ty("u32"), int(0)),
            fn_def(inc),
            expr_stmt(call("apply", vec![ident("inc")])),
            ret(ident("n")),
        ])
        .item();
    let out = inline(vec![apply, main], false).unwrap();
    let specialized = out.program.find("apply$main$inc").unwrap();
    assert_eq!(specialized.params, vec![TypeExpr::borrow(true, TypeExpr::u32())]);
    assert_eq!(calls(&out.program, "apply$main$inc", "main$inc"), 1);
    kiln_borrow::check_program(&out.program).unwrap();
}

#[test]
fn stored_function_values_need_liberal_mode() {
    let triple = clause("triple")
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(BinOp::Mul, ident("x"), int(3)))])
        .item();
    let main = clause("main")
        .returns(ty("u32"))
        .body(vec![
            let_typed("g", true, u32_fn(), ident("double")),
            assign(ident("g"), ident("triple")),
            ret(call("g", vec![int(1)])),
        ])
        .item();
    let items = vec![double(), triple, main];

    match inline(items.clone(), false).unwrap_err() {
        InlineError::NonInlinableIndirectCall { function, value, reason, .. } => {
            assert_eq!(function, "main");
            assert_eq!(value, "double");
            assert_eq!(reason, None);
        }
        other => panic!("expected NonInlinableIndirectCall, got {other:?}"),
    }

    let out = inline(items, true).unwrap();
    let ids: Vec<_> = ["double", "triple"].iter().map(|n| out.program.find(n).unwrap().id).collect();
    assert_eq!(out.indirect, ids);
    let main = body(&out.program, "main");
    assert_eq!(count(main, |e| matches!(e.kind, HirExprKind::FnHandle { handle: 1, .. })), 1);
    assert_eq!(count(main, |e| matches!(e.kind, HirExprKind::IndirectCall { .. })), 1);
}

fn bail(value: Option<kiln_ast::Expr>) -> Item {
    let stmt = match value {
        Some(v) => ret(v),
        None => ret_void(),
    };
    clause("bail").template().param(bind("x", ty("u32"))).returns(ty("u32")).body(vec![stmt]).item()
}

fn bail_from_main(value: Option<kiln_ast::Expr>) -> Result<InlineOutput, InlineError> {
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("bail", vec![int(1)]))]);
    inline(vec![bail(value), main.item()], false)
}

#[test]
fn template_returns_are_checked_against_the_caller() {
    let out = bail_from_main(Some(int(7))).unwrap();
    let main = body(&out.program, "main");
    let mut returned = Vec::new();
    for stmt in visit::returns(main) {
        if let HirStmtKind::Return(Some(v)) = &stmt.kind {
            returned.push(v.ty.clone());
        }
    }
    assert_eq!(returned, vec![TypeExpr::u32(), TypeExpr::u32()]);

    match bail_from_main(Some(int_as(7, NumSuffix::U64))).unwrap_err() {
        InlineError::Dispatch(DispatchError::Type(TypeError::Mismatch { expected, found, .. })) => {
            assert_eq!(expected, TypeExpr::u32());
            assert_eq!(found, TypeExpr::Stack(StackKind::U64));
        }
        other => panic!("expected a mismatch, got {other:?}"),
    }

    match bail_from_main(None).unwrap_err() {
        InlineError::Dispatch(DispatchError::MissingReturn { function, expected, .. }) => {
            assert_eq!(function, "main");
            assert_eq!(expected, TypeExpr::u32());
        }
        other => panic!("expected MissingReturn, got {other:?}"),
    }
}

#[test]
fn template_returns_wait_for_a_function_caller() {
    // `outer` is a template too, so nothing is checked until `main`.
    let outer = clause("outer")
        .template()
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![brk(Some(call("bail", vec![ident("x")])))]);
    let main = clause("main").body(vec![expr_stmt(call("outer", vec![int(1)]))]);
    match inline(vec![bail(Some(int(7))), outer.item(), main.item()], false).unwrap_err() {
        InlineError::Dispatch(DispatchError::Type(TypeError::Mismatch { expected, .. })) => {
            assert_eq!(expected, TypeExpr::Void);
        }
        other => panic!("expected a mismatch, got {other:?}"),
    }
}

#[test]
fn function_values_passed_to_recursive_callees_stay_indirect() {
    let done = clause("apply")
        .param(bind("f", u32_fn()))
        .param(lit("n", 0))
        .returns(ty("u32"))
        .body(vec![ret(int(0))]);
    let step = clause("apply")
        .param(bind("f", u32_fn()))
        .param(bind("n", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(call(
            "f",
            vec![call("apply", vec![ident("f"), binary(BinOp::Sub, ident("n"), int(1))])],
        ))]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("apply", vec![ident("double"), int(3)]))]);
    let items = vec![double(), done.item(), step.item(), main.item()];

    match inline(items.clone(), false).unwrap_err() {
        InlineError::NonInlinableIndirectCall { function, value, reason, .. } => {
            assert_eq!(function, "main");
            assert_eq!(value, "double");
            assert_eq!(reason, None);
        }
        other => panic!("expected NonInlinableIndirectCall, got {other:?}"),
    }

    let out = inline(items, true).unwrap();
    assert!(out.program.find("apply$double").is_none());
    assert_eq!(out.indirect, vec![out.program.find("double").unwrap().id]);
    assert_eq!(count(body(&out.program, "main"), |e| matches!(e.kind, HirExprKind::FnHandle { handle: 0, .. })), 1);
    let apply = out.program.find("apply").unwrap();
    let indirect: usize = apply
        .clauses
        .iter()
        .filter_map(|c| c.body.as_ref())
        .map(|b| count(b, |e| matches!(e.kind, HirExprKind::IndirectCall { .. })))
        .sum();
    assert_eq!(indirect, 1);
}

#[test]
fn recursive_templates_are_rejected() {
    let spin = clause("spin")
        .template()
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![brk(Some(call("spin", vec![ident("x")])))]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("spin", vec![int(1)]))]);
    match inline(vec![spin.item(), main.item()], true).unwrap_err() {
        InlineError::RecursiveTemplate { function, .. } => assert_eq!(function, "spin"),
        other => panic!("expected RecursiveTemplate, got {other:?}"),
    }
}
