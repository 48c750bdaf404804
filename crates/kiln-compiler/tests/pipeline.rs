// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Whole-pipeline behavior of single modules.

use kiln_ast::build::*;
use kiln_ast::{BinOp, Expr, Item, NumSuffix, Param, Stmt, TypeAnnot};
use kiln_compiler::{CompileError, CompileOptions, CompiledModule, Session};
use kiln_diagnostics::{Classify, ErrorKind, ToDiagnostic};
use kiln_ir::{IrConst, IrExpr, IrExprKind, IrFunction, IrPlace, IrStmt};
use kiln_types::TypeExpr;
use pretty_assertions::assert_eq;

fn compile_with(items: Vec<Item>, liberal: bool) -> Result<CompiledModule, CompileError> {
    kiln_compiler::init_tracing();
    Session::new(module("m", items), Vec::new(), CompileOptions { liberal }).compile()
}

fn compile(items: Vec<Item>) -> CompiledModule {
    compile_with(items, false).unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn failure(items: Vec<Item>) -> ErrorKind {
    match compile_with(items, false) {
        Ok(_) => panic!("compiled, expected an error"),
        Err(e) => e.kind(),
    }
}

fn function<'m>(compiled: &'m CompiledModule, name: &str) -> &'m IrFunction {
    compiled.ir.find(name).unwrap_or_else(|| panic!("no function `{name}`"))
}

fn exprs<'a>(e: &'a IrExpr, out: &mut Vec<&'a IrExpr>) {
    out.push(e);
    match &e.kind {
        IrExprKind::Read(place) | IrExprKind::AddressOf(place) => place_exprs(place, out),
        IrExprKind::Call { args, .. } => args.iter().for_each(|a| exprs(a, out)),
        IrExprKind::CallIndirect { callee, args } => {
            exprs(callee, out);
            args.iter().for_each(|a| exprs(a, out));
        }
        IrExprKind::Binary { lhs, rhs, .. } => {
            exprs(lhs, out);
            exprs(rhs, out);
        }
        IrExprKind::Unary { operand, .. } | IrExprKind::Cast(operand) | IrExprKind::Payload(operand) => {
            exprs(operand, out)
        }
        IrExprKind::Discriminant { value, .. } => exprs(value, out),
        IrExprKind::Product(fields) => fields.iter().for_each(|(_, v)| exprs(v, out)),
        IrExprKind::Variant { payload: Some(p), .. } => exprs(p, out),
        IrExprKind::Block { stmts, value } => {
            stmts.iter().for_each(|s| stmt_exprs(s, out));
            if let Some(v) = value {
                exprs(v, out);
            }
        }
        IrExprKind::If { cond, then_branch, else_branch } => {
            exprs(cond, out);
            exprs(then_branch, out);
            if let Some(b) = else_branch {
                exprs(b, out);
            }
        }
        IrExprKind::Labeled { body, .. } => exprs(body, out),
        _ => {}
    }
}

fn stmt_exprs<'a>(s: &'a IrStmt, out: &mut Vec<&'a IrExpr>) {
    match s {
        IrStmt::Let { value, .. } | IrStmt::Expr(value) | IrStmt::Return(Some(value)) => exprs(value, out),
        IrStmt::Break { value: Some(value), .. } => exprs(value, out),
        IrStmt::Store { place, value } => {
            place_exprs(place, out);
            exprs(value, out);
        }
        IrStmt::Loop(body) => body.iter().for_each(|s| stmt_exprs(s, out)),
        _ => {}
    }
}

fn place_exprs<'a>(place: &'a IrPlace, out: &mut Vec<&'a IrExpr>) {
    match place {
        IrPlace::Local(_) => {}
        IrPlace::Deref(e) => exprs(e, out),
        IrPlace::Field { base, .. } | IrPlace::Bits { base, .. } => place_exprs(base, out),
    }
}

fn all_exprs(f: &IrFunction) -> Vec<&IrExpr> {
    let mut out = Vec::new();
    if let Some(body) = &f.body {
        exprs(body, &mut out);
    }
    out
}

/// Integer constants `f` returns directly.
fn returned_constants(f: &IrFunction) -> Vec<i64> {
    let mut out = Vec::new();
    for e in all_exprs(f) {
        if let IrExprKind::Block { stmts, .. } = &e.kind {
            for s in stmts {
                if let IrStmt::Return(Some(IrExpr { kind: IrExprKind::Const(IrConst::Int(v, _)), .. })) = s {
                    out.push(*v);
                }
            }
        }
    }
    out
}

fn called<'m>(compiled: &'m CompiledModule, caller: &str) -> Vec<&'m IrFunction> {
    all_exprs(function(compiled, caller))
        .into_iter()
        .filter_map(|e| match e.kind {
            IrExprKind::Call { func, .. } => compiled.ir.function(func),
            _ => None,
        })
        .collect()
}

fn pick(zero_first: bool) -> Vec<Item> {
    let zero = clause("pick").param(lit("n", 0)).returns(ty("u32")).body(vec![ret(int(1))]).item();
    let any = clause("pick").param(bind("n", ty("u32"))).returns(ty("u32")).body(vec![ret(int(2))]).item();
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("pick", vec![int(0)]))]).item();
    if zero_first {
        vec![zero, any, main]
    } else {
        vec![any, zero, main]
    }
}

#[test]
fn constant_arguments_select_the_first_matching_clause() {
    let compiled = compile(pick(true));
    let targets = called(&compiled, "main");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "pick#0");
    assert_eq!(returned_constants(targets[0]), vec![1]);
    // Statically chosen clauses need no dispatcher.
    assert!(compiled.ir.find("pick").is_none());

    let swapped = compile(pick(false));
    let targets = called(&swapped, "main");
    assert_eq!(returned_constants(targets[0]), vec![2]);
}

fn shared_u32() -> TypeAnnot {
    TypeAnnot::borrow(ty("u32"))
}

#[test]
fn borrows_of_a_callers_local_cannot_be_returned() {
    let foo = clause("foo")
        .param(bind("a", shared_u32()))
        .param(bind("b", shared_u32()))
        .returns(shared_u32())
        .body(vec![ret(ident("a"))])
        .item();
    let bar = clause("bar")
        .param(bind("a", shared_u32()))
        .returns(shared_u32())
        .body(vec![
            let_typed("x", false, ty("u32"), int(5)),
            ret(call("foo", vec![ident("a"), ref_(ident("x"))])),
        ])
        .item();
    assert_eq!(failure(vec![foo.clone(), bar]), ErrorKind::LifetimeEscape);

    let compiled = compile(vec![foo]);
    assert_eq!(function(&compiled, "foo").returns_borrow_of, vec![0]);
}

#[test]
fn loops_need_a_reachable_continue() {
    let f = clause("f").body(vec![loop_(vec![brk(None)])]).item();
    assert_eq!(failure(vec![f]), ErrorKind::LoopWithoutContinue);

    let dead = clause("f").body(vec![loop_(vec![brk(None), cont()])]).item();
    assert_eq!(failure(vec![dead]), ErrorKind::LoopWithoutContinue);

    let err = compile_with(vec![clause("f").body(vec![loop_(vec![brk(None)])]).item()], false).unwrap_err();
    assert_eq!(err.stage(), "borrow");
    let diag = err.to_diagnostic();
    assert_eq!(diag.code.map(|c| c.0), Some("K0010".to_string()));
    assert!(diag.help.is_some());
}

#[test]
fn division_by_zero_clause_wins_when_inlining() {
    let by_zero = clause("calculate")
        .template()
        .param(bind("n", ty("u32")))
        .param(lit("d", 0))
        .returns(ty("u32"))
        .body(vec![brk(Some(int(0)))]);
    let general = clause("calculate")
        .template()
        .param(bind("n", ty("u32")))
        .param(bind("d", ty("u32")))
        .returns(ty("u32"))
        .body(vec![brk(Some(binary(BinOp::Div, ident("n"), ident("d"))))]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("calculate", vec![int(5), int(0)]))]);
    let compiled = compile(vec![by_zero.item(), general.item(), main.item()]);

    assert!(compiled.ir.find("calculate").is_none());
    let main = function(&compiled, "main");
    let divisions = all_exprs(main)
        .into_iter()
        .filter(|e| matches!(e.kind, IrExprKind::Binary { op: BinOp::Div, .. }))
        .count();
    assert_eq!(divisions, 0);
    assert!(all_exprs(main).iter().any(|e| matches!(e.kind, IrExprKind::Labeled { .. })));
}

#[test]
fn lifting_is_idempotent() {
    let inc = clause("inc").body(vec![assign(ident("x"), binary(BinOp::Add, ident("x"), int(1)))]).build();
    let main = clause("main")
        .returns(ty("u32"))
        .body(vec![
            let_typed("x", true, ty("u32"), int(0)),
            fn_def(inc),
            expr_stmt(call("inc", vec![])),
            ret(ident("x")),
        ])
        .item();

    let program = kiln_dispatch::resolve_module(&module("m", vec![main]), &[]).unwrap();
    let report = kiln_borrow::check_program(&program).unwrap();
    let lifted = kiln_lift::lift_program(program, &report).unwrap();
    let report = kiln_borrow::check_program(&lifted).unwrap();
    assert!(report.captures.is_empty());
    let again = kiln_lift::lift_program(lifted.clone(), &report).unwrap();
    assert_eq!(again, lifted);

    let inc = lifted.find("main$inc").unwrap();
    assert_eq!(inc.params, vec![TypeExpr::borrow(true, TypeExpr::u32())]);
}

fn shape() -> Item {
    sum_item("Shape", &[], vec![("Circle", Some(ty("f32"))), ("Empty", None)])
}

#[test]
fn sums_cross_the_host_boundary_only_behind_a_pointer() {
    let direct = clause("area").param(bind("s", ty("Shape"))).returns(ty("f32")).body(vec![ret(float(1.0))]).export();
    assert_eq!(failure(vec![shape(), direct.item()]), ErrorKind::UnexportableType);

    let behind = clause("area")
        .param(bind("s", TypeAnnot::borrow(ty("Shape"))))
        .returns(ty("f32"))
        .body(vec![ret(float(1.0))])
        .export();
    let compiled = compile(vec![shape(), behind.item()]);
    let export = compiled.interface.function("area").unwrap();
    assert_eq!(export.params, vec![TypeExpr::borrow(false, TypeExpr::named("Shape"))]);
    assert_eq!(compiled.name(), "m");
}

#[test]
fn packed_types_stay_under_64_bits() {
    fn flags(fields: &[(&str, &str)]) -> Item {
        let fields = fields.iter().map(|(n, k)| (n.to_string(), k.to_string())).collect();
        type_item("Flags", &[], TypeAnnot::Packed(fields))
    }
    let main = || clause("main").returns(ty("u32")).body(vec![ret(int(0))]).item();
    let base = [("b1", "bool"), ("b2", "bool"), ("u8", "u8"), ("u16", "u16")];
    compile(vec![flags(&base), main()]);

    let mut wider = base.to_vec();
    wider.push(("w", "u32"));
    compile(vec![flags(&wider), main()]);

    wider.push(("x", "u32"));
    assert_eq!(failure(vec![flags(&wider), main()]), ErrorKind::PackedSizeExceeded);
}

#[test]
fn stored_function_values_need_liberal_mode() {
    let op = |name: &str, k: i64| {
        clause(name)
            .param(bind("x", ty("u32")))
            .returns(ty("u32"))
            .body(vec![ret(binary(BinOp::Mul, ident("x"), int(k)))])
            .item()
    };
    let main = clause("main")
        .returns(ty("u32"))
        .body(vec![
            let_typed("g", true, TypeAnnot::function(vec![ty("u32")], ty("u32")), ident("double")),
            assign(ident("g"), ident("triple")),
            ret(call("g", vec![int(1)])),
        ])
        .item();
    let items = vec![op("double", 2), op("triple", 3), main];

    let err = compile_with(items.clone(), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonInlinableIndirectCall);
    assert_eq!(err.stage(), "inline");

    let compiled = compile_with(items, true).unwrap();
    assert_eq!(compiled.ir.indirect.len(), 2);
    assert!(compiled.ir.indirect.iter().all(|id| compiled.ir.function(*id).is_some_and(|f| f.indirect_callable)));
}

#[test]
fn template_returns_must_fit_the_caller() {
    let bail = |stmt: Stmt| clause("bail").template().param(bind("x", ty("u32"))).returns(ty("u32")).body(vec![stmt]).item();
    let main = || clause("main").returns(ty("u32")).body(vec![ret(call("bail", vec![int(1)]))]).item();

    let compiled = compile(vec![bail(ret(int(7))), main()]);
    assert!(compiled.ir.find("bail").is_none());

    let err = compile_with(vec![bail(ret(int_as(7, NumSuffix::U64))), main()], false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(err.stage(), "inline");
    assert_eq!(failure(vec![bail(ret_void()), main()]), ErrorKind::TypeMismatch);
}

#[test]
fn recursive_callees_call_function_values_through_the_table() {
    let apply = |n: Param, step: Expr| {
        clause("apply")
            .param(bind("f", TypeAnnot::function(vec![ty("u32")], ty("u32"))))
            .param(n)
            .returns(ty("u32"))
            .body(vec![ret(step)])
            .item()
    };
    let double = clause("double")
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(BinOp::Mul, ident("x"), int(2)))])
        .item();
    let recurse = call("f", vec![call("apply", vec![ident("f"), binary(BinOp::Sub, ident("n"), int(1))])]);
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("apply", vec![ident("double"), int(3)]))]).item();
    let items = vec![double, apply(lit("n", 0), int(0)), apply(bind("n", ty("u32")), recurse), main];

    assert_eq!(failure(items.clone()), ErrorKind::NonInlinableIndirectCall);

    let compiled = compile_with(items, true).unwrap();
    assert_eq!(compiled.ir.indirect.len(), 1);
    let entry = compiled.ir.function(compiled.ir.indirect[0]).unwrap();
    assert_eq!(entry.name, "double");
    assert!(entry.indirect_callable);
    assert!(all_exprs(function(&compiled, "apply")).iter().any(|e| matches!(e.kind, IrExprKind::CallIndirect { .. })));
}
