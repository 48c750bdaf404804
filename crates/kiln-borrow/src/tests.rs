// SPDX-License-Identifier: (MIT OR Apache-2.0)

use kiln_ast::build::*;
use kiln_ast::{BinOp, Module, TypeAnnot};
use kiln_hir::HirProgram;
use pretty_assertions::assert_eq;

use crate::{check_program, BorrowError, BorrowMode};

fn resolve(m: Module) -> HirProgram {
    kiln_dispatch::resolve_module(&m, &[]).unwrap()
}

fn check(items: Vec<kiln_ast::Item>) -> Result<crate::BorrowReport, BorrowError> {
    check_program(&resolve(module("m", items)))
}

fn shared_u32() -> TypeAnnot {
    TypeAnnot::borrow(ty("u32"))
}

/// `foo(a: &u32, b: &u32) -> &u32 { a }`
fn foo() -> kiln_ast::Item {
    clause("foo")
        .param(bind("a", shared_u32()))
        .param(bind("b", shared_u32()))
        .returns(shared_u32())
        .body(vec![ret(ident("a"))])
        .item()
}

#[test]
fn returned_borrow_of_a_parameter_is_summarized() {
    let program = resolve(module("m", vec![foo()]));
    let report = check_program(&program).unwrap();
    let id = program.find("foo").unwrap().id;
    assert_eq!(report.regions[&(id, 0)].return_borrows_from.iter().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn call_result_lives_only_as_long_as_every_borrow_argument() {
    let bar = clause("bar")
        .param(bind("a", shared_u32()))
        .returns(shared_u32())
        .body(vec![
            let_typed("x", false, ty("u32"), int(5)),
            ret(call("foo", vec![ident("a"), ref_(ident("x"))])),
        ])
        .item();
    let err = check(vec![foo(), bar]).unwrap_err();
    match err {
        BorrowError::LifetimeEscape { function, local, .. } => {
            assert_eq!(function, "bar");
            assert_eq!(local, "x");
        }
        other => panic!("expected LifetimeEscape, got {other:?}"),
    }

    // With two parameters the meet is still the caller's.
    let baz = clause("baz")
        .param(bind("a", shared_u32()))
        .param(bind("b", shared_u32()))
        .returns(shared_u32())
        .body(vec![ret(call("foo", vec![ident("b"), ident("a")]))])
        .item();
    assert!(check(vec![foo(), baz]).is_ok());
}

#[test]
fn borrow_of_a_local_cannot_be_returned() {
    let f = clause("f")
        .param(bind("n", ty("u32")))
        .returns(shared_u32())
        .body(vec![let_typed("x", false, ty("u32"), ident("n")), ret(ref_(ident("x")))])
        .item();
    assert!(matches!(check(vec![f]), Err(BorrowError::LifetimeEscape { .. })));
}

#[test]
fn assigning_an_inner_borrow_to_an_outer_binding_escapes() {
    let f = clause("f")
        .returns(ty("u32"))
        .body(vec![
            let_typed("y", false, ty("u32"), int(1)),
            let_typed("r", true, shared_u32(), ref_(ident("y"))),
            expr_stmt(block(vec![
                let_typed("x", false, ty("u32"), int(2)),
                assign(ident("r"), ref_(ident("x"))),
            ])),
            ret(deref(ident("r"))),
        ])
        .item();
    match check(vec![f]) {
        Err(BorrowError::LifetimeEscape { local, .. }) => assert_eq!(local, "x"),
        other => panic!("expected LifetimeEscape, got {other:?}"),
    }
}

#[test]
fn mutable_borrow_excludes_other_borrows() {
    let f = clause("f")
        .body(vec![
            let_typed("x", true, ty("u32"), int(0)),
            let_("a", ref_mut(ident("x"))),
            let_("b", ref_(ident("x"))),
        ])
        .item();
    match check(vec![f]) {
        Err(BorrowError::BorrowConflict { local, requested, existing, .. }) => {
            assert_eq!(local, "x");
            assert_eq!(requested, BorrowMode::Shared);
            assert_eq!(existing, BorrowMode::Exclusive);
        }
        other => panic!("expected BorrowConflict, got {other:?}"),
    }

    let shared = clause("g")
        .body(vec![
            let_typed("x", false, ty("u32"), int(0)),
            let_("a", ref_(ident("x"))),
            let_("b", ref_(ident("x"))),
        ])
        .item();
    assert!(check(vec![shared]).is_ok());
}

#[test]
fn loans_end_with_their_block() {
    let f = clause("f")
        .body(vec![
            let_typed("x", true, ty("u32"), int(0)),
            expr_stmt(block(vec![let_("a", ref_mut(ident("x")))])),
            let_("b", ref_(ident("x"))),
        ])
        .item();
    assert!(check(vec![f]).is_ok());
}

#[test]
fn arguments_of_one_call_are_borrowed_together() {
    let pair = clause("pair")
        .param(bind("a", TypeAnnot::borrow_mut(ty("u32"))))
        .param(bind("b", shared_u32()))
        .body(vec![assign(deref(ident("a")), deref(ident("b")))])
        .item();
    let main = clause("main")
        .body(vec![
            let_typed("x", true, ty("u32"), int(0)),
            expr_stmt(call("pair", vec![ref_mut(ident("x")), ref_(ident("x"))])),
        ])
        .item();
    assert!(matches!(check(vec![pair.clone(), main]), Err(BorrowError::BorrowConflict { .. })));

    let sequential = clause("main")
        .body(vec![
            let_typed("x", true, ty("u32"), int(0)),
            let_typed("y", false, ty("u32"), int(1)),
            expr_stmt(call("pair", vec![ref_mut(ident("x")), ref_(ident("y"))])),
            expr_stmt(call("pair", vec![ref_mut(ident("x")), ref_(ident("y"))])),
        ])
        .item();
    assert!(check(vec![pair, sequential]).is_ok());
}

/// `type <name> = (a: <field>)`
fn holder(name: &str, field: TypeAnnot) -> kiln_ast::Item {
    type_item(name, &[], TypeAnnot::Product(vec![(Some("a".into()), field)]))
}

#[test]
fn declared_products_carry_the_borrows_they_hold() {
    let bad = clause("bad")
        .returns(ty("P"))
        .body(vec![
            let_typed("y", false, ty("u32"), int(1)),
            ret(product(Some("P"), vec![(Some("a"), ref_(ident("y")))])),
        ])
        .item();
    match check(vec![holder("P", shared_u32()), bad]) {
        Err(BorrowError::LifetimeEscape { function, local, .. }) => {
            assert_eq!(function, "bad");
            assert_eq!(local, "y");
        }
        other => panic!("expected LifetimeEscape, got {other:?}"),
    }

    let wrap = clause("wrap")
        .param(bind("y", shared_u32()))
        .returns(ty("P"))
        .body(vec![ret(product(Some("P"), vec![(Some("a"), ident("y"))]))])
        .item();
    let program = resolve(module("m", vec![holder("P", shared_u32()), wrap]));
    let report = check_program(&program).unwrap();
    let id = program.find("wrap").unwrap().id;
    assert_eq!(report.regions[&(id, 0)].return_borrows_from.iter().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn loans_held_by_declared_products_stay_live() {
    let f = clause("f")
        .body(vec![
            let_typed("x", true, ty("u32"), int(0)),
            let_("p", product(Some("Q"), vec![(Some("a"), ref_mut(ident("x")))])),
            let_("q", ref_(ident("x"))),
        ])
        .item();
    match check(vec![holder("Q", TypeAnnot::borrow_mut(ty("u32"))), f]) {
        Err(BorrowError::BorrowConflict { local, requested, existing, .. }) => {
            assert_eq!(local, "x");
            assert_eq!(requested, BorrowMode::Shared);
            assert_eq!(existing, BorrowMode::Exclusive);
        }
        other => panic!("expected BorrowConflict, got {other:?}"),
    }
}

#[test]
fn union_storage_is_not_alias_checked() {
    let bits = type_item(
        "Bits",
        &[],
        TypeAnnot::Union(vec![("raw".into(), ty("u32")), ("value".into(), ty("f32"))]),
    );
    let f = clause("f")
        .param(bind_mut("v", ty("Bits")))
        .body(vec![let_("a", ref_mut(ident("v"))), let_("b", ref_(ident("v")))])
        .item();
    assert!(check(vec![bits, f]).is_ok());
}

#[test]
fn calling_a_nested_function_borrows_its_captures() {
    let inc = clause("inc").body(vec![assign(ident("n"), binary(BinOp::Add, ident("n"), int(1)))]).build();
    let f = clause("f")
        .body(vec![
            let_typed("n", true, ty("u32"), int(0)),
            fn_def(inc),
            let_("r", ref_(ident("n"))),
            expr_stmt(call("inc", vec![])),
        ])
        .item();
    assert!(matches!(check(vec![f]), Err(BorrowError::BorrowConflict { .. })));
}

#[test]
fn loop_without_continue_is_rejected() {
    let f = clause("f").body(vec![loop_(vec![brk(None)])]).item();
    assert!(matches!(check(vec![f]), Err(BorrowError::LoopWithoutContinue { .. })));

    let g = clause("g")
        .param(bind("n", ty("u32")))
        .body(vec![loop_(vec![
            expr_stmt(if_(ident("n"), block(vec![brk(None)]), None)),
            cont(),
        ])])
        .item();
    assert!(check(vec![g]).is_ok());
}
