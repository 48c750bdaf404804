// SPDX-License-Identifier: (MIT OR Apache-2.0)

use kiln_ast::build::*;
use kiln_ast::{BinOp, Linkage, Module};
use kiln_compiler::{compile_build, BuildError, CompileOptions, CompiledModule};
use kiln_diagnostics::{Classify, ErrorKind};
use kiln_types::TypeExpr;
use pretty_assertions::assert_eq;

fn build(modules: Vec<Module>) -> Result<Vec<CompiledModule>, BuildError> {
    kiln_compiler::init_tracing();
    compile_build(modules, CompileOptions::default())
}

fn math() -> Module {
    let double = clause("double")
        .param(bind("x", ty("u32")))
        .returns(ty("u32"))
        .body(vec![ret(binary(BinOp::Mul, ident("x"), int(2)))])
        .export();
    module("math", vec![double.item()])
}

fn app() -> Module {
    let main = clause("main").returns(ty("u32")).body(vec![ret(call("double", vec![int(21)]))]).export();
    module("app", vec![import_with("math", &[("double", None)]), main.item()])
}

#[test]
fn importers_call_exported_functions_of_other_modules() {
    // Given out of order on purpose.
    let built = build(vec![app(), math()]).unwrap();
    let names: Vec<&str> = built.iter().map(|m| m.name()).collect();
    assert_eq!(names, vec!["app", "math"]);

    let math = &built[1];
    let export = math.interface.function("double").unwrap();
    assert_eq!(export.params, vec![TypeExpr::u32()]);
    assert_eq!(export.ret, TypeExpr::u32());

    let app = &built[0];
    let imported = app.ir.find("double").unwrap();
    assert_eq!(imported.linkage, Linkage::Import { module: "math".into() });
    assert!(imported.body.is_none());
    assert_eq!(app.ir.find("main").unwrap().linkage, Linkage::Export);
    assert!(app.interface.function("double").is_none());
}

#[test]
fn import_cycles_are_rejected() {
    let a = module("a", vec![import_with("b", &[])]);
    let b = module("b", vec![import_with("a", &[])]);
    let err = build(vec![a, b]).unwrap_err();
    assert_eq!(err, BuildError::ImportCycle { modules: vec!["a".into(), "b".into()] });
}

#[test]
fn imports_must_name_modules_of_the_build() {
    let err = build(vec![app()]).unwrap_err();
    assert_eq!(err, BuildError::UnknownImport { module: "app".into(), import: "math".into() });

    let err = build(vec![math(), math()]).unwrap_err();
    assert_eq!(err, BuildError::DuplicateModule("math".into()));
}

#[test]
fn failures_name_their_module() {
    let spin = clause("spin").body(vec![loop_(vec![brk(None)])]);
    let broken = module("app", vec![import_with("math", &[]), spin.item()]);
    match build(vec![math(), broken]) {
        Err(BuildError::Module { module, source }) => {
            assert_eq!(module, "app");
            assert_eq!(source.kind(), ErrorKind::LoopWithoutContinue);
        }
        other => panic!("expected a module failure, got {other:?}"),
    }
}
