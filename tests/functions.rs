//! Function compilation: bodies, exports, imports, and the start wiring.

mod common;

use barley::wasm::{BinOp, Expr, ValType};
use common::*;

#[test]
fn add_compiles_to_i32_add_of_params() {
    let module = compile_ok("export function add(a: int, b: int): int { return a + b; }");
    let body = body_of(&module, "add");
    assert_eq!(
        body,
        &[Expr::Return {
            value: Some(Box::new(Expr::Binary {
                op: BinOp::Add,
                ty: ValType::I32,
                left: Box::new(Expr::LocalGet {
                    index: 0,
                    ty: ValType::I32,
                }),
                right: Box::new(Expr::LocalGet {
                    index: 1,
                    ty: ValType::I32,
                }),
            })),
        }]
    );
    assert!(module.export("add").is_some());

    let function = module.function("add").unwrap();
    let sig = module.signature(function.sig);
    assert_eq!(sig.params, vec![ValType::I32, ValType::I32]);
    assert_eq!(sig.results, vec![ValType::I32]);
}

#[test]
fn unexported_function_is_not_exported() {
    let module = compile_ok(
        "function helper(x: int): int { return x; }\n\
         export function run(): int { return helper(3); }",
    );
    assert!(module.export("run").is_some());
    assert!(module.export("helper").is_none());
    assert!(module.function("helper").is_some());
}

#[test]
fn explicit_float_to_int_cast_truncates_without_diagnostics() {
    let (module, compiler) = compile_with_compiler(
        "export function f(x: float): int { return x as int; }",
        options(),
    );
    let module = module.expect("expected successful compilation");
    let body = body_of(&module, "f");
    assert_eq!(
        body,
        &[Expr::Return {
            value: Some(Box::new(Expr::Unary {
                op: barley::wasm::UnOp::TruncS,
                from: ValType::F32,
                to: ValType::I32,
                value: Box::new(Expr::LocalGet {
                    index: 0,
                    ty: ValType::F32,
                }),
            })),
        }]
    );
    assert_eq!(compiler.diagnostics.entries().len(), 0);
}

#[test]
fn implicit_float_to_int_conversion_is_an_error() {
    let (module, compiler) = compile_with_compiler(
        "export function g(x: float): int { return x; }",
        options(),
    );
    assert!(module.is_none());
    assert!(compiler.diagnostics.has_errors());
    assert!(
        compiler
            .diagnostics
            .errors()
            .any(|d| d.message == "Illegal implicit conversion")
    );
}

#[test]
fn declared_function_with_dollar_splits_import_path() {
    let module = compile_ok(
        "declare function host$log(value: int): void;\n\
         export function run(): void { host$log(42); }",
    );
    let import = module.import("host$log").expect("import missing");
    assert_eq!(import.module, "host");
    assert_eq!(import.base, "log");
}

#[test]
fn declared_function_without_dollar_imports_from_env() {
    let module = compile_ok(
        "declare function trace(value: int): void;\n\
         export function run(): void { trace(1); }",
    );
    let import = module.import("trace").expect("import missing");
    assert_eq!(import.module, "env");
    assert_eq!(import.base, "trace");
}

#[test]
fn unreferenced_library_declarations_do_not_become_imports() {
    // assembly.d.ts declares malloc/free; a freestanding module that never
    // calls them must not import them.
    let module = compile_ok("export function id(x: int): int { return x; }");
    assert!(module.import("malloc").is_none());
    assert!(module.import("free").is_none());
}

#[test]
fn undefined_identifier_is_reported_and_compilation_fails() {
    let (module, compiler) = compile_with_compiler(
        "export function f(): int { return missing; }",
        options(),
    );
    assert!(module.is_none());
    assert!(
        compiler
            .diagnostics
            .errors()
            .any(|d| d.message == "Undefined local variable")
    );
}

#[test]
fn start_wiring_no_globals_no_start() {
    let module = compile_ok("export function f(): int { return 1; }");
    assert_eq!(module.start(), None);
}

#[test]
fn start_wiring_user_start_only() {
    let module = compile_ok("export function start(): void { }");
    assert_eq!(module.start(), Some("start"));
}

#[test]
fn start_wiring_globals_only_synthesizes_initializer() {
    let module = compile_ok(
        "function helper(): int { return 3; }\n\
         let cache: int = helper();\n\
         export function get(): int { return cache; }",
    );
    assert_eq!(module.start(), Some(".start"));
    let body = body_of(&module, ".start");
    assert!(matches!(&body[0], Expr::GlobalSet { name, .. } if name == "cache"));
}

#[test]
fn start_wiring_globals_then_user_start_last() {
    let module = compile_ok(
        "function helper(): int { return 3; }\n\
         let cache: int = helper();\n\
         export function start(): void { }",
    );
    assert_eq!(module.start(), Some(".start"));
    let body = body_of(&module, ".start");
    assert!(matches!(&body[0], Expr::GlobalSet { name, .. } if name == "cache"));
    assert!(
        matches!(body.last(), Some(Expr::Call { target, .. }) if target == "start"),
        "user start must run last"
    );
}
