//! The conversion engine: narrowing discipline, widening pass-throughs,
//! int/float conversions, and the pointer-width portability warnings.

mod common;

use barley::CompileOptions;
use barley::wasm::{BinOp, Expr, UnOp, ValType};
use common::*;

fn return_value(module: &barley::wasm::Module, name: &str) -> Expr {
    let body = body_of(module, name);
    match body.last() {
        Some(Expr::Return { value: Some(value) }) => (**value).clone(),
        other => panic!("expected trailing return, got {:?}", other),
    }
}

#[test]
fn narrowing_to_unsigned_masks_with_mask32() {
    let module = compile_ok("export function f(x: int): byte { return x as byte; }");
    assert_eq!(
        return_value(&module, "f"),
        Expr::Binary {
            op: BinOp::And,
            ty: ValType::I32,
            left: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            }),
            right: Box::new(Expr::I32Const(0xff)),
        }
    );
}

#[test]
fn narrowing_to_signed_sign_extends_with_shift_pair() {
    let module = compile_ok("export function f(x: int): sbyte { return x as sbyte; }");
    let shift = Box::new(Expr::I32Const(24));
    assert_eq!(
        return_value(&module, "f"),
        Expr::Binary {
            op: BinOp::ShrS,
            ty: ValType::I32,
            left: Box::new(Expr::Binary {
                op: BinOp::Shl,
                ty: ValType::I32,
                left: Box::new(Expr::LocalGet {
                    index: 0,
                    ty: ValType::I32,
                }),
                right: shift.clone(),
            }),
            right: shift,
        }
    );
}

#[test]
fn widening_within_the_int_family_is_a_pass_through() {
    let module = compile_ok("export function f(x: byte): int { return x; }");
    assert_eq!(
        return_value(&module, "f"),
        Expr::LocalGet {
            index: 0,
            ty: ValType::I32,
        }
    );
}

#[test]
fn int_to_long_extends_by_signedness() {
    let module = compile_ok(
        "export function s(x: int): long { return x; }\n\
         export function u(x: uint): ulong { return x; }",
    );
    assert_eq!(
        return_value(&module, "s"),
        Expr::Unary {
            op: UnOp::ExtendS,
            from: ValType::I32,
            to: ValType::I64,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            }),
        }
    );
    assert_eq!(
        return_value(&module, "u"),
        Expr::Unary {
            op: UnOp::ExtendU,
            from: ValType::I32,
            to: ValType::I64,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            }),
        }
    );
}

#[test]
fn sign_mixing_extension_is_implicit_error_but_explicit_ok() {
    let implicit = compile("export function f(x: uint): long { return x; }");
    assert!(implicit.is_none());

    let explicit = compile_ok("export function f(x: uint): long { return x as long; }");
    assert_eq!(
        return_value(&explicit, "f"),
        Expr::Unary {
            op: UnOp::ExtendU,
            from: ValType::I32,
            to: ValType::I64,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            }),
        }
    );
}

#[test]
fn long_to_int_wraps_explicitly() {
    let module = compile_ok("export function f(x: long): int { return x as int; }");
    assert_eq!(
        return_value(&module, "f"),
        Expr::Unary {
            op: UnOp::Wrap,
            from: ValType::I64,
            to: ValType::I32,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I64,
            }),
        }
    );
}

#[test]
fn long_to_byte_wraps_then_masks() {
    let module = compile_ok("export function f(x: long): byte { return x as byte; }");
    assert_eq!(
        return_value(&module, "f"),
        Expr::Binary {
            op: BinOp::And,
            ty: ValType::I32,
            left: Box::new(Expr::Unary {
                op: UnOp::Wrap,
                from: ValType::I64,
                to: ValType::I32,
                value: Box::new(Expr::LocalGet {
                    index: 0,
                    ty: ValType::I64,
                }),
            }),
            right: Box::new(Expr::I32Const(0xff)),
        }
    );
}

#[test]
fn int_to_float_converts_silently() {
    let module = compile_ok("export function f(x: int): double { return x; }");
    assert_eq!(
        return_value(&module, "f"),
        Expr::Unary {
            op: UnOp::ConvertS,
            from: ValType::I32,
            to: ValType::F64,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            }),
        }
    );
}

#[test]
fn long_to_double_requires_explicit_conversion() {
    assert!(compile("export function f(x: long): double { return x; }").is_none());
    let module = compile_ok("export function f(x: long): double { return x as double; }");
    assert_eq!(
        return_value(&module, "f"),
        Expr::Unary {
            op: UnOp::ConvertS,
            from: ValType::I64,
            to: ValType::F64,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I64,
            }),
        }
    );
}

#[test]
fn float_promotes_implicitly_but_demotes_explicitly() {
    let promote = compile_ok("export function f(x: float): double { return x; }");
    assert_eq!(
        return_value(&promote, "f"),
        Expr::Unary {
            op: UnOp::Promote,
            from: ValType::F32,
            to: ValType::F64,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::F32,
            }),
        }
    );

    assert!(compile("export function f(x: double): float { return x; }").is_none());
    let demote = compile_ok("export function f(x: double): float { return x as float; }");
    assert_eq!(
        return_value(&demote, "f"),
        Expr::Unary {
            op: UnOp::Demote,
            from: ValType::F64,
            to: ValType::F32,
            value: Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::F64,
            }),
        }
    );
}

#[test]
fn uintptr_to_uint_warns_under_32_bit_pointers() {
    let (module, compiler) = compile_with_compiler(
        "export function f(p: uintptr): uint { return p; }",
        options(),
    );
    assert!(module.is_some(), "warning must not fail the build");
    assert_eq!(compiler.diagnostics.warnings().count(), 1);
}

#[test]
fn ulong_to_uintptr_warns_under_64_bit_pointers() {
    let opts = CompileOptions {
        uintptr_size: 8,
        no_lib: true,
        silent: true,
    };
    let (module, compiler) = compile_with_compiler(
        "export function f(x: ulong): uintptr { return x; }",
        opts,
    );
    assert!(module.is_some(), "warning must not fail the build");
    assert_eq!(compiler.diagnostics.warnings().count(), 1);
}

#[test]
fn implicit_conversion_reports_once_per_statement() {
    // Both arguments need an illegal conversion; the diagnostic attaches
    // to the enclosing statement only once.
    let (module, compiler) = compile_with_compiler(
        "function sum(a: int, b: int): int { return a + b; }\n\
         export function f(x: double, y: double): int { return sum(x, y); }",
        options(),
    );
    assert!(module.is_none());
    assert_eq!(
        compiler
            .diagnostics
            .errors()
            .filter(|d| d.message == "Illegal implicit conversion")
            .count(),
        1
    );
}

#[test]
fn invalid_uintptr_size_is_a_construction_error() {
    let result = barley::codegen::Compiler::new(CompileOptions {
        uintptr_size: 2,
        no_lib: true,
        silent: true,
    });
    assert!(result.is_err());
}
