//! Classes (layout, constructors, methods, property access), enums, and
//! template monomorphization.

mod common;

use barley::wasm::{Expr, ValType};
use common::*;

const VEC2: &str = "class Vec2 {\n\
                      x: float;\n\
                      y: float;\n\
                      constructor(x: float, y: float) { this.x = x; this.y = y; }\n\
                      len2(): float { return this.x * this.x + this.y * this.y; }\n\
                    }\n";

#[test]
fn class_properties_lay_out_in_declaration_order() {
    let src = format!("{}export function f(): int {{ return 0; }}", VEC2);
    let (module, compiler) = compile_with_compiler(&src, options());
    assert!(module.is_some());

    let class = compiler.classes.get("Vec2").expect("class missing");
    assert_eq!(class.size.get(), 8);
    assert_eq!(class.property("x").unwrap().offset, 0);
    assert_eq!(class.property("y").unwrap().offset, 4);
}

#[test]
fn constructor_and_methods_flatten_into_the_function_table() {
    let src = format!(
        "{}export function make(): float {{ let v: Vec2 = new Vec2(1.0, 2.0); return v.len2(); }}",
        VEC2
    );
    let module = compile_ok(&src);

    // constructor under the bare class name, instance method as Vec2#len2
    assert!(module.function("Vec2").is_some());
    assert!(module.function("Vec2#len2").is_some());

    let ctor_sig = module.signature(module.function("Vec2").unwrap().sig);
    assert_eq!(
        ctor_sig.params,
        vec![ValType::I32, ValType::F32, ValType::F32],
        "`this` occupies parameter slot 0"
    );
    assert_eq!(ctor_sig.results, vec![ValType::I32]);

    // freestanding `new` bumps the internal heap global
    assert!(module.global(".heap").is_some());
    let text = body_text(&module, "make");
    assert!(text.contains("Call { target: \"Vec2\""));
    assert!(text.contains("Call { target: \"Vec2#len2\""));
}

#[test]
fn constructor_stores_through_this_and_returns_it() {
    let src = format!("{}export function f(): int {{ return 0; }}", VEC2);
    let module = compile_ok(&src);
    let body = body_of(&module, "Vec2");

    let text = format!("{:?}", body);
    // this.x = x -> store at offset 0 from local 0's pointer of local 1
    assert!(text.contains("offset: 0"));
    assert!(text.contains("offset: 4"));
    assert_eq!(
        body.last(),
        Some(&Expr::Return {
            value: Some(Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            })),
        })
    );
}

#[test]
fn property_loads_use_the_property_offset_and_type() {
    let src = format!(
        "{}export function getx(v: Vec2): float {{ return v.x; }}\n\
         export function gety(v: Vec2): float {{ return v.y; }}",
        VEC2
    );
    let module = compile_ok(&src);
    let getx = body_of(&module, "getx");
    assert_eq!(
        getx[0],
        Expr::Return {
            value: Some(Box::new(Expr::Load {
                ty: ValType::F32,
                bytes: 4,
                signed: false,
                offset: 0,
                ptr: Box::new(Expr::LocalGet {
                    index: 0,
                    ty: ValType::I32,
                }),
            })),
        }
    );
    let text = body_text(&module, "gety");
    assert!(text.contains("offset: 4"));
}

#[test]
fn narrow_properties_load_with_their_signedness() {
    let module = compile_ok(
        "class Flags { on: bool; level: sbyte; }\n\
         export function f(p: Flags): int { return p.level; }",
    );
    let body = body_of(&module, "f");
    assert_eq!(
        body[0],
        Expr::Return {
            value: Some(Box::new(Expr::Load {
                ty: ValType::I32,
                bytes: 1,
                signed: true,
                offset: 1,
                ptr: Box::new(Expr::LocalGet {
                    index: 0,
                    ty: ValType::I32,
                }),
            })),
        }
    );
}

#[test]
fn static_methods_flatten_with_a_dot() {
    let module = compile_ok(
        "class Calc { static twice(x: int): int { return x * 2; } }\n\
         export function t(): int { return Calc.twice(21); }",
    );
    assert!(module.function("Calc.twice").is_some());
    let text = body_text(&module, "t");
    assert!(text.contains("Call { target: \"Calc.twice\""));
}

#[test]
fn enum_members_resolve_to_integer_constants() {
    let module = compile_ok(
        "enum Color { Red, Green = 5, Blue }\n\
         export function c(): int { return Color.Blue; }",
    );
    let body = body_of(&module, "c");
    assert_eq!(
        body[0],
        Expr::Return {
            value: Some(Box::new(Expr::I32Const(6))),
        }
    );
}

#[test]
fn generic_functions_monomorphize_at_the_call_site() {
    let module = compile_ok(
        "function identity<T>(x: T): T { return x; }\n\
         export function f(x: int): int { return identity<int>(x); }\n\
         export function g(x: double): double { return identity<double>(x); }",
    );
    assert!(module.function("identity<int>").is_some());
    assert!(module.function("identity<double>").is_some());
    // the un-instantiated template itself is not compiled
    assert!(module.function("identity").is_none());

    let int_sig = module.signature(module.function("identity<int>").unwrap().sig);
    assert_eq!(int_sig.params, vec![ValType::I32]);
    assert_eq!(int_sig.results, vec![ValType::I32]);

    let text = body_text(&module, "f");
    assert!(text.contains("Call { target: \"identity<int>\""));
}

#[test]
fn generic_call_without_type_arguments_is_an_error() {
    let (module, compiler) = compile_with_compiler(
        "function identity<T>(x: T): T { return x; }\n\
         export function f(x: int): int { return identity(x); }",
        options(),
    );
    assert!(module.is_none());
    assert!(compiler.diagnostics.has_errors());
}

#[test]
fn generic_classes_monomorphize_per_type_argument_tuple() {
    let src = "class Box<T> { value: T; }\n\
               export function f(): int {\n\
                 let b: Box<int> = new Box<int>();\n\
                 b.value = 3;\n\
                 return b.value;\n\
               }\n\
               export function g(): double {\n\
                 let b: Box<double> = new Box<double>();\n\
                 b.value = 1.5;\n\
                 return b.value;\n\
               }";
    let (module, compiler) = compile_with_compiler(src, options());
    assert!(module.is_some());

    let int_box = compiler.classes.get("Box<int>").expect("Box<int> missing");
    assert_eq!(int_box.size.get(), 4);
    let double_box = compiler
        .classes
        .get("Box<double>")
        .expect("Box<double> missing");
    assert_eq!(double_box.size.get(), 8);
    assert!(compiler.classes.get("Box").is_none());
}

#[test]
fn instance_methods_receive_this_as_local_zero() {
    let src = format!("{}export function f(): int {{ return 0; }}", VEC2);
    let module = compile_ok(&src);
    let body = body_text(&module, "Vec2#len2");
    // this.x loads through local 0
    assert!(body.contains("LocalGet { index: 0, ty: I32 }"));
    let sig = module.signature(module.function("Vec2#len2").unwrap().sig);
    assert_eq!(sig.params, vec![ValType::I32]);
    assert_eq!(sig.results, vec![ValType::F32]);
}
