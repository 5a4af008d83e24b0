//! Statement lowering: loops with break contexts, switch fall-through,
//! and local slot allocation.

mod common;

use barley::wasm::{BinOp, Expr, ValType};
use common::*;

#[test]
fn while_loop_lowered_with_labeled_loop_idiom() {
    let module = compile_ok(
        "export function count(): int { let i: int = 0; while (i < 10) { i++; } return i; }",
    );
    let body = body_of(&module, "count");

    assert_eq!(
        body[0],
        Expr::LocalSet {
            index: 0,
            value: Box::new(Expr::I32Const(0)),
        }
    );

    let expected_loop = Expr::Block {
        label: Some("break$1.0".to_string()),
        ty: None,
        body: vec![Expr::Loop {
            label: "continue$1.0".to_string(),
            body: vec![Expr::If {
                ty: None,
                condition: Box::new(Expr::Binary {
                    op: BinOp::LtS,
                    ty: ValType::I32,
                    left: Box::new(Expr::LocalGet {
                        index: 0,
                        ty: ValType::I32,
                    }),
                    right: Box::new(Expr::I32Const(10)),
                }),
                if_true: Box::new(Expr::Block {
                    label: None,
                    ty: None,
                    body: vec![
                        Expr::LocalSet {
                            index: 0,
                            value: Box::new(Expr::Binary {
                                op: BinOp::Add,
                                ty: ValType::I32,
                                left: Box::new(Expr::LocalGet {
                                    index: 0,
                                    ty: ValType::I32,
                                }),
                                right: Box::new(Expr::I32Const(1)),
                            }),
                        },
                        Expr::Br {
                            label: "continue$1.0".to_string(),
                            condition: None,
                        },
                    ],
                }),
                if_false: None,
            }],
        }],
    };
    assert_eq!(body[1], expected_loop);

    assert_eq!(
        body[2],
        Expr::Return {
            value: Some(Box::new(Expr::LocalGet {
                index: 0,
                ty: ValType::I32,
            })),
        }
    );
}

#[test]
fn sibling_loops_bump_the_break_number() {
    let module = compile_ok(
        "export function f(): void {\n\
           while (true) { break; }\n\
           while (true) { break; }\n\
         }",
    );
    let text = body_text(&module, "f");
    assert!(text.contains("break$1.0"));
    assert!(text.contains("break$2.0"));
}

#[test]
fn nested_loops_bump_the_depth_not_the_number() {
    let module = compile_ok(
        "export function f(): void {\n\
           while (true) {\n\
             while (true) { continue; }\n\
             break;\n\
           }\n\
         }",
    );
    let text = body_text(&module, "f");
    assert!(text.contains("break$1.0"));
    assert!(text.contains("continue$1.1"));
    assert!(!text.contains("break$2.0"));
}

#[test]
fn do_while_branches_back_on_condition() {
    let module = compile_ok(
        "export function f(): int { let i: int = 0; do { i++; } while (i < 3); return i; }",
    );
    let body = body_of(&module, "f");
    let Expr::Block { label, body: outer, .. } = &body[1] else {
        panic!("expected labeled block, got {:?}", body[1]);
    };
    assert_eq!(label.as_deref(), Some("break$1.0"));
    let Expr::Loop { label, body: inner } = &outer[0] else {
        panic!("expected loop");
    };
    assert_eq!(label, "continue$1.0");
    assert!(
        matches!(
            inner.last(),
            Some(Expr::Br {
                label,
                condition: Some(_),
            }) if label == "continue$1.0"
        ),
        "do-while must end with a conditional back-branch"
    );
}

#[test]
fn for_loop_runs_update_before_the_back_branch() {
    let module = compile_ok(
        "export function f(): int {\n\
           let sum: int = 0;\n\
           for (let i: int = 0; i < 4; i = i + 1) { sum = sum + i; }\n\
           return sum;\n\
         }",
    );
    let text = body_text(&module, "f");
    assert!(text.contains("break$1.0"));
    assert!(text.contains("continue$1.0"));

    let body = body_of(&module, "f");
    let Expr::Block { body: outer, .. } = &body[1] else {
        panic!("expected for-loop block");
    };
    // init precedes the loop inside the labeled block
    assert!(matches!(&outer[0], Expr::LocalSet { index: 1, .. }));
    assert!(matches!(&outer[1], Expr::Loop { .. }));
}

#[test]
fn switch_lowers_to_case_blocks_with_fall_through() {
    let module = compile_ok(
        "export function f(x: int): int {\n\
           let r: int = 0;\n\
           switch (x) {\n\
             case 0: r = 1; break;\n\
             case 1: r = 2;\n\
             default: r = 3; break;\n\
           }\n\
           return r;\n\
         }",
    );
    let text = body_text(&module, "f");
    assert!(text.contains("case0$1.0"));
    assert!(text.contains("case1$1.0"));
    assert!(text.contains("case2$1.0"));
    assert!(text.contains("break$1.0"));

    let body = body_of(&module, "f");
    let Expr::Block { label, .. } = &body[1] else {
        panic!("expected switch block");
    };
    assert_eq!(label.as_deref(), Some("break$1.0"));
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let (module, compiler) =
        compile_with_compiler("export function f(): void { break; }", options());
    assert!(module.is_none());
    assert!(
        compiler
            .diagnostics
            .errors()
            .any(|d| d.message == "Unsupported statement")
    );
}

#[test]
fn shadowing_declarations_get_fresh_slots() {
    let module = compile_ok(
        "export function f(): int {\n\
           let x: int = 1;\n\
           { let x: int = 2; }\n\
           return x;\n\
         }",
    );
    let body = body_of(&module, "f");
    assert_eq!(
        body[0],
        Expr::LocalSet {
            index: 0,
            value: Box::new(Expr::I32Const(1)),
        }
    );
    let Expr::Block { body: inner, .. } = &body[1] else {
        panic!("expected block");
    };
    assert_eq!(
        inner[0],
        Expr::LocalSet {
            index: 1,
            value: Box::new(Expr::I32Const(2)),
        }
    );
    // names are function-scoped: the second declaration wins lookups
    assert_eq!(
        body[2],
        Expr::Return {
            value: Some(Box::new(Expr::LocalGet {
                index: 1,
                ty: ValType::I32,
            })),
        }
    );
}

#[test]
fn expression_statement_drops_its_value() {
    let module = compile_ok(
        "function v(): int { return 1; }\n\
         export function f(): void { v(); 1 + 2; }",
    );
    let body = body_of(&module, "f");
    assert!(matches!(&body[0], Expr::Drop { .. }));
    assert!(matches!(&body[1], Expr::Drop { .. }));
}
