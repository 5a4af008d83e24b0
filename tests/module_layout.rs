//! Module-level layout: globals, memory, allocator integration, and name
//! mangling across files.

mod common;

use std::path::{Path, PathBuf};

use barley::parser::{self, LIBRARY_SOURCE, Program, SourceFile};
use barley::wasm::{Expr, Memory, ValType};
use common::*;

#[test]
fn const_global_with_literal_initializer_is_immutable() {
    let module = compile_ok("const N: int = 7;\nexport function n(): int { return N; }");

    let global = module.global("N").expect("global missing");
    assert!(!global.mutable);
    assert_eq!(global.init, Expr::I32Const(7));

    let body = body_of(&module, "n");
    assert_eq!(
        body[0],
        Expr::Return {
            value: Some(Box::new(Expr::GlobalGet {
                name: "N".to_string(),
                ty: ValType::I32,
            })),
        }
    );
    assert_eq!(module.start(), None, "no start function in freestanding mode");
}

#[test]
fn const_global_with_non_literal_initializer_is_rejected() {
    let (module, compiler) = compile_with_compiler(
        "function three(): int { return 3; }\nconst N: int = three();",
        options(),
    );
    assert!(module.is_none());
    assert!(
        compiler
            .diagnostics
            .errors()
            .any(|d| d.message == "Unsupported global constant initializer")
    );
}

#[test]
fn mutable_global_with_literal_initializer_needs_no_start() {
    let module = compile_ok("let counter: int = 5;\nexport function c(): int { return counter; }");
    let global = module.global("counter").expect("global missing");
    assert!(global.mutable);
    assert_eq!(global.init, Expr::I32Const(5));
    assert_eq!(module.start(), None);
}

#[test]
fn freestanding_module_declares_its_own_memory() {
    let module = compile_ok("export function f(): int { return 1; }");
    assert_eq!(
        module.memory(),
        Some(&Memory::Own {
            initial: 1,
            maximum: 0xffff,
            export: Some("memory".to_string()),
        })
    );
}

#[test]
fn allocator_integration_wires_msp_and_wrappers() {
    let module = compile_with("", lib_options()).expect("empty program must compile");

    // memory is imported
    assert_eq!(
        module.memory(),
        Some(&Memory::Import {
            module: "env".to_string(),
            name: "memory".to_string(),
            initial: 1,
        })
    );

    // malloc/free exported; mspace_* present but not exported
    assert!(module.export("malloc").is_some());
    assert!(module.export("free").is_some());
    assert!(module.function("mspace_init").is_some());
    assert!(module.function("mspace_malloc").is_some());
    assert!(module.function("mspace_free").is_some());
    assert!(module.export("mspace_init").is_none());
    assert!(module.export("mspace_malloc").is_none());
    assert!(module.export("mspace_free").is_none());

    // .msp exists and its initializer runs first in the start function
    let msp = module.global(".msp").expect(".msp missing");
    assert!(msp.mutable);
    assert_eq!(module.start(), Some(".start"));
    let start = body_of(&module, ".start");
    assert_eq!(
        start[0],
        Expr::GlobalSet {
            name: ".msp".to_string(),
            value: Box::new(Expr::Call {
                target: "mspace_init".to_string(),
                ty: Some(ValType::I32),
                operands: vec![Expr::I32Const(8)],
            }),
        }
    );
}

#[test]
fn msp_initializer_precedes_user_global_initializers() {
    let module = compile_with(
        "function helper(): int { return 3; }\nlet cache: int = helper();",
        lib_options(),
    )
    .expect("program must compile");
    let start = body_of(&module, ".start");
    assert!(matches!(&start[0], Expr::GlobalSet { name, .. } if name == ".msp"));
    assert!(matches!(&start[1], Expr::GlobalSet { name, .. } if name == "cache"));
}

#[test]
fn new_uses_malloc_in_non_freestanding_builds() {
    let module = compile_with(
        "class P { x: int; y: int; }\n\
         export function make(): P { return new P(); }",
        lib_options(),
    )
    .expect("program must compile");
    let text = body_text(&module, "make");
    assert!(text.contains("Call { target: \"malloc\""));
    assert!(text.contains("I32Const(8)"), "sizeof(P) is 8");
}

fn file(path: &str, source: &str) -> SourceFile {
    SourceFile {
        path: PathBuf::from(path),
        module: parser::parse_source(source, Path::new(path)).expect("parse failed"),
    }
}

#[test]
fn imported_files_mangle_with_their_sanitized_path() {
    let program = Program {
        files: vec![
            file("assembly.d.ts", LIBRARY_SOURCE),
            file("util.ts", "export function val(): int { return 1; }"),
            file("main.ts", "export function run(): int { return 2; }"),
        ],
        entry_dir: PathBuf::from("."),
    };
    let mut compiler = barley::codegen::Compiler::new(options()).unwrap();
    let module = compiler.compile_program(&program).expect("must compile");

    assert!(module.function("util.ts/val").is_some());
    assert!(module.function("run").is_some(), "entry names stay bare");
}

#[test]
fn mangling_is_injective_across_files() {
    let program = Program {
        files: vec![
            file("assembly.d.ts", LIBRARY_SOURCE),
            file("a.ts", "export function val(): int { return 1; }"),
            file("b.ts", "export function val(): int { return 2; }"),
            file("main.ts", "export function run(): int { return 3; }"),
        ],
        entry_dir: PathBuf::from("."),
    };
    let mut compiler = barley::codegen::Compiler::new(options()).unwrap();
    let module = compiler.compile_program(&program).expect("must compile");

    assert!(module.function("a.ts/val").is_some());
    assert!(module.function("b.ts/val").is_some());
}

#[test]
fn compile_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.ts");
    std::fs::write(&path, "export function one(): int { return 1; }").unwrap();

    let module = barley::compile_file(&path, options())
        .expect("io must succeed")
        .expect("compilation must succeed");
    assert!(module.export("one").is_some());
}
