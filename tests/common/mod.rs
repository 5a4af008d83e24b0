//! Common testing utilities for the barley compiler test suite.
//!
//! Tests compile source strings with silent diagnostics and assert on the
//! produced IR tree and module layout. Most tests compile freestanding
//! (`no_lib`) so the module contains only what the source put there; the
//! allocator-integration tests opt back in with `lib_options`.

use barley::CompileOptions;
use barley::codegen::Compiler;
use barley::parser;
use barley::wasm::{Body, Expr, Module};

/// Freestanding, silent, 32-bit pointers.
pub fn options() -> CompileOptions {
    CompileOptions {
        uintptr_size: 4,
        no_lib: true,
        silent: true,
    }
}

/// Allocator-integrated, silent, 32-bit pointers.
#[allow(dead_code)]
pub fn lib_options() -> CompileOptions {
    CompileOptions {
        uintptr_size: 4,
        no_lib: false,
        silent: true,
    }
}

pub fn compile_with(src: &str, options: CompileOptions) -> Option<Module> {
    let program = parser::parse_program_from_string(src).expect("failed to parse source");
    let mut compiler = Compiler::new(options).expect("failed to construct compiler");
    compiler.compile_program(&program)
}

#[allow(dead_code)]
pub fn compile(src: &str) -> Option<Module> {
    compile_with(src, options())
}

#[allow(dead_code)]
pub fn compile_ok(src: &str) -> Module {
    compile(src).expect("expected successful compilation")
}

/// Compile and hand back the compiler too, for diagnostic inspection.
#[allow(dead_code)]
pub fn compile_with_compiler(src: &str, options: CompileOptions) -> (Option<Module>, Compiler) {
    let program = parser::parse_program_from_string(src).expect("failed to parse source");
    let mut compiler = Compiler::new(options).expect("failed to construct compiler");
    let module = compiler.compile_program(&program);
    (module, compiler)
}

/// IR body of a named function; panics on imports and raw bodies.
#[allow(dead_code)]
pub fn body_of<'a>(module: &'a Module, name: &str) -> &'a [Expr] {
    let function = module
        .function(name)
        .unwrap_or_else(|| panic!("no function '{}' in module", name));
    match &function.body {
        Body::Ir(body) => body,
        Body::Raw(_) => panic!("function '{}' has a raw body", name),
    }
}

/// Debug rendering of a function body, for structural containment checks.
#[allow(dead_code)]
pub fn body_text(module: &Module, name: &str) -> String {
    format!("{:?}", body_of(module, name))
}
