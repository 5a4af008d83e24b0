pub mod codegen;
pub mod diagnostics;
pub mod parser;
pub mod types;
pub mod wasm;

use std::path::Path;

use anyhow::Result;

/// Compilation options for the barley compiler.
///
/// This structure provides a clean API for configuring the compiler,
/// separating it from CLI argument parsing. The compiler accepts explicit
/// options rather than discovering configuration.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Size of pointers and `uintptr` in bytes: 4 or 8. Any other value
    /// is a construction error.
    pub uintptr_size: u32,

    /// Skip allocator integration and emit a freestanding module that
    /// declares its own memory.
    pub no_lib: bool,

    /// Suppress stderr printing of diagnostics. Collection is unaffected.
    pub silent: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            uintptr_size: 4,
            no_lib: false,
            silent: false,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compile a source file (plus the bundled `assembly.d.ts` declarations).
///
/// Returns `Ok(None)` when the program contains errors; diagnostics have
/// already been collected (and printed unless `silent`). Hard failures
/// (I/O, syntax errors that prevent building a program, invalid options)
/// come back as `Err`.
pub fn compile_file(path: &Path, options: CompileOptions) -> Result<Option<wasm::Module>> {
    let program = parser::parse_program_from_file(path)?;
    compile_program(&program, options)
}

/// Compile an in-memory source string as a two-file program (library
/// declarations + `module.ts`).
pub fn compile_string(source: &str, options: CompileOptions) -> Result<Option<wasm::Module>> {
    let program = parser::parse_program_from_string(source)?;
    compile_program(&program, options)
}

/// Compile a pre-built program.
pub fn compile_program(
    program: &parser::Program,
    options: CompileOptions,
) -> Result<Option<wasm::Module>> {
    let mut compiler = codegen::Compiler::new(options)?;
    Ok(compiler.compile_program(program))
}
