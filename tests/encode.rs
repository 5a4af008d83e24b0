//! Byte-level encoding: emitted binaries must pass wasmparser validation.

mod common;

use barley::wasm::Module;
use common::*;

#[test]
fn simple_function_encodes_to_a_valid_module() {
    let module = compile_ok("export function add(a: int, b: int): int { return a + b; }");
    let bytes = module.encode().expect("encoding failed");
    Module::validate(&bytes).expect("emitted module must validate");
}

#[test]
fn loops_and_branches_encode_with_correct_depths() {
    let module = compile_ok(
        "export function count(): int {\n\
           let total: int = 0;\n\
           for (let i: int = 0; i < 10; i = i + 1) {\n\
             if (i == 5) { continue; }\n\
             total = total + i;\n\
           }\n\
           return total;\n\
         }",
    );
    let bytes = module.encode().expect("encoding failed");
    Module::validate(&bytes).expect("emitted module must validate");
}

#[test]
fn allocator_linked_module_encodes_to_a_valid_module() {
    let module = compile_with(
        "export function start(): void { }",
        lib_options(),
    )
    .expect("program must compile");
    let bytes = module.encode().expect("encoding failed");
    Module::validate(&bytes).expect("emitted module with linked allocator must validate");
}

#[test]
fn classes_and_memory_access_encode_to_a_valid_module() {
    let module = compile_ok(
        "class Point {\n\
           x: int;\n\
           y: int;\n\
           constructor(x: int, y: int) { this.x = x; this.y = y; }\n\
           sum(): int { return this.x + this.y; }\n\
         }\n\
         export function run(): int { let p: Point = new Point(1, 2); return p.sum(); }",
    );
    let bytes = module.encode().expect("encoding failed");
    Module::validate(&bytes).expect("emitted module must validate");
}

#[test]
fn switch_and_conditionals_encode_to_a_valid_module() {
    let module = compile_ok(
        "export function pick(x: int): int {\n\
           let r: int = x > 0 ? 1 : 0;\n\
           switch (x) {\n\
             case 0: r = 10; break;\n\
             case 1: r = 20;\n\
             default: r = 30;\n\
           }\n\
           return r;\n\
         }",
    );
    let bytes = module.encode().expect("encoding failed");
    Module::validate(&bytes).expect("emitted module must validate");
}
