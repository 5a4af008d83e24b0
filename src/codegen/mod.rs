//! Top-level codegen module.
//!
//! `Compiler` holds the module-level state of one compilation: the IR
//! module being built, the reflection maps populated by the
//! initialization pass, the diagnostic collection, and the queue of
//! functions waiting to be compiled. The pipeline is organized across
//! submodules:
//! - `emit`     : initialization pass (top-level declarations)
//! - `stmt`     : statement lowering
//! - `expr`     : expression lowering
//! - `helpers`  : name mangling, type resolution, conversions, const eval
//! - `generics` : template monomorphization
//!
//! Per-function mutable state (local slot table, break-context counters)
//! lives in `FnCtx`, which is created at function entry and passed
//! explicitly to every lowerer. Two concurrent compilations are fully
//! isolated: nothing here is shared or `'static`.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use anyhow::{Result, bail};
use deno_ast::swc::ast;
use deno_ast::swc::common::Span;

use crate::CompileOptions;
use crate::diagnostics::{Category, Diagnostic, Diagnostics};
use crate::parser::Program;
use crate::types::{Class, ClassTemplate, Enum, Function, FunctionTemplate, Type, Variable};
use crate::wasm::{self, Body, Expr, UnOp, ValType};

pub mod emit;
pub mod expr;
pub mod generics;
pub mod helpers;
pub mod stmt;

/// Address handed to `mspace_init`: the arena state block starts here and
/// the heap grows behind it.
pub const HEAP_BASE: i32 = 8;

/// Internal global holding the mspace pointer (non-freestanding builds).
pub const MSP_GLOBAL: &str = ".msp";

/// Internal bump-pointer global used by freestanding `new`.
pub const HEAP_GLOBAL: &str = ".heap";

/// Name of the synthesized start function.
pub const START_FUNCTION: &str = ".start";

/// A resolved local slot.
#[derive(Debug, Clone)]
pub struct Local {
    pub index: u32,
    pub ty: Type,
    pub constant: bool,
}

/// Per-function lowering context.
///
/// Created at function entry with the parameters (and `this`) preloaded
/// into the slot table; body-level locals are appended as declarations are
/// lowered. Break contexts are the `(number, depth)` pairs encoding the
/// labels `break$N.D` / `continue$N.D`.
pub struct FnCtx {
    pub function: Rc<Function>,
    locals: HashMap<String, Local>,
    /// Full slot table: parameters first, then body locals, contiguous
    /// from 0.
    pub variables: Vec<Variable>,
    body_locals: Vec<ValType>,
    next_index: u32,
    break_number: u32,
    break_depth: u32,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    /// Set when an implicit-conversion diagnostic has been attached to the
    /// statement currently being lowered; reset per statement so each
    /// top-level node reports at most once.
    pub conversion_reported: bool,
}

impl FnCtx {
    pub fn new(function: Rc<Function>) -> FnCtx {
        let mut ctx = FnCtx {
            locals: HashMap::new(),
            variables: Vec::new(),
            body_locals: Vec::new(),
            next_index: 0,
            break_number: 0,
            break_depth: 0,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            conversion_reported: false,
            function,
        };
        for param in ctx.function.parameters.clone() {
            ctx.locals.insert(
                param.name.clone(),
                Local {
                    index: param.index,
                    ty: param.ty.clone(),
                    constant: false,
                },
            );
            ctx.next_index = ctx.next_index.max(param.index + 1);
            ctx.variables.push(param);
        }
        ctx
    }

    pub fn local(&self, name: &str) -> Option<&Local> {
        self.locals.get(name)
    }

    /// Allocate a slot for a body-level variable. Shadowing declarations
    /// get a unique `name.2`, `name.3`, ... slot name; lookups by source
    /// name resolve to the most recent declaration.
    pub fn on_variable(&mut self, name: &str, ty: Type, constant: bool) -> u32 {
        let unique = if self.variables.iter().any(|v| v.name == name) {
            let mut n = 2u32;
            loop {
                let candidate = format!("{}.{}", name, n);
                if !self.variables.iter().any(|v| v.name == candidate) {
                    break candidate;
                }
                n += 1;
            }
        } else {
            name.to_string()
        };
        let index = self.next_index;
        self.next_index += 1;
        self.body_locals.push(ty.wasm_type());
        self.variables.push(Variable {
            name: unique,
            ty: ty.clone(),
            global: false,
            constant,
            index,
            value: None,
        });
        self.locals.insert(
            name.to_string(),
            Local {
                index,
                ty,
                constant,
            },
        );
        index
    }

    /// Allocate an anonymous scratch slot.
    pub fn alloc_temp(&mut self, ty: Type) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        self.body_locals.push(ty.wasm_type());
        self.variables.push(Variable {
            name: format!(".tmp{}", index),
            ty,
            global: false,
            constant: false,
            index,
            value: None,
        });
        index
    }

    pub fn enter_break_context(&mut self, is_loop: bool) -> String {
        if self.break_depth == 0 {
            self.break_number += 1;
        }
        let label = format!("{}.{}", self.break_number, self.break_depth);
        self.break_depth += 1;
        self.break_labels.push(label.clone());
        if is_loop {
            self.continue_labels.push(label.clone());
        }
        label
    }

    pub fn leave_break_context(&mut self, is_loop: bool) {
        if self.break_depth == 0 {
            panic!("unbalanced break context");
        }
        self.break_depth -= 1;
        self.break_labels.pop();
        if is_loop {
            self.continue_labels.pop();
        }
    }

    pub fn break_label(&self) -> Option<String> {
        self.break_labels.last().map(|l| format!("break${}", l))
    }

    pub fn continue_label(&self) -> Option<String> {
        self.continue_labels
            .last()
            .map(|l| format!("continue${}", l))
    }

    pub fn body_local_types(&self) -> Vec<ValType> {
        self.body_locals.clone()
    }
}

/// Module-level compilation state. One instance per compilation; the IR
/// module transfers to the caller on success.
pub struct Compiler {
    pub options: CompileOptions,
    pub diagnostics: Diagnostics,
    pub module: wasm::Module,
    /// The pointer-sized integer type of this compilation.
    pub uintptr: Type,
    pub globals: HashMap<String, Rc<Variable>>,
    pub functions: HashMap<String, Rc<Function>>,
    pub classes: HashMap<String, Rc<Class>>,
    pub enums: HashMap<String, Rc<Enum>>,
    pub function_templates: HashMap<String, Rc<FunctionTemplate>>,
    pub class_templates: HashMap<String, Rc<ClassTemplate>>,
    /// Short signature key ("iiv" style) to type-section index.
    pub signatures: HashMap<String, u32>,
    pub type_aliases: HashMap<String, ast::TsType>,
    /// Start-time statements, in execution order. The allocator's mspace
    /// initializer is always first when present.
    pub global_initializers: Vec<Expr>,
    pending_global_initializers: Vec<PendingInitializer>,
    compile_queue: VecDeque<Rc<Function>>,
    /// The user's `start` function, if declared in the entry file.
    pub start_function: Option<Rc<Function>>,
    start_locals: Vec<ValType>,
    // Ambient file context for diagnostics and reference mangling.
    current_file: String,
    current_source: Rc<str>,
    current_prefix: Option<String>,
}

struct PendingInitializer {
    name: String,
    init: ast::Expr,
    ty: Type,
    file: String,
    source: Rc<str>,
    prefix: Option<String>,
}

impl Compiler {
    /// Construct a compiler for one compilation. Fails on invalid options
    /// or a malformed bundled allocator.
    pub fn new(options: CompileOptions) -> Result<Compiler> {
        if options.uintptr_size != 4 && options.uintptr_size != 8 {
            bail!(
                "unsupported uintptr size {} (expected 4 or 8)",
                options.uintptr_size
            );
        }

        let uintptr = Type::uintptr(options.uintptr_size);
        let mut compiler = Compiler {
            diagnostics: Diagnostics::new(options.silent),
            module: wasm::Module::new(),
            uintptr,
            globals: HashMap::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            enums: HashMap::new(),
            function_templates: HashMap::new(),
            class_templates: HashMap::new(),
            signatures: HashMap::new(),
            type_aliases: HashMap::new(),
            global_initializers: Vec::new(),
            pending_global_initializers: Vec::new(),
            compile_queue: VecDeque::new(),
            start_function: None,
            start_locals: Vec::new(),
            current_file: String::new(),
            current_source: Rc::from(""),
            current_prefix: None,
            options,
        };

        if compiler.options.no_lib {
            compiler.module.set_memory(wasm::Memory::Own {
                initial: 1,
                maximum: 0xffff,
                export: Some("memory".to_string()),
            });
        } else {
            compiler.module.set_memory(wasm::Memory::Import {
                module: "env".to_string(),
                name: "memory".to_string(),
                initial: 1,
            });
            wasm::link::link_allocator(&mut compiler.module)?;
            compiler.install_allocator_wrappers();
        }

        Ok(compiler)
    }

    /// Run the full pipeline. Returns the finished module, or `None` when
    /// any phase collected an error.
    pub fn compile_program(&mut self, program: &Program) -> Option<wasm::Module> {
        // Surface pre-emit (parse) diagnostics.
        for file in &program.files {
            let source = file.module.source.clone();
            let file_name = file.path.display().to_string();
            for parse_diag in file.module.parsed.diagnostics() {
                self.diagnostics.report(
                    Diagnostic::new(Category::Error, parse_diag.to_string())
                        .with_file(file_name.clone()),
                    Some(&source),
                );
            }
        }
        if self.diagnostics.has_errors() {
            return None;
        }

        self.initialize(program);
        if self.diagnostics.has_errors() {
            return None;
        }

        self.compile();
        if self.diagnostics.has_errors() {
            return None;
        }

        self.finalize_start();
        Some(std::mem::take(&mut self.module))
    }

    /// Compile phase: lower deferred global initializers, then drain the
    /// function queue (template instantiation may keep refilling it).
    fn compile(&mut self) {
        let pending = std::mem::take(&mut self.pending_global_initializers);
        if !pending.is_empty() {
            let start = self.synthetic_start_function();
            let mut ctx = FnCtx::new(start);
            for init in pending {
                self.current_file = init.file;
                self.current_source = init.source;
                self.current_prefix = init.prefix;
                ctx.conversion_reported = false;
                let (value, from) = self.compile_expression(&mut ctx, &init.init, &init.ty);
                let value =
                    self.maybe_convert_value(&mut ctx, init_span(&init.init), value, &from, &init.ty, false);
                self.global_initializers.push(Expr::GlobalSet {
                    name: init.name,
                    value: Box::new(value),
                });
            }
            self.start_locals = ctx.body_local_types();
        }

        while let Some(function) = self.compile_queue.pop_front() {
            self.compile_function(function);
        }
    }

    pub(crate) fn enqueue(&mut self, function: Rc<Function>) {
        self.compile_queue.push_back(function);
    }

    fn compile_function(&mut self, function: Rc<Function>) {
        let body = function
            .body
            .clone()
            .unwrap_or_else(|| panic!("missing function body for '{}'", function.name));

        self.current_file = function.file.clone();
        self.current_source = function.source.clone();
        self.current_prefix = function.prefix.clone();

        let mut ctx = FnCtx::new(function.clone());
        let mut stmts = Vec::new();
        for stmt in &body.stmts {
            ctx.conversion_reported = false;
            stmts.push(self.compile_statement(&mut ctx, stmt));
        }

        if function.constructor {
            stmts.push(Expr::Return {
                value: Some(Box::new(Expr::LocalGet {
                    index: 0,
                    ty: self.uintptr.wasm_type(),
                })),
            });
        } else if !function.return_type.is_void()
            && !matches!(stmts.last(), Some(Expr::Return { .. }))
        {
            // Keep the emitted body well-typed when control cannot reach
            // the end without returning.
            stmts.push(Expr::Unreachable);
        }

        let sig = self.signatures[&function.signature];
        self.module.add_function(wasm::Function {
            name: function.name.clone(),
            sig,
            locals: ctx.body_local_types(),
            body: Body::Ir(stmts),
        });
        if function.exported {
            self.module
                .add_export(function.name.clone(), function.name.clone());
        }
    }

    /// Chain global initializers and the user `start` into the module
    /// start function.
    fn finalize_start(&mut self) {
        let initializers = std::mem::take(&mut self.global_initializers);
        if initializers.is_empty() {
            if let Some(start) = &self.start_function {
                self.module.set_start(Some(start.name.clone()));
            }
            return;
        }

        let mut body = initializers;
        if let Some(start) = &self.start_function {
            body.push(Expr::Call {
                target: start.name.clone(),
                ty: None,
                operands: Vec::new(),
            });
        }

        let sig = self.register_signature(&[], &Type::void());
        let sig = self.signatures[&sig];
        self.module.add_function(wasm::Function {
            name: START_FUNCTION.to_string(),
            sig,
            locals: std::mem::take(&mut self.start_locals),
            body: Body::Ir(body),
        });
        self.module.set_start(Some(START_FUNCTION.to_string()));
    }

    /// Register `.msp`, its start-time initializer, and the exported
    /// `malloc`/`free` wrappers around the linked `mspace_*` functions.
    fn install_allocator_wrappers(&mut self) {
        let ptr = self.uintptr.clone();
        let ptr_wasm = ptr.wasm_type();

        let zero = match ptr_wasm {
            ValType::I64 => Expr::I64Const(0),
            _ => Expr::I32Const(0),
        };
        self.module
            .add_global(MSP_GLOBAL.to_string(), ptr_wasm, true, zero);

        let init_call = Expr::Call {
            target: wasm::link::MSPACE_INIT.to_string(),
            ty: Some(ValType::I32),
            operands: vec![Expr::I32Const(HEAP_BASE)],
        };
        self.global_initializers.push(Expr::GlobalSet {
            name: MSP_GLOBAL.to_string(),
            value: Box::new(self.extend_ptr(init_call)),
        });

        let msp = Expr::GlobalGet {
            name: MSP_GLOBAL.to_string(),
            ty: ptr_wasm,
        };
        let size_param = Expr::LocalGet {
            index: 0,
            ty: ptr_wasm,
        };

        let malloc_sig_key = self.register_signature(&[ptr.clone()], &ptr);
        let malloc_sig = self.signatures[&malloc_sig_key];
        let malloc_body = self.extend_ptr(Expr::Call {
            target: wasm::link::MSPACE_MALLOC.to_string(),
            ty: Some(ValType::I32),
            operands: vec![self.wrap_ptr(msp.clone()), self.wrap_ptr(size_param.clone())],
        });
        self.module.add_function(wasm::Function {
            name: "malloc".to_string(),
            sig: malloc_sig,
            locals: Vec::new(),
            body: Body::Ir(vec![malloc_body]),
        });
        self.module
            .add_export("malloc".to_string(), "malloc".to_string());

        let free_sig_key = self.register_signature(&[ptr.clone()], &Type::void());
        let free_sig = self.signatures[&free_sig_key];
        let free_body = Expr::Call {
            target: wasm::link::MSPACE_FREE.to_string(),
            ty: None,
            operands: vec![self.wrap_ptr(msp), self.wrap_ptr(size_param)],
        };
        self.module.add_function(wasm::Function {
            name: "free".to_string(),
            sig: free_sig,
            locals: Vec::new(),
            body: Body::Ir(vec![free_body]),
        });
        self.module.add_export("free".to_string(), "free".to_string());

        self.functions.insert(
            "malloc".to_string(),
            Rc::new(self.intrinsic_function(
                "malloc",
                vec![("size", ptr.clone())],
                ptr.clone(),
                malloc_sig_key,
            )),
        );
        self.functions.insert(
            "free".to_string(),
            Rc::new(self.intrinsic_function(
                "free",
                vec![("ptr", ptr)],
                Type::void(),
                free_sig_key,
            )),
        );
    }

    /// Zero-extend an i32 into the pointer width (no-op under 32-bit
    /// pointers).
    pub(crate) fn extend_ptr(&self, value: Expr) -> Expr {
        if self.uintptr.wasm_type() == ValType::I64 {
            Expr::Unary {
                op: UnOp::ExtendU,
                from: ValType::I32,
                to: ValType::I64,
                value: Box::new(value),
            }
        } else {
            value
        }
    }

    /// Wrap a pointer-width value down to the i32 the 32-bit linear memory
    /// expects (no-op under 32-bit pointers).
    pub(crate) fn wrap_ptr(&self, value: Expr) -> Expr {
        if self.uintptr.wasm_type() == ValType::I64 {
            Expr::Unary {
                op: UnOp::Wrap,
                from: ValType::I64,
                to: ValType::I32,
                value: Box::new(value),
            }
        } else {
            value
        }
    }

    fn intrinsic_function(
        &self,
        name: &str,
        params: Vec<(&str, Type)>,
        return_type: Type,
        signature: String,
    ) -> Function {
        Function {
            name: name.to_string(),
            parameters: params
                .into_iter()
                .enumerate()
                .map(|(i, (pname, ty))| Variable {
                    name: pname.to_string(),
                    ty,
                    global: false,
                    constant: false,
                    index: i as u32,
                    value: None,
                })
                .collect(),
            return_type,
            imported: false,
            exported: true,
            instance: false,
            constructor: false,
            body: None,
            signature,
            type_env: HashMap::new(),
            class: None,
            file: String::new(),
            source: Rc::from(""),
            prefix: None,
        }
    }

    fn synthetic_start_function(&self) -> Rc<Function> {
        Rc::new(Function {
            name: START_FUNCTION.to_string(),
            parameters: Vec::new(),
            return_type: Type::void(),
            imported: false,
            exported: false,
            instance: false,
            constructor: false,
            body: None,
            signature: "v".to_string(),
            type_env: HashMap::new(),
            class: None,
            file: String::new(),
            source: Rc::from(""),
            prefix: None,
        })
    }

    // --- Diagnostic helpers ---

    pub(crate) fn error(&mut self, span: Span, message: &str) {
        self.report(Category::Error, span, message, None);
    }

    pub(crate) fn error_with(&mut self, span: Span, message: &str, arg: &str) {
        self.report(Category::Error, span, message, Some(arg));
    }

    pub(crate) fn warn_with(&mut self, span: Span, message: &str, arg: &str) {
        self.report(Category::Warning, span, message, Some(arg));
    }

    fn report(&mut self, category: Category, span: Span, message: &str, arg: Option<&str>) {
        let mut diagnostic = Diagnostic::new(category, message)
            .with_file(self.current_file.clone())
            .with_span(span.lo.0 as usize);
        if let Some(arg) = arg {
            diagnostic = diagnostic.with_arg(arg);
        }
        let source = self.current_source.clone();
        self.diagnostics.report(diagnostic, Some(&source));
    }

    pub(crate) fn defer_global_initializer(
        &mut self,
        name: String,
        init: ast::Expr,
        ty: Type,
        file: String,
        source: Rc<str>,
        prefix: Option<String>,
    ) {
        self.pending_global_initializers.push(PendingInitializer {
            name,
            init,
            ty,
            file,
            source,
            prefix,
        });
    }

    pub(crate) fn set_current_file(&mut self, file: String, source: Rc<str>, prefix: Option<String>) {
        self.current_file = file;
        self.current_source = source;
        self.current_prefix = prefix;
    }

    pub(crate) fn current_file(&self) -> (String, Rc<str>, Option<String>) {
        (
            self.current_file.clone(),
            self.current_source.clone(),
            self.current_prefix.clone(),
        )
    }
}

fn init_span(expr: &ast::Expr) -> Span {
    use deno_ast::swc::common::Spanned;
    expr.span()
}
