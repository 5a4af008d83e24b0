//! IR-to-bytes encoding using `wasm-encoder`.
//!
//! Sections are emitted in the order the binary format requires (type,
//! import, function, memory, global, export, start, code) and indices are
//! assigned here: imports precede defined functions in the function index
//! space, and break labels resolve to relative depths against the active
//! label stack while a body is walked.

use anyhow::{Result, anyhow, bail};
use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, EntityType, ExportKind, ExportSection, FunctionSection,
    GlobalSection, GlobalType, ImportSection, Instruction, MemArg, MemorySection, MemoryType,
    StartSection, TypeSection,
};

use super::{BinOp, Body, Expr, Memory, Module, UnOp, ValType};

impl Module {
    /// Encode the module into a WebAssembly binary.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut wasm = wasm_encoder::Module::new();
        let function_indices = self.function_indices();

        let mut types = TypeSection::new();
        for sig in &self.signatures {
            let params: Vec<_> = sig.params.iter().map(|t| val(*t)).collect();
            let results: Vec<_> = sig.results.iter().map(|t| val(*t)).collect();
            types.ty().function(params, results);
        }
        wasm.section(&types);

        let mut imports = ImportSection::new();
        if let Some(Memory::Import {
            module,
            name,
            initial,
        }) = &self.memory
        {
            imports.import(
                module,
                name,
                EntityType::Memory(MemoryType {
                    minimum: *initial as u64,
                    maximum: None,
                    memory64: false,
                    shared: false,
                    page_size_log2: None,
                }),
            );
        }
        for import in &self.imports {
            imports.import(
                &import.module,
                &import.base,
                EntityType::Function(import.sig),
            );
        }
        if !self.imports.is_empty() || matches!(self.memory, Some(Memory::Import { .. })) {
            wasm.section(&imports);
        }

        let mut functions = FunctionSection::new();
        for function in &self.functions {
            functions.function(function.sig);
        }
        wasm.section(&functions);

        if let Some(Memory::Own {
            initial, maximum, ..
        }) = &self.memory
        {
            let mut memory = MemorySection::new();
            memory.memory(MemoryType {
                minimum: *initial as u64,
                maximum: Some(*maximum as u64),
                memory64: false,
                shared: false,
                page_size_log2: None,
            });
            wasm.section(&memory);
        }

        if !self.globals.is_empty() {
            let mut globals = GlobalSection::new();
            for global in &self.globals {
                globals.global(
                    GlobalType {
                        val_type: val(global.ty),
                        mutable: global.mutable,
                        shared: false,
                    },
                    &const_expr(&global.init)?,
                );
            }
            wasm.section(&globals);
        }

        let mut exports = ExportSection::new();
        for export in &self.exports {
            let index = function_indices
                .get(export.internal.as_str())
                .copied()
                .ok_or_else(|| anyhow!("export of unknown function '{}'", export.internal))?;
            exports.export(&export.name, ExportKind::Func, index);
        }
        if let Some(Memory::Own {
            export: Some(name), ..
        }) = &self.memory
        {
            exports.export(name, ExportKind::Memory, 0);
        }
        wasm.section(&exports);

        if let Some(start) = &self.start {
            let function_index = function_indices
                .get(start.as_str())
                .copied()
                .ok_or_else(|| anyhow!("start references unknown function '{}'", start))?;
            wasm.section(&StartSection { function_index });
        }

        let mut code = CodeSection::new();
        for function in &self.functions {
            match &function.body {
                Body::Raw(bytes) => {
                    code.raw(bytes);
                }
                Body::Ir(body) => {
                    let mut encoder = BodyEncoder {
                        module: self,
                        function: wasm_encoder::Function::new(group_locals(&function.locals)),
                        labels: Vec::new(),
                    };
                    for expr in body {
                        encoder.emit(expr)?;
                    }
                    encoder.function.instruction(&Instruction::End);
                    code.function(&encoder.function);
                }
            }
        }
        wasm.section(&code);

        Ok(wasm.finish())
    }

    /// Validate an encoded binary with `wasmparser`.
    pub fn validate(bytes: &[u8]) -> Result<()> {
        wasmparser::validate(bytes).map_err(|e| anyhow!("invalid module: {}", e))?;
        Ok(())
    }
}

fn val(ty: ValType) -> wasm_encoder::ValType {
    match ty {
        ValType::I32 => wasm_encoder::ValType::I32,
        ValType::I64 => wasm_encoder::ValType::I64,
        ValType::F32 => wasm_encoder::ValType::F32,
        ValType::F64 => wasm_encoder::ValType::F64,
    }
}

fn const_expr(init: &Expr) -> Result<ConstExpr> {
    Ok(match init {
        Expr::I32Const(v) => ConstExpr::i32_const(*v),
        Expr::I64Const(v) => ConstExpr::i64_const(*v),
        Expr::F32Const(v) => ConstExpr::f32_const((*v).into()),
        Expr::F64Const(v) => ConstExpr::f64_const((*v).into()),
        other => bail!("unsupported global initializer expression: {:?}", other),
    })
}

/// Compress a flat locals list into (count, type) runs.
fn group_locals(locals: &[ValType]) -> Vec<(u32, wasm_encoder::ValType)> {
    let mut groups: Vec<(u32, wasm_encoder::ValType)> = Vec::new();
    for ty in locals {
        let ty = val(*ty);
        match groups.last_mut() {
            Some((count, last)) if *last == ty => *count += 1,
            _ => groups.push((1, ty)),
        }
    }
    groups
}

struct BodyEncoder<'a> {
    module: &'a Module,
    function: wasm_encoder::Function,
    /// Active structured-control labels, innermost last. `If` frames push
    /// `None` so depth counting stays correct.
    labels: Vec<Option<String>>,
}

impl BodyEncoder<'_> {
    fn emit(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::I32Const(v) => {
                self.function.instruction(&Instruction::I32Const(*v));
            }
            Expr::I64Const(v) => {
                self.function.instruction(&Instruction::I64Const(*v));
            }
            Expr::F32Const(v) => {
                self.function.instruction(&Instruction::F32Const((*v).into()));
            }
            Expr::F64Const(v) => {
                self.function.instruction(&Instruction::F64Const((*v).into()));
            }
            Expr::LocalGet { index, .. } => {
                self.function.instruction(&Instruction::LocalGet(*index));
            }
            Expr::LocalSet { index, value } => {
                self.emit(value)?;
                self.function.instruction(&Instruction::LocalSet(*index));
            }
            Expr::LocalTee { index, value, .. } => {
                self.emit(value)?;
                self.function.instruction(&Instruction::LocalTee(*index));
            }
            Expr::GlobalGet { name, .. } => {
                let index = self.global_index(name)?;
                self.function.instruction(&Instruction::GlobalGet(index));
            }
            Expr::GlobalSet { name, value } => {
                self.emit(value)?;
                let index = self.global_index(name)?;
                self.function.instruction(&Instruction::GlobalSet(index));
            }
            Expr::Load {
                ty,
                bytes,
                signed,
                offset,
                ptr,
            } => {
                self.emit(ptr)?;
                let arg = mem_arg(*offset, *bytes);
                let inst = match (ty, bytes, signed) {
                    (ValType::I32, 1, true) => Instruction::I32Load8S(arg),
                    (ValType::I32, 1, false) => Instruction::I32Load8U(arg),
                    (ValType::I32, 2, true) => Instruction::I32Load16S(arg),
                    (ValType::I32, 2, false) => Instruction::I32Load16U(arg),
                    (ValType::I32, 4, _) => Instruction::I32Load(arg),
                    (ValType::I64, 8, _) => Instruction::I64Load(arg),
                    (ValType::F32, 4, _) => Instruction::F32Load(arg),
                    (ValType::F64, 8, _) => Instruction::F64Load(arg),
                    _ => bail!("unsupported load: {:?}/{} bytes", ty, bytes),
                };
                self.function.instruction(&inst);
            }
            Expr::Store {
                ty,
                bytes,
                offset,
                ptr,
                value,
            } => {
                self.emit(ptr)?;
                self.emit(value)?;
                let arg = mem_arg(*offset, *bytes);
                let inst = match (ty, bytes) {
                    (ValType::I32, 1) => Instruction::I32Store8(arg),
                    (ValType::I32, 2) => Instruction::I32Store16(arg),
                    (ValType::I32, 4) => Instruction::I32Store(arg),
                    (ValType::I64, 8) => Instruction::I64Store(arg),
                    (ValType::F32, 4) => Instruction::F32Store(arg),
                    (ValType::F64, 8) => Instruction::F64Store(arg),
                    _ => bail!("unsupported store: {:?}/{} bytes", ty, bytes),
                };
                self.function.instruction(&inst);
            }
            Expr::Unary {
                op,
                from,
                to,
                value,
            } => {
                self.emit(value)?;
                self.function.instruction(&unary(*op, *from, *to)?);
            }
            Expr::Binary {
                op,
                ty,
                left,
                right,
            } => {
                self.emit(left)?;
                self.emit(right)?;
                self.function.instruction(&binary(*op, *ty)?);
            }
            Expr::If {
                ty,
                condition,
                if_true,
                if_false,
            } => {
                self.emit(condition)?;
                self.function.instruction(&Instruction::If(block_type(*ty)));
                self.labels.push(None);
                self.emit(if_true)?;
                if let Some(alt) = if_false {
                    self.function.instruction(&Instruction::Else);
                    self.emit(alt)?;
                }
                self.labels.pop();
                self.function.instruction(&Instruction::End);
            }
            Expr::Block { label, ty, body } => {
                self.function
                    .instruction(&Instruction::Block(block_type(*ty)));
                self.labels.push(label.clone());
                for expr in body {
                    self.emit(expr)?;
                }
                self.labels.pop();
                self.function.instruction(&Instruction::End);
            }
            Expr::Loop { label, body } => {
                self.function
                    .instruction(&Instruction::Loop(BlockType::Empty));
                self.labels.push(Some(label.clone()));
                for expr in body {
                    self.emit(expr)?;
                }
                self.labels.pop();
                self.function.instruction(&Instruction::End);
            }
            Expr::Br { label, condition } => {
                let depth = self
                    .labels
                    .iter()
                    .rev()
                    .position(|l| l.as_deref() == Some(label.as_str()))
                    .ok_or_else(|| anyhow!("break to unknown label '{}'", label))?
                    as u32;
                match condition {
                    Some(cond) => {
                        self.emit(cond)?;
                        self.function.instruction(&Instruction::BrIf(depth));
                    }
                    None => {
                        self.function.instruction(&Instruction::Br(depth));
                    }
                }
            }
            Expr::Call {
                target, operands, ..
            } => {
                for operand in operands {
                    self.emit(operand)?;
                }
                let index = self
                    .module
                    .function_index(target)
                    .ok_or_else(|| anyhow!("call to unknown function '{}'", target))?;
                self.function.instruction(&Instruction::Call(index));
            }
            Expr::Return { value } => {
                if let Some(value) = value {
                    self.emit(value)?;
                }
                self.function.instruction(&Instruction::Return);
            }
            Expr::Drop { value } => {
                self.emit(value)?;
                self.function.instruction(&Instruction::Drop);
            }
            Expr::Nop => {
                self.function.instruction(&Instruction::Nop);
            }
            Expr::Unreachable => {
                self.function.instruction(&Instruction::Unreachable);
            }
        }
        Ok(())
    }

    fn global_index(&self, name: &str) -> Result<u32> {
        self.module
            .global_index(name)
            .ok_or_else(|| anyhow!("reference to unknown global '{}'", name))
    }
}

fn block_type(ty: Option<ValType>) -> BlockType {
    match ty {
        Some(ty) => BlockType::Result(val(ty)),
        None => BlockType::Empty,
    }
}

fn mem_arg(offset: u32, bytes: u8) -> MemArg {
    MemArg {
        offset: offset as u64,
        align: match bytes {
            1 => 0,
            2 => 1,
            4 => 2,
            _ => 3,
        },
        memory_index: 0,
    }
}

fn unary(op: UnOp, from: ValType, to: ValType) -> Result<Instruction<'static>> {
    use ValType::*;
    Ok(match (op, from, to) {
        (UnOp::Eqz, I32, _) => Instruction::I32Eqz,
        (UnOp::Eqz, I64, _) => Instruction::I64Eqz,
        (UnOp::Neg, F32, _) => Instruction::F32Neg,
        (UnOp::Neg, F64, _) => Instruction::F64Neg,
        (UnOp::Wrap, I64, I32) => Instruction::I32WrapI64,
        (UnOp::ExtendS, I32, I64) => Instruction::I64ExtendI32S,
        (UnOp::ExtendU, I32, I64) => Instruction::I64ExtendI32U,
        (UnOp::TruncS, F32, I32) => Instruction::I32TruncF32S,
        (UnOp::TruncU, F32, I32) => Instruction::I32TruncF32U,
        (UnOp::TruncS, F64, I32) => Instruction::I32TruncF64S,
        (UnOp::TruncU, F64, I32) => Instruction::I32TruncF64U,
        (UnOp::TruncS, F32, I64) => Instruction::I64TruncF32S,
        (UnOp::TruncU, F32, I64) => Instruction::I64TruncF32U,
        (UnOp::TruncS, F64, I64) => Instruction::I64TruncF64S,
        (UnOp::TruncU, F64, I64) => Instruction::I64TruncF64U,
        (UnOp::ConvertS, I32, F32) => Instruction::F32ConvertI32S,
        (UnOp::ConvertU, I32, F32) => Instruction::F32ConvertI32U,
        (UnOp::ConvertS, I32, F64) => Instruction::F64ConvertI32S,
        (UnOp::ConvertU, I32, F64) => Instruction::F64ConvertI32U,
        (UnOp::ConvertS, I64, F32) => Instruction::F32ConvertI64S,
        (UnOp::ConvertU, I64, F32) => Instruction::F32ConvertI64U,
        (UnOp::ConvertS, I64, F64) => Instruction::F64ConvertI64S,
        (UnOp::ConvertU, I64, F64) => Instruction::F64ConvertI64U,
        (UnOp::Promote, F32, F64) => Instruction::F64PromoteF32,
        (UnOp::Demote, F64, F32) => Instruction::F32DemoteF64,
        _ => bail!("unsupported unary: {:?} {:?} -> {:?}", op, from, to),
    })
}

fn binary(op: BinOp, ty: ValType) -> Result<Instruction<'static>> {
    use ValType::*;
    Ok(match (op, ty) {
        (BinOp::Add, I32) => Instruction::I32Add,
        (BinOp::Sub, I32) => Instruction::I32Sub,
        (BinOp::Mul, I32) => Instruction::I32Mul,
        (BinOp::DivS, I32) => Instruction::I32DivS,
        (BinOp::DivU, I32) => Instruction::I32DivU,
        (BinOp::RemS, I32) => Instruction::I32RemS,
        (BinOp::RemU, I32) => Instruction::I32RemU,
        (BinOp::And, I32) => Instruction::I32And,
        (BinOp::Or, I32) => Instruction::I32Or,
        (BinOp::Xor, I32) => Instruction::I32Xor,
        (BinOp::Shl, I32) => Instruction::I32Shl,
        (BinOp::ShrS, I32) => Instruction::I32ShrS,
        (BinOp::ShrU, I32) => Instruction::I32ShrU,
        (BinOp::Eq, I32) => Instruction::I32Eq,
        (BinOp::Ne, I32) => Instruction::I32Ne,
        (BinOp::LtS, I32) => Instruction::I32LtS,
        (BinOp::LtU, I32) => Instruction::I32LtU,
        (BinOp::LeS, I32) => Instruction::I32LeS,
        (BinOp::LeU, I32) => Instruction::I32LeU,
        (BinOp::GtS, I32) => Instruction::I32GtS,
        (BinOp::GtU, I32) => Instruction::I32GtU,
        (BinOp::GeS, I32) => Instruction::I32GeS,
        (BinOp::GeU, I32) => Instruction::I32GeU,
        (BinOp::Add, I64) => Instruction::I64Add,
        (BinOp::Sub, I64) => Instruction::I64Sub,
        (BinOp::Mul, I64) => Instruction::I64Mul,
        (BinOp::DivS, I64) => Instruction::I64DivS,
        (BinOp::DivU, I64) => Instruction::I64DivU,
        (BinOp::RemS, I64) => Instruction::I64RemS,
        (BinOp::RemU, I64) => Instruction::I64RemU,
        (BinOp::And, I64) => Instruction::I64And,
        (BinOp::Or, I64) => Instruction::I64Or,
        (BinOp::Xor, I64) => Instruction::I64Xor,
        (BinOp::Shl, I64) => Instruction::I64Shl,
        (BinOp::ShrS, I64) => Instruction::I64ShrS,
        (BinOp::ShrU, I64) => Instruction::I64ShrU,
        (BinOp::Eq, I64) => Instruction::I64Eq,
        (BinOp::Ne, I64) => Instruction::I64Ne,
        (BinOp::LtS, I64) => Instruction::I64LtS,
        (BinOp::LtU, I64) => Instruction::I64LtU,
        (BinOp::LeS, I64) => Instruction::I64LeS,
        (BinOp::LeU, I64) => Instruction::I64LeU,
        (BinOp::GtS, I64) => Instruction::I64GtS,
        (BinOp::GtU, I64) => Instruction::I64GtU,
        (BinOp::GeS, I64) => Instruction::I64GeS,
        (BinOp::GeU, I64) => Instruction::I64GeU,
        (BinOp::Add, F32) => Instruction::F32Add,
        (BinOp::Sub, F32) => Instruction::F32Sub,
        (BinOp::Mul, F32) => Instruction::F32Mul,
        (BinOp::Div, F32) => Instruction::F32Div,
        (BinOp::Eq, F32) => Instruction::F32Eq,
        (BinOp::Ne, F32) => Instruction::F32Ne,
        (BinOp::Lt, F32) => Instruction::F32Lt,
        (BinOp::Le, F32) => Instruction::F32Le,
        (BinOp::Gt, F32) => Instruction::F32Gt,
        (BinOp::Ge, F32) => Instruction::F32Ge,
        (BinOp::Add, F64) => Instruction::F64Add,
        (BinOp::Sub, F64) => Instruction::F64Sub,
        (BinOp::Mul, F64) => Instruction::F64Mul,
        (BinOp::Div, F64) => Instruction::F64Div,
        (BinOp::Eq, F64) => Instruction::F64Eq,
        (BinOp::Ne, F64) => Instruction::F64Ne,
        (BinOp::Lt, F64) => Instruction::F64Lt,
        (BinOp::Le, F64) => Instruction::F64Le,
        (BinOp::Gt, F64) => Instruction::F64Gt,
        (BinOp::Ge, F64) => Instruction::F64Ge,
        _ => bail!("unsupported binary: {:?} on {:?}", op, ty),
    })
}
