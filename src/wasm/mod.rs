//! WebAssembly IR.
//!
//! The compiler lowers into this tree-shaped IR rather than straight into
//! bytes: every node carries enough type information that the lowering
//! passes can keep the emitted stack code well-typed, and tests can assert
//! on the structure of function bodies without decoding binaries.
//!
//! `Module` owns deduplicated signatures, imports, defined functions
//! (tree bodies, or raw code entries carried over from the linked
//! allocator binary), named globals, exports, the memory declaration, and
//! the optional start function. Functions and globals are referenced by
//! name throughout; contiguous indices are assigned once at encode time
//! (`encode.rs`), with imports preceding defined functions.

pub mod encode;
pub mod link;

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

/// Unary operator. Conversions carry their source and destination value
/// types on the `Unary` node, so one operator covers all width/sign
/// combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Equal to zero (i32/i64 operand, i32 result).
    Eqz,
    /// Float negation.
    Neg,
    /// i64 -> i32.
    Wrap,
    /// i32 -> i64, sign-extending.
    ExtendS,
    /// i32 -> i64, zero-extending.
    ExtendU,
    /// float -> signed integer.
    TruncS,
    /// float -> unsigned integer.
    TruncU,
    /// signed integer -> float.
    ConvertS,
    /// unsigned integer -> float.
    ConvertU,
    /// f32 -> f64.
    Promote,
    /// f64 -> f32.
    Demote,
}

/// Binary operator. The `Binary` node carries the operand value type;
/// comparison results are always i32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Eq,
    Ne,
    LtS,
    LtU,
    LeS,
    LeU,
    GtS,
    GtU,
    GeS,
    GeU,
    /// Float division (floats have no signedness split).
    Div,
    /// Float comparisons.
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq
                | BinOp::Ne
                | BinOp::LtS
                | BinOp::LtU
                | BinOp::LeS
                | BinOp::LeU
                | BinOp::GtS
                | BinOp::GtU
                | BinOp::GeS
                | BinOp::GeU
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    LocalGet {
        index: u32,
        ty: ValType,
    },
    LocalSet {
        index: u32,
        value: Box<Expr>,
    },
    LocalTee {
        index: u32,
        ty: ValType,
        value: Box<Expr>,
    },
    GlobalGet {
        name: String,
        ty: ValType,
    },
    GlobalSet {
        name: String,
        value: Box<Expr>,
    },
    /// Typed memory load. `bytes` selects the access width; narrow loads
    /// extend according to `signed`.
    Load {
        ty: ValType,
        bytes: u8,
        signed: bool,
        offset: u32,
        ptr: Box<Expr>,
    },
    Store {
        ty: ValType,
        bytes: u8,
        offset: u32,
        ptr: Box<Expr>,
        value: Box<Expr>,
    },
    Unary {
        op: UnOp,
        from: ValType,
        to: ValType,
        value: Box<Expr>,
    },
    Binary {
        op: BinOp,
        ty: ValType,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        ty: Option<ValType>,
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Option<Box<Expr>>,
    },
    Block {
        label: Option<String>,
        ty: Option<ValType>,
        body: Vec<Expr>,
    },
    Loop {
        label: String,
        body: Vec<Expr>,
    },
    /// `br` (unconditional) or `br_if` when `condition` is present.
    Br {
        label: String,
        condition: Option<Box<Expr>>,
    },
    Call {
        target: String,
        ty: Option<ValType>,
        operands: Vec<Expr>,
    },
    Return {
        value: Option<Box<Expr>>,
    },
    Drop {
        value: Box<Expr>,
    },
    Nop,
    Unreachable,
}

impl Expr {
    /// Declared result type of this expression, `None` for statements and
    /// for stack-polymorphic nodes (`unreachable`, `br`, `return`).
    pub fn ty(&self) -> Option<ValType> {
        match self {
            Expr::I32Const(_) => Some(ValType::I32),
            Expr::I64Const(_) => Some(ValType::I64),
            Expr::F32Const(_) => Some(ValType::F32),
            Expr::F64Const(_) => Some(ValType::F64),
            Expr::LocalGet { ty, .. } | Expr::LocalTee { ty, .. } | Expr::GlobalGet { ty, .. } => {
                Some(*ty)
            }
            Expr::Load { ty, .. } => Some(*ty),
            Expr::Unary { to, .. } => Some(*to),
            Expr::Binary { op, ty, .. } => {
                if op.is_comparison() {
                    Some(ValType::I32)
                } else {
                    Some(*ty)
                }
            }
            Expr::If { ty, .. } | Expr::Block { ty, .. } | Expr::Call { ty, .. } => *ty,
            Expr::LocalSet { .. }
            | Expr::GlobalSet { .. }
            | Expr::Store { .. }
            | Expr::Loop { .. }
            | Expr::Br { .. }
            | Expr::Return { .. }
            | Expr::Drop { .. }
            | Expr::Nop
            | Expr::Unreachable => None,
        }
    }
}

/// A deduplicated function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

/// An imported function. `name` is the internal (mangled) identity used
/// by `Call` nodes; `module`/`base` form the wasm import path.
#[derive(Debug)]
pub struct Import {
    pub name: String,
    pub module: String,
    pub base: String,
    pub sig: u32,
}

/// Body of a defined function: lowered IR, or a raw code-section entry
/// carried over byte-for-byte from a linked binary.
#[derive(Debug)]
pub enum Body {
    Ir(Vec<Expr>),
    Raw(Vec<u8>),
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub sig: u32,
    /// Body-level locals beyond the parameters (parameters are implicit
    /// in the signature). Unused for `Body::Raw`.
    pub locals: Vec<ValType>,
    pub body: Body,
}

#[derive(Debug)]
pub struct Global {
    pub name: String,
    pub ty: ValType,
    pub mutable: bool,
    pub init: Expr,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub internal: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Memory {
    Import {
        module: String,
        name: String,
        initial: u32,
    },
    Own {
        initial: u32,
        maximum: u32,
        export: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct Module {
    signatures: Vec<Signature>,
    imports: Vec<Import>,
    functions: Vec<Function>,
    globals: Vec<Global>,
    exports: Vec<Export>,
    memory: Option<Memory>,
    start: Option<String>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    /// Register a signature, deduplicating structurally. Returns its index
    /// into the type section.
    pub fn add_signature(&mut self, params: Vec<ValType>, results: Vec<ValType>) -> u32 {
        let sig = Signature { params, results };
        if let Some(idx) = self.signatures.iter().position(|s| *s == sig) {
            return idx as u32;
        }
        self.signatures.push(sig);
        (self.signatures.len() - 1) as u32
    }

    pub fn signature(&self, index: u32) -> &Signature {
        &self.signatures[index as usize]
    }

    pub fn add_import(&mut self, name: String, module: String, base: String, sig: u32) {
        self.imports.push(Import {
            name,
            module,
            base,
            sig,
        });
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn add_global(&mut self, name: String, ty: ValType, mutable: bool, init: Expr) {
        self.globals.push(Global {
            name,
            ty,
            mutable,
            init,
        });
    }

    pub fn add_export(&mut self, name: String, internal: String) {
        self.exports.push(Export { name, internal });
    }

    pub fn remove_export(&mut self, name: &str) {
        self.exports.retain(|e| e.name != name);
    }

    pub fn set_memory(&mut self, memory: Memory) {
        self.memory = Some(memory);
    }

    pub fn set_start(&mut self, name: Option<String>) {
        self.start = name;
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn import(&self, name: &str) -> Option<&Import> {
        self.imports.iter().find(|i| i.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// Whether `name` resolves to a callable (import or defined function).
    pub fn has_function(&self, name: &str) -> bool {
        self.import(name).is_some() || self.function(name).is_some()
    }

    /// Index of a callable in the function index space: imports first,
    /// then defined functions in insertion order.
    pub fn function_index(&self, name: &str) -> Option<u32> {
        if let Some(i) = self.imports.iter().position(|i| i.name == name) {
            return Some(i as u32);
        }
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| (i + self.imports.len()) as u32)
    }

    /// Index of a global in the global index space.
    pub fn global_index(&self, name: &str) -> Option<u32> {
        self.globals.iter().position(|g| g.name == name).map(|i| i as u32)
    }

    /// Name-to-index map of the full function index space.
    pub fn function_indices(&self) -> HashMap<&str, u32> {
        let mut map = HashMap::new();
        for (i, import) in self.imports.iter().enumerate() {
            map.insert(import.name.as_str(), i as u32);
        }
        for (i, function) in self.functions.iter().enumerate() {
            map.insert(function.name.as_str(), (i + self.imports.len()) as u32);
        }
        map
    }
}
