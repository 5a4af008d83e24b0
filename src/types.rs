//! Reflection model of the barley type system.
//!
//! `Type` is a compact value used during initialization and codegen to
//! convey the static type of every expression. The code generator maps
//! types to WebAssembly value types and uses the derived width/signedness
//! attributes to pick conversion and arithmetic instructions.
//!
//! The remaining structures mirror the source program: `Variable` for
//! locals and globals, `Property` for class fields and enum members,
//! `Function` for compiled and imported functions, `Class`/`Enum` for
//! nominal types, and the two template forms that carry un-instantiated
//! generic declarations until a call site provides type arguments.
//!
//! Reflection objects are created by the initialization pass and live for
//! the whole compilation; shared ownership goes through `Rc`. Class
//! property layout is filled in a second phase (the shell is registered
//! first), which is why `Class` uses interior mutability.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use deno_ast::swc::ast;

use crate::wasm::ValType;

/// Primitive keywords reserved as type names in the surface language.
pub const TYPE_KEYWORDS: &[&str] = &[
    "byte", "sbyte", "short", "ushort", "int", "uint", "long", "ulong", "bool", "float", "double",
    "uintptr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Bool,
    SByte,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    UintPtr,
    Class,
}

/// A concrete type: a primitive kind plus its byte size, or a class
/// instance (pointer-sized, referencing the class).
#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    pub size: u32,
    pub class: Option<Rc<Class>>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.size == other.size
            && match (&self.class, &other.class) {
                (None, None) => true,
                (Some(a), Some(b)) => a.name == b.name,
                _ => false,
            }
    }
}

impl Type {
    fn primitive(kind: TypeKind, size: u32) -> Type {
        Type {
            kind,
            size,
            class: None,
        }
    }

    pub fn void() -> Type {
        Type::primitive(TypeKind::Void, 0)
    }
    pub fn bool() -> Type {
        Type::primitive(TypeKind::Bool, 1)
    }
    pub fn sbyte() -> Type {
        Type::primitive(TypeKind::SByte, 1)
    }
    pub fn byte() -> Type {
        Type::primitive(TypeKind::Byte, 1)
    }
    pub fn short() -> Type {
        Type::primitive(TypeKind::Short, 2)
    }
    pub fn ushort() -> Type {
        Type::primitive(TypeKind::UShort, 2)
    }
    pub fn int() -> Type {
        Type::primitive(TypeKind::Int, 4)
    }
    pub fn uint() -> Type {
        Type::primitive(TypeKind::UInt, 4)
    }
    pub fn long() -> Type {
        Type::primitive(TypeKind::Long, 8)
    }
    pub fn ulong() -> Type {
        Type::primitive(TypeKind::ULong, 8)
    }
    pub fn float() -> Type {
        Type::primitive(TypeKind::Float, 4)
    }
    pub fn double() -> Type {
        Type::primitive(TypeKind::Double, 8)
    }

    /// The pointer-sized unsigned integer. `size` is fixed per compilation
    /// to 4 or 8.
    pub fn uintptr(size: u32) -> Type {
        Type::primitive(TypeKind::UintPtr, size)
    }

    /// Instance type of a class: pointer-sized, referencing the class.
    pub fn class(class: Rc<Class>, ptr_size: u32) -> Type {
        Type {
            kind: TypeKind::Class,
            size: ptr_size,
            class: Some(class),
        }
    }

    pub fn is_void(&self) -> bool {
        self.kind == TypeKind::Void
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind, TypeKind::Float | TypeKind::Double)
    }

    /// 32-bit-or-narrower integer category, including `bool`, 32-bit
    /// `uintptr`, and class references under a 32-bit pointer size.
    pub fn is_int(&self) -> bool {
        match self.kind {
            TypeKind::Bool
            | TypeKind::SByte
            | TypeKind::Byte
            | TypeKind::Short
            | TypeKind::UShort
            | TypeKind::Int
            | TypeKind::UInt => true,
            TypeKind::UintPtr | TypeKind::Class => self.size == 4,
            _ => false,
        }
    }

    /// 64-bit integer category (`long`, `ulong`, and pointer-sized values
    /// under a 64-bit pointer size).
    pub fn is_long(&self) -> bool {
        match self.kind {
            TypeKind::Long | TypeKind::ULong => true,
            TypeKind::UintPtr | TypeKind::Class => self.size == 8,
            _ => false,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.is_int() || self.is_long()
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::SByte | TypeKind::Short | TypeKind::Int | TypeKind::Long
        )
    }

    /// Width in bits. `bool` is one bit wide; everything else is its byte
    /// size times eight.
    pub fn bitwidth(&self) -> u32 {
        if self.kind == TypeKind::Bool {
            1
        } else {
            self.size * 8
        }
    }

    /// Shift amount for sign-extending a narrowed value held in an i32.
    pub fn shift_32(&self) -> u32 {
        32 - self.bitwidth()
    }

    /// Low-bit mask for truncating a value held in an i32.
    pub fn mask_32(&self) -> u32 {
        if self.bitwidth() >= 32 {
            0xffff_ffff
        } else {
            (1u32 << self.bitwidth()) - 1
        }
    }

    /// WebAssembly value type carrying values of this type.
    pub fn wasm_type(&self) -> ValType {
        match self.kind {
            TypeKind::Float => ValType::F32,
            TypeKind::Double => ValType::F64,
            _ if self.is_long() => ValType::I64,
            _ => ValType::I32,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            TypeKind::Void => "void",
            TypeKind::Bool => "bool",
            TypeKind::SByte => "sbyte",
            TypeKind::Byte => "byte",
            TypeKind::Short => "short",
            TypeKind::UShort => "ushort",
            TypeKind::Int => "int",
            TypeKind::UInt => "uint",
            TypeKind::Long => "long",
            TypeKind::ULong => "ulong",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::UintPtr => "uintptr",
            TypeKind::Class => {
                return write!(
                    f,
                    "{}",
                    self.class.as_ref().map(|c| c.name.as_str()).unwrap_or("?")
                );
            }
        };
        f.write_str(name)
    }
}

/// A typed constant, used for global initializers and literal folding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

/// A local or global variable.
///
/// For locals, `index` is the slot in the owning function's local table
/// (parameters first, `this` at slot 0 for instance functions). Globals
/// keep `index` at 0 and are addressed by mangled name instead.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub global: bool,
    pub constant: bool,
    pub index: u32,
    pub value: Option<ConstValue>,
}

/// A class field or enum member.
///
/// Class fields carry the byte offset within the owning class; enum
/// members carry their constant integer value instead.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
    pub value: Option<i64>,
}

/// A compiled, imported, or allocator-provided function.
///
/// The mangled `name` is the IR-level identity. `parameters` are
/// slot-indexed in order (`this` first for instance functions); body-level
/// locals are allocated per compilation in `FnCtx`, not here. `type_env`
/// maps type-parameter names to concrete types for monomorphized
/// instances, and is consulted by the type resolver while lowering the
/// body. `source`/`file`/`prefix` record the defining file so diagnostics
/// and reference mangling work when the function is compiled later from
/// the queue.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<Variable>,
    pub return_type: Type,
    pub imported: bool,
    pub exported: bool,
    pub instance: bool,
    pub constructor: bool,
    pub body: Option<ast::BlockStmt>,
    pub signature: String,
    pub type_env: HashMap<String, Type>,
    pub class: Option<Rc<Class>>,
    pub file: String,
    pub source: Rc<str>,
    pub prefix: Option<String>,
}

/// A class with laid-out properties.
///
/// Registered as an empty shell first, then filled: this two-phase
/// construction lets properties and methods reference the class (including
/// cyclically) while layout is still running.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub properties: RefCell<Vec<Rc<Property>>>,
    pub size: Cell<u32>,
    pub type_env: HashMap<String, Type>,
}

impl Class {
    pub fn new(name: String, type_env: HashMap<String, Type>) -> Class {
        Class {
            name,
            properties: RefCell::new(Vec::new()),
            size: Cell::new(0),
            type_env,
        }
    }

    pub fn property(&self, name: &str) -> Option<Rc<Property>> {
        self.properties
            .borrow()
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }
}

/// An enum; members hold constant integer values.
#[derive(Debug)]
pub struct Enum {
    pub name: String,
    pub members: Vec<Property>,
}

impl Enum {
    pub fn member(&self, name: &str) -> Option<&Property> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// An un-instantiated function declaration.
///
/// Non-generic templates are eagerly instantiated during initialization;
/// generic ones wait for a call site to supply type arguments. Instances
/// are cached by the canonical type-argument tuple baked into the
/// instance name.
#[derive(Debug)]
pub struct FunctionTemplate {
    pub name: String,
    pub declaration: ast::FnDecl,
    pub type_parameters: Vec<String>,
    pub exported: bool,
    pub file: String,
    pub source: Rc<str>,
    pub prefix: Option<String>,
    pub instances: RefCell<HashMap<String, Rc<Function>>>,
}

impl FunctionTemplate {
    pub fn is_generic(&self) -> bool {
        !self.type_parameters.is_empty()
    }
}

/// An un-instantiated class declaration; see `FunctionTemplate`.
#[derive(Debug)]
pub struct ClassTemplate {
    pub name: String,
    pub declaration: ast::ClassDecl,
    pub type_parameters: Vec<String>,
    pub exported: bool,
    pub file: String,
    pub source: Rc<str>,
    pub prefix: Option<String>,
    pub instances: RefCell<HashMap<String, Rc<Class>>>,
}

impl ClassTemplate {
    pub fn is_generic(&self) -> bool {
        !self.type_parameters.is_empty()
    }
}
