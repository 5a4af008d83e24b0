//! Small reusable codegen utilities: name mangling, signature registry,
//! type resolution, the implicit-conversion engine, and compile-time
//! constant evaluation for global and enum initializers.

use std::collections::HashMap;

use deno_ast::swc::ast;
use deno_ast::swc::common::{Span, Spanned};

use crate::codegen::{Compiler, FnCtx};
use crate::parser::Program;
use crate::types::{ConstValue, Type, TypeKind};
use crate::wasm::{BinOp, Expr, UnOp, ValType};

/// Mangle a source identifier with an optional file prefix.
pub(crate) fn mangled(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    }
}

/// Mangling prefix of a program file: `None` for the entry file and the
/// built-in declaration file, the sanitized entry-relative path otherwise.
pub(crate) fn file_prefix(program: &Program, index: usize) -> Option<String> {
    let file = &program.files[index];
    if index + 1 == program.files.len() || file.is_library() {
        return None;
    }
    let relative = file
        .path
        .strip_prefix(&program.entry_dir)
        .unwrap_or(&file.path);
    Some(sanitize(&relative.to_string_lossy()))
}

fn sanitize(path: &str) -> String {
    path.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '\\' | '$'))
        .collect()
}

/// Map a primitive keyword to its type, honoring the compilation's
/// pointer size.
pub(crate) fn builtin_type(name: &str, uintptr_size: u32) -> Option<Type> {
    Some(match name {
        "byte" => Type::byte(),
        "sbyte" => Type::sbyte(),
        "short" => Type::short(),
        "ushort" => Type::ushort(),
        "int" => Type::int(),
        "uint" => Type::uint(),
        "long" => Type::long(),
        "ulong" => Type::ulong(),
        "bool" => Type::bool(),
        "float" => Type::float(),
        "double" => Type::double(),
        "uintptr" => Type::uintptr(uintptr_size),
        _ => return None,
    })
}

fn type_char(ty: &Type) -> char {
    if ty.is_void() {
        return 'v';
    }
    match ty.wasm_type() {
        ValType::I32 => 'i',
        ValType::I64 => 'I',
        ValType::F32 => 'f',
        ValType::F64 => 'F',
    }
}

impl Compiler {
    /// Register a signature (parameters then return) in the signature
    /// registry and the module's type section. Returns the short key.
    pub(crate) fn register_signature(&mut self, params: &[Type], ret: &Type) -> String {
        let mut key = String::with_capacity(params.len() + 1);
        for param in params {
            key.push(type_char(param));
        }
        key.push(type_char(ret));
        if !self.signatures.contains_key(&key) {
            let wasm_params = params.iter().map(Type::wasm_type).collect();
            let results = if ret.is_void() {
                Vec::new()
            } else {
                vec![ret.wasm_type()]
            };
            let index = self.module.add_signature(wasm_params, results);
            self.signatures.insert(key.clone(), index);
        }
        key
    }

    /// Resolve a source identifier against the global maps, preferring the
    /// current file's mangled namespace over the entry/library namespace.
    pub(crate) fn resolve_reference(&self, name: &str) -> String {
        if let Some(prefix) = &self.current_prefix {
            let qualified = format!("{}/{}", prefix, name);
            if self.is_known_name(&qualified) {
                return qualified;
            }
        }
        name.to_string()
    }

    fn is_known_name(&self, name: &str) -> bool {
        self.globals.contains_key(name)
            || self.functions.contains_key(name)
            || self.classes.contains_key(name)
            || self.enums.contains_key(name)
            || self.function_templates.contains_key(name)
            || self.class_templates.contains_key(name)
            || self.type_aliases.contains_key(name)
    }

    // --- Type resolution ---

    /// Map a source type node to a reflection type. Emits a diagnostic and
    /// returns `void` as a recovery sentinel on unsupported input.
    pub(crate) fn resolve_type(
        &mut self,
        env: &HashMap<String, Type>,
        ty: &ast::TsType,
        accept_void: bool,
    ) -> Type {
        self.resolve_type_inner(env, ty, accept_void, 0)
    }

    fn resolve_type_inner(
        &mut self,
        env: &HashMap<String, Type>,
        ty: &ast::TsType,
        accept_void: bool,
        depth: u32,
    ) -> Type {
        if depth > 32 {
            self.error(ty.span(), "Unresolvable type");
            return Type::void();
        }
        match ty {
            ast::TsType::TsKeywordType(keyword) => match keyword.kind {
                ast::TsKeywordTypeKind::TsVoidKeyword => {
                    if !accept_void {
                        self.error_with(keyword.span, "Illegal type", "void");
                    }
                    Type::void()
                }
                ast::TsKeywordTypeKind::TsBooleanKeyword => Type::bool(),
                _ => {
                    self.error(keyword.span, "Unsupported type");
                    Type::void()
                }
            },
            ast::TsType::TsTypeRef(type_ref) => {
                let ast::TsEntityName::Ident(ident) = &type_ref.type_name else {
                    self.error(type_ref.span, "Unsupported type");
                    return Type::void();
                };
                let name = ident.sym.as_ref();

                if let Some(bound) = env.get(name) {
                    return bound.clone();
                }
                // Builtin keywords short-circuit alias chasing.
                if let Some(builtin) = builtin_type(name, self.options.uintptr_size) {
                    return builtin;
                }

                let key = self.resolve_reference(name);

                if let Some(args) = &type_ref.type_params {
                    let type_args: Vec<Type> = args
                        .params
                        .iter()
                        .map(|t| self.resolve_type_inner(env, t, false, depth + 1))
                        .collect();
                    if let Some(template) = self.class_templates.get(&key).cloned() {
                        if let Some(class) =
                            self.instantiate_class(&template, &type_args, type_ref.span)
                        {
                            return Type::class(class, self.options.uintptr_size);
                        }
                    }
                    self.error_with(type_ref.span, "Unsupported type", name);
                    return Type::void();
                }

                if let Some(aliased) = self.type_aliases.get(&key).cloned() {
                    return self.resolve_type_inner(env, &aliased, accept_void, depth + 1);
                }
                if let Some(class) = self.classes.get(&key).cloned() {
                    return Type::class(class, self.options.uintptr_size);
                }
                if let Some(template) = self.class_templates.get(&key).cloned() {
                    if !template.is_generic()
                        && let Some(class) = self.instantiate_class(&template, &[], type_ref.span)
                    {
                        return Type::class(class, self.options.uintptr_size);
                    }
                }
                // Enum-typed values are their member integers.
                if self.enums.contains_key(&key) {
                    return Type::int();
                }
                self.error_with(type_ref.span, "Unsupported type", name);
                Type::void()
            }
            other => {
                self.error(other.span(), "Unsupported type");
                Type::void()
            }
        }
    }

    // --- Conversion engine ---

    /// Convert an IR expression of type `from` into one of type `to`.
    ///
    /// When `explicit` is false and the conversion is not silently safe an
    /// *Illegal implicit conversion* diagnostic is attached to the current
    /// statement (at most once per top-level node), but a converted
    /// expression is still produced so compilation can continue.
    pub(crate) fn maybe_convert_value(
        &mut self,
        ctx: &mut FnCtx,
        span: Span,
        expr: Expr,
        from: &Type,
        to: &Type,
        explicit: bool,
    ) -> Expr {
        if from == to || to.is_void() || from.is_void() {
            return expr;
        }

        // Class references convert only through pointer reinterpretation.
        if from.kind == TypeKind::Class || to.kind == TypeKind::Class {
            let pointer_cast = (from.kind == TypeKind::Class && to.kind == TypeKind::UintPtr)
                || (from.kind == TypeKind::UintPtr && to.kind == TypeKind::Class);
            if !pointer_cast && !explicit {
                self.illegal_conversion(ctx, span, from, to);
            }
            return expr;
        }

        if from.is_float() {
            let fw = from.wasm_type();
            if to.is_float() {
                return if from.size < to.size {
                    Expr::Unary {
                        op: UnOp::Promote,
                        from: ValType::F32,
                        to: ValType::F64,
                        value: Box::new(expr),
                    }
                } else {
                    if !explicit {
                        self.illegal_conversion(ctx, span, from, to);
                    }
                    Expr::Unary {
                        op: UnOp::Demote,
                        from: ValType::F64,
                        to: ValType::F32,
                        value: Box::new(expr),
                    }
                };
            }
            if !explicit {
                self.illegal_conversion(ctx, span, from, to);
            }
            let op = if to.is_signed() {
                UnOp::TruncS
            } else {
                UnOp::TruncU
            };
            if to.is_long() {
                return Expr::Unary {
                    op,
                    from: fw,
                    to: ValType::I64,
                    value: Box::new(expr),
                };
            }
            let truncated = Expr::Unary {
                op,
                from: fw,
                to: ValType::I32,
                value: Box::new(expr),
            };
            return self.narrow(truncated, to);
        }

        if from.is_long() {
            if to.is_float() {
                if !explicit {
                    self.illegal_conversion(ctx, span, from, to);
                }
                let op = if from.is_signed() {
                    UnOp::ConvertS
                } else {
                    UnOp::ConvertU
                };
                return Expr::Unary {
                    op,
                    from: ValType::I64,
                    to: to.wasm_type(),
                    value: Box::new(expr),
                };
            }
            if to.is_long() {
                // Sign/pointer reinterpretation, no instruction. Flag the
                // pointer-width portability hazard.
                if !explicit
                    && to.kind == TypeKind::UintPtr
                    && from.kind == TypeKind::ULong
                    && self.options.uintptr_size == 8
                {
                    self.warn_with(
                        span,
                        "Illegal implicit conversion",
                        &format!("{} to {} (unsafe under 32-bit pointers)", from, to),
                    );
                }
                return expr;
            }
            if !explicit {
                self.illegal_conversion(ctx, span, from, to);
            }
            let wrapped = Expr::Unary {
                op: UnOp::Wrap,
                from: ValType::I64,
                to: ValType::I32,
                value: Box::new(expr),
            };
            return self.narrow(wrapped, to);
        }

        // 32-bit integer family source.
        if to.is_float() {
            let op = if from.is_signed() {
                UnOp::ConvertS
            } else {
                UnOp::ConvertU
            };
            return Expr::Unary {
                op,
                from: ValType::I32,
                to: to.wasm_type(),
                value: Box::new(expr),
            };
        }
        if to.is_long() {
            // Extend unsigned unless both sides are signed; sign-mixing
            // extensions are not silently safe.
            let op = if from.is_signed() && to.is_signed() {
                UnOp::ExtendS
            } else {
                UnOp::ExtendU
            };
            if !explicit && from.is_signed() != to.is_signed() {
                self.illegal_conversion(ctx, span, from, to);
            }
            return Expr::Unary {
                op,
                from: ValType::I32,
                to: ValType::I64,
                value: Box::new(expr),
            };
        }

        if !explicit {
            if to.bitwidth() < from.bitwidth() {
                self.illegal_conversion(ctx, span, from, to);
            } else if from.kind == TypeKind::UintPtr
                && to.kind == TypeKind::UInt
                && self.options.uintptr_size == 4
            {
                self.warn_with(
                    span,
                    "Illegal implicit conversion",
                    &format!("{} to {} (unsafe under 64-bit pointers)", from, to),
                );
            }
        }
        if to.bitwidth() < from.bitwidth() {
            return self.narrow(expr, to);
        }
        // Same-or-wider width within the family: values are kept in
        // canonical form, so widening is a pass-through.
        expr
    }

    /// Truncate an i32-held value to a narrow integer type's canonical
    /// form: masking for unsigned targets, shift-pair sign extension for
    /// signed ones.
    pub(crate) fn narrow(&self, expr: Expr, to: &Type) -> Expr {
        if to.bitwidth() >= 32 {
            return expr;
        }
        if to.is_signed() {
            let shift = Expr::I32Const(to.shift_32() as i32);
            Expr::Binary {
                op: BinOp::ShrS,
                ty: ValType::I32,
                left: Box::new(Expr::Binary {
                    op: BinOp::Shl,
                    ty: ValType::I32,
                    left: Box::new(expr),
                    right: Box::new(shift.clone()),
                }),
                right: Box::new(shift),
            }
        } else {
            Expr::Binary {
                op: BinOp::And,
                ty: ValType::I32,
                left: Box::new(expr),
                right: Box::new(Expr::I32Const(to.mask_32() as i32)),
            }
        }
    }

    fn illegal_conversion(&mut self, ctx: &mut FnCtx, span: Span, from: &Type, to: &Type) {
        if ctx.conversion_reported {
            return;
        }
        ctx.conversion_reported = true;
        self.error_with(
            span,
            "Illegal implicit conversion",
            &format!("{} to {}", from, to),
        );
    }

    /// Wider common type of two operands: f64 > f32 > 64-bit integers >
    /// 32-bit integers, pointers sticky within their width class,
    /// unsigned winning on mixed signedness. Narrow integer operands
    /// promote to full 32-bit width.
    pub(crate) fn common_type(&self, left: &Type, right: &Type) -> Type {
        if left.kind == TypeKind::Double || right.kind == TypeKind::Double {
            return Type::double();
        }
        if left.kind == TypeKind::Float || right.kind == TypeKind::Float {
            return Type::float();
        }
        let pointerish = |t: &Type| matches!(t.kind, TypeKind::UintPtr | TypeKind::Class);
        if left.is_long() || right.is_long() {
            if self.options.uintptr_size == 8 && (pointerish(left) || pointerish(right)) {
                return self.uintptr.clone();
            }
            return if left.is_signed() && right.is_signed() {
                Type::long()
            } else {
                Type::ulong()
            };
        }
        if pointerish(left) || pointerish(right) {
            return self.uintptr.clone();
        }
        if left == right && (left.bitwidth() >= 32 || left.kind == TypeKind::Bool) {
            return left.clone();
        }
        if left.is_signed() && right.is_signed() {
            Type::int()
        } else {
            Type::uint()
        }
    }

    /// Turn a value into an i32 condition (non-zero = true).
    pub(crate) fn condition_value(&self, expr: Expr, ty: &Type) -> Expr {
        match ty.wasm_type() {
            ValType::I32 => expr,
            ValType::I64 => Expr::Binary {
                op: BinOp::Ne,
                ty: ValType::I64,
                left: Box::new(expr),
                right: Box::new(Expr::I64Const(0)),
            },
            ValType::F32 => Expr::Binary {
                op: BinOp::Ne,
                ty: ValType::F32,
                left: Box::new(expr),
                right: Box::new(Expr::F32Const(0.0)),
            },
            ValType::F64 => Expr::Binary {
                op: BinOp::Ne,
                ty: ValType::F64,
                left: Box::new(expr),
                right: Box::new(Expr::F64Const(0.0)),
            },
        }
    }
}

/// Evaluate a global initializer to a typed constant if it is a numeric,
/// boolean, or null literal (optionally under a prefix minus).
pub(crate) fn constant_initializer(expr: &ast::Expr, ty: &Type) -> Option<ConstValue> {
    match expr {
        ast::Expr::Paren(paren) => constant_initializer(&paren.expr, ty),
        ast::Expr::Lit(ast::Lit::Num(num)) => Some(make_const(num.value, ty)),
        ast::Expr::Lit(ast::Lit::Bool(b)) => Some(make_const(if b.value { 1.0 } else { 0.0 }, ty)),
        ast::Expr::Lit(ast::Lit::Null(_)) => Some(make_const(0.0, ty)),
        ast::Expr::Unary(unary) if unary.op == ast::UnaryOp::Minus => match &*unary.arg {
            ast::Expr::Lit(ast::Lit::Num(num)) => Some(make_const(-num.value, ty)),
            _ => None,
        },
        _ => None,
    }
}

/// Build a typed constant, canonicalizing narrow integer values.
pub(crate) fn make_const(value: f64, ty: &Type) -> ConstValue {
    match ty.wasm_type() {
        ValType::I32 => ConstValue::I32(canonical_i32(value, ty)),
        ValType::I64 => ConstValue::I64(value as i64),
        ValType::F32 => ConstValue::F32(value as f32),
        ValType::F64 => ConstValue::F64(value),
    }
}

pub(crate) fn canonical_i32(value: f64, ty: &Type) -> i32 {
    let wrapped = value as i64 as i32;
    if ty.bitwidth() >= 32 {
        wrapped
    } else if ty.is_signed() {
        (wrapped << ty.shift_32()) >> ty.shift_32()
    } else {
        (wrapped as u32 & ty.mask_32()) as i32
    }
}

/// The IR constant for a typed constant value.
pub(crate) fn const_expr(value: ConstValue) -> Expr {
    match value {
        ConstValue::I32(v) => Expr::I32Const(v),
        ConstValue::I64(v) => Expr::I64Const(v),
        ConstValue::F32(v) => Expr::F32Const(v),
        ConstValue::F64(v) => Expr::F64Const(v),
    }
}

/// Zero of a given type, for zero-initialized globals.
pub(crate) fn zero_expr(ty: &Type) -> Expr {
    match ty.wasm_type() {
        ValType::I32 => Expr::I32Const(0),
        ValType::I64 => Expr::I64Const(0),
        ValType::F32 => Expr::F32Const(0.0),
        ValType::F64 => Expr::F64Const(0.0),
    }
}
