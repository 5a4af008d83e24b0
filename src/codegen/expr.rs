//! Expression lowering.
//!
//! Every lowerer returns the IR expression together with the reflected
//! type of the value it produces, so callers can drive conversions. The
//! contextual type flows downward: literals take their type from context,
//! `~` widens its operand to a wider context before xor-ing, and call
//! arguments are lowered against the parameter types.
//!
//! User errors never abort lowering; each arm emits `unreachable` as a
//! placeholder (with reflected type `void`) so the surrounding IR stays
//! well-formed and further diagnostics can accumulate.

use std::rc::Rc;

use deno_ast::swc::ast;
use deno_ast::swc::common::{Span, Spanned};

use crate::codegen::helpers::{self, make_const};
use crate::codegen::{Compiler, FnCtx, HEAP_BASE, HEAP_GLOBAL};
use crate::types::{Function, Type};
use crate::wasm::{BinOp, Expr, UnOp, ValType};

impl Compiler {
    pub(crate) fn compile_expression(
        &mut self,
        ctx: &mut FnCtx,
        expr: &ast::Expr,
        contextual: &Type,
    ) -> (Expr, Type) {
        match expr {
            ast::Expr::Paren(paren) => self.compile_expression(ctx, &paren.expr, contextual),
            ast::Expr::Ident(ident) => self.compile_identifier(ctx, ident),
            ast::Expr::This(this_expr) => self.compile_this(ctx, this_expr),
            ast::Expr::Lit(lit) => self.compile_literal(lit, contextual),
            ast::Expr::Unary(unary) => self.compile_unary(ctx, unary, contextual),
            ast::Expr::Update(update) => self.compile_update(ctx, update, contextual),
            ast::Expr::Bin(bin) => self.compile_binary(ctx, bin, contextual),
            ast::Expr::Assign(assign) => self.compile_assignment(ctx, assign, contextual),
            ast::Expr::Cond(cond) => self.compile_conditional(ctx, cond, contextual),
            ast::Expr::Call(call) => self.compile_call(ctx, call),
            ast::Expr::New(new_expr) => self.compile_new(ctx, new_expr),
            ast::Expr::Member(member) => self.compile_member(ctx, member),
            ast::Expr::TsAs(cast) => {
                let env = ctx.function.type_env.clone();
                let target = self.resolve_type(&env, &cast.type_ann, false);
                let (value, from) = self.compile_expression(ctx, &cast.expr, &target);
                let value = self.maybe_convert_value(ctx, cast.span, value, &from, &target, true);
                (value, target)
            }
            other => {
                self.error(other.span(), "Unsupported expression");
                (Expr::Unreachable, Type::void())
            }
        }
    }

    fn compile_identifier(&mut self, ctx: &mut FnCtx, ident: &ast::Ident) -> (Expr, Type) {
        let name = ident.sym.as_ref();
        if let Some(local) = ctx.local(name).cloned() {
            return (
                Expr::LocalGet {
                    index: local.index,
                    ty: local.ty.wasm_type(),
                },
                local.ty,
            );
        }
        let key = self.resolve_reference(name);
        if let Some(global) = self.globals.get(&key).cloned() {
            return (
                Expr::GlobalGet {
                    name: key,
                    ty: global.ty.wasm_type(),
                },
                global.ty.clone(),
            );
        }
        self.error_with(ident.span, "Undefined local variable", name);
        (Expr::Unreachable, Type::void())
    }

    fn compile_this(&mut self, ctx: &mut FnCtx, this_expr: &ast::ThisExpr) -> (Expr, Type) {
        if !ctx.function.instance {
            self.error(this_expr.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        }
        let ty = ctx.function.parameters[0].ty.clone();
        (
            Expr::LocalGet {
                index: 0,
                ty: ty.wasm_type(),
            },
            ty,
        )
    }

    /// Literals take their type from context where one exists; otherwise
    /// integral literals are `int` (widening to `uint`/`long` when they
    /// don't fit) and fractional ones are `double`. `null` is a
    /// pointer-sized zero.
    fn compile_literal(&mut self, lit: &ast::Lit, contextual: &Type) -> (Expr, Type) {
        match lit {
            ast::Lit::Num(num) => {
                let ty = if contextual.is_float() {
                    contextual.clone()
                } else if contextual.is_integer() {
                    if num.value.fract() != 0.0 {
                        Type::double()
                    } else {
                        contextual.clone()
                    }
                } else if num.value.fract() != 0.0 {
                    Type::double()
                } else if num.value >= i32::MIN as f64 && num.value <= i32::MAX as f64 {
                    Type::int()
                } else if num.value >= 0.0 && num.value <= u32::MAX as f64 {
                    Type::uint()
                } else {
                    Type::long()
                };
                (helpers::const_expr(make_const(num.value, &ty)), ty)
            }
            ast::Lit::Bool(b) => (Expr::I32Const(if b.value { 1 } else { 0 }), Type::bool()),
            ast::Lit::Null(_) => {
                let ty = self.uintptr.clone();
                (helpers::const_expr(make_const(0.0, &ty)), ty)
            }
            other => {
                self.error(other.span(), "Unsupported expression");
                (Expr::Unreachable, Type::void())
            }
        }
    }

    fn compile_unary(
        &mut self,
        ctx: &mut FnCtx,
        unary: &ast::UnaryExpr,
        contextual: &Type,
    ) -> (Expr, Type) {
        match unary.op {
            ast::UnaryOp::Plus => self.compile_expression(ctx, &unary.arg, contextual),
            ast::UnaryOp::Minus => {
                let (value, ty) = self.compile_expression(ctx, &unary.arg, contextual);
                if ty.is_float() {
                    let w = ty.wasm_type();
                    (
                        Expr::Unary {
                            op: UnOp::Neg,
                            from: w,
                            to: w,
                            value: Box::new(value),
                        },
                        ty,
                    )
                } else if ty.is_integer() {
                    // Subtraction from zero, also for constant operands;
                    // wraparound matches the operand width.
                    let w = ty.wasm_type();
                    let zero = if w == ValType::I64 {
                        Expr::I64Const(0)
                    } else {
                        Expr::I32Const(0)
                    };
                    (
                        Expr::Binary {
                            op: BinOp::Sub,
                            ty: w,
                            left: Box::new(zero),
                            right: Box::new(value),
                        },
                        ty,
                    )
                } else {
                    self.error_with(unary.span, "Unsupported unary operator", "-");
                    (Expr::Unreachable, Type::void())
                }
            }
            ast::UnaryOp::Bang => {
                let (value, ty) = self.compile_expression(ctx, &unary.arg, &Type::void());
                let result = if ty.is_float() {
                    let w = ty.wasm_type();
                    let zero = if w == ValType::F64 {
                        Expr::F64Const(0.0)
                    } else {
                        Expr::F32Const(0.0)
                    };
                    Expr::Binary {
                        op: BinOp::Eq,
                        ty: w,
                        left: Box::new(value),
                        right: Box::new(zero),
                    }
                } else if ty.is_long() {
                    Expr::Unary {
                        op: UnOp::Eqz,
                        from: ValType::I64,
                        to: ValType::I32,
                        value: Box::new(value),
                    }
                } else {
                    Expr::Unary {
                        op: UnOp::Eqz,
                        from: ValType::I32,
                        to: ValType::I32,
                        value: Box::new(value),
                    }
                };
                (result, Type::bool())
            }
            ast::UnaryOp::Tilde => {
                let (mut value, mut ty) = self.compile_expression(ctx, &unary.arg, contextual);
                // A narrow operand widens to the contextual type before
                // the xor, observable for `let x: long = ~(a_int)`.
                if contextual.is_long() && ty.is_int() {
                    value = self.maybe_convert_value(ctx, unary.span, value, &ty, contextual, true);
                    ty = contextual.clone();
                }
                if !ty.is_integer() {
                    self.error_with(unary.span, "Unsupported unary operator", "~");
                    return (Expr::Unreachable, Type::void());
                }
                let ones = if ty.is_long() {
                    Expr::I64Const(-1)
                } else if ty.is_signed() || ty.bitwidth() >= 32 {
                    Expr::I32Const(-1)
                } else {
                    Expr::I32Const(ty.mask_32() as i32)
                };
                (
                    Expr::Binary {
                        op: BinOp::Xor,
                        ty: ty.wasm_type(),
                        left: Box::new(value),
                        right: Box::new(ones),
                    },
                    ty,
                )
            }
            _ => {
                self.error_with(
                    unary.span,
                    "Unsupported unary operator",
                    &format!("{:?}", unary.op),
                );
                (Expr::Unreachable, Type::void())
            }
        }
    }

    /// `++`/`--` on identifier operands bound to a local: `set_local` in
    /// statement position, `tee_local` when the value is used.
    fn compile_update(
        &mut self,
        ctx: &mut FnCtx,
        update: &ast::UpdateExpr,
        contextual: &Type,
    ) -> (Expr, Type) {
        let ast::Expr::Ident(ident) = &*update.arg else {
            self.error(update.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        let Some(local) = ctx.local(ident.sym.as_ref()).cloned() else {
            self.error_with(ident.span, "Undefined local variable", ident.sym.as_ref());
            return (Expr::Unreachable, Type::void());
        };

        let w = local.ty.wasm_type();
        let one = match w {
            ValType::I32 => Expr::I32Const(1),
            ValType::I64 => Expr::I64Const(1),
            ValType::F32 => Expr::F32Const(1.0),
            ValType::F64 => Expr::F64Const(1.0),
        };
        let op = match update.op {
            ast::UpdateOp::PlusPlus => BinOp::Add,
            ast::UpdateOp::MinusMinus => BinOp::Sub,
        };
        let value = Box::new(Expr::Binary {
            op,
            ty: w,
            left: Box::new(Expr::LocalGet {
                index: local.index,
                ty: w,
            }),
            right: Box::new(one),
        });
        if contextual.is_void() {
            (
                Expr::LocalSet {
                    index: local.index,
                    value,
                },
                Type::void(),
            )
        } else {
            (
                Expr::LocalTee {
                    index: local.index,
                    ty: w,
                    value,
                },
                local.ty,
            )
        }
    }

    fn compile_binary(
        &mut self,
        ctx: &mut FnCtx,
        bin: &ast::BinExpr,
        contextual: &Type,
    ) -> (Expr, Type) {
        if matches!(
            bin.op,
            ast::BinaryOp::LogicalAnd | ast::BinaryOp::LogicalOr
        ) {
            return self.compile_logical(ctx, bin, contextual);
        }

        // The contextual type types the operands of arithmetic, not of
        // comparisons: a `bool` context must not leak into `a < 10`.
        let operand_ctx = match bin.op {
            ast::BinaryOp::Lt
            | ast::BinaryOp::LtEq
            | ast::BinaryOp::Gt
            | ast::BinaryOp::GtEq
            | ast::BinaryOp::EqEq
            | ast::BinaryOp::EqEqEq
            | ast::BinaryOp::NotEq
            | ast::BinaryOp::NotEqEq => Type::void(),
            _ => contextual.clone(),
        };
        let (left, left_ty) = self.compile_expression(ctx, &bin.left, &operand_ctx);
        let (right, right_ty) = self.compile_expression(ctx, &bin.right, &operand_ctx);
        if left_ty.is_void() || right_ty.is_void() {
            return (Expr::Unreachable, Type::void());
        }

        let common = self.common_type(&left_ty, &right_ty);
        let left = self.maybe_convert_value(ctx, bin.left.span(), left, &left_ty, &common, false);
        let right =
            self.maybe_convert_value(ctx, bin.right.span(), right, &right_ty, &common, false);

        let Some(op) = self.select_binary_op(bin.span, bin.op, &common) else {
            return (Expr::Unreachable, Type::void());
        };
        let result_ty = if op.is_comparison() {
            Type::bool()
        } else {
            common.clone()
        };
        (
            Expr::Binary {
                op,
                ty: common.wasm_type(),
                left: Box::new(left),
                right: Box::new(right),
            },
            result_ty,
        )
    }

    /// Pick the IR operator for a source binary operator in the common
    /// type, with signed/unsigned variants for division, remainder,
    /// shift-right, and ordering comparisons.
    fn select_binary_op(
        &mut self,
        span: Span,
        op: ast::BinaryOp,
        common: &Type,
    ) -> Option<BinOp> {
        use ast::BinaryOp::*;
        let is_float = common.is_float();
        let signed = common.is_signed();
        let selected = match op {
            Add => BinOp::Add,
            Sub => BinOp::Sub,
            Mul => BinOp::Mul,
            Div => {
                if is_float {
                    BinOp::Div
                } else if signed {
                    BinOp::DivS
                } else {
                    BinOp::DivU
                }
            }
            Mod if is_float => {
                self.error_with(span, "Unsupported binary operator", "% on floats");
                return None;
            }
            Mod => {
                if signed {
                    BinOp::RemS
                } else {
                    BinOp::RemU
                }
            }
            BitAnd => BinOp::And,
            BitOr => BinOp::Or,
            BitXor => BinOp::Xor,
            LShift => BinOp::Shl,
            RShift => {
                if signed {
                    BinOp::ShrS
                } else {
                    BinOp::ShrU
                }
            }
            ZeroFillRShift => BinOp::ShrU,
            EqEq | EqEqEq => BinOp::Eq,
            NotEq | NotEqEq => BinOp::Ne,
            Lt => {
                if is_float {
                    BinOp::Lt
                } else if signed {
                    BinOp::LtS
                } else {
                    BinOp::LtU
                }
            }
            LtEq => {
                if is_float {
                    BinOp::Le
                } else if signed {
                    BinOp::LeS
                } else {
                    BinOp::LeU
                }
            }
            Gt => {
                if is_float {
                    BinOp::Gt
                } else if signed {
                    BinOp::GtS
                } else {
                    BinOp::GtU
                }
            }
            GtEq => {
                if is_float {
                    BinOp::Ge
                } else if signed {
                    BinOp::GeS
                } else {
                    BinOp::GeU
                }
            }
            other => {
                self.error_with(span, "Unsupported binary operator", &format!("{:?}", other));
                return None;
            }
        };
        if is_float
            && matches!(
                selected,
                BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Shl | BinOp::ShrS | BinOp::ShrU
            )
        {
            self.error_with(span, "Unsupported binary operator", "bitwise on floats");
            return None;
        }
        Some(selected)
    }

    /// Short-circuit `&&`/`||` as an IR `if` in the operands' common type.
    fn compile_logical(
        &mut self,
        ctx: &mut FnCtx,
        bin: &ast::BinExpr,
        contextual: &Type,
    ) -> (Expr, Type) {
        let (left, left_ty) = self.compile_expression(ctx, &bin.left, contextual);
        let (right, right_ty) = self.compile_expression(ctx, &bin.right, contextual);
        if left_ty.is_void() || right_ty.is_void() {
            return (Expr::Unreachable, Type::void());
        }
        let common = self.common_type(&left_ty, &right_ty);
        let left = self.maybe_convert_value(ctx, bin.left.span(), left, &left_ty, &common, false);
        let right =
            self.maybe_convert_value(ctx, bin.right.span(), right, &right_ty, &common, false);
        let w = common.wasm_type();

        let result = match bin.op {
            ast::BinaryOp::LogicalAnd => {
                let zero = helpers::zero_expr(&common);
                Expr::If {
                    ty: Some(w),
                    condition: Box::new(self.condition_value(left, &common)),
                    if_true: Box::new(right),
                    if_false: Some(Box::new(zero)),
                }
            }
            ast::BinaryOp::LogicalOr => {
                // Tee the left value so it is only evaluated once.
                let temp = ctx.alloc_temp(common.clone());
                let tee = Expr::LocalTee {
                    index: temp,
                    ty: w,
                    value: Box::new(left),
                };
                Expr::If {
                    ty: Some(w),
                    condition: Box::new(self.condition_value(tee, &common)),
                    if_true: Box::new(Expr::LocalGet { index: temp, ty: w }),
                    if_false: Some(Box::new(right)),
                }
            }
            _ => unreachable!(),
        };
        (result, common)
    }

    fn compile_conditional(
        &mut self,
        ctx: &mut FnCtx,
        cond: &ast::CondExpr,
        contextual: &Type,
    ) -> (Expr, Type) {
        let (test, test_ty) = self.compile_expression(ctx, &cond.test, &Type::void());
        let test = self.condition_value(test, &test_ty);
        let (cons, cons_ty) = self.compile_expression(ctx, &cond.cons, contextual);
        let (alt, alt_ty) = self.compile_expression(ctx, &cond.alt, contextual);
        if cons_ty.is_void() || alt_ty.is_void() {
            return (Expr::Unreachable, Type::void());
        }
        let common = self.common_type(&cons_ty, &alt_ty);
        let cons = self.maybe_convert_value(ctx, cond.cons.span(), cons, &cons_ty, &common, false);
        let alt = self.maybe_convert_value(ctx, cond.alt.span(), alt, &alt_ty, &common, false);
        (
            Expr::If {
                ty: Some(common.wasm_type()),
                condition: Box::new(test),
                if_true: Box::new(cons),
                if_false: Some(Box::new(alt)),
            },
            common,
        )
    }

    fn compile_assignment(
        &mut self,
        ctx: &mut FnCtx,
        assign: &ast::AssignExpr,
        contextual: &Type,
    ) -> (Expr, Type) {
        use ast::{AssignTarget, SimpleAssignTarget};
        let statement = contextual.is_void();
        let AssignTarget::Simple(target) = &assign.left else {
            self.error(assign.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        match target {
            SimpleAssignTarget::Ident(binding) => {
                let name = binding.id.sym.as_ref();
                if let Some(local) = ctx.local(name).cloned() {
                    if local.constant {
                        self.error_with(assign.span, "Unsupported expression", "assignment to constant");
                    }
                    let w = local.ty.wasm_type();
                    let current = Expr::LocalGet {
                        index: local.index,
                        ty: w,
                    };
                    let value = self.assigned_value(ctx, assign, &local.ty, current);
                    return if statement {
                        (
                            Expr::LocalSet {
                                index: local.index,
                                value: Box::new(value),
                            },
                            Type::void(),
                        )
                    } else {
                        (
                            Expr::LocalTee {
                                index: local.index,
                                ty: w,
                                value: Box::new(value),
                            },
                            local.ty,
                        )
                    };
                }
                let key = self.resolve_reference(name);
                if let Some(global) = self.globals.get(&key).cloned() {
                    if global.constant {
                        self.error_with(assign.span, "Unsupported expression", "assignment to constant");
                    }
                    let w = global.ty.wasm_type();
                    let current = Expr::GlobalGet {
                        name: key.clone(),
                        ty: w,
                    };
                    let value = self.assigned_value(ctx, assign, &global.ty, current);
                    let set = Expr::GlobalSet {
                        name: key.clone(),
                        value: Box::new(value),
                    };
                    return if statement {
                        (set, Type::void())
                    } else {
                        (
                            Expr::Block {
                                label: None,
                                ty: Some(w),
                                body: vec![set, Expr::GlobalGet { name: key, ty: w }],
                            },
                            global.ty.clone(),
                        )
                    };
                }
                self.error_with(binding.id.span, "Undefined local variable", name);
                (Expr::Unreachable, Type::void())
            }
            SimpleAssignTarget::Member(member) => {
                self.compile_property_store(ctx, member, assign, statement)
            }
            _ => {
                self.error(assign.span, "Unsupported expression");
                (Expr::Unreachable, Type::void())
            }
        }
    }

    /// Right-hand side of an assignment, desugaring compound operators
    /// into the binary operation followed by an explicit write-back
    /// conversion.
    fn assigned_value(
        &mut self,
        ctx: &mut FnCtx,
        assign: &ast::AssignExpr,
        target_ty: &Type,
        current: Expr,
    ) -> Expr {
        let (value, value_ty) = self.compile_expression(ctx, &assign.right, target_ty);
        if assign.op == ast::AssignOp::Assign {
            return self.maybe_convert_value(
                ctx,
                assign.right.span(),
                value,
                &value_ty,
                target_ty,
                false,
            );
        }
        match assign_binary(assign.op) {
            None => {
                self.error_with(
                    assign.span,
                    "Unsupported expression",
                    &format!("{:?}", assign.op),
                );
                Expr::Unreachable
            }
            Some(op) => {
                let common = self.common_type(target_ty, &value_ty);
                let left =
                    self.maybe_convert_value(ctx, assign.span, current, target_ty, &common, true);
                let right = self.maybe_convert_value(
                    ctx,
                    assign.right.span(),
                    value,
                    &value_ty,
                    &common,
                    false,
                );
                let Some(op) = self.select_binary_op(assign.span, op, &common) else {
                    return Expr::Unreachable;
                };
                let combined = Expr::Binary {
                    op,
                    ty: common.wasm_type(),
                    left: Box::new(left),
                    right: Box::new(right),
                };
                // Compound assignment converts back to the target width
                // implicitly by definition.
                self.maybe_convert_value(ctx, assign.span, combined, &common, target_ty, true)
            }
        }
    }

    fn compile_property_store(
        &mut self,
        ctx: &mut FnCtx,
        member: &ast::MemberExpr,
        assign: &ast::AssignExpr,
        statement: bool,
    ) -> (Expr, Type) {
        let ast::MemberProp::Ident(prop) = &member.prop else {
            self.error(member.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        let (base, base_ty) = self.compile_expression(ctx, &member.obj, &Type::void());
        let Some(class) = base_ty.class.clone() else {
            self.error(member.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        let Some(property) = class.property(prop.sym.as_ref()) else {
            self.error_with(member.span, "Unsupported expression", prop.sym.as_ref());
            return (Expr::Unreachable, Type::void());
        };

        // Evaluate the base once; it is needed for both the read (compound
        // forms) and the write.
        let base_temp = ctx.alloc_temp(base_ty.clone());
        let base_get = Expr::LocalGet {
            index: base_temp,
            ty: base_ty.wasm_type(),
        };
        let w = property.ty.wasm_type();
        let current = Expr::Load {
            ty: w,
            bytes: property.ty.size as u8,
            signed: property.ty.is_signed(),
            offset: property.offset,
            ptr: Box::new(self.wrap_ptr(base_get.clone())),
        };
        let value = self.assigned_value(ctx, assign, &property.ty, current);

        let mut body = vec![Expr::LocalSet {
            index: base_temp,
            value: Box::new(base),
        }];
        if statement {
            body.push(Expr::Store {
                ty: w,
                bytes: property.ty.size as u8,
                offset: property.offset,
                ptr: Box::new(self.wrap_ptr(base_get)),
                value: Box::new(value),
            });
            (
                Expr::Block {
                    label: None,
                    ty: None,
                    body,
                },
                Type::void(),
            )
        } else {
            let value_temp = ctx.alloc_temp(property.ty.clone());
            body.push(Expr::Store {
                ty: w,
                bytes: property.ty.size as u8,
                offset: property.offset,
                ptr: Box::new(self.wrap_ptr(base_get)),
                value: Box::new(Expr::LocalTee {
                    index: value_temp,
                    ty: w,
                    value: Box::new(value),
                }),
            });
            body.push(Expr::LocalGet {
                index: value_temp,
                ty: w,
            });
            (
                Expr::Block {
                    label: None,
                    ty: Some(w),
                    body,
                },
                property.ty.clone(),
            )
        }
    }

    fn compile_call(&mut self, ctx: &mut FnCtx, call: &ast::CallExpr) -> (Expr, Type) {
        let ast::Callee::Expr(callee) = &call.callee else {
            self.error(call.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        match &**callee {
            ast::Expr::Ident(ident) => {
                let Some(function) = self.resolve_call_target(
                    ctx,
                    ident.sym.as_ref(),
                    call.type_args.as_deref(),
                    call.span,
                ) else {
                    return (Expr::Unreachable, Type::void());
                };
                self.emit_call(ctx, call.span, function, None, &call.args)
            }
            ast::Expr::Member(member) => {
                let ast::MemberProp::Ident(prop) = &member.prop else {
                    self.error(member.span, "Unsupported expression");
                    return (Expr::Unreachable, Type::void());
                };
                // Static method: the object names a class.
                if let ast::Expr::Ident(obj) = &*member.obj {
                    let key = self.resolve_reference(obj.sym.as_ref());
                    if self.classes.contains_key(&key) {
                        let target = format!("{}.{}", key, prop.sym);
                        if let Some(function) = self.functions.get(&target).cloned() {
                            return self.emit_call(ctx, call.span, function, None, &call.args);
                        }
                        self.error_with(call.span, "Unsupported expression", &target);
                        return (Expr::Unreachable, Type::void());
                    }
                }
                // Instance method on a class-typed value.
                let (base, base_ty) = self.compile_expression(ctx, &member.obj, &Type::void());
                let Some(class) = base_ty.class.clone() else {
                    self.error(member.span, "Unsupported expression");
                    return (Expr::Unreachable, Type::void());
                };
                let target = format!("{}#{}", class.name, prop.sym);
                let Some(function) = self.functions.get(&target).cloned() else {
                    self.error_with(call.span, "Unsupported expression", &target);
                    return (Expr::Unreachable, Type::void());
                };
                self.emit_call(ctx, call.span, function, Some((base, base_ty)), &call.args)
            }
            _ => {
                self.error(call.span, "Unsupported expression");
                (Expr::Unreachable, Type::void())
            }
        }
    }

    fn resolve_call_target(
        &mut self,
        ctx: &mut FnCtx,
        name: &str,
        type_args: Option<&ast::TsTypeParamInstantiation>,
        span: Span,
    ) -> Option<Rc<Function>> {
        let key = self.resolve_reference(name);
        match type_args {
            Some(args) => {
                let env = ctx.function.type_env.clone();
                let resolved: Vec<Type> = args
                    .params
                    .iter()
                    .map(|t| self.resolve_type(&env, t, false))
                    .collect();
                if let Some(template) = self.function_templates.get(&key).cloned() {
                    return self.instantiate_function(&template, &resolved, span);
                }
                self.error_with(span, "Unsupported expression", name);
                None
            }
            None => {
                if let Some(function) = self.functions.get(&key) {
                    return Some(function.clone());
                }
                if let Some(template) = self.function_templates.get(&key).cloned() {
                    if template.is_generic() {
                        self.error_with(
                            span,
                            "Unsupported expression",
                            &format!("'{}' requires type arguments", name),
                        );
                        return None;
                    }
                    return self.instantiate_function(&template, &[], span);
                }
                self.error_with(span, "Unsupported expression", name);
                None
            }
        }
    }

    fn emit_call(
        &mut self,
        ctx: &mut FnCtx,
        span: Span,
        function: Rc<Function>,
        this: Option<(Expr, Type)>,
        args: &[ast::ExprOrSpread],
    ) -> (Expr, Type) {
        if function.imported {
            self.materialize_import(&function);
        }

        let mut operands = Vec::new();
        let mut parameters = function.parameters.iter();
        if function.instance {
            let receiver = parameters.next();
            match (this, receiver) {
                (Some((base, base_ty)), Some(param)) => {
                    let base =
                        self.maybe_convert_value(ctx, span, base, &base_ty, &param.ty, false);
                    operands.push(base);
                }
                _ => {
                    self.error_with(span, "Unsupported expression", &function.name);
                    return (Expr::Unreachable, Type::void());
                }
            }
        }
        for arg in args {
            if arg.spread.is_some() {
                self.error(span, "Unsupported expression");
                continue;
            }
            let Some(param) = parameters.next() else {
                self.error_with(span, "Unsupported expression", "too many arguments");
                break;
            };
            let (value, from) = self.compile_expression(ctx, &arg.expr, &param.ty);
            operands.push(self.maybe_convert_value(
                ctx,
                arg.expr.span(),
                value,
                &from,
                &param.ty,
                false,
            ));
        }
        if parameters.next().is_some() {
            self.error_with(span, "Unsupported expression", "too few arguments");
        }

        let return_type = function.return_type.clone();
        let ty = if return_type.is_void() {
            None
        } else {
            Some(return_type.wasm_type())
        };
        (
            Expr::Call {
                target: function.name.clone(),
                ty,
                operands,
            },
            return_type,
        )
    }

    /// `new C(...)`: allocate `sizeof(C)` (via `malloc`, or the inline
    /// bump pointer when freestanding), then run the constructor with the
    /// allocation as `this`.
    fn compile_new(&mut self, ctx: &mut FnCtx, new_expr: &ast::NewExpr) -> (Expr, Type) {
        let ast::Expr::Ident(ident) = &*new_expr.callee else {
            self.error(new_expr.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        let key = self.resolve_reference(ident.sym.as_ref());

        let class = if let Some(args) = &new_expr.type_args {
            let env = ctx.function.type_env.clone();
            let resolved: Vec<Type> = args
                .params
                .iter()
                .map(|t| self.resolve_type(&env, t, false))
                .collect();
            match self.class_templates.get(&key).cloned() {
                Some(template) => self.instantiate_class(&template, &resolved, new_expr.span),
                None => {
                    self.error_with(new_expr.span, "Unsupported expression", ident.sym.as_ref());
                    None
                }
            }
        } else if let Some(class) = self.classes.get(&key).cloned() {
            Some(class)
        } else if let Some(template) = self.class_templates.get(&key).cloned() {
            if template.is_generic() {
                self.error_with(
                    new_expr.span,
                    "Unsupported expression",
                    &format!("'{}' requires type arguments", ident.sym),
                );
                None
            } else {
                self.instantiate_class(&template, &[], new_expr.span)
            }
        } else {
            self.error_with(new_expr.span, "Unsupported expression", ident.sym.as_ref());
            None
        };
        let Some(class) = class else {
            return (Expr::Unreachable, Type::void());
        };

        let instance_ty = Type::class(class.clone(), self.options.uintptr_size);
        let size = class.size.get();
        let alloc = if self.options.no_lib {
            self.freestanding_alloc(ctx, size)
        } else {
            let size_const = match self.uintptr.wasm_type() {
                ValType::I64 => Expr::I64Const(size as i64),
                _ => Expr::I32Const(size as i32),
            };
            Expr::Call {
                target: "malloc".to_string(),
                ty: Some(self.uintptr.wasm_type()),
                operands: vec![size_const],
            }
        };

        if let Some(ctor) = self
            .functions
            .get(&class.name)
            .cloned()
            .filter(|f| f.constructor)
        {
            let args = new_expr.args.clone().unwrap_or_default();
            return self.emit_call(ctx, new_expr.span, ctor, Some((alloc, instance_ty)), &args);
        }
        if new_expr.args.as_ref().is_some_and(|args| !args.is_empty()) {
            self.error_with(new_expr.span, "Unsupported expression", &class.name);
        }
        (alloc, instance_ty)
    }

    /// Freestanding allocation: bump the internal `.heap` global.
    fn freestanding_alloc(&mut self, ctx: &mut FnCtx, size: u32) -> Expr {
        let w = self.uintptr.wasm_type();
        if self.module.global(HEAP_GLOBAL).is_none() {
            let init = match w {
                ValType::I64 => Expr::I64Const(HEAP_BASE as i64),
                _ => Expr::I32Const(HEAP_BASE),
            };
            self.module
                .add_global(HEAP_GLOBAL.to_string(), w, true, init);
        }
        let size_const = match w {
            ValType::I64 => Expr::I64Const(size as i64),
            _ => Expr::I32Const(size as i32),
        };
        let temp = ctx.alloc_temp(self.uintptr.clone());
        Expr::Block {
            label: None,
            ty: Some(w),
            body: vec![
                Expr::LocalSet {
                    index: temp,
                    value: Box::new(Expr::GlobalGet {
                        name: HEAP_GLOBAL.to_string(),
                        ty: w,
                    }),
                },
                Expr::GlobalSet {
                    name: HEAP_GLOBAL.to_string(),
                    value: Box::new(Expr::Binary {
                        op: BinOp::Add,
                        ty: w,
                        left: Box::new(Expr::LocalGet { index: temp, ty: w }),
                        right: Box::new(size_const),
                    }),
                },
                Expr::LocalGet { index: temp, ty: w },
            ],
        }
    }

    /// Property loads on class instances, and enum member constants.
    fn compile_member(&mut self, ctx: &mut FnCtx, member: &ast::MemberExpr) -> (Expr, Type) {
        let ast::MemberProp::Ident(prop) = &member.prop else {
            self.error(member.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };

        if let ast::Expr::Ident(obj) = &*member.obj {
            let key = self.resolve_reference(obj.sym.as_ref());
            if let Some(enum_) = self.enums.get(&key).cloned() {
                let Some(found) = enum_.member(prop.sym.as_ref()) else {
                    self.error_with(member.span, "Unsupported expression", prop.sym.as_ref());
                    return (Expr::Unreachable, Type::void());
                };
                return (
                    Expr::I32Const(found.value.unwrap_or(0) as i32),
                    Type::int(),
                );
            }
        }

        let (base, base_ty) = self.compile_expression(ctx, &member.obj, &Type::void());
        let Some(class) = base_ty.class.clone() else {
            self.error(member.span, "Unsupported expression");
            return (Expr::Unreachable, Type::void());
        };
        let Some(property) = class.property(prop.sym.as_ref()) else {
            self.error_with(member.span, "Unsupported expression", prop.sym.as_ref());
            return (Expr::Unreachable, Type::void());
        };
        (
            Expr::Load {
                ty: property.ty.wasm_type(),
                bytes: property.ty.size as u8,
                signed: property.ty.is_signed(),
                offset: property.offset,
                ptr: Box::new(self.wrap_ptr(base)),
            },
            property.ty.clone(),
        )
    }
}

fn assign_binary(op: ast::AssignOp) -> Option<ast::BinaryOp> {
    use ast::AssignOp::*;
    Some(match op {
        AddAssign => ast::BinaryOp::Add,
        SubAssign => ast::BinaryOp::Sub,
        MulAssign => ast::BinaryOp::Mul,
        DivAssign => ast::BinaryOp::Div,
        ModAssign => ast::BinaryOp::Mod,
        LShiftAssign => ast::BinaryOp::LShift,
        RShiftAssign => ast::BinaryOp::RShift,
        ZeroFillRShiftAssign => ast::BinaryOp::ZeroFillRShift,
        BitOrAssign => ast::BinaryOp::BitOr,
        BitXorAssign => ast::BinaryOp::BitXor,
        BitAndAssign => ast::BinaryOp::BitAnd,
        _ => return None,
    })
}
