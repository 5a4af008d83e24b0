//! Statement lowering.
//!
//! Loops use the labeled-loop idiom: an outer `block break$N.D` wrapping a
//! `loop continue$N.D` whose body re-branches to the loop head, so `break`
//! and `continue` lower to plain branches against the innermost break
//! context. Switch lowers to a chain of equality branches into nested case
//! blocks, which gives source-accurate fall-through.

use deno_ast::swc::ast;
use deno_ast::swc::common::Spanned;

use crate::codegen::{Compiler, FnCtx};
use crate::types::Type;
use crate::wasm::{BinOp, Expr};

impl Compiler {
    pub(crate) fn compile_statements(&mut self, ctx: &mut FnCtx, stmts: &[ast::Stmt]) -> Vec<Expr> {
        stmts
            .iter()
            .map(|stmt| {
                ctx.conversion_reported = false;
                self.compile_statement(ctx, stmt)
            })
            .collect()
    }

    pub(crate) fn compile_statement(&mut self, ctx: &mut FnCtx, stmt: &ast::Stmt) -> Expr {
        match stmt {
            ast::Stmt::Block(block) => Expr::Block {
                label: None,
                ty: None,
                body: self.compile_statements(ctx, &block.stmts),
            },
            ast::Stmt::Empty(_) => Expr::Nop,
            ast::Stmt::If(stmt) => {
                let (condition, condition_ty) =
                    self.compile_expression(ctx, &stmt.test, &Type::void());
                let condition = self.condition_value(condition, &condition_ty);
                let if_true = self.compile_statement(ctx, &stmt.cons);
                let if_false = stmt
                    .alt
                    .as_ref()
                    .map(|alt| Box::new(self.compile_statement(ctx, alt)));
                Expr::If {
                    ty: None,
                    condition: Box::new(condition),
                    if_true: Box::new(if_true),
                    if_false,
                }
            }
            ast::Stmt::While(stmt) => self.compile_while(ctx, stmt),
            ast::Stmt::DoWhile(stmt) => self.compile_do(ctx, stmt),
            ast::Stmt::For(stmt) => self.compile_for(ctx, stmt),
            ast::Stmt::Switch(stmt) => self.compile_switch(ctx, stmt),
            ast::Stmt::Break(stmt) => {
                if stmt.label.is_some() {
                    self.error(stmt.span, "Unsupported statement");
                    return Expr::Unreachable;
                }
                match ctx.break_label() {
                    Some(label) => Expr::Br {
                        label,
                        condition: None,
                    },
                    None => {
                        self.error(stmt.span, "Unsupported statement");
                        Expr::Unreachable
                    }
                }
            }
            ast::Stmt::Continue(stmt) => {
                if stmt.label.is_some() {
                    self.error(stmt.span, "Unsupported statement");
                    return Expr::Unreachable;
                }
                match ctx.continue_label() {
                    Some(label) => Expr::Br {
                        label,
                        condition: None,
                    },
                    None => {
                        self.error(stmt.span, "Unsupported statement");
                        Expr::Unreachable
                    }
                }
            }
            ast::Stmt::Return(ret) => self.compile_return(ctx, ret),
            ast::Stmt::Decl(ast::Decl::Var(decl)) => self.compile_variable(ctx, decl),
            ast::Stmt::Decl(other) => {
                self.error(other.span(), "Unsupported statement");
                Expr::Unreachable
            }
            ast::Stmt::Expr(stmt) => {
                let (value, _) = self.compile_expression(ctx, &stmt.expr, &Type::void());
                if value.ty().is_some() {
                    Expr::Drop {
                        value: Box::new(value),
                    }
                } else {
                    value
                }
            }
            other => {
                self.error(other.span(), "Unsupported statement");
                Expr::Unreachable
            }
        }
    }

    fn compile_while(&mut self, ctx: &mut FnCtx, stmt: &ast::WhileStmt) -> Expr {
        let label = ctx.enter_break_context(true);
        let break_label = format!("break${}", label);
        let continue_label = format!("continue${}", label);

        let (condition, condition_ty) = self.compile_expression(ctx, &stmt.test, &Type::void());
        let condition = self.condition_value(condition, &condition_ty);
        let mut body = self.compile_loop_body(ctx, &stmt.body);
        body.push(Expr::Br {
            label: continue_label.clone(),
            condition: None,
        });

        let lowered = Expr::Block {
            label: Some(break_label),
            ty: None,
            body: vec![Expr::Loop {
                label: continue_label,
                body: vec![Expr::If {
                    ty: None,
                    condition: Box::new(condition),
                    if_true: Box::new(Expr::Block {
                        label: None,
                        ty: None,
                        body,
                    }),
                    if_false: None,
                }],
            }],
        };
        ctx.leave_break_context(true);
        lowered
    }

    fn compile_do(&mut self, ctx: &mut FnCtx, stmt: &ast::DoWhileStmt) -> Expr {
        let label = ctx.enter_break_context(true);
        let break_label = format!("break${}", label);
        let continue_label = format!("continue${}", label);

        let mut body = self.compile_loop_body(ctx, &stmt.body);
        let (condition, condition_ty) = self.compile_expression(ctx, &stmt.test, &Type::void());
        let condition = self.condition_value(condition, &condition_ty);
        body.push(Expr::Br {
            label: continue_label.clone(),
            condition: Some(Box::new(condition)),
        });

        let lowered = Expr::Block {
            label: Some(break_label),
            ty: None,
            body: vec![Expr::Loop {
                label: continue_label,
                body,
            }],
        };
        ctx.leave_break_context(true);
        lowered
    }

    fn compile_for(&mut self, ctx: &mut FnCtx, stmt: &ast::ForStmt) -> Expr {
        let label = ctx.enter_break_context(true);
        let break_label = format!("break${}", label);
        let continue_label = format!("continue${}", label);

        let init = stmt.init.as_ref().map(|init| match init {
            ast::VarDeclOrExpr::VarDecl(decl) => self.compile_variable(ctx, decl),
            ast::VarDeclOrExpr::Expr(expr) => {
                let (value, _) = self.compile_expression(ctx, expr, &Type::void());
                if value.ty().is_some() {
                    Expr::Drop {
                        value: Box::new(value),
                    }
                } else {
                    value
                }
            }
        });
        let condition = stmt.test.as_ref().map(|test| {
            let (condition, condition_ty) = self.compile_expression(ctx, test, &Type::void());
            self.condition_value(condition, &condition_ty)
        });

        let mut body = self.compile_loop_body(ctx, &stmt.body);
        if let Some(update) = &stmt.update {
            let (value, _) = self.compile_expression(ctx, update, &Type::void());
            if value.ty().is_some() {
                body.push(Expr::Drop {
                    value: Box::new(value),
                });
            } else {
                body.push(value);
            }
        }
        body.push(Expr::Br {
            label: continue_label.clone(),
            condition: None,
        });

        let loop_body = match condition {
            Some(condition) => vec![Expr::If {
                ty: None,
                condition: Box::new(condition),
                if_true: Box::new(Expr::Block {
                    label: None,
                    ty: None,
                    body,
                }),
                if_false: None,
            }],
            None => body,
        };

        let mut outer = Vec::new();
        if let Some(init) = init {
            outer.push(init);
        }
        outer.push(Expr::Loop {
            label: continue_label,
            body: loop_body,
        });

        ctx.leave_break_context(true);
        Expr::Block {
            label: Some(break_label),
            ty: None,
            body: outer,
        }
    }

    /// Nested case blocks with a branch-chain selector: the discriminant
    /// is evaluated once into a scratch local, each case test branches to
    /// its block, and execution falls through block tails in source order.
    fn compile_switch(&mut self, ctx: &mut FnCtx, stmt: &ast::SwitchStmt) -> Expr {
        let label = ctx.enter_break_context(false);
        let break_label = format!("break${}", label);

        let (discriminant, discriminant_ty) =
            self.compile_expression(ctx, &stmt.discriminant, &Type::void());
        let temp_ty = if discriminant_ty.is_void() {
            Type::int()
        } else {
            discriminant_ty
        };
        let temp = ctx.alloc_temp(temp_ty.clone());

        let case_labels: Vec<String> = (0..stmt.cases.len())
            .map(|i| format!("case{}${}", i, label))
            .collect();

        let mut selector = vec![Expr::LocalSet {
            index: temp,
            value: Box::new(discriminant),
        }];
        let mut default_index = None;
        for (i, case) in stmt.cases.iter().enumerate() {
            match &case.test {
                Some(test) => {
                    let (value, value_ty) = self.compile_expression(ctx, test, &temp_ty);
                    let value =
                        self.maybe_convert_value(ctx, test.span(), value, &value_ty, &temp_ty, false);
                    selector.push(Expr::Br {
                        label: case_labels[i].clone(),
                        condition: Some(Box::new(Expr::Binary {
                            op: BinOp::Eq,
                            ty: temp_ty.wasm_type(),
                            left: Box::new(Expr::LocalGet {
                                index: temp,
                                ty: temp_ty.wasm_type(),
                            }),
                            right: Box::new(value),
                        })),
                    });
                }
                None => default_index = Some(i),
            }
        }
        selector.push(Expr::Br {
            label: default_index
                .map(|i| case_labels[i].clone())
                .unwrap_or_else(|| break_label.clone()),
            condition: None,
        });

        let mut inner = selector;
        for (i, case) in stmt.cases.iter().enumerate() {
            let mut block = vec![Expr::Block {
                label: Some(case_labels[i].clone()),
                ty: None,
                body: inner,
            }];
            block.extend(self.compile_statements(ctx, &case.cons));
            inner = block;
        }

        ctx.leave_break_context(false);
        Expr::Block {
            label: Some(break_label),
            ty: None,
            body: inner,
        }
    }

    fn compile_return(&mut self, ctx: &mut FnCtx, ret: &ast::ReturnStmt) -> Expr {
        let return_type = ctx.function.return_type.clone();
        if ctx.function.constructor && ret.arg.is_none() {
            return Expr::Return {
                value: Some(Box::new(Expr::LocalGet {
                    index: 0,
                    ty: self.uintptr.wasm_type(),
                })),
            };
        }
        match (&ret.arg, return_type.is_void()) {
            (None, true) => Expr::Return { value: None },
            (Some(arg), false) => {
                let (value, from) = self.compile_expression(ctx, arg, &return_type);
                let value =
                    self.maybe_convert_value(ctx, arg.span(), value, &from, &return_type, false);
                Expr::Return {
                    value: Some(Box::new(value)),
                }
            }
            _ => {
                self.error(ret.span, "Unsupported statement");
                Expr::Unreachable
            }
        }
    }

    fn compile_variable(&mut self, ctx: &mut FnCtx, decl: &ast::VarDecl) -> Expr {
        let constant = matches!(decl.kind, ast::VarDeclKind::Const);
        let mut stmts = Vec::new();
        for declarator in &decl.decls {
            let ast::Pat::Ident(binding) = &declarator.name else {
                self.error(declarator.span, "Unsupported statement");
                continue;
            };
            let name = binding.id.sym.to_string();
            match &binding.type_ann {
                Some(ann) => {
                    let env = ctx.function.type_env.clone();
                    let ty = self.resolve_type(&env, &ann.type_ann, false);
                    let index = ctx.on_variable(&name, ty.clone(), constant);
                    if let Some(init) = &declarator.init {
                        let (value, from) = self.compile_expression(ctx, init, &ty);
                        let value =
                            self.maybe_convert_value(ctx, init.span(), value, &from, &ty, false);
                        stmts.push(Expr::LocalSet {
                            index,
                            value: Box::new(value),
                        });
                    }
                }
                None => match &declarator.init {
                    Some(init) => {
                        let (value, from) = self.compile_expression(ctx, init, &Type::void());
                        if from.is_void() {
                            self.error_with(binding.id.span, "Type expected", &name);
                            continue;
                        }
                        let index = ctx.on_variable(&name, from, constant);
                        stmts.push(Expr::LocalSet {
                            index,
                            value: Box::new(value),
                        });
                    }
                    None => {
                        self.error_with(binding.id.span, "Type expected", &name);
                    }
                },
            }
        }
        match stmts.len() {
            0 => Expr::Nop,
            1 => stmts.pop().unwrap(),
            _ => Expr::Block {
                label: None,
                ty: None,
                body: stmts,
            },
        }
    }

    fn compile_loop_body(&mut self, ctx: &mut FnCtx, body: &ast::Stmt) -> Vec<Expr> {
        match body {
            ast::Stmt::Block(block) => self.compile_statements(ctx, &block.stmts),
            other => vec![self.compile_statement(ctx, other)],
        }
    }
}
