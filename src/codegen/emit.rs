//! Initialization pass: top-level declaration lowering.
//!
//! Walks every source file's top-level statements and populates the
//! reflection maps. Functions and classes are wrapped in templates;
//! non-generic templates are eagerly instantiated here, generic ones wait
//! for a call site (see `generics.rs`). Globals are emitted immediately:
//! constant-literal initializers become IR global initializers, everything
//! else is deferred to the synthesized start function.
//!
//! Interfaces and type aliases are host-level concerns: interfaces are
//! silently accepted, aliases are recorded for the type resolver.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use deno_ast::ModuleItemRef;
use deno_ast::swc::ast;
use deno_ast::swc::common::{Span, Spanned};

use crate::codegen::helpers::{self, mangled};
use crate::codegen::Compiler;
use crate::parser::{LIBRARY_FILE, Program};
use crate::types::{Class, ClassTemplate, Enum, Function, FunctionTemplate, Property, Type, Variable};

/// Everything `build_function` needs, independent of whether the source
/// construct was a function declaration, a method, or a constructor.
pub(crate) struct FunctionParts<'a> {
    pub name: String,
    pub source_name: String,
    pub pats: Vec<&'a ast::Pat>,
    pub return_ann: Option<&'a ast::TsTypeAnn>,
    pub body: Option<ast::BlockStmt>,
    pub exported: bool,
    pub instance_of: Option<Rc<Class>>,
    pub constructor: bool,
    pub type_env: HashMap<String, Type>,
    /// Library declarations only materialize an IR import when first
    /// referenced, so unused builtins don't show up as `env` imports.
    pub lazy_import: bool,
    pub span: Span,
}

impl Compiler {
    /// Walk all files' top-level statements, constructing reflection
    /// objects and emitting global declarations.
    pub(crate) fn initialize(&mut self, program: &Program) {
        for (index, file) in program.files.iter().enumerate() {
            let prefix = helpers::file_prefix(program, index);
            let source: Rc<str> = Rc::from(file.module.source.as_str());
            self.set_current_file(file.path.display().to_string(), source, prefix);
            let library = file.is_library();

            for item in file.module.parsed.program_ref().body() {
                match item {
                    ModuleItemRef::ModuleDecl(decl) => match decl {
                        ast::ModuleDecl::ExportDecl(export) => {
                            self.initialize_declaration(&export.decl, true, library);
                        }
                        ast::ModuleDecl::Import(_) => {}
                        other => {
                            self.error(other.span(), "Unsupported top-level statement");
                        }
                    },
                    ModuleItemRef::Stmt(stmt) => match stmt {
                        ast::Stmt::Decl(decl) => self.initialize_declaration(decl, false, library),
                        other => {
                            self.error(other.span(), "Unsupported top-level statement");
                        }
                    },
                }
            }
        }
    }

    fn initialize_declaration(&mut self, decl: &ast::Decl, exported: bool, library: bool) {
        match decl {
            ast::Decl::Fn(function) => self.initialize_function(function, exported, library),
            ast::Decl::Class(class) => self.initialize_class(class, exported),
            ast::Decl::Var(var) => self.initialize_global(var),
            ast::Decl::TsEnum(decl) => self.initialize_enum(decl),
            ast::Decl::TsInterface(_) => {}
            ast::Decl::TsTypeAlias(alias) => {
                let name = mangled(self.current_prefix.as_deref(), alias.id.sym.as_ref());
                self.type_aliases.insert(name, (*alias.type_ann).clone());
            }
            other => {
                self.error(other.span(), "Unsupported top-level statement");
            }
        }
    }

    fn initialize_function(&mut self, decl: &ast::FnDecl, exported: bool, library: bool) {
        let source_name = decl.ident.sym.to_string();
        let name = mangled(self.current_prefix.as_deref(), &source_name);
        if library && (self.functions.contains_key(&name) || self.function_templates.contains_key(&name))
        {
            // Allocator-provided definitions take precedence over the
            // library declarations that describe them.
            return;
        }

        let type_parameters = decl
            .function
            .type_params
            .as_ref()
            .map(|tp| {
                tp.params
                    .iter()
                    .map(|p| p.name.sym.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let (file, source, prefix) = self.current_file();
        let template = Rc::new(FunctionTemplate {
            name: name.clone(),
            declaration: decl.clone(),
            type_parameters,
            exported,
            file,
            source,
            prefix,
            instances: RefCell::new(HashMap::new()),
        });
        self.function_templates.insert(name, template.clone());

        if !template.is_generic() {
            self.instantiate_function(&template, &[], decl.function.span);
        }
    }

    fn initialize_class(&mut self, decl: &ast::ClassDecl, exported: bool) {
        let source_name = decl.ident.sym.to_string();
        let name = mangled(self.current_prefix.as_deref(), &source_name);
        let type_parameters = decl
            .class
            .type_params
            .as_ref()
            .map(|tp| {
                tp.params
                    .iter()
                    .map(|p| p.name.sym.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let (file, source, prefix) = self.current_file();
        let template = Rc::new(ClassTemplate {
            name: name.clone(),
            declaration: decl.clone(),
            type_parameters,
            exported,
            file,
            source,
            prefix,
            instances: RefCell::new(HashMap::new()),
        });
        self.class_templates.insert(name, template.clone());

        if !template.is_generic() {
            self.instantiate_class(&template, &[], decl.class.span);
        }
    }

    fn initialize_global(&mut self, decl: &ast::VarDecl) {
        let constant = matches!(decl.kind, ast::VarDeclKind::Const);
        for declarator in &decl.decls {
            let ast::Pat::Ident(binding) = &declarator.name else {
                self.error(declarator.span, "Unsupported top-level statement");
                continue;
            };
            let source_name = binding.id.sym.to_string();
            let name = mangled(self.current_prefix.as_deref(), &source_name);

            let ty = match &binding.type_ann {
                Some(ann) => self.resolve_type(&HashMap::new(), &ann.type_ann, false),
                None => match declarator.init.as_deref() {
                    Some(ast::Expr::Lit(ast::Lit::Num(num))) => {
                        if num.value.fract() == 0.0 {
                            Type::int()
                        } else {
                            Type::double()
                        }
                    }
                    Some(ast::Expr::Lit(ast::Lit::Bool(_))) => Type::bool(),
                    _ => {
                        self.error_with(binding.id.span, "Type expected", &source_name);
                        continue;
                    }
                },
            };

            let mut value = None;
            match declarator.init.as_deref() {
                Some(init) => {
                    if let Some(constant_value) = helpers::constant_initializer(init, &ty) {
                        self.module.add_global(
                            name.clone(),
                            ty.wasm_type(),
                            !constant,
                            helpers::const_expr(constant_value),
                        );
                        value = Some(constant_value);
                    } else if constant {
                        self.error_with(
                            init.span(),
                            "Unsupported global constant initializer",
                            &source_name,
                        );
                        continue;
                    } else {
                        self.module.add_global(
                            name.clone(),
                            ty.wasm_type(),
                            true,
                            helpers::zero_expr(&ty),
                        );
                        let (file, source, prefix) = self.current_file();
                        self.defer_global_initializer(
                            name.clone(),
                            init.clone(),
                            ty.clone(),
                            file,
                            source,
                            prefix,
                        );
                    }
                }
                None => {
                    self.module.add_global(
                        name.clone(),
                        ty.wasm_type(),
                        !constant,
                        helpers::zero_expr(&ty),
                    );
                }
            }

            self.globals.insert(
                name.clone(),
                Rc::new(Variable {
                    name,
                    ty,
                    global: true,
                    constant,
                    index: 0,
                    value,
                }),
            );
        }
    }

    fn initialize_enum(&mut self, decl: &ast::TsEnumDecl) {
        let name = mangled(self.current_prefix.as_deref(), decl.id.sym.as_ref());
        let mut members = Vec::new();
        let mut previous: i64 = -1;
        for member in &decl.members {
            let ast::TsEnumMemberId::Ident(id) = &member.id else {
                self.error(member.span, "Unsupported class member");
                continue;
            };
            let value = match member.init.as_deref() {
                None => previous + 1,
                Some(init) => match enum_constant(init, &members) {
                    Some(v) => v,
                    None => {
                        self.error_with(
                            init.span(),
                            "Unsupported global constant initializer",
                            id.sym.as_ref(),
                        );
                        previous + 1
                    }
                },
            };
            members.push(Property {
                name: id.sym.to_string(),
                ty: Type::int(),
                offset: 0,
                value: Some(value),
            });
            previous = value;
        }
        self.enums.insert(name.clone(), Rc::new(Enum { name, members }));
    }

    /// Lay out and register a class instance. The shell is registered
    /// before members are processed so properties and methods can
    /// reference the class, including cyclically.
    pub(crate) fn fill_class(&mut self, class: &Rc<Class>, body: &[ast::ClassMember]) {
        for member in body {
            match member {
                ast::ClassMember::ClassProp(prop) => {
                    if prop.is_static || prop.declare {
                        self.error(prop.span, "Unsupported class member");
                        continue;
                    }
                    let ast::PropName::Ident(key) = &prop.key else {
                        self.error(prop.span, "Unsupported class member");
                        continue;
                    };
                    if prop.value.is_some() {
                        self.error_with(prop.span, "Unsupported class member", key.sym.as_ref());
                        continue;
                    }
                    let ty = match &prop.type_ann {
                        Some(ann) => self.resolve_type(&class.type_env, &ann.type_ann, false),
                        None => {
                            self.error_with(prop.span, "Type expected", key.sym.as_ref());
                            Type::int()
                        }
                    };
                    let offset = class.size.get();
                    class.properties.borrow_mut().push(Rc::new(Property {
                        name: key.sym.to_string(),
                        ty: ty.clone(),
                        offset,
                        value: None,
                    }));
                    class.size.set(offset + ty.size);
                }
                ast::ClassMember::Constructor(ctor) => {
                    let mut pats = Vec::new();
                    for param in &ctor.params {
                        match param {
                            ast::ParamOrTsParamProp::Param(p) => pats.push(&p.pat),
                            ast::ParamOrTsParamProp::TsParamProp(p) => {
                                self.error(p.span, "Unsupported class member");
                            }
                        }
                    }
                    self.build_function(FunctionParts {
                        name: class.name.clone(),
                        source_name: class.name.clone(),
                        pats,
                        return_ann: None,
                        body: ctor.body.clone(),
                        exported: false,
                        instance_of: Some(class.clone()),
                        constructor: true,
                        type_env: class.type_env.clone(),
                        lazy_import: false,
                        span: ctor.span,
                    });
                }
                ast::ClassMember::Method(method) => {
                    let ast::PropName::Ident(key) = &method.key else {
                        self.error(method.span, "Unsupported class member");
                        continue;
                    };
                    if method.kind != ast::MethodKind::Method
                        || method.function.type_params.is_some()
                    {
                        self.error_with(method.span, "Unsupported class member", key.sym.as_ref());
                        continue;
                    }
                    let separator = if method.is_static { '.' } else { '#' };
                    let name = format!("{}{}{}", class.name, separator, key.sym);
                    self.build_function(FunctionParts {
                        name,
                        source_name: key.sym.to_string(),
                        pats: method.function.params.iter().map(|p| &p.pat).collect(),
                        return_ann: method.function.return_type.as_deref(),
                        body: method.function.body.clone(),
                        exported: false,
                        instance_of: if method.is_static {
                            None
                        } else {
                            Some(class.clone())
                        },
                        constructor: false,
                        type_env: class.type_env.clone(),
                        lazy_import: false,
                        span: method.span,
                    });
                }
                ast::ClassMember::Empty(_) => {}
                other => {
                    self.error(other.span(), "Unsupported class member");
                }
            }
        }
    }

    /// Build a reflected function from its parts, register it, and either
    /// queue it for compilation or record it as an import.
    pub(crate) fn build_function(&mut self, parts: FunctionParts) -> Rc<Function> {
        let mut parameters = Vec::new();
        if let Some(class) = &parts.instance_of {
            parameters.push(Variable {
                name: "this".to_string(),
                ty: Type::class(class.clone(), self.options.uintptr_size),
                global: false,
                constant: false,
                index: 0,
                value: None,
            });
        }
        for pat in &parts.pats {
            match pat {
                ast::Pat::Ident(binding) => {
                    let pname = binding.id.sym.to_string();
                    let ty = match &binding.type_ann {
                        Some(ann) => self.resolve_type(&parts.type_env, &ann.type_ann, false),
                        None => {
                            self.error_with(binding.id.span, "Type expected", &pname);
                            Type::int()
                        }
                    };
                    parameters.push(Variable {
                        name: pname,
                        ty,
                        global: false,
                        constant: false,
                        index: parameters.len() as u32,
                        value: None,
                    });
                }
                other => {
                    self.error(other.span(), "Unsupported expression");
                    parameters.push(Variable {
                        name: format!(".arg{}", parameters.len()),
                        ty: Type::int(),
                        global: false,
                        constant: false,
                        index: parameters.len() as u32,
                        value: None,
                    });
                }
            }
        }

        let return_type = if parts.constructor {
            Type::class(
                parts.instance_of.clone().expect("constructor without class"),
                self.options.uintptr_size,
            )
        } else {
            match parts.return_ann {
                Some(ann) => self.resolve_type(&parts.type_env, &ann.type_ann, true),
                None => Type::void(),
            }
        };

        let param_types: Vec<Type> = parameters.iter().map(|p| p.ty.clone()).collect();
        let signature = self.register_signature(&param_types, &return_type);
        let imported = parts.body.is_none();
        let (file, source, prefix) = self.current_file();
        let is_entry = prefix.is_none() && file != LIBRARY_FILE;

        let function = Rc::new(Function {
            name: parts.name.clone(),
            parameters,
            return_type: return_type.clone(),
            imported,
            exported: parts.exported && !imported,
            instance: parts.instance_of.is_some(),
            constructor: parts.constructor,
            body: parts.body,
            signature,
            type_env: parts.type_env,
            class: parts.instance_of,
            file,
            source,
            prefix,
        });
        self.functions.insert(parts.name, function.clone());

        if imported {
            if !parts.lazy_import {
                self.materialize_import(&function);
            }
        } else {
            self.enqueue(function.clone());
            if parts.source_name == "start"
                && is_entry
                && !function.instance
                && function.parameters.is_empty()
                && return_type.is_void()
            {
                self.start_function = Some(function.clone());
            }
        }
        function
    }

    /// Add the IR import for a bodyless function. `foo$bar` imports from
    /// module `foo` with base `bar`; plain names default to module `env`.
    pub(crate) fn materialize_import(&mut self, function: &Function) {
        if self.module.has_function(&function.name) {
            return;
        }
        let local = function
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&function.name);
        let (module_name, base) = match local.split_once('$') {
            Some((module, base)) => (module.to_string(), base.to_string()),
            None => ("env".to_string(), local.to_string()),
        };
        let sig = self.signatures[&function.signature];
        self.module
            .add_import(function.name.clone(), module_name, base, sig);
    }
}

/// Constant-value oracle for enum members: numeric literals, negated
/// numeric literals, and references to previously defined members.
fn enum_constant(expr: &ast::Expr, members: &[Property]) -> Option<i64> {
    match expr {
        ast::Expr::Paren(paren) => enum_constant(&paren.expr, members),
        ast::Expr::Lit(ast::Lit::Num(num)) => Some(num.value as i64),
        ast::Expr::Unary(unary) if unary.op == ast::UnaryOp::Minus => {
            match enum_constant(&unary.arg, members) {
                Some(v) => Some(-v),
                None => None,
            }
        }
        ast::Expr::Ident(ident) => members
            .iter()
            .find(|m| m.name == ident.sym.as_ref())
            .and_then(|m| m.value),
        _ => None,
    }
}
