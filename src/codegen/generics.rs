//! Template monomorphization.
//!
//! Generic functions and classes are kept as templates (declaration AST +
//! type-parameter list) and instantiated on first reference with concrete
//! type arguments. Instances are keyed by the canonical argument tuple
//! baked into the instance name (`identity<int>`, `Box<double>`), so the
//! same instantiation is never built twice. Non-generic templates take
//! the same path with an empty argument list during initialization.

use std::collections::HashMap;
use std::rc::Rc;

use deno_ast::swc::common::Span;

use crate::codegen::Compiler;
use crate::codegen::emit::FunctionParts;
use crate::parser::LIBRARY_FILE;
use crate::types::{Class, ClassTemplate, Function, FunctionTemplate, Type};

/// Canonical instance name of a template applied to type arguments.
pub(crate) fn instance_key(base: &str, args: &[Type]) -> String {
    if args.is_empty() {
        base.to_string()
    } else {
        let names: Vec<String> = args.iter().map(|t| t.to_string()).collect();
        format!("{}<{}>", base, names.join(","))
    }
}

impl Compiler {
    /// Resolve a function template against concrete type arguments,
    /// instantiating (and queueing for compilation) on first reference.
    pub(crate) fn instantiate_function(
        &mut self,
        template: &Rc<FunctionTemplate>,
        type_args: &[Type],
        span: Span,
    ) -> Option<Rc<Function>> {
        if type_args.len() != template.type_parameters.len() {
            self.error_with(
                span,
                "Unsupported expression",
                &format!(
                    "'{}' expects {} type argument(s)",
                    template.name,
                    template.type_parameters.len()
                ),
            );
            return None;
        }

        let name = instance_key(&template.name, type_args);
        if let Some(existing) = self.functions.get(&name) {
            return Some(existing.clone());
        }

        let mut type_env = HashMap::new();
        for (parameter, argument) in template.type_parameters.iter().zip(type_args) {
            type_env.insert(parameter.clone(), argument.clone());
        }

        let declaration = template.declaration.clone();
        let saved = self.current_file();
        self.set_current_file(
            template.file.clone(),
            template.source.clone(),
            template.prefix.clone(),
        );

        let function = self.build_function(FunctionParts {
            name: name.clone(),
            source_name: declaration.ident.sym.to_string(),
            pats: declaration.function.params.iter().map(|p| &p.pat).collect(),
            return_ann: declaration.function.return_type.as_deref(),
            body: declaration.function.body.clone(),
            exported: template.exported && type_args.is_empty(),
            instance_of: None,
            constructor: false,
            type_env,
            lazy_import: template.file == LIBRARY_FILE,
            span,
        });

        self.set_current_file(saved.0, saved.1, saved.2);
        template
            .instances
            .borrow_mut()
            .insert(name, function.clone());
        Some(function)
    }

    /// Resolve a class template against concrete type arguments. The
    /// instance shell is registered before members are laid out.
    pub(crate) fn instantiate_class(
        &mut self,
        template: &Rc<ClassTemplate>,
        type_args: &[Type],
        span: Span,
    ) -> Option<Rc<Class>> {
        if type_args.len() != template.type_parameters.len() {
            self.error_with(
                span,
                "Unsupported type",
                &format!(
                    "'{}' expects {} type argument(s)",
                    template.name,
                    template.type_parameters.len()
                ),
            );
            return None;
        }

        let name = instance_key(&template.name, type_args);
        if let Some(existing) = self.classes.get(&name) {
            return Some(existing.clone());
        }

        let mut type_env = HashMap::new();
        for (parameter, argument) in template.type_parameters.iter().zip(type_args) {
            type_env.insert(parameter.clone(), argument.clone());
        }

        let class = Rc::new(Class::new(name.clone(), type_env));
        self.classes.insert(name.clone(), class.clone());
        template.instances.borrow_mut().insert(name, class.clone());

        let body = template.declaration.class.body.clone();
        let saved = self.current_file();
        self.set_current_file(
            template.file.clone(),
            template.source.clone(),
            template.prefix.clone(),
        );
        self.fill_class(&class, &body);
        self.set_current_file(saved.0, saved.1, saved.2);

        Some(class)
    }
}
