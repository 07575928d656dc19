//! Plain `.js` / `.ts` sibling modules.
//!
//! ES module syntax is lowered to the GJS `imports` convention: imports become
//! `const` bindings, exports become assignments to `this`. Reactive state
//! declared or imported here is rewritten exactly like component scripts.

use std::path::Path;

use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::{
    BindingIdentifier, Declaration, ExportDefaultDeclarationKind, Expression, ModuleExportName,
    Program, Statement, VariableDeclaration,
};
use oxc_ast::AstBuilder;
use oxc_span::SPAN;

use crate::analyze::{
    analyze_script, classify_source, resolve_dependencies, resolve_import, DependencyOrigin,
};
use crate::assemble::{import_bindings, mangle_filepath};
use crate::component::{declaration_statement, CompileContext};
use crate::error::{CompileError, Result};
use crate::scope::collect_pattern_names;
use crate::template::Span;
use crate::transform::{
    parse_program, print_program, script_source_type, strip_typescript, transform_program,
};

const DEFAULT_LOCAL: &str = "_default";

/// `this.<external> = <value>;` lines, in declaration order.
#[derive(Debug, Default)]
struct Exports {
    entries: Vec<(String, String)>,
}

impl Exports {
    fn add(&mut self, external: impl Into<String>, value: impl Into<String>) {
        let external = external.into();
        if !self.entries.iter().any(|(name, _)| *name == external) {
            self.entries.push((external, value.into()));
        }
    }

    fn has(&self, external: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == external)
    }

    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(external, value)| format!("this.{} = {};\n", external, value))
            .collect()
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

/// Compile one plain module to GJS.
pub fn compile_module(path: &Path, source: &str, ctx: &CompileContext) -> Result<String> {
    compile_module_inner(path, source, ctx).map_err(|e| e.with_file(path))
}

fn compile_module_inner(path: &Path, source: &str, ctx: &CompileContext) -> Result<String> {
    let typescript = path.extension().is_some_and(|ext| ext == "ts");
    let allocator = Allocator::default();
    let whole = Span::new(0, source.len() as u32);
    let mut program = parse_program(&allocator, source, script_source_type(typescript), whole)?;

    let analysis = analyze_script(&program, source)?;
    let mut dependencies = analysis.dependencies;
    resolve_dependencies(path, &mut dependencies)?;

    let mut reactive = analysis.reactive;
    let declared_reactive: Vec<String> = {
        let mut names: Vec<String> = reactive.iter().cloned().collect();
        names.sort();
        names
    };
    reactive.extend(ctx.reactive_imports(&dependencies));

    let mut exports = lower_module_syntax(&allocator, &mut program, path, ctx)?;
    for name in declared_reactive {
        if !exports.has(&name) {
            exports.add(name.clone(), name);
        }
    }

    if typescript {
        strip_typescript(&allocator, &mut program, path)?;
    }
    transform_program(&allocator, &mut program, &reactive)?;
    let code = print_program(&program);

    let uses_runtime = !reactive.is_empty() || code.contains("$effect(") || code.contains("$state(");
    let imports = import_bindings(&dependencies, ctx.src_dir, uses_runtime)?;

    log::debug!(
        "compiled module {} ({} reactive, {} exports)",
        path.display(),
        reactive.len(),
        exports.entries.len()
    );

    let mut out = String::from("'use strict';\n");
    if !imports.is_empty() {
        out.push_str(&imports);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(code.trim_end());
    out.push_str("\n\n");
    out.push_str(&exports.render());
    Ok(out)
}

/// Remove imports, unwrap exports and record what each export exposes.
fn lower_module_syntax<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    path: &Path,
    ctx: &CompileContext,
) -> Result<Exports> {
    let ast = AstBuilder::new(allocator);
    let mut exports = Exports::default();
    let body = std::mem::replace(&mut program.body, ast.vec());

    for stmt in body {
        match stmt {
            Statement::ImportDeclaration(_) => {}
            Statement::ExportNamedDeclaration(export) => {
                let export = export.unbox();
                if export.export_kind.is_type() {
                    continue;
                }
                if let Some(declaration) = export.declaration {
                    for name in declared_names(&declaration) {
                        exports.add(name.clone(), name);
                    }
                    program.body.push(declaration_statement(declaration));
                    continue;
                }
                let forwarded = match &export.source {
                    Some(source) => Some(module_object(
                        path,
                        source.value.as_str(),
                        Span::from(export.span),
                        ctx,
                    )?),
                    None => None,
                };
                for specifier in &export.specifiers {
                    if specifier.export_kind.is_type() {
                        continue;
                    }
                    let local = export_name(&specifier.local);
                    let external = export_name(&specifier.exported);
                    match &forwarded {
                        Some(object) => exports.add(external, format!("{}.{}", object, local)),
                        None => exports.add(external, local),
                    }
                }
            }
            Statement::ExportAllDeclaration(export) => {
                let object =
                    module_object(path, export.source.value.as_str(), Span::from(export.span), ctx)?;
                match &export.exported {
                    Some(name) => exports.add(export_name(name), object),
                    None => {
                        return Err(CompileError::analysis(
                            "`export * from` is not supported; list the forwarded names or use `export * as name from`.",
                            Span::from(export.span),
                        ))
                    }
                }
            }
            Statement::ExportDefaultDeclaration(export) => {
                let export = export.unbox();
                let stmt = default_export_statement(&ast, allocator, export.declaration, &mut exports)?;
                if let Some(stmt) = stmt {
                    program.body.push(stmt);
                }
            }
            other => program.body.push(other),
        }
    }
    Ok(exports)
}

/// GJS expression for the module object an `export ... from` forwards.
fn module_object(path: &Path, source: &str, span: Span, ctx: &CompileContext) -> Result<String> {
    match classify_source(source) {
        DependencyOrigin::Toolkit { namespace, .. } => Ok(format!("imports.gi.{}", namespace)),
        DependencyOrigin::Builtin { name } => Ok(format!("imports.{}", name)),
        _ => {
            let resolved = resolve_import(path, source).ok_or_else(|| {
                CompileError::analysis(
                    format!("Cannot resolve import '{}' from {}.", source, path.display()),
                    span,
                )
            })?;
            Ok(format!("imports.{}", mangle_filepath(&resolved, ctx.src_dir)))
        }
    }
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(decl) => variable_names(decl),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::TSEnumDeclaration(decl) if !decl.declare => vec![decl.id.name.to_string()],
        _ => Vec::new(),
    }
}

fn variable_names(decl: &VariableDeclaration) -> Vec<String> {
    let mut set = std::collections::HashSet::new();
    let mut ordered = Vec::new();
    for declarator in &decl.declarations {
        let before = set.clone();
        collect_pattern_names(&declarator.id, &mut set);
        let mut added: Vec<String> = set.difference(&before).cloned().collect();
        added.sort();
        ordered.extend(added);
    }
    ordered
}

/// Named default functions and classes stay declarations; anything else is
/// bound to `_default`.
fn default_export_statement<'a>(
    ast: &AstBuilder<'a>,
    allocator: &'a Allocator,
    kind: ExportDefaultDeclarationKind<'a>,
    exports: &mut Exports,
) -> Result<Option<Statement<'a>>> {
    match kind {
        ExportDefaultDeclarationKind::FunctionDeclaration(mut func) => {
            let name = match &func.id {
                Some(id) => id.name.to_string(),
                None => {
                    func.id = Some(binding_identifier(ast, DEFAULT_LOCAL));
                    DEFAULT_LOCAL.to_string()
                }
            };
            exports.add("default", name);
            Ok(Some(Statement::FunctionDeclaration(func)))
        }
        ExportDefaultDeclarationKind::ClassDeclaration(mut class) => {
            let name = match &class.id {
                Some(id) => id.name.to_string(),
                None => {
                    class.id = Some(binding_identifier(ast, DEFAULT_LOCAL));
                    DEFAULT_LOCAL.to_string()
                }
            };
            exports.add("default", name);
            Ok(Some(Statement::ClassDeclaration(class)))
        }
        ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => Ok(None),
        other => {
            let Some(expr) = other.as_expression() else {
                return Ok(None);
            };
            exports.add("default", DEFAULT_LOCAL);
            Ok(Some(default_binding(allocator, expr.clone_in(allocator))?))
        }
    }
}

fn binding_identifier<'a>(ast: &AstBuilder<'a>, name: &str) -> BindingIdentifier<'a> {
    let name: &'a str = ast.allocator.alloc_str(name);
    ast.binding_identifier(SPAN, name)
}

/// `const _default = <expr>;`
fn default_binding<'a>(allocator: &'a Allocator, expr: Expression<'a>) -> Result<Statement<'a>> {
    let template = format!("const {} = 0;", DEFAULT_LOCAL);
    let mut program = parse_program(allocator, &template, script_source_type(false), Span::default())?;
    let mut stmt = program.body.pop().ok_or_else(|| {
        CompileError::analysis("could not build the default export binding", None)
    })?;
    if let Statement::VariableDeclaration(decl) = &mut stmt {
        if let Some(declarator) = decl.declarations.first_mut() {
            declarator.init = Some(expr);
        }
    }
    Ok(stmt)
}
