//! Per-file component pipeline.
//!
//! parse markup → analyze and resolve the instance script → rewrite it →
//! lower the template → assemble. One `CompilerState` lives for the duration
//! of one call and is dropped afterwards.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, Program, Statement};

use crate::analyze::{
    analyze_script, is_props_declaration, resolve_dependencies, Dependency, DependencyOrigin,
};
use crate::assemble::{assemble, component_name, mangle_filepath};
use crate::error::Result;
use crate::lower::lower_fragment;
use crate::parse::parse_component;
use crate::state::CompilerState;
use crate::template::{Script, ScriptLang, Span};
use crate::transform::{
    parse_program, print_program, script_source_type, strip_typescript, transform_program,
};

/// Source of the toolkit binding every component gets.
pub const GTK_SOURCE: &str = "gi://Gtk?version=4.0";

/// Project-wide inputs shared read-only by every compilation unit.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'c> {
    pub src_dir: &'c Path,
    /// Importer-visible reactive export names, keyed by module path.
    pub reactive_exports: &'c HashMap<PathBuf, HashSet<String>>,
}

impl<'c> CompileContext<'c> {
    pub fn new(src_dir: &'c Path, reactive_exports: &'c HashMap<PathBuf, HashSet<String>>) -> Self {
        Self {
            src_dir,
            reactive_exports,
        }
    }

    /// Local names bound to reactive exports of the imported modules.
    pub fn reactive_imports(&self, dependencies: &[Dependency]) -> HashSet<String> {
        let mut names = HashSet::new();
        for dep in dependencies {
            let DependencyOrigin::Module { path, .. } = &dep.origin else {
                continue;
            };
            let Some(exports) = self.reactive_exports.get(path) else {
                continue;
            };
            for spec in &dep.specifiers {
                if exports.contains(&spec.imported) {
                    names.insert(spec.local.clone());
                }
            }
        }
        names
    }
}

/// Compile one `.svelte` file to a GJS module.
pub fn compile_component(path: &Path, source: &str, ctx: &CompileContext) -> Result<String> {
    let root = parse_component(source).map_err(|e| e.with_file(path))?;

    let mut state = CompilerState::new(
        &component_name(path),
        &mangle_filepath(path, ctx.src_dir),
        ctx.src_dir,
    );

    let script = match &root.instance {
        Some(instance) => compile_instance_script(path, instance, ctx, &mut state),
        None => Ok(String::new()),
    }
    .map_err(|e| e.with_file(path))?;

    ensure_gtk_dependency(&mut state);
    lower_fragment(&root.fragment, &mut state).map_err(|e| e.with_file(path))?;

    log::debug!(
        "compiled component {} ({} reactive, {} props)",
        path.display(),
        state.reactive.len(),
        state.props.len()
    );
    assemble(&state, &script).map_err(|e| e.with_file(path))
}

fn compile_instance_script(
    path: &Path,
    script: &Script,
    ctx: &CompileContext,
    state: &mut CompilerState,
) -> Result<String> {
    let base = script.content_start;
    let typescript = script.lang == ScriptLang::Ts;
    let allocator = Allocator::default();
    let mut program = parse_program(
        &allocator,
        &script.content,
        script_source_type(typescript),
        script.span,
    )?;

    let analysis = analyze_script(&program, &script.content).map_err(|e| e.offset(base))?;
    let mut dependencies = analysis.dependencies;
    resolve_dependencies(path, &mut dependencies).map_err(|e| e.offset(base))?;

    state.reactive = analysis.reactive;
    state
        .reactive
        .extend(analysis.props.iter().map(|p| p.local.clone()));
    state.reactive.extend(ctx.reactive_imports(&dependencies));
    state.props = analysis.props;
    for dep in dependencies {
        state.add_dependency(dep);
    }

    strip_module_syntax(&allocator, &mut program);
    if typescript {
        strip_typescript(&allocator, &mut program, path)?;
    }
    transform_program(&allocator, &mut program, &state.reactive).map_err(|e| e.offset(base))?;
    Ok(print_program(&program))
}

/// Drop imports and the `$props()` declaration, and unwrap `export` on
/// declarations so they become plain locals of the factory function.
fn strip_module_syntax<'a>(allocator: &'a Allocator, program: &mut Program<'a>) {
    let body = std::mem::replace(&mut program.body, oxc_allocator::Vec::new_in(allocator));
    for stmt in body {
        match stmt {
            Statement::ImportDeclaration(_) => {}
            stmt if is_props_declaration(&stmt) => {}
            Statement::ExportNamedDeclaration(export) => {
                if let Some(declaration) = export.unbox().declaration {
                    program.body.push(declaration_statement(declaration));
                }
            }
            other => program.body.push(other),
        }
    }
}

pub(crate) fn declaration_statement(declaration: Declaration) -> Statement {
    Statement::from(declaration)
}

/// Every component references `Gtk`; bind it unless the script already does.
/// An unversioned script import is pinned to 4.0.
fn ensure_gtk_dependency(state: &mut CompilerState) {
    let existing = state.dependencies.values_mut().find(|dep| {
        matches!(&dep.origin, DependencyOrigin::Toolkit { namespace, .. } if namespace == "Gtk")
    });
    match existing {
        Some(dep) => {
            if let DependencyOrigin::Toolkit { version: version @ None, .. } = &mut dep.origin {
                *version = Some("4.0".to_string());
            }
            dep.add_specifier("Gtk", "default");
        }
        None => {
            let mut dep = Dependency::new(GTK_SOURCE, Span::default());
            dep.add_specifier("Gtk", "default");
            state.add_dependency(dep);
        }
    }
}
