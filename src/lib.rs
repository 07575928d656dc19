//! # Svelte → GJS compiler
//!
//! Compiles `.svelte` components into plain GJS modules that build GTK 4
//! widget trees imperatively, and rewrites sibling `.js`/`.ts` modules into the
//! same `imports.*` module system.
//!
//! ## Pipeline
//!
//! 1. **Parse** (`parse`): markup front end producing a `template::Root`.
//! 2. **Analyze** (`analyze`): `$state`/`$derived` names, `$props()` shape,
//!    imports and re-exports of the instance script.
//! 3. **Rewrite** (`transform`): reads of reactive names become `$get(x)`,
//!    writes become `$set(x, ...)`, in-place mutation is followed by `$notify(x)`.
//! 4. **Lower** (`lower`, `blocks`, `widgets`): template nodes become widget
//!    construction code, `$effect` updaters and signal handlers.
//! 5. **Assemble** (`assemble`): one factory function per component,
//!    exported as `this.<mangled> = <Name>`.
//!
//! ## Reactivity Invariants
//!
//! - A name is reactive only when it was declared with `$state`/`$derived`,
//!   destructured from `$props()`, or imported as a reactive export of a
//!   sibling module. Shadowing bindings are never rewritten.
//! - Every dynamic template value is applied once at construction and then
//!   kept current from inside an `$effect`.
//! - Control blocks (`{#if}`, `{#each}`) clear their container before
//!   repopulating it, so exactly one arm is ever mounted.
//!
//! A project build runs two passes (`project`): reactive exports are settled
//! across all modules first, then every file compiles in parallel. Any error
//! aborts the build and nothing is written.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod analyze;
mod assemble;
mod blocks;
mod component;
mod config;
mod diagnostic;
mod discovery;
mod error;
mod lower;
mod module;
mod parse;
mod project;
mod scope;
mod state;
mod template;
mod transform;
mod widgets;

#[cfg(test)]
mod component_tests;
#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod transform_tests;

pub use analyze::{Dependency, DependencyOrigin, PropDecl, Specifier};
pub use assemble::{component_name, mangle_filepath};
pub use component::{compile_component, CompileContext};
pub use config::{BuildConfig, CONFIG_FILE};
pub use diagnostic::{render, render_with, success_message};
pub use discovery::{discover_sources, SourceFile, SourceKind};
pub use error::{CompileError, ErrorKind, Result};
pub use module::compile_module;
pub use parse::parse_component;
pub use project::{build_project, compile_file, BuildReport, BuiltModule, RUNTIME_JS};
pub use template::{Root, Span};

#[cfg(feature = "napi")]
fn to_napi_error(err: CompileError) -> napi::Error {
    napi::Error::from_reason(err.to_string())
}

/// Compile one component source without consulting sibling modules.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_component_native(
    path: String,
    source: String,
    src_dir: String,
) -> napi::Result<String> {
    let reactive_exports = std::collections::HashMap::new();
    let src_dir = std::path::PathBuf::from(src_dir);
    let ctx = CompileContext::new(&src_dir, &reactive_exports);
    compile_component(std::path::Path::new(&path), &source, &ctx).map_err(to_napi_error)
}

#[cfg(feature = "napi")]
#[napi]
pub fn build_project_native(src_dir: String, out_dir: String) -> napi::Result<serde_json::Value> {
    let config = BuildConfig {
        src_dir: src_dir.into(),
        out_dir: out_dir.into(),
        ..BuildConfig::default()
    };
    let report = build_project(&config).map_err(to_napi_error)?;
    serde_json::to_value(&report)
        .map_err(|e| napi::Error::from_reason(format!("Serialize error: {}", e)))
}
