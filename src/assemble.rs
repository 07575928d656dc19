//! Assembler.
//!
//! Stitches the analyzed imports, the rewritten script and the lowered widget
//! code into one GJS module exposing a single factory function.

use std::collections::BTreeMap;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::analyze::{Dependency, DependencyOrigin, Specifier};
use crate::error::{CompileError, Result};
use crate::lower::indent_block;
use crate::state::CompilerState;

/// Binding of every runtime primitive a component may reference.
pub const RUNTIME_BINDINGS: &str = "const { $state, $get, $set, $effect, $derived, $notify, $prop, $resolve_orientation, $resolve_align, $resolve_css_classes } = imports.runtime;";

lazy_static! {
    static ref MANGLE_RE: Regex = Regex::new(r"[/\\\-.]").expect("valid mangle pattern");
}

/// Module name of a source file: its path relative to `src_dir`, without the
/// extension, with separators, dashes and dots replaced by `_`.
pub fn mangle_filepath(path: &Path, src_dir: &Path) -> String {
    let relative = path.strip_prefix(src_dir).unwrap_or(path);
    let relative = relative.with_extension("");
    let text = relative.to_string_lossy();
    let text = text.trim_start_matches(['/', '\\']);
    MANGLE_RE.replace_all(text, "_").into_owned()
}

/// Factory name of a component: the file stem as a JS identifier.
pub fn component_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '$' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

fn destructure(specifiers: &[String], source: &str) -> String {
    format!("const {{ {} }} = {};", specifiers.join(", "), source)
}

fn named_entry(spec: &Specifier) -> String {
    if spec.local == spec.imported {
        spec.local.clone()
    } else {
        format!("{}: {}", spec.imported, spec.local)
    }
}

/// Bindings for one namespace object: default and namespace specifiers bind
/// the object itself, named specifiers are destructured from it.
fn object_bindings(dep: &Dependency, source: &str, out: &mut Vec<String>) {
    let mut named = Vec::new();
    for spec in &dep.specifiers {
        match spec.imported.as_str() {
            "default" | "*" => out.push(format!("const {} = {};", spec.local, source)),
            _ => named.push(named_entry(spec)),
        }
    }
    if !named.is_empty() {
        out.push(destructure(&named, source));
    }
}

/// The import preamble: toolkit and builtin bindings, the runtime line when
/// requested, then sibling-module bindings grouped per mangled name.
pub fn import_bindings<'d>(
    dependencies: impl IntoIterator<Item = &'d Dependency>,
    src_dir: &Path,
    runtime: bool,
) -> Result<String> {
    let mut versions: BTreeMap<String, String> = BTreeMap::new();
    let mut toolkit = Vec::new();
    let mut builtin = Vec::new();
    let mut modules: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut module_objects = Vec::new();

    for dep in dependencies {
        match &dep.origin {
            DependencyOrigin::Toolkit { namespace, version } => {
                if let Some(version) = version {
                    versions.insert(namespace.clone(), version.clone());
                }
                object_bindings(dep, &format!("imports.gi.{}", namespace), &mut toolkit);
            }
            DependencyOrigin::Builtin { name } => {
                object_bindings(dep, &format!("imports.{}", name), &mut builtin);
            }
            DependencyOrigin::Module { path, is_component } => {
                if !path.starts_with(src_dir) {
                    return Err(CompileError::analysis(
                        format!(
                            "Import '{}' resolves outside the source directory {}.",
                            dep.source,
                            src_dir.display()
                        ),
                        dep.span,
                    ));
                }
                let mangled = mangle_filepath(path, src_dir);
                let group = modules.entry(mangled.clone()).or_default();
                for spec in &dep.specifiers {
                    if *is_component {
                        group.push(format!("{}: {}", mangled, spec.local));
                    } else if spec.imported == "*" {
                        module_objects.push(format!("const {} = imports.{};", spec.local, mangled));
                    } else {
                        group.push(named_entry(spec));
                    }
                }
            }
            DependencyOrigin::Relative => {
                return Err(CompileError::analysis(
                    format!("Import '{}' was not resolved.", dep.source),
                    dep.span,
                ));
            }
        }
    }

    let mut lines: Vec<String> = versions
        .iter()
        .map(|(namespace, version)| format!("imports.gi.versions.{} = '{}';", namespace, version))
        .collect();
    lines.extend(toolkit);
    lines.extend(builtin);
    if runtime {
        lines.push(RUNTIME_BINDINGS.to_string());
    }
    for (mangled, specifiers) in &modules {
        if !specifiers.is_empty() {
            lines.push(destructure(specifiers, &format!("imports.{}", mangled)));
        }
    }
    lines.extend(module_objects);
    Ok(lines.join("\n"))
}

fn prop_declarations(state: &CompilerState) -> String {
    state
        .props
        .iter()
        .map(|prop| {
            format!(
                "const {} = $prop(props, {}, {}, {});\n",
                prop.local,
                serde_json::to_string(&prop.name).unwrap_or_else(|_| format!("'{}'", prop.name)),
                prop.default.as_deref().unwrap_or("undefined"),
                prop.bindable
            )
        })
        .collect()
}

/// Emit the final module text for a lowered component.
pub fn assemble(state: &CompilerState, script: &str) -> Result<String> {
    let imports = import_bindings(state.dependencies.values(), &state.source_root, true)?;

    let sections = [
        prop_declarations(state),
        script.trim().to_string(),
        state.helper_functions.trim().to_string(),
        state.widget_declarations.trim().to_string(),
        state.effects_and_handlers.trim().to_string(),
        format!("return {{ rootWidget: {} }};", state.root_widget),
    ];
    let body = sections
        .iter()
        .filter(|section| !section.trim().is_empty())
        .map(|section| indent_block(section.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(format!(
        "'use strict';\n{}\n\nfunction {}(props = {{}}) {{\n{}\n}}\n\nthis.{} = {};\n",
        imports, state.component_name, body, state.mangled_name, state.component_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Span;
    use std::path::PathBuf;

    #[test]
    fn test_mangle_filepath() {
        let src = Path::new("/app/src");
        assert_eq!(mangle_filepath(Path::new("/app/src/App.svelte"), src), "App");
        assert_eq!(
            mangle_filepath(Path::new("/app/src/lib/todo-store.js"), src),
            "lib_todo_store"
        );
        assert_eq!(
            mangle_filepath(Path::new("/app/src/ui/my.widget.ts"), src),
            "ui_my_widget"
        );
    }

    #[test]
    fn test_component_name_is_identifier() {
        assert_eq!(component_name(Path::new("/src/Counter.svelte")), "Counter");
        assert_eq!(component_name(Path::new("/src/todo-item.svelte")), "todo_item");
        assert_eq!(component_name(Path::new("/src/1st.svelte")), "_1st");
    }

    #[test]
    fn test_toolkit_bindings() {
        let mut gtk = Dependency::new("gi://Gtk?version=4.0", Span::default());
        gtk.add_specifier("Gtk", "default");
        let mut gio = Dependency::new("gi://Gio", Span::default());
        gio.add_specifier("File", "File");
        gio.add_specifier("App", "Application");
        let code = import_bindings([&gtk, &gio], Path::new("/src"), false).unwrap();
        assert!(code.contains("imports.gi.versions.Gtk = '4.0';"));
        assert!(code.contains("const Gtk = imports.gi.Gtk;"));
        assert!(code.contains("const { File, Application: App } = imports.gi.Gio;"));
        assert!(!code.contains("imports.runtime"));
    }

    #[test]
    fn test_module_bindings_grouped() {
        let path = PathBuf::from("/src/lib/store.js");
        let mut a = Dependency::new("./lib/store.js", Span::default());
        a.origin = DependencyOrigin::Module {
            path: path.clone(),
            is_component: false,
        };
        a.add_specifier("count", "count");
        a.add_specifier("t", "total");
        let mut button = Dependency::new("./Button.svelte", Span::default());
        button.origin = DependencyOrigin::Module {
            path: PathBuf::from("/src/Button.svelte"),
            is_component: true,
        };
        button.add_specifier("Button", "default");
        let code = import_bindings([&a, &button], Path::new("/src"), true).unwrap();
        assert!(code.contains("const { count, total: t } = imports.lib_store;"));
        assert!(code.contains("const { Button: Button } = imports.Button;"));
        let runtime = code.find("imports.runtime").unwrap();
        assert!(runtime < code.find("imports.lib_store").unwrap());
    }

    #[test]
    fn test_import_outside_source_dir() {
        let mut dep = Dependency::new("../../x.js", Span::new(5, 9));
        dep.origin = DependencyOrigin::Module {
            path: PathBuf::from("/elsewhere/x.js"),
            is_component: false,
        };
        let err = import_bindings([&dep], Path::new("/src"), true).unwrap_err();
        assert_eq!(err.span, Some(Span::new(5, 9)));
    }
}
