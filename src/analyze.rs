//! Scope & reactivity analysis.
//!
//! One pass over a script collects its reactive declarations, the
//! `$props()` table and its imports. A second, module-level pass finds which
//! exports are reactive cells so importers can treat them as reactive too.

use oxc_ast::ast::{
    BindingPattern, CallExpression, Declaration, Expression, ImportDeclaration,
    ImportDeclarationSpecifier, ModuleExportName, ObjectPattern, Program, PropertyKey, Statement,
    VariableDeclaration,
};
use oxc_span::GetSpan;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::error::{CompileError, Result};
use crate::template::Span;

lazy_static::lazy_static! {
    static ref GI_IMPORT_RE: Regex =
        Regex::new(r"^gi://(\w+)(?:\?version=([\w.]+))?").expect("valid gi import pattern");
}

/// Extensions tried, in order, for an import written without one.
const RESOLVE_EXTENSIONS: &[&str] = &["js", "ts", "svelte"];

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// One `name` / `name = default` entry of the `$props()` destructuring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropDecl {
    /// Key the parent passes.
    pub name: String,
    /// Binding inside the component.
    pub local: String,
    /// Default value as source text.
    pub default: Option<String>,
    /// Declared with `$bindable(...)`; the parent's cell is shared.
    pub bindable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specifier {
    pub local: String,
    /// `default` for default imports, `*` for namespace imports.
    pub imported: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DependencyOrigin {
    /// Relative path not yet resolved against the importing file.
    Relative,
    /// GObject introspection namespace, `gi://Gtk?version=4.0`.
    Toolkit {
        namespace: String,
        version: Option<String>,
    },
    /// GJS built-in module such as `system` or `gettext`.
    Builtin { name: String },
    /// Another compiled file of the project.
    Module { path: PathBuf, is_component: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Import source exactly as written.
    pub source: String,
    pub origin: DependencyOrigin,
    pub specifiers: Vec<Specifier>,
    /// Span of the first import statement for this source.
    pub span: Span,
}

impl Dependency {
    pub fn new(source: &str, span: Span) -> Self {
        Self {
            source: source.to_string(),
            origin: classify_source(source),
            specifiers: Vec::new(),
            span,
        }
    }

    pub fn add_specifier(&mut self, local: &str, imported: &str) {
        let spec = Specifier {
            local: local.to_string(),
            imported: imported.to_string(),
        };
        if !self.specifiers.contains(&spec) {
            self.specifiers.push(spec);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptAnalysis {
    /// Locals initialized with `$state(...)` or `$derived(...)`.
    pub reactive: HashSet<String>,
    pub props: Vec<PropDecl>,
    /// One record per import source, in first-seen order.
    pub dependencies: Vec<Dependency>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Analyze a component instance script or a plain module. `source` is the
/// text the program was parsed from; spans in errors are relative to it.
pub fn analyze_script(program: &Program, source: &str) -> Result<ScriptAnalysis> {
    let mut analysis = ScriptAnalysis::default();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => record_import(&mut analysis.dependencies, decl),
            Statement::VariableDeclaration(decl) => analyze_declaration(&mut analysis, decl, source)?,
            Statement::ExportNamedDeclaration(export) => {
                if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
                    analyze_declaration(&mut analysis, decl, source)?;
                }
            }
            _ => {}
        }
    }

    log::debug!(
        "analyzed script: {} reactive, {} props, {} imports",
        analysis.reactive.len(),
        analysis.props.len(),
        analysis.dependencies.len()
    );
    Ok(analysis)
}

fn analyze_declaration(
    analysis: &mut ScriptAnalysis,
    decl: &VariableDeclaration,
    source: &str,
) -> Result<()> {
    for declarator in &decl.declarations {
        let Some(Expression::CallExpression(call)) = &declarator.init else {
            continue;
        };

        if is_reactive_constructor(call) {
            if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                analysis.reactive.insert(id.name.to_string());
            }
        } else if callee_name(call) == Some("$props") {
            let BindingPattern::ObjectPattern(pattern) = &declarator.id else {
                return Err(CompileError::analysis(
                    "`$props()` must be destructured: properties must be destructured into individual bindings.",
                    Span::from(declarator.span),
                ));
            };
            analysis.props.extend(analyze_props(pattern, source)?);
        }
    }
    Ok(())
}

fn callee_name<'c>(call: &'c CallExpression) -> Option<&'c str> {
    match &call.callee {
        Expression::Identifier(id) => Some(id.name.as_str()),
        _ => None,
    }
}

/// `$state(..)`, `$derived(..)` or `$derived.by(..)`.
pub fn is_reactive_constructor(call: &CallExpression) -> bool {
    match &call.callee {
        Expression::Identifier(id) => id.name == "$state" || id.name == "$derived",
        Expression::StaticMemberExpression(member) => {
            matches!(&member.object, Expression::Identifier(id) if id.name == "$derived")
                && member.property.name == "by"
        }
        _ => false,
    }
}

/// Is this statement the `let { .. } = $props()` declaration?
pub fn is_props_declaration(stmt: &Statement) -> bool {
    let Statement::VariableDeclaration(decl) = stmt else {
        return false;
    };
    decl.declarations.iter().any(|declarator| {
        matches!(&declarator.init, Some(Expression::CallExpression(call)) if callee_name(call) == Some("$props"))
    })
}

fn analyze_props(pattern: &ObjectPattern, source: &str) -> Result<Vec<PropDecl>> {
    let malformed = |span: oxc_span::Span| {
        CompileError::analysis(
            "properties must be destructured into individual bindings",
            Span::from(span),
        )
    };

    if let Some(rest) = &pattern.rest {
        return Err(CompileError::analysis(
            "Rest properties are not supported in `$props()`; name each property.",
            Span::from(rest.span),
        ));
    }

    let mut props = Vec::new();
    for property in &pattern.properties {
        if property.computed {
            return Err(malformed(property.span));
        }
        let name = match &property.key {
            PropertyKey::StaticIdentifier(id) => id.name.to_string(),
            PropertyKey::StringLiteral(lit) => lit.value.to_string(),
            _ => return Err(malformed(property.span)),
        };

        let (local, default_expr) = match &property.value {
            BindingPattern::BindingIdentifier(id) => (id.name.to_string(), None),
            BindingPattern::AssignmentPattern(assign) => match &assign.left {
                BindingPattern::BindingIdentifier(id) => (id.name.to_string(), Some(&assign.right)),
                _ => return Err(malformed(property.span)),
            },
            _ => return Err(malformed(property.span)),
        };

        let mut bindable = false;
        let default = match default_expr {
            Some(Expression::CallExpression(call)) if callee_name(call) == Some("$bindable") => {
                bindable = true;
                call.arguments
                    .first()
                    .map(|arg| slice(source, arg.span()).to_string())
            }
            Some(expr) => Some(slice(source, expr.span()).to_string()),
            None => None,
        };

        props.push(PropDecl {
            name,
            local,
            default,
            bindable,
        });
    }
    Ok(props)
}

fn slice(source: &str, span: oxc_span::Span) -> &str {
    source
        .get(span.start as usize..span.end as usize)
        .unwrap_or_default()
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn record_import(dependencies: &mut Vec<Dependency>, decl: &ImportDeclaration) {
    if decl.import_kind.is_type() {
        return;
    }
    let source = decl.source.value.as_str();
    let index = match dependencies.iter().position(|dep| dep.source == source) {
        Some(index) => index,
        None => {
            dependencies.push(Dependency::new(source, Span::from(decl.span)));
            dependencies.len() - 1
        }
    };
    let dep = &mut dependencies[index];

    let Some(specifiers) = &decl.specifiers else {
        return;
    };
    for specifier in specifiers {
        match specifier {
            ImportDeclarationSpecifier::ImportSpecifier(s) => {
                if !s.import_kind.is_type() {
                    dep.add_specifier(&s.local.name, &export_name(&s.imported));
                }
            }
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                dep.add_specifier(&s.local.name, "default");
            }
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                dep.add_specifier(&s.local.name, "*");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVE EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// `export { imported as exported } from source`, or an imported binding re-exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reexport {
    pub exported: String,
    pub source: String,
    pub imported: String,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleExports {
    /// External names of exports declared reactive in this module.
    pub reactive: HashSet<String>,
    /// Exports forwarded from other modules, resolved after all modules are analyzed.
    pub reexports: Vec<Reexport>,
}

/// Collect the reactive exports of one module and the re-export edges that
/// may make more of its exports reactive once other modules are known.
pub fn analyze_module_exports(program: &Program) -> ModuleExports {
    let mut declared = HashSet::new();
    let mut imports: HashMap<String, (String, String)> = HashMap::new();

    let mut collect_declared = |decl: &VariableDeclaration, into: &mut HashSet<String>| {
        for declarator in &decl.declarations {
            if let (Some(Expression::CallExpression(call)), BindingPattern::BindingIdentifier(id)) =
                (&declarator.init, &declarator.id)
            {
                if is_reactive_constructor(call) {
                    into.insert(id.name.to_string());
                }
            }
        }
    };

    for stmt in &program.body {
        match stmt {
            Statement::VariableDeclaration(decl) => collect_declared(decl, &mut declared),
            Statement::ExportNamedDeclaration(export) => {
                if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
                    collect_declared(decl, &mut declared);
                }
            }
            Statement::ImportDeclaration(decl) => {
                for specifier in decl.specifiers.iter().flatten() {
                    let (local, imported) = match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            (s.local.name.to_string(), export_name(&s.imported))
                        }
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            (s.local.name.to_string(), "default".to_string())
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => continue,
                    };
                    imports.insert(local, (decl.source.value.to_string(), imported));
                }
            }
            _ => {}
        }
    }

    let mut exports = ModuleExports::default();
    for stmt in &program.body {
        let Statement::ExportNamedDeclaration(export) = stmt else {
            continue;
        };

        if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
            for declarator in &decl.declarations {
                if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                    if declared.contains(id.name.as_str()) {
                        exports.reactive.insert(id.name.to_string());
                    }
                }
            }
            continue;
        }

        for specifier in &export.specifiers {
            let local = export_name(&specifier.local);
            let exported = export_name(&specifier.exported);
            if let Some(source) = &export.source {
                exports.reexports.push(Reexport {
                    exported,
                    source: source.value.to_string(),
                    imported: local,
                    span: Span::from(specifier.span),
                });
            } else if declared.contains(&local) {
                exports.reactive.insert(exported);
            } else if let Some((source, imported)) = imports.get(&local) {
                exports.reexports.push(Reexport {
                    exported,
                    source: source.clone(),
                    imported: imported.clone(),
                    span: Span::from(specifier.span),
                });
            }
        }
    }
    exports
}

/// A re-export whose source has been resolved to a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReexportEdge {
    pub module: PathBuf,
    pub exported: String,
    pub source: PathBuf,
    pub imported: String,
}

/// Grow each module's reactive-export set along re-export edges until nothing
/// changes. Names are tracked under the importer-visible (exported) name.
pub fn propagate_reactive_exports(
    exports: &mut HashMap<PathBuf, HashSet<String>>,
    edges: &[ReexportEdge],
) {
    let mut rounds = 0;
    loop {
        let mut changed = false;
        for edge in edges {
            let source_reactive = exports
                .get(&edge.source)
                .is_some_and(|names| names.contains(&edge.imported));
            if source_reactive
                && exports
                    .entry(edge.module.clone())
                    .or_default()
                    .insert(edge.exported.clone())
            {
                changed = true;
            }
        }
        rounds += 1;
        if !changed {
            break;
        }
    }
    log::debug!("reactive exports settled after {} round(s)", rounds);
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_relative(source: &str) -> bool {
    source.starts_with("./") || source.starts_with("../") || source.starts_with('/')
}

pub fn classify_source(source: &str) -> DependencyOrigin {
    if let Some(caps) = GI_IMPORT_RE.captures(source) {
        return DependencyOrigin::Toolkit {
            namespace: caps[1].to_string(),
            version: caps.get(2).map(|m| m.as_str().to_string()),
        };
    }
    if is_relative(source) {
        DependencyOrigin::Relative
    } else {
        DependencyOrigin::Builtin {
            name: source.to_string(),
        }
    }
}

/// Lexically normalize `a/./b/../c` to `a/c` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a relative import written in `from_file` to an existing file.
pub fn resolve_import(from_file: &Path, source: &str) -> Option<PathBuf> {
    let base = from_file.parent().unwrap_or_else(|| Path::new(""));
    let candidate = normalize_path(&base.join(source));
    if candidate.is_file() {
        return Some(candidate);
    }
    RESOLVE_EXTENSIONS.iter().find_map(|ext| {
        let mut with_ext = candidate.clone().into_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        with_ext.is_file().then_some(with_ext)
    })
}

/// Turn every relative dependency into a resolved module reference.
pub fn resolve_dependencies(from_file: &Path, dependencies: &mut [Dependency]) -> Result<()> {
    for dep in dependencies.iter_mut() {
        if dep.origin != DependencyOrigin::Relative {
            continue;
        }
        let path = resolve_import(from_file, &dep.source).ok_or_else(|| {
            CompileError::analysis(
                format!(
                    "Cannot resolve import '{}' from {}.",
                    dep.source,
                    from_file.display()
                ),
                dep.span,
            )
        })?;
        let is_component = path.extension().is_some_and(|ext| ext == "svelte");
        dep.origin = DependencyOrigin::Module { path, is_component };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;

    fn analyze(code: &str) -> Result<ScriptAnalysis> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, crate::transform::source_type()).parse();
        analyze_script(&ret.program, code)
    }

    fn exports(code: &str) -> ModuleExports {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, crate::transform::source_type()).parse();
        analyze_module_exports(&ret.program)
    }

    #[test]
    fn test_collects_reactive_declarations() {
        let result =
            analyze("let count = $state(0); const double = $derived(count * 2); let plain = 1;")
                .unwrap();
        assert!(result.reactive.contains("count"));
        assert!(result.reactive.contains("double"));
        assert!(!result.reactive.contains("plain"));
    }

    #[test]
    fn test_props_table() {
        let result = analyze(
            "let { label, count = 5, value = $bindable(), other: renamed = 'x' } = $props();",
        )
        .unwrap();
        assert_eq!(result.props.len(), 4);
        assert_eq!(result.props[0].default, None);
        assert_eq!(result.props[1].default.as_deref(), Some("5"));
        assert!(result.props[2].bindable);
        assert_eq!(result.props[2].default, None);
        assert_eq!(result.props[3].name, "other");
        assert_eq!(result.props[3].local, "renamed");
        assert_eq!(result.props[3].default.as_deref(), Some("'x'"));
    }

    #[test]
    fn test_props_must_be_destructured() {
        let err = analyze("let props = $props();").unwrap_err();
        assert!(err.message.contains("must be destructured"), "{}", err.message);
        assert!(err.span.is_some());
    }

    #[test]
    fn test_nested_prop_pattern_rejected() {
        let err = analyze("let { a: { b } } = $props();").unwrap_err();
        assert!(err.message.contains("individual bindings"));
    }

    #[test]
    fn test_dependencies_grouped_by_source() {
        let result = analyze(
            "import Gtk from 'gi://Gtk?version=4.0';\n\
             import { a } from './store.js';\n\
             import { b as c } from './store.js';\n\
             import Button from './Button.svelte';",
        )
        .unwrap();
        assert_eq!(result.dependencies.len(), 3);
        assert_eq!(
            result.dependencies[0].origin,
            DependencyOrigin::Toolkit {
                namespace: "Gtk".to_string(),
                version: Some("4.0".to_string())
            }
        );
        let store = &result.dependencies[1];
        assert_eq!(store.specifiers.len(), 2);
        assert_eq!(store.specifiers[1].local, "c");
        assert_eq!(store.specifiers[1].imported, "b");
        assert_eq!(result.dependencies[2].specifiers[0].imported, "default");
    }

    #[test]
    fn test_reactive_exports_declaration_and_specifier() {
        let result = exports(
            "export let count = $state(0);\n\
             let total = $state(1);\n\
             let plain = 2;\n\
             export { total as sum, plain };",
        );
        assert!(result.reactive.contains("count"));
        assert!(result.reactive.contains("sum"));
        assert!(!result.reactive.contains("total"));
        assert!(!result.reactive.contains("plain"));
    }

    #[test]
    fn test_reexport_edges() {
        let result = exports(
            "import { count } from './a.js';\n\
             export { count as total };\n\
             export { other as renamed } from './b.js';",
        );
        assert_eq!(result.reexports.len(), 2);
        assert_eq!(result.reexports[0].exported, "total");
        assert_eq!(result.reexports[0].imported, "count");
        assert_eq!(result.reexports[1].source, "./b.js");
        assert_eq!(result.reexports[1].imported, "other");
    }

    #[test]
    fn test_propagation_reaches_fixed_point() {
        let a = PathBuf::from("/p/a.js");
        let b = PathBuf::from("/p/b.js");
        let c = PathBuf::from("/p/c.js");
        let mut map = HashMap::new();
        map.insert(a.clone(), HashSet::from(["count".to_string()]));
        // c depends on b, listed before b depends on a
        let edges = vec![
            ReexportEdge {
                module: c.clone(),
                exported: "final_name".to_string(),
                source: b.clone(),
                imported: "total".to_string(),
            },
            ReexportEdge {
                module: b.clone(),
                exported: "total".to_string(),
                source: a,
                imported: "count".to_string(),
            },
        ];
        propagate_reactive_exports(&mut map, &edges);
        assert!(map[&b].contains("total"));
        assert!(map[&c].contains("final_name"));
        assert!(!map[&c].contains("count"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/src/components/../lib/./x.js")),
            PathBuf::from("/src/lib/x.js")
        );
    }

    #[test]
    fn test_classify_builtin() {
        assert_eq!(
            classify_source("system"),
            DependencyOrigin::Builtin {
                name: "system".to_string()
            }
        );
        assert_eq!(classify_source("../x.js"), DependencyOrigin::Relative);
    }

    #[test]
    fn test_unresolved_import_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("App.svelte");
        let mut deps = vec![Dependency::new("./Missing.svelte", Span::new(3, 20))];
        let err = resolve_dependencies(&file, &mut deps).unwrap_err();
        assert!(err.message.contains("./Missing.svelte"));
        assert_eq!(err.span, Some(Span::new(3, 20)));
    }

    #[test]
    fn test_resolve_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("store.js"), "").unwrap();
        let file = dir.path().join("App.svelte");
        let mut deps = vec![Dependency::new("./store", Span::default())];
        resolve_dependencies(&file, &mut deps).unwrap();
        assert_eq!(
            deps[0].origin,
            DependencyOrigin::Module {
                path: dir.path().join("store.js"),
                is_component: false
            }
        );
    }
}
