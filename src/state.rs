//! Per-module compiler state.
//!
//! Owned by exactly one compilation and threaded by `&mut` through lowering
//! and assembly. Nothing here is shared between modules.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::analyze::{Dependency, PropDecl};

#[derive(Debug)]
pub struct CompilerState {
    /// Factory function name, derived from the file stem.
    pub component_name: String,
    /// Module name under `imports`, derived from the path relative to the source root.
    pub mangled_name: String,
    pub source_root: PathBuf,
    pub reactive: HashSet<String>,
    pub props: Vec<PropDecl>,
    /// Keyed by import source as written.
    pub dependencies: BTreeMap<String, Dependency>,

    pub widget_declarations: String,
    pub helper_functions: String,
    pub effects_and_handlers: String,
    pub root_widget: String,

    counters: HashMap<String, usize>,
}

impl CompilerState {
    pub fn new(component_name: &str, mangled_name: &str, source_root: impl Into<PathBuf>) -> Self {
        Self {
            component_name: component_name.to_string(),
            mangled_name: mangled_name.to_string(),
            source_root: source_root.into(),
            reactive: HashSet::new(),
            props: Vec::new(),
            dependencies: BTreeMap::new(),
            widget_declarations: String::new(),
            helper_functions: String::new(),
            effects_and_handlers: String::new(),
            root_widget: String::new(),
            counters: HashMap::new(),
        }
    }

    /// `prefix_0`, `prefix_1`, ... unique within this module.
    pub fn next_name(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{}_{}", prefix, counter);
        *counter += 1;
        name
    }

    pub fn add_dependency(&mut self, dependency: Dependency) {
        match self.dependencies.get_mut(&dependency.source) {
            Some(existing) => {
                for spec in &dependency.specifiers {
                    existing.add_specifier(&spec.local, &spec.imported);
                }
            }
            None => {
                self.dependencies
                    .insert(dependency.source.clone(), dependency);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Span;

    #[test]
    fn test_counters_are_per_prefix() {
        let mut state = CompilerState::new("App", "App", "/src");
        assert_eq!(state.next_name("box"), "box_0");
        assert_eq!(state.next_name("box"), "box_1");
        assert_eq!(state.next_name("label"), "label_0");
        assert_eq!(state.next_name("box"), "box_2");
    }

    #[test]
    fn test_dependencies_merge_specifiers() {
        let mut state = CompilerState::new("App", "App", "/src");
        let mut first = Dependency::new("gi://Gtk?version=4.0", Span::default());
        first.add_specifier("Gtk", "default");
        state.add_dependency(first);
        let mut second = Dependency::new("gi://Gtk?version=4.0", Span::default());
        second.add_specifier("Gtk", "default");
        second.add_specifier("Align", "Align");
        state.add_dependency(second);
        let gtk = &state.dependencies["gi://Gtk?version=4.0"];
        assert_eq!(gtk.specifiers.len(), 2);
    }
}
