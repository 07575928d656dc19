#[cfg(test)]
mod tests {
    use crate::component::{compile_component, CompileContext};
    use crate::error::{ErrorKind, Result};
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::path::{Path, PathBuf};

    const COUNTER: &str = r#"<script>
  let count = $state(0);
  let { step = 1, value = $bindable() } = $props();
  function increment() {
    count += step;
  }
</script>

<box spacing="6">
  <label>Count: {count}</label>
  <button on:click={increment}>Add</button>
</box>
"#;

    fn compile_in(src: &Path, name: &str, source: &str) -> Result<String> {
        compile_with(src, name, source, &HashMap::new())
    }

    fn compile_with(
        src: &Path,
        name: &str,
        source: &str,
        reactive_exports: &HashMap<PathBuf, HashSet<String>>,
    ) -> Result<String> {
        let path = src.join(name);
        fs::write(&path, source).unwrap();
        let ctx = CompileContext::new(src, reactive_exports);
        compile_component(&path, source, &ctx)
    }

    #[test]
    fn test_counter_component_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = compile_in(dir.path(), "Counter.svelte", COUNTER).unwrap();

        assert!(out.starts_with(
            "'use strict';\nimports.gi.versions.Gtk = '4.0';\nconst Gtk = imports.gi.Gtk;\nconst { $state, $get, $set"
        ));
        assert!(out.contains("function Counter(props = {}) {"));
        assert!(out.contains("    const step = $prop(props, \"step\", 1, false);"));
        assert!(out.contains("    const value = $prop(props, \"value\", undefined, true);"));
        assert!(out.contains("let count = $state(0);"));
        assert!(out.contains("$set(count, $get(count) + $get(step))"));
        assert!(!out.contains("$props()"));
        assert!(out.contains("const box_1 = new Gtk.Box({ spacing: 6 });"));
        assert!(out.contains("button_0.connect('clicked', increment);"));
        assert!(out.contains("    return { rootWidget: box_0 };\n}"));
        assert!(out.ends_with("\n\nthis.Counter = Counter;\n"));
    }

    #[test]
    fn test_sections_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let out = compile_in(dir.path(), "Counter.svelte", COUNTER).unwrap();
        let props = out.find("$prop(props, \"step\"").unwrap();
        let script = out.find("let count = $state(0);").unwrap();
        let widgets = out.find("const box_0 = ").unwrap();
        let effects = out.find("$effect(() => { label_0.set_label").unwrap();
        let ret = out.find("return { rootWidget").unwrap();
        assert!(props < script && script < widgets && widgets < effects && effects < ret);
    }

    #[test]
    fn test_component_without_script() {
        let dir = tempfile::tempdir().unwrap();
        let out = compile_in(dir.path(), "Hello.svelte", "<label>Hello</label>").unwrap();
        assert!(out.contains("const Gtk = imports.gi.Gtk;"));
        assert!(out.contains("label_0.set_label(`Hello`);"));
        assert!(out.contains("this.Hello = Hello;"));
    }

    #[test]
    fn test_typescript_script_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let source = r#"<script lang="ts">
  interface Item { id: number }
  let items: Item[] = $state([]);
  function add(id: number): void {
    items.push({ id });
  }
</script>
<label>{items.length}</label>
"#;
        let out = compile_in(dir.path(), "List.svelte", source).unwrap();
        assert!(!out.contains("interface"));
        assert!(!out.contains(": number"));
        assert!(out.contains("$get(items).push({ id }), $notify(items)"));
        assert!(out.contains("`${$get(items).length}`"));
    }

    #[test]
    fn test_imports_are_bound() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path();
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("lib/store.js"), "export const todos = $state([]);").unwrap();
        fs::write(src.join("Row.svelte"), "<label/>").unwrap();

        let source = r#"<script>
  import Gio from 'gi://Gio';
  import Row from './Row.svelte';
  import { todos, helper } from './lib/store';
</script>
<box>
  {#each todos as todo}<Row />{/each}
  <label label={helper()} />
</box>
"#;
        let mut reactive_exports = HashMap::new();
        reactive_exports.insert(
            src.join("lib/store.js"),
            HashSet::from(["todos".to_string()]),
        );
        let out = compile_with(src, "App.svelte", source, &reactive_exports).unwrap();

        assert!(out.contains("const Gio = imports.gi.Gio;"));
        assert!(out.contains("const { Row: Row } = imports.Row;"));
        assert!(out.contains("const { todos, helper } = imports.lib_store;"));
        assert!(out.contains("const each_items_0 = $get(todos) ?? [];"));
        assert!(out.contains("label: helper()"));
        assert!(!out.contains("$get(helper)"));
    }

    #[test]
    fn test_script_gtk_import_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = "<script>\n  import Gtk from 'gi://Gtk?version=4.0';\n</script>\n<box/>";
        let out = compile_in(dir.path(), "App.svelte", source).unwrap();
        assert_eq!(out.matches("const Gtk = imports.gi.Gtk;").count(), 1);
    }

    #[test]
    fn test_unversioned_gtk_import_is_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let source = "<script>\n  import Gtk from 'gi://Gtk';\n</script>\n<box/>";
        let out = compile_in(dir.path(), "App.svelte", source).unwrap();
        assert!(out.contains("imports.gi.versions.Gtk = '4.0';"), "{}", out);
        assert_eq!(out.matches("const Gtk = imports.gi.Gtk;").count(), 1);
    }

    #[test]
    fn test_unresolved_import_reports_file_and_span() {
        let dir = tempfile::tempdir().unwrap();
        let source = "<script>\n  import { x } from './missing.js';\n</script>\n<box/>";
        let err = compile_in(dir.path(), "App.svelte", source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Analysis);
        assert!(err.message.starts_with("Cannot resolve import './missing.js'"));
        assert_eq!(err.file, Some(dir.path().join("App.svelte")));
        let span = err.span.unwrap();
        assert!(source[span.range()].starts_with("import { x }"));
    }

    #[test]
    fn test_quoted_prop_key_is_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let source = "<script>\n  let { \"it's\": owner = 'me' } = $props();\n</script>\n<label label={owner} />";
        let out = compile_in(dir.path(), "Tag.svelte", source).unwrap();
        assert!(out.contains(r#"const owner = $prop(props, "it's", 'me', false);"#), "{}", out);
    }

    #[test]
    fn test_props_must_be_destructured() {
        let dir = tempfile::tempdir().unwrap();
        let source = "<script>\n  let all = $props();\n</script>\n<box/>";
        let err = compile_in(dir.path(), "App.svelte", source).unwrap_err();
        assert!(err.message.contains("must be destructured"));
    }

    #[test]
    fn test_lowering_error_carries_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_in(dir.path(), "Bad.svelte", "<window/>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lowering);
        assert_eq!(err.file, Some(dir.path().join("Bad.svelte")));
    }
}
