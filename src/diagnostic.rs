//! Human-readable rendering of compile errors.

use std::io::{Cursor, IsTerminal, Read};
use std::path::Path;

use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

use crate::error::CompileError;

/// Render `err` against the text of the file it refers to, with colors when
/// stderr is a terminal.
pub fn render(err: &CompileError, source: Option<&str>) -> String {
    render_with(err, source, std::io::stderr().is_terminal())
}

pub fn render_with(err: &CompileError, source: Option<&str>, color: bool) -> String {
    let filename = err
        .file
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<input>".to_string());

    let (Some(span), Some(source)) = (err.span, source) else {
        return match &err.file {
            Some(file) => format!("{} {}\n  --> {}", err.kind.tag(), err.message, file.display()),
            None => err.to_string(),
        };
    };

    let end = (span.end as usize).min(source.len());
    let start = (span.start as usize).min(end);
    let range = start..end;

    let mut bytes = Cursor::new(Vec::new());
    let written = Report::build(ReportKind::Error, (filename.as_str(), range.clone()))
        .with_config(
            Config::default()
                .with_color(color)
                .with_index_type(IndexType::Byte),
        )
        .with_message(err.to_string())
        .with_label(Label::new((filename.as_str(), range)).with_message(&err.message))
        .finish()
        .write((filename.as_str(), Source::from(source)), &mut bytes);
    if written.is_err() {
        return err.to_string();
    }

    let mut out = String::new();
    bytes.set_position(0);
    if bytes.read_to_string(&mut out).is_err() {
        return err.to_string();
    }
    out
}

pub fn success_message(out_dir: &Path) -> String {
    format!(
        "[Success] Compilation successful. Output written to {}",
        out_dir.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Span;

    #[test]
    fn test_render_points_at_span() {
        let source = "<box>\n  <frobnicate />\n</box>";
        let err = CompileError::lowering("Unsupported GTK tag: frobnicate.", Span::new(8, 22))
            .with_file("App.svelte");
        let out = render_with(&err, Some(source), false);
        assert!(out.contains("[GTK Error] Unsupported GTK tag: frobnicate."));
        assert!(out.contains("App.svelte"));
        assert!(out.contains("<frobnicate />"));
    }

    #[test]
    fn test_render_without_span() {
        let err = CompileError::analysis("Module has no default export.", None).with_file("a.js");
        let out = render_with(&err, Some("x"), false);
        assert_eq!(out, "[JS Error] Module has no default export.\n  --> a.js");
    }

    #[test]
    fn test_span_past_end_is_clamped() {
        let err = CompileError::parse("Unexpected end of input.", Span::new(3, 40));
        let out = render_with(&err, Some("<box"), false);
        assert!(out.contains("[Svelte Error]"));
    }

    #[test]
    fn test_success_message() {
        assert_eq!(
            success_message(Path::new("dist")),
            "[Success] Compilation successful. Output written to dist"
        );
    }
}
