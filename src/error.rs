//! Error types for the compiler.
//!
//! Every failure is fatal to the build. Errors carry a category, a message and,
//! when the failing construct is known, a byte span into the original file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::template::Span;

/// Broad category of a compile failure, used to pick the diagnostic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Script analysis or rewriting: bad `$props()` shape, unresolved import, invalid JS.
    Analysis,
    /// Template lowering: unknown tag or attribute, bad child layout, bad binding.
    Lowering,
    /// Markup front end.
    Parse,
    /// Filesystem.
    Io,
}

impl ErrorKind {
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::Analysis => "[JS Error]",
            ErrorKind::Lowering => "[GTK Error]",
            ErrorKind::Parse => "[Svelte Error]",
            ErrorKind::Io => "[File Error]",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{kind} {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub file: Option<PathBuf>,
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            file: None,
        }
    }

    pub fn analysis(message: impl Into<String>, span: impl Into<Option<Span>>) -> Self {
        Self::new(ErrorKind::Analysis, message, span.into())
    }

    pub fn lowering(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lowering, message, Some(span))
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parse, message, Some(span))
    }

    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        let message = match err.kind() {
            std::io::ErrorKind::NotFound => "No such file or directory".to_string(),
            _ => err.to_string(),
        };
        Self::new(ErrorKind::Io, message, None).with_file(path)
    }

    /// Attach the file this error belongs to, unless one is already set.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        if self.file.is_none() {
            self.file = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Move the span of an error raised while parsing a sub-slice of the file
    /// (a script block or a template expression) into file coordinates.
    pub fn offset(mut self, base: u32) -> Self {
        if let Some(span) = self.span.as_mut() {
            span.start += base;
            span.end += base;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_moves_span() {
        let err = CompileError::parse("bad", Span::new(2, 5)).offset(10);
        assert_eq!(err.span, Some(Span::new(12, 15)));
    }

    #[test]
    fn test_with_file_keeps_first_path() {
        let err = CompileError::analysis("x", None)
            .with_file("a.svelte")
            .with_file("b.svelte");
        assert_eq!(err.file, Some(PathBuf::from("a.svelte")));
    }

    #[test]
    fn test_display_includes_category() {
        let err = CompileError::lowering("Unsupported GTK tag: foo.", Span::new(0, 5));
        assert_eq!(err.to_string(), "[GTK Error] Unsupported GTK tag: foo.");
    }

    #[test]
    fn test_io_not_found_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CompileError::io(Path::new("x.svelte"), &io);
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.message, "No such file or directory");
    }
}
