//! Source discovery.
//!
//! Recursively scans the source directory for compilable files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{CompileError, ErrorKind, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Component,
    Script,
    TypeScript,
}

impl SourceKind {
    pub fn of(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.ends_with(".d.ts") {
            return None;
        }
        match path.extension()?.to_str()? {
            "svelte" => Some(SourceKind::Component),
            "js" => Some(SourceKind::Script),
            "ts" => Some(SourceKind::TypeScript),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Every `.svelte`, `.js` and `.ts` file under `src_dir` (declaration files
/// excluded), sorted by path. `skip` names root-level files left out of the
/// build, such as a project-provided `runtime.js`.
pub fn discover_sources(src_dir: &Path, skip: &[&str]) -> Result<Vec<SourceFile>> {
    if !src_dir.is_dir() {
        return Err(CompileError::new(
            ErrorKind::Io,
            format!("Source directory {} does not exist.", src_dir.display()),
            None,
        )
        .with_file(src_dir));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(src_dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src_dir).to_path_buf();
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            CompileError::io(&path, &io)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if entry.depth() == 1 && skip.iter().any(|name| path.file_name().is_some_and(|f| f == *name)) {
            continue;
        }
        if let Some(kind) = SourceKind::of(path) {
            files.push(SourceFile {
                path: path.to_path_buf(),
                kind,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    log::debug!("discovered {} source files in {}", files.len(), src_dir.display());
    Ok(files)
}
