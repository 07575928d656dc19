//! Build configuration.
//!
//! Defaults, optionally overridden by a `svelte-gjs.json` file, then by CLI flags.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::normalize_path;
use crate::error::{CompileError, ErrorKind, Result};

pub const CONFIG_FILE: &str = "svelte-gjs.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
    pub src_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Copy the bundled `runtime.js` into the output directory.
    pub write_runtime: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("src"),
            out_dir: PathBuf::from("dist"),
            write_runtime: true,
        }
    }
}

impl BuildConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| CompileError::io(path, &e))?;
        let config: BuildConfig = serde_json::from_str(&content).map_err(|e| {
            CompileError::new(ErrorKind::Io, format!("Invalid JSON config: {}", e), None)
                .with_file(path)
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` when given, else `svelte-gjs.json` in the working directory
    /// when present, else the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.is_file() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Absolute, normalized copies of both directories, so that resolved
    /// import paths and discovered paths compare equal.
    pub fn absolute(&self) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| CompileError::io(Path::new("."), &e))?;
        Ok(Self {
            src_dir: normalize_path(&cwd.join(&self.src_dir)),
            out_dir: normalize_path(&cwd.join(&self.out_dir)),
            write_runtime: self.write_runtime,
        })
    }
}
