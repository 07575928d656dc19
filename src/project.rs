//! Project build.
//!
//! Pass one reads and analyzes every source file sequentially and settles the
//! project-wide reactive-export table. Pass two compiles every file in
//! parallel against that read-only table. Output is written only when every
//! file compiled.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analyze::{
    analyze_module_exports, is_relative, normalize_path, propagate_reactive_exports,
    resolve_import, ModuleExports, ReexportEdge,
};
use crate::assemble::mangle_filepath;
use crate::component::{compile_component, CompileContext};
use crate::config::BuildConfig;
use crate::discovery::{discover_sources, SourceFile, SourceKind};
use crate::error::{CompileError, ErrorKind, Result};
use crate::module::compile_module;
use crate::parse::parse_component;
use crate::template::{ScriptLang, Span};
use crate::transform::{parse_program, script_source_type};

/// The reactive runtime every compiled module imports as `imports.runtime`.
pub const RUNTIME_JS: &str = include_str!("../runtime/runtime.js");

/// Name of the runtime module in both the source and output directories.
pub const RUNTIME_FILE: &str = "runtime.js";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltModule {
    pub source: PathBuf,
    pub output: PathBuf,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub out_dir: PathBuf,
    pub modules: Vec<BuiltModule>,
    /// Where the runtime was written, if it was.
    pub runtime: Option<PathBuf>,
}

struct Unit {
    file: SourceFile,
    source: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile every source file under `config.src_dir` into `config.out_dir`.
pub fn build_project(config: &BuildConfig) -> Result<BuildReport> {
    let config = config.absolute()?;
    if config.src_dir.starts_with(&config.out_dir) {
        return Err(CompileError::new(
            ErrorKind::Io,
            format!(
                "Output directory {} would overwrite the source directory.",
                config.out_dir.display()
            ),
            None,
        ));
    }

    let project_runtime = config.src_dir.join(RUNTIME_FILE);
    let ships_runtime = project_runtime.is_file();
    let skip: &[&str] = if ships_runtime { &[RUNTIME_FILE] } else { &[] };

    let units = discover_sources(&config.src_dir, skip)?
        .into_iter()
        .map(|file| {
            let source = fs::read_to_string(&file.path).map_err(|e| CompileError::io(&file.path, &e))?;
            Ok(Unit { file, source })
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!("pass one: analyzing {} files", units.len());
    let reactive_exports = collect_reactive_exports(&units)?;

    log::debug!("pass two: compiling {} files", units.len());
    let ctx = CompileContext::new(&config.src_dir, &reactive_exports);
    let outputs = units
        .par_iter()
        .map(|unit| compile_source(&unit.file, &unit.source, &ctx))
        .collect::<Vec<_>>()
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    reset_dir(&config.out_dir)?;
    let mut modules = Vec::with_capacity(units.len());
    for (unit, code) in units.iter().zip(outputs) {
        let output = config
            .out_dir
            .join(format!("{}.js", mangle_filepath(&unit.file.path, &config.src_dir)));
        fs::write(&output, code).map_err(|e| CompileError::io(&output, &e))?;
        modules.push(BuiltModule {
            source: unit.file.path.clone(),
            output,
            kind: unit.file.kind,
        });
    }

    let runtime_out = config.out_dir.join(RUNTIME_FILE);
    let runtime = if ships_runtime {
        fs::copy(&project_runtime, &runtime_out).map_err(|e| CompileError::io(&project_runtime, &e))?;
        Some(runtime_out)
    } else if config.write_runtime {
        fs::write(&runtime_out, RUNTIME_JS).map_err(|e| CompileError::io(&runtime_out, &e))?;
        Some(runtime_out)
    } else {
        None
    };

    log::info!(
        "compiled {} modules into {}",
        modules.len(),
        config.out_dir.display()
    );
    Ok(BuildReport {
        out_dir: config.out_dir,
        modules,
        runtime,
    })
}

/// Compile a single file without consulting the reactive exports of its
/// siblings. Imports still have to resolve inside `src_dir`.
pub fn compile_file(path: &Path, src_dir: &Path) -> Result<String> {
    let cwd = std::env::current_dir().map_err(|e| CompileError::io(Path::new("."), &e))?;
    let path = normalize_path(&cwd.join(path));
    let src_dir = normalize_path(&cwd.join(src_dir));

    let kind = SourceKind::of(&path).ok_or_else(|| {
        CompileError::new(
            ErrorKind::Io,
            "Unsupported file type. Expected .svelte, .js or .ts.",
            None,
        )
        .with_file(&path)
    })?;
    let source = fs::read_to_string(&path).map_err(|e| CompileError::io(&path, &e))?;

    let reactive_exports = HashMap::new();
    let ctx = CompileContext::new(&src_dir, &reactive_exports);
    compile_source(&SourceFile { path, kind }, &source, &ctx)
}

fn compile_source(file: &SourceFile, source: &str, ctx: &CompileContext) -> Result<String> {
    match file.kind {
        SourceKind::Component => compile_component(&file.path, source, ctx),
        SourceKind::Script | SourceKind::TypeScript => compile_module(&file.path, source, ctx),
    }
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| CompileError::io(dir, &e))?;
    }
    fs::create_dir_all(dir).map_err(|e| CompileError::io(dir, &e))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS ONE
// ═══════════════════════════════════════════════════════════════════════════════

fn collect_reactive_exports(units: &[Unit]) -> Result<HashMap<PathBuf, HashSet<String>>> {
    let mut table = HashMap::new();
    let mut edges = Vec::new();

    for unit in units {
        let path = &unit.file.path;
        let (exports, base) = module_exports(unit).map_err(|e| e.with_file(path))?;
        for reexport in exports.reexports {
            match resolve_import(path, &reexport.source) {
                Some(source) => edges.push(ReexportEdge {
                    module: path.clone(),
                    exported: reexport.exported,
                    source,
                    imported: reexport.imported,
                }),
                None if is_relative(&reexport.source) => {
                    return Err(CompileError::analysis(
                        format!(
                            "Cannot resolve import '{}' from {}.",
                            reexport.source,
                            path.display()
                        ),
                        reexport.span,
                    )
                    .offset(base)
                    .with_file(path));
                }
                None => {}
            }
        }
        log::debug!(
            "analyzed {} ({} reactive exports)",
            path.display(),
            exports.reactive.len()
        );
        table.insert(path.clone(), exports.reactive);
    }

    propagate_reactive_exports(&mut table, &edges);
    Ok(table)
}

/// Export analysis for one file, plus the offset of the analyzed script
/// inside the file.
fn module_exports(unit: &Unit) -> Result<(ModuleExports, u32)> {
    let allocator = Allocator::default();
    match unit.file.kind {
        SourceKind::Component => {
            let root = parse_component(&unit.source)?;
            let Some(instance) = root.instance else {
                return Ok((ModuleExports::default(), 0));
            };
            let program = parse_program(
                &allocator,
                &instance.content,
                script_source_type(instance.lang == ScriptLang::Ts),
                instance.span,
            )?;
            Ok((analyze_module_exports(&program), instance.content_start))
        }
        SourceKind::Script | SourceKind::TypeScript => {
            let program = parse_program(
                &allocator,
                &unit.source,
                script_source_type(unit.file.kind == SourceKind::TypeScript),
                Span::new(0, unit.source.len() as u32),
            )?;
            Ok((analyze_module_exports(&program), 0))
        }
    }
}
