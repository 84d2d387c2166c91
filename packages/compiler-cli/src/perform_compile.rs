//! Perform Compile
//!
//! Input discovery, unit loading and output rendering for `rvc`.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use reactive_view_compiler::ast::CompilationUnit;
use reactive_view_compiler::{
    compile_unit, emit_listing, ComponentProgram, CompilerConfig, DefaultMethodSchema,
};

/// Output rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Text listing of every procedure
    #[default]
    Listing,
    /// One JSON summary object per component
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Files or glob patterns holding serialized compilation units
    pub inputs: Vec<String>,
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Expands input patterns; plain paths that match nothing are reported, not skipped.
pub fn resolve_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let mut matched = false;
        for entry in glob::glob(pattern).with_context(|| format!("invalid pattern `{}`", pattern))? {
            let path = entry?;
            if path.is_file() && !files.contains(&path) {
                files.push(path);
            }
            matched = true;
        }
        if !matched {
            bail!("no input matches `{}`", pattern);
        }
    }
    Ok(files)
}

pub fn parse_unit(content: &str, origin: &Path) -> Result<CompilationUnit> {
    serde_json::from_str(content)
        .with_context(|| format!("failed to decode compilation unit {}", origin.display()))
}

/// Merges every input file into one unit so cross-file instantiations resolve.
pub fn load_unit(files: &[PathBuf]) -> Result<CompilationUnit> {
    let mut unit = CompilationUnit::default();
    for path in files {
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let part = parse_unit(&content, path)?;
        debug!(file = %path.display(), components = part.components.len(), "unit loaded");
        unit.components.extend(part.components);
    }
    Ok(unit)
}

pub fn load_config(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => CompilerConfig::load(path)
            .with_context(|| format!("invalid configuration {}", path.display())),
        None => Ok(CompilerConfig::default()),
    }
}

fn summary(program: &ComponentProgram) -> Value {
    json!({
        "component": program.component,
        "nodes": program.node_count,
        "bindings": program.bindings.len(),
        "ifRegions": program.if_regions.len(),
        "loopRegions": program.loop_regions.len(),
        "hasRoute": program.has_route,
        "procedures": program.procedures.keys().collect::<Vec<_>>(),
    })
}

pub fn render(programs: &[ComponentProgram], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Listing => Ok(programs
            .iter()
            .map(emit_listing)
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let summaries: Vec<Value> = programs.iter().map(summary).collect();
            Ok(serde_json::to_string_pretty(&summaries)?)
        }
    }
}

pub fn compile_source(unit: &CompilationUnit, config: &CompilerConfig) -> Result<Vec<ComponentProgram>> {
    let schema = DefaultMethodSchema::new();
    Ok(compile_unit(unit, &schema, config)?)
}

pub fn perform_compilation(options: &CompileOptions) -> Result<String> {
    let files = resolve_inputs(&options.inputs)?;
    let config = load_config(options.config.as_deref())?;
    let unit = load_unit(&files)?;
    info!(files = files.len(), components = unit.components.len(), "compiling");

    let programs = compile_source(&unit, &config)?;
    render(&programs, options.format)
}
