//! Pipeline Module
//!
//! Validation, view lowering and procedure synthesis for component definitions.

pub mod compilation;
pub mod dependencies;
pub mod emit;
pub mod ingest;
pub mod ir;
pub mod ordering;
pub mod phases;
pub mod validate;

use rayon::prelude::*;
use tracing::{info, instrument};

use crate::ast::{CompilationUnit, ComponentDef};
use crate::config::CompilerConfig;
use crate::error::Result;
use crate::schema::MethodSchema;
use compilation::ComponentCompilationJob;
use ir::ComponentProgram;

/// Lowers one component: structural checks, view lowering, then every synthesis phase.
#[instrument(skip_all, fields(component = %component.name))]
pub fn compile_component(
    component: &ComponentDef,
    unit: &CompilationUnit,
    schema: &dyn MethodSchema,
    config: &CompilerConfig,
) -> Result<ComponentProgram> {
    validate::validate_component(component, unit, schema)?;

    let mut job = ComponentCompilationJob::new(component, unit, schema, config);
    ingest::ingest_component(&mut job);
    phases::run(&mut job);

    info!(
        nodes = job.node_count(),
        bindings = job.bindings.len(),
        if_regions = job.if_regions.len(),
        loop_regions = job.loop_regions.len(),
        procedures = job.procedures.len(),
        "component lowered"
    );
    Ok(job.into_program())
}

/// Lowers every component of `unit`, leaves first. Returns all programs or the first error.
#[instrument(skip_all, fields(components = unit.components.len()))]
pub fn compile_unit(
    unit: &CompilationUnit,
    schema: &dyn MethodSchema,
    config: &CompilerConfig,
) -> Result<Vec<ComponentProgram>> {
    let ordered = ordering::order_components(unit)?;
    ordered
        .par_iter()
        .map(|component| compile_component(component, unit, schema, config))
        .collect()
}
