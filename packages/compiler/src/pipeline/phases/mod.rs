//! Pipeline Phases Module
//!
//! Synthesis phases run over a lowered component, in order. Each phase reads the
//! sites recorded by ingest and adds procedures to the job.

pub mod bindings;
pub mod conditionals;
pub mod events;
pub mod lifecycle;
pub mod loops;
pub mod methods;

use tracing::trace;

use super::compilation::ComponentCompilationJob;

type Phase = (&'static str, fn(&mut ComponentCompilationJob));

const PHASES: [Phase; 6] = [
    ("bindings", bindings::synthesize_updates),
    ("conditionals", conditionals::synthesize_if_syncs),
    ("loops", loops::synthesize_loop_syncs),
    ("events", events::synthesize_handlers),
    ("methods", methods::lower_methods),
    ("lifecycle", lifecycle::synthesize_lifecycle),
];

/// Runs every synthesis phase over an ingested job.
pub fn run(job: &mut ComponentCompilationJob) {
    for (name, phase) in PHASES {
        let before = job.procedures.len();
        phase(job);
        trace!(
            phase = name,
            added = job.procedures.len() - before,
            "phase complete"
        );
    }
}

/// `EnterView`/`LeaveView` around `body` when batching is enabled
pub(crate) fn batched(job: &ComponentCompilationJob, body: Vec<super::ir::Stmt>) -> Vec<super::ir::Stmt> {
    if !job.config.batch_flush {
        return body;
    }
    let mut wrapped = Vec::with_capacity(body.len() + 2);
    wrapped.push(super::ir::Stmt::EnterView);
    wrapped.extend(body);
    wrapped.push(super::ir::Stmt::LeaveView);
    wrapped
}
