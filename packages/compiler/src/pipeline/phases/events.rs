//! Events Phase
//!
//! One `_handler_<node>_<event>` procedure per handler on a component-level node.
//! The dispatcher calls it with the event's argument, if any.

use tracing::debug;

use super::methods::lower_statement;
use crate::ast;
use crate::pipeline::compilation::ComponentCompilationJob;
use crate::pipeline::dependencies::LocalScope;
use crate::pipeline::ir::{
    EventArgument, EventHandler, EventKind, Expr, Handler, Param, Procedure, ProcedureKind, Stmt,
};

/// Handler parameter carrying the event argument
pub fn argument_param(event: EventKind) -> Option<Param> {
    match event.argument() {
        EventArgument::None => None,
        EventArgument::Value => Some(Param::new("_value", "string")),
        EventArgument::KeyCode => Some(Param::new("_key", "int")),
    }
}

fn handler_body(job: &ComponentCompilationJob, handler: &EventHandler) -> Vec<Stmt> {
    let param = argument_param(handler.event);
    if let Some(name) = handler.code.as_ident() {
        if let Some(method) = job.component.method(name) {
            let procedure = match method.hook() {
                Some(hook) => hook.procedure_name().to_string(),
                None => method.name.clone(),
            };
            let args = match (&param, method.params.is_empty()) {
                (Some(param), false) => vec![Expr::local(param.name.clone())],
                _ => Vec::new(),
            };
            return vec![Stmt::Call { procedure, args }];
        }
    }

    let stmt = ast::Stmt::Expr(handler.code.clone());
    let scope = match &param {
        Some(param) => LocalScope::with([param.name.clone()]),
        None => LocalScope::new(),
    };
    lower_statement(job, &stmt, &scope)
}

pub fn synthesize_handlers(job: &mut ComponentCompilationJob) {
    let mut procedures = Vec::new();
    for handler in &job.handlers {
        let Handler::Procedure(name) = &handler.handler else {
            continue;
        };
        let mut procedure = Procedure::new(name.clone(), ProcedureKind::Handler, handler_body(job, handler));
        if let Some(param) = argument_param(handler.event) {
            procedure = procedure.with_param(param);
        }
        debug!(procedure = %name, node = %handler.node, "handler synthesized");
        procedures.push(procedure);
    }
    for procedure in procedures {
        job.add_procedure(procedure);
    }
}
