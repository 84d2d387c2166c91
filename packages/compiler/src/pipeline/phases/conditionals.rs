//! Conditionals Phase
//!
//! One `_sync_if_<id>` state machine per if-region. A call with an unchanged condition
//! returns before touching anything; a transition tears down the live branch, builds
//! the other one before the region anchor and stores the new state.

use std::collections::BTreeSet;

use tracing::debug;

use super::batched;
use super::bindings::chain_guard;
use super::lifecycle::REBIND;
use super::loops::teardown_loop;
use crate::ast::BinaryOp;
use crate::pipeline::compilation::ComponentCompilationJob;
use crate::pipeline::ir::{
    sync_if_name, Branch, BranchRef, ComponentSlot, EventKind, Expr, Handler, IfId, IfRegion,
    InstanceAction, LoopId, NodeId, NodeRef, Op, Procedure, ProcedureKind, Stmt,
};

const NEW_STATE: &str = "_new_state";

/// What one branch owns itself, nested regions excluded
struct DirectOwnership {
    elements: Vec<NodeId>,
    components: Vec<ComponentSlot>,
    loops: Vec<LoopId>,
    ifs: Vec<IfId>,
    /// Nodes attached straight to the region parent
    top_level: Vec<NodeRef>,
}

fn direct_ownership(job: &ComponentCompilationJob, id: IfId, branch: Branch) -> DirectOwnership {
    let region = job.if_region(id);
    let ledger = region.branch(branch);
    let owner = BranchRef::new(id, branch);

    let ifs: Vec<IfId> = ledger
        .ifs
        .iter()
        .copied()
        .filter(|nested| job.if_region(*nested).enclosing.last() == Some(&owner))
        .collect();
    let loops = ledger
        .loops
        .iter()
        .copied()
        .filter(|nested| job.loop_region(*nested).enclosing.last() == Some(&owner))
        .collect();

    let mut nested_elements = BTreeSet::new();
    let mut nested_components = Vec::new();
    for nested in &ifs {
        let nested_region = job.if_region(*nested);
        for side in [&nested_region.then_branch, &nested_region.else_branch] {
            nested_elements.extend(side.elements.iter().copied());
            nested_components.extend(side.components.iter().cloned());
        }
    }
    let elements = ledger
        .elements
        .iter()
        .copied()
        .filter(|node| !nested_elements.contains(node))
        .collect();
    let components = ledger
        .components
        .iter()
        .filter(|slot| !nested_components.contains(*slot))
        .cloned()
        .collect();

    DirectOwnership {
        elements,
        components,
        loops,
        ifs,
        top_level: top_level_nodes(region, branch),
    }
}

fn top_level_nodes(region: &IfRegion, branch: Branch) -> Vec<NodeRef> {
    let parent = NodeRef::IfParent(region.id);
    let mut nodes = Vec::new();
    for stmt in &region.branch(branch).creation {
        if let Stmt::Op(Op::AppendChild { parent: p, node } | Op::InsertBefore { parent: p, node, .. }) = stmt {
            if *p == parent {
                nodes.push(node.clone());
            }
        }
    }
    nodes
}

/// Handler removals for every registered event of `nodes`
pub fn unregister_handlers(job: &ComponentCompilationJob, nodes: &[NodeId]) -> Vec<Stmt> {
    let mut body = Vec::new();
    for node in nodes {
        for event in job.masks.events_of(*node) {
            body.push(Stmt::op(Op::UnregisterHandler {
                node: NodeRef::Slot(*node),
                event,
            }));
        }
    }
    body
}

/// Registrations for every handler on `nodes`, skipping nodes not currently built
pub fn register_handlers(job: &ComponentCompilationJob, nodes: Option<&[NodeId]>) -> Vec<Stmt> {
    let mut body = Vec::new();
    for handler in &job.handlers {
        if nodes.is_some_and(|nodes| !nodes.contains(&handler.node)) {
            continue;
        }
        body.push(Stmt::guarded(
            Expr::NodeValid(NodeRef::Slot(handler.node)),
            vec![register(handler.node, handler.event, &handler.handler)],
        ));
    }
    body
}

fn register(node: NodeId, event: EventKind, handler: &Handler) -> Stmt {
    Stmt::op(Op::RegisterHandler {
        node: NodeRef::Slot(node),
        event,
        handler: handler.clone(),
    })
}

/// Tears down the live content of one branch. Regions nested in it are cleaned by
/// their own state, so each node is removed by its innermost owner only.
pub fn teardown_branch(job: &ComponentCompilationJob, id: IfId, branch: Branch) -> Vec<Stmt> {
    let owned = direct_ownership(job, id, branch);
    let mut body = unregister_handlers(job, &owned.elements);

    for nested in &owned.ifs {
        body.extend(teardown_nested_if(job, *nested));
    }
    for nested in &owned.loops {
        body.extend(teardown_loop(job, job.loop_region(*nested)));
    }
    for slot in &owned.components {
        let action = if slot.owned {
            InstanceAction::Destroy
        } else {
            InstanceAction::RemoveView { bulk: false }
        };
        body.push(Stmt::instance(slot.instance.clone(), action));
    }
    for node in owned.top_level {
        body.push(Stmt::op(Op::RemoveNode { node }));
    }
    body
}

/// Teardown of whichever side a nested region currently shows
pub fn teardown_nested_if(job: &ComponentCompilationJob, id: IfId) -> Vec<Stmt> {
    let then_body = teardown_branch(job, id, Branch::Then);
    let else_body = teardown_branch(job, id, Branch::Else);
    if then_body.is_empty() && else_body.is_empty() {
        return Vec::new();
    }
    vec![Stmt::If {
        cond: Expr::IfState(id),
        then_body,
        else_body,
    }]
}

fn activate(job: &ComponentCompilationJob, region: &IfRegion, branch: Branch) -> Vec<Stmt> {
    let mut body = teardown_branch(job, region.id, branch.opposite());
    let mut creation = region.branch(branch).creation.clone();
    creation.push(Stmt::SetIfState {
        region: region.id,
        value: Expr::Bool(branch.is_then()),
    });
    body.extend(batched(job, creation));
    if !job.handlers.is_empty() {
        if job.config.rebind_after_toggle {
            body.push(Stmt::call(REBIND));
        } else {
            let built = direct_ownership(job, region.id, branch).elements;
            body.extend(register_handlers(job, Some(&built)));
        }
    }
    body
}

fn sync_if(job: &ComponentCompilationJob, region: &IfRegion) -> Vec<Stmt> {
    let mut body = vec![Stmt::guarded(
        Expr::not(Expr::NodeValid(NodeRef::IfAnchor(region.id))),
        vec![Stmt::Return],
    )];
    if let Some(active) = chain_guard(&region.enclosing) {
        body.push(Stmt::guarded(Expr::not(active), vec![Stmt::Return]));
    }
    body.push(Stmt::Let {
        name: NEW_STATE.to_string(),
        value: Expr::Source(region.condition.clone()),
    });
    body.push(Stmt::guarded(
        Expr::binary(
            BinaryOp::Eq,
            Expr::local(NEW_STATE),
            Expr::IfState(region.id),
        ),
        vec![Stmt::Return],
    ));
    body.push(Stmt::If {
        cond: Expr::local(NEW_STATE),
        then_body: activate(job, region, Branch::Then),
        else_body: activate(job, region, Branch::Else),
    });
    body
}

pub fn synthesize_if_syncs(job: &mut ComponentCompilationJob) {
    let procedures: Vec<Procedure> = job
        .if_regions
        .iter()
        .map(|region| {
            debug!(
                region = %region.id,
                then_nodes = region.then_branch.elements.len(),
                else_nodes = region.else_branch.elements.len(),
                "if sync synthesized"
            );
            Procedure::new(
                sync_if_name(region.id),
                ProcedureKind::SyncIf(region.id),
                sync_if(job, region),
            )
        })
        .collect();
    for procedure in procedures {
        job.add_procedure(procedure);
    }
}
