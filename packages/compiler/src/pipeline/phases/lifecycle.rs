//! Lifecycle Phase
//!
//! `view`, `_rebind`, `_destroy`, `_remove_view` and `_get_root_element`, plus the
//! change callbacks wired into child instances.

use tracing::debug;

use super::batched;
use super::bindings::{branch_grouped_calls, child_refresh, group_bindings, is_observable, SiteGroup};
use super::conditionals::{register_handlers, teardown_nested_if};
use super::loops::{detach_owned, teardown_loop};
use crate::ast::{change_callback_name, LifecycleHook};
use crate::pipeline::compilation::ComponentCompilationJob;
use crate::pipeline::dependencies::MemberDependency;
use crate::pipeline::ir::{
    sync_if_name, sync_loop_name, Collection, Expr, InstanceAction, InstanceRef, LoopItem, NodeId,
    NodeRef, Op, Param, Procedure, ProcedureKind, PropValue, Stmt,
};

pub const VIEW: &str = "view";
pub const REBIND: &str = "_rebind";
pub const DESTROY: &str = "_destroy";
pub const REMOVE_VIEW: &str = "_remove_view";
pub const GET_ROOT_ELEMENT: &str = "_get_root_element";

/// Nodes attached straight to the `view` parent, in creation order
fn root_nodes(job: &ComponentCompilationJob) -> Vec<NodeRef> {
    job.view_body
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Op(Op::AppendChild {
                parent: NodeRef::Parent,
                node,
            }) => Some(node.clone()),
            _ => None,
        })
        .collect()
}

/// Refresh of `variable` from a child's change callback. The notifying child is
/// skipped so the callback never re-enters it.
fn refresh_from_child(
    job: &ComponentCompilationJob,
    groups: &[SiteGroup],
    variable: &str,
    source: &InstanceRef,
) -> Vec<Stmt> {
    let mut body = branch_grouped_calls(
        groups
            .iter()
            .filter(|group| group.deps.contains_var(variable))
            .map(|group| (group.owner(), group.procedure.clone())),
    );
    let others: Vec<_> = job
        .children
        .iter()
        .filter(|child| &child.slot.instance != source)
        .cloned()
        .collect();
    body.extend(child_refresh(&others, variable));
    body.extend(region_syncs(job, |deps| deps.contains_var(variable)));
    if job
        .component
        .variable(variable)
        .is_some_and(|decl| is_observable(job.component, decl))
    {
        body.push(Stmt::NotifyChange(variable.to_string()));
    }
    body
}

fn region_syncs(
    job: &ComponentCompilationJob,
    depends: impl Fn(&crate::pipeline::dependencies::DependencySet) -> bool,
) -> Vec<Stmt> {
    let mut body = Vec::new();
    for region in &job.if_regions {
        if depends(&region.deps) {
            body.push(Stmt::call(sync_if_name(region.id)));
        }
    }
    for region in &job.loop_regions {
        if region.member_collection().is_none() && depends(&region.deps) {
            body.push(Stmt::call(sync_loop_name(region.id)));
        }
    }
    body
}

/// Member pairs read from component-typed variables, in first-seen order
fn child_member_dependencies(job: &ComponentCompilationJob) -> Vec<MemberDependency> {
    let mut found: Vec<MemberDependency> = Vec::new();
    let sets = job
        .bindings
        .iter()
        .map(|binding| &binding.deps)
        .chain(job.if_regions.iter().map(|region| &region.deps))
        .chain(job.loop_regions.iter().map(|region| &region.deps));
    for deps in sets {
        for dep in &deps.members {
            let is_child = job
                .component
                .variable(&dep.object)
                .is_some_and(|decl| job.unit.component(&decl.ty).is_some());
            if is_child && !found.contains(dep) {
                found.push(dep.clone());
            }
        }
    }
    found
}

/// Change callbacks on children: mutable reference props and member reads.
fn wire_callbacks(job: &ComponentCompilationJob) -> Vec<Stmt> {
    let groups = group_bindings(&job.bindings);
    let mut body = Vec::new();

    for child in &job.children {
        for prop in &child.props {
            if !matches!(prop.value, PropValue::Reference(_)) || !prop.child_mutable {
                continue;
            }
            let mut callback = Vec::new();
            for variable in &prop.deps.vars {
                callback.extend(refresh_from_child(job, &groups, variable, &child.slot.instance));
            }
            body.push(Stmt::instance(
                child.slot.instance.clone(),
                InstanceAction::WireCallback {
                    callback: change_callback_name(&prop.name),
                    body: callback,
                },
            ));
        }
    }

    for dep in child_member_dependencies(job) {
        let mut callback = branch_grouped_calls(
            groups
                .iter()
                .filter(|group| group.deps.contains_member(&dep.object, &dep.member))
                .map(|group| (group.owner(), group.procedure.clone())),
        );
        callback.extend(region_syncs(job, |deps| {
            deps.contains_member(&dep.object, &dep.member)
        }));
        if callback.is_empty() {
            continue;
        }
        body.push(Stmt::instance(
            InstanceRef::Named(dep.object.clone()),
            InstanceAction::WireCallback {
                callback: change_callback_name(&dep.member),
                body: callback,
            },
        ));
    }
    body
}

fn hook_call(job: &ComponentCompilationJob, hook: LifecycleHook) -> Option<Stmt> {
    job.component
        .hook(hook)
        .map(|_| Stmt::call(hook.procedure_name()))
}

fn view(job: &ComponentCompilationJob) -> Procedure {
    let mut body = Vec::new();
    body.extend(hook_call(job, LifecycleHook::Init));
    body.extend(batched(job, job.view_body.clone()));
    body.extend(register_handlers(job, None));
    body.extend(wire_callbacks(job));
    body.extend(hook_call(job, LifecycleHook::Mount));
    Procedure::new(VIEW, ProcedureKind::View, body).with_param(Param::new("parent", "node"))
}

fn rebind(job: &ComponentCompilationJob) -> Procedure {
    let mut body = register_handlers(job, None);
    body.extend(wire_callbacks(job));
    for child in &job.children {
        body.push(Stmt::instance(child.slot.instance.clone(), InstanceAction::Rebind));
    }
    for region in &job.loop_regions {
        if let LoopItem::Components { collection } = &region.item {
            body.push(Stmt::ForRange {
                var: "_k".to_string(),
                start: Expr::Int(0),
                end: Expr::LoopCount(region.id),
                reverse: false,
                body: vec![Stmt::instance(
                    InstanceRef::item(collection.clone(), Expr::local("_k")),
                    InstanceAction::Rebind,
                )],
            });
        }
    }
    Procedure::new(REBIND, ProcedureKind::Rebind, body)
}

/// Teardown shared by `_destroy` and `_remove_view`. The latter keeps owned
/// instances, static and looped, and leaves node removal to `bulk`.
fn teardown(job: &ComponentCompilationJob, keep_children: bool) -> Vec<Stmt> {
    let mut top_level_nodes: Vec<NodeId> = Vec::new();
    for handler in job.handlers.iter().filter(|h| h.branches.is_empty()) {
        if !top_level_nodes.contains(&handler.node) {
            top_level_nodes.push(handler.node);
        }
    }
    let mut body = super::conditionals::unregister_handlers(job, &top_level_nodes);

    for region in job.if_regions.iter().filter(|r| r.enclosing.is_empty()) {
        body.extend(teardown_nested_if(job, region.id));
    }
    for region in job.loop_regions.iter().filter(|r| r.enclosing.is_empty()) {
        match &region.item {
            LoopItem::Components {
                collection: collection @ Collection::Owned { .. },
            } if keep_children => body.extend(detach_owned(region, collection)),
            _ => body.extend(teardown_loop(job, region)),
        }
    }
    for child in job.children.iter().filter(|c| c.branches.is_empty()) {
        let action = if child.slot.owned && !keep_children {
            InstanceAction::Destroy
        } else {
            InstanceAction::RemoveView { bulk: false }
        };
        body.push(Stmt::instance(child.slot.instance.clone(), action));
    }
    body
}

fn remove_roots(job: &ComponentCompilationJob) -> Vec<Stmt> {
    root_nodes(job)
        .into_iter()
        .map(|node| Stmt::op(Op::RemoveNode { node }))
        .collect()
}

fn destroy(job: &ComponentCompilationJob) -> Procedure {
    let mut body = teardown(job, false);
    body.extend(remove_roots(job));
    Procedure::new(DESTROY, ProcedureKind::Destroy, body)
}

fn remove_view(job: &ComponentCompilationJob) -> Procedure {
    let mut body = teardown(job, true);
    let roots = remove_roots(job);
    if !roots.is_empty() {
        body.push(Stmt::guarded(Expr::not(Expr::local("bulk")), roots));
    }
    Procedure::new(REMOVE_VIEW, ProcedureKind::RemoveView, body)
        .with_param(Param::new("bulk", "bool"))
}

/// First visible root; a region anchor resolves to the live branch's first node.
fn get_root_element(job: &ComponentCompilationJob) -> Procedure {
    let body = match root_nodes(job).into_iter().next() {
        Some(NodeRef::IfAnchor(id)) => {
            let region = job.if_region(id);
            let first = |branch: &crate::pipeline::ir::BranchLedger| {
                branch
                    .creation
                    .iter()
                    .find_map(|stmt| match stmt {
                        Stmt::Op(Op::InsertBefore {
                            parent: NodeRef::IfParent(p),
                            node,
                            ..
                        }) if *p == id => Some(node.clone()),
                        _ => None,
                    })
                    .unwrap_or(NodeRef::IfAnchor(id))
            };
            vec![Stmt::If {
                cond: Expr::IfState(id),
                then_body: vec![Stmt::ReturnNode(first(&region.then_branch))],
                else_body: vec![Stmt::ReturnNode(first(&region.else_branch))],
            }]
        }
        Some(node) => vec![Stmt::ReturnNode(node)],
        None => vec![Stmt::ReturnNode(NodeRef::Parent)],
    };
    Procedure::new(GET_ROOT_ELEMENT, ProcedureKind::GetRootElement, body)
}

pub fn synthesize_lifecycle(job: &mut ComponentCompilationJob) {
    let procedures = [
        view(job),
        rebind(job),
        destroy(job),
        remove_view(job),
        get_root_element(job),
    ];
    debug!(
        component = %job.component_name(),
        handlers = job.handlers.len(),
        children = job.children.len(),
        "lifecycle synthesized"
    );
    for procedure in procedures {
        job.add_procedure(procedure);
    }
}
