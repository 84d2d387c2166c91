//! Binding Update Phase
//!
//! Groups the recorded bindings by target site and synthesizes one refresh procedure
//! per site plus one `update_<var>` entry point per observable variable.

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{BinaryOp, ComponentDef, VarDecl};
use crate::pipeline::compilation::ComponentCompilationJob;
use crate::pipeline::dependencies::DependencySet;
use crate::pipeline::ingest::site_op;
use crate::pipeline::ir::{
    update_procedure_name, Binding, BranchPath, BranchRef, ChildInstance, Expr, IfId,
    InstanceAction, NodeId, NodeRef, Procedure, ProcedureKind, PropValue, SiteKind, Stmt,
};

/// All bindings that write one site, merged
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGroup {
    pub procedure: String,
    pub node: NodeId,
    pub site: SiteKind,
    pub value: Expr,
    pub deps: DependencySet,
    pub branches: BranchPath,
}

impl SiteGroup {
    pub fn owner(&self) -> Option<BranchRef> {
        self.branches.last().copied()
    }
}

/// Name of the refresh procedure of one site
pub fn site_procedure_name(node: NodeId, site: &SiteKind) -> String {
    format!("_update_el{}_{}", node.as_usize(), site.suffix())
}

/// Merges bindings keyed by (node, site, owning branch), in first-seen order.
pub fn group_bindings(bindings: &[Binding]) -> Vec<SiteGroup> {
    let mut groups: IndexMap<(NodeId, SiteKind, Option<BranchRef>), SiteGroup> = IndexMap::new();
    for binding in bindings {
        let key = (binding.node, binding.site.clone(), binding.owner());
        groups
            .entry(key)
            .and_modify(|group| group.deps.extend(&binding.deps))
            .or_insert_with(|| SiteGroup {
                procedure: site_procedure_name(binding.node, &binding.site),
                node: binding.node,
                site: binding.site.clone(),
                value: binding.value.clone(),
                deps: binding.deps.clone(),
                branches: binding.branches.clone(),
            });
    }
    groups.into_values().collect()
}

/// Conjunction of every branch state on the path, outermost first
pub fn chain_guard(branches: &[BranchRef]) -> Option<Expr> {
    branches
        .iter()
        .map(|branch| Expr::branch_guard(branch.region, branch.branch.is_then()))
        .reduce(|acc, guard| Expr::binary(BinaryOp::And, acc, guard))
}

/// `body` behind the path's guard, or `body` itself at the top level
pub fn guard_with_chain(branches: &[BranchRef], body: Vec<Stmt>) -> Vec<Stmt> {
    match chain_guard(branches) {
        Some(cond) => vec![Stmt::guarded(cond, body)],
        None => body,
    }
}

/// Calls grouped under their owner's region state: unguarded calls first, then one
/// `if/else` per owning region.
pub fn branch_grouped_calls(
    owned_calls: impl IntoIterator<Item = (Option<BranchRef>, String)>,
) -> Vec<Stmt> {
    let mut unguarded = Vec::new();
    let mut by_region: IndexMap<IfId, (Vec<Stmt>, Vec<Stmt>)> = IndexMap::new();
    for (owner, procedure) in owned_calls {
        match owner {
            None => unguarded.push(Stmt::call(procedure)),
            Some(branch) => {
                let sides = by_region.entry(branch.region).or_default();
                if branch.branch.is_then() {
                    sides.0.push(Stmt::call(procedure));
                } else {
                    sides.1.push(Stmt::call(procedure));
                }
            }
        }
    }
    let mut body = unguarded;
    for (region, (then_body, else_body)) in by_region {
        if then_body.is_empty() {
            body.push(Stmt::guarded(Expr::branch_guard(region, false), else_body));
        } else {
            body.push(Stmt::If {
                cond: Expr::IfState(region),
                then_body,
                else_body,
            });
        }
    }
    body
}

/// Observable from outside: a mutable prop, or a public mutable state variable
pub fn is_observable(component: &ComponentDef, decl: &VarDecl) -> bool {
    decl.is_mutable() && (decl.is_public() || component.param(&decl.name).is_some())
}

/// Child props that read `variable`: value props are copied again, then the child's
/// own update entry point runs.
pub fn child_refresh(children: &[ChildInstance], variable: &str) -> Vec<Stmt> {
    let mut body = Vec::new();
    for child in children {
        let mut calls = Vec::new();
        for prop in &child.props {
            if !prop.deps.contains_var(variable) {
                continue;
            }
            match &prop.value {
                PropValue::Value(_) => {
                    calls.push(Stmt::instance(
                        child.slot.instance.clone(),
                        InstanceAction::SetProp {
                            prop: prop.name.clone(),
                            value: prop.value.clone(),
                        },
                    ));
                }
                PropValue::Reference(_) => {}
                PropValue::Callback(_) => continue,
            }
            calls.push(Stmt::instance(
                child.slot.instance.clone(),
                InstanceAction::Update(prop.name.clone()),
            ));
        }
        if !calls.is_empty() {
            body.extend(guard_with_chain(&child.branches, calls));
        }
    }
    body
}

pub fn synthesize_updates(job: &mut ComponentCompilationJob) {
    let groups = group_bindings(&job.bindings);
    debug!(
        component = %job.component_name(),
        bindings = job.bindings.len(),
        sites = groups.len(),
        "bindings grouped"
    );

    for group in &groups {
        let write = Stmt::op(site_op(&NodeRef::Slot(group.node), &group.site, group.value.clone()));
        let body = guard_with_chain(&group.branches, vec![write]);
        job.add_procedure(Procedure::new(
            group.procedure.clone(),
            ProcedureKind::UpdateSite,
            body,
        ));
    }

    let component = job.component;
    for decl in component.variables() {
        let name = decl.name.as_str();
        let observable = is_observable(component, decl);
        let is_prop = component.param(name).is_some();

        let mut body = branch_grouped_calls(
            groups
                .iter()
                .filter(|group| group.deps.contains_var(name))
                .map(|group| (group.owner(), group.procedure.clone())),
        );
        body.extend(child_refresh(&job.children, name));

        if body.is_empty() && !observable && !is_prop && !decl.is_public() {
            continue;
        }
        if observable {
            body.push(Stmt::NotifyChange(name.to_string()));
        }
        debug!(variable = name, statements = body.len(), "update procedure synthesized");
        job.add_procedure(Procedure::new(
            update_procedure_name(name),
            ProcedureKind::UpdateVariable(name.to_string()),
            body,
        ));
    }
}
