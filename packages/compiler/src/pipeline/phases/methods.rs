//! Method Lowering Phase
//!
//! User methods and inline handler statements become procedure bodies: their
//! statements, with list mutations on arrays behind keyed loops replaced by
//! single-item view patches, followed by the update and sync calls for every
//! variable they write.

use std::collections::HashSet;

use tracing::debug;

use super::batched;
use super::bindings::chain_guard;
use super::lifecycle::REBIND;
use super::loops::{
    clear_loop_parent, drain_owned, rebind_items, render_items, teardown_loop, uses_bulk_clear,
};
use crate::ast::{self, BinaryOp, LifecycleHook, MethodDef};
use crate::pipeline::compilation::ComponentCompilationJob;
use crate::pipeline::dependencies::LocalScope;
use crate::pipeline::ingest::{ITEM_INDEX, ITEM_REF};
use crate::pipeline::ir::{
    sync_if_name, sync_loop_name, update_procedure_name, Collection, Expr, InstanceAction,
    InstanceRef, LoopRegion, NodeRef, Op, Param, Procedure, ProcedureKind, Stmt,
};

const OLD_LEN: &str = "_old_len";
const AT: &str = "_at";

/// A list operation with a dedicated view patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListMutation {
    Push,
    Pop,
    Clear,
}

impl ListMutation {
    fn from_method(name: &str) -> Option<Self> {
        match name {
            "push" | "append" => Some(ListMutation::Push),
            "pop" => Some(ListMutation::Pop),
            "clear" => Some(ListMutation::Clear),
            _ => None,
        }
    }
}

/// Update, `_sync_if_*` and `_sync_loop_*` calls after `written` changed, in
/// declaration order. Each sync runs at most once. Loops over a `patched` array
/// were already updated item by item.
pub fn after_writes(job: &ComponentCompilationJob, written: &[String], patched: &[String]) -> Vec<Stmt> {
    let mut body = Vec::new();
    let mut synced = HashSet::new();
    for decl in job.component.variables() {
        let name = decl.name.as_str();
        if !written.iter().any(|w| w == name) {
            continue;
        }
        let update = update_procedure_name(name);
        if job.procedures.contains_key(&update) {
            body.push(Stmt::call(update));
        }
        for region in &job.if_regions {
            let procedure = sync_if_name(region.id);
            if region.deps.contains_var(name) && synced.insert(procedure.clone()) {
                body.push(Stmt::call(procedure));
            }
        }
        for region in &job.loop_regions {
            let is_patched = patched.iter().any(|p| p == name) && region.list_array() == Some(name);
            if is_patched || region.member_collection() == Some(name) {
                continue;
            }
            let procedure = sync_loop_name(region.id);
            if region.deps.contains_var(name) && synced.insert(procedure.clone()) {
                body.push(Stmt::call(procedure));
            }
        }
    }
    body
}

struct MethodLowering<'j, 'a> {
    job: &'j ComponentCompilationJob<'a>,
}

impl MethodLowering<'_, '_> {
    /// Keyed component loops rendering the array `name`
    fn regions_of(&self, name: &str) -> Vec<&LoopRegion> {
        self.job
            .loop_regions
            .iter()
            .filter(|region| region.member_collection() == Some(name))
            .collect()
    }

    /// Keyed loops of any item kind iterating the array `name`
    fn list_regions(&self, name: &str) -> Vec<&LoopRegion> {
        self.job
            .loop_regions
            .iter()
            .filter(|region| region.list_array() == Some(name))
            .collect()
    }

    /// `arr.push(..)`, `arr.pop()` or `arr.clear()` on an array behind a keyed loop
    fn list_mutation<'s>(&self, stmt: &'s ast::Stmt) -> Option<(&'s str, ListMutation)> {
        let ast::Stmt::Expr(ast::Expr::Call {
            receiver: Some(receiver),
            method,
            ..
        }) = stmt
        else {
            return None;
        };
        let array = receiver.as_ident()?;
        let mutation = ListMutation::from_method(method)?;
        if self.list_regions(array).is_empty() {
            return None;
        }
        Some((array, mutation))
    }

    /// Arrays written by `body` only through patched list mutations
    fn patched_arrays(&self, body: &[ast::Stmt], scope: &LocalScope) -> Vec<String> {
        let mut unpatched = HashSet::new();
        self.collect_unpatched_writes(body, &mut scope.clone(), &mut unpatched);
        self.job
            .extractor()
            .writes(body, scope)
            .into_iter()
            .filter(|name| !unpatched.contains(name) && !self.list_regions(name).is_empty())
            .collect()
    }

    fn collect_unpatched_writes(
        &self,
        body: &[ast::Stmt],
        scope: &mut LocalScope,
        out: &mut HashSet<String>,
    ) {
        for stmt in body {
            match stmt {
                _ if self.list_mutation(stmt).is_some() => {}
                ast::Stmt::Let { name, .. } => scope.bind(name.clone()),
                ast::Stmt::Block(stmts) => {
                    self.collect_unpatched_writes(stmts, &mut scope.clone(), out)
                }
                ast::Stmt::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    for branch in [then_branch, else_branch] {
                        self.collect_unpatched_writes(branch, &mut scope.clone(), out);
                    }
                }
                ast::Stmt::ForRange { var, body, .. } | ast::Stmt::ForEach { var, body, .. } => {
                    self.collect_unpatched_writes(body, &mut scope.child(var.clone()), out)
                }
                _ => out.extend(
                    self.job
                        .extractor()
                        .writes(std::slice::from_ref(stmt), scope),
                ),
            }
        }
    }

    fn lower_body(&self, body: &[ast::Stmt]) -> Vec<Stmt> {
        body.iter().flat_map(|stmt| self.lower_stmt(stmt)).collect()
    }

    fn lower_stmt(&self, stmt: &ast::Stmt) -> Vec<Stmt> {
        if !self.has_shortcut(stmt) {
            return vec![Stmt::Exec(stmt.clone())];
        }
        match stmt {
            ast::Stmt::Expr(_) => match self.list_mutation(stmt) {
                Some((array, mutation)) => self.lower_list_mutation(stmt, array, mutation),
                None => vec![Stmt::Exec(stmt.clone())],
            },
            ast::Stmt::Assign { target, .. } => self.lower_reassignment(stmt, target),
            ast::Stmt::IndexAssign { target, index, .. } => match target.as_ident() {
                Some(array) => self.lower_index_assignment(stmt, array, index),
                None => vec![Stmt::Exec(stmt.clone())],
            },
            ast::Stmt::Block(stmts) => self.lower_body(stmts),
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => vec![Stmt::If {
                cond: Expr::Source(cond.clone()),
                then_body: self.lower_body(then_branch),
                else_body: self.lower_body(else_branch),
            }],
            ast::Stmt::ForRange {
                var,
                start,
                end,
                body,
            } => vec![Stmt::ForRange {
                var: var.clone(),
                start: Expr::Source(start.clone()),
                end: Expr::Source(end.clone()),
                reverse: false,
                body: self.lower_body(body),
            }],
            ast::Stmt::ForEach {
                var,
                iterable,
                body,
            } => vec![Stmt::ForEach {
                var: var.clone(),
                iterable: Expr::Source(iterable.clone()),
                body: self.lower_body(body),
            }],
            _ => vec![Stmt::Exec(stmt.clone())],
        }
    }

    /// Whether `stmt` or anything nested in it has a dedicated view patch.
    fn has_shortcut(&self, stmt: &ast::Stmt) -> bool {
        match stmt {
            ast::Stmt::Expr(_) => self.list_mutation(stmt).is_some(),
            ast::Stmt::Assign { target, .. } => !self.regions_of(target).is_empty(),
            ast::Stmt::IndexAssign { target, .. } => target
                .as_ident()
                .is_some_and(|name| !self.regions_of(name).is_empty()),
            ast::Stmt::Block(stmts) => stmts.iter().any(|s| self.has_shortcut(s)),
            ast::Stmt::If {
                then_branch,
                else_branch,
                ..
            } => then_branch
                .iter()
                .chain(else_branch.iter())
                .any(|s| self.has_shortcut(s)),
            ast::Stmt::ForRange { body, .. } | ast::Stmt::ForEach { body, .. } => {
                body.iter().any(|s| self.has_shortcut(s))
            }
            _ => false,
        }
    }

    /// Loop is mounted and its enclosing branches are live
    fn mounted(region: &LoopRegion) -> Expr {
        let valid = Expr::NodeValid(NodeRef::LoopParent(region.id));
        match chain_guard(&region.enclosing) {
            Some(active) => Expr::binary(BinaryOp::And, valid, active),
            None => valid,
        }
    }

    fn remove_all_views(&self, region: &LoopRegion, collection: &Collection) -> Vec<Stmt> {
        let bulk = uses_bulk_clear(self.job, region);
        let mut body = vec![Stmt::ForRange {
            var: ITEM_INDEX.to_string(),
            start: Expr::Int(0),
            end: Expr::LoopCount(region.id),
            reverse: true,
            body: vec![Stmt::instance(
                InstanceRef::item(collection.clone(), Expr::local(ITEM_INDEX)),
                InstanceAction::RemoveView { bulk },
            )],
        }];
        if bulk {
            body.extend(clear_loop_parent(region.id));
        }
        body.push(Stmt::SetLoopCount {
            region: region.id,
            value: Expr::Int(0),
        });
        body
    }

    fn lower_list_mutation(&self, stmt: &ast::Stmt, array: &str, mutation: ListMutation) -> Vec<Stmt> {
        let mut before = Vec::new();
        let mut after = Vec::new();
        for region in self.list_regions(array) {
            match region.collection() {
                Some(collection @ Collection::Member(_)) => {
                    self.patch_members(region, collection, mutation, &mut before, &mut after)
                }
                owned => self.patch_items(region, array, owned, mutation, &mut before, &mut after),
            }
        }
        debug!(array, ?mutation, "list mutation patched");
        let mut body = before;
        body.push(Stmt::Exec(stmt.clone()));
        body.extend(after);
        body
    }

    /// Items of a loop over a user array of instances the array itself holds
    fn patch_members(
        &self,
        region: &LoopRegion,
        collection: &Collection,
        mutation: ListMutation,
        before: &mut Vec<Stmt>,
        after: &mut Vec<Stmt>,
    ) {
        let len = Expr::Len(collection.clone());
        match mutation {
            ListMutation::Push => {
                before.push(Stmt::Let {
                    name: OLD_LEN.to_string(),
                    value: len.clone(),
                });
                // earlier instances may have moved when the array grew
                let mut patch = vec![rebind_items(collection, Expr::local(OLD_LEN))];
                patch.extend(batched(self.job, self.render_appended(region)));
                patch.push(Stmt::SetLoopCount {
                    region: region.id,
                    value: len,
                });
                after.push(Stmt::guarded(Self::mounted(region), patch));
            }
            ListMutation::Pop => {
                let last = Expr::binary(BinaryOp::Sub, len.clone(), Expr::Int(1));
                before.push(Stmt::guarded(
                    Expr::binary(
                        BinaryOp::And,
                        Self::mounted(region),
                        Expr::binary(BinaryOp::Gt, len, Expr::Int(0)),
                    ),
                    vec![
                        Stmt::instance(
                            InstanceRef::item(collection.clone(), last.clone()),
                            InstanceAction::RemoveView { bulk: false },
                        ),
                        Stmt::SetLoopCount {
                            region: region.id,
                            value: last,
                        },
                    ],
                ));
            }
            ListMutation::Clear => {
                before.push(Stmt::guarded(
                    Self::mounted(region),
                    self.remove_all_views(region, collection),
                ));
            }
        }
    }

    /// Items the loop builds itself: element trees, or instances in owned storage
    fn patch_items(
        &self,
        region: &LoopRegion,
        array: &str,
        owned: Option<&Collection>,
        mutation: ListMutation,
        before: &mut Vec<Stmt>,
        after: &mut Vec<Stmt>,
    ) {
        let size = Expr::Size(Box::new(Expr::Source(ast::Expr::ident(array))));
        match mutation {
            ListMutation::Push => {
                before.push(Stmt::Let {
                    name: OLD_LEN.to_string(),
                    value: size.clone(),
                });
                let mut patch = batched(self.job, self.render_appended(region));
                if let Some(collection) = owned {
                    patch.push(rebind_items(collection, Expr::local(OLD_LEN)));
                }
                patch.push(Stmt::SetLoopCount {
                    region: region.id,
                    value: size,
                });
                if !self.job.handlers.is_empty() {
                    patch.push(Stmt::call(REBIND));
                }
                after.push(Stmt::guarded(Self::mounted(region), patch));
            }
            ListMutation::Pop => {
                let last = Expr::binary(BinaryOp::Sub, Expr::LoopCount(region.id), Expr::Int(1));
                let release = match owned {
                    Some(collection) => drain_owned(collection, last.clone()),
                    None => Stmt::DropItems {
                        region: region.id,
                        from: last.clone(),
                        bulk: false,
                    },
                };
                before.push(Stmt::guarded(
                    Expr::binary(
                        BinaryOp::And,
                        Self::mounted(region),
                        Expr::binary(BinaryOp::Gt, Expr::LoopCount(region.id), Expr::Int(0)),
                    ),
                    vec![
                        release,
                        Stmt::SetLoopCount {
                            region: region.id,
                            value: last,
                        },
                    ],
                ));
            }
            ListMutation::Clear => {
                before.push(Stmt::guarded(
                    Self::mounted(region),
                    teardown_loop(self.job, region),
                ));
            }
        }
    }

    /// Builds the item at `_old_len` in front of the loop anchor.
    fn render_appended(&self, region: &LoopRegion) -> Vec<Stmt> {
        let mut render = vec![
            Stmt::LetNode {
                name: ITEM_REF.to_string(),
                node: NodeRef::LoopAnchor(region.id),
            },
            Stmt::Let {
                name: ITEM_INDEX.to_string(),
                value: Expr::local(OLD_LEN),
            },
        ];
        render.extend(region.create_item.clone());
        render
    }

    /// `arr = other`: remove every old view, assign, render every new item.
    fn lower_reassignment(&self, stmt: &ast::Stmt, array: &str) -> Vec<Stmt> {
        let collection = Collection::Member(array.to_string());
        let regions = self.regions_of(array);
        let mut body = Vec::new();
        for region in &regions {
            body.push(Stmt::guarded(
                Self::mounted(region),
                self.remove_all_views(region, &collection),
            ));
        }
        body.push(Stmt::Exec(stmt.clone()));
        for region in &regions {
            let mut render = batched(
                self.job,
                render_items(region, Expr::Int(0), Expr::Len(collection.clone())),
            );
            render.push(Stmt::SetLoopCount {
                region: region.id,
                value: Expr::Len(collection.clone()),
            });
            body.push(Stmt::guarded(Self::mounted(region), render));
        }
        body
    }

    /// `arr[i] = x`: the instance at `i` is already built; only its root moves.
    fn lower_index_assignment(&self, stmt: &ast::Stmt, array: &str, index: &ast::Expr) -> Vec<Stmt> {
        let collection = Collection::Member(array.to_string());
        let len = Expr::Len(collection.clone());
        let next = Expr::binary(BinaryOp::Add, Expr::local(AT), Expr::Int(1));
        let mut body = vec![
            Stmt::Let {
                name: AT.to_string(),
                value: Expr::Source(index.clone()),
            },
            Stmt::Exec(stmt.clone()),
        ];
        for region in self.regions_of(array) {
            body.push(Stmt::guarded(
                Self::mounted(region),
                vec![
                    Stmt::LetNode {
                        name: ITEM_REF.to_string(),
                        node: NodeRef::LoopAnchor(region.id),
                    },
                    Stmt::guarded(
                        Expr::binary(BinaryOp::Lt, next.clone(), len.clone()),
                        vec![Stmt::LetNode {
                            name: ITEM_REF.to_string(),
                            node: NodeRef::InstanceRoot(InstanceRef::item(
                                collection.clone(),
                                next.clone(),
                            )),
                        }],
                    ),
                    Stmt::op(Op::InsertBefore {
                        parent: NodeRef::LoopParent(region.id),
                        node: NodeRef::InstanceRoot(InstanceRef::item(
                            collection.clone(),
                            Expr::local(AT),
                        )),
                        anchor: NodeRef::Var(ITEM_REF.to_string()),
                    }),
                ],
            ));
        }
        body
    }
}

fn params_of(method: &MethodDef) -> Vec<Param> {
    method
        .params
        .iter()
        .map(|param| Param::new(param.name.clone(), param.ty.clone()))
        .collect()
}

/// Lowers user statements with their list patches, then refreshes what they write.
fn lower_with_refresh(job: &ComponentCompilationJob, body: &[ast::Stmt], scope: &LocalScope) -> Vec<Stmt> {
    let lowering = MethodLowering { job };
    let mut lowered = lowering.lower_body(body);
    let written: Vec<String> = job.extractor().writes(body, scope).into_iter().collect();
    let patched = lowering.patched_arrays(body, scope);
    lowered.extend(after_writes(job, &written, &patched));
    lowered
}

/// An inline handler statement, lowered like a one-statement method
pub(crate) fn lower_statement(
    job: &ComponentCompilationJob,
    stmt: &ast::Stmt,
    scope: &LocalScope,
) -> Vec<Stmt> {
    lower_with_refresh(job, std::slice::from_ref(stmt), scope)
}

fn lower_method(job: &ComponentCompilationJob, method: &MethodDef) -> Procedure {
    let hook = method.hook();
    let (name, kind) = match hook {
        Some(hook) => (hook.procedure_name().to_string(), ProcedureKind::Hook),
        None => (method.name.clone(), ProcedureKind::Method),
    };
    let body = match hook {
        Some(LifecycleHook::Init) | Some(LifecycleHook::Tick) => method
            .body
            .iter()
            .cloned()
            .map(Stmt::Exec)
            .collect(),
        None | Some(LifecycleHook::Mount) => {
            let scope = LocalScope::with(method.params.iter().map(|p| p.name.clone()));
            lower_with_refresh(job, &method.body, &scope)
        }
    };
    let mut procedure = Procedure::new(name, kind, body);
    procedure.params = params_of(method);
    procedure
}

pub fn lower_methods(job: &mut ComponentCompilationJob) {
    let procedures: Vec<Procedure> = job
        .component
        .methods
        .iter()
        .map(|method| lower_method(job, method))
        .collect();
    for procedure in procedures {
        debug!(procedure = %procedure.name, statements = procedure.body.len(), "method lowered");
        job.add_procedure(procedure);
    }
}
