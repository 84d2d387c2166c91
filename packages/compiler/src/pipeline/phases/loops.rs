//! Loop Reconciliation Phase
//!
//! One `_sync_loop_<id>` per loop region. Range loops grow and shrink at the tail;
//! keyed loops refresh in place when the count is unchanged and rebuild otherwise.

use tracing::debug;

use super::batched;
use super::bindings::chain_guard;
use crate::ast::{self, BinaryOp};
use crate::pipeline::compilation::ComponentCompilationJob;
use crate::pipeline::ingest::{ITEM_INDEX, ITEM_REF};
use crate::pipeline::ir::{
    sync_loop_item_name, sync_loop_name, Collection, Expr, InstanceAction, InstanceRef, LoopId,
    LoopItem, LoopRegion, LoopStrategy, NodeKind, NodeRef, Op, Param, Procedure, ProcedureKind,
    Stmt,
};

/// Counter of teardown loops, distinct from the item index
const TEARDOWN_INDEX: &str = "_k";
const NEW_COUNT: &str = "_new";
const OLD_COUNT: &str = "_old";

/// Removes every live item of `region` and resets its count. The loop anchor stays.
pub fn teardown_loop(job: &ComponentCompilationJob, region: &LoopRegion) -> Vec<Stmt> {
    let bulk = uses_bulk_clear(job, region);
    let mut body = Vec::new();
    match &region.item {
        LoopItem::Components { collection } => match collection {
            Collection::Owned { .. } => body.push(drain_owned(collection, Expr::Int(0))),
            Collection::Member(_) => {
                body.push(Stmt::ForRange {
                    var: TEARDOWN_INDEX.to_string(),
                    start: Expr::Int(0),
                    end: Expr::LoopCount(region.id),
                    reverse: true,
                    body: vec![Stmt::instance(
                        InstanceRef::item(collection.clone(), Expr::local(TEARDOWN_INDEX)),
                        InstanceAction::RemoveView { bulk },
                    )],
                });
                if bulk {
                    body.extend(clear_loop_parent(region.id));
                }
            }
        },
        LoopItem::Elements => {
            body.push(Stmt::DropItems {
                region: region.id,
                from: Expr::Int(0),
                bulk,
            });
            if bulk {
                body.extend(clear_loop_parent(region.id));
            }
        }
        LoopItem::Empty => {}
    }
    body.push(Stmt::SetLoopCount {
        region: region.id,
        value: Expr::Int(0),
    });
    body
}

pub fn uses_bulk_clear(job: &ComponentCompilationJob, region: &LoopRegion) -> bool {
    region.only_child && job.config.bulk_clear
}

/// Clears the loop's parent in one operation, then puts the anchor back.
pub fn clear_loop_parent(id: LoopId) -> Vec<Stmt> {
    vec![
        Stmt::op(Op::ClearChildren {
            parent: NodeRef::LoopParent(id),
        }),
        Stmt::op(Op::CreateNode {
            node: NodeRef::LoopAnchor(id),
            kind: NodeKind::Anchor,
        }),
        Stmt::op(Op::AppendChild {
            parent: NodeRef::LoopParent(id),
            node: NodeRef::LoopAnchor(id),
        }),
    ]
}

/// Destroys and pops owned instances `from..`, last first.
pub(crate) fn drain_owned(collection: &Collection, from: Expr) -> Stmt {
    Stmt::ForRange {
        var: TEARDOWN_INDEX.to_string(),
        start: from,
        end: Expr::Len(collection.clone()),
        reverse: true,
        body: vec![
            Stmt::instance(
                InstanceRef::item(collection.clone(), Expr::local(TEARDOWN_INDEX)),
                InstanceAction::Destroy,
            ),
            Stmt::PopInstance {
                collection: collection.clone(),
            },
        ],
    }
}

/// Takes owned instances off the page without destroying them and resets the
/// count. They stay in their storage for the next `view`.
pub fn detach_owned(region: &LoopRegion, collection: &Collection) -> Vec<Stmt> {
    vec![
        Stmt::ForRange {
            var: TEARDOWN_INDEX.to_string(),
            start: Expr::Int(0),
            end: Expr::LoopCount(region.id),
            reverse: true,
            body: vec![Stmt::instance(
                InstanceRef::item(collection.clone(), Expr::local(TEARDOWN_INDEX)),
                InstanceAction::RemoveView { bulk: false },
            )],
        },
        Stmt::SetLoopCount {
            region: region.id,
            value: Expr::Int(0),
        },
    ]
}

/// Views every instance still held in owned storage and counts them as live.
/// Empty on first construction.
pub fn remount_owned(region: &LoopRegion, collection: &Collection) -> Vec<Stmt> {
    vec![
        Stmt::LetNode {
            name: ITEM_REF.to_string(),
            node: NodeRef::LoopAnchor(region.id),
        },
        Stmt::ForRange {
            var: ITEM_INDEX.to_string(),
            start: Expr::Int(0),
            end: Expr::Len(collection.clone()),
            reverse: false,
            body: vec![Stmt::instance(
                InstanceRef::item(collection.clone(), Expr::local(ITEM_INDEX)),
                InstanceAction::View {
                    parent: NodeRef::LoopParent(region.id),
                    anchor: Some(NodeRef::Var(ITEM_REF.to_string())),
                },
            )],
        },
        Stmt::SetLoopCount {
            region: region.id,
            value: Expr::Len(collection.clone()),
        },
    ]
}

/// Builds items `start..end` before the loop anchor.
pub fn render_items(region: &LoopRegion, start: Expr, end: Expr) -> Vec<Stmt> {
    vec![
        Stmt::LetNode {
            name: ITEM_REF.to_string(),
            node: NodeRef::LoopAnchor(region.id),
        },
        Stmt::ForRange {
            var: ITEM_INDEX.to_string(),
            start,
            end,
            reverse: false,
            body: region.create_item.clone(),
        },
    ]
}

/// Builds every item of a loop created with its enclosing branch. The branch state
/// is stored only after creation, so the sync's chain guard would skip it.
pub fn initial_render(region: &LoopRegion) -> Vec<Stmt> {
    let count = match &region.strategy {
        LoopStrategy::Range { start, end } => Expr::binary(
            BinaryOp::Sub,
            Expr::Source(end.clone()),
            Expr::Source(start.clone()),
        ),
        LoopStrategy::Keyed { iterable, .. } => Expr::Size(Box::new(Expr::Source(iterable.clone()))),
    };
    let mut body = match region.item {
        LoopItem::Empty => Vec::new(),
        _ => render_items(region, Expr::Int(0), count.clone()),
    };
    body.push(Stmt::SetLoopCount {
        region: region.id,
        value: count,
    });
    body
}

/// `_rebind` on owned instances `0..end`
pub(crate) fn rebind_items(collection: &Collection, end: Expr) -> Stmt {
    Stmt::ForRange {
        var: ITEM_INDEX.to_string(),
        start: Expr::Int(0),
        end,
        reverse: false,
        body: vec![Stmt::instance(
            InstanceRef::item(collection.clone(), Expr::local(ITEM_INDEX)),
            InstanceAction::Rebind,
        )],
    }
}

/// Early returns shared by every sync: not mounted yet, or inside an inactive branch.
fn entry_guards(region: &LoopRegion) -> Vec<Stmt> {
    let mut body = vec![Stmt::guarded(
        Expr::not(Expr::NodeValid(NodeRef::LoopParent(region.id))),
        vec![Stmt::Return],
    )];
    if let Some(active) = chain_guard(&region.enclosing) {
        body.push(Stmt::guarded(Expr::not(active), vec![Stmt::Return]));
    }
    body
}

fn count_unchanged(region: &LoopRegion) -> Expr {
    Expr::binary(
        BinaryOp::Eq,
        Expr::local(NEW_COUNT),
        Expr::LoopCount(region.id),
    )
}

fn sync_range(
    job: &ComponentCompilationJob,
    region: &LoopRegion,
    start: &ast::Expr,
    end: &ast::Expr,
) -> Vec<Stmt> {
    let mut body = entry_guards(region);
    body.push(Stmt::Let {
        name: NEW_COUNT.to_string(),
        value: Expr::binary(
            BinaryOp::Sub,
            Expr::Source(end.clone()),
            Expr::Source(start.clone()),
        ),
    });
    body.push(Stmt::guarded(count_unchanged(region), vec![Stmt::Return]));
    body.push(Stmt::Let {
        name: OLD_COUNT.to_string(),
        value: Expr::LoopCount(region.id),
    });

    let growing = Expr::binary(BinaryOp::Gt, Expr::local(NEW_COUNT), Expr::local(OLD_COUNT));
    let mut grow = render_items(region, Expr::local(OLD_COUNT), Expr::local(NEW_COUNT));
    let mut shrink = Vec::new();
    match &region.item {
        LoopItem::Components { collection } => {
            // growth may move earlier instances in their storage
            grow.push(rebind_items(collection, Expr::local(OLD_COUNT)));
            shrink.push(drain_owned(collection, Expr::local(NEW_COUNT)));
            if !region.update_item.is_empty() {
                shrink.push(Stmt::ForRange {
                    var: ITEM_INDEX.to_string(),
                    start: Expr::Int(0),
                    end: Expr::local(NEW_COUNT),
                    reverse: false,
                    body: region.update_item.clone(),
                });
            }
        }
        LoopItem::Elements => {
            let drop_tail = Stmt::DropItems {
                region: region.id,
                from: Expr::local(NEW_COUNT),
                bulk: false,
            };
            if uses_bulk_clear(job, region) {
                let mut clear_all = vec![Stmt::DropItems {
                    region: region.id,
                    from: Expr::Int(0),
                    bulk: true,
                }];
                clear_all.extend(clear_loop_parent(region.id));
                shrink.push(Stmt::If {
                    cond: Expr::binary(BinaryOp::Eq, Expr::local(NEW_COUNT), Expr::Int(0)),
                    then_body: clear_all,
                    else_body: vec![drop_tail],
                });
            } else {
                shrink.push(drop_tail);
            }
        }
        LoopItem::Empty => grow.clear(),
    }
    if !grow.is_empty() || !shrink.is_empty() {
        body.push(Stmt::If {
            cond: growing,
            then_body: batched(job, grow),
            else_body: shrink,
        });
    }
    body.push(Stmt::SetLoopCount {
        region: region.id,
        value: Expr::local(NEW_COUNT),
    });
    body
}

fn sync_keyed(job: &ComponentCompilationJob, region: &LoopRegion, iterable: &ast::Expr) -> Vec<Stmt> {
    let mut body = entry_guards(region);
    body.push(Stmt::Let {
        name: NEW_COUNT.to_string(),
        value: Expr::Size(Box::new(Expr::Source(iterable.clone()))),
    });

    let mut in_place = Vec::new();
    if !region.update_item.is_empty() {
        in_place.push(Stmt::ForRange {
            var: ITEM_INDEX.to_string(),
            start: Expr::Int(0),
            end: Expr::local(NEW_COUNT),
            reverse: false,
            body: region.update_item.clone(),
        });
    }
    in_place.push(Stmt::Return);
    body.push(Stmt::guarded(count_unchanged(region), in_place));

    body.extend(teardown_loop(job, region));
    body.extend(batched(
        job,
        render_items(region, Expr::Int(0), Expr::local(NEW_COUNT)),
    ));
    body.push(Stmt::SetLoopCount {
        region: region.id,
        value: Expr::local(NEW_COUNT),
    });
    if !job.handlers.is_empty() {
        body.push(Stmt::call(super::lifecycle::REBIND));
    }
    body
}

/// `_sync_loop_<id>_item(_i)`: rebuilds one element item where it stands.
fn sync_item(job: &ComponentCompilationJob, region: &LoopRegion) -> Procedure {
    let next = Expr::binary(BinaryOp::Add, Expr::local(ITEM_INDEX), Expr::Int(1));
    let mut body = vec![
        Stmt::ReleaseItem {
            region: region.id,
            index: Expr::local(ITEM_INDEX),
        },
        Stmt::LetNode {
            name: ITEM_REF.to_string(),
            node: NodeRef::LoopAnchor(region.id),
        },
        Stmt::guarded(
            Expr::binary(BinaryOp::Lt, next.clone(), Expr::ItemCount(region.id)),
            vec![Stmt::LetNode {
                name: ITEM_REF.to_string(),
                node: NodeRef::ItemRoot {
                    region: region.id,
                    index: Box::new(next),
                },
            }],
        ),
    ];
    body.extend(region.create_item.clone());
    Procedure::new(
        sync_loop_item_name(region.id),
        ProcedureKind::SyncLoopItem(region.id),
        batched(job, body),
    )
    .with_param(Param::new(ITEM_INDEX, "int"))
}

pub fn synthesize_loop_syncs(job: &mut ComponentCompilationJob) {
    let mut procedures = Vec::new();
    for region in &job.loop_regions {
        let body = match &region.strategy {
            LoopStrategy::Range { start, end } => sync_range(job, region, start, end),
            LoopStrategy::Keyed { iterable, .. } => sync_keyed(job, region, iterable),
        };
        procedures.push(Procedure::new(
            sync_loop_name(region.id),
            ProcedureKind::SyncLoop(region.id),
            body,
        ));
        if region.is_keyed() && matches!(region.item, LoopItem::Elements) {
            procedures.push(sync_item(job, region));
        }
        debug!(
            region = %region.id,
            keyed = region.is_keyed(),
            only_child = region.only_child,
            "loop sync synthesized"
        );
    }
    for procedure in procedures {
        job.add_procedure(procedure);
    }
}
