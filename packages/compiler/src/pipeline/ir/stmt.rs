//! Procedure Statements
//!
//! The statement language synthesized procedures are written in. Each variant maps to
//! a fixed shape in the emitted target program; runtime state the program keeps
//! (region flags, counts, tracked loop items, instance vectors) is addressed through
//! region ids rather than names.

use super::handle::{IfId, LoopId, NodeId};
use super::ops::{EventKind, Op};
use crate::ast::{self, BinaryOp};

/// A node handle as seen by generated code
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRef {
    /// Component-level node slot `el[id]`
    Slot(NodeId),
    /// Node created inside a loop item, a procedure local
    Local(NodeId),
    /// The `parent` argument of `view`
    Parent,
    /// A procedure-local handle bound by [`Stmt::LetNode`]
    Var(String),
    IfParent(IfId),
    IfAnchor(IfId),
    LoopParent(LoopId),
    LoopAnchor(LoopId),
    /// First root node of a tracked loop item
    ItemRoot { region: LoopId, index: Box<Expr> },
    /// Root node of a child component instance
    InstanceRoot(InstanceRef),
    RouteParent,
    RouteAnchor,
}

/// Where the instances of a component loop live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Instances created by the loop, stored in `_loop_<Type>s`
    Owned { type_name: String },
    /// A user state array of already-constructed instances
    Member(String),
}

impl Collection {
    pub fn owned(type_name: impl Into<String>) -> Self {
        Collection::Owned {
            type_name: type_name.into(),
        }
    }

    /// Name of the backing storage in the generated component
    pub fn storage_name(&self) -> String {
        match self {
            Collection::Owned { type_name } => format!("_loop_{}s", type_name),
            Collection::Member(name) => name.clone(),
        }
    }
}

/// A child component instance as seen by generated code
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceRef {
    /// Static instance field `<Type>_<index>`
    Member { type_name: String, index: usize },
    /// State member or procedure local holding an instance
    Named(String),
    /// Element of an instance collection
    Item {
        collection: Collection,
        index: Box<Expr>,
    },
}

impl InstanceRef {
    pub fn member(type_name: impl Into<String>, index: usize) -> Self {
        InstanceRef::Member {
            type_name: type_name.into(),
            index,
        }
    }

    pub fn item(collection: Collection, index: Expr) -> Self {
        InstanceRef::Item {
            collection,
            index: Box::new(index),
        }
    }
}

/// How a prop value reaches a child
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Copied
    Value(ast::Expr),
    /// Shared storage: the child reads the parent's variable
    Reference(ast::Expr),
    /// A method of this component, callable by the child
    Callback(String),
}

/// Calls made on a child instance
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceAction {
    SetProp { prop: String, value: PropValue },
    /// `child.update_<prop>()`
    Update(String),
    View {
        parent: NodeRef,
        anchor: Option<NodeRef>,
    },
    Rebind,
    Destroy,
    RemoveView { bulk: bool },
    /// `child.<callback> = [this] { body }`
    WireCallback { callback: String, body: Vec<Stmt> },
}

/// Runtime values read by generated code
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A user expression evaluated in component scope
    Source(ast::Expr),
    Int(i64),
    Bool(bool),
    Str(String),
    /// Procedure-local value bound by [`Stmt::Let`] or a loop
    Local(String),
    IfState(IfId),
    LoopCount(LoopId),
    /// Number of instances in a collection
    Len(Collection),
    /// Size of a user array value
    Size(Box<Expr>),
    /// Number of tracked items of an element loop
    ItemCount(LoopId),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Whether a node handle currently refers to a live node
    NodeValid(NodeRef),
    /// String concatenation of all fragments
    Format(Vec<Expr>),
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// `if_state` for the then side, `!if_state` for the else side
    pub fn branch_guard(region: IfId, is_then: bool) -> Self {
        if is_then {
            Expr::IfState(region)
        } else {
            Expr::not(Expr::IfState(region))
        }
    }
}

/// Procedure body statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Op(Op),
    Let {
        name: String,
        value: Expr,
    },
    LetNode {
        name: String,
        node: NodeRef,
    },
    SetIfState {
        region: IfId,
        value: Expr,
    },
    SetLoopCount {
        region: LoopId,
        value: Expr,
    },
    /// Stores a handle into a region parent/anchor or route field
    SetHandle {
        slot: NodeRef,
        value: NodeRef,
    },
    /// Stores a created node into a user state field (`ref`)
    BindRef {
        field: String,
        node: NodeRef,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Return,
    /// Returns a node handle to the caller
    ReturnNode(NodeRef),
    /// `for var in start..end`, descending when `reverse`
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        reverse: bool,
        body: Vec<Stmt>,
    },
    ForEach {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    /// Calls a procedure of this component
    Call {
        procedure: String,
        args: Vec<Expr>,
    },
    Instance {
        target: InstanceRef,
        action: InstanceAction,
    },
    /// Constructs a child component into a procedure local
    NewInstance {
        name: String,
        type_name: String,
    },
    /// Moves a local instance to the back of an owned collection
    PushInstance {
        collection: Collection,
        name: String,
    },
    /// Drops the last instance of an owned collection
    PopInstance {
        collection: Collection,
    },
    /// Opens the record of element-loop item `at`, appending when `at` equals the
    /// item count and replacing the record otherwise. Later `Track*` statements of
    /// the same region add to this record.
    BeginItem {
        region: LoopId,
        at: Expr,
    },
    /// A top-level node of the open item
    TrackRoot {
        region: LoopId,
        node: NodeRef,
    },
    /// A handler registered inside the open item
    TrackHandler {
        region: LoopId,
        node: NodeRef,
        event: EventKind,
    },
    /// A component instance created inside the open item
    TrackInstance {
        region: LoopId,
        instance: InstanceRef,
    },
    /// Tears down the views of item `index` (handlers first, then nested instances,
    /// then root nodes) while keeping its record slot
    ReleaseItem {
        region: LoopId,
        index: Expr,
    },
    /// Tears down and forgets items `from..`, last first; `bulk` skips node removal
    DropItems {
        region: LoopId,
        from: Expr,
        bulk: bool,
    },
    /// A user statement
    Exec(ast::Stmt),
    /// `if (on<Var>Change) on<Var>Change()`
    NotifyChange(String),
    /// Enter a construction batch
    EnterView,
    /// Leave a construction batch; flushes when the outermost batch ends
    LeaveView,
}

impl Stmt {
    pub fn op(op: Op) -> Self {
        Stmt::Op(op)
    }

    pub fn call(procedure: impl Into<String>) -> Self {
        Stmt::Call {
            procedure: procedure.into(),
            args: Vec::new(),
        }
    }

    pub fn instance(target: InstanceRef, action: InstanceAction) -> Self {
        Stmt::Instance { target, action }
    }

    pub fn guarded(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body: body,
            else_body: Vec::new(),
        }
    }

    /// Visits this statement and every nested statement, depth first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Stmt)) {
        visit(self);
        match self {
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                for stmt in then_body.iter().chain(else_body.iter()) {
                    stmt.walk(visit);
                }
            }
            Stmt::ForRange { body, .. } | Stmt::ForEach { body, .. } => {
                for stmt in body {
                    stmt.walk(visit);
                }
            }
            Stmt::Instance {
                action: InstanceAction::WireCallback { body, .. },
                ..
            } => {
                for stmt in body {
                    stmt.walk(visit);
                }
            }
            _ => {}
        }
    }
}

/// Every primitive op in `body`, in source order, regardless of guards.
pub fn collect_ops(body: &[Stmt]) -> Vec<&Op> {
    let mut ops = Vec::new();
    for stmt in body {
        stmt.walk(&mut |s| {
            if let Stmt::Op(op) = s {
                ops.push(op);
            }
        });
    }
    ops
}

/// Names of every procedure of this component called from `body`.
pub fn collect_calls(body: &[Stmt]) -> Vec<&str> {
    let mut calls = Vec::new();
    for stmt in body {
        stmt.walk(&mut |s| {
            if let Stmt::Call { procedure, .. } = s {
                calls.push(procedure.as_str());
            }
        });
    }
    calls
}
