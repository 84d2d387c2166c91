//! Reactive Sites
//!
//! Bindings, if-regions, loop-regions and event handlers recorded by lowering. They
//! are produced once per component and never change afterwards; the synthesis phases
//! read them to build the sync procedures.

use smallvec::SmallVec;

use super::handle::{Branch, BranchRef, IfId, LoopId, NodeId};
use super::ops::{EventKind, Handler};
use super::stmt::{Collection, Expr, InstanceRef, PropValue, Stmt};
use crate::ast;
use crate::parse_util::{sanitize_identifier, SourceLine};
use crate::pipeline::dependencies::DependencySet;

/// Chain of enclosing if-branches, outermost first
pub type BranchPath = SmallVec<[BranchRef; 2]>;

/// What a binding writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteKind {
    Attribute(String),
    Property(String),
    Text,
    InnerHtml,
}

impl SiteKind {
    /// Suffix of the site's update procedure name
    pub fn suffix(&self) -> String {
        match self {
            SiteKind::Attribute(name) => sanitize_identifier(name),
            SiteKind::Property(name) => format!("prop_{}", sanitize_identifier(name)),
            SiteKind::Text => "text".to_string(),
            SiteKind::InnerHtml => "html".to_string(),
        }
    }
}

/// One reactive attribute/text site
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub node: NodeId,
    pub site: SiteKind,
    /// The site's full value, all fragments concatenated
    pub value: Expr,
    pub deps: DependencySet,
    /// Enclosing if-branches, outermost first; the last one owns the binding
    pub branches: BranchPath,
}

impl Binding {
    pub fn owner(&self) -> Option<BranchRef> {
        self.branches.last().copied()
    }
}

/// Ownership ledger and creation program of one branch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchLedger {
    /// Construction of the branch, inserting its top-level nodes before the anchor
    pub creation: Vec<Stmt>,
    /// Every node created in the branch, nested regions included
    pub elements: Vec<NodeId>,
    /// Every static component instance created in the branch, nested regions included
    pub components: Vec<ComponentSlot>,
    /// Every loop region started in the branch, nested regions included
    pub loops: Vec<LoopId>,
    /// Every if region started in the branch, transitively
    pub ifs: Vec<IfId>,
}

impl BranchLedger {
    pub fn is_empty(&self) -> bool {
        self.creation.is_empty()
    }
}

/// A component instance placed in the view outside any loop
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSlot {
    pub instance: InstanceRef,
    /// False for `<{member}/>`: the instance outlives its view
    pub owned: bool,
}

/// A prop passed to a child instance
#[derive(Debug, Clone, PartialEq)]
pub struct ChildProp {
    pub name: String,
    pub value: PropValue,
    pub deps: DependencySet,
    /// The child declares the prop mutable, so it may write back through a reference
    pub child_mutable: bool,
}

/// A child instance with its props, for refresh and callback wiring
#[derive(Debug, Clone, PartialEq)]
pub struct ChildInstance {
    pub slot: ComponentSlot,
    pub type_name: String,
    pub props: Vec<ChildProp>,
    pub branches: BranchPath,
}

/// A reactive two-branch visibility site
#[derive(Debug, Clone, PartialEq)]
pub struct IfRegion {
    pub id: IfId,
    pub condition: ast::Expr,
    pub deps: DependencySet,
    /// Enclosing branches, outermost first
    pub enclosing: BranchPath,
    pub then_branch: BranchLedger,
    pub else_branch: BranchLedger,
    pub line: SourceLine,
}

impl IfRegion {
    pub fn branch(&self, branch: Branch) -> &BranchLedger {
        match branch {
            Branch::Then => &self.then_branch,
            Branch::Else => &self.else_branch,
        }
    }

    pub fn branch_mut(&mut self, branch: Branch) -> &mut BranchLedger {
        match branch {
            Branch::Then => &mut self.then_branch,
            Branch::Else => &mut self.else_branch,
        }
    }
}

/// Reconciliation strategy chosen at compile time
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStrategy {
    /// `for var in start:end`
    Range { start: ast::Expr, end: ast::Expr },
    /// `for var in iterable key=...`
    Keyed { iterable: ast::Expr, key: ast::Expr },
}

/// What one item of a loop consists of
#[derive(Debug, Clone, PartialEq)]
pub enum LoopItem {
    /// The item is a single component instance
    Components { collection: Collection },
    /// The item is one or more element trees, tracked per item
    Elements,
    /// The loop renders nothing
    Empty,
}

/// A reactive list-rendering site
#[derive(Debug, Clone, PartialEq)]
pub struct LoopRegion {
    pub id: LoopId,
    pub var: String,
    pub strategy: LoopStrategy,
    pub deps: DependencySet,
    pub item: LoopItem,
    /// Builds one item; expects the index in `_i` and the insertion reference in `_ref`
    pub create_item: Vec<Stmt>,
    /// Refreshes one live item in place; expects the index in `_i`
    pub update_item: Vec<Stmt>,
    /// The loop is the only child of its parent node
    pub only_child: bool,
    pub enclosing: BranchPath,
    pub line: SourceLine,
}

impl LoopRegion {
    pub fn is_keyed(&self) -> bool {
        matches!(self.strategy, LoopStrategy::Keyed { .. })
    }

    pub fn collection(&self) -> Option<&Collection> {
        match &self.item {
            LoopItem::Components { collection } => Some(collection),
            _ => None,
        }
    }

    /// Keyed loop over a user array of component instances
    pub fn member_collection(&self) -> Option<&str> {
        match (&self.strategy, self.collection()) {
            (LoopStrategy::Keyed { .. }, Some(Collection::Member(name))) => Some(name),
            _ => None,
        }
    }

    /// User array a keyed loop iterates directly; its push, pop and clear patch
    /// the loop one item at a time
    pub fn list_array(&self) -> Option<&str> {
        match (&self.strategy, &self.item) {
            (_, LoopItem::Empty) => None,
            (LoopStrategy::Keyed { iterable, .. }, _) => iterable.as_ident(),
            _ => None,
        }
    }
}

/// One handler attached to a component-level node
#[derive(Debug, Clone, PartialEq)]
pub struct EventHandler {
    pub node: NodeId,
    pub event: EventKind,
    /// The attribute value: a method name or a call
    pub code: ast::Expr,
    pub handler: Handler,
    pub branches: BranchPath,
}

impl EventHandler {
    pub fn procedure_name(node: NodeId, event: EventKind) -> String {
        format!("_handler_{}_{}", node.as_usize(), event.as_str())
    }
}

/// Nodes with handlers, one bitmask per event kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMasks {
    masks: [u64; 4],
    /// Nodes past the mask width
    overflow: Vec<(NodeId, EventKind)>,
}

impl EventMasks {
    pub const WIDTH: usize = 64;

    pub fn insert(&mut self, node: NodeId, event: EventKind) {
        if node.as_usize() < Self::WIDTH {
            self.masks[event.index()] |= 1u64 << node.as_usize();
        } else if !self.overflow.contains(&(node, event)) {
            self.overflow.push((node, event));
        }
    }

    pub fn contains(&self, node: NodeId, event: EventKind) -> bool {
        if node.as_usize() < Self::WIDTH {
            self.masks[event.index()] & (1u64 << node.as_usize()) != 0
        } else {
            self.overflow.contains(&(node, event))
        }
    }

    pub fn mask(&self, event: EventKind) -> u64 {
        self.masks[event.index()]
    }

    /// Event kinds registered on `node`, in dispatcher order
    pub fn events_of(&self, node: NodeId) -> Vec<EventKind> {
        EventKind::ALL
            .iter()
            .copied()
            .filter(|event| self.contains(node, *event))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.iter().all(|m| *m == 0) && self.overflow.is_empty()
    }

    pub fn overflow(&self) -> &[(NodeId, EventKind)] {
        &self.overflow
    }
}
