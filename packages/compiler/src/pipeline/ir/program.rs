//! Component Programs
//!
//! The per-component output of lowering: named procedures plus the reactive sites
//! they were synthesized from.

use indexmap::IndexMap;

use super::handle::{IfId, LoopId};
use super::regions::{Binding, ChildInstance, EventHandler, EventMasks, IfRegion, LoopRegion};
use super::stmt::Stmt;

/// Role of a procedure in the generated component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcedureKind {
    /// `view(parent)`
    View,
    Rebind,
    Destroy,
    /// `_remove_view(bulk)`
    RemoveView,
    GetRootElement,
    /// `update_<var>()`
    UpdateVariable(String),
    /// Refresh of one binding site
    UpdateSite,
    SyncIf(IfId),
    SyncLoop(LoopId),
    /// `_sync_loop_<id>_item(index)`
    SyncLoopItem(LoopId),
    Handler,
    /// A user method with synthesized update calls appended
    Method,
    /// A renamed lifecycle hook
    Hook,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// A callable unit of the generated component
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl Procedure {
    pub fn new(name: impl Into<String>, kind: ProcedureKind, body: Vec<Stmt>) -> Self {
        Procedure {
            name: name.into(),
            kind,
            params: Vec::new(),
            body,
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

pub fn update_procedure_name(variable: &str) -> String {
    format!("update_{}", variable)
}

pub fn sync_if_name(id: IfId) -> String {
    format!("_sync_if_{}", id.as_usize())
}

pub fn sync_loop_name(id: LoopId) -> String {
    format!("_sync_loop_{}", id.as_usize())
}

pub fn sync_loop_item_name(id: LoopId) -> String {
    format!("_sync_loop_{}_item", id.as_usize())
}

/// Everything lowering produced for one component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentProgram {
    pub component: String,
    /// Size of the component-level node array
    pub node_count: usize,
    pub masks: EventMasks,
    pub handlers: Vec<EventHandler>,
    pub bindings: Vec<Binding>,
    pub if_regions: Vec<IfRegion>,
    pub loop_regions: Vec<LoopRegion>,
    pub children: Vec<ChildInstance>,
    /// The view contains a route placeholder
    pub has_route: bool,
    /// Procedures in emission order
    pub procedures: IndexMap<String, Procedure>,
}

impl ComponentProgram {
    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    pub fn if_region(&self, id: IfId) -> &IfRegion {
        &self.if_regions[id.as_usize()]
    }

    pub fn loop_region(&self, id: LoopId) -> &LoopRegion {
        &self.loop_regions[id.as_usize()]
    }
}
