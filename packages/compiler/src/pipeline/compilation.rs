//! Compilation Module
//!
//! The per-component lowering job: counters for the arenas, the reactive sites
//! recorded during ingest, and the procedures synthesized from them.

use indexmap::IndexMap;
use std::collections::HashMap;

use super::dependencies::DependencyExtractor;
use super::ir::{
    Binding, ChildInstance, ComponentProgram, EventHandler, EventMasks, IfId, IfRegion, LoopId,
    LoopRegion, NodeId, Procedure, Stmt,
};
use crate::ast::{CompilationUnit, ComponentDef};
use crate::config::CompilerConfig;
use crate::schema::MethodSchema;

/// Compilation-in-progress of one component's view and methods.
pub struct ComponentCompilationJob<'a> {
    pub component: &'a ComponentDef,
    /// Sibling definitions, for looking up child prop declarations
    pub unit: &'a CompilationUnit,
    pub schema: &'a dyn MethodSchema,
    pub config: &'a CompilerConfig,

    /// Top-level construction program run by `view`
    pub view_body: Vec<Stmt>,
    pub bindings: Vec<Binding>,
    pub if_regions: Vec<IfRegion>,
    pub loop_regions: Vec<LoopRegion>,
    pub handlers: Vec<EventHandler>,
    pub masks: EventMasks,
    pub children: Vec<ChildInstance>,
    pub has_route: bool,
    pub procedures: IndexMap<String, Procedure>,

    next_node_id: usize,
    next_loop_id: usize,
    next_if_id: usize,
    instance_counters: HashMap<String, usize>,
}

impl<'a> ComponentCompilationJob<'a> {
    pub fn new(
        component: &'a ComponentDef,
        unit: &'a CompilationUnit,
        schema: &'a dyn MethodSchema,
        config: &'a CompilerConfig,
    ) -> Self {
        ComponentCompilationJob {
            component,
            unit,
            schema,
            config,
            view_body: Vec::new(),
            bindings: Vec::new(),
            if_regions: Vec::new(),
            loop_regions: Vec::new(),
            handlers: Vec::new(),
            masks: EventMasks::default(),
            children: Vec::new(),
            has_route: false,
            procedures: IndexMap::new(),
            next_node_id: 0,
            next_loop_id: 0,
            next_if_id: 0,
            instance_counters: HashMap::new(),
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component.name
    }

    pub fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    pub fn allocate_loop_id(&mut self) -> LoopId {
        let id = LoopId::new(self.next_loop_id);
        self.next_loop_id += 1;
        id
    }

    pub fn allocate_if_id(&mut self) -> IfId {
        let id = IfId::new(self.next_if_id);
        self.next_if_id += 1;
        id
    }

    /// Positional index of the next static instance of `type_name`
    pub fn allocate_instance_index(&mut self, type_name: &str) -> usize {
        let counter = self.instance_counters.entry(type_name.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn node_count(&self) -> usize {
        self.next_node_id
    }

    pub fn loop_count(&self) -> usize {
        self.next_loop_id
    }

    pub fn if_count(&self) -> usize {
        self.next_if_id
    }

    pub fn if_region(&self, id: IfId) -> &IfRegion {
        self.if_regions
            .get(id.as_usize())
            .unwrap_or_else(|| panic!("unknown if-region {}", id))
    }

    pub fn loop_region(&self, id: LoopId) -> &LoopRegion {
        self.loop_regions
            .get(id.as_usize())
            .unwrap_or_else(|| panic!("unknown loop-region {}", id))
    }

    /// Dependency queries for this component, aware of keyed component arrays
    pub fn extractor(&self) -> DependencyExtractor<'a> {
        let keyed_arrays = self
            .loop_regions
            .iter()
            .filter_map(|region| region.member_collection().map(str::to_string))
            .collect::<Vec<_>>();
        DependencyExtractor::new(self.component, self.schema)
            .with_keyed_component_arrays(keyed_arrays)
    }

    pub fn add_procedure(&mut self, procedure: Procedure) {
        let previous = self.procedures.insert(procedure.name.clone(), procedure);
        assert!(
            previous.is_none(),
            "procedure synthesized twice in component `{}`",
            self.component.name
        );
    }

    pub fn into_program(self) -> ComponentProgram {
        ComponentProgram {
            component: self.component.name.clone(),
            node_count: self.next_node_id,
            masks: self.masks,
            handlers: self.handlers,
            bindings: self.bindings,
            if_regions: self.if_regions,
            loop_regions: self.loop_regions,
            children: self.children,
            has_route: self.has_route,
            procedures: self.procedures,
        }
    }
}
