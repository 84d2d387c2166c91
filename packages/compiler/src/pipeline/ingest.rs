//! Ingest
//!
//! The view lowering pass. Walks a component's view tree once, top to bottom and
//! left to right, emitting the construction program and recording bindings,
//! handlers, child instances and reactive regions on the job. Inside a loop item,
//! conditionals and loops degrade to plain statements that are rebuilt with the item.

use tracing::debug;

use super::compilation::ComponentCompilationJob;
use super::dependencies::{DependencyExtractor, DependencySet, LocalScope};
use super::ir::{
    Binding, Branch, BranchLedger, BranchPath, BranchRef, ChildInstance, ChildProp, Collection,
    ComponentSlot, EventHandler, EventKind, Expr, Handler, IfId, IfRegion, InstanceAction,
    InstanceRef, LoopId, LoopItem, LoopRegion, LoopStrategy, NodeId, NodeKind, NodeRef, Op,
    PropValue, SiteKind, Stmt,
};
use crate::ast::{self, BinaryOp, ComponentInstance, Element, IfNode, StrPart, ViewNode};
use crate::parse_util::SourceLine;

/// Index of the item being built or refreshed, bound by every caller of an item program
pub const ITEM_INDEX: &str = "_i";
/// Insertion reference for the top-level nodes of an item
pub const ITEM_REF: &str = "_ref";
/// Local holding a freshly constructed loop instance
const ITEM_INSTANCE: &str = "_inst";

/// Attributes written as DOM properties
const PROPERTY_ATTRIBUTES: [&str; 3] = ["value", "checked", "selected"];

/// Where the nodes lowered at this point of the tree go
#[derive(Debug, Clone)]
struct Frame {
    parent: NodeRef,
    /// Insertion reference for nodes placed directly under `parent`
    anchor: Option<NodeRef>,
    branches: BranchPath,
    /// Loop region whose item is being built
    item: Option<LoopId>,
    /// Nodes placed here are top-level nodes of the item
    item_root: bool,
    /// The node being lowered is its parent's only child
    only_child: bool,
}

impl Frame {
    fn root() -> Self {
        Frame {
            parent: NodeRef::Parent,
            anchor: None,
            branches: BranchPath::new(),
            item: None,
            item_root: false,
            only_child: false,
        }
    }

    fn child_of(&self, parent: NodeRef) -> Self {
        Frame {
            parent,
            anchor: None,
            branches: self.branches.clone(),
            item: self.item,
            item_root: false,
            only_child: false,
        }
    }
}

/// Lowering of one loop item: its own node counter and instance naming
#[derive(Debug, Default)]
struct ItemLowering {
    next_local: usize,
    next_instance: usize,
}

/// Definition of a loop, as found in the tree
struct LoopSource<'v> {
    var: &'v str,
    strategy: LoopStrategy,
    children: &'v [ViewNode],
    line: &'v SourceLine,
}

pub struct Ingest<'j, 'a> {
    job: &'j mut ComponentCompilationJob<'a>,
    extractor: DependencyExtractor<'a>,
    items: Vec<ItemLowering>,
}

/// Lowers the component's view into `job.view_body` and the job's site tables.
pub fn ingest_component(job: &mut ComponentCompilationJob) {
    let Some(view) = job.component.view.as_ref() else {
        return;
    };
    let extractor = DependencyExtractor::new(job.component, job.schema);
    let mut ingest = Ingest {
        job,
        extractor,
        items: Vec::new(),
    };
    let mut body = Vec::new();
    ingest.lower_children(view, &Frame::root(), &mut body);
    ingest.job.view_body = body;
    debug!(
        component = %ingest.job.component_name(),
        nodes = ingest.job.node_count(),
        bindings = ingest.job.bindings.len(),
        if_regions = ingest.job.if_regions.len(),
        loop_regions = ingest.job.loop_regions.len(),
        "view lowered"
    );
}

impl<'j, 'a> Ingest<'j, 'a> {
    fn lower_children(&mut self, children: &[ViewNode], frame: &Frame, out: &mut Vec<Stmt>) {
        let sole_child = children.len() == 1
            && matches!(frame.parent, NodeRef::Slot(_) | NodeRef::Local(_));
        for child in children {
            let child_frame;
            let frame = if sole_child {
                child_frame = Frame {
                    only_child: true,
                    ..frame.clone()
                };
                &child_frame
            } else {
                frame
            };
            match child {
                ViewNode::Element(el) => self.lower_element(el, frame, out),
                ViewNode::Component(comp) => self.lower_component(comp, frame, out),
                ViewNode::If(node) => {
                    if frame.item.is_some() {
                        self.lower_plain_if(node, frame, out);
                    } else {
                        self.lower_if(node, frame, out);
                    }
                }
                ViewNode::ForRange(node) => {
                    if frame.item.is_some() {
                        let body = self.lower_plain_body(&node.children, frame);
                        out.push(Stmt::ForRange {
                            var: node.var.clone(),
                            start: Expr::Source(node.start.clone()),
                            end: Expr::Source(node.end.clone()),
                            reverse: false,
                            body,
                        });
                    } else {
                        let source = LoopSource {
                            var: &node.var,
                            strategy: LoopStrategy::Range {
                                start: node.start.clone(),
                                end: node.end.clone(),
                            },
                            children: &node.children,
                            line: &node.line,
                        };
                        self.lower_loop(source, frame, out);
                    }
                }
                ViewNode::ForEach(node) => {
                    if frame.item.is_some() {
                        let body = self.lower_plain_body(&node.children, frame);
                        out.push(Stmt::ForEach {
                            var: node.var.clone(),
                            iterable: Expr::Source(node.iterable.clone()),
                            body,
                        });
                    } else {
                        // validation rejects keyless loops; identity keying is the fallback
                        let key = node
                            .key
                            .clone()
                            .unwrap_or_else(|| ast::Expr::ident(node.var.clone()));
                        let source = LoopSource {
                            var: &node.var,
                            strategy: LoopStrategy::Keyed {
                                iterable: node.iterable.clone(),
                                key,
                            },
                            children: &node.children,
                            line: &node.line,
                        };
                        self.lower_loop(source, frame, out);
                    }
                }
                ViewNode::RawHtml(raw) => self.lower_raw_html(&raw.children, frame, out),
                ViewNode::RoutePlaceholder(_) => {
                    out.push(Stmt::SetHandle {
                        slot: NodeRef::RouteParent,
                        value: frame.parent.clone(),
                    });
                    out.push(Stmt::op(Op::CreateNode {
                        node: NodeRef::RouteAnchor,
                        kind: NodeKind::Anchor,
                    }));
                    self.attach(frame, NodeRef::RouteAnchor, out);
                    self.job.has_route = true;
                }
                ViewNode::Text(_) | ViewNode::Expr(_) => {
                    self.lower_text(std::slice::from_ref(child), frame, out)
                }
            }
        }
    }

    /// Allocates a node handle: a component slot, or a local inside a loop item.
    fn allocate_node(&mut self, frame: &Frame) -> NodeRef {
        match (frame.item, self.items.last_mut()) {
            (Some(_), Some(item)) => {
                let id = NodeId::new(item.next_local);
                item.next_local += 1;
                NodeRef::Local(id)
            }
            _ => NodeRef::Slot(self.job.allocate_node_id()),
        }
    }

    /// Places `node` under the frame's parent, before the frame's anchor when it has one.
    fn attach(&mut self, frame: &Frame, node: NodeRef, out: &mut Vec<Stmt>) {
        let append = Op::AppendChild {
            parent: frame.parent.clone(),
            node: node.clone(),
        };
        let op = match &frame.anchor {
            Some(anchor) => append.anchored(anchor),
            None => append,
        };
        out.push(Stmt::op(op));
        if frame.item_root {
            if let Some(region) = frame.item {
                out.push(Stmt::TrackRoot { region, node });
            }
        }
    }

    fn lower_element(&mut self, el: &Element, frame: &Frame, out: &mut Vec<Stmt>) {
        let node = self.allocate_node(frame);
        out.push(Stmt::op(Op::CreateNode {
            node: node.clone(),
            kind: NodeKind::Element(el.tag.clone()),
        }));
        if let Some(attr) = &self.job.config.scope_attribute {
            out.push(Stmt::op(Op::SetAttribute {
                node: node.clone(),
                name: attr.clone(),
                value: Expr::Str(self.job.component.name.clone()),
            }));
        }
        if let Some(field) = &el.ref_binding {
            out.push(Stmt::BindRef {
                field: field.clone(),
                node: node.clone(),
            });
        }

        for attr in &el.attrs {
            if let Some(event) = EventKind::from_attribute(&attr.name) {
                self.lower_handler(&node, event, &attr.value, frame, out);
                continue;
            }
            let site = if PROPERTY_ATTRIBUTES.contains(&attr.name.as_str()) {
                SiteKind::Property(attr.name.clone())
            } else {
                SiteKind::Attribute(attr.name.clone())
            };
            let value = lower_value(&attr.value);
            out.push(Stmt::op(site_op(&node, &site, value.clone())));
            if !attr.value.is_constant() {
                let deps = self.extractor.reads(&attr.value, &LocalScope::new());
                self.record_binding(&node, site, value, deps, frame);
            }
        }

        self.attach(frame, node.clone(), out);

        if el.children.is_empty() {
            return;
        }
        if el.has_structural_children() {
            let inner = frame.child_of(node);
            self.lower_children(&el.children, &inner, out);
        } else {
            let (value, constant) = inline_content(&el.children);
            out.push(Stmt::op(Op::SetText {
                node: node.clone(),
                value: value.clone(),
            }));
            if !constant {
                let deps = self.inline_reads(&el.children);
                self.record_binding(&node, SiteKind::Text, value, deps, frame);
            }
        }
    }

    /// Text nodes placed among structural siblings, or at the top of a region.
    fn lower_text(&mut self, children: &[ViewNode], frame: &Frame, out: &mut Vec<Stmt>) {
        let node = self.allocate_node(frame);
        let (value, constant) = inline_content(children);
        out.push(Stmt::op(Op::CreateNode {
            node: node.clone(),
            kind: NodeKind::Text,
        }));
        out.push(Stmt::op(Op::SetText {
            node: node.clone(),
            value: value.clone(),
        }));
        self.attach(frame, node.clone(), out);
        if !constant {
            let deps = self.inline_reads(children);
            self.record_binding(&node, SiteKind::Text, value, deps, frame);
        }
    }

    fn lower_raw_html(&mut self, children: &[ViewNode], frame: &Frame, out: &mut Vec<Stmt>) {
        let target = match &frame.parent {
            NodeRef::Slot(_) | NodeRef::Local(_) => frame.parent.clone(),
            _ => {
                let wrapper = self.allocate_node(frame);
                out.push(Stmt::op(Op::CreateNode {
                    node: wrapper.clone(),
                    kind: NodeKind::Element("span".to_string()),
                }));
                self.attach(frame, wrapper.clone(), out);
                wrapper
            }
        };
        let (value, constant) = inline_content(children);
        out.push(Stmt::op(Op::SetInnerHtml {
            node: target.clone(),
            value: value.clone(),
        }));
        if !constant {
            let deps = self.inline_reads(children);
            self.record_binding(&target, SiteKind::InnerHtml, value, deps, frame);
        }
    }

    /// Component-level sites become bindings; loop-local ones are rebuilt with their item.
    fn record_binding(
        &mut self,
        node: &NodeRef,
        site: SiteKind,
        value: Expr,
        deps: DependencySet,
        frame: &Frame,
    ) {
        let NodeRef::Slot(id) = node else {
            return;
        };
        if frame.item.is_some() || deps.is_empty() {
            return;
        }
        self.job.bindings.push(Binding {
            node: *id,
            site,
            value,
            deps,
            branches: frame.branches.clone(),
        });
    }

    fn lower_handler(
        &mut self,
        node: &NodeRef,
        event: EventKind,
        code: &ast::Expr,
        frame: &Frame,
        out: &mut Vec<Stmt>,
    ) {
        match (node, frame.item) {
            (NodeRef::Slot(id), None) => {
                self.job.masks.insert(*id, event);
                self.job.handlers.push(EventHandler {
                    node: *id,
                    event,
                    code: code.clone(),
                    handler: Handler::Procedure(EventHandler::procedure_name(*id, event)),
                    branches: frame.branches.clone(),
                });
            }
            (_, Some(region)) => {
                out.push(Stmt::op(Op::RegisterHandler {
                    node: node.clone(),
                    event,
                    handler: Handler::Inline(code.clone()),
                }));
                out.push(Stmt::TrackHandler {
                    region,
                    node: node.clone(),
                    event,
                });
            }
            (_, None) => unreachable!("component-level node lowered as a local"),
        }
    }

    fn lower_component(&mut self, comp: &ComponentInstance, frame: &Frame, out: &mut Vec<Stmt>) {
        if let Some(region) = frame.item {
            self.lower_item_component(comp, region, frame, out);
            return;
        }
        let slot = match &comp.member_ref {
            Some(member) => ComponentSlot {
                instance: InstanceRef::Named(member.clone()),
                owned: false,
            },
            None => {
                let index = self.job.allocate_instance_index(&comp.type_name);
                ComponentSlot {
                    instance: InstanceRef::member(comp.type_name.clone(), index),
                    owned: true,
                }
            }
        };
        let props = self.child_props(comp);
        for prop in &props {
            out.push(Stmt::instance(
                slot.instance.clone(),
                InstanceAction::SetProp {
                    prop: prop.name.clone(),
                    value: prop.value.clone(),
                },
            ));
        }
        out.push(Stmt::instance(
            slot.instance.clone(),
            InstanceAction::View {
                parent: frame.parent.clone(),
                anchor: frame.anchor.clone(),
            },
        ));
        self.job.children.push(ChildInstance {
            slot,
            type_name: comp.type_name.clone(),
            props,
            branches: frame.branches.clone(),
        });
    }

    /// A component nested inside an element-loop item: constructed into a local and
    /// tracked with the item.
    fn lower_item_component(
        &mut self,
        comp: &ComponentInstance,
        region: LoopId,
        frame: &Frame,
        out: &mut Vec<Stmt>,
    ) {
        let instance = match &comp.member_ref {
            Some(member) => InstanceRef::Named(member.clone()),
            None => {
                let item = self
                    .items
                    .last_mut()
                    .unwrap_or_else(|| panic!("loop item state missing for {}", region));
                let name = format!("{}_{}", ITEM_INSTANCE, item.next_instance);
                item.next_instance += 1;
                out.push(Stmt::NewInstance {
                    name: name.clone(),
                    type_name: comp.type_name.clone(),
                });
                InstanceRef::Named(name)
            }
        };
        for prop in self.child_props(comp) {
            out.push(Stmt::instance(
                instance.clone(),
                InstanceAction::SetProp {
                    prop: prop.name,
                    value: prop.value,
                },
            ));
        }
        out.push(Stmt::instance(
            instance.clone(),
            InstanceAction::View {
                parent: frame.parent.clone(),
                anchor: frame.anchor.clone(),
            },
        ));
        out.push(Stmt::TrackInstance { region, instance });
    }

    fn child_props(&self, comp: &ComponentInstance) -> Vec<ChildProp> {
        let child_def = self.job.unit.component(&comp.type_name);
        comp.props
            .iter()
            .map(|prop| {
                let child_mutable = child_def
                    .and_then(|def| def.param(&prop.name))
                    .map(|param| param.is_mutable())
                    .unwrap_or(false);
                ChildProp {
                    name: prop.name.clone(),
                    value: self.prop_value(prop),
                    deps: self.extractor.reads(&prop.value, &LocalScope::new()),
                    child_mutable,
                }
            })
            .collect()
    }

    fn prop_value(&self, prop: &ast::Prop) -> PropValue {
        let component = self.job.component;
        if let Some(name) = prop.value.as_ident() {
            if component.method(name).is_some() && component.variable(name).is_none() {
                return PropValue::Callback(name.to_string());
            }
        }
        if prop.is_reference {
            PropValue::Reference(prop.value.clone())
        } else {
            PropValue::Value(prop.value.clone())
        }
    }

    fn lower_if(&mut self, node: &IfNode, frame: &Frame, out: &mut Vec<Stmt>) {
        let id = self.job.allocate_if_id();
        assert_eq!(self.job.if_regions.len(), id.as_usize(), "if-region ids out of order");
        self.job.if_regions.push(IfRegion {
            id,
            condition: node.condition.clone(),
            deps: self.extractor.reads(&node.condition, &LocalScope::new()),
            enclosing: frame.branches.clone(),
            then_branch: BranchLedger::default(),
            else_branch: BranchLedger::default(),
            line: node.line.clone(),
        });
        debug!(region = %id, line = %node.line, "if-region allocated");

        out.push(Stmt::op(Op::CreateNode {
            node: NodeRef::IfAnchor(id),
            kind: NodeKind::Anchor,
        }));
        self.attach(frame, NodeRef::IfAnchor(id), out);
        out.push(Stmt::SetHandle {
            slot: NodeRef::IfParent(id),
            value: frame.parent.clone(),
        });

        let then_branch = self.lower_branch(id, Branch::Then, &node.then_children, frame);
        let else_branch = self.lower_branch(id, Branch::Else, &node.else_children, frame);

        let mut then_body = then_branch.creation.clone();
        then_body.push(Stmt::SetIfState {
            region: id,
            value: Expr::Bool(true),
        });
        let mut else_body = else_branch.creation.clone();
        else_body.push(Stmt::SetIfState {
            region: id,
            value: Expr::Bool(false),
        });
        out.push(Stmt::If {
            cond: Expr::Source(node.condition.clone()),
            then_body,
            else_body,
        });

        let region = &mut self.job.if_regions[id.as_usize()];
        region.then_branch = then_branch;
        region.else_branch = else_branch;
    }

    /// Lowers one side of an if-region and records what it owns.
    fn lower_branch(
        &mut self,
        id: IfId,
        branch: Branch,
        children: &[ViewNode],
        frame: &Frame,
    ) -> BranchLedger {
        let nodes_before = self.job.node_count();
        let loops_before = self.job.loop_count();
        let ifs_before = self.job.if_count();
        let children_before = self.job.children.len();

        let mut branches = frame.branches.clone();
        branches.push(BranchRef::new(id, branch));
        let inner = Frame {
            parent: NodeRef::IfParent(id),
            anchor: Some(NodeRef::IfAnchor(id)),
            branches,
            item: None,
            item_root: false,
            only_child: false,
        };
        let mut creation = Vec::new();
        self.lower_children(children, &inner, &mut creation);

        BranchLedger {
            creation,
            elements: (nodes_before..self.job.node_count()).map(NodeId::new).collect(),
            components: self.job.children[children_before..]
                .iter()
                .map(|child| child.slot.clone())
                .collect(),
            loops: (loops_before..self.job.loop_count()).map(LoopId::new).collect(),
            ifs: (ifs_before..self.job.if_count()).map(IfId::new).collect(),
        }
    }

    /// Conditional inside a loop item: rebuilt with the item, no region of its own.
    fn lower_plain_if(&mut self, node: &IfNode, frame: &Frame, out: &mut Vec<Stmt>) {
        let then_body = self.lower_plain_body(&node.then_children, frame);
        let else_body = self.lower_plain_body(&node.else_children, frame);
        out.push(Stmt::If {
            cond: Expr::Source(node.condition.clone()),
            then_body,
            else_body,
        });
    }

    fn lower_plain_body(&mut self, children: &[ViewNode], frame: &Frame) -> Vec<Stmt> {
        let mut body = Vec::new();
        let inner = Frame {
            only_child: false,
            ..frame.clone()
        };
        self.lower_children(children, &inner, &mut body);
        body
    }

    fn lower_loop(&mut self, source: LoopSource, frame: &Frame, out: &mut Vec<Stmt>) {
        let id = self.job.allocate_loop_id();
        assert_eq!(self.job.loop_regions.len(), id.as_usize(), "loop-region ids out of order");
        let item_kind = self.classify_item(&source);
        let deps = self.loop_dependencies(&source);
        self.job.loop_regions.push(LoopRegion {
            id,
            var: source.var.to_string(),
            strategy: source.strategy.clone(),
            deps,
            item: item_kind.clone(),
            create_item: Vec::new(),
            update_item: Vec::new(),
            only_child: frame.only_child,
            enclosing: frame.branches.clone(),
            line: source.line.clone(),
        });
        debug!(region = %id, keyed = matches!(source.strategy, LoopStrategy::Keyed { .. }), "loop-region allocated");

        out.push(Stmt::op(Op::CreateNode {
            node: NodeRef::LoopAnchor(id),
            kind: NodeKind::Anchor,
        }));
        self.attach(frame, NodeRef::LoopAnchor(id), out);
        out.push(Stmt::SetHandle {
            slot: NodeRef::LoopParent(id),
            value: frame.parent.clone(),
        });

        let prelude = item_prelude(&source);
        let (create_item, update_item) = match &item_kind {
            LoopItem::Components { collection } => {
                self.lower_collection_item(id, &source, collection, prelude)
            }
            LoopItem::Elements => {
                let mut create = prelude;
                create.push(Stmt::BeginItem {
                    region: id,
                    at: Expr::local(ITEM_INDEX),
                });
                let inner = Frame {
                    parent: NodeRef::LoopParent(id),
                    anchor: Some(NodeRef::Var(ITEM_REF.to_string())),
                    branches: BranchPath::new(),
                    item: Some(id),
                    item_root: true,
                    only_child: false,
                };
                self.items.push(ItemLowering::default());
                self.lower_children(source.children, &inner, &mut create);
                self.items.pop();
                let update = if source.strategy_is_keyed() {
                    vec![Stmt::Call {
                        procedure: super::ir::sync_loop_item_name(id),
                        args: vec![Expr::local(ITEM_INDEX)],
                    }]
                } else {
                    Vec::new()
                };
                (create, update)
            }
            LoopItem::Empty => (Vec::new(), Vec::new()),
        };
        let region = &mut self.job.loop_regions[id.as_usize()];
        region.create_item = create_item;
        region.update_item = update_item;

        let region = &self.job.loop_regions[id.as_usize()];
        if frame.branches.is_empty() {
            if let LoopItem::Components {
                collection: collection @ Collection::Owned { .. },
            } = &region.item
            {
                out.extend(super::phases::loops::remount_owned(region, collection));
            }
            out.push(Stmt::call(super::ir::sync_loop_name(id)));
        } else {
            out.extend(super::phases::loops::initial_render(region));
        }
    }

    /// Item programs of a loop whose item is exactly one component instance.
    fn lower_collection_item(
        &mut self,
        id: LoopId,
        source: &LoopSource,
        collection: &Collection,
        prelude: Vec<Stmt>,
    ) -> (Vec<Stmt>, Vec<Stmt>) {
        let comp = source
            .children
            .iter()
            .find_map(|child| match child {
                ViewNode::Component(comp) => Some(comp),
                _ => None,
            })
            .unwrap_or_else(|| panic!("component loop {} without a component item", id));
        let view = InstanceAction::View {
            parent: NodeRef::LoopParent(id),
            anchor: Some(NodeRef::Var(ITEM_REF.to_string())),
        };
        let mut create = prelude.clone();
        let mut update = Vec::new();
        match collection {
            Collection::Member(_) => {
                create.push(Stmt::instance(InstanceRef::Named(source.var.to_string()), view));
            }
            Collection::Owned { .. } => {
                let local = InstanceRef::Named(ITEM_INSTANCE.to_string());
                let current = InstanceRef::item(collection.clone(), Expr::local(ITEM_INDEX));
                create.push(Stmt::NewInstance {
                    name: ITEM_INSTANCE.to_string(),
                    type_name: comp.type_name.clone(),
                });
                let props = self.child_props(comp);
                for prop in &props {
                    create.push(Stmt::instance(
                        local.clone(),
                        InstanceAction::SetProp {
                            prop: prop.name.clone(),
                            value: prop.value.clone(),
                        },
                    ));
                }
                create.push(Stmt::PushInstance {
                    collection: collection.clone(),
                    name: ITEM_INSTANCE.to_string(),
                });
                let last = Expr::binary(BinaryOp::Sub, Expr::Len(collection.clone()), Expr::Int(1));
                create.push(Stmt::instance(InstanceRef::item(collection.clone(), last), view));

                let refreshed: Vec<&ast::Prop> = comp
                    .props
                    .iter()
                    .filter(|prop| !prop.value.is_constant())
                    .collect();
                if !refreshed.is_empty() {
                    update = prelude;
                    for prop in refreshed {
                        update.push(Stmt::instance(
                            current.clone(),
                            InstanceAction::SetProp {
                                prop: prop.name.clone(),
                                value: self.prop_value(prop),
                            },
                        ));
                        update.push(Stmt::instance(
                            current.clone(),
                            InstanceAction::Update(prop.name.clone()),
                        ));
                    }
                }
            }
        }
        (create, update)
    }

    fn classify_item(&self, source: &LoopSource) -> LoopItem {
        if source.children.is_empty() {
            return LoopItem::Empty;
        }
        if let [ViewNode::Component(comp)] = source.children {
            match (&comp.member_ref, &source.strategy) {
                (None, _) => {
                    return LoopItem::Components {
                        collection: Collection::owned(comp.type_name.clone()),
                    }
                }
                (Some(member), LoopStrategy::Keyed { iterable, .. }) if member == source.var => {
                    if let Some(array) = iterable.as_ident() {
                        return LoopItem::Components {
                            collection: Collection::Member(array.to_string()),
                        };
                    }
                }
                _ => {}
            }
        }
        LoopItem::Elements
    }

    /// Range loops resync on their bounds; keyed loops also on anything their items read.
    fn loop_dependencies(&self, source: &LoopSource) -> DependencySet {
        let outer = LocalScope::new();
        match &source.strategy {
            LoopStrategy::Range { start, end } => self
                .extractor
                .reads(start, &outer)
                .union(&self.extractor.reads(end, &outer)),
            LoopStrategy::Keyed { iterable, .. } => {
                let mut deps = self.extractor.reads(iterable, &outer);
                let scope = outer.child(source.var);
                self.collect_subtree_reads(source.children, &scope, &mut deps);
                deps
            }
        }
    }

    fn collect_subtree_reads(&self, nodes: &[ViewNode], scope: &LocalScope, deps: &mut DependencySet) {
        for node in nodes {
            match node {
                ViewNode::Element(el) => {
                    for attr in &el.attrs {
                        if EventKind::from_attribute(&attr.name).is_none() {
                            deps.extend(&self.extractor.reads(&attr.value, scope));
                        }
                    }
                    self.collect_subtree_reads(&el.children, scope, deps);
                }
                ViewNode::Component(comp) => {
                    for prop in &comp.props {
                        deps.extend(&self.extractor.reads(&prop.value, scope));
                    }
                }
                ViewNode::If(node) => {
                    deps.extend(&self.extractor.reads(&node.condition, scope));
                    self.collect_subtree_reads(&node.then_children, scope, deps);
                    self.collect_subtree_reads(&node.else_children, scope, deps);
                }
                ViewNode::ForRange(node) => {
                    deps.extend(&self.extractor.reads(&node.start, scope));
                    deps.extend(&self.extractor.reads(&node.end, scope));
                    self.collect_subtree_reads(&node.children, &scope.child(node.var.clone()), deps);
                }
                ViewNode::ForEach(node) => {
                    deps.extend(&self.extractor.reads(&node.iterable, scope));
                    self.collect_subtree_reads(&node.children, &scope.child(node.var.clone()), deps);
                }
                ViewNode::RawHtml(raw) => self.collect_subtree_reads(&raw.children, scope, deps),
                ViewNode::Expr(expr) => deps.extend(&self.extractor.reads(expr, scope)),
                ViewNode::RoutePlaceholder(_) | ViewNode::Text(_) => {}
            }
        }
    }

    fn inline_reads(&self, children: &[ViewNode]) -> DependencySet {
        let mut deps = DependencySet::new();
        for child in children {
            if let ViewNode::Expr(expr) = child {
                deps.extend(&self.extractor.reads(expr, &LocalScope::new()));
            }
        }
        deps
    }
}

impl LoopSource<'_> {
    fn strategy_is_keyed(&self) -> bool {
        matches!(self.strategy, LoopStrategy::Keyed { .. })
    }
}

/// Binds the loop variable for item `_i`.
fn item_prelude(source: &LoopSource) -> Vec<Stmt> {
    let value = match &source.strategy {
        LoopStrategy::Range { start, .. } => Expr::binary(
            BinaryOp::Add,
            Expr::Source(start.clone()),
            Expr::local(ITEM_INDEX),
        ),
        LoopStrategy::Keyed { iterable, .. } => {
            Expr::Source(ast::Expr::index(iterable.clone(), ast::Expr::ident(ITEM_INDEX)))
        }
    };
    vec![Stmt::Let {
        name: source.var.to_string(),
        value,
    }]
}

/// The write a site performs
pub fn site_op(node: &NodeRef, site: &SiteKind, value: Expr) -> Op {
    let node = node.clone();
    match site {
        SiteKind::Attribute(name) => Op::SetAttribute {
            node,
            name: name.clone(),
            value,
        },
        SiteKind::Property(name) => Op::SetProperty {
            node,
            name: name.clone(),
            value,
        },
        SiteKind::Text => Op::SetText { node, value },
        SiteKind::InnerHtml => Op::SetInnerHtml { node, value },
    }
}

/// A user value as a runtime expression; interpolations become concatenations.
pub fn lower_value(expr: &ast::Expr) -> Expr {
    match expr {
        ast::Expr::Str(text) => Expr::Str(text.clone()),
        ast::Expr::Interpolated(parts) => Expr::Format(
            parts
                .iter()
                .map(|part| match part {
                    StrPart::Text(text) => Expr::Str(text.clone()),
                    StrPart::Expr(inner) => Expr::Source(inner.clone()),
                })
                .collect(),
        ),
        other => Expr::Source(other.clone()),
    }
}

/// Concatenated value of text/expression children and whether it is constant.
fn inline_content(children: &[ViewNode]) -> (Expr, bool) {
    let mut fragments = Vec::new();
    let mut constant = true;
    for child in children {
        match child {
            ViewNode::Text(text) => fragments.push(Expr::Str(text.clone())),
            ViewNode::Expr(expr) => {
                constant &= expr.is_constant();
                match lower_value(expr) {
                    Expr::Format(parts) => fragments.extend(parts),
                    value => fragments.push(value),
                }
            }
            _ => {}
        }
    }
    let value = match fragments.len() {
        0 => Expr::Str(String::new()),
        1 => fragments.remove(0),
        _ => Expr::Format(fragments),
    };
    (value, constant)
}
