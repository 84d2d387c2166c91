//! Recording Machine
//!
//! Runs the procedures of compiled component programs against an in-memory node
//! store. Every primitive op that reaches the store is recorded, resolved to a
//! concrete node id, so tests can assert on exactly what an update did.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use reactive_view_compiler::ast::{
    self, change_callback_name, BinaryOp, CompilationUnit, ComponentDef, StepOp, StrPart, UnaryOp,
};
use reactive_view_compiler::pipeline::ir::{
    Collection, ComponentProgram, EventKind, Expr, Handler, InstanceAction, InstanceRef, NodeId,
    NodeKind, NodeRef, Op, OpKind, PropValue, Stmt,
};
use reactive_view_compiler::pipeline::phases::events::argument_param;
use reactive_view_compiler::{compile_unit, CompilerConfig, DefaultMethodSchema};

/// Node every mounted component renders into
pub const HOST: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Component(usize),
    Node(Option<usize>),
}

impl Value {
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            Value::Float(v) => *v as i64,
            Value::Bool(b) => *b as i64,
            other => panic!("expected an int, got {:?}", other),
        }
    }

    pub fn as_component(&self) -> usize {
        match self {
            Value::Component(id) => *id,
            other => panic!("expected a component instance, got {:?}", other),
        }
    }

    pub fn as_node(&self) -> Option<usize> {
        match self {
            Value::Node(node) => *node,
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Component(_) => true,
            Value::Node(node) => node.is_some(),
        }
    }

    pub fn text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::text).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Component(id) => format!("<instance {}>", id),
            Value::Node(node) => format!("<node {:?}>", node),
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    use Value::*;
    match (op, lhs, rhs) {
        (BinaryOp::Add, Int(a), Int(b)) => Int(a + b),
        (BinaryOp::Sub, Int(a), Int(b)) => Int(a - b),
        (BinaryOp::Mul, Int(a), Int(b)) => Int(a * b),
        (BinaryOp::Div, Int(a), Int(b)) => Int(a / b),
        (BinaryOp::Rem, Int(a), Int(b)) => Int(a % b),
        (BinaryOp::Add, Str(a), b) => Str(a + &b.text()),
        (BinaryOp::Add, a, Str(b)) => Str(a.text() + &b),
        (BinaryOp::Eq, a, b) => Bool(a == b),
        (BinaryOp::Ne, a, b) => Bool(a != b),
        (BinaryOp::Lt, Int(a), Int(b)) => Bool(a < b),
        (BinaryOp::Le, Int(a), Int(b)) => Bool(a <= b),
        (BinaryOp::Gt, Int(a), Int(b)) => Bool(a > b),
        (BinaryOp::Ge, Int(a), Int(b)) => Bool(a >= b),
        (op, a, b) => {
            let (x, y) = (as_float(&a), as_float(&b));
            match op {
                BinaryOp::Add => Float(x + y),
                BinaryOp::Sub => Float(x - y),
                BinaryOp::Mul => Float(x * y),
                BinaryOp::Div => Float(x / y),
                BinaryOp::Lt => Bool(x < y),
                BinaryOp::Le => Bool(x <= y),
                BinaryOp::Gt => Bool(x > y),
                BinaryOp::Ge => Bool(x >= y),
                other => panic!("unsupported operands for {:?}: {:?}, {:?}", other, a, b),
            }
        }
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        other => panic!("expected a number, got {:?}", other),
    }
}

#[derive(Debug, Clone)]
pub struct DomNode {
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub attributes: IndexMap<String, String>,
    pub properties: IndexMap<String, String>,
    pub text: String,
    pub inner_html: String,
    /// Cleared when the node or one of its ancestors is removed
    pub live: bool,
}

impl DomNode {
    fn new(kind: NodeKind) -> Self {
        DomNode {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            text: String::new(),
            inner_html: String::new(),
            live: true,
        }
    }
}

/// One primitive op as it reached the store
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub component: String,
    pub kind: OpKind,
    pub node: usize,
    /// Attribute or property name, or the event kind
    pub name: Option<String>,
    pub value: Option<String>,
}

pub fn count(log: &[Applied], kind: OpKind) -> usize {
    log.iter().filter(|applied| applied.kind == kind).count()
}

pub fn kinds(log: &[Applied]) -> Vec<OpKind> {
    log.iter().map(|applied| applied.kind).collect()
}

/// Tracked state of one element-loop item
#[derive(Debug, Clone, Default)]
struct ItemRecord {
    roots: Vec<usize>,
    handlers: Vec<(usize, EventKind)>,
    instances: Vec<usize>,
}

type Locals = HashMap<String, Value>;

#[derive(Clone)]
enum Callback {
    /// A closure wired by the owner, run in the owner's scope
    Wired {
        owner: usize,
        body: Rc<Vec<Stmt>>,
        locals: Locals,
    },
    /// A method of the owner passed as a prop
    Method { owner: usize, procedure: String },
}

#[derive(Clone)]
struct Registration {
    instance: usize,
    handler: Handler,
    locals: Locals,
}

enum Flow {
    Next,
    Return(Option<Value>),
}

struct Ctx {
    inst: usize,
    locals: Locals,
}

impl Ctx {
    fn new(inst: usize) -> Self {
        Ctx {
            inst,
            locals: Locals::new(),
        }
    }
}

struct Instance {
    type_name: String,
    vars: IndexMap<String, Rc<RefCell<Value>>>,
    slots: Vec<Option<usize>>,
    if_state: Vec<bool>,
    if_parent: Vec<Option<usize>>,
    if_anchor: Vec<Option<usize>>,
    loop_count: Vec<i64>,
    loop_parent: Vec<Option<usize>>,
    loop_anchor: Vec<Option<usize>>,
    items: Vec<Vec<ItemRecord>>,
    open_item: Vec<usize>,
    owned: HashMap<String, Vec<usize>>,
    statics: HashMap<String, usize>,
    callbacks: HashMap<String, Callback>,
    route_parent: Option<usize>,
    route_anchor: Option<usize>,
    /// Insertion reference passed by the parent's `view(parent, before)`
    mount_anchor: Option<usize>,
}

impl Instance {
    fn new(type_name: &str, program: &ComponentProgram) -> Self {
        let ifs = program.if_regions.len();
        let loops = program.loop_regions.len();
        Instance {
            type_name: type_name.to_string(),
            vars: IndexMap::new(),
            slots: vec![None; program.node_count],
            if_state: vec![false; ifs],
            if_parent: vec![None; ifs],
            if_anchor: vec![None; ifs],
            loop_count: vec![0; loops],
            loop_parent: vec![None; loops],
            loop_anchor: vec![None; loops],
            items: vec![Vec::new(); loops],
            open_item: vec![0; loops],
            owned: HashMap::new(),
            statics: HashMap::new(),
            callbacks: HashMap::new(),
            route_parent: None,
            route_anchor: None,
            mount_anchor: None,
        }
    }
}

fn local_node_name(id: NodeId) -> String {
    format!("n{}", id.as_usize())
}

pub struct Machine {
    programs: HashMap<String, Rc<ComponentProgram>>,
    definitions: HashMap<String, ComponentDef>,
    nodes: Vec<DomNode>,
    instances: Vec<Instance>,
    registrations: HashMap<(usize, EventKind), Registration>,
    log: Vec<Applied>,
    depth: usize,
    /// Outermost construction batches closed so far
    pub flushes: usize,
}

impl Machine {
    pub fn new(unit: &CompilationUnit) -> Self {
        Self::with_config(unit, &CompilerConfig::default())
    }

    pub fn with_config(unit: &CompilationUnit, config: &CompilerConfig) -> Self {
        let schema = DefaultMethodSchema::new();
        let programs = compile_unit(unit, &schema, config).expect("unit should compile");
        Machine {
            programs: programs
                .into_iter()
                .map(|program| (program.component.clone(), Rc::new(program)))
                .collect(),
            definitions: unit
                .components
                .iter()
                .map(|def| (def.name.clone(), def.clone()))
                .collect(),
            nodes: vec![DomNode::new(NodeKind::Element("body".to_string()))],
            instances: Vec::new(),
            registrations: HashMap::new(),
            log: Vec::new(),
            depth: 0,
            flushes: 0,
        }
    }

    pub fn program(&self, type_name: &str) -> &ComponentProgram {
        self.programs
            .get(type_name)
            .unwrap_or_else(|| panic!("no program for `{}`", type_name))
    }

    fn program_of(&self, instance: usize) -> Rc<ComponentProgram> {
        let type_name = &self.instances[instance].type_name;
        Rc::clone(
            self.programs
                .get(type_name)
                .unwrap_or_else(|| panic!("no program for `{}`", type_name)),
        )
    }

    pub fn has_procedure(&self, instance: usize, name: &str) -> bool {
        self.program_of(instance).has_procedure(name)
    }

    /// Constructs an instance with every variable at its initializer or default.
    pub fn instantiate(&mut self, type_name: &str) -> usize {
        let program = Rc::clone(
            self.programs
                .get(type_name)
                .unwrap_or_else(|| panic!("no program for `{}`", type_name)),
        );
        let def = self
            .definitions
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| panic!("no definition for `{}`", type_name));
        let id = self.instances.len();
        self.instances.push(Instance::new(type_name, &program));
        for decl in def.variables() {
            let value = match &decl.init {
                Some(init) => {
                    let mut ctx = Ctx::new(id);
                    self.eval_ast(&mut ctx, init)
                }
                None => self.default_value(&decl.ty),
            };
            self.instances[id]
                .vars
                .insert(decl.name.clone(), Rc::new(RefCell::new(value)));
        }
        id
    }

    fn default_value(&mut self, ty: &str) -> Value {
        match ty {
            "int" => Value::Int(0),
            "float" => Value::Float(0.0),
            "bool" => Value::Bool(false),
            "string" => Value::Str(String::new()),
            "DOMElement" => Value::Node(None),
            t if t.ends_with("[]") => Value::Array(Vec::new()),
            t if self.definitions.contains_key(t) => Value::Component(self.instantiate(t)),
            _ => Value::Null,
        }
    }

    /// Instantiates `type_name` and renders it into the host node.
    pub fn mount(&mut self, type_name: &str) -> usize {
        let id = self.instantiate(type_name);
        self.call(id, "view", vec![Value::Node(Some(HOST))]);
        id
    }

    pub fn call(&mut self, instance: usize, name: &str, args: Vec<Value>) -> Option<Value> {
        let program = self.program_of(instance);
        let procedure = program
            .procedure(name)
            .unwrap_or_else(|| panic!("`{}` has no procedure `{}`", program.component, name));
        let mut ctx = Ctx::new(instance);
        for (param, arg) in procedure.params.iter().zip(args) {
            ctx.locals.insert(param.name.clone(), arg);
        }
        match self.exec_body(&mut ctx, &procedure.body) {
            Flow::Return(value) => value,
            Flow::Next => None,
        }
    }

    pub fn get(&self, instance: usize, var: &str) -> Value {
        self.instances[instance]
            .vars
            .get(var)
            .map(|cell| cell.borrow().clone())
            .unwrap_or_else(|| panic!("no variable `{}`", var))
    }

    /// Raw write, no update procedure runs.
    pub fn set(&mut self, instance: usize, var: &str, value: Value) {
        self.write_var(instance, var, value);
    }

    pub fn take_log(&mut self) -> Vec<Applied> {
        std::mem::take(&mut self.log)
    }

    pub fn slot(&self, instance: usize, id: usize) -> Option<usize> {
        self.instances[instance].slots[id]
    }

    pub fn node(&self, id: usize) -> &DomNode {
        &self.nodes[id]
    }

    pub fn is_live(&self, id: usize) -> bool {
        self.nodes[id].live
    }

    pub fn if_state(&self, instance: usize, region: usize) -> bool {
        self.instances[instance].if_state[region]
    }

    pub fn loop_count(&self, instance: usize, region: usize) -> i64 {
        self.instances[instance].loop_count[region]
    }

    pub fn item_count(&self, instance: usize, region: usize) -> usize {
        self.instances[instance].items[region].len()
    }

    /// Instances in the owned loop storage of `type_name`
    pub fn owned(&self, instance: usize, type_name: &str) -> Vec<usize> {
        self.instances[instance]
            .owned
            .get(&Collection::owned(type_name).storage_name())
            .cloned()
            .unwrap_or_default()
    }

    pub fn static_instance(&self, instance: usize, type_name: &str, index: usize) -> Option<usize> {
        self.instances[instance]
            .statics
            .get(&format!("{}_{}", type_name, index))
            .copied()
    }

    pub fn is_registered(&self, node: usize, event: EventKind) -> bool {
        self.registrations.contains_key(&(node, event))
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Live elements with `tag`, in document order
    pub fn find_all(&self, tag: &str) -> Vec<usize> {
        let mut found = Vec::new();
        self.collect_tag(HOST, tag, &mut found);
        found
    }

    fn collect_tag(&self, id: usize, tag: &str, found: &mut Vec<usize>) {
        for child in &self.nodes[id].children {
            if matches!(&self.nodes[*child].kind, NodeKind::Element(t) if t == tag) {
                found.push(*child);
            }
            self.collect_tag(*child, tag, found);
        }
    }

    /// Markup of everything under the host, anchors and attributes left out
    pub fn render(&self) -> String {
        self.nodes[HOST]
            .children
            .iter()
            .map(|child| self.render_node(*child))
            .collect()
    }

    pub fn render_node(&self, id: usize) -> String {
        let node = &self.nodes[id];
        let inner: String = node
            .children
            .iter()
            .map(|child| self.render_node(*child))
            .collect();
        match &node.kind {
            NodeKind::Element(tag) => format!(
                "<{}>{}{}{}</{}>",
                tag, node.inner_html, node.text, inner, tag
            ),
            NodeKind::Text => node.text.clone(),
            NodeKind::Anchor => String::new(),
        }
    }

    pub fn click(&mut self, node: usize) {
        self.dispatch(node, EventKind::Click, None);
    }

    pub fn input(&mut self, node: usize, text: &str) {
        self.dispatch(node, EventKind::Input, Some(Value::Str(text.to_string())));
    }

    pub fn dispatch(&mut self, node: usize, event: EventKind, argument: Option<Value>) {
        let registration = self
            .registrations
            .get(&(node, event))
            .cloned()
            .unwrap_or_else(|| panic!("no {} handler registered on node {}", event, node));
        match registration.handler {
            Handler::Procedure(name) => {
                let args = argument.into_iter().collect();
                self.call(registration.instance, &name, args);
            }
            Handler::Inline(code) => {
                let mut ctx = Ctx {
                    inst: registration.instance,
                    locals: registration.locals,
                };
                if let (Some(param), Some(arg)) = (argument_param(event), argument) {
                    ctx.locals.insert(param.name, arg);
                }
                match code.as_ident() {
                    Some(name) if self.has_procedure(ctx.inst, name) => {
                        self.call(ctx.inst, name, Vec::new());
                    }
                    _ => {
                        self.exec_ast(&mut ctx, &ast::Stmt::Expr(code.clone()));
                    }
                }
            }
        }
    }

    fn record(&mut self, inst: usize, kind: OpKind, node: usize, name: Option<String>, value: Option<String>) {
        let component = self.instances[inst].type_name.clone();
        self.log.push(Applied {
            component,
            kind,
            node,
            name,
            value,
        });
    }

    fn exec_body(&mut self, ctx: &mut Ctx, body: &[Stmt]) -> Flow {
        for stmt in body {
            if let Flow::Return(value) = self.exec(ctx, stmt) {
                return Flow::Return(value);
            }
        }
        Flow::Next
    }

    fn exec(&mut self, ctx: &mut Ctx, stmt: &Stmt) -> Flow {
        match stmt {
            Stmt::Op(op) => self.apply(ctx, op),
            Stmt::Let { name, value } => {
                let value = self.eval(ctx, value);
                ctx.locals.insert(name.clone(), value);
            }
            Stmt::LetNode { name, node } => {
                let node = self.resolve(ctx, node);
                ctx.locals.insert(name.clone(), Value::Node(node));
            }
            Stmt::SetIfState { region, value } => {
                let value = self.eval(ctx, value).truthy();
                self.instances[ctx.inst].if_state[region.as_usize()] = value;
            }
            Stmt::SetLoopCount { region, value } => {
                let value = self.eval(ctx, value).as_int();
                self.instances[ctx.inst].loop_count[region.as_usize()] = value;
            }
            Stmt::SetHandle { slot, value } => {
                let node = self.resolve(ctx, value);
                self.assign(ctx, slot, node);
            }
            Stmt::BindRef { field, node } => {
                let node = self.resolve(ctx, node);
                self.write_var(ctx.inst, field, Value::Node(node));
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = if self.eval(ctx, cond).truthy() {
                    then_body
                } else {
                    else_body
                };
                return self.exec_body(ctx, branch);
            }
            Stmt::Return => return Flow::Return(None),
            Stmt::ReturnNode(node) => {
                let node = self.resolve(ctx, node);
                return Flow::Return(Some(Value::Node(node)));
            }
            Stmt::ForRange {
                var,
                start,
                end,
                reverse,
                body,
            } => {
                let start = self.eval(ctx, start).as_int();
                let end = self.eval(ctx, end).as_int();
                let indices: Vec<i64> = if *reverse {
                    (start..end).rev().collect()
                } else {
                    (start..end).collect()
                };
                for index in indices {
                    ctx.locals.insert(var.clone(), Value::Int(index));
                    if let Flow::Return(value) = self.exec_body(ctx, body) {
                        return Flow::Return(value);
                    }
                }
            }
            Stmt::ForEach {
                var,
                iterable,
                body,
            } => {
                let items = match self.eval(ctx, iterable) {
                    Value::Array(items) => items,
                    other => panic!("cannot iterate over {:?}", other),
                };
                for item in items {
                    ctx.locals.insert(var.clone(), item);
                    if let Flow::Return(value) = self.exec_body(ctx, body) {
                        return Flow::Return(value);
                    }
                }
            }
            Stmt::Call { procedure, args } => {
                let args: Vec<Value> = args.iter().map(|arg| self.eval(ctx, arg)).collect();
                self.call(ctx.inst, procedure, args);
            }
            Stmt::Instance { target, action } => self.instance_action(ctx, target, action),
            Stmt::NewInstance { name, type_name } => {
                let id = self.instantiate(type_name);
                ctx.locals.insert(name.clone(), Value::Component(id));
            }
            Stmt::PushInstance { collection, name } => {
                let id = self.lookup(ctx, name).as_component();
                self.instances[ctx.inst]
                    .owned
                    .entry(collection.storage_name())
                    .or_default()
                    .push(id);
            }
            Stmt::PopInstance { collection } => {
                if let Some(stored) = self.instances[ctx.inst]
                    .owned
                    .get_mut(&collection.storage_name())
                {
                    stored.pop();
                }
            }
            Stmt::BeginItem { region, at } => {
                let at = self.eval(ctx, at).as_int() as usize;
                let instance = &mut self.instances[ctx.inst];
                let items = &mut instance.items[region.as_usize()];
                let open = if at < items.len() {
                    items[at] = ItemRecord::default();
                    at
                } else {
                    items.push(ItemRecord::default());
                    items.len() - 1
                };
                instance.open_item[region.as_usize()] = open;
            }
            Stmt::TrackRoot { region, node } => {
                let node = self.resolve_existing(ctx, node);
                self.open_record(ctx.inst, region.as_usize()).roots.push(node);
            }
            Stmt::TrackHandler {
                region,
                node,
                event,
            } => {
                let node = self.resolve_existing(ctx, node);
                self.open_record(ctx.inst, region.as_usize())
                    .handlers
                    .push((node, *event));
            }
            Stmt::TrackInstance { region, instance } => {
                let id = self.resolve_instance(ctx, instance);
                self.open_record(ctx.inst, region.as_usize())
                    .instances
                    .push(id);
            }
            Stmt::ReleaseItem { region, index } => {
                let index = self.eval(ctx, index).as_int() as usize;
                let record = std::mem::take(&mut self.instances[ctx.inst].items[region.as_usize()][index]);
                self.release(ctx.inst, record, false);
            }
            Stmt::DropItems { region, from, bulk } => {
                let from = self.eval(ctx, from).as_int() as usize;
                while self.instances[ctx.inst].items[region.as_usize()].len() > from {
                    let record = self.instances[ctx.inst].items[region.as_usize()]
                        .pop()
                        .unwrap_or_default();
                    self.release(ctx.inst, record, *bulk);
                }
            }
            Stmt::Exec(stmt) => return self.exec_ast(ctx, stmt),
            Stmt::NotifyChange(name) => {
                self.notify(ctx.inst, &change_callback_name(name));
            }
            Stmt::EnterView => self.depth += 1,
            Stmt::LeaveView => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.flushes += 1;
                }
            }
        }
        Flow::Next
    }

    fn open_record(&mut self, inst: usize, region: usize) -> &mut ItemRecord {
        let instance = &mut self.instances[inst];
        let open = instance.open_item[region];
        &mut instance.items[region][open]
    }

    /// Handlers first, then nested instances, then root nodes.
    fn release(&mut self, owner: usize, record: ItemRecord, bulk: bool) {
        for (node, event) in record.handlers {
            self.unregister(owner, node, event);
        }
        for child in record.instances {
            self.call(child, "_destroy", Vec::new());
        }
        if !bulk {
            for node in record.roots {
                self.remove_node(owner, node);
            }
        }
    }

    fn notify(&mut self, inst: usize, callback: &str) {
        let Some(callback) = self.instances[inst].callbacks.get(callback).cloned() else {
            return;
        };
        self.run_callback(callback, Vec::new());
    }

    fn run_callback(&mut self, callback: Callback, args: Vec<Value>) -> Option<Value> {
        match callback {
            Callback::Wired {
                owner,
                body,
                locals,
            } => {
                let mut ctx = Ctx {
                    inst: owner,
                    locals,
                };
                match self.exec_body(&mut ctx, &body) {
                    Flow::Return(value) => value,
                    Flow::Next => None,
                }
            }
            Callback::Method { owner, procedure } => self.call(owner, &procedure, args),
        }
    }

    fn apply(&mut self, ctx: &mut Ctx, op: &Op) {
        match op {
            Op::CreateNode { node, kind } => {
                let id = self.nodes.len();
                self.nodes.push(DomNode::new(kind.clone()));
                self.assign(ctx, node, Some(id));
                self.record(ctx.inst, OpKind::CreateNode, id, None, None);
            }
            Op::SetAttribute { node, name, value } => {
                let target = self.resolve_existing(ctx, node);
                let text = self.eval(ctx, value).text();
                self.nodes[target].attributes.insert(name.clone(), text.clone());
                self.record(ctx.inst, OpKind::SetAttribute, target, Some(name.clone()), Some(text));
            }
            Op::SetProperty { node, name, value } => {
                let target = self.resolve_existing(ctx, node);
                let text = self.eval(ctx, value).text();
                self.nodes[target].properties.insert(name.clone(), text.clone());
                self.record(ctx.inst, OpKind::SetProperty, target, Some(name.clone()), Some(text));
            }
            Op::SetText { node, value } => {
                let target = self.resolve_existing(ctx, node);
                let text = self.eval(ctx, value).text();
                self.nodes[target].text = text.clone();
                self.record(ctx.inst, OpKind::SetText, target, None, Some(text));
            }
            Op::SetInnerHtml { node, value } => {
                let target = self.resolve_existing(ctx, node);
                let html = self.eval(ctx, value).text();
                self.nodes[target].inner_html = html.clone();
                self.record(ctx.inst, OpKind::SetInnerHtml, target, None, Some(html));
            }
            Op::AppendChild { parent, node } => {
                let parent_id = self.resolve_existing(ctx, parent);
                let child = self.resolve_existing(ctx, node);
                let before = if *parent == NodeRef::Parent {
                    self.instances[ctx.inst]
                        .mount_anchor
                        .filter(|anchor| self.nodes[*anchor].parent == Some(parent_id))
                } else {
                    None
                };
                self.insert(parent_id, child, before);
                self.record(ctx.inst, OpKind::AppendChild, child, None, None);
            }
            Op::InsertBefore {
                parent,
                node,
                anchor,
            } => {
                let parent_id = self.resolve_existing(ctx, parent);
                let child = self.resolve_existing(ctx, node);
                let anchor = self.resolve(ctx, anchor);
                self.insert(parent_id, child, anchor);
                self.record(ctx.inst, OpKind::InsertBefore, child, None, None);
            }
            Op::RemoveNode { node } => {
                if let Some(id) = self.resolve(ctx, node) {
                    self.remove_node(ctx.inst, id);
                }
            }
            Op::ClearChildren { parent } => {
                let parent = self.resolve_existing(ctx, parent);
                let children = std::mem::take(&mut self.nodes[parent].children);
                for child in children {
                    self.nodes[child].parent = None;
                    self.kill(child);
                }
                self.record(ctx.inst, OpKind::ClearChildren, parent, None, None);
            }
            Op::RegisterHandler {
                node,
                event,
                handler,
            } => {
                let target = self.resolve_existing(ctx, node);
                self.registrations.insert(
                    (target, *event),
                    Registration {
                        instance: ctx.inst,
                        handler: handler.clone(),
                        locals: ctx.locals.clone(),
                    },
                );
                self.record(
                    ctx.inst,
                    OpKind::RegisterHandler,
                    target,
                    Some(event.as_str().to_string()),
                    None,
                );
            }
            Op::UnregisterHandler { node, event } => {
                if let Some(target) = self.resolve(ctx, node) {
                    self.unregister(ctx.inst, target, *event);
                }
            }
        }
    }

    fn unregister(&mut self, inst: usize, node: usize, event: EventKind) {
        self.registrations.remove(&(node, event));
        self.record(
            inst,
            OpKind::UnregisterHandler,
            node,
            Some(event.as_str().to_string()),
            None,
        );
    }

    fn remove_node(&mut self, inst: usize, id: usize) {
        self.detach(id);
        self.kill(id);
        self.record(inst, OpKind::RemoveNode, id, None, None);
    }

    fn insert(&mut self, parent: usize, child: usize, before: Option<usize>) {
        self.detach(child);
        let position =
            before.and_then(|anchor| self.nodes[parent].children.iter().position(|c| *c == anchor));
        match position {
            Some(position) => self.nodes[parent].children.insert(position, child),
            None => self.nodes[parent].children.push(child),
        }
        self.nodes[child].parent = Some(parent);
    }

    fn detach(&mut self, id: usize) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|child| *child != id);
        }
    }

    fn kill(&mut self, id: usize) {
        self.nodes[id].live = false;
        let children = self.nodes[id].children.clone();
        for child in children {
            self.kill(child);
        }
    }

    fn resolve(&mut self, ctx: &mut Ctx, node: &NodeRef) -> Option<usize> {
        match node {
            NodeRef::Slot(id) => self.instances[ctx.inst].slots[id.as_usize()],
            NodeRef::Local(id) => ctx.locals.get(&local_node_name(*id)).and_then(Value::as_node),
            NodeRef::Parent => ctx.locals.get("parent").and_then(Value::as_node),
            NodeRef::Var(name) => ctx.locals.get(name).and_then(Value::as_node),
            NodeRef::IfParent(id) => self.instances[ctx.inst].if_parent[id.as_usize()],
            NodeRef::IfAnchor(id) => self.instances[ctx.inst].if_anchor[id.as_usize()],
            NodeRef::LoopParent(id) => self.instances[ctx.inst].loop_parent[id.as_usize()],
            NodeRef::LoopAnchor(id) => self.instances[ctx.inst].loop_anchor[id.as_usize()],
            NodeRef::ItemRoot { region, index } => {
                let index = self.eval(ctx, index).as_int() as usize;
                self.instances[ctx.inst].items[region.as_usize()]
                    .get(index)
                    .and_then(|record| record.roots.first().copied())
            }
            NodeRef::InstanceRoot(instance) => {
                let child = self.resolve_instance(ctx, instance);
                self.call(child, "_get_root_element", Vec::new())
                    .and_then(|value| value.as_node())
            }
            NodeRef::RouteParent => self.instances[ctx.inst].route_parent,
            NodeRef::RouteAnchor => self.instances[ctx.inst].route_anchor,
        }
    }

    fn resolve_existing(&mut self, ctx: &mut Ctx, node: &NodeRef) -> usize {
        self.resolve(ctx, node)
            .unwrap_or_else(|| panic!("node handle {:?} is unset", node))
    }

    fn assign(&mut self, ctx: &mut Ctx, slot: &NodeRef, value: Option<usize>) {
        let instance = &mut self.instances[ctx.inst];
        match slot {
            NodeRef::Slot(id) => instance.slots[id.as_usize()] = value,
            NodeRef::Local(id) => {
                ctx.locals.insert(local_node_name(*id), Value::Node(value));
            }
            NodeRef::Var(name) => {
                ctx.locals.insert(name.clone(), Value::Node(value));
            }
            NodeRef::IfParent(id) => instance.if_parent[id.as_usize()] = value,
            NodeRef::IfAnchor(id) => instance.if_anchor[id.as_usize()] = value,
            NodeRef::LoopParent(id) => instance.loop_parent[id.as_usize()] = value,
            NodeRef::LoopAnchor(id) => instance.loop_anchor[id.as_usize()] = value,
            NodeRef::RouteParent => instance.route_parent = value,
            NodeRef::RouteAnchor => instance.route_anchor = value,
            other => panic!("cannot store a node into {:?}", other),
        }
    }

    fn collection(&self, inst: usize, collection: &Collection) -> Vec<usize> {
        match collection {
            Collection::Owned { .. } => self.instances[inst]
                .owned
                .get(&collection.storage_name())
                .cloned()
                .unwrap_or_default(),
            Collection::Member(name) => match self.get(inst, name) {
                Value::Array(items) => items.iter().map(Value::as_component).collect(),
                other => panic!("`{}` is not an instance array: {:?}", name, other),
            },
        }
    }

    fn resolve_instance(&mut self, ctx: &mut Ctx, instance: &InstanceRef) -> usize {
        match instance {
            InstanceRef::Member { type_name, index } => {
                let key = format!("{}_{}", type_name, index);
                if let Some(id) = self.instances[ctx.inst].statics.get(&key) {
                    return *id;
                }
                let id = self.instantiate(type_name);
                self.instances[ctx.inst].statics.insert(key, id);
                id
            }
            InstanceRef::Named(name) => self.lookup(ctx, name).as_component(),
            InstanceRef::Item { collection, index } => {
                let index = self.eval(ctx, index).as_int() as usize;
                let items = self.collection(ctx.inst, collection);
                *items.get(index).unwrap_or_else(|| {
                    panic!("{}[{}] is out of bounds", collection.storage_name(), index)
                })
            }
        }
    }

    fn instance_action(&mut self, ctx: &mut Ctx, target: &InstanceRef, action: &InstanceAction) {
        let child = self.resolve_instance(ctx, target);
        match action {
            InstanceAction::SetProp { prop, value } => self.set_prop(ctx, child, prop, value),
            InstanceAction::Update(prop) => {
                let name = format!("update_{}", prop);
                if self.has_procedure(child, &name) {
                    self.call(child, &name, Vec::new());
                }
            }
            InstanceAction::View { parent, anchor } => {
                let parent = self.resolve(ctx, parent);
                let anchor = anchor.as_ref().and_then(|anchor| self.resolve(ctx, anchor));
                self.instances[child].mount_anchor = anchor;
                self.call(child, "view", vec![Value::Node(parent)]);
            }
            InstanceAction::Rebind => {
                self.call(child, "_rebind", Vec::new());
            }
            InstanceAction::Destroy => {
                self.call(child, "_destroy", Vec::new());
            }
            InstanceAction::RemoveView { bulk } => {
                self.call(child, "_remove_view", vec![Value::Bool(*bulk)]);
            }
            InstanceAction::WireCallback { callback, body } => {
                let wired = Callback::Wired {
                    owner: ctx.inst,
                    body: Rc::new(body.clone()),
                    locals: ctx.locals.clone(),
                };
                self.instances[child].callbacks.insert(callback.clone(), wired);
            }
        }
    }

    fn set_prop(&mut self, ctx: &mut Ctx, child: usize, prop: &str, value: &PropValue) {
        match value {
            PropValue::Value(expr) => {
                let value = self.eval_ast(ctx, expr);
                self.instances[child]
                    .vars
                    .insert(prop.to_string(), Rc::new(RefCell::new(value)));
            }
            PropValue::Reference(expr) => {
                let shared = expr
                    .as_ident()
                    .filter(|name| !ctx.locals.contains_key(*name))
                    .and_then(|name| self.instances[ctx.inst].vars.get(name).cloned());
                let cell = match shared {
                    Some(cell) => cell,
                    None => Rc::new(RefCell::new(self.eval_ast(ctx, expr))),
                };
                self.instances[child].vars.insert(prop.to_string(), cell);
            }
            PropValue::Callback(method) => {
                let callback = Callback::Method {
                    owner: ctx.inst,
                    procedure: method.clone(),
                };
                self.instances[child].callbacks.insert(prop.to_string(), callback);
            }
        }
    }

    fn lookup(&self, ctx: &Ctx, name: &str) -> Value {
        if let Some(value) = ctx.locals.get(name) {
            return value.clone();
        }
        match self.instances[ctx.inst].vars.get(name) {
            Some(cell) => cell.borrow().clone(),
            None => panic!(
                "unknown name `{}` in `{}`",
                name, self.instances[ctx.inst].type_name
            ),
        }
    }

    fn write_var(&mut self, inst: usize, name: &str, value: Value) {
        match self.instances[inst].vars.get(name) {
            Some(cell) => *cell.borrow_mut() = value,
            None => {
                self.instances[inst]
                    .vars
                    .insert(name.to_string(), Rc::new(RefCell::new(value)));
            }
        }
    }

    fn assign_name(&mut self, ctx: &mut Ctx, name: &str, value: Value) {
        if ctx.locals.contains_key(name) {
            ctx.locals.insert(name.to_string(), value);
        } else {
            self.write_var(ctx.inst, name, value);
        }
    }

    fn assign_place(&mut self, ctx: &mut Ctx, target: &ast::Expr, value: Value) {
        match target {
            ast::Expr::Ident(name) => self.assign_name(ctx, name, value),
            ast::Expr::Member { object, member } => match self.eval_ast(ctx, object) {
                Value::Component(id) => self.write_var(id, member, value),
                other => panic!("cannot write member `{}` of {:?}", member, other),
            },
            ast::Expr::Index { object, index } => {
                let index = self.eval_ast(ctx, index).as_int() as usize;
                let mut array = self.eval_ast(ctx, object);
                match &mut array {
                    Value::Array(items) if index < items.len() => items[index] = value,
                    other => panic!("cannot write index {} of {:?}", index, other),
                }
                self.assign_place(ctx, object, array);
            }
            other => panic!("cannot assign to `{}`", other),
        }
    }

    fn eval(&mut self, ctx: &mut Ctx, expr: &Expr) -> Value {
        match expr {
            Expr::Source(source) => self.eval_ast(ctx, source),
            Expr::Int(value) => Value::Int(*value),
            Expr::Bool(value) => Value::Bool(*value),
            Expr::Str(text) => Value::Str(text.clone()),
            Expr::Local(name) => self.lookup(ctx, name),
            Expr::IfState(id) => Value::Bool(self.instances[ctx.inst].if_state[id.as_usize()]),
            Expr::LoopCount(id) => Value::Int(self.instances[ctx.inst].loop_count[id.as_usize()]),
            Expr::Len(collection) => Value::Int(self.collection(ctx.inst, collection).len() as i64),
            Expr::Size(inner) => match self.eval(ctx, inner) {
                Value::Array(items) => Value::Int(items.len() as i64),
                Value::Str(text) => Value::Int(text.chars().count() as i64),
                other => panic!("no size for {:?}", other),
            },
            Expr::ItemCount(id) => Value::Int(self.instances[ctx.inst].items[id.as_usize()].len() as i64),
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    let value = self.eval(ctx, lhs).truthy() && self.eval(ctx, rhs).truthy();
                    Value::Bool(value)
                }
                BinaryOp::Or => {
                    let value = self.eval(ctx, lhs).truthy() || self.eval(ctx, rhs).truthy();
                    Value::Bool(value)
                }
                _ => {
                    let lhs = self.eval(ctx, lhs);
                    let rhs = self.eval(ctx, rhs);
                    binary(*op, lhs, rhs)
                }
            },
            Expr::Not(inner) => Value::Bool(!self.eval(ctx, inner).truthy()),
            Expr::NodeValid(node) => {
                let node = self.resolve(ctx, node);
                Value::Bool(node.is_some_and(|id| self.nodes[id].live))
            }
            Expr::Format(parts) => {
                Value::Str(parts.iter().map(|part| self.eval(ctx, part).text()).collect())
            }
        }
    }

    fn eval_ast(&mut self, ctx: &mut Ctx, expr: &ast::Expr) -> Value {
        match expr {
            ast::Expr::Int(value) => Value::Int(*value),
            ast::Expr::Float(value) => Value::Float(*value),
            ast::Expr::Bool(value) => Value::Bool(*value),
            ast::Expr::Str(text) => Value::Str(text.clone()),
            ast::Expr::Interpolated(parts) => Value::Str(
                parts
                    .iter()
                    .map(|part| match part {
                        StrPart::Text(text) => text.clone(),
                        StrPart::Expr(inner) => self.eval_ast(ctx, inner).text(),
                    })
                    .collect(),
            ),
            ast::Expr::Ident(name) => self.lookup(ctx, name),
            ast::Expr::Member { object, member } => match self.eval_ast(ctx, object) {
                Value::Component(id) => self.get(id, member),
                Value::Array(items) if member == "length" => Value::Int(items.len() as i64),
                other => panic!("no member `{}` on {:?}", member, other),
            },
            ast::Expr::Index { object, index } => {
                let object = self.eval_ast(ctx, object);
                let index = self.eval_ast(ctx, index).as_int();
                match object {
                    Value::Array(items) => items
                        .get(index as usize)
                        .cloned()
                        .unwrap_or_else(|| panic!("index {} out of bounds", index)),
                    other => panic!("cannot index {:?}", other),
                }
            }
            ast::Expr::Call {
                receiver,
                method,
                args,
            } => self.eval_call(ctx, receiver.as_deref(), method, args),
            ast::Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    let value = self.eval_ast(ctx, lhs).truthy() && self.eval_ast(ctx, rhs).truthy();
                    Value::Bool(value)
                }
                BinaryOp::Or => {
                    let value = self.eval_ast(ctx, lhs).truthy() || self.eval_ast(ctx, rhs).truthy();
                    Value::Bool(value)
                }
                _ => {
                    let lhs = self.eval_ast(ctx, lhs);
                    let rhs = self.eval_ast(ctx, rhs);
                    binary(*op, lhs, rhs)
                }
            },
            ast::Expr::Unary { op, operand } => {
                let value = self.eval_ast(ctx, operand);
                match (op, value) {
                    (UnaryOp::Neg, Value::Int(v)) => Value::Int(-v),
                    (UnaryOp::Neg, Value::Float(v)) => Value::Float(-v),
                    (UnaryOp::Not, value) => Value::Bool(!value.truthy()),
                    (op, value) => panic!("cannot apply {:?} to {:?}", op, value),
                }
            }
            ast::Expr::Step { op, prefix, target } => {
                let old = self.eval_ast(ctx, target);
                let new = match op {
                    StepOp::Increment => binary(BinaryOp::Add, old.clone(), Value::Int(1)),
                    StepOp::Decrement => binary(BinaryOp::Sub, old.clone(), Value::Int(1)),
                };
                self.assign_place(ctx, target, new.clone());
                if *prefix {
                    new
                } else {
                    old
                }
            }
            ast::Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval_ast(ctx, cond).truthy() {
                    self.eval_ast(ctx, then)
                } else {
                    self.eval_ast(ctx, otherwise)
                }
            }
            ast::Expr::Array(items) => {
                Value::Array(items.iter().map(|item| self.eval_ast(ctx, item)).collect())
            }
        }
    }

    fn eval_call(
        &mut self,
        ctx: &mut Ctx,
        receiver: Option<&ast::Expr>,
        method: &str,
        args: &[ast::Expr],
    ) -> Value {
        let values: Vec<Value> = args.iter().map(|arg| self.eval_ast(ctx, arg)).collect();
        let Some(receiver) = receiver else {
            if self.definitions.contains_key(method) {
                return Value::Component(self.instantiate(method));
            }
            if let Some(callback) = self.instances[ctx.inst].callbacks.get(method).cloned() {
                return self.run_callback(callback, values).unwrap_or(Value::Null);
            }
            if self.has_procedure(ctx.inst, method) {
                return self.call(ctx.inst, method, values).unwrap_or(Value::Null);
            }
            return match (method, values.first()) {
                ("toString", Some(value)) => Value::Str(value.text()),
                _ => panic!("unknown function `{}`", method),
            };
        };

        let target = self.eval_ast(ctx, receiver);
        match (target, method) {
            (Value::Component(id), _) => self.call(id, method, values).unwrap_or(Value::Null),
            (Value::Array(mut items), "push" | "append") => {
                items.extend(values);
                self.assign_place(ctx, receiver, Value::Array(items));
                Value::Null
            }
            (Value::Array(mut items), "pop") => {
                let last = items.pop().unwrap_or(Value::Null);
                self.assign_place(ctx, receiver, Value::Array(items));
                last
            }
            (Value::Array(_), "clear") => {
                self.assign_place(ctx, receiver, Value::Array(Vec::new()));
                Value::Null
            }
            (Value::Array(mut items), "remove") => {
                let index = values.first().map(Value::as_int).unwrap_or(0) as usize;
                items.remove(index);
                self.assign_place(ctx, receiver, Value::Array(items));
                Value::Null
            }
            (Value::Array(items), "size" | "length") => Value::Int(items.len() as i64),
            (Value::Array(items), "isEmpty") => Value::Bool(items.is_empty()),
            (Value::Array(items), "contains") => {
                Value::Bool(values.first().is_some_and(|value| items.contains(value)))
            }
            (Value::Str(text), "size" | "length") => Value::Int(text.chars().count() as i64),
            (Value::Str(mut text), "append") => {
                for value in &values {
                    text.push_str(&value.text());
                }
                self.assign_place(ctx, receiver, Value::Str(text));
                Value::Null
            }
            (value, "toString") => Value::Str(value.text()),
            (other, method) => panic!("no method `{}` on {:?}", method, other),
        }
    }

    fn exec_ast_body(&mut self, ctx: &mut Ctx, body: &[ast::Stmt]) -> Flow {
        for stmt in body {
            if let Flow::Return(value) = self.exec_ast(ctx, stmt) {
                return Flow::Return(value);
            }
        }
        Flow::Next
    }

    fn exec_ast(&mut self, ctx: &mut Ctx, stmt: &ast::Stmt) -> Flow {
        match stmt {
            ast::Stmt::Let { name, ty, value } => {
                let value = match (value, ty) {
                    (Some(value), _) => self.eval_ast(ctx, value),
                    (None, Some(ty)) => self.default_value(ty),
                    (None, None) => Value::Null,
                };
                ctx.locals.insert(name.clone(), value);
            }
            ast::Stmt::Assign { target, value } => {
                let value = self.eval_ast(ctx, value);
                self.assign_name(ctx, target, value);
            }
            ast::Stmt::IndexAssign {
                target,
                index,
                value,
            } => {
                let value = self.eval_ast(ctx, value);
                let place = ast::Expr::index(target.clone(), index.clone());
                self.assign_place(ctx, &place, value);
            }
            ast::Stmt::MemberAssign {
                object,
                member,
                value,
            } => {
                let value = self.eval_ast(ctx, value);
                let place = ast::Expr::member(object.clone(), member.clone());
                self.assign_place(ctx, &place, value);
            }
            ast::Stmt::Expr(expr) => {
                self.eval_ast(ctx, expr);
            }
            ast::Stmt::Block(stmts) => return self.exec_ast_body(ctx, stmts),
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let branch = if self.eval_ast(ctx, cond).truthy() {
                    then_branch
                } else {
                    else_branch
                };
                return self.exec_ast_body(ctx, branch);
            }
            ast::Stmt::ForRange {
                var,
                start,
                end,
                body,
            } => {
                let start = self.eval_ast(ctx, start).as_int();
                let end = self.eval_ast(ctx, end).as_int();
                for index in start..end {
                    ctx.locals.insert(var.clone(), Value::Int(index));
                    if let Flow::Return(value) = self.exec_ast_body(ctx, body) {
                        return Flow::Return(value);
                    }
                }
            }
            ast::Stmt::ForEach {
                var,
                iterable,
                body,
            } => {
                let items = match self.eval_ast(ctx, iterable) {
                    Value::Array(items) => items,
                    other => panic!("cannot iterate over {:?}", other),
                };
                for item in items {
                    ctx.locals.insert(var.clone(), item);
                    if let Flow::Return(value) = self.exec_ast_body(ctx, body) {
                        return Flow::Return(value);
                    }
                }
            }
            ast::Stmt::Return(value) => {
                let value = value.as_ref().map(|expr| self.eval_ast(ctx, expr));
                return Flow::Return(value);
            }
        }
        Flow::Next
    }
}
