//! Emit Module
//!
//! Renders a `ComponentProgram` as an indented listing for inspection. This is a
//! debug view of the procedures, not a target-language serialization.

use std::fmt::{self, Write};

use crate::ast;
use crate::pipeline::ir::{
    ComponentProgram, Expr, Handler, InstanceAction, InstanceRef, NodeKind, NodeRef,
    Op, Procedure, PropValue, Stmt,
};

const INDENT: &str = "  ";

struct Listing {
    out: String,
    depth: usize,
}

impl Listing {
    fn line(&mut self, args: fmt::Arguments) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        // writing into a String cannot fail
        let _ = self.out.write_fmt(args);
        self.out.push('\n');
    }

    fn block(&mut self, body: &[Stmt]) {
        self.depth += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.depth -= 1;
    }

    fn procedure(&mut self, procedure: &Procedure) {
        let params: Vec<String> = procedure
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        self.line(format_args!("proc {}({}) {{", procedure.name, params.join(", ")));
        self.block(&procedure.body);
        self.line(format_args!("}}"));
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Op(op) => self.line(format_args!("{}", OpDisplay(op))),
            Stmt::Let { name, value } => self.line(format_args!("let {} = {}", name, ExprDisplay(value))),
            Stmt::LetNode { name, node } => self.line(format_args!("let {} = {}", name, NodeDisplay(node))),
            Stmt::SetIfState { region, value } => {
                self.line(format_args!("{}.state = {}", region, ExprDisplay(value)))
            }
            Stmt::SetLoopCount { region, value } => {
                self.line(format_args!("{}.count = {}", region, ExprDisplay(value)))
            }
            Stmt::SetHandle { slot, value } => {
                self.line(format_args!("{} = {}", NodeDisplay(slot), NodeDisplay(value)))
            }
            Stmt::BindRef { field, node } => {
                self.line(format_args!("{} = {}", field, NodeDisplay(node)))
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.line(format_args!("if {} {{", ExprDisplay(cond)));
                self.block(then_body);
                if !else_body.is_empty() {
                    self.line(format_args!("}} else {{"));
                    self.block(else_body);
                }
                self.line(format_args!("}}"));
            }
            Stmt::Return => self.line(format_args!("return")),
            Stmt::ReturnNode(node) => self.line(format_args!("return {}", NodeDisplay(node))),
            Stmt::ForRange {
                var,
                start,
                end,
                reverse,
                body,
            } => {
                let rev = if *reverse { ".rev()" } else { "" };
                self.line(format_args!(
                    "for {} in ({}..{}){} {{",
                    var,
                    ExprDisplay(start),
                    ExprDisplay(end),
                    rev
                ));
                self.block(body);
                self.line(format_args!("}}"));
            }
            Stmt::ForEach {
                var,
                iterable,
                body,
            } => {
                self.line(format_args!("for {} in {} {{", var, ExprDisplay(iterable)));
                self.block(body);
                self.line(format_args!("}}"));
            }
            Stmt::Call { procedure, args } => {
                let args: Vec<String> = args.iter().map(|a| ExprDisplay(a).to_string()).collect();
                self.line(format_args!("{}({})", procedure, args.join(", ")))
            }
            Stmt::Instance { target, action } => self.instance(target, action),
            Stmt::NewInstance { name, type_name } => {
                self.line(format_args!("let {} = new {}()", name, type_name))
            }
            Stmt::PushInstance { collection, name } => self.line(format_args!(
                "{}.push({})",
                collection.storage_name(),
                name
            )),
            Stmt::PopInstance { collection } => {
                self.line(format_args!("{}.pop()", collection.storage_name()))
            }
            Stmt::BeginItem { region, at } => {
                self.line(format_args!("{}.begin_item({})", region, ExprDisplay(at)))
            }
            Stmt::TrackRoot { region, node } => {
                self.line(format_args!("{}.track_root({})", region, NodeDisplay(node)))
            }
            Stmt::TrackHandler {
                region,
                node,
                event,
            } => self.line(format_args!(
                "{}.track_handler({}, {})",
                region,
                NodeDisplay(node),
                event
            )),
            Stmt::TrackInstance { region, instance } => self.line(format_args!(
                "{}.track_instance({})",
                region,
                InstanceDisplay(instance)
            )),
            Stmt::ReleaseItem { region, index } => {
                self.line(format_args!("{}.release_item({})", region, ExprDisplay(index)))
            }
            Stmt::DropItems { region, from, bulk } => self.line(format_args!(
                "{}.drop_items(from: {}, bulk: {})",
                region,
                ExprDisplay(from),
                bulk
            )),
            Stmt::Exec(stmt) => self.line(format_args!("{}", AstStmtDisplay(stmt))),
            Stmt::NotifyChange(name) => self.line(format_args!(
                "notify {}",
                ast::change_callback_name(name)
            )),
            Stmt::EnterView => self.line(format_args!("enter_view()")),
            Stmt::LeaveView => self.line(format_args!("leave_view()")),
        }
    }

    fn instance(&mut self, target: &InstanceRef, action: &InstanceAction) {
        let target = InstanceDisplay(target);
        match action {
            InstanceAction::SetProp { prop, value } => {
                let value = match value {
                    PropValue::Value(expr) => expr.to_string(),
                    PropValue::Reference(expr) => format!("&{}", expr),
                    PropValue::Callback(method) => format!("callback {}", method),
                };
                self.line(format_args!("{}.{} = {}", target, prop, value))
            }
            InstanceAction::Update(prop) => self.line(format_args!("{}.update_{}()", target, prop)),
            InstanceAction::View { parent, anchor } => match anchor {
                Some(anchor) => self.line(format_args!(
                    "{}.view({}, before: {})",
                    target,
                    NodeDisplay(parent),
                    NodeDisplay(anchor)
                )),
                None => self.line(format_args!("{}.view({})", target, NodeDisplay(parent))),
            },
            InstanceAction::Rebind => self.line(format_args!("{}._rebind()", target)),
            InstanceAction::Destroy => self.line(format_args!("{}._destroy()", target)),
            InstanceAction::RemoveView { bulk } => {
                self.line(format_args!("{}._remove_view({})", target, bulk))
            }
            InstanceAction::WireCallback { callback, body } => {
                self.line(format_args!("{}.{} = || {{", target, callback));
                self.block(body);
                self.line(format_args!("}}"));
            }
        }
    }
}

struct NodeDisplay<'a>(&'a NodeRef);

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            NodeRef::Slot(id) => write!(f, "el[{}]", id.as_usize()),
            NodeRef::Local(id) => write!(f, "n{}", id.as_usize()),
            NodeRef::Parent => write!(f, "parent"),
            NodeRef::Var(name) => write!(f, "{}", name),
            NodeRef::IfParent(id) => write!(f, "{}.parent", id),
            NodeRef::IfAnchor(id) => write!(f, "{}.anchor", id),
            NodeRef::LoopParent(id) => write!(f, "{}.parent", id),
            NodeRef::LoopAnchor(id) => write!(f, "{}.anchor", id),
            NodeRef::ItemRoot { region, index } => {
                write!(f, "{}.item_root({})", region, ExprDisplay(index))
            }
            NodeRef::InstanceRoot(instance) => {
                write!(f, "{}._get_root_element()", InstanceDisplay(instance))
            }
            NodeRef::RouteParent => write!(f, "route.parent"),
            NodeRef::RouteAnchor => write!(f, "route.anchor"),
        }
    }
}

struct InstanceDisplay<'a>(&'a InstanceRef);

impl fmt::Display for InstanceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            InstanceRef::Member { type_name, index } => write!(f, "{}_{}", type_name, index),
            InstanceRef::Named(name) => write!(f, "{}", name),
            InstanceRef::Item { collection, index } => {
                write!(f, "{}[{}]", collection.storage_name(), ExprDisplay(index))
            }
        }
    }
}

struct ExprDisplay<'a>(&'a Expr);

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::Source(expr) => write!(f, "{}", expr),
            Expr::Int(value) => write!(f, "{}", value),
            Expr::Bool(value) => write!(f, "{}", value),
            Expr::Str(text) => write!(f, "{:?}", text),
            Expr::Local(name) => write!(f, "{}", name),
            Expr::IfState(id) => write!(f, "{}.state", id),
            Expr::LoopCount(id) => write!(f, "{}.count", id),
            Expr::Len(collection) => write!(f, "{}.len()", collection.storage_name()),
            Expr::Size(inner) => write!(f, "{}.size()", ExprDisplay(inner)),
            Expr::ItemCount(id) => write!(f, "{}.items.len()", id),
            Expr::Binary { op, lhs, rhs } => write!(
                f,
                "({} {} {})",
                ExprDisplay(lhs),
                op.symbol(),
                ExprDisplay(rhs)
            ),
            Expr::Not(inner) => write!(f, "!{}", ExprDisplay(inner)),
            Expr::NodeValid(node) => write!(f, "valid({})", NodeDisplay(node)),
            Expr::Format(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| ExprDisplay(p).to_string()).collect();
                write!(f, "concat({})", parts.join(", "))
            }
        }
    }
}

struct OpDisplay<'a>(&'a Op);

impl fmt::Display for OpDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Op::CreateNode { node, kind } => {
                let kind = match kind {
                    NodeKind::Element(tag) => format!("element <{}>", tag),
                    NodeKind::Text => "text".to_string(),
                    NodeKind::Anchor => "anchor".to_string(),
                };
                write!(f, "{} = create_node({})", NodeDisplay(node), kind)
            }
            Op::SetAttribute { node, name, value } => write!(
                f,
                "set_attribute({}, {:?}, {})",
                NodeDisplay(node),
                name,
                ExprDisplay(value)
            ),
            Op::SetProperty { node, name, value } => write!(
                f,
                "set_property({}, {:?}, {})",
                NodeDisplay(node),
                name,
                ExprDisplay(value)
            ),
            Op::SetText { node, value } => {
                write!(f, "set_text({}, {})", NodeDisplay(node), ExprDisplay(value))
            }
            Op::SetInnerHtml { node, value } => {
                write!(f, "set_inner_html({}, {})", NodeDisplay(node), ExprDisplay(value))
            }
            Op::AppendChild { parent, node } => {
                write!(f, "append_child({}, {})", NodeDisplay(parent), NodeDisplay(node))
            }
            Op::InsertBefore {
                parent,
                node,
                anchor,
            } => write!(
                f,
                "insert_before({}, {}, {})",
                NodeDisplay(parent),
                NodeDisplay(node),
                NodeDisplay(anchor)
            ),
            Op::RemoveNode { node } => write!(f, "remove_node({})", NodeDisplay(node)),
            Op::ClearChildren { parent } => write!(f, "clear_children({})", NodeDisplay(parent)),
            Op::RegisterHandler {
                node,
                event,
                handler,
            } => match handler {
                Handler::Procedure(name) => {
                    write!(f, "register_handler({}, {}, {})", NodeDisplay(node), event, name)
                }
                Handler::Inline(code) => write!(
                    f,
                    "register_handler({}, {}, || {})",
                    NodeDisplay(node),
                    event,
                    code
                ),
            },
            Op::UnregisterHandler { node, event } => {
                write!(f, "unregister_handler({}, {})", NodeDisplay(node), event)
            }
        }
    }
}

struct AstStmtDisplay<'a>(&'a ast::Stmt);

impl fmt::Display for AstStmtDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ast::Stmt::Let { name, value, .. } => match value {
                Some(value) => write!(f, "let {} = {}", name, value),
                None => write!(f, "let {}", name),
            },
            ast::Stmt::Assign { target, value } => write!(f, "{} = {}", target, value),
            ast::Stmt::IndexAssign {
                target,
                index,
                value,
            } => write!(f, "{}[{}] = {}", target, index, value),
            ast::Stmt::MemberAssign {
                object,
                member,
                value,
            } => write!(f, "{}.{} = {}", object, member, value),
            ast::Stmt::Expr(expr) => write!(f, "{}", expr),
            ast::Stmt::Block(stmts) => {
                let inner: Vec<String> = stmts.iter().map(|s| AstStmtDisplay(s).to_string()).collect();
                write!(f, "{{ {} }}", inner.join("; "))
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let then_text: Vec<String> =
                    then_branch.iter().map(|s| AstStmtDisplay(s).to_string()).collect();
                write!(f, "if {} {{ {} }}", cond, then_text.join("; "))?;
                if !else_branch.is_empty() {
                    let else_text: Vec<String> =
                        else_branch.iter().map(|s| AstStmtDisplay(s).to_string()).collect();
                    write!(f, " else {{ {} }}", else_text.join("; "))?;
                }
                Ok(())
            }
            ast::Stmt::ForRange {
                var,
                start,
                end,
                body,
            } => {
                let inner: Vec<String> = body.iter().map(|s| AstStmtDisplay(s).to_string()).collect();
                write!(f, "for {} in {}:{} {{ {} }}", var, start, end, inner.join("; "))
            }
            ast::Stmt::ForEach {
                var,
                iterable,
                body,
            } => {
                let inner: Vec<String> = body.iter().map(|s| AstStmtDisplay(s).to_string()).collect();
                write!(f, "for {} in {} {{ {} }}", var, iterable, inner.join("; "))
            }
            ast::Stmt::Return(value) => match value {
                Some(value) => write!(f, "return {}", value),
                None => write!(f, "return"),
            },
        }
    }
}

/// Renders every procedure of `program`, in emission order.
pub fn emit_listing(program: &ComponentProgram) -> String {
    let mut listing = Listing {
        out: String::new(),
        depth: 0,
    };
    listing.line(format_args!(
        "component {} (nodes: {}, if-regions: {}, loop-regions: {}{})",
        program.component,
        program.node_count,
        program.if_regions.len(),
        program.loop_regions.len(),
        if program.has_route { ", route" } else { "" }
    ));
    listing.depth += 1;
    for procedure in program.procedures.values() {
        listing.procedure(procedure);
    }
    listing.out
}
