//! Primitive Target Operations
//!
//! The fixed low-level render API the generated program drives. Everything the
//! synthesized procedures do to nodes or handler tables goes through one of these.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use super::stmt::{Expr, NodeRef};
use crate::ast;

static EVENT_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^on([a-z]+)$").unwrap());

/// Event kinds with a dispatcher table in the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Click,
    Input,
    Change,
    Keydown,
}

/// Argument a handler receives from its dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventArgument {
    None,
    /// Current string value of the target
    Value,
    /// Key code of the pressed key
    KeyCode,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Click,
        EventKind::Input,
        EventKind::Change,
        EventKind::Keydown,
    ];

    /// `onclick` -> `Click`. Unknown `on*` names are plain attributes.
    pub fn from_attribute(name: &str) -> Option<EventKind> {
        let captures = EVENT_ATTRIBUTE.captures(name)?;
        match &captures[1] {
            "click" => Some(EventKind::Click),
            "input" => Some(EventKind::Input),
            "change" => Some(EventKind::Change),
            "keydown" => Some(EventKind::Keydown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Input => "input",
            EventKind::Change => "change",
            EventKind::Keydown => "keydown",
        }
    }

    pub fn argument(&self) -> EventArgument {
        match self {
            EventKind::Click => EventArgument::None,
            EventKind::Input | EventKind::Change => EventArgument::Value,
            EventKind::Keydown => EventArgument::KeyCode,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            EventKind::Click => 0,
            EventKind::Input => 1,
            EventKind::Change => 2,
            EventKind::Keydown => 3,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `CreateNode` creates
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(String),
    Text,
    /// Empty placeholder used as an insertion reference
    Anchor,
}

/// Code run by a dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    /// A synthesized `_handler_*` procedure of this component
    Procedure(String),
    /// A closure over loop-local values, evaluated in the scope it was registered in
    Inline(ast::Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    CreateNode {
        node: NodeRef,
        kind: NodeKind,
    },
    SetAttribute {
        node: NodeRef,
        name: String,
        value: Expr,
    },
    /// DOM property write (`value`, `checked`, `selected`)
    SetProperty {
        node: NodeRef,
        name: String,
        value: Expr,
    },
    SetText {
        node: NodeRef,
        value: Expr,
    },
    SetInnerHtml {
        node: NodeRef,
        value: Expr,
    },
    AppendChild {
        parent: NodeRef,
        node: NodeRef,
    },
    InsertBefore {
        parent: NodeRef,
        node: NodeRef,
        anchor: NodeRef,
    },
    RemoveNode {
        node: NodeRef,
    },
    /// Drops every child of `parent` in one operation
    ClearChildren {
        parent: NodeRef,
    },
    RegisterHandler {
        node: NodeRef,
        event: EventKind,
        handler: Handler,
    },
    UnregisterHandler {
        node: NodeRef,
        event: EventKind,
    },
}

/// Discriminant of [`Op`], used by tests and the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    CreateNode,
    SetAttribute,
    SetProperty,
    SetText,
    SetInnerHtml,
    AppendChild,
    InsertBefore,
    RemoveNode,
    ClearChildren,
    RegisterHandler,
    UnregisterHandler,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::CreateNode { .. } => OpKind::CreateNode,
            Op::SetAttribute { .. } => OpKind::SetAttribute,
            Op::SetProperty { .. } => OpKind::SetProperty,
            Op::SetText { .. } => OpKind::SetText,
            Op::SetInnerHtml { .. } => OpKind::SetInnerHtml,
            Op::AppendChild { .. } => OpKind::AppendChild,
            Op::InsertBefore { .. } => OpKind::InsertBefore,
            Op::RemoveNode { .. } => OpKind::RemoveNode,
            Op::ClearChildren { .. } => OpKind::ClearChildren,
            Op::RegisterHandler { .. } => OpKind::RegisterHandler,
            Op::UnregisterHandler { .. } => OpKind::UnregisterHandler,
        }
    }

    /// The node this op acts on (the child for append/insert)
    pub fn target(&self) -> &NodeRef {
        match self {
            Op::CreateNode { node, .. }
            | Op::SetAttribute { node, .. }
            | Op::SetProperty { node, .. }
            | Op::SetText { node, .. }
            | Op::SetInnerHtml { node, .. }
            | Op::AppendChild { node, .. }
            | Op::InsertBefore { node, .. }
            | Op::RemoveNode { node }
            | Op::RegisterHandler { node, .. }
            | Op::UnregisterHandler { node, .. } => node,
            Op::ClearChildren { parent } => parent,
        }
    }

    /// Rewrites a blind append under `parent` into an insertion before `anchor`.
    pub fn anchored(self, anchor: &NodeRef) -> Op {
        match self {
            Op::AppendChild { parent, node } => Op::InsertBefore {
                parent,
                node,
                anchor: anchor.clone(),
            },
            other => other,
        }
    }
}
