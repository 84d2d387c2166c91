//! View Tree Model
//!
//! The declarative view consumed by lowering. The tree owns its children; nothing
//! here carries behavior beyond small queries.

use serde::{Deserialize, Serialize};

use super::expression::Expr;
use crate::parse_util::SourceLine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewNode {
    Element(Element),
    Component(ComponentInstance),
    If(IfNode),
    ForRange(ForRangeNode),
    ForEach(ForEachNode),
    RawHtml(RawHtml),
    RoutePlaceholder(RoutePlaceholder),
    Text(String),
    Expr(Expr),
}

impl ViewNode {
    /// Text and expression children are folded into their parent's text content.
    pub fn is_inline_content(&self) -> bool {
        matches!(self, ViewNode::Text(_) | ViewNode::Expr(_))
    }

    pub fn text(text: impl Into<String>) -> Self {
        ViewNode::Text(text.into())
    }

    pub fn line(&self) -> Option<&SourceLine> {
        match self {
            ViewNode::Element(el) => Some(&el.line),
            ViewNode::Component(comp) => Some(&comp.line),
            ViewNode::If(node) => Some(&node.line),
            ViewNode::ForRange(node) => Some(&node.line),
            ViewNode::ForEach(node) => Some(&node.line),
            ViewNode::RawHtml(node) => Some(&node.line),
            ViewNode::RoutePlaceholder(node) => Some(&node.line),
            ViewNode::Text(_) | ViewNode::Expr(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Expr,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Expr) -> Self {
        Attribute {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attrs: Vec<Attribute>,
    #[serde(default)]
    pub children: Vec<ViewNode>,
    /// State field that receives the created node handle
    #[serde(default)]
    pub ref_binding: Option<String>,
    #[serde(default)]
    pub line: SourceLine,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            ref_binding: None,
            line: SourceLine::default(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.attrs.push(Attribute::new(name, value));
        self
    }

    pub fn child(mut self, child: ViewNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn has_structural_children(&self) -> bool {
        self.children.iter().any(|child| !child.is_inline_content())
    }
}

impl From<Element> for ViewNode {
    fn from(el: Element) -> Self {
        ViewNode::Element(el)
    }
}

/// A prop passed to a component instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop {
    pub name: String,
    pub value: Expr,
    /// `&value`: the child shares the parent's storage
    #[serde(default)]
    pub is_reference: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub type_name: String,
    #[serde(default)]
    pub props: Vec<Prop>,
    /// `<{member}/>`: renders an existing instance held in state instead of creating one
    #[serde(default)]
    pub member_ref: Option<String>,
    #[serde(default)]
    pub line: SourceLine,
}

impl ComponentInstance {
    pub fn new(type_name: impl Into<String>) -> Self {
        ComponentInstance {
            type_name: type_name.into(),
            props: Vec::new(),
            member_ref: None,
            line: SourceLine::default(),
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.props.push(Prop {
            name: name.into(),
            value,
            is_reference: false,
        });
        self
    }

    pub fn ref_prop(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.props.push(Prop {
            name: name.into(),
            value,
            is_reference: true,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfNode {
    pub condition: Expr,
    #[serde(default)]
    pub then_children: Vec<ViewNode>,
    #[serde(default)]
    pub else_children: Vec<ViewNode>,
    #[serde(default)]
    pub line: SourceLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForRangeNode {
    pub var: String,
    pub start: Expr,
    pub end: Expr,
    #[serde(default)]
    pub children: Vec<ViewNode>,
    #[serde(default)]
    pub line: SourceLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachNode {
    pub var: String,
    pub iterable: Expr,
    #[serde(default)]
    pub key: Option<Expr>,
    #[serde(default)]
    pub children: Vec<ViewNode>,
    #[serde(default)]
    pub line: SourceLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHtml {
    pub children: Vec<ViewNode>,
    #[serde(default)]
    pub line: SourceLine,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePlaceholder {
    #[serde(default)]
    pub line: SourceLine,
}
