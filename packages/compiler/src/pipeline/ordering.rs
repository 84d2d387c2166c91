//! Component Ordering
//!
//! Orders the components of a unit so every component comes after the components
//! it instantiates. The order is deterministic: ties follow declaration order.

use indexmap::{IndexMap, IndexSet};

use crate::ast::{CompilationUnit, ComponentDef, ViewNode};
use crate::error::{CompileError, Result};
use crate::parse_util::SourceLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Component types instantiated by `component`'s view, with the first line each appears on
pub fn instantiated_types(component: &ComponentDef) -> IndexMap<String, SourceLine> {
    fn walk(nodes: &[ViewNode], found: &mut IndexMap<String, SourceLine>) {
        for node in nodes {
            match node {
                ViewNode::Component(comp) => {
                    found
                        .entry(comp.type_name.clone())
                        .or_insert_with(|| comp.line.clone());
                }
                ViewNode::Element(el) => walk(&el.children, found),
                ViewNode::If(node) => {
                    walk(&node.then_children, found);
                    walk(&node.else_children, found);
                }
                ViewNode::ForRange(node) => walk(&node.children, found),
                ViewNode::ForEach(node) => walk(&node.children, found),
                ViewNode::RawHtml(raw) => walk(&raw.children, found),
                ViewNode::RoutePlaceholder(_) | ViewNode::Text(_) | ViewNode::Expr(_) => {}
            }
        }
    }
    let mut found = IndexMap::new();
    if let Some(view) = &component.view {
        walk(view, &mut found);
    }
    found
}

struct Ordering<'a> {
    unit: &'a CompilationUnit,
    marks: IndexMap<&'a str, Mark>,
    stack: Vec<&'a str>,
    order: IndexSet<&'a str>,
}

impl<'a> Ordering<'a> {
    fn visit(&mut self, component: &'a ComponentDef, line: &SourceLine) -> Result<()> {
        match self.marks.get(component.name.as_str()) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = self
                    .stack
                    .iter()
                    .position(|name| *name == component.name)
                    .unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.stack[start..].iter().map(|name| name.to_string()).collect();
                cycle.push(component.name.clone());
                return Err(CompileError::CircularDependency {
                    cycle,
                    line: line.clone(),
                });
            }
            None => {}
        }

        self.marks.insert(&component.name, Mark::Visiting);
        self.stack.push(&component.name);
        for (type_name, used_at) in instantiated_types(component) {
            if let Some(child) = self.unit.component(&type_name) {
                self.visit(child, &used_at)?;
            }
        }
        self.stack.pop();
        self.marks.insert(&component.name, Mark::Done);
        self.order.insert(&component.name);
        Ok(())
    }
}

/// Components of `unit`, leaves first.
pub fn order_components(unit: &CompilationUnit) -> Result<Vec<&ComponentDef>> {
    let mut ordering = Ordering {
        unit,
        marks: IndexMap::new(),
        stack: Vec::new(),
        order: IndexSet::new(),
    };
    for component in &unit.components {
        ordering.visit(component, &component.line)?;
    }
    Ok(ordering
        .order
        .into_iter()
        .filter_map(|name| unit.component(name))
        .collect())
}
