//! Structural Validation
//!
//! Checks run on a component before lowering. The first violation aborts the
//! compilation with the line it was found on.

use crate::ast::{CompilationUnit, ComponentDef, ComponentInstance, Element, ViewNode};
use crate::error::{CompileError, PropPassing, Result};
use crate::parse_util::SourceLine;
use crate::schema::MethodSchema;

/// Loop variables in scope and their element types, innermost last
type LoopBindings<'v> = Vec<(&'v str, Option<String>)>;

struct Validator<'a> {
    component: &'a ComponentDef,
    unit: &'a CompilationUnit,
    schema: &'a dyn MethodSchema,
}

pub fn validate_component(
    component: &ComponentDef,
    unit: &CompilationUnit,
    schema: &dyn MethodSchema,
) -> Result<()> {
    let Some(view) = &component.view else {
        return Ok(());
    };
    let validator = Validator {
        component,
        unit,
        schema,
    };
    let mut loops = LoopBindings::new();
    validator.check_nodes(view, &mut loops)
}

/// Element type of an array type name: `Item[]` -> `Item`
fn element_type(ty: &str) -> Option<&str> {
    ty.strip_suffix("[]")
}

impl<'a> Validator<'a> {
    fn check_nodes<'v>(&self, nodes: &'v [ViewNode], loops: &mut LoopBindings<'v>) -> Result<()> {
        for node in nodes {
            match node {
                ViewNode::Element(el) => {
                    self.check_element(el)?;
                    self.check_nodes(&el.children, loops)?;
                }
                ViewNode::Component(comp) => self.check_instance(comp, loops)?,
                ViewNode::If(node) => {
                    self.check_nodes(&node.then_children, loops)?;
                    self.check_nodes(&node.else_children, loops)?;
                }
                ViewNode::ForRange(node) => {
                    loops.push((node.var.as_str(), Some("int".to_string())));
                    self.check_nodes(&node.children, loops)?;
                    loops.pop();
                }
                ViewNode::ForEach(node) => {
                    if node.key.is_none() {
                        return Err(CompileError::MissingKey {
                            iterable: node.iterable.to_string(),
                            line: node.line.clone(),
                        });
                    }
                    let item_type = node
                        .iterable
                        .as_ident()
                        .and_then(|name| self.component.variable(name))
                        .and_then(|decl| element_type(&decl.ty).map(str::to_string));
                    loops.push((node.var.as_str(), item_type));
                    self.check_nodes(&node.children, loops)?;
                    loops.pop();
                }
                ViewNode::RawHtml(raw) => self.check_nodes(&raw.children, loops)?,
                ViewNode::RoutePlaceholder(_) | ViewNode::Text(_) | ViewNode::Expr(_) => {}
            }
        }
        Ok(())
    }

    fn check_element(&self, el: &Element) -> Result<()> {
        let Some(field) = &el.ref_binding else {
            return Ok(());
        };
        match self.component.state_var(field) {
            Some(decl) if self.schema.is_handle(&decl.ty) => Ok(()),
            _ => Err(CompileError::InvalidRef {
                name: field.clone(),
                line: el.line.clone(),
            }),
        }
    }

    fn check_instance(&self, comp: &ComponentInstance, loops: &LoopBindings) -> Result<()> {
        let line = &comp.line;
        let child = self
            .unit
            .component(&comp.type_name)
            .ok_or_else(|| CompileError::UnknownComponent {
                name: comp.type_name.clone(),
                line: line.clone(),
            })?;
        if child.view.is_none() {
            return Err(CompileError::MissingView {
                component: comp.type_name.clone(),
                line: line.clone(),
            });
        }

        for prop in &comp.props {
            let param = child
                .param(&prop.name)
                .ok_or_else(|| CompileError::UnknownProp {
                    component: comp.type_name.clone(),
                    prop: prop.name.clone(),
                    line: line.clone(),
                })?;
            if param.is_reference() != prop.is_reference {
                return Err(CompileError::ReferenceMismatch {
                    component: comp.type_name.clone(),
                    prop: prop.name.clone(),
                    expected: PropPassing::from_reference(param.is_reference()),
                    line: line.clone(),
                });
            }
        }

        if let Some(member) = &comp.member_ref {
            self.check_member_type(member, &comp.type_name, loops, line)?;
        }
        Ok(())
    }

    /// A rendered member must hold an instance of the requested component type.
    fn check_member_type(
        &self,
        member: &str,
        expected: &str,
        loops: &LoopBindings,
        line: &SourceLine,
    ) -> Result<()> {
        let actual = match loops.iter().rev().find(|(var, _)| *var == member) {
            Some((_, item_type)) => item_type.clone(),
            None => self.component.variable(member).map(|decl| decl.ty.clone()),
        };
        match actual {
            Some(actual) if !self.schema.is_assignable(&actual, expected) => {
                Err(CompileError::TypeMismatch {
                    member: member.to_string(),
                    actual,
                    expected: expected.to_string(),
                    line: line.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}
