//! Dependency Extractor
//!
//! Computes what an expression reads (component variables and `object.member`
//! pairs) and what a statement writes (resolved to the outermost named entity).
//! Names bound by loops, method parameters and method-local declarations shadow
//! component variables and never appear in either set.

use indexmap::IndexSet;
use std::collections::{BTreeSet, HashSet};

use crate::ast::{ComponentDef, Expr, Stmt, StrPart};
use crate::schema::MethodSchema;

/// A read of `object.member`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberDependency {
    pub object: String,
    pub member: String,
}

/// Variables and member pairs an expression reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    pub vars: BTreeSet<String>,
    pub members: BTreeSet<MemberDependency>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.members.is_empty()
    }

    pub fn contains_var(&self, name: &str) -> bool {
        self.vars.contains(name)
    }

    pub fn contains_member(&self, object: &str, member: &str) -> bool {
        self.members
            .iter()
            .any(|dep| dep.object == object && dep.member == member)
    }

    pub fn extend(&mut self, other: &DependencySet) {
        self.vars.extend(other.vars.iter().cloned());
        self.members.extend(other.members.iter().cloned());
    }

    pub fn union(mut self, other: &DependencySet) -> Self {
        self.extend(other);
        self
    }
}

/// Names that shadow component variables inside a method body or loop item
#[derive(Debug, Clone, Default)]
pub struct LocalScope {
    names: HashSet<String>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LocalScope {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn bind(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn child(&self, name: impl Into<String>) -> LocalScope {
        let mut scope = self.clone();
        scope.bind(name);
        scope
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Dependency queries scoped to one component
pub struct DependencyExtractor<'a> {
    /// Props and state variables of the component
    declared: HashSet<&'a str>,
    schema: &'a dyn MethodSchema,
    /// Arrays backing keyed component loops; index writes to them need no resync
    keyed_component_arrays: HashSet<String>,
}

impl<'a> DependencyExtractor<'a> {
    pub fn new(component: &'a ComponentDef, schema: &'a dyn MethodSchema) -> Self {
        DependencyExtractor {
            declared: component.variables().map(|v| v.name.as_str()).collect(),
            schema,
            keyed_component_arrays: HashSet::new(),
        }
    }

    pub fn with_keyed_component_arrays<I>(mut self, arrays: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.keyed_component_arrays.extend(arrays);
        self
    }

    fn is_component_variable(&self, name: &str, scope: &LocalScope) -> bool {
        !scope.contains(name) && self.declared.contains(name)
    }

    /// Component variables and member pairs read by `expr`.
    pub fn reads(&self, expr: &Expr, scope: &LocalScope) -> DependencySet {
        let mut deps = DependencySet::new();
        self.collect_reads(expr, scope, &mut deps);
        deps
    }

    fn collect_reads(&self, expr: &Expr, scope: &LocalScope, deps: &mut DependencySet) {
        match expr {
            Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::Str(_) => {}
            Expr::Interpolated(parts) => {
                for part in parts {
                    if let StrPart::Expr(inner) = part {
                        self.collect_reads(inner, scope, deps);
                    }
                }
            }
            Expr::Ident(name) => {
                if self.is_component_variable(name, scope) {
                    deps.vars.insert(name.clone());
                }
            }
            Expr::Member { object, member } => {
                if let Expr::Ident(name) = object.as_ref() {
                    if self.is_component_variable(name, scope) {
                        deps.members.insert(MemberDependency {
                            object: name.clone(),
                            member: member.clone(),
                        });
                    }
                }
                self.collect_reads(object, scope, deps);
            }
            Expr::Index { object, index } => {
                self.collect_reads(object, scope, deps);
                self.collect_reads(index, scope, deps);
            }
            Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.collect_reads(receiver, scope, deps);
                }
                for arg in args {
                    self.collect_reads(arg, scope, deps);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.collect_reads(lhs, scope, deps);
                self.collect_reads(rhs, scope, deps);
            }
            Expr::Unary { operand, .. } => self.collect_reads(operand, scope, deps),
            Expr::Step { target, .. } => self.collect_reads(target, scope, deps),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.collect_reads(cond, scope, deps);
                self.collect_reads(then, scope, deps);
                self.collect_reads(otherwise, scope, deps);
            }
            Expr::Array(items) => {
                for item in items {
                    self.collect_reads(item, scope, deps);
                }
            }
        }
    }

    /// Component variables written by `body`, in first-write order.
    pub fn writes(&self, body: &[Stmt], scope: &LocalScope) -> IndexSet<String> {
        let mut written = IndexSet::new();
        let mut scope = scope.clone();
        for stmt in body {
            self.collect_writes(stmt, &mut scope, &mut written);
        }
        written
    }

    fn collect_writes(&self, stmt: &Stmt, scope: &mut LocalScope, written: &mut IndexSet<String>) {
        match stmt {
            Stmt::Let { name, .. } => scope.bind(name.clone()),
            Stmt::Assign { target, .. } => self.record_write(target, scope, written),
            Stmt::IndexAssign { target, .. } => {
                if let Some(root) = target.root_identifier() {
                    if !self.keyed_component_arrays.contains(root) {
                        self.record_write(root, scope, written);
                    }
                }
            }
            Stmt::MemberAssign { object, .. } => {
                if let Some(root) = object.root_identifier() {
                    self.record_write(root, scope, written);
                }
            }
            Stmt::Expr(expr) => self.collect_expr_writes(expr, scope, written),
            Stmt::Block(stmts) => {
                let mut inner = scope.clone();
                for stmt in stmts {
                    self.collect_writes(stmt, &mut inner, written);
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                for branch in [then_branch, else_branch] {
                    let mut inner = scope.clone();
                    for stmt in branch {
                        self.collect_writes(stmt, &mut inner, written);
                    }
                }
            }
            Stmt::ForRange { var, body, .. } | Stmt::ForEach { var, body, .. } => {
                let mut inner = scope.child(var.clone());
                for stmt in body {
                    self.collect_writes(stmt, &mut inner, written);
                }
            }
            Stmt::Return(_) => {}
        }
    }

    fn collect_expr_writes(&self, expr: &Expr, scope: &LocalScope, written: &mut IndexSet<String>) {
        match expr {
            Expr::Step { target, .. } => {
                if let Some(root) = target.root_identifier() {
                    self.record_write(root, scope, written);
                }
            }
            Expr::Call {
                receiver: Some(receiver),
                method,
                ..
            } if self.schema.is_mutating_method(method) => {
                if let Some(root) = receiver.root_identifier() {
                    self.record_write(root, scope, written);
                }
            }
            _ => {}
        }
    }

    fn record_write(&self, name: &str, scope: &LocalScope, written: &mut IndexSet<String>) {
        if self.is_component_variable(name, scope) {
            written.insert(name.to_string());
        }
    }
}
