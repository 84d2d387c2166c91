//! Component Definitions
//!
//! Declared state, props, methods and the view tree of one component, plus the
//! compilation unit that groups the components of one build.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::expression::Expr;
use super::statement::Stmt;
use super::view::ViewNode;
use crate::parse_util::{capitalize, SourceLine};

bitflags! {
    /// Mutability, visibility and reference-ness of a declared variable
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DeclFlags: u8 {
        const MUTABLE = 0b0001;
        const PUBLIC = 0b0010;
        const REFERENCE = 0b0100;
    }
}

/// A state variable or a prop (component parameter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: String,
    #[serde(default)]
    pub init: Option<Expr>,
    #[serde(default)]
    pub flags: DeclFlags,
    #[serde(default)]
    pub line: SourceLine,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        VarDecl {
            name: name.into(),
            ty: ty.into(),
            init: None,
            flags: DeclFlags::empty(),
            line: SourceLine::default(),
        }
    }

    pub fn with_flags(mut self, flags: DeclFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_init(mut self, init: Expr) -> Self {
        self.init = Some(init);
        self
    }

    pub fn is_mutable(&self) -> bool {
        self.flags.contains(DeclFlags::MUTABLE)
    }

    pub fn is_public(&self) -> bool {
        self.flags.contains(DeclFlags::PUBLIC)
    }

    pub fn is_reference(&self) -> bool {
        self.flags.contains(DeclFlags::REFERENCE)
    }

    /// `on<Name>Change`
    pub fn change_callback(&self) -> String {
        change_callback_name(&self.name)
    }
}

pub fn change_callback_name(name: &str) -> String {
    format!("on{}Change", capitalize(name))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodParam {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<MethodParam>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub line: SourceLine,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, body: Vec<Stmt>) -> Self {
        MethodDef {
            name: name.into(),
            params: Vec::new(),
            body,
            line: SourceLine::default(),
        }
    }

    pub fn hook(&self) -> Option<LifecycleHook> {
        LifecycleHook::from_method_name(&self.name)
    }
}

/// Methods the runtime calls by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleHook {
    Init,
    Mount,
    Tick,
}

impl LifecycleHook {
    pub fn from_method_name(name: &str) -> Option<Self> {
        match name {
            "init" => Some(LifecycleHook::Init),
            "mount" => Some(LifecycleHook::Mount),
            "tick" => Some(LifecycleHook::Tick),
            _ => None,
        }
    }

    /// Name of the renamed user procedure
    pub fn procedure_name(&self) -> &'static str {
        match self {
            LifecycleHook::Init => "_user_init",
            LifecycleHook::Mount => "_user_mount",
            LifecycleHook::Tick => "_user_tick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<VarDecl>,
    #[serde(default)]
    pub state: Vec<VarDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    /// `None` when the component declares no view body
    #[serde(default)]
    pub view: Option<Vec<ViewNode>>,
    #[serde(default)]
    pub line: SourceLine,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>) -> Self {
        ComponentDef {
            name: name.into(),
            params: Vec::new(),
            state: Vec::new(),
            methods: Vec::new(),
            view: None,
            line: SourceLine::default(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&VarDecl> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn state_var(&self, name: &str) -> Option<&VarDecl> {
        self.state.iter().find(|s| s.name == name)
    }

    /// Prop or state variable, props first.
    pub fn variable(&self, name: &str) -> Option<&VarDecl> {
        self.param(name).or_else(|| self.state_var(name))
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Every declared variable, props first, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &VarDecl> {
        self.params.iter().chain(self.state.iter())
    }

    pub fn hook(&self, hook: LifecycleHook) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.hook() == Some(hook))
    }
}

/// All component definitions of one build, in any order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub components: Vec<ComponentDef>,
}

impl CompilationUnit {
    pub fn new(components: Vec<ComponentDef>) -> Self {
        CompilationUnit { components }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentDef> {
        self.components.iter().find(|c| c.name == name)
    }
}
