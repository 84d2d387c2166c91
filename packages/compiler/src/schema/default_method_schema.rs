//! Default Method Schema
//!
//! Table-driven schema covering the built-in collection and string methods, the
//! primitive handle types and numeric widening.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use super::method_schema::{MappingKind, MethodSchema, MethodSignature};

/// Built-in methods
///
/// ## Format:
/// Each line: `name|mapping|return_type|param,param`
///
/// `mapping` is one of `i` (intrinsic), `t` (inline template) or `n` (namespaced call).
static BUILTIN_METHODS: &[&str] = &[
    "push|i|void|T",
    "pop|i|void|",
    "clear|i|void|",
    "append|i|void|string",
    "insert|i|void|int,T",
    "remove|i|void|int",
    "sort|t|void|",
    "reverse|t|void|",
    "resize|i|void|int",
    "size|i|int|",
    "length|i|int|",
    "isEmpty|t|bool|",
    "contains|t|bool|T",
    "indexOf|t|int|T",
    "substr|i|string|int,int",
    "toString|n|string|",
    "random|n|float|",
    "now|n|float|",
];

static HANDLE_TYPES: &[&str] = &[
    "DOMElement",
    "Canvas",
    "CanvasContext",
    "Image",
    "Audio",
    "Timer",
];

static DEFAULT_TABLE: Lazy<HashMap<String, MethodSignature>> = Lazy::new(|| {
    BUILTIN_METHODS
        .iter()
        .filter_map(|line| parse_schema_line(line))
        .collect()
});

fn parse_schema_line(line: &str) -> Option<(String, MethodSignature)> {
    let mut fields = line.split('|');
    let name = fields.next()?;
    let mapping = match fields.next()? {
        "i" => MappingKind::Intrinsic,
        "t" => MappingKind::InlineTemplate,
        "n" => MappingKind::NamespacedCall,
        _ => return None,
    };
    let return_type = fields.next()?.to_string();
    let params = fields
        .next()
        .unwrap_or("")
        .split(',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    Some((
        name.to_string(),
        MethodSignature {
            mapping,
            params,
            return_type,
        },
    ))
}

/// Schema used when the caller supplies none
#[derive(Debug, Clone)]
pub struct DefaultMethodSchema {
    methods: HashMap<String, MethodSignature>,
    handles: HashSet<String>,
    /// `derived -> base` edges declared by the host
    supertypes: HashMap<String, String>,
}

impl Default for DefaultMethodSchema {
    fn default() -> Self {
        DefaultMethodSchema {
            methods: DEFAULT_TABLE.clone(),
            handles: HANDLE_TYPES.iter().map(|s| s.to_string()).collect(),
            supertypes: HashMap::new(),
        }
    }
}

impl DefaultMethodSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, name: impl Into<String>, signature: MethodSignature) -> Self {
        self.methods.insert(name.into(), signature);
        self
    }

    pub fn with_handle(mut self, ty: impl Into<String>) -> Self {
        self.handles.insert(ty.into());
        self
    }

    pub fn with_supertype(mut self, derived: impl Into<String>, base: impl Into<String>) -> Self {
        self.supertypes.insert(derived.into(), base.into());
        self
    }
}

impl MethodSchema for DefaultMethodSchema {
    fn lookup(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.get(name)
    }

    fn is_handle(&self, ty: &str) -> bool {
        self.handles.contains(ty)
    }

    fn is_assignable(&self, derived: &str, base: &str) -> bool {
        if derived == base || base == "any" {
            return true;
        }
        if derived == "int" && base == "float" {
            return true;
        }
        let mut current = derived;
        // at most one hop per declared edge
        for _ in 0..self.supertypes.len() {
            match self.supertypes.get(current) {
                Some(parent) if parent == base => return true,
                Some(parent) => current = parent,
                None => break,
            }
        }
        false
    }
}
