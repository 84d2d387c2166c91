//! Method Schema
//!
//! Interface to the name-resolution collaborator: maps source-level method names to
//! their target mapping and signature.

use serde::{Deserialize, Serialize};

/// How a source-level call is realised in the target program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingKind {
    /// Built into the target language or its standard collections
    Intrinsic,
    /// Expanded from a template at the call site
    InlineTemplate,
    /// Forwarded to a function in a target namespace
    NamespacedCall,
}

/// Signature returned by [`MethodSchema::lookup`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub mapping: MappingKind,
    pub params: Vec<String>,
    pub return_type: String,
}

impl MethodSignature {
    /// Methods returning nothing are called for their side effect on the receiver.
    pub fn is_void(&self) -> bool {
        self.return_type == "void"
    }
}

/// Name/type resolution consumed by lowering
pub trait MethodSchema: Send + Sync {
    /// Look up a method or free function by name
    fn lookup(&self, name: &str) -> Option<&MethodSignature>;

    /// Whether a type is a primitive resource handle (value-initialized, never assigned)
    fn is_handle(&self, ty: &str) -> bool;

    /// Whether a value of type `derived` may be used where `base` is expected
    fn is_assignable(&self, derived: &str, base: &str) -> bool;

    /// Whether `receiver.method(..)` writes to its receiver
    fn is_mutating_method(&self, method: &str) -> bool {
        self.lookup(method).map(MethodSignature::is_void).unwrap_or(false)
    }
}
