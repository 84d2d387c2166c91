//! Schema Module
//!
//! Name/type resolution consumed by lowering: method mappings, handle types and
//! assignability.

pub mod default_method_schema;
pub mod method_schema;

pub use default_method_schema::*;
pub use method_schema::*;
