//! Generic runtime for schema-driven extraction.
//!
//! This module knows nothing about Hugo: it compiles data models, walks a
//! source tree according to them, and runs named modifiers over the results.

pub mod config_loader;
pub mod context;
pub mod engine;
pub mod modifiers;
pub mod schema;

// Re-export key types
pub use config_loader::{ConverterConfig, DataModels};
pub use context::{AssetRefs, ResultContainer, Session, Trace};
pub use engine::Engine;
pub use modifiers::{Modifier, ModifierCall, ModifierRegistry};
pub use schema::{Composite, Directive, DispatchMode, MapNode, SchemaNode};
