//! # wpxr-hugo: Schema-Driven WordPress to Hugo Conversion
//!
//! wpxr-hugo turns a WordPress XML export (WXR) into Hugo content records.
//! What gets extracted is not hard-coded: YAML data models describe how
//! export elements map onto record fields, and named modifiers post-process
//! the extracted values.
//!
//! ## Features
//!
//! - **Schema-dispatch engine**: `attr`, `item` and `list` directives over a parsed export
//! - **Modifier registry**: built-in and caller-supplied value transforms, looked up by name
//! - **Page hierarchy**: parent paths and cascading draft status for pages
//! - **Hugo pipeline**: site config, URL/image rewriting, field renames and removals
//!
//! ## Example: Data Model
//!
//! ```yaml
//! hugo_wp_items:
//!   tag: item
//!   contains:
//!     - item: title
//!     - item: wp_id
//!     - list: postmeta
//!       modifiers: [key-value, list-up-map]
//!   contained:
//!     title: title
//!     wp_id: wp:post_id
//!     postmeta:
//!       tag: wp:postmeta
//!       key: meta_key
//!       value: meta_value
//!       contains:
//!         - item: meta_key
//!         - item: meta_value
//!       contained:
//!         meta_key: wp:meta_key
//!         meta_value: wp:meta_value
//! ```

// Core modules
pub mod error;
pub mod source;

// Generic schema-driven extraction
pub mod runtime;

// Record post-processing
pub mod hierarchy;
pub mod mangle;

// Hugo conversion pipeline
pub mod hugo;

pub mod serialization;

// Re-export key types
pub use error::{
    ConfigError, ConvertError, HierarchyError, SchemaError, SerializationError, SourceError,
};
pub use hierarchy::{PageMap, PageNode};
pub use hugo::{Conversion, HugoConverter};
pub use mangle::{ContentMap, MangleOptions, Mangler};
pub use source::{Element, NamespaceMap, QName, SourceDocument};

// Re-export runtime types
pub use runtime::{
    ConverterConfig, DataModels, Engine, Modifier, ModifierCall, ModifierRegistry, SchemaNode,
    Session, Trace,
};
