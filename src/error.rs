//! Error types for the conversion pipeline.
//!
//! One enum per layer:
//!
//! - [`SourceError`] - XML parsing and required document structure
//! - [`SchemaError`] - structurally invalid data models, found at compile time
//! - [`HierarchyError`] - inconsistent parent references between records
//! - [`ConfigError`] - configuration and data model loading
//! - [`ConvertError`] - top-level pipeline errors
//! - [`SerializationError`] - record writers
//!
//! `From` conversions let `?` cross from the lower layers into [`ConvertError`].

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while reading the XML export.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The XML reader rejected the document.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Well-formed events that do not build a tree (unbalanced tags, bad escapes).
    #[error("Malformed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// No element at all.
    #[error("Document has no root element")]
    EmptyDocument,

    /// The export has no top-level `channel`.
    #[error("Missing channel")]
    MissingChannel,
}

// =============================================================================
// Schema Errors
// =============================================================================

/// A structural defect in a data model schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid data model at '{path}': {message}")]
pub struct SchemaError {
    /// Breadcrumb of the offending node (e.g. `hugo_wp_items.contained.postmeta`).
    pub path: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Hierarchy Errors
// =============================================================================

/// Parent references that cannot form a forest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// Walking up from `id` revisited a node.
    #[error("Parent cycle detected from page {id}: {chain:?}")]
    Cycle { id: i64, chain: Vec<i64> },

    /// A page map lookup for an id that was never registered.
    #[error("Page {0} is not in the page map")]
    UnknownPage(i64),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while loading configuration or data models.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required data model section is missing or not a map.
    #[error("Invalid data_model for '{0}'")]
    InvalidDataModel(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Invalid regex '{pattern}' for field '{field}': {source}")]
    Regex {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Convert Errors (top-level)
// =============================================================================

/// Top-level errors of a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    /// `hugo_project_config` extracted nothing from the channel.
    #[error("Failed to create site config")]
    EmptySiteConfig,

    /// None of `baseURL`, `baseBlogURL`, `homepage` were extracted.
    #[error("No suitable base URL for the site has been defined")]
    MissingSiteUrl,
}

// =============================================================================
// Serialization Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type SourceResult<T> = Result<T, SourceError>;

pub type SchemaResult<T> = Result<T, SchemaError>;

pub type ConfigResult<T> = Result<T, ConfigError>;

pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let err: ConvertError = SourceError::MissingChannel.into();
        assert!(err.to_string().contains("Missing channel"));

        let err: ConvertError = HierarchyError::Cycle { id: 3, chain: vec![3, 4, 3] }.into();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_schema_error_reaches_convert_error_through_config() {
        let err: ConvertError = ConfigError::from(SchemaError::new("hugo_wp_items", "bad")).into();
        assert!(matches!(err, ConvertError::Config(ConfigError::Schema(_))));
        assert!(err.to_string().contains("hugo_wp_items"));
    }

    #[test]
    fn test_schema_error_format() {
        let err = SchemaError::new("hugo_wp_items.contains[2]", "'list' cannot use a 'no_tag' schema");
        let msg = err.to_string();
        assert!(msg.contains("hugo_wp_items.contains[2]"));
        assert!(msg.contains("no_tag"));
    }
}
