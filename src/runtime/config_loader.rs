//! Converter configuration and data model loading.
//!
//! Two YAML documents drive a conversion: the converter configuration
//! (logging, URL rewriting, field mangling) and the data models that
//! describe how WordPress export elements map onto Hugo records. When the
//! configuration names no separate data model file, the configuration file
//! itself holds the data models.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, ConfigResult};
use crate::runtime::schema::SchemaNode;

/// Converter configuration.
///
/// Every field has a default, so an empty file is a valid configuration.
/// Keys this crate does not use (output paths, markdown options, ...) are
/// accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// WordPress export file
    #[serde(default = "default_wpxr_file")]
    pub wpxr_file: PathBuf,

    /// Separate data model file (the configuration file itself when unset)
    #[serde(default)]
    pub data_models: Option<PathBuf>,

    /// Site-relative path of uploaded images in the export
    #[serde(default = "default_image_origin_rel_url")]
    pub image_origin_rel_url: String,

    /// Site-relative path images are served from after conversion
    #[serde(default = "default_image_rel_url")]
    pub image_rel_url: String,

    #[serde(default = "default_true")]
    pub use_author_display_name_in_metadata: bool,

    /// new field name -> field name produced by the data model
    #[serde(default = "default_rename_fields")]
    pub rename_fields: IndexMap<String, String>,

    /// `{field: value}` pairs removed from every record
    #[serde(default = "default_remove_field_values")]
    pub remove_field_values: Vec<IndexMap<String, JsonValue>>,

    /// field -> (regex -> replacement), applied by `fields-value-replace`
    #[serde(default)]
    pub fields_value_replace: IndexMap<String, IndexMap<String, String>>,

    /// Item types that take part in the page hierarchy
    #[serde(default = "default_page_types")]
    pub page_types: Vec<String>,
}

fn default_loglevel() -> String {
    "error".to_string()
}

fn default_wpxr_file() -> PathBuf {
    PathBuf::from("wpxr/wpxr.xml")
}

fn default_image_origin_rel_url() -> String {
    "/wp-content/uploads".to_string()
}

fn default_image_rel_url() -> String {
    "/images".to_string()
}

fn default_true() -> bool {
    true
}

fn default_rename_fields() -> IndexMap<String, String> {
    [
        ("attached_file", "_wp_attached_file"),
        ("attachment_alt", "_wp_attachment_image_alt"),
        ("categories", "category"),
        ("featured_image", "_thumbnail_id"),
        ("layout", "_wp_page_template"),
        ("number_edits", "_edit_last"),
        ("old_slug", "_wp_old_slug"),
        ("tags", "post_tag"),
    ]
    .into_iter()
    .map(|(new, old)| (new.to_string(), old.to_string()))
    .collect()
}

fn default_remove_field_values() -> Vec<IndexMap<String, JsonValue>> {
    vec![
        IndexMap::from([("aliases".to_string(), JsonValue::from("/"))]),
        IndexMap::from([("draft".to_string(), JsonValue::Bool(false))]),
    ]
}

fn default_page_types() -> Vec<String> {
    vec!["page".to_string(), "post".to_string(), "posts".to_string()]
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            wpxr_file: default_wpxr_file(),
            data_models: None,
            image_origin_rel_url: default_image_origin_rel_url(),
            image_rel_url: default_image_rel_url(),
            use_author_display_name_in_metadata: true,
            rename_fields: default_rename_fields(),
            remove_field_values: default_remove_field_values(),
            fields_value_replace: IndexMap::new(),
            page_types: default_page_types(),
        }
    }
}

impl ConverterConfig {
    /// Load converter configuration from a YAML file.
    ///
    /// Relative `wpxr_file` and `data_models` paths are resolved against the
    /// directory holding the configuration file.
    ///
    /// # Example
    /// ```ignore
    /// use wpxr_hugo::runtime::ConverterConfig;
    ///
    /// let config = ConverterConfig::load_from_file("wpxr-to-static.yaml")?;
    /// println!("Export: {}", config.wpxr_file.display());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = read_file(path)?;
        let mut config = Self::from_yaml_str(&contents)?;

        if let Some(base) = path.parent() {
            config.wpxr_file = base.join(&config.wpxr_file);
            config.data_models = config.data_models.map(|models| base.join(models));
        }
        Ok(config)
    }

    /// Parse configuration from YAML text. Empty text yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Where the data models live: `data_models` or else the config file itself.
    pub fn data_models_path<'a>(&'a self, config_path: &'a Path) -> &'a Path {
        self.data_models.as_deref().unwrap_or(config_path)
    }
}

/// The two compiled data models a conversion needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DataModels {
    /// Composite applied to the channel to build the site configuration
    pub hugo_project_config: SchemaNode,
    /// List schema applied to the channel to build one record per item
    pub hugo_wp_items: SchemaNode,
}

impl DataModels {
    /// Load and compile data models from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = read_file(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(&value)
    }

    /// Compile data models from an already-parsed document.
    ///
    /// Both sections must be present and be maps; `hugo_wp_items` also needs
    /// a `tag` to select the items by.
    pub fn from_value(value: &JsonValue) -> ConfigResult<Self> {
        let hugo_wp_items = section(value, "hugo_wp_items")?;
        let hugo_project_config = section(value, "hugo_project_config")?;

        Ok(Self {
            hugo_project_config: SchemaNode::compile_composite(
                hugo_project_config,
                "hugo_project_config",
            )?,
            hugo_wp_items: SchemaNode::compile_list(hugo_wp_items, "hugo_wp_items")?,
        })
    }
}

fn section<'a>(value: &'a JsonValue, name: &str) -> ConfigResult<&'a JsonValue> {
    match value.get(name) {
        Some(section @ JsonValue::Object(_)) => Ok(section),
        Some(_) => Err(ConfigError::InvalidDataModel(format!("'{}' is not a map", name))),
        None => Err(ConfigError::InvalidDataModel(format!("missing '{}'", name))),
    }
}

fn read_file(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
