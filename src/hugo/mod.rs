//! WordPress export to Hugo conversion pipeline.
//!
//! Wires the generic runtime to the Hugo data models:
//!
//! 1. find the export's `channel`
//! 2. extract the site config (`hugo_project_config`) and the site URL
//! 3. extract one record per item (`hugo_wp_items`), with the Hugo modifiers
//! 4. run the mangling passes (content, page map, renames, draft, removals)
//!
//! Nothing here touches the filesystem; writing a Hugo site out of a
//! [`Conversion`] is up to the caller.

pub mod html;
pub mod modifiers;
pub mod url;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConfigResult, ConvertError, ConvertResult};
use crate::hierarchy::PageMap;
use crate::mangle::{ContentMap, MangleOptions, Mangler};
use crate::runtime::{
    AssetRefs, ConverterConfig, DataModels, Engine, ModifierRegistry, ResultContainer, Session,
    Trace,
};
use crate::source::SourceDocument;

pub use modifiers::{compile_replacements, hugo_modifiers, FieldReplacements, HugoContext};

/// Site config keys that may hold the site's base URL, in order of preference.
const SITE_URL_KEYS: [&str; 3] = ["baseURL", "baseBlogURL", "homepage"];

/// Everything a conversion run produces.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub site_url: String,
    /// Result of `hugo_project_config`
    pub site_config: Value,
    /// One record per item, mangled
    pub items: Vec<Value>,
    /// Item bodies keyed by `wp_id`
    pub content: ContentMap,
    pub page_map: PageMap,
    /// Image URLs found in content and their site-relative paths
    pub assets: AssetRefs,
    /// Named counters bumped by modifiers
    pub counters: Vec<(String, u64)>,
}

impl Conversion {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|(counter, _)| counter == name)
            .map(|(_, value)| *value)
            .unwrap_or(0)
    }
}

/// Converts a parsed export into Hugo records.
///
/// # Example
/// ```ignore
/// use wpxr_hugo::{HugoConverter, SourceDocument};
/// use wpxr_hugo::runtime::{ConverterConfig, DataModels};
///
/// let config = ConverterConfig::load_from_file("wpxr-to-static.yaml")?;
/// let models = DataModels::load_from_file("hugo_data_model.yaml")?;
/// let document = SourceDocument::parse(&std::fs::read_to_string(&config.wpxr_file)?)?;
///
/// let conversion = HugoConverter::new(config, models)?.convert(&document)?;
/// println!("{} items", conversion.items.len());
/// ```
#[derive(Debug)]
pub struct HugoConverter {
    config: ConverterConfig,
    data_models: DataModels,
    replacements: Arc<FieldReplacements>,
    extensions: ModifierRegistry,
}

impl HugoConverter {
    /// Build a converter; fails when a `fields_value_replace` pattern is invalid.
    pub fn new(config: ConverterConfig, data_models: DataModels) -> ConfigResult<Self> {
        let replacements = Arc::new(compile_replacements(&config.fields_value_replace)?);
        Ok(Self {
            config,
            data_models,
            replacements,
            extensions: ModifierRegistry::new(),
        })
    }

    /// Add caller modifiers. They shadow built-in and Hugo modifiers of the same name.
    pub fn with_modifiers(mut self, registry: ModifierRegistry) -> Self {
        self.extensions.extend(registry);
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Names of every modifier available to the data models.
    pub fn modifier_names(&self) -> Vec<String> {
        self.registry(HugoContext::from_config(&self.config, Arc::clone(&self.replacements)))
            .names()
    }

    fn registry(&self, context: HugoContext) -> ModifierRegistry {
        let mut registry = ModifierRegistry::with_builtins();
        registry.extend(hugo_modifiers(Arc::new(context)));
        registry.extend(self.extensions.clone());
        registry
    }

    /// Run the whole pipeline over a parsed export.
    pub fn convert(&self, document: &SourceDocument) -> ConvertResult<Conversion> {
        let channel = document.channel()?;
        let ns = document.namespaces();
        let mut session = Session::new();

        tracing::info!("Creating hugo config");
        let context = HugoContext::from_config(&self.config, Arc::clone(&self.replacements));
        let engine = Engine::new(self.registry(context.clone()));
        let site_config = match self.data_models.hugo_project_config.composite() {
            Some(composite) => {
                let mut container = ResultContainer::map();
                engine.extract_into(
                    channel,
                    ns,
                    composite,
                    &mut container,
                    &mut session,
                    &Trace::new("hugo_config"),
                );
                container.into_value()
            }
            None => None,
        }
        .ok_or(ConvertError::EmptySiteConfig)?;

        let site_url = site_url(&site_config).ok_or(ConvertError::MissingSiteUrl)?;
        tracing::info!("Got baseURL of {}", site_url);

        tracing::info!("Finding list of items in hugo_wp_items and applying data model");
        let engine = Engine::new(self.registry(context.with_site(&site_url, site_config.clone())));
        let mut items = engine.extract_list(
            channel,
            ns,
            &self.data_models.hugo_wp_items,
            &mut session,
            &Trace::new("hugo_items"),
        );
        tracing::info!("Extracted {} items", items.len());
        report_replacements(&session);

        let output = Mangler::new(MangleOptions::from(&self.config)).run(&mut items)?;

        Ok(Conversion {
            site_url,
            site_config,
            items,
            content: output.content,
            page_map: output.page_map,
            counters: session
                .counters()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            assets: session.assets,
        })
    }
}

fn site_url(site_config: &Value) -> Option<String> {
    SITE_URL_KEYS.iter().find_map(|key| match site_config.get(*key) {
        Some(Value::String(url)) if !url.is_empty() => Some(url.clone()),
        _ => None,
    })
}

fn report_replacements(session: &Session) {
    let replacements = session.counter("replacements");
    let checked = session.counter("contents_checked");
    if replacements > 0 {
        tracing::info!("Did {} replacement(s) in {} content section(s).", replacements, checked);
    } else {
        tracing::info!("No replacements needed in {} content section(s).", checked);
    }
}
