//! Hugo-specific modifiers.
//!
//! These depend on state the generic engine knows nothing about: the site's
//! base URL, the converted site configuration and the converter options.
//! [`hugo_modifiers`] closes over a shared [`HugoContext`] and returns them as
//! an ordinary [`ModifierRegistry`].

use std::sync::Arc;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::hugo::html::{get_attribute, local_name, set_attribute, HtmlFragment};
use crate::hugo::url::{join_url, make_relative, UrlParts};
use crate::runtime::{ConverterConfig, ModifierCall, ModifierRegistry};

/// Compiled `fields_value_replace`: field -> ordered (pattern, replacement) pairs.
pub type FieldReplacements = IndexMap<String, Vec<(Regex, String)>>;

/// Compile the configured replacements (multi-line, `.` matches newlines).
pub fn compile_replacements(
    raw: &IndexMap<String, IndexMap<String, String>>,
) -> ConfigResult<FieldReplacements> {
    let mut compiled = FieldReplacements::new();
    for (field, pairs) in raw {
        let mut rules = Vec::with_capacity(pairs.len());
        for (pattern, replacement) in pairs {
            let regex = RegexBuilder::new(pattern)
                .multi_line(true)
                .dot_matches_new_line(true)
                .build()
                .map_err(|source| ConfigError::Regex {
                    field: field.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
            rules.push((regex, replacement.clone()));
        }
        compiled.insert(field.clone(), rules);
    }
    Ok(compiled)
}

/// State shared by the Hugo modifiers during one conversion stage.
#[derive(Debug, Clone, Default)]
pub struct HugoContext {
    /// Base URL of the site, once the site config is known
    pub site_url: Option<String>,
    /// Converted site config (`Value::Null` before it exists)
    pub site_config: Value,
    pub image_origin_rel_url: String,
    pub image_rel_url: String,
    pub use_author_display_name_in_metadata: bool,
    pub replacements: Arc<FieldReplacements>,
}

impl HugoContext {
    /// Context with converter options but no site information yet.
    pub fn from_config(config: &ConverterConfig, replacements: Arc<FieldReplacements>) -> Self {
        Self {
            site_url: None,
            site_config: Value::Null,
            image_origin_rel_url: config.image_origin_rel_url.clone(),
            image_rel_url: config.image_rel_url.clone(),
            use_author_display_name_in_metadata: config.use_author_display_name_in_metadata,
            replacements,
        }
    }

    /// The same context once the site config has been converted.
    pub fn with_site(mut self, site_url: impl Into<String>, site_config: Value) -> Self {
        self.site_url = Some(site_url.into());
        self.site_config = site_config;
        self
    }
}

/// Registry holding `url`, `content-hrefs`, `image-urls-in-xml`,
/// `fields-value-replace`, `from-wp-gmt-date` and `author`.
pub fn hugo_modifiers(context: Arc<HugoContext>) -> ModifierRegistry {
    let mut registry = ModifierRegistry::new();

    let ctx = Arc::clone(&context);
    registry.register_fn("url", move |value, _call| match value {
        Value::String(url) => Some(Value::String(make_relative(&url, ctx.site_url.as_deref()))),
        other => Some(other),
    });

    let ctx = Arc::clone(&context);
    registry.register_fn("content-hrefs", move |value, call| match value {
        Value::String(html) => Some(Value::String(relative_hrefs(&html, ctx.site_url.as_deref(), call))),
        other => Some(other),
    });

    let ctx = Arc::clone(&context);
    registry.register_fn("image-urls-in-xml", move |value, call| match value {
        Value::String(html) => Some(Value::String(rewrite_figure_images(&html, &ctx, call))),
        other => Some(other),
    });

    let ctx = Arc::clone(&context);
    registry.register_fn("fields-value-replace", move |value, call| {
        Some(replace_field_value(value, &ctx.replacements, call))
    });

    registry.register_fn("from-wp-gmt-date", |value, call| {
        Some(from_wp_gmt_date(value, call))
    });

    let ctx = context;
    registry.register_fn("author", move |value, _call| Some(author_display_name(value, &ctx)));

    registry
}

/// Make `<a href>` values on the site host relative. Without a site URL the
/// markup is returned unchanged.
fn relative_hrefs(html: &str, site_url: Option<&str>, call: &ModifierCall<'_>) -> String {
    let Some(site_url) = site_url else {
        return html.to_string();
    };
    let site = UrlParts::parse(site_url);
    let fragment = HtmlFragment::parse(html);

    let mut changed = 0;
    for element in fragment.elements() {
        if local_name(&element) != Some("a") {
            continue;
        }
        let Some(href) = get_attribute(&element, "href") else {
            continue;
        };
        let parts = UrlParts::parse(&href);
        if parts.netloc.is_some() && parts.same_host(&site) {
            let relative = parts.rest.to_string();
            set_attribute(&element, "href", &relative);
            changed += 1;
        }
    }

    if changed > 0 {
        tracing::debug!("Made {} hrefs relative at {}", changed, call.trace);
    }
    reserialize(&fragment, html, changed, call)
}

/// Rewrite the `src` of an `<img>` that is the next element after a
/// `<figure>` when it points into the site's upload directory.
///
/// `<site><image_origin_rel_url>/<path>` becomes `<image_rel_url>/<path>`,
/// and the pair (original URL, `<path>`) is recorded in the session assets.
fn rewrite_figure_images(html: &str, context: &HugoContext, call: &mut ModifierCall<'_>) -> String {
    let Some(site_url) = context.site_url.as_deref() else {
        return html.to_string();
    };
    let site = UrlParts::parse(site_url);
    let origin_prefix = format!(
        "{}/",
        join_url(site_url, &context.image_origin_rel_url).trim_end_matches('/')
    );
    let rel_url = context.image_rel_url.trim_end_matches('/');
    let fragment = HtmlFragment::parse(html);

    let mut changed = 0;
    let mut after_figure = false;
    for element in fragment.elements() {
        match local_name(&element) {
            Some("figure") => {
                after_figure = true;
                continue;
            }
            Some("img") if after_figure => {
                if let Some(src) = get_attribute(&element, "src") {
                    if UrlParts::parse(&src).same_host(&site) {
                        if let Some(path) = src.strip_prefix(&origin_prefix) {
                            call.session.assets.record(src.as_str(), path);
                            set_attribute(&element, "src", &format!("{}/{}", rel_url, path));
                            changed += 1;
                        }
                    }
                }
            }
            _ => {}
        }
        after_figure = false;
    }

    if changed > 0 {
        tracing::debug!("Rewrote {} image URLs at {}", changed, call.trace);
    }
    reserialize(&fragment, html, changed, call)
}

/// Serialize an edited fragment; untouched markup is returned as it came in.
fn reserialize(fragment: &HtmlFragment, html: &str, changed: usize, call: &ModifierCall<'_>) -> String {
    if changed == 0 {
        return html.to_string();
    }
    match fragment.to_html() {
        Ok(out) => out,
        Err(e) => {
            tracing::error!("Failed to serialize HTML at {}: {}", call.trace, e);
            html.to_string()
        }
    }
}

/// Apply the configured regex replacements for the current field.
fn replace_field_value(value: Value, replacements: &FieldReplacements, call: &mut ModifierCall<'_>) -> Value {
    let Some(rules) = replacements.get(call.field) else {
        return value;
    };
    let mut text = match value {
        Value::String(s) => s,
        other => other.to_string(),
    };

    let is_content = call.field == "content";
    if is_content {
        call.session.bump("contents_checked", 1);
    }
    for (regex, replacement) in rules {
        let replaced = regex.replace_all(&text, replacement.as_str());
        if replaced != text {
            let replaced = replaced.into_owned();
            if is_content {
                call.session.bump("replacements", 1);
            }
            text = replaced;
        }
    }
    Value::String(text)
}

/// `YYYY-MM-DD HH:MM:SS` in UTC to RFC 3339.
fn from_wp_gmt_date(value: Value, call: &mut ModifierCall<'_>) -> Value {
    let Value::String(date) = &value else {
        tracing::error!("Date {} is not a string at {}", value, call.trace);
        return value;
    };
    match NaiveDateTime::parse_from_str(date.trim(), "%Y-%m-%d %H:%M:%S") {
        Ok(parsed) => Value::String(parsed.and_utc().to_rfc3339()),
        Err(e) => {
            tracing::error!("Invalid GMT date '{}' at {}: {}", date, call.trace, e);
            value
        }
    }
}

/// Swap a login name for the display name listed in the site config's
/// `author.authors` (entries with `uid` and `name`).
fn author_display_name(value: Value, context: &HugoContext) -> Value {
    if !context.use_author_display_name_in_metadata {
        return value;
    }
    let Some(authors) = context
        .site_config
        .get("author")
        .and_then(|author| author.get("authors"))
        .and_then(Value::as_array)
    else {
        return value;
    };

    let display_name = authors
        .iter()
        .filter(|entry| entry.get("uid") == Some(&value))
        .filter_map(|entry| entry.get("name"))
        .find(|name| !name.is_null())
        .cloned();
    display_name.unwrap_or(value)
}
