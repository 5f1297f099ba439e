//! Post-extraction passes over Hugo item records.
//!
//! These passes only look at the extracted records, never at the schema or
//! the source document. [`Mangler::run`] applies them in a fixed order:
//!
//! 1. move bodies out of the records into a [`ContentMap`]
//! 2. build the [`PageMap`]
//! 3. rename fields
//! 4. replace `wp_status` with a boolean `draft`
//! 5. drop configured field/value pairs

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::HierarchyError;
use crate::hierarchy::PageMap;
use crate::runtime::ConverterConfig;

/// Record bodies keyed by `wp_id`.
pub type ContentMap = BTreeMap<i64, String>;

/// Options for the mangling passes.
#[derive(Debug, Clone, Default)]
pub struct MangleOptions {
    /// new field name -> existing field name
    pub rename_fields: IndexMap<String, String>,
    /// `{field: value}` pairs to drop
    pub remove_field_values: Vec<IndexMap<String, Value>>,
    /// Record types that take part in the page hierarchy
    pub page_types: Vec<String>,
}

impl From<&ConverterConfig> for MangleOptions {
    fn from(config: &ConverterConfig) -> Self {
        Self {
            rename_fields: config.rename_fields.clone(),
            remove_field_values: config.remove_field_values.clone(),
            page_types: config.page_types.clone(),
        }
    }
}

/// What the passes split off the records.
#[derive(Debug, Clone, Default)]
pub struct MangleOutput {
    pub content: ContentMap,
    pub page_map: PageMap,
}

pub struct Mangler {
    options: MangleOptions,
}

impl Mangler {
    pub fn new(options: MangleOptions) -> Self {
        Self { options }
    }

    /// Run every pass over `records` in place.
    pub fn run(&self, records: &mut [Value]) -> Result<MangleOutput, HierarchyError> {
        let content = extract_content(records);
        let page_map = PageMap::build(records, &self.options.page_types)?;
        rename_fields(records, &self.options.rename_fields);
        apply_draft(records, &page_map)?;
        remove_field_values(records, &self.options.remove_field_values);

        Ok(MangleOutput { content, page_map })
    }
}

/// Move each record's `content` into the content map.
///
/// Sequence bodies are concatenated. Records without an integer `wp_id`
/// keep their content.
pub fn extract_content(records: &mut [Value]) -> ContentMap {
    let mut content_map = ContentMap::new();

    for record in records.iter_mut() {
        let Some(map) = record.as_object_mut() else {
            continue;
        };
        if map.get("content").map_or(true, Value::is_null) {
            continue;
        }
        let Some(wp_id) = map.get("wp_id").and_then(Value::as_i64) else {
            tracing::error!("Record with content has no integer wp_id");
            continue;
        };

        if let Some(body) = map.remove("content") {
            let body = match body {
                Value::Array(parts) => parts.iter().map(body_text).collect::<String>(),
                other => body_text(&other),
            };
            content_map.insert(wp_id, body);
        }
    }

    tracing::info!("Extracted content for {} records", content_map.len());
    content_map
}

fn body_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Copy `old` to `new` and delete `old`, for each `new: old` pair.
pub fn rename_fields(records: &mut [Value], renames: &IndexMap<String, String>) {
    for record in records.iter_mut() {
        let Some(map) = record.as_object_mut() else {
            tracing::error!("item is not a map for rename_fields");
            continue;
        };
        for (new_name, old_name) in renames {
            if map.get(old_name).map_or(true, Value::is_null) {
                continue;
            }
            if let Some(value) = map.remove(old_name) {
                map.insert(new_name.clone(), value);
            }
        }
    }
}

/// Replace `wp_status` with `draft` on every record that has a page node.
pub fn apply_draft(records: &mut [Value], page_map: &PageMap) -> Result<(), HierarchyError> {
    for (id, node) in page_map.iter() {
        let Some(index) = node.page_index else {
            continue;
        };
        let draft = page_map.is_draft(id)?;
        if let Some(map) = records.get_mut(index).and_then(Value::as_object_mut) {
            map.insert("draft".to_string(), Value::Bool(draft));
            map.remove("wp_status");
        }
    }
    Ok(())
}

/// Drop fields holding an unwanted value.
///
/// A scalar field is dropped when it equals the value. A sequence field is
/// dropped only when every element equals the value; a sequence with other
/// elements as well is left as it is.
pub fn remove_field_values(records: &mut [Value], rules: &[IndexMap<String, Value>]) {
    for record in records.iter_mut() {
        let Some(map) = record.as_object_mut() else {
            continue;
        };
        for rule in rules {
            for (field, unwanted) in rule {
                let remove = match map.get(field) {
                    None | Some(Value::Null) => false,
                    Some(Value::Array(items)) => {
                        !items.is_empty() && items.iter().all(|item| item == unwanted)
                    }
                    Some(value) => value == unwanted,
                };
                if remove {
                    map.remove(field);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> MangleOptions {
        MangleOptions::from(&ConverterConfig::default())
    }

    #[test]
    fn test_extract_content() {
        let mut records = vec![
            json!({"wp_id": 1, "content": "<p>one</p>"}),
            json!({"wp_id": 2, "content": ["<p>a</p>", "<p>b</p>"]}),
            json!({"wp_id": 3}),
            json!({"content": "orphan"}),
        ];
        let content = extract_content(&mut records);

        assert_eq!(content.get(&1).map(String::as_str), Some("<p>one</p>"));
        assert_eq!(content.get(&2).map(String::as_str), Some("<p>a</p><p>b</p>"));
        assert_eq!(content.len(), 2);
        assert!(records[0].get("content").is_none());
        assert_eq!(records[3]["content"], json!("orphan"));
    }

    #[test]
    fn test_rename_fields() {
        let mut records = vec![json!({"post_tag": ["rust"], "_thumbnail_id": 12, "title": "T"})];
        rename_fields(&mut records, &options().rename_fields);

        assert_eq!(records[0], json!({"title": "T", "tags": ["rust"], "featured_image": 12}));
    }

    #[test]
    fn test_rename_absent_field_is_noop() {
        let mut records = vec![json!({"title": "T"})];
        rename_fields(&mut records, &options().rename_fields);
        assert_eq!(records[0], json!({"title": "T"}));
    }

    #[test]
    fn test_apply_draft_includes_first_record() {
        let mut records = vec![
            json!({"type": "page", "wp_id": 5, "slug": "docs", "wp_status": "publish"}),
            json!({"type": "page", "wp_id": 9, "parent": 5, "slug": "guide", "wp_status": "draft"}),
        ];
        let page_map = PageMap::build(&records, &options().page_types).unwrap();
        apply_draft(&mut records, &page_map).unwrap();

        assert_eq!(records[0]["draft"], json!(false));
        assert!(records[0].get("wp_status").is_none());
        assert_eq!(records[1]["draft"], json!(true));
    }

    #[test]
    fn test_remove_field_values_scalar_and_total_sequence() {
        let mut records = vec![
            json!({"aliases": "/", "draft": false, "title": "a"}),
            json!({"aliases": ["/"], "draft": true}),
            json!({"aliases": ["/", "/"]}),
        ];
        remove_field_values(&mut records, &options().remove_field_values);

        assert_eq!(records[0], json!({"title": "a"}));
        assert_eq!(records[1], json!({"draft": true}));
        assert_eq!(records[2], json!({}));
    }

    #[test]
    fn test_remove_field_values_leaves_partial_match() {
        let mut records = vec![json!({"aliases": ["/", "/old-path/"]})];
        remove_field_values(&mut records, &options().remove_field_values);
        assert_eq!(records[0], json!({"aliases": ["/", "/old-path/"]}));
    }

    #[test]
    fn test_run_in_order() {
        let mut records = vec![
            json!({
                "type": "page", "wp_id": 5, "slug": "docs", "wp_status": "publish",
                "content": "<p>Docs</p>", "post_tag": "x", "aliases": ["/"]
            }),
            json!({
                "type": "page", "wp_id": 9, "parent": 5, "slug": "guide", "wp_status": "pending",
                "content": "<p>Guide</p>"
            }),
            json!({"type": "attachment", "wp_id": 11, "_wp_attached_file": "a.png"}),
        ];

        let output = Mangler::new(options()).run(&mut records).unwrap();

        assert_eq!(output.content.len(), 2);
        assert_eq!(output.page_map.parent_path(9).unwrap(), "docs");
        assert_eq!(
            records[0],
            json!({"type": "page", "wp_id": 5, "slug": "docs", "tags": "x"})
        );
        assert_eq!(records[1]["draft"], json!(true));
        assert!(records[1].get("wp_status").is_none());
        assert_eq!(records[2]["attached_file"], json!("a.png"));
    }
}
