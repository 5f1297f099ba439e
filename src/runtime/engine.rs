//! Schema-dispatch engine.
//!
//! Interprets a compiled data model against a source element and returns the
//! extracted value. The source tree is only ever borrowed immutably; the only
//! mutable state is the result container of the composite being evaluated and
//! the session handed to modifiers.

use serde_json::Value;

use crate::runtime::context::{ResultContainer, Session, Trace};
use crate::runtime::modifiers::{ModifierCall, ModifierRegistry};
use crate::runtime::schema::{Composite, DispatchMode, SchemaNode};
use crate::source::{coerce_scalar, Element, NamespaceMap};

/// Recursive schema interpreter.
///
/// # Example Flow
/// 1. Compile the data model (`SchemaNode::compile`)
/// 2. Build an engine over a modifier registry
/// 3. `extract_list` the top-level items out of the export's channel
pub struct Engine {
    /// Modifier lookup; read-only once the engine is built
    registry: ModifierRegistry,
}

impl Engine {
    pub fn new(registry: ModifierRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModifierRegistry {
        &self.registry
    }

    /// Apply any schema node to an element.
    ///
    /// A composite produces a map of its directive results (absent when no
    /// directive produced anything). Any other node yields the element's text,
    /// integer-coerced.
    pub fn extract(
        &self,
        element: &Element,
        ns: &NamespaceMap,
        schema: &SchemaNode,
        session: &mut Session,
        trace: &Trace,
    ) -> Option<Value> {
        match schema.composite() {
            Some(composite) => {
                let mut record = ResultContainer::map();
                self.extract_into(element, ns, composite, &mut record, session, trace);
                let value = record.into_value();
                if value.is_none() {
                    tracing::debug!("Composite produced no fields at {}", trace);
                }
                value
            }
            None => {
                let value = element.value();
                if value.is_none() {
                    tracing::debug!("No text for '{}' at {}", element.name, trace);
                }
                value
            }
        }
    }

    /// Evaluate a composite into a caller-owned container.
    ///
    /// Directives run in declaration order. Each one dispatches, runs its
    /// modifier chain, and stores a present result under its key.
    pub fn extract_into(
        &self,
        element: &Element,
        ns: &NamespaceMap,
        composite: &Composite,
        container: &mut ResultContainer,
        session: &mut Session,
        trace: &Trace,
    ) {
        for directive in &composite.contains {
            let Some(sub_schema) = composite.sub_schema(directive) else {
                tracing::error!(
                    "'contains' does not have a valid dispatch value ('{}') at {}",
                    directive.key,
                    trace
                );
                continue;
            };

            let trace = trace.child(format!("dispatch({}:{})", directive.mode.as_str(), directive.key));
            tracing::debug!("Applying {} to {} at {}", directive.mode.as_str(), directive.key, trace);

            let Some(value) = self.dispatch(element, ns, directive.mode, sub_schema, session, &trace)
            else {
                continue;
            };

            let mut call = ModifierCall {
                record: &mut *container,
                schema: sub_schema,
                field: &directive.key,
                trace: &trace,
                session: &mut *session,
            };
            if let Some(value) = self.registry.apply_chain(value, &directive.modifiers, &mut call) {
                container.insert(&directive.key, value);
            }
        }
    }

    /// Every child matching the schema's list selector, extracted in document order.
    ///
    /// Children whose extraction is absent are skipped.
    pub fn extract_list(
        &self,
        element: &Element,
        ns: &NamespaceMap,
        schema: &SchemaNode,
        session: &mut Session,
        trace: &Trace,
    ) -> Vec<Value> {
        if schema.is_no_tag() {
            tracing::error!("Can't have 'no_tag' for 'list' dispatch at {}", trace);
            return Vec::new();
        }
        let Some(selector) = schema.list_selector() else {
            tracing::error!("'list' schema has no selector at {}", trace);
            return Vec::new();
        };

        let children = element.find_all(selector, ns);
        tracing::debug!("Found {} '{}' elements at {}", children.len(), selector, trace);

        let mut values = Vec::with_capacity(children.len());
        for (index, child) in children.into_iter().enumerate() {
            let item_trace = trace.child(format!("{} #{}", selector, index + 1));
            if let Some(value) = self.extract(child, ns, schema, session, &item_trace) {
                values.push(value);
            }
        }
        values
    }

    fn dispatch(
        &self,
        element: &Element,
        ns: &NamespaceMap,
        mode: DispatchMode,
        sub_schema: &SchemaNode,
        session: &mut Session,
        trace: &Trace,
    ) -> Option<Value> {
        match (mode, sub_schema) {
            (DispatchMode::Attr | DispatchMode::Item, SchemaNode::Map(_)) => {
                self.extract(element, ns, sub_schema, session, trace)
            }
            (DispatchMode::Attr, SchemaNode::Leaf(name)) => {
                let value = element.attribute(name, ns).map(coerce_scalar);
                if value.is_none() {
                    tracing::debug!("No attribute '{}' at {}", name, trace);
                }
                value
            }
            (DispatchMode::Item, SchemaNode::Leaf(selector)) => match element.find(selector, ns) {
                Some(child) => self.extract(child, ns, sub_schema, session, &trace.child(selector)),
                None => {
                    tracing::debug!("No value found for item {} at {}", selector, trace);
                    None
                }
            },
            (DispatchMode::List, _) => {
                let values = self.extract_list(element, ns, sub_schema, session, trace);
                if values.is_empty() {
                    None
                } else {
                    Some(Value::Array(values))
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(ModifierRegistry::with_builtins())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceDocument;
    use serde_json::json;

    fn compile(raw: Value) -> SchemaNode {
        SchemaNode::compile(&raw, "test").unwrap()
    }

    fn trace() -> Trace {
        Trace::new("test")
    }

    #[test]
    fn test_list_of_items_in_document_order() {
        let doc = SourceDocument::parse(
            r#"<channel>
                <item id="1"><title>First</title></item>
                <item id="2"><title>Second</title></item>
                <item id="3"><title>Third</title></item>
            </channel>"#,
        )
        .unwrap();
        let schema = compile(json!({
            "tag": "item",
            "contains": [{"attr": "wp_id"}, {"item": "title"}],
            "contained": {"wp_id": "id", "title": "title"}
        }));

        let engine = Engine::default();
        let mut session = Session::new();
        let items = engine.extract_list(doc.root(), doc.namespaces(), &schema, &mut session, &trace());

        assert_eq!(
            items,
            vec![
                json!({"wp_id": 1, "title": "First"}),
                json!({"wp_id": 2, "title": "Second"}),
                json!({"wp_id": 3, "title": "Third"}),
            ]
        );
    }

    #[test]
    fn test_list_skips_children_that_extract_nothing() {
        let doc = SourceDocument::parse(
            "<rows><row><t>A</t></row><row/><row><t>C</t></row><row><other>x</other></row></rows>",
        )
        .unwrap();
        let schema = compile(json!({
            "tag": "row",
            "contains": [{"item": "t"}],
            "contained": {"t": "t"}
        }));

        let engine = Engine::default();
        let items = engine.extract_list(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace());

        assert_eq!(items, vec![json!({"t": "A"}), json!({"t": "C"})]);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let doc = SourceDocument::parse(r#"<item><title>Only title</title><empty/></item>"#).unwrap();
        let schema = compile(json!({
            "contains": [
                {"item": "title"},
                {"item": "missing"},
                {"item": "empty"},
                {"attr": "id"}
            ],
            "contained": {"title": "title", "missing": "nothing", "empty": "empty", "id": "id"}
        }));

        let engine = Engine::default();
        let result = engine.extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace());
        assert_eq!(result, Some(json!({"title": "Only title"})));
    }

    #[test]
    fn test_namespaced_items_and_coercion() {
        let doc = SourceDocument::parse(
            r#"<item xmlns:wp="http://wordpress.org/export/1.2/">
                <wp:post_id>42</wp:post_id>
                <wp:post_name>hello-world</wp:post_name>
                <wp:menu_order>007x</wp:menu_order>
            </item>"#,
        )
        .unwrap();
        let schema = compile(json!({
            "contains": [{"item": "wp_id"}, {"item": "slug"}, {"item": "order"}],
            "contained": {"wp_id": "wp:post_id", "slug": "wp:post_name", "order": "wp:menu_order"}
        }));

        let engine = Engine::default();
        let result = engine
            .extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace())
            .unwrap();
        assert_eq!(result["wp_id"], json!(42));
        assert_eq!(result["slug"], json!("hello-world"));
        assert_eq!(result["order"], json!("007x"));
    }

    #[test]
    fn test_item_map_is_nested_composite_on_same_element() {
        let doc = SourceDocument::parse(r#"<item lang="EN"><title>T</title></item>"#).unwrap();
        let schema = compile(json!({
            "contains": [{"item": "meta"}, {"attr": "attrs"}],
            "contained": {
                "meta": {"contains": [{"item": "title"}], "contained": {"title": "title"}},
                "attrs": {"contains": [{"attr": "lang", "to-lower": true}], "contained": {"lang": "lang"}}
            }
        }));

        let engine = Engine::default();
        let result = engine.extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace());
        assert_eq!(result, Some(json!({"meta": {"title": "T"}, "attrs": {"lang": "en"}})));
    }

    #[test]
    fn test_empty_nested_composite_is_absent() {
        let doc = SourceDocument::parse(r#"<item><title>T</title></item>"#).unwrap();
        let schema = compile(json!({
            "contains": [{"item": "title"}, {"item": "meta"}, {"list": "tags"}],
            "contained": {
                "title": "title",
                "meta": {"contains": [{"item": "x"}], "contained": {"x": "nothing"}},
                "tags": "category"
            }
        }));

        let engine = Engine::default();
        let result = engine.extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace());
        assert_eq!(result, Some(json!({"title": "T"})));
    }

    #[test]
    fn test_list_with_modifiers_per_element() {
        let doc = SourceDocument::parse(
            r#"<item>
                <category>News</category>
                <category>0</category>
                <category>Rust</category>
            </item>"#,
        )
        .unwrap();
        let schema = compile(json!({
            "contains": [{"list": "tags", "remove-zero": true, "to-lower": true}],
            "contained": {"tags": "category"}
        }));

        let engine = Engine::default();
        let result = engine.extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace());
        assert_eq!(result, Some(json!({"tags": ["news", "rust"]})));
    }

    #[test]
    fn test_postmeta_pivot_into_record() {
        let doc = SourceDocument::parse(
            r#"<item xmlns:wp="http://wordpress.org/export/1.2/">
                <title>Post</title>
                <wp:postmeta><wp:meta_key>_thumbnail_id</wp:meta_key><wp:meta_value>12</wp:meta_value></wp:postmeta>
                <wp:postmeta><wp:meta_key>_edit_last</wp:meta_key><wp:meta_value>3</wp:meta_value></wp:postmeta>
            </item>"#,
        )
        .unwrap();
        let schema = compile(json!({
            "contains": [
                {"item": "title"},
                {"list": "postmeta", "modifiers": ["key-value", "list-up-map"]},
                {"attr": "tidy", "remove-list": true}
            ],
            "contained": {
                "title": "title",
                "postmeta": {
                    "tag": "wp:postmeta",
                    "key": "meta_key",
                    "value": "meta_value",
                    "contains": [{"item": "meta_key"}, {"item": "meta_value"}],
                    "contained": {"meta_key": "wp:meta_key", "meta_value": "wp:meta_value"}
                },
                "tidy": {
                    "remove_list_keys": ["_thumbnail_id", "_edit_last"],
                    "contains": [{"item": "title"}],
                    "contained": {"title": "title"}
                }
            }
        }));

        let engine = Engine::default();
        let result = engine
            .extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace())
            .unwrap();

        assert_eq!(result["_thumbnail_id"], json!(12));
        assert_eq!(result["_edit_last"], json!(3));
        assert_eq!(
            result["postmeta"],
            json!([{"_thumbnail_id": 12}, {"_edit_last": 3}])
        );
    }

    #[test]
    fn test_extract_into_sequence_container() {
        let doc = SourceDocument::parse(r#"<item id="9"><title>T</title></item>"#).unwrap();
        let schema = compile(json!({
            "contains": [{"item": "title"}, {"attr": "wp_id"}],
            "contained": {"title": "title", "wp_id": "id"}
        }));

        let engine = Engine::default();
        let mut container = ResultContainer::seq();
        engine.extract_into(
            doc.root(),
            doc.namespaces(),
            schema.composite().unwrap(),
            &mut container,
            &mut Session::new(),
            &trace(),
        );
        assert_eq!(container.into_value(), Some(json!([{"title": "T"}, {"wp_id": 9}])));
    }

    #[test]
    fn test_extraction_does_not_mutate_source() {
        let doc = SourceDocument::parse(r#"<item><title>Keep</title></item>"#).unwrap();
        let before = doc.root().clone();
        let schema = compile(json!({
            "contains": [{"item": "title", "to-lower": true}],
            "contained": {"title": "title"}
        }));

        let engine = Engine::default();
        engine.extract(doc.root(), doc.namespaces(), &schema, &mut Session::new(), &trace());
        assert_eq!(doc.root(), &before);
    }

    #[test]
    fn test_caller_modifier_sees_session() {
        let doc = SourceDocument::parse(r#"<item><title>A</title><title>B</title></item>"#).unwrap();
        let schema = compile(json!({
            "contains": [{"list": "titles", "count-titles": true}],
            "contained": {"titles": "title"}
        }));

        let mut registry = ModifierRegistry::with_builtins();
        registry.register_fn("count-titles", |value, call| {
            call.session.bump("titles", 1);
            Some(value)
        });
        let engine = Engine::new(registry);
        let mut session = Session::new();
        engine.extract(doc.root(), doc.namespaces(), &schema, &mut session, &trace());
        assert_eq!(session.counter("titles"), 2);
    }
}
