//! Modifier registry for post-processing extracted values.
//!
//! A modifier is a named function applied to a value right after a directive
//! extracted it. Schemas name modifiers; the registry resolves the names.
//! Built-ins are always registered first, and callers may shadow any of them
//! by registering the same name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::runtime::context::{ResultContainer, Session, Trace};
use crate::runtime::schema::SchemaNode;

/// Everything a modifier may look at besides the value itself.
pub struct ModifierCall<'a> {
    /// The record the current composite is building (the "result tree so far")
    pub record: &'a mut ResultContainer,
    /// Sub-schema the directive dispatched to; modifiers read their parameters here
    pub schema: &'a SchemaNode,
    /// Directive key the value will be stored under
    pub field: &'a str,
    pub trace: &'a Trace,
    pub session: &'a mut Session,
}

/// Trait for modifier functions.
///
/// Returning `None` marks the value absent and stops the rest of the chain.
pub trait Modifier: Send + Sync {
    fn apply(&self, value: Value, call: &mut ModifierCall<'_>) -> Option<Value>;
}

/// Simple function-based implementation of Modifier
impl<F> Modifier for F
where
    F: Fn(Value, &mut ModifierCall<'_>) -> Option<Value> + Send + Sync,
{
    fn apply(&self, value: Value, call: &mut ModifierCall<'_>) -> Option<Value> {
        self(value, call)
    }
}

/// Registry for storing and applying named modifiers
///
/// Cloning is cheap; modifiers are shared.
#[derive(Clone)]
pub struct ModifierRegistry {
    modifiers: HashMap<String, Arc<dyn Modifier>>,
}

impl ModifierRegistry {
    /// Create an empty registry (no built-ins).
    pub fn new() -> Self {
        Self {
            modifiers: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in modifiers:
    /// `key-value`, `list-up-map`, `pull-single`, `remove-list`,
    /// `remove-zero` and `to-lower`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_fn("key-value", key_value);
        registry.register_fn("list-up-map", list_up_map);
        registry.register_fn("pull-single", pull_single);
        registry.register_fn("remove-list", remove_list);
        registry.register_fn("remove-zero", remove_zero);
        registry.register_fn("to-lower", to_lower);
        registry
    }

    /// Register a modifier, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, modifier: Arc<dyn Modifier>) {
        self.modifiers.insert(name.into(), modifier);
    }

    /// Register a plain function or closure.
    ///
    /// # Example
    ///
    /// ```
    /// use wpxr_hugo::runtime::ModifierRegistry;
    /// use serde_json::Value;
    ///
    /// let mut registry = ModifierRegistry::with_builtins();
    /// registry.register_fn("to-upper", |value, _call| match value {
    ///     Value::String(s) => Some(Value::String(s.to_uppercase())),
    ///     other => Some(other),
    /// });
    /// assert!(registry.contains("to-upper"));
    /// ```
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(Value, &mut ModifierCall<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(func));
    }

    /// Merge another registry into this one; its entries win on collision.
    pub fn extend(&mut self, other: ModifierRegistry) {
        self.modifiers.extend(other.modifiers);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modifiers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Modifier> {
        self.modifiers.get(name).map(|m| m.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modifiers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Apply a modifier chain to an extracted value.
    ///
    /// Sequences get the whole chain per element, and elements that end up
    /// absent are dropped; if none survive the result is absent. Any other
    /// value gets the chain directly.
    pub fn apply_chain(
        &self,
        value: Value,
        chain: &[String],
        call: &mut ModifierCall<'_>,
    ) -> Option<Value> {
        if chain.is_empty() {
            return Some(value);
        }

        match value {
            Value::Array(items) => {
                let mut kept = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    tracing::debug!("Applying modifiers to item #{} at {}", index + 1, call.trace);
                    if let Some(item) = self.apply_to_item(item, chain, call) {
                        kept.push(item);
                    }
                }
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Array(kept))
                }
            }
            other => self.apply_to_item(other, chain, call),
        }
    }

    fn apply_to_item(
        &self,
        mut value: Value,
        chain: &[String],
        call: &mut ModifierCall<'_>,
    ) -> Option<Value> {
        for name in chain {
            let Some(modifier) = self.modifiers.get(name) else {
                tracing::warn!("Unknown modifier '{}' at {}", name, call.trace);
                continue;
            };
            tracing::debug!("Applying modifier {} at {}", name, call.trace);
            value = modifier.apply(value, call)?;
        }
        Some(value)
    }
}

impl fmt::Debug for ModifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierRegistry")
            .field("modifiers", &self.names())
            .finish()
    }
}

impl Default for ModifierRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// =============================================================================
// Built-in modifiers
// =============================================================================

/// Pivot a `{key_field: k, value_field: v, ...}` map into `{k: v}`.
fn key_value(value: Value, call: &mut ModifierCall<'_>) -> Option<Value> {
    let (Some(Value::String(key_field)), Some(Value::String(value_field))) =
        (call.schema.param("key"), call.schema.param("value"))
    else {
        return Some(value);
    };
    let Value::Object(map) = &value else {
        return Some(value);
    };

    match (map.get(key_field), map.get(value_field)) {
        (Some(key), Some(val)) if !key.is_null() && !val.is_null() => {
            let mut pivoted = Map::new();
            pivoted.insert(scalar_key(key), val.clone());
            Some(Value::Object(pivoted))
        }
        _ => Some(value),
    }
}

fn scalar_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accumulate each entry of the value map into per-field sequences on the record.
fn list_up_map(value: Value, call: &mut ModifierCall<'_>) -> Option<Value> {
    let (Some(record), Value::Object(map)) = (call.record.as_map_mut(), &value) else {
        return Some(value);
    };

    for (key, item) in map {
        match record.get_mut(key) {
            None | Some(Value::Null) => {
                record.insert(key.clone(), Value::Array(vec![item.clone()]));
            }
            Some(Value::Array(existing)) => existing.push(item.clone()),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, item.clone()]);
            }
        }
    }
    Some(value)
}

/// Promote one element of a multi-valued field into the value map.
///
/// `singles` is a sequence of `{field: index}` maps; the selected element's
/// entries are added only where the value map has no entry yet.
fn pull_single(mut value: Value, call: &mut ModifierCall<'_>) -> Option<Value> {
    let Some(Value::Array(singles)) = call.schema.param("singles") else {
        return Some(value);
    };
    let Value::Object(map) = &mut value else {
        return Some(value);
    };

    let mut picked: Option<Value> = None;
    for single in singles {
        let Value::Object(single) = single else {
            continue;
        };
        for (field, index) in single {
            let Some(Value::Array(items)) = map.get(field) else {
                continue;
            };
            let Some(index) = index.as_u64() else {
                tracing::error!("Index {} for '{}' is not a list index at {}", index, field, call.trace);
                picked = None;
                continue;
            };
            match items.get(index as usize) {
                Some(item) => picked = Some(item.clone()),
                None => {
                    tracing::error!("Index {} not in list at {}", index, call.trace);
                    picked = None;
                }
            }
        }
    }

    if let Some(Value::Object(item)) = picked {
        for (key, item_value) in item {
            let present = map.get(&key).map(|v| !v.is_null()).unwrap_or(false);
            if !present {
                map.insert(key, item_value);
            }
        }
    }
    Some(value)
}

/// Unwrap one-element sequences on the record for the fields in `remove_list_keys`.
fn remove_list(value: Value, call: &mut ModifierCall<'_>) -> Option<Value> {
    let Some(Value::Array(keys)) = call.schema.param("remove_list_keys") else {
        return Some(value);
    };
    let Some(record) = call.record.as_map_mut() else {
        tracing::error!("result tree is not a map for remove-list at {}", call.trace);
        return Some(value);
    };

    for key in keys.iter().filter_map(Value::as_str) {
        if let Some(field) = record.get_mut(key) {
            if let Value::Array(items) = field {
                if items.len() == 1 {
                    let single = items.remove(0);
                    *field = single;
                }
            }
        }
    }
    Some(value)
}

/// Null and anything equal to zero (`0`, `0.0`, `false`) are absent.
fn remove_zero(value: Value, _call: &mut ModifierCall<'_>) -> Option<Value> {
    match &value {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        _ => Some(value),
    }
}

fn to_lower(value: Value, _call: &mut ModifierCall<'_>) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s.to_lowercase())),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Harness {
        record: ResultContainer,
        schema: SchemaNode,
        trace: Trace,
        session: Session,
    }

    impl Harness {
        fn new(schema: Value) -> Self {
            Self {
                record: ResultContainer::map(),
                schema: SchemaNode::compile(&schema, "test").unwrap(),
                trace: Trace::new("test"),
                session: Session::new(),
            }
        }

        fn run(&mut self, registry: &ModifierRegistry, value: Value, chain: &[&str]) -> Option<Value> {
            let chain: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
            let mut call = ModifierCall {
                record: &mut self.record,
                schema: &self.schema,
                field: "field",
                trace: &self.trace,
                session: &mut self.session,
            };
            registry.apply_chain(value, &chain, &mut call)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ModifierRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["key-value", "list-up-map", "pull-single", "remove-list", "remove-zero", "to-lower"]
        );
    }

    #[test]
    fn test_caller_modifier_shadows_builtin() {
        let mut registry = ModifierRegistry::with_builtins();
        let mut extensions = ModifierRegistry::new();
        extensions.register_fn("to-lower", |_value, _call| Some(json!("shadowed")));
        registry.extend(extensions);

        let mut harness = Harness::new(json!("x"));
        assert_eq!(harness.run(&registry, json!("ABC"), &["to-lower"]), Some(json!("shadowed")));
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_chain_per_element_drops_absent() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!("x"));

        let result = harness.run(&registry, json!(["A", 0, "B", 0]), &["remove-zero", "to-lower"]);
        assert_eq!(result, Some(json!(["a", "b"])));
    }

    #[test]
    fn test_chain_on_sequence_equals_per_element_filter() {
        let registry = ModifierRegistry::with_builtins();
        let chain = ["to-lower", "remove-zero"];
        let inputs = vec![json!("Xy"), json!(0), json!(7)];

        let mut harness = Harness::new(json!("x"));
        let whole = harness.run(&registry, Value::Array(inputs.clone()), &chain);

        let per_element: Vec<Value> = inputs
            .into_iter()
            .filter_map(|v| harness.run(&registry, v, &chain))
            .collect();
        assert_eq!(whole, Some(Value::Array(per_element)));
    }

    #[test]
    fn test_all_elements_absent_is_absent() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!("x"));
        assert_eq!(harness.run(&registry, json!([0, 0]), &["remove-zero"]), None);
    }

    #[test]
    fn test_absent_short_circuits_chain() {
        let mut registry = ModifierRegistry::with_builtins();
        registry.register_fn("count", |value, call| {
            call.session.bump("count", 1);
            Some(value)
        });
        let mut harness = Harness::new(json!("x"));

        assert_eq!(harness.run(&registry, json!(0), &["remove-zero", "count"]), None);
        assert_eq!(harness.session.counter("count"), 0);
        assert_eq!(harness.run(&registry, json!(5), &["remove-zero", "count"]), Some(json!(5)));
        assert_eq!(harness.session.counter("count"), 1);
    }

    #[test]
    fn test_unknown_modifier_is_skipped() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!("x"));
        assert_eq!(harness.run(&registry, json!("AB"), &["nope", "to-lower"]), Some(json!("ab")));
    }

    #[test]
    fn test_key_value() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!({"key": "meta_key", "value": "meta_value"}));

        let result = harness.run(
            &registry,
            json!({"meta_key": "_thumbnail_id", "meta_value": 42}),
            &["key-value"],
        );
        assert_eq!(result, Some(json!({"_thumbnail_id": 42})));

        let untouched = harness.run(&registry, json!({"meta_key": "x"}), &["key-value"]);
        assert_eq!(untouched, Some(json!({"meta_key": "x"})));
    }

    #[test]
    fn test_list_up_map_accumulates_on_record() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!("x"));

        harness.run(&registry, json!({"tag": "a"}), &["list-up-map"]);
        harness.run(&registry, json!({"tag": "b", "cat": "c"}), &["list-up-map"]);
        harness.run(&registry, json!({"tag": "d"}), &["list-up-map"]);

        assert_eq!(
            harness.record.as_map().cloned().map(Value::Object),
            Some(json!({"tag": ["a", "b", "d"], "cat": ["c"]}))
        );
    }

    #[test]
    fn test_pull_single() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!({"singles": [{"authors": 1}]}));

        let result = harness.run(
            &registry,
            json!({
                "name": "kept",
                "authors": [{"name": "first", "uid": 1}, {"name": "second", "uid": 2}]
            }),
            &["pull-single"],
        );
        let result = result.unwrap();
        assert_eq!(result["name"], json!("kept"));
        assert_eq!(result["uid"], json!(2));
    }

    #[test]
    fn test_pull_single_out_of_range_is_skipped() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!({"singles": [{"authors": 5}]}));
        let input = json!({"authors": [{"uid": 1}]});

        assert_eq!(harness.run(&registry, input.clone(), &["pull-single"]), Some(input));
    }

    #[test]
    fn test_remove_list_is_idempotent() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!({"remove_list_keys": ["tag", "cat"]}));
        harness.record.insert("tag", json!(["only"]));
        harness.record.insert("cat", json!(["a", "b"]));

        harness.run(&registry, json!({}), &["remove-list"]);
        let once = harness.record.clone();
        harness.run(&registry, json!({}), &["remove-list"]);

        assert_eq!(once, harness.record);
        let record = harness.record.as_map().unwrap();
        assert_eq!(record["tag"], json!("only"));
        assert_eq!(record["cat"], json!(["a", "b"]));
    }

    #[test]
    fn test_remove_zero_and_to_lower() {
        let registry = ModifierRegistry::with_builtins();
        let mut harness = Harness::new(json!("x"));

        assert_eq!(harness.run(&registry, json!(0), &["remove-zero"]), None);
        assert_eq!(harness.run(&registry, json!(3), &["remove-zero"]), Some(json!(3)));
        assert_eq!(harness.run(&registry, json!(false), &["remove-zero"]), None);
        assert_eq!(harness.run(&registry, json!(true), &["remove-zero"]), Some(json!(true)));
        assert_eq!(harness.run(&registry, json!("0"), &["remove-zero"]), Some(json!("0")));
        assert_eq!(harness.run(&registry, json!("MiXeD"), &["to-lower"]), Some(json!("mixed")));
        assert_eq!(harness.run(&registry, json!(12), &["to-lower"]), Some(json!(12)));
    }
}
