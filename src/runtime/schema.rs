//! Compiled data model schemas.
//!
//! A data model arrives as plain data (YAML/JSON maps, sequences and strings).
//! [`SchemaNode::compile`] turns it into a validated tree once, so the engine
//! never has to re-check structure while it recurses over the source tree.
//!
//! ```yaml
//! hugo_wp_items:
//!   tag: item
//!   contains:
//!     - item: title
//!     - attr: wp_id
//!       to-lower: true
//!     - list: categories
//!       modifiers: [to-lower]
//!   contained:
//!     title: title
//!     wp_id: id
//!     categories: category
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{SchemaError, SchemaResult};

/// How a directive reaches into the current element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Attribute of the current element (or a nested composite over it)
    Attr,
    /// First matching child (or a nested composite over the current element)
    Item,
    /// Every matching child, in document order
    List,
}

impl DispatchMode {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "attr" => Some(Self::Attr),
            "item" => Some(Self::Item),
            "list" => Some(Self::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attr => "attr",
            Self::Item => "item",
            Self::List => "list",
        }
    }
}

/// One entry of a composite's `contains` sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Key into `contained`, and the field name written into the result
    pub key: String,
    pub mode: DispatchMode,
    /// Modifier names, in the order they run
    pub modifiers: Vec<String>,
}

/// The `contains`/`contained` pair of a map schema node.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub contains: Vec<Directive>,
    pub contained: IndexMap<String, SchemaNode>,
}

impl Composite {
    /// Sub-schema a directive dispatches to.
    pub fn sub_schema(&self, directive: &Directive) -> Option<&SchemaNode> {
        self.contained.get(&directive.key)
    }
}

/// A map schema node.
#[derive(Debug, Clone, PartialEq)]
pub struct MapNode {
    /// Repeatable child tag for `list` dispatch
    pub tag: Option<String>,
    pub no_tag: bool,
    pub composite: Option<Composite>,
    /// Remaining keys (`key`, `value`, `singles`, `remove_list_keys`, ...)
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Child tag path or attribute name
    Leaf(String),
    Map(Box<MapNode>),
}

const RESERVED_KEYS: [&str; 4] = ["contains", "contained", "tag", "no_tag"];

fn defect(path: &str, message: impl Into<String>) -> SchemaError {
    let err = SchemaError::new(path, message);
    tracing::error!("{}", err);
    err
}

impl SchemaNode {
    /// Compile a raw schema value, rejecting structural defects.
    ///
    /// `path` names the node in error messages (e.g. `hugo_wp_items`).
    pub fn compile(value: &Value, path: &str) -> SchemaResult<Self> {
        match value {
            Value::String(selector) => Ok(Self::Leaf(selector.clone())),
            Value::Object(map) => Ok(Self::Map(Box::new(compile_map(map, path)?))),
            other => Err(defect(
                path,
                format!("expected a selector string or a map, found {}", kind(other)),
            )),
        }
    }

    /// Compile a node that must be a composite (top-level data models).
    pub fn compile_composite(value: &Value, path: &str) -> SchemaResult<Self> {
        let node = Self::compile(value, path)?;
        if node.composite().is_none() {
            return Err(defect(path, "'data_model' is not a map which includes 'contains'"));
        }
        Ok(node)
    }

    /// Compile a node that is itself a `list` target (`hugo_wp_items`).
    pub fn compile_list(value: &Value, path: &str) -> SchemaResult<Self> {
        let node = Self::compile(value, path)?;
        if node.is_no_tag() {
            return Err(defect(path, "Can't have 'no_tag' for 'list' dispatch"));
        }
        if node.list_selector().is_none() {
            return Err(defect(path, "'list' needs a selector string or a map with 'tag'"));
        }
        Ok(node)
    }

    pub fn as_map(&self) -> Option<&MapNode> {
        match self {
            Self::Map(node) => Some(node),
            Self::Leaf(_) => None,
        }
    }

    pub fn composite(&self) -> Option<&Composite> {
        self.as_map().and_then(|node| node.composite.as_ref())
    }

    /// A named parameter of a map node.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.as_map().and_then(|node| node.params.get(name))
    }

    pub fn is_no_tag(&self) -> bool {
        self.as_map().map(|node| node.no_tag).unwrap_or(false)
    }

    /// The child selector used by `list` dispatch.
    pub fn list_selector(&self) -> Option<&str> {
        match self {
            Self::Leaf(selector) => Some(selector),
            Self::Map(node) => node.tag.as_deref(),
        }
    }
}

fn compile_map(map: &Map<String, Value>, path: &str) -> SchemaResult<MapNode> {
    let tag = match map.get("tag") {
        None | Some(Value::Null) => None,
        Some(Value::String(tag)) => Some(tag.clone()),
        Some(other) => {
            return Err(defect(path, format!("'tag' must be a string, found {}", kind(other))))
        }
    };
    let no_tag = !matches!(map.get("no_tag"), None | Some(Value::Null));

    let composite = match (map.get("contains"), map.get("contained")) {
        (None, None) => None,
        (Some(Value::Array(contains)), Some(Value::Object(contained))) => {
            Some(compile_composite(contains, contained, path)?)
        }
        (Some(Value::Array(_)), _) => {
            return Err(defect(path, "'contained' is not a map"));
        }
        (Some(_), _) => return Err(defect(path, "'contains' is not a list")),
        (None, Some(_)) => return Err(defect(path, "'contained' without 'contains'")),
    };

    let params = map
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(MapNode {
        tag,
        no_tag,
        composite,
        params,
    })
}

fn compile_composite(
    contains: &[Value],
    contained: &Map<String, Value>,
    path: &str,
) -> SchemaResult<Composite> {
    let mut compiled = IndexMap::new();
    for (key, value) in contained {
        let node = SchemaNode::compile(value, &format!("{}.contained.{}", path, key))?;
        compiled.insert(key.clone(), node);
    }

    let mut directives = Vec::with_capacity(contains.len());
    for (index, entry) in contains.iter().enumerate() {
        let entry_path = format!("{}.contains[{}]", path, index);
        let directive = compile_directive(entry, &entry_path)?;

        let Some(sub_schema) = compiled.get(&directive.key) else {
            return Err(defect(
                &entry_path,
                format!("'contains' does not have a valid dispatch value ('{}')", directive.key),
            ));
        };
        check_dispatch(&directive, sub_schema, &entry_path)?;
        directives.push(directive);
    }

    Ok(Composite {
        contains: directives,
        contained: compiled,
    })
}

fn compile_directive(entry: &Value, path: &str) -> SchemaResult<Directive> {
    let Value::Object(entry) = entry else {
        return Err(defect(path, "'contains' has a non-map item"));
    };

    let mut dispatch: Option<(DispatchMode, String)> = None;
    let mut modifiers = Vec::new();

    for (key, value) in entry {
        if let Some(mode) = DispatchMode::from_key(key) {
            let Value::String(target) = value else {
                return Err(defect(path, format!("'{}' must name a 'contained' entry", key)));
            };
            if dispatch.is_some() {
                return Err(defect(path, "directive has more than one dispatch key"));
            }
            dispatch = Some((mode, target.clone()));
            continue;
        }

        match value {
            Value::Bool(true) => modifiers.push(key.clone()),
            Value::Bool(false) | Value::Null => {}
            Value::Array(names) => {
                for name in names {
                    let Value::String(name) = name else {
                        return Err(defect(
                            path,
                            format!("modifier list '{}' must contain only names", key),
                        ));
                    };
                    modifiers.push(name.clone());
                }
            }
            other => {
                return Err(defect(
                    path,
                    format!("modifier '{}' must be true or a list, found {}", key, kind(other)),
                ))
            }
        }
    }

    let (mode, key) = dispatch.ok_or_else(|| defect(path, "directive has no dispatch key"))?;
    Ok(Directive {
        key,
        mode,
        modifiers,
    })
}

fn check_dispatch(directive: &Directive, sub_schema: &SchemaNode, path: &str) -> SchemaResult<()> {
    match (directive.mode, sub_schema) {
        (_, SchemaNode::Leaf(_)) => Ok(()),
        (DispatchMode::List, node) if node.is_no_tag() => {
            Err(defect(path, "Can't have 'no_tag' for 'list' dispatch"))
        }
        (DispatchMode::List, SchemaNode::Map(node)) if node.tag.is_none() => {
            Err(defect(path, "'list' needs a selector string or a map with 'tag'"))
        }
        (DispatchMode::List, _) => Ok(()),
        (DispatchMode::Attr | DispatchMode::Item, SchemaNode::Map(node)) => {
            if node.composite.is_none() {
                Err(defect(
                    path,
                    format!(
                        "'{}' sub-schema '{}' is a map without 'contains'",
                        directive.mode.as_str(),
                        directive.key
                    ),
                ))
            } else {
                Ok(())
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}
