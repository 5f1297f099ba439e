//! Per-run extraction state.
//!
//! Holds the pieces that are threaded explicitly through the engine: the
//! result container a composite is filling, the breadcrumb used in
//! diagnostics, and the session state that side-effecting modifiers write to.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Breadcrumb describing where in the schema/source walk a value came from.
///
/// Only used for log lines; never part of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace(String);

impl Trace {
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    /// Extend the breadcrumb with one more segment.
    ///
    /// # Example
    /// ```
    /// use wpxr_hugo::runtime::Trace;
    ///
    /// let trace = Trace::new("hugo_items").child("item #2").child("dispatch(item:title)");
    /// assert_eq!(trace.to_string(), "hugo_items: item #2: dispatch(item:title)");
    /// ```
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}: {}", self.0, segment))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Original vs. rewritten asset references found while modifying content.
///
/// The two sequences are parallel: `rewritten[i]` is the site-relative path
/// that replaced `originals[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRefs {
    pub originals: Vec<String>,
    pub rewritten: Vec<String>,
}

impl AssetRefs {
    pub fn record(&mut self, original: impl Into<String>, rewritten: impl Into<String>) {
        self.originals.push(original.into());
        self.rewritten.push(rewritten.into());
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.originals
            .iter()
            .zip(self.rewritten.iter())
            .map(|(o, r)| (o.as_str(), r.as_str()))
    }
}

/// Mutable state shared by every modifier call of one conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    /// Asset references discovered by content modifiers
    #[serde(default)]
    pub assets: AssetRefs,

    /// Named counters bumped by side-effecting modifiers
    #[serde(default)]
    counters: IndexMap<String, u64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `by` to a named counter, creating it at zero.
    pub fn bump(&mut self, counter: &str, by: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += by;
    }

    /// Current value of a counter (zero when never bumped).
    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// The container a composite writes its directive results into.
///
/// Composites normally fill a map. When a caller hands in a sequence, every
/// directive result is appended as a one-entry map instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultContainer {
    Map(Map<String, Value>),
    Seq(Vec<Value>),
}

impl Default for ResultContainer {
    fn default() -> Self {
        Self::Map(Map::new())
    }
}

impl ResultContainer {
    pub fn map() -> Self {
        Self::default()
    }

    pub fn seq() -> Self {
        Self::Seq(Vec::new())
    }

    /// Store one directive result under `key`.
    pub fn insert(&mut self, key: &str, value: Value) {
        match self {
            Self::Map(map) => {
                tracing::debug!("Adding {}", key);
                map.insert(key.to_string(), value);
            }
            Self::Seq(seq) => {
                let mut entry = Map::new();
                entry.insert(key.to_string(), value);
                seq.push(Value::Object(entry));
            }
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Seq(_) => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Seq(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(map) => map.is_empty(),
            Self::Seq(seq) => seq.is_empty(),
        }
    }

    /// The container as a result value, or `None` if nothing was written.
    pub fn into_value(self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        Some(match self {
            Self::Map(map) => Value::Object(map),
            Self::Seq(seq) => Value::Array(seq),
        })
    }
}
