//! Page hierarchy reconstruction.
//!
//! WordPress records carry a `parent` id; Hugo needs the directory path of
//! each page and whether it is visible. [`PageMap`] rebuilds the forest from
//! the flat record sequence and answers both questions.
//!
//! Ancestor walks stop at id `0` or at an id that is not in the map. A walk
//! that revisits a node is a [`HierarchyError::Cycle`].

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::HierarchyError;

/// One page-like record (or a placeholder for a parent not seen yet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageNode {
    pub children: Vec<i64>,
    /// Position of the record in the item sequence; `None` for placeholders
    pub page_index: Option<usize>,
    /// `0` for top-level pages
    pub parent: i64,
    pub slug: Option<String>,
    pub wp_status: Option<String>,
    #[serde(rename = "parent-path")]
    pub parent_path: String,
}

/// Parent/child index over page-like records, keyed by `wp_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PageMap {
    nodes: IndexMap<i64, PageNode>,
}

impl PageMap {
    /// Build the page map from extracted records.
    ///
    /// Only records whose `type` is one of `page_types` take part. Each gets
    /// a node carrying its slug, status and index; its parent gets it as a
    /// child (a placeholder parent is created when needed). `parent_path`
    /// is then filled in for every node.
    ///
    /// # Errors
    /// Returns [`HierarchyError::Cycle`] when parent references loop.
    pub fn build(records: &[Value], page_types: &[String]) -> Result<Self, HierarchyError> {
        let mut map = Self::default();

        for (index, record) in records.iter().enumerate() {
            let Some(record_type) = record.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !page_types.iter().any(|t| t == record_type) {
                continue;
            }
            let Some(wp_id) = record.get("wp_id").and_then(Value::as_i64) else {
                tracing::error!("Record #{} of type '{}' has no integer wp_id", index, record_type);
                continue;
            };
            let parent = record.get("parent").and_then(Value::as_i64).unwrap_or(0);

            let node = map.nodes.entry(wp_id).or_default();
            node.page_index = Some(index);
            node.parent = parent;
            node.slug = record.get("slug").and_then(scalar_string);
            node.wp_status = record.get("wp_status").and_then(scalar_string);

            map.add_child(parent, wp_id);
        }

        let ids: Vec<i64> = map.nodes.keys().copied().collect();
        for id in ids {
            let path = map.parent_path(id)?;
            if let Some(node) = map.nodes.get_mut(&id) {
                node.parent_path = path;
            }
        }

        tracing::info!("Built page map with {} nodes", map.nodes.len());
        Ok(map)
    }

    fn add_child(&mut self, parent: i64, child: i64) {
        let parent_node = self.nodes.entry(parent).or_default();
        if !parent_node.children.contains(&child) {
            parent_node.children.push(child);
        }
    }

    /// Ids of the existing ancestors of `id`, nearest first.
    fn ancestors(&self, id: i64) -> Result<Vec<i64>, HierarchyError> {
        let node = self.nodes.get(&id).ok_or(HierarchyError::UnknownPage(id))?;

        let mut chain = vec![id];
        let mut current = node.parent;
        while current != 0 {
            let Some(ancestor) = self.nodes.get(&current) else {
                break;
            };
            if chain.contains(&current) {
                chain.push(current);
                tracing::error!("Parent cycle detected for page {}: {:?}", id, chain);
                return Err(HierarchyError::Cycle { id, chain });
            }
            chain.push(current);
            current = ancestor.parent;
        }

        chain.remove(0);
        Ok(chain)
    }

    /// Slugs of the page's ancestors, root first, joined with `/`.
    ///
    /// The walk also stops at the first ancestor without a slug.
    pub fn parent_path(&self, id: i64) -> Result<String, HierarchyError> {
        let mut slugs: Vec<&str> = Vec::new();
        for ancestor in self.ancestors(id)? {
            match self.nodes.get(&ancestor).and_then(|node| node.slug.as_deref()) {
                Some(slug) => slugs.push(slug),
                None => break,
            }
        }
        slugs.reverse();
        Ok(slugs.join("/"))
    }

    /// Whether the page must be rendered as a draft.
    ///
    /// A page is published when its own status is `publish`, or when it is
    /// `inherit` and its nearest non-`inherit` ancestor is published.
    /// Everything else, including `inherit` all the way to the top, is a draft.
    pub fn is_draft(&self, id: i64) -> Result<bool, HierarchyError> {
        let mut lineage = self.ancestors(id)?;
        lineage.reverse();
        lineage.push(id);

        let mut draft = true;
        for page in lineage {
            let status = self.nodes.get(&page).and_then(|node| node.wp_status.as_deref());
            draft = match status {
                Some("publish") => false,
                Some("inherit") => draft,
                _ => true,
            };
        }
        Ok(draft)
    }

    pub fn get(&self, id: i64) -> Option<&PageNode> {
        self.nodes.get(&id)
    }

    pub fn children(&self, id: i64) -> &[i64] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &PageNode)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Slugs and statuses may have been integer-coerced during extraction.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
