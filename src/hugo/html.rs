//! HTML body fragments parsed with html5ever.
//!
//! Item bodies are HTML fragments, not documents. They are parsed inside a
//! minimal document, edited through the rcdom handles, and serialized back
//! from the children of `<body>`.

use std::io;

use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{namespace_url, ns, Attribute, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

/// A parsed body fragment.
pub struct HtmlFragment {
    dom: RcDom,
}

impl HtmlFragment {
    pub fn parse(html: &str) -> Self {
        let wrapped = format!(
            "<!DOCTYPE html><html><head></head><body>{}</body></html>",
            html
        );
        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                drop_doctype: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let dom = parse_document(RcDom::default(), opts)
            .from_utf8()
            .one(wrapped.as_bytes());
        Self { dom }
    }

    fn body(&self) -> Option<Handle> {
        find_first_element(&self.dom.document, "body")
    }

    /// Every element of the fragment in document order (pre-order).
    ///
    /// Comments, text and `<script>` contents are not elements, so they
    /// never show up here.
    pub fn elements(&self) -> Vec<Handle> {
        let mut results = Vec::new();
        if let Some(body) = self.body() {
            for child in body.children.borrow().iter() {
                collect_elements(child, &mut results);
            }
        }
        results
    }

    /// Serialize the fragment back to HTML.
    pub fn to_html(&self) -> io::Result<String> {
        let mut bytes = Vec::new();
        let Some(body) = self.body() else {
            return Ok(String::new());
        };

        for child in body.children.borrow().iter() {
            let serializable: SerializableHandle = child.clone().into();
            let opts = SerializeOpts {
                traversal_scope: TraversalScope::IncludeNode,
                ..Default::default()
            };
            serialize(&mut bytes, &serializable, opts)?;
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn collect_elements(handle: &Handle, results: &mut Vec<Handle>) {
    if let NodeData::Element { .. } = handle.data {
        results.push(handle.clone());
    }
    for child in handle.children.borrow().iter() {
        collect_elements(child, results);
    }
}

fn find_first_element(handle: &Handle, name: &str) -> Option<Handle> {
    if local_name(handle) == Some(name) {
        return Some(handle.clone());
    }
    for child in handle.children.borrow().iter() {
        if let Some(found) = find_first_element(child, name) {
            return Some(found);
        }
    }
    None
}

/// Local tag name of an element; `None` for any other node.
pub fn local_name(handle: &Handle) -> Option<&str> {
    match handle.data {
        NodeData::Element { ref name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

pub fn get_attribute(handle: &Handle, attr_name: &str) -> Option<String> {
    if let NodeData::Element { ref attrs, .. } = handle.data {
        for attr in attrs.borrow().iter() {
            if attr.name.local.as_ref() == attr_name {
                return Some(attr.value.to_string());
            }
        }
    }
    None
}

/// Set an attribute, adding it when the element lacks it.
pub fn set_attribute(handle: &Handle, attr_name: &str, value: &str) {
    if let NodeData::Element { ref attrs, .. } = handle.data {
        let mut attrs = attrs.borrow_mut();

        for attr in attrs.iter_mut() {
            if attr.name.local.as_ref() == attr_name {
                attr.value = value.into();
                return;
            }
        }

        attrs.push(Attribute {
            name: QualName::new(None, ns!(), attr_name.into()),
            value: value.into(),
        });
    }
}
