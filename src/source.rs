//! Source tree for WordPress exports.
//!
//! Parses XML into an immutable, namespace-resolved element tree plus the
//! document's prefix map. The engine only reads from this tree.

use std::fmt;

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use crate::error::{SourceError, SourceResult};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace-qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Resolved namespace URI (`None` for unqualified names)
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local: local.into(),
        }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(uri) => write!(f, "{{{}}}{}", uri, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// Prefix -> namespace URI, as declared anywhere in the document.
///
/// Only non-empty prefixes are kept; a prefix declared twice keeps the
/// last URI seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    prefixes: IndexMap<String, String>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), uri.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Resolve a selector name (`wp:post_id`, `{uri}local` or `title`).
    ///
    /// Returns `None` when the prefix is not declared.
    pub fn resolve(&self, name: &str) -> Option<QName> {
        if let Some(rest) = name.strip_prefix('{') {
            let (uri, local) = rest.split_once('}')?;
            return Some(QName::new(Some(uri), local));
        }
        match name.split_once(':') {
            Some((prefix, local)) => {
                let uri = if prefix == "xml" {
                    Some(XML_NAMESPACE)
                } else {
                    self.get(prefix)
                };
                uri.map(|uri| QName::new(Some(uri), local))
            }
            None => Some(QName::local(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// One element of the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Text (including CDATA) that precedes the first child element
    pub text: Option<String>,
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Any,
    Name(QName),
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name,
            value: value.into(),
        });
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// First element matching `selector`, relative to this one.
    pub fn find(&self, selector: &str, ns: &NamespaceMap) -> Option<&Element> {
        self.find_all(selector, ns).into_iter().next()
    }

    /// Every element matching `selector`, in document order.
    ///
    /// The selector is a `/`-separated path of child steps; each step is a
    /// qualified name or `*`.
    pub fn find_all(&self, selector: &str, ns: &NamespaceMap) -> Vec<&Element> {
        let Some(steps) = parse_steps(selector, ns) else {
            tracing::warn!("Undeclared namespace prefix in selector '{}'", selector);
            return Vec::new();
        };
        if steps.is_empty() {
            return Vec::new();
        }

        let mut current: Vec<&Element> = vec![self];
        for step in &steps {
            current = current
                .into_iter()
                .flat_map(|el| el.children.iter())
                .filter(|child| match step {
                    Step::Any => true,
                    Step::Name(name) => &child.name == name,
                })
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// Attribute value by (possibly prefixed) name.
    pub fn attribute(&self, name: &str, ns: &NamespaceMap) -> Option<&str> {
        let qname = ns.resolve(name)?;
        self.attributes
            .iter()
            .find(|attr| attr.name == qname)
            .map(|attr| attr.value.as_str())
    }

    /// The element's text as a result scalar, integer-coerced.
    pub fn value(&self) -> Option<Value> {
        self.text.as_deref().map(coerce_scalar)
    }
}

fn parse_steps(selector: &str, ns: &NamespaceMap) -> Option<Vec<Step>> {
    selector
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| {
            if s == "*" {
                Some(Step::Any)
            } else {
                ns.resolve(s).map(Step::Name)
            }
        })
        .collect()
}

/// Integer coercion for extracted text.
///
/// Decimal literals (optional sign, optional surrounding whitespace) that fit
/// in an `i64` become numbers; everything else is returned unchanged.
pub fn coerce_scalar(text: &str) -> Value {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = trimmed.trim_start_matches('+').parse::<i64>() {
            return Value::from(n);
        }
    }
    Value::String(text.to_string())
}

/// A parsed export: the root element and its namespace map.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    root: Element,
    namespaces: NamespaceMap,
}

struct OpenElement {
    element: Element,
    seen_child: bool,
}

impl SourceDocument {
    pub fn from_parts(root: Element, namespaces: NamespaceMap) -> Self {
        Self { root, namespaces }
    }

    /// Parse an XML document.
    pub fn parse(xml: &str) -> SourceResult<Self> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut namespaces = NamespaceMap::new();
        let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
        let mut stack: Vec<OpenElement> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position() as u64;
            match reader.read_event()? {
                Event::Start(e) => {
                    let element = open_element(&e, &mut scopes, &mut namespaces, position)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.seen_child = true;
                    }
                    stack.push(OpenElement {
                        element,
                        seen_child: false,
                    });
                }
                Event::Empty(e) => {
                    let element = open_element(&e, &mut scopes, &mut namespaces, position)?;
                    scopes.pop();
                    close_element(element, &mut stack, &mut root, position)?;
                }
                Event::End(_) => {
                    let open = stack.pop().ok_or_else(|| SourceError::Malformed {
                        position,
                        message: "closing tag without an open element".to_string(),
                    })?;
                    scopes.pop();
                    close_element(open.element, &mut stack, &mut root, position)?;
                }
                Event::Text(e) => {
                    push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()));
                }
                Event::CData(e) => {
                    push_text(&mut stack, &String::from_utf8_lossy(&e.into_inner()));
                }
                Event::GeneralRef(e) => {
                    let entity = String::from_utf8_lossy(e.as_ref()).to_string();
                    let resolved = resolve_entity(&entity).ok_or_else(|| SourceError::Malformed {
                        position,
                        message: format!("unknown entity '&{};'", entity),
                    })?;
                    push_text(&mut stack, &resolved);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(SourceError::Malformed {
                position: reader.buffer_position() as u64,
                message: format!("unclosed element '{}'", open.element.name),
            });
        }

        let root = root.ok_or(SourceError::EmptyDocument)?;
        tracing::debug!(
            "Parsed source document rooted at '{}' with {} namespace prefixes",
            root.name,
            namespaces.len()
        );
        Ok(Self { root, namespaces })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }

    /// The export's top-level `channel` element.
    pub fn channel(&self) -> SourceResult<&Element> {
        let channel = self
            .root
            .children
            .iter()
            .find(|child| child.name == QName::local("channel"))
            .ok_or(SourceError::MissingChannel)?;
        tracing::info!("Found 'channel' in source document");
        Ok(channel)
    }
}

fn open_element(
    start: &BytesStart<'_>,
    scopes: &mut Vec<Vec<(String, String)>>,
    namespaces: &mut NamespaceMap,
    position: u64,
) -> SourceResult<Element> {
    let mut declared = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| SourceError::Malformed {
            position,
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attr.value).to_string();
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| SourceError::Malformed {
                position,
                message: e.to_string(),
            })?
            .into_owned();

        if key == "xmlns" {
            declared.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.insert(prefix, value.clone());
            declared.push((prefix.to_string(), value));
        } else {
            raw_attributes.push((key, value));
        }
    }
    scopes.push(declared);

    let raw_name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let name = resolve_name(&raw_name, scopes, true, position)?;

    let mut element = Element::new(name);
    for (key, value) in raw_attributes {
        let name = resolve_name(&key, scopes, false, position)?;
        element.attributes.push(Attribute { name, value });
    }
    Ok(element)
}

fn resolve_name(
    raw: &str,
    scopes: &[Vec<(String, String)>],
    use_default: bool,
    position: u64,
) -> SourceResult<QName> {
    let (prefix, local) = match raw.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", raw),
    };
    if prefix.is_empty() && !use_default {
        return Ok(QName::local(local));
    }
    if prefix == "xml" {
        return Ok(QName::new(Some(XML_NAMESPACE), local));
    }

    let uri = scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter().rev())
        .find(|(declared, _)| declared == prefix)
        .map(|(_, uri)| uri.as_str());

    match uri {
        Some("") | None if prefix.is_empty() => Ok(QName::local(local)),
        Some(uri) => Ok(QName::new(Some(uri), local)),
        None => Err(SourceError::Malformed {
            position,
            message: format!("undeclared namespace prefix '{}'", prefix),
        }),
    }
}

fn close_element(
    element: Element,
    stack: &mut [OpenElement],
    root: &mut Option<Element>,
    position: u64,
) -> SourceResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.seen_child = true;
            parent.element.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(SourceError::Malformed {
            position,
            message: "more than one root element".to_string(),
        }),
    }
}

fn push_text(stack: &mut [OpenElement], text: &str) {
    if let Some(open) = stack.last_mut() {
        if open.seen_child {
            return;
        }
        match &mut open.element.text {
            Some(existing) => existing.push_str(text),
            None => open.element.text = Some(text.to_string()),
        }
    }
}

/// Resolve predefined and numeric XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(code).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WXR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
    xmlns:content="http://purl.org/rss/1.0/modules/content/"
    xmlns:wp="http://wordpress.org/export/1.2/">
<channel>
    <title>Example &amp; Co</title>
    <wp:base_site_url>https://example.com</wp:base_site_url>
    <item>
        <title>First</title>
        <wp:post_id>12</wp:post_id>
        <category domain="category" nicename="news"><![CDATA[News]]></category>
        <content:encoded><![CDATA[<p>Hello</p>]]></content:encoded>
    </item>
    <item>
        <title>Second</title>
        <wp:post_id>13</wp:post_id>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_collects_namespaces() {
        let doc = SourceDocument::parse(WXR).unwrap();
        let ns = doc.namespaces();
        assert_eq!(ns.get("wp"), Some("http://wordpress.org/export/1.2/"));
        assert_eq!(ns.get("content"), Some("http://purl.org/rss/1.0/modules/content/"));
        assert_eq!(ns.len(), 2);
    }

    #[test]
    fn test_find_resolves_prefixes() {
        let doc = SourceDocument::parse(WXR).unwrap();
        let channel = doc.channel().unwrap();
        let ns = doc.namespaces();

        let title = channel.find("title", ns).unwrap();
        assert_eq!(title.text.as_deref(), Some("Example & Co"));

        let base = channel.find("wp:base_site_url", ns).unwrap();
        assert_eq!(base.value(), Some(json!("https://example.com")));

        let ids: Vec<_> = channel
            .find_all("item/wp:post_id", ns)
            .into_iter()
            .map(|el| el.value().unwrap())
            .collect();
        assert_eq!(ids, vec![json!(12), json!(13)]);
    }

    #[test]
    fn test_cdata_and_attributes() {
        let doc = SourceDocument::parse(WXR).unwrap();
        let ns = doc.namespaces();
        let item = doc.channel().unwrap().find("item", ns).unwrap();

        let category = item.find("category", ns).unwrap();
        assert_eq!(category.text.as_deref(), Some("News"));
        assert_eq!(category.attribute("nicename", ns), Some("news"));
        assert_eq!(category.attribute("missing", ns), None);

        let content = item.find("content:encoded", ns).unwrap();
        assert_eq!(content.text.as_deref(), Some("<p>Hello</p>"));
    }

    #[test]
    fn test_unknown_prefix_matches_nothing() {
        let doc = SourceDocument::parse(WXR).unwrap();
        let channel = doc.channel().unwrap();
        assert!(channel.find("dc:creator", doc.namespaces()).is_none());
    }

    #[test]
    fn test_missing_channel_is_fatal() {
        let doc = SourceDocument::parse("<rss><item/></rss>").unwrap();
        assert!(matches!(doc.channel(), Err(SourceError::MissingChannel)));
    }

    #[test]
    fn test_unclosed_element_is_malformed() {
        let result = SourceDocument::parse("<rss><channel></rss>");
        assert!(result.is_err());
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_scalar("42"), json!(42));
        assert_eq!(coerce_scalar(" -7 "), json!(-7));
        assert_eq!(coerce_scalar("+3"), json!(3));
        assert_eq!(coerce_scalar("4.5"), json!("4.5"));
        assert_eq!(coerce_scalar("12abc"), json!("12abc"));
        assert_eq!(coerce_scalar(""), json!(""));
        assert_eq!(coerce_scalar("99999999999999999999"), json!("99999999999999999999"));
    }

    #[test]
    fn test_text_before_first_child_only() {
        let doc = SourceDocument::parse("<r><a>head<b>x</b>tail</a></r>").unwrap();
        let a = doc.root().find("a", doc.namespaces()).unwrap();
        assert_eq!(a.text.as_deref(), Some("head"));
    }
}
