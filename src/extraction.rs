//! Path addressing over structured message bodies.
//!
//! Bodies are JSON documents. A path walks them the way an XPath location
//! path walks an element tree: stepping into a field of an array maps over
//! its elements, and arrays left at the end expand into one node per element.
//! Members whose key starts with `@` are treated as attributes.

use std::fmt;

use serde_json::Value;

/// Represents a path to a field in structured data
///
/// # Examples
///
/// - `/order/id` - a nested field
/// - `/order/items/[0]/sku` - an array index
/// - `/order/items/*` - every child
/// - `/order/@currency` - an attribute
/// - `/order/note/text()` - scalar text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "user", "name")
    Field(String),
    /// An array index (e.g., [0], [5])
    Index(usize),
    /// A wildcard/glob pattern (e.g., "*", "**")
    Wildcard,
    /// An attribute (e.g., "@currency")
    Attribute(String),
    /// Scalar text of the current nodes ("text()")
    Text,
}

impl PathSegment {
    /// Attribute and text selectors yield leaf nodes and must end a path.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PathSegment::Attribute(_) | PathSegment::Text)
    }
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    ///
    /// # Example
    ///
    /// ```
    /// use flowlog::FieldPath;
    ///
    /// let path = FieldPath::parse("order/customer/name", "/");
    /// assert_eq!(path.segments.len(), 3);
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| {
                // Check if it's an array index
                if s.starts_with('[') && s.ends_with(']') {
                    if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                        return PathSegment::Index(index);
                    }
                }

                // Check for wildcard
                if s == "*" || s == "**" {
                    return PathSegment::Wildcard;
                }

                if s == "text()" {
                    return PathSegment::Text;
                }

                if let Some(name) = s.strip_prefix('@') {
                    return PathSegment::Attribute(name.to_string());
                }

                // Otherwise it's a field name
                PathSegment::Field(s.to_string())
            })
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Create a field path from a slash-separated location path.
    pub fn from_slashed(path: &str) -> Self {
        Self::parse(path, "/")
    }

    /// Select every node this path addresses in `root`.
    pub fn select(&self, root: &Value) -> Vec<Node> {
        let mut current: Vec<&Value> = vec![root];

        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    current = current
                        .into_iter()
                        .flat_map(|v| step_field(v, name))
                        .collect();
                }
                PathSegment::Index(index) => {
                    current = current
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::Array(items) => items.get(*index),
                            other if *index == 0 => Some(other),
                            _ => None,
                        })
                        .collect();
                }
                PathSegment::Wildcard => {
                    current = current.into_iter().flat_map(children).collect();
                }
                PathSegment::Attribute(name) => {
                    return expand(current)
                        .into_iter()
                        .filter_map(|v| attribute(v, name))
                        .collect();
                }
                PathSegment::Text => {
                    return expand(current)
                        .into_iter()
                        .filter_map(|v| scalar_text(v).map(Node::Text))
                        .collect();
                }
            }
        }

        expand(current)
            .into_iter()
            .map(|v| Node::Element(v.clone()))
            .collect()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A node selected from a message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Value),
    Attribute { name: String, value: String },
    Text(String),
}

impl Node {
    /// Textual content: inner text for elements, the value for attributes
    /// and text nodes.
    pub fn text(&self) -> String {
        match self {
            Node::Element(value) => inner_text(value),
            Node::Attribute { value, .. } => value.clone(),
            Node::Text(text) => text.clone(),
        }
    }
}

fn step_field<'a>(value: &'a Value, name: &str) -> Vec<&'a Value> {
    match value {
        Value::Object(map) => map.get(name).into_iter().collect(),
        Value::Array(items) => items.iter().flat_map(|item| step_field(item, name)).collect(),
        _ => Vec::new(),
    }
}

fn children(value: &Value) -> Vec<&Value> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !key.starts_with('@'))
            .map(|(_, v)| v)
            .collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

fn expand(values: Vec<&Value>) -> Vec<&Value> {
    values
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

fn attribute(value: &Value, name: &str) -> Option<Node> {
    let map = value.as_object()?;
    let raw = map.get(&format!("@{}", name)).or_else(|| map.get(name))?;
    scalar_text(raw).map(|text| Node::Attribute {
        name: name.to_string(),
        value: text,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("#text").and_then(scalar_text),
        Value::Null | Value::Array(_) => None,
    }
}

fn inner_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(inner_text).collect(),
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !key.starts_with('@'))
            .map(|(_, v)| inner_text(v))
            .collect(),
        scalar => scalar_text(scalar).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order() -> Value {
        json!({
            "order": {
                "@currency": "EUR",
                "id": "A-1",
                "total": 42,
                "items": [
                    {"sku": "X1", "qty": 1},
                    {"sku": "X2", "qty": 3}
                ],
                "note": {"#text": "fragile", "@lang": "en"},
                "empty": ""
            }
        })
    }

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("user/address/city", "/");

        assert_eq!(path.segments.len(), 3);
        assert_eq!(path.segments[0], PathSegment::Field("user".to_string()));
        assert_eq!(
            path.segments[1],
            PathSegment::Field("address".to_string())
        );
        assert_eq!(path.segments[2], PathSegment::Field("city".to_string()));
    }

    #[test]
    fn test_field_path_with_index_and_selectors() {
        let path = FieldPath::from_slashed("/items/[0]/@name");

        assert_eq!(path.segments.len(), 3);
        assert_eq!(path.segments[0], PathSegment::Field("items".to_string()));
        assert_eq!(path.segments[1], PathSegment::Index(0));
        assert_eq!(path.segments[2], PathSegment::Attribute("name".to_string()));
        assert!(path.segments[2].is_terminal());

        let text = FieldPath::from_slashed("/a/*/text()");
        assert_eq!(text.segments[1], PathSegment::Wildcard);
        assert_eq!(text.segments[2], PathSegment::Text);
    }

    #[test]
    fn test_select_field_maps_over_arrays() {
        let nodes = FieldPath::from_slashed("/order/items/sku").select(&order());
        let texts: Vec<String> = nodes.iter().map(Node::text).collect();

        assert_eq!(texts, vec!["X1", "X2"]);
    }

    #[test]
    fn test_select_index() {
        let nodes = FieldPath::from_slashed("/order/items/[1]/qty").select(&order());

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text(), "3");
    }

    #[test]
    fn test_select_attribute_and_text() {
        let doc = order();

        let currency = FieldPath::from_slashed("/order/@currency").select(&doc);
        assert_eq!(
            currency,
            vec![Node::Attribute {
                name: "currency".to_string(),
                value: "EUR".to_string()
            }]
        );

        let note = FieldPath::from_slashed("/order/note/text()").select(&doc);
        assert_eq!(note, vec![Node::Text("fragile".to_string())]);
    }

    #[test]
    fn test_element_inner_text_skips_attributes() {
        let nodes = FieldPath::from_slashed("/order/note").select(&order());

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text(), "fragile");
    }

    #[test]
    fn test_select_missing_path() {
        assert!(FieldPath::from_slashed("/order/missing/id").select(&order()).is_empty());
        assert!(FieldPath::from_slashed("/order/id/deeper").select(&order()).is_empty());
    }
}
