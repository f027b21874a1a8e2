//! Widget bodies and their property trees.
//!
//! A property tree maps a stable property id to a loosely typed value. Ordered
//! collections are not stored as arrays: they are id-keyed maps whose entries
//! carry a `position`, and must be resolved with [`ordered_entries`] before
//! anything depends on their order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::text::RichText;

/// Mapping from property id to value.
///
/// Backed by a sorted map, so two trees that are equal up to key order
/// serialize and iterate identically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyTree(Map<String, Value>);

impl PropertyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    /// Get a property, treating an explicit `null` the same as absence.
    pub fn defined(&self, id: &str) -> Option<&Value> {
        self.0.get(id).filter(|v| !v.is_null())
    }

    pub fn insert(&mut self, id: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(id.into(), value)
    }

    pub fn remove(&mut self, id: &str) -> Option<Value> {
        self.0.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Builder-style insert, mostly for tests and fixtures.
    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.insert(id, value);
        self
    }
}

impl From<Map<String, Value>> for PropertyTree {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for PropertyTree {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// The stored body of one widget placed on a step.
///
/// Which fields are meaningful depends on the content type: embedded kinds use
/// `properties` (and designable ones the cached `query`), images use `url`,
/// text kinds use `document`, and response templates use `items`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyTree>,
    /// Cached canonical query, written by design-mode saves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<RichText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<TemplateItem>>,
}

impl WidgetBody {
    pub fn with_properties(properties: PropertyTree) -> Self {
        Self {
            properties: Some(properties),
            ..Default::default()
        }
    }

    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }
}

/// One entry of an ordered multi-part response template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateItem {
    pub id: SmolStr,
    pub kind: TemplateItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RichText>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateItemKind {
    Text,
    #[serde(rename = "responsespace")]
    ResponseSpace,
}

/// Shape of a property as the authoring UI presents it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    /// Multi-line text, such as a formula.
    Text,
    /// Id-keyed ordered collection of items of one shape.
    List { items: Box<PropertyKind> },
    /// Fixed set of titled fields.
    Object { items: Vec<FieldSpec> },
}

/// A titled field inside an object-shaped property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub title: SmolStr,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl FieldSpec {
    pub fn new(title: &str, kind: PropertyKind) -> Self {
        Self {
            title: title.into(),
            kind,
        }
    }
}

/// Declaration of one configurable property of a content type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub id: SmolStr,
    pub title: SmolStr,
    #[serde(flatten)]
    pub kind: PropertyKind,
    /// Emit a default even when unset, so "unset" and "explicitly off" differ
    /// on the receiving side.
    #[serde(default, rename = "forceParameter")]
    pub force_parameter: bool,
    /// Serialization fails (and the embed stays loading) while this is unset.
    #[serde(default)]
    pub required: bool,
}

impl PropertySpec {
    pub fn new(id: &str, title: &str, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            force_parameter: false,
            required: false,
        }
    }

    pub fn string(id: &str, title: &str) -> Self {
        Self::new(id, title, PropertyKind::String)
    }

    pub fn number(id: &str, title: &str) -> Self {
        Self::new(id, title, PropertyKind::Number)
    }

    pub fn boolean(id: &str, title: &str) -> Self {
        Self::new(id, title, PropertyKind::Boolean)
    }

    pub fn list(id: &str, title: &str, items: PropertyKind) -> Self {
        Self::new(
            id,
            title,
            PropertyKind::List {
                items: Box::new(items),
            },
        )
    }

    pub fn object(id: &str, title: &str, fields: Vec<FieldSpec>) -> Self {
        Self::new(id, title, PropertyKind::Object { items: fields })
    }

    pub fn forced(mut self) -> Self {
        self.force_parameter = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The value emitted for a forced parameter that has no value.
    pub fn forced_default(&self) -> Option<&'static str> {
        match (self.force_parameter, &self.kind) {
            (true, PropertyKind::Boolean) => Some("false"),
            (true, PropertyKind::Number) => Some("0"),
            (true, PropertyKind::String | PropertyKind::Text) => Some(""),
            _ => None,
        }
    }
}

/// Shape of a value an embedded document reports back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseProperty {
    /// Plain named value, e.g. `scale`.
    Scalar(SmolStr),
    /// A list of records with the given fields, e.g. `filledSlots: [slot, piece]`.
    Records(SmolStr, Vec<SmolStr>),
}

impl ResponseProperty {
    pub fn scalar(id: &str) -> Self {
        Self::Scalar(id.into())
    }

    pub fn records(id: &str, fields: &[&str]) -> Self {
        Self::Records(id.into(), fields.iter().map(|f| SmolStr::new(f)).collect())
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Scalar(id) | Self::Records(id, _) => id,
        }
    }
}

/// One entry of an ordered collection after resolving positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderedEntry<'a> {
    /// The entry's key in the id-keyed map, `None` for plain arrays.
    pub id: Option<&'a str>,
    pub value: &'a Value,
}

impl<'a> OrderedEntry<'a> {
    /// The entry's `value` field if it is a record, otherwise the entry itself.
    pub fn payload(&self) -> &'a Value {
        match self.value {
            Value::Object(map) => map.get("value").unwrap_or(self.value),
            other => other,
        }
    }
}

/// Resolve an ordered collection into a position-sorted list.
///
/// Id-keyed maps are sorted ascending by each entry's `position`; entries
/// with equal or missing positions fall back to id order so the result never
/// depends on map iteration order. Plain arrays keep their own order.
pub fn ordered_entries(collection: &Value) -> Vec<OrderedEntry<'_>> {
    match collection {
        Value::Array(items) => items
            .iter()
            .map(|value| OrderedEntry { id: None, value })
            .collect(),
        Value::Object(map) => {
            let mut entries: Vec<(f64, &str, &Value)> = map
                .iter()
                .map(|(id, value)| {
                    let position = value
                        .get("position")
                        .and_then(Value::as_f64)
                        .unwrap_or(f64::INFINITY);
                    (position, id.as_str(), value)
                })
                .collect();
            entries.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            entries
                .into_iter()
                .map(|(_, id, value)| OrderedEntry {
                    id: Some(id),
                    value,
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Render a scalar the way the embedded document expects to read it back.
///
/// Integral numbers lose their fractional part (`3.0` -> `3`), `null` is
/// "no value", and compound values fall back to compact JSON.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format_number(f),
            (None, None) => n.to_string(),
        }),
        Value::String(s) => Some(s.clone()),
        compound => Some(compound.to_string()),
    }
}

/// Format a float without a trailing `.0` for integral values.
pub fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Find the `value` of the titled field inside an entry's `items` list.
///
/// Object-shaped list entries are stored as `{ items: [{ title, value }] }`.
pub fn titled_field<'a>(entry: &'a Value, title: &str) -> Option<&'a Value> {
    entry
        .get("items")?
        .as_array()?
        .iter()
        .find(|field| field.get("title").and_then(Value::as_str) == Some(title))?
        .get("value")
        .filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ordered_entries_sorts_by_position() {
        let options = json!({
            "b": { "value": "Blue", "position": 1 },
            "a": { "value": "Red", "position": 0 },
            "c": { "value": "Green", "position": 2 },
        });
        let values: Vec<_> = ordered_entries(&options)
            .iter()
            .map(|e| e.payload().as_str().unwrap())
            .collect();
        assert_eq!(values, ["Red", "Blue", "Green"]);
    }

    #[test]
    fn test_ordered_entries_ties_break_by_id() {
        let options = json!({
            "z": { "value": 1, "position": 0 },
            "a": { "value": 2, "position": 0 },
            "m": { "value": 3 },
        });
        let ids: Vec<_> = ordered_entries(&options)
            .iter()
            .map(|e| e.id.unwrap())
            .collect();
        assert_eq!(ids, ["a", "z", "m"]);
    }

    #[test]
    fn test_ordered_entries_keeps_array_order() {
        let options = json!(["x", "y"]);
        let entries = ordered_entries(&options);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, None);
        assert_eq!(entries[1].payload(), &json!("y"));
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!(false)).as_deref(), Some("false"));
        assert_eq!(scalar_text(&json!(3.0)).as_deref(), Some("3"));
        assert_eq!(scalar_text(&json!(2.5)).as_deref(), Some("2.5"));
        assert_eq!(scalar_text(&json!("hi")).as_deref(), Some("hi"));
    }

    #[test]
    fn test_titled_field() {
        let piece = json!({
            "position": 0,
            "items": [
                { "title": "Name", "value": "horse" },
                { "title": "Length", "value": 6 },
            ]
        });
        assert_eq!(titled_field(&piece, "Name"), Some(&json!("horse")));
        assert_eq!(titled_field(&piece, "Length"), Some(&json!(6)));
        assert_eq!(titled_field(&piece, "Colour"), None);
    }

    #[test]
    fn test_property_spec_forced_default() {
        let spec = PropertySpec::boolean("fixedDropbox", "Fixed").forced();
        assert_eq!(spec.forced_default(), Some("false"));
        assert_eq!(PropertySpec::boolean("x", "X").forced_default(), None);
    }

    #[test]
    fn test_property_spec_deserializes_source_shape() {
        let spec: PropertySpec = serde_json::from_value(json!({
            "id": "fixedDropbox",
            "title": "Can drop only inside fixed area",
            "kind": "boolean",
            "forceParameter": true,
        }))
        .unwrap();
        assert_eq!(spec.kind, PropertyKind::Boolean);
        assert!(spec.force_parameter);
        assert!(!spec.required);
    }
}
