//! Learner responses collected per step.
//!
//! Keys are namespaced by widget name (`Foo.id`, or bare `Foo` for scalar
//! responses), so widgets sharing a step never touch each other's entries.
//! Widget names that contain `.` or braces are written brace-quoted
//! (`{Fig. 1}.id`, with `\` escaping `}` and `\` inside the braces); the id
//! is everything after the first separating dot. Nothing here is ever cleared implicitly; a key only changes when a
//! newer report for that exact key arrives.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use smol_str::SmolStr;

pub type StepId = SmolStr;
pub type WidgetName = SmolStr;

/// Key of one recorded response value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseKey {
    /// `None` when the report could not be attributed to a widget.
    pub widget: Option<WidgetName>,
    /// `None` for a widget's scalar response.
    pub id: Option<SmolStr>,
}

impl ResponseKey {
    /// `{widget}.{id}`
    pub fn property(widget: impl Into<WidgetName>, id: impl Into<SmolStr>) -> Self {
        Self {
            widget: Some(widget.into()),
            id: Some(id.into()),
        }
    }

    /// Bare `{widget}`
    pub fn scalar(widget: impl Into<WidgetName>) -> Self {
        Self {
            widget: Some(widget.into()),
            id: None,
        }
    }

    /// Report from an unknown widget.
    pub fn unnamed(id: impl Into<SmolStr>) -> Self {
        Self {
            widget: None,
            id: Some(id.into()),
        }
    }

    pub fn attributed(widget: Option<&WidgetName>, id: impl Into<SmolStr>) -> Self {
        Self {
            widget: widget.cloned(),
            id: Some(id.into()),
        }
    }

    /// Read a key written by [`ResponseKey`]'s `Display`. Malformed brace
    /// quoting is taken as a literal scalar name.
    pub fn parse(s: &str) -> Self {
        if s.starts_with('{') {
            return Self::parse_quoted(s).unwrap_or_else(|| Self::scalar(s));
        }
        match s.split_once('.') {
            Some((widget, id)) => Self {
                widget: (!widget.is_empty()).then(|| widget.into()),
                id: Some(id.into()),
            },
            None => Self::scalar(s),
        }
    }

    fn parse_quoted(s: &str) -> Option<Self> {
        let mut widget = String::new();
        let mut chars = s.char_indices().skip(1);
        let rest = loop {
            match chars.next()? {
                (_, '\\') => widget.push(chars.next()?.1),
                (i, '}') => break &s[i + 1..],
                (_, ch) => widget.push(ch),
            }
        };
        let id = match rest {
            "" => None,
            _ => Some(rest.strip_prefix('.')?.into()),
        };
        Some(Self {
            widget: Some(widget.into()),
            id,
        })
    }
}

fn needs_quoting(widget: &str) -> bool {
    widget.is_empty() || widget.contains(['.', '{', '}', '\\'])
}

impl fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.widget {
            Some(widget) if needs_quoting(widget) => {
                f.write_str("{")?;
                for ch in widget.chars() {
                    if matches!(ch, '}' | '\\') {
                        f.write_str("\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                f.write_str("}")?;
            }
            Some(widget) => f.write_str(widget)?,
            None => {}
        }
        if let Some(id) = &self.id {
            write!(f, ".{id}")?;
        }
        Ok(())
    }
}

impl Serialize for ResponseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResponseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// One `{id, value}` pair reported by an embedded document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseReport {
    pub id: SmolStr,
    #[serde(default)]
    pub value: Value,
}

impl ResponseReport {
    pub fn new(id: impl Into<SmolStr>, value: Value) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

/// Responses recorded for a single step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResponses(BTreeMap<ResponseKey, Value>);

impl StepResponses {
    pub fn get(&self, key: &ResponseKey) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up by the rendered key, e.g. `"Foo.selected"`.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.0.get(&ResponseKey::parse(key))
    }

    pub fn insert(&mut self, key: ResponseKey, value: Value) -> Option<Value> {
        self.0.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResponseKey, &Value)> {
        self.0.iter()
    }

    /// Entries belonging to one widget.
    pub fn for_widget<'a>(
        &'a self,
        widget: &'a str,
    ) -> impl Iterator<Item = (&'a ResponseKey, &'a Value)> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.widget.as_deref() == Some(widget))
    }
}

/// All responses of a session, keyed by step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseMap(BTreeMap<StepId, StepResponses>);

impl ResponseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self, step: &str) -> Option<&StepResponses> {
        self.0.get(step)
    }

    pub fn get(&self, step: &str, key: &ResponseKey) -> Option<&Value> {
        self.step(step)?.get(key)
    }

    /// Record a single value, replacing any earlier value for the same key.
    pub fn record(&mut self, step: &StepId, key: ResponseKey, value: Value) {
        self.0.entry(step.clone()).or_default().insert(key, value);
    }

    /// Fold a batch of reports from one widget into the step.
    ///
    /// Only the touched keys change. Returns the keys written, in report order.
    pub fn fold(
        &mut self,
        step: &StepId,
        widget: Option<&WidgetName>,
        reports: impl IntoIterator<Item = ResponseReport>,
    ) -> Vec<ResponseKey> {
        let entries = self.0.entry(step.clone()).or_default();
        reports
            .into_iter()
            .map(|report| {
                let key = ResponseKey::attributed(widget, report.id);
                entries.insert(key.clone(), report.value);
                key
            })
            .collect()
    }

    /// Read view of one widget's responses within a step.
    pub fn slice<'a>(&'a self, step: &'a str, widget: &'a str) -> ResponseSlice<'a> {
        ResponseSlice {
            widget,
            step: self.step(step),
        }
    }
}

/// What a renderer sees of the response map: its own widget name plus the
/// whole step, since formulas may reference other widgets' answers.
#[derive(Clone, Copy, Debug)]
pub struct ResponseSlice<'a> {
    pub widget: &'a str,
    pub step: Option<&'a StepResponses>,
}

impl<'a> ResponseSlice<'a> {
    pub fn empty(widget: &'a str) -> Self {
        Self { widget, step: None }
    }

    /// `{widget}.{id}`
    pub fn get(&self, id: &str) -> Option<&'a Value> {
        self.step?.get(&ResponseKey::property(self.widget, id))
    }

    /// Bare `{widget}`
    pub fn scalar(&self) -> Option<&'a Value> {
        self.step?.get(&ResponseKey::scalar(self.widget))
    }

    /// Any key in the step, e.g. for formula lookups.
    pub fn lookup(&self, key: &str) -> Option<&'a Value> {
        self.step?.lookup(key)
    }

    pub fn has_any(&self) -> bool {
        self.step
            .is_some_and(|s| s.for_widget(self.widget).next().is_some())
    }
}
