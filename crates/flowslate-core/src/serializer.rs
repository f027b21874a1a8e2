//! Per-kind query serializers.
//!
//! Each embedded content type owns one [`QuerySerializer`], which turns the
//! widget's property tree into a [`CanonicalQuery`]. Serializers are pure:
//! the same tree, mode and responses always yield the same string, which the
//! synchronizer relies on to skip redundant updates.

use serde_json::Value;
use smol_str::SmolStr;

use crate::error::SerializeError;
use crate::formula;
use crate::properties::{
    PropertySpec, PropertyTree, ordered_entries, scalar_text, titled_field,
};
use crate::query::{CanonicalQuery, QueryBuilder, encode_component};
use crate::response::ResponseSlice;

/// Whether the widget is being edited or shown to a learner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Authoring,
    Presentation,
}

impl RenderMode {
    pub fn is_authoring(self) -> bool {
        matches!(self, Self::Authoring)
    }
}

/// Inputs a serializer may depend on besides the property tree.
#[derive(Clone, Copy, Debug)]
pub struct SerializeContext<'a> {
    pub mode: RenderMode,
    /// Response state formula-valued properties are evaluated against.
    pub responses: ResponseSlice<'a>,
}

impl<'a> SerializeContext<'a> {
    pub fn new(mode: RenderMode, responses: ResponseSlice<'a>) -> Self {
        Self { mode, responses }
    }

    /// Authoring context with no responses, mostly for tests.
    pub fn authoring() -> SerializeContext<'static> {
        SerializeContext {
            mode: RenderMode::Authoring,
            responses: ResponseSlice::empty(""),
        }
    }

    pub fn presentation() -> SerializeContext<'static> {
        SerializeContext {
            mode: RenderMode::Presentation,
            responses: ResponseSlice::empty(""),
        }
    }
}

/// Turns a property tree into the query an embedded document reads.
pub trait QuerySerializer {
    /// Name of the content type, for error messages.
    fn kind(&self) -> &str;

    /// Declared configurable properties, including which are required.
    fn properties(&self) -> &[PropertySpec];

    /// Serialize without checking required properties.
    fn serialize_unchecked(
        &self,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
    ) -> CanonicalQuery;

    /// Serialize, failing if any declared-required property is unset.
    fn serialize(
        &self,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
    ) -> Result<CanonicalQuery, SerializeError> {
        check_required(self.kind(), self.properties(), properties)?;
        Ok(self.serialize_unchecked(properties, cx))
    }
}

/// Fail on the first declared-required property with no value.
pub fn check_required(
    kind: &str,
    specs: &[PropertySpec],
    properties: &PropertyTree,
) -> Result<(), SerializeError> {
    match specs
        .iter()
        .find(|spec| spec.required && properties.defined(&spec.id).is_none())
    {
        Some(spec) => Err(SerializeError::MissingRequired {
            kind: kind.into(),
            property: spec.id.clone(),
        }),
        None => Ok(()),
    }
}

/// Text of a scalar value, evaluating `=`-prefixed formulas.
///
/// A formula that fails to parse or evaluate yields an empty value and a
/// warning, never an error: authors fill formulas in progressively.
pub fn resolve_scalar(value: &Value, cx: &SerializeContext<'_>) -> Option<String> {
    match value {
        Value::String(s) if s.starts_with('=') => {
            match formula::evaluate(&s[1..], &cx.responses) {
                Ok(result) => Some(result.to_string()),
                Err(error) => {
                    tracing::warn!(formula = %s, %error, "formula evaluation failed");
                    Some(String::new())
                }
            }
        }
        other => scalar_text(other),
    }
}

/// Serializer driven entirely by property declarations.
///
/// Emits `id=value` for every declared property with a defined value, in
/// declaration order. Unset properties are omitted unless declared
/// force-parameter, in which case their kind's default is emitted.
#[derive(Clone, Debug)]
pub struct DeclaredSerializer {
    kind: SmolStr,
    specs: Vec<PropertySpec>,
}

impl DeclaredSerializer {
    pub fn new(kind: &str, specs: Vec<PropertySpec>) -> Self {
        Self {
            kind: kind.into(),
            specs,
        }
    }
}

impl QuerySerializer for DeclaredSerializer {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn properties(&self) -> &[PropertySpec] {
        &self.specs
    }

    fn serialize_unchecked(
        &self,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
    ) -> CanonicalQuery {
        let mut query = QueryBuilder::new();
        for spec in &self.specs {
            match properties.defined(&spec.id).and_then(|v| resolve_scalar(v, cx)) {
                Some(text) => {
                    query.push(&spec.id, &text);
                }
                None => {
                    if let Some(default) = spec.forced_default() {
                        query.push(&spec.id, default);
                    }
                }
            }
        }
        query.finish()
    }
}

/// Numberline configuration.
///
/// `piece=Name|Length` per piece in position order, then `makepiececopy`,
/// `scales=a,b,c`, `initialScale`, `range=start,end` (only with both bounds),
/// `partsOfIntegers=fractions` and `slideBy`.
#[derive(Clone, Debug)]
pub struct NumberlineSerializer {
    specs: Vec<PropertySpec>,
}

impl NumberlineSerializer {
    pub fn new(specs: Vec<PropertySpec>) -> Self {
        Self { specs }
    }
}

impl QuerySerializer for NumberlineSerializer {
    fn kind(&self) -> &str {
        "Numberline"
    }

    fn properties(&self) -> &[PropertySpec] {
        &self.specs
    }

    fn serialize_unchecked(
        &self,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
    ) -> CanonicalQuery {
        let mut query = QueryBuilder::new();

        if let Some(pieces) = properties.defined("pieces") {
            for piece in ordered_entries(pieces) {
                let name = titled_field(piece.value, "Name").and_then(|v| resolve_scalar(v, cx));
                let length =
                    titled_field(piece.value, "Length").and_then(|v| resolve_scalar(v, cx));
                // Half-filled pieces are still being typed in.
                if let (Some(name), Some(length)) = (name, length) {
                    query.push_encoded(
                        "piece",
                        &format!("{}|{}", encode_component(&name), encode_component(&length)),
                    );
                }
            }
        }

        if let Some(text) = properties
            .defined("makepiececopy")
            .and_then(|v| resolve_scalar(v, cx))
        {
            query.push("makepiececopy", &text);
        }

        if let Some(scales) = properties.defined("scales") {
            let joined: Vec<String> = ordered_entries(scales)
                .iter()
                .filter_map(|e| resolve_scalar(e.payload(), cx))
                .map(|s| encode_component(&s))
                .collect();
            query.push_encoded("scales", &joined.join(","));
        }

        if let Some(text) = properties
            .defined("initialScale")
            .and_then(|v| resolve_scalar(v, cx))
        {
            query.push("initialScale", &text);
        }

        if let Some(range) = properties.defined("range") {
            let bound = |name: &str| {
                range
                    .get(name)
                    .map(|b| b.get("value").unwrap_or(b))
                    .and_then(|v| resolve_scalar(v, cx))
            };
            if let (Some(start), Some(end)) = (bound("Start"), bound("End")) {
                query.push_encoded(
                    "range",
                    &format!("{},{}", encode_component(&start), encode_component(&end)),
                );
            }
        }

        if properties
            .defined("partsOfIntegers")
            .is_some_and(is_truthy)
        {
            query.push("partsOfIntegers", "fractions");
        }

        if let Some(text) = properties
            .defined("slideBy")
            .and_then(|v| resolve_scalar(v, cx))
        {
            query.push("slideBy", &text);
        }

        query.finish()
    }
}

/// Multiple-choice configuration.
///
/// One `option=` per choice in position order, with formula choices
/// evaluated and empty choices dropped. Layout parameters (`shuffle`,
/// `question`, `optionsDisplayColumns`) are only sent while authoring.
#[derive(Clone, Debug)]
pub struct MultipleChoiceSerializer {
    specs: Vec<PropertySpec>,
}

impl MultipleChoiceSerializer {
    pub fn new(specs: Vec<PropertySpec>) -> Self {
        Self { specs }
    }
}

impl QuerySerializer for MultipleChoiceSerializer {
    fn kind(&self) -> &str {
        "MultipleChoice"
    }

    fn properties(&self) -> &[PropertySpec] {
        &self.specs
    }

    fn serialize_unchecked(
        &self,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
    ) -> CanonicalQuery {
        let mut query = QueryBuilder::new();

        if let Some(options) = properties.defined("option") {
            for choice in ordered_entries(options) {
                if let Some(text) = resolve_scalar(choice.payload(), cx) {
                    query.push("option", &text);
                }
            }
        }

        if cx.mode.is_authoring() {
            for id in ["shuffle", "question", "optionsDisplayColumns"] {
                if let Some(text) = properties.defined(id).and_then(|v| resolve_scalar(v, cx)) {
                    query.push(id, &text);
                }
            }
        }

        query.finish()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ResponseKey, ResponseMap, StepId};
    use serde_json::json;

    fn tree(value: Value) -> PropertyTree {
        PropertyTree::try_from(value).unwrap()
    }

    fn multiple_choice() -> MultipleChoiceSerializer {
        MultipleChoiceSerializer::new(vec![
            PropertySpec::string("question", "Question"),
            PropertySpec::boolean("shuffle", "Shuffle order for students"),
        ])
    }

    #[test]
    fn test_multiple_choice_presentation() {
        let props = tree(json!({
            "option": {
                "b": { "value": "Blue", "position": 1 },
                "a": { "value": "Red", "position": 0 },
            },
            "shuffle": false,
        }));
        let query = multiple_choice()
            .serialize(&props, &SerializeContext::presentation())
            .unwrap();
        insta::assert_snapshot!(query, @"option=Red&option=Blue");
    }

    #[test]
    fn test_multiple_choice_authoring_sends_layout() {
        let props = tree(json!({
            "option": ["Yes", null, "No"],
            "shuffle": true,
            "question": "Pick one",
        }));
        let query = multiple_choice()
            .serialize(&props, &SerializeContext::authoring())
            .unwrap();
        insta::assert_snapshot!(query, @"option=Yes&option=No&shuffle=true&question=Pick%20one");
    }

    #[test]
    fn test_multiple_choice_evaluates_formulas() {
        let step: StepId = "s1".into();
        let mut responses = ResponseMap::new();
        responses.record(&step, ResponseKey::property("Array", "columns"), json!(4));
        let cx = SerializeContext::new(
            RenderMode::Presentation,
            responses.slice("s1", "Choice"),
        );
        let props = tree(json!({
            "option": {
                "x": { "value": "=Array.columns * 2", "position": 0 },
                "y": { "value": "=Array.columns", "position": 1 },
            }
        }));
        let query = multiple_choice().serialize(&props, &cx).unwrap();
        assert_eq!(query.as_str(), "option=8&option=4");
    }

    #[test]
    fn test_forced_boolean_emits_false() {
        let serializer = DeclaredSerializer::new(
            "ObjectLengthWithCentimeterCubes",
            vec![
                PropertySpec::string("object", "Object Image URL"),
                PropertySpec::boolean("fixedDropbox", "Fixed").forced(),
                PropertySpec::string("width", "Width"),
            ],
        );
        let query = serializer
            .serialize(&tree(json!({ "width": "12" })), &SerializeContext::authoring())
            .unwrap();
        assert_eq!(query.as_str(), "fixedDropbox=false&width=12");
    }

    #[test]
    fn test_declared_omits_unset_and_null() {
        let serializer = DeclaredSerializer::new(
            "FillInTheBlanks",
            vec![
                PropertySpec::string("pre", "Before"),
                PropertySpec::string("post", "After"),
            ],
        );
        let query = serializer
            .serialize(
                &tree(json!({ "pre": "3 + 4 =", "post": null })),
                &SerializeContext::authoring(),
            )
            .unwrap();
        assert_eq!(query.as_str(), "pre=3%20%2B%204%20%3D");
    }

    #[test]
    fn test_required_property_missing() {
        let serializer =
            DeclaredSerializer::new("Timer", vec![PropertySpec::number("time", "Time").required()]);
        let err = serializer
            .serialize(&PropertyTree::new(), &SerializeContext::authoring())
            .unwrap_err();
        assert_eq!(
            err,
            SerializeError::MissingRequired {
                kind: "Timer".into(),
                property: "time".into(),
            }
        );
    }

    #[test]
    fn test_numberline_full() {
        let props = tree(json!({
            "pieces": {
                "p2": { "position": 1, "items": [
                    { "title": "Name", "value": "horse" },
                    { "title": "Length", "value": 6 },
                ]},
                "p1": { "position": 0, "items": [
                    { "title": "Name", "value": "race track" },
                    { "title": "Length", "value": 13 },
                ]},
            },
            "makepiececopy": true,
            "scales": {
                "s2": { "value": 10, "position": 1 },
                "s1": { "value": 1, "position": 0 },
            },
            "initialScale": 1,
            "range": { "Start": { "value": 0 }, "End": { "value": 20 } },
            "partsOfIntegers": true,
            "slideBy": 5,
        }));
        let query = NumberlineSerializer::new(vec![])
            .serialize(&props, &SerializeContext::authoring())
            .unwrap();
        insta::assert_snapshot!(
            query,
            @"piece=race%20track|13&piece=horse|6&makepiececopy=true&scales=1,10&initialScale=1&range=0,20&partsOfIntegers=fractions&slideBy=5"
        );
    }

    #[test]
    fn test_numberline_partial_range_omitted() {
        let props = tree(json!({
            "range": { "Start": { "value": 0 } },
            "partsOfIntegers": false,
        }));
        let query = NumberlineSerializer::new(vec![])
            .serialize(&props, &SerializeContext::authoring())
            .unwrap();
        assert!(query.is_empty());
    }

    #[test]
    fn test_deterministic_across_key_order() {
        let one: PropertyTree = serde_json::from_str(
            r#"{"shuffle":true,"option":{"a":{"value":"Red","position":0},"b":{"value":"Blue","position":1}}}"#,
        )
        .unwrap();
        let two: PropertyTree = serde_json::from_str(
            r#"{"option":{"b":{"position":1,"value":"Blue"},"a":{"position":0,"value":"Red"}},"shuffle":true}"#,
        )
        .unwrap();
        let serializer = multiple_choice();
        for cx in [SerializeContext::authoring(), SerializeContext::presentation()] {
            assert_eq!(
                serializer.serialize(&one, &cx).unwrap(),
                serializer.serialize(&two, &cx).unwrap()
            );
        }
    }

    #[test]
    fn test_broken_formula_encodes_empty() {
        let serializer = DeclaredSerializer::new("Die", vec![PropertySpec::number("number", "N")]);
        let query = serializer
            .serialize(&tree(json!({ "number": "=1 +" })), &SerializeContext::authoring())
            .unwrap();
        assert_eq!(query.as_str(), "number=");
    }
}
