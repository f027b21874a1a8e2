//! End-to-end flows through the registry, synchronizer, response channel and
//! design session, the way a host page drives them.

use std::cell::RefCell;
use std::time::Duration;

use serde_json::{Value, json};
use web_time::Instant;

use flowslate_core::assets::StepLocation;
use flowslate_core::channel::{Delivery, InboundMessage, ResponseChannel};
use flowslate_core::design::{DesignSession, SaveOutcome, apply_saved_query};
use flowslate_core::{
    EmbedConfig, Formatting, InstanceId, ModeContext, Observation, PropertyTree, QueryState,
    QuerySynchronizer, RenderContext, ResponseKey, ResponseMap, ResponseSlice, SerializeContext,
    View, WidgetBody, WidgetName, default_registry,
};

const HOST: &str = "http://localhost:5000";

fn ignore_response(_: ResponseKey, _: Value) {}

fn presentation_cx<'a>(
    widget: &'a WidgetName,
    location: &'a StepLocation,
    config: &'a EmbedConfig,
    responses: ResponseSlice<'a>,
    query: QueryState,
) -> RenderContext<'a> {
    RenderContext {
        widget,
        location,
        config,
        responses,
        query,
        mode: ModeContext::Presentation {
            set_response: &ignore_response,
        },
        extras: None,
        toggle_selected_content: None,
    }
}

fn choices() -> PropertyTree {
    PropertyTree::new()
        .with(
            "option",
            json!({
                "b": { "value": "Blue", "position": 1 },
                "a": { "value": "Red", "position": 0 },
            }),
        )
        .with("shuffle", json!(false))
}

#[test]
fn multiple_choice_presentation_query() {
    let registry = default_registry();
    let query = registry
        .serialize("MultipleChoice", &choices(), &SerializeContext::presentation())
        .unwrap();
    assert_eq!(query.as_str(), "option=Red&option=Blue");
}

#[test]
fn forced_boolean_emitted_when_unset() {
    let registry = default_registry();
    let query = registry
        .serialize(
            "ObjectLengthWithCentimeterCubes",
            &PropertyTree::new(),
            &SerializeContext::presentation(),
        )
        .unwrap();
    assert_eq!(query.as_str(), "fixedDropbox=false");
}

#[test]
fn debounced_embed_settles_after_delay() {
    let registry = default_registry();
    let plugin = registry.resolve("MultipleChoice").unwrap();
    let serializer = plugin.serializer.as_deref().unwrap();
    let config = EmbedConfig::development();
    let location = StepLocation::new("app", "flow", "s1");
    let widget: WidgetName = "Choice".into();
    let body = WidgetBody::with_properties(choices());

    let mut sync = QuerySynchronizer::new();
    let instance = InstanceId::new();
    let start = Instant::now();
    let observation = sync.observe_tree(
        instance,
        serializer,
        &choices(),
        &SerializeContext::presentation(),
        start,
    );
    assert!(matches!(observation, Observation::Scheduled { .. }));

    let cx = presentation_cx(&widget, &location, &config, ResponseSlice::empty("Choice"), sync.state(instance));
    let view = registry.render("MultipleChoice", &body, &Formatting::default(), &cx).unwrap();
    assert_eq!(view, View::Loading);

    assert!(sync.fire_due(start + Duration::from_secs(4)).is_empty());
    let published = sync.fire_due(start + Duration::from_secs(5));
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].query.as_str(), "option=Red&option=Blue");

    let cx = presentation_cx(&widget, &location, &config, ResponseSlice::empty("Choice"), sync.state(instance));
    let view = registry.render("MultipleChoice", &body, &Formatting::default(), &cx).unwrap();
    assert_eq!(
        view,
        View::Embed {
            src: "http://localhost:5000/show?template=multiple-choice&option=Red&option=Blue".into(),
            widget: "Choice".into(),
            allow_fullscreen: false,
        }
    );
}

#[test]
fn concurrent_instances_publish_independently() {
    let mut sync = QuerySynchronizer::new();
    let a = InstanceId::new();
    let b = InstanceId::new();
    let t0 = Instant::now();
    let q = |s: &str| Some(flowslate_core::CanonicalQuery::from_encoded(s));

    sync.observe(a, q("number=1"), t0);
    sync.observe(b, q("number=2"), t0 + Duration::from_secs(2));
    // A keeps editing; B's timer must be untouched.
    sync.observe(a, q("number=3"), t0 + Duration::from_secs(4));

    let at_seven = sync.fire_due(t0 + Duration::from_secs(7));
    assert_eq!(at_seven.len(), 1);
    assert_eq!(at_seven[0].instance, b);
    assert_eq!(at_seven[0].query.as_str(), "number=2");

    let at_nine = sync.fire_due(t0 + Duration::from_secs(9));
    assert_eq!(at_nine.len(), 1);
    assert_eq!(at_nine[0].instance, a);
    assert_eq!(at_nine[0].query.as_str(), "number=3");
}

#[test]
fn responses_fold_per_widget_and_step() {
    let config = EmbedConfig::development();
    let mut channel: ResponseChannel<u32> = ResponseChannel::new(config.origin_filter());
    channel.frames_mut().mount(1, "Array");
    channel.frames_mut().mount(2, "Choice");
    let mut responses = ResponseMap::new();

    let scope = channel.activate("s1");
    let report = |frame: u32, data: Value| InboundMessage::new(HOST, Some(frame), json!({ "data": data }));

    channel.receive(&report(1, json!([{ "id": "rows", "value": 3 }, { "id": "columns", "value": 4 }])), &mut responses);
    let delivery = channel.receive(
        &report(2, json!([{ "id": "selected", "value": [{ "id": "a", "content": "Red", "index": 0 }] }])),
        &mut responses,
    );
    assert!(matches!(delivery, Delivery::Recorded { .. }));
    channel.receive(&report(1, json!([{ "id": "rows", "value": 5 }])), &mut responses);

    assert_eq!(responses.get("s1", &ResponseKey::property("Array", "rows")), Some(&json!(5)));
    assert_eq!(responses.get("s1", &ResponseKey::property("Array", "columns")), Some(&json!(4)));
    assert!(responses.get("s1", &ResponseKey::property("Choice", "selected")).is_some());

    drop(scope);
    assert_eq!(
        channel.receive(&report(1, json!([{ "id": "rows", "value": 9 }])), &mut responses),
        Delivery::Inactive
    );
    assert_eq!(responses.get("s1", &ResponseKey::property("Array", "rows")), Some(&json!(5)));
}

#[test]
fn drag_into_slots_resumes_progress() {
    let registry = default_registry();
    let config = EmbedConfig::development();
    let location = StepLocation::new("app", "flow", "s1");
    let widget: WidgetName = "Slots".into();
    let body = WidgetBody::with_query("slot=%7B%22name%22%3A%22s1%22%7D&piece=%7B%22name%22%3A%22p1%22%7D");

    let mut responses = ResponseMap::new();
    responses.record(
        &"s1".into(),
        ResponseKey::property("Slots", "filledSlots"),
        json!([{ "slot": "s1", "piece": "p1" }]),
    );

    let cx = presentation_cx(&widget, &location, &config, responses.slice("s1", "Slots"), QueryState::Empty);
    let view = registry.render("DragIntoSlots", &body, &Formatting::default(), &cx).unwrap();
    assert_eq!(
        view,
        View::Embed {
            src: "http://localhost:5000/show?template=drag-into-slots\
                  &piece=%7B%22name%22%3A%22p1%22%7D\
                  &slot=%7B%22name%22%3A%22s1%22%2C%22piece%22%3A%7B%22name%22%3A%22p1%22%7D%7D"
                .into(),
            widget: "Slots".into(),
            allow_fullscreen: true,
        }
    );
}

#[test]
fn design_round_trip_persists_live_query() {
    let registry = default_registry();
    let config = EmbedConfig::development();
    let plugin = registry.resolve("Hotspots").unwrap();
    let stored = RefCell::new(WidgetBody::with_query("image=old.png"));

    let mut session = DesignSession::new(&config);
    let src = session
        .open("Hotspots", plugin, &stored.borrow(), config.host())
        .unwrap();
    assert_eq!(
        src.to_string(),
        "http://localhost:5000/show?template=hotspots&image=old.png&mode=design"
    );

    let change = |origin: &str, value: &str| {
        InboundMessage::<()>::new(
            origin,
            None,
            json!({ "data": { "kind": "urlQueryChange", "value": value } }),
        )
    };
    assert!(!session.on_message(&change("https://elsewhere.example.com", "image=evil.png")));
    assert!(session.on_message(&change(HOST, "template=hotspots&image=new.png&spot=2&mode=design")));

    let outcome = session
        .save(|query| {
            let updated = apply_saved_query(&stored.borrow(), &query);
            *stored.borrow_mut() = updated;
        })
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved(_)));
    assert!(!session.is_open());
    assert_eq!(stored.borrow().query.as_deref(), Some("image=new.png&spot=2"));

    let location = StepLocation::new("app", "flow", "s1");
    let widget: WidgetName = "Spots".into();
    let cx = presentation_cx(&widget, &location, &config, ResponseSlice::empty("Spots"), QueryState::Empty);
    let view = registry
        .render("Hotspots", &stored.borrow(), &Formatting::default(), &cx)
        .unwrap();
    assert_eq!(
        view,
        View::Embed {
            src: "http://localhost:5000/show?template=hotspots&image=new.png&spot=2".into(),
            widget: "Spots".into(),
            allow_fullscreen: true,
        }
    );
}

#[test]
fn unknown_kind_is_an_error() {
    let registry = default_registry();
    assert!(registry.resolve("Spreadsheet").is_err());
}
