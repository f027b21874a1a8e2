//! WASM browser tests for flowslate-browser.
//!
//! Run with: `wasm-pack test --headless --firefox` or `--chrome`

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

use flowslate_browser::{
    DebounceTimers, FrameWindow, config_from_js, content_name_for, inbound, listen_for_responses,
    mount_frame,
};
use flowslate_core::channel::{Delivery, ResponseChannel};
use flowslate_core::{
    CanonicalQuery, EmbedConfig, InstanceId, Observation, QueryState, QuerySynchronizer,
    ResponseKey, ResponseMap,
};
use gloo_timers::future::TimeoutFuture;
use web_sys::{HtmlIFrameElement, MessageEvent, MessageEventInit};

const HOST: &str = "http://localhost:5000";

fn document() -> web_sys::Document {
    web_sys::window().unwrap().document().unwrap()
}

/// `<div data-contentname="{name}"><div><iframe></iframe></div></div>`
fn widget_frame(name: &str) -> HtmlIFrameElement {
    let doc = document();
    let container = doc.create_element("div").unwrap();
    container.set_attribute("data-contentname", name).unwrap();
    let wrapper = doc.create_element("div").unwrap();
    let frame: HtmlIFrameElement = doc.create_element("iframe").unwrap().unchecked_into();
    wrapper.append_child(&frame).unwrap();
    container.append_child(&wrapper).unwrap();
    doc.body().unwrap().append_child(&container).unwrap();
    frame
}

/// A message event with no source window.
fn message(origin: &str, data: &str) -> MessageEvent {
    let init = MessageEventInit::new();
    init.set_origin(origin);
    init.set_data(&js_sys::JSON::parse(data).unwrap());
    MessageEvent::new_with_event_init_dict("message", &init).unwrap()
}

// === Config ===

#[wasm_bindgen_test]
fn test_config_from_page_object() {
    let value = js_sys::JSON::parse(r#"{"embed_host":"https://embeds.example.com"}"#).unwrap();
    let config = config_from_js(value).unwrap();
    assert_eq!(config.host(), "https://embeds.example.com");
    assert_eq!(config.design_refresh_delay, EmbedConfig::default().design_refresh_delay);
}

// === Frames ===

#[wasm_bindgen_test]
fn test_frame_window_identity() {
    let a = widget_frame("A");
    let b = widget_frame("B");
    assert_eq!(FrameWindow::of(&a), FrameWindow::of(&a));
    assert_ne!(FrameWindow::of(&a), FrameWindow::of(&b));
}

#[wasm_bindgen_test]
fn test_ancestor_walk_finds_content_name() {
    let frame = widget_frame("Numberline");
    let source = FrameWindow::of(&frame).unwrap();
    assert_eq!(
        content_name_for(&document(), &source).as_deref(),
        Some("Numberline")
    );
}

// === Messages ===

#[wasm_bindgen_test]
fn test_inbound_decodes_payload() {
    let event = message(HOST, r#"{"data":[{"id":"rows","value":3}]}"#);
    let msg = inbound(&event).unwrap();
    assert_eq!(msg.origin, HOST);
    assert!(msg.source.is_none());
    assert_eq!(msg.data["data"][0]["id"], "rows");
}

#[wasm_bindgen_test]
fn test_step_listener_records_and_stops_on_drop() {
    let window = web_sys::window().unwrap();
    let config = EmbedConfig::development();
    let channel = Rc::new(RefCell::new(ResponseChannel::new(config.origin_filter())));
    let responses = Rc::new(RefCell::new(ResponseMap::new()));
    let deliveries = Rc::new(RefCell::new(Vec::new()));

    let frame = widget_frame("Array");
    assert!(mount_frame(&mut channel.borrow_mut(), &frame, "Array"));

    let seen = Rc::clone(&deliveries);
    let listener = listen_for_responses(
        &window,
        Rc::clone(&channel),
        Rc::clone(&responses),
        "s1",
        move |delivery: &Delivery| seen.borrow_mut().push(delivery.clone()),
    );
    assert_eq!(listener.step().as_str(), "s1");

    let report = r#"{"data":[{"id":"rows","value":3}]}"#;
    window.dispatch_event(&message(HOST, report)).unwrap();
    window
        .dispatch_event(&message("https://elsewhere.example.com", report))
        .unwrap();

    // Dispatched synchronously; no source, so recorded unnamed.
    assert_eq!(deliveries.borrow().len(), 2);
    assert!(matches!(deliveries.borrow()[0], Delivery::Recorded { .. }));
    assert_eq!(deliveries.borrow()[1], Delivery::Dropped);
    assert_eq!(
        responses.borrow().get("s1", &ResponseKey::unnamed("rows")),
        Some(&serde_json::json!(3))
    );

    drop(listener);
    window.dispatch_event(&message(HOST, report)).unwrap();
    assert_eq!(deliveries.borrow().len(), 2);
    assert_eq!(channel.borrow().active_step(), None);
}

// === Debounce ===

#[wasm_bindgen_test]
async fn test_debounce_publishes_after_delay() {
    let sync = Rc::new(RefCell::new(QuerySynchronizer::with_delay(Duration::from_millis(20))));
    let published = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&published);
    let timers = DebounceTimers::new(Rc::clone(&sync), move |p| sink.borrow_mut().push(p));

    let a = InstanceId::new();
    let b = InstanceId::new();
    let q = |s: &str| Some(CanonicalQuery::from_encoded(s));
    assert!(matches!(timers.observe(a, q("number=1")), Observation::Scheduled { .. }));
    timers.observe(a, q("number=2"));
    timers.observe(b, q("number=9"));

    TimeoutFuture::new(80).await;

    let published = published.borrow();
    assert_eq!(published.len(), 2);
    assert_eq!(sync.borrow().state(a), QueryState::Ready(CanonicalQuery::from_encoded("number=2")));
    assert_eq!(sync.borrow().state(b), QueryState::Ready(CanonicalQuery::from_encoded("number=9")));
}

#[wasm_bindgen_test]
async fn test_release_cancels_timer() {
    let sync = Rc::new(RefCell::new(QuerySynchronizer::with_delay(Duration::from_millis(20))));
    let published = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&published);
    let timers = DebounceTimers::new(Rc::clone(&sync), move |_| *sink.borrow_mut() += 1);

    let a = InstanceId::new();
    timers.observe(a, Some(CanonicalQuery::from_encoded("number=1")));
    timers.release(a);

    TimeoutFuture::new(60).await;
    assert_eq!(*published.borrow(), 0);
    assert_eq!(sync.borrow().state(a), QueryState::Unsettled);
}
