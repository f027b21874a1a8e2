//! Window `message` listeners.
//!
//! Both listeners are guards: the DOM listener is removed when they are
//! dropped, so tearing down a step or a design popup cannot leak callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use flowslate_core::channel::{Delivery, InboundMessage, ResponseChannel, StepScope};
use flowslate_core::design::DesignSession;
use flowslate_core::response::{ResponseMap, StepId};
use gloo_events::EventListener;
use serde_json::Value;
use wasm_bindgen::JsCast;
use web_sys::{EventTarget, MessageEvent};

use crate::frames::FrameWindow;

/// Decode a window message. `None` if the data is not JSON-shaped.
pub fn inbound(event: &MessageEvent) -> Option<InboundMessage<FrameWindow>> {
    let data: Value = match serde_wasm_bindgen::from_value(event.data()) {
        Ok(data) => data,
        Err(error) => {
            tracing::trace!(%error, origin = %event.origin(), "ignoring non-JSON message");
            return None;
        }
    };
    Some(InboundMessage::new(
        event.origin(),
        event.source().map(FrameWindow::from_source),
        data,
    ))
}

fn on_message(target: &EventTarget, mut handler: impl FnMut(InboundMessage<FrameWindow>) + 'static) -> EventListener {
    EventListener::new(target, "message", move |event| {
        if let Some(message) = event.dyn_ref::<MessageEvent>().and_then(inbound) {
            handler(message);
        }
    })
}

/// Responses are recorded for one step while this is alive.
#[must_use = "responses stop being recorded when the listener is dropped"]
pub struct StepListener {
    _listener: EventListener,
    scope: StepScope,
}

impl StepListener {
    pub fn step(&self) -> &StepId {
        self.scope.step()
    }
}

/// Start recording responses for `step` from messages on `target`.
///
/// `on_delivery` runs after each message has been folded in, with no
/// borrows held.
pub fn listen_for_responses(
    target: &EventTarget,
    channel: Rc<RefCell<ResponseChannel<FrameWindow>>>,
    responses: Rc<RefCell<ResponseMap>>,
    step: impl Into<StepId>,
    on_delivery: impl Fn(&Delivery) + 'static,
) -> StepListener {
    let scope = channel.borrow_mut().activate(step);
    let listener = on_message(target, move |message| {
        let delivery = channel
            .borrow()
            .receive(&message, &mut responses.borrow_mut());
        on_delivery(&delivery);
    });
    StepListener {
        _listener: listener,
        scope,
    }
}

/// Live query updates for an open design popup.
#[must_use = "live updates stop when the listener is dropped"]
pub struct DesignListener {
    _listener: EventListener,
}

/// Feed design-mode query changes from `target` into `session`.
///
/// `on_change` receives each accepted live query.
pub fn listen_for_live_query(
    target: &EventTarget,
    session: Rc<RefCell<DesignSession>>,
    on_change: impl Fn(&str) + 'static,
) -> DesignListener {
    let listener = on_message(target, move |message| {
        let live = {
            let mut session = session.borrow_mut();
            session
                .on_message(&message)
                .then(|| session.live_query().map(str::to_owned))
                .flatten()
        };
        if let Some(live) = live {
            on_change(&live);
        }
    });
    DesignListener {
        _listener: listener,
    }
}
