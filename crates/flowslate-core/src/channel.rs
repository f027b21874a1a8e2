//! Inbound messages from embedded documents.
//!
//! Embeds talk back through window messages. Two payloads exist: a list of
//! `{id, value}` response reports, and a `urlQueryChange` notice sent while an
//! embed is in design mode. Both are only trusted when the message origin is
//! the configured embed host.
//!
//! [`ResponseChannel`] folds response reports into the [`ResponseMap`] for the
//! active step, attributing each message to the widget whose frame sent it.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::response::{ResponseKey, ResponseMap, ResponseReport, StepId, WidgetName};

/// Payload carried in `event.data.data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Responses(Vec<ResponseReport>),
    QueryChange(QueryChange),
}

/// Live query reported by an embed in design mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryChange {
    pub kind: QueryChangeKind,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryChangeKind {
    #[serde(rename = "urlQueryChange")]
    UrlQueryChange,
}

/// A window message as seen by the page, with the sending window as `H`.
#[derive(Clone, Debug)]
pub struct InboundMessage<H> {
    pub origin: String,
    pub source: Option<H>,
    /// `event.data`, whose `data` field holds the payload.
    pub data: Value,
}

impl<H> InboundMessage<H> {
    pub fn new(origin: impl Into<String>, source: Option<H>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            source,
            data,
        }
    }

    /// Decode the payload, `None` if it is neither known shape.
    pub fn payload(&self) -> Option<MessagePayload> {
        let inner = self.data.get("data")?;
        MessagePayload::deserialize(inner).ok()
    }
}

/// Accepts only messages from one trusted origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginFilter {
    origin: String,
}

impl OriginFilter {
    /// Trust the origin of `host`, e.g. `https://slate.example.com/`.
    pub fn new(host: &str) -> Self {
        let origin = match Url::parse(host) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => host.trim_end_matches('/').to_string(),
        };
        Self { origin }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn accepts(&self, origin: &str) -> bool {
        origin == self.origin
    }

    /// The message's payload, if it comes from the trusted origin and parses.
    pub fn accept<H>(&self, message: &InboundMessage<H>) -> Option<MessagePayload> {
        if !self.accepts(&message.origin) {
            tracing::trace!(origin = %message.origin, "dropped message from untrusted origin");
            return None;
        }
        message.payload()
    }
}

/// Live embed frames and the widgets that own them.
///
/// `H` is whatever identifies a frame's window; in the browser it compares
/// content windows by identity.
#[derive(Clone, Debug)]
pub struct FrameRegistry<H> {
    frames: Vec<(H, WidgetName)>,
}

impl<H> Default for FrameRegistry<H> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<H: PartialEq> FrameRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame. Re-mounting a known frame renames it.
    pub fn mount(&mut self, frame: H, widget: impl Into<WidgetName>) {
        let widget = widget.into();
        match self.frames.iter_mut().find(|(h, _)| *h == frame) {
            Some(entry) => entry.1 = widget,
            None => self.frames.push((frame, widget)),
        }
    }

    pub fn unmount(&mut self, frame: &H) {
        self.frames.retain(|(h, _)| h != frame);
    }

    pub fn widget_for(&self, source: &H) -> Option<&WidgetName> {
        self.frames
            .iter()
            .find(|(h, _)| h == source)
            .map(|(_, w)| w)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// Untrusted origin or unreadable payload.
    Dropped,
    /// No step is active, so there is nowhere to record responses.
    Inactive,
    /// A design-mode notice; not a response.
    QueryChange(String),
    Recorded {
        step: StepId,
        widget: Option<WidgetName>,
        keys: Vec<ResponseKey>,
    },
}

type Fallback<H> = Box<dyn Fn(&H) -> Option<WidgetName>>;

#[derive(Debug)]
struct ActiveStep {
    step: StepId,
    generation: u64,
}

/// Receives response reports and records them for the active step.
pub struct ResponseChannel<H> {
    filter: OriginFilter,
    frames: FrameRegistry<H>,
    fallback: Option<Fallback<H>>,
    active: Rc<RefCell<Option<ActiveStep>>>,
    generation: u64,
}

impl<H: PartialEq> ResponseChannel<H> {
    pub fn new(filter: OriginFilter) -> Self {
        Self {
            filter,
            frames: FrameRegistry::new(),
            fallback: None,
            active: Rc::new(RefCell::new(None)),
            generation: 0,
        }
    }

    /// Attribution to try when a source is not a registered frame.
    pub fn with_fallback(mut self, fallback: impl Fn(&H) -> Option<WidgetName> + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn frames(&self) -> &FrameRegistry<H> {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FrameRegistry<H> {
        &mut self.frames
    }

    pub fn filter(&self) -> &OriginFilter {
        &self.filter
    }

    /// Start accepting responses for `step`.
    ///
    /// Any previously active step is deactivated. Responses stop being
    /// recorded when the returned scope is dropped.
    pub fn activate(&mut self, step: impl Into<StepId>) -> StepScope {
        let step = step.into();
        self.generation += 1;
        let previous = self.active.borrow_mut().replace(ActiveStep {
            step: step.clone(),
            generation: self.generation,
        });
        if let Some(previous) = previous {
            tracing::debug!(from = %previous.step, to = %step, "switching active step");
        }
        StepScope {
            step,
            generation: self.generation,
            active: Rc::clone(&self.active),
        }
    }

    pub fn deactivate(&mut self) {
        self.active.borrow_mut().take();
    }

    pub fn active_step(&self) -> Option<StepId> {
        self.active.borrow().as_ref().map(|a| a.step.clone())
    }

    /// Attribute a message source to a widget.
    pub fn attribute(&self, source: Option<&H>) -> Option<WidgetName> {
        let source = source?;
        self.frames
            .widget_for(source)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|f| f(source)))
    }

    /// Handle one inbound message, recording responses into `responses`.
    ///
    /// Only the reported keys are written; everything else in the map is left
    /// as it was.
    pub fn receive(&self, message: &InboundMessage<H>, responses: &mut ResponseMap) -> Delivery {
        let Some(payload) = self.filter.accept(message) else {
            return Delivery::Dropped;
        };
        let reports = match payload {
            MessagePayload::QueryChange(change) => return Delivery::QueryChange(change.value),
            MessagePayload::Responses(reports) => reports,
        };
        let Some(step) = self.active_step() else {
            tracing::debug!("response received with no active step");
            return Delivery::Inactive;
        };

        let widget = self.attribute(message.source.as_ref());
        if widget.is_none() {
            tracing::warn!(
                %step,
                ids = ?reports.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                "could not attribute response to a widget, recording unnamed"
            );
        }
        let keys = responses.fold(&step, widget.as_ref(), reports);
        tracing::debug!(%step, widget = ?widget, count = keys.len(), "responses recorded");
        Delivery::Recorded { step, widget, keys }
    }
}

/// Guard for an active step. Dropping it stops recording for that step,
/// unless another step has been activated since.
#[derive(Debug)]
#[must_use = "the step is deactivated when the scope is dropped"]
pub struct StepScope {
    step: StepId,
    generation: u64,
    active: Rc<RefCell<Option<ActiveStep>>>,
}

impl StepScope {
    pub fn step(&self) -> &StepId {
        &self.step
    }
}

impl Drop for StepScope {
    fn drop(&mut self) {
        let mut active = self.active.borrow_mut();
        if active
            .as_ref()
            .is_some_and(|a| a.generation == self.generation)
        {
            tracing::debug!(step = %self.step, "step deactivated");
            *active = None;
        }
    }
}
