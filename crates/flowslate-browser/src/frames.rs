//! Mapping message sources back to widgets.
//!
//! A message's `source` is the sending iframe's content window. Frames the
//! host mounted through [`mount_frame`] are looked up directly; anything else
//! falls back to finding the iframe in the document and walking its
//! ancestors for a `data-contentname` attribute.

use flowslate_core::channel::ResponseChannel;
use flowslate_core::response::WidgetName;
use js_sys::Object;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement, HtmlIFrameElement};

/// Attribute the host puts on each widget's container element.
pub const CONTENT_NAME_ATTR: &str = "data-contentname";

/// A browsing context that may send us messages.
///
/// Compared by JS identity, so two handles to the same window are equal.
#[derive(Clone, Debug)]
pub struct FrameWindow(Object);

impl PartialEq for FrameWindow {
    fn eq(&self, other: &Self) -> bool {
        Object::is(&self.0, &other.0)
    }
}

impl FrameWindow {
    /// Wrap `MessageEvent.source`.
    pub fn from_source(source: Object) -> Self {
        Self(source)
    }

    /// The content window of an iframe, once it has one.
    pub fn of(frame: &HtmlIFrameElement) -> Option<Self> {
        frame
            .content_window()
            .map(|window| Self(window.unchecked_into()))
    }
}

/// Register `frame` as belonging to `widget`. Returns false if the frame has
/// no content window yet.
pub fn mount_frame(
    channel: &mut ResponseChannel<FrameWindow>,
    frame: &HtmlIFrameElement,
    widget: impl Into<WidgetName>,
) -> bool {
    match FrameWindow::of(frame) {
        Some(window) => {
            channel.frames_mut().mount(window, widget);
            true
        }
        None => false,
    }
}

pub fn unmount_frame(channel: &mut ResponseChannel<FrameWindow>, frame: &HtmlIFrameElement) {
    if let Some(window) = FrameWindow::of(frame) {
        channel.frames_mut().unmount(&window);
    }
}

/// Find the widget owning the iframe whose window is `source`.
pub fn content_name_for(document: &Document, source: &FrameWindow) -> Option<WidgetName> {
    let frames = document.get_elements_by_tag_name("iframe");
    let body = document.body();
    (0..frames.length())
        .filter_map(|i| frames.item(i))
        .filter_map(|element| element.dyn_into::<HtmlIFrameElement>().ok())
        .find(|frame| FrameWindow::of(frame).as_ref() == Some(source))
        .and_then(|frame| ancestor_content_name(&frame, body.as_ref()))
}

/// Nearest `data-contentname` above `element`, stopping at `body`.
pub fn ancestor_content_name(element: &Element, body: Option<&HtmlElement>) -> Option<WidgetName> {
    let mut parent = element.parent_element();
    while let Some(current) = parent {
        if body.is_some_and(|b| b.is_same_node(Some(current.as_ref()))) {
            break;
        }
        if let Some(name) = current.get_attribute(CONTENT_NAME_ATTR) {
            return Some(name.into());
        }
        parent = current.parent_element();
    }
    None
}

/// A response channel that falls back to the DOM walk for unknown frames.
pub fn channel_with_dom_fallback(
    channel: ResponseChannel<FrameWindow>,
    document: Document,
) -> ResponseChannel<FrameWindow> {
    channel.with_fallback(move |source| {
        let name = content_name_for(&document, source);
        if let Some(name) = &name {
            tracing::trace!(widget = %name, "attributed by ancestor walk");
        }
        name
    })
}
