//! Locally implemented widget kinds.
//!
//! These never load an embed. Response-taking kinds write under their own
//! widget name: a bare `{widget}` key for single values, or one object under
//! `{widget}` for a multi-part template.

use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::formula;
use crate::properties::{TemplateItem, TemplateItemKind, WidgetBody, ordered_entries, scalar_text};
use crate::registry::{
    Control, Direction, Formatting, RenderContext, Renderer, TemplateContent, TemplateItemView,
    View, WidgetEvent,
};
use crate::response::ResponseKey;

const YOUTUBE_PREFIX: &str = "https://www.youtube";

fn string_property(body: &WidgetBody, id: &str) -> Option<String> {
    body.properties
        .as_ref()?
        .defined(id)
        .and_then(scalar_text)
        .filter(|s| !s.is_empty())
}

/// Static rich text: `Text`, `Prompt`, `Question`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RichTextRenderer;

impl Renderer for RichTextRenderer {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, _cx: &RenderContext<'_>) -> View {
        match &body.document {
            Some(doc) => View::RichText(doc.clone()).styled(formatting),
            None => View::Empty,
        }
    }

    fn handle(&self, body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        match event {
            WidgetEvent::Document(document) => cx.update_body(WidgetBody {
                document: Some(document),
                ..body.clone()
            }),
            WidgetEvent::SelectAsActive => cx.toggle_selected_content(cx.widget),
            _ => {}
        }
    }
}

/// Text computed from a formula over the step's responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicTextRenderer;

impl DynamicTextRenderer {
    pub fn evaluate(body: &WidgetBody, cx: &RenderContext<'_>) -> String {
        let Some(source) = string_property(body, "formula") else {
            return String::new();
        };
        let source = source.strip_prefix('=').unwrap_or(&source);
        match formula::evaluate(source, &cx.responses) {
            Ok(value) => value.to_string(),
            Err(error) => {
                tracing::warn!(widget = %cx.widget, %error, "dynamic text formula failed");
                String::new()
            }
        }
    }
}

impl Renderer for DynamicTextRenderer {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        View::Text(Self::evaluate(body, cx)).styled(formatting)
    }
}

/// A button that records `{widget}.clicked`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ButtonRenderer;

impl Renderer for ButtonRenderer {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, _cx: &RenderContext<'_>) -> View {
        let label = string_property(body, "text").unwrap_or_else(|| "Button".into());
        View::Button {
            label: label.into(),
        }
        .styled(formatting)
    }

    fn handle(&self, _body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        match event {
            WidgetEvent::Clicked => {
                cx.set_response(ResponseKey::property(cx.widget.clone(), "clicked"), Value::Bool(true))
            }
            WidgetEvent::SelectAsActive => cx.toggle_selected_content(cx.widget),
            _ => {}
        }
    }
}

/// An uploaded image.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageRenderer;

impl Renderer for ImageRenderer {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let view = match &body.url {
            Some(url) => View::Image { url: url.clone() },
            None => View::Empty,
        }
        .styled(formatting);
        if !cx.is_authoring() {
            return view;
        }
        let controls = match body.url {
            Some(_) => vec![Control::DeleteImage],
            None => vec![Control::UploadImage, Control::AssetLibrary(cx.location.clone())],
        };
        view.with_controls(controls)
    }

    fn handle(&self, body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        match event {
            WidgetEvent::ImageChosen(url) => cx.update_body(WidgetBody {
                url: Some(url),
                ..body.clone()
            }),
            WidgetEvent::ImageCleared => cx.update_body(WidgetBody {
                url: None,
                ..body.clone()
            }),
            WidgetEvent::SelectAsActive => cx.toggle_selected_content(cx.widget),
            _ => {}
        }
    }
}

/// Free-text answer stored under `{widget}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseBoxRenderer {
    multiline: bool,
}

impl ResponseBoxRenderer {
    pub fn short() -> Self {
        Self { multiline: false }
    }

    pub fn long() -> Self {
        Self { multiline: true }
    }
}

impl Renderer for ResponseBoxRenderer {
    fn render(&self, _body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let value = if cx.is_authoring() {
            String::new()
        } else {
            cx.responses.scalar().and_then(scalar_text).unwrap_or_default()
        };
        View::TextInput {
            value,
            multiline: self.multiline,
            read_only: cx.is_authoring(),
        }
        .styled(formatting)
    }

    fn handle(&self, _body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        match event {
            WidgetEvent::Input(value) => {
                cx.set_response(ResponseKey::scalar(cx.widget.clone()), Value::String(value))
            }
            WidgetEvent::SelectAsActive => cx.toggle_selected_content(cx.widget),
            _ => {}
        }
    }
}

/// Pick one of the `options` list, stored under `{widget}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DropdownRenderer;

impl DropdownRenderer {
    pub fn options(body: &WidgetBody) -> Vec<String> {
        body.properties
            .as_ref()
            .and_then(|p| p.defined("options"))
            .map(|options| {
                ordered_entries(options)
                    .iter()
                    .filter_map(|e| scalar_text(e.payload()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Renderer for DropdownRenderer {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let options = Self::options(body);
        let response = if cx.is_authoring() {
            None
        } else {
            cx.responses.scalar().and_then(scalar_text)
        };
        let selected = response.or_else(|| options.first().cloned());
        View::Dropdown {
            options,
            selected,
            read_only: cx.is_authoring(),
        }
        .styled(formatting)
    }

    fn handle(&self, _body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        match event {
            WidgetEvent::Input(value) => {
                cx.set_response(ResponseKey::scalar(cx.widget.clone()), Value::String(value))
            }
            WidgetEvent::SelectAsActive => cx.toggle_selected_content(cx.widget),
            _ => {}
        }
    }
}

/// An ordered mix of text and response spaces.
///
/// Answers for all spaces are kept together in one object under `{widget}`,
/// keyed by item id.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseTemplateRenderer;

impl ResponseTemplateRenderer {
    fn items(body: &WidgetBody) -> &[TemplateItem] {
        body.items.as_deref().unwrap_or_default()
    }

    fn answers(cx: &RenderContext<'_>) -> Map<String, Value> {
        cx.responses
            .scalar()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Move the item at `index` one place in `direction`.
    pub fn moved(items: &[TemplateItem], index: usize, direction: Direction) -> Option<Vec<TemplateItem>> {
        let target = match direction {
            Direction::Up => index.checked_sub(1)?,
            Direction::Down => index.checked_add(1)?,
        };
        if target >= items.len() || index >= items.len() {
            return None;
        }
        let mut items = items.to_vec();
        items.swap(index, target);
        Some(items)
    }
}

impl Renderer for ResponseTemplateRenderer {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let items = Self::items(body);
        let authoring = cx.is_authoring();
        let answers = Self::answers(cx);
        let views = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let content = match (item.kind, authoring) {
                    (TemplateItemKind::Text, _) => TemplateContent::Text(item.body.clone()),
                    (TemplateItemKind::ResponseSpace, true) => TemplateContent::Placeholder,
                    (TemplateItemKind::ResponseSpace, false) => TemplateContent::Input(
                        answers.get(item.id.as_str()).and_then(scalar_text).unwrap_or_default(),
                    ),
                };
                TemplateItemView {
                    id: item.id.clone(),
                    content,
                    can_move_up: authoring && i > 0,
                    can_move_down: authoring && i + 1 < items.len(),
                    removable: authoring,
                }
            })
            .collect();
        View::Template(views).styled(formatting)
    }

    fn handle(&self, body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        let items = Self::items(body);
        match event {
            WidgetEvent::Move { index, direction } => {
                if let Some(items) = Self::moved(items, index, direction) {
                    cx.update_body(WidgetBody {
                        items: Some(items),
                        ..body.clone()
                    });
                }
            }
            WidgetEvent::Remove { index } if index < items.len() => {
                let mut items = items.to_vec();
                items.remove(index);
                cx.update_body(WidgetBody {
                    items: Some(items),
                    ..body.clone()
                });
            }
            WidgetEvent::Append(kind) => {
                let mut items = items.to_vec();
                items.push(new_template_item(kind));
                cx.update_body(WidgetBody {
                    items: Some(items),
                    ..body.clone()
                });
            }
            WidgetEvent::TemplateInput { item, value } => {
                let mut answers = Self::answers(cx);
                answers.insert(item.to_string(), Value::String(value));
                cx.set_response(ResponseKey::scalar(cx.widget.clone()), Value::Object(answers));
            }
            WidgetEvent::SelectAsActive => cx.toggle_selected_content(cx.widget),
            _ => {}
        }
    }
}

/// A plain web page in a frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebpageRenderer;

impl Renderer for WebpageRenderer {
    fn render(&self, body: &WidgetBody, _formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let view = match string_property(body, "src") {
            Some(src) => View::Frame { src },
            None => View::Empty,
        };
        select_control(view, cx)
    }
}

/// A YouTube embed or a direct video file.
#[derive(Clone, Copy, Debug, Default)]
pub struct VideoRenderer;

impl VideoRenderer {
    pub fn is_youtube(src: &str) -> bool {
        src.starts_with(YOUTUBE_PREFIX)
    }
}

impl Renderer for VideoRenderer {
    fn render(&self, body: &WidgetBody, _formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let view = match string_property(body, "src") {
            Some(src) if Self::is_youtube(&src) => View::Frame { src },
            Some(src) => View::Video { src },
            None => View::Empty,
        };
        select_control(view, cx)
    }
}

fn select_control(view: View, cx: &RenderContext<'_>) -> View {
    if cx.is_authoring() {
        view.with_controls(vec![Control::SelectAsActive])
    } else {
        view
    }
}

fn new_template_item(kind: TemplateItemKind) -> TemplateItem {
    TemplateItem {
        id: SmolStr::new(uuid::Uuid::new_v4().to_string()),
        kind,
        body: None,
    }
}
