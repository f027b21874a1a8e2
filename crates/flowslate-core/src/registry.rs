//! Content-type registry.
//!
//! A [`Plugin`] bundles everything the host needs to place one kind of widget
//! on a step: an authoring renderer, a presentation renderer, the property
//! declarations for the settings panel, the response keys the widget reports,
//! and whether it has a design mode.
//!
//! Renderers are framework-neutral. They turn a [`WidgetBody`] plus a
//! [`RenderContext`] into a [`View`] tree for the host UI to draw, and they
//! interpret [`WidgetEvent`]s coming back from that UI.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::assets::StepLocation;
use crate::config::EmbedConfig;
use crate::error::FlowslateError;
use crate::properties::{PropertySpec, PropertyTree, ResponseProperty, TemplateItemKind, WidgetBody};
use crate::query::CanonicalQuery;
use crate::response::{ResponseKey, ResponseSlice, WidgetName};
use crate::serializer::{QuerySerializer, RenderMode, SerializeContext};
use crate::sync::QueryState;
use crate::text::RichText;

/// Registry key of a content type, e.g. `MultipleChoice`.
pub type WidgetKind = SmolStr;

/// Per-widget style overrides, passed through to the host untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formatting(Map<String, Value>);

impl Formatting {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for Formatting {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Authoring-only collaborators, injected by the registry for embedded kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthoringExtras {
    /// Where the asset library reads and uploads.
    pub asset_library: StepLocation,
    pub select_as_active: bool,
    pub design: bool,
}

/// Mode-specific capabilities of a render.
#[derive(Clone, Copy)]
pub enum ModeContext<'a> {
    Authoring {
        update_body: &'a dyn Fn(WidgetBody),
    },
    Presentation {
        set_response: &'a dyn Fn(ResponseKey, Value),
    },
}

/// Everything a renderer may read or call.
#[derive(Clone)]
pub struct RenderContext<'a> {
    pub widget: &'a WidgetName,
    pub location: &'a StepLocation,
    pub config: &'a EmbedConfig,
    pub responses: ResponseSlice<'a>,
    /// Synchronizer state of this instance, for embedded kinds.
    pub query: QueryState,
    pub mode: ModeContext<'a>,
    pub extras: Option<AuthoringExtras>,
    pub toggle_selected_content: Option<&'a dyn Fn(&WidgetName)>,
}

impl<'a> RenderContext<'a> {
    pub fn render_mode(&self) -> RenderMode {
        match self.mode {
            ModeContext::Authoring { .. } => RenderMode::Authoring,
            ModeContext::Presentation { .. } => RenderMode::Presentation,
        }
    }

    pub fn is_authoring(&self) -> bool {
        self.render_mode().is_authoring()
    }

    pub fn serialize_context(&self) -> SerializeContext<'a> {
        SerializeContext::new(self.render_mode(), self.responses)
    }

    /// Record a response. Ignored while authoring.
    pub fn set_response(&self, key: ResponseKey, value: Value) {
        match self.mode {
            ModeContext::Presentation { set_response } => set_response(key, value),
            ModeContext::Authoring { .. } => {
                tracing::trace!(%key, "response ignored while authoring");
            }
        }
    }

    /// Replace the widget body. Ignored while presenting.
    pub fn update_body(&self, body: WidgetBody) {
        match self.mode {
            ModeContext::Authoring { update_body } => update_body(body),
            ModeContext::Presentation { .. } => {
                tracing::trace!(widget = %self.widget, "body update ignored while presenting");
            }
        }
    }

    pub fn toggle_selected_content(&self, widget: &WidgetName) {
        if let Some(toggle) = self.toggle_selected_content {
            toggle(widget);
        }
    }
}

/// Authoring affordance drawn over a widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    SelectAsActive,
    OpenDesign,
    AssetLibrary(StepLocation),
    DeleteImage,
    UploadImage,
}

/// One rendered entry of a response template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateItemView {
    pub id: SmolStr,
    pub content: TemplateContent,
    /// Reordering and removal, only while authoring.
    pub can_move_up: bool,
    pub can_move_down: bool,
    pub removable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateContent {
    Text(Option<RichText>),
    Input(String),
    /// A response space shown by its kind while authoring.
    Placeholder,
}

/// Framework-neutral render output.
#[derive(Clone, Debug, PartialEq)]
pub enum View {
    /// Neutral placeholder while an embed's query settles.
    Loading,
    Empty,
    /// An embedded document, tagged with its owning widget for attribution.
    Embed {
        src: String,
        widget: WidgetName,
        allow_fullscreen: bool,
    },
    RichText(RichText),
    /// Plain text computed at render time.
    Text(String),
    Button {
        label: SmolStr,
    },
    Image {
        url: String,
    },
    TextInput {
        value: String,
        multiline: bool,
        read_only: bool,
    },
    Dropdown {
        options: Vec<String>,
        selected: Option<String>,
        read_only: bool,
    },
    Template(Vec<TemplateItemView>),
    /// A plain web page or YouTube player.
    Frame {
        src: String,
    },
    Video {
        src: String,
    },
    Styled {
        formatting: Formatting,
        inner: Box<View>,
    },
    /// A widget decorated with authoring controls.
    Authoring {
        inner: Box<View>,
        controls: Vec<Control>,
    },
}

impl View {
    pub fn styled(self, formatting: &Formatting) -> Self {
        if formatting.is_empty() {
            self
        } else {
            Self::Styled {
                formatting: formatting.clone(),
                inner: Box::new(self),
            }
        }
    }

    pub fn with_controls(self, controls: Vec<Control>) -> Self {
        if controls.is_empty() {
            self
        } else {
            Self::Authoring {
                inner: Box::new(self),
                controls,
            }
        }
    }

    /// The innermost view, without styling or authoring decoration.
    pub fn content(&self) -> &View {
        match self {
            Self::Styled { inner, .. } | Self::Authoring { inner, .. } => inner.content(),
            other => other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// User interaction reported back from the host UI.
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetEvent {
    /// New value of a single-valued input.
    Input(String),
    /// New value of one response space inside a template.
    TemplateInput { item: SmolStr, value: String },
    Clicked,
    Move { index: usize, direction: Direction },
    Remove { index: usize },
    /// Add a new entry at the end of a template.
    Append(TemplateItemKind),
    /// The rich-text editor produced a new document.
    Document(RichText),
    /// An uploaded or picked image.
    ImageChosen(String),
    ImageCleared,
    SelectAsActive,
}

/// Renders one kind of widget.
pub trait Renderer: Send + Sync {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View;

    /// React to an interaction. Most kinds have none.
    fn handle(&self, _body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        if let WidgetEvent::SelectAsActive = event {
            cx.toggle_selected_content(cx.widget);
        }
    }
}

/// Wraps a renderer so it receives [`AuthoringExtras`].
///
/// The registry applies this to the authoring side of embedded kinds, so
/// `editable` and `render` share one renderer and only the context differs.
struct WithExtras {
    inner: Arc<dyn Renderer>,
    design: bool,
}

impl Renderer for WithExtras {
    fn render(&self, body: &WidgetBody, formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        self.inner.render(body, formatting, &self.extend(cx))
    }

    fn handle(&self, body: &WidgetBody, event: WidgetEvent, cx: &RenderContext<'_>) {
        self.inner.handle(body, event, &self.extend(cx))
    }
}

impl WithExtras {
    fn extend<'a>(&self, cx: &RenderContext<'a>) -> RenderContext<'a> {
        let mut cx = cx.clone();
        if cx.is_authoring() {
            cx.extras = Some(AuthoringExtras {
                asset_library: cx.location.clone(),
                select_as_active: true,
                design: self.design,
            });
        }
        cx
    }
}

/// Design-mode capability of a kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Designable {
    pub template: SmolStr,
}

/// Everything the host needs for one content type.
#[derive(Clone)]
pub struct Plugin {
    /// Human readable name for pickers.
    pub name: SmolStr,
    pub editable: Arc<dyn Renderer>,
    pub render: Arc<dyn Renderer>,
    pub properties: Vec<PropertySpec>,
    pub response_properties: Vec<ResponseProperty>,
    pub designable: Option<Designable>,
    pub serializer: Option<Arc<dyn QuerySerializer + Send + Sync>>,
    pub disable_formatting: bool,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("response_properties", &self.response_properties)
            .field("designable", &self.designable)
            .field("serialized", &self.serializer.is_some())
            .finish_non_exhaustive()
    }
}

impl Plugin {
    /// A locally implemented kind with separate authoring and presentation
    /// renderers.
    pub fn local(
        name: &str,
        editable: impl Renderer + 'static,
        render: impl Renderer + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            editable: Arc::new(editable),
            render: Arc::new(render),
            properties: Vec::new(),
            response_properties: Vec::new(),
            designable: None,
            serializer: None,
            disable_formatting: false,
        }
    }

    /// A kind that looks the same in both modes.
    pub fn same(name: &str, renderer: impl Renderer + 'static) -> Self {
        let renderer: Arc<dyn Renderer> = Arc::new(renderer);
        Self {
            name: name.into(),
            editable: Arc::clone(&renderer),
            render: renderer,
            properties: Vec::new(),
            response_properties: Vec::new(),
            designable: None,
            serializer: None,
            disable_formatting: true,
        }
    }

    /// An embedded kind. Authoring gets the extras wrapper, presentation gets
    /// the bare renderer.
    pub fn delegated(name: &str, renderer: impl Renderer + 'static, designable: Option<Designable>) -> Self {
        let inner: Arc<dyn Renderer> = Arc::new(renderer);
        Self {
            name: name.into(),
            editable: Arc::new(WithExtras {
                inner: Arc::clone(&inner),
                design: designable.is_some(),
            }),
            render: inner,
            properties: Vec::new(),
            response_properties: Vec::new(),
            designable,
            serializer: None,
            disable_formatting: true,
        }
    }

    pub fn with_serializer(mut self, serializer: impl QuerySerializer + Send + Sync + 'static) -> Self {
        self.properties = serializer.properties().to_vec();
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn with_properties(mut self, properties: Vec<PropertySpec>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_response_properties(mut self, response_properties: Vec<ResponseProperty>) -> Self {
        self.response_properties = response_properties;
        self
    }

    pub fn renderer(&self, mode: RenderMode) -> &Arc<dyn Renderer> {
        match mode {
            RenderMode::Authoring => &self.editable,
            RenderMode::Presentation => &self.render,
        }
    }

    pub fn is_designable(&self) -> bool {
        self.designable.is_some()
    }
}

/// Kind name to plugin.
#[derive(Clone, Debug, Default)]
pub struct ContentTypeRegistry {
    plugins: BTreeMap<WidgetKind, Plugin>,
}

impl ContentTypeRegistry {
    pub fn builder() -> ContentTypeRegistryBuilder {
        ContentTypeRegistryBuilder::default()
    }

    pub fn resolve(&self, kind: &str) -> Result<&Plugin, FlowslateError> {
        self.plugins
            .get(kind)
            .ok_or_else(|| FlowslateError::UnknownKind(kind.into()))
    }

    pub fn get(&self, kind: &str) -> Option<&Plugin> {
        self.plugins.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &WidgetKind> {
        self.plugins.keys()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Serialize `properties` with the kind's serializer.
    ///
    /// Kinds without a serializer (local kinds, designable kinds) have no
    /// derived query and produce an empty one.
    pub fn serialize(
        &self,
        kind: &str,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
    ) -> Result<CanonicalQuery, FlowslateError> {
        match &self.resolve(kind)?.serializer {
            Some(serializer) => Ok(serializer.serialize(properties, cx)?),
            None => Ok(CanonicalQuery::default()),
        }
    }

    /// Render a widget in the context's mode.
    pub fn render(
        &self,
        kind: &str,
        body: &WidgetBody,
        formatting: &Formatting,
        cx: &RenderContext<'_>,
    ) -> Result<View, FlowslateError> {
        let plugin = self.resolve(kind)?;
        let plain = Formatting::default();
        let formatting = if plugin.disable_formatting {
            &plain
        } else {
            formatting
        };
        Ok(plugin.renderer(cx.render_mode()).render(body, formatting, cx))
    }

    /// Route an interaction to the kind's renderer for the context's mode.
    pub fn handle(
        &self,
        kind: &str,
        body: &WidgetBody,
        event: WidgetEvent,
        cx: &RenderContext<'_>,
    ) -> Result<(), FlowslateError> {
        let plugin = self.resolve(kind)?;
        plugin.renderer(cx.render_mode()).handle(body, event, cx);
        Ok(())
    }
}

/// Collects plugin declarations.
#[derive(Default)]
pub struct ContentTypeRegistryBuilder {
    plugins: BTreeMap<WidgetKind, Plugin>,
}

impl ContentTypeRegistryBuilder {
    /// Declare a kind. A later declaration under the same name replaces the
    /// earlier one.
    pub fn register(mut self, kind: &str, plugin: Plugin) -> Self {
        if self.plugins.insert(kind.into(), plugin).is_some() {
            tracing::debug!(kind, "content type redeclared");
        }
        self
    }

    pub fn build(self) -> ContentTypeRegistry {
        ContentTypeRegistry {
            plugins: self.plugins,
        }
    }
}
