//! flowslate-core: the embedded-widget synchronization protocol, without any
//! DOM dependencies.
//!
//! This crate provides:
//! - `QuerySerializer` implementations turning property trees into canonical
//!   embed queries
//! - `QuerySynchronizer` - per-instance debounced query publication
//! - `ResponseChannel` - origin filtering, attribution and folding of
//!   messages from embedded documents
//! - `ContentTypeRegistry` with every built-in kind (`default_registry`)
//! - `DesignSession` - the design-mode round trip
//! - the asset-store contract used by image widgets

pub mod assets;
pub mod channel;
pub mod config;
pub mod design;
pub mod embed;
pub mod formula;
pub mod kinds;
pub mod properties;
pub mod query;
pub mod registry;
pub mod response;
pub mod serializer;
pub mod slots;
pub mod sync;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod text;
pub mod widgets;

pub mod error;

pub use crate::error::{AssetError, DesignError, FlowslateError, FormulaError, SerializeError};

pub use assets::{AssetPath, AssetStore, StepLocation};
pub use channel::{
    Delivery, FrameRegistry, InboundMessage, MessagePayload, OriginFilter, ResponseChannel,
    StepScope,
};
pub use config::{ConfigFormat, EmbedConfig, Environment};
pub use design::{DesignSession, DesignState, SaveOutcome};
pub use embed::{DesignableRenderer, EmbedRenderer, EmbedSrc};
pub use kinds::default_registry;
pub use properties::{PropertySpec, PropertyTree, WidgetBody};
pub use query::CanonicalQuery;
pub use registry::{
    ContentTypeRegistry, Control, Formatting, ModeContext, Plugin, RenderContext, Renderer, View,
    WidgetEvent, WidgetKind,
};
pub use response::{ResponseKey, ResponseMap, ResponseSlice, StepId, WidgetName};
pub use serializer::{QuerySerializer, RenderMode, SerializeContext};
pub use smol_str::SmolStr;
pub use sync::{DEBOUNCE_DELAY, InstanceId, Observation, Published, QueryState, QuerySynchronizer};
pub use text::RichText;
