//! Design-mode round trip.
//!
//! Some embeds are configured inside the embed itself: the author opens it
//! with `mode=design`, edits it there, and the embed reports every change of
//! its own URL query. Saving takes the latest reported query, drops the
//! transport parameters, and hands the rest to the caller to persist.

use std::time::Duration;

use crate::channel::{InboundMessage, MessagePayload, OriginFilter};
use crate::config::EmbedConfig;
use crate::embed::{DesignableRenderer, EmbedSrc};
use crate::error::DesignError;
use crate::properties::WidgetBody;
use crate::query::{CanonicalQuery, TRANSPORT_PARAMS, strip_params};
use crate::registry::Plugin;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DesignState {
    #[default]
    Closed,
    Open {
        src: EmbedSrc,
        /// Latest query reported by the embed, if any yet.
        live_query: Option<String>,
    },
}

/// Result of a save attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(CanonicalQuery),
    /// The embed has not reported a query yet. The session stays open.
    NothingToSave,
}

/// One designable widget's design popup.
#[derive(Clone, Debug)]
pub struct DesignSession {
    state: DesignState,
    filter: OriginFilter,
    refresh_delay: Duration,
}

impl DesignSession {
    pub fn new(config: &EmbedConfig) -> Self {
        Self {
            state: DesignState::Closed,
            filter: config.origin_filter(),
            refresh_delay: config.design_refresh_delay,
        }
    }

    pub fn state(&self) -> &DesignState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, DesignState::Open { .. })
    }

    /// Open the popup on `src`, which must be a design-mode source.
    pub fn open_src(&mut self, src: EmbedSrc) -> EmbedSrc {
        let src = if src.is_design() { src } else { src.in_design_mode() };
        tracing::debug!(template = src.template(), "design mode opened");
        self.state = DesignState::Open {
            src: src.clone(),
            live_query: None,
        };
        src
    }

    /// Open design mode for a widget of the given kind.
    pub fn open(
        &mut self,
        kind: &str,
        plugin: &Plugin,
        body: &WidgetBody,
        host: &str,
    ) -> Result<EmbedSrc, DesignError> {
        let designable = plugin
            .designable
            .as_ref()
            .ok_or_else(|| DesignError::NotDesignable(kind.into()))?;
        let src = DesignableRenderer::new(&designable.template).design_src(body, host);
        Ok(self.open_src(src))
    }

    /// Track a live query reported by the embed.
    pub fn on_query_change(&mut self, value: String) {
        match &mut self.state {
            DesignState::Open { live_query, .. } => *live_query = Some(value),
            DesignState::Closed => tracing::trace!("query change while closed"),
        }
    }

    /// Handle a window message. Returns true if it was a live query update.
    pub fn on_message<H>(&mut self, message: &InboundMessage<H>) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.filter.accept(message) {
            Some(MessagePayload::QueryChange(change)) => {
                self.on_query_change(change.value);
                true
            }
            _ => false,
        }
    }

    pub fn live_query(&self) -> Option<&str> {
        match &self.state {
            DesignState::Open { live_query, .. } => live_query.as_deref(),
            DesignState::Closed => None,
        }
    }

    /// Whether Save should be enabled.
    pub fn can_save(&self) -> bool {
        self.live_query().is_some()
    }

    /// Persist the latest live query through `on_save` and close.
    ///
    /// With no live query yet, nothing is persisted and the session stays
    /// open.
    pub fn save(&mut self, on_save: impl FnOnce(CanonicalQuery)) -> Result<SaveOutcome, DesignError> {
        let live = match &self.state {
            DesignState::Closed => return Err(DesignError::NotOpen),
            DesignState::Open { live_query, .. } => live_query.clone(),
        };
        let Some(live) = live else {
            tracing::warn!("design save with no live query, ignoring");
            return Ok(SaveOutcome::NothingToSave);
        };
        let query = strip_params(&live, TRANSPORT_PARAMS);
        tracing::debug!(query = %query, "design saved");
        on_save(query.clone());
        self.state = DesignState::Closed;
        Ok(SaveOutcome::Saved(query))
    }

    /// Close without persisting.
    pub fn cancel(&mut self) {
        if self.is_open() {
            tracing::debug!("design cancelled");
        }
        self.state = DesignState::Closed;
    }

    /// How long after closing the authoring preview should re-read the
    /// stored query.
    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }
}

/// Write a saved design query into a body.
pub fn apply_saved_query(body: &WidgetBody, query: &CanonicalQuery) -> WidgetBody {
    WidgetBody {
        query: Some(query.as_str().to_owned()),
        ..body.clone()
    }
}
