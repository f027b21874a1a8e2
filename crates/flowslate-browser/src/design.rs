//! Design popup lifecycle in the page.

use std::cell::RefCell;
use std::rc::Rc;

use flowslate_core::config::EmbedConfig;
use flowslate_core::design::{DesignSession, SaveOutcome};
use flowslate_core::embed::EmbedSrc;
use flowslate_core::error::{DesignError, FlowslateError};
use flowslate_core::properties::WidgetBody;
use flowslate_core::query::CanonicalQuery;
use flowslate_core::registry::ContentTypeRegistry;
use gloo_timers::callback::Timeout;
use web_sys::EventTarget;

use crate::listener::{DesignListener, listen_for_live_query};

/// One widget's design popup, listening for live queries while open.
pub struct DesignPopup {
    session: Rc<RefCell<DesignSession>>,
    listener: Option<DesignListener>,
}

impl DesignPopup {
    pub fn new(config: &EmbedConfig) -> Self {
        Self {
            session: Rc::new(RefCell::new(DesignSession::new(config))),
            listener: None,
        }
    }

    pub fn session(&self) -> &Rc<RefCell<DesignSession>> {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        self.session.borrow().is_open()
    }

    /// Open design mode for a widget and start listening on `target`.
    pub fn open(
        &mut self,
        target: &EventTarget,
        registry: &ContentTypeRegistry,
        kind: &str,
        body: &WidgetBody,
        host: &str,
        on_change: impl Fn(&str) + 'static,
    ) -> Result<EmbedSrc, FlowslateError> {
        let plugin = registry.resolve(kind)?;
        let src = self.session.borrow_mut().open(kind, plugin, body, host)?;
        self.listener = Some(listen_for_live_query(
            target,
            Rc::clone(&self.session),
            on_change,
        ));
        Ok(src)
    }

    pub fn can_save(&self) -> bool {
        self.session.borrow().can_save()
    }

    /// Save the live query. `on_save` must not touch this popup.
    pub fn save(&mut self, on_save: impl FnOnce(CanonicalQuery)) -> Result<SaveOutcome, DesignError> {
        let outcome = self.session.borrow_mut().save(on_save)?;
        if let SaveOutcome::Saved(_) = outcome {
            self.listener = None;
        }
        Ok(outcome)
    }

    pub fn cancel(&mut self) {
        self.session.borrow_mut().cancel();
        self.listener = None;
    }

    /// Run `refresh` once the stored query has had time to land, so the
    /// authoring preview shows the saved configuration. Dropping the
    /// returned timeout cancels the refresh.
    #[must_use = "the refresh is cancelled when the timeout is dropped"]
    pub fn refresh_after_close(&self, refresh: impl FnOnce() + 'static) -> Timeout {
        let delay = self.session.borrow().refresh_delay();
        Timeout::new(u32::try_from(delay.as_millis()).unwrap_or(u32::MAX), refresh)
    }
}
