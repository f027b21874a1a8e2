//! `setTimeout`-backed debouncing.
//!
//! One [`Timeout`] per widget instance. Replacing or removing an entry drops
//! the old timeout, which clears it; a timeout that fires anyway for a
//! superseded observation is ignored by the synchronizer's ticket check.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use flowslate_core::query::CanonicalQuery;
use flowslate_core::sync::{InstanceId, Observation, Published, QuerySynchronizer};
use gloo_timers::callback::Timeout;
use web_time::Instant;

/// Drives a [`QuerySynchronizer`] with browser timers.
pub struct DebounceTimers {
    sync: Rc<RefCell<QuerySynchronizer>>,
    timers: RefCell<BTreeMap<InstanceId, Timeout>>,
    on_publish: Rc<dyn Fn(Published)>,
}

impl DebounceTimers {
    pub fn new(sync: Rc<RefCell<QuerySynchronizer>>, on_publish: impl Fn(Published) + 'static) -> Self {
        Self {
            sync,
            timers: RefCell::default(),
            on_publish: Rc::new(on_publish),
        }
    }

    pub fn synchronizer(&self) -> &Rc<RefCell<QuerySynchronizer>> {
        &self.sync
    }

    /// Observe a freshly computed query and (re)arm the instance's timer.
    pub fn observe(&self, instance: InstanceId, computed: Option<CanonicalQuery>) -> Observation {
        let observation = self
            .sync
            .borrow_mut()
            .observe(instance, computed, Instant::now());
        match &observation {
            Observation::Scheduled { ticket, deadline } => {
                let wait = deadline.saturating_duration_since(Instant::now());
                let millis = u32::try_from(wait.as_millis()).unwrap_or(u32::MAX);
                let sync = Rc::clone(&self.sync);
                let on_publish = Rc::clone(&self.on_publish);
                let ticket = *ticket;
                let timeout = Timeout::new(millis, move || {
                    let published = sync.borrow_mut().fire(ticket);
                    if let Some(published) = published {
                        on_publish(published);
                    }
                });
                self.timers.borrow_mut().insert(instance, timeout);
            }
            _ => {
                self.timers.borrow_mut().remove(&instance);
            }
        }
        observation
    }

    /// Cancel the instance's timer and forget it.
    pub fn release(&self, instance: InstanceId) {
        self.timers.borrow_mut().remove(&instance);
        self.sync.borrow_mut().release(instance);
    }
}

impl Drop for DebounceTimers {
    fn drop(&mut self) {
        let instances: Vec<InstanceId> = self.timers.get_mut().keys().copied().collect();
        for instance in instances {
            self.release(instance);
        }
    }
}
