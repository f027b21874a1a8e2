//! Debounced query synchronization.
//!
//! Every edit to a widget's properties produces a fresh canonical query, but
//! reloading the embed on each keystroke is both slow and jarring. The
//! [`QuerySynchronizer`] holds a new query back until the instance has been
//! quiet for [`DEBOUNCE_DELAY`], then publishes it.
//!
//! State is kept per [`InstanceId`]. An observation for one instance never
//! touches another instance's pending timer.
//!
//! Time is passed in explicitly. The browser layer drives this with real
//! timeouts using the [`Ticket`] returned from [`QuerySynchronizer::observe`];
//! tests drive it with [`QuerySynchronizer::fire_due`] and a fake clock.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use web_time::Instant;

use crate::properties::PropertyTree;
use crate::query::CanonicalQuery;
use crate::serializer::{QuerySerializer, SerializeContext};

/// How long an instance must stay unchanged before its query is published.
pub const DEBOUNCE_DELAY: Duration = Duration::from_secs(5);

/// Identity of one mounted widget instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the renderer should show for an instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum QueryState {
    /// Properties exist but no query has settled yet. Show a loading state.
    #[default]
    Unsettled,
    /// There is nothing to embed.
    Empty,
    /// Load the embed with this query.
    Ready(CanonicalQuery),
}

impl QueryState {
    pub fn query(&self) -> Option<&CanonicalQuery> {
        match self {
            Self::Ready(query) => Some(query),
            _ => None,
        }
    }

    pub fn is_unsettled(&self) -> bool {
        matches!(self, Self::Unsettled)
    }
}

/// Identifies one scheduled publish. Firing a superseded ticket is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub instance: InstanceId,
    generation: u64,
}

/// Outcome of observing a property change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Same as what is already published; any pending publish was cancelled.
    Unchanged,
    /// The query is empty and was published immediately.
    Cleared,
    /// Serialization is not possible yet; the instance is unsettled.
    Unsettled,
    /// A publish is scheduled for `deadline`, replacing any earlier one.
    Scheduled { ticket: Ticket, deadline: Instant },
}

/// A settled query, ready to display and persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub instance: InstanceId,
    pub query: CanonicalQuery,
}

#[derive(Debug)]
struct Pending {
    query: CanonicalQuery,
    deadline: Instant,
    generation: u64,
}

#[derive(Debug, Default)]
struct InstanceSync {
    state: QueryState,
    pending: Option<Pending>,
}

/// Per-instance debouncer for canonical queries.
#[derive(Debug)]
pub struct QuerySynchronizer {
    delay: Duration,
    instances: BTreeMap<InstanceId, InstanceSync>,
    generation: u64,
}

impl Default for QuerySynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySynchronizer {
    pub fn new() -> Self {
        Self::with_delay(DEBOUNCE_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            instances: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Current display state of an instance. Unknown instances are unsettled.
    pub fn state(&self, instance: InstanceId) -> QueryState {
        self.instances
            .get(&instance)
            .map(|i| i.state.clone())
            .unwrap_or_default()
    }

    /// Record a newly computed query for `instance`.
    ///
    /// `None` means the properties cannot be serialized yet (a required
    /// property is missing).
    pub fn observe(
        &mut self,
        instance: InstanceId,
        computed: Option<CanonicalQuery>,
        now: Instant,
    ) -> Observation {
        let delay = self.delay;
        self.generation += 1;
        let generation = self.generation;
        let entry = self.instances.entry(instance).or_default();

        let Some(query) = computed else {
            entry.pending = None;
            entry.state = QueryState::Unsettled;
            return Observation::Unsettled;
        };

        if query.is_empty() {
            entry.pending = None;
            entry.state = QueryState::Empty;
            tracing::debug!(%instance, "query cleared");
            return Observation::Cleared;
        }

        // The latest observation wins: a pending publish of some older value
        // must not land after we have returned to the published one.
        if entry.state.query() == Some(&query) {
            entry.pending = None;
            return Observation::Unchanged;
        }

        let deadline = now + delay;
        entry.pending = Some(Pending {
            query,
            deadline,
            generation,
        });
        Observation::Scheduled {
            ticket: Ticket {
                instance,
                generation,
            },
            deadline,
        }
    }

    /// Serialize `properties` and observe the result.
    pub fn observe_tree<S: QuerySerializer + ?Sized>(
        &mut self,
        instance: InstanceId,
        serializer: &S,
        properties: &PropertyTree,
        cx: &SerializeContext<'_>,
        now: Instant,
    ) -> Observation {
        let computed = match serializer.serialize(properties, cx) {
            Ok(query) => Some(query),
            Err(error) => {
                tracing::debug!(%instance, %error, "query not ready");
                None
            }
        };
        self.observe(instance, computed, now)
    }

    /// Publish the pending query behind `ticket`, if it is still current.
    pub fn fire(&mut self, ticket: Ticket) -> Option<Published> {
        let entry = self.instances.get_mut(&ticket.instance)?;
        if entry
            .pending
            .as_ref()
            .is_none_or(|p| p.generation != ticket.generation)
        {
            return None;
        }
        let pending = entry.pending.take()?;
        Some(Self::publish(ticket.instance, entry, pending.query))
    }

    /// Publish every pending query whose deadline is at or before `now`.
    pub fn fire_due(&mut self, now: Instant) -> Vec<Published> {
        let mut published = Vec::new();
        for (instance, entry) in self.instances.iter_mut() {
            if entry.pending.as_ref().is_some_and(|p| p.deadline <= now) {
                if let Some(pending) = entry.pending.take() {
                    published.push(Self::publish(*instance, entry, pending.query));
                }
            }
        }
        published
    }

    /// Earliest pending deadline across all instances.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.instances
            .values()
            .filter_map(|i| i.pending.as_ref().map(|p| p.deadline))
            .min()
    }

    pub fn has_pending(&self, instance: InstanceId) -> bool {
        self.instances
            .get(&instance)
            .is_some_and(|i| i.pending.is_some())
    }

    /// Forget an instance, cancelling anything it had pending.
    pub fn release(&mut self, instance: InstanceId) {
        if let Some(entry) = self.instances.remove(&instance) {
            if entry.pending.is_some() {
                tracing::debug!(%instance, "released with pending query");
            }
        }
    }

    fn publish(instance: InstanceId, entry: &mut InstanceSync, query: CanonicalQuery) -> Published {
        tracing::debug!(%instance, query = %query, "query published");
        entry.state = QueryState::Ready(query.clone());
        Published { instance, query }
    }
}
