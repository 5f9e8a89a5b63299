//! # Aggregates
//!
//! [`Aggregate<T>`] is an [`Actor`] whose state is derived by folding its event
//! stream. It keeps two buffers:
//!
//! - `original`: events loaded from (or already appended to) the store;
//! - `changes`: events applied during the current turn, not yet durable.
//!
//! State is always `fold(original ++ changes)`. At the end of every successful
//! turn the runtime calls [`Aggregate::save`], which appends `changes` as one
//! batch with `expected_version = original_version`. A conflicting append
//! discards the turn's changes and fails the command; the cell then deactivates
//! so the next message reloads the stream.

use crate::actor::Actor;
use crate::config::{ActivationFailurePolicy, RuntimeConfig};
use crate::error::RuntimeError;
use crate::event::{fold_all, DomainEvent};
use crate::identity::ActorId;
use crate::message::DeactivationReason;
use crate::store::EventStore;
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marker tying an aggregate kind to its event type.
///
/// ```rust,ignore
/// pub struct Cart;
///
/// impl EventSourced for Cart {
///     const KIND: &'static str = "Cart";
///     type Event = CartEvent;
/// }
/// ```
pub trait EventSourced: Send + Sync + 'static {
    const KIND: &'static str;
    type Event: DomainEvent;
}

/// State type of aggregate `T`.
pub type StateOf<T> = <<T as EventSourced>::Event as DomainEvent>::State;

pub struct Aggregate<T: EventSourced> {
    id: ActorId,
    original: Vec<T::Event>,
    changes: Vec<T::Event>,
    state: StateOf<T>,
    store: Arc<dyn EventStore<T::Event>>,
    degraded: bool,
    _kind: PhantomData<fn() -> T>,
}

impl<T: EventSourced> fmt::Debug for Aggregate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("id", &self.id)
            .field("original_version", &self.original_version())
            .field("changes", &self.changes.len())
            .field("state", &self.state)
            .field("degraded", &self.degraded)
            .finish()
    }
}

impl<T: EventSourced> Aggregate<T> {
    /// Loads the stream of `id` and folds it into the current state.
    pub async fn load(
        id: ActorId,
        store: Arc<dyn EventStore<T::Event>>,
        policy: ActivationFailurePolicy,
    ) -> Result<Self, RuntimeError> {
        let (original, degraded) = match store.load_or_new(&id.stream_name()).await {
            Ok(loaded) => (loaded.events, false),
            Err(error) => match policy {
                ActivationFailurePolicy::Fail => return Err(error.into()),
                ActivationFailurePolicy::StartEmpty => {
                    warn!(actor = %id, %error, "Stream load failed, starting empty");
                    (Vec::new(), true)
                }
            },
        };
        let state = fold_all(&original);
        debug!(actor = %id, version = original.len() as i64 - 1, "Loaded");
        Ok(Self {
            id,
            original,
            changes: Vec::new(),
            state,
            store,
            degraded,
            _kind: PhantomData,
        })
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn state(&self) -> &StateOf<T> {
        &self.state
    }

    /// Events already durable.
    pub fn original(&self) -> &[T::Event] {
        &self.original
    }

    /// Events applied in this turn and not yet saved.
    pub fn changes(&self) -> &[T::Event] {
        &self.changes
    }

    /// All events, durable first.
    pub fn current(&self) -> impl Iterator<Item = &T::Event> {
        self.original.iter().chain(self.changes.iter())
    }

    /// Version of the last durable event, -1 for an empty stream.
    pub fn original_version(&self) -> i64 {
        self.original.len() as i64 - 1
    }

    pub fn current_version(&self) -> i64 {
        self.original_version() + self.changes.len() as i64
    }

    /// Whether the aggregate started empty after a failed load.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Records `event` and folds it into the state. Returns the state before
    /// and after.
    pub fn apply(&mut self, event: T::Event) -> (StateOf<T>, StateOf<T>) {
        let previous = self.state.clone();
        self.state = event.fold(&previous);
        self.changes.push(event);
        (previous, self.state.clone())
    }

    /// Appends pending changes and returns the stream version.
    ///
    /// On failure the pending changes are discarded and the state is rebuilt
    /// from the durable events.
    pub async fn save(&mut self) -> Result<i64, RuntimeError> {
        if self.changes.is_empty() {
            return Ok(self.original_version());
        }
        let expected = self.original_version();
        match self
            .store
            .append(&self.id.stream_name(), expected, &self.changes)
            .await
        {
            Ok(version) => {
                let count = self.changes.len();
                self.original.append(&mut self.changes);
                info!(actor = %self.id, count, version, "Saved");
                Ok(version)
            }
            Err(error) => {
                warn!(actor = %self.id, expected, %error, "Save failed, changes discarded");
                self.discard_changes();
                Err(error.into())
            }
        }
    }

    /// Drops the changes applied after the first `checkpoint` ones and
    /// rebuilds the state. Changes an interleaved turn already saved are not
    /// touched.
    fn rollback_to(&mut self, checkpoint: usize) {
        if self.changes.len() > checkpoint {
            let count = self.changes.len() - checkpoint;
            debug!(actor = %self.id, count, kept = checkpoint, "Turn failed, changes discarded");
            self.changes.truncate(checkpoint);
            self.state = fold_all(self.current());
        }
    }

    fn discard_changes(&mut self) {
        self.changes.clear();
        self.state = fold_all(&self.original);
    }
}

#[async_trait]
impl<T: EventSourced> Actor for Aggregate<T> {
    const KIND: &'static str = T::KIND;

    type Deps = Arc<dyn EventStore<T::Event>>;

    async fn activate(
        id: &ActorId,
        deps: &Self::Deps,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        Self::load(id.clone(), deps.clone(), config.activation_failure).await
    }

    async fn on_turn_complete(&mut self) -> Result<(), RuntimeError> {
        self.save().await.map(|_| ())
    }

    fn turn_checkpoint(&self) -> usize {
        self.changes.len()
    }

    fn on_turn_aborted(&mut self, checkpoint: usize) {
        self.rollback_to(checkpoint);
    }

    async fn on_deactivate(&mut self, reason: DeactivationReason) {
        if !self.changes.is_empty() {
            warn!(actor = %self.id, ?reason, count = self.changes.len(), "Deactivated with unsaved changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{InMemoryEventStore, NO_STREAM};

    #[derive(Clone, Debug, PartialEq)]
    enum TallyEvent {
        Added(u32),
        Cleared,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Tally {
        total: u32,
        entries: usize,
    }

    impl DomainEvent for TallyEvent {
        type State = Tally;

        fn fold(&self, previous: &Tally) -> Tally {
            match self {
                TallyEvent::Added(n) => Tally {
                    total: previous.total + n,
                    entries: previous.entries + 1,
                },
                TallyEvent::Cleared => Tally::default(),
            }
        }
    }

    struct Counter;

    impl EventSourced for Counter {
        const KIND: &'static str = "Counter";
        type Event = TallyEvent;
    }

    fn counter_id() -> ActorId {
        ActorId::new("Counter", "1")
    }

    async fn load(store: Arc<InMemoryEventStore<TallyEvent>>) -> Aggregate<Counter> {
        Aggregate::load(counter_id(), store, ActivationFailurePolicy::Fail)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_stream_loads_at_minus_one() {
        let aggregate = load(Arc::new(InMemoryEventStore::new())).await;
        assert_eq!(aggregate.original_version(), NO_STREAM);
        assert_eq!(aggregate.current_version(), NO_STREAM);
        assert_eq!(aggregate.state(), &Tally::default());
        assert!(!aggregate.is_degraded());
    }

    #[tokio::test]
    async fn apply_tracks_versions_and_snapshots() {
        let mut aggregate = load(Arc::new(InMemoryEventStore::new())).await;
        let (previous, current) = aggregate.apply(TallyEvent::Added(2));
        assert_eq!(previous, Tally::default());
        assert_eq!(current, Tally { total: 2, entries: 1 });
        aggregate.apply(TallyEvent::Added(3));
        assert_eq!(aggregate.original_version(), -1);
        assert_eq!(aggregate.current_version(), 1);
        assert_eq!(aggregate.changes().len(), 2);
    }

    #[tokio::test]
    async fn save_merges_changes_into_original() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut aggregate = load(store.clone()).await;
        aggregate.apply(TallyEvent::Added(2));
        aggregate.apply(TallyEvent::Added(3));

        assert_eq!(aggregate.save().await.unwrap(), 1);
        assert!(aggregate.changes().is_empty());
        assert_eq!(aggregate.original_version(), 1);
        assert_eq!(store.version("Counter-1"), 1);

        // Nothing pending is a no-op.
        assert_eq!(aggregate.save().await.unwrap(), 1);
        assert_eq!(store.version("Counter-1"), 1);
    }

    #[tokio::test]
    async fn state_equals_fold_of_all_events() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut aggregate = load(store.clone()).await;
        aggregate.apply(TallyEvent::Added(4));
        aggregate.save().await.unwrap();
        aggregate.apply(TallyEvent::Cleared);
        aggregate.apply(TallyEvent::Added(9));

        let events: Vec<TallyEvent> = aggregate.current().cloned().collect();
        assert_eq!(aggregate.state(), &fold_all(&events));

        aggregate.save().await.unwrap();
        let reloaded = load(store).await;
        assert_eq!(reloaded.state(), aggregate.state());
        assert_eq!(reloaded.original_version(), 2);
    }

    #[tokio::test]
    async fn conflicting_save_discards_changes() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut first = load(store.clone()).await;
        let mut second = load(store.clone()).await;

        first.apply(TallyEvent::Added(1));
        assert_eq!(first.save().await.unwrap(), 0);

        second.apply(TallyEvent::Added(5));
        let error = second.save().await.unwrap_err();
        assert!(error.is_concurrency_conflict());
        assert!(second.changes().is_empty());
        assert_eq!(second.state(), &Tally::default());
        assert_eq!(store.events("Counter-1"), vec![TallyEvent::Added(1)]);
    }

    #[tokio::test]
    async fn aborted_turn_restores_durable_state() {
        let mut aggregate = load(Arc::new(InMemoryEventStore::new())).await;
        let checkpoint = aggregate.turn_checkpoint();
        aggregate.apply(TallyEvent::Added(7));
        aggregate.on_turn_aborted(checkpoint);
        assert!(aggregate.changes().is_empty());
        assert_eq!(aggregate.state(), &Tally::default());
    }

    #[tokio::test]
    async fn aborted_inner_turn_keeps_outer_changes() {
        let mut aggregate = load(Arc::new(InMemoryEventStore::new())).await;
        aggregate.apply(TallyEvent::Added(5));

        let inner = aggregate.turn_checkpoint();
        aggregate.apply(TallyEvent::Added(2));
        aggregate.apply(TallyEvent::Cleared);
        aggregate.on_turn_aborted(inner);

        assert_eq!(aggregate.changes(), &[TallyEvent::Added(5)]);
        assert_eq!(aggregate.state().total, 5);
        assert_eq!(aggregate.current_version(), 0);
    }

    struct Unreachable;

    #[async_trait]
    impl EventStore<TallyEvent> for Unreachable {
        async fn load_or_new(
            &self,
            _stream: &str,
        ) -> Result<crate::store::LoadedStream<TallyEvent>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn append(
            &self,
            _stream: &str,
            _expected_version: i64,
            _events: &[TallyEvent],
        ) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn load_failure_follows_policy() {
        let store: Arc<dyn EventStore<TallyEvent>> = Arc::new(Unreachable);
        let error = Aggregate::<Counter>::load(counter_id(), store.clone(), ActivationFailurePolicy::Fail)
            .await
            .unwrap_err();
        assert!(matches!(error, RuntimeError::Store(StoreError::Unavailable(_))));

        let degraded =
            Aggregate::<Counter>::load(counter_id(), store, ActivationFailurePolicy::StartEmpty)
                .await
                .unwrap();
        assert!(degraded.is_degraded());
        assert_eq!(degraded.original_version(), NO_STREAM);
    }
}
