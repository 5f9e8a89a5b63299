//! # Test Doubles
//!
//! Substitutes for the three external contracts of the runtime, for tests that
//! need to observe or break them.
//!
//! | Double | Stands in for | Use it to |
//! |--------|---------------|-----------|
//! | [`RecordingEventStore`] | [`EventStore`] | assert loads and appends, seed streams |
//! | [`FailingEventStore`] | [`EventStore`] | inject an unavailable store |
//! | [`RecordingReminderService`] | [`ReminderService`] | assert registrations, fire ticks by hand |
//! | [`MockTransport`] | [`Transport`] | script remote replies, errors and hangs |
//!
//! ## Scripting a remote node
//!
//! ```rust,ignore
//! let transport = MockTransport::new();
//! transport.expect_send("ReserveStock").return_ok(Reservation { remaining: 3 });
//! transport.expect_send("ReserveStock").hang();
//!
//! let runtime = RuntimeBuilder::new(config)
//!     .transport(Arc::new(transport.clone()))
//!     /* ... */
//!     .build()?;
//!
//! // ... exercise the runtime ...
//! transport.verify(); // every expectation consumed
//! ```

use crate::context::CallContext;
use crate::error::{RuntimeError, SchedulerError, StoreError, TransportError};
use crate::event::DomainEvent;
use crate::identity::ActorId;
use crate::scheduler::{ReminderKey, ReminderService, ReminderSink};
use crate::store::{EventStore, InMemoryEventStore, LoadedStream};
use crate::transport::{RemoteCommand, RemoteNotification, Transport};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// EVENT STORE
// =============================================================================

/// One `append` call as seen by a [`RecordingEventStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRecord {
    pub stream: String,
    pub expected_version: i64,
    pub count: usize,
    pub accepted: bool,
}

/// In-memory store that records every call.
pub struct RecordingEventStore<E> {
    inner: InMemoryEventStore<E>,
    loads: Mutex<Vec<String>>,
    appends: Mutex<Vec<AppendRecord>>,
}

impl<E: DomainEvent> Default for RecordingEventStore<E> {
    fn default() -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            loads: Mutex::new(Vec::new()),
            appends: Mutex::new(Vec::new()),
        }
    }
}

impl<E: DomainEvent> RecordingEventStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `events` to `stream` without recording the call.
    pub async fn seed(&self, stream: &str, events: &[E]) {
        let version = self.inner.version(stream);
        if let Err(error) = self.inner.append(stream, version, events).await {
            panic!("seeding {stream} failed: {error}");
        }
    }

    pub fn events(&self, stream: &str) -> Vec<E> {
        self.inner.events(stream)
    }

    pub fn version(&self, stream: &str) -> i64 {
        self.inner.version(stream)
    }

    /// Streams loaded so far, in call order.
    pub fn loads(&self) -> Vec<String> {
        lock(&self.loads).clone()
    }

    pub fn appends(&self) -> Vec<AppendRecord> {
        lock(&self.appends).clone()
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for RecordingEventStore<E> {
    async fn load_or_new(&self, stream: &str) -> Result<LoadedStream<E>, StoreError> {
        lock(&self.loads).push(stream.to_string());
        self.inner.load_or_new(stream).await
    }

    async fn append(
        &self,
        stream: &str,
        expected_version: i64,
        events: &[E],
    ) -> Result<i64, StoreError> {
        let result = self.inner.append(stream, expected_version, events).await;
        lock(&self.appends).push(AppendRecord {
            stream: stream.to_string(),
            expected_version,
            count: events.len(),
            accepted: result.is_ok(),
        });
        result
    }
}

/// Store whose loads and/or appends fail with [`StoreError::Unavailable`].
pub struct FailingEventStore<E> {
    inner: InMemoryEventStore<E>,
    fail_loads: bool,
    fail_appends: bool,
}

impl<E: DomainEvent> FailingEventStore<E> {
    /// Every call fails.
    pub fn new() -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            fail_loads: true,
            fail_appends: true,
        }
    }

    /// Loads succeed (empty streams), appends fail.
    pub fn on_append() -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            fail_loads: false,
            fail_appends: true,
        }
    }
}

impl<E: DomainEvent> Default for FailingEventStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for FailingEventStore<E> {
    async fn load_or_new(&self, stream: &str) -> Result<LoadedStream<E>, StoreError> {
        if self.fail_loads {
            return Err(StoreError::Unavailable(format!("cannot read {stream}")));
        }
        self.inner.load_or_new(stream).await
    }

    async fn append(
        &self,
        stream: &str,
        expected_version: i64,
        events: &[E],
    ) -> Result<i64, StoreError> {
        if self.fail_appends {
            return Err(StoreError::Unavailable(format!("cannot write {stream}")));
        }
        self.inner.append(stream, expected_version, events).await
    }
}

// =============================================================================
// REMINDERS
// =============================================================================

/// A reminder registration as seen by a [`RecordingReminderService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub key: ReminderKey,
    pub due: Duration,
    pub period: Duration,
}

/// Reminder substrate that records registrations and never ticks on its own.
/// Ticks are delivered with [`RecordingReminderService::fire`].
#[derive(Default)]
pub struct RecordingReminderService {
    registered: Mutex<HashMap<ActorId, Vec<Registration>>>,
    cancelled: Mutex<Vec<(ActorId, ReminderKey)>>,
    sink: RwLock<Option<Weak<dyn ReminderSink>>>,
}

impl RecordingReminderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current registrations of `target`.
    pub fn registered(&self, target: &ActorId) -> Vec<Registration> {
        lock(&self.registered)
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Every cancel call, in order, including cancels of unknown keys.
    pub fn cancelled(&self) -> Vec<(ActorId, ReminderKey)> {
        lock(&self.cancelled).clone()
    }

    /// Delivers one tick of `key` to the bound runtime, as the substrate
    /// would when the reminder is due.
    pub async fn fire(&self, target: &ActorId, key: ReminderKey) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        match sink {
            Some(sink) => sink.deliver(target.clone(), key).await,
            None => panic!("RecordingReminderService is not bound to a runtime"),
        }
    }
}

#[async_trait]
impl ReminderService for RecordingReminderService {
    async fn register_or_update(
        &self,
        target: &ActorId,
        key: ReminderKey,
        due: Duration,
        period: Duration,
    ) -> Result<(), SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::InvalidPeriod { task: key.task });
        }
        let mut registered = lock(&self.registered);
        let entries = registered.entry(target.clone()).or_default();
        entries.retain(|existing| existing.key != key);
        entries.push(Registration { key, due, period });
        Ok(())
    }

    async fn cancel(&self, target: &ActorId, key: &ReminderKey) -> Result<(), SchedulerError> {
        if let Some(entries) = lock(&self.registered).get_mut(target) {
            entries.retain(|existing| &existing.key != key);
        }
        lock(&self.cancelled).push((target.clone(), key.clone()));
        Ok(())
    }

    async fn list(&self, target: &ActorId) -> Result<Vec<ReminderKey>, SchedulerError> {
        Ok(self
            .registered(target)
            .into_iter()
            .map(|registration| registration.key)
            .collect())
    }

    fn bind(&self, sink: Weak<dyn ReminderSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

enum Reply {
    Ok(Box<dyn Any + Send>),
    Err(RuntimeError),
    Hang,
}

struct Expectation {
    command: &'static str,
    reply: Reply,
}

/// One remote send as seen by a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub target: ActorId,
    pub command: &'static str,
    pub context: CallContext,
}

/// Transport with scripted replies, consumed in order.
///
/// A send that does not match the next expectation fails with
/// [`TransportError::NoOwner`]; [`MockTransport::verify`] then reports the
/// leftover expectations.
#[derive(Clone, Default)]
pub struct MockTransport {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    sent: Arc<Mutex<Vec<SentCommand>>>,
    published: Arc<Mutex<Vec<&'static str>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects a remote send of the command named `command`.
    pub fn expect_send(&self, command: &'static str) -> SendExpectationBuilder {
        SendExpectationBuilder {
            command,
            expectations: self.expectations.clone(),
        }
    }

    /// Remote sends received so far, in order.
    pub fn sent(&self) -> Vec<SentCommand> {
        lock(&self.sent).clone()
    }

    /// Names of the notifications published remotely, in order.
    pub fn published(&self) -> Vec<&'static str> {
        lock(&self.published).clone()
    }

    /// Panics unless every expectation was consumed.
    pub fn verify(&self) {
        let expectations = lock(&self.expectations);
        if !expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                expectations.len()
            );
        }
    }
}

/// Builder for remote send expectations.
pub struct SendExpectationBuilder {
    command: &'static str,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl SendExpectationBuilder {
    /// Replies with `value`, which must be the command's output type.
    pub fn return_ok<T: Any + Send>(self, value: T) {
        self.push(Reply::Ok(Box::new(value)));
    }

    pub fn return_err(self, error: RuntimeError) {
        self.push(Reply::Err(error));
    }

    /// Never replies, so the caller's request timeout fires.
    pub fn hang(self) {
        self.push(Reply::Hang);
    }

    fn push(self, reply: Reply) {
        lock(&self.expectations).push_back(Expectation {
            command: self.command,
            reply,
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_remote(
        &self,
        envelope: RemoteCommand,
    ) -> Result<Box<dyn Any + Send>, RuntimeError> {
        lock(&self.sent).push(SentCommand {
            target: envelope.target.clone(),
            command: envelope.command,
            context: envelope.context.clone(),
        });
        let reply = {
            let mut expectations = lock(&self.expectations);
            match expectations.front() {
                Some(next) if next.command == envelope.command => {
                    expectations.pop_front().map(|expectation| expectation.reply)
                }
                _ => None,
            }
        };
        match reply {
            Some(Reply::Ok(value)) => Ok(value),
            Some(Reply::Err(error)) => Err(error),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(TransportError::NoOwner {
                message: format!("unexpected remote send of {}", envelope.command),
            }
            .into()),
        }
    }

    async fn publish_remote(&self, notification: RemoteNotification) -> Result<(), TransportError> {
        lock(&self.published).push(notification.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping;

    impl DomainEvent for Ping {
        type State = u32;

        fn fold(&self, previous: &u32) -> u32 {
            previous + 1
        }
    }

    #[tokio::test]
    async fn recording_store_tracks_calls() {
        let store = RecordingEventStore::<Ping>::new();
        store.seed("Pinger-1", &[Ping, Ping]).await;
        let loaded = store.load_or_new("Pinger-1").await.unwrap();
        assert_eq!(loaded.version, 1);

        store.append("Pinger-1", 0, &[Ping]).await.unwrap_err();
        store.append("Pinger-1", 1, &[Ping]).await.unwrap();

        assert_eq!(store.loads(), vec!["Pinger-1".to_string()]);
        let appends = store.appends();
        assert_eq!(appends.len(), 2);
        assert!(!appends[0].accepted);
        assert!(appends[1].accepted);
        assert_eq!(store.version("Pinger-1"), 2);
    }

    #[tokio::test]
    async fn mock_transport_replays_expectations_in_order() {
        let transport = MockTransport::new();
        transport.expect_send("Ping").return_ok(7u32);
        transport
            .expect_send("Ping")
            .return_err(RuntimeError::ActorClosed);

        let envelope = || RemoteCommand {
            target: ActorId::new("Pinger", "1"),
            command: "Ping",
            context: CallContext::external(),
            payload: Box::new(Ping),
        };
        let reply = transport.send_remote(envelope()).await.unwrap();
        assert_eq!(*reply.downcast::<u32>().unwrap(), 7);
        assert!(matches!(
            transport.send_remote(envelope()).await,
            Err(RuntimeError::ActorClosed)
        ));
        assert!(matches!(
            transport.send_remote(envelope()).await,
            Err(RuntimeError::Transport(TransportError::NoOwner { .. }))
        ));
        assert_eq!(transport.sent().len(), 3);
        transport.verify();
    }

    #[tokio::test]
    async fn recording_reminders_replace_by_key() {
        let reminders = RecordingReminderService::new();
        let target = ActorId::new("Pinger", "1");
        let key = ReminderKey::durable("ping");
        reminders
            .register_or_update(&target, key.clone(), Duration::ZERO, Duration::from_secs(600))
            .await
            .unwrap();
        reminders
            .register_or_update(&target, key.clone(), Duration::ZERO, Duration::from_secs(900))
            .await
            .unwrap();
        let registered = reminders.registered(&target);
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].period, Duration::from_secs(900));

        reminders.cancel(&target, &key).await.unwrap();
        assert!(reminders.list(&target).await.unwrap().is_empty());
        assert_eq!(reminders.cancelled(), vec![(target, key)]);
    }
}
