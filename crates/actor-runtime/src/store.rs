//! # Event Store Adapter
//!
//! The runtime consumes durable storage through two operations only:
//!
//! - [`EventStore::load_or_new`]: read a whole stream. An absent stream is not an
//!   error; it loads as empty at version [`NO_STREAM`].
//! - [`EventStore::append`]: atomically append a batch if and only if the stream
//!   is still at `expected_version`, otherwise fail with
//!   [`StoreError::ConcurrencyConflict`].
//!
//! A stream's version is the index of its last event, so a stream holding `n`
//! events is at version `n - 1`.
//!
//! [`InMemoryEventStore`] is the reference adapter used by tests and the sample
//! application. It is not durable.

use crate::error::StoreError;
use crate::event::DomainEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Version of an empty or nonexistent stream.
pub const NO_STREAM: i64 = -1;

/// A stream as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedStream<E> {
    pub events: Vec<E>,
    pub version: i64,
}

impl<E> LoadedStream<E> {
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            version: NO_STREAM,
        }
    }
}

/// Repository contract for loading and appending domain events.
#[async_trait]
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// Load all events of `stream` in append order.
    async fn load_or_new(&self, stream: &str) -> Result<LoadedStream<E>, StoreError>;

    /// Append `events` as one atomic batch with optimistic concurrency.
    /// Returns the new stream version.
    async fn append(&self, stream: &str, expected_version: i64, events: &[E])
        -> Result<i64, StoreError>;
}

/// Mutex-protected in-process store.
#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    streams: Mutex<HashMap<String, Vec<E>>>,
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events currently in `stream`.
    pub fn events(&self, stream: &str) -> Vec<E> {
        self.lock().get(stream).cloned().unwrap_or_default()
    }

    /// Current version of `stream`, [`NO_STREAM`] if absent.
    pub fn version(&self, stream: &str) -> i64 {
        self.lock()
            .get(stream)
            .map_or(NO_STREAM, |events| events.len() as i64 - 1)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<E>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for InMemoryEventStore<E> {
    async fn load_or_new(&self, stream: &str) -> Result<LoadedStream<E>, StoreError> {
        let streams = self.lock();
        Ok(match streams.get(stream) {
            Some(events) => LoadedStream {
                events: events.clone(),
                version: events.len() as i64 - 1,
            },
            None => LoadedStream::empty(),
        })
    }

    async fn append(
        &self,
        stream: &str,
        expected_version: i64,
        events: &[E],
    ) -> Result<i64, StoreError> {
        let mut streams = self.lock();
        let existing = streams.entry(stream.to_string()).or_default();
        let actual = existing.len() as i64 - 1;
        if actual != expected_version {
            debug!(stream, expected_version, actual, "Append rejected");
            return Err(StoreError::ConcurrencyConflict {
                stream: stream.to_string(),
                expected: expected_version,
                actual,
            });
        }
        existing.extend(events.iter().cloned());
        let version = existing.len() as i64 - 1;
        debug!(stream, count = events.len(), version, "Appended");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Noted(&'static str);

    impl DomainEvent for Noted {
        type State = Vec<&'static str>;

        fn fold(&self, previous: &Self::State) -> Self::State {
            let mut next = previous.clone();
            next.push(self.0);
            next
        }
    }

    #[tokio::test]
    async fn absent_stream_loads_empty_at_no_stream() {
        let store = InMemoryEventStore::<Noted>::new();
        let loaded = store.load_or_new("Note-1").await.unwrap();
        assert!(loaded.events.is_empty());
        assert_eq!(loaded.version, NO_STREAM);
    }

    #[tokio::test]
    async fn append_checks_expected_version() {
        let store = InMemoryEventStore::new();
        let version = store
            .append("Note-1", NO_STREAM, &[Noted("a"), Noted("b")])
            .await
            .unwrap();
        assert_eq!(version, 1);

        let stale = store.append("Note-1", NO_STREAM, &[Noted("c")]).await;
        assert_eq!(
            stale,
            Err(StoreError::ConcurrencyConflict {
                stream: "Note-1".into(),
                expected: NO_STREAM,
                actual: 1,
            })
        );
        assert_eq!(store.events("Note-1"), vec![Noted("a"), Noted("b")]);

        assert_eq!(store.append("Note-1", 1, &[Noted("c")]).await, Ok(2));
        assert_eq!(store.version("Note-1"), 2);
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let store = InMemoryEventStore::new();
        store.append("Note-1", NO_STREAM, &[Noted("a")]).await.unwrap();
        assert_eq!(store.version("Note-2"), NO_STREAM);
        assert_eq!(store.append("Note-2", NO_STREAM, &[Noted("b")]).await, Ok(0));
    }
}
