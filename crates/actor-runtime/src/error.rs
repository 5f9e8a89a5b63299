//! # Runtime Errors
//!
//! This module defines the error types used throughout the runtime. Each layer
//! (event store, scheduler, transport, configuration) has its own enum, and
//! [`RuntimeError`] is the union that reaches the caller of
//! [`Mediator::send`](crate::Mediator::send).
//!
//! ## Propagation
//!
//! Nothing below is swallowed by the runtime. The one place where a failure can
//! be masked is aggregate activation under
//! [`ActivationFailurePolicy::StartEmpty`](crate::config::ActivationFailurePolicy),
//! and that is opt-in and logged.

use crate::identity::ActorId;
use std::time::Duration;

/// Boxed domain error returned by handlers.
///
/// The runtime enforces one error type per call site rather than per handler, the
/// same trade-off as a per-actor error enum: handlers return their own
/// `thiserror` types and `?` boxes them.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by an [`EventStore`](crate::store::EventStore) adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        stream: String,
        expected: i64,
        actual: i64,
    },
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the periodic callback substrate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduled task {task} needs a non-zero period")]
    InvalidPeriod { task: String },
    #[error("reminder service unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no node accepts {message}")]
    NoOwner { message: String },
    #[error("unexpected reply type for {command}")]
    UnexpectedReply { command: String },
    #[error("node unavailable: {0}")]
    Unavailable(String),
}

/// Wiring mistakes. Detected by [`RuntimeBuilder::build`](crate::RuntimeBuilder::build)
/// wherever possible, otherwise surfaced immediately to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no handler registered for {command}")]
    MissingHandler { command: String },
    #[error("handler registered for {command} does not match actor kind {kind}")]
    HandlerMismatch {
        command: &'static str,
        kind: &'static str,
    },
    #[error("actor kind {kind} is not registered (required by {required_by})")]
    ActorNotRegistered {
        kind: &'static str,
        required_by: &'static str,
    },
    #[error("actor kind {kind} is registered twice")]
    DuplicateActor { kind: &'static str },
    #[error("{command} has more than one handler")]
    DuplicateHandler { command: &'static str },
    #[error("scheduled task {task} is registered twice for actor kind {kind}")]
    DuplicateTask {
        kind: &'static str,
        task: &'static str,
    },
    #[error("unknown scheduled task {task} for actor kind {kind}")]
    UnknownTask { kind: &'static str, task: String },
    #[error("invalid setting {name}={value}: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything that can go wrong between a caller and a handler.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The turn's events were discarded. Reload and resubmit.
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        stream: String,
        expected: i64,
        actual: i64,
    },
    #[error("event store error: {0}")]
    Store(StoreError),
    /// The remote call timed out. The command may or may not have been applied.
    #[error("outcome of {command} on {target} is unknown after {timeout:?}")]
    UnknownOutcome {
        command: &'static str,
        target: ActorId,
        timeout: Duration,
    },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("handler failed: {0}")]
    Handler(HandlerError),
    #[error("{command} is not handled locally and no transport is configured")]
    NoRoute { command: &'static str },
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped response channel")]
    ActorDropped,
}

impl From<StoreError> for RuntimeError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ConcurrencyConflict {
                stream,
                expected,
                actual,
            } => RuntimeError::ConcurrencyConflict {
                stream,
                expected,
                actual,
            },
            other => RuntimeError::Store(other),
        }
    }
}

impl RuntimeError {
    /// True for an optimistic concurrency conflict, including one raised by a
    /// nested send and boxed by a handler's `?`.
    pub fn is_concurrency_conflict(&self) -> bool {
        match self {
            RuntimeError::ConcurrencyConflict { .. } => true,
            RuntimeError::Handler(inner) => inner
                .downcast_ref::<RuntimeError>()
                .is_some_and(RuntimeError::is_concurrency_conflict),
            _ => false,
        }
    }

    /// True when the caller cannot know whether the command was applied.
    pub fn is_unknown_outcome(&self) -> bool {
        match self {
            RuntimeError::UnknownOutcome { .. } => true,
            RuntimeError::Handler(inner) => inner
                .downcast_ref::<RuntimeError>()
                .is_some_and(RuntimeError::is_unknown_outcome),
            _ => false,
        }
    }

    /// Returns the handler's domain error if it is an `E`.
    pub fn domain_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            RuntimeError::Handler(inner) => inner.downcast_ref::<E>().or_else(|| {
                inner
                    .downcast_ref::<RuntimeError>()
                    .and_then(RuntimeError::domain_error::<E>)
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("out of stock")]
    struct OutOfStock;

    #[test]
    fn store_conflict_maps_to_runtime_conflict() {
        let error: RuntimeError = StoreError::ConcurrencyConflict {
            stream: "Cart-1".into(),
            expected: 0,
            actual: 1,
        }
        .into();
        assert!(matches!(
            error,
            RuntimeError::ConcurrencyConflict { expected: 0, actual: 1, .. }
        ));

        let unavailable: RuntimeError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(unavailable, RuntimeError::Store(_)));
    }

    #[test]
    fn conflict_is_found_through_handler_boxing() {
        let nested = RuntimeError::ConcurrencyConflict {
            stream: "Cart-1".into(),
            expected: 0,
            actual: 1,
        };
        let error = RuntimeError::Handler(Box::new(nested));
        assert!(error.is_concurrency_conflict());
        assert!(!error.is_unknown_outcome());
    }

    #[test]
    fn domain_error_downcasts_nested_handler_errors() {
        let inner = RuntimeError::Handler(Box::new(OutOfStock));
        let outer = RuntimeError::Handler(Box::new(inner));
        assert!(outer.domain_error::<OutOfStock>().is_some());
        assert!(RuntimeError::ActorClosed.domain_error::<OutOfStock>().is_none());
    }
}
