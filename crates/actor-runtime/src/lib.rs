//! # Actor Runtime
//!
//! This crate is a small runtime for **virtual actors**: addressable units of state
//! that are activated on their first message, process one message at a time, and
//! are deactivated when idle. An actor whose state is derived from an append-only
//! event stream is an **aggregate**.
//!
//! ## Why Virtual Actors + Event Sourcing?
//!
//! ### Virtual Actors
//!
//! - Callers address an actor by identity (`Cart-1`), never by a handle
//! - Activation and deactivation are the runtime's problem, not the caller's
//! - Per-identity turns remove the need for locks in business logic
//!
//! ### Event Sourcing
//!
//! - State is a pure fold over recorded events
//! - Every turn appends its events as one batch under optimistic concurrency
//! - A stale activation cannot silently overwrite a newer one
//!
//! ## Architecture Overview
//!
//! 1. **Contract Layer** ([`Command`], [`Notification`], [`CommandHandler`]):
//!    message types bound at compile time to their actor and result type
//! 2. **Dispatch Layer** ([`Mediator`], [`Transport`]): decides local or remote
//!    once per message type and computes the interleave flag
//! 3. **Execution Layer** ([`ActorHost`], [`Turn`], [`Aggregate`]): activation,
//!    serialized turns, end-of-turn commit, timers and reminders
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use actor_runtime::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! #[derive(Clone, Debug)]
//! enum TallyEvent { Added(u32) }
//!
//! impl DomainEvent for TallyEvent {
//!     type State = u32;
//!     fn fold(&self, total: &u32) -> u32 {
//!         match self { TallyEvent::Added(n) => total + n }
//!     }
//! }
//!
//! struct Tally;
//! impl EventSourced for Tally {
//!     const KIND: &'static str = "Tally";
//!     type Event = TallyEvent;
//! }
//!
//! #[derive(Debug)]
//! struct Add { id: String, amount: u32 }
//! impl Message for Add { const NAME: &'static str = "Add"; }
//! impl Command for Add {
//!     type Actor = Aggregate<Tally>;
//!     type Output = u32;
//!     fn actor_key(&self) -> String { self.id.clone() }
//! }
//!
//! struct AddHandler;
//!
//! #[async_trait]
//! impl CommandHandler<Add> for AddHandler {
//!     async fn handle(&self, turn: &Turn<Aggregate<Tally>>, cmd: Add) -> Result<u32, HandlerError> {
//!         let (_, total) = turn.actor().await.apply(TallyEvent::Added(cmd.amount));
//!         Ok(total)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = RuntimeBuilder::new(RuntimeConfig::default())
//!         .aggregate::<Tally>(Arc::new(InMemoryEventStore::new()))
//!         .command::<Add, _>(AddHandler)
//!         .build()?;
//!
//!     assert_eq!(runtime.send(Add { id: "1".into(), amount: 2 }).await?, 2);
//!     Ok(())
//! }
//! ```
//!
//! ## Loop Prevention
//!
//! A handler that sends a command to its own actor would wait forever for its own
//! turn. The mediator detects this from the [`CallContext`] origin and runs the
//! call *interleaved*, on the live activation, without queueing. Calls between
//! different actors are always queued.
//!
//! ## Scheduling
//!
//! [`Turn::schedule`] promotes short periods to local timers kept alive by a
//! durable heartbeat and long periods to durable reminders. See [`scheduler`].
//!
//! ## Testing
//!
//! The [`mock`] module provides recording and failing event stores, a recording
//! reminder service, and a scripted [`mock::MockTransport`] for remote calls.

pub mod actor;
pub mod aggregate;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod host;
pub mod identity;
pub mod mediator;
pub mod message;
pub mod mock;
pub mod scheduler;
pub mod store;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use actor::{Actor, Turn};
pub use aggregate::{Aggregate, EventSourced, StateOf};
pub use builder::{Runtime, RuntimeBuilder};
pub use config::{ActivationFailurePolicy, RuntimeConfig};
pub use context::CallContext;
pub use error::{
    ConfigurationError, HandlerError, RuntimeError, SchedulerError, StoreError, TransportError,
};
pub use event::{fold_all, DomainEvent};
pub use handler::{CommandHandler, NotificationHandler, ReminderHandler};
pub use host::ActorHost;
pub use identity::ActorId;
pub use mediator::{Mediator, WeakMediator};
pub use message::{Command, DeactivationReason, Message, Notification};
pub use scheduler::{
    InMemoryReminderService, LocalTimers, ReminderKey, ReminderService, ReminderSink, TaskKind,
    HEARTBEAT_PERIOD,
};
pub use store::{EventStore, InMemoryEventStore, LoadedStream, NO_STREAM};
pub use transport::{InMemoryCluster, RemoteCommand, RemoteNotification, Transport};
