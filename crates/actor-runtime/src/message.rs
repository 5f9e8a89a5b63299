//! # Messages
//!
//! This module defines the message contracts shared by callers, the mediator and
//! actors, plus the internal mailbox envelope an actor cell processes.
//!
//! - [`Command`]: request/response message bound to one target actor type and
//!   one output type. The target identity comes from [`Command::actor_key`].
//! - [`Notification`]: fire-and-forget message fanned out to subscribers.

use crate::actor::{Actor, Turn};
use crate::context::CallContext;
use crate::error::RuntimeError;
use crate::handler::CommandHandler;
use crate::identity::ActorId;
use crate::scheduler::ReminderKey;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Anything routed by the mediator.
pub trait Message: Send + Debug + 'static {
    /// Stable name used for remote routing and logs.
    const NAME: &'static str;
}

/// A request handled by exactly one actor of type [`Command::Actor`].
///
/// Binding the actor type and the output type to the command is what makes
/// the (actor, command, result) triple checkable at compile time.
pub trait Command: Message {
    type Actor: Actor;
    type Output: Send + Debug + 'static;

    /// Key of the target actor within its kind.
    fn actor_key(&self) -> String;

    fn target(&self) -> ActorId {
        ActorId::new(<Self::Actor as Actor>::KIND, self.actor_key())
    }
}

/// A broadcast message. Cloned once per subscriber.
pub trait Notification: Message + Clone + Sync {}

/// Type alias for the one-shot response channel used by actor cells.
pub type Response<T> = oneshot::Sender<Result<T, RuntimeError>>;

/// Why an activation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// No message arrived within the configured idle timeout.
    IdleTimeout,
    /// Requested through [`ActorHost::deactivate`](crate::ActorHost::deactivate).
    Explicit,
    /// The end-of-turn commit failed; in-memory state is no longer trusted.
    CommitFailed,
    /// The runtime is shutting down.
    Shutdown,
}

/// Unit of work run inside one turn of an actor cell.
#[async_trait]
pub(crate) trait TurnJob<A: Actor>: Send {
    async fn run(self: Box<Self>, turn: &Turn<A>);
}

/// A command waiting for its turn, together with the handler resolved for it.
pub(crate) struct CommandJob<C: Command> {
    pub(crate) handler: Arc<dyn CommandHandler<C>>,
    pub(crate) command: C,
    pub(crate) respond_to: Response<C::Output>,
}

#[async_trait]
impl<C: Command> TurnJob<C::Actor> for CommandJob<C> {
    async fn run(self: Box<Self>, turn: &Turn<C::Actor>) {
        let CommandJob {
            handler,
            command,
            respond_to,
        } = *self;
        let result = turn.run_command(handler.as_ref(), command).await;
        let _ = respond_to.send(result);
    }
}

/// Internal message type processed by an actor cell's run loop.
pub(crate) enum Envelope<A: Actor> {
    /// Run a job as one serialized turn.
    Execute {
        job: Box<dyn TurnJob<A>>,
        context: CallContext,
    },
    /// A local timer ticked. `generation` identifies the registration that
    /// produced the tick.
    Timer { task: String, generation: u64 },
    /// The durable substrate delivered a reminder.
    Reminder { key: ReminderKey },
    /// Stop the cell. `ack` fires once deactivation finished.
    Deactivate {
        reason: DeactivationReason,
        ack: Option<oneshot::Sender<()>>,
    },
}
