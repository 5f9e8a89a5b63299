//! # Handler Contracts
//!
//! Handlers hold the business logic. Each one is bound at registration time to a
//! statically known (actor type, message type, result type) triple, so the
//! runtime never resolves a handler by reflection at call time.
//!
//! Handlers never call into an actor directly. To reach another actor (or their
//! own actor, reentrantly) they go through [`Turn::send`](crate::Turn::send),
//! which routes via the mediator and stamps the calling actor as origin.

use crate::actor::{Actor, Turn};
use crate::context::CallContext;
use crate::error::HandlerError;
use crate::message::{Command, Notification};
use async_trait::async_trait;

/// Handles one command type against its target actor.
///
/// # Example
///
/// ```rust,ignore
/// struct AddItemHandler;
///
/// #[async_trait]
/// impl CommandHandler<AddItem> for AddItemHandler {
///     async fn handle(&self, turn: &Turn<Aggregate<Cart>>, cmd: AddItem) -> Result<CartView, HandlerError> {
///         let mut cart = turn.actor().await;
///         cart.apply(CartEvent::ItemAdded { sku: cmd.sku, qty: cmd.qty });
///         Ok(CartView::from(cart.state()))
///     }
/// }
/// ```
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    async fn handle(&self, turn: &Turn<C::Actor>, command: C) -> Result<C::Output, HandlerError>;
}

/// Runs when a scheduled task of actor type `A` fires, whether from a local
/// timer tick or a durable reminder.
#[async_trait]
pub trait ReminderHandler<A: Actor>: Send + Sync + 'static {
    /// Task name this handler is registered under.
    fn task(&self) -> &'static str;

    async fn handle(&self, turn: &Turn<A>) -> Result<(), HandlerError>;
}

/// Receives published notifications of type `N`.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    async fn handle(&self, ctx: &CallContext, notification: N) -> Result<(), HandlerError>;
}
