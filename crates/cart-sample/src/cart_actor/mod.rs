//! # Cart Aggregate
//!
//! The cart is an event-sourced aggregate (`Aggregate<Cart>`): every handler
//! below applies [`CartEvent`](crate::model::CartEvent)s, and the runtime
//! appends them at the end of the turn.
//!
//! ## Cross-actor calls
//!
//! - [`ClearCart`] sends [`RemoveItem`] to its **own** cart. Those calls run
//!   interleaved on the live activation.
//! - [`Checkout`] sends [`ReserveStock`](crate::inventory_actor::ReserveStock)
//!   to one inventory actor per line. Those calls are queued like any other.
//!   A failed reservation releases the ones already made.
//!
//! ## Scheduled work
//!
//! The first item added to a cart schedules [`ABANDONED_CART_CHECK`] every
//! [`ABANDONED_CHECK_PERIOD`]. The period is short, so it runs on a local timer
//! kept alive by a durable heartbeat.

pub mod commands;
pub mod error;
pub mod handlers;

pub use commands::*;
pub use error::*;
pub use handlers::*;

use crate::model::{Cart, CartEvent};
use actor_runtime::{Aggregate, EventStore, RuntimeBuilder};
use std::sync::Arc;
use std::time::Duration;

pub const ABANDONED_CART_CHECK: &str = "abandoned-cart-check";

pub const ABANDONED_CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Registers the cart aggregate, its command handlers and its scheduled task.
pub fn register(builder: RuntimeBuilder, store: Arc<dyn EventStore<CartEvent>>) -> RuntimeBuilder {
    builder
        .aggregate::<Cart>(store)
        .command::<AddItem, _>(AddItemHandler)
        .command::<RemoveItem, _>(RemoveItemHandler)
        .command::<ClearCart, _>(ClearCartHandler)
        .command::<Checkout, _>(CheckoutHandler)
        .command::<GetCart, _>(GetCartHandler)
        .reminder::<Aggregate<Cart>, _>(AbandonedCartCheckHandler)
}
