//! # Cart Sample Library
//!
//! A shopping cart on top of `actor-runtime`, exposed as a library for the
//! integration tests and the demo binary.
//!
//! - [`model`]: cart events, state and notifications
//! - [`cart_actor`]: the event-sourced cart aggregate
//! - [`inventory_actor`]: a plain per-SKU stock actor
//! - [`clients`]: typed client wrappers
//! - [`lifecycle`]: [`CartSystem`](lifecycle::CartSystem) wiring

pub mod cart_actor;
pub mod clients;
pub mod inventory_actor;
pub mod lifecycle;
pub mod model;
