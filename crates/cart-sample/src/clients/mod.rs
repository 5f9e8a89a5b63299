//! Typed wrappers around [`Mediator::send`](actor_runtime::Mediator::send).

pub mod cart_client;
pub mod inventory_client;

pub use cart_client::*;
pub use inventory_client::*;
