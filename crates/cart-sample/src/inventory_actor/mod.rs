//! # Inventory Actor
//!
//! Stock keeping per SKU. Carts reach it only through commands sent from
//! their own turns, so a checkout never touches inventory state directly.
//!
//! ## Structure
//!
//! - [`entity`]: the [`Inventory`] actor and its [`Catalog`] dependency
//! - [`actions`]: stock commands and their handlers
//! - [`error`]: [`InventoryError`]
//! - [`register`]: wires all of the above into a runtime builder

pub mod actions;
pub mod entity;
pub mod error;

pub use actions::*;
pub use entity::*;
pub use error::*;

use actor_runtime::RuntimeBuilder;

/// Registers the inventory actor kind and its command handlers.
pub fn register(builder: RuntimeBuilder, catalog: Catalog) -> RuntimeBuilder {
    builder
        .actor::<Inventory>(catalog)
        .command::<ReserveStock, _>(ReserveStockHandler)
        .command::<ReleaseStock, _>(ReleaseStockHandler)
        .command::<Restock, _>(RestockHandler)
        .command::<StockLevel, _>(StockLevelHandler)
}
