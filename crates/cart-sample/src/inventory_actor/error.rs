//! Error types for the Inventory actor.

use thiserror::Error;

/// Errors that can occur during stock operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    /// The requested quantity exceeds the available stock.
    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: u32,
        available: u32,
    },

    /// Restocking would take the SKU past the largest quantity it can hold.
    #[error("Cannot restock {requested} of {sku}: {held} already held")]
    CapacityExceeded {
        sku: String,
        requested: u32,
        held: u32,
    },

    /// The provided quantity is zero.
    #[error("Invalid quantity for {sku}: {qty}")]
    InvalidQuantity { sku: String, qty: u32 },
}
