//! Error types for the Cart aggregate.

use thiserror::Error;

/// Business rule violations raised by cart handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    /// Quantities must be at least one.
    #[error("Invalid quantity for {sku}: {qty}")]
    InvalidQuantity { sku: String, qty: u32 },

    /// The cart holds fewer units of the SKU than requested.
    #[error("Cart {cart_id} holds {held} of {sku}, cannot remove {requested}")]
    NotInCart {
        cart_id: String,
        sku: String,
        held: u32,
        requested: u32,
    },

    /// Checkout of a cart without lines.
    #[error("Cart {0} is empty")]
    Empty(String),

    /// The cart is closed for changes.
    #[error("Cart {0} is already checked out")]
    AlreadyCheckedOut(String),
}
