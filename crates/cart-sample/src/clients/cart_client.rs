//! # Cart Client
//!
//! Provides a high-level API for the cart aggregate. Every method is one
//! command sent through the [`Mediator`], so the cart may live on this node
//! or on another one.
use crate::cart_actor::{AddItem, Checkout, ClearCart, GetCart, RemoveItem};
use crate::model::CartView;
use actor_runtime::{Mediator, RuntimeError};
use tracing::{debug, instrument};

/// Client for interacting with carts.
#[derive(Clone)]
pub struct CartClient {
    mediator: Mediator,
}

impl CartClient {
    pub fn new(mediator: Mediator) -> Self {
        Self { mediator }
    }

    #[instrument(skip(self))]
    pub async fn add_item(&self, cart_id: &str, sku: &str, qty: u32) -> Result<CartView, RuntimeError> {
        debug!("Sending AddItem");
        self.mediator
            .send(AddItem {
                cart_id: cart_id.to_string(),
                sku: sku.to_string(),
                qty,
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: &str,
        sku: &str,
        qty: u32,
    ) -> Result<CartView, RuntimeError> {
        debug!("Sending RemoveItem");
        self.mediator
            .send(RemoveItem {
                cart_id: cart_id.to_string(),
                sku: sku.to_string(),
                qty,
            })
            .await
    }

    /// Removes every line, one self-addressed `RemoveItem` per line.
    #[instrument(skip(self))]
    pub async fn clear(&self, cart_id: &str) -> Result<CartView, RuntimeError> {
        self.mediator
            .send(ClearCart {
                cart_id: cart_id.to_string(),
            })
            .await
    }

    /// Reserves stock for every line and closes the cart.
    ///
    /// Fails with the inventory's error if any line cannot be reserved.
    #[instrument(skip(self))]
    pub async fn checkout(&self, cart_id: &str) -> Result<CartView, RuntimeError> {
        debug!("Sending Checkout");
        self.mediator
            .send(Checkout {
                cart_id: cart_id.to_string(),
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, cart_id: &str) -> Result<CartView, RuntimeError> {
        self.mediator
            .send(GetCart {
                cart_id: cart_id.to_string(),
            })
            .await
    }
}
