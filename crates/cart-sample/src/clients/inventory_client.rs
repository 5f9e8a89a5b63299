//! # Inventory Client
//!
//! Stock administration. Reservations are made by carts during checkout, not
//! through this client.
use crate::inventory_actor::{Restock, StockLevel, StockView};
use actor_runtime::{Mediator, RuntimeError};
use tracing::{debug, instrument};

/// Client for interacting with inventory actors.
#[derive(Clone)]
pub struct InventoryClient {
    mediator: Mediator,
}

impl InventoryClient {
    pub fn new(mediator: Mediator) -> Self {
        Self { mediator }
    }

    /// Adds `qty` units and returns the available stock.
    #[instrument(skip(self))]
    pub async fn restock(&self, sku: &str, qty: u32) -> Result<u32, RuntimeError> {
        debug!("Restocking {} units of {}", qty, sku);
        self.mediator
            .send(Restock {
                sku: sku.to_string(),
                qty,
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn stock_level(&self, sku: &str) -> Result<StockView, RuntimeError> {
        self.mediator
            .send(StockLevel {
                sku: sku.to_string(),
            })
            .await
    }
}
