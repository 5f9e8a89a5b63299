//! Stock of one SKU.

use actor_runtime::{Actor, ActorId, RuntimeConfig, RuntimeError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Initial stock per SKU, read when an inventory actor activates.
pub type Catalog = Arc<HashMap<String, u32>>;

/// Plain (not event-sourced) actor keyed by SKU.
///
/// Stock lives in memory only: a deactivated inventory actor starts again
/// from its catalog quantity.
#[derive(Debug)]
pub struct Inventory {
    pub sku: String,
    pub available: u32,
    /// Quantity held per cart id.
    pub reserved: HashMap<String, u32>,
}

impl Inventory {
    pub fn reserved_total(&self) -> u32 {
        self.reserved
            .values()
            .fold(0, |total: u32, qty| total.saturating_add(*qty))
    }
}

#[async_trait]
impl Actor for Inventory {
    const KIND: &'static str = "Inventory";

    type Deps = Catalog;

    async fn activate(
        id: &ActorId,
        catalog: &Catalog,
        _config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let available = catalog.get(id.key()).copied().unwrap_or(0);
        debug!(sku = id.key(), available, "Stock loaded from catalog");
        Ok(Self {
            sku: id.key().to_string(),
            available,
            reserved: HashMap::new(),
        })
    }
}
