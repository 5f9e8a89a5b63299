//! Commands handled by the [`Inventory`] actor and their handlers.
//!
//! | Command | Effect | Output |
//! |---------|--------|--------|
//! | [`ReserveStock`] | moves stock from available to the cart's reservation | remaining |
//! | [`ReleaseStock`] | returns a cart's reservation to available | remaining |
//! | [`Restock`] | adds to available | remaining |
//! | [`StockLevel`] | none | [`StockView`] |

use super::{Inventory, InventoryError};
use actor_runtime::{Command, CommandHandler, HandlerError, Message, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ReserveStock {
    pub sku: String,
    pub cart_id: String,
    pub qty: u32,
}

impl Message for ReserveStock {
    const NAME: &'static str = "ReserveStock";
}

impl Command for ReserveStock {
    type Actor = Inventory;
    type Output = u32;

    fn actor_key(&self) -> String {
        self.sku.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseStock {
    pub sku: String,
    pub cart_id: String,
}

impl Message for ReleaseStock {
    const NAME: &'static str = "ReleaseStock";
}

impl Command for ReleaseStock {
    type Actor = Inventory;
    type Output = u32;

    fn actor_key(&self) -> String {
        self.sku.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Restock {
    pub sku: String,
    pub qty: u32,
}

impl Message for Restock {
    const NAME: &'static str = "Restock";
}

impl Command for Restock {
    type Actor = Inventory;
    type Output = u32;

    fn actor_key(&self) -> String {
        self.sku.clone()
    }
}

#[derive(Debug, Clone)]
pub struct StockLevel {
    pub sku: String,
}

impl Message for StockLevel {
    const NAME: &'static str = "StockLevel";
}

impl Command for StockLevel {
    type Actor = Inventory;
    type Output = StockView;

    fn actor_key(&self) -> String {
        self.sku.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    pub sku: String,
    pub available: u32,
    pub reserved: u32,
}

pub struct ReserveStockHandler;

#[async_trait]
impl CommandHandler<ReserveStock> for ReserveStockHandler {
    async fn handle(&self, turn: &Turn<Inventory>, cmd: ReserveStock) -> Result<u32, HandlerError> {
        if cmd.qty == 0 {
            return Err(InventoryError::InvalidQuantity {
                sku: cmd.sku,
                qty: 0,
            }
            .into());
        }
        let mut stock = turn.actor().await;
        if cmd.qty > stock.available {
            return Err(InventoryError::InsufficientStock {
                sku: cmd.sku,
                requested: cmd.qty,
                available: stock.available,
            }
            .into());
        }
        stock.available -= cmd.qty;
        *stock.reserved.entry(cmd.cart_id.clone()).or_default() += cmd.qty;
        info!(sku = %cmd.sku, cart_id = %cmd.cart_id, qty = cmd.qty, remaining = stock.available, "Stock reserved");
        Ok(stock.available)
    }
}

pub struct ReleaseStockHandler;

#[async_trait]
impl CommandHandler<ReleaseStock> for ReleaseStockHandler {
    async fn handle(&self, turn: &Turn<Inventory>, cmd: ReleaseStock) -> Result<u32, HandlerError> {
        let mut stock = turn.actor().await;
        if let Some(qty) = stock.reserved.remove(&cmd.cart_id) {
            stock.available = stock.available.saturating_add(qty);
            info!(sku = %cmd.sku, cart_id = %cmd.cart_id, qty, "Reservation released");
        }
        Ok(stock.available)
    }
}

pub struct RestockHandler;

#[async_trait]
impl CommandHandler<Restock> for RestockHandler {
    async fn handle(&self, turn: &Turn<Inventory>, cmd: Restock) -> Result<u32, HandlerError> {
        if cmd.qty == 0 {
            return Err(InventoryError::InvalidQuantity {
                sku: cmd.sku,
                qty: 0,
            }
            .into());
        }
        let mut stock = turn.actor().await;
        // Released reservations return to `available`, so they count too.
        let held = stock.available.saturating_add(stock.reserved_total());
        if held.checked_add(cmd.qty).is_none() {
            return Err(InventoryError::CapacityExceeded {
                sku: cmd.sku,
                requested: cmd.qty,
                held,
            }
            .into());
        }
        stock.available += cmd.qty;
        info!(sku = %cmd.sku, qty = cmd.qty, available = stock.available, "Restocked");
        Ok(stock.available)
    }
}

pub struct StockLevelHandler;

#[async_trait]
impl CommandHandler<StockLevel> for StockLevelHandler {
    async fn handle(&self, turn: &Turn<Inventory>, _cmd: StockLevel) -> Result<StockView, HandlerError> {
        let stock = turn.actor().await;
        Ok(StockView {
            sku: stock.sku.clone(),
            available: stock.available,
            reserved: stock.reserved_total(),
        })
    }
}
