//! In-process record of published cart notifications.

use crate::model::{CartAbandoned, CheckedOut};
use actor_runtime::{CallContext, HandlerError, NotificationHandler};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    CheckedOut(CheckedOut),
    Abandoned(CartAbandoned),
}

/// Subscriber for [`CheckedOut`] and [`CartAbandoned`]. Clones share entries.
#[derive(Clone, Default)]
pub struct Ledger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().clone()
    }

    pub fn checkouts(&self) -> Vec<CheckedOut> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::CheckedOut(checked_out) => Some(checked_out.clone()),
                LedgerEntry::Abandoned(_) => None,
            })
            .collect()
    }

    pub fn abandoned(&self) -> Vec<CartAbandoned> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Abandoned(abandoned) => Some(abandoned.clone()),
                LedgerEntry::CheckedOut(_) => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NotificationHandler<CheckedOut> for Ledger {
    async fn handle(&self, ctx: &CallContext, notification: CheckedOut) -> Result<(), HandlerError> {
        info!(
            cart_id = %notification.cart_id,
            lines = notification.lines.len(),
            correlation_id = %ctx.correlation_id(),
            "Order recorded"
        );
        self.lock().push(LedgerEntry::CheckedOut(notification));
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler<CartAbandoned> for Ledger {
    async fn handle(&self, _ctx: &CallContext, notification: CartAbandoned) -> Result<(), HandlerError> {
        info!(cart_id = %notification.cart_id, items = notification.items, "Cart idle");
        self.lock().push(LedgerEntry::Abandoned(notification));
        Ok(())
    }
}
