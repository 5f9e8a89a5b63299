//! Notifications published by the cart aggregate.

use crate::model::CartLine;
use actor_runtime::{Message, Notification};
use serde::{Deserialize, Serialize};

/// A cart was checked out and its stock reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedOut {
    pub cart_id: String,
    pub lines: Vec<CartLine>,
}

impl Message for CheckedOut {
    const NAME: &'static str = "CheckedOut";
}

impl Notification for CheckedOut {}

/// The abandoned-cart check found a cart with items that was never checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAbandoned {
    pub cart_id: String,
    pub items: u32,
}

impl Message for CartAbandoned {
    const NAME: &'static str = "CartAbandoned";
}

impl Notification for CartAbandoned {}
