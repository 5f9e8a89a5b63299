//! Commands addressed to the cart aggregate. Every command is keyed by
//! `cart_id`, so all of them for one cart run one at a time.

use crate::model::{Cart, CartView};
use actor_runtime::{Aggregate, Command, Message};

macro_rules! cart_command {
    ($command:ident, $output:ty) => {
        impl Message for $command {
            const NAME: &'static str = stringify!($command);
        }

        impl Command for $command {
            type Actor = Aggregate<Cart>;
            type Output = $output;

            fn actor_key(&self) -> String {
                self.cart_id.clone()
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct AddItem {
    pub cart_id: String,
    pub sku: String,
    pub qty: u32,
}

#[derive(Debug, Clone)]
pub struct RemoveItem {
    pub cart_id: String,
    pub sku: String,
    pub qty: u32,
}

/// Empties the cart by sending itself one [`RemoveItem`] per line.
#[derive(Debug, Clone)]
pub struct ClearCart {
    pub cart_id: String,
}

/// Reserves stock for every line, then closes the cart.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub cart_id: String,
}

#[derive(Debug, Clone)]
pub struct GetCart {
    pub cart_id: String,
}

cart_command!(AddItem, CartView);
cart_command!(RemoveItem, CartView);
cart_command!(ClearCart, CartView);
cart_command!(Checkout, CartView);
cart_command!(GetCart, CartView);
