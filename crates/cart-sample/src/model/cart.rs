//! Shopping cart events and the state they fold into.
//!
//! # Event Sourcing
//! [`Cart`] is the [`EventSourced`] marker for the cart aggregate: the runtime
//! keeps an `Aggregate<Cart>` per cart id, and its state is always the fold of
//! the [`CartEvent`]s recorded so far.

use actor_runtime::{Aggregate, DomainEvent, EventSourced};
use serde::{Deserialize, Serialize};

/// Marker for the cart aggregate kind.
pub struct Cart;

impl EventSourced for Cart {
    const KIND: &'static str = "Cart";
    type Event = CartEvent;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { sku: String, qty: u32 },
    ItemRemoved { sku: String, qty: u32 },
    CheckedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub sku: String,
    pub qty: u32,
}

impl CartLine {
    pub fn new(sku: impl Into<String>, qty: u32) -> Self {
        Self {
            sku: sku.into(),
            qty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    /// Lines in the order their SKU was first added.
    pub items: Vec<CartLine>,
    pub checked_out: bool,
}

impl CartState {
    pub fn quantity_of(&self, sku: &str) -> u32 {
        self.items
            .iter()
            .find(|line| line.sku == sku)
            .map_or(0, |line| line.qty)
    }

    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |total: u32, line| total.saturating_add(line.qty))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl DomainEvent for CartEvent {
    type State = CartState;

    fn fold(&self, previous: &CartState) -> CartState {
        let mut next = previous.clone();
        match self {
            CartEvent::ItemAdded { sku, qty } => {
                match next.items.iter_mut().find(|line| &line.sku == sku) {
                    Some(line) => line.qty = line.qty.saturating_add(*qty),
                    None => next.items.push(CartLine::new(sku.clone(), *qty)),
                }
            }
            CartEvent::ItemRemoved { sku, qty } => {
                if let Some(line) = next.items.iter_mut().find(|line| &line.sku == sku) {
                    line.qty = line.qty.saturating_sub(*qty);
                }
                next.items.retain(|line| line.qty > 0);
            }
            CartEvent::CheckedOut => next.checked_out = true,
        }
        next
    }
}

/// Read model returned by cart commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: String,
    /// Stream version once the current turn is saved.
    pub version: i64,
    pub items: Vec<CartLine>,
    pub checked_out: bool,
}

impl From<&Aggregate<Cart>> for CartView {
    fn from(cart: &Aggregate<Cart>) -> Self {
        Self {
            cart_id: cart.id().key().to_string(),
            version: cart.current_version(),
            items: cart.state().items.clone(),
            checked_out: cart.state().checked_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_runtime::fold_all;

    fn added(sku: &str, qty: u32) -> CartEvent {
        CartEvent::ItemAdded {
            sku: sku.into(),
            qty,
        }
    }

    #[test]
    fn adding_a_known_sku_merges_lines() {
        let state = fold_all(&[added("X", 2), added("Y", 1), added("X", 3)]);
        assert_eq!(state.items, vec![CartLine::new("X", 5), CartLine::new("Y", 1)]);
        assert_eq!(state.total_quantity(), 6);
    }

    #[test]
    fn adding_past_the_limit_saturates() {
        let state = fold_all(&[added("X", u32::MAX), added("X", 1), added("Y", 2)]);
        assert_eq!(state.quantity_of("X"), u32::MAX);
        assert_eq!(state.total_quantity(), u32::MAX);
    }

    #[test]
    fn removing_everything_drops_the_line() {
        let state = fold_all(&[
            added("X", 2),
            CartEvent::ItemRemoved {
                sku: "X".into(),
                qty: 2,
            },
        ]);
        assert!(state.is_empty());
        assert_eq!(state.quantity_of("X"), 0);
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let json = serde_json::to_string(&added("X", 2)).unwrap();
        assert_eq!(json, r#"{"type":"item_added","sku":"X","qty":2}"#);
        let back: CartEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, added("X", 2));
    }
}
