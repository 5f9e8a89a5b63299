//! Cart business logic.
//!
//! Handlers lock the aggregate only for as long as they read or apply
//! events. Any `send` to this same cart (as in [`ClearCartHandler`]) happens
//! with the lock released, because the interleaved turn takes it too.

use super::{CartError, ABANDONED_CART_CHECK, ABANDONED_CHECK_PERIOD};
use crate::cart_actor::commands::{AddItem, Checkout, ClearCart, GetCart, RemoveItem};
use crate::inventory_actor::{ReleaseStock, ReserveStock};
use crate::model::{Cart, CartAbandoned, CartEvent, CartView, CheckedOut};
use actor_runtime::{Aggregate, CommandHandler, HandlerError, ReminderHandler, Turn};
use async_trait::async_trait;
use tracing::{debug, info, warn};

type CartTurn = Turn<Aggregate<Cart>>;

fn ensure_open(cart: &Aggregate<Cart>) -> Result<(), CartError> {
    if cart.state().checked_out {
        return Err(CartError::AlreadyCheckedOut(cart.id().key().to_string()));
    }
    Ok(())
}

pub struct AddItemHandler;

#[async_trait]
impl CommandHandler<AddItem> for AddItemHandler {
    async fn handle(&self, turn: &CartTurn, cmd: AddItem) -> Result<CartView, HandlerError> {
        if cmd.qty == 0 {
            return Err(CartError::InvalidQuantity {
                sku: cmd.sku,
                qty: 0,
            }
            .into());
        }
        let (view, first_item) = {
            let mut cart = turn.actor().await;
            ensure_open(&cart)?;
            if cart.state().quantity_of(&cmd.sku).checked_add(cmd.qty).is_none() {
                return Err(CartError::InvalidQuantity {
                    sku: cmd.sku,
                    qty: cmd.qty,
                }
                .into());
            }
            let (previous, _) = cart.apply(CartEvent::ItemAdded {
                sku: cmd.sku,
                qty: cmd.qty,
            });
            (CartView::from(&*cart), previous.is_empty())
        };
        if first_item {
            turn.schedule(
                ABANDONED_CART_CHECK,
                ABANDONED_CHECK_PERIOD,
                ABANDONED_CHECK_PERIOD,
            )
            .await?;
        }
        Ok(view)
    }
}

pub struct RemoveItemHandler;

#[async_trait]
impl CommandHandler<RemoveItem> for RemoveItemHandler {
    async fn handle(&self, turn: &CartTurn, cmd: RemoveItem) -> Result<CartView, HandlerError> {
        if cmd.qty == 0 {
            return Err(CartError::InvalidQuantity {
                sku: cmd.sku,
                qty: 0,
            }
            .into());
        }
        let mut cart = turn.actor().await;
        ensure_open(&cart)?;
        let held = cart.state().quantity_of(&cmd.sku);
        if held < cmd.qty {
            return Err(CartError::NotInCart {
                cart_id: cmd.cart_id,
                sku: cmd.sku,
                held,
                requested: cmd.qty,
            }
            .into());
        }
        cart.apply(CartEvent::ItemRemoved {
            sku: cmd.sku,
            qty: cmd.qty,
        });
        Ok(CartView::from(&*cart))
    }
}

pub struct ClearCartHandler;

#[async_trait]
impl CommandHandler<ClearCart> for ClearCartHandler {
    async fn handle(&self, turn: &CartTurn, cmd: ClearCart) -> Result<CartView, HandlerError> {
        let lines = {
            let cart = turn.actor().await;
            ensure_open(&cart)?;
            cart.state().items.clone()
        };
        for line in lines {
            turn.send(RemoveItem {
                cart_id: cmd.cart_id.clone(),
                sku: line.sku,
                qty: line.qty,
            })
            .await?;
        }
        let cart = turn.actor().await;
        Ok(CartView::from(&*cart))
    }
}

pub struct CheckoutHandler;

#[async_trait]
impl CommandHandler<Checkout> for CheckoutHandler {
    async fn handle(&self, turn: &CartTurn, cmd: Checkout) -> Result<CartView, HandlerError> {
        let lines = {
            let cart = turn.actor().await;
            ensure_open(&cart)?;
            if cart.state().is_empty() {
                return Err(CartError::Empty(cmd.cart_id).into());
            }
            cart.state().items.clone()
        };

        let mut reserved: Vec<String> = Vec::new();
        for line in &lines {
            let reservation = turn
                .send(ReserveStock {
                    sku: line.sku.clone(),
                    cart_id: cmd.cart_id.clone(),
                    qty: line.qty,
                })
                .await;
            if let Err(error) = reservation {
                for sku in reserved {
                    let release = ReleaseStock {
                        sku,
                        cart_id: cmd.cart_id.clone(),
                    };
                    if let Err(release_error) = turn.send(release).await {
                        warn!(cart_id = %cmd.cart_id, %release_error, "Reservation not released");
                    }
                }
                return Err(error.into());
            }
            reserved.push(line.sku.clone());
        }

        let view = {
            let mut cart = turn.actor().await;
            cart.apply(CartEvent::CheckedOut);
            CartView::from(&*cart)
        };
        turn.unschedule(ABANDONED_CART_CHECK).await?;
        turn.publish(CheckedOut {
            cart_id: cmd.cart_id.clone(),
            lines,
        })
        .await?;
        info!(cart_id = %cmd.cart_id, version = view.version, "Checked out");
        Ok(view)
    }
}

pub struct GetCartHandler;

#[async_trait]
impl CommandHandler<GetCart> for GetCartHandler {
    async fn handle(&self, turn: &CartTurn, _cmd: GetCart) -> Result<CartView, HandlerError> {
        let cart = turn.actor().await;
        Ok(CartView::from(&*cart))
    }
}

/// Periodic check for carts left with items. Stops itself once the cart is
/// empty or checked out.
pub struct AbandonedCartCheckHandler;

#[async_trait]
impl ReminderHandler<Aggregate<Cart>> for AbandonedCartCheckHandler {
    fn task(&self) -> &'static str {
        ABANDONED_CART_CHECK
    }

    async fn handle(&self, turn: &CartTurn) -> Result<(), HandlerError> {
        let (cart_id, items, active) = {
            let cart = turn.actor().await;
            let state = cart.state();
            (
                cart.id().key().to_string(),
                state.total_quantity(),
                !state.checked_out && !state.is_empty(),
            )
        };
        if !active {
            debug!(cart_id = %cart_id, "Cart settled, check stopped");
            turn.unschedule(ABANDONED_CART_CHECK).await?;
            return Ok(());
        }
        turn.publish(CartAbandoned { cart_id, items }).await?;
        Ok(())
    }
}
