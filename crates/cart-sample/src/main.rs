//! # Cart Sample
//!
//! Demo of the actor runtime with an event-sourced cart and a stock actor.
//!
//! The entry point in [`main`] walks through:
//! 1. Building a [`CartSystem`] from `ACTOR_*` environment variables.
//! 2. Adding and clearing items (the clear runs as self-addressed sends).
//! 3. Checking out, which reserves stock on the inventory actors.
//! 4. A checkout that fails on stock and leaves nothing reserved.
//!
//! ```bash
//! RUST_LOG=info cargo run -p cart-sample
//! ```

use actor_runtime::tracing::setup_tracing;
use actor_runtime::RuntimeConfig;
use cart_sample::inventory_actor::InventoryError;
use cart_sample::lifecycle::CartSystem;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = RuntimeConfig::from_env()?;
    info!(node = %config.node_name, "Starting cart sample");

    let system = CartSystem::builder(config)
        .stock("X", 10)
        .stock("Y", 3)
        .build()?;

    let span = tracing::info_span!("shopping");
    async {
        system.carts.add_item("1", "X", 2).await?;
        system.carts.add_item("1", "Y", 1).await?;
        let cleared = system.carts.clear("1").await?;
        info!(version = cleared.version, items = cleared.items.len(), "Cart cleared");

        let cart = system.carts.add_item("1", "X", 4).await?;
        info!(version = cart.version, "Cart ready");
        Ok::<_, actor_runtime::RuntimeError>(())
    }
    .instrument(span)
    .await?;

    let span = tracing::info_span!("checkout");
    let receipt = system.carts.checkout("1").instrument(span).await?;
    info!(cart_id = %receipt.cart_id, version = receipt.version, "Cart checked out");

    // Cart 2 asks for more Y than exists: X is reserved first, then released.
    system.carts.add_item("2", "X", 1).await?;
    system.carts.add_item("2", "Y", 5).await?;
    match system.carts.checkout("2").await {
        Ok(_) => error!("Checkout should have failed"),
        Err(e) => match e.domain_error::<InventoryError>() {
            Some(reason) => info!(%reason, "Checkout rejected"),
            None => error!(error = %e, "Checkout failed"),
        },
    }

    let x = system.inventory.stock_level("X").await?;
    let y = system.inventory.stock_level("Y").await?;
    info!(available = x.available, reserved = x.reserved, "Stock of X");
    info!(available = y.available, reserved = y.reserved, "Stock of Y");
    info!(orders = system.ledger().checkouts().len(), "Orders recorded");

    system.shutdown().await;
    info!("Application completed successfully");
    Ok(())
}
