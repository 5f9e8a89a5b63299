use crate::cart_actor;
use crate::clients::{CartClient, InventoryClient};
use crate::inventory_actor::{self, Catalog};
use crate::lifecycle::Ledger;
use crate::model::{CartAbandoned, CartEvent, CheckedOut};
use actor_runtime::{
    ConfigurationError, EventStore, InMemoryEventStore, ReminderService, Runtime, RuntimeBuilder,
    RuntimeConfig, Transport,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// The runtime orchestrator for the cart application.
///
/// `CartSystem` is responsible for:
/// - **Wiring**: registering the cart aggregate, the inventory actor and the
///   notification ledger on one [`Runtime`]
/// - **Lifecycle**: shutting the runtime down, which deactivates every actor
///
/// # Example
///
/// ```ignore
/// let system = CartSystem::builder(RuntimeConfig::from_env()?)
///     .stock("X", 10)
///     .build()?;
///
/// system.carts.add_item("1", "X", 2).await?;
/// system.carts.checkout("1").await?;
///
/// system.shutdown().await;
/// ```
pub struct CartSystem {
    /// Client for cart commands
    pub carts: CartClient,

    /// Client for stock administration
    pub inventory: InventoryClient,

    ledger: Ledger,
    runtime: Runtime,
}

impl CartSystem {
    pub fn builder(config: RuntimeConfig) -> CartSystemBuilder {
        CartSystemBuilder::new(config)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Notifications received by this node.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Deactivates every actor. Carts are durable in the event store, stock
    /// is not.
    pub async fn shutdown(self) {
        info!(node = %self.runtime.node(), "Shutting down cart system...");
        self.runtime.shutdown().await;
        info!("Cart system shutdown complete.");
    }
}

/// Which parts of the application a node hosts, and what it plugs into.
pub struct CartSystemBuilder {
    config: RuntimeConfig,
    store: Option<Arc<dyn EventStore<CartEvent>>>,
    catalog: HashMap<String, u32>,
    reminders: Option<Arc<dyn ReminderService>>,
    transport: Option<Arc<dyn Transport>>,
    host_carts: bool,
    host_inventory: bool,
}

impl CartSystemBuilder {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            store: None,
            catalog: HashMap::new(),
            reminders: None,
            transport: None,
            host_carts: true,
            host_inventory: true,
        }
    }

    /// Event store for carts. Defaults to a fresh in-memory store.
    pub fn store(mut self, store: Arc<dyn EventStore<CartEvent>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Initial stock of `sku`.
    pub fn stock(mut self, sku: impl Into<String>, qty: u32) -> Self {
        self.catalog.insert(sku.into(), qty);
        self
    }

    pub fn reminders(mut self, reminders: Arc<dyn ReminderService>) -> Self {
        self.reminders = Some(reminders);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Leaves carts to another node.
    pub fn without_carts(mut self) -> Self {
        self.host_carts = false;
        self
    }

    /// Leaves inventory to another node.
    pub fn without_inventory(mut self) -> Self {
        self.host_inventory = false;
        self
    }

    pub fn build(self) -> Result<CartSystem, ConfigurationError> {
        let ledger = Ledger::new();
        let mut builder = RuntimeBuilder::new(self.config);
        if self.host_carts {
            let store = self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryEventStore::<CartEvent>::new()));
            builder = cart_actor::register(builder, store)
                .subscribe::<CheckedOut, _>(ledger.clone())
                .subscribe::<CartAbandoned, _>(ledger.clone());
        }
        if self.host_inventory {
            let catalog: Catalog = Arc::new(self.catalog);
            builder = inventory_actor::register(builder, catalog);
        }
        if let Some(reminders) = self.reminders {
            builder = builder.reminders(reminders);
        }
        if let Some(transport) = self.transport {
            builder = builder.transport(transport);
        }

        let runtime = builder.build()?;
        info!(node = %runtime.node(), carts = self.host_carts, inventory = self.host_inventory, "Cart system started");
        Ok(CartSystem {
            carts: CartClient::new(runtime.mediator().clone()),
            inventory: InventoryClient::new(runtime.mediator().clone()),
            ledger,
            runtime,
        })
    }
}
