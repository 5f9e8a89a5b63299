//! # System Lifecycle & Orchestration
//!
//! Wiring of the cart application onto an [`actor_runtime::Runtime`].
//!
//! **Key Responsibilities:**
//! 1. **Registration** - cart aggregate, inventory actor, notification ledger
//! 2. **Substrates** - event store, reminder service and transport, all
//!    replaceable for tests and multi-node setups
//! 3. **Shutdown** - deactivate every actor through the runtime
//!
//! A node can host a subset of the application. Two nodes joined by an
//! [`InMemoryCluster`](actor_runtime::InMemoryCluster) split carts and
//! inventory:
//!
//! ```rust,ignore
//! let cluster = InMemoryCluster::new();
//! let carts = CartSystem::builder(config.clone().with_node_name("carts"))
//!     .without_inventory()
//!     .transport(Arc::new(cluster.clone()))
//!     .build()?;
//! let stock = CartSystem::builder(config.with_node_name("stock"))
//!     .without_carts()
//!     .stock("X", 10)
//!     .build()?;
//! cluster.join(carts.runtime());
//! cluster.join(stock.runtime());
//! ```
//!
//! Tracing is initialised once per process with
//! [`setup_tracing`](actor_runtime::tracing::setup_tracing).

pub mod cart_system;
pub mod ledger;

pub use cart_system::*;
pub use ledger::*;
