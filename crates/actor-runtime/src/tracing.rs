//! # Observability & Tracing
//!
//! The runtime logs through the `tracing` crate with structured fields, so a
//! single actor can be followed across activations and nodes:
//!
//! - `actor`: rendered identity, e.g. `Cart-1`
//! - `command` / `task` / `reminder`: what the turn is running
//! - `version`, `count`: stream position after a save
//! - `node`: runtime node name on activation and remote routing
//!
//! Lifecycle events (activated, saved, scheduled, deactivated) are `info`,
//! per-turn detail is `debug`, and failures the runtime recovers from are
//! `warn`.
//!
//! ## Usage
//!
//! ```bash
//! # Lifecycle only
//! RUST_LOG=info cargo run -p cart-sample
//!
//! # Every turn, timer tick and remote hop
//! RUST_LOG=debug cargo run -p cart-sample
//!
//! # Runtime detail, application at info
//! RUST_LOG=info,actor_runtime=debug cargo run -p cart-sample
//! ```
//!
//! With `RUST_LOG=info` a cart checkout reads:
//!
//! ```text
//! INFO Activated actor=Cart-1 node="local"
//! INFO Saved actor=Cart-1 count=1 version=0
//! INFO Scheduled actor=Cart-1 task="abandoned-cart-check" due=30s period=30s kind=Timer
//! INFO Activated actor=Inventory-X node="local"
//! INFO Saved actor=Cart-1 count=1 version=1
//! ```

/// Initializes the global subscriber: `EnvFilter` from `RUST_LOG` (default
/// `info`), compact output, no module targets.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
}
