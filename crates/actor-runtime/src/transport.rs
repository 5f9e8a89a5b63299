//! # Transport
//!
//! The network half of the mediator. A [`Transport`] carries a command to the
//! node that owns its actor kind and carries the reply back. The runtime does
//! not define a wire format: payloads cross the seam as boxed values, and a
//! networked transport is expected to encode them itself.
//!
//! [`InMemoryCluster`] joins several [`Runtime`]s in one process. The owner of
//! a command is the first joined node that registered a handler for it.

use crate::builder::Runtime;
use crate::context::CallContext;
use crate::error::{RuntimeError, TransportError};
use crate::identity::ActorId;
use crate::mediator::{Mediator, WeakMediator};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A command on its way to another node.
pub struct RemoteCommand {
    pub target: ActorId,
    pub command: &'static str,
    pub context: CallContext,
    pub payload: Box<dyn Any + Send>,
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("target", &self.target)
            .field("command", &self.command)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// A notification on its way to other nodes.
pub struct RemoteNotification {
    pub name: &'static str,
    pub context: CallContext,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for RemoteNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteNotification")
            .field("name", &self.name)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `envelope` to its owning node and returns the boxed reply.
    /// Errors raised by the remote handler come back unchanged.
    async fn send_remote(
        &self,
        envelope: RemoteCommand,
    ) -> Result<Box<dyn Any + Send>, RuntimeError>;

    async fn publish_remote(&self, notification: RemoteNotification) -> Result<(), TransportError>;
}

/// In-process cluster of runtimes.
///
/// ```rust,ignore
/// let cluster = InMemoryCluster::new();
/// let node_a = RuntimeBuilder::new(config_a).transport(Arc::new(cluster.clone())) /* ... */ .build()?;
/// let node_b = RuntimeBuilder::new(config_b).transport(Arc::new(cluster.clone())) /* ... */ .build()?;
/// cluster.join(&node_a);
/// cluster.join(&node_b);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    nodes: Arc<RwLock<Vec<WeakMediator>>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, runtime: &Runtime) {
        debug!(node = %runtime.node(), "Node joined cluster");
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(runtime.mediator().downgrade());
    }

    fn live_nodes(&self) -> Vec<Mediator> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(WeakMediator::upgrade)
            .collect()
    }
}

#[async_trait]
impl Transport for InMemoryCluster {
    async fn send_remote(
        &self,
        envelope: RemoteCommand,
    ) -> Result<Box<dyn Any + Send>, RuntimeError> {
        let owner = self
            .live_nodes()
            .into_iter()
            .find(|node| node.handles_command(envelope.command))
            .ok_or_else(|| TransportError::NoOwner {
                message: envelope.command.to_string(),
            })?;
        debug!(command = envelope.command, node = %owner.node(), "Routed to owner");
        owner.deliver_remote(envelope).await
    }

    async fn publish_remote(&self, notification: RemoteNotification) -> Result<(), TransportError> {
        for node in self.live_nodes() {
            if node.handles_notification(notification.name) {
                node.deliver_remote_notification(RemoteNotification {
                    name: notification.name,
                    context: notification.context.clone(),
                    payload: notification.payload.clone(),
                });
            }
        }
        Ok(())
    }
}
