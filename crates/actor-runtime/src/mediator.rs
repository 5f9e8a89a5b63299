//! # Mediator
//!
//! The mediator is the single entry point for sending commands and publishing
//! notifications. For every message type it decides once, from the dispatch
//! table built by [`RuntimeBuilder::build`](crate::RuntimeBuilder::build),
//! whether the message is handled on this node or goes through the
//! [`Transport`]. Callers see the same outcome on both paths.
//!
//! ## Loop prevention
//!
//! A local command is interleaved exactly when the call context's origin is
//! the command's target. The flag is computed here and nowhere else.
//!
//! ## Remote calls
//!
//! Remote sends are bounded by [`RuntimeConfig::request_timeout`]. When the
//! timeout elapses the caller gets [`RuntimeError::UnknownOutcome`]: the
//! remote node may still apply the command.

use crate::actor::Actor;
use crate::config::RuntimeConfig;
use crate::context::CallContext;
use crate::error::{ConfigurationError, RuntimeError, TransportError};
use crate::handler::{CommandHandler, NotificationHandler};
use crate::host::{ActorHost, AnyHost};
use crate::identity::ActorId;
use crate::message::{Command, Notification};
use crate::scheduler::{ReminderKey, ReminderSink};
use crate::transport::{RemoteCommand, RemoteNotification, Transport};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Type-erased command route.
#[async_trait]
pub(crate) trait Route: Send + Sync {
    fn command_name(&self) -> &'static str;

    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Dispatches a boxed command received from another node.
    async fn dispatch_boxed(
        &self,
        context: CallContext,
        payload: Box<dyn Any + Send>,
    ) -> Result<Box<dyn Any + Send>, RuntimeError>;
}

/// A command type bound to its host and handler.
pub(crate) struct LocalRoute<C: Command> {
    host: Arc<ActorHost<C::Actor>>,
    handler: Arc<dyn CommandHandler<C>>,
}

impl<C: Command> LocalRoute<C> {
    pub(crate) fn new(host: Arc<ActorHost<C::Actor>>, handler: Arc<dyn CommandHandler<C>>) -> Self {
        Self { host, handler }
    }

    async fn dispatch(&self, context: CallContext, command: C) -> Result<C::Output, RuntimeError> {
        let interleave = context.is_reentrant_for(&command.target());
        self.host
            .execute(context, command, self.handler.clone(), interleave)
            .await
    }
}

#[async_trait]
impl<C: Command> Route for LocalRoute<C> {
    fn command_name(&self) -> &'static str {
        C::NAME
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    async fn dispatch_boxed(
        &self,
        context: CallContext,
        payload: Box<dyn Any + Send>,
    ) -> Result<Box<dyn Any + Send>, RuntimeError> {
        let command = payload.downcast::<C>().map_err(|_| ConfigurationError::HandlerMismatch {
            command: C::NAME,
            kind: <C::Actor as Actor>::KIND,
        })?;
        let output = self.dispatch(context, *command).await?;
        Ok(Box::new(output))
    }
}

/// Type-erased notification subscriber.
#[async_trait]
pub(crate) trait Subscriber: Send + Sync {
    fn notification_name(&self) -> &'static str;

    async fn deliver(
        &self,
        context: CallContext,
        payload: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), RuntimeError>;
}

pub(crate) struct LocalSubscriber<N: Notification> {
    handler: Arc<dyn NotificationHandler<N>>,
}

impl<N: Notification> LocalSubscriber<N> {
    pub(crate) fn new(handler: Arc<dyn NotificationHandler<N>>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<N: Notification> Subscriber for LocalSubscriber<N> {
    fn notification_name(&self) -> &'static str {
        N::NAME
    }

    async fn deliver(
        &self,
        context: CallContext,
        payload: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), RuntimeError> {
        let notification = payload
            .downcast_ref::<N>()
            .ok_or_else(|| TransportError::UnexpectedReply {
                command: N::NAME.to_string(),
            })?
            .clone();
        self.handler
            .handle(&context, notification)
            .await
            .map_err(RuntimeError::Handler)
    }
}

/// Read-only dispatch tables of one runtime.
pub(crate) struct MediatorInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) routes: HashMap<TypeId, Arc<dyn Route>>,
    pub(crate) routes_by_name: HashMap<&'static str, Arc<dyn Route>>,
    pub(crate) subscribers: HashMap<TypeId, Vec<Arc<dyn Subscriber>>>,
    pub(crate) subscribers_by_name: HashMap<&'static str, Vec<Arc<dyn Subscriber>>>,
    pub(crate) hosts: HashMap<&'static str, Arc<dyn AnyHost>>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    /// Set by shutdown; reminder ticks are dropped from then on.
    pub(crate) stopped: AtomicBool,
}

#[async_trait]
impl ReminderSink for MediatorInner {
    async fn deliver(&self, target: ActorId, key: ReminderKey) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!(actor = %target, reminder = %key, "Runtime stopped, reminder dropped");
            return;
        }
        match self.hosts.get(target.kind()) {
            Some(host) => {
                if let Err(error) = host.deliver_reminder(target.key(), key.clone()).await {
                    warn!(actor = %target, reminder = %key, %error, "Reminder delivery failed");
                }
            }
            None => warn!(actor = %target, reminder = %key, "No host for reminder target"),
        }
    }
}

/// Cheap, cloneable handle to a runtime's dispatch tables.
#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

/// Non-owning [`Mediator`] handle, held by hosts and transports.
#[derive(Clone)]
pub struct WeakMediator {
    inner: Weak<MediatorInner>,
}

impl WeakMediator {
    pub fn upgrade(&self) -> Option<Mediator> {
        self.inner.upgrade().map(|inner| Mediator { inner })
    }
}

impl Mediator {
    pub(crate) fn new(inner: Arc<MediatorInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<MediatorInner> {
        &self.inner
    }

    pub fn downgrade(&self) -> WeakMediator {
        WeakMediator {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Name of the node this mediator belongs to.
    pub fn node(&self) -> &str {
        &self.inner.config.node_name
    }

    /// Sends a command from outside any actor.
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, RuntimeError> {
        self.send_with(CallContext::external(), command).await
    }

    /// Sends a command on behalf of `context`.
    pub async fn send_with<C: Command>(
        &self,
        context: CallContext,
        command: C,
    ) -> Result<C::Output, RuntimeError> {
        if let Some(route) = self.inner.routes.get(&TypeId::of::<C>()) {
            let route = route.as_any().downcast_ref::<LocalRoute<C>>().ok_or(
                ConfigurationError::HandlerMismatch {
                    command: C::NAME,
                    kind: <C::Actor as Actor>::KIND,
                },
            )?;
            return route.dispatch(context, command).await;
        }

        let transport = self
            .inner
            .transport
            .as_ref()
            .ok_or(RuntimeError::NoRoute { command: C::NAME })?;
        let target = command.target();
        let timeout = self.inner.config.request_timeout;
        debug!(command = C::NAME, target = %target, node = %self.node(), "Sending to remote");
        let envelope = RemoteCommand {
            target: target.clone(),
            command: C::NAME,
            context,
            payload: Box::new(command),
        };
        let reply = match tokio::time::timeout(timeout, transport.send_remote(envelope)).await {
            Ok(reply) => reply?,
            Err(_) => {
                warn!(command = C::NAME, target = %target, ?timeout, "Remote call timed out");
                return Err(RuntimeError::UnknownOutcome {
                    command: C::NAME,
                    target,
                    timeout,
                });
            }
        };
        reply
            .downcast::<C::Output>()
            .map(|output| *output)
            .map_err(|_| {
                TransportError::UnexpectedReply {
                    command: C::NAME.to_string(),
                }
                .into()
            })
    }

    /// Publishes a notification from outside any actor.
    pub async fn publish<N: Notification>(&self, notification: N) -> Result<(), RuntimeError> {
        self.publish_with(CallContext::external(), notification)
            .await
    }

    /// Publishes a notification on behalf of `context`.
    ///
    /// Local subscribers run on their own tasks; their failures are logged,
    /// not returned. Without local subscribers the notification goes to the
    /// transport, if any.
    pub async fn publish_with<N: Notification>(
        &self,
        context: CallContext,
        notification: N,
    ) -> Result<(), RuntimeError> {
        if let Some(subscribers) = self.inner.subscribers.get(&TypeId::of::<N>()) {
            fan_out(&context, Arc::new(notification), subscribers);
            return Ok(());
        }
        match &self.inner.transport {
            Some(transport) => {
                transport
                    .publish_remote(RemoteNotification {
                        name: N::NAME,
                        context,
                        payload: Arc::new(notification),
                    })
                    .await?;
                Ok(())
            }
            None => {
                debug!(notification = N::NAME, "No subscribers");
                Ok(())
            }
        }
    }

    /// Whether this node handles the named command.
    pub fn handles_command(&self, name: &str) -> bool {
        self.inner.routes_by_name.contains_key(name)
    }

    pub fn handles_notification(&self, name: &str) -> bool {
        self.inner.subscribers_by_name.contains_key(name)
    }

    /// Dispatches a command that arrived from another node, keeping the
    /// sender's call context.
    pub async fn deliver_remote(
        &self,
        envelope: RemoteCommand,
    ) -> Result<Box<dyn Any + Send>, RuntimeError> {
        let route = self.inner.routes_by_name.get(envelope.command).ok_or(
            ConfigurationError::MissingHandler {
                command: envelope.command.to_string(),
            },
        )?;
        debug!(command = envelope.command, target = %envelope.target, node = %self.node(), "Remote command received");
        route
            .dispatch_boxed(envelope.context, envelope.payload)
            .await
    }

    /// Fans a notification from another node out to local subscribers.
    pub fn deliver_remote_notification(&self, notification: RemoteNotification) {
        if let Some(subscribers) = self.inner.subscribers_by_name.get(notification.name) {
            fan_out(&notification.context, notification.payload, subscribers);
        }
    }
}

fn fan_out(
    context: &CallContext,
    payload: Arc<dyn Any + Send + Sync>,
    subscribers: &[Arc<dyn Subscriber>],
) {
    for subscriber in subscribers {
        let subscriber = subscriber.clone();
        let context = context.clone();
        let payload = payload.clone();
        tokio::spawn(async move {
            if let Err(error) = subscriber.deliver(context, payload).await {
                warn!(
                    notification = subscriber.notification_name(),
                    %error,
                    "Notification handler failed"
                );
            }
        });
    }
}
