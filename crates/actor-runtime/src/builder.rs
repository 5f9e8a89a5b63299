//! # Runtime Wiring
//!
//! [`RuntimeBuilder`] collects every registration of a node (actor kinds,
//! command handlers, scheduled tasks, notification subscribers, substrates)
//! and [`RuntimeBuilder::build`] turns them into the read-only dispatch tables
//! of a [`Runtime`]. Wiring mistakes surface from `build` as a
//! [`ConfigurationError`] instead of at the first message.
//!
//! ```rust,ignore
//! let runtime = RuntimeBuilder::new(RuntimeConfig::from_env()?)
//!     .aggregate::<Cart>(store)
//!     .command::<AddItem, _>(AddItemHandler)
//!     .reminder::<Aggregate<Cart>, _>(AbandonedCartCheckHandler)
//!     .build()?;
//!
//! runtime.send(AddItem { cart_id: "1".into(), sku: "X".into(), qty: 2 }).await?;
//! ```

use crate::actor::Actor;
use crate::aggregate::{Aggregate, EventSourced};
use crate::config::RuntimeConfig;
use crate::error::{ConfigurationError, RuntimeError, TransportError};
use crate::handler::{CommandHandler, NotificationHandler, ReminderHandler};
use crate::host::{ActorHost, AnyHost};
use crate::identity::ActorId;
use crate::mediator::{LocalRoute, LocalSubscriber, Mediator, MediatorInner, Route, Subscriber};
use crate::message::{Command, Notification};
use crate::scheduler::{InMemoryReminderService, ReminderKey, ReminderService, ReminderSink};
use crate::store::EventStore;
use crate::transport::Transport;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

type HostTable = HashMap<&'static str, Arc<dyn AnyHost>>;
type TaskTable = HashMap<&'static str, (TypeId, Box<dyn Any + Send>)>;
type TaskHandlers<A> = HashMap<&'static str, Arc<dyn ReminderHandler<A>>>;
type HostFactory = Box<
    dyn FnOnce(
            &mut TaskTable,
            &RuntimeConfig,
            &Arc<dyn ReminderService>,
        ) -> Result<Arc<dyn AnyHost>, ConfigurationError>
        + Send,
>;
type RouteFactory =
    Box<dyn FnOnce(&HostTable) -> Result<Arc<dyn Route>, ConfigurationError> + Send>;

pub struct RuntimeBuilder {
    config: RuntimeConfig,
    actors: Vec<(&'static str, HostFactory)>,
    tasks: TaskTable,
    task_names: Vec<(&'static str, &'static str)>,
    commands: Vec<(TypeId, &'static str, RouteFactory)>,
    subscribers: Vec<(TypeId, Arc<dyn Subscriber>)>,
    reminders: Option<Arc<dyn ReminderService>>,
    transport: Option<Arc<dyn Transport>>,
    errors: Vec<ConfigurationError>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            actors: Vec::new(),
            tasks: HashMap::new(),
            task_names: Vec::new(),
            commands: Vec::new(),
            subscribers: Vec::new(),
            reminders: None,
            transport: None,
            errors: Vec::new(),
        }
    }

    /// Registers actor kind `A`. `deps` is cloned into every activation.
    pub fn actor<A: Actor>(mut self, deps: A::Deps) -> Self {
        if self.actors.iter().any(|(kind, _)| *kind == A::KIND) {
            self.errors
                .push(ConfigurationError::DuplicateActor { kind: A::KIND });
            return self;
        }
        let factory: HostFactory = Box::new(move |tasks, config, reminders| {
            let handlers: TaskHandlers<A> = match tasks.remove(A::KIND) {
                Some((type_id, handlers)) if type_id == TypeId::of::<A>() => handlers
                    .downcast::<TaskHandlers<A>>()
                    .map(|handlers| *handlers)
                    .map_err(|_| ConfigurationError::HandlerMismatch {
                        command: "scheduled task",
                        kind: A::KIND,
                    })?,
                Some(_) => {
                    return Err(ConfigurationError::HandlerMismatch {
                        command: "scheduled task",
                        kind: A::KIND,
                    })
                }
                None => HashMap::new(),
            };
            let host: Arc<dyn AnyHost> =
                ActorHost::<A>::new(deps, config.clone(), handlers, reminders.clone());
            Ok(host)
        });
        self.actors.push((A::KIND, factory));
        self
    }

    /// Registers the event-sourced aggregate `T` backed by `store`.
    pub fn aggregate<T: EventSourced>(self, store: Arc<dyn EventStore<T::Event>>) -> Self {
        self.actor::<Aggregate<T>>(store)
    }

    /// Binds `handler` to command type `C`. One handler per command type.
    pub fn command<C, H>(mut self, handler: H) -> Self
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let type_id = TypeId::of::<C>();
        if self
            .commands
            .iter()
            .any(|(id, name, _)| *id == type_id || *name == C::NAME)
        {
            self.errors
                .push(ConfigurationError::DuplicateHandler { command: C::NAME });
            return self;
        }
        let handler: Arc<dyn CommandHandler<C>> = Arc::new(handler);
        let factory: RouteFactory = Box::new(move |hosts| {
            let kind = <C::Actor as Actor>::KIND;
            let host = hosts
                .get(kind)
                .cloned()
                .ok_or(ConfigurationError::ActorNotRegistered {
                    kind,
                    required_by: C::NAME,
                })?;
            let host = host
                .as_any()
                .downcast::<ActorHost<C::Actor>>()
                .map_err(|_| ConfigurationError::HandlerMismatch {
                    command: C::NAME,
                    kind,
                })?;
            let route: Arc<dyn Route> = Arc::new(LocalRoute::new(host, handler));
            Ok(route)
        });
        self.commands.push((type_id, C::NAME, factory));
        self
    }

    /// Registers a scheduled task handler for actor kind `A`.
    pub fn reminder<A, H>(mut self, handler: H) -> Self
    where
        A: Actor,
        H: ReminderHandler<A>,
    {
        let task = handler.task();
        if self.task_names.contains(&(A::KIND, task)) {
            self.errors.push(ConfigurationError::DuplicateTask {
                kind: A::KIND,
                task,
            });
            return self;
        }
        let (type_id, handlers) = self.tasks.entry(A::KIND).or_insert_with(|| {
            (
                TypeId::of::<A>(),
                Box::new(TaskHandlers::<A>::new()) as Box<dyn Any + Send>,
            )
        });
        match handlers.downcast_mut::<TaskHandlers<A>>() {
            Some(handlers) if *type_id == TypeId::of::<A>() => {
                handlers.insert(task, Arc::new(handler));
                self.task_names.push((A::KIND, task));
            }
            _ => self.errors.push(ConfigurationError::HandlerMismatch {
                command: task,
                kind: A::KIND,
            }),
        }
        self
    }

    /// Subscribes `handler` to notification type `N`. Any number of
    /// subscribers per type.
    pub fn subscribe<N, H>(mut self, handler: H) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        let handler: Arc<dyn NotificationHandler<N>> = Arc::new(handler);
        let subscriber: Arc<dyn Subscriber> = Arc::new(LocalSubscriber::new(handler));
        self.subscribers.push((TypeId::of::<N>(), subscriber));
        self
    }

    /// Replaces the default [`InMemoryReminderService`].
    pub fn reminders(mut self, reminders: Arc<dyn ReminderService>) -> Self {
        self.reminders = Some(reminders);
        self
    }

    /// Routes commands this node does not handle through `transport`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Runtime, ConfigurationError> {
        let RuntimeBuilder {
            config,
            actors,
            mut tasks,
            task_names,
            commands,
            subscribers,
            reminders,
            transport,
            errors,
        } = self;
        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }
        config.validate()?;

        let registered: HashSet<&'static str> = actors.iter().map(|(kind, _)| *kind).collect();
        if let Some((kind, task)) = task_names
            .iter()
            .copied()
            .find(|(kind, _)| !registered.contains(kind))
        {
            return Err(ConfigurationError::ActorNotRegistered {
                kind,
                required_by: task,
            });
        }

        let reminders: Arc<dyn ReminderService> =
            reminders.unwrap_or_else(|| Arc::new(InMemoryReminderService::new()));

        let mut hosts: HostTable = HashMap::new();
        for (kind, factory) in actors {
            hosts.insert(kind, factory(&mut tasks, &config, &reminders)?);
        }

        let mut routes = HashMap::new();
        let mut routes_by_name = HashMap::new();
        for (type_id, _, factory) in commands {
            let route = factory(&hosts)?;
            routes.insert(type_id, route.clone());
            routes_by_name.insert(route.command_name(), route);
        }

        let mut subscribers_by_type: HashMap<TypeId, Vec<Arc<dyn Subscriber>>> = HashMap::new();
        let mut subscribers_by_name: HashMap<&'static str, Vec<Arc<dyn Subscriber>>> =
            HashMap::new();
        for (type_id, subscriber) in subscribers {
            subscribers_by_name
                .entry(subscriber.notification_name())
                .or_default()
                .push(subscriber.clone());
            subscribers_by_type.entry(type_id).or_default().push(subscriber);
        }

        let mediator = Mediator::new(Arc::new(MediatorInner {
            config,
            routes,
            routes_by_name,
            subscribers: subscribers_by_type,
            subscribers_by_name,
            hosts,
            transport,
            stopped: AtomicBool::new(false),
        }));
        for host in mediator.inner().hosts.values() {
            host.bind(mediator.downgrade());
        }
        let sink: Weak<dyn ReminderSink> = Arc::downgrade(mediator.inner()) as Weak<dyn ReminderSink>;
        reminders.bind(sink);

        info!(
            node = %mediator.node(),
            actors = mediator.inner().hosts.len(),
            commands = mediator.inner().routes.len(),
            "Runtime built"
        );
        Ok(Runtime {
            mediator,
            reminders,
        })
    }
}

/// One node: its dispatch tables, hosts and reminder substrate.
pub struct Runtime {
    mediator: Mediator,
    reminders: Arc<dyn ReminderService>,
}

impl Runtime {
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    pub fn node(&self) -> &str {
        self.mediator.node()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.mediator.inner().config
    }

    pub fn reminders(&self) -> &Arc<dyn ReminderService> {
        &self.reminders
    }

    /// The host of actor kind `A`, if registered.
    pub fn host<A: Actor>(&self) -> Option<Arc<ActorHost<A>>> {
        self.mediator
            .inner()
            .hosts
            .get(A::KIND)?
            .clone()
            .as_any()
            .downcast::<ActorHost<A>>()
            .ok()
    }

    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, RuntimeError> {
        self.mediator.send(command).await
    }

    pub async fn publish<N: Notification>(&self, notification: N) -> Result<(), RuntimeError> {
        self.mediator.publish(notification).await
    }

    /// Delivers a reminder tick as the substrate would, activating the target
    /// if needed.
    pub async fn deliver_reminder(
        &self,
        target: &ActorId,
        key: ReminderKey,
    ) -> Result<(), RuntimeError> {
        let host = self.mediator.inner().hosts.get(target.kind()).ok_or_else(|| {
            TransportError::NoOwner {
                message: target.to_string(),
            }
        })?;
        host.deliver_reminder(target.key(), key).await
    }

    /// Deactivates every active actor. Durable reminders stay registered in
    /// the substrate, but this runtime ignores their ticks from now on.
    pub async fn shutdown(&self) {
        let inner = self.mediator.inner();
        inner.stopped.store(true, Ordering::SeqCst);
        for host in inner.hosts.values() {
            let stopped = host.shutdown().await;
            debug!(kind = host.kind(), stopped, "Host stopped");
        }
        info!(node = %self.node(), "Runtime stopped");
    }
}
