//! # Actor Host
//!
//! One [`ActorHost`] per registered actor kind. It owns the activation
//! directory for that kind (key to running cell), activates actors on their
//! first message, and is the only place that decides whether a command is
//! queued or runs interleaved.

use crate::actor::{Actor, ActorCell, ActorRef, CellShared, Turn};
use crate::config::RuntimeConfig;
use crate::context::CallContext;
use crate::error::RuntimeError;
use crate::handler::{CommandHandler, ReminderHandler};
use crate::identity::ActorId;
use crate::mediator::{Mediator, WeakMediator};
use crate::message::{Command, CommandJob, DeactivationReason, Envelope};
use crate::scheduler::{ReminderKey, ReminderService};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Activation slot of one key. Held while activating, so concurrent first
/// messages to a key wait for a single activation.
type Slot<A> = Arc<tokio::sync::Mutex<Option<ActorRef<A>>>>;

pub struct ActorHost<A: Actor> {
    deps: A::Deps,
    config: RuntimeConfig,
    tasks: HashMap<&'static str, Arc<dyn ReminderHandler<A>>>,
    reminders: Arc<dyn ReminderService>,
    mediator: OnceLock<WeakMediator>,
    directory: Mutex<HashMap<String, Slot<A>>>,
    this: Weak<Self>,
}

impl<A: Actor> ActorHost<A> {
    pub(crate) fn new(
        deps: A::Deps,
        config: RuntimeConfig,
        tasks: HashMap<&'static str, Arc<dyn ReminderHandler<A>>>,
        reminders: Arc<dyn ReminderService>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            deps,
            config,
            tasks,
            reminders,
            mediator: OnceLock::new(),
            directory: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn kind(&self) -> &'static str {
        A::KIND
    }

    /// Number of currently active identities of this kind.
    pub async fn active_count(&self) -> usize {
        let mut count = 0;
        for slot in self.slots() {
            if slot.lock().await.as_ref().is_some_and(|actor| !actor.is_closed()) {
                count += 1;
            }
        }
        count
    }

    pub async fn is_active(&self, key: &str) -> bool {
        self.running(key).await.is_some()
    }

    /// Deactivates `key` and waits until it finished. Returns `false` if it
    /// was not active.
    pub async fn deactivate(&self, key: &str) -> bool {
        match self.running(key).await {
            Some(actor) => actor.deactivate(DeactivationReason::Explicit).await,
            None => false,
        }
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn reminders(&self) -> &Arc<dyn ReminderService> {
        &self.reminders
    }

    pub(crate) fn has_task(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }

    pub(crate) fn task(&self, task: &str) -> Option<Arc<dyn ReminderHandler<A>>> {
        self.tasks.get(task).cloned()
    }

    pub(crate) fn mediator(&self) -> Result<Mediator, RuntimeError> {
        self.mediator
            .get()
            .and_then(WeakMediator::upgrade)
            .ok_or(RuntimeError::ActorClosed)
    }

    fn this(&self) -> Result<Arc<Self>, RuntimeError> {
        self.this.upgrade().ok_or(RuntimeError::ActorClosed)
    }

    fn directory(&self) -> MutexGuard<'_, HashMap<String, Slot<A>>> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slots(&self) -> Vec<Slot<A>> {
        self.directory().values().cloned().collect()
    }

    /// The live cell of `key`, without activating it.
    async fn running(&self, key: &str) -> Option<ActorRef<A>> {
        let slot = self.directory().get(key).cloned()?;
        let actor = slot.lock().await;
        actor.as_ref().filter(|actor| !actor.is_closed()).cloned()
    }

    /// Returns the running cell for `key`, activating it if needed.
    ///
    /// Only the key's own slot is locked while the actor activates; other
    /// keys of this kind activate in parallel.
    pub(crate) async fn get_or_activate(&self, key: &str) -> Result<ActorRef<A>, RuntimeError> {
        let slot = self.directory().entry(key.to_string()).or_default().clone();
        let mut current = slot.lock().await;
        if let Some(actor) = current.as_ref().filter(|actor| !actor.is_closed()) {
            return Ok(actor.clone());
        }
        let id = ActorId::new(A::KIND, key);
        let activated = A::activate(&id, &self.deps, &self.config).await;
        let actor = match activated {
            Ok(actor) => actor,
            Err(error) => {
                warn!(actor = %id, %error, "Activation failed");
                drop(current);
                self.release_slot(key, &slot);
                return Err(error);
            }
        };
        let actor_ref = ActorCell::spawn(id, actor, self.this()?);
        info!(actor = %actor_ref.id(), node = %self.config.node_name, "Activated");
        *current = Some(actor_ref.clone());
        Ok(actor_ref)
    }

    /// Clears the slot of `cell` unless a newer activation replaced it.
    pub(crate) async fn forget(&self, cell: &Arc<CellShared<A>>) {
        let key = cell.id().key();
        let Some(slot) = self.directory().get(key).cloned() else {
            return;
        };
        {
            let mut current = slot.lock().await;
            if current.as_ref().is_some_and(|actor| actor.shares_cell(cell)) {
                *current = None;
            }
        }
        self.release_slot(key, &slot);
    }

    /// Drops an empty slot from the directory once nobody else holds it.
    /// New holders only clone slots under the directory lock, so the count
    /// cannot grow while it is checked.
    fn release_slot(&self, key: &str, slot: &Slot<A>) {
        let mut directory = self.directory();
        let unused = directory.get(key).is_some_and(|held| {
            Arc::ptr_eq(held, slot)
                && Arc::strong_count(slot) == 2
                && slot.try_lock().is_ok_and(|current| current.is_none())
        });
        if unused {
            directory.remove(key);
        }
    }

    /// Runs `command` as one turn of its target.
    ///
    /// With `interleave` the turn starts immediately on the running cell,
    /// otherwise it waits in the mailbox behind earlier turns.
    pub(crate) async fn execute<C>(
        &self,
        context: CallContext,
        command: C,
        handler: Arc<dyn CommandHandler<C>>,
        interleave: bool,
    ) -> Result<C::Output, RuntimeError>
    where
        C: Command<Actor = A>,
    {
        let key = command.actor_key();
        if interleave {
            let actor = self.get_or_activate(&key).await?;
            debug!(actor = %actor.id(), command = C::NAME, "Interleaved");
            let turn = Turn::new(actor.cell(), self.this()?, &context, true);
            return turn.run_command(handler.as_ref(), command).await;
        }

        let (respond_to, response) = oneshot::channel();
        let mut envelope = Envelope::Execute {
            job: Box::new(CommandJob {
                handler,
                command,
                respond_to,
            }),
            context,
        };
        // A cell may close between lookup and send; the second attempt goes to
        // a fresh activation.
        for _ in 0..2 {
            let actor = self.get_or_activate(&key).await?;
            match actor.post(envelope).await {
                Ok(()) => return response.await.map_err(|_| RuntimeError::ActorDropped)?,
                Err(returned) => {
                    debug!(actor = %actor.id(), "Mailbox closed, reactivating");
                    self.forget(&actor.cell()).await;
                    envelope = returned;
                }
            }
        }
        Err(RuntimeError::ActorClosed)
    }

    /// Hands an envelope drained from a deactivated cell to a new activation.
    pub(crate) async fn requeue(&self, key: &str, envelope: Envelope<A>) {
        let posted = match self.get_or_activate(key).await {
            Ok(actor) => actor.post(envelope).await.is_ok(),
            Err(_) => false,
        };
        if !posted {
            warn!(kind = A::KIND, key, "Queued message dropped during deactivation");
        }
    }

    async fn deliver(&self, key: &str, reminder: ReminderKey) -> Result<(), RuntimeError> {
        let mut envelope = Envelope::Reminder { key: reminder };
        for _ in 0..2 {
            let actor = self.get_or_activate(key).await?;
            match actor.post(envelope).await {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    self.forget(&actor.cell()).await;
                    envelope = returned;
                }
            }
        }
        Err(RuntimeError::ActorClosed)
    }

    async fn deactivate_all(&self, reason: DeactivationReason) -> usize {
        let mut actors = Vec::new();
        for slot in self.slots() {
            actors.extend(slot.lock().await.clone());
        }
        let mut stopped = 0;
        for actor in actors {
            if actor.deactivate(reason).await {
                stopped += 1;
            }
        }
        stopped
    }
}

/// Type-erased view of an [`ActorHost`] held by the mediator.
#[async_trait]
pub(crate) trait AnyHost: Send + Sync {
    fn kind(&self) -> &'static str;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn bind(&self, mediator: WeakMediator);

    /// Activates `key` if needed and queues the reminder tick.
    async fn deliver_reminder(&self, key: &str, reminder: ReminderKey) -> Result<(), RuntimeError>;

    async fn shutdown(&self) -> usize;
}

#[async_trait]
impl<A: Actor> AnyHost for ActorHost<A> {
    fn kind(&self) -> &'static str {
        A::KIND
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn bind(&self, mediator: WeakMediator) {
        if self.mediator.set(mediator).is_err() {
            warn!(kind = A::KIND, "Host already bound to a mediator");
        }
    }

    async fn deliver_reminder(&self, key: &str, reminder: ReminderKey) -> Result<(), RuntimeError> {
        self.deliver(key, reminder).await
    }

    async fn shutdown(&self) -> usize {
        self.deactivate_all(DeactivationReason::Shutdown).await
    }
}
