//! # Actor Cells
//!
//! This module holds the "server" side of the runtime: one [`ActorCell`] task
//! per active identity, processing its mailbox one envelope at a time.
//!
//! ## Concurrency Model
//!
//! Every envelope (a command, a timer tick, a reminder) is one **turn**. Turns
//! of the same identity never overlap, with one exception: a call whose origin
//! is the target itself is *interleaved*. It bypasses the mailbox and runs while
//! the turn that issued it is still in flight; queueing it would deadlock the
//! cell on itself. The interleave decision is made by the mediator from the
//! [`CallContext`]; the cell only carries it out.
//!
//! Because an interleaved turn touches the same actor while the outer turn is
//! suspended, the actor state sits behind a short-lived async mutex. Handlers
//! take it through [`Turn::actor`] and must drop the guard before awaiting a
//! send addressed to their own actor.
//!
//! ## Lifecycle
//!
//! 1. **Activate**: the host calls [`Actor::activate`] on the first message for
//!    an identity and spawns the cell.
//! 2. **Turns**: each turn ends with [`Actor::on_turn_complete`] on success or
//!    [`Actor::on_turn_aborted`] on failure.
//! 3. **Deactivate**: on request, idle timeout, shutdown, or after a failed
//!    commit. Local timers are cancelled; durable reminders stay registered and
//!    reactivate the actor when they fire.

use crate::config::RuntimeConfig;
use crate::context::CallContext;
use crate::error::{ConfigurationError, RuntimeError, SchedulerError};
use crate::handler::CommandHandler;
use crate::host::ActorHost;
use crate::identity::ActorId;
use crate::message::{Command, DeactivationReason, Envelope, Notification};
use crate::scheduler::{LocalTimers, ReminderKey, TaskKind, HEARTBEAT_PERIOD};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard};
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

type CellFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A unit of state addressed by [`ActorId`].
///
/// # Context Injection
///
/// `Deps` is handed to [`Actor::activate`] each time the actor is activated.
/// It is registered once with the [`RuntimeBuilder`](crate::RuntimeBuilder)
/// and cloned per activation, so it is typically a handful of `Arc`s.
#[async_trait]
pub trait Actor: Send + Sized + 'static {
    /// Kind part of the identity. Unique per runtime.
    const KIND: &'static str;

    type Deps: Clone + Send + Sync + 'static;

    async fn activate(
        id: &ActorId,
        deps: &Self::Deps,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError>;

    /// Runs after a handler succeeded. An error fails the call and
    /// deactivates the cell.
    async fn on_turn_complete(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Position to roll back to if the turn starting now fails.
    fn turn_checkpoint(&self) -> usize {
        0
    }

    /// Runs after a handler failed, with the checkpoint taken when its turn
    /// started. An interleaved turn shares the actor with the turn that
    /// called it, so only work done after `checkpoint` belongs to it.
    fn on_turn_aborted(&mut self, _checkpoint: usize) {}

    async fn on_deactivate(&mut self, _reason: DeactivationReason) {}
}

/// State shared between a cell's run loop, its interleaved turns and its timers.
pub(crate) struct CellShared<A: Actor> {
    id: ActorId,
    state: Mutex<A>,
    timers: LocalTimers,
    mailbox: mpsc::WeakSender<Envelope<A>>,
    poisoned: AtomicBool,
}

impl<A: Actor> CellShared<A> {
    pub(crate) fn id(&self) -> &ActorId {
        &self.id
    }

    /// Installs a local timer that posts a tick into this cell's mailbox.
    fn install_timer(&self, task: &str, due: Duration, period: Duration) -> Result<(), SchedulerError> {
        let mailbox = self.mailbox.clone();
        let name = task.to_string();
        self.timers
            .register(task, due, period, move |generation| {
                let mailbox = mailbox.clone();
                let task = name.clone();
                async move {
                    match mailbox.upgrade() {
                        Some(sender) => sender
                            .send(Envelope::Timer { task, generation })
                            .await
                            .is_ok(),
                        None => false,
                    }
                }
            })
            .map(|_| ())
    }

    fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }
}

/// The run loop of one activation.
pub(crate) struct ActorCell<A: Actor> {
    shared: Arc<CellShared<A>>,
    host: Arc<ActorHost<A>>,
    receiver: mpsc::Receiver<Envelope<A>>,
    idle_timeout: Option<Duration>,
}

impl<A: Actor> ActorCell<A> {
    /// Spawns the run loop for an already activated actor.
    pub(crate) fn spawn(id: ActorId, actor: A, host: Arc<ActorHost<A>>) -> ActorRef<A> {
        let (sender, receiver) = mpsc::channel(host.config().mailbox_capacity);
        let shared = Arc::new(CellShared {
            id: id.clone(),
            state: Mutex::new(actor),
            timers: LocalTimers::new(),
            mailbox: sender.downgrade(),
            poisoned: AtomicBool::new(false),
        });
        let cell = ActorCell {
            shared: shared.clone(),
            idle_timeout: host.config().idle_timeout,
            host,
            receiver,
        };
        tokio::spawn(cell.run());
        ActorRef {
            id,
            sender,
            cell: shared,
        }
    }

    fn run(mut self) -> CellFuture {
        Box::pin(async move {
            let (reason, ack) = loop {
                let next = match self.idle_timeout {
                    Some(idle) => match time::timeout(idle, self.receiver.recv()).await {
                        Ok(next) => next,
                        Err(_) => break (DeactivationReason::IdleTimeout, None),
                    },
                    None => self.receiver.recv().await,
                };
                match next {
                    Some(Envelope::Deactivate { reason, ack }) => break (reason, ack),
                    Some(envelope) => self.process(envelope).await,
                    None => break (DeactivationReason::Shutdown, None),
                }
                if self.shared.is_poisoned() {
                    break (DeactivationReason::CommitFailed, None);
                }
            };
            self.deactivate(reason, ack).await;
        })
    }

    async fn process(&self, envelope: Envelope<A>) {
        let id = &self.shared.id;
        match envelope {
            Envelope::Execute { job, context } => {
                let turn = self.turn(&context);
                job.run(&turn).await;
            }
            Envelope::Timer { task, generation } => {
                if self.shared.timers.is_current(&task, generation) {
                    self.turn(&CallContext::external())
                        .run_reminder(&task)
                        .await;
                } else {
                    debug!(actor = %id, task = %task, "Stale timer tick dropped");
                }
            }
            Envelope::Reminder { key } => match key.timer_period {
                Some(period) => {
                    if self.shared.timers.contains(&key.task) {
                        debug!(actor = %id, task = %key.task, "Heartbeat, timer alive");
                    } else {
                        match self.shared.install_timer(&key.task, period, period) {
                            Ok(()) => {
                                info!(actor = %id, task = %key.task, ?period, "Timer restored by heartbeat")
                            }
                            Err(error) => {
                                warn!(actor = %id, task = %key.task, %error, "Timer restore failed")
                            }
                        }
                    }
                }
                None => {
                    self.turn(&CallContext::external())
                        .run_reminder(&key.task)
                        .await;
                }
            },
            Envelope::Deactivate { ack, .. } => {
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    fn turn(&self, inbound: &CallContext) -> Turn<A> {
        Turn::new(self.shared.clone(), self.host.clone(), inbound, false)
    }

    async fn deactivate(mut self, reason: DeactivationReason, ack: Option<oneshot::Sender<()>>) {
        self.host.forget(&self.shared).await;
        self.receiver.close();
        self.shared.timers.cancel_all();
        self.shared.state.lock().await.on_deactivate(reason).await;

        // Queued commands and reminders go to the next activation, behind
        // anything that already reached it. Order across a deactivation is
        // not kept. Timer ticks belong to this activation's timers.
        let id = &self.shared.id;
        let mut acks: Vec<oneshot::Sender<()>> = ack.into_iter().collect();
        let mut requeued = 0usize;
        while let Ok(envelope) = self.receiver.try_recv() {
            match envelope {
                Envelope::Deactivate { ack, .. } => acks.extend(ack),
                envelope @ (Envelope::Execute { .. } | Envelope::Reminder { .. })
                    if reason != DeactivationReason::Shutdown =>
                {
                    self.host.requeue(id.key(), envelope).await;
                    requeued += 1;
                }
                Envelope::Execute { .. } => {
                    warn!(actor = %id, "Queued command dropped at shutdown");
                }
                Envelope::Reminder { key } => {
                    warn!(actor = %id, reminder = %key, "Queued reminder dropped at shutdown");
                }
                Envelope::Timer { task, .. } => {
                    debug!(actor = %id, task = %task, "Timer tick dropped with its activation");
                }
            }
        }
        info!(actor = %id, ?reason, requeued, "Deactivated");
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

/// Handle to a running cell, held by the host's directory.
pub(crate) struct ActorRef<A: Actor> {
    id: ActorId,
    sender: mpsc::Sender<Envelope<A>>,
    cell: Arc<CellShared<A>>,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            sender: self.sender.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn id(&self) -> &ActorId {
        &self.id
    }

    pub(crate) fn cell(&self) -> Arc<CellShared<A>> {
        self.cell.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) fn shares_cell(&self, cell: &Arc<CellShared<A>>) -> bool {
        Arc::ptr_eq(&self.cell, cell)
    }

    /// Queues an envelope, waiting for mailbox capacity. Hands the envelope
    /// back if the cell has stopped accepting messages.
    pub(crate) async fn post(&self, envelope: Envelope<A>) -> Result<(), Envelope<A>> {
        match self.sender.reserve().await {
            Ok(permit) => {
                permit.send(envelope);
                Ok(())
            }
            Err(_) => Err(envelope),
        }
    }

    /// Requests deactivation and waits until it finished. Returns `false` if
    /// the cell was already gone.
    pub(crate) async fn deactivate(&self, reason: DeactivationReason) -> bool {
        let (ack, done) = oneshot::channel();
        let envelope = Envelope::Deactivate {
            reason,
            ack: Some(ack),
        };
        if self.post(envelope).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }
}

/// What a handler sees of its actor during one turn.
///
/// Outbound [`send`](Turn::send) and [`publish`](Turn::publish) calls are
/// stamped with this actor as origin and keep the inbound correlation id.
pub struct Turn<A: Actor> {
    cell: Arc<CellShared<A>>,
    host: Arc<ActorHost<A>>,
    caller: Option<ActorId>,
    outbound: CallContext,
    interleaved: bool,
}

impl<A: Actor> Turn<A> {
    pub(crate) fn new(
        cell: Arc<CellShared<A>>,
        host: Arc<ActorHost<A>>,
        inbound: &CallContext,
        interleaved: bool,
    ) -> Self {
        let outbound = CallContext::from_actor(cell.id.clone(), inbound.correlation_id());
        Self {
            caller: inbound.origin().cloned(),
            cell,
            host,
            outbound,
            interleaved,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.cell.id
    }

    /// Actor that sent the message being handled, `None` for external callers
    /// and scheduled tasks.
    pub fn caller(&self) -> Option<&ActorId> {
        self.caller.as_ref()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.outbound.correlation_id()
    }

    /// Whether this turn bypassed the mailbox because the actor called itself.
    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    /// Locks the actor state. Drop the guard before awaiting a self-send.
    pub async fn actor(&self) -> MutexGuard<'_, A> {
        self.cell.state.lock().await
    }

    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, RuntimeError> {
        self.host
            .mediator()?
            .send_with(self.outbound.clone(), command)
            .await
    }

    pub async fn publish<N: Notification>(&self, notification: N) -> Result<(), RuntimeError> {
        self.host
            .mediator()?
            .publish_with(self.outbound.clone(), notification)
            .await
    }

    /// Schedules `task` to run every `period`, first after `due`.
    ///
    /// Replaces any earlier schedule of the same task. Periods under
    /// [`HEARTBEAT_PERIOD`] run on a local timer backed by a durable heartbeat,
    /// longer ones on a durable reminder.
    pub async fn schedule(
        &self,
        task: &str,
        due: Duration,
        period: Duration,
    ) -> Result<(), RuntimeError> {
        if !self.host.has_task(task) {
            return Err(ConfigurationError::UnknownTask {
                kind: A::KIND,
                task: task.to_string(),
            }
            .into());
        }
        if period.is_zero() {
            return Err(SchedulerError::InvalidPeriod {
                task: task.to_string(),
            }
            .into());
        }
        let id = self.id();
        self.clear_schedule(task).await?;

        let kind = TaskKind::classify(period);
        let reminders = self.host.reminders();
        match kind {
            TaskKind::Timer => {
                self.cell.install_timer(task, due, period)?;
                reminders
                    .register_or_update(
                        id,
                        ReminderKey::heartbeat(task, period),
                        HEARTBEAT_PERIOD,
                        HEARTBEAT_PERIOD,
                    )
                    .await?;
            }
            TaskKind::Reminder => {
                reminders
                    .register_or_update(id, ReminderKey::durable(task), due, period)
                    .await?;
            }
        }
        info!(actor = %id, task, ?due, ?period, ?kind, "Scheduled");
        Ok(())
    }

    /// Cancels `task` in both mechanisms. Unknown tasks are ignored.
    pub async fn unschedule(&self, task: &str) -> Result<(), RuntimeError> {
        self.clear_schedule(task).await?;
        debug!(actor = %self.id(), task, "Unscheduled");
        Ok(())
    }

    /// Names of the local timers installed on this activation.
    pub fn local_timers(&self) -> Vec<String> {
        self.cell.timers.names()
    }

    async fn clear_schedule(&self, task: &str) -> Result<(), RuntimeError> {
        let id = self.id();
        let reminders = self.host.reminders();
        self.cell.timers.cancel(task);
        for key in reminders.list(id).await? {
            if key.task == task {
                reminders.cancel(id, &key).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn run_command<C>(
        &self,
        handler: &dyn CommandHandler<C>,
        command: C,
    ) -> Result<C::Output, RuntimeError>
    where
        C: Command<Actor = A>,
    {
        debug!(actor = %self.id(), command = C::NAME, interleaved = self.interleaved, "Turn");
        let checkpoint = self.checkpoint().await;
        let result = handler
            .handle(self, command)
            .await
            .map_err(RuntimeError::Handler);
        self.finish(C::NAME, checkpoint, result).await
    }

    pub(crate) async fn run_reminder(&self, task: &str) {
        let Some(handler) = self.host.task(task) else {
            warn!(actor = %self.id(), task, "No handler for scheduled task");
            return;
        };
        let checkpoint = self.checkpoint().await;
        let result = handler.handle(self).await.map_err(RuntimeError::Handler);
        match self.finish(task, checkpoint, result).await {
            Ok(()) => debug!(actor = %self.id(), task, "Scheduled task ran"),
            Err(error) => warn!(actor = %self.id(), task, %error, "Scheduled task failed"),
        }
    }

    async fn checkpoint(&self) -> usize {
        self.cell.state.lock().await.turn_checkpoint()
    }

    async fn finish<T: Send>(
        &self,
        label: &str,
        checkpoint: usize,
        result: Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let mut actor = self.cell.state.lock().await;
        match result {
            Ok(value) => match actor.on_turn_complete().await {
                Ok(()) => Ok(value),
                Err(error) => {
                    warn!(actor = %self.id(), label, %error, "Commit failed, deactivating");
                    self.cell.poison();
                    Err(error)
                }
            },
            Err(error) => {
                debug!(actor = %self.id(), label, %error, "Turn failed");
                actor.on_turn_aborted(checkpoint);
                Err(error)
            }
        }
    }
}
