//! # Scheduling
//!
//! Actors schedule work through one call, [`Turn::schedule`](crate::Turn::schedule),
//! and the runtime picks the mechanism from the period:
//!
//! | Period | Mechanism | Survives deactivation |
//! |--------|-----------|-----------------------|
//! | `< 5 min` | [`LocalTimers`] tick + 5 min heartbeat reminder | via heartbeat |
//! | `>= 5 min` | durable reminder only | yes |
//!
//! Local timers are cheap and precise but die with the activation. Durable
//! reminders survive restarts but are coarse. The heartbeat ties the two
//! together: every [`HEARTBEAT_PERIOD`] the substrate delivers a reminder whose
//! key carries the requested timer period, and if the activation no longer has
//! the local timer it is re-created.
//!
//! ## Reminder keys
//!
//! A durable reminder is named by a structured [`ReminderKey`] instead of a
//! delimiter-encoded string, so task names may contain any character and a
//! heartbeat is recognised without parsing.

use crate::error::SchedulerError;
use crate::identity::ActorId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Period of the durable heartbeat that keeps short timers alive, and the
/// threshold at or above which a task becomes a durable reminder.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Mechanism chosen for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Timer,
    Reminder,
}

impl TaskKind {
    pub fn classify(period: Duration) -> Self {
        if period < HEARTBEAT_PERIOD {
            TaskKind::Timer
        } else {
            TaskKind::Reminder
        }
    }
}

/// Name of a durable reminder within one actor's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub task: String,
    /// `Some(period)` marks the heartbeat of a local timer with that period.
    pub timer_period: Option<Duration>,
}

impl ReminderKey {
    pub fn heartbeat(task: impl Into<String>, timer_period: Duration) -> Self {
        Self {
            task: task.into(),
            timer_period: Some(timer_period),
        }
    }

    pub fn durable(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            timer_period: None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.timer_period.is_some()
    }
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timer_period {
            Some(period) => write!(f, "{} (heartbeat for {:?} timer)", self.task, period),
            None => f.write_str(&self.task),
        }
    }
}

/// Receives reminder ticks from a [`ReminderService`]. Implemented by the runtime.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn deliver(&self, target: ActorId, key: ReminderKey);
}

/// Durable periodic callback substrate.
///
/// Reminders are keyed by `(target, key)`; registering an existing key replaces
/// its schedule. Ticks are delivered to the sink passed to [`ReminderService::bind`],
/// which activates the target actor if it is not active.
#[async_trait]
pub trait ReminderService: Send + Sync {
    async fn register_or_update(
        &self,
        target: &ActorId,
        key: ReminderKey,
        due: Duration,
        period: Duration,
    ) -> Result<(), SchedulerError>;

    /// Cancelling an unknown reminder succeeds.
    async fn cancel(&self, target: &ActorId, key: &ReminderKey) -> Result<(), SchedulerError>;

    async fn list(&self, target: &ActorId) -> Result<Vec<ReminderKey>, SchedulerError>;

    fn bind(&self, sink: Weak<dyn ReminderSink>);
}

type SinkSlot = Arc<RwLock<Option<Weak<dyn ReminderSink>>>>;

/// In-process reminder substrate backed by tokio interval tasks.
///
/// Reminders outlive actor activations but not the process.
pub struct InMemoryReminderService {
    sink: SinkSlot,
    reminders: Mutex<HashMap<(ActorId, ReminderKey), JoinHandle<()>>>,
}

impl Default for InMemoryReminderService {
    fn default() -> Self {
        Self {
            sink: Arc::new(RwLock::new(None)),
            reminders: Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryReminderService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(ActorId, ReminderKey), JoinHandle<()>>> {
        self.reminders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReminderService for InMemoryReminderService {
    async fn register_or_update(
        &self,
        target: &ActorId,
        key: ReminderKey,
        due: Duration,
        period: Duration,
    ) -> Result<(), SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::InvalidPeriod { task: key.task });
        }
        let sink = self.sink.clone();
        let tick_target = target.clone();
        let tick_key = key.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + due, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let current = sink
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                    .and_then(Weak::upgrade);
                match current {
                    Some(sink) => sink.deliver(tick_target.clone(), tick_key.clone()).await,
                    None => debug!(actor = %tick_target, reminder = %tick_key, "No sink bound, tick dropped"),
                }
            }
        });
        debug!(actor = %target, reminder = %key, ?due, ?period, "Reminder registered");
        if let Some(previous) = self.lock().insert((target.clone(), key), handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn cancel(&self, target: &ActorId, key: &ReminderKey) -> Result<(), SchedulerError> {
        if let Some(handle) = self.lock().remove(&(target.clone(), key.clone())) {
            handle.abort();
            debug!(actor = %target, reminder = %key, "Reminder cancelled");
        }
        Ok(())
    }

    async fn list(&self, target: &ActorId) -> Result<Vec<ReminderKey>, SchedulerError> {
        Ok(self
            .lock()
            .keys()
            .filter(|(owner, _)| owner == target)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn bind(&self, sink: Weak<dyn ReminderSink>) {
        let mut slot = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Reminder service rebound to a new sink");
        }
        *slot = Some(sink);
    }
}

impl Drop for InMemoryReminderService {
    fn drop(&mut self) {
        for (_, handle) in self.lock().drain() {
            handle.abort();
        }
    }
}

/// Named in-memory timers owned by one activation.
///
/// Each timer is a tokio task calling `on_tick` on every period. The callback
/// returns `false` once the activation is gone, which ends the task. Cancelling
/// aborts the task before returning.
///
/// Every registration gets a new generation number, passed to `on_tick`. A
/// tick that was already in flight when its timer was replaced carries the old
/// generation and can be recognised with [`LocalTimers::is_current`].
#[derive(Default)]
pub struct LocalTimers {
    timers: Mutex<HashMap<String, LocalTimer>>,
    generations: AtomicU64,
}

struct LocalTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl LocalTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `name`, replacing any timer of the same name. Returns the
    /// generation of the new timer.
    pub fn register<F, Fut>(
        &self,
        name: &str,
        due: Duration,
        period: Duration,
        mut on_tick: F,
    ) -> Result<u64, SchedulerError>
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if period.is_zero() {
            return Err(SchedulerError::InvalidPeriod {
                task: name.to_string(),
            });
        }
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + due, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if !on_tick(generation).await {
                    break;
                }
            }
        });
        let timer = LocalTimer { generation, handle };
        if let Some(previous) = self.lock().insert(name.to_string(), timer) {
            previous.handle.abort();
        }
        Ok(generation)
    }

    /// Returns whether a timer was installed under `name`.
    pub fn cancel(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Whether `generation` is the live timer installed under `name`.
    pub fn is_current(&self, name: &str, generation: u64) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|timer| timer.generation == generation && !timer.handle.is_finished())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn cancel_all(&self) {
        for (_, timer) in self.lock().drain() {
            timer.handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocalTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LocalTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        delivered: Mutex<Vec<(ActorId, ReminderKey)>>,
    }

    #[async_trait]
    impl ReminderSink for CountingSink {
        async fn deliver(&self, target: ActorId, key: ReminderKey) {
            self.delivered.lock().unwrap().push((target, key));
        }
    }

    #[test]
    fn classify_splits_at_heartbeat_period() {
        assert_eq!(TaskKind::classify(Duration::from_secs(30)), TaskKind::Timer);
        assert_eq!(
            TaskKind::classify(Duration::from_secs(299)),
            TaskKind::Timer
        );
        assert_eq!(TaskKind::classify(HEARTBEAT_PERIOD), TaskKind::Reminder);
        assert_eq!(
            TaskKind::classify(Duration::from_secs(3600)),
            TaskKind::Reminder
        );
    }

    #[test]
    fn heartbeat_keys_carry_the_timer_period() {
        let key = ReminderKey::heartbeat("flush:now", Duration::from_secs(30));
        assert!(key.is_heartbeat());
        assert_eq!(key.task, "flush:now");
        assert!(!ReminderKey::durable("flush:now").is_heartbeat());
        assert_ne!(key, ReminderKey::durable("flush:now"));
    }

    #[tokio::test(start_paused = true)]
    async fn local_timer_ticks_until_cancelled() {
        let timers = LocalTimers::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        timers
            .register(
                "poll",
                Duration::from_secs(10),
                Duration::from_secs(10),
                move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        true
                    }
                },
            )
            .unwrap();
        assert!(timers.contains("poll"));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(timers.cancel("poll"));
        assert!(!timers.cancel("poll"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(timers.names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn local_timer_stops_when_callback_declines() {
        let timers = LocalTimers::new();
        timers
            .register("once", Duration::ZERO, Duration::from_secs(1), |_| async {
                false
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!timers.contains("once"));
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_timer_retires_its_generation() {
        let timers = LocalTimers::new();
        let period = Duration::from_secs(10);
        let first = timers.register("poll", period, period, |_| async { true }).unwrap();
        assert!(timers.is_current("poll", first));

        let second = timers.register("poll", period, period, |_| async { true }).unwrap();
        assert_ne!(first, second);
        assert!(!timers.is_current("poll", first));
        assert!(timers.is_current("poll", second));

        timers.cancel("poll");
        assert!(!timers.is_current("poll", second));
    }

    #[test]
    fn zero_period_is_rejected() {
        let timers = LocalTimers::new();
        let result = timers.register("spin", Duration::ZERO, Duration::ZERO, |_| async { true });
        assert_eq!(
            result,
            Err(SchedulerError::InvalidPeriod {
                task: "spin".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reminders_deliver_to_the_bound_sink() {
        let service = InMemoryReminderService::new();
        let sink = Arc::new(CountingSink {
            delivered: Mutex::new(Vec::new()),
        });
        let weak: Weak<dyn ReminderSink> = Arc::downgrade(&sink) as Weak<dyn ReminderSink>;
        service.bind(weak);

        let target = ActorId::new("Cart", "1");
        let key = ReminderKey::durable("expire");
        service
            .register_or_update(
                &target,
                key.clone(),
                Duration::from_secs(60),
                HEARTBEAT_PERIOD,
            )
            .await
            .unwrap();
        assert_eq!(service.list(&target).await.unwrap(), vec![key.clone()]);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);

        service.cancel(&target, &key).await.unwrap();
        service.cancel(&target, &key).await.unwrap();
        assert!(service.list(&target).await.unwrap().is_empty());

        tokio::time::sleep(HEARTBEAT_PERIOD * 2).await;
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }
}
