//! Owner of all guard state and its periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{ActionCooldownManager, ActionRateLimiter, StateConflictGuard};
use crate::time::{Clock, SystemClock};

/// Windows and retention used by a [`GuardContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSettings {
    /// Rate limiter window shared by all actions.
    pub rate_limit_window: Duration,
    /// Cooldown for actions without an override.
    pub default_cooldown: Duration,
    /// Per-action cooldown overrides.
    pub cooldowns: HashMap<String, Duration>,
    /// Idle time after which entries are evicted.
    pub retention: Duration,
}

impl GuardSettings {
    /// Default rate limiter window.
    pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);
    /// Default action cooldown.
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);
    /// Default retention.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60);
    /// Default interval between sweeps.
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            rate_limit_window: Self::DEFAULT_RATE_LIMIT_WINDOW,
            default_cooldown: Self::DEFAULT_COOLDOWN,
            cooldowns: HashMap::new(),
            retention: Self::DEFAULT_RETENTION,
        }
    }
}

/// Entries evicted by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rate limiter entries removed.
    pub rate_limits: usize,
    /// Cooldown entries removed.
    pub cooldowns: usize,
    /// Active flows removed.
    pub flows: usize,
}

impl SweepReport {
    /// Total entries removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.rate_limits + self.cooldowns + self.flows
    }
}

/// All per-user guard state, constructed explicitly and shared by handle.
///
/// Nothing here is persisted; losing it on restart only resets short UI
/// cooldowns.
#[derive(Debug)]
pub struct GuardContext<C = SystemClock> {
    clock: C,
    retention: Duration,
    rate_limiter: ActionRateLimiter<C>,
    cooldowns: ActionCooldownManager<C>,
    conflicts: StateConflictGuard<C>,
}

impl GuardContext<SystemClock> {
    /// Creates a context on the system clock.
    #[must_use]
    pub fn new(settings: GuardSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock + Clone> GuardContext<C> {
    /// Creates a context whose guards all read `clock`.
    #[must_use]
    pub fn with_clock(settings: GuardSettings, clock: C) -> Self {
        let cooldowns = settings.cooldowns.into_iter().fold(
            ActionCooldownManager::with_clock(settings.default_cooldown, clock.clone()),
            |manager, (action, duration)| manager.with_override(action, duration),
        );

        Self {
            rate_limiter: ActionRateLimiter::with_clock(settings.rate_limit_window, clock.clone()),
            cooldowns,
            conflicts: StateConflictGuard::with_clock(clock.clone()),
            retention: settings.retention,
            clock,
        }
    }
}

impl<C: Clock> GuardContext<C> {
    /// The anti double-tap limiter.
    #[must_use]
    pub const fn rate_limiter(&self) -> &ActionRateLimiter<C> {
        &self.rate_limiter
    }

    /// The per-action cooldown manager.
    #[must_use]
    pub const fn cooldowns(&self) -> &ActionCooldownManager<C> {
        &self.cooldowns
    }

    /// The flow conflict guard.
    #[must_use]
    pub const fn conflicts(&self) -> &StateConflictGuard<C> {
        &self.conflicts
    }

    /// Evicts idle entries from every guard as of `now`.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let report = SweepReport {
            rate_limits: self.rate_limiter.sweep(now, self.retention),
            cooldowns: self.cooldowns.sweep(now, self.retention),
            flows: self.conflicts.sweep(now, self.retention),
        };
        if report.total() > 0 {
            tracing::debug!("Guard sweep evicted {} entries: {report:?}", report.total());
        }
        report
    }
}

impl<C: Clock + 'static> GuardContext<C> {
    /// Spawns a task that sweeps every `interval` until the handle is
    /// stopped or dropped.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let context = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        context.sweep(context.clock.instant());
                    }
                }
            }
        });

        SweepHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running sweeper. Dropping it aborts the task.
#[derive(Debug)]
pub struct SweepHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stops the sweeper and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
