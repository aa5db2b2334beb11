//! Per-user monitoring cycles.

use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use super::{
    MonitoredEndpoint, NotificationCooldown, Observation, Probe, Reachability,
    StabilizationPolicy, TrackerError,
};
use crate::address;
use crate::notify::{Notification, Notifier};
use crate::state::{EndpointRecord, EndpointRecords, EndpointStore};
use crate::time::{Clock, SystemClock};

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;

/// Time budgets and policies used by [`EndpointTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Upper bound for one probe call.
    pub probe_timeout: Duration,
    /// Upper bound for one dispatch, retries included.
    pub notify_timeout: Duration,
    /// Upper bound for one store write.
    pub persist_timeout: Duration,
    /// Stabilization window policy.
    pub stabilization: StabilizationPolicy,
    /// Minimum spacing between notifications.
    pub cooldown: NotificationCooldown,
}

impl TrackerSettings {
    /// Default probe budget.
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default dispatch budget.
    pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default store write budget.
    pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,
            notify_timeout: Self::DEFAULT_NOTIFY_TIMEOUT,
            persist_timeout: Self::DEFAULT_PERSIST_TIMEOUT,
            stabilization: StabilizationPolicy::default(),
            cooldown: NotificationCooldown::default(),
        }
    }
}

/// What happened to an owed notification during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing was owed.
    NotDue,
    /// Owed, but the cooldown has not expired yet.
    Suppressed {
        /// Time left on the cooldown.
        remaining: Duration,
    },
    /// Delivered; the cooldown clock restarted.
    Sent(Reachability),
    /// Delivery was attempted and failed. It stays owed.
    Failed,
}

/// Result of [`EndpointTracker::run_cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A previous cycle for the same user is still running.
    Skipped,
    /// The probe failed or timed out. Nothing changed.
    ProbeFailed,
    /// The endpoint was removed or re-addressed while probing; the reading
    /// was dropped.
    Discarded,
    /// The reading was applied.
    Completed {
        /// Effect of the reading on the state machine.
        observation: Observation,
        /// Effect on notification delivery.
        dispatch: Dispatch,
    },
}

/// Owns every monitored endpoint and runs their poll cycles.
///
/// The in-memory map is authoritative. The store is written after each
/// cycle that changed an entry; a failed write marks the user dirty and is
/// retried on the next cycle or by [`EndpointTracker::flush_all`].
///
/// At most one cycle per user runs at a time; an overlapping call returns
/// [`CycleOutcome::Skipped`] instead of queueing.
///
/// # Type Parameters
///
/// - `P`: reachability probe
/// - `N`: notification transport
/// - `S`: durable store
/// - `C`: clock (defaults to [`SystemClock`])
#[derive(Debug)]
pub struct EndpointTracker<P, N, S, C = SystemClock> {
    probe: P,
    notifier: N,
    store: S,
    clock: C,
    settings: TrackerSettings,
    endpoints: DashMap<String, MonitoredEndpoint>,
    in_flight: DashSet<String>,
    dirty: DashSet<String>,
}

/// Marks a user's cycle as running until dropped.
struct CycleSlot<'a> {
    in_flight: &'a DashSet<String>,
    user_id: &'a str,
}

impl Drop for CycleSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.user_id);
    }
}

/// Notification decision taken while the entry is locked.
enum Owed {
    NotDue,
    Suppressed(Duration),
    Due(Notification),
}

impl<P, N, S> EndpointTracker<P, N, S, SystemClock> {
    /// Creates an empty tracker on the system clock with default settings.
    #[must_use]
    pub fn new(probe: P, notifier: N, store: S) -> Self {
        Self {
            probe,
            notifier,
            store,
            clock: SystemClock,
            settings: TrackerSettings::default(),
            endpoints: DashMap::new(),
            in_flight: DashSet::new(),
            dirty: DashSet::new(),
        }
    }
}

impl<P, N, S, C> EndpointTracker<P, N, S, C> {
    /// Replaces the clock.
    #[must_use]
    pub fn with_clock<C2>(self, clock: C2) -> EndpointTracker<P, N, S, C2> {
        EndpointTracker {
            probe: self.probe,
            notifier: self.notifier,
            store: self.store,
            clock,
            settings: self.settings,
            endpoints: self.endpoints,
            in_flight: self.in_flight,
            dirty: self.dirty,
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: TrackerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Returns the probe.
    #[must_use]
    pub const fn probe(&self) -> &P {
        &self.probe
    }

    /// Returns the notifier.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns every monitored user id, sorted.
    #[must_use]
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of monitored endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns true if nothing is monitored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Returns a copy of one user's endpoint.
    #[must_use]
    pub fn snapshot(&self, user_id: &str) -> Option<MonitoredEndpoint> {
        self.endpoints.get(user_id).map(|e| e.value().clone())
    }

    /// Loads persisted endpoints, returning how many were accepted.
    ///
    /// Records whose address no longer validates are skipped. Entries
    /// already in memory are left untouched.
    pub fn restore(&self, records: EndpointRecords) -> usize {
        let mut restored = 0;
        for (user_id, record) in records {
            if let Err(reason) = address::validate(&record.address) {
                tracing::warn!(
                    "Skipping persisted endpoint for {user_id} ({}): {}",
                    record.address,
                    reason.reason()
                );
                continue;
            }
            if let Entry::Vacant(slot) = self.endpoints.entry(user_id) {
                slot.insert(MonitoredEndpoint::from(record));
                restored += 1;
            }
        }
        restored
    }

    fn claim<'a>(&'a self, user_id: &'a str) -> Option<CycleSlot<'a>> {
        if !self.in_flight.insert(user_id.to_string()) {
            return None;
        }
        Some(CycleSlot {
            in_flight: &self.in_flight,
            user_id,
        })
    }
}

impl<P, N, S, C> EndpointTracker<P, N, S, C>
where
    P: Probe,
    N: Notifier,
    S: EndpointStore,
    C: Clock,
{
    /// Runs one poll cycle for a user.
    ///
    /// Probe, dispatch and persistence each run under their own timeout.
    /// State bookkeeping is always committed, even when the dispatch is
    /// suppressed or fails.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnknownUser`] if the user has no endpoint.
    pub async fn run_cycle(&self, user_id: &str) -> Result<CycleOutcome, TrackerError> {
        let Some(_slot) = self.claim(user_id) else {
            tracing::debug!("Cycle for {user_id} still running, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let address = self
            .endpoints
            .get(user_id)
            .map(|e| e.address().to_string())
            .ok_or_else(|| TrackerError::UnknownUser(user_id.to_string()))?;

        let reading = match tokio::time::timeout(
            self.settings.probe_timeout,
            self.probe.probe(&address),
        )
        .await
        {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => {
                tracing::warn!("Probe for {user_id} ({address}) failed: {e}");
                return Ok(CycleOutcome::ProbeFailed);
            }
            Err(_) => {
                tracing::warn!(
                    "Probe for {user_id} ({address}) timed out after {:?}",
                    self.settings.probe_timeout
                );
                return Ok(CycleOutcome::ProbeFailed);
            }
        };

        let now = self.clock.now();
        let Some((observation, owed)) = self.apply(user_id, &address, reading, now) else {
            tracing::debug!("Endpoint for {user_id} changed during probe, dropping reading");
            return Ok(CycleOutcome::Discarded);
        };

        let dispatch = match owed {
            Owed::NotDue => Dispatch::NotDue,
            Owed::Suppressed(remaining) => {
                tracing::debug!(
                    "Notification for {user_id} suppressed, cooldown ends in {remaining:?}"
                );
                Dispatch::Suppressed { remaining }
            }
            Owed::Due(notification) => self.dispatch(&notification, now).await,
        };

        let changed = observation.mutated() || matches!(dispatch, Dispatch::Sent(_));
        if changed || self.dirty.contains(user_id) {
            self.persist(user_id).await;
        }

        Ok(CycleOutcome::Completed {
            observation,
            dispatch,
        })
    }

    /// Folds a reading into the entry and decides whether a notification
    /// is due. Returns `None` if the entry no longer matches `address`.
    fn apply(
        &self,
        user_id: &str,
        address: &str,
        reading: Reachability,
        now: SystemTime,
    ) -> Option<(Observation, Owed)> {
        let mut entry = self.endpoints.get_mut(user_id)?;
        if entry.address() != address {
            return None;
        }

        let observation = entry.observe(reading, now, &self.settings.stabilization);
        match observation {
            Observation::Transitioned { from, to } => {
                tracing::debug!("{user_id} ({address}) reads {to} (was {from:?}), stabilizing");
            }
            Observation::Stabilized(state) => {
                tracing::info!("{user_id} ({address}) confirmed {state}");
            }
            Observation::Stabilizing { .. } | Observation::Steady => {}
        }

        let owed = match entry.owed_notification() {
            None => Owed::NotDue,
            Some(state) => match self.settings.cooldown.remaining(&entry, now) {
                Some(remaining) => Owed::Suppressed(remaining),
                None => Owed::Due(Notification {
                    user_id: user_id.to_string(),
                    address: address.to_string(),
                    state,
                    previous: entry.notified(),
                    changed_at: entry.state().transition_at().unwrap_or(now),
                }),
            },
        };

        Some((observation, owed))
    }

    async fn dispatch(&self, notification: &Notification, now: SystemTime) -> Dispatch {
        let user_id = &notification.user_id;
        match tokio::time::timeout(
            self.settings.notify_timeout,
            self.notifier.send(notification),
        )
        .await
        {
            Ok(Ok(())) => {
                if let Some(mut entry) = self.endpoints.get_mut(user_id) {
                    if entry.address() == notification.address {
                        entry.record_notification(notification.state, now);
                    }
                }
                tracing::info!("Notified {user_id}: {}", notification.message());
                Dispatch::Sent(notification.state)
            }
            Ok(Err(e)) => {
                tracing::warn!("Notification for {user_id} failed, will retry: {e}");
                Dispatch::Failed
            }
            Err(_) => {
                tracing::warn!(
                    "Notification for {user_id} timed out after {:?}, will retry",
                    self.settings.notify_timeout
                );
                Dispatch::Failed
            }
        }
    }

    /// Writes one entry, marking the user dirty on failure.
    async fn persist(&self, user_id: &str) {
        let Some(record) = self.endpoints.get(user_id).map(|e| EndpointRecord::from(e.value()))
        else {
            return;
        };

        match self.save(user_id, &record).await {
            Ok(()) => {
                self.dirty.remove(user_id);
            }
            Err(e) => {
                tracing::error!("Failed to persist endpoint for {user_id}: {e}");
                self.dirty.insert(user_id.to_string());
            }
        }
    }

    async fn save(&self, user_id: &str, record: &EndpointRecord) -> Result<(), TrackerError> {
        tokio::time::timeout(self.settings.persist_timeout, self.store.save(user_id, record))
            .await
            .map_err(|_| TrackerError::PersistTimeout(self.settings.persist_timeout))?
            .map_err(TrackerError::from)
    }

    /// Starts monitoring an address for a user, or updates it.
    ///
    /// A new address restarts tracking from unknown but keeps the
    /// notification clock. The same address only updates the debounce
    /// setting. A user that is not in memory picks up any persisted record
    /// first, so cooldowns survive re-registration after a restart.
    ///
    /// Persistence failures are logged and retried later; they do not fail
    /// the registration.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidAddress`] if the address is rejected,
    /// or [`TrackerError::PersistTimeout`] if looking up the persisted record
    /// did not finish in time.
    pub async fn register(
        &self,
        user_id: &str,
        address: &str,
        debounce_minutes: u32,
    ) -> Result<(), TrackerError> {
        let address = address.trim();
        address::validate(address)?;

        let persisted = if self.endpoints.contains_key(user_id) {
            None
        } else {
            tokio::time::timeout(
                self.settings.persist_timeout,
                self.store.load_endpoint(user_id),
            )
            .await
            .map_err(|_| TrackerError::PersistTimeout(self.settings.persist_timeout))?
        };

        {
            let mut entry = self
                .endpoints
                .entry(user_id.to_string())
                .or_insert_with(|| {
                    persisted.map_or_else(
                        || MonitoredEndpoint::new(address, debounce_minutes),
                        MonitoredEndpoint::from,
                    )
                });
            if entry.address() != address {
                tracing::info!("{user_id} now monitors {address} (was {})", entry.address());
                entry.readdress(address);
            }
            entry.set_debounce_minutes(debounce_minutes);
        }

        self.persist(user_id).await;
        Ok(())
    }

    /// Stops monitoring a user. Returns `false` if they were not monitored.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be removed from the store.
    /// The in-memory entry is gone either way.
    pub async fn unregister(&self, user_id: &str) -> Result<bool, TrackerError> {
        if self.endpoints.remove(user_id).is_none() {
            return Ok(false);
        }
        self.dirty.remove(user_id);

        tokio::time::timeout(self.settings.persist_timeout, self.store.remove(user_id))
            .await
            .map_err(|_| TrackerError::PersistTimeout(self.settings.persist_timeout))??;
        Ok(true)
    }

    /// Changes a user's debounce setting.
    ///
    /// A pending window is re-evaluated against the new setting on the
    /// next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnknownUser`] if the user has no endpoint.
    pub async fn set_debounce_minutes(&self, user_id: &str, minutes: u32) -> Result<(), TrackerError> {
        self.endpoints
            .get_mut(user_id)
            .ok_or_else(|| TrackerError::UnknownUser(user_id.to_string()))?
            .set_debounce_minutes(minutes);

        self.persist(user_id).await;
        Ok(())
    }

    /// Writes every entry to the store in one operation.
    ///
    /// Called on shutdown. Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::PersistTimeout`] if the write does not finish
    /// within `timeout`, or [`TrackerError::Persist`] if it fails.
    pub async fn flush_all(&self, timeout: Duration) -> Result<usize, TrackerError> {
        let records: EndpointRecords = self
            .endpoints
            .iter()
            .map(|e| (e.key().clone(), EndpointRecord::from(e.value())))
            .collect();

        tokio::time::timeout(timeout, self.store.save_all(&records))
            .await
            .map_err(|_| TrackerError::PersistTimeout(timeout))??;

        self.dirty.clear();
        Ok(records.len())
    }
}
