//! Endpoint reachability monitoring.
//!
//! This module provides types and functions for:
//! - The per-user state machine ([`MonitoredEndpoint`], [`TrackerState`])
//! - Stabilization windows ([`StabilizationPolicy`])
//! - Notification spacing ([`NotificationCooldown`])
//! - Probing addresses ([`Probe`], [`TcpProbe`])
//! - Running poll cycles ([`EndpointTracker`])

mod cooldown;
mod debounce;
mod endpoint;
mod error;
mod probe;
mod tracker;

pub use cooldown::NotificationCooldown;
pub use debounce::StabilizationPolicy;
pub use endpoint::{MonitoredEndpoint, Observation, Reachability, TrackerState};
pub use error::TrackerError;
pub use probe::{Probe, ProbeError, TcpProbe};
pub use tracker::{CycleOutcome, Dispatch, EndpointTracker, TrackerSettings};

/// Scripted probe for tracker tests.
#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{Probe, ProbeError, Reachability};

    /// Returns whatever reading was last set.
    ///
    /// `None` makes the probe fail. A delay, if set, is slept before
    /// answering.
    #[derive(Debug, Default)]
    pub struct MockProbe {
        reading: Mutex<Option<Reachability>>,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
    }

    impl MockProbe {
        /// Creates a probe that answers with `reading`.
        #[must_use]
        pub fn reading(reading: Reachability) -> Self {
            let probe = Self::default();
            probe.set(Some(reading));
            probe
        }

        /// Changes the next answers; `None` means failure.
        pub fn set(&self, reading: Option<Reachability>) {
            *self.reading.lock().unwrap() = reading;
        }

        /// Makes each probe sleep first.
        pub fn set_delay(&self, delay: Option<Duration>) {
            *self.delay.lock().unwrap() = delay;
        }

        /// Number of probe calls so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Probe for MockProbe {
        async fn probe(&self, address: &str) -> Result<Reachability, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let reading = *self.reading.lock().unwrap();
            reading.ok_or_else(|| ProbeError::InvalidAddress(address.to_string()))
        }
    }
}
