//! Tests for the endpoint state machine.

use std::time::{Duration, SystemTime};

use super::*;
use crate::time::from_unix_millis;

const T0: u64 = 1_700_000_000;

fn at(secs_after_t0: u64) -> SystemTime {
    from_unix_millis((T0 + secs_after_t0) * 1000)
}

fn policy() -> StabilizationPolicy {
    StabilizationPolicy::default()
}

/// Drives an endpoint to a confirmed reading at `at(0)` + window.
fn confirmed(reading: Reachability, debounce_minutes: u32) -> MonitoredEndpoint {
    let mut endpoint = MonitoredEndpoint::new("8.8.8.8", debounce_minutes);
    endpoint.observe(reading, at(0), &policy());
    let window = policy().window_for(debounce_minutes).as_secs();
    assert_eq!(
        endpoint.observe(reading, at(window), &policy()),
        Observation::Stabilized(reading)
    );
    endpoint
}

mod transitions {
    use super::*;

    #[test]
    fn new_endpoint_is_unknown() {
        let endpoint = MonitoredEndpoint::new("8.8.8.8", 0);

        assert_eq!(endpoint.state(), TrackerState::Unknown);
        assert_eq!(endpoint.state().last_known(), None);
        assert_eq!(endpoint.owed_notification(), None);
    }

    #[test]
    fn first_reading_starts_pending() {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 0);

        let observation = endpoint.observe(Reachability::Up, at(0), &policy());

        assert_eq!(
            observation,
            Observation::Transitioned {
                from: None,
                to: Reachability::Up
            }
        );
        assert_eq!(
            endpoint.state(),
            TrackerState::Pending {
                reachability: Reachability::Up,
                since: at(0)
            }
        );
        assert!(observation.mutated());
    }

    #[test]
    fn same_reading_inside_window_reports_remaining() {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 0);
        endpoint.observe(Reachability::Up, at(0), &policy());

        let observation = endpoint.observe(Reachability::Up, at(10), &policy());

        assert_eq!(
            observation,
            Observation::Stabilizing {
                remaining: Duration::from_secs(20)
            }
        );
        assert!(!observation.mutated());
        assert!(endpoint.state().is_pending());
        assert_eq!(endpoint.last_stable_at(), None);
    }

    #[test]
    fn zero_debounce_never_confirms_before_thirty_seconds() {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 0);
        endpoint.observe(Reachability::Down, at(0), &policy());

        for secs in 1..30 {
            let observation = endpoint.observe(Reachability::Down, at(secs), &policy());
            assert!(
                matches!(observation, Observation::Stabilizing { .. }),
                "confirmed after only {secs}s"
            );
        }

        assert_eq!(
            endpoint.observe(Reachability::Down, at(30), &policy()),
            Observation::Stabilized(Reachability::Down)
        );
    }

    #[test]
    fn stabilizing_sets_last_stable_at_and_keeps_transition_time() {
        let endpoint = confirmed(Reachability::Up, 1);

        assert_eq!(
            endpoint.state(),
            TrackerState::Confirmed {
                reachability: Reachability::Up,
                since: at(0)
            }
        );
        assert_eq!(endpoint.last_stable_at(), Some(at(60)));
    }

    #[test]
    fn confirmed_same_reading_is_steady() {
        let mut endpoint = confirmed(Reachability::Up, 0);

        assert_eq!(
            endpoint.observe(Reachability::Up, at(500), &policy()),
            Observation::Steady
        );
        assert_eq!(endpoint.last_stable_at(), Some(at(30)));
    }

    #[test]
    fn confirmed_different_reading_restarts_window() {
        let mut endpoint = confirmed(Reachability::Up, 0);

        let observation = endpoint.observe(Reachability::Down, at(100), &policy());

        assert_eq!(
            observation,
            Observation::Transitioned {
                from: Some(Reachability::Up),
                to: Reachability::Down
            }
        );
        assert_eq!(endpoint.state().transition_at(), Some(at(100)));
        assert!(endpoint.state().is_pending());
    }

    #[test]
    fn flapping_resets_window_from_latest_transition() {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 1);
        endpoint.observe(Reachability::Up, at(0), &policy());
        endpoint.observe(Reachability::Down, at(20), &policy());
        endpoint.observe(Reachability::Up, at(40), &policy());

        // 60s after the first transition, but only 20s after the last one.
        assert!(matches!(
            endpoint.observe(Reachability::Up, at(60), &policy()),
            Observation::Stabilizing { .. }
        ));
        assert_eq!(
            endpoint.observe(Reachability::Up, at(100), &policy()),
            Observation::Stabilized(Reachability::Up)
        );
    }

    #[test]
    fn debounce_change_applies_to_pending_window() {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 5);
        endpoint.observe(Reachability::Down, at(0), &policy());
        assert!(matches!(
            endpoint.observe(Reachability::Down, at(60), &policy()),
            Observation::Stabilizing { .. }
        ));

        endpoint.set_debounce_minutes(1);

        assert_eq!(
            endpoint.observe(Reachability::Down, at(61), &policy()),
            Observation::Stabilized(Reachability::Down)
        );
    }
}

mod notification_bookkeeping {
    use super::*;

    #[test]
    fn confirmed_unnotified_state_is_owed() {
        let endpoint = confirmed(Reachability::Down, 0);
        assert_eq!(endpoint.owed_notification(), Some(Reachability::Down));
    }

    #[test]
    fn pending_state_owes_nothing() {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 0);
        endpoint.observe(Reachability::Down, at(0), &policy());

        assert_eq!(endpoint.owed_notification(), None);
    }

    #[test]
    fn recording_clears_the_debt() {
        let mut endpoint = confirmed(Reachability::Down, 0);
        endpoint.record_notification(Reachability::Down, at(30));

        assert_eq!(endpoint.owed_notification(), None);
        assert_eq!(endpoint.notified(), Some(Reachability::Down));
        assert_eq!(endpoint.last_notification_at(), Some(at(30)));
    }

    #[test]
    fn flap_back_to_notified_state_owes_nothing() {
        let mut endpoint = confirmed(Reachability::Up, 0);
        endpoint.record_notification(Reachability::Up, at(30));

        endpoint.observe(Reachability::Down, at(40), &policy());
        endpoint.observe(Reachability::Up, at(50), &policy());
        assert_eq!(
            endpoint.observe(Reachability::Up, at(80), &policy()),
            Observation::Stabilized(Reachability::Up)
        );

        assert_eq!(endpoint.owed_notification(), None);
    }

    #[test]
    fn last_notification_at_never_decreases() {
        let mut endpoint = confirmed(Reachability::Up, 0);
        endpoint.record_notification(Reachability::Up, at(100));
        endpoint.record_notification(Reachability::Down, at(50));

        assert_eq!(endpoint.last_notification_at(), Some(at(100)));
        assert_eq!(endpoint.notified(), Some(Reachability::Down));
    }

    #[test]
    fn readdress_resets_tracking_but_keeps_cooldown_clock() {
        let mut endpoint = confirmed(Reachability::Up, 3);
        endpoint.record_notification(Reachability::Up, at(200));

        endpoint.readdress("1.1.1.1");

        assert_eq!(endpoint.address(), "1.1.1.1");
        assert_eq!(endpoint.state(), TrackerState::Unknown);
        assert_eq!(endpoint.notified(), None);
        assert_eq!(endpoint.last_stable_at(), None);
        assert_eq!(endpoint.last_notification_at(), Some(at(200)));
        assert_eq!(endpoint.debounce_minutes(), 3);
    }
}

mod records {
    use super::*;

    #[test]
    fn confirmed_entry_survives_record_conversion() {
        let mut endpoint = confirmed(Reachability::Up, 2);
        endpoint.record_notification(Reachability::Up, at(120));

        let record = EndpointRecord::from(&endpoint);
        let restored = MonitoredEndpoint::from(record);

        assert_eq!(restored, endpoint);
    }

    #[test]
    fn pending_entry_survives_record_conversion() {
        let mut endpoint = confirmed(Reachability::Up, 0);
        endpoint.observe(Reachability::Down, at(45), &policy());

        let record = EndpointRecord::from(&endpoint);
        assert!(record.last_transition_at > record.last_stable_at);

        let restored = MonitoredEndpoint::from(record);
        assert_eq!(restored.state(), endpoint.state());
        assert!(restored.state().is_pending());
    }

    #[test]
    fn record_exposes_flat_fields() {
        let endpoint = confirmed(Reachability::Down, 1);
        let record = EndpointRecord::from(&endpoint);

        assert_eq!(record.address, "8.8.8.8");
        assert_eq!(record.last_known_state, Some(Reachability::Down));
        assert_eq!(record.last_transition_at, Some((T0) * 1000));
        assert_eq!(record.last_stable_at, Some((T0 + 60) * 1000));
        assert_eq!(record.last_notification_at, None);
        assert_eq!(record.debounce_minutes, 1);
    }

    #[test]
    fn known_state_without_transition_restarts_unknown() {
        let record = EndpointRecord {
            address: "8.8.8.8".to_string(),
            last_known_state: Some(Reachability::Up),
            last_transition_at: None,
            last_stable_at: None,
            last_notification_at: Some(T0 * 1000),
            notified_state: Some(Reachability::Up),
            debounce_minutes: 0,
        };

        let restored = MonitoredEndpoint::from(record);

        assert_eq!(restored.state(), TrackerState::Unknown);
        assert_eq!(restored.last_notification_at(), Some(at(0)));
        assert_eq!(restored.notified(), Some(Reachability::Up));
    }

    #[test]
    fn equal_transition_and_stable_times_mean_confirmed() {
        let record = EndpointRecord {
            address: "8.8.8.8".to_string(),
            last_known_state: Some(Reachability::Down),
            last_transition_at: Some(T0 * 1000),
            last_stable_at: Some(T0 * 1000),
            last_notification_at: None,
            notified_state: None,
            debounce_minutes: 0,
        };

        let restored = MonitoredEndpoint::from(record);

        assert!(matches!(restored.state(), TrackerState::Confirmed { .. }));
    }
}
