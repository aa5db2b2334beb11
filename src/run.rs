//! Application execution logic.
//!
//! This module contains the main async loop that probes every monitored
//! endpoint on each poll tick and shuts down gracefully on a signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::signal;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use reachguard::config::{EndpointConfig, PollInterval, ValidatedConfig};
use reachguard::monitor::{
    CycleOutcome, Dispatch, EndpointTracker, Probe, TcpProbe, TrackerError,
};
use reachguard::notify::{
    HttpNotifier, LogNotifier, Notification, Notifier, NotifyError, ReqwestClient,
};
use reachguard::state::{EndpointRecords, EndpointStore, FileEndpointStore, LoadResult};

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

/// Error type for runtime execution failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The final flush of endpoint state failed.
    #[error("Failed to save state on shutdown: {0}")]
    Flush(#[source] TrackerError),
}

/// Notifier selected at startup.
#[derive(Debug)]
enum AppNotifier {
    Http(HttpNotifier<ReqwestClient>),
    DryRun(LogNotifier),
}

impl Notifier for AppNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::Http(notifier) => notifier.send(notification).await,
            Self::DryRun(notifier) => notifier.send(notification).await,
        }
    }
}

/// Executes the main application loop.
///
/// This function:
/// 1. Loads persisted endpoints from the state file
/// 2. Registers the endpoints from the configuration
/// 3. Runs probe cycles until shutdown signal (Ctrl+C / SIGTERM)
/// 4. Writes every endpoint back to the state file
///
/// # Errors
///
/// Returns an error if the final state flush fails or times out.
#[cfg(not(tarpaulin_include))]
pub async fn execute(config: ValidatedConfig) -> Result<(), RunError> {
    let notifier = create_notifier(&config);
    if matches!(notifier, AppNotifier::DryRun(_)) {
        tracing::info!("Dry-run mode enabled - notifications will be logged but not sent");
    }

    let store = FileEndpointStore::new(&config.state_file);
    tracing::info!("State file: {}", store.path().display());
    let records = load_records(&store);

    let probe = TcpProbe::new()
        .with_ports(config.probe_ports.clone())
        .with_connect_timeout(config.connect_timeout);
    let tracker = Arc::new(
        EndpointTracker::new(probe, notifier, store).with_settings(config.tracker.clone()),
    );

    let restored = tracker.restore(records);
    if restored > 0 {
        tracing::info!("Restored {restored} endpoint(s) from previous run");
    }

    register_endpoints(&tracker, &config.endpoints).await;
    if tracker.is_empty() {
        tracing::warn!("No endpoints to monitor; add [[endpoint]] entries to the config file");
    }

    tracing::info!(
        "Monitoring {} endpoint(s), poll interval {}",
        tracker.len(),
        config.poll_interval
    );
    monitor_until(Arc::clone(&tracker), config.poll_interval, shutdown_signal()).await;

    let saved = tracker
        .flush_all(config.shutdown_timeout)
        .await
        .map_err(RunError::Flush)?;
    tracing::info!("Saved {saved} endpoint(s)");
    Ok(())
}

/// Creates the notifier from configuration.
///
/// Dry-run mode, or a missing URL, selects the logging notifier.
fn create_notifier(config: &ValidatedConfig) -> AppNotifier {
    let url = match &config.url {
        Some(url) if !config.dry_run => url.clone(),
        _ => return AppNotifier::DryRun(LogNotifier),
    };

    let mut notifier = HttpNotifier::new(ReqwestClient::new(), url)
        .with_method(config.method.clone())
        .with_headers(config.headers.clone())
        .with_request_timeout(config.request_timeout)
        .with_retry_policy(config.retry_policy.clone());

    if let Some(ref template) = config.body_template {
        notifier = notifier.with_body_template(template);
    }

    AppNotifier::Http(notifier)
}

/// Reads the persisted endpoints, degrading to an empty set.
fn load_records(store: &impl EndpointStore) -> EndpointRecords {
    match store.load() {
        LoadResult::Loaded(records) => records,
        LoadResult::NotFound => {
            tracing::info!("No previous state found, starting fresh");
            EndpointRecords::new()
        }
        LoadResult::Corrupted { reason } => {
            tracing::warn!("State file corrupted ({reason}), will overwrite on next save");
            EndpointRecords::new()
        }
    }
}

/// Registers configured endpoints, logging the ones that fail.
///
/// Returns the number of endpoints registered.
async fn register_endpoints<P, N, S>(
    tracker: &EndpointTracker<P, N, S>,
    endpoints: &[EndpointConfig],
) -> usize
where
    P: Probe,
    N: Notifier,
    S: EndpointStore,
{
    let mut registered = 0;

    for endpoint in endpoints {
        match tracker
            .register(
                &endpoint.user_id,
                &endpoint.address,
                endpoint.debounce_minutes,
            )
            .await
        {
            Ok(()) => registered += 1,
            Err(e) => tracing::error!("Failed to register {}: {e}", endpoint.user_id),
        }
    }

    registered
}

/// Runs probe cycles on every tick until `shutdown` completes, then waits
/// for the cycles still in flight.
///
/// The first tick fires immediately. Each tick spawns one cycle per user;
/// a user whose previous cycle is still running is skipped by the tracker.
async fn monitor_until<P, N, S>(
    tracker: Arc<EndpointTracker<P, N, S>>,
    poll_interval: PollInterval,
    shutdown: impl Future<Output = ()>,
) where
    P: Probe + 'static,
    N: Notifier + 'static,
    S: EndpointStore + 'static,
{
    let tick = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(shutdown, tick);
    let mut cycles = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                tracing::info!("Shutdown signal received, stopping...");
                break;
            }

            () = &mut tick => {
                for user_id in tracker.user_ids() {
                    let tracker = Arc::clone(&tracker);
                    cycles.spawn(async move {
                        let result = tracker.run_cycle(&user_id).await;
                        (user_id, result)
                    });
                }
                let next = poll_interval.for_users(tracker.len());
                tick.as_mut().reset(Instant::now() + next);
            }

            Some(finished) = cycles.join_next() => log_cycle(finished),
        }
    }

    if !cycles.is_empty() {
        tracing::info!("Waiting for {} running cycle(s)", cycles.len());
    }
    while let Some(finished) = cycles.join_next().await {
        log_cycle(finished);
    }
}

fn log_cycle(finished: Result<(String, Result<CycleOutcome, TrackerError>), JoinError>) {
    match finished {
        Ok((user_id, Ok(outcome))) => match outcome {
            CycleOutcome::Completed {
                dispatch: Dispatch::Failed,
                ..
            } => tracing::debug!("Cycle for {user_id} left a notification owed"),
            outcome => tracing::trace!("Cycle for {user_id}: {outcome:?}"),
        },
        // Unregistered between the tick and the cycle.
        Ok((user_id, Err(TrackerError::UnknownUser(_)))) => {
            tracing::debug!("Skipped cycle for removed user {user_id}");
        }
        Ok((user_id, Err(e))) => tracing::warn!("Cycle for {user_id} failed: {e}"),
        Err(e) => tracing::error!("Cycle task panicked: {e}"),
    }
}

/// Returns a future that completes when a shutdown signal is received.
///
/// Excluded from coverage - requires OS signal handling.
#[cfg(not(tarpaulin_include))]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
