//! Process lifecycle: OS signals and tracked background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::error::BridgeError;
use crate::application::shutdown::Shutdown;
use crate::domain::{BridgeSettings, ConfigError, ShutdownReason};

/// Resolves on SIGINT or SIGTERM (Unix) or Ctrl+C (elsewhere).
///
/// # Errors
///
/// Returns the I/O error if a signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Spawns a task that triggers `shutdown` with [`ShutdownReason::Signal`]
/// when the process is asked to stop.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_signal() => match result {
                Ok(()) => {
                    info!("termination signal received");
                    shutdown.trigger(ShutdownReason::Signal);
                }
                Err(e) => error!("cannot listen for termination signals: {e}"),
            },
            _ = shutdown.triggered() => {}
        }
    })
}

/// Named background tasks that are joined, with a deadline, at shutdown.
#[derive(Default)]
pub struct TaskSet {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, tokio::spawn(task)));
    }

    pub fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    /// Waits for every task until `limit` has elapsed, then aborts the rest.
    pub async fn join_all(self, limit: Duration) {
        let deadline = Instant::now() + limit;
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!("{name} task finished"),
                Ok(Err(e)) if e.is_panic() => error!("{name} task panicked: {e}"),
                Ok(Err(_)) => debug!("{name} task was cancelled"),
                Err(_) => {
                    warn!("{name} task did not stop within {limit:?}; aborting");
                    handle.abort();
                }
            }
        }
    }
}

/// Waits up to `limit` for a task that hands back a resource (typically a
/// port), aborting it on timeout.
pub async fn reclaim<T>(name: &str, mut handle: JoinHandle<T>, limit: Duration) -> Option<T> {
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("{name} task failed: {e}");
            None
        }
        Err(_) => {
            warn!("{name} task did not stop within {limit:?}; aborting");
            handle.abort();
            None
        }
    }
}

/// Result for a bridge that never got past configuration.
pub fn startup_outcome(
    err: ConfigError,
    shutdown: &Shutdown,
    settings: &BridgeSettings,
) -> Result<(), BridgeError> {
    match err {
        ConfigError::Interrupted => exit_status(shutdown.reason(), settings),
        err => {
            warn!("startup failed: {err}");
            shutdown.trigger(ShutdownReason::Fatal(err.to_string()));
            Err(err.into())
        }
    }
}

/// Maps the first shutdown reason onto the driver's result.
pub fn exit_status(
    reason: Option<ShutdownReason>,
    settings: &BridgeSettings,
) -> Result<(), BridgeError> {
    let barrier_timeout = settings.barrier_timeout();
    match reason.and_then(|reason| BridgeError::from_shutdown(reason, barrier_timeout)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PortRole;

    #[tokio::test]
    async fn test_join_all_waits_for_finished_tasks() {
        // Arrange
        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut tasks = TaskSet::new();
        tasks.spawn("sender", async move {
            let _ = tx.send(7);
        });

        // Act
        tasks.join_all(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_all_aborts_stragglers_after_deadline() {
        // Arrange
        let mut tasks = TaskSet::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
        tasks.spawn("stuck", async move {
            let _keep = tx;
            std::future::pending::<()>().await;
        });

        // Act
        tasks.join_all(Duration::from_secs(5)).await;

        // Assert: the aborted task dropped its sender
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_returns_value_or_gives_up() {
        let quick = tokio::spawn(async { 42 });
        let slow = tokio::spawn(std::future::pending::<u32>());

        assert_eq!(reclaim("quick", quick, Duration::from_secs(1)).await, Some(42));
        assert_eq!(reclaim("slow", slow, Duration::from_secs(1)).await, None);
    }

    #[tokio::test]
    async fn test_signal_listener_stops_when_shutdown_starts_elsewhere() {
        let shutdown = Shutdown::new();
        let listener = spawn_signal_listener(shutdown.clone());

        shutdown.trigger(ShutdownReason::BarrierTimeout);

        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener must stop")
            .unwrap();
        assert_eq!(shutdown.reason(), Some(ShutdownReason::BarrierTimeout));
    }

    #[test]
    fn test_signal_exit_is_clean() {
        let settings = BridgeSettings::default();
        assert!(exit_status(Some(ShutdownReason::Signal), &settings).is_ok());
        assert!(exit_status(None, &settings).is_ok());
    }

    #[test]
    fn test_port_disconnect_exit_is_an_error() {
        let settings = BridgeSettings::default();
        let result = exit_status(
            Some(ShutdownReason::PortDisconnected(PortRole::Output)),
            &settings,
        );
        assert!(matches!(result, Err(BridgeError::PortReadiness(PortRole::Output))));
    }

    #[test]
    fn test_closed_options_port_is_a_config_error() {
        let shutdown = Shutdown::new();
        let result = startup_outcome(
            ConfigError::OptionsClosed,
            &shutdown,
            &BridgeSettings::default(),
        );
        assert!(matches!(
            result,
            Err(BridgeError::Config(ConfigError::OptionsClosed))
        ));
        assert!(shutdown.reason().is_some());
    }
}
