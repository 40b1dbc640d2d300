//! Process-wide shutdown signal.
//!
//! A [`Shutdown`] is a cloneable handle around a `watch` channel holding
//! `Option<ShutdownReason>`.  The first call to [`Shutdown::trigger`] records
//! the reason; later triggers are ignored.  Every long-running await in the
//! bridge selects on [`Shutdown::triggered`] so nothing stays blocked once
//! the process is stopping.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::ShutdownReason;

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Records `reason` if no reason was recorded yet.
    ///
    /// Returns `true` when this call initiated the shutdown.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut ignored = None;
        let first = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                ignored = Some(reason);
                false
            }
        });
        match ignored {
            None => info!("shutdown initiated: {}", self.describe()),
            Some(late) => debug!("shutdown already in progress; ignoring {late}"),
        }
        first
    }

    /// The recorded reason, if shutdown has begun.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    /// Resolves once shutdown has been triggered, yielding the first reason.
    pub async fn triggered(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            // The sender lives in `self`, so this only fails if the runtime
            // is tearing down.
            if rx.changed().await.is_err() {
                return ShutdownReason::Fatal("shutdown channel dropped".to_string());
            }
        }
    }

    fn describe(&self) -> String {
        self.reason()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
