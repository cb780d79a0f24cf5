//! Process-wide cancellation signal.
//!
//! Both the device loop and every stream connection observe the same
//! [`Shutdown`] token. The device loop checks it between exchanges, the
//! async side awaits it.

use std::sync::Arc;
use tokio::sync::watch;

/// Exit status used when a second signal forces termination.
const FORCED_EXIT_CODE: i32 = 130;

/// Cloneable cancellation token.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Creates a token that has not been triggered.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns on trigger.
        let _ = rx.wait_for(|&triggered| triggered).await;
    }

    /// Routes SIGINT and SIGTERM into this token.
    ///
    /// The first signal requests an orderly shutdown. A second one exits
    /// the process immediately.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            if shutdown.is_triggered() {
                tracing::warn!("Second termination signal, exiting immediately");
                std::process::exit(FORCED_EXIT_CODE);
            }
            tracing::info!("Termination signal received, shutting down");
            shutdown.trigger();
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
