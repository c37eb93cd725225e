//! Cooperative shutdown.
//!
//! A single watcher task traps SIGINT/SIGTERM and flips a watch flag.
//! Loops check the flag between windows and batches; sleeps race it via
//! [`ShutdownSignal::wait`], so the in-flight batch commit always
//! finishes before the process exits.

use tokio::sync::watch;
use tracing::info;

/// Clonable handle to the process-wide shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Install the signal handlers and return the shared handle.
    pub fn install() -> Self {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received — finishing current batch before exit...");
            let _ = tx.send(true);
        });
        Self { rx }
    }

    /// A signal driven by the caller instead of the OS (tests, embedding).
    pub fn manual() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// True once shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Raw receiver, for components that select on it directly.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Resolve when shutdown is requested. Never resolves if the sender
    /// is gone without having signalled.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn manual_trigger_flips_the_flag() {
        let (tx, signal) = ShutdownSignal::manual();
        assert!(!signal.is_cancelled());
        tx.send(true).unwrap();
        assert!(signal.is_cancelled());
        // wait() resolves promptly once signalled.
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_races_cleanly_with_sleep() {
        let (tx, signal) = ShutdownSignal::manual();
        let waiter = tokio::spawn(async move { signal.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
