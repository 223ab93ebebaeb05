use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Cooperative shutdown shared by the workers and background loops.
///
/// Loops `select!` on [`ShutdownSignal::cancelled`] next to their work. A
/// worker holds a [`ShutdownGuard`] for its lifetime; dropping it counts the
/// worker as drained so `main` can wait for in-flight ticks to finish.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    trigger: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    drained_tx: Arc<watch::Sender<usize>>,
    drained_rx: watch::Receiver<usize>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (trigger, _) = broadcast::channel(1);
        let (drained_tx, drained_rx) = watch::channel(0);
        Self {
            trigger,
            shutting_down: Arc::new(AtomicBool::new(false)),
            drained_tx: Arc::new(drained_tx),
            drained_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.trigger.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    /// Resolves once shutdown has been triggered, including before the call.
    pub async fn cancelled(&self) {
        // subscribe before reading the flag so a concurrent trigger is not lost
        let mut rx = self.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Idempotent; only the first call broadcasts.
    pub fn trigger(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            info!("shutdown signal triggered");
            let _ = self.trigger.send(());
        } else {
            warn!("shutdown already triggered");
        }
    }

    pub fn guard(&self) -> ShutdownGuard {
        ShutdownGuard {
            signal: self.clone(),
        }
    }

    fn confirm_drained(&self) {
        self.drained_tx.send_modify(|count| *count += 1);
    }

    pub fn drained(&self) -> usize {
        *self.drained_rx.borrow()
    }

    /// Wait until `expected` guards have been dropped or `timeout` elapses.
    pub async fn wait_for_drain(&self, expected: usize, timeout: Duration) -> DrainResult {
        let mut rx = self.drained_rx.clone();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let current = *rx.borrow_and_update();
            if current >= expected {
                info!(drained = current, "all workers drained");
                return DrainResult::Complete(current);
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return DrainResult::Complete(*rx.borrow()),
                Err(_) => {
                    let confirmed = *rx.borrow();
                    warn!(confirmed, expected, "drain timed out");
                    return DrainResult::Timeout {
                        confirmed,
                        expected,
                    };
                }
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    Complete(usize),
    Timeout { confirmed: usize, expected: usize },
}

impl DrainResult {
    pub fn is_complete(&self) -> bool {
        matches!(self, DrainResult::Complete(_))
    }
}

/// Confirms drain on drop.
#[derive(Debug)]
pub struct ShutdownGuard {
    signal: ShutdownSignal,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.signal.confirm_drained();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_idempotent_and_shared_by_clones() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_shutting_down());
        signal.trigger();
        signal.trigger();
        assert!(clone.is_shutting_down());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_resolves_when_already_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_guards() {
        let signal = ShutdownSignal::new();
        let g1 = signal.guard();
        let g2 = signal.guard();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(g1);
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(g2);
        });
        let result = signal.wait_for_drain(2, Duration::from_secs(1)).await;
        assert_eq!(result, DrainResult::Complete(2));
    }

    #[tokio::test]
    async fn drain_times_out_with_live_guard() {
        let signal = ShutdownSignal::new();
        let _held = signal.guard();
        let result = signal.wait_for_drain(1, Duration::from_millis(30)).await;
        assert_eq!(
            result,
            DrainResult::Timeout {
                confirmed: 0,
                expected: 1
            }
        );
        assert!(!result.is_complete());
    }
}
