//! Per-run cancellation signal and cancellable timers.
//!
//! One [`AbortSignal`] is created at the start of every run and is the only
//! mechanism used to stop all actors' in-flight waits simultaneously.
//! Stopping deliberately, completing (win/fail) and uncaught fatal errors
//! all converge on aborting this one signal. A cancelled wait rejects with
//! [`SimError::Cancelled`].

use rover_core::SimError;
use std::time::Duration;
use tokio::sync::watch;

/// Owner side of the run's abort signal.
#[derive(Debug)]
pub struct AbortSignal {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Aborts every wait holding a handle. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn handle(&self) -> AbortHandle {
        AbortHandle {
            rx: self.rx.clone(),
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap clonable view of the run's abort signal.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    rx: watch::Receiver<bool>,
}

impl AbortHandle {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is aborted. A dropped [`AbortSignal`] counts as
    /// aborted — the run is over either way.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // wait_for errs only when the sender is gone.
        let _ = rx.wait_for(|aborted| *aborted).await;
    }

    /// Sleeps for `ms` milliseconds, rejecting early on abort.
    ///
    /// # Errors
    ///
    /// [`SimError::Cancelled`] if the run was aborted before or during the
    /// wait.
    pub async fn wait(&self, ms: u64) -> Result<(), SimError> {
        if self.is_aborted() {
            return Err(SimError::Cancelled);
        }
        tokio::select! {
            () = self.cancelled() => Err(SimError::Cancelled),
            () = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wait_completes_when_not_aborted() {
        let signal = AbortSignal::new();
        let handle = signal.handle();
        handle.wait(1_000).await.expect("wait should complete");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_rejects_if_already_aborted() {
        let signal = AbortSignal::new();
        signal.abort();
        let err = signal.handle().wait(10).await.unwrap_err();
        assert_eq!(err, SimError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_interrupts_inflight_wait() {
        let signal = AbortSignal::new();
        let handle = signal.handle();

        let (result, ()) = tokio::join!(handle.wait(60_000), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            signal.abort();
        });
        assert_eq!(result.unwrap_err(), SimError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_signal_counts_as_aborted() {
        let signal = AbortSignal::new();
        let handle = signal.handle();
        drop(signal);
        handle.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn abort_is_idempotent_and_observable() {
        let signal = AbortSignal::new();
        signal.abort();
        signal.abort();
        assert!(signal.is_aborted());
        assert!(signal.handle().is_aborted());
    }
}
