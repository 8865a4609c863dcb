use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One-shot per-question timer.
///
/// Arming schedules a task that reports its generation after `after` elapses.
/// At most one task is outstanding: arming again or cancelling aborts the
/// previous one and drops any report it already queued.
pub struct Countdown {
    tx: mpsc::UnboundedSender<u64>,
    rx: mpsc::UnboundedReceiver<u64>,
    pending: Option<JoinHandle<()>>,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            pending: None,
        }
    }

    /// Must be called from within a Tokio runtime.
    pub fn arm(&mut self, generation: u64, after: Duration) {
        self.cancel();
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(generation);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        while self.rx.try_recv().is_ok() {}
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.is_some() || !self.rx.is_empty()
    }

    /// Wait for the armed countdown to elapse and return its generation.
    ///
    /// Pending forever while nothing is armed; race it against other events.
    pub async fn fired(&mut self) -> Option<u64> {
        let generation = self.rx.recv().await;
        self.pending = None;
        generation
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_with_its_generation() {
        let mut countdown = Countdown::new();
        countdown.arm(7, Duration::from_secs(1));
        assert!(countdown.is_armed());
        assert_eq!(countdown.fired().await, Some(7));
        assert!(!countdown.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_countdown() {
        let mut countdown = Countdown::new();
        countdown.arm(1, Duration::from_secs(1));
        countdown.arm(2, Duration::from_secs(5));
        assert_eq!(countdown.fired().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_fires() {
        let mut countdown = Countdown::new();
        countdown.arm(1, Duration::from_secs(1));
        countdown.cancel();
        assert!(!countdown.is_armed());

        let waited = tokio::time::timeout(Duration::from_secs(10), countdown.fired()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_an_already_queued_report() {
        let mut countdown = Countdown::new();
        countdown.arm(1, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        countdown.cancel();

        let waited = tokio::time::timeout(Duration::from_secs(1), countdown.fired()).await;
        assert!(waited.is_err());
    }
}
