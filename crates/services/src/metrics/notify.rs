use std::sync::Arc;

use tokio::sync::watch;

/// Broadcasts "metrics changed" to any number of subscribers.
///
/// Built on a `watch` channel holding a change counter: subscribers see that
/// something changed since they last looked, never a backlog of events, and
/// notifying never waits on or fails because of a subscriber.
#[derive(Clone)]
pub struct MetricsNotifier {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for MetricsNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsNotifier {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Number of notifications sent so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> MetricsSubscription {
        MetricsSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of [`MetricsNotifier`].
pub struct MetricsSubscription {
    rx: watch::Receiver<u64>,
}

impl MetricsSubscription {
    /// Wait for the next change.
    ///
    /// Returns `false` once the notifier is gone and no further changes can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Whether a change arrived since the last `changed`/`mark_seen`.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    pub fn mark_seen(&mut self) {
        self.rx.borrow_and_update();
    }
}
