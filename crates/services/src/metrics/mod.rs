mod notify;
mod reconcile;
mod store;

pub use notify::{MetricsNotifier, MetricsSubscription};
pub use reconcile::{ReconcileReport, reconcile};
pub use store::{MetricsStore, MetricsStoreConfig};
