//! User-visible monitor events.

use crate::monitor::ResultItem;

/// Sink for user-visible monitoring events.
pub trait Notify: Send + Sync {
    /// A new opportunity was added to the result list.
    fn item_found(&self, item: &ResultItem);

    /// A check failed; the loop keeps running.
    fn check_failed(&self, url: &str, reason: &str);

    /// Monitoring was switched on or off.
    fn monitoring_changed(&self, active: bool);
}

/// Default notifier: routes events to the log.
#[derive(Default)]
pub struct TracingNotify;

impl Notify for TracingNotify {
    fn item_found(&self, item: &ResultItem) {
        tracing::info!("New opportunity found: {} ({})", item.title, item.url);
    }

    fn check_failed(&self, url: &str, reason: &str) {
        tracing::warn!("Check failed for {}: {}", url, reason);
    }

    fn monitoring_changed(&self, active: bool) {
        if active {
            tracing::info!("Monitoring started");
        } else {
            tracing::info!("Monitoring stopped");
        }
    }
}
