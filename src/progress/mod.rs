//! Observable upload progress and user-facing notifications.

mod notify;
mod reporter;
mod types;

pub use notify::{Notification, NotificationCenter, NotificationLevel};
pub use reporter::{ProgressReporter, Subscription};
pub use types::ProgressEvent;

/// `round(done / total * 100)`, clamped to 100. Zero `total` counts as done.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    pct.min(100.0) as u8
}
