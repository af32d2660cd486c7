use crate::progress::types::ProgressEvent;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Callback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

struct ReporterInner {
    current: ProgressEvent,
    subscribers: Vec<(u64, Callback)>,
    next_id: u64,
}

/// Holds the last known [`ProgressEvent`] and fans updates out to subscribers.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<RwLock<ReporterInner>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ReporterInner {
                current: ProgressEvent::idle(),
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Replace the current state and notify every subscriber before returning.
    pub fn update(&self, event: ProgressEvent) {
        let callbacks: Vec<Callback> = {
            let mut inner = self.inner.write();
            inner.current = event.clone();
            inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };

        // Lock released: callbacks may read `current()` or unsubscribe.
        for cb in callbacks {
            cb(&event);
        }
    }

    /// Back to `Idle`, as at the start of a new session.
    pub fn reset(&self) {
        self.update(ProgressEvent::idle());
    }

    pub fn current(&self) -> ProgressEvent {
        self.inner.read().current.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(callback)));

        Subscription {
            id,
            reporter: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

/// Handle returned by [`ProgressReporter::subscribe`].
#[must_use = "dropping the handle keeps the callback registered; call unsubscribe to remove it"]
pub struct Subscription {
    id: u64,
    reporter: Weak<RwLock<ReporterInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.reporter.upgrade() {
            inner.write().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UploadPhase;
    use parking_lot::Mutex;

    #[test]
    fn test_starts_idle() {
        let reporter = ProgressReporter::new();
        assert_eq!(reporter.current().phase, UploadPhase::Idle);
        assert_eq!(reporter.current().percent, 0);
    }

    #[test]
    fn test_update_notifies_synchronously() {
        let reporter = ProgressReporter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = reporter.subscribe(move |e| sink.lock().push(e.percent));

        reporter.update(ProgressEvent::new(UploadPhase::Hashing, 33, "hashing"));
        reporter.update(ProgressEvent::new(UploadPhase::Hashing, 67, "hashing"));

        assert_eq!(*seen.lock(), vec![33, 67]);
        assert_eq!(reporter.current().percent, 67);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let reporter = ProgressReporter::new();
        let seen = Arc::new(Mutex::new(0usize));

        let sink = seen.clone();
        let sub = reporter.subscribe(move |_| *sink.lock() += 1);
        let other = reporter.subscribe(|_| {});
        assert_eq!(reporter.subscriber_count(), 2);

        reporter.update(ProgressEvent::new(UploadPhase::Transferring, 50, "sending"));
        sub.unsubscribe();
        reporter.update(ProgressEvent::new(UploadPhase::Transferring, 100, "sending"));

        assert_eq!(*seen.lock(), 1);
        assert_eq!(reporter.subscriber_count(), 1);
        other.unsubscribe();
    }

    #[test]
    fn test_callback_can_read_current() {
        let reporter = ProgressReporter::new();
        let handle = reporter.clone();
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        let _sub = reporter.subscribe(move |_| *sink.lock() = Some(handle.current().percent));
        reporter.update(ProgressEvent::new(UploadPhase::Finalizing, 100, "verifying"));

        assert_eq!(*seen.lock(), Some(100));
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let reporter = ProgressReporter::new();
        reporter.update(ProgressEvent::new(UploadPhase::Succeeded, 100, "done"));
        reporter.reset();
        assert_eq!(reporter.current(), ProgressEvent::idle());
    }
}
