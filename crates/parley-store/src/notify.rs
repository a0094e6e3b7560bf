//! Change notification.
//!
//! Every mutating store call publishes what it touched on a bounded
//! [`tokio::sync::broadcast`] channel.  Slow subscribers lose the oldest
//! events (they observe `RecvError::Lagged`) instead of blocking writers, so
//! an event only means "re-read the current state", never a complete delta.
//!
//! An optional [`Notifier`] sink receives the same events synchronously for
//! collaborators that are not async (badge counters, platform hooks).

use parley_shared::Address;
use tokio::sync::broadcast;

use crate::database::Database;

/// What changed in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadChange {
    /// A single conversation changed.
    Thread(i64),
    /// The conversation list as a whole changed (bulk deletes).
    All,
}

/// Fire-and-forget sink for UI / badge updates.
pub trait Notifier: Send + Sync {
    fn notify_changed(&self, thread_id: i64);

    fn notify_all_changed(&self);
}

impl Database {
    /// Subscribe to thread changes.
    pub fn subscribe_thread_changes(&self) -> broadcast::Receiver<ThreadChange> {
        self.thread_changes.subscribe()
    }

    /// Subscribe to recipient settings changes.
    pub fn subscribe_recipient_changes(&self) -> broadcast::Receiver<Address> {
        self.recipient_changes.subscribe()
    }

    pub(crate) fn notify_thread(&self, thread_id: i64) {
        tracing::trace!(thread_id, "thread changed");
        if let Some(notifier) = &self.notifier {
            notifier.notify_changed(thread_id);
        }
        // No subscribers is not an error.
        let _ = self.thread_changes.send(ThreadChange::Thread(thread_id));
    }

    pub(crate) fn notify_all_threads(&self) {
        tracing::trace!("conversation list changed");
        if let Some(notifier) = &self.notifier {
            notifier.notify_all_changed();
        }
        let _ = self.thread_changes.send(ThreadChange::All);
    }

    pub(crate) fn notify_recipient(&self, address: &Address) {
        tracing::trace!(address = %address.debug_string(), "recipient changed");
        let _ = self.recipient_changes.send(address.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::broadcast::error::RecvError;

    use super::*;
    use crate::database::StoreOptions;

    #[derive(Default)]
    struct CountingNotifier {
        single: AtomicUsize,
        all: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify_changed(&self, _thread_id: i64) {
            self.single.fetch_add(1, Ordering::SeqCst);
        }

        fn notify_all_changed(&self) {
            self.all.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let db = Database::in_memory_with(StoreOptions::default().with_change_buffer(2)).unwrap();
        let mut rx = db.subscribe_thread_changes();

        for id in 0..5 {
            db.notify_thread(id);
        }

        match rx.recv().await {
            Err(RecvError::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert_eq!(rx.recv().await.unwrap(), ThreadChange::Thread(3));
        assert_eq!(rx.recv().await.unwrap(), ThreadChange::Thread(4));
    }

    #[test]
    fn notifier_sink_sees_every_event() {
        let notifier = Arc::new(CountingNotifier::default());
        let db = Database::in_memory_with(StoreOptions::default().with_notifier(notifier.clone()))
            .unwrap();

        db.notify_thread(1);
        db.notify_thread(2);
        db.notify_all_threads();

        assert_eq!(notifier.single.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.all.load(Ordering::SeqCst), 1);
    }
}
