use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use arc_swap::ArcSwap;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::snapshot::Snapshot;
use crate::config::EntryOptions;
use crate::lock;

/// Callback invoked whenever the coordinator has new data (or failed to get it).
pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: BTreeMap<u64, Listener>,
}

/// Holds the most recent snapshot fetched for one account and fans out change
/// notifications to everything subscribed to it.
///
/// Fetching is done elsewhere; whoever polls the upstream service pushes
/// results in through [`Coordinator::set_updated_data`] and
/// [`Coordinator::set_update_failed`]. Listeners are called synchronously on
/// the caller's thread, in subscription order.
pub struct Coordinator {
    name: String,

    options: EntryOptions,

    /// Latest snapshot (readers load the Arc, a refresh stores a new one)
    data: ArcSwap<Snapshot>,

    last_update_success: AtomicBool,

    listeners: Arc<Mutex<Listeners>>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, options: EntryOptions, initial: Snapshot) -> Self {
        Self {
            name: name.into(),
            options,
            data: ArcSwap::from_pointee(initial),
            last_update_success: AtomicBool::new(true),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// Name of the account this coordinator serves
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &EntryOptions {
        &self.options
    }

    /// The latest snapshot. Cheap: clones an `Arc`.
    pub fn data(&self) -> Arc<Snapshot> {
        self.data.load_full()
    }

    /// Whether the most recent refresh succeeded.
    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Subscribe to change notifications.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// cancelled or dropped.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.callbacks.insert(id, Arc::new(listener));
        debug!("[{}] Listener {} subscribed", self.name, id);

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of currently subscribed listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).callbacks.len()
    }

    /// Store a freshly fetched snapshot and notify listeners.
    pub fn set_updated_data(&self, snapshot: Snapshot) {
        self.data.store(Arc::new(snapshot));
        if !self.last_update_success.swap(true, Ordering::SeqCst) {
            info!("[{}] Fetching data recovered", self.name);
        }
        self.notify_listeners();
    }

    /// Record a failed refresh. The previous snapshot is kept; listeners are
    /// notified so entities can report themselves unavailable.
    pub fn set_update_failed(&self, reason: &str) {
        if self.last_update_success.swap(false, Ordering::SeqCst) {
            warn!("[{}] Error fetching data: {}", self.name, reason);
        } else {
            debug!("[{}] Error fetching data: {}", self.name, reason);
        }
        self.notify_listeners();
    }

    fn notify_listeners(&self) {
        // Collect first so listeners may (un)subscribe while being notified.
        let callbacks: Vec<Listener> = lock(&self.listeners)
            .callbacks
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            callback();
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("last_update_success", &self.last_update_success())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Cancellation handle returned by [`Coordinator::add_listener`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).callbacks.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::coordinator::Member;

    fn snapshot_with(member_id: &str, name: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.members.insert(
            member_id.to_string(),
            Member {
                name: name.to_string(),
                ..Default::default()
            },
        );
        snapshot
    }

    #[test]
    fn test_set_updated_data_replaces_snapshot() {
        let coordinator = Coordinator::new("acct", EntryOptions::default(), Snapshot::default());
        let before = coordinator.data();

        coordinator.set_updated_data(snapshot_with("m1", "Al"));

        assert!(before.members.is_empty());
        assert_eq!(coordinator.data().members["m1"].name, "Al");
    }

    #[test]
    fn test_listeners_notified_until_cancelled() {
        let coordinator = Coordinator::new("acct", EntryOptions::default(), Snapshot::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let subscription = coordinator.add_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(coordinator.listener_count(), 1);

        coordinator.set_updated_data(Snapshot::default());
        coordinator.set_update_failed("timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        subscription.cancel();
        assert_eq!(coordinator.listener_count(), 0);

        coordinator.set_updated_data(Snapshot::default());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let coordinator = Coordinator::new("acct", EntryOptions::default(), Snapshot::default());
        {
            let _subscription = coordinator.add_listener(|| {});
            assert_eq!(coordinator.listener_count(), 1);
        }
        assert_eq!(coordinator.listener_count(), 0);
    }

    #[test]
    fn test_update_failure_keeps_data() {
        let coordinator =
            Coordinator::new("acct", EntryOptions::default(), snapshot_with("m1", "Al"));
        assert!(coordinator.last_update_success());

        coordinator.set_update_failed("HTTP 500");
        assert!(!coordinator.last_update_success());
        assert_eq!(coordinator.data().members.len(), 1);

        coordinator.set_updated_data(snapshot_with("m2", "Bo"));
        assert!(coordinator.last_update_success());
    }

    #[test]
    fn test_listener_may_subscribe_during_notification() {
        let coordinator = Arc::new(Coordinator::new(
            "acct",
            EntryOptions::default(),
            Snapshot::default(),
        ));
        let nested: Arc<Mutex<Vec<Subscription>>> = Arc::default();

        let weak = Arc::downgrade(&coordinator);
        let held = nested.clone();
        let _outer = coordinator.add_listener(move || {
            if let Some(coordinator) = weak.upgrade() {
                held.lock().unwrap().push(coordinator.add_listener(|| {}));
            }
        });

        coordinator.set_updated_data(Snapshot::default());
        assert_eq!(coordinator.listener_count(), 2);
        assert_eq!(nested.lock().unwrap().len(), 1);
    }
}
