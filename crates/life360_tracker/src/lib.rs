//! Life360 location sharing exposed as home-automation device trackers.
//!
//! A [`Coordinator`] holds the latest snapshot of an account's circles and
//! members. [`device_tracker`] turns the members into tracker entities hosted
//! by an [`EntityPlatform`], which writes their state to a [`StateStore`].

pub mod config;
pub mod coordinator;
pub mod device_tracker;
pub mod engine;

use std::sync::Mutex;
use std::sync::MutexGuard;

pub use config::AccountConfig;
pub use config::Config;
pub use config::EntryOptions;
pub use config::LogLevel;
pub use coordinator::Coordinator;
pub use coordinator::Snapshot;
pub use coordinator::Subscription;
pub use device_tracker::DeviceTracker;
pub use device_tracker::TrackedMembers;
pub use device_tracker::TrackerEntry;
pub use engine::EntityPlatform;
pub use engine::StateStore;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
