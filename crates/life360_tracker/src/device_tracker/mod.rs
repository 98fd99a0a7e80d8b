//! Life360 device tracker platform.
//!
//! Exposes circle members as `device_tracker` entities: [`MemberSync`] decides
//! which members get an entity, [`DeviceTracker`] maps a member's data onto the
//! entity's properties.

mod filter;
mod registry;
mod sync;
mod tracker;

use std::sync::Arc;
use std::sync::Mutex;

use tracing::info;

pub use filter::filter_from_config;
pub use filter::FilterMode;
pub use filter::IncludeAll;
pub use filter::InclusionFilter;
pub use filter::NameFilter;
pub use registry::TrackedMembers;
pub use sync::MemberSync;
pub use sync::PassReport;
pub use tracker::DeviceTracker;
pub use tracker::ExtraAttribute;
pub use tracker::SourceType;
pub use tracker::TrackerState;
pub use tracker::ATTRIBUTION;
pub use tracker::PLATFORM;

use crate::config::AccountConfig;
use crate::coordinator::Coordinator;
use crate::coordinator::Subscription;
use crate::engine::EntityPlatform;
use crate::engine::StateStore;
use crate::lock;

/// Run a first synchronization pass, then keep `sync` subscribed to its
/// coordinator so every refresh can add entities to `platform`.
///
/// Dropping the returned subscription stops the synchronization.
pub fn setup_entry(
    sync: MemberSync,
    platform: Arc<EntityPlatform<DeviceTracker>>,
) -> Subscription {
    let coordinator = sync.coordinator().clone();
    let sync = Arc::new(Mutex::new(sync));

    lock(&sync).process_data(platform.as_ref());

    let platform = Arc::downgrade(&platform);
    coordinator.add_listener(move || {
        let Some(platform) = platform.upgrade() else {
            return;
        };
        lock(&sync).process_data(platform.as_ref());
    })
}

/// A set-up account: its tracker platform and the synchronizer subscription.
pub struct TrackerEntry {
    account: String,
    platform: Arc<EntityPlatform<DeviceTracker>>,
    subscription: Subscription,
}

impl TrackerEntry {
    /// Set up the device tracker platform for one configured account.
    pub fn from_config(
        account: &str,
        config: &AccountConfig,
        coordinator: Arc<Coordinator>,
        tracked: TrackedMembers,
        states: Arc<StateStore>,
    ) -> Self {
        info!("Setting up device trackers for account {}", account);

        let platform = Arc::new(EntityPlatform::new(
            PLATFORM,
            coordinator.clone(),
            coordinator.options().prefix.clone(),
            states,
        ));
        let sync = MemberSync::new(account, coordinator, tracked)
            .with_circle_filter(filter_from_config(config.circles.as_ref()))
            .with_member_filter(filter_from_config(config.members.as_ref()));
        let subscription = setup_entry(sync, platform.clone());

        Self {
            account: account.to_string(),
            platform,
            subscription,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn platform(&self) -> &Arc<EntityPlatform<DeviceTracker>> {
        &self.platform
    }

    /// Stop synchronizing and remove every entity of this account.
    pub fn unload(self) {
        info!("Unloading device trackers for account {}", self.account);
        self.subscription.cancel();
        self.platform.unload();
    }
}
