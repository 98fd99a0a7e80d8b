// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod coordinator;
mod snapshot;

pub use coordinator::Coordinator;
pub use coordinator::Listener;
pub use coordinator::Subscription;
pub use snapshot::Circle;
pub use snapshot::Member;
pub use snapshot::Place;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotError;
