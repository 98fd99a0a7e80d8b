/// Entity abstraction
///
/// Every entity exposed to the host implements [`Entity`]; entities whose data
/// comes from a [`Coordinator`](crate::coordinator::Coordinator) additionally
/// implement [`CoordinatorEntity`].
///
/// Base trait that all entities must implement
pub trait Entity: Send {
    /// Stable identifier, unique within the entity's platform
    fn unique_id(&self) -> &str;

    /// Return the platform type of this entity (e.g. "device_tracker")
    fn platform(&self) -> &'static str;

    /// Display name, used to derive the entity id
    fn name(&self) -> Option<&str>;

    fn available(&self) -> bool;

    /// Serialize current state to JSON for the state store
    fn state_json(&self) -> serde_json::Value;

    /// Called once the platform has assigned the entity its id.
    fn added_to_platform(&mut self, _entity_id: &str) {}
}

/// What an entity did with a coordinator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New state should be written to the state store
    Accepted,
    /// Update discarded, previously written state stands
    Ignored,
}

/// An entity driven by coordinator notifications.
pub trait CoordinatorEntity: Entity {
    /// Re-read this entity's data from the coordinator's latest snapshot.
    fn handle_coordinator_update(&mut self) -> UpdateOutcome;

    /// Called when the entity is removed from its platform.
    fn will_remove_from_platform(&mut self) {}
}
