mod entity;
mod platform;
mod state;

pub use entity::CoordinatorEntity;
pub use entity::Entity;
pub use entity::UpdateOutcome;
pub use platform::AddEntities;
pub use platform::EntityPlatform;
pub use state::StateStore;
pub use state::States;
