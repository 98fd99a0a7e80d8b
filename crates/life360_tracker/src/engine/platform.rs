use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use tracing::debug;
use tracing::error;
use tracing::info;

use super::entity::CoordinatorEntity;
use super::entity::UpdateOutcome;
use super::state::StateStore;
use crate::coordinator::Coordinator;
use crate::coordinator::Subscription;
use crate::lock;

/// Sink that newly discovered entities are handed to.
pub trait AddEntities<E> {
    fn add_entities(&self, entities: Vec<E>);
}

impl<E, F> AddEntities<E> for F
where
    F: Fn(Vec<E>),
{
    fn add_entities(&self, entities: Vec<E>) {
        self(entities)
    }
}

struct PlatformEntry<E> {
    unique_id: String,
    entity: Arc<Mutex<E>>,
    /// Keeps the entity subscribed to its coordinator
    subscription: Subscription,
}

/// Hosts the entities of one platform (e.g. `device_tracker`) for one account.
///
/// Assigns entity ids, subscribes each entity to the coordinator, and writes
/// accepted updates to the state store.
pub struct EntityPlatform<E> {
    domain: &'static str,

    /// Prefix for generated entity ids
    namespace: Option<String>,

    coordinator: Arc<Coordinator>,

    states: Arc<StateStore>,

    /// Map of entity_id -> entity
    entities: Mutex<BTreeMap<String, PlatformEntry<E>>>,
}

impl<E: CoordinatorEntity + 'static> EntityPlatform<E> {
    pub fn new(
        domain: &'static str,
        coordinator: Arc<Coordinator>,
        namespace: Option<String>,
        states: Arc<StateStore>,
    ) -> Self {
        Self {
            domain,
            namespace,
            coordinator,
            states,
            entities: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn states(&self) -> &Arc<StateStore> {
        &self.states
    }

    pub fn entity_ids(&self) -> Vec<String> {
        lock(&self.entities).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entities).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the entity id assigned to an entity with the given unique id.
    pub fn entity_id_for(&self, unique_id: &str) -> Option<String> {
        lock(&self.entities)
            .iter()
            .find(|(_, entry)| entry.unique_id == unique_id)
            .map(|(entity_id, _)| entity_id.clone())
    }

    /// Run `f` against a registered entity.
    pub fn with_entity<R>(&self, entity_id: &str, f: impl FnOnce(&E) -> R) -> Option<R> {
        let entity = lock(&self.entities).get(entity_id)?.entity.clone();
        let entity = lock(&entity);
        Some(f(&entity))
    }

    /// Remove an entity: unsubscribe it, let it tear down, drop its state.
    ///
    /// Returns false if no such entity is registered.
    pub fn remove_entity(&self, entity_id: &str) -> bool {
        let entry = match lock(&self.entities).remove(entity_id) {
            Some(entry) => entry,
            None => return false,
        };
        drop(entry.subscription);

        lock(&entry.entity).will_remove_from_platform();
        self.states.remove(entity_id);
        info!("Entity removed: {} ({})", entity_id, entry.unique_id);
        true
    }

    /// Remove every entity, e.g. when the account is unloaded.
    pub fn unload(&self) {
        for entity_id in self.entity_ids() {
            self.remove_entity(&entity_id);
        }
    }

    fn add_entity(&self, mut entity: E) {
        let unique_id = entity.unique_id().to_string();
        if entity.platform() != self.domain {
            error!(
                "Entity {} belongs to platform {}, not {}",
                unique_id,
                entity.platform(),
                self.domain
            );
            entity.will_remove_from_platform();
            return;
        }

        let mut entities = lock(&self.entities);

        if entities.values().any(|entry| entry.unique_id == unique_id) {
            error!(
                "Platform {} does not generate unique IDs. ID {} already exists - ignoring {}",
                self.domain,
                unique_id,
                entity.name().unwrap_or(&unique_id)
            );
            entity.will_remove_from_platform();
            return;
        }

        let entity_id = self.generate_entity_id(entity.name(), &unique_id, |candidate| {
            entities.contains_key(candidate)
        });
        entity.added_to_platform(&entity_id);
        self.states.write(&entity_id, entity.state_json());

        let entity = Arc::new(Mutex::new(entity));
        let subscription = self.coordinator.add_listener(update_listener(
            entity_id.clone(),
            Arc::downgrade(&entity),
            Arc::downgrade(&self.states),
        ));

        info!("Entity added: {} ({})", entity_id, unique_id);
        entities.insert(
            entity_id,
            PlatformEntry {
                unique_id,
                entity,
                subscription,
            },
        );
    }

    fn generate_entity_id(
        &self,
        name: Option<&str>,
        unique_id: &str,
        taken: impl Fn(&str) -> bool,
    ) -> String {
        let name = name.unwrap_or(unique_id);
        let object_id = match &self.namespace {
            Some(namespace) => slugify(&format!("{} {}", namespace, name)),
            None => slugify(name),
        };
        let object_id = if object_id.is_empty() {
            "unnamed".to_string()
        } else {
            object_id
        };

        let base = format!("{}.{}", self.domain, object_id);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while taken(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        candidate
    }
}

impl<E: CoordinatorEntity + 'static> AddEntities<E> for EntityPlatform<E> {
    fn add_entities(&self, entities: Vec<E>) {
        for entity in entities {
            self.add_entity(entity);
        }
    }
}

fn update_listener<E: CoordinatorEntity + 'static>(
    entity_id: String,
    entity: Weak<Mutex<E>>,
    states: Weak<StateStore>,
) -> impl Fn() + Send + Sync + 'static {
    move || {
        let (Some(entity), Some(states)) = (entity.upgrade(), states.upgrade()) else {
            return;
        };
        let mut entity = lock(&entity);
        match entity.handle_coordinator_update() {
            UpdateOutcome::Accepted => states.write(&entity_id, entity.state_json()),
            UpdateOutcome::Ignored => debug!("State of {} left unchanged", entity_id),
        }
    }
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to `_`.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}
