use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::lock;

/// Member ids currently exposed as tracker entities.
///
/// One registry is shared by every account set up in the process, so a member
/// visible through two accounts is only tracked once. Clones share the same
/// underlying set.
#[derive(Debug, Clone, Default)]
pub struct TrackedMembers {
    members: Arc<Mutex<BTreeSet<String>>>,
}

impl TrackedMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a member id. Returns false if it was already tracked.
    pub fn insert(&self, member_id: &str) -> bool {
        lock(&self.members).insert(member_id.to_string())
    }

    /// Release a member id. Returns false if it was not tracked.
    pub fn remove(&self, member_id: &str) -> bool {
        lock(&self.members).remove(member_id)
    }

    pub fn contains(&self, member_id: &str) -> bool {
        lock(&self.members).contains(member_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.members).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
