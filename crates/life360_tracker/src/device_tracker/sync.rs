use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use super::filter::InclusionFilter;
use super::filter::IncludeAll;
use super::registry::TrackedMembers;
use super::tracker::DeviceTracker;
use crate::coordinator::Coordinator;
use crate::coordinator::Place;
use crate::engine::AddEntities;

/// What a synchronization pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Member ids that got a new tracker entity
    pub added: Vec<String>,

    /// Circles seen for the first time, with their inclusion decision
    pub circle_decisions: Vec<(String, bool)>,

    /// Members seen for the first time, with their tracking decision
    pub member_decisions: Vec<(String, bool)>,

    /// Place ids logged for the first time
    pub new_places: Vec<String>,
}

/// Decides which members of one account become tracker entities.
///
/// Runs once at setup and again on every coordinator notification. A member is
/// picked up when it belongs to at least one included circle, passes the
/// member filter, and is not already tracked (by this or any other account).
/// Entities are never removed here.
pub struct MemberSync {
    account: String,
    coordinator: Arc<Coordinator>,
    tracked: TrackedMembers,

    circle_filter: Box<dyn InclusionFilter>,
    member_filter: Box<dyn InclusionFilter>,

    // Only used to log each decision once
    logged_circles: HashSet<String>,
    logged_places: HashSet<String>,
    logged_members: HashSet<String>,
}

impl MemberSync {
    pub fn new(
        account: impl Into<String>,
        coordinator: Arc<Coordinator>,
        tracked: TrackedMembers,
    ) -> Self {
        Self {
            account: account.into(),
            coordinator,
            tracked,
            circle_filter: Box::new(IncludeAll),
            member_filter: Box::new(IncludeAll),
            logged_circles: HashSet::new(),
            logged_places: HashSet::new(),
            logged_members: HashSet::new(),
        }
    }

    pub fn with_circle_filter(mut self, filter: Box<dyn InclusionFilter>) -> Self {
        self.circle_filter = filter;
        self
    }

    pub fn with_member_filter(mut self, filter: Box<dyn InclusionFilter>) -> Self {
        self.member_filter = filter;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Scan the coordinator's current snapshot and hand trackers for newly
    /// qualifying members to `sink`, all in one call.
    pub fn process_data(&mut self, sink: &dyn AddEntities<DeviceTracker>) -> PassReport {
        let data = self.coordinator.data();
        let mut report = PassReport::default();
        let mut included_circles_members: HashSet<&str> = HashSet::new();

        for (circle_id, circle) in &data.circles {
            let circle_desc = format!("Circle {} from account {}", circle.name, self.account);
            let include = self.circle_filter.include(&circle.name);
            if self.logged_circles.insert(circle_id.clone()) {
                info!("{}", describe_circle_decision(&circle_desc, include));
                report.circle_decisions.push((circle_id.clone(), include));
            }

            if !include {
                continue;
            }

            included_circles_members.extend(circle.members.iter().map(String::as_str));

            let mut new_places = Vec::new();
            for (place_id, place) in &circle.places {
                if self.logged_places.insert(place_id.clone()) {
                    new_places.push(place);
                    report.new_places.push(place_id.clone());
                }
            }
            if !new_places.is_empty() {
                debug!("{}", describe_places(&circle_desc, &new_places));
            }
        }

        let mut new_entities = Vec::new();
        for (member_id, member) in &data.members {
            let eligible = included_circles_members.contains(member_id.as_str())
                && !self.tracked.contains(member_id)
                && self.member_filter.include(&member.name);
            // The insert is the claim: another account may have taken the
            // member since the check above.
            let include = eligible && self.tracked.insert(member_id);
            if self.logged_members.insert(member_id.clone()) {
                info!(
                    "{}",
                    describe_member_decision(&member.name, include, &self.account)
                );
                report.member_decisions.push((member_id.clone(), include));
            }

            if !include {
                continue;
            }

            new_entities.push(DeviceTracker::new(
                self.coordinator.clone(),
                self.tracked.clone(),
                member_id.clone(),
                member.clone(),
            ));
            report.added.push(member_id.clone());
        }

        if !new_entities.is_empty() {
            sink.add_entities(new_entities);
        }
        report
    }
}

fn not(include: bool) -> &'static str {
    if include {
        ""
    } else {
        " NOT"
    }
}

fn describe_circle_decision(circle_desc: &str, include: bool) -> String {
    format!("{}: will{} be included", circle_desc, not(include))
}

fn describe_member_decision(name: &str, include: bool, account: &str) -> String {
    format!("{}: will{} be tracked via account {}", name, not(include), account)
}

fn describe_places(circle_desc: &str, places: &[&Place]) -> String {
    let mut msg = format!("{}: Places:", circle_desc);
    for place in places {
        msg.push_str(&format!("\n- name: {}", place.name));
        msg.push_str(&format!("\n  latitude: {}", place.latitude));
        msg.push_str(&format!("\n  longitude: {}", place.longitude));
        msg.push_str(&format!("\n  radius: {}", place.radius));
    }
    msg
}
