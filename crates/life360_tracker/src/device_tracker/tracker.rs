use std::sync::Arc;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use strum::IntoEnumIterator;
use tracing::debug;
use tracing::warn;

use super::registry::TrackedMembers;
use crate::coordinator::Coordinator;
use crate::coordinator::Member;
use crate::engine::CoordinatorEntity;
use crate::engine::Entity;
use crate::engine::UpdateOutcome;

pub const PLATFORM: &str = "device_tracker";

pub const ATTRIBUTION: &str = "Data provided by life360.com";

/// Where a tracker's position comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceType {
    Gps,
}

/// Member fields exposed as extra state attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ExtraAttribute {
    Address,
    AtLocSince,
    BatteryCharging,
    Driving,
    LastSeen,
    Place,
    Speed,
    WifiOn,
}

impl ExtraAttribute {
    /// The member's value for this attribute, `None` if not reported.
    fn value(self, member: &Member) -> Option<Value> {
        match self {
            Self::Address => member.address.clone().map(Value::String),
            Self::AtLocSince => member.at_loc_since.map(|t| Value::String(t.to_rfc3339())),
            Self::BatteryCharging => member.battery_charging.map(Value::Bool),
            Self::Driving => member.driving.map(Value::Bool),
            Self::LastSeen => member.last_seen.map(|t| Value::String(t.to_rfc3339())),
            Self::Place => member.place.clone().map(Value::String),
            Self::Speed => member.speed.and_then(serde_json::Number::from_f64).map(Value::Number),
            Self::WifiOn => member.wifi_on.map(Value::Bool),
        }
    }
}

/// The state a tracker writes to the state store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerState {
    pub available: bool,
    pub friendly_name: String,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_accuracy: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_picture: Option<String>,
    pub attribution: &'static str,
    pub attributes: Map<String, Value>,
}

/// Tracker entity for one circle member.
///
/// Holds the member's slice of the coordinator's latest snapshot. The slice is
/// looked up again on every coordinator update because the snapshot is
/// replaced wholesale and may no longer contain the member at all, in which
/// case the tracker reports itself unavailable.
pub struct DeviceTracker {
    coordinator: Arc<Coordinator>,
    tracked: TrackedMembers,
    member_id: String,

    /// Assigned by the platform
    entity_id: Option<String>,

    name: String,
    data: Option<Member>,
}

impl DeviceTracker {
    /// Create a tracker for a member present in the current snapshot.
    pub fn new(
        coordinator: Arc<Coordinator>,
        tracked: TrackedMembers,
        member_id: impl Into<String>,
        member: Member,
    ) -> Self {
        Self {
            coordinator,
            tracked,
            member_id: member_id.into(),
            entity_id: None,
            name: member.name.clone(),
            data: Some(member),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribution(&self) -> &'static str {
        ATTRIBUTION
    }

    /// State changes are only written on real data changes.
    pub fn force_update(&self) -> bool {
        false
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success() && self.data.is_some()
    }

    pub fn entity_picture(&self) -> Option<&str> {
        if !self.available() {
            return None;
        }
        self.data.as_ref()?.entity_picture.as_deref()
    }

    /// Percentage, 0-100
    pub fn battery_level(&self) -> Option<u8> {
        self.data.as_ref()?.battery_level
    }

    pub fn source_type(&self) -> SourceType {
        SourceType::Gps
    }

    /// Meters
    pub fn location_accuracy(&self) -> Option<u32> {
        self.data.as_ref()?.gps_accuracy
    }

    pub fn latitude(&self) -> Option<f64> {
        self.data.as_ref()?.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.data.as_ref()?.longitude
    }

    /// Non-null extra attributes.
    ///
    /// With a driving speed configured, `driving` is also true whenever the
    /// member's speed exceeds it.
    pub fn extra_state_attributes(&self) -> Option<Map<String, Value>> {
        let member = self.data.as_ref()?;
        let mut attrs: Map<String, Value> = ExtraAttribute::iter()
            .filter_map(|attr| Some((attr.to_string(), attr.value(member)?)))
            .collect();

        if let Some(driving_speed) = self.coordinator.options().driving_speed {
            let driving = member.driving.unwrap_or(false)
                || member.speed.is_some_and(|speed| speed > driving_speed);
            attrs.insert(ExtraAttribute::Driving.to_string(), Value::Bool(driving));
        }

        Some(attrs)
    }

    pub fn state(&self) -> TrackerState {
        let available = self.available();
        TrackerState {
            available,
            friendly_name: self.name.clone(),
            source_type: self.source_type(),
            latitude: self.latitude().filter(|_| available),
            longitude: self.longitude().filter(|_| available),
            gps_accuracy: self.location_accuracy().filter(|_| available),
            battery_level: self.battery_level().filter(|_| available),
            entity_picture: self.entity_picture().map(String::from),
            attribution: ATTRIBUTION,
            attributes: if available {
                self.extra_state_attributes().unwrap_or_default()
            } else {
                Map::new()
            },
        }
    }

    fn log_name(&self) -> &str {
        self.entity_id.as_deref().unwrap_or(&self.member_id)
    }
}

impl Entity for DeviceTracker {
    fn unique_id(&self) -> &str {
        &self.member_id
    }

    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn available(&self) -> bool {
        DeviceTracker::available(self)
    }

    fn state_json(&self) -> Value {
        serde_json::to_value(self.state()).unwrap_or_default()
    }

    fn added_to_platform(&mut self, entity_id: &str) {
        self.entity_id = Some(entity_id.to_string());
    }
}

impl CoordinatorEntity for DeviceTracker {
    fn handle_coordinator_update(&mut self) -> UpdateOutcome {
        let data = self.coordinator.data().member(&self.member_id).cloned();

        let max_gps_accuracy = self.coordinator.options().max_gps_accuracy;
        let accuracy = data.as_ref().and_then(|member| member.gps_accuracy);
        if let (Some(max), Some(accuracy)) = (max_gps_accuracy, accuracy) {
            if accuracy > max {
                warn!(
                    "{}: Ignoring update because expected GPS accuracy ({}) is not met: {}",
                    self.log_name(),
                    max,
                    accuracy
                );
                return UpdateOutcome::Ignored;
            }
        }

        if data.is_none() && self.data.is_some() {
            debug!("{}: No data in latest update", self.log_name());
        }
        self.data = data;
        UpdateOutcome::Accepted
    }

    fn will_remove_from_platform(&mut self) {
        if !self.tracked.remove(&self.member_id) {
            warn!("{}: Member {} was not tracked", self.log_name(), self.member_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryOptions;
    use crate::coordinator::Snapshot;

    fn member(accuracy: u32, latitude: f64, longitude: f64) -> Member {
        Member {
            name: "Al".to_string(),
            entity_picture: Some("p.png".to_string()),
            battery_level: Some(80),
            gps_accuracy: Some(accuracy),
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        }
    }

    fn snapshot(member: Member) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.members.insert("m1".to_string(), member);
        snapshot
    }

    fn setup(
        options: EntryOptions,
        initial: Member,
    ) -> (Arc<Coordinator>, TrackedMembers, DeviceTracker) {
        let coordinator = Arc::new(Coordinator::new(
            "acct",
            options,
            snapshot(initial.clone()),
        ));
        let tracked = TrackedMembers::new();
        tracked.insert("m1");
        let tracker = DeviceTracker::new(coordinator.clone(), tracked.clone(), "m1", initial);
        (coordinator, tracked, tracker)
    }

    #[test]
    fn test_properties_from_initial_data() {
        let (_, _, tracker) = setup(EntryOptions::default(), member(10, 1.0, 2.0));

        assert_eq!(tracker.unique_id(), "m1");
        assert_eq!(tracker.name(), "Al");
        assert_eq!(tracker.entity_picture(), Some("p.png"));
        assert_eq!(tracker.battery_level(), Some(80));
        assert_eq!(tracker.location_accuracy(), Some(10));
        assert_eq!(tracker.latitude(), Some(1.0));
        assert_eq!(tracker.longitude(), Some(2.0));
        assert_eq!(tracker.source_type(), SourceType::Gps);
        assert_eq!(tracker.source_type().to_string(), "gps");
        assert_eq!(tracker.attribution(), ATTRIBUTION);
        assert!(!tracker.force_update());
        assert!(Entity::available(&tracker));
    }

    #[test]
    fn test_update_rereads_slice() {
        let (coordinator, _, mut tracker) = setup(EntryOptions::default(), member(10, 1.0, 2.0));

        let mut moved = member(5, 3.0, 4.0);
        moved.entity_picture = Some("new.png".to_string());
        coordinator.set_updated_data(snapshot(moved));

        assert_eq!(tracker.handle_coordinator_update(), UpdateOutcome::Accepted);
        assert_eq!(tracker.latitude(), Some(3.0));
        assert_eq!(tracker.longitude(), Some(4.0));
        assert_eq!(tracker.location_accuracy(), Some(5));
        assert_eq!(tracker.entity_picture(), Some("new.png"));
    }

    #[test]
    fn test_inaccurate_update_ignored() {
        let options = EntryOptions {
            max_gps_accuracy: Some(50),
            ..Default::default()
        };
        let (coordinator, _, mut tracker) = setup(options, member(10, 1.0, 2.0));

        coordinator.set_updated_data(snapshot(member(51, 9.0, 9.0)));
        assert_eq!(tracker.handle_coordinator_update(), UpdateOutcome::Ignored);
        assert_eq!(tracker.latitude(), Some(1.0));
        assert_eq!(tracker.longitude(), Some(2.0));
        assert_eq!(tracker.location_accuracy(), Some(10));
        assert!(tracker.available());

        // exactly at the limit is fine
        coordinator.set_updated_data(snapshot(member(50, 9.0, 9.0)));
        assert_eq!(tracker.handle_coordinator_update(), UpdateOutcome::Accepted);
        assert_eq!(tracker.latitude(), Some(9.0));
    }

    #[test]
    fn test_missing_member_is_unavailable() {
        let (coordinator, _, mut tracker) = setup(EntryOptions::default(), member(10, 1.0, 2.0));

        coordinator.set_updated_data(Snapshot::default());
        assert_eq!(tracker.handle_coordinator_update(), UpdateOutcome::Accepted);

        assert!(!tracker.available());
        assert_eq!(tracker.latitude(), None);
        assert_eq!(tracker.battery_level(), None);
        assert_eq!(tracker.entity_picture(), None);
        assert_eq!(tracker.extra_state_attributes(), None);
        assert_eq!(tracker.name(), "Al");

        let state = tracker.state();
        assert!(!state.available);
        assert!(state.attributes.is_empty());
    }

    #[test]
    fn test_failed_refresh_is_unavailable() {
        let (coordinator, _, mut tracker) = setup(EntryOptions::default(), member(10, 1.0, 2.0));

        coordinator.set_update_failed("timeout");
        assert_eq!(tracker.handle_coordinator_update(), UpdateOutcome::Accepted);
        assert!(!tracker.available());
        assert_eq!(tracker.entity_picture(), None);
        assert_eq!(tracker.state().latitude, None);
    }

    #[test]
    fn test_extra_attributes_skip_nulls() {
        let mut data = member(10, 1.0, 2.0);
        data.address = Some("1 Main St".to_string());
        data.wifi_on = Some(true);
        data.speed = Some(2.5);
        data.at_loc_since = "2024-05-01T12:00:00Z".parse().ok();
        let (_, _, tracker) = setup(EntryOptions::default(), data);

        let attrs = tracker.extra_state_attributes().unwrap();
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs["address"], "1 Main St");
        assert_eq!(attrs["wifi_on"], true);
        assert_eq!(attrs["speed"], 2.5);
        assert_eq!(attrs["at_loc_since"], "2024-05-01T12:00:00+00:00");
        assert!(!attrs.contains_key("driving"));
    }

    #[test]
    fn test_driving_derived_from_speed() {
        let options = EntryOptions {
            driving_speed: Some(10.0),
            ..Default::default()
        };

        let mut fast = member(10, 1.0, 2.0);
        fast.driving = Some(false);
        fast.speed = Some(12.0);
        let (_, _, tracker) = setup(options.clone(), fast);
        assert_eq!(tracker.extra_state_attributes().unwrap()["driving"], true);

        let mut slow = member(10, 1.0, 2.0);
        slow.driving = Some(false);
        slow.speed = Some(10.0);
        let (_, _, tracker) = setup(options.clone(), slow);
        assert_eq!(tracker.extra_state_attributes().unwrap()["driving"], false);

        let mut flagged = member(10, 1.0, 2.0);
        flagged.driving = Some(true);
        flagged.speed = Some(0.0);
        let (_, _, tracker) = setup(options, flagged);
        assert_eq!(tracker.extra_state_attributes().unwrap()["driving"], true);
    }

    #[test]
    fn test_driving_unchanged_without_threshold() {
        let mut fast = member(10, 1.0, 2.0);
        fast.driving = Some(false);
        fast.speed = Some(120.0);
        let (_, _, tracker) = setup(EntryOptions::default(), fast);
        assert_eq!(tracker.extra_state_attributes().unwrap()["driving"], false);
    }

    #[test]
    fn test_teardown_releases_registry_slot() {
        let (_, tracked, mut tracker) = setup(EntryOptions::default(), member(10, 1.0, 2.0));
        assert!(tracked.contains("m1"));

        tracker.will_remove_from_platform();
        assert!(!tracked.contains("m1"));
    }

    #[test]
    fn test_state_json() {
        let (_, _, mut tracker) = setup(EntryOptions::default(), member(10, 1.0, 2.0));
        tracker.added_to_platform("device_tracker.al");
        assert_eq!(tracker.entity_id(), Some("device_tracker.al"));

        let json = tracker.state_json();
        assert_eq!(json["available"], true);
        assert_eq!(json["friendly_name"], "Al");
        assert_eq!(json["source_type"], "gps");
        assert_eq!(json["latitude"], 1.0);
        assert_eq!(json["gps_accuracy"], 10);
        assert_eq!(json["battery_level"], 80);
        assert_eq!(json["attribution"], ATTRIBUTION);
    }
}
