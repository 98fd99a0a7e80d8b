//! Typed view of the data the polling coordinator caches between refreshes.
//!
//! The coordinator hands over a complete snapshot on every refresh. Its shape is
//! checked once, here, so everything downstream can rely on the fields being
//! present and in range instead of probing a dynamic map.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;

/// A complete refresh: every circle the account can see and every member of them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Snapshot {
    pub circles: BTreeMap<String, Circle>,
    pub members: BTreeMap<String, Member>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Circle {
    pub name: String,

    /// Ids of the members belonging to this circle, keys into `Snapshot::members`.
    pub members: Vec<String>,

    pub places: BTreeMap<String, Place>,
}

/// A named geofence defined inside a circle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,

    /// Radius in meters
    pub radius: f64,
}

/// Location and device data for one member.
///
/// Only `name` is guaranteed. Everything else may be missing or `null` in the
/// upstream data and is surfaced as `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Member {
    pub name: String,

    #[serde(default)]
    pub entity_picture: Option<String>,

    /// Percentage, 0-100
    #[serde(default)]
    pub battery_level: Option<u8>,

    #[serde(default)]
    pub battery_charging: Option<bool>,

    /// Meters
    #[serde(default)]
    pub gps_accuracy: Option<u32>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub at_loc_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub driving: Option<bool>,

    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    /// Name of the place the member is currently at, if any
    #[serde(default)]
    pub place: Option<String>,

    #[serde(default)]
    pub speed: Option<f64>,

    #[serde(default)]
    pub wifi_on: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {kind} {id}: {reason}")]
    Invalid {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

impl Snapshot {
    /// Parse and validate a snapshot from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Parse and validate a snapshot from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the value ranges serde cannot express.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for circle in self.circles.values() {
            for (place_id, place) in &circle.places {
                check_coordinates("place", place_id, Some(place.latitude), Some(place.longitude))?;
                if !place.radius.is_finite() || place.radius < 0.0 {
                    return Err(invalid("place", place_id, format!("radius {}", place.radius)));
                }
            }
        }

        for (member_id, member) in &self.members {
            check_coordinates("member", member_id, member.latitude, member.longitude)?;
            if let Some(level) = member.battery_level {
                if level > 100 {
                    return Err(invalid("member", member_id, format!("battery level {}", level)));
                }
            }
            if let Some(speed) = member.speed {
                if !speed.is_finite() || speed < 0.0 {
                    return Err(invalid("member", member_id, format!("speed {}", speed)));
                }
            }
        }

        Ok(())
    }

    /// Look up a member's data by id.
    pub fn member(&self, member_id: &str) -> Option<&Member> {
        self.members.get(member_id)
    }
}

fn check_coordinates(
    kind: &'static str,
    id: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<(), SnapshotError> {
    if let Some(lat) = latitude {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(invalid(kind, id, format!("latitude {}", lat)));
        }
    }
    if let Some(lon) = longitude {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(invalid(kind, id, format!("longitude {}", lon)));
        }
    }
    Ok(())
}

fn invalid(kind: &'static str, id: &str, reason: String) -> SnapshotError {
    SnapshotError::Invalid {
        kind,
        id: id.to_string(),
        reason,
    }
}
