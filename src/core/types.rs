//! Telemetry data model
//!
//! Field names serialize in camelCase because the dashboard viewers
//! consume these payloads directly as JSON objects.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Team identifier used when a source does not name one
pub const DEFAULT_TEAM_ID: &str = "TEAM_ASV_01";

/// Mission name reported by the deployed vehicle
pub const DEFAULT_MISSION: &str = "Navigation";

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// Full telemetry record for one team
///
/// This is the unit the state store keeps and the unit broadcast to
/// viewers on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub team_id: String,
    pub position: Position,
    /// Speed over ground (knots)
    pub sog: f64,
    /// Course over ground (degrees)
    pub cog: f64,
    /// Battery level (percent)
    pub battery: f64,
    pub mission: String,
    /// RFC 3339 timestamp of the last update
    pub geotime: String,
}

impl TelemetryRecord {
    /// Build a record for the serial-attached vehicle from a parsed fix
    pub fn from_fix(lat: f64, lng: f64, sog: f64, cog: f64, battery: f64) -> Self {
        Self {
            team_id: DEFAULT_TEAM_ID.to_string(),
            position: Position { lat, lng },
            sog,
            cog,
            battery,
            mission: DEFAULT_MISSION.to_string(),
            geotime: geotime_now(),
        }
    }
}

/// Partial telemetry update from a structured source
///
/// Absent fields keep whatever the store already holds for the team.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPatch {
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub sog: Option<f64>,
    #[serde(default)]
    pub cog: Option<f64>,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub geotime: Option<String>,
}

/// One camera frame relayed between viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFrame {
    pub team_id: String,
    /// Encoded image bytes, passed through untouched
    pub image: Vec<u8>,
}

/// Current wall-clock time as an RFC 3339 string with millisecond precision
pub fn geotime_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_camel_case() {
        let record = TelemetryRecord::from_fix(-6.129765, 106.834950, 2.53, 87.41, 100.0);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["teamId"], "TEAM_ASV_01");
        assert_eq!(json["mission"], "Navigation");
        assert_eq!(json["position"]["lat"], -6.129765);
        assert_eq!(json["position"]["lng"], 106.834950);
        assert_eq!(json["sog"], 2.53);
        assert_eq!(json["cog"], 87.41);
        assert!(json["geotime"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_patch_tolerates_missing_fields() {
        let patch: TelemetryPatch =
            serde_json::from_str(r#"{"teamId":"TEAM_ASV_02","sog":1.5}"#).unwrap();
        assert_eq!(patch.team_id, "TEAM_ASV_02");
        assert_eq!(patch.sog, Some(1.5));
        assert!(patch.position.is_none());
        assert!(patch.mission.is_none());
    }

    #[test]
    fn test_geotime_is_rfc3339() {
        let ts = geotime_now();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }
}
