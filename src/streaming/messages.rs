//! Viewer protocol topics and payloads
//!
//! Server to viewer:
//! - `real-time-update`: one [`TelemetryRecord`](crate::core::types::TelemetryRecord)
//! - `time-update`: [`TimeUpdate`] heartbeat, 1Hz
//! - `team-<id>-image`: one relayed [`ImageFrame`](crate::core::types::ImageFrame)
//!
//! Viewer to server:
//! - `telemetry-data`: partial record merge
//! - `image-stream`: camera frame (loopback publishers only)
//! - `camera_ready`: opens the serial link if needed
//! - `rudder-center` / `rudder-command`: operator rudder control

use serde::{Deserialize, Serialize};

pub const TOPIC_REAL_TIME_UPDATE: &str = "real-time-update";
pub const TOPIC_TIME_UPDATE: &str = "time-update";
pub const TOPIC_TELEMETRY_DATA: &str = "telemetry-data";
pub const TOPIC_IMAGE_STREAM: &str = "image-stream";
pub const TOPIC_CAMERA_READY: &str = "camera_ready";
pub const TOPIC_RUDDER_CENTER: &str = "rudder-center";
pub const TOPIC_RUDDER_COMMAND: &str = "rudder-command";

/// Per-team image topic, e.g. `team-TEAM_ASV_01-image`
pub fn image_topic(team_id: &str) -> String {
    format!("team-{}-image", team_id)
}

/// 1Hz wall-clock heartbeat broadcast to all viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeUpdate {
    pub geotime: String,
}

/// Rudder centering request from a viewer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CenterPayload {
    #[serde(default)]
    pub center: Option<f64>,
}

/// Rudder angle request from a viewer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RudderPayload {
    #[serde(default)]
    pub rudder: Option<f64>,
}

/// Camera frame submission from a co-located publisher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamPayload {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub image: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_topic_embeds_team_id() {
        assert_eq!(image_topic("TEAM_ASV_01"), "team-TEAM_ASV_01-image");
    }

    #[test]
    fn test_command_payloads_tolerate_missing_fields() {
        let center: CenterPayload = serde_json::from_str("{}").unwrap();
        assert!(center.center.is_none());

        let rudder: RudderPayload = serde_json::from_str(r#"{"rudder":45}"#).unwrap();
        assert_eq!(rudder.rudder, Some(45.0));
    }

    #[test]
    fn test_image_payload_camel_case() {
        let payload: ImageStreamPayload =
            serde_json::from_str(r#"{"teamId":"TEAM_ASV_02","image":[1,2,3]}"#).unwrap();
        assert_eq!(payload.team_id.as_deref(), Some("TEAM_ASV_02"));
        assert_eq!(payload.image, Some(vec![1, 2, 3]));
    }
}
