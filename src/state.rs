//! Shared team telemetry store
//!
//! Keeps the latest record per team. Two ingestion paths funnel through
//! the same lock: the serial line parser replaces a team's record
//! wholesale, structured viewer updates merge field by field. Snapshot
//! order is team insertion order so late joiners replay history in the
//! order teams first appeared.

use crate::core::types::{geotime_now, TelemetryPatch, TelemetryRecord};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct StoreInner {
    order: Vec<String>,
    records: HashMap<String, TelemetryRecord>,
}

/// Latest-wins record map keyed by team id
#[derive(Default)]
pub struct TeamStateStore {
    inner: Mutex<StoreInner>,
}

impl TeamStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a team's record wholesale (serial ingestion path)
    pub fn upsert(&self, record: TelemetryRecord) {
        let mut inner = self.inner.lock();
        let team_id = record.team_id.clone();
        if inner.records.insert(team_id.clone(), record).is_none() {
            inner.order.push(team_id);
        }
    }

    /// Merge a partial update into a team's record (structured path)
    ///
    /// Present fields overwrite, absent fields keep their stored value.
    /// A patch for an unknown team becomes a new record with unfilled
    /// fields at their defaults and a fresh geotime.
    pub fn merge(&self, patch: TelemetryPatch) -> TelemetryRecord {
        let mut inner = self.inner.lock();
        let team_id = patch.team_id.clone();

        let mut record = match inner.records.get(&team_id) {
            Some(existing) => existing.clone(),
            None => TelemetryRecord {
                team_id: team_id.clone(),
                position: Default::default(),
                sog: 0.0,
                cog: 0.0,
                battery: 0.0,
                mission: String::new(),
                geotime: geotime_now(),
            },
        };

        if let Some(position) = patch.position {
            record.position = position;
        }
        if let Some(sog) = patch.sog {
            record.sog = sog;
        }
        if let Some(cog) = patch.cog {
            record.cog = cog;
        }
        if let Some(battery) = patch.battery {
            record.battery = battery;
        }
        if let Some(mission) = patch.mission {
            record.mission = mission;
        }
        if let Some(geotime) = patch.geotime {
            record.geotime = geotime;
        }

        if inner
            .records
            .insert(team_id.clone(), record.clone())
            .is_none()
        {
            inner.order.push(team_id);
        }
        record
    }

    /// Snapshot of all records in team insertion order
    pub fn snapshot(&self) -> Vec<(String, TelemetryRecord)> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).map(|r| (id.clone(), r.clone())))
            .collect()
    }

    /// Number of teams currently tracked
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Position;

    fn record(team: &str, sog: f64) -> TelemetryRecord {
        TelemetryRecord {
            team_id: team.to_string(),
            position: Position { lat: 1.0, lng: 2.0 },
            sog,
            cog: 90.0,
            battery: 100.0,
            mission: "Navigation".to_string(),
            geotime: geotime_now(),
        }
    }

    #[test]
    fn test_upsert_replaces_wholesale() {
        let store = TeamStateStore::new();
        store.upsert(record("TEAM_ASV_01", 1.0));
        store.upsert(record("TEAM_ASV_01", 2.0));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.sog, 2.0);
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let store = TeamStateStore::new();
        store.upsert(record("TEAM_ASV_02", 1.0));
        store.upsert(record("TEAM_ASV_01", 1.0));
        store.upsert(record("TEAM_ASV_03", 1.0));
        // Updating an existing team must not move it
        store.upsert(record("TEAM_ASV_01", 5.0));

        let snapshot = store.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["TEAM_ASV_02", "TEAM_ASV_01", "TEAM_ASV_03"]);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let store = TeamStateStore::new();
        store.upsert(record("TEAM_ASV_01", 3.5));

        let merged = store.merge(TelemetryPatch {
            team_id: "TEAM_ASV_01".to_string(),
            cog: Some(180.0),
            ..Default::default()
        });

        assert_eq!(merged.cog, 180.0);
        assert_eq!(merged.sog, 3.5);
        assert_eq!(merged.position.lat, 1.0);
        assert_eq!(merged.mission, "Navigation");
    }

    #[test]
    fn test_merge_unknown_team_creates_record() {
        let store = TeamStateStore::new();
        let merged = store.merge(TelemetryPatch {
            team_id: "TEAM_ASV_07".to_string(),
            sog: Some(4.2),
            ..Default::default()
        });

        assert_eq!(merged.team_id, "TEAM_ASV_07");
        assert_eq!(merged.sog, 4.2);
        assert_eq!(merged.cog, 0.0);
        assert!(merged.mission.is_empty());
        assert!(!merged.geotime.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_serial_replace_after_merge_wins() {
        let store = TeamStateStore::new();
        store.merge(TelemetryPatch {
            team_id: "TEAM_ASV_01".to_string(),
            mission: Some("Docking".to_string()),
            ..Default::default()
        });
        store.upsert(record("TEAM_ASV_01", 9.0));

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].1.mission, "Navigation");
        assert_eq!(snapshot[0].1.sog, 9.0);
    }

    #[test]
    fn test_snapshot_shape_matches_viewer_contract() {
        let store = TeamStateStore::new();
        store.upsert(record("TEAM_ASV_01", 1.0));

        let json = serde_json::to_value(store.snapshot()).unwrap();
        // Entries array: [ [teamId, record], ... ]
        assert_eq!(json[0][0], "TEAM_ASV_01");
        assert_eq!(json[0][1]["teamId"], "TEAM_ASV_01");
    }
}
