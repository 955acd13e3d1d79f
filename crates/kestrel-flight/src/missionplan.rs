//! Import of QGroundControl `.plan` files into uploadable mission items.
//!
//! Only NAV_WAYPOINT items are flyable here; everything else in the plan
//! (speed changes, camera actions) is skipped with a debug line.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use kestrel_vehicle::MissionItem;

const MAV_CMD_NAV_WAYPOINT: u32 = 16;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("reading plan file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing plan file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plan contains no flyable waypoints")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    mission: PlanMission,
}

#[derive(Debug, Deserialize)]
struct PlanMission {
    items: Vec<PlanItem>,
}

#[derive(Debug, Deserialize)]
struct PlanItem {
    command: u32,
    /// `[hold, accept radius, pass radius, yaw, lat, lon, alt]`; QGC emits
    /// `null` for unused slots.
    params: Vec<Option<f64>>,
}

pub fn import_qgc_plan(path: &Path) -> Result<Vec<MissionItem>, PlanError> {
    let raw = std::fs::read_to_string(path)?;
    parse_qgc_plan(&raw)
}

pub fn parse_qgc_plan(raw: &str) -> Result<Vec<MissionItem>, PlanError> {
    let plan: PlanFile = serde_json::from_str(raw)?;

    let mut items = Vec::new();
    for item in &plan.mission.items {
        if item.command != MAV_CMD_NAV_WAYPOINT {
            debug!(command = item.command, "skipping non-waypoint plan item");
            continue;
        }
        let (Some(lat), Some(lon), Some(alt)) = (
            item.params.get(4).copied().flatten(),
            item.params.get(5).copied().flatten(),
            item.params.get(6).copied().flatten(),
        ) else {
            debug!("skipping waypoint without coordinates");
            continue;
        };
        let hold_s = item.params.first().copied().flatten().unwrap_or(0.0);
        items.push(MissionItem {
            latitude_deg: lat,
            longitude_deg: lon,
            relative_altitude_m: alt as f32,
            speed_m_s: None,
            is_fly_through: hold_s == 0.0,
        });
    }

    if items.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "fileType": "Plan",
        "mission": {
            "cruiseSpeed": 15,
            "items": [
                {
                    "command": 16,
                    "frame": 3,
                    "params": [0, null, 0, null, 47.39803985, 8.54557254, 25]
                },
                {
                    "command": 178,
                    "frame": 2,
                    "params": [1, 5, -1, 0, 0, 0, 0]
                },
                {
                    "command": 16,
                    "frame": 3,
                    "params": [2, null, 0, null, 47.39803622, 8.54501464, 25]
                }
            ]
        },
        "version": 1
    }"#;

    #[test]
    fn imports_waypoints_and_skips_other_commands() {
        let items = parse_qgc_plan(SAMPLE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].latitude_deg, 47.39803985);
        assert_eq!(items[0].longitude_deg, 8.54557254);
        assert_eq!(items[0].relative_altitude_m, 25.0);
        assert!(items[0].is_fly_through);
        // Second waypoint has a 2 s hold, so it is not fly-through.
        assert!(!items[1].is_fly_through);
    }

    #[test]
    fn plan_without_waypoints_is_an_error() {
        let raw = r#"{"mission": {"items": [{"command": 178, "params": [1, 5, -1, 0, 0, 0, 0]}]}}"#;
        assert!(matches!(parse_qgc_plan(raw), Err(PlanError::Empty)));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(parse_qgc_plan("{"), Err(PlanError::Json(_))));
    }
}
