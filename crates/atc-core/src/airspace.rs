//! Airspace configuration document: waypoints, airways and sectors.

use crate::error::{CoreError, Result};
use crate::waypoint::{Airway, Sector, WaypointRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointConfig {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// On-disk description of the airspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirspaceConfig {
    pub waypoints: Vec<WaypointConfig>,
    #[serde(default)]
    pub airways: Vec<Airway>,
    #[serde(default)]
    pub sectors: Vec<Sector>,
}

/// A loaded airspace: every waypoint registered, every airway resolvable.
#[derive(Debug, Clone, Default)]
pub struct Airspace {
    pub registry: WaypointRegistry,
    pub airways: Vec<Airway>,
    pub sectors: Vec<Sector>,
}

impl AirspaceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Register every waypoint and check every airway and sector.
    pub fn build(self) -> Result<Airspace> {
        let mut registry = WaypointRegistry::new();
        for waypoint in &self.waypoints {
            registry.register(&waypoint.name, waypoint.x, waypoint.y, waypoint.z)?;
        }
        for airway in &self.airways {
            if airway.waypoints.is_empty() {
                return Err(CoreError::EmptyAirway(airway.name.clone()));
            }
            airway.resolve(&registry)?;
        }
        for sector in &self.sectors {
            for point in &sector.points {
                point.validate()?;
            }
        }

        tracing::info!(
            waypoints = registry.len(),
            airways = self.airways.len(),
            sectors = self.sectors.len(),
            "airspace loaded"
        );
        Ok(Airspace {
            registry,
            airways: self.airways,
            sectors: self.sectors,
        })
    }
}

impl Airspace {
    pub fn airway(&self, name: &str) -> Option<&Airway> {
        self.airways.iter().find(|airway| airway.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const CROSS: &str = r#"{
        "waypoints": [
            {"name": "A", "x": 0.2, "y": 0.5},
            {"name": "B", "x": 0.5, "y": 0.5},
            {"name": "C", "x": 0.8, "y": 0.5, "z": 0.3}
        ],
        "airways": [{"name": "UN1", "waypoints": ["A", "B", "C"]}],
        "sectors": [{"name": "S", "kind": "secondary",
                     "points": [{"x": 0.0, "y": 0.0, "z": 0.0},
                                {"x": 1.0, "y": 0.0, "z": 0.0},
                                {"x": 1.0, "y": 1.0, "z": 0.0}]}]
    }"#;

    #[test]
    fn builds_registry_and_airways() {
        let airspace = AirspaceConfig::from_json(CROSS).unwrap().build().unwrap();
        assert_eq!(airspace.registry.len(), 3);
        assert_eq!(airspace.registry.lookup("C").unwrap().point.z, 0.3);
        assert_eq!(airspace.airway("UN1").unwrap().waypoints.len(), 3);
        assert_eq!(airspace.sectors.len(), 1);
    }

    #[test]
    fn unknown_airway_waypoint_is_rejected() {
        let mut config = AirspaceConfig::from_json(CROSS).unwrap();
        config.airways[0].waypoints.push("Z".into());
        let err = config.build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingCollaborator);
    }

    #[test]
    fn duplicate_waypoint_is_rejected() {
        let mut config = AirspaceConfig::from_json(CROSS).unwrap();
        config.waypoints.push(WaypointConfig {
            name: "A".into(),
            x: 0.1,
            y: 0.1,
            z: 0.0,
        });
        assert!(matches!(config.build(), Err(CoreError::DuplicateWaypoint(_))));
    }
}
