//! Named waypoints (balises), airways and sectors.
//!
//! The registry is built once at startup and then only read. It is passed
//! around by handle rather than living in a global.

use crate::error::{CoreError, Result};
use crate::spatial::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named point the aircraft must overfly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    #[serde(flatten)]
    pub point: Point,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, x: f64, y: f64, z: f64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::EmptyWaypointName);
        }
        Ok(Self {
            name,
            point: Point::new(x, y, z)?,
        })
    }
}

/// Keyed collection of every waypoint in the airspace.
#[derive(Debug, Clone, Default)]
pub struct WaypointRegistry {
    waypoints: BTreeMap<String, Waypoint>,
}

impl WaypointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waypoint. Fails on a duplicate name or an out-of-range coordinate.
    pub fn register(&mut self, name: &str, x: f64, y: f64, z: f64) -> Result<&Waypoint> {
        if self.waypoints.contains_key(name) {
            return Err(CoreError::DuplicateWaypoint(name.to_string()));
        }
        let waypoint = Waypoint::new(name, x, y, z)?;
        Ok(self.waypoints.entry(name.to_string()).or_insert(waypoint))
    }

    pub fn lookup(&self, name: &str) -> Option<&Waypoint> {
        self.waypoints.get(name)
    }

    /// Resolve a name or fail with `UnknownWaypoint`.
    pub fn require(&self, name: &str) -> Result<&Waypoint> {
        self.lookup(name)
            .ok_or_else(|| CoreError::UnknownWaypoint(name.to_string()))
    }

    /// Snapshot of all waypoints, ordered by name.
    pub fn all(&self) -> Vec<Waypoint> {
        self.waypoints.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// A named ordered sequence of waypoint names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airway {
    pub name: String,
    pub waypoints: Vec<String>,
}

impl Airway {
    pub fn new(name: impl Into<String>, waypoints: Vec<String>) -> Self {
        Self {
            name: name.into(),
            waypoints,
        }
    }

    /// Resolve every name against the registry, in order.
    pub fn resolve(&self, registry: &WaypointRegistry) -> Result<Vec<Waypoint>> {
        self.waypoints
            .iter()
            .map(|name| registry.require(name).cloned())
            .collect()
    }

    /// The same airway flown the other way.
    pub fn reversed(&self) -> Airway {
        Airway {
            name: format!("{}-rev", self.name),
            waypoints: self.waypoints.iter().rev().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorKind {
    Primary,
    Secondary,
}

/// A named closed polygon. Display only; no core logic depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    pub kind: SectorKind,
    pub points: Vec<Point>,
}

impl Sector {
    /// Horizontal point-in-polygon test (ray casting).
    pub fn contains(&self, point: &Point) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.points[i].x, self.points[i].y);
            let (xj, yj) = (self.points[j].x, self.points[j].y);
            if ((yi > point.y) != (yj > point.y))
                && (point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = WaypointRegistry::new();
        registry.register("A", 0.2, 0.5, 0.0).unwrap();
        registry.register("B", 0.5, 0.5, 0.0).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("A").unwrap().point.x, 0.2);
        assert!(registry.lookup("Z").is_none());
        assert_eq!(
            registry.all().iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[test]
    fn duplicate_name_fails() {
        let mut registry = WaypointRegistry::new();
        registry.register("A", 0.2, 0.5, 0.0).unwrap();
        let err = registry.register("A", 0.3, 0.5, 0.0).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateWaypoint(name) if name == "A"));
    }

    #[test]
    fn out_of_range_and_empty_name_fail() {
        let mut registry = WaypointRegistry::new();
        assert!(registry.register("A", 1.5, 0.5, 0.0).is_err());
        assert!(registry.register("  ", 0.5, 0.5, 0.0).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn airway_resolves_and_reverses() {
        let mut registry = WaypointRegistry::new();
        registry.register("A", 0.2, 0.5, 0.0).unwrap();
        registry.register("B", 0.5, 0.5, 0.0).unwrap();
        let airway = Airway::new("UN1", vec!["A".into(), "B".into()]);

        let resolved = airway.resolve(&registry).unwrap();
        assert_eq!(resolved[1].name, "B");
        assert_eq!(airway.reversed().waypoints, vec!["B", "A"]);

        let broken = Airway::new("UN2", vec!["A".into(), "Q".into()]);
        assert!(matches!(
            broken.resolve(&registry),
            Err(CoreError::UnknownWaypoint(name)) if name == "Q"
        ));
    }

    #[test]
    fn sector_contains_point() {
        let square = Sector {
            name: "S1".into(),
            kind: SectorKind::Primary,
            points: vec![
                Point::new(0.1, 0.1, 0.0).unwrap(),
                Point::new(0.9, 0.1, 0.0).unwrap(),
                Point::new(0.9, 0.9, 0.0).unwrap(),
                Point::new(0.1, 0.9, 0.0).unwrap(),
            ],
        };
        assert!(square.contains(&Point::new(0.5, 0.5, 0.0).unwrap()));
        assert!(!square.contains(&Point::new(0.95, 0.5, 0.0).unwrap()));
    }
}
