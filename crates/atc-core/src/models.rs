//! Core data records shared by the trajectory model and the conflict manager.

use crate::spatial::Point;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Unique, strictly positive aircraft identifier.
pub type AircraftId = u32;

/// A scheduled control input: at `time`, the aircraft assumes `speed`.
///
/// The first command of a schedule doubles as the take-off declaration.
/// `heading` is carried through persistence but does not steer motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "id")]
    pub aircraft_id: AircraftId,
    pub time: f64,
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl Command {
    pub fn new(aircraft_id: AircraftId, time: f64, speed: f64) -> Self {
        Self {
            aircraft_id,
            time,
            speed,
            heading: None,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Same command moved in time.
    pub fn shifted(&self, dt: f64) -> Self {
        Self {
            time: self.time + dt,
            ..self.clone()
        }
    }
}

/// Sort a schedule by time. Stable, so equal-time commands keep their order.
pub fn sort_commands(commands: &mut [Command]) {
    commands.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
}

/// Kinematic snapshot recorded in an aircraft's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Information {
    pub position: Point,
    pub time: f64,
    pub speed: f64,
    pub heading: f64,
    pub take_off: bool,
    pub flight_time: f64,
}

/// Two aircraft passing the same waypoint within the conflict threshold.
///
/// `aircraft_one` is always the earlier arrival (`t1 <= t2`); ties go to
/// the smaller id. The same record is stored on both aircraft and on the
/// waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInformation {
    pub aircraft_one: AircraftId,
    pub aircraft_two: AircraftId,
    pub t1: f64,
    pub t2: f64,
    pub waypoint: String,
}

impl ConflictInformation {
    /// Build a record from two passages, in canonical order.
    pub fn new(
        a: (AircraftId, f64),
        b: (AircraftId, f64),
        waypoint: impl Into<String>,
    ) -> Self {
        let (first, second) = if a.1 < b.1 || (a.1 == b.1 && a.0 <= b.0) {
            (a, b)
        } else {
            (b, a)
        };
        Self {
            aircraft_one: first.0,
            aircraft_two: second.0,
            t1: first.1,
            t2: second.1,
            waypoint: waypoint.into(),
        }
    }

    pub fn involves(&self, id: AircraftId) -> bool {
        self.aircraft_one == id || self.aircraft_two == id
    }

    /// The other aircraft of the pair, if `id` is part of it.
    pub fn partner_of(&self, id: AircraftId) -> Option<AircraftId> {
        if self.aircraft_one == id {
            Some(self.aircraft_two)
        } else if self.aircraft_two == id {
            Some(self.aircraft_one)
        } else {
            None
        }
    }

    pub fn time_gap(&self) -> f64 {
        self.t2 - self.t1
    }

    /// Total order used for every sorted conflict listing.
    pub fn chronological(a: &Self, b: &Self) -> Ordering {
        a.t1.partial_cmp(&b.t1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.t2.partial_cmp(&b.t2).unwrap_or(Ordering::Equal))
            .then_with(|| a.aircraft_one.cmp(&b.aircraft_one))
            .then_with(|| a.aircraft_two.cmp(&b.aircraft_two))
            .then_with(|| a.waypoint.cmp(&b.waypoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_orders_earlier_arrival_first() {
        let record = ConflictInformation::new((7, 120.0), (3, 100.0), "B");
        assert_eq!((record.aircraft_one, record.aircraft_two), (3, 7));
        assert_eq!((record.t1, record.t2), (100.0, 120.0));
        assert_eq!(record.partner_of(3), Some(7));
        assert_eq!(record.partner_of(9), None);
    }

    #[test]
    fn conflict_tie_goes_to_smaller_id() {
        let a = ConflictInformation::new((9, 50.0), (2, 50.0), "W");
        let b = ConflictInformation::new((2, 50.0), (9, 50.0), "W");
        assert_eq!(a.aircraft_one, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn command_serializes_with_short_id() {
        let json = serde_json::to_value(Command::new(4, 10.0, 0.002)).unwrap();
        assert_eq!(json["id"], 4);
        assert!(json.get("heading").is_none());
    }

    #[test]
    fn shifted_command_keeps_its_heading() {
        let command = Command::new(4, 10.0, 0.002).with_heading(1.5);
        let moved = command.shifted(-4.0);
        assert_eq!(moved.time, 6.0);
        assert_eq!(moved.heading, Some(1.5));

        let json = serde_json::to_string(&moved).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, moved);
    }

    #[test]
    fn time_gap_spans_the_pair() {
        let record = ConflictInformation::new((7, 120.0), (3, 100.0), "B");
        assert_eq!(record.time_gap(), 20.0);
        assert!(record.involves(7) && record.involves(3));
    }
}
