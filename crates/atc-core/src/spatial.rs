//! Planar geometry in the normalized airspace.
//!
//! All coordinates live in the unit cube. Headings are bearings measured
//! counter-clockwise from the +x axis, wrapped to [0, 2π).

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// A point in the normalized airspace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    /// Build a point, rejecting coordinates outside [0, 1].
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        check_unit("x", x)?;
        check_unit("y", y)?;
        check_unit("z", z)?;
        Ok(Self { x, y, z })
    }

    /// Re-validate a point that was deserialized without going through `new`.
    pub fn validate(&self) -> Result<()> {
        check_unit("x", self.x)?;
        check_unit("y", self.y)?;
        check_unit("z", self.z)
    }

    /// Euclidean distance in three dimensions.
    pub fn distance(&self, other: &Point) -> f64 {
        let dz = other.z - self.z;
        (self.horizontal_distance(other).powi(2) + dz * dz).sqrt()
    }

    /// Distance ignoring altitude.
    pub fn horizontal_distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// 2-D bearing from `self` toward `other`, wrapped to [0, 2π).
    pub fn bearing_to(&self, other: &Point) -> f64 {
        wrap_heading((other.y - self.y).atan2(other.x - self.x))
    }

    /// Move horizontally toward `target` by `distance`, keeping own altitude.
    ///
    /// Never overshoots: when `distance` reaches the target the result is
    /// the target's horizontal position.
    pub fn step_towards(&self, target: &Point, distance: f64) -> Point {
        let remaining = self.horizontal_distance(target);
        if remaining <= distance || remaining <= f64::EPSILON {
            return Point {
                x: target.x,
                y: target.y,
                z: self.z,
            };
        }
        let ratio = distance / remaining;
        Point {
            x: self.x + (target.x - self.x) * ratio,
            y: self.y + (target.y - self.y) * ratio,
            z: self.z,
        }
    }

    /// Linear interpolation between two points, `ratio` in [0, 1].
    pub fn lerp(&self, other: &Point, ratio: f64) -> Point {
        let ratio = ratio.clamp(0.0, 1.0);
        Point {
            x: self.x + (other.x - self.x) * ratio,
            y: self.y + (other.y - self.y) * ratio,
            z: self.z + (other.z - self.z) * ratio,
        }
    }
}

/// Wrap an angle in radians to [0, 2π).
pub fn wrap_heading(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

fn check_unit(axis: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidCoordinate { axis, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Point::new(0.0, 1.0, 0.5).is_ok());
        assert!(Point::new(-0.01, 0.5, 0.5).is_err());
        assert!(Point::new(0.5, 1.01, 0.5).is_err());
        assert!(Point::new(0.5, 0.5, f64::NAN).is_err());
    }

    #[test]
    fn distances() {
        let a = Point::new(0.0, 0.0, 0.0).unwrap();
        let b = Point::new(0.3, 0.4, 0.0).unwrap();
        let c = Point::new(0.3, 0.4, 1.0).unwrap();
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
        assert!((a.horizontal_distance(&c) - 0.5).abs() < 1e-12);
        assert!((a.distance(&c) - 1.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn bearing_is_wrapped() {
        let origin = Point::new(0.5, 0.5, 0.0).unwrap();
        let east = Point::new(0.8, 0.5, 0.0).unwrap();
        let north = Point::new(0.5, 0.8, 0.0).unwrap();
        let south = Point::new(0.5, 0.2, 0.0).unwrap();
        assert!(origin.bearing_to(&east).abs() < 1e-12);
        assert!((origin.bearing_to(&north) - FRAC_PI_2).abs() < 1e-12);
        assert!((origin.bearing_to(&south) - 3.0 * FRAC_PI_2).abs() < 1e-12);
        assert!((wrap_heading(-PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn step_never_overshoots() {
        let a = Point::new(0.2, 0.5, 0.3).unwrap();
        let b = Point::new(0.5, 0.5, 0.9).unwrap();
        let mid = a.step_towards(&b, 0.1);
        assert!((mid.x - 0.3).abs() < 1e-12);
        assert_eq!(mid.z, 0.3);
        let end = a.step_towards(&b, 1.0);
        assert_eq!((end.x, end.y, end.z), (0.5, 0.5, 0.3));
    }
}
