//! Error types for the trajectory model and conflict manager.

use crate::models::AircraftId;

/// Broad classification of a failure, used by callers to decide whether
/// to abort, surface, or skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input at construction time. Never recovered.
    InvalidConfiguration,
    /// A required collaborator (aircraft, waypoint) is not registered.
    MissingCollaborator,
    /// An internal invariant was broken. Always a bug.
    InvariantViolation,
    /// Reading or parsing an external document failed.
    Io,
}

/// Primary error type for `atc-core`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("coordinate {axis}={value} is outside [0, 1]")]
    InvalidCoordinate { axis: &'static str, value: f64 },

    #[error("waypoint name must not be empty")]
    EmptyWaypointName,

    #[error("waypoint '{0}' is already registered")]
    DuplicateWaypoint(String),

    #[error("waypoint '{0}' is not registered")]
    UnknownWaypoint(String),

    #[error("airway '{0}' has no waypoints")]
    EmptyAirway(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("aircraft {0} has an empty flight plan")]
    EmptyFlightPlan(AircraftId),

    #[error("aircraft {id}: consecutive waypoints '{waypoint}' coincide")]
    DegenerateLeg { id: AircraftId, waypoint: String },

    #[error("aircraft {id}: speed {speed} must be strictly positive")]
    NonPositiveSpeed { id: AircraftId, speed: f64 },

    #[error("aircraft {id}: take-off time {time} must not be negative")]
    NegativeTakeOff { id: AircraftId, time: f64 },

    #[error("aircraft {0}: command schedule must not be empty")]
    EmptyCommands(AircraftId),

    #[error("aircraft {0}: id must be strictly positive")]
    InvalidAircraftId(AircraftId),

    #[error("aircraft {0} is not registered")]
    UnknownAircraft(AircraftId),

    #[error("aircraft {0} is already registered")]
    DuplicateAircraft(AircraftId),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidCoordinate { .. }
            | CoreError::EmptyWaypointName
            | CoreError::DuplicateWaypoint(_)
            | CoreError::EmptyAirway(_)
            | CoreError::InvalidParameter(_)
            | CoreError::EmptyFlightPlan(_)
            | CoreError::DegenerateLeg { .. }
            | CoreError::NonPositiveSpeed { .. }
            | CoreError::NegativeTakeOff { .. }
            | CoreError::EmptyCommands(_)
            | CoreError::InvalidAircraftId(_)
            | CoreError::DuplicateAircraft(_) => ErrorKind::InvalidConfiguration,
            CoreError::UnknownWaypoint(_) | CoreError::UnknownAircraft(_) => {
                ErrorKind::MissingCollaborator
            }
            CoreError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            CoreError::Io(_) | CoreError::Json(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
