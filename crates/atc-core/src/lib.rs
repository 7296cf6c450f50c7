//! ATC Core - trajectory model and conflict detection for en-route traffic.
//!
//! Aircraft fly published flight plans over named waypoints under a
//! schedule of speed commands. The [`ConflictManager`] owns the fleet and
//! keeps pairwise waypoint conflicts up to date as schedules change.

pub mod aircraft;
pub mod airspace;
pub mod clock;
pub mod conflict;
pub mod error;
pub mod models;
pub mod spatial;
pub mod traffic;
pub mod waypoint;

pub use aircraft::{Aircraft, TimedWaypoint};
pub use airspace::{Airspace, AirspaceConfig};
pub use clock::{run_clock, ClockState, SimulationClock};
pub use conflict::{ConflictManager, Schedule, DEFAULT_TIME_THRESHOLD};
pub use error::{CoreError, ErrorKind};
pub use models::{AircraftId, Command, ConflictInformation, Information};
pub use spatial::Point;
pub use traffic::{
    populate, DynamicTraffic, RecordedAircraft, RecordedTraffic, TrafficGenerator,
    DEFAULT_SPEEDS,
};
pub use waypoint::{Airway, Sector, SectorKind, Waypoint, WaypointRegistry};
