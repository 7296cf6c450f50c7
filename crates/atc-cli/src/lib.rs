//! ATC CLI - command line front end for conflict resolution.
//!
//! The `atc` binary lists the available algorithms and objectives,
//! generates traffic, runs an optimization by name and plays a scenario
//! back on the simulation clock.

pub mod config;
pub mod report;
pub mod scenario;

pub use config::Config;
pub use report::RunReport;
pub use scenario::Scenario;
