//! Airspace plus recorded traffic, loaded from disk.

use anyhow::{Context, Result};
use atc_core::{populate, Airspace, AirspaceConfig, ConflictManager, RecordedTraffic, TrafficGenerator};
use std::path::Path;

pub struct Scenario {
    pub airspace: Airspace,
    pub fleet: ConflictManager,
}

impl Scenario {
    pub fn load(airspace: &Path, traffic: &Path, time_threshold: f64) -> Result<Self> {
        let airspace = AirspaceConfig::load(airspace)
            .and_then(AirspaceConfig::build)
            .with_context(|| format!("loading airspace {}", airspace.display()))?;
        let recorded = RecordedTraffic::load(traffic)
            .with_context(|| format!("reading traffic {}", traffic.display()))?;
        let aircraft = recorded
            .generate(&airspace)
            .context("rebuilding recorded aircraft")?;
        let fleet = populate(aircraft, time_threshold).context("registering fleet")?;

        tracing::info!(
            aircraft = fleet.len(),
            conflicts = fleet.total_unique_conflicts(),
            "scenario loaded"
        );
        Ok(Self { airspace, fleet })
    }

    /// Write the fleet's current schedule back in the recorded format.
    pub fn save_traffic(&self, path: &Path) -> Result<()> {
        RecordedTraffic::capture(self.fleet.fleet(), false)
            .save(path)
            .with_context(|| format!("writing traffic {}", path.display()))
    }
}
