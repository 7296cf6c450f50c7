//! Traffic sources: dynamic (Poisson arrivals on airways) and recorded.

use crate::aircraft::{time_key, Aircraft};
use crate::airspace::Airspace;
use crate::conflict::ConflictManager;
use crate::error::{CoreError, Result};
use crate::models::{AircraftId, Command, Information};
use crate::spatial::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Speeds used when none are configured.
pub const DEFAULT_SPEEDS: [f64; 4] = [0.001, 0.0012, 0.002, 0.003];

/// Anything that can produce a fleet for an airspace.
pub trait TrafficGenerator {
    fn generate(&self, airspace: &Airspace) -> Result<Vec<Aircraft>>;
}

/// Build a manager around a generated fleet.
pub fn populate(aircraft: Vec<Aircraft>, time_threshold: f64) -> Result<ConflictManager> {
    let mut manager = ConflictManager::new(time_threshold);
    for a in aircraft {
        manager.register_aircraft(a)?;
    }
    Ok(manager)
}

/// Poisson arrivals on every airway of the airspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicTraffic {
    pub simulation_duration: f64,
    /// Mean number of departures per time unit on each airway.
    pub arrival_rate: f64,
    pub speeds: Vec<f64>,
    /// Fly each departure in a random direction along its airway.
    pub both_directions: bool,
    pub seed: u64,
}

impl Default for DynamicTraffic {
    fn default() -> Self {
        Self {
            simulation_duration: 3600.0,
            arrival_rate: 1.0 / 600.0,
            speeds: DEFAULT_SPEEDS.to_vec(),
            both_directions: true,
            seed: 0,
        }
    }
}

impl TrafficGenerator for DynamicTraffic {
    fn generate(&self, airspace: &Airspace) -> Result<Vec<Aircraft>> {
        if !(self.simulation_duration.is_finite() && self.simulation_duration > 0.0) {
            return Err(CoreError::InvalidParameter(format!(
                "simulation_duration must be positive, got {}",
                self.simulation_duration
            )));
        }
        if self.speeds.is_empty() {
            return Err(CoreError::InvalidParameter("speeds must not be empty".into()));
        }
        let inter_arrival = Exp::new(self.arrival_rate).map_err(|err| {
            CoreError::InvalidParameter(format!("arrival_rate {}: {err}", self.arrival_rate))
        })?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut departures = Vec::new();
        for airway in &airspace.airways {
            let mut t = 0.0;
            loop {
                t += inter_arrival.sample(&mut rng);
                if t > self.simulation_duration {
                    break;
                }
                let route = if self.both_directions && rng.random_bool(0.5) {
                    airway.reversed()
                } else {
                    airway.clone()
                };
                let speed = self.speeds[rng.random_range(0..self.speeds.len())];
                departures.push((t, route.resolve(&airspace.registry)?, speed));
            }
        }

        departures.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let earliest = departures.first().map(|d| d.0).unwrap_or(0.0);

        let fleet = departures
            .into_iter()
            .enumerate()
            .map(|(index, (t, plan, speed))| {
                Aircraft::new(index as AircraftId + 1, plan, t - earliest, speed)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            aircraft = fleet.len(),
            airways = airspace.airways.len(),
            seed = self.seed,
            "generated dynamic traffic"
        );
        Ok(fleet)
    }
}

/// One aircraft in the recorded traffic format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAircraft {
    pub flight_plan: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_position: Option<Point>,
    pub commands: Vec<Command>,
    /// Snapshots keyed by formatted time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<BTreeMap<String, Information>>,
}

/// Aircraft keyed by id, as persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordedTraffic {
    pub aircraft: BTreeMap<AircraftId, RecordedAircraft>,
}

impl RecordedTraffic {
    /// Capture a fleet, optionally with its flown history.
    pub fn capture<'a>(fleet: impl IntoIterator<Item = &'a Aircraft>, with_history: bool) -> Self {
        let aircraft = fleet
            .into_iter()
            .map(|a| {
                let history = with_history.then(|| {
                    a.history()
                        .values()
                        .map(|info| (format!("{:.3}", info.time), info.clone()))
                        .collect()
                });
                let record = RecordedAircraft {
                    flight_plan: a.flight_plan().iter().map(|w| w.name.clone()).collect(),
                    start_position: Some(a.start_position()),
                    commands: a.commands().to_vec(),
                    history,
                };
                (a.id(), record)
            })
            .collect();
        Self { aircraft }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl TrafficGenerator for RecordedTraffic {
    fn generate(&self, airspace: &Airspace) -> Result<Vec<Aircraft>> {
        self.aircraft
            .iter()
            .map(|(id, record)| {
                let plan = record
                    .flight_plan
                    .iter()
                    .map(|name| airspace.registry.require(name).cloned())
                    .collect::<Result<Vec<_>>>()?;
                let mut aircraft = Aircraft::with_commands(
                    *id,
                    plan,
                    record.commands.clone(),
                    record.start_position,
                )?;
                if let Some(history) = &record.history {
                    aircraft.restore_history(
                        history
                            .values()
                            .map(|info| (time_key(info.time), info.clone())),
                    );
                }
                Ok(aircraft)
            })
            .collect()
    }
}
