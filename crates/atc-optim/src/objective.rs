//! Scalar objectives over the fleet.
//!
//! An objective only scores; whether lower or higher is better is decided
//! by the algorithm that drives it.

use atc_core::{AircraftId, ConflictManager};
use std::collections::BTreeMap;

pub trait Objective: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    fn evaluate(&self, fleet: &ConflictManager) -> f64;
}

/// Distance between the conflict count and a target count.
#[derive(Debug, Clone, Default)]
pub struct AbsoluteNumberConflict {
    pub expected: f64,
}

impl AbsoluteNumberConflict {
    pub fn new(expected: f64) -> Self {
        Self { expected }
    }
}

impl Objective for AbsoluteNumberConflict {
    fn name(&self) -> &'static str {
        "AbsoluteNumberConflict"
    }

    fn evaluate(&self, fleet: &ConflictManager) -> f64 {
        (self.expected - fleet.total_unique_conflicts() as f64).abs()
    }
}

/// Number of unique conflicts. Meant to be maximized.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxConflict;

impl Objective for MaxConflict {
    fn name(&self) -> &'static str {
        "MaxConflict"
    }

    fn evaluate(&self, fleet: &ConflictManager) -> f64 {
        fleet.total_unique_conflicts() as f64
    }
}

/// Many conflicts, reached with few and calm commands. Meant to be maximized.
#[derive(Debug, Clone)]
pub struct MaxConflictMinVariation {
    pub weight_conflicts: f64,
    pub weight_shared_time: f64,
    pub weight_time_difference: f64,
    pub weight_command_count: f64,
    pub weight_speed_variation: f64,
    pub weight_command_spacing: f64,
    /// Two passages closer than this earn the shared-time bonus.
    pub threshold_max_time_proximity: f64,
    /// Speed changes larger than this are penalized.
    pub threshold_speed_variation: f64,
    /// Commands closer than this are penalized.
    pub threshold_min_time_variation_command: f64,
}

impl Default for MaxConflictMinVariation {
    fn default() -> Self {
        Self {
            weight_conflicts: 100.0,
            weight_shared_time: 2.0,
            weight_time_difference: 1.0,
            weight_command_count: 1.0,
            weight_speed_variation: 5.0,
            weight_command_spacing: 3.0,
            threshold_max_time_proximity: 30.0,
            threshold_speed_variation: 0.001,
            threshold_min_time_variation_command: 150.0,
        }
    }
}

impl MaxConflictMinVariation {
    /// (shared-time bonus, excess spacing) over every pair of passages at
    /// every flown waypoint.
    fn passage_terms(&self, fleet: &ConflictManager) -> (f64, f64) {
        let mut bonus = 0.0;
        let mut excess = 0.0;
        for waypoint in fleet.flown_waypoints() {
            let passages = fleet.passages_at(&waypoint);
            for (i, (_, t_i)) in passages.iter().enumerate() {
                for (_, t_j) in &passages[i + 1..] {
                    let gap = (t_i - t_j).abs();
                    if gap <= self.threshold_max_time_proximity {
                        bonus += 1.0;
                    } else {
                        excess += gap - self.threshold_max_time_proximity;
                    }
                }
            }
        }
        (bonus, excess)
    }
}

impl Objective for MaxConflictMinVariation {
    fn name(&self) -> &'static str {
        "MaxConflictMinVariation"
    }

    fn evaluate(&self, fleet: &ConflictManager) -> f64 {
        let conflicts = fleet.total_unique_conflicts() as f64;
        let (shared_time, time_difference) = self.passage_terms(fleet);

        let mut command_count = 0.0;
        let mut speed_variation = 0.0;
        let mut command_spacing = 0.0;
        for aircraft in fleet.fleet() {
            let commands = aircraft.commands();
            command_count += commands.len().saturating_sub(1) as f64;
            for pair in commands.windows(2) {
                if (pair[1].speed - pair[0].speed).abs() > self.threshold_speed_variation {
                    speed_variation += 1.0;
                }
                let gap = pair[1].time - pair[0].time;
                if gap < self.threshold_min_time_variation_command {
                    command_spacing += self.threshold_min_time_variation_command - gap;
                }
            }
        }

        self.weight_conflicts * conflicts + self.weight_shared_time * shared_time
            - self.weight_time_difference * time_difference / 360.0
            - self.weight_command_count * command_count
            - self.weight_speed_variation * speed_variation
            - self.weight_command_spacing * command_spacing / 3600.0
    }
}

/// Spread of take-off times: the population standard deviation of every
/// 3-combination of take-offs, summed. Meant to be maximized.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeStdDev;

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

impl Objective for TimeStdDev {
    fn name(&self) -> &'static str {
        "TimeStdDev"
    }

    fn evaluate(&self, fleet: &ConflictManager) -> f64 {
        let take_offs: Vec<f64> = fleet.fleet().map(|a| a.take_off_time()).collect();
        let n = take_offs.len();
        let mut total = 0.0;
        for i in 0..n {
            for j in i + 1..n {
                for k in j + 1..n {
                    total += std_dev(&[take_offs[i], take_offs[j], take_offs[k]]);
                }
            }
        }
        total
    }
}

/// Conflict count plus a penalty on how far take-offs moved from a
/// reference fleet. Meant to be minimized.
#[derive(Debug, Clone, Default)]
pub struct MinConflictMinDrift {
    pub drift_weight: f64,
    reference: BTreeMap<AircraftId, f64>,
}

impl MinConflictMinDrift {
    /// Use the current take-offs of `fleet` as the reference.
    pub fn new(fleet: &ConflictManager, drift_weight: f64) -> Self {
        Self {
            drift_weight,
            reference: fleet.fleet().map(|a| (a.id(), a.take_off_time())).collect(),
        }
    }

    /// Total absolute take-off drift, in hours.
    pub fn drift(&self, fleet: &ConflictManager) -> f64 {
        fleet
            .fleet()
            .filter_map(|a| {
                self.reference
                    .get(&a.id())
                    .map(|reference| (a.take_off_time() - reference).abs())
            })
            .sum::<f64>()
            / 3600.0
    }
}

impl Objective for MinConflictMinDrift {
    fn name(&self) -> &'static str {
        "MinConflictMinDrift"
    }

    fn evaluate(&self, fleet: &ConflictManager) -> f64 {
        fleet.total_unique_conflicts() as f64 + self.drift_weight * self.drift(fleet)
    }
}
