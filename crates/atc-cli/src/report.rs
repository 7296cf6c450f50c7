//! Summary of an optimization run, printed or written as JSON.

use atc_core::{ConflictManager, Schedule};
use atc_optim::{AlgorithmState, Solution};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub algorithm: String,
    pub objective: String,
    pub state: AlgorithmState,
    pub fitness: f64,
    pub conflicts_before: usize,
    /// Conflicts once the best schedule is applied.
    pub conflicts_after: usize,
    pub process_time_ms: u64,
    pub finished_at: DateTime<Utc>,
    pub schedule: Schedule,
}

impl RunReport {
    /// Score `solution` against a copy of `fleet`; the fleet itself is untouched.
    pub fn new(
        algorithm: &str,
        objective: &str,
        fleet: &ConflictManager,
        solution: Solution,
        process_time: Duration,
    ) -> atc_core::error::Result<Self> {
        let mut scored = fleet.clone();
        scored.apply_schedule(&solution.schedule)?;
        Ok(Self {
            algorithm: algorithm.to_string(),
            objective: objective.to_string(),
            state: solution.state,
            fitness: solution.fitness,
            conflicts_before: fleet.total_unique_conflicts(),
            conflicts_after: scored.total_unique_conflicts(),
            process_time_ms: process_time.as_millis() as u64,
            finished_at: Utc::now(),
            schedule: solution.schedule,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} / {}: {:?} after {} ms, fitness {:.4}, conflicts {} -> {}",
            self.algorithm,
            self.objective,
            self.state,
            self.process_time_ms,
            self.fitness,
            self.conflicts_before,
            self.conflicts_after,
        )
    }
}
