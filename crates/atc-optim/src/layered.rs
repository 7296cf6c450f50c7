//! Windowed, multi-layer genetic search.
//!
//! The fleet is cut into intervals by take-off time. Each interval is
//! optimized on its own copy of the fleet, layer after layer: layer one
//! spreads take-offs apart, later layers remove conflicts while keeping
//! take-offs close to where the previous layer left them. The interval
//! bests are then stitched together, perturbed by time shifts into a full
//! population, and refined over the whole fleet with the primary objective.

use crate::algorithm::{Algorithm, AlgorithmBase, AlgorithmConfig, AlgorithmState, Individual, Solution};
use crate::error::{OptimError, Result};
use crate::genetic::{Genetic, GeneticParams};
use crate::objective::{MinConflictMinDrift, Objective, TimeStdDev};
use atc_core::{AircraftId, Command, ConflictManager, Schedule};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How the fleet is cut into intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    /// Consecutive take-off windows of this length, in seconds.
    TakeOffWindow(f64),
    /// Groups of this many aircraft, in take-off order.
    GroupSize(usize),
}

impl Default for IntervalKind {
    fn default() -> Self {
        IntervalKind::GroupSize(5)
    }
}

#[derive(Debug, Clone)]
pub struct LayeredParams {
    /// Used by every inner run and by the final refinement.
    pub genetic: GeneticParams,
    pub interval: IntervalKind,
    /// No command may be shifted past this time.
    pub simulation_end: f64,
    /// Bound of the random per-aircraft shift used to build the merged
    /// population.
    pub max_shift: f64,
    pub drift_weight: f64,
}

impl Default for LayeredParams {
    fn default() -> Self {
        Self {
            genetic: GeneticParams::default(),
            interval: IntervalKind::default(),
            simulation_end: 7200.0,
            max_shift: 60.0,
            drift_weight: 1.0,
        }
    }
}

impl LayeredParams {
    pub fn validate(&self) -> Result<()> {
        self.genetic.validate()?;
        match self.interval {
            IntervalKind::GroupSize(0) => {
                return Err(OptimError::invalid("interval_value", "group size must be at least 1"))
            }
            IntervalKind::TakeOffWindow(length) if !(length > 0.0) => {
                return Err(OptimError::invalid("interval_value", "window must be positive"))
            }
            _ => {}
        }
        if !(self.simulation_end > 0.0) {
            return Err(OptimError::invalid("simulation_end", "must be positive"));
        }
        if !(self.max_shift >= 0.0) {
            return Err(OptimError::invalid("max_shift", "must not be negative"));
        }
        Ok(())
    }
}

/// Cut the fleet into intervals, in take-off order (ties by id).
pub fn partition(fleet: &ConflictManager, kind: IntervalKind) -> Vec<Vec<AircraftId>> {
    let mut departures: Vec<(f64, AircraftId)> =
        fleet.fleet().map(|a| (a.take_off_time(), a.id())).collect();
    departures.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    match kind {
        IntervalKind::GroupSize(size) => departures
            .chunks(size.max(1))
            .map(|chunk| chunk.iter().map(|(_, id)| *id).collect())
            .collect(),
        IntervalKind::TakeOffWindow(length) => {
            let Some(&(origin, _)) = departures.first() else {
                return Vec::new();
            };
            let mut intervals: Vec<Vec<AircraftId>> = Vec::new();
            let mut current_window = None;
            for (t, id) in departures {
                let window = ((t - origin) / length).floor() as i64;
                if current_window != Some(window) {
                    intervals.push(Vec::new());
                    current_window = Some(window);
                }
                if let Some(interval) = intervals.last_mut() {
                    interval.push(id);
                }
            }
            intervals
        }
    }
}

/// Shift every command by `dt`, clamped so no command leaves
/// `[0, simulation_end]`. The lower bound wins when both cannot hold.
/// Returns the shift actually applied.
pub fn shift_commands(commands: &mut [Command], dt: f64, simulation_end: f64) -> f64 {
    let earliest = commands.iter().map(|c| c.time).fold(f64::INFINITY, f64::min);
    let latest = commands.iter().map(|c| c.time).fold(f64::NEG_INFINITY, f64::max);
    if !earliest.is_finite() {
        return 0.0;
    }
    let dt = dt.min(simulation_end - latest).max(-earliest);
    for command in commands.iter_mut() {
        *command = command.shifted(dt);
    }
    dt
}

/// Copy the given aircraft into a fleet of their own.
fn sub_fleet(fleet: &ConflictManager, ids: &[AircraftId]) -> Result<ConflictManager> {
    let mut sub = ConflictManager::new(fleet.time_threshold());
    for id in ids {
        sub.register_aircraft(fleet.require(*id)?.clone())?;
    }
    Ok(sub)
}

pub struct LayeredGenetic {
    base: AlgorithmBase,
    params: LayeredParams,
    intervals: Vec<Vec<AircraftId>>,
    merged: Vec<Individual>,
}

impl LayeredGenetic {
    pub const NAME: &'static str = "AlgorithmGeneticLayers";

    pub fn new(fleet: &ConflictManager, config: AlgorithmConfig, params: LayeredParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            intervals: partition(fleet, params.interval),
            base: AlgorithmBase::new(fleet, config),
            params,
            merged: Vec::new(),
        })
    }

    pub fn params(&self) -> &LayeredParams {
        &self.params
    }

    pub fn intervals(&self) -> &[Vec<AircraftId>] {
        &self.intervals
    }

    /// Population handed to the refinement pass by the last run.
    pub fn last_merged_population(&self) -> &[Individual] {
        &self.merged
    }

    fn layer_objective(&self, layer: usize, sub: &ConflictManager) -> (Box<dyn Objective>, bool) {
        if layer == 0 {
            (Box::new(TimeStdDev), false)
        } else {
            (Box::new(MinConflictMinDrift::new(sub, self.params.drift_weight)), true)
        }
    }

    /// Run every layer on one interval. Returns the interval's schedule and
    /// the state of the last inner run.
    fn optimize_interval(
        &self,
        fleet: &ConflictManager,
        index: usize,
        ids: &[AircraftId],
    ) -> Result<(Schedule, AlgorithmState)> {
        let mut sub = sub_fleet(fleet, ids)?;
        let mut state = AlgorithmState::Finished;
        for layer in 0..self.base.config.number_of_layers.max(1) {
            let (objective, is_minimize) = self.layer_objective(layer, &sub);
            let config = AlgorithmConfig {
                is_minimize,
                timeout: self.base.remaining(),
                ..self.base.config.clone()
            };
            let mut inner = Genetic::new(&sub, config, self.params.genetic.clone())?;
            inner.base_mut().handle = self.base.handle.child();
            inner.set_objective(objective);

            let solution = inner.start(&mut sub)?;
            sub.apply_schedule(&solution.schedule)?;
            state = solution.state;
            if self.base.config.verbose {
                tracing::debug!(
                    interval = index,
                    layer,
                    aircraft = ids.len(),
                    fitness = solution.fitness,
                    "interval layer done"
                );
            }
            if state != AlgorithmState::Finished {
                break;
            }
        }
        Ok((sub.schedule(), state))
    }

    /// Stitched interval bests first, then shifted copies of it, up to
    /// `population_size` individuals.
    fn merge(&mut self, combined: &Schedule) -> Vec<Individual> {
        let seed = self.base.from_schedule(combined);
        let departures = seed.iter().filter_map(|commands| commands.first().map(|c| c.time));
        let (first_departure, last_departure) = departures
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));

        let size = self.params.genetic.population_size;
        let mut population = Vec::with_capacity(size);
        population.push(seed.clone());
        while population.len() < size {
            let mut individual = seed.clone();
            for commands in individual.iter_mut() {
                let Some(take_off) = commands.first().map(|c| c.time) else {
                    continue;
                };
                let dt = self
                    .base
                    .rng
                    .random_range(-self.params.max_shift..=self.params.max_shift);
                let dt = dt
                    .min(last_departure - take_off)
                    .max(first_departure - take_off);
                shift_commands(commands, dt, self.params.simulation_end);
            }
            population.push(individual);
        }
        population
    }
}

impl Algorithm for LayeredGenetic {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base(&self) -> &AlgorithmBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AlgorithmBase {
        &mut self.base
    }

    fn run(&mut self, fleet: &mut ConflictManager) -> Result<Solution> {
        if self.base.aircraft.is_empty() {
            return self.base.empty_solution(fleet);
        }

        let mut combined = fleet.schedule();
        let total = self.intervals.len() + 1;
        for (index, ids) in self.intervals.iter().enumerate() {
            let (schedule, state) = self.optimize_interval(fleet, index, ids)?;
            combined.extend(schedule);
            self.base.handle.set_progress((index + 1) as f64 / total as f64);
            if state != AlgorithmState::Finished {
                tracing::info!(interval = index, ?state, "interval search interrupted");
                fleet.apply_schedule(&combined)?;
                return Ok(Solution {
                    fitness: self.base.evaluate(fleet)?,
                    schedule: combined,
                    state,
                });
            }
        }

        let population = self.merge(&combined);
        self.merged = population.clone();
        tracing::debug!(
            intervals = self.intervals.len(),
            population = population.len(),
            "merged interval bests"
        );

        let config = AlgorithmConfig {
            timeout: self.base.remaining(),
            ..self.base.config.clone()
        };
        let mut refine = Genetic::new(fleet, config, self.params.genetic.clone())?
            .with_initial_population(population);
        refine.base_mut().handle = self.base.handle.child();
        refine.base_mut().objective = self.base.objective.clone();
        refine.start(fleet)
    }
}
