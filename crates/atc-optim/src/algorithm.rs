//! The algorithm surface shared by every search strategy.
//!
//! An algorithm snapshots the fleet schedule when it is built. `start`
//! runs the search, then puts that snapshot back so the fleet leaves the
//! call exactly as it entered; the caller commits [`Solution::schedule`]
//! with [`ConflictManager::apply_schedule`] if it wants to keep it.

use crate::error::{OptimError, Result};
use crate::objective::Objective;
use crate::sampler::{SampledAircraft, SimulatedAircraft};
use crate::speed::SpeedSet;
use atc_core::{AircraftId, Command, ConflictManager, Schedule};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One command schedule per aircraft, in the algorithm's aircraft order.
pub type Individual = Vec<Vec<Command>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmState {
    NotStarted,
    Running,
    Finished,
    Timeout,
    Cancelled,
    Failed,
}

/// Cancellation and progress, shared with whoever drives the run.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmHandle {
    stop: Arc<AtomicBool>,
    progress: Arc<AtomicU8>,
    /// Set on handles made by `child`; the outer run owns the stop flag.
    nested: bool,
}

impl AlgorithmHandle {
    /// Ask the run to stop at the next plateau or generation boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Percentage in [0, 100].
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    /// A handle for a nested run: same stop flag, separate progress.
    pub(crate) fn child(&self) -> AlgorithmHandle {
        AlgorithmHandle {
            stop: Arc::clone(&self.stop),
            progress: Arc::new(AtomicU8::new(0)),
            nested: true,
        }
    }

    /// Clear a stop request once the run that honored it has ended, so the
    /// next `start` runs. Nested handles leave the flag to their owner.
    pub(crate) fn rearm(&self) {
        if !self.nested {
            self.stop.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn set_progress(&self, fraction: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.progress.store(percent, Ordering::Relaxed);
    }
}

/// Best schedule found by a run.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub schedule: Schedule,
    pub fitness: f64,
    pub state: AlgorithmState,
}

/// Settings common to every algorithm.
#[derive(Debug, Clone)]
pub struct AlgorithmConfig {
    pub is_minimize: bool,
    /// Log per-plateau or per-generation progress at debug level.
    pub verbose: bool,
    pub timeout: Option<Duration>,
    pub number_of_layers: usize,
    pub speeds: SpeedSet,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            is_minimize: true,
            verbose: false,
            timeout: None,
            number_of_layers: 1,
            speeds: SpeedSet::default(),
        }
    }
}

/// State every algorithm carries: the fleet snapshot, one sampler per
/// aircraft, the objective, timing and the shared handle.
pub struct AlgorithmBase {
    pub config: AlgorithmConfig,
    pub(crate) objective: Option<Arc<dyn Objective>>,
    pub(crate) initial: Schedule,
    pub(crate) ids: Vec<AircraftId>,
    pub(crate) aircraft: Vec<Box<dyn SimulatedAircraft>>,
    pub(crate) rng: StdRng,
    pub(crate) handle: AlgorithmHandle,
    state: AlgorithmState,
    start_time: Option<Instant>,
    elapsed: Option<Duration>,
}

impl AlgorithmBase {
    pub fn new(fleet: &ConflictManager, config: AlgorithmConfig) -> Self {
        let ids = fleet.aircraft_ids();
        let aircraft = fleet
            .fleet()
            .map(|a| {
                Box::new(SampledAircraft::from_aircraft(a, config.speeds.clone()))
                    as Box<dyn SimulatedAircraft>
            })
            .collect();
        let seed = ids.iter().map(|&id| id as u64).sum();
        Self {
            config,
            objective: None,
            initial: fleet.schedule(),
            ids,
            aircraft,
            rng: StdRng::seed_from_u64(seed),
            handle: AlgorithmHandle::default(),
            state: AlgorithmState::NotStarted,
            start_time: None,
            elapsed: None,
        }
    }

    pub fn ids(&self) -> &[AircraftId] {
        &self.ids
    }

    pub fn state(&self) -> AlgorithmState {
        self.state
    }

    pub fn objective(&self) -> Option<&Arc<dyn Objective>> {
        self.objective.as_ref()
    }

    /// Schedule captured at construction.
    pub fn initial_schedule(&self) -> &Schedule {
        &self.initial
    }

    pub fn process_time(&self) -> Duration {
        match (self.elapsed, self.start_time) {
            (Some(elapsed), _) => elapsed,
            (None, Some(start)) => start.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    pub fn is_timeout(&self) -> bool {
        if self.state == AlgorithmState::Timeout {
            return true;
        }
        match (self.config.timeout, self.start_time) {
            (Some(limit), Some(start)) if self.state == AlgorithmState::Running => {
                start.elapsed() >= limit
            }
            _ => false,
        }
    }

    /// Time left before the timeout, if one is set.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.config
            .timeout
            .map(|limit| limit.saturating_sub(self.process_time()))
    }

    /// Why the run must stop now, if it must.
    pub(crate) fn interruption(&self) -> Option<AlgorithmState> {
        if self.handle.is_stopped() {
            Some(AlgorithmState::Cancelled)
        } else if self.is_timeout() {
            Some(AlgorithmState::Timeout)
        } else {
            None
        }
    }

    fn begin(&mut self, algorithm: &'static str) -> Result<()> {
        if self.objective.is_none() {
            return Err(OptimError::MissingObjective { algorithm });
        }
        self.state = AlgorithmState::Running;
        self.start_time = Some(Instant::now());
        self.elapsed = None;
        self.handle.set_progress(0.0);
        tracing::info!(
            algorithm,
            aircraft = self.ids.len(),
            minimize = self.config.is_minimize,
            "optimization started"
        );
        Ok(())
    }

    fn finish(&mut self, algorithm: &'static str, outcome: &Result<Solution>) {
        self.elapsed = self.start_time.map(|start| start.elapsed());
        self.handle.rearm();
        match outcome {
            Ok(solution) => {
                self.state = solution.state;
                if solution.state == AlgorithmState::Finished {
                    self.handle.set_progress(1.0);
                }
                tracing::info!(
                    algorithm,
                    state = ?solution.state,
                    fitness = solution.fitness,
                    elapsed_ms = self.process_time().as_millis() as u64,
                    "optimization ended"
                );
            }
            Err(err) => {
                self.state = AlgorithmState::Failed;
                tracing::error!(algorithm, error = %err, "optimization failed");
            }
        }
    }

    /// Score the fleet with the injected objective.
    pub(crate) fn evaluate(&self, fleet: &ConflictManager) -> Result<f64> {
        let objective = self
            .objective
            .as_ref()
            .ok_or(OptimError::MissingObjective { algorithm: "evaluate" })?;
        Ok(objective.evaluate(fleet))
    }

    /// Strict improvement in the configured direction.
    pub(crate) fn is_better(&self, candidate: f64, reference: f64) -> bool {
        if self.config.is_minimize {
            candidate < reference
        } else {
            candidate > reference
        }
    }

    /// The value an unusable candidate is scored with.
    pub(crate) fn worst(&self) -> f64 {
        if self.config.is_minimize {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Metropolis rule: improvements always pass, regressions pass with
    /// probability exp(-|delta| / temperature).
    pub(crate) fn accept(&mut self, current: f64, candidate: f64, temperature: f64) -> bool {
        if !self.is_better(current, candidate) {
            return true;
        }
        if temperature <= 0.0 {
            return false;
        }
        let delta = (candidate - current).abs();
        self.rng.random::<f64>() < (-delta / temperature).exp()
    }

    /// A fresh random schedule for every aircraft.
    pub(crate) fn random_individual(&mut self) -> Individual {
        self.aircraft.iter_mut().map(|a| a.initialize()).collect()
    }

    /// Install one schedule per aircraft on the fleet.
    pub(crate) fn install(&self, fleet: &mut ConflictManager, individual: &Individual) -> Result<()> {
        for (aircraft, commands) in self.aircraft.iter().zip(individual) {
            aircraft.update_commands(fleet, commands.clone())?;
        }
        Ok(())
    }

    /// Install `individual` and score it. Transient faults score as the
    /// worst value; anything else propagates.
    pub(crate) fn fitness_of(
        &self,
        fleet: &mut ConflictManager,
        individual: &Individual,
    ) -> Result<f64> {
        match self.install(fleet, individual) {
            Ok(()) => self.evaluate(fleet),
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "skipping candidate");
                Ok(self.worst())
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) fn to_schedule(&self, individual: &Individual) -> Schedule {
        self.ids.iter().copied().zip(individual.iter().cloned()).collect()
    }

    pub(crate) fn from_schedule(&self, schedule: &Schedule) -> Individual {
        self.ids
            .iter()
            .map(|id| schedule.get(id).cloned().unwrap_or_default())
            .collect()
    }

    /// Put the construction-time schedule back and rebuild conflicts.
    pub fn reinitialize_data(&self, fleet: &mut ConflictManager) -> Result<()> {
        fleet.apply_schedule(&self.initial)?;
        Ok(())
    }

    /// Result for a fleet with nothing to optimize.
    pub(crate) fn empty_solution(&self, fleet: &ConflictManager) -> Result<Solution> {
        Ok(Solution {
            schedule: Schedule::new(),
            fitness: self.evaluate(fleet)?,
            state: AlgorithmState::Finished,
        })
    }
}

pub trait Algorithm: Send {
    /// Registry name.
    fn name(&self) -> &'static str;

    fn base(&self) -> &AlgorithmBase;

    fn base_mut(&mut self) -> &mut AlgorithmBase;

    /// The search itself. It may leave the fleet in any state; `start`
    /// restores it afterwards.
    fn run(&mut self, fleet: &mut ConflictManager) -> Result<Solution>;

    fn set_objective(&mut self, objective: Box<dyn Objective>) {
        self.base_mut().objective = Some(Arc::from(objective));
    }

    /// Run the search and restore the fleet.
    fn start(&mut self, fleet: &mut ConflictManager) -> Result<Solution> {
        let name = self.name();
        self.base_mut().begin(name)?;
        let outcome = self.run(fleet);
        let restored = self.base().reinitialize_data(fleet);
        self.base_mut().finish(name, &outcome);
        restored?;
        outcome
    }

    fn stop(&self) {
        self.base().handle.stop();
    }

    fn handle(&self) -> AlgorithmHandle {
        self.base().handle.clone()
    }

    fn progress(&self) -> u8 {
        self.base().handle.progress()
    }

    fn process_time(&self) -> Duration {
        self.base().process_time()
    }

    fn is_timeout(&self) -> bool {
        self.base().is_timeout()
    }

    fn state(&self) -> AlgorithmState {
        self.base().state()
    }

    fn reinitialize_data(&self, fleet: &mut ConflictManager) -> Result<()> {
        self.base().reinitialize_data(fleet)
    }
}
