//! Simulated annealing over per-aircraft command schedules.
//!
//! A heat-up phase raises the temperature until enough random moves are
//! accepted; a geometric cooling phase then walks neighbours down to a
//! tenth of that temperature.

use crate::algorithm::{Algorithm, AlgorithmBase, AlgorithmConfig, AlgorithmState, Individual, Solution};
use crate::error::{OptimError, Result};
use atc_core::ConflictManager;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct AnnealingParams {
    /// Neighbour proposals per temperature plateau.
    pub number_of_transitions: usize,
    /// Temperature the heat-up phase starts from.
    pub initial_temperature: f64,
    /// Multiplier applied to the temperature after each heat-up round.
    pub heat_up_rate: f64,
    /// Acceptance ratio that ends the heat-up phase.
    pub heat_up_acceptance: f64,
    pub cooling_rate: f64,
    pub max_heat_up_rounds: usize,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            number_of_transitions: 200,
            initial_temperature: 0.01,
            heat_up_rate: 1.5,
            heat_up_acceptance: 0.8,
            cooling_rate: 0.99,
            max_heat_up_rounds: 50,
        }
    }
}

impl AnnealingParams {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_transitions == 0 {
            return Err(OptimError::invalid("number_of_transitions", "must be at least 1"));
        }
        if !(self.initial_temperature > 0.0) {
            return Err(OptimError::invalid("initial_temperature", "must be positive"));
        }
        if !(self.heat_up_rate > 1.0) {
            return Err(OptimError::invalid("heat_up_rate", "must be greater than 1"));
        }
        if !(0.0..=1.0).contains(&self.heat_up_acceptance) {
            return Err(OptimError::invalid("heat_up_acceptance", "must lie in [0, 1]"));
        }
        if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) {
            return Err(OptimError::invalid("cooling_rate", "must lie in (0, 1)"));
        }
        Ok(())
    }

    /// Plateaus after the first one needed to cool to a tenth of the
    /// starting temperature.
    pub fn number_of_plateaus(&self) -> usize {
        (0.1f64.ln() / self.cooling_rate.ln()).ceil() as usize
    }
}

/// Best individual seen so far and its fitness.
struct Best {
    individual: Individual,
    fitness: f64,
}

pub struct SimulatedAnnealing {
    base: AlgorithmBase,
    params: AnnealingParams,
    temperature: Option<f64>,
}

impl SimulatedAnnealing {
    pub const NAME: &'static str = "AlgorithmRecuit";

    pub fn new(fleet: &ConflictManager, config: AlgorithmConfig, params: AnnealingParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            base: AlgorithmBase::new(fleet, config),
            params,
            temperature: None,
        })
    }

    pub fn params(&self) -> &AnnealingParams {
        &self.params
    }

    /// Temperature reached by the last heat-up phase.
    pub fn initial_temperature(&self) -> Option<f64> {
        self.temperature
    }

    fn record(&self, best: &mut Best, individual: &Individual, fitness: f64) {
        if self.base.is_better(fitness, best.fitness) {
            *best = Best {
                individual: individual.clone(),
                fitness,
            };
        }
    }

    /// Raise the temperature until the acceptance ratio over random
    /// states and their neighbours reaches `heat_up_acceptance`.
    fn heat_up(&mut self, fleet: &mut ConflictManager, best: &mut Best) -> Result<Option<f64>> {
        let mut temperature = self.params.initial_temperature;
        for round in 0..self.params.max_heat_up_rounds {
            if self.base.interruption().is_some() {
                return Ok(None);
            }
            let mut accepted = 0usize;
            for _ in 0..self.params.number_of_transitions {
                let mut state = self.base.random_individual();
                let current = self.base.fitness_of(fleet, &state)?;
                self.record(best, &state, current);

                let k = self.base.rng.random_range(0..state.len());
                state[k] = self.base.aircraft[k].generate_commands(&state[k]);
                let candidate = self.base.fitness_of(fleet, &state)?;
                self.record(best, &state, candidate);

                if self.base.accept(current, candidate, temperature) {
                    accepted += 1;
                }
            }
            let ratio = accepted as f64 / self.params.number_of_transitions as f64;
            if self.base.config.verbose {
                tracing::debug!(round, temperature, ratio, "heat-up round");
            }
            if ratio >= self.params.heat_up_acceptance {
                break;
            }
            temperature *= self.params.heat_up_rate;
        }
        Ok(Some(temperature))
    }

    fn finish(&self, best: Best, state: AlgorithmState) -> Solution {
        Solution {
            schedule: self.base.to_schedule(&best.individual),
            fitness: best.fitness,
            state,
        }
    }
}

impl Algorithm for SimulatedAnnealing {
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

        let mut best = Best {
            individual: self.base.from_schedule(self.base.initial_schedule()),
            fitness: self.base.evaluate(fleet)?,
        };

        let Some(t0) = self.heat_up(fleet, &mut best)? else {
            let state = self.base.interruption().unwrap_or(AlgorithmState::Cancelled);
            return Ok(self.finish(best, state));
        };
        self.temperature = Some(t0);

        // Cool down from the best state found while heating.
        let mut current = best.individual.clone();
        let mut current_fitness = self.base.fitness_of(fleet, &current)?;

        let plateaus = self.params.number_of_plateaus();
        for plateau in 0..=plateaus {
            if let Some(state) = self.base.interruption() {
                return Ok(self.finish(best, state));
            }
            let temperature = t0 * self.params.cooling_rate.powi(plateau as i32);
            let mut accepted = 0usize;

            for _ in 0..self.params.number_of_transitions {
                let k = self.base.rng.random_range(0..current.len());
                let previous = std::mem::take(&mut current[k]);
                let proposal = self.base.aircraft[k].generate_commands(&previous);

                let installed = self.base.aircraft[k].update_commands(fleet, proposal.clone());
                let candidate = match installed {
                    Ok(()) => self.base.evaluate(fleet)?,
                    Err(err) if err.is_transient() => {
                        tracing::warn!(error = %err, "skipping neighbour");
                        self.base.aircraft[k].update_commands(fleet, previous.clone())?;
                        current[k] = previous;
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                if self.base.accept(current_fitness, candidate, temperature) {
                    current[k] = proposal;
                    current_fitness = candidate;
                    accepted += 1;
                    self.record(&mut best, &current, current_fitness);
                } else {
                    self.base.aircraft[k].update_commands(fleet, previous.clone())?;
                    current[k] = previous;
                }
            }

            self.base.handle.set_progress((plateau + 1) as f64 / (plateaus + 1) as f64);
            if self.base.config.verbose {
                tracing::debug!(
                    plateau,
                    temperature,
                    accepted,
                    current = current_fitness,
                    best = best.fitness,
                    "cooling plateau"
                );
            }
        }

        Ok(self.finish(best, AlgorithmState::Finished))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::AbsoluteNumberConflict;
    use atc_core::{Aircraft, Command, Waypoint};

    fn waypoint(name: &str, x: f64, y: f64) -> Waypoint {
        Waypoint::new(name, x, y, 0.0).unwrap()
    }

    fn crossing() -> ConflictManager {
        let mut manager = ConflictManager::default();
        for (id, plan) in [
            (1, [("A", 0.2, 0.5), ("B", 0.5, 0.5), ("C", 0.8, 0.5)]),
            (2, [("D", 0.5, 0.2), ("B", 0.5, 0.5), ("E", 0.5, 0.8)]),
        ] {
            let plan: Vec<_> = plan.iter().map(|(n, x, y)| waypoint(n, *x, *y)).collect();
            let start = plan[0].point;
            let aircraft =
                Aircraft::with_commands(id, plan, vec![Command::new(id, 0.0, 0.002)], Some(start))
                    .unwrap();
            manager.register_aircraft(aircraft).unwrap();
        }
        manager
    }

    fn quick() -> AnnealingParams {
        AnnealingParams {
            number_of_transitions: 20,
            cooling_rate: 0.8,
            ..AnnealingParams::default()
        }
    }

    #[test]
    fn plateau_count() {
        let params = AnnealingParams::default();
        assert_eq!(params.number_of_plateaus(), 230);
        let fast = AnnealingParams {
            cooling_rate: 0.5,
            ..params
        };
        assert_eq!(fast.number_of_plateaus(), 4);
    }

    #[test]
    fn rejects_bad_parameters() {
        let fleet = ConflictManager::default();
        let bad = AnnealingParams {
            cooling_rate: 1.5,
            ..AnnealingParams::default()
        };
        assert!(SimulatedAnnealing::new(&fleet, AlgorithmConfig::default(), bad).is_err());
    }

    #[test]
    fn resolves_and_restores() {
        let mut fleet = crossing();
        let before = fleet.schedule();
        let mut annealing =
            SimulatedAnnealing::new(&fleet, AlgorithmConfig::default(), quick()).unwrap();
        annealing.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));

        let solution = annealing.start(&mut fleet).unwrap();
        assert_eq!(solution.fitness, 0.0);
        assert_eq!(solution.state, AlgorithmState::Finished);
        assert_eq!(annealing.state(), AlgorithmState::Finished);
        assert_eq!(annealing.progress(), 100);
        assert!(annealing.initial_temperature().is_some());

        assert_eq!(fleet.schedule(), before);
        assert_eq!(fleet.total_unique_conflicts(), 1);

        fleet.apply_schedule(&solution.schedule).unwrap();
        assert_eq!(fleet.total_unique_conflicts(), 0);
    }

    #[test]
    fn cancelled_before_start_returns_initial() {
        let mut fleet = crossing();
        let mut annealing =
            SimulatedAnnealing::new(&fleet, AlgorithmConfig::default(), quick()).unwrap();
        annealing.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));
        annealing.stop();

        let solution = annealing.start(&mut fleet).unwrap();
        assert_eq!(solution.state, AlgorithmState::Cancelled);
        assert_eq!(solution.schedule, fleet.schedule());
        assert_eq!(solution.fitness, 1.0);
    }
}
