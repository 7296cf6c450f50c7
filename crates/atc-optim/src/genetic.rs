//! Genetic search over per-aircraft command schedules.

use crate::algorithm::{Algorithm, AlgorithmBase, AlgorithmConfig, AlgorithmState, Individual, Solution};
use crate::error::{OptimError, Result};
use atc_core::models::sort_commands;
use atc_core::{Command, ConflictManager};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const TOURNAMENT_SIZE: usize = 5;
const ELITE_FRACTION: f64 = 0.1;
const OVER_PRODUCTION_FACTOR: f64 = 1.5;
const MUTATION_DECAY: f64 = 0.99;
const MIN_MUTATION_RATE: f64 = 0.01;
/// Individuals kept in the pool of equally good bests.
const BEST_POOL_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Fitness-proportional.
    #[default]
    Roulette,
    /// Best of a random tournament plus one random member of it.
    Tournament,
}

#[derive(Debug, Clone)]
pub struct GeneticParams {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    /// Consecutive generations without a strictly better best before
    /// stopping. Zero disables early stopping.
    pub early_stopping: usize,
    pub selection: Selection,
    /// Carry the top tenth of each generation over unchanged.
    pub elitism: bool,
    /// Breed half again as many children and keep the fittest.
    pub over_production: bool,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            early_stopping: 20,
            selection: Selection::Roulette,
            elitism: true,
            over_production: false,
        }
    }
}

impl GeneticParams {
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(OptimError::invalid("population_size", "must be at least 2"));
        }
        if self.generations == 0 {
            return Err(OptimError::invalid("generations", "must be at least 1"));
        }
        for (name, value) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OptimError::invalid(name, "must lie in [0, 1]"));
            }
        }
        Ok(())
    }
}

pub struct Genetic {
    base: AlgorithmBase,
    params: GeneticParams,
    seed_population: Option<Vec<Individual>>,
    best_pool: Vec<Individual>,
    generations_run: usize,
}

impl Genetic {
    pub const NAME: &'static str = "AlgorithmGenetic";

    pub fn new(fleet: &ConflictManager, config: AlgorithmConfig, params: GeneticParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            base: AlgorithmBase::new(fleet, config),
            params,
            seed_population: None,
            best_pool: Vec::new(),
            generations_run: 0,
        })
    }

    /// Start from these individuals instead of random ones. Missing
    /// individuals are drawn at random, extra ones are dropped.
    pub fn with_initial_population(mut self, population: Vec<Individual>) -> Self {
        self.seed_population = Some(population);
        self
    }

    pub fn params(&self) -> &GeneticParams {
        &self.params
    }

    /// Individuals that tied with the final best.
    pub fn best_pool(&self) -> &[Individual] {
        &self.best_pool
    }

    pub fn generations_run(&self) -> usize {
        self.generations_run
    }

    fn initial_population(&mut self) -> Vec<Individual> {
        let size = self.params.population_size;
        let width = self.base.aircraft.len();
        let mut population: Vec<Individual> = self
            .seed_population
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter(|individual| individual.len() == width)
            .take(size)
            .collect();
        while population.len() < size {
            population.push(self.base.random_individual());
        }
        population
    }

    fn evaluate_population(
        &self,
        fleet: &mut ConflictManager,
        population: &[Individual],
    ) -> Result<Vec<f64>> {
        population
            .iter()
            .map(|individual| self.base.fitness_of(fleet, individual))
            .collect()
    }

    /// Best first.
    fn ranking(&self, fitness: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..fitness.len()).collect();
        order.sort_by(|&a, &b| {
            let ord = fitness[a].partial_cmp(&fitness[b]).unwrap_or(Ordering::Equal);
            if self.base.config.is_minimize {
                ord
            } else {
                ord.reverse()
            }
        });
        order
    }

    /// Roulette weights: `f - min` when maximizing, `max - f` when
    /// minimizing. Unusable individuals weigh nothing.
    ///
    /// Maximizing is not plain fitness-proportional selection: the shift by
    /// the population minimum keeps weights non-negative for objectives that
    /// go below zero, and leaves the worst individual with weight 0.
    fn roulette_weights(&self, fitness: &[f64]) -> Vec<f64> {
        let finite = fitness.iter().copied().filter(|f| f.is_finite());
        let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), f| {
            (lo.min(f), hi.max(f))
        });
        fitness
            .iter()
            .map(|&f| {
                if !f.is_finite() {
                    0.0
                } else if self.base.config.is_minimize {
                    max - f
                } else {
                    f - min
                }
            })
            .collect()
    }

    fn roulette(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return self.base.rng.random_range(0..weights.len());
        }
        let mut ticket = self.base.rng.random_range(0.0..total);
        for (index, weight) in weights.iter().enumerate() {
            if ticket < *weight {
                return index;
            }
            ticket -= weight;
        }
        weights.len() - 1
    }

    fn tournament(&mut self, fitness: &[f64]) -> (usize, usize) {
        let size = TOURNAMENT_SIZE.min(fitness.len());
        let entrants: Vec<usize> = (0..size)
            .map(|_| self.base.rng.random_range(0..fitness.len()))
            .collect();
        let mut winner = entrants[0];
        for &entrant in &entrants[1..] {
            if self.base.is_better(fitness[entrant], fitness[winner]) {
                winner = entrant;
            }
        }
        let other = entrants[self.base.rng.random_range(0..entrants.len())];
        (winner, other)
    }

    fn select_parents(&mut self, fitness: &[f64], weights: &[f64]) -> (usize, usize) {
        match self.params.selection {
            Selection::Roulette => (self.roulette(weights), self.roulette(weights)),
            Selection::Tournament => self.tournament(fitness),
        }
    }

    /// Per aircraft: splice a prefix of one parent onto the suffix of the
    /// other, or copy one parent whole.
    fn crossover(&mut self, a: &Individual, b: &Individual) -> Individual {
        a.iter()
            .zip(b)
            .map(|(left, right)| {
                if self.base.rng.random_bool(self.params.crossover_rate) {
                    let split = self.base.rng.random_range(0..=left.len().min(right.len()));
                    let mut child: Vec<Command> =
                        left[..split].iter().chain(&right[split..]).cloned().collect();
                    if child.is_empty() {
                        child = left.clone();
                    }
                    sort_commands(&mut child);
                    child
                } else if self.base.rng.random_bool(0.5) {
                    left.clone()
                } else {
                    right.clone()
                }
            })
            .collect()
    }

    /// Regenerate the take-off command with probability `2 * rate`, and
    /// each later command with probability `rate`.
    fn mutate(&mut self, individual: &mut Individual, rate: f64) {
        let first_rate = (2.0 * rate).min(1.0);
        for (k, commands) in individual.iter_mut().enumerate() {
            let mut changed = false;
            for position in 0..commands.len() {
                let p = if position == 0 { first_rate } else { rate };
                if !self.base.rng.random_bool(p) {
                    continue;
                }
                let fresh = self.base.aircraft[k].initialize();
                commands[position] = if position == 0 {
                    fresh[0].clone()
                } else {
                    fresh[self.base.rng.random_range(1..fresh.len())].clone()
                };
                changed = true;
            }
            if changed {
                sort_commands(commands);
            }
        }
    }

    fn breed(
        &mut self,
        fleet: &mut ConflictManager,
        population: &[Individual],
        fitness: &[f64],
        mutation_rate: f64,
    ) -> Result<Vec<Individual>> {
        let size = self.params.population_size;
        let ranking = self.ranking(fitness);
        let weights = self.roulette_weights(fitness);

        let mut next = Vec::with_capacity(size);
        if self.params.elitism {
            let elites = ((size as f64 * ELITE_FRACTION).ceil() as usize).min(size);
            next.extend(ranking.iter().take(elites).map(|&i| population[i].clone()));
        }

        let target = if self.params.over_production {
            (size as f64 * OVER_PRODUCTION_FACTOR).ceil() as usize
        } else {
            size
        };
        while next.len() < target {
            let (a, b) = self.select_parents(fitness, &weights);
            let mut child = self.crossover(&population[a], &population[b]);
            self.mutate(&mut child, mutation_rate);
            next.push(child);
        }

        if self.params.over_production {
            let scores = self.evaluate_population(fleet, &next)?;
            let order = self.ranking(&scores);
            next = order.into_iter().take(size).map(|i| next[i].clone()).collect();
        }
        Ok(next)
    }
}

impl Algorithm for Genetic {
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

        self.best_pool.clear();
        self.generations_run = 0;
        let mut population = self.initial_population();
        let mut mutation_rate = self.params.mutation_rate;
        let mut best: Option<(Individual, f64)> = None;
        let mut stagnant = 0usize;
        let mut state = AlgorithmState::Finished;

        for generation in 0..self.params.generations {
            if let Some(interrupted) = self.base.interruption() {
                state = interrupted;
                break;
            }

            let fitness = self.evaluate_population(fleet, &population)?;
            let leader = self.ranking(&fitness)[0];
            let leader_fitness = fitness[leader];
            let best_fitness = best.as_ref().map(|(_, f)| *f);
            match best_fitness {
                Some(current) if !self.base.is_better(leader_fitness, current) => {
                    if leader_fitness == current && self.best_pool.len() < BEST_POOL_CAPACITY {
                        self.best_pool.push(population[leader].clone());
                    }
                    stagnant += 1;
                }
                _ => {
                    best = Some((population[leader].clone(), leader_fitness));
                    self.best_pool = vec![population[leader].clone()];
                    stagnant = 0;
                }
            }
            self.generations_run = generation + 1;
            self.base
                .handle
                .set_progress(self.generations_run as f64 / self.params.generations as f64);
            if self.base.config.verbose {
                tracing::debug!(
                    generation,
                    leader = leader_fitness,
                    best = best.as_ref().map(|(_, f)| *f),
                    mutation_rate,
                    "generation evaluated"
                );
            }

            if self.params.early_stopping > 0 && stagnant >= self.params.early_stopping {
                tracing::debug!(generation, "early stopping");
                break;
            }
            if generation + 1 == self.params.generations {
                break;
            }

            population = self.breed(fleet, &population, &fitness, mutation_rate)?;
            mutation_rate = (mutation_rate * MUTATION_DECAY).max(MIN_MUTATION_RATE);
        }

        match best {
            Some((individual, fitness)) => Ok(Solution {
                schedule: self.base.to_schedule(&individual),
                fitness,
                state,
            }),
            // Interrupted before the first generation was scored.
            None => {
                let initial = self.base.initial_schedule().clone();
                fleet.apply_schedule(&initial)?;
                Ok(Solution {
                    schedule: initial,
                    fitness: self.base.evaluate(fleet)?,
                    state,
                })
            }
        }
    }
}
