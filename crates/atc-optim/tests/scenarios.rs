//! Search algorithms driven end to end on small fleets.

use atc_core::{Aircraft, AircraftId, Command, ConflictManager, Waypoint};
use atc_optim::{
    AbsoluteNumberConflict, Algorithm, AlgorithmConfig, AlgorithmRegistry, AlgorithmState,
    AnnealingParams, Genetic, GeneticParams, IntervalKind, LayeredGenetic, LayeredParams,
    ObjectiveRegistry, OptimError, Params, SimulatedAnnealing, SpeedSet,
};
use serde_json::json;
use std::time::Duration;

const WEST_EAST: [(&str, f64, f64); 3] = [("A", 0.2, 0.5), ("B", 0.5, 0.5), ("C", 0.8, 0.5)];
const SOUTH_NORTH: [(&str, f64, f64); 3] = [("D", 0.5, 0.2), ("B", 0.5, 0.5), ("E", 0.5, 0.8)];

fn aircraft(id: AircraftId, route: &[(&str, f64, f64)], take_off: f64) -> Aircraft {
    let plan: Vec<Waypoint> = route
        .iter()
        .map(|(name, x, y)| Waypoint::new(*name, *x, *y, 0.0).unwrap())
        .collect();
    let start = plan[0].point;
    Aircraft::with_commands(id, plan, vec![Command::new(id, take_off, 0.002)], Some(start)).unwrap()
}

/// Two aircraft meeting over B at t = 150.
fn crossing() -> ConflictManager {
    let mut fleet = ConflictManager::default();
    fleet.register_aircraft(aircraft(1, &WEST_EAST, 0.0)).unwrap();
    fleet.register_aircraft(aircraft(2, &SOUTH_NORTH, 0.0)).unwrap();
    assert_eq!(fleet.total_unique_conflicts(), 1);
    fleet
}

/// Ten aircraft alternating between the two routes, departing every minute.
fn stream() -> ConflictManager {
    let mut fleet = ConflictManager::default();
    for id in 1..=10u32 {
        let route = if id % 2 == 0 { &SOUTH_NORTH } else { &WEST_EAST };
        let take_off = f64::from(id - 1) * 60.0;
        fleet.register_aircraft(aircraft(id, route, take_off)).unwrap();
    }
    fleet
}

fn small_genetic() -> GeneticParams {
    GeneticParams {
        population_size: 20,
        generations: 30,
        ..GeneticParams::default()
    }
}

#[test]
fn annealing_clears_a_simple_crossing() {
    let mut fleet = crossing();
    let before = fleet.schedule();
    let config = AlgorithmConfig {
        speeds: SpeedSet::new(vec![0.001, 0.002, 0.003]).unwrap(),
        ..AlgorithmConfig::default()
    };
    let params = AnnealingParams {
        number_of_transitions: 200,
        cooling_rate: 0.99,
        ..AnnealingParams::default()
    };
    let mut algorithm = SimulatedAnnealing::new(&fleet, config, params).unwrap();
    algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));

    let solution = algorithm.start(&mut fleet).unwrap();
    assert_eq!(solution.state, AlgorithmState::Finished);
    assert_eq!(solution.fitness, 0.0);
    assert_eq!(fleet.schedule(), before, "search must leave the fleet as it found it");

    fleet.apply_schedule(&solution.schedule).unwrap();
    assert!(fleet.all_conflicts().is_empty());
    for (_, commands) in &solution.schedule {
        assert!(commands.windows(2).all(|w| w[0].time <= w[1].time));
    }
}

#[test]
fn layered_genetic_splits_into_groups_and_merges_a_full_population() {
    let mut fleet = stream();
    let before = fleet.schedule();
    let params = LayeredParams {
        genetic: GeneticParams {
            population_size: 8,
            generations: 4,
            ..GeneticParams::default()
        },
        interval: IntervalKind::GroupSize(5),
        ..LayeredParams::default()
    };
    let config = AlgorithmConfig {
        number_of_layers: 2,
        ..AlgorithmConfig::default()
    };
    let mut algorithm = LayeredGenetic::new(&fleet, config, params).unwrap();
    assert_eq!(algorithm.intervals(), &[vec![1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10]]);

    algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));
    let solution = algorithm.start(&mut fleet).unwrap();

    assert_eq!(solution.state, AlgorithmState::Finished);
    assert_eq!(algorithm.last_merged_population().len(), 8);
    assert_eq!(solution.schedule.len(), 10);
    assert_eq!(fleet.schedule(), before);
}

fn timed(limit_ms: u64) -> AlgorithmConfig {
    AlgorithmConfig {
        timeout: Some(Duration::from_millis(limit_ms)),
        ..AlgorithmConfig::default()
    }
}

#[test]
fn annealing_timeout_keeps_best_and_restores_fleet() {
    let mut fleet = stream();
    let before = fleet.schedule();
    let params = AnnealingParams {
        number_of_transitions: 50,
        cooling_rate: 0.99999,
        ..AnnealingParams::default()
    };
    let mut algorithm = SimulatedAnnealing::new(&fleet, timed(50), params).unwrap();
    algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));

    let solution = algorithm.start(&mut fleet).unwrap();
    assert_eq!(solution.state, AlgorithmState::Timeout);
    assert_eq!(algorithm.state(), AlgorithmState::Timeout);
    assert_eq!(solution.schedule.len(), 10);
    assert_eq!(fleet.schedule(), before);
}

#[test]
fn layered_timeout_stops_inside_an_interval_and_restores_fleet() {
    let mut fleet = stream();
    let before = fleet.schedule();
    let params = LayeredParams {
        genetic: GeneticParams {
            population_size: 20,
            generations: 1_000_000,
            ..GeneticParams::default()
        },
        interval: IntervalKind::GroupSize(5),
        ..LayeredParams::default()
    };
    let mut algorithm = LayeredGenetic::new(&fleet, timed(50), params).unwrap();
    algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));

    let solution = algorithm.start(&mut fleet).unwrap();
    assert_eq!(solution.state, AlgorithmState::Timeout);
    assert_eq!(solution.schedule.len(), 10);
    assert_eq!(fleet.schedule(), before);
}

#[test]
fn empty_fleet_yields_an_empty_schedule() {
    let mut algorithms: Vec<Box<dyn Algorithm>> = {
        let fleet = ConflictManager::default();
        vec![
            Box::new(
                SimulatedAnnealing::new(&fleet, AlgorithmConfig::default(), AnnealingParams::default())
                    .unwrap(),
            ),
            Box::new(Genetic::new(&fleet, AlgorithmConfig::default(), small_genetic()).unwrap()),
            Box::new(
                LayeredGenetic::new(&fleet, AlgorithmConfig::default(), LayeredParams::default())
                    .unwrap(),
            ),
        ]
    };
    for algorithm in &mut algorithms {
        let mut fleet = ConflictManager::default();
        algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));
        let solution = algorithm.start(&mut fleet).unwrap();
        assert!(solution.schedule.is_empty(), "{}", algorithm.name());
        assert_eq!(solution.state, AlgorithmState::Finished);
        assert_eq!(solution.fitness, 0.0);
    }
}

#[test]
fn a_stopped_algorithm_can_be_started_again() {
    let mut fleet = crossing();
    let before = fleet.schedule();
    let mut algorithm = Genetic::new(&fleet, AlgorithmConfig::default(), small_genetic()).unwrap();
    algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));

    algorithm.stop();
    let cancelled = algorithm.start(&mut fleet).unwrap();
    assert_eq!(cancelled.state, AlgorithmState::Cancelled);
    assert_eq!(fleet.schedule(), before);
    assert!(!algorithm.handle().is_stopped());

    let rerun = algorithm.start(&mut fleet).unwrap();
    assert_eq!(rerun.state, AlgorithmState::Finished);
    assert_eq!(algorithm.progress(), 100);
}

#[test]
fn seeded_genetic_runs_are_reproducible() {
    let run = || {
        let mut fleet = ConflictManager::default();
        for id in 1..=4u32 {
            let route = if id % 2 == 0 { &SOUTH_NORTH } else { &WEST_EAST };
            fleet.register_aircraft(aircraft(id, route, 0.0)).unwrap();
        }
        let mut algorithm =
            Genetic::new(&fleet, AlgorithmConfig::default(), small_genetic()).unwrap();
        algorithm.set_objective(Box::new(AbsoluteNumberConflict::new(0.0)));
        algorithm.start(&mut fleet).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.fitness, second.fitness);
    assert_eq!(first.schedule, second.schedule);
}

#[test]
fn starting_without_an_objective_fails() {
    let mut fleet = crossing();
    let mut algorithm = Genetic::new(&fleet, AlgorithmConfig::default(), small_genetic()).unwrap();
    let err = algorithm.start(&mut fleet).unwrap_err();
    assert!(matches!(err, OptimError::MissingObjective { .. }));
    assert_eq!(fleet.total_unique_conflicts(), 1);
}

#[test]
fn registry_builds_and_runs_by_name() {
    let mut fleet = crossing();
    let algorithms = AlgorithmRegistry::with_defaults();
    let objectives = ObjectiveRegistry::with_defaults();

    let params: Params = json!({"population_size": 10, "generations": 10, "timeout": 30.0})
        .as_object()
        .cloned()
        .unwrap();
    let mut algorithm = algorithms
        .instantiate("AlgorithmGenetic", &fleet, &params)
        .unwrap();
    let objective = objectives
        .instantiate("AbsoluteNumberConflict", &fleet, &Params::new())
        .unwrap();
    algorithm.set_objective(objective);

    let solution = algorithm.start(&mut fleet).unwrap();
    fleet.apply_schedule(&solution.schedule).unwrap();
    assert_eq!(fleet.total_unique_conflicts() as f64, solution.fitness);

    let unknown = algorithms.instantiate("AlgorithmTabu", &fleet, &Params::new());
    assert!(matches!(unknown, Err(OptimError::UnknownAlgorithm(_))));
}
