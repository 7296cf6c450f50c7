//! End-to-end behaviour of the trajectory model and conflict manager.

use atc_core::{
    Aircraft, AircraftId, AirspaceConfig, ClockState, Command, ConflictManager, Point,
    RecordedTraffic, SimulationClock, TrafficGenerator, Waypoint, WaypointRegistry,
};
use std::time::Duration;

fn registry() -> WaypointRegistry {
    let mut registry = WaypointRegistry::new();
    for (name, x, y) in [
        ("A", 0.2, 0.5),
        ("B", 0.5, 0.5),
        ("C", 0.8, 0.5),
        ("D", 0.5, 0.2),
        ("E", 0.5, 0.8),
    ] {
        registry.register(name, x, y, 0.0).unwrap();
    }
    registry
}

fn plan(registry: &WaypointRegistry, names: &[&str]) -> Vec<Waypoint> {
    names
        .iter()
        .map(|name| registry.require(name).unwrap().clone())
        .collect()
}

/// Aircraft starting on its first waypoint, so timings are exact.
fn aircraft(
    registry: &WaypointRegistry,
    id: AircraftId,
    names: &[&str],
    take_off: f64,
    speed: f64,
) -> Aircraft {
    let plan = plan(registry, names);
    let start: Point = plan[0].point;
    Aircraft::with_commands(id, plan, vec![Command::new(id, take_off, speed)], Some(start)).unwrap()
}

fn crossing(take_off_two: f64, speed: f64) -> ConflictManager {
    let registry = registry();
    let mut manager = ConflictManager::default();
    manager
        .register_aircraft(aircraft(&registry, 1, &["A", "B", "C"], 0.0, speed))
        .unwrap();
    manager
        .register_aircraft(aircraft(&registry, 2, &["D", "B", "E"], take_off_two, speed))
        .unwrap();
    manager
}

#[test]
fn crossing_aircraft_far_apart_do_not_conflict() {
    let manager = crossing(1000.0, 0.002);
    let eta_one = manager.aircraft(1).unwrap().eta("B").unwrap();
    let eta_two = manager.aircraft(2).unwrap().eta("B").unwrap();

    assert!((eta_one - 150.0).abs() < 1e-6);
    assert!((eta_two - 1150.0).abs() < 1e-6);
    assert!(manager.all_conflicts().is_empty());
    assert_eq!(manager.total_unique_conflicts(), 0);
}

#[test]
fn simultaneous_crossing_conflicts_once_and_symmetrically() {
    let manager = crossing(0.0, 0.002);

    let conflicts = manager.all_conflicts();
    assert_eq!(conflicts.len(), 1);
    let record = &conflicts[0];
    assert_eq!(record.waypoint, "B");
    assert_eq!((record.aircraft_one, record.aircraft_two), (1, 2));
    assert!(record.t1 <= record.t2);

    assert_eq!(manager.aircraft(1).unwrap().conflicts_with(2), &[record.clone()]);
    assert_eq!(manager.aircraft(2).unwrap().conflicts_with(1), &[record.clone()]);
    assert_eq!(manager.waypoint_conflicts("B"), &[record.clone()]);
    assert_eq!(manager.total_unique_conflicts(), 1);
}

#[test]
fn late_second_take_off_clears_the_crossing() {
    // Aircraft 2 then reaches B 150 s after aircraft 1.
    let manager = crossing(150.0, 0.002);
    assert!(manager.all_conflicts().is_empty());
}

#[test]
fn stale_conflicts_are_pruned_by_the_clock() {
    // At 0.003 both aircraft reach B at t = 100.
    let mut manager = crossing(0.0, 0.003);
    let conflicts = manager.all_conflicts();
    assert_eq!(conflicts.len(), 1);
    assert!((conflicts[0].t1 - 100.0).abs() < 1e-6);

    manager.set_clock(150.0);
    assert!(manager.all_conflicts().is_empty());
    assert!(manager.aircraft(1).unwrap().conflicts_with(2).is_empty());
    assert!(manager.aircraft(2).unwrap().conflicts_with(1).is_empty());
    assert!(manager.waypoint_conflicts("B").is_empty());
}

#[test]
fn rescheduling_resolves_and_reintroduces_conflicts() {
    let mut manager = crossing(0.0, 0.002);
    manager
        .set_commands(2, vec![Command::new(2, 500.0, 0.002)])
        .unwrap();
    assert!(manager.all_conflicts().is_empty());

    manager
        .set_commands(2, vec![Command::new(2, 30.0, 0.002)])
        .unwrap();
    assert_eq!(manager.total_unique_conflicts(), 1);

    manager.delete_aircraft(1).unwrap();
    assert!(manager.all_conflicts().is_empty());
    assert!(manager.aircraft(2).unwrap().conflicts().is_empty());
}

#[test]
fn clock_plays_the_fleet_to_completion() {
    let mut manager = crossing(0.0, 0.002);
    let mut clock = SimulationClock::new(Duration::from_millis(100), 100);
    clock.start();

    let mut ticks = 0;
    while clock.tick(&mut manager) == ClockState::Running {
        ticks += 1;
        assert!(ticks < 10_000, "clock never finished");
    }
    assert_eq!(clock.state(), ClockState::Finished);
    assert!(clock.time() >= 300.0);
    assert!(manager.all_finished());
    assert!(manager.all_conflicts().is_empty());

    let final_position = manager.aircraft(1).unwrap().position();
    assert!((final_position.x - 0.8).abs() < 1e-9);
}

#[test]
fn recorded_traffic_round_trips_through_json() {
    let airspace = AirspaceConfig::from_json(
        r#"{
            "waypoints": [
                {"name": "A", "x": 0.2, "y": 0.5},
                {"name": "B", "x": 0.5, "y": 0.5},
                {"name": "C", "x": 0.8, "y": 0.5},
                {"name": "D", "x": 0.5, "y": 0.2},
                {"name": "E", "x": 0.5, "y": 0.8}
            ],
            "airways": [{"name": "WE", "waypoints": ["A", "B", "C"]}]
        }"#,
    )
    .unwrap()
    .build()
    .unwrap();

    let manager = crossing(40.0, 0.002);
    let json = RecordedTraffic::capture(manager.fleet(), false).to_json().unwrap();
    let rebuilt = RecordedTraffic::from_json(&json)
        .unwrap()
        .generate(&airspace)
        .unwrap();

    assert_eq!(rebuilt.len(), 2);
    for aircraft in &rebuilt {
        let original = manager.aircraft(aircraft.id()).unwrap();
        assert_eq!(aircraft.commands(), original.commands());
        assert_eq!(aircraft.flight_plan_timed(), original.flight_plan_timed());
    }
}
