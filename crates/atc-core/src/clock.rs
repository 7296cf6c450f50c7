//! Discrete-step simulation clock.
//!
//! The clock only moves aircraft along their already-timed trajectories
//! and prunes elapsed conflicts. It never edits command schedules.

use crate::conflict::ConflictManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Default wall-clock period between two ticks.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    NotStarted,
    Running,
    Paused,
    /// Every aircraft reached its final waypoint. Terminal until reset.
    Finished,
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    period: Duration,
    speed_factor: u32,
    time: f64,
    state: ClockState,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, 1)
    }
}

impl SimulationClock {
    /// `speed_factor` below 1 is raised to 1.
    pub fn new(period: Duration, speed_factor: u32) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            speed_factor: speed_factor.max(1),
            time: 0.0,
            state: ClockState::NotStarted,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn speed_factor(&self) -> u32 {
        self.speed_factor
    }

    pub fn set_speed_factor(&mut self, speed_factor: u32) {
        self.speed_factor = speed_factor.max(1);
    }

    /// Simulation time elapsed per tick.
    pub fn step(&self) -> f64 {
        self.period.as_secs_f64() * f64::from(self.speed_factor)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn start(&mut self) {
        if matches!(self.state, ClockState::NotStarted | ClockState::Paused) {
            self.state = ClockState::Running;
        }
    }

    pub fn stop(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
        }
    }

    /// Running <-> Paused. Starts a fresh clock.
    pub fn toggle(&mut self) {
        match self.state {
            ClockState::Running => self.stop(),
            ClockState::NotStarted | ClockState::Paused => self.start(),
            ClockState::Finished => {}
        }
    }

    /// Back to time zero with every aircraft on the ground and conflicts rebuilt.
    pub fn reset(&mut self, manager: &mut ConflictManager) {
        self.time = 0.0;
        self.state = ClockState::NotStarted;
        manager.rewind();
    }

    /// Advance one period if running.
    pub fn tick(&mut self, manager: &mut ConflictManager) -> ClockState {
        if self.state != ClockState::Running {
            return self.state;
        }
        let dt = self.step();
        self.time += dt;
        manager.advance_all(dt);
        manager.set_clock(self.time);
        self.check_finished(manager);
        self.state
    }

    /// Fast mode: re-seat every aircraft at absolute time `t` in one call.
    pub fn set_time(&mut self, manager: &mut ConflictManager, t: f64) -> ClockState {
        self.time = t;
        manager.set_time_all(t);
        manager.set_clock(t);
        self.check_finished(manager);
        self.state
    }

    fn check_finished(&mut self, manager: &ConflictManager) {
        if manager.all_finished() && self.state != ClockState::Finished {
            self.state = ClockState::Finished;
            tracing::info!(time = self.time, "all aircraft finished");
        }
    }
}

/// Drive the clock on a wall-clock interval until every aircraft is
/// finished or `stop` flips to `true`.
pub async fn run_clock(
    clock: &mut SimulationClock,
    manager: &mut ConflictManager,
    mut stop: watch::Receiver<bool>,
) -> ClockState {
    let mut ticker = interval(clock.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    clock.start();
    tracing::info!(
        period_ms = clock.period().as_millis() as u64,
        speed_factor = clock.speed_factor(),
        "clock started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if clock.tick(manager) == ClockState::Finished {
                    break;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    clock.stop();
                    break;
                }
            }
        }
    }

    tracing::info!(time = clock.time(), state = ?clock.state(), "clock stopped");
    clock.state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::Aircraft;
    use crate::models::Command;
    use crate::waypoint::Waypoint;

    fn manager() -> ConflictManager {
        let plan = vec![
            Waypoint::new("A", 0.2, 0.5, 0.0).unwrap(),
            Waypoint::new("B", 0.5, 0.5, 0.0).unwrap(),
        ];
        let start = plan[0].point;
        let aircraft =
            Aircraft::with_commands(1, plan, vec![Command::new(1, 0.0, 0.01)], Some(start))
                .unwrap();
        let mut manager = ConflictManager::default();
        manager.register_aircraft(aircraft).unwrap();
        manager
    }

    #[test]
    fn state_machine_transitions() {
        let mut clock = SimulationClock::default();
        assert_eq!(clock.state(), ClockState::NotStarted);
        clock.toggle();
        assert_eq!(clock.state(), ClockState::Running);
        clock.toggle();
        assert_eq!(clock.state(), ClockState::Paused);
        clock.start();
        assert_eq!(clock.state(), ClockState::Running);
    }

    #[test]
    fn paused_clock_does_not_advance() {
        let mut manager = manager();
        let mut clock = SimulationClock::new(Duration::from_millis(100), 10);
        assert_eq!(clock.tick(&mut manager), ClockState::NotStarted);
        assert_eq!(clock.time(), 0.0);
    }

    #[test]
    fn ticks_advance_aircraft_until_finished() {
        let mut manager = manager();
        let mut clock = SimulationClock::new(Duration::from_millis(100), 10);
        clock.start();

        assert_eq!(clock.tick(&mut manager), ClockState::Running);
        assert!((clock.time() - 1.0).abs() < 1e-12);
        assert!((manager.aircraft(1).unwrap().time() - 1.0).abs() < 1e-12);

        // 30 time units to reach B at 0.01 per unit
        let mut ticks = 1;
        while clock.tick(&mut manager) == ClockState::Running {
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(clock.state(), ClockState::Finished);
        clock.toggle();
        assert_eq!(clock.state(), ClockState::Finished);

        clock.reset(&mut manager);
        assert_eq!(clock.state(), ClockState::NotStarted);
        assert!(!manager.aircraft(1).unwrap().is_finished());
    }

    #[test]
    fn fast_forward_reseats_every_aircraft() {
        let mut manager = manager();
        let mut clock = SimulationClock::default();
        clock.set_time(&mut manager, 15.0);
        let aircraft = manager.aircraft(1).unwrap();
        assert!((aircraft.position().x - 0.35).abs() < 1e-9);
        assert_eq!(clock.set_time(&mut manager, 100.0), ClockState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn run_clock_stops_when_finished() {
        let mut manager = manager();
        let mut clock = SimulationClock::new(Duration::from_millis(100), 20);
        let (_tx, rx) = watch::channel(false);
        let state = run_clock(&mut clock, &mut manager, rx).await;
        assert_eq!(state, ClockState::Finished);
        assert!(manager.all_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn run_clock_honours_stop_signal() {
        let mut manager = manager();
        let mut clock = SimulationClock::new(Duration::from_millis(100), 1);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let state = run_clock(&mut clock, &mut manager, rx).await;
        assert_eq!(state, ClockState::Paused);
        assert!(!manager.all_finished());
    }
}
