//! Per-aircraft command sampling.
//!
//! The search algorithms only see [`SimulatedAircraft`]: a way to draw a
//! fresh schedule, a way to perturb one, and a way to install one on the
//! fleet. [`SampledAircraft`] is the stock implementation.

use crate::error::Result;
use crate::speed::SpeedSet;
use atc_core::models::sort_commands;
use atc_core::{Aircraft, AircraftId, Command, ConflictManager};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Upper bound on the extra commands drawn by `initialize`, and on the
/// number of commands touched by one `generate_commands` call.
pub const NB_MAXIMUM_COMMANDS: usize = 5;

/// Take-off is drawn up to this many seconds after the declared one.
const TAKE_OFF_DELAY: f64 = 180.0;
/// Maximum gap between two consecutive sampled commands.
const COMMAND_SPACING: f64 = 120.0;
const FIRST_JITTER: f64 = 25.0;
const FIRST_JITTER_PROBABILITY: f64 = 0.1;
const JITTER: f64 = 10.0;

pub trait SimulatedAircraft: Send {
    /// A fresh random schedule.
    fn initialize(&mut self) -> Vec<Command>;

    /// A perturbed copy of `current`.
    fn generate_commands(&mut self, current: &[Command]) -> Vec<Command>;

    /// Install `commands` on the fleet; the manager rebuilds the
    /// conflicts of this aircraft before returning.
    fn update_commands(&self, manager: &mut ConflictManager, commands: Vec<Command>)
        -> Result<()>;
}

/// Samples speed schedules for one aircraft from its own id-seeded RNG.
#[derive(Debug, Clone)]
pub struct SampledAircraft {
    id: AircraftId,
    take_off_time: f64,
    speeds: SpeedSet,
    rng: StdRng,
}

impl SampledAircraft {
    pub fn new(id: AircraftId, take_off_time: f64, speeds: SpeedSet) -> Self {
        Self {
            id,
            take_off_time,
            speeds,
            rng: StdRng::seed_from_u64(id as u64),
        }
    }

    pub fn from_aircraft(aircraft: &Aircraft, speeds: SpeedSet) -> Self {
        Self::new(aircraft.id(), aircraft.take_off_time(), speeds)
    }

    pub fn id(&self) -> AircraftId {
        self.id
    }

    fn mutate_time(&mut self, time: f64, first: bool) -> f64 {
        let jitter = if first {
            if !self.rng.random_bool(FIRST_JITTER_PROBABILITY) {
                return time;
            }
            self.rng.random_range(-FIRST_JITTER..=FIRST_JITTER)
        } else {
            self.rng.random_range(-JITTER..=JITTER)
        };
        (time + jitter).max(0.0)
    }
}

impl SimulatedAircraft for SampledAircraft {
    fn initialize(&mut self) -> Vec<Command> {
        let take_off = (self.take_off_time + self.rng.random_range(0.0..=TAKE_OFF_DELAY)).max(0.0);
        let extra = self.rng.random_range(1..=NB_MAXIMUM_COMMANDS);

        let mut commands = Vec::with_capacity(extra + 1);
        commands.push(Command::new(self.id, take_off, self.speeds.sample(&mut self.rng)));
        let mut t = take_off;
        for _ in 0..extra {
            t += self.rng.random_range(0.0..=COMMAND_SPACING);
            commands.push(Command::new(self.id, t, self.speeds.sample(&mut self.rng)));
        }
        sort_commands(&mut commands);
        commands
    }

    fn generate_commands(&mut self, current: &[Command]) -> Vec<Command> {
        let mut commands = current.to_vec();
        if commands.is_empty() {
            return self.initialize();
        }

        let limit = commands.len().min(NB_MAXIMUM_COMMANDS);
        let amount = self.rng.random_range(1..=limit);
        for position in index::sample(&mut self.rng, commands.len(), amount) {
            let (change_speed, change_time) = match self.rng.random_range(0..3) {
                0 => (true, false),
                1 => (false, true),
                _ => (true, true),
            };
            if change_speed {
                commands[position].speed = self.speeds.sample(&mut self.rng);
            }
            if change_time {
                commands[position].time = self.mutate_time(commands[position].time, position == 0);
            }
        }
        sort_commands(&mut commands);
        commands
    }

    fn update_commands(
        &self,
        manager: &mut ConflictManager,
        commands: Vec<Command>,
    ) -> Result<()> {
        manager.set_commands(self.id, commands)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atc_core::{Point, Waypoint};

    fn sampler() -> SampledAircraft {
        SampledAircraft::new(4, 30.0, SpeedSet::default())
    }

    fn is_sorted(commands: &[Command]) -> bool {
        commands.windows(2).all(|pair| pair[0].time <= pair[1].time)
    }

    #[test]
    fn initialize_draws_a_valid_schedule() {
        let mut sampler = sampler();
        for _ in 0..100 {
            let commands = sampler.initialize();
            assert!((2..=NB_MAXIMUM_COMMANDS + 1).contains(&commands.len()));
            assert!(is_sorted(&commands));
            assert!(commands[0].time >= 30.0 && commands[0].time <= 30.0 + TAKE_OFF_DELAY);
            assert!(commands.iter().all(|c| c.aircraft_id == 4));
            assert!(commands
                .iter()
                .all(|c| SpeedSet::default().values().contains(&c.speed)));
        }
    }

    #[test]
    fn sampling_is_seeded_by_id() {
        let mut first = sampler();
        let mut second = sampler();
        assert_eq!(first.initialize(), second.initialize());

        let mut other = SampledAircraft::new(5, 30.0, SpeedSet::default());
        assert_ne!(sampler().initialize(), other.initialize());
    }

    #[test]
    fn generate_commands_keeps_shape() {
        let mut sampler = sampler();
        let current = sampler.initialize();
        for _ in 0..100 {
            let next = sampler.generate_commands(&current);
            assert_eq!(next.len(), current.len());
            assert!(is_sorted(&next));
            assert!(next.iter().all(|c| c.time >= 0.0));
        }
    }

    #[test]
    fn first_command_jitter_is_bounded() {
        let mut sampler = SampledAircraft::new(9, 0.0, SpeedSet::default());
        let current = vec![Command::new(9, 5.0, 0.002)];
        for _ in 0..200 {
            let next = sampler.generate_commands(&current);
            assert_eq!(next.len(), 1);
            assert!(next[0].time >= 0.0 && next[0].time <= 5.0 + FIRST_JITTER);
        }
    }

    #[test]
    fn update_commands_installs_on_the_fleet() {
        let plan = vec![
            Waypoint::new("A", 0.2, 0.5, 0.0).unwrap(),
            Waypoint::new("B", 0.5, 0.5, 0.0).unwrap(),
        ];
        let aircraft = Aircraft::with_commands(
            4,
            plan,
            vec![Command::new(4, 0.0, 0.002)],
            Some(Point::new(0.2, 0.5, 0.0).unwrap()),
        )
        .unwrap();
        let mut manager = ConflictManager::default();
        manager.register_aircraft(aircraft).unwrap();

        let mut sampler = sampler();
        let commands = sampler.initialize();
        sampler.update_commands(&mut manager, commands.clone()).unwrap();
        assert_eq!(manager.aircraft(4).unwrap().commands(), commands.as_slice());
    }
}
