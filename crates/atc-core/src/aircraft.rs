//! Aircraft state and the deterministic 4-D trajectory model.
//!
//! An aircraft flies its flight plan from a start position near the first
//! waypoint, under a piecewise-constant speed schedule given by its
//! commands. Waypoint ETAs are integrated with an adaptive step; position
//! queries interpolate between those ETAs.

use crate::error::{CoreError, Result};
use crate::models::{sort_commands, AircraftId, Command, ConflictInformation, Information};
use crate::spatial::{wrap_heading, Point};
use crate::waypoint::Waypoint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_4;

/// Upper bound on one integration step (time units).
pub const MAX_STEP: f64 = 10.0;
/// Lower bound on one integration step (time units).
pub const MIN_STEP: f64 = 0.01;
/// Radius of the disc the start position is drawn from.
pub const START_RADIUS: f64 = 0.1;

const MIN_LEG_LENGTH: f64 = 1e-9;
const AIRSPACE_CENTER: (f64, f64) = (0.5, 0.5);

/// Estimated overfly time of one flight-plan waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedWaypoint {
    pub name: String,
    pub time: f64,
}

#[derive(Debug, Clone)]
pub struct Aircraft {
    id: AircraftId,
    flight_plan: Vec<Waypoint>,
    start_position: Point,
    take_off_time: f64,
    speed: f64,
    commands: Vec<Command>,
    flight_plan_timed: Vec<TimedWaypoint>,
    active_command: usize,

    position: Point,
    time: f64,
    flight_time: f64,
    heading: f64,
    finished: bool,

    /// Snapshots keyed by time in milliseconds.
    history: BTreeMap<i64, Information>,
    conflicts: BTreeMap<AircraftId, Vec<ConflictInformation>>,
}

impl Aircraft {
    /// Create an aircraft with a single take-off command.
    pub fn new(
        id: AircraftId,
        flight_plan: Vec<Waypoint>,
        take_off_time: f64,
        speed: f64,
    ) -> Result<Self> {
        Self::with_commands(id, flight_plan, vec![Command::new(id, take_off_time, speed)], None)
    }

    /// Create an aircraft from a full command schedule.
    ///
    /// When `start_position` is `None` it is drawn from the id-seeded PRNG.
    pub fn with_commands(
        id: AircraftId,
        flight_plan: Vec<Waypoint>,
        commands: Vec<Command>,
        start_position: Option<Point>,
    ) -> Result<Self> {
        if id == 0 {
            return Err(CoreError::InvalidAircraftId(id));
        }
        let first = flight_plan.first().ok_or(CoreError::EmptyFlightPlan(id))?;
        for leg in flight_plan.windows(2) {
            if leg[0].point.horizontal_distance(&leg[1].point) < MIN_LEG_LENGTH {
                return Err(CoreError::DegenerateLeg {
                    id,
                    waypoint: leg[1].name.clone(),
                });
            }
        }

        let start_position = match start_position {
            Some(point) => {
                point.validate()?;
                point
            }
            None => random_start_position(id, &first.point),
        };

        let commands = validate_commands(id, commands)?;
        let mut aircraft = Self {
            id,
            take_off_time: commands[0].time,
            speed: commands[0].speed,
            commands,
            flight_plan,
            start_position,
            flight_plan_timed: Vec::new(),
            active_command: 0,
            position: start_position,
            time: 0.0,
            flight_time: 0.0,
            heading: 0.0,
            finished: false,
            history: BTreeMap::new(),
            conflicts: BTreeMap::new(),
        };
        aircraft.recompute_flight_plan_timed()?;
        aircraft.heading = aircraft.start_position.bearing_to(&aircraft.flight_plan[0].point);
        Ok(aircraft)
    }

    pub fn id(&self) -> AircraftId {
        self.id
    }

    pub fn flight_plan(&self) -> &[Waypoint] {
        &self.flight_plan
    }

    pub fn start_position(&self) -> Point {
        self.start_position
    }

    pub fn take_off_time(&self) -> f64 {
        self.take_off_time
    }

    /// Current speed.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Waypoint ETAs in flight-plan order.
    pub fn flight_plan_timed(&self) -> &[TimedWaypoint] {
        &self.flight_plan_timed
    }

    /// ETA at the first passage of `waypoint`.
    pub fn eta(&self, waypoint: &str) -> Option<f64> {
        self.flight_plan_timed
            .iter()
            .find(|timed| timed.name == waypoint)
            .map(|timed| timed.time)
    }

    /// Arrival time at the final waypoint.
    pub fn final_time(&self) -> f64 {
        self.flight_plan_timed
            .last()
            .map(|timed| timed.time)
            .unwrap_or(self.take_off_time)
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn flight_time(&self) -> f64 {
        self.flight_time
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn has_taken_off(&self) -> bool {
        self.time >= self.take_off_time
    }

    /// The command in force at the current time.
    pub fn active_command(&self) -> &Command {
        &self.commands[self.active_command]
    }

    pub fn history(&self) -> &BTreeMap<i64, Information> {
        &self.history
    }

    /// Conflict records per partner aircraft.
    pub fn conflicts(&self) -> &BTreeMap<AircraftId, Vec<ConflictInformation>> {
        &self.conflicts
    }

    pub fn conflicts_with(&self, partner: AircraftId) -> &[ConflictInformation] {
        self.conflicts
            .get(&partner)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.values().map(Vec::len).sum()
    }

    /// Replace the command schedule and re-time the flight plan.
    ///
    /// This does not touch conflict records. When the aircraft is owned by a
    /// [`ConflictManager`](crate::ConflictManager), go through
    /// `ConflictManager::set_commands` so the conflicts are rebuilt too.
    pub fn set_commands(&mut self, commands: Vec<Command>) -> Result<()> {
        let commands = validate_commands(self.id, commands)?;
        let previous = std::mem::replace(&mut self.commands, commands);
        self.take_off_time = self.commands[0].time;
        self.speed = self.commands[0].speed;
        self.active_command = 0;
        if let Err(err) = self.recompute_flight_plan_timed() {
            self.commands = previous;
            self.take_off_time = self.commands[0].time;
            self.speed = self.commands[0].speed;
            self.recompute_flight_plan_timed()?;
            return Err(err);
        }
        Ok(())
    }

    /// Override the current speed only. No replan.
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(CoreError::NonPositiveSpeed { id: self.id, speed });
        }
        self.speed = speed;
        Ok(())
    }

    /// Override the current heading only. No replan.
    pub fn set_heading(&mut self, heading: f64) {
        self.heading = wrap_heading(heading);
    }

    /// Integrate the schedule along the flight plan and store the ETAs.
    pub fn recompute_flight_plan_timed(&mut self) -> Result<()> {
        self.flight_plan_timed = self.integrate_flight_plan()?;
        Ok(())
    }

    fn integrate_flight_plan(&self) -> Result<Vec<TimedWaypoint>> {
        if self
            .commands
            .windows(2)
            .any(|pair| pair[0].time > pair[1].time)
        {
            return Err(CoreError::InvariantViolation(format!(
                "aircraft {}: commands are not sorted by time",
                self.id
            )));
        }

        let mut position = self.start_position;
        let mut time = self.take_off_time;
        let mut speed = self.commands[0].speed;
        // Commands before take-off never activate.
        let mut pending = self.commands[1..]
            .iter()
            .filter(|command| command.time >= self.take_off_time)
            .peekable();

        let mut timed = Vec::with_capacity(self.flight_plan.len());
        for waypoint in &self.flight_plan {
            loop {
                let remaining = position.horizontal_distance(&waypoint.point);
                let to_waypoint = remaining / speed;
                let to_command = pending.peek().map(|command| command.time - time);

                let horizon = to_command.map_or(to_waypoint, |dt| dt.min(to_waypoint));
                let step = (horizon * 0.5).clamp(MIN_STEP, MAX_STEP);

                // On a tie the command applies first, then the aircraft leaves.
                if let Some(dt) = to_command {
                    if dt <= step && dt <= to_waypoint {
                        let dt = dt.max(0.0);
                        position = position.step_towards(&waypoint.point, speed * dt);
                        time += dt;
                        if let Some(command) = pending.next() {
                            speed = command.speed;
                        }
                        continue;
                    }
                }

                if remaining <= speed * step {
                    time += to_waypoint;
                    position = position.step_towards(&waypoint.point, remaining);
                    timed.push(TimedWaypoint {
                        name: waypoint.name.clone(),
                        time,
                    });
                    break;
                }

                position = position.step_towards(&waypoint.point, speed * step);
                time += step;
            }
        }

        // Commands left in `pending` fall after the last arrival and are dropped.
        if timed.windows(2).any(|pair| pair[0].time >= pair[1].time) {
            return Err(CoreError::InvariantViolation(format!(
                "aircraft {}: flight plan times are not strictly increasing",
                self.id
            )));
        }
        Ok(timed)
    }

    /// Where the aircraft is at absolute time `t`.
    pub fn position_at(&self, t: f64) -> Point {
        self.locate(t).0
    }

    /// Position and heading at `t`, by interpolation between bracketing ETAs.
    fn locate(&self, t: f64) -> (Point, f64) {
        let altitude = self.start_position.z;
        if t < self.take_off_time {
            let heading = self.start_position.bearing_to(&self.flight_plan[0].point);
            return (self.start_position, heading);
        }

        let mut prev_point = self.start_position;
        let mut prev_time = self.take_off_time;
        for (waypoint, timed) in self.flight_plan.iter().zip(&self.flight_plan_timed) {
            if t < timed.time {
                let progress = (t - prev_time) / (timed.time - prev_time);
                let mut point = prev_point.lerp(&waypoint.point, progress);
                point.z = altitude;
                let heading = point.bearing_to(&waypoint.point);
                return (point, heading);
            }
            prev_point = waypoint.point;
            prev_time = timed.time;
        }

        let last = &self.flight_plan[self.flight_plan.len() - 1].point;
        let point = Point {
            x: last.x,
            y: last.y,
            z: altitude,
        };
        (point, self.final_heading())
    }

    fn final_heading(&self) -> f64 {
        match self.flight_plan.len() {
            0 => self.heading,
            1 => self.start_position.bearing_to(&self.flight_plan[0].point),
            n => self.flight_plan[n - 2]
                .point
                .bearing_to(&self.flight_plan[n - 1].point),
        }
    }

    fn command_index_at(&self, t: f64) -> usize {
        self.commands
            .iter()
            .enumerate()
            .skip(1)
            .take_while(|(_, command)| command.time <= t)
            .filter(|(_, command)| command.time >= self.take_off_time)
            .map(|(index, _)| index)
            .last()
            .unwrap_or(0)
    }

    /// Move the aircraft clock forward by `dt`.
    pub fn advance(&mut self, dt: f64) {
        self.set_time(self.time + dt);
    }

    /// Re-seat the aircraft at absolute time `t` and record a snapshot.
    pub fn set_time(&mut self, t: f64) {
        let final_time = self.final_time();
        let (position, heading) = self.locate(t);

        self.time = t;
        self.position = position;
        self.heading = heading;
        self.flight_time = (t.min(final_time) - self.take_off_time).max(0.0);
        self.active_command = self.command_index_at(t);
        self.speed = self.commands[self.active_command].speed;
        self.finished = t >= final_time;

        self.history.insert(
            time_key(t),
            Information {
                position,
                time: t,
                speed: self.speed,
                heading,
                take_off: t >= self.take_off_time,
                flight_time: self.flight_time,
            },
        );
    }

    /// Forget kinematic progress and go back before take-off.
    pub fn reset_clock(&mut self) {
        self.time = 0.0;
        self.position = self.start_position;
        self.flight_time = 0.0;
        self.finished = false;
        self.active_command = 0;
        self.speed = self.commands[0].speed;
        self.heading = self.start_position.bearing_to(&self.flight_plan[0].point);
        self.history.clear();
    }

    /// Seed the history from a recorded source.
    pub fn restore_history(&mut self, snapshots: impl IntoIterator<Item = (i64, Information)>) {
        self.history.extend(snapshots);
    }

    /// Drop local conflict records whose first passage is before `now`.
    pub fn clear_conflicts(&mut self, now: f64) {
        self.retain_conflicts(|record| record.t1 >= now);
    }

    pub(crate) fn insert_conflict(&mut self, record: ConflictInformation) -> bool {
        let Some(partner) = record.partner_of(self.id) else {
            return false;
        };
        let records = self.conflicts.entry(partner).or_default();
        if records.contains(&record) {
            return false;
        }
        records.push(record);
        records.sort_by(ConflictInformation::chronological);
        true
    }

    pub(crate) fn remove_conflicts_with(&mut self, partner: AircraftId) {
        self.conflicts.remove(&partner);
    }

    pub(crate) fn retain_conflicts<F>(&mut self, mut keep: F)
    where
        F: FnMut(&ConflictInformation) -> bool,
    {
        for records in self.conflicts.values_mut() {
            records.retain(&mut keep);
        }
        self.conflicts.retain(|_, records| !records.is_empty());
    }

    pub(crate) fn clear_all_conflicts(&mut self) {
        self.conflicts.clear();
    }
}

/// History key for a time value.
pub fn time_key(t: f64) -> i64 {
    (t * 1000.0).round() as i64
}

fn validate_commands(id: AircraftId, mut commands: Vec<Command>) -> Result<Vec<Command>> {
    if commands.is_empty() {
        return Err(CoreError::EmptyCommands(id));
    }
    for command in &mut commands {
        if !(command.speed.is_finite() && command.speed > 0.0) {
            return Err(CoreError::NonPositiveSpeed {
                id,
                speed: command.speed,
            });
        }
        if !command.time.is_finite() {
            return Err(CoreError::InvariantViolation(format!(
                "aircraft {id}: command time is not finite"
            )));
        }
        command.aircraft_id = id;
    }
    sort_commands(&mut commands);
    if commands[0].time < 0.0 {
        return Err(CoreError::NegativeTakeOff {
            id,
            time: commands[0].time,
        });
    }
    Ok(commands)
}

/// Start position in a disc around the first waypoint, biased to the
/// quadrant facing the centre of the airspace.
fn random_start_position(id: AircraftId, first: &Point) -> Point {
    let mut rng = StdRng::seed_from_u64(u64::from(id));
    let toward_center = Point {
        x: AIRSPACE_CENTER.0,
        y: AIRSPACE_CENTER.1,
        z: first.z,
    };
    let facing = if first.horizontal_distance(&toward_center) < MIN_LEG_LENGTH {
        0.0
    } else {
        first.bearing_to(&toward_center)
    };
    let angle = facing + rng.random_range(-FRAC_PI_4..FRAC_PI_4);
    let radius = START_RADIUS * rng.random::<f64>().sqrt();
    Point {
        x: (first.x + radius * angle.cos()).clamp(0.0, 1.0),
        y: (first.y + radius * angle.sin()).clamp(0.0, 1.0),
        z: first.z,
    }
}
