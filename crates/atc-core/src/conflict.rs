//! Waypoint conflict detection for a fleet of timed flight plans.
//!
//! The manager owns the fleet. Every path that changes an aircraft's
//! command schedule goes through it, so waypoint ETAs and conflict records
//! are always rebuilt together before the next read.

use crate::aircraft::Aircraft;
use crate::error::{CoreError, Result};
use crate::models::{AircraftId, Command, ConflictInformation};
use std::collections::{BTreeMap, BTreeSet};

/// Default maximum gap (time units) between two passages at one waypoint.
pub const DEFAULT_TIME_THRESHOLD: f64 = 60.0;

/// Passage times closer than this are treated as equal when comparing
/// against the threshold.
const TIME_EPSILON: f64 = 1e-9;

/// Per-schedule snapshot of the whole fleet.
pub type Schedule = BTreeMap<AircraftId, Vec<Command>>;

/// Incremental conflict engine over an owned fleet.
#[derive(Debug, Clone)]
pub struct ConflictManager {
    time_threshold: f64,
    clock: f64,
    aircraft: BTreeMap<AircraftId, Aircraft>,
    /// Records per waypoint name.
    waypoint_conflicts: BTreeMap<String, Vec<ConflictInformation>>,
    /// Every live record, sorted chronologically.
    conflicts: Vec<ConflictInformation>,
}

impl Default for ConflictManager {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_THRESHOLD)
    }
}

impl ConflictManager {
    pub fn new(time_threshold: f64) -> Self {
        Self {
            time_threshold,
            clock: f64::NEG_INFINITY,
            aircraft: BTreeMap::new(),
            waypoint_conflicts: BTreeMap::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn time_threshold(&self) -> f64 {
        self.time_threshold
    }

    /// Last time given to [`set_clock`](Self::set_clock).
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    pub fn aircraft(&self, id: AircraftId) -> Option<&Aircraft> {
        self.aircraft.get(&id)
    }

    pub fn require(&self, id: AircraftId) -> Result<&Aircraft> {
        self.aircraft(id).ok_or(CoreError::UnknownAircraft(id))
    }

    /// Fleet in id order.
    pub fn fleet(&self) -> impl Iterator<Item = &Aircraft> {
        self.aircraft.values()
    }

    pub fn aircraft_ids(&self) -> Vec<AircraftId> {
        self.aircraft.keys().copied().collect()
    }

    /// Current command schedule of every aircraft.
    pub fn schedule(&self) -> Schedule {
        self.aircraft
            .iter()
            .map(|(id, aircraft)| (*id, aircraft.commands().to_vec()))
            .collect()
    }

    /// Add an aircraft and rebuild every conflict.
    pub fn register_aircraft(&mut self, aircraft: Aircraft) -> Result<()> {
        let id = aircraft.id();
        if self.aircraft.contains_key(&id) {
            return Err(CoreError::DuplicateAircraft(id));
        }
        self.aircraft.insert(id, aircraft);
        self.recompute_all();
        tracing::debug!(aircraft = id, fleet = self.aircraft.len(), "registered aircraft");
        Ok(())
    }

    /// Remove an aircraft, purge its records and rebuild.
    pub fn delete_aircraft(&mut self, id: AircraftId) -> Result<Aircraft> {
        let mut removed = self
            .aircraft
            .remove(&id)
            .ok_or(CoreError::UnknownAircraft(id))?;
        removed.clear_all_conflicts();
        self.purge(id);
        self.recompute_all();
        tracing::debug!(aircraft = id, "deleted aircraft");
        Ok(removed)
    }

    /// Install a new command schedule on one aircraft and rebuild the
    /// conflicts it touches.
    pub fn set_commands(&mut self, id: AircraftId, commands: Vec<Command>) -> Result<()> {
        self.aircraft
            .get_mut(&id)
            .ok_or(CoreError::UnknownAircraft(id))?
            .set_commands(commands)?;
        self.update_for(id)
    }

    /// Install a full schedule. Aircraft absent from `schedule` are untouched.
    pub fn apply_schedule(&mut self, schedule: &Schedule) -> Result<()> {
        for (id, commands) in schedule {
            self.set_commands(*id, commands.clone())?;
        }
        Ok(())
    }

    /// Rebuild only the conflicts at the waypoints flown by `id`.
    pub fn update_for(&mut self, id: AircraftId) -> Result<()> {
        let touched: BTreeSet<String> = self
            .require(id)?
            .flight_plan_timed()
            .iter()
            .map(|timed| timed.name.clone())
            .collect();

        let involved: BTreeSet<AircraftId> = self
            .aircraft
            .values()
            .filter(|other| {
                other
                    .flight_plan_timed()
                    .iter()
                    .any(|timed| touched.contains(&timed.name))
            })
            .map(Aircraft::id)
            .collect();

        self.purge(id);
        self.rebuild(&touched, &involved);
        tracing::trace!(
            aircraft = id,
            waypoints = touched.len(),
            involved = involved.len(),
            conflicts = self.conflicts.len(),
            "updated conflicts"
        );
        Ok(())
    }

    /// Drop every record that started before `now`.
    pub fn set_clock(&mut self, now: f64) {
        self.clock = now;
        let before = self.conflicts.len();
        self.conflicts.retain(|record| record.t1 >= now);
        if self.conflicts.len() == before {
            return;
        }
        for records in self.waypoint_conflicts.values_mut() {
            records.retain(|record| record.t1 >= now);
        }
        self.waypoint_conflicts.retain(|_, records| !records.is_empty());
        for aircraft in self.aircraft.values_mut() {
            aircraft.clear_conflicts(now);
        }
        tracing::debug!(now, dropped = before - self.conflicts.len(), "pruned stale conflicts");
    }

    /// Every live record, ordered by `t1`.
    pub fn all_conflicts(&self) -> Vec<ConflictInformation> {
        self.conflicts.clone()
    }

    pub fn conflicts(&self) -> &[ConflictInformation] {
        &self.conflicts
    }

    /// Records located at one waypoint.
    pub fn waypoint_conflicts(&self, waypoint: &str) -> &[ConflictInformation] {
        self.waypoint_conflicts
            .get(waypoint)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Half the sum of the per-partner list sizes over the fleet.
    pub fn total_unique_conflicts(&self) -> usize {
        let sides: usize = self.aircraft.values().map(Aircraft::conflict_count).sum();
        sides / 2
    }

    /// Every (aircraft, time) passage at a waypoint, ordered by time then id.
    pub fn passages_at(&self, waypoint: &str) -> Vec<(AircraftId, f64)> {
        let mut passages: Vec<(AircraftId, f64)> = self
            .aircraft
            .values()
            .flat_map(|aircraft| {
                aircraft
                    .flight_plan_timed()
                    .iter()
                    .filter(move |timed| timed.name == waypoint)
                    .map(move |timed| (aircraft.id(), timed.time))
            })
            .collect();
        sort_passages(&mut passages);
        passages
    }

    /// Names of every waypoint flown by at least one aircraft.
    pub fn flown_waypoints(&self) -> BTreeSet<String> {
        self.aircraft
            .values()
            .flat_map(|aircraft| aircraft.flight_plan_timed().iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Advance every aircraft by `dt`. Never touches conflict records.
    pub fn advance_all(&mut self, dt: f64) {
        for aircraft in self.aircraft.values_mut() {
            aircraft.advance(dt);
        }
    }

    /// Re-seat every aircraft at absolute time `t`.
    pub fn set_time_all(&mut self, t: f64) {
        for aircraft in self.aircraft.values_mut() {
            aircraft.set_time(t);
        }
    }

    pub fn reset_clocks(&mut self) {
        for aircraft in self.aircraft.values_mut() {
            aircraft.reset_clock();
        }
    }

    /// Put every aircraft back before take-off and undo stale pruning.
    pub fn rewind(&mut self) {
        self.clock = f64::NEG_INFINITY;
        self.reset_clocks();
        self.recompute_all();
    }

    pub fn all_finished(&self) -> bool {
        self.aircraft.values().all(Aircraft::is_finished)
    }

    /// Forget every record and rebuild from scratch.
    pub fn recompute_all(&mut self) {
        for aircraft in self.aircraft.values_mut() {
            aircraft.clear_all_conflicts();
        }
        self.waypoint_conflicts.clear();
        self.conflicts.clear();

        let waypoints = self.flown_waypoints();
        let fleet: BTreeSet<AircraftId> = self.aircraft.keys().copied().collect();
        self.rebuild(&waypoints, &fleet);
    }

    /// Remove every record involving `id`, everywhere.
    fn purge(&mut self, id: AircraftId) {
        for aircraft in self.aircraft.values_mut() {
            if aircraft.id() == id {
                aircraft.clear_all_conflicts();
            } else {
                aircraft.remove_conflicts_with(id);
            }
        }
        for records in self.waypoint_conflicts.values_mut() {
            records.retain(|record| !record.involves(id));
        }
        self.waypoint_conflicts.retain(|_, records| !records.is_empty());
        self.conflicts.retain(|record| !record.involves(id));
    }

    /// Scan the passages of `fleet` at each of `waypoints` and insert every
    /// pair within the threshold.
    fn rebuild(&mut self, waypoints: &BTreeSet<String>, fleet: &BTreeSet<AircraftId>) {
        let mut found = Vec::new();
        for waypoint in waypoints {
            let mut passages: Vec<(AircraftId, f64)> = fleet
                .iter()
                .filter_map(|id| self.aircraft.get(id))
                .flat_map(|aircraft| {
                    aircraft
                        .flight_plan_timed()
                        .iter()
                        .filter(move |timed| &timed.name == waypoint)
                        .map(move |timed| (aircraft.id(), timed.time))
                })
                .collect();
            sort_passages(&mut passages);

            for (i, first) in passages.iter().enumerate() {
                for second in &passages[i + 1..] {
                    // sorted, so every later passage is further away
                    if second.1 - first.1 > self.time_threshold + TIME_EPSILON {
                        break;
                    }
                    if first.0 == second.0 {
                        continue;
                    }
                    let record = ConflictInformation::new(*first, *second, waypoint.as_str());
                    if record.t1 < self.clock {
                        continue;
                    }
                    found.push(record);
                }
            }
        }

        for record in found {
            self.insert(record);
        }
        self.conflicts.sort_by(ConflictInformation::chronological);
    }

    fn insert(&mut self, record: ConflictInformation) {
        if let Some(one) = self.aircraft.get_mut(&record.aircraft_one) {
            one.insert_conflict(record.clone());
        }
        if let Some(two) = self.aircraft.get_mut(&record.aircraft_two) {
            two.insert_conflict(record.clone());
        }
        let at_waypoint = self
            .waypoint_conflicts
            .entry(record.waypoint.clone())
            .or_default();
        if !at_waypoint.contains(&record) {
            at_waypoint.push(record.clone());
            at_waypoint.sort_by(ConflictInformation::chronological);
        }
        if !self.conflicts.contains(&record) {
            self.conflicts.push(record);
        }
    }
}

fn sort_passages(passages: &mut [(AircraftId, f64)]) {
    passages.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}
