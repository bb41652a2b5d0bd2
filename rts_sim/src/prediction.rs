//! Client-side prediction records and replay.
//!
//! Every client tick stores the input frame it sent together with where each
//! owned unit ended up. An authoritative snapshot for tick `S` is compared
//! against the record for `S`; on a mismatch the unit is snapped to the
//! server state and the recorded frames after `S` are replayed on top.

use std::collections::{BTreeMap, VecDeque};

use bevy::prelude::*;
use sim_runtime::{InputFrame, NetEntity, Tick};

use crate::{
    movement::{advance_along_path, select_waypoints, PathState, PathWaypoints},
    targeting::{InputTarget, ServerTarget},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedUnit {
    pub position: Vec3,
    pub rotation: Quat,
    pub path: PathState,
}

impl PredictedUnit {
    pub fn needs_correction(&self, authoritative: Vec3, epsilon: f32) -> bool {
        self.position.distance_squared(authoritative) > epsilon * epsilon
    }
}

#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub tick: Tick,
    pub frame: InputFrame,
    pub units: BTreeMap<NetEntity, PredictedUnit>,
}

#[derive(Resource, Debug, Clone)]
pub struct PredictionHistory {
    capacity: usize,
    records: VecDeque<PredictionRecord>,
}

impl Default for PredictionHistory {
    fn default() -> Self {
        Self::with_capacity(128)
    }
}

impl PredictionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(
        &mut self,
        tick: Tick,
        frame: InputFrame,
        units: BTreeMap<NetEntity, PredictedUnit>,
    ) {
        if self.records.back().is_some_and(|last| last.tick == tick) {
            self.records.pop_back();
        }
        self.records.push_back(PredictionRecord { tick, frame, units });
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn get(&self, tick: Tick) -> Option<&PredictionRecord> {
        self.records.iter().find(|record| record.tick == tick)
    }

    pub fn predicted(&self, tick: Tick, unit: NetEntity) -> Option<&PredictedUnit> {
        self.get(tick).and_then(|record| record.units.get(&unit))
    }

    pub fn latest_tick(&self) -> Option<Tick> {
        self.records.back().map(|record| record.tick)
    }

    /// Drop records the server has already confirmed.
    pub fn discard_through(&mut self, tick: Tick) {
        while self
            .records
            .front()
            .is_some_and(|record| !record.tick.is_newer_than(tick))
        {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Re-run movement for `unit` from the corrected `start` over every
    /// record newer than `from`, rewriting those records as it goes.
    pub fn replay_unit(
        &mut self,
        unit: NetEntity,
        from: Tick,
        start: PredictedUnit,
        server: &ServerTarget,
        speed: f32,
        dt: f32,
    ) -> PredictedUnit {
        let mut current = start;
        for record in self
            .records
            .iter_mut()
            .filter(|record| record.tick.is_newer_than(from))
        {
            if let Some(input) = record.frame.unit(unit) {
                let (buffer, version) = select_waypoints(
                    &InputTarget(input.target),
                    server,
                    &PathWaypoints(input.waypoints),
                );
                advance_along_path(
                    &mut current.position,
                    &mut current.rotation,
                    &mut current.path,
                    &buffer,
                    version,
                    speed,
                    dt,
                );
            }
            if let Some(slot) = record.units.get_mut(&unit) {
                *slot = current;
            }
        }
        current
    }
}
