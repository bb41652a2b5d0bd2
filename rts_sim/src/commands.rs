//! Per-player command log and the server systems that apply it.
//!
//! Reads go through [`CommandBuffer::at_tick`], which keeps returning the
//! newest command at or before the requested tick. The same record is
//! therefore seen on many consecutive ticks and every consumer compares it
//! against the player's last processed record before acting.

use std::collections::{BTreeMap, VecDeque};

use bevy::prelude::*;
use sim_runtime::{
    InputFrame, PlaceBuildingCommand, PlayerId, SpawnUnitCommand, Tick, TickStamped,
};
use thiserror::Error;

use crate::{
    catalog::{CatalogError, UnitCatalogHandle},
    components::{
        Building, BuildingBundle, ConstructionProgress, NetworkId, Owner, QueuedUnit,
        RecruitmentQueue,
    },
    config::SimulationConfig,
    economy::{planar_distance_sq, LedgerError, PlayerLedgers},
    metrics::SimulationMetrics,
    movement::PathWaypoints,
    resources::{NavigationEpoch, NetworkIds, SimulationTick},
    setup,
    spatial::{Collider, QueryMask, SpatialIndex},
    targeting::InputTarget,
};

/// Players admitted to the session.
#[derive(Resource, Debug, Clone)]
pub struct PlayerRegistry {
    pub players: Vec<PlayerId>,
}

impl PlayerRegistry {
    pub fn with_count(count: u32) -> Self {
        Self {
            players: (0..count).map(PlayerId).collect(),
        }
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }
}

/// Tick-ordered ring of commands. Adding a second record for the same tick
/// replaces the first; the oldest record is evicted past capacity.
#[derive(Debug, Clone)]
pub struct CommandBuffer<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T: TickStamped> CommandBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Records with an invalid tick carry nothing and are dropped.
    pub fn add(&mut self, command: T) {
        let tick = command.tick();
        if !tick.is_valid() {
            return;
        }
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.tick() == tick) {
            *existing = command;
            return;
        }
        let position = self
            .entries
            .iter()
            .position(|entry| entry.tick().is_newer_than(tick))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, command);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Newest record whose tick is at or before `tick`.
    pub fn at_tick(&self, tick: Tick) -> Option<&T> {
        self.entries
            .iter()
            .rev()
            .find(|entry| !entry.tick().is_newer_than(tick))
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PlayerCommandLog {
    pub inputs: CommandBuffer<InputFrame>,
    pub placements: CommandBuffer<PlaceBuildingCommand>,
    pub spawns: CommandBuffer<SpawnUnitCommand>,
    pub last_placement: Option<PlaceBuildingCommand>,
    pub last_spawn: Option<SpawnUnitCommand>,
}

impl PlayerCommandLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inputs: CommandBuffer::new(capacity),
            placements: CommandBuffer::new(capacity),
            spawns: CommandBuffer::new(capacity),
            last_placement: None,
            last_spawn: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("player {0} is not registered")]
    UnknownPlayer(PlayerId),
    #[error("input from player {0} carries an invalid tick")]
    InvalidTick(PlayerId),
}

/// Server-side command logs for every registered player.
#[derive(Resource, Debug, Clone, Default)]
pub struct PlayerInputs {
    capacity: usize,
    logs: BTreeMap<PlayerId, PlayerCommandLog>,
}

impl PlayerInputs {
    pub fn new(players: &[PlayerId], capacity: usize) -> Self {
        Self {
            capacity,
            logs: players
                .iter()
                .map(|player| (*player, PlayerCommandLog::new(capacity)))
                .collect(),
        }
    }

    pub fn register(&mut self, player: PlayerId) {
        let capacity = self.capacity;
        self.logs
            .entry(player)
            .or_insert_with(|| PlayerCommandLog::new(capacity));
    }

    pub fn log(&self, player: PlayerId) -> Option<&PlayerCommandLog> {
        self.logs.get(&player)
    }

    fn log_mut(&mut self, player: PlayerId) -> Result<&mut PlayerCommandLog, SubmitError> {
        self.logs
            .get_mut(&player)
            .ok_or(SubmitError::UnknownPlayer(player))
    }

    /// Store a client input frame and the commands it carries.
    pub fn submit(&mut self, frame: InputFrame) -> Result<(), SubmitError> {
        let player = frame.player;
        if !frame.tick.is_valid() {
            return Err(SubmitError::InvalidTick(player));
        }
        let log = self.log_mut(player)?;
        if let Some(placement) = frame.placement {
            log.placements.add(placement);
        }
        if let Some(spawn) = frame.spawn {
            log.spawns.add(spawn);
        }
        log.inputs.add(frame);
        Ok(())
    }

    pub fn submit_placement(
        &mut self,
        player: PlayerId,
        command: PlaceBuildingCommand,
    ) -> Result<(), SubmitError> {
        if !command.tick.is_valid() {
            return Err(SubmitError::InvalidTick(player));
        }
        self.log_mut(player)?.placements.add(command);
        Ok(())
    }

    pub fn submit_spawn(
        &mut self,
        player: PlayerId,
        command: SpawnUnitCommand,
    ) -> Result<(), SubmitError> {
        if !command.tick.is_valid() {
            return Err(SubmitError::InvalidTick(player));
        }
        self.log_mut(player)?.spawns.add(command);
        Ok(())
    }
}

/// Same building kind at (nearly) the same spot.
pub fn is_duplicate_placement(
    last: &PlaceBuildingCommand,
    command: &PlaceBuildingCommand,
    epsilon_sq: f32,
) -> bool {
    last.kind == command.kind
        && Vec3::from_array(last.position).distance_squared(Vec3::from_array(command.position))
            < epsilon_sq
}

/// Same command id, issued within `window` ticks of the last processed one.
pub fn is_duplicate_spawn(last: &SpawnUnitCommand, command: &SpawnUnitCommand, window: u32) -> bool {
    last.command_id == command.command_id && command.tick.diff(last.tick).abs() <= i64::from(window)
}

#[derive(Debug, Error)]
pub enum CommandRejection {
    #[error("position {0:?} is outside the map")]
    OutOfBounds([f32; 3]),
    #[error("footprint overlaps an existing building or resource")]
    Blocked,
    #[error("no finished building able to recruit this unit near {0:?}")]
    NoBuilding([f32; 3]),
    #[error(transparent)]
    Unaffordable(#[from] LedgerError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Move the frame addressed to the current tick into each unit's input slot.
pub fn ingest_unit_inputs(
    tick: Res<SimulationTick>,
    inputs: Res<PlayerInputs>,
    ids: Res<NetworkIds>,
    mut units: Query<(&Owner, &mut InputTarget, &mut PathWaypoints)>,
) {
    for (player, log) in &inputs.logs {
        let Some(frame) = log.inputs.at_tick(tick.0) else {
            continue;
        };
        for unit in &frame.units {
            let Some(entity) = ids.entity(unit.entity) else {
                continue;
            };
            let Ok((owner, mut input, mut waypoints)) = units.get_mut(entity) else {
                continue;
            };
            if owner.0 != *player {
                tracing::warn!(
                    target: "rts::commands",
                    player = %player,
                    unit = %unit.entity,
                    "input.rejected=not_owner"
                );
                continue;
            }
            if unit.target.version < input.0.version {
                continue;
            }
            input.0 = unit.target;
            waypoints.0 = unit.waypoints;
        }
    }
}

/// Apply at most one placement per player per tick.
#[allow(clippy::too_many_arguments)]
pub fn apply_placement_commands(
    mut commands: Commands,
    tick: Res<SimulationTick>,
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
    mut inputs: ResMut<PlayerInputs>,
    mut ledgers: ResMut<PlayerLedgers>,
    mut index: ResMut<SpatialIndex>,
    mut epoch: ResMut<NavigationEpoch>,
    mut ids: ResMut<NetworkIds>,
    mut metrics: ResMut<SimulationMetrics>,
) {
    for (player, log) in inputs.logs.iter_mut() {
        let player = *player;
        let Some(command) = log.placements.at_tick(tick.0).copied() else {
            continue;
        };
        if let Some(last) = log.last_placement {
            if is_duplicate_placement(&last, &command, config.placement_dedup_epsilon_sq) {
                metrics.commands_duplicate += 1;
                tracing::debug!(
                    target: "rts::commands",
                    player = %player,
                    command_tick = %command.tick,
                    "placement.rejected=duplicate"
                );
                continue;
            }
        }
        // The slot is consumed whether or not the placement succeeds.
        log.last_placement = Some(command);

        let result = validate_placement(&config, &catalog, &index, &command)
            .and_then(|footprint| {
                let stats = catalog.catalog().building(command.kind)?;
                ledgers.charge(player, &stats.construction_cost)?;
                Ok((footprint, stats.construction_time))
            });
        let (footprint, construction_time) = match result {
            Ok(accepted) => accepted,
            Err(err) => {
                metrics.commands_rejected += 1;
                tracing::warn!(
                    target: "rts::commands",
                    player = %player,
                    building = command.kind.as_str(),
                    error = %err,
                    "placement.rejected"
                );
                continue;
            }
        };

        let position = Vec3::from_array(command.position);
        let bundle = BuildingBundle::new(command.kind, player, position, footprint);
        let collider = bundle.collider;
        let mut entity_commands = commands.spawn(bundle);
        if construction_time > 0.0 {
            entity_commands.insert(ConstructionProgress::new(construction_time));
        }
        let entity = entity_commands.id();
        let net = ids.allocate(entity);
        commands.entity(entity).insert(NetworkId(net));
        index.insert(entity, position, collider);
        epoch.bump();
        metrics.commands_applied += 1;
        tracing::info!(
            target: "rts::commands",
            player = %player,
            building = command.kind.as_str(),
            entity = %net,
            nav_epoch = epoch.0,
            "placement.applied"
        );
    }
}

/// Footprint edge length of a placement that fits on the map.
fn validate_placement(
    config: &SimulationConfig,
    catalog: &UnitCatalogHandle,
    index: &SpatialIndex,
    command: &PlaceBuildingCommand,
) -> Result<f32, CommandRejection> {
    if !config.in_bounds(command.position) {
        return Err(CommandRejection::OutOfBounds(command.position));
    }
    let footprint = catalog.catalog().building(command.kind)?.footprint;
    let half = footprint * 0.5;
    let blocked = !index
        .overlap_box(
            Vec3::from_array(command.position),
            Vec3::new(half, 1.0, half),
            QueryMask::BUILDING | QueryMask::RESOURCE,
        )
        .is_empty();
    if blocked {
        return Err(CommandRejection::Blocked);
    }
    Ok(footprint)
}

type RecruiterItem<'a> = (
    Entity,
    &'a Transform,
    &'a Building,
    &'a Owner,
    &'a mut RecruitmentQueue,
);

/// Queue at most one recruitment per player per tick.
#[allow(clippy::too_many_arguments)]
pub fn apply_spawn_commands(
    tick: Res<SimulationTick>,
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
    mut inputs: ResMut<PlayerInputs>,
    mut ledgers: ResMut<PlayerLedgers>,
    mut metrics: ResMut<SimulationMetrics>,
    mut buildings: Query<RecruiterItem, Without<ConstructionProgress>>,
) {
    let match_radius_sq = config.building_match_radius * config.building_match_radius;
    for (player, log) in inputs.logs.iter_mut() {
        let player = *player;
        let Some(command) = log.spawns.at_tick(tick.0).copied() else {
            continue;
        };
        if let Some(last) = log.last_spawn {
            if is_duplicate_spawn(&last, &command, config.spawn_dedup_window_ticks) {
                metrics.commands_duplicate += 1;
                tracing::debug!(
                    target: "rts::commands",
                    player = %player,
                    command_id = command.command_id.0,
                    "spawn.rejected=duplicate"
                );
                continue;
            }
        }
        log.last_spawn = Some(command);

        let requested = Vec3::from_array(command.building_position);
        let building = buildings
            .iter()
            .filter(|(_, _, building, owner, _)| {
                owner.0 == player
                    && catalog
                        .catalog()
                        .building(building.kind)
                        .is_ok_and(|stats| stats.can_recruit(command.kind))
            })
            .map(|(entity, transform, _, _, _)| {
                (entity, planar_distance_sq(transform.translation, requested))
            })
            .filter(|(_, distance)| *distance <= match_radius_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(entity, _)| entity);

        let result = building
            .ok_or(CommandRejection::NoBuilding(command.building_position))
            .and_then(|entity| {
                let stats = catalog.catalog().unit(command.kind)?;
                ledgers.charge(player, &stats.recruitment_cost)?;
                Ok((entity, config.ticks_for(stats.recruitment_time)))
            });
        match result {
            Ok((entity, remaining_ticks)) => {
                if let Ok((_, _, _, _, mut queue)) = buildings.get_mut(entity) {
                    queue.entries.push_back(QueuedUnit {
                        kind: command.kind,
                        remaining_ticks,
                    });
                }
                metrics.commands_applied += 1;
                tracing::info!(
                    target: "rts::commands",
                    player = %player,
                    unit = command.kind.as_str(),
                    command_id = command.command_id.0,
                    "spawn.queued"
                );
            }
            Err(err) => {
                metrics.commands_rejected += 1;
                tracing::warn!(
                    target: "rts::commands",
                    player = %player,
                    unit = command.kind.as_str(),
                    error = %err,
                    "spawn.rejected"
                );
            }
        }
    }
}

/// Count down the head of every recruitment queue and release finished units.
pub fn advance_recruitment(
    mut commands: Commands,
    catalog: Res<UnitCatalogHandle>,
    mut ids: ResMut<NetworkIds>,
    mut buildings: Query<
        (Entity, &Transform, &Building, &Owner, &mut RecruitmentQueue),
        Without<ConstructionProgress>,
    >,
) {
    let mut ready: Vec<Entity> = buildings
        .iter()
        .filter(|(_, _, _, _, queue)| !queue.is_empty())
        .map(|(entity, _, _, _, _)| entity)
        .collect();
    ready.sort();

    for entity in ready {
        let Ok((_, transform, building, owner, mut queue)) = buildings.get_mut(entity) else {
            continue;
        };
        let Some(head) = queue.entries.front_mut() else {
            continue;
        };
        head.remaining_ticks = head.remaining_ticks.saturating_sub(1);
        if head.remaining_ticks > 0 {
            continue;
        }
        let Some(finished) = queue.entries.pop_front() else {
            continue;
        };
        let footprint = catalog.catalog().footprint(building.kind);
        let rally = transform.translation + Vec3::new(footprint * 0.5 + 1.0, 0.0, 0.0);
        let unit = setup::spawn_unit_deferred(
            &mut commands,
            &mut ids,
            catalog.catalog(),
            finished.kind,
            owner.0,
            rally,
        );
        tracing::info!(
            target: "rts::commands",
            player = %owner.0,
            unit = finished.kind.as_str(),
            entity = ?unit,
            "recruitment.completed"
        );
    }
}
