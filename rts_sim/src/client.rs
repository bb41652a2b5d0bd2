//! Client application: applies authoritative snapshots, plans paths for owned
//! units and predicts their movement ahead of the server.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bevy::prelude::*;
use rayon::prelude::*;
use sim_runtime::{
    BuildingState, CommandId, InputFrame, NetEntity, PlaceBuildingCommand, PlayerId,
    ResourceNodeState, SpawnUnitCommand, TargetDescriptor, Tick, UnitInput, UnitKind, UnitState,
    WaypointBuffer, WorldSnapshot,
};

use crate::{
    advance_tick,
    catalog::{UnitCatalog, UnitCatalogHandle},
    components::{
        Building, BuildingBundle, ConstructionProgress, NetworkId, QueueLength, ReplicatedTask,
        ResourceNode, ResourceNodeBundle, Simulated, UnitBundle, WorkerCarry,
    },
    config::{NavigationMode, SimulationConfig},
    economy::EconomyLedger,
    metrics::SimulationMetrics,
    movement::{follow_waypoints, PathState, PathWaypoints, NEW_PATH_EPSILON},
    navigation::{DirectLineOracle, GridNavMesh, PathOracleHandle},
    prediction::{PredictedUnit, PredictionHistory},
    resources::{NetworkIds, SimulationTick},
    spatial::{rebuild_spatial_index, SpatialIndex},
    targeting::{reconcile, InputTarget, ServerTarget},
    waypoints::produce_waypoints,
};

/// Owned unit whose waypoints must be re-planned this tick.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PathRequest;

#[derive(Resource, Debug, Clone)]
pub struct ClientState {
    pub player: PlayerId,
    /// Tick of the newest snapshot applied so far.
    pub last_snapshot: Tick,
    next_command_id: u32,
}

impl ClientState {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            last_snapshot: Tick::INVALID,
            next_command_id: 1,
        }
    }

    pub fn allocate_command_id(&mut self) -> CommandId {
        let id = CommandId(self.next_command_id);
        self.next_command_id = self.next_command_id.wrapping_add(1).max(1);
        id
    }
}

#[derive(Resource, Debug, Default)]
pub struct SnapshotInbox(pub Vec<WorldSnapshot>);

#[derive(Resource, Debug, Default)]
pub struct Outbox(pub Vec<InputFrame>);

impl Outbox {
    pub fn drain(&mut self) -> Vec<InputFrame> {
        std::mem::take(&mut self.0)
    }
}

/// Last replicated ledger for the local player.
#[derive(Resource, Debug, Clone, Default)]
pub struct LocalLedger(pub EconomyLedger);

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct ObservedNavEpoch(pub Option<u32>);

#[derive(Debug, Clone, Copy)]
struct Redundant<T> {
    command: T,
    remaining: u32,
}

/// Commands resent in every outgoing frame until their redundancy runs out.
#[derive(Resource, Debug, Clone, Default)]
pub struct PendingCommands {
    redundancy: u32,
    placement: Option<Redundant<PlaceBuildingCommand>>,
    spawn: Option<Redundant<SpawnUnitCommand>>,
}

impl PendingCommands {
    pub fn new(redundancy: u32) -> Self {
        Self {
            redundancy: redundancy.max(1),
            placement: None,
            spawn: None,
        }
    }

    pub fn queue_placement(&mut self, command: PlaceBuildingCommand) {
        self.placement = Some(Redundant {
            command,
            remaining: self.redundancy,
        });
    }

    pub fn queue_spawn(&mut self, command: SpawnUnitCommand) {
        self.spawn = Some(Redundant {
            command,
            remaining: self.redundancy,
        });
    }

    pub fn placement(&self) -> Option<&PlaceBuildingCommand> {
        self.placement.as_ref().map(|pending| &pending.command)
    }

    pub fn spawn(&self) -> Option<&SpawnUnitCommand> {
        self.spawn.as_ref().map(|pending| &pending.command)
    }

    fn take_for_frame(&mut self) -> (Option<PlaceBuildingCommand>, Option<SpawnUnitCommand>) {
        (consume(&mut self.placement), consume(&mut self.spawn))
    }
}

fn consume<T: Copy>(slot: &mut Option<Redundant<T>>) -> Option<T> {
    let pending = slot.as_mut()?;
    let command = pending.command;
    pending.remaining = pending.remaining.saturating_sub(1);
    if pending.remaining == 0 {
        *slot = None;
    }
    Some(command)
}

/// Oracle for the configured navigation mode with the given footprints blocked.
pub fn build_path_oracle(
    config: &SimulationConfig,
    obstacles: impl IntoIterator<Item = (Vec3, f32)>,
) -> PathOracleHandle {
    match config.navigation {
        NavigationMode::Direct => PathOracleHandle::new(DirectLineOracle),
        NavigationMode::Grid => {
            let mut mesh = GridNavMesh::new(config.map_size, config.cell_size);
            for (center, footprint) in obstacles {
                mesh.block_footprint(center, footprint);
            }
            PathOracleHandle::new(mesh)
        }
    }
}

pub fn build_client_app(
    config: SimulationConfig,
    catalog: Arc<UnitCatalog>,
    player: PlayerId,
) -> App {
    let mut app = App::new();

    let oracle = build_path_oracle(&config, std::iter::empty());
    app.insert_resource(LocalLedger(config.starting_ledger.ledger()))
        .insert_resource(PendingCommands::new(config.command_redundancy_ticks))
        .insert_resource(PredictionHistory::with_capacity(
            config.prediction_history_ticks,
        ))
        .insert_resource(oracle)
        .insert_resource(ClientState::new(player))
        .insert_resource(UnitCatalogHandle::new(catalog))
        .insert_resource(config)
        .init_resource::<SimulationTick>()
        .init_resource::<NetworkIds>()
        .init_resource::<SpatialIndex>()
        .init_resource::<SnapshotInbox>()
        .init_resource::<Outbox>()
        .init_resource::<ObservedNavEpoch>()
        .init_resource::<SimulationMetrics>()
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                advance_tick,
                apply_authoritative_snapshots,
                rebuild_spatial_index,
                reconcile_targets,
                track_followed_targets,
                compute_paths,
                follow_waypoints,
                emit_input_frame,
            )
                .chain(),
        );

    app
}

/// Run the client `lead` ticks ahead of a server currently at `server_tick`.
///
/// Frames are stamped with the client tick. With the lead covering the
/// one-way delay, frame `T` reaches the server before it simulates `T`, and
/// the snapshot for `T` is compared against the prediction made for `T`.
pub fn align_client_tick(world: &mut World, server_tick: Tick, lead: u32) {
    let aligned = server_tick.advanced_by(lead);
    world.resource_mut::<SimulationTick>().0 = aligned;
    tracing::debug!(
        target: "rts::prediction",
        server_tick = %server_tick,
        lead,
        client_tick = %aligned,
        "tick.aligned"
    );
}

/// Pull server follow-ups into the input slot and re-plan for them.
pub fn reconcile_targets(
    mut commands: Commands,
    mut units: Query<(Entity, &mut InputTarget, &ServerTarget), With<Simulated>>,
) {
    for (entity, mut input, server) in units.iter_mut() {
        if reconcile(&mut input, server) {
            commands.entity(entity).insert(PathRequest);
        }
    }
}

/// Keep followed targets pinned to where the followed entity is now.
pub fn track_followed_targets(
    mut commands: Commands,
    ids: Res<NetworkIds>,
    mut units: Query<(Entity, &mut InputTarget), With<Simulated>>,
    transforms: Query<&Transform>,
) {
    for (entity, mut input) in units.iter_mut() {
        if !input.0.is_following_target {
            continue;
        }
        let Some(followed) = input.0.target_entity.and_then(|net| ids.entity(net)) else {
            continue;
        };
        let Ok(transform) = transforms.get(followed) else {
            continue;
        };
        let current = transform.translation;
        if current.distance_squared(Vec3::from_array(input.0.target_position)) > NEW_PATH_EPSILON {
            input.0.target_position = current.to_array();
            commands.entity(entity).insert(PathRequest);
        }
    }
}

/// Plan every requested path in parallel, then write the buffers back in
/// entity order.
pub fn compute_paths(
    mut commands: Commands,
    oracle: Res<PathOracleHandle>,
    mut units: Query<(Entity, &Transform, &InputTarget, &mut PathWaypoints), With<PathRequest>>,
) {
    let mut requests: Vec<(Entity, Vec3, TargetDescriptor)> = units
        .iter()
        .map(|(entity, transform, input, _)| (entity, transform.translation, input.0))
        .collect();
    if requests.is_empty() {
        return;
    }
    requests.sort_unstable_by_key(|(entity, _, _)| *entity);

    let oracle = oracle.oracle();
    let planned: Vec<(Entity, WaypointBuffer)> = requests
        .par_iter()
        .map(|(entity, start, target)| (*entity, produce_waypoints(oracle, *start, target)))
        .collect();

    for (entity, buffer) in planned {
        if let Ok((_, _, _, mut waypoints)) = units.get_mut(entity) {
            waypoints.0 = buffer;
        }
        commands.entity(entity).remove::<PathRequest>();
    }
}

type OwnedUnitItem<'a> = (
    &'a NetworkId,
    &'a Transform,
    &'a PathState,
    &'a InputTarget,
    &'a PathWaypoints,
);

/// Send this tick's frame and remember what it predicted.
pub fn emit_input_frame(
    tick: Res<SimulationTick>,
    state: Res<ClientState>,
    mut pending: ResMut<PendingCommands>,
    mut history: ResMut<PredictionHistory>,
    mut outbox: ResMut<Outbox>,
    units: Query<OwnedUnitItem, With<Simulated>>,
) {
    let mut frame = InputFrame::empty(state.player, tick.0);
    let mut predicted = BTreeMap::new();

    let mut owned: Vec<_> = units.iter().collect();
    owned.sort_unstable_by_key(|(net, ..)| net.0);
    for (net, transform, path, input, waypoints) in owned {
        predicted.insert(
            net.0,
            PredictedUnit {
                position: transform.translation,
                rotation: transform.rotation,
                path: *path,
            },
        );
        if input.0.version > 0 {
            frame.units.push(UnitInput {
                entity: net.0,
                target: input.0,
                waypoints: waypoints.0,
            });
        }
    }

    let (placement, spawn) = pending.take_for_frame();
    frame.placement = placement;
    frame.spawn = spawn;

    history.record(tick.0, frame.clone(), predicted);
    outbox.0.push(frame);
}

/// Apply the newest snapshot waiting in the inbox.
pub fn apply_authoritative_snapshots(world: &mut World) {
    let snapshots = std::mem::take(&mut world.resource_mut::<SnapshotInbox>().0);
    let last = world.resource::<ClientState>().last_snapshot;
    let newest = snapshots
        .into_iter()
        .filter(|snapshot| !last.is_valid() || snapshot.header.tick.is_newer_than(last))
        .reduce(|newest, snapshot| {
            if snapshot.header.tick.is_newer_than(newest.header.tick) {
                snapshot
            } else {
                newest
            }
        });
    if let Some(snapshot) = newest {
        apply_snapshot(world, &snapshot);
    }
}

fn apply_snapshot(world: &mut World, snapshot: &WorldSnapshot) {
    let player = world.resource::<ClientState>().player;
    let config = world.resource::<SimulationConfig>().clone();
    let catalog = world.resource::<UnitCatalogHandle>().get();
    let tick = snapshot.header.tick;

    if let Some(ledger) = snapshot.ledger(player) {
        world.resource_mut::<LocalLedger>().0 = EconomyLedger::from_state(ledger);
    }

    for state in &snapshot.resources {
        sync_resource(world, state);
    }
    for state in &snapshot.buildings {
        sync_building(world, state, &catalog);
    }

    let mut corrected = 0u32;
    for state in &snapshot.units {
        if sync_unit(world, state, player, tick, &config) {
            corrected += 1;
        }
    }
    despawn_missing(world, snapshot);

    let epoch = snapshot.header.nav_epoch;
    if world.resource::<ObservedNavEpoch>().0 != Some(epoch) {
        refresh_navigation(world, snapshot, &config, &catalog);
        world.resource_mut::<ObservedNavEpoch>().0 = Some(epoch);
    }

    if corrected > 0 {
        world.resource_mut::<SimulationMetrics>().rollbacks += 1;
        tracing::debug!(
            target: "rts::prediction",
            tick = %tick,
            units = corrected,
            "prediction.rollback"
        );
    }
    world.resource_mut::<PredictionHistory>().discard_through(tick);
    world.resource_mut::<ClientState>().last_snapshot = tick;
}

fn sync_resource(world: &mut World, state: &ResourceNodeState) {
    let position = Vec3::from_array(state.position);
    match world.resource::<NetworkIds>().entity(state.entity) {
        Some(entity) => {
            if let Some(mut node) = world.get_mut::<ResourceNode>(entity) {
                node.value = state.value;
            }
        }
        None => {
            let entity = world
                .spawn((
                    ResourceNodeBundle::new(state.kind, state.value, position),
                    NetworkId(state.entity),
                ))
                .id();
            world.resource_mut::<NetworkIds>().bind(state.entity, entity);
        }
    }
}

fn sync_building(world: &mut World, state: &BuildingState, catalog: &UnitCatalog) {
    let entity = match world.resource::<NetworkIds>().entity(state.entity) {
        Some(entity) => entity,
        None => {
            let footprint = catalog.footprint(state.kind);
            let position = Vec3::from_array(state.position);
            let entity = world
                .spawn((
                    BuildingBundle::new(state.kind, state.owner, position, footprint),
                    NetworkId(state.entity),
                ))
                .id();
            world.resource_mut::<NetworkIds>().bind(state.entity, entity);
            entity
        }
    };

    let mut building = world.entity_mut(entity);
    building.insert(QueueLength(state.queue_len));
    match state.construction {
        Some(progress) => {
            building.insert(ConstructionProgress {
                current: progress.current,
                total: progress.total,
            });
        }
        None => {
            building.remove::<ConstructionProgress>();
        }
    }
}

/// Returns `true` when an owned unit had to be corrected.
fn sync_unit(
    world: &mut World,
    state: &UnitState,
    player: PlayerId,
    tick: Tick,
    config: &SimulationConfig,
) -> bool {
    let owned = state.owner == player;
    let position = Vec3::from_array(state.position);
    let rotation = Quat::from_array(state.rotation);
    let path = PathState::from_data(&state.path);
    let carry = state.carry.map_or_else(WorkerCarry::default, |carry| WorkerCarry {
        kind: Some(carry.kind),
        value: carry.value,
        previous_resource: None,
    });

    let Some(entity) = world.resource::<NetworkIds>().entity(state.entity) else {
        let mut bundle = UnitBundle::new(state.kind, state.owner, position, state.move_speed);
        bundle.transform.rotation = rotation;
        bundle.input_target = InputTarget(state.server_target);
        bundle.server_target = ServerTarget(state.server_target);
        bundle.path = path;
        bundle.waypoints = PathWaypoints(state.waypoints);
        let mut spawned = world.spawn((bundle, NetworkId(state.entity), ReplicatedTask(state.task)));
        if state.kind == UnitKind::Worker {
            spawned.insert(carry);
        }
        if owned {
            spawned.insert(Simulated);
        }
        let entity = spawned.id();
        world.resource_mut::<NetworkIds>().bind(state.entity, entity);
        return false;
    };

    {
        let mut unit = world.entity_mut(entity);
        unit.insert((ServerTarget(state.server_target), ReplicatedTask(state.task)));
        if state.kind == UnitKind::Worker {
            unit.insert(carry);
        }
        if !owned {
            unit.insert((path, PathWaypoints(state.waypoints)));
            if let Some(mut transform) = unit.get_mut::<Transform>() {
                transform.translation = position;
                transform.rotation = rotation;
            }
            return false;
        }
    }

    let diverged = world
        .resource::<PredictionHistory>()
        .predicted(tick, state.entity)
        .is_some_and(|predicted| predicted.needs_correction(position, config.correction_epsilon));
    if !diverged {
        return false;
    }

    let start = PredictedUnit {
        position,
        rotation,
        path,
    };
    let server = ServerTarget(state.server_target);
    let replayed = world.resource_mut::<PredictionHistory>().replay_unit(
        state.entity,
        tick,
        start,
        &server,
        state.move_speed,
        config.tick_seconds(),
    );

    let mut unit = world.entity_mut(entity);
    unit.insert(replayed.path);
    if let Some(mut transform) = unit.get_mut::<Transform>() {
        transform.translation = replayed.position;
        transform.rotation = replayed.rotation;
    }
    true
}

fn despawn_missing(world: &mut World, snapshot: &WorldSnapshot) {
    let live: HashSet<NetEntity> = snapshot
        .units
        .iter()
        .map(|state| state.entity)
        .chain(snapshot.buildings.iter().map(|state| state.entity))
        .chain(snapshot.resources.iter().map(|state| state.entity))
        .collect();
    let mut stale: Vec<(NetEntity, Entity)> = world
        .resource::<NetworkIds>()
        .iter()
        .filter(|(net, _)| !live.contains(net))
        .collect();
    stale.sort_unstable_by_key(|(net, _)| *net);

    for (net, entity) in stale {
        world.resource_mut::<NetworkIds>().release(net);
        world.despawn(entity);
    }
}

/// Rebuild the oracle around the replicated buildings and re-plan every
/// owned unit that has somewhere to go.
fn refresh_navigation(
    world: &mut World,
    snapshot: &WorldSnapshot,
    config: &SimulationConfig,
    catalog: &UnitCatalog,
) {
    let obstacles = snapshot.buildings.iter().map(|building| {
        (
            Vec3::from_array(building.position),
            catalog.footprint(building.kind),
        )
    });
    let oracle = build_path_oracle(config, obstacles);
    world.insert_resource(oracle);

    let mut owned = world.query_filtered::<(Entity, &InputTarget, &mut PathState), With<Simulated>>();
    let mut replan = Vec::new();
    for (entity, input, mut path) in owned.iter_mut(world) {
        path.reset();
        if input.0.version > 0 {
            replan.push(entity);
        }
    }
    for entity in replan {
        world.entity_mut(entity).insert(PathRequest);
    }

    tracing::debug!(
        target: "rts::prediction",
        epoch = snapshot.header.nav_epoch,
        buildings = snapshot.buildings.len(),
        "navigation.rebuilt"
    );
}

#[cfg(test)]
mod tests {
    use bevy_ecs::system::RunSystemOnce;
    use sim_runtime::{BuildingKind, PathStateData, SnapshotHeader, TaskKind};

    use super::*;

    fn client_world(player: PlayerId) -> World {
        let mut config = SimulationConfig::default();
        config.navigation = NavigationMode::Direct;
        let mut world = World::default();
        world.insert_resource(build_path_oracle(&config, std::iter::empty()));
        world.insert_resource(PredictionHistory::with_capacity(32));
        world.insert_resource(config);
        world.insert_resource(UnitCatalogHandle::new(UnitCatalog::builtin()));
        world.insert_resource(ClientState::new(player));
        world.init_resource::<LocalLedger>();
        world.init_resource::<NetworkIds>();
        world.init_resource::<SnapshotInbox>();
        world.init_resource::<ObservedNavEpoch>();
        world.init_resource::<SimulationMetrics>();
        world
    }

    fn unit_state(net: u64, owner: u32, position: [f32; 3]) -> UnitState {
        UnitState {
            entity: NetEntity(net),
            kind: UnitKind::Worker,
            owner: PlayerId(owner),
            team: owner as u8,
            position,
            rotation: [0.0, 0.0, 0.0, 1.0],
            move_speed: 3.0,
            input_version: 0,
            server_target: TargetDescriptor::default(),
            path: PathStateData::default(),
            waypoints: WaypointBuffer::EMPTY,
            carry: None,
            task: TaskKind::Idle,
        }
    }

    fn snapshot(tick: u32, units: Vec<UnitState>, buildings: Vec<BuildingState>) -> WorldSnapshot {
        WorldSnapshot {
            header: SnapshotHeader::new(Tick(tick), 0, units.len(), buildings.len(), 0),
            units,
            buildings,
            resources: Vec::new(),
            ledgers: Vec::new(),
        }
        .finalize()
    }

    #[test]
    fn redundant_commands_expire() {
        let mut pending = PendingCommands::new(2);
        pending.queue_placement(PlaceBuildingCommand {
            tick: Tick(4),
            kind: BuildingKind::House,
            position: [1.0, 0.0, 1.0],
        });
        assert!(pending.take_for_frame().0.is_some());
        assert!(pending.take_for_frame().0.is_some());
        assert!(pending.take_for_frame().0.is_none());
    }

    #[test]
    fn snapshots_spawn_update_and_despawn_entities() {
        let mut world = client_world(PlayerId(0));
        let building = BuildingState {
            entity: NetEntity(3),
            kind: BuildingKind::House,
            owner: PlayerId(0),
            team: 0,
            position: [20.0, 0.0, 20.0],
            construction: Some(sim_runtime::ProgressState {
                current: 1.0,
                total: 8.0,
            }),
            queue_len: 0,
        };
        world.resource_mut::<SnapshotInbox>().0.push(snapshot(
            1,
            vec![unit_state(1, 0, [1.0, 0.0, 1.0]), unit_state(2, 1, [5.0, 0.0, 5.0])],
            vec![building.clone()],
        ));
        world.run_system_once(apply_authoritative_snapshots);

        let ids = world.resource::<NetworkIds>().clone();
        let owned = ids.entity(NetEntity(1)).expect("owned unit");
        let remote = ids.entity(NetEntity(2)).expect("remote unit");
        assert!(world.get::<Simulated>(owned).is_some());
        assert!(world.get::<Simulated>(remote).is_none());
        let site = ids.entity(NetEntity(3)).expect("building");
        assert!(world.get::<ConstructionProgress>(site).is_some());
        assert_eq!(world.resource::<ObservedNavEpoch>().0, Some(0));

        let mut finished = building;
        finished.construction = None;
        world.resource_mut::<SnapshotInbox>().0.push(snapshot(
            2,
            vec![unit_state(1, 0, [1.0, 0.0, 1.0]), unit_state(2, 1, [6.0, 0.0, 5.0])],
            vec![finished],
        ));
        world.run_system_once(apply_authoritative_snapshots);
        assert!(world.get::<ConstructionProgress>(site).is_none());
        assert_eq!(world.get::<Building>(site).map(|b| b.kind), Some(BuildingKind::House));
        assert_eq!(world.get::<Transform>(remote).unwrap().translation.x, 6.0);

        world.resource_mut::<SnapshotInbox>().0.push(snapshot(3, vec![unit_state(1, 0, [1.0, 0.0, 1.0])], vec![]));
        world.run_system_once(apply_authoritative_snapshots);
        assert!(world.get_entity(remote).is_none());
        assert!(world.get_entity(site).is_none());
        assert_eq!(world.resource::<NetworkIds>().len(), 1);
    }

    #[test]
    fn stale_snapshots_are_ignored() {
        let mut world = client_world(PlayerId(0));
        world.resource_mut::<SnapshotInbox>().0.push(snapshot(5, vec![unit_state(1, 1, [2.0, 0.0, 0.0])], vec![]));
        world.run_system_once(apply_authoritative_snapshots);
        world.resource_mut::<SnapshotInbox>().0.push(snapshot(4, vec![unit_state(1, 1, [9.0, 0.0, 0.0])], vec![]));
        world.run_system_once(apply_authoritative_snapshots);

        let entity = world.resource::<NetworkIds>().entity(NetEntity(1)).unwrap();
        assert_eq!(world.get::<Transform>(entity).unwrap().translation.x, 2.0);
        assert_eq!(world.resource::<ClientState>().last_snapshot, Tick(5));
    }

    #[test]
    fn diverged_prediction_snaps_and_replays() {
        let mut world = client_world(PlayerId(0));
        world.resource_mut::<SnapshotInbox>().0.push(snapshot(1, vec![unit_state(1, 0, [0.0, 0.0, 0.0])], vec![]));
        world.run_system_once(apply_authoritative_snapshots);
        let entity = world.resource::<NetworkIds>().entity(NetEntity(1)).unwrap();

        let destination = [10.0, 0.0, 0.0];
        let mut units = BTreeMap::new();
        units.insert(
            NetEntity(1),
            PredictedUnit {
                position: Vec3::new(4.0, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                path: PathState::default(),
            },
        );
        for tick in 2..=3 {
            let mut frame = InputFrame::empty(PlayerId(0), Tick(tick));
            frame.units.push(UnitInput {
                entity: NetEntity(1),
                target: TargetDescriptor::at_position(destination, 1),
                waypoints: WaypointBuffer::single(destination),
            });
            world
                .resource_mut::<PredictionHistory>()
                .record(Tick(tick), frame, units.clone());
        }

        world.resource_mut::<SnapshotInbox>().0.push(snapshot(2, vec![unit_state(1, 0, [1.0, 0.0, 0.0])], vec![]));
        world.run_system_once(apply_authoritative_snapshots);

        let x = world.get::<Transform>(entity).unwrap().translation.x;
        assert!((x - 1.1).abs() < 1e-4);
        assert_eq!(world.resource::<SimulationMetrics>().rollbacks, 1);
        assert_eq!(world.resource::<PredictionHistory>().len(), 1);
    }

    #[test]
    fn reconcile_requests_a_path_toward_the_server_target() {
        let mut world = client_world(PlayerId(0));
        let server = TargetDescriptor::at_position([0.0, 0.0, 6.0], 4);
        let unit = world
            .spawn((
                Transform::default(),
                InputTarget(TargetDescriptor::at_position([3.0, 0.0, 0.0], 2)),
                ServerTarget(server),
                PathWaypoints::default(),
                Simulated,
            ))
            .id();

        world.run_system_once(reconcile_targets);
        assert!(world.get::<PathRequest>(unit).is_some());
        world.run_system_once(compute_paths);

        assert!(world.get::<PathRequest>(unit).is_none());
        assert_eq!(world.get::<InputTarget>(unit).unwrap().0, server);
        let waypoints = world.get::<PathWaypoints>(unit).unwrap().0;
        assert_eq!(waypoints.last(), Some([0.0, 0.0, 6.0]));
    }
}
