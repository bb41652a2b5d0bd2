mod common;

use bevy::prelude::*;
use rts_sim::components::{ResourceNode, WorkerCarry};
use rts_sim::targeting::ServerTarget;
use rts_sim::workers::{UnitTask, MAX_CARRY};
use rts_sim::PlayerLedgers;
use sim_runtime::{PlayerId, ResourceKind, TargetDescriptor};

const P0: PlayerId = PlayerId(0);

fn carry(app: &App, worker: Entity) -> WorkerCarry {
    *app.world.get::<WorkerCarry>(worker).expect("worker carry")
}

fn task(app: &App, worker: Entity) -> UnitTask {
    *app.world.get::<UnitTask>(worker).expect("worker task")
}

fn wood_of(app: &App) -> u32 {
    app.world.resource::<PlayerLedgers>().get(P0).expect("ledger").wood
}

/// Follow `node` the way a right-click on it would.
fn gather_order(app: &mut App, worker: Entity, node: Entity, version: u32, waypoints: &[[f32; 3]]) {
    let target = TargetDescriptor::following(
        common::net_of(app, node),
        common::position_of(app, node).to_array(),
        1.0,
        version,
    );
    common::order(app, P0, worker, target, waypoints);
}

#[test]
fn depleting_a_node_sends_the_worker_to_the_nearest_center() {
    let mut app = common::server_app(common::test_config());
    let near = common::center(&mut app, P0, Vec3::new(12.0, 0.0, 4.0));
    common::center(&mut app, P0, Vec3::new(40.0, 0.0, 40.0));
    let node = common::wood(&mut app, 3, Vec3::new(4.0, 0.0, 4.0));
    let worker = common::worker(&mut app, P0, Vec3::new(2.5, 0.0, 4.0));

    gather_order(&mut app, worker, node, 1, &[[3.0, 0.0, 4.0]]);
    common::run_ticks(&mut app, 1);
    assert_eq!(task(&app, worker), UnitTask::Gathering(node));

    common::run_ticks(&mut app, 30);

    assert!(app.world.get_entity(node).is_none());
    let held = carry(&app, worker);
    assert_eq!(held.value, 3);
    assert_eq!(held.kind, Some(ResourceKind::Wood));
    assert_eq!(task(&app, worker), UnitTask::Storing(near));

    let follow_up = app.world.get::<ServerTarget>(worker).unwrap().0;
    assert_eq!(follow_up.target_entity, Some(common::net_of(&app, near)));
    assert_eq!(follow_up.version, 2);
    assert_eq!(wood_of(&app), 200);

    // The owner answers the follow-up with a path to the drop-off.
    let center_net = common::net_of(&app, near);
    common::order(
        &mut app,
        P0,
        worker,
        TargetDescriptor::following(center_net, [12.0, 0.0, 4.0], 2.5, 2),
        &[[9.5, 0.0, 4.0]],
    );
    common::run_ticks(&mut app, 90);

    assert_eq!(wood_of(&app), 203);
    assert_eq!(carry(&app, worker), WorkerCarry::default());
    assert_eq!(task(&app, worker), UnitTask::Idle);
}

#[test]
fn gathered_wood_is_conserved_and_carry_stays_bounded() {
    let mut app = common::server_app(common::test_config());
    common::center(&mut app, P0, Vec3::new(9.5, 0.0, 4.0));
    let node = common::wood(&mut app, 400, Vec3::new(6.0, 0.0, 4.0));
    let worker = common::worker(&mut app, P0, Vec3::new(7.0, 0.0, 4.0));

    gather_order(&mut app, worker, node, 1, &[]);
    for _ in 0..200 {
        common::run_ticks(&mut app, 1);
        let held = carry(&app, worker);
        assert!(held.value <= MAX_CARRY);
        if held.value > 0 {
            assert_eq!(held.kind, Some(ResourceKind::Wood));
        }
        let remaining = app.world.get::<ResourceNode>(node).expect("node").value;
        assert_eq!(remaining + held.value + (wood_of(&app) - 200), 400);
    }

    assert!(wood_of(&app) >= 350);
    assert!(matches!(
        task(&app, worker),
        UnitTask::Gathering(_) | UnitTask::Storing(_)
    ));
}

#[test]
fn workers_settle_when_no_work_is_left() {
    let mut app = common::server_app(common::test_config());
    let node = common::wood(&mut app, 1, Vec3::new(6.0, 0.0, 6.0));
    let first = common::worker(&mut app, P0, Vec3::new(5.0, 0.0, 6.0));
    let second = common::worker(&mut app, P0, Vec3::new(7.0, 0.0, 6.0));

    gather_order(&mut app, first, node, 1, &[]);
    let target = TargetDescriptor::following(common::net_of(&app, node), [6.0, 0.0, 6.0], 1.0, 1);
    common::order(&mut app, P0, second, target, &[]);
    common::run_ticks(&mut app, 10);

    assert!(app.world.get_entity(node).is_none());
    // No Center to store at: both end idle, the winner still holding the wood.
    assert_eq!(task(&app, first), UnitTask::Idle);
    assert_eq!(task(&app, second), UnitTask::Idle);
    assert_eq!(carry(&app, first).value + carry(&app, second).value, 1);

    let before = [
        common::position_of(&app, first),
        common::position_of(&app, second),
    ];
    common::run_ticks(&mut app, 30);
    assert_eq!(task(&app, first), UnitTask::Idle);
    assert_eq!(task(&app, second), UnitTask::Idle);
    assert_eq!(common::position_of(&app, first), before[0]);
    assert_eq!(common::position_of(&app, second), before[1]);
}

#[test]
fn switching_resource_kind_drops_the_old_load_and_counts_it() {
    let mut app = common::server_app(common::test_config());
    let food = rts_sim::setup::spawn_resource_node(
        &mut app.world,
        ResourceKind::Food,
        20,
        Vec3::new(4.0, 0.0, 4.0),
    );
    let worker = common::worker(&mut app, P0, Vec3::new(2.5, 0.0, 4.0));
    app.world.entity_mut(worker).insert(WorkerCarry {
        kind: Some(ResourceKind::Wood),
        value: 2,
        previous_resource: None,
    });

    gather_order(&mut app, worker, food, 1, &[[3.0, 0.0, 4.0]]);
    common::run_ticks(&mut app, 10);

    let held = carry(&app, worker);
    assert_eq!(held.kind, Some(ResourceKind::Food));
    assert!(held.value > 0);
    let metrics = app.world.resource::<rts_sim::SimulationMetrics>();
    assert_eq!(metrics.resources_dropped, 2);
    assert_eq!(wood_of(&app), 200);
}
