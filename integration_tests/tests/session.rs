mod common;

use bevy::prelude::*;
use rts_sim::client::LocalLedger;
use rts_sim::components::{NetworkId, Owner, Unit};
use rts_sim::intents::{click_target, move_selected, select};
use rts_sim::setup::{spawn_building, spawn_resource_node, spawn_unit};
use rts_sim::targeting::InputTarget;
use rts_sim::workers::UnitTask;
use rts_sim::{LoopbackSession, NetworkIds, SimulationConfig, SimulationMetrics, UnitCatalog};
use sim_runtime::{BuildingKind, NetEntity, PlayerId, ResourceKind, UnitKind};

const P0: PlayerId = PlayerId(0);

fn owned_units(world: &mut World, player: PlayerId) -> Vec<(NetEntity, Vec3)> {
    let mut units: Vec<_> = world
        .query::<(&NetworkId, &Owner, &Transform, &Unit)>()
        .iter(world)
        .filter(|(_, owner, _, _)| owner.0 == player)
        .map(|(net, _, transform, _)| (net.0, transform.translation))
        .collect();
    units.sort_by_key(|(net, _)| *net);
    units
}

fn position_by_net(world: &World, net: NetEntity) -> Vec3 {
    let entity = world
        .resource::<NetworkIds>()
        .entity(net)
        .expect("replicated entity");
    world.get::<Transform>(entity).expect("transform").translation
}

#[test]
fn prediction_matches_the_server_without_latency() {
    let mut session = LoopbackSession::new(SimulationConfig::default(), UnitCatalog::builtin(), 0);
    session.run(2);

    let client = session.client_mut(P0).expect("client");
    let (worker, start) = owned_units(client, P0)[0];
    let destination = start + Vec3::new(4.5, 0.0, 5.0);
    select(client, &[worker]).expect("select");
    move_selected(client, destination).expect("move");

    session.run(120);

    let server_position = position_by_net(session.server(), worker);
    assert!(server_position.distance(destination) < 0.1);
    let client = session.client(P0).expect("client");
    assert!(position_by_net(client, worker).distance(server_position) < 1e-4);
    assert_eq!(client.resource::<SimulationMetrics>().rollbacks, 0);
}

#[test]
fn server_follow_up_is_reconciled_and_completed_by_the_client() {
    let config = common::test_config();
    let mut session = LoopbackSession::new(config, UnitCatalog::builtin(), 0);
    session.run(1);

    let server = session.server_mut();
    spawn_building(server, BuildingKind::Center, P0, Vec3::new(20.0, 0.0, 30.0), false);
    let node = spawn_resource_node(server, ResourceKind::Wood, 2, Vec3::new(20.0, 0.0, 22.0));
    let worker = spawn_unit(server, UnitKind::Worker, P0, Vec3::new(20.0, 0.0, 19.0));
    let node_net = server.resource::<NetworkIds>().net(node).expect("node id");
    let worker_net = server.resource::<NetworkIds>().net(worker).expect("worker id");
    session.run(2);

    let client = session.client_mut(P0).expect("client");
    select(client, &[worker_net]).expect("select");
    click_target(client, Vec3::new(20.0, 10.0, 22.0), Vec3::new(20.0, -1.0, 22.0))
        .expect("click hits the node");
    session.run(20);

    // The node is gone and the server has redirected the worker home.
    assert!(session.server().resource::<NetworkIds>().entity(node_net).is_none());
    let client = session.client(P0).expect("client");
    assert!(client.resource::<NetworkIds>().entity(node_net).is_none());

    session.run(150);

    let server = session.server();
    assert_eq!(server.get::<UnitTask>(worker), Some(&UnitTask::Idle));
    let client = session.client(P0).expect("client");
    assert_eq!(client.resource::<LocalLedger>().0.wood, 202);

    let client_input = {
        let entity = client.resource::<NetworkIds>().entity(worker_net).expect("worker");
        client.get::<InputTarget>(entity).expect("input").0
    };
    let server_input = server.get::<InputTarget>(worker).expect("input").0;
    assert_eq!(client_input.version, server_input.version);
    assert!(client_input.version >= 2);
}

#[test]
fn latency_keeps_clients_consistent() {
    let mut session = LoopbackSession::new(SimulationConfig::default(), UnitCatalog::builtin(), 3);
    session.run(6);

    let client = session.client_mut(P0).expect("client");
    let (worker, start) = owned_units(client, P0)[0];
    let destination = start + Vec3::new(-3.0, 0.0, 6.0);
    select(client, &[worker]).expect("select");
    move_selected(client, destination).expect("move");

    // The client never pauses on the way, and the server walks the same
    // positions three steps later.
    let mut client_track = Vec::new();
    let mut server_track = Vec::new();
    let mut previous = start;
    for _ in 0..150 {
        session.step();
        let client_position = position_by_net(session.client(P0).expect("client"), worker);
        if previous.distance(destination) > 0.1 {
            assert_ne!(client_position, previous, "client prediction stalled");
        }
        previous = client_position;
        client_track.push(client_position);
        server_track.push(position_by_net(session.server(), worker));
    }
    for (client_position, server_position) in client_track.iter().zip(&server_track[3..]) {
        assert!(client_position.distance(*server_position) < 1e-4);
    }

    let server_position = position_by_net(session.server(), worker);
    let client = session.client(P0).expect("client");
    let client_position = position_by_net(client, worker);
    assert!(server_position.distance(destination) < 0.1);
    assert!(client_position.distance(server_position) < 1e-4);
    assert_eq!(client.resource::<SimulationMetrics>().rollbacks, 0);
}
