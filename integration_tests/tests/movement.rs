mod common;

use bevy::prelude::*;
use rts_sim::movement::PathState;
use rts_sim::targeting::ServerTarget;
use rts_sim::workers::UnitTask;
use sim_runtime::{PlayerId, TargetDescriptor};

const P0: PlayerId = PlayerId(0);

fn path(app: &App, unit: Entity) -> PathState {
    *app.world.get::<PathState>(unit).expect("path state")
}

#[test]
fn nearby_final_waypoint_arrives_without_moving() {
    let mut app = common::server_app(common::test_config());
    let start = Vec3::new(10.0, 0.0, 10.0);
    let unit = common::worker(&mut app, P0, start);

    let point = [10.05, 0.0, 10.0];
    common::order(&mut app, P0, unit, TargetDescriptor::at_position(point, 1), &[point]);
    common::run_ticks(&mut app, 1);

    assert_eq!(common::position_of(&app, unit), start);
    let state = path(&app, unit);
    assert!(!state.has_path);
    assert_eq!(state.target_version, 1);
    assert_eq!(app.world.get::<UnitTask>(unit), Some(&UnitTask::Idle));
}

#[test]
fn unit_walks_every_corner_of_its_path() {
    let mut app = common::server_app(common::test_config());
    let unit = common::worker(&mut app, P0, Vec3::new(10.0, 0.0, 10.0));

    let corners = [[14.0, 0.0, 10.0], [14.0, 0.0, 14.0]];
    common::order(
        &mut app,
        P0,
        unit,
        TargetDescriptor::at_position(corners[1], 1),
        &corners,
    );
    common::run_ticks(&mut app, 20);
    assert!(path(&app, unit).has_path);
    assert_eq!(path(&app, unit).current_waypoint_index, 0);

    common::run_ticks(&mut app, 70);
    let state = path(&app, unit);
    assert!(!state.has_path);
    assert_eq!(state.current_waypoint_index, 1);
    assert!(common::position_of(&app, unit).distance(Vec3::from_array(corners[1])) < 0.1);
}

#[test]
fn outranked_input_waypoints_are_ignored_until_answered() {
    let mut app = common::server_app(common::test_config());
    let unit = common::worker(&mut app, P0, Vec3::new(10.0, 0.0, 10.0));

    let far = [30.0, 0.0, 10.0];
    common::order(&mut app, P0, unit, TargetDescriptor::at_position(far, 1), &[far]);
    common::run_ticks(&mut app, 5);
    let moved = common::position_of(&app, unit);
    assert!(moved.x > 10.0);

    // A server-issued target outranks the old input.
    app.world.get_mut::<ServerTarget>(unit).unwrap().0 =
        TargetDescriptor::at_position([10.0, 0.0, 20.0], 5);
    common::run_ticks(&mut app, 10);
    assert_eq!(common::position_of(&app, unit), moved);
    assert!(!path(&app, unit).has_path);

    let answer = [moved.x, 0.0, 20.0];
    common::order(&mut app, P0, unit, TargetDescriptor::at_position(answer, 5), &[answer]);
    common::run_ticks(&mut app, 1);
    assert!(path(&app, unit).has_path);
    assert!(common::position_of(&app, unit).z > moved.z);
}
