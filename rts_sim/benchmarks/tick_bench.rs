use bevy::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rts_sim::components::Unit;
use rts_sim::movement::PathWaypoints;
use rts_sim::setup::spawn_unit;
use rts_sim::targeting::InputTarget;
use rts_sim::{build_server_app, run_tick, SimulationConfig, UnitCatalog};
use sim_runtime::{PlayerId, TargetDescriptor, UnitKind, WaypointBuffer};

fn moving_app(workers: u32) -> App {
    let config = SimulationConfig {
        map_size: [128.0, 128.0],
        ..SimulationConfig::default()
    };
    let mut app = build_server_app(config, UnitCatalog::builtin());
    run_tick(&mut app);

    for index in 0..workers {
        let player = PlayerId(index % 2);
        let start = Vec3::new(4.0 + (index % 32) as f32 * 3.0, 0.0, 4.0 + (index / 32) as f32 * 3.0);
        spawn_unit(&mut app.world, UnitKind::Worker, player, start);
    }

    let mut units = app
        .world
        .query::<(&Unit, &Transform, &mut InputTarget, &mut PathWaypoints)>();
    for (_, transform, mut input, mut waypoints) in units.iter_mut(&mut app.world) {
        let destination = [120.0 - transform.translation.x, 0.0, 120.0 - transform.translation.z];
        let midpoint = [64.0, 0.0, transform.translation.z];
        input.0 = TargetDescriptor::at_position(destination, 1);
        waypoints.0 = WaypointBuffer::from_corners(&[midpoint, destination]);
    }
    app
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("server_tick");

    for workers in [16u32, 64, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("moving_workers", workers), &workers, |b, &workers| {
            b.iter_batched(
                || moving_app(workers),
                |mut app| {
                    run_tick(&mut app);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(tick_benches, bench_tick);
criterion_main!(tick_benches);
