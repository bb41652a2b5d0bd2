//! In-process session: one server app and any number of client apps joined
//! by channels, stepped in lockstep with an optional delivery delay.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use sim_runtime::{InputFrame, PlayerId, WorldSnapshot};

use crate::{
    build_server_app,
    catalog::UnitCatalog,
    client::{align_client_tick, build_client_app, Outbox, SnapshotInbox},
    commands::PlayerInputs,
    config::SimulationConfig,
    resources::SimulationTick,
    snapshot::SnapshotHistory,
};

/// One direction of a simulated connection. Messages sent at step `n` are
/// released into the channel at step `n + latency`.
struct Link<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    delayed: VecDeque<(u64, T)>,
}

impl<T> Link<T> {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            delayed: VecDeque::new(),
        }
    }

    fn send(&mut self, due: u64, message: T) {
        self.delayed.push_back((due, message));
    }

    fn release(&mut self, now: u64) {
        while self.delayed.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, message)) = self.delayed.pop_front() {
                if self.tx.send(message).is_err() {
                    tracing::warn!(target: "rts::network", "loopback.link_closed");
                }
            }
        }
    }

    fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

struct ClientEndpoint {
    player: PlayerId,
    app: App,
    inputs: Link<InputFrame>,
    snapshots: Link<WorldSnapshot>,
}

pub struct LoopbackSession {
    server: App,
    clients: Vec<ClientEndpoint>,
    latency_ticks: u32,
    step: u64,
}

impl LoopbackSession {
    /// One client per configured player, each leading the server by the
    /// link latency.
    pub fn new(config: SimulationConfig, catalog: Arc<UnitCatalog>, latency_ticks: u32) -> Self {
        let server = build_server_app(config.clone(), Arc::clone(&catalog));
        let server_tick = server.world.resource::<SimulationTick>().0;
        let clients = (0..config.players)
            .map(|index| {
                let player = PlayerId(index);
                let mut app = build_client_app(config.clone(), Arc::clone(&catalog), player);
                align_client_tick(&mut app.world, server_tick, latency_ticks);
                ClientEndpoint {
                    player,
                    app,
                    inputs: Link::new(),
                    snapshots: Link::new(),
                }
            })
            .collect();
        Self {
            server,
            clients,
            latency_ticks,
            step: 0,
        }
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.clients.iter().map(|client| client.player).collect()
    }

    pub fn server(&self) -> &World {
        &self.server.world
    }

    pub fn server_mut(&mut self) -> &mut World {
        &mut self.server.world
    }

    pub fn client(&self, player: PlayerId) -> Option<&World> {
        self.clients
            .iter()
            .find(|client| client.player == player)
            .map(|client| &client.app.world)
    }

    pub fn client_mut(&mut self, player: PlayerId) -> Option<&mut World> {
        self.clients
            .iter_mut()
            .find(|client| client.player == player)
            .map(|client| &mut client.app.world)
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Advance every app by one tick: deliver snapshots, run clients, hand
    /// their frames to the server, run the server, publish its snapshot.
    pub fn step(&mut self) {
        self.step += 1;
        let now = self.step;
        let due = now + u64::from(self.latency_ticks);

        for client in &mut self.clients {
            client.snapshots.release(now);
            let arrived = client.snapshots.drain();
            if !arrived.is_empty() {
                client
                    .app
                    .world
                    .resource_mut::<SnapshotInbox>()
                    .0
                    .extend(arrived);
            }
            client.app.update();

            let frames = client.app.world.resource_mut::<Outbox>().drain();
            for frame in frames {
                client.inputs.send(due, frame);
            }
            client.inputs.release(now);
        }

        for client in &self.clients {
            for frame in client.inputs.drain() {
                let player = frame.player;
                let tick = frame.tick;
                if let Err(err) = self.server.world.resource_mut::<PlayerInputs>().submit(frame) {
                    tracing::warn!(
                        target: "rts::network",
                        player = %player,
                        tick = %tick,
                        error = %err,
                        "input.rejected"
                    );
                }
            }
        }

        self.server.update();

        let Some(latest) = self
            .server
            .world
            .resource::<SnapshotHistory>()
            .latest()
            .map(|entry| Arc::clone(&entry.snapshot))
        else {
            return;
        };
        for client in &mut self.clients {
            client.snapshots.send(due, latest.for_player(client.player));
        }
    }

    pub fn run(&mut self, steps: u32) {
        for _ in 0..steps {
            self.step();
        }
    }
}
