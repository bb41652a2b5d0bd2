mod common;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use rts_sim::network::{start_session_server, SessionClient, SessionEvent};
use rts_sim::{run_tick, PlayerInputs, SimulationConfig, SimulationTick, SnapshotHistory};
use sim_runtime::{ClientMessage, InputFrame, PlayerId, ServerMessage};

fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> anyhow::Result<T> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = poll() {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for the session server");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn tcp_client_is_welcomed_and_receives_snapshots() -> anyhow::Result<()> {
    let mut app = rts_sim::build_server_app(SimulationConfig::default(), rts_sim::UnitCatalog::builtin());
    run_tick(&mut app);

    let server = start_session_server("127.0.0.1:0".parse()?).context("session server")?;
    let mut client = SessionClient::connect(server.local_addr(), PlayerId(1))?;
    client.set_read_timeout(Some(Duration::from_secs(5)))?;

    let (player, hello) = wait_for(|| server.try_recv())?;
    assert_eq!(hello, ClientMessage::Hello { player: PlayerId(1) });
    let tick = app.world.resource::<SimulationTick>().0;
    assert_eq!(server.send_to(player, &ServerMessage::Welcome { player, tick }), 1);

    let SessionEvent::Welcome { player: welcomed, tick: welcome_tick } = client.recv()? else {
        bail!("expected a welcome first");
    };
    assert_eq!(welcomed, PlayerId(1));
    assert_eq!(welcome_tick, tick);

    // Input from the client lands in the server's command buffers.
    let frame = InputFrame::empty(PlayerId(1), tick.next());
    client.send_input(&frame)?;
    let (_, message) = wait_for(|| server.try_recv())?;
    let ClientMessage::Input(received) = message else {
        bail!("expected an input frame");
    };
    app.world.resource_mut::<PlayerInputs>().submit(received)?;

    for _ in 0..2 {
        run_tick(&mut app);
        let latest = app
            .world
            .resource::<SnapshotHistory>()
            .latest()
            .map(|entry| entry.snapshot.clone())
            .context("snapshot")?;
        server.broadcast_snapshot(&latest);
    }

    let SessionEvent::Snapshot(first) = client.recv()? else {
        bail!("expected a full snapshot");
    };
    let SessionEvent::Snapshot(second) = client.recv()? else {
        bail!("expected a delta folded into a snapshot");
    };
    assert_eq!(second.header.tick, first.header.tick.next());

    let authoritative = app.world.resource::<SnapshotHistory>().latest().context("snapshot")?;
    assert_eq!(second.units, authoritative.snapshot.units);
    assert_eq!(second.ledgers.len(), 1);
    assert_eq!(second.ledgers[0].player, PlayerId(1));
    Ok(())
}
