use std::io::{BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use tracing::{info, warn};

use rts_sim::network::{start_session_server, SessionServer};
use rts_sim::{
    build_server_app, load_simulation_config_from_env, load_unit_catalog_from_env, run_tick,
    submit_operator_command, ConsoleOutcome, PlayerInputs, SimulationMetrics, SimulationTick,
    SnapshotHistory,
};
use sim_runtime::{
    parse_command_line, ClientMessage, CommandEnvelope, CommandPayload, ServerMessage,
};

const MAX_ENVELOPE_LEN: usize = 64 * 1024;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_simulation_config_from_env();
    let catalog = load_unit_catalog_from_env();
    let mut app = build_server_app(config.clone(), catalog);

    let session = start_session_server(config.session_bind);
    let (sender, commands) = unbounded::<CommandPayload>();
    spawn_text_listener(config.command_bind, sender.clone());
    spawn_envelope_listener(config.envelope_bind, sender);

    info!(
        target: "rts::server",
        session_bind = %config.session_bind,
        command_bind = %config.command_bind,
        envelope_bind = %config.envelope_bind,
        tick_rate = config.tick_rate,
        "RTS server ready"
    );

    let tick_interval = Duration::from_secs_f32(config.tick_seconds());
    let mut paused = false;
    loop {
        let started = Instant::now();
        let mut forced_steps = 0u32;

        for payload in commands.try_iter() {
            match submit_operator_command(&mut app.world, payload) {
                Ok(ConsoleOutcome::Step(steps)) => forced_steps += steps,
                Ok(ConsoleOutcome::Pause) => {
                    paused = true;
                    info!(target: "rts::server", "simulation.paused");
                }
                Ok(ConsoleOutcome::Resume) => {
                    paused = false;
                    info!(target: "rts::server", "simulation.resumed");
                }
                Ok(ConsoleOutcome::Status(line)) => {
                    info!(target: "rts::server", status = %line, "simulation.status");
                }
                Ok(ConsoleOutcome::Queued(player)) => {
                    info!(target: "rts::server", player = %player, "console.command_queued");
                }
                Err(err) => {
                    warn!(target: "rts::server", error = %err, "console.command_rejected");
                }
            }
        }

        if let Some(server) = session.as_ref() {
            pump_session(&mut app, server);
        }

        let steps = if paused { forced_steps } else { forced_steps.max(1) };
        for _ in 0..steps {
            run_tick(&mut app);
            if let Some(server) = session.as_ref() {
                broadcast_latest(&app, server);
            }
        }
        if steps > 0 {
            log_tick(&app);
        }

        if let Some(remaining) = tick_interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}

fn pump_session(app: &mut bevy::prelude::App, server: &SessionServer) {
    while let Some((player, message)) = server.try_recv() {
        match message {
            ClientMessage::Hello { .. } => {
                let tick = app.world.resource::<SimulationTick>().0;
                server.send_to(player, &ServerMessage::Welcome { player, tick });
                info!(target: "rts::network", player = %player, tick = %tick, "session.welcome");
            }
            ClientMessage::Input(frame) if frame.player != player => {
                warn!(
                    target: "rts::network",
                    player = %player,
                    claimed = %frame.player,
                    "input.rejected=spoofed_player"
                );
            }
            ClientMessage::Input(frame) => {
                let tick = frame.tick;
                if let Err(err) = app.world.resource_mut::<PlayerInputs>().submit(frame) {
                    warn!(
                        target: "rts::network",
                        player = %player,
                        tick = %tick,
                        error = %err,
                        "input.rejected"
                    );
                }
            }
        }
    }
}

fn broadcast_latest(app: &bevy::prelude::App, server: &SessionServer) {
    if let Some(entry) = app.world.resource::<SnapshotHistory>().latest() {
        server.broadcast_snapshot(entry.snapshot.as_ref());
    }
}

fn log_tick(app: &bevy::prelude::App) {
    let metrics = app.world.resource::<SimulationMetrics>();
    if metrics.tick % 300 != 0 {
        return;
    }
    info!(
        target: "rts::server",
        tick = metrics.tick,
        units = metrics.units,
        idle = metrics.workers_idle,
        gathering = metrics.workers_gathering,
        applied = metrics.commands_applied,
        duplicate = metrics.commands_duplicate,
        rejected = metrics.commands_rejected,
        "tick.completed"
    );
}

fn spawn_text_listener(bind_addr: SocketAddr, sender: Sender<CommandPayload>) {
    spawn_listener(bind_addr, "command", sender, handle_text_client);
}

fn spawn_envelope_listener(bind_addr: SocketAddr, sender: Sender<CommandPayload>) {
    spawn_listener(bind_addr, "envelope", sender, handle_envelope_client);
}

fn spawn_listener(
    bind_addr: SocketAddr,
    label: &'static str,
    sender: Sender<CommandPayload>,
    handler: fn(TcpStream, Sender<CommandPayload>),
) {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            warn!("{} listener bind failed at {}: {}", label, bind_addr, err);
            return;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        warn!("{} listener cannot be made nonblocking: {}", label, err);
        return;
    }

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("{} client connected: {}", label, addr);
                if let Err(err) = stream.set_nonblocking(false) {
                    warn!("Failed to set blocking mode for {}: {}", addr, err);
                    continue;
                }
                let sender = sender.clone();
                thread::spawn(move || handler(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!("Error accepting {} client: {}", label, err);
                thread::sleep(Duration::from_millis(200));
            }
        }
    });
}

fn handle_text_client(stream: TcpStream, sender: Sender<CommandPayload>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_command_line(trimmed) {
                    Ok(payload) => {
                        if sender.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("Invalid command '{}': {}", trimmed, err),
                }
            }
            Err(err) => {
                warn!("Command read error: {}", err);
                break;
            }
        }
    }
}

/// Envelopes arrive as a little-endian `u32` length followed by the
/// protobuf bytes.
fn handle_envelope_client(mut stream: TcpStream, sender: Sender<CommandPayload>) {
    loop {
        let mut header = [0u8; 4];
        if let Err(err) = stream.read_exact(&mut header) {
            if err.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!("Envelope read error: {}", err);
            }
            break;
        }
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_ENVELOPE_LEN {
            warn!("Envelope of {} bytes exceeds limit; closing connection", len);
            break;
        }
        let mut payload = vec![0u8; len];
        if let Err(err) = stream.read_exact(&mut payload) {
            warn!("Envelope read error: {}", err);
            break;
        }
        match CommandEnvelope::decode(&payload) {
            Ok(envelope) => {
                if sender.send(envelope.payload).is_err() {
                    break;
                }
            }
            Err(err) => warn!("Invalid command envelope: {}", err),
        }
    }
}

