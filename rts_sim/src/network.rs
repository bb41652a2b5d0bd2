use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use sim_runtime::{
    encode_frame, read_frame, write_frame, ClientMessage, FrameError, InputFrame, PlayerId,
    ServerMessage, Tick, WorldSnapshot,
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

struct Connection {
    player: PlayerId,
    addr: SocketAddr,
    stream: TcpStream,
    /// Last snapshot sent; later snapshots go out as deltas against it.
    baseline: Option<WorldSnapshot>,
}

type Connections = Arc<Mutex<Vec<Connection>>>;

fn lock(connections: &Connections) -> MutexGuard<'_, Vec<Connection>> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}

/// TCP endpoint carrying the same messages as the loopback session.
pub struct SessionServer {
    local_addr: SocketAddr,
    incoming: Receiver<(PlayerId, ClientMessage)>,
    connections: Connections,
    shutdown: Arc<AtomicBool>,
}

impl SessionServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn try_recv(&self) -> Option<(PlayerId, ClientMessage)> {
        self.incoming.try_recv().ok()
    }

    pub fn connected_players(&self) -> Vec<PlayerId> {
        lock(&self.connections).iter().map(|c| c.player).collect()
    }

    /// Send `message` to every connection of `player`. Returns how many
    /// connections accepted it.
    pub fn send_to(&self, player: PlayerId, message: &ServerMessage) -> usize {
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("Failed to encode message for player {}: {}", player, err);
                return 0;
            }
        };
        let mut guard = lock(&self.connections);
        let mut delivered = 0;
        guard.retain_mut(|connection| {
            if connection.player != player {
                return true;
            }
            match io::Write::write_all(&mut connection.stream, &frame) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(err) => {
                    log::warn!("Dropping session client {}: {}", connection.addr, err);
                    false
                }
            }
        });
        delivered
    }

    /// Send each client its filtered copy of `snapshot`: a full snapshot the
    /// first time, a delta against the previous one afterwards.
    pub fn broadcast_snapshot(&self, snapshot: &WorldSnapshot) {
        let mut guard = lock(&self.connections);
        guard.retain_mut(|connection| {
            let filtered = snapshot.for_player(connection.player);
            let message = match &connection.baseline {
                Some(baseline) => ServerMessage::Delta(filtered.delta_from(baseline)),
                None => ServerMessage::Snapshot(filtered.clone()),
            };
            match write_frame(&mut connection.stream, &message) {
                Ok(()) => {
                    connection.baseline = Some(filtered);
                    true
                }
                Err(err) => {
                    log::warn!("Dropping session client {}: {}", connection.addr, err);
                    false
                }
            }
        });
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

pub fn start_session_server(bind_addr: SocketAddr) -> Option<SessionServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            log::warn!(
                "Session server bind failed at {}: {}. Remote clients disabled.",
                bind_addr,
                err
            );
            return None;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        log::warn!("Session listener cannot be made nonblocking: {}", err);
        return None;
    }
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            log::warn!("Session listener has no local address: {}", err);
            return None;
        }
    };

    let (sender, incoming) = unbounded();
    let connections: Connections = Arc::new(Mutex::new(Vec::new()));
    let shutdown = Arc::new(AtomicBool::new(false));
    let accept_connections = Arc::clone(&connections);
    let accept_shutdown = Arc::clone(&shutdown);

    thread::spawn(move || {
        while !accept_shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(err) = register_client(stream, addr, &sender, &accept_connections) {
                        log::warn!("Session handshake with {} failed: {}", addr, err);
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(20));
                }
                Err(err) => {
                    log::error!("Error accepting session client: {}", err);
                    thread::sleep(Duration::from_millis(200));
                }
            }
        }
    });

    log::info!("Session server listening on {}", local_addr);
    Some(SessionServer {
        local_addr,
        incoming,
        connections,
        shutdown,
    })
}

/// Read the `Hello`, then hand the socket to a reader thread and keep a
/// clone for writes.
fn register_client(
    stream: TcpStream,
    addr: SocketAddr,
    sender: &Sender<(PlayerId, ClientMessage)>,
    connections: &Connections,
) -> Result<(), FrameError> {
    stream.set_nonblocking(false)?;
    if let Err(err) = stream.set_nodelay(true) {
        log::warn!("Failed to set TCP_NODELAY for {}: {}", addr, err);
    }
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let player = match read_frame::<_, ClientMessage>(&mut reader)? {
        ClientMessage::Hello { player } => player,
        other => {
            log::warn!("Session client {} skipped the handshake: {:?}", addr, other);
            return Ok(());
        }
    };
    stream.set_read_timeout(None)?;
    log::info!("Session client {} joined as player {}", addr, player);

    lock(connections).push(Connection {
        player,
        addr,
        stream,
        baseline: None,
    });
    if sender.send((player, ClientMessage::Hello { player })).is_err() {
        return Ok(());
    }

    let sender = sender.clone();
    thread::spawn(move || loop {
        match read_frame::<_, ClientMessage>(&mut reader) {
            Ok(message) => {
                if sender.send((player, message)).is_err() {
                    break;
                }
            }
            Err(FrameError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                log::info!("Session client {} disconnected", addr);
                break;
            }
            Err(err) => {
                log::warn!("Session client {} sent an unreadable frame: {}", addr, err);
                break;
            }
        }
    });
    Ok(())
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Welcome { player: PlayerId, tick: Tick },
    Snapshot(WorldSnapshot),
}

/// Blocking client side of a TCP session.
pub struct SessionClient {
    player: PlayerId,
    stream: TcpStream,
    baseline: Option<WorldSnapshot>,
}

impl SessionClient {
    pub fn connect(addr: SocketAddr, player: PlayerId) -> Result<Self, FrameError> {
        let mut stream = TcpStream::connect(addr)?;
        if let Err(err) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", err);
        }
        write_frame(&mut stream, &ClientMessage::Hello { player })?;
        Ok(Self {
            player,
            stream,
            baseline: None,
        })
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), FrameError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn send_input(&mut self, frame: &InputFrame) -> Result<(), FrameError> {
        write_frame(&mut self.stream, &ClientMessage::Input(frame.clone()))
    }

    /// Next welcome or full snapshot; deltas are folded into the baseline.
    pub fn recv(&mut self) -> Result<SessionEvent, FrameError> {
        loop {
            match read_frame::<_, ServerMessage>(&mut self.stream)? {
                ServerMessage::Welcome { player, tick } => {
                    return Ok(SessionEvent::Welcome { player, tick });
                }
                ServerMessage::Snapshot(snapshot) => {
                    self.baseline = Some(snapshot.clone());
                    return Ok(SessionEvent::Snapshot(snapshot));
                }
                ServerMessage::Delta(delta) => match self.baseline.as_mut() {
                    Some(baseline) => {
                        baseline.apply_delta(&delta);
                        return Ok(SessionEvent::Snapshot(baseline.clone()));
                    }
                    None => {
                        log::warn!("Delta for tick {} arrived before any snapshot", delta.header.tick);
                    }
                },
            }
        }
    }
}
