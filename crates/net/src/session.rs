//! Authenticated connection lifecycle and packet plumbing.
//!
//! A session owns the socket. All outbound traffic funnels through one writer
//! task; one receive task decodes inbound frames, echoes keep-alives, and
//! fans every other packet out on a broadcast bus that the world model,
//! inventory, and planner subscribe to. This is the system's single
//! concurrency seam.

use crate::auth::{AuthScheme, Profile};
use crate::codec::{encode_serverbound, FrameBuffer};
use crate::error::ConnectError;
use crate::packet::{compute_schema_hash, Clientbound, Phase, Serverbound, PROTOCOL_VERSION};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant};
use tracing::{debug, info, warn};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Version/schema exchange in progress.
    Handshaking,
    /// Identity exchange in progress.
    LoggingIn,
    /// Steady-state traffic.
    Play,
    /// Graceful teardown in progress.
    Closing,
}

/// Tunable session timeouts and queue depths.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Bound on the handshake + login exchange.
    pub login_timeout: Duration,
    /// Longest tolerated silence between server keep-alives.
    pub keepalive_window: Duration,
    /// Outbound queue depth.
    pub outbound_capacity: usize,
    /// Broadcast bus depth per subscriber.
    pub bus_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            login_timeout: Duration::from_secs(10),
            keepalive_window: Duration::from_secs(30),
            outbound_capacity: 64,
            bus_capacity: 256,
        }
    }
}

/// Error returned when sending into a torn-down session.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("session closed")]
pub struct SessionClosed;

/// How long the receive task holds inbound dispatch open for subscribers
/// before giving up and dispatching anyway.
const DISPATCH_GRACE: Duration = Duration::from_secs(1);

/// An established Play-phase connection.
#[derive(Debug)]
pub struct Session {
    profile: Profile,
    outbound: mpsc::Sender<Serverbound>,
    bus: broadcast::Sender<Clientbound>,
    state_tx: Arc<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    shutdown: Arc<watch::Sender<bool>>,
    dispatch_gate: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Connect, handshake, and log in to a server.
    ///
    /// On success the session is in the Play phase with its background tasks
    /// running. Each stage is bounded by the corresponding option timeout.
    pub async fn connect(
        addr: &str,
        auth: &dyn AuthScheme,
        options: SessionOptions,
    ) -> Result<Self, ConnectError> {
        let (state_tx, state_rx) = watch::channel(SessionState::Handshaking);
        let state_tx = Arc::new(state_tx);

        info!(%addr, username = auth.username(), "connecting");
        let mut stream = timeout(options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectError::Timeout {
                what: "connect",
                after: options.connect_timeout,
            })?
            .map_err(|source| ConnectError::Io {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| ConnectError::Io {
            addr: addr.to_string(),
            source,
        })?;

        let handshake = Serverbound::Handshake {
            protocol_version: PROTOCOL_VERSION,
            schema_hash: compute_schema_hash(),
        };
        write_packet(&mut stream, addr, &handshake).await?;

        state_tx.send_replace(SessionState::LoggingIn);
        let login = auth.login_request().await?;
        write_packet(&mut stream, addr, &login).await?;

        let (profile, leftover) = timeout(
            options.login_timeout,
            read_login_response(&mut stream, addr),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            what: "login",
            after: options.login_timeout,
        })??;

        state_tx.send_replace(SessionState::Play);
        info!(
            username = %profile.username,
            session_id = profile.session_id,
            "login complete"
        );

        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel(options.outbound_capacity);
        let (bus_tx, _) = broadcast::channel(options.bus_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let (liveness_tx, liveness_rx) = watch::channel(Instant::now());
        let (gate_tx, gate_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(write_loop(
                write_half,
                out_rx,
                state_tx.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(read_loop(
                read_half,
                leftover,
                bus_tx.clone(),
                out_tx.clone(),
                liveness_tx,
                state_tx.clone(),
                shutdown_rx.clone(),
                gate_rx,
            )),
            tokio::spawn(keepalive_watchdog(
                liveness_rx,
                options.keepalive_window,
                state_tx.clone(),
                shutdown_tx.clone(),
                shutdown_rx,
            )),
        ];

        Ok(Self {
            profile,
            outbound: out_tx,
            bus: bus_tx,
            state_tx,
            state_rx,
            shutdown: shutdown_tx,
            dispatch_gate: gate_tx,
            tasks,
        })
    }

    /// Open the inbound packet bus.
    ///
    /// Servers pipeline inventory and chunk packets right behind the login
    /// acceptance; the receive task holds them until subscribers attach so
    /// nothing is dropped on an empty bus. Call this once every subscriber
    /// is wired (it also opens on its own after a short grace period).
    pub fn start_dispatch(&self) {
        let _ = self.dispatch_gate.send(true);
    }

    /// Identity confirmed by the server at login.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions (Play -> Disconnected on fatal errors).
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Enqueue a packet on the single outbound path.
    pub async fn send(&self, packet: Serverbound) -> Result<(), SessionClosed> {
        self.outbound.send(packet).await.map_err(|_| SessionClosed)
    }

    /// Clone the outbound queue handle for a component.
    pub fn sender(&self) -> mpsc::Sender<Serverbound> {
        self.outbound.clone()
    }

    /// Subscribe to the decoded-packet bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Clientbound> {
        self.bus.subscribe()
    }

    /// Gracefully close: announce the disconnect, drain the outbound queue,
    /// and join the background tasks.
    pub async fn close(mut self, reason: &str) {
        self.state_tx.send_replace(SessionState::Closing);
        let _ = self
            .outbound
            .send(Serverbound::Disconnect {
                reason: reason.to_string(),
            })
            .await;
        let _ = self.shutdown.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("session task did not stop within 5s");
            }
        }
        self.state_tx.send_replace(SessionState::Disconnected);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Stops the background tasks if the session is dropped without close.
        let _ = self.shutdown.send(true);
    }
}

async fn write_packet(
    stream: &mut TcpStream,
    addr: &str,
    packet: &Serverbound,
) -> Result<(), ConnectError> {
    stream
        .write_all(&encode_serverbound(packet))
        .await
        .map_err(|source| ConnectError::Io {
            addr: addr.to_string(),
            source,
        })
}

/// Read until the server answers the login, returning leftover buffered bytes
/// (the server may pipeline Play packets behind LoginSuccess).
async fn read_login_response(
    stream: &mut TcpStream,
    addr: &str,
) -> Result<(Profile, FrameBuffer), ConnectError> {
    let mut buffer = FrameBuffer::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(packet) = buffer.next_clientbound(Phase::Login)? {
            return match packet {
                Clientbound::LoginSuccess {
                    session_id,
                    username,
                } => Ok((
                    Profile {
                        session_id,
                        username,
                    },
                    buffer,
                )),
                Clientbound::LoginRejected { reason } => {
                    Err(ConnectError::LoginRejected { reason })
                }
                other => Err(ConnectError::UnexpectedPacket {
                    expected: "LoginSuccess",
                    got: other.name(),
                }),
            };
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|source| ConnectError::Io {
                addr: addr.to_string(),
                source,
            })?;
        if n == 0 {
            return Err(ConnectError::ClosedDuringLogin);
        }
        buffer.extend(&chunk[..n]);
    }
}

/// Single consumer of the outbound queue; the only socket writer.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Serverbound>,
    state: Arc<watch::Sender<SessionState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                // Drain already-queued packets (the goodbye Disconnect in
                // particular) before stopping.
                while let Ok(packet) = outbound.try_recv() {
                    if write_half.write_all(&encode_serverbound(&packet)).await.is_err() {
                        break;
                    }
                }
                break;
            }
            maybe = outbound.recv() => match maybe {
                Some(packet) => {
                    if let Err(err) = write_half.write_all(&encode_serverbound(&packet)).await {
                        warn!("socket write failed: {err}");
                        state.send_replace(SessionState::Disconnected);
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = write_half.shutdown().await;
}

/// Receive task: decode frames, echo keep-alives, publish everything else.
#[allow(clippy::too_many_arguments)]
async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut buffer: FrameBuffer,
    bus: broadcast::Sender<Clientbound>,
    outbound: mpsc::Sender<Serverbound>,
    liveness: watch::Sender<Instant>,
    state: Arc<watch::Sender<SessionState>>,
    mut shutdown: watch::Receiver<bool>,
    mut gate: watch::Receiver<bool>,
) {
    // Hold dispatch until subscribers attach; packets pipelined behind the
    // login acceptance would otherwise land on an empty bus.
    if !*gate.borrow() {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = timeout(DISPATCH_GRACE, gate.changed()) => {}
        }
    }

    let mut chunk = [0u8; 4096];
    'outer: loop {
        // The login read may have buffered Play packets already.
        loop {
            match buffer.next_clientbound(Phase::Play) {
                Ok(Some(packet)) => {
                    if !dispatch(packet, &bus, &outbound, &liveness) {
                        state.send_replace(SessionState::Disconnected);
                        break 'outer;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("protocol error, dropping connection: {err}");
                    state.send_replace(SessionState::Disconnected);
                    break 'outer;
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => {
                    info!("server closed the connection");
                    state.send_replace(SessionState::Disconnected);
                    break;
                }
                Ok(n) => buffer.extend(&chunk[..n]),
                Err(err) => {
                    warn!("socket read failed: {err}");
                    state.send_replace(SessionState::Disconnected);
                    break;
                }
            },
        }
    }
}

/// Route one decoded packet. Returns false when the connection should stop.
fn dispatch(
    packet: Clientbound,
    bus: &broadcast::Sender<Clientbound>,
    outbound: &mpsc::Sender<Serverbound>,
    liveness: &watch::Sender<Instant>,
) -> bool {
    match packet {
        Clientbound::KeepAlive { id } => {
            liveness.send_replace(Instant::now());
            // Echo immediately; a full outbound queue risks the server
            // kicking us, so surface that loudly.
            if outbound.try_send(Serverbound::KeepAlive { id }).is_err() {
                warn!("outbound queue full, keep-alive echo dropped");
            }
            true
        }
        Clientbound::Disconnect { reason } => {
            info!(%reason, "server requested disconnect");
            let _ = bus.send(Clientbound::Disconnect { reason });
            false
        }
        other => {
            debug!(packet = other.name(), "received");
            // A send error just means no subscriber is listening yet.
            let _ = bus.send(other);
            true
        }
    }
}

/// Tears the session down if the server goes silent past the window.
async fn keepalive_watchdog(
    liveness: watch::Receiver<Instant>,
    window: Duration,
    state: Arc<watch::Sender<SessionState>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let silent_for = liveness.borrow().elapsed();
                if silent_for > window {
                    warn!(
                        ?silent_for,
                        ?window,
                        "keep-alive window missed, treating as fatal disconnect"
                    );
                    state.send_replace(SessionState::Disconnected);
                    let _ = shutdown_tx.send(true);
                    break;
                }
            }
        }
    }
}
