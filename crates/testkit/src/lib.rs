#![warn(missing_docs)]
//! Test plumbing: a scriptable mock game server speaking the real protocol.
//!
//! The mock accepts one connection, walks the handshake/login phases with the
//! real codec, streams a configured world, confirms digs, and records every
//! serverbound packet for assertions.

use anyhow::Result;
use quarry_core::{BlockId, BlockPos, BLOCK_AIR, CHUNK_VOLUME};
use quarry_net::{
    encode_chunk_payload, encode_clientbound, Clientbound, DigActionKind, FrameBuffer, Phase,
    Serverbound, SlotData,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tracing::debug;

/// One chunk column the mock serves right after login.
#[derive(Debug, Clone)]
pub struct ChunkSpec {
    /// Chunk X coordinate.
    pub x: i32,
    /// Chunk Z coordinate.
    pub z: i32,
    /// Flat block array, one chunk volume.
    pub blocks: Vec<BlockId>,
}

/// Behavior script for the mock server.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Chunks streamed immediately after login.
    pub chunks: Vec<ChunkSpec>,
    /// Initial inventory snapshot.
    pub slots: Vec<SlotData>,
    /// Keep-alive cadence; None sends no pings at all.
    pub keepalive_interval: Option<Duration>,
    /// Whether finish-dig actions are answered with an air block change.
    pub confirm_digs: bool,
    /// Reject the login with this reason instead of accepting it.
    pub reject_login: Option<String>,
    /// Session id handed out on successful login.
    pub session_id: u64,
    /// Hold chunks back this long after login before streaming them.
    pub chunk_delay: Option<Duration>,
    /// Drop the connection (with a Disconnect notice) after confirming this
    /// many digs.
    pub disconnect_after_digs: Option<u32>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            slots: standard_kit(),
            keepalive_interval: Some(Duration::from_secs(5)),
            confirm_digs: true,
            reject_login: None,
            session_id: 1,
            chunk_delay: None,
            disconnect_after_digs: None,
        }
    }
}

/// A chunk filled entirely with one block.
pub fn uniform_chunk(block: BlockId) -> Vec<BlockId> {
    vec![block; CHUNK_VOLUME]
}

/// Hot-bar loadout with one wooden tool of each mining category.
pub fn standard_kit() -> Vec<SlotData> {
    let tool = |index: u16, item: &str, durability: u32| SlotData {
        index,
        item: Some(item.to_string()),
        count: 1,
        durability,
    };
    vec![
        tool(0, "wooden_pickaxe", 59),
        tool(1, "wooden_shovel", 59),
        tool(2, "wooden_axe", 59),
    ]
}

/// Scriptable single-connection game server.
pub struct MockServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Serverbound>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Bind a local port and start serving the script.
    pub async fn spawn(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(serve(listener, config, Arc::clone(&received)));
        Ok(Self {
            addr,
            received,
            task,
        })
    }

    /// Address to hand to `Session::connect`.
    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Every serverbound packet recorded so far, in arrival order.
    pub fn received(&self) -> Vec<Serverbound> {
        self.received
            .lock()
            .expect("mock server lock poisoned")
            .clone()
    }

    /// Just the dig actions, in arrival order.
    pub fn dig_actions(&self) -> Vec<(DigActionKind, BlockPos)> {
        self.received()
            .into_iter()
            .filter_map(|packet| match packet {
                Serverbound::DigAction { action, pos } => Some((action, pos)),
                _ => None,
            })
            .collect()
    }

    /// Stop serving.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn serve(
    listener: TcpListener,
    config: MockServerConfig,
    received: Arc<Mutex<Vec<Serverbound>>>,
) {
    let (stream, peer) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(err) => {
            debug!("mock accept failed: {err}");
            return;
        }
    };
    debug!(%peer, "mock server accepted connection");
    if let Err(err) = handle_client(stream, config, received).await {
        debug!("mock connection ended: {err}");
    }
}

async fn handle_client(
    mut stream: TcpStream,
    config: MockServerConfig,
    received: Arc<Mutex<Vec<Serverbound>>>,
) -> Result<()> {
    let mut buffer = FrameBuffer::new();

    let packet = read_packet(&mut stream, &mut buffer, Phase::Handshake, &received).await?;
    anyhow::ensure!(
        matches!(packet, Serverbound::Handshake { .. }),
        "expected Handshake, got {packet:?}"
    );

    let packet = read_packet(&mut stream, &mut buffer, Phase::Login, &received).await?;
    let username = match packet {
        Serverbound::LoginStart { username, .. } => username,
        other => anyhow::bail!("expected LoginStart, got {other:?}"),
    };

    if let Some(reason) = config.reject_login {
        send(&mut stream, &Clientbound::LoginRejected { reason }).await?;
        return Ok(());
    }

    send(
        &mut stream,
        &Clientbound::LoginSuccess {
            session_id: config.session_id,
            username,
        },
    )
    .await?;
    send(
        &mut stream,
        &Clientbound::WindowItems {
            slots: config.slots.clone(),
        },
    )
    .await?;
    if config.chunk_delay.is_none() {
        stream_chunks(&mut stream, &config.chunks).await?;
    }

    let mut keepalive = config.keepalive_interval.map(tokio::time::interval);
    let mut chunk_delay = config.chunk_delay.map(|delay| {
        let mut timer = tokio::time::interval(delay);
        timer.reset();
        timer
    });
    let mut next_keepalive_id = 1u64;
    let mut confirmed_digs = 0u32;
    let mut read_buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = tick(&mut keepalive) => {
                send(&mut stream, &Clientbound::KeepAlive { id: next_keepalive_id }).await?;
                next_keepalive_id += 1;
            }
            _ = tick(&mut chunk_delay) => {
                stream_chunks(&mut stream, &config.chunks).await?;
                chunk_delay = None;
            }
            read = stream.read(&mut read_buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                buffer.extend(&read_buf[..n]);
                while let Some(packet) = buffer.next_serverbound(Phase::Play)? {
                    received
                        .lock()
                        .expect("mock server lock poisoned")
                        .push(packet.clone());
                    match packet {
                        Serverbound::DigAction {
                            action: DigActionKind::Finish,
                            pos,
                        } if config.confirm_digs => {
                            send(
                                &mut stream,
                                &Clientbound::BlockChange {
                                    pos,
                                    block: BLOCK_AIR,
                                    state: 0,
                                },
                            )
                            .await?;
                            confirmed_digs += 1;
                            if config.disconnect_after_digs == Some(confirmed_digs) {
                                send(
                                    &mut stream,
                                    &Clientbound::Disconnect {
                                        reason: "scripted disconnect".to_string(),
                                    },
                                )
                                .await?;
                                return Ok(());
                            }
                        }
                        Serverbound::Disconnect { .. } => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }
}

async fn stream_chunks(stream: &mut TcpStream, chunks: &[ChunkSpec]) -> Result<()> {
    for chunk in chunks {
        let payload = encode_chunk_payload(chunk.x, chunk.z, &chunk.blocks)?;
        send(stream, &Clientbound::ChunkData(payload)).await?;
    }
    Ok(())
}

async fn send(stream: &mut TcpStream, packet: &Clientbound) -> Result<()> {
    stream.write_all(&encode_clientbound(packet)).await?;
    Ok(())
}

async fn read_packet(
    stream: &mut TcpStream,
    buffer: &mut FrameBuffer,
    phase: Phase,
    received: &Arc<Mutex<Vec<Serverbound>>>,
) -> Result<Serverbound> {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(packet) = buffer.next_serverbound(phase)? {
            received
                .lock()
                .expect("mock server lock poisoned")
                .push(packet.clone());
            return Ok(packet);
        }
        let n = stream.read(&mut chunk).await?;
        anyhow::ensure!(n > 0, "client closed during {phase:?}");
        buffer.extend(&chunk[..n]);
    }
}

/// Awaits the next keep-alive tick, or forever when pings are disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
