//! Typed packet definitions for the excavation protocol.
//!
//! The protocol is phased: a connection starts in Handshake, moves to Login
//! after the client announces itself, and to Play once the server accepts the
//! login. Packet ids are scoped per phase and direction.

use crate::error::DecodeError;
use crate::wire::{WireReader, WireWriter};
use quarry_core::{BlockId, BlockPos, StateBits};
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u16 = 1;

/// Protocol magic bytes identifying the excavation protocol.
pub const PROTOCOL_MAGIC: &[u8; 8] = b"QRY\x00\x01\x00\x00\x00";

/// Maximum size of compressed chunk data (bytes).
/// 16KB is enough for typical chunks (avg ~500 bytes), allows for complex ones.
pub const MAX_CHUNK_DATA_LEN: usize = 16 * 1024;

/// Maximum palette size (unique block types per chunk).
/// 256 is the max since palette indices are u8.
pub const MAX_PALETTE_SIZE: usize = 256;

/// Maximum number of inventory slots in a window snapshot.
pub const MAX_WINDOW_SLOTS: usize = 64;

/// Compute the schema hash advertised during the handshake.
///
/// This hash is used to ensure client and server agree on the packet layout.
pub fn compute_schema_hash() -> u64 {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&PROTOCOL_VERSION.to_le_bytes());
    hasher.update(PROTOCOL_MAGIC);

    // Include message type names (deterministic)
    hasher.update(b"Serverbound");
    hasher.update(b"Clientbound");
    hasher.update(b"ChunkDataPacket");
    hasher.update(b"SlotData");
    hasher.update(b"DigActionKind");

    let hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[0..8].try_into().expect("8-byte prefix"))
}

/// Protocol phase the connection is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Initial version/schema exchange.
    Handshake,
    /// Identity exchange.
    Login,
    /// Steady-state gameplay traffic.
    Play,
}

/// Block-breaking action stages sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DigActionKind {
    /// Begin swinging at a block.
    Start = 0,
    /// Abandon an in-progress swing.
    Cancel = 1,
    /// Declare the break time elapsed.
    Finish = 2,
}

impl TryFrom<u8> for DigActionKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(DigActionKind::Start),
            1 => Ok(DigActionKind::Cancel),
            2 => Ok(DigActionKind::Finish),
            _ => Err(DecodeError::InvalidDiscriminant {
                what: "dig action",
                value,
            }),
        }
    }
}

/// One inventory slot as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotData {
    /// Slot index within the player window.
    pub index: u16,
    /// Item identifier, or None for an empty slot.
    pub item: Option<String>,
    /// Stack count.
    pub count: u8,
    /// Durability remaining (0 for non-tools).
    pub durability: u32,
}

impl SlotData {
    /// An empty slot at the given index.
    pub fn empty(index: u16) -> Self {
        Self {
            index,
            item: None,
            count: 0,
            durability: 0,
        }
    }

    fn write(&self, w: &mut WireWriter) {
        w.write_u16(self.index);
        w.write_option_string(self.item.as_deref());
        w.write_u8(self.count);
        w.write_u32(self.durability);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            index: r.read_u16("slot index")?,
            item: r.read_option_string("slot item")?,
            count: r.read_u8("slot count")?,
            durability: r.read_u32("slot durability")?,
        })
    }
}

/// Chunk column payload with palette + RLE compression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDataPacket {
    /// Chunk X coordinate.
    pub chunk_x: i32,
    /// Chunk Z coordinate.
    pub chunk_z: i32,
    /// Palette of unique block IDs in this chunk.
    pub palette: Vec<BlockId>,
    /// RLE-compressed palette indices.
    pub compressed_data: Vec<u8>,
    /// CRC32 checksum for validation.
    pub crc32: u32,
}

impl ChunkDataPacket {
    fn write(&self, w: &mut WireWriter) {
        w.write_i32(self.chunk_x);
        w.write_i32(self.chunk_z);
        w.write_varint(self.palette.len() as u32);
        for &id in &self.palette {
            w.write_u16(id);
        }
        w.write_bytes(&self.compressed_data);
        w.write_u32(self.crc32);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let chunk_x = r.read_i32("chunk x")?;
        let chunk_z = r.read_i32("chunk z")?;
        let palette_len = r.read_varint("palette count")? as usize;
        if palette_len > MAX_PALETTE_SIZE {
            return Err(DecodeError::CollectionTooLarge {
                what: "palette",
                len: palette_len,
                max: MAX_PALETTE_SIZE,
            });
        }
        let mut palette = Vec::with_capacity(palette_len);
        for _ in 0..palette_len {
            palette.push(r.read_u16("palette entry")?);
        }
        let compressed_data = r.read_bytes("chunk data", MAX_CHUNK_DATA_LEN)?;
        let crc32 = r.read_u32("chunk crc")?;
        Ok(Self {
            chunk_x,
            chunk_z,
            palette,
            compressed_data,
            crc32,
        })
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Serverbound {
    /// Version/schema announcement; moves the connection to Login.
    Handshake {
        /// Protocol version.
        protocol_version: u16,
        /// Schema hash for compatibility.
        schema_hash: u64,
    },

    /// Identity announcement; answered with LoginSuccess or LoginRejected.
    LoginStart {
        /// Player name to join as.
        username: String,
        /// Client-derived stable identity.
        client_id: u64,
        /// Session token for online-mode servers.
        token: Option<String>,
    },

    /// Echo of a server liveness ping.
    KeepAlive {
        /// Ping identifier being echoed.
        id: u64,
    },

    /// Orient the player camera (quantized to 256 steps).
    Look {
        /// Yaw angle step.
        yaw: u8,
        /// Pitch angle step.
        pitch: u8,
    },

    /// Block-breaking action.
    DigAction {
        /// Stage of the dig.
        action: DigActionKind,
        /// Target block.
        pos: BlockPos,
    },

    /// Switch the held hot-bar slot.
    HeldSlotChange {
        /// Hot-bar slot index.
        slot: u8,
    },

    /// Client-initiated disconnect notification.
    Disconnect {
        /// Reason for disconnect.
        reason: String,
    },
}

impl Serverbound {
    /// Phase this packet belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            Serverbound::Handshake { .. } => Phase::Handshake,
            Serverbound::LoginStart { .. } => Phase::Login,
            _ => Phase::Play,
        }
    }

    /// Packet id within its phase.
    pub fn id(&self) -> u32 {
        match self {
            Serverbound::Handshake { .. } => 0x00,
            Serverbound::LoginStart { .. } => 0x00,
            Serverbound::KeepAlive { .. } => 0x00,
            Serverbound::Look { .. } => 0x01,
            Serverbound::DigAction { .. } => 0x02,
            Serverbound::HeldSlotChange { .. } => 0x03,
            Serverbound::Disconnect { .. } => 0x04,
        }
    }

    /// Human-readable packet name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Serverbound::Handshake { .. } => "Handshake",
            Serverbound::LoginStart { .. } => "LoginStart",
            Serverbound::KeepAlive { .. } => "KeepAlive",
            Serverbound::Look { .. } => "Look",
            Serverbound::DigAction { .. } => "DigAction",
            Serverbound::HeldSlotChange { .. } => "HeldSlotChange",
            Serverbound::Disconnect { .. } => "Disconnect",
        }
    }

    pub(crate) fn write_payload(&self, w: &mut WireWriter) {
        match self {
            Serverbound::Handshake {
                protocol_version,
                schema_hash,
            } => {
                w.write_u16(*protocol_version);
                w.write_u64(*schema_hash);
            }
            Serverbound::LoginStart {
                username,
                client_id,
                token,
            } => {
                w.write_string(username);
                w.write_u64(*client_id);
                w.write_option_string(token.as_deref());
            }
            Serverbound::KeepAlive { id } => w.write_u64(*id),
            Serverbound::Look { yaw, pitch } => {
                w.write_u8(*yaw);
                w.write_u8(*pitch);
            }
            Serverbound::DigAction { action, pos } => {
                w.write_u8(*action as u8);
                w.write_block_pos(*pos);
            }
            Serverbound::HeldSlotChange { slot } => w.write_u8(*slot),
            Serverbound::Disconnect { reason } => w.write_string(reason),
        }
    }

    pub(crate) fn read_payload(
        phase: Phase,
        id: u32,
        r: &mut WireReader<'_>,
    ) -> Result<Self, DecodeError> {
        match (phase, id) {
            (Phase::Handshake, 0x00) => Ok(Serverbound::Handshake {
                protocol_version: r.read_u16("protocol version")?,
                schema_hash: r.read_u64("schema hash")?,
            }),
            (Phase::Login, 0x00) => Ok(Serverbound::LoginStart {
                username: r.read_string("username")?,
                client_id: r.read_u64("client id")?,
                token: r.read_option_string("token")?,
            }),
            (Phase::Play, 0x00) => Ok(Serverbound::KeepAlive {
                id: r.read_u64("keepalive id")?,
            }),
            (Phase::Play, 0x01) => Ok(Serverbound::Look {
                yaw: r.read_u8("yaw")?,
                pitch: r.read_u8("pitch")?,
            }),
            (Phase::Play, 0x02) => Ok(Serverbound::DigAction {
                action: DigActionKind::try_from(r.read_u8("dig action")?)?,
                pos: r.read_block_pos("dig target")?,
            }),
            (Phase::Play, 0x03) => Ok(Serverbound::HeldSlotChange {
                slot: r.read_u8("held slot")?,
            }),
            (Phase::Play, 0x04) => Ok(Serverbound::Disconnect {
                reason: r.read_string("disconnect reason")?,
            }),
            _ => Err(classify_unknown(id, phase, SERVERBOUND_IDS)),
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clientbound {
    /// Login accepted; moves the connection to Play.
    LoginSuccess {
        /// Server-assigned session identity.
        session_id: u64,
        /// Canonical username the server registered.
        username: String,
    },

    /// Login refused; the server will close the connection.
    LoginRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// Liveness ping; must be echoed within the keep-alive window.
    KeepAlive {
        /// Ping identifier to echo.
        id: u64,
    },

    /// Chunk column load.
    ChunkData(ChunkDataPacket),

    /// Chunk column unload.
    UnloadChunk {
        /// Chunk X coordinate.
        chunk_x: i32,
        /// Chunk Z coordinate.
        chunk_z: i32,
    },

    /// Single block update.
    BlockChange {
        /// Affected position.
        pos: BlockPos,
        /// New block id.
        block: BlockId,
        /// New state bits.
        state: StateBits,
    },

    /// Single inventory slot update.
    SetSlot {
        /// Updated slot contents.
        slot: SlotData,
    },

    /// Full inventory window snapshot.
    WindowItems {
        /// All slot contents.
        slots: Vec<SlotData>,
    },

    /// Server-initiated disconnect notification.
    Disconnect {
        /// Reason for disconnect.
        reason: String,
    },
}

impl Clientbound {
    /// Phase this packet belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            Clientbound::LoginSuccess { .. } | Clientbound::LoginRejected { .. } => Phase::Login,
            _ => Phase::Play,
        }
    }

    /// Packet id within its phase.
    pub fn id(&self) -> u32 {
        match self {
            Clientbound::LoginSuccess { .. } => 0x00,
            Clientbound::LoginRejected { .. } => 0x01,
            Clientbound::KeepAlive { .. } => 0x00,
            Clientbound::ChunkData(_) => 0x01,
            Clientbound::UnloadChunk { .. } => 0x02,
            Clientbound::BlockChange { .. } => 0x03,
            Clientbound::SetSlot { .. } => 0x04,
            Clientbound::WindowItems { .. } => 0x05,
            Clientbound::Disconnect { .. } => 0x06,
        }
    }

    /// Human-readable packet name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Clientbound::LoginSuccess { .. } => "LoginSuccess",
            Clientbound::LoginRejected { .. } => "LoginRejected",
            Clientbound::KeepAlive { .. } => "KeepAlive",
            Clientbound::ChunkData(_) => "ChunkData",
            Clientbound::UnloadChunk { .. } => "UnloadChunk",
            Clientbound::BlockChange { .. } => "BlockChange",
            Clientbound::SetSlot { .. } => "SetSlot",
            Clientbound::WindowItems { .. } => "WindowItems",
            Clientbound::Disconnect { .. } => "Disconnect",
        }
    }

    pub(crate) fn write_payload(&self, w: &mut WireWriter) {
        match self {
            Clientbound::LoginSuccess {
                session_id,
                username,
            } => {
                w.write_u64(*session_id);
                w.write_string(username);
            }
            Clientbound::LoginRejected { reason } => w.write_string(reason),
            Clientbound::KeepAlive { id } => w.write_u64(*id),
            Clientbound::ChunkData(chunk) => chunk.write(w),
            Clientbound::UnloadChunk { chunk_x, chunk_z } => {
                w.write_i32(*chunk_x);
                w.write_i32(*chunk_z);
            }
            Clientbound::BlockChange { pos, block, state } => {
                w.write_block_pos(*pos);
                w.write_u16(*block);
                w.write_u16(*state);
            }
            Clientbound::SetSlot { slot } => slot.write(w),
            Clientbound::WindowItems { slots } => {
                w.write_varint(slots.len() as u32);
                for slot in slots {
                    slot.write(w);
                }
            }
            Clientbound::Disconnect { reason } => w.write_string(reason),
        }
    }

    pub(crate) fn read_payload(
        phase: Phase,
        id: u32,
        r: &mut WireReader<'_>,
    ) -> Result<Self, DecodeError> {
        match (phase, id) {
            (Phase::Login, 0x00) => Ok(Clientbound::LoginSuccess {
                session_id: r.read_u64("session id")?,
                username: r.read_string("username")?,
            }),
            (Phase::Login, 0x01) => Ok(Clientbound::LoginRejected {
                reason: r.read_string("rejection reason")?,
            }),
            (Phase::Play, 0x00) => Ok(Clientbound::KeepAlive {
                id: r.read_u64("keepalive id")?,
            }),
            (Phase::Play, 0x01) => Ok(Clientbound::ChunkData(ChunkDataPacket::read(r)?)),
            (Phase::Play, 0x02) => Ok(Clientbound::UnloadChunk {
                chunk_x: r.read_i32("chunk x")?,
                chunk_z: r.read_i32("chunk z")?,
            }),
            (Phase::Play, 0x03) => Ok(Clientbound::BlockChange {
                pos: r.read_block_pos("block pos")?,
                block: r.read_u16("block id")?,
                state: r.read_u16("state bits")?,
            }),
            (Phase::Play, 0x04) => Ok(Clientbound::SetSlot {
                slot: SlotData::read(r)?,
            }),
            (Phase::Play, 0x05) => {
                let count = r.read_varint("window slot count")? as usize;
                if count > MAX_WINDOW_SLOTS {
                    return Err(DecodeError::CollectionTooLarge {
                        what: "window slots",
                        len: count,
                        max: MAX_WINDOW_SLOTS,
                    });
                }
                let mut slots = Vec::with_capacity(count);
                for _ in 0..count {
                    slots.push(SlotData::read(r)?);
                }
                Ok(Clientbound::WindowItems { slots })
            }
            (Phase::Play, 0x06) => Ok(Clientbound::Disconnect {
                reason: r.read_string("disconnect reason")?,
            }),
            _ => Err(classify_unknown(id, phase, CLIENTBOUND_IDS)),
        }
    }
}

/// (phase, id) pairs defined for serverbound traffic.
const SERVERBOUND_IDS: &[(Phase, u32)] = &[
    (Phase::Handshake, 0x00),
    (Phase::Login, 0x00),
    (Phase::Play, 0x00),
    (Phase::Play, 0x01),
    (Phase::Play, 0x02),
    (Phase::Play, 0x03),
    (Phase::Play, 0x04),
];

/// (phase, id) pairs defined for clientbound traffic.
const CLIENTBOUND_IDS: &[(Phase, u32)] = &[
    (Phase::Login, 0x00),
    (Phase::Login, 0x01),
    (Phase::Play, 0x00),
    (Phase::Play, 0x01),
    (Phase::Play, 0x02),
    (Phase::Play, 0x03),
    (Phase::Play, 0x04),
    (Phase::Play, 0x05),
    (Phase::Play, 0x06),
];

/// An id defined in some other phase is a phase violation; anything else is
/// simply unknown.
fn classify_unknown(id: u32, phase: Phase, table: &[(Phase, u32)]) -> DecodeError {
    if table.iter().any(|&(p, i)| i == id && p != phase) {
        DecodeError::OutOfPhase { id, phase }
    } else {
        DecodeError::UnknownPacketId { id, phase }
    }
}
