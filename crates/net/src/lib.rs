#![warn(missing_docs)]
//! Wire codec and session transport for the excavation protocol.

pub mod auth;
pub mod chunk_encoding;
pub mod codec;
pub mod error;
pub mod packet;
pub mod session;

mod wire;

pub use auth::{derive_client_id, AuthScheme, OfflineAuth, OnlineAuth, Profile, TokenProvider};
pub use chunk_encoding::{decode_chunk_payload, encode_chunk_payload};
pub use codec::{
    decode_clientbound, decode_serverbound, encode_clientbound, encode_serverbound, FrameBuffer,
    MAX_FRAME_LEN,
};
pub use error::{ConnectError, DecodeError};
pub use packet::{
    compute_schema_hash, ChunkDataPacket, Clientbound, DigActionKind, Phase, Serverbound,
    SlotData, MAX_CHUNK_DATA_LEN, MAX_PALETTE_SIZE, MAX_WINDOW_SLOTS, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};
pub use session::{Session, SessionClosed, SessionOptions, SessionState};
