//! Typed errors for the wire codec and session transport.

use crate::packet::Phase;
use std::time::Duration;
use thiserror::Error;

/// Error produced while decoding inbound frames.
///
/// Any of these is fatal for the connection (the stream can no longer be
/// trusted to be aligned on frame boundaries) but not for the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A varint ran past its maximum encoded width.
    #[error("varint exceeds {max} bytes")]
    VarIntTooLong {
        /// Maximum permitted encoded width.
        max: usize,
    },

    /// Frame length prefix exceeds the protocol limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Claimed frame length.
        len: usize,
        /// Protocol frame size limit.
        max: usize,
    },

    /// Payload ended before a field could be read.
    #[error("unexpected end of payload reading {field}")]
    UnexpectedEof {
        /// Field being decoded when the payload ran out.
        field: &'static str,
    },

    /// Packet id is not defined anywhere in the protocol.
    #[error("unknown packet id {id} in {phase:?} phase")]
    UnknownPacketId {
        /// Offending packet id.
        id: u32,
        /// Phase the connection was in.
        phase: Phase,
    },

    /// Packet id belongs to a different protocol phase.
    #[error("packet id {id} is not valid in {phase:?} phase")]
    OutOfPhase {
        /// Offending packet id.
        id: u32,
        /// Phase the connection was in.
        phase: Phase,
    },

    /// String field longer than the protocol permits.
    #[error("string of {len} bytes exceeds limit of {max}")]
    StringTooLong {
        /// Claimed string length.
        len: usize,
        /// Protocol string size limit.
        max: usize,
    },

    /// String field is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidString,

    /// Collection field longer than the protocol permits.
    #[error("{what} count {len} exceeds limit of {max}")]
    CollectionTooLarge {
        /// Which collection overflowed.
        what: &'static str,
        /// Claimed element count.
        len: usize,
        /// Protocol element limit.
        max: usize,
    },

    /// Enum discriminant outside the defined range.
    #[error("invalid {what} discriminant {value}")]
    InvalidDiscriminant {
        /// Which enum field was malformed.
        what: &'static str,
        /// Value found on the wire.
        value: u8,
    },

    /// Chunk payload checksum does not match its contents.
    #[error("chunk checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum computed from the payload.
        expected: u32,
        /// Checksum carried in the packet.
        actual: u32,
    },

    /// Chunk payload is structurally malformed.
    #[error("malformed chunk payload: {0}")]
    BadChunkData(&'static str),

    /// Payload contained bytes past the end of the packet.
    #[error("{0} trailing bytes after packet payload")]
    TrailingBytes(usize),
}

/// Error produced while establishing a session. Fatal: the run aborts.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// TCP-level failure reaching the server.
    #[error("failed to connect to {addr}: {source}")]
    Io {
        /// Address we attempted to reach.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// A bounded wait elapsed.
    #[error("{what} timed out after {after:?}")]
    Timeout {
        /// Which stage timed out.
        what: &'static str,
        /// Configured bound.
        after: Duration,
    },

    /// Server refused the login.
    #[error("server rejected login: {reason}")]
    LoginRejected {
        /// Reason the server gave.
        reason: String,
    },

    /// The external token provider failed to produce credentials.
    #[error("failed to acquire session token: {reason}")]
    TokenAcquisition {
        /// Provider-reported failure.
        reason: String,
    },

    /// Malformed traffic during the login exchange.
    #[error("protocol error during login: {0}")]
    Protocol(#[from] DecodeError),

    /// Peer closed the stream before login completed.
    #[error("connection closed before login completed")]
    ClosedDuringLogin,

    /// Server answered the login with something unexpected.
    #[error("expected {expected} packet, got {got}")]
    UnexpectedPacket {
        /// Packet we were waiting for.
        expected: &'static str,
        /// Packet that actually arrived.
        got: &'static str,
    },
}
