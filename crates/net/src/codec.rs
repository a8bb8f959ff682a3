//! Frame-level encoding and decoding.
//!
//! Frame format: [length: VarInt][packet id: VarInt][payload]. The length
//! covers the id and payload. Decoding a partial buffer reports "need more
//! data" (`Ok(None)`) rather than failing; all actual failures are typed
//! [`DecodeError`]s and poison the connection.

use crate::error::DecodeError;
use crate::packet::{Clientbound, Phase, Serverbound};
use crate::wire::{WireReader, WireWriter, MAX_VARINT_BYTES};

/// Maximum frame size the codec will accept, generously above the largest
/// legitimate chunk packet.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Encode a serverbound packet into a complete frame.
pub fn encode_serverbound(packet: &Serverbound) -> Vec<u8> {
    encode_frame(packet.id(), |w| packet.write_payload(w))
}

/// Encode a clientbound packet into a complete frame.
pub fn encode_clientbound(packet: &Clientbound) -> Vec<u8> {
    encode_frame(packet.id(), |w| packet.write_payload(w))
}

fn encode_frame(id: u32, write_payload: impl FnOnce(&mut WireWriter)) -> Vec<u8> {
    let mut body = WireWriter::new();
    body.write_varint(id);
    write_payload(&mut body);
    let body = body.into_inner();

    let mut frame = WireWriter::new();
    frame.write_varint(body.len() as u32);
    let mut out = frame.into_inner();
    out.extend_from_slice(&body);
    out
}

/// Decode one clientbound packet from the front of `buf`.
///
/// Returns `Ok(Some((packet, consumed)))` for a complete frame, `Ok(None)`
/// when more bytes are needed, and a [`DecodeError`] for malformed input.
pub fn decode_clientbound(
    buf: &[u8],
    phase: Phase,
) -> Result<Option<(Clientbound, usize)>, DecodeError> {
    decode_frame(buf, |payload| {
        let mut r = WireReader::new(payload);
        let id = r.read_varint("packet id")?;
        let packet = Clientbound::read_payload(phase, id, &mut r)?;
        finish(r.remaining())?;
        Ok(packet)
    })
}

/// Decode one serverbound packet from the front of `buf`.
pub fn decode_serverbound(
    buf: &[u8],
    phase: Phase,
) -> Result<Option<(Serverbound, usize)>, DecodeError> {
    decode_frame(buf, |payload| {
        let mut r = WireReader::new(payload);
        let id = r.read_varint("packet id")?;
        let packet = Serverbound::read_payload(phase, id, &mut r)?;
        finish(r.remaining())?;
        Ok(packet)
    })
}

fn finish(remaining: usize) -> Result<(), DecodeError> {
    if remaining != 0 {
        return Err(DecodeError::TrailingBytes(remaining));
    }
    Ok(())
}

fn decode_frame<T>(
    buf: &[u8],
    decode_payload: impl FnOnce(&[u8]) -> Result<T, DecodeError>,
) -> Result<Option<(T, usize)>, DecodeError> {
    let (len, header) = match read_frame_len(buf)? {
        Some(parsed) => parsed,
        None => return Ok(None),
    };
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    if buf.len() < header + len {
        return Ok(None);
    }
    let payload = &buf[header..header + len];
    let packet = decode_payload(payload)?;
    Ok(Some((packet, header + len)))
}

/// Parse the frame length prefix. `Ok(None)` means the varint itself is
/// incomplete.
fn read_frame_len(buf: &[u8]) -> Result<Option<(usize, usize)>, DecodeError> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_BYTES {
        let byte = match buf.get(i) {
            Some(&b) => b,
            None => return Ok(None),
        };
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            if i == MAX_VARINT_BYTES - 1 && byte > 0x0F {
                return Err(DecodeError::VarIntTooLong {
                    max: MAX_VARINT_BYTES,
                });
            }
            return Ok(Some((value as usize, i + 1)));
        }
    }
    Err(DecodeError::VarIntTooLong {
        max: MAX_VARINT_BYTES,
    })
}

/// Accumulates stream bytes and pops complete packets.
///
/// One instance per connection direction; the session's read task feeds it
/// from the socket.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pop the next complete clientbound packet, if one is buffered.
    pub fn next_clientbound(&mut self, phase: Phase) -> Result<Option<Clientbound>, DecodeError> {
        match decode_clientbound(&self.buf, phase)? {
            Some((packet, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }

    /// Pop the next complete serverbound packet, if one is buffered.
    pub fn next_serverbound(&mut self, phase: Phase) -> Result<Option<Serverbound>, DecodeError> {
        match decode_serverbound(&self.buf, phase)? {
            Some((packet, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{compute_schema_hash, DigActionKind, SlotData, PROTOCOL_VERSION};
    use quarry_core::BlockPos;

    fn roundtrip_serverbound(packet: Serverbound) {
        let frame = encode_serverbound(&packet);
        let (decoded, consumed) = decode_serverbound(&frame, packet.phase())
            .expect("decode should succeed")
            .expect("frame is complete");
        assert_eq!(decoded, packet);
        assert_eq!(consumed, frame.len());
    }

    fn roundtrip_clientbound(packet: Clientbound) {
        let frame = encode_clientbound(&packet);
        let (decoded, consumed) = decode_clientbound(&frame, packet.phase())
            .expect("decode should succeed")
            .expect("frame is complete");
        assert_eq!(decoded, packet);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_roundtrip_every_serverbound_variant() {
        roundtrip_serverbound(Serverbound::Handshake {
            protocol_version: PROTOCOL_VERSION,
            schema_hash: compute_schema_hash(),
        });
        roundtrip_serverbound(Serverbound::LoginStart {
            username: "digger".to_string(),
            client_id: 0xDEADBEEF,
            token: None,
        });
        roundtrip_serverbound(Serverbound::LoginStart {
            username: "digger".to_string(),
            client_id: 1,
            token: Some("session-token".to_string()),
        });
        roundtrip_serverbound(Serverbound::KeepAlive { id: u64::MAX });
        roundtrip_serverbound(Serverbound::Look { yaw: 128, pitch: 192 });
        roundtrip_serverbound(Serverbound::DigAction {
            action: DigActionKind::Start,
            pos: BlockPos::new(-5, 64, 12),
        });
        roundtrip_serverbound(Serverbound::HeldSlotChange { slot: 3 });
        roundtrip_serverbound(Serverbound::Disconnect {
            reason: "closing".to_string(),
        });
    }

    #[test]
    fn test_roundtrip_every_clientbound_variant() {
        roundtrip_clientbound(Clientbound::LoginSuccess {
            session_id: 42,
            username: "digger".to_string(),
        });
        roundtrip_clientbound(Clientbound::LoginRejected {
            reason: "full".to_string(),
        });
        roundtrip_clientbound(Clientbound::KeepAlive { id: 7 });
        roundtrip_clientbound(Clientbound::ChunkData(crate::chunk_encoding::encode_chunk_payload(
            0,
            0,
            &vec![1u16; quarry_core::CHUNK_VOLUME],
        )
        .expect("encode chunk")));
        roundtrip_clientbound(Clientbound::UnloadChunk {
            chunk_x: -3,
            chunk_z: 9,
        });
        roundtrip_clientbound(Clientbound::BlockChange {
            pos: BlockPos::new(1, 2, 3),
            block: 1,
            state: 0,
        });
        roundtrip_clientbound(Clientbound::SetSlot {
            slot: SlotData {
                index: 0,
                item: Some("wooden_pickaxe".to_string()),
                count: 1,
                durability: 59,
            },
        });
        roundtrip_clientbound(Clientbound::WindowItems {
            slots: vec![SlotData::empty(0), SlotData::empty(1)],
        });
        roundtrip_clientbound(Clientbound::Disconnect {
            reason: "shutting down".to_string(),
        });
    }

    #[test]
    fn test_partial_frame_needs_more_data() {
        let frame = encode_serverbound(&Serverbound::KeepAlive { id: 9 });
        for cut in 0..frame.len() {
            let result = decode_serverbound(&frame[..cut], Phase::Play)
                .expect("partial frames are not an error");
            assert!(result.is_none(), "cut at {cut} should need more data");
        }
    }

    #[test]
    fn test_out_of_phase_packet_rejected() {
        // A DigAction is a Play packet; decoding it during Handshake must fail
        // with a phase error, not silently misparse.
        let frame = encode_serverbound(&Serverbound::DigAction {
            action: DigActionKind::Start,
            pos: BlockPos::new(0, 0, 0),
        });
        let result = decode_serverbound(&frame, Phase::Handshake);
        assert_eq!(
            result,
            Err(DecodeError::OutOfPhase {
                id: 0x02,
                phase: Phase::Handshake,
            })
        );
    }

    #[test]
    fn test_unknown_id_rejected() {
        let mut body = WireWriter::new();
        body.write_varint(0x3F);
        let body = body.into_inner();
        let mut frame = WireWriter::new();
        frame.write_varint(body.len() as u32);
        let mut bytes = frame.into_inner();
        bytes.extend_from_slice(&body);

        let result = decode_clientbound(&bytes, Phase::Play);
        assert_eq!(
            result,
            Err(DecodeError::UnknownPacketId {
                id: 0x3F,
                phase: Phase::Play,
            })
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut w = WireWriter::new();
        w.write_varint((MAX_FRAME_LEN + 1) as u32);
        let result = decode_clientbound(&w.into_inner(), Phase::Play);
        assert!(matches!(result, Err(DecodeError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        // Hand-build a KeepAlive frame with an extra byte inside the payload.
        let mut body = WireWriter::new();
        body.write_varint(0x00);
        body.write_u64(1);
        body.write_u8(0xAA);
        let body = body.into_inner();
        let mut frame = WireWriter::new();
        frame.write_varint(body.len() as u32);
        let mut bytes = frame.into_inner();
        bytes.extend_from_slice(&body);

        let result = decode_clientbound(&bytes, Phase::Play);
        assert_eq!(result, Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_frame_buffer_reassembles_split_frames() {
        let first = encode_clientbound(&Clientbound::KeepAlive { id: 1 });
        let second = encode_clientbound(&Clientbound::BlockChange {
            pos: BlockPos::new(4, 60, 4),
            block: 0,
            state: 0,
        });
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let mut buffer = FrameBuffer::new();
        let mut decoded = Vec::new();
        // Feed one byte at a time; packets must pop out exactly twice.
        for &byte in &stream {
            buffer.extend(&[byte]);
            while let Some(packet) = buffer
                .next_clientbound(Phase::Play)
                .expect("stream is well formed")
            {
                decoded.push(packet);
            }
        }
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], Clientbound::KeepAlive { id: 1 });
        assert!(buffer.is_empty());
    }
}
