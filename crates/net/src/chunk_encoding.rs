//! Chunk data encoding with palette and RLE compression.
//!
//! Chunk columns travel as a palette of unique block ids plus RLE-compressed
//! palette indices, validated by a CRC32.

use crate::error::DecodeError;
use crate::packet::{ChunkDataPacket, MAX_PALETTE_SIZE};
use anyhow::Result;
use quarry_core::{BlockId, CHUNK_VOLUME};
use std::collections::HashMap;

/// Encode a chunk column for transmission.
///
/// Process:
/// 1. Build palette of unique block IDs in the chunk
/// 2. Replace block IDs with palette indices
/// 3. Run-length encode the palette indices
/// 4. Calculate CRC32 for validation
pub fn encode_chunk_payload(
    chunk_x: i32,
    chunk_z: i32,
    block_data: &[BlockId],
) -> Result<ChunkDataPacket> {
    if block_data.len() != CHUNK_VOLUME {
        return Err(anyhow::anyhow!(
            "invalid chunk data size: expected {CHUNK_VOLUME}, got {}",
            block_data.len()
        ));
    }

    let (palette, indices) = build_palette(block_data)?;
    let compressed_data = rle_compress(&indices);
    let crc32 = calculate_crc32(&palette, &compressed_data);

    Ok(ChunkDataPacket {
        chunk_x,
        chunk_z,
        palette,
        compressed_data,
        crc32,
    })
}

/// Decode a chunk column payload back into a flat block array.
pub fn decode_chunk_payload(packet: &ChunkDataPacket) -> Result<Vec<BlockId>, DecodeError> {
    let expected = calculate_crc32(&packet.palette, &packet.compressed_data);
    if packet.crc32 != expected {
        return Err(DecodeError::ChecksumMismatch {
            expected,
            actual: packet.crc32,
        });
    }

    let indices = rle_decompress(&packet.compressed_data)?;
    if indices.len() != CHUNK_VOLUME {
        return Err(DecodeError::BadChunkData("decompressed size mismatch"));
    }

    let mut block_data = Vec::with_capacity(CHUNK_VOLUME);
    for &index in &indices {
        match packet.palette.get(index as usize) {
            Some(&id) => block_data.push(id),
            None => return Err(DecodeError::BadChunkData("palette index out of range")),
        }
    }
    Ok(block_data)
}

/// Build palette and convert block IDs to palette indices.
fn build_palette(block_data: &[BlockId]) -> Result<(Vec<BlockId>, Vec<u8>)> {
    let mut palette = Vec::new();
    let mut palette_map: HashMap<BlockId, u8> = HashMap::new();
    let mut indices = Vec::with_capacity(block_data.len());

    for &block_id in block_data {
        let index = match palette_map.get(&block_id) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return Err(anyhow::anyhow!(
                        "chunk exceeds {MAX_PALETTE_SIZE} unique block types"
                    ));
                }
                let idx = palette.len() as u8;
                palette.push(block_id);
                palette_map.insert(block_id, idx);
                idx
            }
        };
        indices.push(index);
    }

    Ok((palette, indices))
}

/// Run-length encode a sequence of bytes.
///
/// Format: a control byte >= 128 means a run of (control - 128) copies of the
/// next byte; a control byte < 128 means that many literal bytes follow.
fn rle_compress(data: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let current = data[i];
        let mut run_length = 1;
        while i + run_length < data.len() && data[i + run_length] == current && run_length < 127 {
            run_length += 1;
        }

        if run_length >= 3 {
            compressed.push(128 + run_length as u8);
            compressed.push(current);
            i += run_length;
        } else {
            let mut literal_length = 1;
            while i + literal_length < data.len() && literal_length < 127 {
                // Stop the literal before an upcoming run.
                if i + literal_length + 2 < data.len()
                    && data[i + literal_length] == data[i + literal_length + 1]
                    && data[i + literal_length] == data[i + literal_length + 2]
                {
                    break;
                }
                literal_length += 1;
            }
            compressed.push(literal_length as u8);
            compressed.extend_from_slice(&data[i..i + literal_length]);
            i += literal_length;
        }
    }

    compressed
}

/// Run-length decode with an output cap of one chunk volume, so hostile
/// payloads cannot balloon memory.
fn rle_decompress(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decompressed = Vec::with_capacity(CHUNK_VOLUME.min(compressed.len() * 127));
    let mut i = 0;

    while i < compressed.len() {
        let control = compressed[i];
        i += 1;

        if control >= 128 {
            let length = (control - 128) as usize;
            if i >= compressed.len() {
                return Err(DecodeError::BadChunkData("truncated RLE run"));
            }
            let value = compressed[i];
            i += 1;

            if decompressed.len() + length > CHUNK_VOLUME {
                return Err(DecodeError::BadChunkData("RLE output exceeds chunk volume"));
            }
            decompressed.extend(std::iter::repeat(value).take(length));
        } else {
            let length = control as usize;
            if i + length > compressed.len() {
                return Err(DecodeError::BadChunkData("truncated RLE literal"));
            }
            if decompressed.len() + length > CHUNK_VOLUME {
                return Err(DecodeError::BadChunkData("RLE output exceeds chunk volume"));
            }
            decompressed.extend_from_slice(&compressed[i..i + length]);
            i += length;
        }
    }

    Ok(decompressed)
}

/// Calculate CRC32 checksum for chunk data.
fn calculate_crc32(palette: &[BlockId], compressed_data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for &block_id in palette {
        hasher.update(&block_id.to_le_bytes());
    }
    hasher.update(compressed_data);
    hasher.finalize()
}
