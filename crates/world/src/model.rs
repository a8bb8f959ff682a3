//! Sparse chunked store of known block state.
//!
//! The model is fed exclusively from inbound packets; nothing here guesses at
//! undisclosed terrain. Memory stays bounded two ways: chunks outside a
//! radius of the agent are evicted on position updates, and an LRU cap is the
//! backstop when a server streams more chunks than expected.

use crate::chunk::ChunkColumn;
use lru::LruCache;
use quarry_core::{BlockId, BlockPos, ChunkPos, StateBits, BLOCK_AIR};
use quarry_net::{decode_chunk_payload, Clientbound, DecodeError};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

/// Result of a block query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockQuery {
    /// The containing chunk is loaded; this is the last state the server
    /// disclosed.
    Known(BlockInfo),
    /// The containing chunk has not been loaded (or was evicted/unloaded).
    Unloaded,
}

impl BlockQuery {
    /// Whether the block is known to be air.
    pub fn is_known_air(&self) -> bool {
        matches!(self, BlockQuery::Known(info) if info.id == BLOCK_AIR)
    }

    /// Whether the block is known and something other than air.
    pub fn is_known_solid(&self) -> bool {
        matches!(self, BlockQuery::Known(info) if info.id != BLOCK_AIR)
    }
}

/// Known state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Material id per the registry.
    pub id: BlockId,
    /// Metadata bits.
    pub state: StateBits,
}

/// Memory policy knobs for the chunk table.
#[derive(Debug, Clone)]
pub struct WorldOptions {
    /// Chebyshev radius (in chunks) around the agent kept resident.
    pub eviction_radius: u32,
    /// Hard cap on resident chunks.
    pub max_chunks: usize,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            eviction_radius: 8,
            max_chunks: 1024,
        }
    }
}

/// In-memory chunk table.
/// Uses BTreeMap for deterministic iteration order.
pub struct WorldModel {
    chunks: BTreeMap<ChunkPos, ChunkColumn>,
    lru: LruCache<ChunkPos, ()>,
    options: WorldOptions,
    center: ChunkPos,
}

impl WorldModel {
    /// Create an empty model with the given memory policy.
    pub fn new(options: WorldOptions) -> Self {
        let cap = NonZeroUsize::new(options.max_chunks.max(1)).expect("cap is at least 1");
        Self {
            chunks: BTreeMap::new(),
            lru: LruCache::new(cap),
            options,
            center: ChunkPos::new(0, 0),
        }
    }

    /// Ingest one inbound packet. Returns whether any block state changed.
    ///
    /// A checksum or palette failure poisons the connection; the caller is
    /// expected to tear the session down.
    pub fn apply(&mut self, packet: &Clientbound) -> Result<bool, DecodeError> {
        match packet {
            Clientbound::ChunkData(chunk) => {
                let pos = ChunkPos::new(chunk.chunk_x, chunk.chunk_z);
                let blocks = decode_chunk_payload(chunk)?;
                self.chunks.insert(pos, ChunkColumn::from_blocks(blocks));
                self.lru.put(pos, ());
                self.evict_over_capacity();
                debug!(%pos, resident = self.chunks.len(), "chunk loaded");
                Ok(true)
            }
            Clientbound::UnloadChunk { chunk_x, chunk_z } => {
                let pos = ChunkPos::new(*chunk_x, *chunk_z);
                let removed = self.chunks.remove(&pos).is_some();
                self.lru.pop(&pos);
                if removed {
                    debug!(%pos, "chunk unloaded");
                }
                Ok(removed)
            }
            Clientbound::BlockChange { pos, block, state } => {
                if !pos.in_world_height() {
                    return Ok(false);
                }
                let chunk_pos = pos.chunk();
                match self.chunks.get_mut(&chunk_pos) {
                    Some(column) => {
                        column.set(pos.local_x(), pos.y as usize, pos.local_z(), *block, *state);
                        self.lru.put(chunk_pos, ());
                        trace!(%pos, block, "block change");
                        Ok(true)
                    }
                    // Updates for chunks the server never sent are dropped.
                    None => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    /// Last disclosed state of a block, or Unloaded if its chunk is absent.
    pub fn block_at(&self, pos: BlockPos) -> BlockQuery {
        match self.chunks.get(&pos.chunk()) {
            Some(column) => {
                if !pos.in_world_height() {
                    // Above and below the column there is nothing to dig.
                    return BlockQuery::Known(BlockInfo {
                        id: BLOCK_AIR,
                        state: 0,
                    });
                }
                let (id, state) = column.get(pos.local_x(), pos.y as usize, pos.local_z());
                BlockQuery::Known(BlockInfo { id, state })
            }
            None => BlockQuery::Unloaded,
        }
    }

    /// Whether a chunk column is resident.
    pub fn is_loaded(&self, chunk: ChunkPos) -> bool {
        self.chunks.contains_key(&chunk)
    }

    /// Number of resident chunks.
    pub fn loaded_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Update the agent position and evict chunks outside the radius.
    pub fn set_center(&mut self, pos: BlockPos) {
        self.center = pos.chunk();
        let radius = self.options.eviction_radius;
        let center = self.center;
        let evicted: Vec<ChunkPos> = self
            .chunks
            .keys()
            .filter(|chunk| chunk.chebyshev_distance(center) > radius)
            .copied()
            .collect();
        for chunk in evicted {
            self.chunks.remove(&chunk);
            self.lru.pop(&chunk);
            debug!(%chunk, "chunk evicted outside radius");
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.chunks.len() > self.options.max_chunks {
            match self.lru.pop_lru() {
                Some((chunk, ())) => {
                    self.chunks.remove(&chunk);
                    debug!(%chunk, "chunk evicted over capacity");
                }
                None => break,
            }
        }
    }
}
