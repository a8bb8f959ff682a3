//! A loaded chunk column.

use quarry_core::{
    BlockId, StateBits, BLOCK_AIR, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME,
};

/// One 16x256x16 column of block state.
///
/// Blocks and state bits live in flat arrays indexed `(y * 16 + z) * 16 + x`.
/// State bits arrive only through block-change packets; chunk loads reset
/// them to zero.
#[derive(Debug, Clone)]
pub struct ChunkColumn {
    blocks: Vec<BlockId>,
    states: Vec<StateBits>,
}

impl ChunkColumn {
    /// Build a column from a decoded flat block array.
    ///
    /// Panics if the array is not exactly one chunk volume; the codec layer
    /// guarantees the size before handing data over.
    pub fn from_blocks(blocks: Vec<BlockId>) -> Self {
        assert_eq!(blocks.len(), CHUNK_VOLUME, "chunk data must be one volume");
        Self {
            blocks,
            states: vec![0; CHUNK_VOLUME],
        }
    }

    /// An all-air column.
    pub fn empty() -> Self {
        Self::from_blocks(vec![BLOCK_AIR; CHUNK_VOLUME])
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE_X);
        debug_assert!(y < CHUNK_SIZE_Y);
        debug_assert!(z < CHUNK_SIZE_Z);
        (y * CHUNK_SIZE_Z + z) * CHUNK_SIZE_X + x
    }

    /// Block id and state bits at a chunk-local position.
    pub fn get(&self, x: usize, y: usize, z: usize) -> (BlockId, StateBits) {
        let i = Self::index(x, y, z);
        (self.blocks[i], self.states[i])
    }

    /// Overwrite a chunk-local position.
    pub fn set(&mut self, x: usize, y: usize, z: usize, block: BlockId, state: StateBits) {
        let i = Self::index(x, y, z);
        self.blocks[i] = block;
        self.states[i] = state;
    }

    /// Whether a chunk-local position holds air.
    pub fn is_air(&self, x: usize, y: usize, z: usize) -> bool {
        self.blocks[Self::index(x, y, z)] == BLOCK_AIR
    }
}
