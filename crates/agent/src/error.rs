//! Per-goal failure taxonomy.
//!
//! None of these abort the run on their own: transient errors retry with
//! backoff, terminal ones fail the single goal and the planner moves on.
//! Only a lost session escalates to a run-level abort.

use quarry_core::{BlockPos, ChunkPos};
use thiserror::Error;

/// Why a dig goal could not be completed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GoalError {
    /// No equippable tool resolves for the target material.
    #[error("no equippable tool {tool} for material {material}")]
    ToolUnavailable {
        /// Tool the bindings resolved to.
        tool: String,
        /// Material that was being matched.
        material: String,
    },

    /// The target's chunk is not loaded.
    #[error("chunk {chunk} not loaded")]
    ChunkNotLoaded {
        /// Chunk the target sits in.
        chunk: ChunkPos,
    },

    /// The server never confirmed the block removal.
    #[error("dig at {pos} timed out after {attempts} attempts")]
    DigTimeout {
        /// Target block.
        pos: BlockPos,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The run was cancelled while this goal was in flight.
    #[error("run cancelled")]
    Cancelled,

    /// The session died underneath the executor.
    #[error("session lost")]
    SessionLost,
}
