//! Block registry mapping numeric wire ids to material names.
//!
//! Chunk packets carry numeric ids; tool selection and hardness lookups work
//! on material names. The registry is static per connection: the set of ids a
//! server uses is fixed for the session.

use crate::{BlockId, BLOCK_AIR};
use std::collections::HashMap;
use thiserror::Error;

/// Error raised when constructing a registry from invalid definitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two entries share a material name.
    #[error("duplicate material name: {0}")]
    DuplicateName(String),
    /// Entry zero must be air.
    #[error("registry id 0 is reserved for air, got {0}")]
    MissingAir(String),
}

/// Bidirectional id <-> material-name table.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    names: Vec<String>,
    by_name: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Build a registry from an ordered list of material names. Index in the
    /// list is the wire id; entry 0 must be `air`.
    pub fn new(names: Vec<String>) -> Result<Self, RegistryError> {
        match names.first() {
            Some(first) if first == "air" => {}
            Some(first) => return Err(RegistryError::MissingAir(first.clone())),
            None => return Err(RegistryError::MissingAir(String::new())),
        }
        let mut by_name = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if by_name.insert(name.clone(), id as BlockId).is_some() {
                return Err(RegistryError::DuplicateName(name.clone()));
            }
        }
        Ok(Self { names, by_name })
    }

    /// Material name for a wire id, if registered.
    pub fn name(&self, id: BlockId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// Wire id for a material name, if registered.
    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Whether the id denotes air.
    pub fn is_air(&self, id: BlockId) -> bool {
        id == BLOCK_AIR
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the registry is empty (never true for a valid registry).
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for BlockRegistry {
    /// Built-in material table covering the vanilla overworld blocks the
    /// digger encounters. Servers with extended palettes supply their own.
    fn default() -> Self {
        let names = [
            "air",
            "stone",
            "cobblestone",
            "mossy_cobblestone",
            "dirt",
            "grass",
            "sand",
            "gravel",
            "oak_log",
            "spruce_log",
            "birch_log",
            "oak_planks",
            "coal_ore",
            "iron_ore",
            "gold_ore",
            "diamond_ore",
            "obsidian",
            "bedrock",
            "water",
            "lava",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Self::new(names).expect("built-in registry is valid")
    }
}
