//! Item system - tool kinds, material tiers, and tool id parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool categories relevant to block breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    /// Pickaxe - mines stone, ores
    Pickaxe,
    /// Axe - chops wood
    Axe,
    /// Shovel - digs dirt, sand, gravel
    Shovel,
    /// Sword - not a mining tool, but servers hand them out anyway
    Sword,
    /// Hoe - tills farmland
    Hoe,
}

impl ToolKind {
    fn suffix(self) -> &'static str {
        match self {
            ToolKind::Pickaxe => "pickaxe",
            ToolKind::Axe => "axe",
            ToolKind::Shovel => "shovel",
            ToolKind::Sword => "sword",
            ToolKind::Hoe => "hoe",
        }
    }
}

/// Tool material tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ToolMaterial {
    /// Wooden tools (tier 0)
    Wood = 0,
    /// Stone tools (tier 1)
    Stone = 1,
    /// Iron tools (tier 2)
    Iron = 2,
    /// Diamond tools (tier 3)
    Diamond = 3,
    /// Gold tools (very fast but weak mining tier - same tier as wood)
    Gold = 4,
}

impl ToolMaterial {
    /// Get the mining speed multiplier for this material.
    pub fn speed_multiplier(self) -> f32 {
        match self {
            ToolMaterial::Wood => 2.0,
            ToolMaterial::Stone => 4.0,
            ToolMaterial::Iron => 6.0,
            ToolMaterial::Diamond => 8.0,
            ToolMaterial::Gold => 12.0,
        }
    }

    /// Get the maximum durability for tools of this material.
    pub fn max_durability(self) -> u32 {
        match self {
            ToolMaterial::Wood => 59,
            ToolMaterial::Stone => 131,
            ToolMaterial::Iron => 250,
            ToolMaterial::Diamond => 1561,
            ToolMaterial::Gold => 32,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            ToolMaterial::Wood => "wooden",
            ToolMaterial::Stone => "stone",
            ToolMaterial::Iron => "iron",
            ToolMaterial::Diamond => "diamond",
            ToolMaterial::Gold => "golden",
        }
    }
}

/// A parsed tool identifier such as `wooden_pickaxe` or `iron_shovel`.
///
/// Tool ids on the wire and in configuration are plain strings; parsing is
/// best-effort because servers can define tools we have no tier data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Material tier of the tool.
    pub material: ToolMaterial,
    /// Category of the tool.
    pub kind: ToolKind,
}

impl ToolSpec {
    /// Parse a `<material>_<kind>` tool id. Returns None for ids that do not
    /// follow the convention (bare items, server-custom tools).
    pub fn parse(tool_id: &str) -> Option<Self> {
        let (prefix, suffix) = tool_id.rsplit_once('_')?;
        let kind = match suffix {
            "pickaxe" => ToolKind::Pickaxe,
            "axe" => ToolKind::Axe,
            "shovel" => ToolKind::Shovel,
            "sword" => ToolKind::Sword,
            "hoe" => ToolKind::Hoe,
            _ => return None,
        };
        let material = match prefix {
            "wooden" | "wood" => ToolMaterial::Wood,
            "stone" => ToolMaterial::Stone,
            "iron" => ToolMaterial::Iron,
            "diamond" => ToolMaterial::Diamond,
            "golden" | "gold" => ToolMaterial::Gold,
            _ => return None,
        };
        Some(Self { material, kind })
    }

    /// Canonical tool id string for this spec.
    pub fn id(self) -> String {
        format!("{}_{}", self.material.prefix(), self.kind.suffix())
    }
}

impl fmt::Display for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}
