//! Break-time model: material hardness plus tool speed.
//!
//! The server does not announce per-block break times on this protocol, so
//! the executor predicts them client-side and relies on the server's
//! block-change confirmation as ground truth.

use quarry_core::{GameTick, ToolKind, ToolSpec, TICKS_PER_SECOND};

/// Base time in seconds to break a material with a bare hand, before tool
/// speed is applied. Matching is by category substring because material
/// naming is server-defined.
pub fn hardness_seconds(material: &str) -> f32 {
    let material = material.to_ascii_lowercase();
    if material.contains("obsidian") {
        50.0
    } else if material.contains("ore") {
        3.0
    } else if material.contains("log") || material.contains("planks") || material.contains("wood") {
        2.0
    } else if material.contains("cobblestone") {
        2.0
    } else if material.contains("stone") {
        1.5
    } else if material.contains("gravel") {
        0.6
    } else if material.contains("dirt") || material.contains("grass") || material.contains("sand")
    {
        0.5
    } else {
        1.0
    }
}

/// The tool category that gets the speed bonus on a material.
pub fn preferred_kind(material: &str) -> Option<ToolKind> {
    let material = material.to_ascii_lowercase();
    if material.contains("log") || material.contains("planks") || material.contains("wood") {
        Some(ToolKind::Axe)
    } else if material.contains("dirt")
        || material.contains("grass")
        || material.contains("sand")
        || material.contains("gravel")
    {
        Some(ToolKind::Shovel)
    } else if material.contains("stone") || material.contains("ore") || material.contains("obsidian")
    {
        Some(ToolKind::Pickaxe)
    } else {
        None
    }
}

/// Predicted break duration for a material/tool pairing.
///
/// Wrong-category tools (and unparseable tool ids) dig at hand speed. Always
/// at least one tick.
pub fn break_ticks(material: &str, tool_id: &str) -> GameTick {
    let hardness = hardness_seconds(material);
    let speed = match (ToolSpec::parse(tool_id), preferred_kind(material)) {
        (Some(spec), Some(kind)) if spec.kind == kind => spec.material.speed_multiplier(),
        _ => 1.0,
    };
    let seconds = hardness * 1.5 / speed;
    let ticks = (seconds * TICKS_PER_SECOND as f32).ceil() as u64;
    GameTick(ticks.max(1))
}
