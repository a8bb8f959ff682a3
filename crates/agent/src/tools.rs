//! Tool bindings and the equip path.

use crate::error::GoalError;
use crate::event::{AgentEvent, EventSink};
use crate::inventory::{DurabilityOutcome, InventoryHandle};
use quarry_net::Serverbound;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

/// How long to wait for the server's initial inventory snapshot before a
/// missing tool counts as unavailable.
const INVENTORY_WAIT: Duration = Duration::from_millis(500);

/// Material-name to tool-id mapping with a fallback default.
///
/// Resolution is exact match, then substring match, then the default. The
/// substring pass is a deliberate heuristic, not a bug: block material naming
/// is server-defined and not fully enumerable, so `mossy_cobblestone` should
/// hit a `cobblestone` binding without being spelled out.
#[derive(Debug, Clone)]
pub struct ToolBindings {
    bindings: BTreeMap<String, String>,
    default: String,
}

impl ToolBindings {
    /// Build bindings from a configuration table plus a default tool.
    pub fn new(bindings: BTreeMap<String, String>, default: impl Into<String>) -> Self {
        let bindings = bindings
            .into_iter()
            .map(|(key, tool)| (key.to_ascii_lowercase(), tool))
            .collect();
        Self {
            bindings,
            default: default.into(),
        }
    }

    /// Resolve the tool to use on a material.
    pub fn select_tool(&self, material: &str) -> &str {
        let material = material.to_ascii_lowercase();
        if let Some(tool) = self.bindings.get(material.as_str()) {
            return tool;
        }
        // Substring pass in deterministic key order.
        for (key, tool) in &self.bindings {
            if material.contains(key.as_str()) {
                return tool;
            }
        }
        &self.default
    }

    /// The fallback tool.
    pub fn default_tool(&self) -> &str {
        &self.default
    }
}

impl Default for ToolBindings {
    fn default() -> Self {
        let table = [
            ("stone", "wooden_pickaxe"),
            ("cobblestone", "wooden_pickaxe"),
            ("dirt", "wooden_shovel"),
            ("grass", "wooden_shovel"),
            ("sand", "wooden_shovel"),
            ("gravel", "wooden_shovel"),
            ("wood", "wooden_axe"),
            ("oak_log", "wooden_axe"),
            ("spruce_log", "wooden_axe"),
            ("birch_log", "wooden_axe"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self::new(table, "wooden_pickaxe")
    }
}

/// Chooses, equips, and wears out tools.
pub struct ToolController {
    bindings: ToolBindings,
    inventory: InventoryHandle,
    outbound: mpsc::Sender<Serverbound>,
    events: Arc<dyn EventSink>,
    current_tool: Option<String>,
}

impl ToolController {
    /// Wire a controller to the inventory and the session's outbound queue.
    pub fn new(
        bindings: ToolBindings,
        inventory: InventoryHandle,
        outbound: mpsc::Sender<Serverbound>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            bindings,
            inventory,
            outbound,
            events,
            current_tool: None,
        }
    }

    /// Tool we believe is currently held.
    pub fn current_tool(&self) -> Option<&str> {
        self.current_tool.as_deref()
    }

    /// Resolve the binding for a material without equipping.
    pub fn select_tool(&self, material: &str) -> &str {
        self.bindings.select_tool(material)
    }

    /// Resolve and equip the tool for a material, returning its id.
    pub async fn equip_for(&mut self, material: &str) -> Result<String, GoalError> {
        let tool = self.bindings.select_tool(material).to_string();
        self.equip(&tool, material).await?;
        Ok(tool)
    }

    /// Equip a tool by id. A no-op when the tool is already held, so repeated
    /// equips of the same tool issue exactly one hot-bar packet.
    pub async fn equip(&mut self, tool: &str, material: &str) -> Result<(), GoalError> {
        if self.current_tool.as_deref() == Some(tool) {
            return Ok(());
        }
        let slot = self.locate_tool(tool).await.ok_or_else(|| {
            GoalError::ToolUnavailable {
                tool: tool.to_string(),
                material: material.to_string(),
            }
        })?;
        self.outbound
            .send(Serverbound::HeldSlotChange { slot: slot as u8 })
            .await
            .map_err(|_| GoalError::SessionLost)?;
        self.inventory.set_held(slot);
        self.current_tool = Some(tool.to_string());
        info!(%tool, slot, "tool equipped");
        self.events.emit(&AgentEvent::ToolChanged {
            tool: tool.to_string(),
        });
        Ok(())
    }

    /// Find a usable copy of a tool, waiting briefly on the inventory
    /// subscription when the server's window snapshot has not landed yet.
    async fn locate_tool(&self, tool: &str) -> Option<u16> {
        let deadline = Instant::now() + INVENTORY_WAIT;
        let mut revision = self.inventory.revision();
        loop {
            if let Some(slot) = self.inventory.find_tool(tool) {
                return Some(slot);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match timeout(remaining, revision.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return self.inventory.find_tool(tool),
            }
        }
    }

    /// Account for one confirmed dig: spend durability on the held tool, and
    /// force a reselection cycle if it just broke.
    pub fn note_block_broken(&mut self) {
        match self.inventory.spend_held_durability() {
            Some(DurabilityOutcome::Broke) => {
                let tool = self
                    .current_tool
                    .take()
                    .unwrap_or_else(|| "unknown".to_string());
                info!(%tool, "tool broke");
                self.events.emit(&AgentEvent::ToolBroken { tool });
            }
            Some(DurabilityOutcome::Remaining(left)) => {
                debug!(durability = left, "durability spent");
            }
            None => {}
        }
    }
}
