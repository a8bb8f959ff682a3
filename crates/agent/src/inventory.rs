//! Inventory state fed from confirmed server packets.
//!
//! Slots mutate only when the server says so (SetSlot / WindowItems); the one
//! exception is an optimistic durability decrement after a confirmed dig,
//! which the next server echo reconciles. Durability never goes below zero.

use quarry_net::{Clientbound, SlotData};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One tracked inventory slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySlot {
    /// Slot index within the player window.
    pub index: u16,
    /// Item identifier, or None when empty.
    pub item: Option<String>,
    /// Durability remaining (0 for non-tools and broken tools).
    pub durability: u32,
    /// Stack count.
    pub count: u8,
}

impl From<SlotData> for InventorySlot {
    fn from(slot: SlotData) -> Self {
        Self {
            index: slot.index,
            item: slot.item,
            durability: slot.durability,
            count: slot.count,
        }
    }
}

/// Outcome of spending one point of durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityOutcome {
    /// Tool survives with this much durability left.
    Remaining(u32),
    /// Tool just broke.
    Broke,
}

/// Tracked player inventory.
#[derive(Debug, Default)]
pub struct Inventory {
    slots: BTreeMap<u16, InventorySlot>,
    held: u16,
}

impl Inventory {
    /// Apply a confirmed server packet. Returns whether anything changed.
    pub fn apply(&mut self, packet: &Clientbound) -> bool {
        match packet {
            Clientbound::SetSlot { slot } => {
                debug!(index = slot.index, item = ?slot.item, "slot update");
                self.slots.insert(slot.index, slot.clone().into());
                true
            }
            Clientbound::WindowItems { slots } => {
                self.slots.clear();
                for slot in slots {
                    self.slots.insert(slot.index, slot.clone().into());
                }
                debug!(slots = self.slots.len(), "window snapshot");
                true
            }
            _ => false,
        }
    }

    /// Currently held slot index.
    pub fn held_slot(&self) -> u16 {
        self.held
    }

    /// Record a hot-bar switch.
    pub fn set_held(&mut self, slot: u16) {
        self.held = slot;
    }

    /// Item id in the held slot.
    pub fn held_item(&self) -> Option<&str> {
        self.slots
            .get(&self.held)
            .and_then(|slot| slot.item.as_deref())
    }

    /// Lowest-index slot holding the given tool with durability left.
    pub fn find_tool(&self, tool_id: &str) -> Option<u16> {
        self.slots
            .values()
            .find(|slot| slot.item.as_deref() == Some(tool_id) && slot.durability > 0)
            .map(|slot| slot.index)
    }

    /// Optimistically spend one durability on the held slot.
    pub fn spend_held_durability(&mut self) -> Option<DurabilityOutcome> {
        let slot = self.slots.get_mut(&self.held)?;
        if slot.item.is_none() {
            return None;
        }
        slot.durability = slot.durability.saturating_sub(1);
        if slot.durability == 0 {
            Some(DurabilityOutcome::Broke)
        } else {
            Some(DurabilityOutcome::Remaining(slot.durability))
        }
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slots are tracked yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Shared view of the inventory, mutated only by its task.
#[derive(Clone)]
pub struct InventoryHandle {
    inner: Arc<Mutex<Inventory>>,
    revision: watch::Receiver<u64>,
}

impl InventoryHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inventory> {
        self.inner.lock().expect("inventory lock poisoned")
    }

    /// Watch channel bumped after every applied inventory packet; lets
    /// callers await the initial window snapshot instead of polling.
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }

    /// Currently held slot index.
    pub fn held_slot(&self) -> u16 {
        self.lock().held_slot()
    }

    /// Record a hot-bar switch.
    pub fn set_held(&self, slot: u16) {
        self.lock().set_held(slot);
    }

    /// Item id in the held slot.
    pub fn held_item(&self) -> Option<String> {
        self.lock().held_item().map(str::to_string)
    }

    /// Lowest-index slot holding the given tool with durability left.
    pub fn find_tool(&self, tool_id: &str) -> Option<u16> {
        self.lock().find_tool(tool_id)
    }

    /// Optimistically spend one durability on the held slot.
    pub fn spend_held_durability(&self) -> Option<DurabilityOutcome> {
        self.lock().spend_held_durability()
    }

    /// Number of tracked slots.
    pub fn slot_count(&self) -> usize {
        self.lock().len()
    }
}

/// Spawn the inventory task: applies bus packets until the bus closes.
pub fn spawn_inventory_task(
    mut packets: broadcast::Receiver<Clientbound>,
) -> (InventoryHandle, JoinHandle<()>) {
    let inner = Arc::new(Mutex::new(Inventory::default()));
    let (revision_tx, revision_rx) = watch::channel(0u64);
    let handle = InventoryHandle {
        inner: Arc::clone(&inner),
        revision: revision_rx,
    };

    let task = tokio::spawn(async move {
        loop {
            match packets.recv().await {
                Ok(packet) => {
                    let applied = inner
                        .lock()
                        .expect("inventory lock poisoned")
                        .apply(&packet);
                    if applied {
                        revision_tx.send_modify(|rev| *rev += 1);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "inventory task lagged behind the packet bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: u16, item: &str, durability: u32) -> SlotData {
        SlotData {
            index,
            item: Some(item.to_string()),
            count: 1,
            durability,
        }
    }

    #[test]
    fn test_window_snapshot_replaces_slots() {
        let mut inventory = Inventory::default();
        inventory.apply(&Clientbound::SetSlot {
            slot: slot(5, "stick", 0),
        });
        inventory.apply(&Clientbound::WindowItems {
            slots: vec![slot(0, "wooden_pickaxe", 59)],
        });
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.find_tool("wooden_pickaxe"), Some(0));
        assert_eq!(inventory.find_tool("stick"), None);
    }

    #[test]
    fn test_find_tool_skips_broken() {
        let mut inventory = Inventory::default();
        inventory.apply(&Clientbound::WindowItems {
            slots: vec![slot(0, "wooden_pickaxe", 0), slot(3, "wooden_pickaxe", 12)],
        });
        assert_eq!(inventory.find_tool("wooden_pickaxe"), Some(3));
    }

    #[test]
    fn test_durability_never_goes_negative() {
        let mut inventory = Inventory::default();
        inventory.apply(&Clientbound::WindowItems {
            slots: vec![slot(0, "wooden_shovel", 1)],
        });
        inventory.set_held(0);

        assert_eq!(
            inventory.spend_held_durability(),
            Some(DurabilityOutcome::Broke)
        );
        // Further spends stay at zero.
        assert_eq!(
            inventory.spend_held_durability(),
            Some(DurabilityOutcome::Broke)
        );
    }

    #[test]
    fn test_server_echo_reconciles_durability() {
        let mut inventory = Inventory::default();
        inventory.apply(&Clientbound::WindowItems {
            slots: vec![slot(0, "wooden_pickaxe", 59)],
        });
        inventory.set_held(0);
        inventory.spend_held_durability();
        inventory.spend_held_durability();

        // Server says 58 (it only counted one of the swings).
        inventory.apply(&Clientbound::SetSlot {
            slot: slot(0, "wooden_pickaxe", 58),
        });
        assert_eq!(
            inventory.spend_held_durability(),
            Some(DurabilityOutcome::Remaining(57))
        );
    }

    #[tokio::test]
    async fn test_inventory_task_applies_bus_packets() {
        let (bus_tx, bus_rx) = broadcast::channel(16);
        let (handle, task) = spawn_inventory_task(bus_rx);

        bus_tx
            .send(Clientbound::WindowItems {
                slots: vec![slot(2, "wooden_axe", 40)],
            })
            .expect("bus send");
        drop(bus_tx);
        task.await.expect("task exits when bus closes");

        assert_eq!(handle.find_tool("wooden_axe"), Some(2));
    }
}
