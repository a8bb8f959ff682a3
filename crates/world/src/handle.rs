//! World task and shared read handle.
//!
//! All mutations happen on one task fed from the session bus; every other
//! component reads through [`WorldHandle`] and awaits the revision watch
//! instead of polling.

use crate::model::{BlockQuery, WorldModel};
use quarry_core::{BlockPos, ChunkPos};
use quarry_net::Clientbound;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Shared, read-only view of the world model.
#[derive(Clone)]
pub struct WorldHandle {
    model: Arc<RwLock<WorldModel>>,
    revision: watch::Receiver<u64>,
}

impl WorldHandle {
    /// Last disclosed state of a block.
    pub fn block_at(&self, pos: BlockPos) -> BlockQuery {
        self.model.read().expect("world lock poisoned").block_at(pos)
    }

    /// Whether a chunk column is resident.
    pub fn is_loaded(&self, chunk: ChunkPos) -> bool {
        self.model
            .read()
            .expect("world lock poisoned")
            .is_loaded(chunk)
    }

    /// Number of resident chunks.
    pub fn loaded_chunks(&self) -> usize {
        self.model
            .read()
            .expect("world lock poisoned")
            .loaded_chunks()
    }

    /// Watch channel bumped after every applied packet.
    ///
    /// Await `changed()` on a clone of this to learn that new state arrived;
    /// the channel closes when the world task stops (fatal decode error or
    /// session teardown).
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }
}

/// Spawn the world task.
///
/// The task applies every bus packet to the model, bumps the revision watch
/// on changes, and recenters eviction when the agent position watch moves. A
/// chunk payload that fails validation stops the task: the stream can no
/// longer be trusted, and the closed revision channel surfaces that to
/// waiters.
pub fn spawn_world_task(
    model: WorldModel,
    mut packets: broadcast::Receiver<Clientbound>,
    mut center: watch::Receiver<BlockPos>,
) -> (WorldHandle, JoinHandle<()>) {
    let model = Arc::new(RwLock::new(model));
    let (revision_tx, revision_rx) = watch::channel(0u64);

    let handle = WorldHandle {
        model: Arc::clone(&model),
        revision: revision_rx,
    };

    let task = tokio::spawn(async move {
        let mut center_open = true;
        loop {
            tokio::select! {
                packet = packets.recv() => match packet {
                    Ok(packet) => {
                        let applied = model
                            .write()
                            .expect("world lock poisoned")
                            .apply(&packet);
                        match applied {
                            Ok(true) => {
                                revision_tx.send_modify(|rev| *rev += 1);
                            }
                            Ok(false) => {}
                            Err(err) => {
                                error!("world ingest failed, stopping: {err}");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "world task lagged behind the packet bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = center.changed(), if center_open => match changed {
                    Ok(()) => {
                        let pos = *center.borrow();
                        model
                            .write()
                            .expect("world lock poisoned")
                            .set_center(pos);
                    }
                    Err(_) => center_open = false,
                },
            }
        }
    });

    (handle, task)
}
