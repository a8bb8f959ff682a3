//! Turns a planned goal into the concrete protocol action sequence.
//!
//! Per goal: equip, face the target, start-dig, wait out the predicted break
//! time, finish-dig, then confirm the removal against the world model. Every
//! wait observes the cancel signal; a start-dig is always paired with either
//! a confirmation or an explicit cancel-dig before control returns.

use crate::error::GoalError;
use crate::event::{AgentEvent, EventSink};
use crate::hardness::break_ticks;
use crate::planner::{DigGoal, GoalState};
use crate::tools::ToolController;
use quarry_core::{BlockPos, BlockRegistry, BLOCK_AIR};
use quarry_net::{DigActionKind, Serverbound};
use quarry_world::{BlockQuery, WorldHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Executor retry/timeout policy.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// How long to wait for the server's removal confirmation after the
    /// predicted break time has elapsed.
    pub confirm_timeout: Duration,
    /// Dig attempts per goal before it fails.
    pub max_dig_attempts: u32,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(2),
            max_dig_attempts: 3,
        }
    }
}

/// How a goal ended on the success path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigOutcome {
    /// Server confirmed the removal.
    Confirmed {
        /// Material that was removed.
        material: String,
        /// Tool used.
        tool: String,
    },
    /// The block was already gone when the executor looked.
    AlreadyClear,
}

enum Confirmation {
    Confirmed,
    TimedOut,
    Cancelled,
    SessionLost,
}

/// Drives single goals to completion over the session.
pub struct Executor {
    outbound: mpsc::Sender<Serverbound>,
    world: WorldHandle,
    registry: Arc<BlockRegistry>,
    tools: ToolController,
    events: Arc<dyn EventSink>,
    options: ExecutorOptions,
    cancel: watch::Receiver<bool>,
    agent_pos: BlockPos,
}

impl Executor {
    /// Wire an executor to the session, world, and tool controller.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        outbound: mpsc::Sender<Serverbound>,
        world: WorldHandle,
        registry: Arc<BlockRegistry>,
        tools: ToolController,
        events: Arc<dyn EventSink>,
        options: ExecutorOptions,
        cancel: watch::Receiver<bool>,
        agent_pos: BlockPos,
    ) -> Self {
        Self {
            outbound,
            world,
            registry,
            tools,
            events,
            options,
            cancel,
            agent_pos,
        }
    }

    /// Tool the controller believes is held.
    pub fn current_tool(&self) -> Option<&str> {
        self.tools.current_tool()
    }

    /// Execute one goal to a terminal state.
    pub async fn execute(&mut self, goal: &mut DigGoal) -> Result<DigOutcome, GoalError> {
        if *self.cancel.borrow() {
            return Err(GoalError::Cancelled);
        }

        let info = match self.world.block_at(goal.target) {
            BlockQuery::Unloaded => {
                return Err(GoalError::ChunkNotLoaded {
                    chunk: goal.target.chunk(),
                })
            }
            BlockQuery::Known(info) if info.id == BLOCK_AIR => {
                goal.state = GoalState::Confirmed;
                return Ok(DigOutcome::AlreadyClear);
            }
            BlockQuery::Known(info) => info,
        };

        let material = self
            .registry
            .name(info.id)
            .unwrap_or("unknown")
            .to_string();
        let tool = self.tools.equip_for(&material).await?;
        goal.state = GoalState::ToolReady;

        let (yaw, pitch) = orientation_toward(self.agent_pos, goal.target);
        self.send(Serverbound::Look { yaw, pitch }).await?;

        let break_time = break_ticks(&material, &tool).as_duration();
        debug!(pos = %goal.target, %material, %tool, ?break_time, "digging");

        loop {
            goal.dig_attempts += 1;
            self.send(dig(DigActionKind::Start, goal.target)).await?;
            goal.state = GoalState::Digging;

            if !self.wait_unless_cancelled(break_time).await {
                // Cancelled mid-swing: pair the start with an explicit cancel
                // before handing control back.
                let _ = self.send(dig(DigActionKind::Cancel, goal.target)).await;
                return Err(GoalError::Cancelled);
            }
            self.send(dig(DigActionKind::Finish, goal.target)).await?;

            match self.await_removal(goal.target).await {
                Confirmation::Confirmed => {
                    goal.state = GoalState::Confirmed;
                    self.tools.note_block_broken();
                    self.events.emit(&AgentEvent::BlockConfirmed {
                        pos: goal.target,
                        material: material.clone(),
                    });
                    return Ok(DigOutcome::Confirmed { material, tool });
                }
                Confirmation::Cancelled => {
                    let _ = self.send(dig(DigActionKind::Cancel, goal.target)).await;
                    return Err(GoalError::Cancelled);
                }
                Confirmation::SessionLost => return Err(GoalError::SessionLost),
                Confirmation::TimedOut => {
                    let _ = self.send(dig(DigActionKind::Cancel, goal.target)).await;
                    if goal.dig_attempts >= self.options.max_dig_attempts {
                        goal.state = GoalState::Failed;
                        return Err(GoalError::DigTimeout {
                            pos: goal.target,
                            attempts: goal.dig_attempts,
                        });
                    }
                    warn!(
                        pos = %goal.target,
                        attempt = goal.dig_attempts,
                        "dig unconfirmed, retrying"
                    );
                }
            }
        }
    }

    async fn send(&self, packet: Serverbound) -> Result<(), GoalError> {
        self.outbound
            .send(packet)
            .await
            .map_err(|_| GoalError::SessionLost)
    }

    /// Sleep for `duration`; returns false if cancelled first.
    async fn wait_unless_cancelled(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = cancelled(&mut self.cancel) => false,
        }
    }

    /// Wait for the world model to report the target as air.
    async fn await_removal(&mut self, pos: BlockPos) -> Confirmation {
        let deadline = Instant::now() + self.options.confirm_timeout;
        let mut revision = self.world.revision();
        loop {
            if self.world.block_at(pos).is_known_air() {
                return Confirmation::Confirmed;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Confirmation::TimedOut;
            }
            tokio::select! {
                changed = revision.changed() => {
                    if changed.is_err() {
                        return Confirmation::SessionLost;
                    }
                }
                _ = sleep(remaining) => return Confirmation::TimedOut,
                _ = cancelled(&mut self.cancel) => return Confirmation::Cancelled,
            }
        }
    }
}

fn dig(action: DigActionKind, pos: BlockPos) -> Serverbound {
    Serverbound::DigAction { action, pos }
}

/// Resolves once the cancel flag is set; never resolves if the flag's sender
/// goes away without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await;
}

/// Quantized look angles from one block toward another (256 steps per turn).
fn orientation_toward(from: BlockPos, to: BlockPos) -> (u8, u8) {
    let dx = (to.x - from.x) as f32;
    let dy = (to.y - from.y) as f32;
    let dz = (to.z - from.z) as f32;
    let yaw_deg = (-dx).atan2(dz).to_degrees();
    let pitch_deg = (-dy).atan2((dx * dx + dz * dz).sqrt()).to_degrees();
    let quantize = |deg: f32| (((deg / 360.0) * 256.0).round() as i32).rem_euclid(256) as u8;
    (quantize(yaw_deg), quantize(pitch_deg))
}
