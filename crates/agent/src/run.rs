//! Run orchestration: wires session, world, inventory, planner, and executor
//! into one excavation run with a command channel and a status watch.

use crate::error::GoalError;
use crate::event::{AgentEvent, EventSink};
use crate::executor::{DigOutcome, Executor, ExecutorOptions};
use crate::inventory::spawn_inventory_task;
use crate::planner::{
    DigVolume, NextStep, Planner, PlannerOptions, PlannerPhase,
};
use crate::tools::{ToolBindings, ToolController};
use quarry_core::{BlockPos, BlockRegistry};
use quarry_net::{Session, SessionState};
use quarry_world::{spawn_world_task, WorldHandle, WorldModel, WorldOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Immutable settings for one run, assembled by the embedding application.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Volume to excavate.
    pub volume: DigVolume,
    /// Material to tool mapping.
    pub bindings: ToolBindings,
    /// Block id to material name table.
    pub registry: BlockRegistry,
    /// Deferral policy.
    pub planner: PlannerOptions,
    /// Dig retry/timeout policy.
    pub executor: ExecutorOptions,
    /// World memory policy.
    pub world: WorldOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            volume: DigVolume {
                origin: BlockPos::new(0, 64, 0),
                width: 10,
                length: 10,
                depth: 5,
                interval: 5,
            },
            bindings: ToolBindings::default(),
            registry: BlockRegistry::default(),
            planner: PlannerOptions::default(),
            executor: ExecutorOptions::default(),
            world: WorldOptions::default(),
        }
    }
}

/// Commands the core accepts from its collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin executing the plan.
    Start,
    /// Stop, draining the in-flight goal first.
    Cancel,
}

/// Point-in-time progress for the status surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Planner phase.
    pub phase: PlannerPhase,
    /// Tool currently held, if any.
    pub current_tool: Option<String>,
    /// Server-confirmed removals.
    pub blocks_dug: u64,
    /// Goals that ended Confirmed.
    pub goals_confirmed: u64,
    /// Goals that ended Failed.
    pub goals_failed: u64,
    /// Goals still queued.
    pub goals_remaining: u64,
    /// Goals the sweep produced.
    pub planned: u64,
    /// Wall-clock time since the plan started.
    pub elapsed: Duration,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            phase: PlannerPhase::Idle,
            current_tool: None,
            blocks_dug: 0,
            goals_confirmed: 0,
            goals_failed: 0,
            goals_remaining: 0,
            planned: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every goal reached a terminal state.
    Completed,
    /// Cancelled or disconnected; counters reflect work up to that point.
    Aborted,
}

/// Final accounting for a run. Counters survive aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Server-confirmed removals.
    pub blocks_dug: u64,
    /// Goals that ended Confirmed.
    pub goals_confirmed: u64,
    /// Goals that ended Failed.
    pub goals_failed: u64,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

/// Collaborator-facing handle: command channel plus status watch.
#[derive(Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<StatusSnapshot>,
}

impl AgentHandle {
    /// Ask the run to start. Returns false if the run is already gone.
    pub async fn start(&self) -> bool {
        self.commands.send(Command::Start).await.is_ok()
    }

    /// Ask the run to cancel. Returns false if the run is already gone.
    pub async fn cancel(&self) -> bool {
        self.commands.send(Command::Cancel).await.is_ok()
    }

    /// Latest status snapshot.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Watch status updates.
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

/// One excavation run over an established session.
pub struct ExcavationRun {
    volume: DigVolume,
    planner: Planner,
    executor: Executor,
    world: WorldHandle,
    events: Arc<dyn EventSink>,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<StatusSnapshot>,
    cancel: watch::Sender<bool>,
    session_state: watch::Receiver<SessionState>,
    // Keeps the world task's recenter channel alive for the run's lifetime.
    _center: watch::Sender<BlockPos>,
    _tasks: Vec<JoinHandle<()>>,
}

impl ExcavationRun {
    /// Wire a run onto an established session.
    pub fn new(
        session: &Session,
        config: AgentConfig,
        events: Arc<dyn EventSink>,
    ) -> (Self, AgentHandle) {
        let (center_tx, center_rx) = watch::channel(config.volume.origin);
        let (world, world_task) = spawn_world_task(
            WorldModel::new(config.world.clone()),
            session.subscribe(),
            center_rx,
        );
        let (inventory, inventory_task) = spawn_inventory_task(session.subscribe());
        // Both subscribers are attached; let the session deliver the packets
        // it held back since login.
        session.start_dispatch();

        let tools = ToolController::new(
            config.bindings,
            inventory,
            session.sender(),
            events.clone(),
        );
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let executor = Executor::new(
            session.sender(),
            world.clone(),
            Arc::new(config.registry),
            tools,
            events.clone(),
            config.executor,
            cancel_rx,
            config.volume.origin,
        );

        let (command_tx, command_rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());

        let profile = session.profile();
        events.emit(&AgentEvent::Connected {
            username: profile.username.clone(),
            session_id: profile.session_id,
        });

        let run = Self {
            volume: config.volume,
            planner: Planner::new(config.planner),
            executor,
            world,
            events,
            commands: command_rx,
            status: status_tx,
            cancel: cancel_tx,
            session_state: session.watch_state(),
            _center: center_tx,
            _tasks: vec![world_task, inventory_task],
        };
        let handle = AgentHandle {
            commands: command_tx,
            status: status_rx,
        };
        (run, handle)
    }

    /// Drive the run to its final report: wait for Start, execute the plan,
    /// honor Cancel by draining the in-flight goal.
    pub async fn run(mut self) -> RunReport {
        if !self.wait_for_start().await {
            let report = self.report(RunOutcome::Aborted);
            self.emit_final(&report);
            return report;
        }

        self.planner.start(&self.volume);
        self.push_status();
        info!(
            goals = self.planner.counters().planned,
            width = self.volume.width,
            length = self.volume.length,
            depth = self.volume.depth,
            interval = self.volume.interval,
            "excavation started"
        );

        let outcome = self.dig_loop().await;
        let report = self.report(outcome);
        self.emit_final(&report);
        self.push_status();
        report
    }

    /// Returns false if cancelled (or disconnected) before starting.
    async fn wait_for_start(&mut self) -> bool {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Start) => return true,
                    Some(Command::Cancel) | None => return false,
                },
                _ = session_lost(&mut self.session_state) => {
                    self.events.emit(&AgentEvent::Disconnected {
                        reason: "connection lost before start".to_string(),
                    });
                    return false;
                }
            }
        }
    }

    async fn dig_loop(&mut self) -> RunOutcome {
        loop {
            self.pump_commands();
            if *self.cancel.borrow() {
                self.planner.cancel();
                return RunOutcome::Aborted;
            }
            if *self.session_state.borrow() == SessionState::Disconnected {
                self.events.emit(&AgentEvent::Disconnected {
                    reason: "connection lost mid-run".to_string(),
                });
                self.planner.cancel();
                return RunOutcome::Aborted;
            }

            match self.planner.advance(&self.world) {
                NextStep::Done => {
                    return match self.planner.phase() {
                        PlannerPhase::Aborted => RunOutcome::Aborted,
                        _ => RunOutcome::Completed,
                    };
                }
                NextStep::Vanished(_) => self.push_status(),
                NextStep::FailedChunk(goal) => {
                    let reason = GoalError::ChunkNotLoaded {
                        chunk: goal.target.chunk(),
                    }
                    .to_string();
                    warn!(pos = %goal.target, %reason, "goal failed");
                    self.events.emit(&AgentEvent::GoalFailed {
                        pos: goal.target,
                        reason,
                    });
                    self.push_status();
                }
                NextStep::Deferred { wait } => {
                    if !self.wait_for_world(wait).await {
                        return RunOutcome::Aborted;
                    }
                }
                NextStep::Goal(mut goal) => {
                    let result = self.drive_goal(&mut goal).await;
                    match result {
                        Ok(DigOutcome::Confirmed { .. }) => self.planner.note_confirmed(true),
                        Ok(DigOutcome::AlreadyClear) => self.planner.note_confirmed(false),
                        Err(GoalError::Cancelled) => {
                            self.planner.cancel();
                            return RunOutcome::Aborted;
                        }
                        Err(GoalError::SessionLost) => {
                            self.events.emit(&AgentEvent::Disconnected {
                                reason: "connection lost mid-run".to_string(),
                            });
                            self.planner.cancel();
                            return RunOutcome::Aborted;
                        }
                        Err(err) => {
                            warn!(pos = %goal.target, reason = %err, "goal failed");
                            self.planner.note_failed();
                            self.events.emit(&AgentEvent::GoalFailed {
                                pos: goal.target,
                                reason: err.to_string(),
                            });
                        }
                    }
                    self.push_status();
                }
            }
        }
    }

    /// Run the executor on one goal while still servicing commands; Cancel
    /// flips the cancel watch, and the executor drains at its next
    /// suspension point.
    async fn drive_goal(
        &mut self,
        goal: &mut crate::planner::DigGoal,
    ) -> Result<DigOutcome, GoalError> {
        let executor = &mut self.executor;
        let commands = &mut self.commands;
        let session_state = &mut self.session_state;
        let cancel = &self.cancel;
        let events = &self.events;

        let exec_fut = executor.execute(goal);
        tokio::pin!(exec_fut);
        let mut lost = false;
        loop {
            tokio::select! {
                result = &mut exec_fut => return result,
                command = commands.recv() => {
                    if !matches!(command, Some(Command::Start)) {
                        let _ = cancel.send(true);
                    }
                }
                _ = session_lost(session_state), if !lost => {
                    // The executor drains its in-flight dig via the cancel
                    // signal; the disconnect is recorded here.
                    lost = true;
                    events.emit(&AgentEvent::Disconnected {
                        reason: "connection lost mid-run".to_string(),
                    });
                    let _ = cancel.send(true);
                }
            }
        }
    }

    /// Wait for new world state (or the backoff to elapse) before rescanning
    /// deferred goals. Returns false when the run should abort.
    async fn wait_for_world(&mut self, wait: Duration) -> bool {
        let mut revision = self.world.revision();
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            changed = revision.changed() => {
                if changed.is_err() {
                    self.events.emit(&AgentEvent::Disconnected {
                        reason: "world stream ended".to_string(),
                    });
                    self.planner.cancel();
                    false
                } else {
                    true
                }
            }
            command = self.commands.recv() => {
                if !matches!(command, Some(Command::Start)) {
                    let _ = self.cancel.send(true);
                }
                true
            }
            _ = session_lost(&mut self.session_state) => {
                self.events.emit(&AgentEvent::Disconnected {
                    reason: "connection lost mid-run".to_string(),
                });
                self.planner.cancel();
                false
            }
        }
    }

    fn pump_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            if command == Command::Cancel {
                let _ = self.cancel.send(true);
            }
        }
    }

    fn push_status(&self) {
        let counters = self.planner.counters();
        self.status.send_replace(StatusSnapshot {
            phase: self.planner.phase(),
            current_tool: self.executor.current_tool().map(str::to_string),
            blocks_dug: counters.blocks_dug,
            goals_confirmed: counters.goals_confirmed,
            goals_failed: counters.goals_failed,
            goals_remaining: counters.remaining,
            planned: counters.planned,
            elapsed: self.planner.elapsed(),
        });
    }

    fn report(&self, outcome: RunOutcome) -> RunReport {
        let counters = self.planner.counters();
        RunReport {
            outcome,
            blocks_dug: counters.blocks_dug,
            goals_confirmed: counters.goals_confirmed,
            goals_failed: counters.goals_failed,
            elapsed: self.planner.elapsed(),
        }
    }

    fn emit_final(&self, report: &RunReport) {
        let elapsed_ms = report.elapsed.as_millis() as u64;
        let event = match report.outcome {
            RunOutcome::Completed => AgentEvent::RunCompleted {
                blocks_dug: report.blocks_dug,
                goals_failed: report.goals_failed,
                elapsed_ms,
            },
            RunOutcome::Aborted => AgentEvent::RunAborted {
                blocks_dug: report.blocks_dug,
                goals_failed: report.goals_failed,
                elapsed_ms,
            },
        };
        self.events.emit(&event);
        info!(
            outcome = ?report.outcome,
            blocks_dug = report.blocks_dug,
            goals_failed = report.goals_failed,
            elapsed = ?report.elapsed,
            "run finished"
        );
    }
}

/// Resolves when the session reports Disconnected.
async fn session_lost(state: &mut watch::Receiver<SessionState>) {
    loop {
        if *state.borrow() == SessionState::Disconnected {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}
