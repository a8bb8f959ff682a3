//! Excavation planning: volume sweep, goal queue, deferral, counters.

use quarry_core::BlockPos;
use quarry_world::{BlockQuery, WorldHandle};
use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// The rectangular volume to excavate.
///
/// `interval` is a stride, not exhaustive coverage: the sweep samples every
/// `interval`-th column on X and Z. That mirrors the tool this agent grew out
/// of; making it exhaustive is a product decision, not a planner bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigVolume {
    /// Top-north-west corner of the volume; layers descend from here.
    pub origin: BlockPos,
    /// Extent along X.
    pub width: u32,
    /// Extent along Z.
    pub length: u32,
    /// Number of layers, descending from the origin.
    pub depth: u32,
    /// Sampling stride on X and Z.
    pub interval: u32,
}

impl DigVolume {
    /// Number of goals the sweep will produce:
    /// ceil(width/interval) * ceil(length/interval) * depth.
    pub fn goal_count(&self) -> u64 {
        let i = self.interval.max(1) as u64;
        let columns_x = (self.width as u64).div_ceil(i);
        let columns_z = (self.length as u64).div_ceil(i);
        columns_x * columns_z * self.depth as u64
    }
}

/// Enumerate the sweep: layers by descending Y, row-major X then Z within a
/// layer, striding by the interval.
pub fn plan(volume: &DigVolume) -> Vec<BlockPos> {
    let interval = volume.interval.max(1) as usize;
    let mut targets = Vec::with_capacity(volume.goal_count() as usize);
    for layer in 0..volume.depth {
        let y = volume.origin.y - layer as i32;
        for x in (0..volume.width).step_by(interval) {
            for z in (0..volume.length).step_by(interval) {
                targets.push(BlockPos::new(
                    volume.origin.x + x as i32,
                    y,
                    volume.origin.z + z as i32,
                ));
            }
        }
    }
    targets
}

/// Lifecycle of one dig goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    /// Queued, not yet handed to the executor.
    Pending,
    /// Correct tool is held.
    ToolReady,
    /// Start-dig has been sent.
    Digging,
    /// Server confirmed the removal (or the block vanished on its own).
    Confirmed,
    /// Abandoned.
    Failed,
}

/// One unit of planner work: breaking a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigGoal {
    /// Block to remove.
    pub target: BlockPos,
    /// Current lifecycle state.
    pub state: GoalState,
    /// Dig attempts made by the executor.
    pub dig_attempts: u32,
    /// Times the goal was deferred waiting for its chunk.
    pub defer_attempts: u32,
}

impl DigGoal {
    fn new(target: BlockPos) -> Self {
        Self {
            target,
            state: GoalState::Pending,
            dig_attempts: 0,
            defer_attempts: 0,
        }
    }
}

/// Run-level planner state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerPhase {
    /// No plan yet.
    Idle,
    /// Enumerating the volume.
    Planning,
    /// Working through the queue.
    Executing,
    /// Queue drained.
    Completed,
    /// Cancelled or disconnected before the queue drained.
    Aborted,
}

/// Deferral policy for goals waiting on chunk loads.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Deferral budget per goal before it fails.
    pub max_defer_attempts: u32,
    /// Base backoff between deferral rounds; doubles per round, capped.
    pub defer_backoff: Duration,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            max_defer_attempts: 5,
            defer_backoff: Duration::from_millis(250),
        }
    }
}

/// What the planner wants the run loop to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum NextStep {
    /// An eligible goal: chunk loaded, block known non-air.
    Goal(DigGoal),
    /// The target is already air (removed by another actor); counted as
    /// confirmed, no executor action needed.
    Vanished(BlockPos),
    /// This goal exhausted its deferral budget; counted as failed.
    FailedChunk(DigGoal),
    /// Every queued goal is waiting on a chunk load; retry after the wait.
    Deferred {
        /// Suggested wait before the next scan.
        wait: Duration,
    },
    /// The queue is drained.
    Done,
}

/// Converts a target volume into ordered goals and tracks run progress.
pub struct Planner {
    options: PlannerOptions,
    queue: VecDeque<DigGoal>,
    phase: PlannerPhase,
    planned: u64,
    blocks_dug: u64,
    goals_confirmed: u64,
    goals_failed: u64,
    started: Option<Instant>,
    finished: Option<Instant>,
}

/// Progress counters for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerCounters {
    /// Goals the sweep produced.
    pub planned: u64,
    /// Goals still queued.
    pub remaining: u64,
    /// Server-confirmed removals.
    pub blocks_dug: u64,
    /// Goals that ended Confirmed (including vanished blocks).
    pub goals_confirmed: u64,
    /// Goals that ended Failed.
    pub goals_failed: u64,
}

impl Planner {
    /// Create an idle planner.
    pub fn new(options: PlannerOptions) -> Self {
        Self {
            options,
            queue: VecDeque::new(),
            phase: PlannerPhase::Idle,
            planned: 0,
            blocks_dug: 0,
            goals_confirmed: 0,
            goals_failed: 0,
            started: None,
            finished: None,
        }
    }

    /// Current run phase.
    pub fn phase(&self) -> PlannerPhase {
        self.phase
    }

    /// Enumerate the volume and start executing.
    pub fn start(&mut self, volume: &DigVolume) {
        self.phase = PlannerPhase::Planning;
        self.queue = plan(volume).into_iter().map(DigGoal::new).collect();
        self.planned = self.queue.len() as u64;
        self.started = Some(Instant::now());
        self.phase = PlannerPhase::Executing;
        debug!(goals = self.planned, "plan ready");
    }

    /// Pick the next eligible goal, deferring goals whose chunk has not
    /// loaded rather than discarding them.
    pub fn advance(&mut self, world: &WorldHandle) -> NextStep {
        if self.phase != PlannerPhase::Executing {
            return NextStep::Done;
        }

        let mut min_defer = u32::MAX;
        for _ in 0..self.queue.len() {
            let mut goal = match self.queue.pop_front() {
                Some(goal) => goal,
                None => break,
            };
            match world.block_at(goal.target) {
                BlockQuery::Known(info) if info.id != quarry_core::BLOCK_AIR => {
                    return NextStep::Goal(goal);
                }
                BlockQuery::Known(_) => {
                    self.goals_confirmed += 1;
                    debug!(pos = %goal.target, "target already clear");
                    return NextStep::Vanished(goal.target);
                }
                BlockQuery::Unloaded => {
                    goal.defer_attempts += 1;
                    if goal.defer_attempts > self.options.max_defer_attempts {
                        goal.state = GoalState::Failed;
                        self.goals_failed += 1;
                        return NextStep::FailedChunk(goal);
                    }
                    min_defer = min_defer.min(goal.defer_attempts);
                    self.queue.push_back(goal);
                }
            }
        }

        if self.queue.is_empty() {
            self.phase = PlannerPhase::Completed;
            self.finished = Some(Instant::now());
            return NextStep::Done;
        }

        let shift = min_defer.saturating_sub(1).min(4);
        let base = self.options.defer_backoff * (1u32 << shift);
        // Jitter keeps retry rounds from locking onto the server's chunk
        // streaming cadence.
        let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 4).max(1));
        NextStep::Deferred {
            wait: base + Duration::from_millis(jitter_ms),
        }
    }

    /// Record a goal that ended Confirmed. `dug` is true when the server
    /// confirmed an actual removal (vanished blocks pass false).
    pub fn note_confirmed(&mut self, dug: bool) {
        self.goals_confirmed += 1;
        if dug {
            self.blocks_dug += 1;
        }
    }

    /// Record a goal that ended Failed.
    pub fn note_failed(&mut self) {
        self.goals_failed += 1;
    }

    /// Stop executing; queued goals are dropped, the in-flight goal is the
    /// executor's to drain.
    pub fn cancel(&mut self) {
        if matches!(self.phase, PlannerPhase::Executing | PlannerPhase::Planning) {
            self.phase = PlannerPhase::Aborted;
            self.finished = Some(Instant::now());
            self.queue.clear();
        }
    }

    /// Progress counters.
    pub fn counters(&self) -> PlannerCounters {
        PlannerCounters {
            planned: self.planned,
            remaining: self.queue.len() as u64,
            blocks_dug: self.blocks_dug,
            goals_confirmed: self.goals_confirmed,
            goals_failed: self.goals_failed,
        }
    }

    /// Wall-clock time spent since the plan started.
    pub fn elapsed(&self) -> Duration {
        match (self.started, self.finished) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quarry_core::{ChunkPos, CHUNK_VOLUME};
    use quarry_net::{encode_chunk_payload, Clientbound};
    use quarry_world::{spawn_world_task, WorldModel, WorldOptions};
    use std::collections::HashSet;
    use tokio::sync::{broadcast, watch};

    fn volume(width: u32, length: u32, depth: u32, interval: u32) -> DigVolume {
        DigVolume {
            origin: BlockPos::new(0, 64, 0),
            width,
            length,
            depth,
            interval,
        }
    }

    proptest! {
        /// Property: the sweep produces exactly ceil(w/i)*ceil(l/i)*d goals
        /// with unique coordinates on the expected lattice.
        #[test]
        fn sweep_enumerates_the_lattice(
            width in 1u32..24,
            length in 1u32..24,
            depth in 1u32..8,
            interval in 1u32..6,
        ) {
            let volume = volume(width, length, depth, interval);
            let targets = plan(&volume);

            prop_assert_eq!(targets.len() as u64, volume.goal_count());

            let unique: HashSet<_> = targets.iter().copied().collect();
            prop_assert_eq!(unique.len(), targets.len());

            for target in &targets {
                let dx = (target.x - volume.origin.x) as u32;
                let dz = (target.z - volume.origin.z) as u32;
                let dy = (volume.origin.y - target.y) as u32;
                prop_assert!(dx < width && dx % interval == 0);
                prop_assert!(dz < length && dz % interval == 0);
                prop_assert!(dy < depth);
            }
        }
    }

    #[test]
    fn test_sweep_descends_layer_by_layer() {
        let targets = plan(&volume(2, 2, 3, 1));
        // First layer is at the origin Y, each subsequent layer one below.
        assert!(targets[..4].iter().all(|t| t.y == 64));
        assert!(targets[4..8].iter().all(|t| t.y == 63));
        assert!(targets[8..].iter().all(|t| t.y == 62));
        // Row-major within a layer: X varies slower than Z.
        assert_eq!(targets[0], BlockPos::new(0, 64, 0));
        assert_eq!(targets[1], BlockPos::new(0, 64, 1));
        assert_eq!(targets[2], BlockPos::new(1, 64, 0));
    }

    #[test]
    fn test_interval_strides_not_exhaustive() {
        let targets = plan(&volume(10, 10, 1, 5));
        // ceil(10/5)^2 * 1 = 4 goals, at the stride lattice points.
        assert_eq!(targets.len(), 4);
        let xs: HashSet<i32> = targets.iter().map(|t| t.x).collect();
        assert_eq!(xs, HashSet::from([0, 5]));
    }

    async fn loaded_world(fill: u16) -> (WorldHandle, broadcast::Sender<Clientbound>) {
        let (bus_tx, bus_rx) = broadcast::channel(16);
        let (_center_tx, center_rx) = watch::channel(BlockPos::new(0, 64, 0));
        let (world, _task) =
            spawn_world_task(WorldModel::new(WorldOptions::default()), bus_rx, center_rx);
        let chunk = encode_chunk_payload(0, 0, &vec![fill; CHUNK_VOLUME]).expect("encode");
        bus_tx
            .send(Clientbound::ChunkData(chunk))
            .expect("bus send");
        let mut revision = world.revision();
        revision.changed().await.expect("chunk applied");
        (world, bus_tx)
    }

    #[tokio::test]
    async fn test_advance_returns_eligible_goal() {
        let (world, _bus) = loaded_world(1).await;
        let mut planner = Planner::new(PlannerOptions::default());
        planner.start(&volume(2, 2, 1, 1));

        match planner.advance(&world) {
            NextStep::Goal(goal) => assert_eq!(goal.target, BlockPos::new(0, 64, 0)),
            other => panic!("expected a goal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vanished_target_counts_confirmed_without_action() {
        let (world, _bus) = loaded_world(0).await;
        let mut planner = Planner::new(PlannerOptions::default());
        planner.start(&volume(1, 1, 1, 1));

        assert_eq!(
            planner.advance(&world),
            NextStep::Vanished(BlockPos::new(0, 64, 0))
        );
        assert_eq!(planner.counters().goals_confirmed, 1);
        assert_eq!(planner.counters().blocks_dug, 0);
        assert_eq!(planner.advance(&world), NextStep::Done);
        assert_eq!(planner.phase(), PlannerPhase::Completed);
    }

    #[tokio::test]
    async fn test_unloaded_chunk_defers_then_fails() {
        // World task with no chunks; the goal's chunk never loads.
        let (bus_tx, bus_rx) = broadcast::channel(16);
        let (_center_tx, center_rx) = watch::channel(BlockPos::new(0, 64, 0));
        let (world, _task) =
            spawn_world_task(WorldModel::new(WorldOptions::default()), bus_rx, center_rx);
        let _keep_bus_open = bus_tx;

        let options = PlannerOptions {
            max_defer_attempts: 3,
            defer_backoff: Duration::from_millis(10),
        };
        let mut planner = Planner::new(options);
        planner.start(&volume(1, 1, 1, 1));

        for round in 1..=3 {
            match planner.advance(&world) {
                NextStep::Deferred { wait } => {
                    assert!(wait >= Duration::from_millis(10), "round {round}");
                }
                other => panic!("round {round}: expected deferral, got {other:?}"),
            }
        }
        match planner.advance(&world) {
            NextStep::FailedChunk(goal) => {
                assert_eq!(goal.state, GoalState::Failed);
                assert_eq!(goal.target.chunk(), ChunkPos::new(0, 0));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(planner.counters().goals_failed, 1);
        assert_eq!(planner.advance(&world), NextStep::Done);
    }

    #[tokio::test]
    async fn test_cancel_aborts_and_drops_queue() {
        let (world, _bus) = loaded_world(1).await;
        let mut planner = Planner::new(PlannerOptions::default());
        planner.start(&volume(4, 4, 2, 1));
        planner.cancel();

        assert_eq!(planner.phase(), PlannerPhase::Aborted);
        assert_eq!(planner.counters().remaining, 0);
        assert_eq!(planner.advance(&world), NextStep::Done);
    }
}
