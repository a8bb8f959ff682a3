//! End-to-end excavation scenarios against the mock server.

use quarry_agent::{
    AgentConfig, AgentEvent, AgentHandle, DigVolume, ExcavationRun, MemorySink, PlannerOptions,
    PlannerPhase, RunOutcome, RunReport,
};
use quarry_core::BlockPos;
use quarry_net::{DigActionKind, OfflineAuth, Session, SessionOptions};
use quarry_testkit::{uniform_chunk, ChunkSpec, MockServer, MockServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const STONE: u16 = 1;
const DIRT: u16 = 4;

fn volume(width: u32, length: u32, depth: u32, interval: u32) -> DigVolume {
    DigVolume {
        origin: BlockPos::new(0, 64, 0),
        width,
        length,
        depth,
        interval,
    }
}

/// Connect a session and wire a run over it; the caller drives the handle.
async fn launch(
    server: &MockServer,
    config: AgentConfig,
) -> (
    Session,
    JoinHandle<RunReport>,
    AgentHandle,
    Arc<MemorySink>,
) {
    let auth = OfflineAuth::new("digger");
    let session = Session::connect(&server.addr(), &auth, SessionOptions::default())
        .await
        .expect("connect succeeds");
    let events = Arc::new(MemorySink::new());
    let (run, handle) = ExcavationRun::new(&session, config, events.clone());
    let task = tokio::spawn(run.run());
    (session, task, handle, events)
}

#[tokio::test]
async fn test_small_stone_volume_digs_clean() {
    let server = MockServer::spawn(MockServerConfig {
        chunks: vec![ChunkSpec {
            x: 0,
            z: 0,
            blocks: uniform_chunk(STONE),
        }],
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let config = AgentConfig {
        volume: volume(2, 2, 1, 1),
        ..AgentConfig::default()
    };
    let (session, task, handle, events) = launch(&server, config).await;

    assert!(handle.start().await);
    let report = task.await.expect("run task");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_dug, 4);
    assert_eq!(report.goals_confirmed, 4);
    assert_eq!(report.goals_failed, 0);

    let confirmed = events
        .events()
        .iter()
        .filter(|event| matches!(event, AgentEvent::BlockConfirmed { .. }))
        .count();
    assert_eq!(confirmed, 4);

    // Stone resolves to the pickaxe once; staying on it issues no further
    // hot-bar traffic.
    let tool_changes: Vec<String> = events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            AgentEvent::ToolChanged { tool } => Some(tool),
            _ => None,
        })
        .collect();
    assert_eq!(tool_changes, vec!["wooden_pickaxe".to_string()]);

    let digs = server.dig_actions();
    let starts = digs
        .iter()
        .filter(|(action, _)| *action == DigActionKind::Start)
        .count();
    assert_eq!(starts, 4);
    assert!(
        !digs
            .iter()
            .any(|(action, _)| *action == DigActionKind::Cancel),
        "clean digs never cancel"
    );

    assert_eq!(handle.status().phase, PlannerPhase::Completed);

    session.close("test done").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_unloaded_chunk_fails_goals_but_completes_run() {
    // The server discloses nothing around (100, 100); every goal exhausts its
    // deferral budget.
    let server = MockServer::spawn(MockServerConfig::default())
        .await
        .expect("spawn mock server");

    let config = AgentConfig {
        volume: DigVolume {
            origin: BlockPos::new(100, 64, 100),
            width: 2,
            length: 2,
            depth: 1,
            interval: 1,
        },
        planner: PlannerOptions {
            max_defer_attempts: 2,
            defer_backoff: Duration::from_millis(50),
        },
        ..AgentConfig::default()
    };
    let (session, task, handle, events) = launch(&server, config).await;

    assert!(handle.start().await);
    let report = task.await.expect("run task");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_dug, 0);
    assert_eq!(report.goals_failed, 4);

    let failures = events
        .events()
        .iter()
        .filter(|event| matches!(event, AgentEvent::GoalFailed { .. }))
        .count();
    assert_eq!(failures, 4);

    session.close("test done").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_cancel_mid_dig_pairs_start_with_cancel() {
    // The server never confirms digs, so the first goal is still in flight
    // when the cancel lands.
    let server = MockServer::spawn(MockServerConfig {
        chunks: vec![ChunkSpec {
            x: 0,
            z: 0,
            blocks: uniform_chunk(STONE),
        }],
        confirm_digs: false,
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let config = AgentConfig {
        volume: volume(2, 2, 1, 1),
        ..AgentConfig::default()
    };
    let (session, task, handle, _events) = launch(&server, config).await;

    assert!(handle.start().await);
    sleep(Duration::from_millis(400)).await;
    assert!(handle.cancel().await);

    let report = task.await.expect("run task");
    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.blocks_dug, 0);

    // Let the goodbye traffic reach the mock.
    sleep(Duration::from_millis(200)).await;

    let digs = server.dig_actions();
    assert!(
        matches!(digs.first(), Some((DigActionKind::Start, _))),
        "a dig was in flight, got {digs:?}"
    );
    assert!(
        digs.iter()
            .any(|(action, _)| *action == DigActionKind::Cancel),
        "the in-flight start is paired with a cancel, got {digs:?}"
    );
    assert!(
        !digs
            .iter()
            .any(|(action, _)| *action == DigActionKind::Finish),
        "a cancelled dig is never finished"
    );

    session.close("test done").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_dirt_selects_the_shovel() {
    let server = MockServer::spawn(MockServerConfig {
        chunks: vec![ChunkSpec {
            x: 0,
            z: 0,
            blocks: uniform_chunk(DIRT),
        }],
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let config = AgentConfig {
        volume: volume(1, 1, 1, 1),
        ..AgentConfig::default()
    };
    let (session, task, handle, events) = launch(&server, config).await;

    assert!(handle.start().await);
    let report = task.await.expect("run task");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_dug, 1);
    assert!(events
        .events()
        .iter()
        .any(|event| matches!(event, AgentEvent::ToolChanged { tool } if tool == "wooden_shovel")));

    session.close("test done").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_mid_run_aborts_and_keeps_counters() {
    let server = MockServer::spawn(MockServerConfig {
        chunks: vec![ChunkSpec {
            x: 0,
            z: 0,
            blocks: uniform_chunk(STONE),
        }],
        disconnect_after_digs: Some(2),
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let config = AgentConfig {
        volume: volume(2, 2, 1, 1),
        ..AgentConfig::default()
    };
    let (session, task, handle, events) = launch(&server, config).await;

    assert!(handle.start().await);
    let report = task.await.expect("run task");

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.blocks_dug, 2, "confirmed work is never lost");
    assert!(events
        .events()
        .iter()
        .any(|event| matches!(event, AgentEvent::Disconnected { .. })));
    assert!(events.events().iter().any(|event| matches!(
        event,
        AgentEvent::RunAborted { blocks_dug: 2, .. }
    )));

    drop(session);
    server.shutdown().await;
}

#[tokio::test]
async fn test_late_chunk_defers_then_digs() {
    let server = MockServer::spawn(MockServerConfig {
        chunks: vec![ChunkSpec {
            x: 0,
            z: 0,
            blocks: uniform_chunk(STONE),
        }],
        chunk_delay: Some(Duration::from_millis(300)),
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let config = AgentConfig {
        volume: volume(1, 1, 1, 1),
        planner: PlannerOptions {
            max_defer_attempts: 20,
            defer_backoff: Duration::from_millis(100),
        },
        ..AgentConfig::default()
    };
    let (session, task, handle, _events) = launch(&server, config).await;

    assert!(handle.start().await);
    let report = task.await.expect("run task");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.blocks_dug, 1);
    assert_eq!(report.goals_failed, 0);

    session.close("test done").await;
    server.shutdown().await;
}
