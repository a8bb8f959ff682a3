//! quarry - automated excavation agent for voxel game servers.
//!
//! The binary is the thin collaborator around the core: it loads settings,
//! sets up logging and the event sinks, connects the session, and relays
//! console commands to the run without ever blocking the core on stdin.

mod config;

use anyhow::{Context, Result};
use async_trait::async_trait;
use config::{AuthMode, CliOptions, QuarrySettings};
use quarry_agent::{
    AgentHandle, EventSink, ExcavationRun, FanoutSink, JsonlSink, RunOutcome, TracingSink,
};
use quarry_net::{AuthScheme, OfflineAuth, OnlineAuth, Session, SessionOptions, TokenProvider};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliOptions::parse(env::args().skip(1));
    let mut settings = match &cli.config {
        Some(path) => QuarrySettings::load_from_path(path),
        None => QuarrySettings::load(),
    };
    cli.apply(&mut settings);

    // Default level follows debug.enabled; RUST_LOG overrides both.
    let default_level = if settings.debug.enabled { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting quarry v{}", env!("CARGO_PKG_VERSION"));
    info!(
        area = format!(
            "{}x{}x{}",
            settings.dig.width, settings.dig.length, settings.dig.depth
        ),
        interval = settings.dig.interval,
        server = settings.address(),
        "configuration loaded"
    );

    let events = build_event_sink(&settings)?;
    let auth = build_auth(&settings);
    let session = Session::connect(&settings.address(), auth.as_ref(), SessionOptions::default())
        .await
        .context("failed to establish the session")?;

    let (run, handle) = ExcavationRun::new(&session, settings.agent_config(), events);
    let run_task = tokio::spawn(run.run());

    spawn_command_reader(handle.clone());
    spawn_interrupt_handler(handle.clone());

    handle.start().await;

    let report = run_task.await.context("run task panicked")?;

    println!("----------------------------------------");
    match report.outcome {
        RunOutcome::Completed => println!("Dig operation completed"),
        RunOutcome::Aborted => println!("Dig operation aborted"),
    }
    println!("Blocks dug:   {}", report.blocks_dug);
    println!("Goals failed: {}", report.goals_failed);
    println!("Time taken:   {:.1?}", report.elapsed);

    session.close("run finished").await;
    Ok(())
}

fn build_auth(settings: &QuarrySettings) -> Box<dyn AuthScheme> {
    match settings.auth.mode {
        AuthMode::Offline => Box::new(OfflineAuth::new(settings.auth.username.clone())),
        AuthMode::Online => Box::new(OnlineAuth::new(
            settings.auth.username.clone(),
            EnvTokenProvider,
        )),
    }
}

fn build_event_sink(settings: &QuarrySettings) -> Result<Arc<dyn EventSink>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if let Some(path) = &settings.log.path {
        let sink = JsonlSink::create(path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }
    Ok(Arc::new(FanoutSink::new(sinks)))
}

/// Token acquisition is delegated to the environment; a launcher or wrapper
/// script owns the actual credential exchange.
struct EnvTokenProvider;

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn session_token(&self, _username: &str) -> anyhow::Result<String> {
        env::var("QUARRY_SESSION_TOKEN")
            .context("QUARRY_SESSION_TOKEN is not set; online auth needs an external token")
    }
}

/// Console commands are read on their own task; the core never blocks on
/// stdin.
fn spawn_command_reader(handle: AgentHandle) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "start" => {
                    handle.start().await;
                }
                "cancel" | "stop" => {
                    handle.cancel().await;
                }
                "status" => {
                    let status = handle.status();
                    println!(
                        "phase: {:?} | tool: {} | dug: {} | failed: {} | remaining: {} | elapsed: {:.1?}",
                        status.phase,
                        status.current_tool.as_deref().unwrap_or("none"),
                        status.blocks_dug,
                        status.goals_failed,
                        status.goals_remaining,
                        status.elapsed,
                    );
                }
                "" => {}
                other => println!("unknown command: {other} (start | cancel | status)"),
            }
        }
    });
}

fn spawn_interrupt_handler(handle: AgentHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            handle.cancel().await;
        }
    });
}
