//! Structured domain events and pluggable sinks.
//!
//! Components never log domain events through a global; they emit through an
//! injected [`EventSink`] configured once at startup. Diagnostic logging
//! stays on `tracing`.

use quarry_core::BlockPos;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Domain event emitted by the excavation agent.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Session established and logged in.
    Connected {
        /// Confirmed username.
        username: String,
        /// Server-assigned session identity.
        session_id: u64,
    },
    /// The held tool changed.
    ToolChanged {
        /// Tool now held.
        tool: String,
    },
    /// The held tool ran out of durability.
    ToolBroken {
        /// Tool that broke.
        tool: String,
    },
    /// The server confirmed a block removal.
    BlockConfirmed {
        /// Position that was cleared.
        pos: BlockPos,
        /// Material that was removed.
        material: String,
    },
    /// A goal was abandoned.
    GoalFailed {
        /// Target of the failed goal.
        pos: BlockPos,
        /// Failure description.
        reason: String,
    },
    /// The session ended.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
    /// The run finished its plan.
    RunCompleted {
        /// Server-confirmed removals.
        blocks_dug: u64,
        /// Goals that ended Failed.
        goals_failed: u64,
        /// Wall-clock run time in milliseconds.
        elapsed_ms: u64,
    },
    /// The run stopped before finishing its plan.
    RunAborted {
        /// Server-confirmed removals up to the abort.
        blocks_dug: u64,
        /// Goals that ended Failed.
        goals_failed: u64,
        /// Wall-clock run time in milliseconds.
        elapsed_ms: u64,
    },
}

/// Destination for domain events. Injected, never ambient.
pub trait EventSink: Send + Sync {
    /// Record one event.
    fn emit(&self, event: &AgentEvent);
}

/// Sink that forwards events to `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &AgentEvent) {
        info!(?event, "agent event");
    }
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    file: Mutex<File>,
}

impl JsonlSink {
    /// Create a new sink at `path`, truncating any existing log.
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &AgentEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!("failed to serialize event: {err}");
                return;
            }
        };
        let mut file = self.file.lock().expect("event log lock poisoned");
        if let Err(err) = file
            .write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
        {
            warn!("failed to write event log: {err}");
        }
    }
}

/// Sink that retains events in memory, for tests and status UIs.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AgentEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &AgentEvent) {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event.clone());
    }
}

/// Sink that forwards each event to several others.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Combine several sinks into one.
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &AgentEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_retains_order() {
        let sink = MemorySink::new();
        sink.emit(&AgentEvent::ToolChanged {
            tool: "wooden_pickaxe".to_string(),
        });
        sink.emit(&AgentEvent::BlockConfirmed {
            pos: BlockPos::new(1, 2, 3),
            material: "stone".to_string(),
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::ToolChanged { .. }));
    }

    #[test]
    fn test_jsonl_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let sink = JsonlSink::create(&path).expect("create sink");

        sink.emit(&AgentEvent::Connected {
            username: "digger".to_string(),
            session_id: 7,
        });
        sink.emit(&AgentEvent::Disconnected {
            reason: "done".to_string(),
        });
        drop(sink);

        let contents = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"connected\""));
        assert!(lines[1].contains("\"disconnected\""));
    }

    #[test]
    fn test_fanout_reaches_all_sinks() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![first.clone(), second.clone()]);
        fanout.emit(&AgentEvent::ToolBroken {
            tool: "wooden_shovel".to_string(),
        });
        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 1);
    }
}
