#![warn(missing_docs)]
//! Excavation agent: inventory, tool selection, planning, and execution.

pub mod error;
pub mod event;
pub mod executor;
pub mod hardness;
pub mod inventory;
pub mod planner;
pub mod run;
pub mod tools;

pub use error::GoalError;
pub use event::{AgentEvent, EventSink, FanoutSink, JsonlSink, MemorySink, TracingSink};
pub use executor::{DigOutcome, Executor, ExecutorOptions};
pub use inventory::{spawn_inventory_task, DurabilityOutcome, Inventory, InventoryHandle};
pub use planner::{
    plan, DigGoal, DigVolume, GoalState, NextStep, Planner, PlannerCounters, PlannerOptions,
    PlannerPhase,
};
pub use run::{
    AgentConfig, AgentHandle, Command, ExcavationRun, RunOutcome, RunReport, StatusSnapshot,
};
pub use tools::{ToolBindings, ToolController};
