//! Execution orchestration.
//!
//! The orchestrator wires the worktree manager, the per-worktree queues, and
//! the session manager into the full execute-task flow; the registry is the
//! thin per-user directory callers go through.

pub mod orchestrator;
pub mod registry;
pub mod types;

pub use orchestrator::{ExecutionOrchestrator, OrchestratorConfig, OrchestratorError};
pub use registry::AgentRegistry;
pub use types::{
    ExecutionOptions, ExecutionPhase, ExecutionResult, ExecutionSnapshot, StartAck, StartRequest,
};
