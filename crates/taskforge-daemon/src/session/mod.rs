//! Agent session supervision.
//!
//! One external agent process per session. The manager owns the process
//! handles exclusively; callers only ever hold session ids. Process I/O is
//! bridged onto a typed broadcast channel, and idle sessions are reclaimed
//! automatically.

pub mod manager;
pub mod process;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{SessionManager, SessionManagerConfig, SessionOptions};
pub use process::{AgentRunner, ProcessRunner, ProcessSignal, ProcessSpec, ProcessWaiter, SpawnedProcess};
pub use types::{SessionError, SessionEvent, SessionInfo, SessionInput};
