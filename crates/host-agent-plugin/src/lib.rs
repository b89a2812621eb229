//! Supervision of named processes started on the controller's behalf.
//!
//! Provides:
//! - `PluginManager` - Start, stop and track long-running processes
//! - Output wiring through a `LineSink` plus structured-message decoding

pub mod manager;

pub use host_agent_core::ProcessKind;
pub use manager::{PluginError, PluginManager, ProcessInfo, ProcessState};
