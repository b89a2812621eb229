//! Host agent runtime.
//!
//! Wires the controller connection, command execution, process supervision
//! and the recent-log window into one [`Agent`] value.

pub mod agent;
pub mod config;
pub mod heartbeat;
pub mod logger;

pub use agent::Agent;
pub use config::{AgentConfig, ConfigError};
pub use logger::AgentLogger;

/// Version reported in heartbeats.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
