//! Core abstractions shared by the host agent crates.
//!
//! This crate provides the fundamental building blocks:
//! - `LogBuffer` - Bounded recent-log window used for replay
//! - `LineSink` - Observer contract for live process output
//! - `ExecOutcome` - Terminal result of a one-shot command execution
//! - `ProcessKind` - Role of a supervised process, shared with the wire protocol

pub mod execution;
pub mod log_buffer;
pub mod process;
pub mod traits;

pub use execution::{ExecOutcome, ExecStatus};
pub use log_buffer::LogBuffer;
pub use process::ProcessKind;
pub use traits::{LineSink, NullSink};
