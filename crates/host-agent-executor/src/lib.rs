//! Process execution for the host agent.
//!
//! Provides:
//! - Command resolution (shell wrapping, script interpreters)
//! - `CommandRunner` - One-shot execution with deadline and output preview
//! - Structured output protocol decoding
//! - Line-oriented stream reading shared with supervised processes

pub mod command;
pub mod lines;
pub mod preview;
pub mod runner;
pub mod structured;

pub use command::{CommandParts, Platform, resolve_invocation, shell_invocation};
pub use lines::pump_lines;
pub use preview::{PREVIEW_CAP, Preview};
pub use runner::{CommandRunner, DEFAULT_TIMEOUT, ExecRequest};
pub use structured::{DecodedLine, MAGIC_PREFIX, MessageKind, StructuredMessage, decode_line};
