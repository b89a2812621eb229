//! Kinds of supervised processes.

use serde::{Deserialize, Serialize};

/// What a supervised process is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessKind {
    /// Long-running daemon.
    #[default]
    Service,
    /// Job expected to finish on its own.
    Task,
    /// Script run through an interpreter.
    Script,
}
