//! Terminal result of a one-shot command execution.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Exit code reported when the deadline expired.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Error message reported when the deadline expired.
pub const TIMEOUT_MESSAGE: &str = "command timed out";

/// Terminal execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    /// Process exited with status zero.
    Success,
    /// Process could not be started or exited unsuccessfully.
    Failed,
    /// Deadline expired and the process was killed.
    Timeout,
}

/// Result reported once a command has fully finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutcome {
    pub status: ExecStatus,
    pub exit_code: i32,
    #[serde(serialize_with = "rfc3339")]
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "rfc3339")]
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub output_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecOutcome {
    /// Build an outcome finishing now.
    #[must_use]
    pub fn finish(
        started_at: DateTime<Utc>,
        status: ExecStatus,
        exit_code: i32,
        output_preview: String,
        error_message: Option<String>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            status,
            exit_code,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            output_preview,
            error_message,
        }
    }

    /// Outcome for a process that never started.
    #[must_use]
    pub fn failed_to_start(started_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::finish(started_at, ExecStatus::Failed, 1, String::new(), Some(message.into()))
    }

    /// Outcome for a process killed at its deadline.
    #[must_use]
    pub fn timed_out(started_at: DateTime<Utc>, output_preview: String) -> Self {
        Self::finish(
            started_at,
            ExecStatus::Timeout,
            TIMEOUT_EXIT_CODE,
            output_preview,
            Some(TIMEOUT_MESSAGE.to_string()),
        )
    }
}

fn rfc3339<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}
