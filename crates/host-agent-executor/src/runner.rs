//! One-shot command execution with a deadline, live output and a bounded preview.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use command_group::AsyncCommandGroup;
use futures::future::join_all;
use host_agent_core::{ExecOutcome, ExecStatus, LineSink};
use tokio::{io::AsyncRead, task::JoinHandle};

use crate::{
    command::{Platform, shell_invocation},
    lines::pump_lines,
    preview::{PREVIEW_CAP, Preview},
};

/// Deadline applied when a request does not carry a usable one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A single command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub request_id: String,
    pub command: String,
    pub timeout: Duration,
}

impl ExecRequest {
    /// Create a request, falling back to `default_timeout` when `timeout_ms`
    /// is absent or not positive.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: impl Into<String>,
        timeout_ms: Option<i64>,
        default_timeout: Duration,
    ) -> Self {
        let timeout = timeout_ms
            .filter(|ms| *ms > 0)
            .and_then(|ms| u64::try_from(ms).ok())
            .map_or(default_timeout, Duration::from_millis);
        Self {
            request_id: request_id.into(),
            command: command.into(),
            timeout,
        }
    }
}

/// Runs shell commands to completion.
///
/// Each run spawns the platform shell in its own process group, streams
/// every stdout/stderr line to the supplied sink, and keeps a capped
/// preview for the final [`ExecOutcome`].
#[derive(Debug, Clone, Copy)]
pub struct CommandRunner {
    platform: Platform,
    preview_cap: usize,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

impl CommandRunner {
    /// Create a runner for `platform` with the default preview budget.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self {
            platform,
            preview_cap: PREVIEW_CAP,
        }
    }

    /// Override the preview budget.
    #[must_use]
    pub const fn with_preview_cap(mut self, preview_cap: usize) -> Self {
        self.preview_cap = preview_cap;
        self
    }

    /// Run `request` and return its terminal outcome.
    ///
    /// The outcome is produced only after both output readers drained and
    /// the process was reaped. If that has not happened by the deadline, the
    /// whole process group is killed and the outcome is [`ExecStatus::Timeout`].
    pub async fn run(&self, request: &ExecRequest, sink: Arc<dyn LineSink>) -> ExecOutcome {
        let started_at = Utc::now();
        let parts = shell_invocation(self.platform, &request.command);

        let mut child = match parts.to_command().group_spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(request_id = %request.request_id, error = %e, "Failed to spawn command");
                return ExecOutcome::failed_to_start(started_at, e.to_string());
            }
        };

        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "Failed to kill command without output pipes");
            }
            return ExecOutcome::failed_to_start(started_at, "failed to capture command output");
        };

        let preview = Arc::new(Preview::new(self.preview_cap));
        let mut drained = std::pin::pin!(join_all([
            spawn_reader(stdout, Arc::clone(&sink), Arc::clone(&preview)),
            spawn_reader(stderr, sink, Arc::clone(&preview)),
        ]));

        // A descendant left in the background can hold the pipes open after
        // the shell exits, so the deadline covers draining as well.
        let finished = tokio::time::timeout(request.timeout, async {
            let status = child.wait().await;
            (status, drained.as_mut().await)
        })
        .await;

        let (waited, joined) = match finished {
            Ok((status, joined)) => (Some(status), joined),
            Err(_) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    timeout = ?request.timeout,
                    "Command deadline expired, killing process group"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(request_id = %request.request_id, error = %e, "Failed to kill timed out command");
                }
                (None, drained.await)
            }
        };

        for result in joined {
            if let Err(e) = result {
                tracing::error!(request_id = %request.request_id, error = %e, "Output reader task failed");
            }
        }

        let output_preview = preview.finish();
        match waited {
            None => ExecOutcome::timed_out(started_at, output_preview),
            Some(Ok(status)) if status.success() => {
                ExecOutcome::finish(started_at, ExecStatus::Success, 0, output_preview, None)
            }
            Some(Ok(status)) => {
                let exit_code = status.code().filter(|code| *code != 0).unwrap_or(1);
                ExecOutcome::finish(
                    started_at,
                    ExecStatus::Failed,
                    exit_code,
                    output_preview,
                    Some(status.to_string()),
                )
            }
            Some(Err(e)) => ExecOutcome::finish(
                started_at,
                ExecStatus::Failed,
                1,
                output_preview,
                Some(e.to_string()),
            ),
        }
    }
}

fn spawn_reader<R>(reader: R, sink: Arc<dyn LineSink>, preview: Arc<Preview>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = pump_lines(reader, |line| {
            sink.emit(&line);
            preview.push_line(&line);
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Error reading command output");
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        sync::Mutex,
        time::{Duration, Instant},
    };

    use super::*;

    fn collecting_sink() -> (Arc<dyn LineSink>, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink: Arc<dyn LineSink> = Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string());
        });
        (sink, lines)
    }

    fn request(command: &str, timeout_ms: Option<i64>) -> ExecRequest {
        ExecRequest::new("req-1", command, timeout_ms, DEFAULT_TIMEOUT)
    }

    #[test]
    fn test_request_timeout_defaults() {
        assert_eq!(request("true", None).timeout, DEFAULT_TIMEOUT);
        assert_eq!(request("true", Some(0)).timeout, DEFAULT_TIMEOUT);
        assert_eq!(request("true", Some(-5)).timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            request("true", Some(1500)).timeout,
            Duration::from_millis(1500)
        );
    }

    #[tokio::test]
    async fn test_echo_succeeds() {
        let (sink, lines) = collecting_sink();
        let outcome = CommandRunner::default()
            .run(&request("echo hello", None), sink)
            .await;
        assert_eq!(outcome.status, ExecStatus::Success);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.output_preview, "hello");
        assert!(outcome.error_message.is_none());
        assert!(outcome.finished_at >= outcome.started_at);
        assert_eq!(*lines.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let (sink, lines) = collecting_sink();
        let outcome = CommandRunner::default()
            .run(&request("echo oops >&2; exit 3", None), sink)
            .await;
        assert_eq!(outcome.status, ExecStatus::Failed);
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.output_preview, "oops");
        assert!(outcome.error_message.is_some());
        assert_eq!(*lines.lock().unwrap(), vec!["oops"]);
    }

    #[tokio::test]
    async fn test_deadline_kills_the_process() {
        let (sink, _lines) = collecting_sink();
        let started = Instant::now();
        let outcome = CommandRunner::default()
            .run(&request("echo $$; sleep 30", Some(300)), sink)
            .await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.status, ExecStatus::Timeout);
        assert_eq!(outcome.exit_code, -1);
        assert!(!outcome.error_message.unwrap_or_default().is_empty());

        // the shell printed its pid, which is also the process group id
        let pid: i32 = outcome.output_preview.parse().unwrap();
        let probe = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .unwrap();
        assert!(!probe.success(), "process {pid} still running");
    }

    #[tokio::test]
    async fn test_background_child_holding_output_cannot_outlive_deadline() {
        let (sink, lines) = collecting_sink();
        let started = Instant::now();
        let outcome = CommandRunner::default()
            .run(&request("sleep 30 & echo hi", Some(300)), sink)
            .await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.status, ExecStatus::Timeout);
        assert_eq!(outcome.exit_code, -1);
        assert_eq!(outcome.output_preview, "hi");
        assert_eq!(*lines.lock().unwrap(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_preview_is_capped_but_every_line_is_streamed() {
        let (sink, lines) = collecting_sink();
        // 30 lines of 100 digits each, far more than the preview budget
        let outcome = CommandRunner::default()
            .run(&request("for i in $(seq 1 30); do printf '%0100d\\n' $i; done", None), sink)
            .await;
        assert_eq!(outcome.status, ExecStatus::Success);
        assert_eq!(outcome.output_preview.len(), PREVIEW_CAP);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 30);
        assert!(lines.iter().all(|l| l.len() == 100));
        assert!(lines[29].ends_with("30"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let (sink, _lines) = collecting_sink();
        let outcome = CommandRunner::default()
            .run(&request("definitely-not-a-real-command-4711", None), sink)
            .await;
        assert_eq!(outcome.status, ExecStatus::Failed);
        assert_eq!(outcome.exit_code, 127);
    }

    #[tokio::test]
    async fn test_custom_preview_cap() {
        let (sink, _lines) = collecting_sink();
        let outcome = CommandRunner::default()
            .with_preview_cap(5)
            .run(&request("echo abcdefghij", None), sink)
            .await;
        assert_eq!(outcome.output_preview, "abcde");
    }
}
