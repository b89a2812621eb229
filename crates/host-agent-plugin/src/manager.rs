//! Plugin manager for supervising named, long-running processes.

use std::{collections::HashMap, fmt, sync::Arc};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use host_agent_core::{LineSink, ProcessKind};
use host_agent_executor::{DecodedLine, Platform, decode_line, pump_lines, resolve_invocation};
use serde::{Deserialize, Serialize};
use tokio::{
    io::AsyncRead,
    sync::{Mutex, oneshot},
    task::JoinHandle,
};

/// Plugin manager error.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Process already running: {0}")]
    AlreadyRunning(String),
    #[error("Process not found: {0}")]
    NotFound(String),
    #[error("Failed to start {id}: {source}")]
    Spawn {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Output pipes unavailable for {0}")]
    MissingPipe(String),
}

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    /// Id reserved, process being spawned.
    Starting,
    /// Process spawned and supervised.
    Running,
    /// Exit observed; output still draining before the entry is removed.
    Exited,
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub id: String,
    pub kind: ProcessKind,
    pub state: ProcessState,
    pub pid: Option<u32>,
}

/// Registry entry.
struct ActiveProcess {
    kind: ProcessKind,
    state: ProcessState,
    pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<()>>,
    stop_requested: bool,
}

impl ActiveProcess {
    const fn starting(kind: ProcessKind) -> Self {
        Self {
            kind,
            state: ProcessState::Starting,
            pid: None,
            stop_tx: None,
            stop_requested: false,
        }
    }
}

struct Inner {
    processes: Mutex<HashMap<String, ActiveProcess>>,
    sink: Arc<dyn LineSink>,
    platform: Platform,
}

/// Starts, stops and tracks named processes.
///
/// An id stays registered from `start` until the process has exited and both
/// of its output streams are drained; `stop` only requests termination.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("platform", &self.inner.platform)
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    /// Create a manager whose process output goes to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LineSink>) -> Self {
        Self::with_platform(sink, Platform::current())
    }

    /// Create a manager resolving commands for `platform`.
    #[must_use]
    pub fn with_platform(sink: Arc<dyn LineSink>, platform: Platform) -> Self {
        Self {
            inner: Arc::new(Inner {
                processes: Mutex::new(HashMap::new()),
                sink,
                platform,
            }),
        }
    }

    /// Start a supervised process under `id`.
    ///
    /// # Errors
    /// Returns [`PluginError::AlreadyRunning`] if `id` is registered, or a
    /// spawn error; in both cases the registry is left as it was.
    pub async fn start(
        &self,
        id: &str,
        command: &str,
        args: &[String],
        kind: ProcessKind,
    ) -> Result<(), PluginError> {
        self.reserve(id, kind).await?;
        self.launch(id, command, args).await
    }

    async fn reserve(&self, id: &str, kind: ProcessKind) -> Result<(), PluginError> {
        let mut processes = self.inner.processes.lock().await;
        if processes.contains_key(id) {
            return Err(PluginError::AlreadyRunning(id.to_string()));
        }
        processes.insert(id.to_string(), ActiveProcess::starting(kind));
        Ok(())
    }

    /// Spawn the process for an id already reserved as starting.
    async fn launch(&self, id: &str, command: &str, args: &[String]) -> Result<(), PluginError> {
        let parts = resolve_invocation(self.inner.platform, command, args);
        tracing::info!(plugin = id, command = %parts.display(), "Starting process");

        let mut child = match parts.to_command().group_spawn() {
            Ok(child) => child,
            Err(source) => {
                self.inner.processes.lock().await.remove(id);
                return Err(PluginError::Spawn {
                    id: id.to_string(),
                    source,
                });
            }
        };

        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            if let Err(e) = child.start_kill() {
                tracing::debug!(plugin = id, error = %e, "Failed to kill process without output pipes");
            }
            self.inner.processes.lock().await.remove(id);
            return Err(PluginError::MissingPipe(id.to_string()));
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let stop_now = {
            let mut processes = self.inner.processes.lock().await;
            processes.get_mut(id).is_some_and(|entry| {
                entry.state = ProcessState::Running;
                entry.pid = child.id();
                entry.stop_tx = Some(stop_tx);
                entry.stop_requested
            })
        };

        let readers = [
            spawn_monitor(Arc::clone(&self.inner), id.to_string(), "STDOUT", stdout),
            spawn_monitor(Arc::clone(&self.inner), id.to_string(), "STDERR", stderr),
        ];
        tokio::spawn(supervise(
            Arc::clone(&self.inner),
            id.to_string(),
            child,
            readers,
            stop_rx,
            stop_now,
        ));

        Ok(())
    }

    /// Request forceful termination of the process registered as `id`.
    ///
    /// The entry is removed later, once the exit has been observed.
    ///
    /// # Errors
    /// Returns [`PluginError::NotFound`] if `id` is not registered.
    pub async fn stop(&self, id: &str) -> Result<(), PluginError> {
        let mut processes = self.inner.processes.lock().await;
        let entry = processes
            .get_mut(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        match entry.stop_tx.take() {
            Some(tx) => {
                // a dropped receiver means the supervisor is already reaping it
                let _ = tx.send(());
            }
            None => entry.stop_requested = true,
        }
        tracing::info!(plugin = id, "Stop requested");
        Ok(())
    }

    /// Ids of all registered processes, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.processes.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Details of one registered process.
    pub async fn get(&self, id: &str) -> Option<ProcessInfo> {
        self.inner
            .processes
            .lock()
            .await
            .get(id)
            .map(|entry| ProcessInfo {
                id: id.to_string(),
                kind: entry.kind,
                state: entry.state,
                pid: entry.pid,
            })
    }
}

fn spawn_monitor<R>(inner: Arc<Inner>, id: String, stream: &'static str, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = pump_lines(reader, |line| {
            inner.sink.emit(&line);
            match decode_line(&line) {
                DecodedLine::Structured(msg) => {
                    tracing::info!(plugin = %id, kind = ?msg.kind, payload = %msg.payload, "Structured output");
                }
                DecodedLine::Text(text) => {
                    tracing::debug!(plugin = %id, stream, "{text}");
                }
            }
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(plugin = %id, stream, error = %e, "Error reading process output");
        }
    })
}

async fn supervise(
    inner: Arc<Inner>,
    id: String,
    mut child: AsyncGroupChild,
    readers: [JoinHandle<()>; 2],
    mut stop_rx: oneshot::Receiver<()>,
    stop_now: bool,
) {
    if stop_now {
        terminate(&mut child, &id);
    }

    let drain = futures::future::join_all(readers);
    tokio::pin!(drain);
    let mut drained = false;
    let mut exit = None;
    let mut stop_armed = !stop_now;

    // descendants may keep the pipes open after the process itself exits
    while !drained || exit.is_none() {
        tokio::select! {
            _ = &mut drain, if !drained => drained = true,
            status = child.wait(), if exit.is_none() => {
                exit = Some(status);
                if let Some(entry) = inner.processes.lock().await.get_mut(&id) {
                    entry.state = ProcessState::Exited;
                }
            }
            res = &mut stop_rx, if stop_armed => {
                stop_armed = false;
                if res.is_ok() {
                    terminate(&mut child, &id);
                }
            }
        }
    }

    inner.processes.lock().await.remove(&id);

    match exit {
        Some(Ok(status)) if status.success() => tracing::info!(plugin = %id, "Process exited successfully"),
        Some(Ok(status)) => tracing::warn!(plugin = %id, %status, "Process exited with error"),
        Some(Err(e)) => tracing::error!(plugin = %id, error = %e, "Failed to wait for process"),
        None => {}
    }
}

fn terminate(child: &mut AsyncGroupChild, id: &str) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(plugin = %id, error = %e, "Failed to kill process");
    }
}
