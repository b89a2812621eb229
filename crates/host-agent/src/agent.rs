//! The agent: routes controller frames to the executor, the plugin manager
//! and the log.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use host_agent_core::LineSink;
use host_agent_executor::{CommandRunner, ExecRequest};
use host_agent_plugin::PluginManager;
use host_agent_transport::{
    FrameHandler, InboundEnvelope, InboundMessage, OutboundEnvelope, OutboundMessage,
    TransportServer,
    protocol::{ExecCmd, PluginStart},
};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::{config::AgentConfig, heartbeat, logger::AgentLogger};

/// Logged in reply to `INPUT`; there is no interactive shell.
pub const INTERACTIVE_UNAVAILABLE: &str =
    "Interactive shell not available. Please use Command Palette.";

/// Host agent state shared by the connection, heartbeat and execution tasks.
///
/// Routes each controller frame to the command runner, the plugin manager or
/// the log, and replies over the same connection.
pub struct Agent {
    config: AgentConfig,
    transport: Arc<TransportServer>,
    logger: Arc<AgentLogger>,
    plugins: PluginManager,
    runner: CommandRunner,
}

impl Agent {
    /// Create new agent from `config`. Nothing is bound until [`Agent::run`].
    #[must_use]
    pub fn new(config: AgentConfig) -> Arc<Self> {
        let transport = Arc::new(TransportServer::new(config.secret_key.clone()));
        let logger = Arc::new(AgentLogger::new(Arc::clone(&transport)));
        let plugins = PluginManager::new(Arc::clone(&logger) as Arc<dyn LineSink>);
        Arc::new(Self {
            config,
            transport,
            logger,
            plugins,
            runner: CommandRunner::default(),
        })
    }

    /// Configuration the agent was created with.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Agent log, also the sink for process output.
    #[must_use]
    pub const fn logger(&self) -> &Arc<AgentLogger> {
        &self.logger
    }

    /// Supervised processes started by the controller.
    #[must_use]
    pub const fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// HTTP router exposing the controller endpoint.
    #[must_use]
    pub fn router(self: &Arc<Self>) -> Router {
        let handler: Arc<dyn FrameHandler> = Arc::clone(self) as Arc<dyn FrameHandler>;
        self.transport.router(handler)
    }

    /// Bind `0.0.0.0:<listen_port>` and serve until the server fails.
    ///
    /// # Errors
    /// Returns error if the port cannot be bound or the server stops.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen_port));
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve controller connections on `listener` and emit heartbeats.
    ///
    /// # Errors
    /// Returns error if the server stops.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        let port = listener.local_addr()?.port();
        if self.config.secret_key.is_empty() {
            tracing::warn!("No secret key configured; only clients sending an empty secret can connect");
        }
        self.logger.log(&format!(
            "Host Agent {} started. Listening on port {port}",
            self.config.host_id
        ));

        let heartbeats = tokio::spawn(heartbeat::run(
            Arc::clone(&self.transport),
            self.config.host_id.clone(),
            self.config.heartbeat_interval,
        ));
        let result = axum::serve(listener, self.router()).await;
        heartbeats.abort();
        result
    }

    /// Handle one inbound frame.
    pub async fn dispatch(&self, frame: &[u8]) {
        let envelope = match InboundEnvelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.logger.log(&format!("Failed to unmarshal message: {e}"));
                return;
            }
        };
        let message = match envelope.message() {
            Ok(message) => message,
            Err(e) => {
                self.logger
                    .log(&format!("Invalid {} message: {e}", envelope.kind));
                return;
            }
        };
        let request_id = envelope.request_id();
        tracing::debug!(kind = %envelope.kind, request_id, "Dispatching message");

        match message {
            InboundMessage::FetchLogs => {
                self.reply(request_id, OutboundMessage::LogHistory(self.logger.history()));
            }
            InboundMessage::ExecCmd(cmd) => self.spawn_exec(request_id, cmd),
            InboundMessage::Input(text) => {
                if !text.is_empty() {
                    self.logger.log(INTERACTIVE_UNAVAILABLE);
                }
            }
            InboundMessage::PluginStart(start) => self.start_plugin(start).await,
            InboundMessage::PluginStop { id } => match self.plugins.stop(&id).await {
                Ok(()) => self.logger.log(&format!("Stopping process {id}")),
                Err(e) => self.logger.log(&format!("Failed to stop process {id}: {e}")),
            },
            InboundMessage::PluginList => {
                self.reply(request_id, OutboundMessage::PluginList(self.plugins.list().await));
            }
            InboundMessage::Unsupported(kind) => {
                self.logger.log(&format!("Unsupported message type: {kind}"));
            }
        }
    }

    fn reply(&self, request_id: Option<&str>, message: OutboundMessage) {
        let mut frame = OutboundEnvelope::new(message);
        if let Some(request_id) = request_id {
            frame = frame.with_request_id(request_id);
        }
        if let Err(e) = self.transport.send(&frame) {
            tracing::warn!(error = %e, "Failed to send reply");
        }
    }

    async fn start_plugin(&self, start: PluginStart) {
        let PluginStart {
            id,
            command,
            args,
            kind,
        } = start;
        match self.plugins.start(&id, &command, &args, kind).await {
            Ok(()) => self.logger.log(&format!("Started process {id}")),
            Err(e) => self.logger.log(&format!("Failed to start process {id}: {e}")),
        }
    }

    fn spawn_exec(&self, request_id: Option<&str>, cmd: ExecCmd) {
        let request_id =
            request_id.map_or_else(|| format!("cmd-{}", Uuid::new_v4()), ToString::to_string);
        let request = ExecRequest::new(
            request_id,
            cmd.command,
            cmd.timeout_ms,
            self.config.exec_timeout(),
        );
        let runner = self.runner;
        let logger = Arc::clone(&self.logger);
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            logger.log(&format!(
                "Executing command requestId={}: {}",
                request.request_id, request.command
            ));
            let outcome = runner
                .run(&request, Arc::clone(&logger) as Arc<dyn LineSink>)
                .await;
            tracing::info!(
                request_id = %request.request_id,
                status = ?outcome.status,
                exit_code = outcome.exit_code,
                duration_ms = outcome.duration_ms,
                "Command finished"
            );

            let frame = OutboundEnvelope::new(OutboundMessage::ExecResult(outcome))
                .with_request_id(request.request_id.clone());
            if let Err(e) = transport.send(&frame) {
                tracing::warn!(request_id = %request.request_id, error = %e, "Failed to deliver command result");
            }
        });
    }
}

#[async_trait]
impl FrameHandler for Agent {
    async fn handle_frame(&self, frame: Bytes) {
        self.dispatch(&frame).await;
    }
}
