//! Agent log: the recent-history window plus live forwarding to the controller.

use std::sync::Arc;

use host_agent_core::{LineSink, LogBuffer};
use host_agent_transport::{OutboundEnvelope, OutboundMessage, TransportError, TransportServer};

/// Records agent log lines.
///
/// Every line is kept in the bounded history (timestamped), mirrored to
/// `tracing`, and sent raw as a `LOG` frame when a controller is connected.
pub struct AgentLogger {
    history: LogBuffer,
    transport: Arc<TransportServer>,
}

impl AgentLogger {
    /// Create new logger forwarding over `transport`.
    #[must_use]
    pub fn new(transport: Arc<TransportServer>) -> Self {
        Self {
            history: LogBuffer::new(),
            transport,
        }
    }

    /// Record `msg`. Forwarding is skipped silently while disconnected.
    pub fn log(&self, msg: &str) {
        self.history.push(msg);
        tracing::info!(target: "host_agent::output", "{msg}");

        let frame = OutboundEnvelope::new(OutboundMessage::Log(msg.to_string()));
        match self.transport.send(&frame) {
            Ok(()) | Err(TransportError::NotConnected) => {}
            Err(e) => tracing::debug!(error = %e, "Failed to forward log line"),
        }
    }

    /// Timestamped history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.snapshot()
    }
}

impl LineSink for AgentLogger {
    fn emit(&self, line: &str) {
        self.log(line);
    }
}
