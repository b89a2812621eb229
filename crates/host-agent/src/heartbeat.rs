//! Periodic liveness reports to the controller.

use std::{path::Path, sync::Arc, time::Duration};

use host_agent_transport::{
    Heartbeat, OutboundEnvelope, OutboundMessage, TransportError, TransportServer,
};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::AGENT_VERSION;

/// Operating system label, `linux_docker` inside a container.
#[must_use]
pub fn os_type() -> String {
    let os = std::env::consts::OS;
    if os == "linux" && Path::new("/.dockerenv").exists() {
        "linux_docker".to_string()
    } else {
        os.to_string()
    }
}

/// Send one heartbeat on the active connection.
///
/// # Errors
/// Returns the transport error if the frame could not be queued.
pub fn send_heartbeat(
    transport: &TransportServer,
    agent_id: &str,
    os_type: &str,
) -> Result<(), TransportError> {
    let frame = OutboundEnvelope::new(OutboundMessage::Heartbeat(Heartbeat::online(
        agent_id,
        AGENT_VERSION,
        os_type,
    )))
    .with_request_id(format!("hb-{}", Uuid::new_v4()));
    transport.send(&frame)
}

/// Emit a heartbeat every `every` while a controller is connected.
///
/// The first tick fires immediately. Runs until the task is aborted.
pub async fn run(transport: Arc<TransportServer>, agent_id: String, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let os_type = os_type();

    loop {
        ticker.tick().await;
        match send_heartbeat(&transport, &agent_id, &os_type) {
            Ok(()) | Err(TransportError::NotConnected) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to send heartbeat"),
        }
    }
}
