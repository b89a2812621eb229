//! Transport layer between the agent and its controller.
//!
//! Provides:
//! - Wire protocol (JSON envelopes)
//! - WebSocket server holding the single active connection (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{
    Heartbeat, InboundEnvelope, InboundMessage, OutboundEnvelope, OutboundMessage, ProtocolError,
};

#[cfg(feature = "websocket")]
pub use websocket::{FrameHandler, TransportError, TransportServer};
