//! Client-facing transport.
//!
//! The coordinator speaks JSON envelopes over WebSocket. Each accepted socket
//! gets a fresh connection id, a bounded outbound queue, and a
//! [`ConnectionHandler`](crate::handler::ConnectionHandler) for its inbound
//! side.

pub mod ws;

pub use ws::{ws_router, TransportConfig, TransportState};
