//! Conference Coordinator Service Library
//!
//! Real-time coordination core for video conferences:
//!
//! - Presence: who is connected, in which room, with which media state
//! - Breakout rooms: creation, assignment, bulk return to the main room
//! - WebRTC signaling relay between two peers of the same conference
//! - Room-scoped broadcast of chat, whiteboard, reactions and media toggles
//! - Host controls: lock, mute-all, remove, recording state, end
//!
//! The service does not carry media. It only coordinates.
//!
//! # Architecture
//!
//! ```text
//! ConferenceControllerActor (singleton per process)
//! └── ConferenceActor (one per live conference)
//!     ├── owns ConnectionRegistry, RoomDirectory, HostControls
//!     └── ConnectionActor (one per joined connection)
//! ```
//!
//! Each conference actor is the mutual-exclusion domain for its conference:
//! operations on one conference are linearized, different conferences
//! proceed in parallel.
//!
//! # Modules
//!
//! - [`actors`] - Actor hierarchy
//! - [`registry`], [`rooms`], [`host`] - Per-conference state, owned by the actor
//! - [`dispatch`], [`signaling`] - Outbound fan-out and point-to-point relay
//! - [`protocol`] - Wire envelopes
//! - [`handler`], [`transport`] - Per-connection inbound path over WebSocket
//! - [`catalog`], [`sink`] - External collaborators
//! - [`config`], [`errors`], [`observability`] - Ambient concerns

pub mod actors;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod handler;
pub mod host;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod signaling;
pub mod sink;
pub mod transport;
