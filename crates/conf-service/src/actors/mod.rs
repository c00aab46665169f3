//! Actor hierarchy.
//!
//! ```text
//! ConferenceControllerActor (one per process)
//! └── ConferenceActor (one per live conference id)
//!     ├── owns registry, rooms, dispatcher, host state
//!     └── ConnectionActor (one per joined connection)
//!         └── writes to the transport's outbound queue
//! ```
//!
//! Every mutation of a conference happens inside its `ConferenceActor`, one
//! mailbox message at a time.

pub mod conference;
pub mod connection;
pub mod controller;
pub mod messages;
pub mod metrics;

pub use conference::{ConferenceActor, ConferenceActorHandle, ConferenceLimits};
pub use connection::{ConnectionActor, ConnectionActorHandle, DeliveryError};
pub use controller::{ConferenceControllerHandle, ControllerConfig};
pub use messages::{
    ConferenceAction, ConferenceInfo, ConferenceState, ControllerStatus, JoinOutcome, JoinRequest,
    RoomSnapshot,
};
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
