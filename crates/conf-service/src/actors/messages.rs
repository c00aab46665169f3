//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::ConfError;
use crate::host::LockState;
use crate::protocol::ServerEvent;
use crate::registry::{Capabilities, ConnectionQuality, Identity, Roles};
use crate::rooms::{RoomId, RoomInfo};
use crate::signaling::SignalKind;

use super::conference::ConferenceActorHandle;

use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{ConferenceId, ConnectionId};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Messages sent to `ConferenceControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Look up the live actor for a conference, spawning it on first use.
    GetOrCreateConference {
        conference_id: ConferenceId,
        respond_to: oneshot::Sender<Result<ConferenceActorHandle, ConfError>>,
    },

    /// Get summary information about a live conference.
    GetConference {
        conference_id: ConferenceId,
        respond_to: oneshot::Sender<Result<ConferenceInfo, ConfError>>,
    },

    /// End a conference for everyone (administrative).
    EndConference {
        conference_id: ConferenceId,
        reason: String,
        respond_to: oneshot::Sender<Result<(), ConfError>>,
    },

    /// Get current status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Stop admitting conferences and end every live one.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), ConfError>>,
    },
}

/// Messages sent to `ConferenceActor`.
#[derive(Debug)]
pub enum ConferenceMessage {
    /// A connection asks to enter the main room.
    Join {
        request: JoinRequest,
        respond_to: oneshot::Sender<Result<JoinOutcome, ConfError>>,
    },

    /// Explicit, voluntary leave.
    Leave {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Result<(), ConfError>>,
    },

    /// Transport closed or heartbeat expired. Idempotent.
    Disconnect { connection_id: ConnectionId },

    /// Any in-conference operation issued by a joined connection.
    Action {
        connection_id: ConnectionId,
        action: ConferenceAction,
        respond_to: oneshot::Sender<Result<(), ConfError>>,
    },

    /// Get a snapshot of rooms, members, and counters.
    GetState {
        respond_to: oneshot::Sender<ConferenceState>,
    },

    /// End the conference for everyone.
    End {
        reason: String,
        respond_to: oneshot::Sender<Result<(), ConfError>>,
    },
}

/// Messages sent to `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Forward an event to the client.
    Deliver { event: ServerEvent },

    /// Stop forwarding and exit.
    Close { reason: String },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Everything a conference needs to admit a connection.
#[derive(Debug)]
pub struct JoinRequest {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub roles: Roles,
    pub capabilities: Capabilities,
    pub password: Option<SecretString>,
    /// Transport-side queue the connection actor writes into.
    pub outbound: mpsc::Sender<ServerEvent>,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub connection_id: ConnectionId,
    pub room: RoomId,
    pub roles: Roles,
    pub participant_count: usize,
    /// Cancelled by the conference once this connection is no longer a
    /// member (left, removed, disconnected, or the conference ended).
    pub membership: CancellationToken,
}

/// In-conference operations, decoded from the client envelope.
#[derive(Debug)]
pub enum ConferenceAction {
    ToggleAudio {
        muted: bool,
    },
    ToggleVideo {
        off: bool,
    },
    RaiseHand,
    LowerHand,
    StartScreenShare,
    StopScreenShare,
    SendChat {
        message: String,
        /// `Some` for a private message.
        recipient: Option<ConnectionId>,
    },
    UpdateWhiteboard {
        data: Value,
    },
    ClearWhiteboard,
    RecordingStarted,
    RecordingStopped,
    MuteAll,
    RequestUnmute {
        target: ConnectionId,
    },
    RemoveParticipant {
        target: ConnectionId,
        reason: String,
    },
    LockMeeting,
    UnlockMeeting,
    CreateBreakoutRooms {
        count: u32,
        auto_assign: bool,
    },
    AssignToBreakoutRoom {
        target: ConnectionId,
        room_number: u32,
    },
    ReturnToMainRoom {
        target: ConnectionId,
    },
    CloseBreakoutRooms,
    CloseBreakoutRoom {
        room_number: u32,
    },
    UpdateConnectionQuality {
        quality: ConnectionQuality,
    },
    Relay {
        kind: SignalKind,
        target: ConnectionId,
        payload: Value,
    },
    UpdatePermissions {
        target: ConnectionId,
        roles: Option<Roles>,
        capabilities: Option<Capabilities>,
    },
    EndConference,
    GetParticipants,
}

/// Members of one room at snapshot time.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub info: RoomInfo,
    pub members: Vec<ConnectionId>,
}

/// Conference state snapshot.
#[derive(Debug, Clone)]
pub struct ConferenceState {
    pub conference_id: ConferenceId,
    pub rooms: Vec<RoomSnapshot>,
    pub lock_state: LockState,
    pub is_recording: bool,
    pub participant_count: usize,
    pub total_joined: u64,
    pub peak_concurrent: usize,
    pub chat_messages: u64,
    pub started_at: DateTime<Utc>,
}

impl ConferenceState {
    /// Members of a room, empty if the room does not exist.
    #[must_use]
    pub fn members_of(&self, room: RoomId) -> Vec<ConnectionId> {
        self.rooms
            .iter()
            .find(|r| r.info.room == room)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    /// Which room holds a connection, if any.
    #[must_use]
    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        self.rooms
            .iter()
            .find(|r| r.members.contains(connection_id))
            .map(|r| r.info.room)
    }
}

/// Conference information returned by the controller.
#[derive(Debug, Clone)]
pub struct ConferenceInfo {
    pub conference_id: ConferenceId,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Controller status.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub conference_count: usize,
    pub connection_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}
