//! Wire protocol for the live connection.
//!
//! Every frame is a JSON object whose `type` field selects the variant;
//! remaining fields are camelCase. Inbound frames decode into
//! [`ClientMessage`], outbound frames are encoded from [`ServerEvent`].
//! Signaling payloads and whiteboard data are carried as opaque JSON values
//! and never inspected.

use crate::errors::ConfError;
use crate::registry::{
    Capabilities, Connection, ConnectionQuality, MediaState, Roles,
};
use crate::rooms::{RoomId, RoomInfo};
use crate::signaling::SignalKind;

use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{ConferenceId, ConnectionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame sent by a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        conference_id: ConferenceId,
        display_name: String,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        password: Option<SecretString>,
        #[serde(default)]
        is_guest: bool,
    },
    Leave,
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
        #[serde(default)]
        private: bool,
        #[serde(default)]
        recipient_id: Option<ConnectionId>,
    },
    UpdateWhiteboard {
        data: Value,
    },
    ClearWhiteboard,
    RecordingStarted,
    RecordingStopped,
    MuteAll,
    RequestUnmute {
        target_id: ConnectionId,
    },
    RemoveParticipant {
        target_id: ConnectionId,
        #[serde(default)]
        reason: Option<String>,
    },
    LockMeeting,
    UnlockMeeting,
    CreateBreakoutRooms {
        count: u32,
        #[serde(default)]
        auto_assign: bool,
    },
    AssignToBreakoutRoom {
        target_id: ConnectionId,
        room_number: u32,
    },
    ReturnToMainRoom {
        /// Defaults to the caller.
        #[serde(default)]
        target_id: Option<ConnectionId>,
    },
    CloseBreakoutRooms,
    CloseBreakoutRoom {
        room_number: u32,
    },
    UpdateConnectionQuality {
        quality: ConnectionQuality,
    },
    SendOffer {
        target_id: ConnectionId,
        offer: Value,
    },
    SendAnswer {
        target_id: ConnectionId,
        answer: Value,
    },
    SendIceCandidate {
        target_id: ConnectionId,
        candidate: Value,
    },
    UpdatePermissions {
        target_id: ConnectionId,
        #[serde(default)]
        roles: Option<Roles>,
        #[serde(default)]
        capabilities: Option<Capabilities>,
    },
    EndConference,
    GetParticipants,
}

impl ClientMessage {
    /// Bounded label for metrics and logs.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave => "leave",
            ClientMessage::ToggleAudio { .. } => "toggle_audio",
            ClientMessage::ToggleVideo { .. } => "toggle_video",
            ClientMessage::RaiseHand => "raise_hand",
            ClientMessage::LowerHand => "lower_hand",
            ClientMessage::StartScreenShare => "start_screen_share",
            ClientMessage::StopScreenShare => "stop_screen_share",
            ClientMessage::SendChat { .. } => "send_chat",
            ClientMessage::UpdateWhiteboard { .. } => "update_whiteboard",
            ClientMessage::ClearWhiteboard => "clear_whiteboard",
            ClientMessage::RecordingStarted => "recording_started",
            ClientMessage::RecordingStopped => "recording_stopped",
            ClientMessage::MuteAll => "mute_all",
            ClientMessage::RequestUnmute { .. } => "request_unmute",
            ClientMessage::RemoveParticipant { .. } => "remove_participant",
            ClientMessage::LockMeeting => "lock_meeting",
            ClientMessage::UnlockMeeting => "unlock_meeting",
            ClientMessage::CreateBreakoutRooms { .. } => "create_breakout_rooms",
            ClientMessage::AssignToBreakoutRoom { .. } => "assign_to_breakout_room",
            ClientMessage::ReturnToMainRoom { .. } => "return_to_main_room",
            ClientMessage::CloseBreakoutRooms => "close_breakout_rooms",
            ClientMessage::CloseBreakoutRoom { .. } => "close_breakout_room",
            ClientMessage::UpdateConnectionQuality { .. } => "update_connection_quality",
            ClientMessage::SendOffer { .. } => "send_offer",
            ClientMessage::SendAnswer { .. } => "send_answer",
            ClientMessage::SendIceCandidate { .. } => "send_ice_candidate",
            ClientMessage::UpdatePermissions { .. } => "update_permissions",
            ClientMessage::EndConference => "end_conference",
            ClientMessage::GetParticipants => "get_participants",
        }
    }
}

/// Public view of a participant, as other clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub user_id: Option<String>,
    pub is_guest: bool,
    pub roles: Roles,
    pub capabilities: Capabilities,
    pub media: MediaState,
    pub quality: ConnectionQuality,
    pub room: RoomId,
    pub joined_at: DateTime<Utc>,
}

impl ParticipantInfo {
    /// Build the public view of a registered connection. Email is never
    /// included.
    #[must_use]
    pub fn from_connection(connection: &Connection, room: RoomId) -> Self {
        Self {
            connection_id: connection.id.clone(),
            display_name: connection.identity.display_name.clone(),
            user_id: connection.identity.user_id.clone(),
            is_guest: connection.identity.is_guest,
            roles: connection.roles,
            capabilities: connection.capabilities,
            media: connection.media,
            quality: connection.quality,
            room,
            joined_at: connection.joined_at,
        }
    }
}

/// A chat message as delivered. `sent_at` is assigned by the server when the
/// message is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: ConnectionId,
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recipient_id: Option<ConnectionId>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// A frame sent by the server to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// First frame on every connection, carrying its assigned id.
    ParticipantConnecting {
        connection_id: ConnectionId,
    },
    /// Reply to the joiner.
    ConferenceJoined {
        conference_id: ConferenceId,
        connection_id: ConnectionId,
        room: RoomId,
        participants: Vec<ParticipantInfo>,
        is_locked: bool,
        breakout_rooms: Vec<RoomInfo>,
    },
    ParticipantJoined {
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        connection_id: ConnectionId,
        display_name: String,
    },
    ParticipantDisconnected {
        connection_id: ConnectionId,
        display_name: String,
    },
    ParticipantRemoved {
        connection_id: ConnectionId,
        display_name: String,
    },
    /// Sent to an ejected participant; the client should not reconnect.
    RemovedFromConference {
        reason: String,
    },
    ReceiveOffer {
        sender_id: ConnectionId,
        offer: Value,
    },
    ReceiveAnswer {
        sender_id: ConnectionId,
        answer: Value,
    },
    ReceiveIceCandidate {
        sender_id: ConnectionId,
        candidate: Value,
    },
    /// The signaling target has already left.
    PeerUnavailable {
        target_id: ConnectionId,
        kind: SignalKind,
    },
    ParticipantAudioToggled {
        connection_id: ConnectionId,
        muted: bool,
    },
    ParticipantVideoToggled {
        connection_id: ConnectionId,
        off: bool,
    },
    HandRaised {
        connection_id: ConnectionId,
    },
    HandLowered {
        connection_id: ConnectionId,
    },
    ScreenShareStarted {
        connection_id: ConnectionId,
    },
    ScreenShareStopped {
        connection_id: ConnectionId,
    },
    ChatMessageReceived {
        message: ChatMessage,
    },
    PrivateChatMessageReceived {
        message: ChatMessage,
    },
    PrivateChatMessageSent {
        message: ChatMessage,
    },
    WhiteboardUpdated {
        connection_id: ConnectionId,
        data: Value,
    },
    WhiteboardCleared {
        connection_id: ConnectionId,
    },
    RecordingStarted {
        connection_id: ConnectionId,
    },
    RecordingStopped {
        connection_id: ConnectionId,
    },
    MuteAllRequested {
        requested_by: ConnectionId,
    },
    UnmuteRequested {
        requested_by: ConnectionId,
    },
    MeetingLocked {
        locked_by: ConnectionId,
    },
    MeetingUnlocked {
        unlocked_by: ConnectionId,
    },
    BreakoutRoomsCreated {
        rooms: Vec<RoomInfo>,
    },
    AssignedToBreakoutRoom {
        room_number: u32,
        room_name: String,
    },
    ReturnedToMainRoom,
    BreakoutRoomClosed {
        room_number: u32,
    },
    AllBreakoutRoomsClosed,
    ParticipantQualityUpdated {
        connection_id: ConnectionId,
        quality: ConnectionQuality,
    },
    PermissionsUpdated {
        connection_id: ConnectionId,
        roles: Roles,
        capabilities: Capabilities,
    },
    ConferenceEnded {
        reason: String,
    },
    ParticipantList {
        room: RoomId,
        participants: Vec<ParticipantInfo>,
    },
    Error {
        code: i32,
        error_type: String,
        message: String,
    },
}

impl ServerEvent {
    /// Build the single outbound error frame for a failed request.
    #[must_use]
    pub fn error(err: &ConfError) -> Self {
        ServerEvent::Error {
            code: err.error_code(),
            error_type: err.error_type_label().to_string(),
            message: err.client_message(),
        }
    }

    /// Whether the transport should close after writing this frame.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::RemovedFromConference { .. } | ServerEvent::ConferenceEnded { .. }
        )
    }

    /// Bounded label for metrics and logs.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            ServerEvent::ParticipantConnecting { .. } => "participant_connecting",
            ServerEvent::ConferenceJoined { .. } => "conference_joined",
            ServerEvent::ParticipantJoined { .. } => "participant_joined",
            ServerEvent::ParticipantLeft { .. } => "participant_left",
            ServerEvent::ParticipantDisconnected { .. } => "participant_disconnected",
            ServerEvent::ParticipantRemoved { .. } => "participant_removed",
            ServerEvent::RemovedFromConference { .. } => "removed_from_conference",
            ServerEvent::ReceiveOffer { .. } => "receive_offer",
            ServerEvent::ReceiveAnswer { .. } => "receive_answer",
            ServerEvent::ReceiveIceCandidate { .. } => "receive_ice_candidate",
            ServerEvent::PeerUnavailable { .. } => "peer_unavailable",
            ServerEvent::ParticipantAudioToggled { .. } => "participant_audio_toggled",
            ServerEvent::ParticipantVideoToggled { .. } => "participant_video_toggled",
            ServerEvent::HandRaised { .. } => "hand_raised",
            ServerEvent::HandLowered { .. } => "hand_lowered",
            ServerEvent::ScreenShareStarted { .. } => "screen_share_started",
            ServerEvent::ScreenShareStopped { .. } => "screen_share_stopped",
            ServerEvent::ChatMessageReceived { .. } => "chat_message_received",
            ServerEvent::PrivateChatMessageReceived { .. } => "private_chat_message_received",
            ServerEvent::PrivateChatMessageSent { .. } => "private_chat_message_sent",
            ServerEvent::WhiteboardUpdated { .. } => "whiteboard_updated",
            ServerEvent::WhiteboardCleared { .. } => "whiteboard_cleared",
            ServerEvent::RecordingStarted { .. } => "recording_started",
            ServerEvent::RecordingStopped { .. } => "recording_stopped",
            ServerEvent::MuteAllRequested { .. } => "mute_all_requested",
            ServerEvent::UnmuteRequested { .. } => "unmute_requested",
            ServerEvent::MeetingLocked { .. } => "meeting_locked",
            ServerEvent::MeetingUnlocked { .. } => "meeting_unlocked",
            ServerEvent::BreakoutRoomsCreated { .. } => "breakout_rooms_created",
            ServerEvent::AssignedToBreakoutRoom { .. } => "assigned_to_breakout_room",
            ServerEvent::ReturnedToMainRoom => "returned_to_main_room",
            ServerEvent::BreakoutRoomClosed { .. } => "breakout_room_closed",
            ServerEvent::AllBreakoutRoomsClosed => "all_breakout_rooms_closed",
            ServerEvent::ParticipantQualityUpdated { .. } => "participant_quality_updated",
            ServerEvent::PermissionsUpdated { .. } => "permissions_updated",
            ServerEvent::ConferenceEnded { .. } => "conference_ended",
            ServerEvent::ParticipantList { .. } => "participant_list",
            ServerEvent::Error { .. } => "error",
        }
    }
}
