//! Conference coordinator error types.
//!
//! Every core operation returns these as values. The per-connection handler
//! turns them into a single outbound `error` event for the caller; they are
//! never broadcast. Internal details are logged server-side but not exposed
//! to clients.

use thiserror::Error;

/// Conference coordinator error type.
///
/// Maps to client-facing error codes:
/// - `InvalidPassword`: `UNAUTHORIZED` (2)
/// - `PermissionDenied`: `FORBIDDEN` (3)
/// - `NotInConference`, `TargetNotFound`, `ConferenceNotFound`: `NOT_FOUND` (4)
/// - `AlreadyInARoom`, `DuplicateConnection`, `BreakoutsAlreadyOpen`: `CONFLICT` (5)
/// - `Internal`, `Config`: `INTERNAL_ERROR` (6)
/// - `RoomFull`, `CapacityExceeded`, `Draining`: `CAPACITY_EXCEEDED` (7)
/// - `InvalidRequest`: `INVALID_REQUEST` (8)
/// - `MeetingLocked`, `RoomClosed`, `ConferenceEnded`: `POLICY_REJECTED` (9)
#[derive(Debug, Error)]
pub enum ConfError {
    /// The connection is not a member of any room in the referenced conference.
    #[error("Connection is not in the conference")]
    NotInConference,

    /// The connection is already a member of a room.
    #[error("Connection is already in a room")]
    AlreadyInARoom,

    /// A signaling, chat, or host-control target is no longer registered.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The destination room is at its capacity bound.
    #[error("Room is full: {0}")]
    RoomFull(String),

    /// The destination breakout room does not exist or has been closed.
    #[error("Room is closed: {0}")]
    RoomClosed(String),

    /// A breakout batch is already open for the conference.
    #[error("Breakout rooms are already open")]
    BreakoutsAlreadyOpen,

    /// The connection id was registered twice (transport-layer bug).
    #[error("Duplicate connection: {0}")]
    DuplicateConnection(String),

    /// A host-only or capability-gated action by a connection lacking the flag.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Non-host join while the conference is locked.
    #[error("Meeting is locked")]
    MeetingLocked,

    /// The conference id is unknown to the catalog.
    #[error("Conference not found: {0}")]
    ConferenceNotFound(String),

    /// The join password did not match.
    #[error("Invalid conference password")]
    InvalidPassword,

    /// The request was well-formed JSON but semantically invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The coordinator is hosting its maximum number of conferences.
    #[error("Coordinator at capacity")]
    CapacityExceeded,

    /// The coordinator is shutting down.
    #[error("Coordinator is draining")]
    Draining,

    /// The conference ended while the request was in flight.
    #[error("Conference has ended")]
    ConferenceEnded,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConfError {
    /// Returns the client-facing error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            ConfError::InvalidPassword => 2, // UNAUTHORIZED
            ConfError::PermissionDenied(_) => 3, // FORBIDDEN
            ConfError::NotInConference
            | ConfError::TargetNotFound(_)
            | ConfError::ConferenceNotFound(_) => 4, // NOT_FOUND
            ConfError::AlreadyInARoom
            | ConfError::DuplicateConnection(_)
            | ConfError::BreakoutsAlreadyOpen => 5, // CONFLICT
            ConfError::Internal(_) | ConfError::Config(_) => 6, // INTERNAL_ERROR
            ConfError::RoomFull(_) | ConfError::CapacityExceeded | ConfError::Draining => 7, // CAPACITY_EXCEEDED
            ConfError::InvalidRequest(_) => 8, // INVALID_REQUEST
            ConfError::MeetingLocked | ConfError::RoomClosed(_) | ConfError::ConferenceEnded => 9, // POLICY_REJECTED
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    ///
    /// Uses enum variant names, not error message content.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            ConfError::NotInConference => "not_in_conference",
            ConfError::AlreadyInARoom => "already_in_a_room",
            ConfError::TargetNotFound(_) => "target_not_found",
            ConfError::RoomFull(_) => "room_full",
            ConfError::RoomClosed(_) => "room_closed",
            ConfError::BreakoutsAlreadyOpen => "breakouts_already_open",
            ConfError::DuplicateConnection(_) => "duplicate_connection",
            ConfError::PermissionDenied(_) => "permission_denied",
            ConfError::MeetingLocked => "meeting_locked",
            ConfError::ConferenceNotFound(_) => "conference_not_found",
            ConfError::InvalidPassword => "invalid_password",
            ConfError::InvalidRequest(_) => "invalid_request",
            ConfError::CapacityExceeded => "capacity_exceeded",
            ConfError::Draining => "draining",
            ConfError::ConferenceEnded => "conference_ended",
            ConfError::Config(_) => "config",
            ConfError::Internal(_) => "internal",
        }
    }

    /// Whether this error indicates a bug rather than normal control flow.
    ///
    /// Only these are logged at `error!`; everything else is an expected,
    /// recoverable rejection surfaced to the caller.
    pub fn is_system_error(&self) -> bool {
        matches!(
            self,
            ConfError::DuplicateConnection(_) | ConfError::Internal(_)
        )
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            ConfError::Internal(_) | ConfError::Config(_) | ConfError::DuplicateConnection(_) => {
                "An internal error occurred".to_string()
            }
            ConfError::NotInConference => "You are not in this conference".to_string(),
            ConfError::AlreadyInARoom => "You have already joined a conference".to_string(),
            ConfError::TargetNotFound(_) => "The participant is no longer available".to_string(),
            ConfError::RoomFull(_) => "The room is full".to_string(),
            ConfError::RoomClosed(_) => "The room is closed".to_string(),
            ConfError::BreakoutsAlreadyOpen => {
                "Close the current breakout rooms before creating new ones".to_string()
            }
            ConfError::MeetingLocked => "The meeting is locked by the host".to_string(),
            ConfError::ConferenceNotFound(_) => "Conference not found".to_string(),
            ConfError::InvalidPassword => "Invalid conference password".to_string(),
            ConfError::CapacityExceeded => "Server is at capacity, please try again".to_string(),
            ConfError::Draining => "Server is shutting down, please reconnect".to_string(),
            ConfError::ConferenceEnded => "The conference has ended".to_string(),
            ConfError::PermissionDenied(msg) | ConfError::InvalidRequest(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(ConfError::InvalidPassword.error_code(), 2);
        assert_eq!(
            ConfError::PermissionDenied("not host".to_string()).error_code(),
            3
        );

        assert_eq!(ConfError::NotInConference.error_code(), 4);
        assert_eq!(
            ConfError::TargetNotFound("conn-2".to_string()).error_code(),
            4
        );
        assert_eq!(
            ConfError::ConferenceNotFound("C1".to_string()).error_code(),
            4
        );

        assert_eq!(ConfError::AlreadyInARoom.error_code(), 5);
        assert_eq!(ConfError::BreakoutsAlreadyOpen.error_code(), 5);
        assert_eq!(
            ConfError::DuplicateConnection("conn-1".to_string()).error_code(),
            5
        );

        assert_eq!(ConfError::Internal("boom".to_string()).error_code(), 6);

        assert_eq!(ConfError::RoomFull("C1#1".to_string()).error_code(), 7);
        assert_eq!(ConfError::CapacityExceeded.error_code(), 7);
        assert_eq!(ConfError::Draining.error_code(), 7);

        assert_eq!(
            ConfError::InvalidRequest("bad count".to_string()).error_code(),
            8
        );

        assert_eq!(ConfError::MeetingLocked.error_code(), 9);
        assert_eq!(ConfError::RoomClosed("C1#3".to_string()).error_code(), 9);
        assert_eq!(ConfError::ConferenceEnded.error_code(), 9);
    }

    #[test]
    fn test_only_bugs_are_system_errors() {
        assert!(ConfError::DuplicateConnection("c".to_string()).is_system_error());
        assert!(ConfError::Internal("x".to_string()).is_system_error());

        assert!(!ConfError::PermissionDenied("host only".to_string()).is_system_error());
        assert!(!ConfError::NotInConference.is_system_error());
        assert!(!ConfError::MeetingLocked.is_system_error());
        assert!(!ConfError::RoomFull("r".to_string()).is_system_error());
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = ConfError::Internal("mailbox closed for conference C1".to_string());
        assert!(!err.client_message().contains("mailbox"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let dup = ConfError::DuplicateConnection("conn-secret-id".to_string());
        assert!(!dup.client_message().contains("conn-secret-id"));
    }

    #[test]
    fn test_permission_denied_message_is_passed_through() {
        let err = ConfError::PermissionDenied("Only hosts can lock the meeting".to_string());
        assert_eq!(err.client_message(), "Only hosts can lock the meeting");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", ConfError::RoomClosed("C1#2".to_string())),
            "Room is closed: C1#2"
        );
        assert_eq!(
            format!("{}", ConfError::NotInConference),
            "Connection is not in the conference"
        );
    }

    #[test]
    fn test_error_type_labels_are_snake_case() {
        let errors = [
            ConfError::NotInConference,
            ConfError::BreakoutsAlreadyOpen,
            ConfError::MeetingLocked,
            ConfError::TargetNotFound(String::new()),
        ];
        for err in errors {
            let label = err.error_type_label();
            assert!(label.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
