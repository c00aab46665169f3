//! Per-connection inbound handler.
//!
//! One `ConnectionHandler` exists per transport connection. It decodes
//! inbound frames, forwards them to the owning conference actor, and turns
//! every failure into exactly one outbound `error` event for the caller. It
//! holds no conference state of its own beyond which conference it joined.

use crate::actors::{
    ConferenceAction, ConferenceActorHandle, ConferenceControllerHandle, JoinOutcome, JoinRequest,
};
use crate::errors::ConfError;
use crate::observability::metrics as prom;
use crate::protocol::{ClientMessage, ServerEvent};
use crate::registry::{Capabilities, Identity, Roles};
use crate::signaling::SignalKind;

use common::secret::SecretString;
use common::types::{ConferenceId, ConnectionId};
use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying comma-separated role and capability grants.
pub const PERMISSIONS_HEADER: &str = "x-conference-permissions";

/// Identity attached to the transport by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Option<String>,
    pub roles: Roles,
    pub capabilities: Capabilities,
}

impl CallerIdentity {
    /// No account: participant capabilities and no roles.
    #[must_use]
    pub fn guest() -> Self {
        Self {
            user_id: None,
            roles: Roles::default(),
            capabilities: Capabilities::participant(),
        }
    }

    /// Build from the raw header values. Without a permissions header the
    /// caller gets participant capabilities; with one, exactly the listed
    /// grants. Unknown grants are ignored.
    #[must_use]
    pub fn from_headers(user_id: Option<&str>, permissions: Option<&str>) -> Self {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let Some(permissions) = permissions else {
            return Self {
                user_id,
                ..Self::guest()
            };
        };

        let mut roles = Roles::default();
        let mut capabilities = Capabilities {
            can_share_screen: false,
            can_record: false,
            can_use_whiteboard: false,
        };
        for grant in permissions.split(',').map(str::trim) {
            match grant {
                "host" => roles.host = true,
                "co-host" => roles.co_host = true,
                "share-screen" => capabilities.can_share_screen = true,
                "record" => capabilities.can_record = true,
                "whiteboard" => capabilities.can_use_whiteboard = true,
                _ => {}
            }
        }

        Self {
            user_id,
            roles,
            capabilities,
        }
    }
}

struct Session {
    conference_id: ConferenceId,
    conference: ConferenceActorHandle,
    membership: CancellationToken,
}

impl Session {
    fn is_over(&self) -> bool {
        self.membership.is_cancelled()
    }
}

/// Drives one connection's inbound side.
pub struct ConnectionHandler {
    connection_id: ConnectionId,
    caller: CallerIdentity,
    controller: ConferenceControllerHandle,
    /// Transport writer queue; cloned into the connection actor on join.
    outbound: mpsc::Sender<ServerEvent>,
    session: Option<Session>,
    cleaned_up: bool,
}

impl ConnectionHandler {
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        caller: CallerIdentity,
        controller: ConferenceControllerHandle,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            connection_id,
            caller,
            controller,
            outbound,
            session: None,
            cleaned_up: false,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// The conference this connection joined, if any.
    #[must_use]
    pub fn conference_id(&self) -> Option<&ConferenceId> {
        self.session
            .as_ref()
            .filter(|s| !s.is_over())
            .map(|s| &s.conference_id)
    }

    /// Tell the client its connection id.
    pub async fn on_attach(&self) {
        self.send(ServerEvent::ParticipantConnecting {
            connection_id: self.connection_id.clone(),
        })
        .await;
    }

    /// Decode and handle one text frame.
    pub async fn on_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.on_message(message).await,
            Err(e) => {
                debug!(
                    target: "conf.handler",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Malformed frame"
                );
                let err = ConfError::InvalidRequest("Malformed message".to_string());
                prom::record_error(err.error_type_label());
                self.send(ServerEvent::error(&err)).await;
            }
        }
    }

    /// Handle one decoded message.
    #[instrument(
        skip_all,
        name = "conf.handler.message",
        fields(connection_id = %self.connection_id, kind = message.kind_label())
    )]
    pub async fn on_message(&mut self, message: ClientMessage) {
        let kind = message.kind_label();
        let start = Instant::now();
        prom::record_message(kind);

        let result = self.dispatch(message).await;
        prom::record_message_latency(kind, start.elapsed());

        if let Err(err) = result {
            prom::record_error(err.error_type_label());
            if err.is_system_error() {
                error!(
                    target: "conf.handler",
                    connection_id = %self.connection_id,
                    kind = kind,
                    error = %err,
                    "Request failed"
                );
            } else {
                debug!(
                    target: "conf.handler",
                    connection_id = %self.connection_id,
                    kind = kind,
                    error = %err,
                    "Request rejected"
                );
            }
            if matches!(err, ConfError::ConferenceEnded) {
                self.session = None;
            }
            self.send(ServerEvent::error(&err)).await;
        }
    }

    /// The transport went away. Runs at most once.
    pub async fn on_disconnect(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        if let Some(session) = self.session.take() {
            debug!(
                target: "conf.handler",
                connection_id = %self.connection_id,
                conference_id = %session.conference_id,
                "Cleaning up after transport close"
            );
            session
                .conference
                .disconnect(self.connection_id.clone())
                .await;
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) -> Result<(), ConfError> {
        // Removal or the conference ending cancels the membership.
        if self.session.as_ref().is_some_and(Session::is_over) {
            self.session = None;
        }

        let action = match message {
            ClientMessage::Join {
                conference_id,
                display_name,
                email,
                password,
                is_guest,
            } => {
                return self
                    .join(conference_id, display_name, email, password, is_guest)
                    .await
                    .map(|_| ());
            }

            ClientMessage::Leave => return self.leave().await,

            ClientMessage::ToggleAudio { muted } => ConferenceAction::ToggleAudio { muted },
            ClientMessage::ToggleVideo { off } => ConferenceAction::ToggleVideo { off },
            ClientMessage::RaiseHand => ConferenceAction::RaiseHand,
            ClientMessage::LowerHand => ConferenceAction::LowerHand,
            ClientMessage::StartScreenShare => ConferenceAction::StartScreenShare,
            ClientMessage::StopScreenShare => ConferenceAction::StopScreenShare,

            ClientMessage::SendChat {
                message,
                private,
                recipient_id,
            } => {
                if private && recipient_id.is_none() {
                    return Err(ConfError::InvalidRequest(
                        "A private message needs a recipient".to_string(),
                    ));
                }
                ConferenceAction::SendChat {
                    message,
                    recipient: recipient_id,
                }
            }

            ClientMessage::UpdateWhiteboard { data } => ConferenceAction::UpdateWhiteboard { data },
            ClientMessage::ClearWhiteboard => ConferenceAction::ClearWhiteboard,
            ClientMessage::RecordingStarted => ConferenceAction::RecordingStarted,
            ClientMessage::RecordingStopped => ConferenceAction::RecordingStopped,
            ClientMessage::MuteAll => ConferenceAction::MuteAll,
            ClientMessage::RequestUnmute { target_id } => {
                ConferenceAction::RequestUnmute { target: target_id }
            }
            ClientMessage::RemoveParticipant { target_id, reason } => {
                ConferenceAction::RemoveParticipant {
                    target: target_id,
                    reason: reason.unwrap_or_default(),
                }
            }
            ClientMessage::LockMeeting => ConferenceAction::LockMeeting,
            ClientMessage::UnlockMeeting => ConferenceAction::UnlockMeeting,
            ClientMessage::CreateBreakoutRooms { count, auto_assign } => {
                ConferenceAction::CreateBreakoutRooms { count, auto_assign }
            }
            ClientMessage::AssignToBreakoutRoom {
                target_id,
                room_number,
            } => ConferenceAction::AssignToBreakoutRoom {
                target: target_id,
                room_number,
            },
            ClientMessage::ReturnToMainRoom { target_id } => ConferenceAction::ReturnToMainRoom {
                target: target_id.unwrap_or_else(|| self.connection_id.clone()),
            },
            ClientMessage::CloseBreakoutRooms => ConferenceAction::CloseBreakoutRooms,
            ClientMessage::CloseBreakoutRoom { room_number } => {
                ConferenceAction::CloseBreakoutRoom { room_number }
            }
            ClientMessage::UpdateConnectionQuality { quality } => {
                ConferenceAction::UpdateConnectionQuality { quality }
            }

            ClientMessage::SendOffer { target_id, offer } => {
                return self.relay(SignalKind::Offer, target_id, offer).await;
            }
            ClientMessage::SendAnswer { target_id, answer } => {
                return self.relay(SignalKind::Answer, target_id, answer).await;
            }
            ClientMessage::SendIceCandidate {
                target_id,
                candidate,
            } => {
                return self
                    .relay(SignalKind::IceCandidate, target_id, candidate)
                    .await;
            }

            ClientMessage::UpdatePermissions {
                target_id,
                roles,
                capabilities,
            } => ConferenceAction::UpdatePermissions {
                target: target_id,
                roles,
                capabilities,
            },
            ClientMessage::EndConference => ConferenceAction::EndConference,
            ClientMessage::GetParticipants => ConferenceAction::GetParticipants,
        };

        self.conference()?
            .action(self.connection_id.clone(), action)
            .await
    }

    async fn join(
        &mut self,
        conference_id: ConferenceId,
        display_name: String,
        email: Option<String>,
        password: Option<SecretString>,
        is_guest: bool,
    ) -> Result<JoinOutcome, ConfError> {
        if self.session.is_some() {
            return Err(ConfError::AlreadyInARoom);
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ConfError::InvalidRequest(
                "Display name is required".to_string(),
            ));
        }

        let identity = Identity {
            user_id: self.caller.user_id.clone(),
            display_name: display_name.to_string(),
            email: email.filter(|e| !e.trim().is_empty()),
            is_guest: is_guest || self.caller.user_id.is_none(),
        };

        let mut attempt = 0;
        let (conference, outcome) = loop {
            attempt += 1;
            let conference = self
                .controller
                .get_or_create_conference(conference_id.clone())
                .await?;
            let request = JoinRequest {
                connection_id: self.connection_id.clone(),
                identity: identity.clone(),
                roles: self.caller.roles,
                capabilities: self.caller.capabilities,
                password: password.clone(),
                outbound: self.outbound.clone(),
            };
            match conference.join(request).await {
                Ok(outcome) => break (conference, outcome),
                // Raced with the conference ending; the controller hands out
                // a fresh actor on the next lookup.
                Err(ConfError::ConferenceEnded) if attempt == 1 => continue,
                Err(e) => return Err(e),
            }
        };

        info!(
            target: "conf.handler",
            connection_id = %self.connection_id,
            conference_id = %conference_id,
            participant_count = outcome.participant_count,
            "Joined conference"
        );

        self.session = Some(Session {
            conference_id,
            conference,
            membership: outcome.membership.clone(),
        });
        Ok(outcome)
    }

    async fn leave(&mut self) -> Result<(), ConfError> {
        let session = self.session.take().ok_or(ConfError::NotInConference)?;
        session.conference.leave(self.connection_id.clone()).await
    }

    /// Relay a signaling payload. A target that already left is reported as
    /// `peerUnavailable` rather than an error.
    async fn relay(
        &mut self,
        kind: SignalKind,
        target: ConnectionId,
        payload: Value,
    ) -> Result<(), ConfError> {
        let result = self
            .conference()?
            .action(
                self.connection_id.clone(),
                ConferenceAction::Relay {
                    kind,
                    target: target.clone(),
                    payload,
                },
            )
            .await;

        match result {
            Err(ConfError::TargetNotFound(_)) => {
                debug!(
                    target: "conf.handler",
                    connection_id = %self.connection_id,
                    signal = %kind,
                    "Signaling target unavailable"
                );
                self.send(ServerEvent::PeerUnavailable {
                    target_id: target,
                    kind,
                })
                .await;
                Ok(())
            }
            other => other,
        }
    }

    fn conference(&self) -> Result<&ConferenceActorHandle, ConfError> {
        self.session
            .as_ref()
            .map(|s| &s.conference)
            .ok_or(ConfError::NotInConference)
    }

    async fn send(&self, event: ServerEvent) {
        if self.outbound.send(event).await.is_err() {
            debug!(
                target: "conf.handler",
                connection_id = %self.connection_id,
                "Transport writer gone"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, ConferenceLimits, ControllerConfig};
    use crate::catalog::InMemoryCatalog;
    use crate::sink::LoggingEventSink;
    use serde_json::json;
    use std::sync::Arc;

    fn controller() -> ConferenceControllerHandle {
        ConferenceControllerHandle::new(
            ControllerConfig {
                instance_id: "conf-test".to_string(),
                max_conferences: 10,
                limits: ConferenceLimits::default(),
            },
            Arc::new(InMemoryCatalog::new(true)),
            Arc::new(LoggingEventSink),
            ActorMetrics::new(),
        )
    }

    fn handler(
        controller: &ConferenceControllerHandle,
        id: &str,
        caller: CallerIdentity,
    ) -> (ConnectionHandler, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (
            ConnectionHandler::new(ConnectionId::new(id), caller, controller.clone(), tx),
            rx,
        )
    }

    fn join_frame(name: &str) -> String {
        json!({"type": "join", "conferenceId": "C1", "displayName": name}).to_string()
    }

    #[test]
    fn test_caller_identity_from_headers() {
        let caller = CallerIdentity::from_headers(Some("alice"), Some("host, record,bogus"));
        assert_eq!(caller.user_id.as_deref(), Some("alice"));
        assert!(caller.roles.host);
        assert!(!caller.roles.co_host);
        assert!(caller.capabilities.can_record);
        assert!(!caller.capabilities.can_share_screen);

        let guest = CallerIdentity::from_headers(Some("  "), None);
        assert_eq!(guest, CallerIdentity::guest());
    }

    #[tokio::test]
    async fn test_attach_sends_connection_id() {
        let controller = controller();
        let (handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());
        handler.on_attach().await;
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::ParticipantConnecting {
                connection_id: ConnectionId::new("a")
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_yields_single_error() {
        let controller = controller();
        let (mut handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());

        handler.on_text("{not json").await;
        handler.on_text(r#"{"type":"doesNotExist"}"#).await;

        for _ in 0..2 {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, ServerEvent::Error { code: 8, .. }));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_action_before_join_is_not_in_conference() {
        let controller = controller();
        let (mut handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());

        handler.on_message(ClientMessage::RaiseHand).await;
        let event = rx.recv().await.unwrap();
        let ServerEvent::Error { error_type, .. } = event else {
            unreachable!("expected error, got {event:?}");
        };
        assert_eq!(error_type, "not_in_conference");
    }

    #[tokio::test]
    async fn test_join_then_join_again() {
        let controller = controller();
        let (mut handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());

        handler.on_text(&join_frame("Ann")).await;
        assert_eq!(rx.recv().await.unwrap().kind_label(), "conference_joined");
        assert_eq!(handler.conference_id(), Some(&ConferenceId::new("C1")));

        handler.on_text(&join_frame("Ann")).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Error { code: 5, .. }));
    }

    #[tokio::test]
    async fn test_blank_display_name_rejected() {
        let controller = controller();
        let (mut handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());

        handler.on_text(&join_frame("   ")).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerEvent::Error { code: 8, .. }
        ));
        assert!(handler.conference_id().is_none());
    }

    #[tokio::test]
    async fn test_relay_to_departed_peer_is_peer_unavailable() {
        let controller = controller();
        let (mut a, mut a_rx) = handler(&controller, "a", CallerIdentity::guest());
        let (mut b, mut b_rx) = handler(&controller, "b", CallerIdentity::guest());

        a.on_text(&join_frame("Ann")).await;
        b.on_text(&join_frame("Bob")).await;
        let _ = a_rx.recv().await.unwrap(); // conferenceJoined
        let _ = a_rx.recv().await.unwrap(); // participantJoined(b)
        let _ = b_rx.recv().await.unwrap(); // conferenceJoined

        b.on_disconnect().await;
        assert_eq!(
            a_rx.recv().await.unwrap().kind_label(),
            "participant_disconnected"
        );

        a.on_message(ClientMessage::SendOffer {
            target_id: ConnectionId::new("b"),
            offer: json!({"sdp": "v=0"}),
        })
        .await;
        assert_eq!(
            a_rx.recv().await.unwrap(),
            ServerEvent::PeerUnavailable {
                target_id: ConnectionId::new("b"),
                kind: SignalKind::Offer,
            }
        );
    }

    #[tokio::test]
    async fn test_private_chat_requires_recipient() {
        let controller = controller();
        let (mut handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());
        handler.on_text(&join_frame("Ann")).await;
        let _ = rx.recv().await.unwrap();

        handler
            .on_message(ClientMessage::SendChat {
                message: "hi".to_string(),
                private: true,
                recipient_id: None,
            })
            .await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerEvent::Error { code: 8, .. }
        ));
    }

    #[tokio::test]
    async fn test_leave_allows_rejoin() {
        let controller = controller();
        let (mut handler, mut rx) = handler(&controller, "a", CallerIdentity::guest());

        handler.on_text(&join_frame("Ann")).await;
        let _ = rx.recv().await.unwrap();
        handler.on_message(ClientMessage::Leave).await;
        assert!(handler.conference_id().is_none());

        handler.on_text(&join_frame("Ann")).await;
        assert_eq!(rx.recv().await.unwrap().kind_label(), "conference_joined");
    }
}
