//! Socket-free client harness.
//!
//! `TestClient` owns a [`ConnectionHandler`] and the receiving end of its
//! outbound queue, which is exactly what the WebSocket transport holds. Tests
//! send `ClientMessage`s and read back `ServerEvent`s.

use crate::fixtures::TestParticipant;
use common::types::{ConferenceId, ConnectionId};
use conf_service::actors::ConferenceControllerHandle;
use conf_service::handler::ConnectionHandler;
use conf_service::protocol::{ClientMessage, ServerEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long `recv` waits before failing the test.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);
/// How long `assert_silent` waits for a stray event.
const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// One simulated client connection.
pub struct TestClient {
    pub participant: TestParticipant,
    handler: ConnectionHandler,
    events: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Attach and consume the `participantConnecting` frame.
    ///
    /// # Panics
    ///
    /// Panics if the first frame is anything else.
    pub async fn attach(
        connection_id: ConnectionId,
        participant: TestParticipant,
        controller: ConferenceControllerHandle,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let handler =
            ConnectionHandler::new(connection_id, participant.caller.clone(), controller, tx);
        handler.on_attach().await;

        let mut client = Self {
            participant,
            handler,
            events: rx,
        };
        let first = client.recv().await;
        assert!(
            matches!(first, ServerEvent::ParticipantConnecting { .. }),
            "expected participantConnecting, got {first:?}"
        );
        client
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.handler.connection_id().clone()
    }

    /// Send a decoded message through the handler.
    pub async fn send(&mut self, message: ClientMessage) {
        self.handler.on_message(message).await;
    }

    /// Send a raw text frame through the handler.
    pub async fn send_text(&mut self, text: &str) {
        self.handler.on_text(text).await;
    }

    /// Join a conference without a password and return the
    /// `conferenceJoined` reply.
    ///
    /// # Panics
    ///
    /// Panics if the join is rejected.
    pub async fn join(&mut self, conference_id: &str) -> ServerEvent {
        self.join_with_password(conference_id, None).await;
        self.expect_kind("conference_joined").await
    }

    /// Send a join and leave the reply unread.
    pub async fn join_with_password(&mut self, conference_id: &str, password: Option<&str>) {
        let message = ClientMessage::Join {
            conference_id: ConferenceId::new(conference_id),
            display_name: self.participant.display_name.clone(),
            email: None,
            password: password.map(Into::into),
            is_guest: self.participant.caller.user_id.is_none(),
        };
        self.send(message).await;
    }

    /// Simulate the transport closing.
    pub async fn disconnect(&mut self) {
        self.handler.on_disconnect().await;
    }

    /// Next event.
    ///
    /// # Panics
    ///
    /// Panics on timeout or if the queue closed.
    pub async fn recv(&mut self) -> ServerEvent {
        tokio::time::timeout(RECV_TIMEOUT, self.events.recv())
            .await
            .unwrap_or_else(|_| panic!("{}: timed out waiting for an event", self.id()))
            .unwrap_or_else(|| panic!("{}: outbound queue closed", self.id()))
    }

    /// Next event, which must have the given kind label.
    ///
    /// # Panics
    ///
    /// Panics if the next event is of another kind.
    pub async fn expect_kind(&mut self, kind: &str) -> ServerEvent {
        let event = self.recv().await;
        assert_eq!(
            event.kind_label(),
            kind,
            "{}: unexpected event {event:?}",
            self.id()
        );
        event
    }

    /// Next event, which must be an error with the given type label.
    ///
    /// # Panics
    ///
    /// Panics if the next event is not that error.
    pub async fn expect_error(&mut self, error_type: &str) -> ServerEvent {
        let event = self.recv().await;
        match &event {
            ServerEvent::Error { error_type: t, .. } if t == error_type => {}
            other => panic!(
                "{}: expected error {error_type}, got {other:?}",
                self.id()
            ),
        }
        event
    }

    /// Skip events until one matches, returning it.
    ///
    /// # Panics
    ///
    /// Panics if no matching event arrives in time.
    pub async fn expect_event<F>(&mut self, mut predicate: F) -> ServerEvent
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        loop {
            let event = self.recv().await;
            if predicate(&event) {
                return event;
            }
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Let in-flight deliveries land, then return everything queued.
    pub async fn settle(&mut self) -> Vec<ServerEvent> {
        tokio::time::sleep(QUIET_PERIOD).await;
        self.drain()
    }

    /// Assert nothing arrives during a short quiet period.
    ///
    /// # Panics
    ///
    /// Panics if an event arrives.
    pub async fn assert_silent(&mut self) {
        let stray = self.settle().await;
        assert!(stray.is_empty(), "{}: unexpected events {stray:?}", self.id());
    }
}
