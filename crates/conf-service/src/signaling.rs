//! Signaling Relay.
//!
//! Point-to-point forwarding of WebRTC negotiation payloads between two
//! connections of the same conference. Payloads are opaque: they are never
//! parsed, validated, or stored, and are relayed unchanged. Relays are not
//! gated on room membership; only registration is checked.

use crate::dispatch::Dispatcher;
use crate::errors::ConfError;
use crate::protocol::ServerEvent;
use crate::registry::ConnectionRegistry;

use common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which negotiation message is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    fn into_event(self, sender_id: ConnectionId, payload: Value) -> ServerEvent {
        match self {
            SignalKind::Offer => ServerEvent::ReceiveOffer {
                sender_id,
                offer: payload,
            },
            SignalKind::Answer => ServerEvent::ReceiveAnswer {
                sender_id,
                answer: payload,
            },
            SignalKind::IceCandidate => ServerEvent::ReceiveIceCandidate {
                sender_id,
                candidate: payload,
            },
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward `payload` from `sender` to `target`, tagged with the sender's id.
///
/// # Errors
///
/// - `NotInConference` if the sender is not registered.
/// - `TargetNotFound` if the target is not registered (e.g. already left).
/// - `InvalidRequest` if the sender targets itself.
pub fn relay(
    registry: &ConnectionRegistry,
    dispatcher: &Dispatcher,
    kind: SignalKind,
    sender: &ConnectionId,
    target: &ConnectionId,
    payload: Value,
) -> Result<(), ConfError> {
    if !registry.contains(sender) {
        return Err(ConfError::NotInConference);
    }
    if sender == target {
        return Err(ConfError::InvalidRequest(format!(
            "Cannot send {kind} to yourself"
        )));
    }
    registry.lookup(target)?;

    dispatcher.broadcast_to_connection(target, kind.into_event(sender.clone(), payload))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionActor;
    use crate::actors::metrics::ActorMetrics;
    use crate::registry::{Capabilities, Connection, Identity, Roles};
    use common::types::ConferenceId;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn setup(ids: &[&str]) -> (ConnectionRegistry, Dispatcher, Vec<mpsc::Receiver<ServerEvent>>) {
        let mut registry = ConnectionRegistry::new();
        let mut dispatcher = Dispatcher::new(ConferenceId::new("C1"));
        let mut receivers = Vec::new();
        for id in ids {
            registry
                .register(Connection::new(
                    ConnectionId::new(*id),
                    Identity {
                        user_id: None,
                        display_name: (*id).to_string(),
                        email: None,
                        is_guest: true,
                    },
                    Roles::default(),
                    Capabilities::participant(),
                ))
                .unwrap();
            let (outbound, rx) = mpsc::channel(8);
            let (handle, _task) = ConnectionActor::spawn(
                ConnectionId::new(*id),
                ConferenceId::new("C1"),
                outbound,
                8,
                CancellationToken::new(),
                ActorMetrics::new(),
            );
            dispatcher.attach(handle);
            receivers.push(rx);
        }
        (registry, dispatcher, receivers)
    }

    #[tokio::test]
    async fn test_offer_relayed_unchanged() {
        let (registry, dispatcher, mut receivers) = setup(&["a", "b"]);
        let offer = json!({"type": "offer", "sdp": "v=0\r\n..."});

        relay(
            &registry,
            &dispatcher,
            SignalKind::Offer,
            &ConnectionId::new("a"),
            &ConnectionId::new("b"),
            offer.clone(),
        )
        .unwrap();

        let b_rx = receivers.get_mut(1).unwrap();
        assert_eq!(
            b_rx.recv().await.unwrap(),
            ServerEvent::ReceiveOffer {
                sender_id: ConnectionId::new("a"),
                offer,
            }
        );
    }

    #[tokio::test]
    async fn test_ice_candidate_kind() {
        let (registry, dispatcher, mut receivers) = setup(&["a", "b"]);
        relay(
            &registry,
            &dispatcher,
            SignalKind::IceCandidate,
            &ConnectionId::new("b"),
            &ConnectionId::new("a"),
            json!({"candidate": "candidate:1 1 udp 2122260223 10.0.0.1 54321 typ host"}),
        )
        .unwrap();

        let a_rx = receivers.get_mut(0).unwrap();
        let event = a_rx.recv().await.unwrap();
        assert_eq!(event.kind_label(), "receive_ice_candidate");
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let (registry, dispatcher, _receivers) = setup(&["a"]);
        let result = relay(
            &registry,
            &dispatcher,
            SignalKind::Answer,
            &ConnectionId::new("a"),
            &ConnectionId::new("gone"),
            json!({}),
        );
        assert!(matches!(result, Err(ConfError::TargetNotFound(_))));
    }

    #[tokio::test]
    async fn test_unregistered_sender() {
        let (registry, dispatcher, _receivers) = setup(&["b"]);
        let result = relay(
            &registry,
            &dispatcher,
            SignalKind::Offer,
            &ConnectionId::new("stranger"),
            &ConnectionId::new("b"),
            json!({}),
        );
        assert!(matches!(result, Err(ConfError::NotInConference)));
    }

    #[tokio::test]
    async fn test_self_relay_rejected() {
        let (registry, dispatcher, _receivers) = setup(&["a"]);
        let result = relay(
            &registry,
            &dispatcher,
            SignalKind::Offer,
            &ConnectionId::new("a"),
            &ConnectionId::new("a"),
            json!({}),
        );
        assert!(matches!(result, Err(ConfError::InvalidRequest(_))));
    }

    #[test]
    fn test_signal_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(SignalKind::IceCandidate).unwrap(),
            json!("ice-candidate")
        );
        assert_eq!(SignalKind::Offer.to_string(), "offer");
    }
}
