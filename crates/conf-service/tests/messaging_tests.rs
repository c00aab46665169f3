//! Signaling relay, chat, and room-scoped broadcast scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use conf_service::protocol::{ClientMessage, ServerEvent};
use conf_service::registry::ConnectionQuality;
use conf_service::rooms::RoomId;
use conf_service::signaling::SignalKind;
use conf_test_utils::{TestClient, TestHarness, TestParticipant};
use serde_json::json;

async fn joined(harness: &TestHarness, participant: TestParticipant, conference: &str) -> TestClient {
    let mut client = harness.connect(participant).await;
    client.join(conference).await;
    client
}

fn chat(message: &str) -> ClientMessage {
    ClientMessage::SendChat {
        message: message.to_string(),
        private: false,
        recipient_id: None,
    }
}

// ============================================================================
// Signaling relay
// ============================================================================

#[tokio::test]
async fn test_offer_answer_ice_relayed_unchanged() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S1").await;
    let mut bob = joined(&harness, TestParticipant::new("bob"), "S1").await;
    ann.settle().await;

    let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 0.0.0.0"});
    ann.send(ClientMessage::SendOffer {
        target_id: bob.id(),
        offer: offer.clone(),
    })
    .await;
    assert_eq!(
        bob.recv().await,
        ServerEvent::ReceiveOffer {
            sender_id: ann.id(),
            offer
        }
    );

    let answer = json!({"type": "answer", "sdp": "v=0"});
    bob.send(ClientMessage::SendAnswer {
        target_id: ann.id(),
        answer: answer.clone(),
    })
    .await;
    assert_eq!(
        ann.recv().await,
        ServerEvent::ReceiveAnswer {
            sender_id: bob.id(),
            answer
        }
    );

    let candidate = json!({"candidate": "candidate:1 1 UDP 2122260223 10.0.0.1 54400 typ host", "sdpMLineIndex": 0});
    ann.send(ClientMessage::SendIceCandidate {
        target_id: bob.id(),
        candidate: candidate.clone(),
    })
    .await;
    assert_eq!(
        bob.recv().await,
        ServerEvent::ReceiveIceCandidate {
            sender_id: ann.id(),
            candidate
        }
    );
}

#[tokio::test]
async fn test_offer_to_departed_peer_yields_peer_unavailable() {
    let harness = TestHarness::new();
    let mut bob = joined(&harness, TestParticipant::guest("bob"), "S2").await;
    let mut carol = joined(&harness, TestParticipant::guest("carol"), "S2").await;
    bob.expect_kind("participant_joined").await;

    carol.disconnect().await;
    bob.expect_kind("participant_disconnected").await;

    bob.send(ClientMessage::SendOffer {
        target_id: carol.id(),
        offer: json!({"sdp": "v=0"}),
    })
    .await;

    assert_eq!(
        bob.recv().await,
        ServerEvent::PeerUnavailable {
            target_id: carol.id(),
            kind: SignalKind::Offer,
        }
    );
}

#[tokio::test]
async fn test_relay_crosses_rooms_but_not_conferences() {
    let harness = TestHarness::new();
    let mut host = joined(&harness, TestParticipant::host("hana"), "S3").await;
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S3").await;
    let other = joined(&harness, TestParticipant::new("otto"), "S3-other").await;

    host.send(ClientMessage::CreateBreakoutRooms {
        count: 1,
        auto_assign: true,
    })
    .await;
    ann.expect_event(|e| e.kind_label() == "assigned_to_breakout_room")
        .await;
    host.settle().await;

    host.send(ClientMessage::SendIceCandidate {
        target_id: ann.id(),
        candidate: json!({"c": 1}),
    })
    .await;
    ann.expect_kind("receive_ice_candidate").await;

    host.send(ClientMessage::SendOffer {
        target_id: other.id(),
        offer: json!({}),
    })
    .await;
    host.expect_kind("peer_unavailable").await;
}

#[tokio::test]
async fn test_offer_to_self_rejected() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S4").await;

    ann.send(ClientMessage::SendOffer {
        target_id: ann.id(),
        offer: json!({}),
    })
    .await;
    ann.expect_error("invalid_request").await;
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_fifo_per_sender() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S5").await;
    let mut bob = joined(&harness, TestParticipant::new("bob"), "S5").await;
    let mut carol = joined(&harness, TestParticipant::new("carol"), "S5").await;
    ann.settle().await;
    bob.settle().await;

    for n in 0..25 {
        bob.send(chat(&format!("message {n}"))).await;
    }

    let bob_id = bob.id();
    for client in [&mut ann, &mut carol, &mut bob] {
        let mut previous = None;
        for n in 0..25 {
            let ServerEvent::ChatMessageReceived { message } =
                client.expect_kind("chat_message_received").await
            else {
                unreachable!("checked by expect_kind");
            };
            assert_eq!(message.content, format!("message {n}"));
            assert_eq!(message.sender_id, bob_id);
            if let Some(previous) = previous {
                assert!(message.sent_at >= previous, "timestamps follow send order");
            }
            previous = Some(message.sent_at);
        }
    }

    assert_eq!(harness.state("S5").await.chat_messages, 25);
}

#[tokio::test]
async fn test_chat_stays_in_breakout_room() {
    let harness = TestHarness::new();
    let mut host = joined(&harness, TestParticipant::host("hana"), "S6").await;
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S6").await;
    let mut bob = joined(&harness, TestParticipant::new("bob"), "S6").await;

    host.send(ClientMessage::CreateBreakoutRooms {
        count: 1,
        auto_assign: false,
    })
    .await;
    host.send(ClientMessage::AssignToBreakoutRoom {
        target_id: ann.id(),
        room_number: 1,
    })
    .await;
    ann.expect_event(|e| e.kind_label() == "assigned_to_breakout_room")
        .await;
    host.settle().await;
    bob.settle().await;

    ann.send(chat("only for room 1")).await;
    ann.expect_kind("chat_message_received").await;
    host.assert_silent().await;
    bob.assert_silent().await;

    let state = harness.state("S6").await;
    assert_eq!(state.members_of(RoomId::Breakout(1)), vec![ann.id()]);
}

#[tokio::test]
async fn test_private_chat() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S7").await;
    let mut bob = joined(&harness, TestParticipant::new("bob"), "S7").await;
    let mut carol = joined(&harness, TestParticipant::new("carol"), "S7").await;
    ann.settle().await;
    bob.settle().await;

    ann.send(ClientMessage::SendChat {
        message: "psst".to_string(),
        private: true,
        recipient_id: Some(bob.id()),
    })
    .await;

    let ServerEvent::PrivateChatMessageReceived { message } =
        bob.expect_kind("private_chat_message_received").await
    else {
        unreachable!("checked by expect_kind");
    };
    assert_eq!(message.recipient_id, Some(bob.id()));
    ann.expect_kind("private_chat_message_sent").await;
    carol.assert_silent().await;
}

#[tokio::test]
async fn test_chat_validation() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S8").await;

    ann.send(chat("   ")).await;
    ann.expect_error("invalid_request").await;

    ann.send(chat(&"x".repeat(4001))).await;
    ann.expect_error("invalid_request").await;

    ann.send(ClientMessage::SendChat {
        message: "hello?".to_string(),
        private: true,
        recipient_id: Some("gone".into()),
    })
    .await;
    ann.expect_error("target_not_found").await;
}

// ============================================================================
// Media state and presence signals
// ============================================================================

#[tokio::test]
async fn test_media_toggles_reach_others_in_room() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S9").await;
    let mut bob = joined(&harness, TestParticipant::new("bob"), "S9").await;
    ann.settle().await;

    bob.send(ClientMessage::ToggleAudio { muted: true }).await;
    bob.send(ClientMessage::ToggleVideo { off: true }).await;
    bob.send(ClientMessage::RaiseHand).await;
    bob.send(ClientMessage::StartScreenShare).await;
    bob.send(ClientMessage::StopScreenShare).await;
    bob.send(ClientMessage::LowerHand).await;
    bob.send(ClientMessage::UpdateConnectionQuality {
        quality: ConnectionQuality::Poor,
    })
    .await;

    assert_eq!(
        ann.recv().await,
        ServerEvent::ParticipantAudioToggled {
            connection_id: bob.id(),
            muted: true
        }
    );
    for kind in [
        "participant_video_toggled",
        "hand_raised",
        "screen_share_started",
        "screen_share_stopped",
        "hand_lowered",
        "participant_quality_updated",
    ] {
        ann.expect_kind(kind).await;
    }
    bob.assert_silent().await;

    ann.send(ClientMessage::GetParticipants).await;
    let ServerEvent::ParticipantList { room, participants } =
        ann.expect_kind("participant_list").await
    else {
        unreachable!("checked by expect_kind");
    };
    assert_eq!(room, RoomId::Main);
    let bob_info = participants
        .iter()
        .find(|p| p.connection_id == bob.id())
        .expect("bob listed");
    assert!(bob_info.media.audio_muted);
    assert!(bob_info.media.video_off);
    assert!(!bob_info.media.hand_raised);
    assert!(!bob_info.media.screen_sharing);
    assert_eq!(bob_info.quality, ConnectionQuality::Poor);
}

#[tokio::test]
async fn test_whiteboard_update_and_clear() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S10").await;
    let mut bob = joined(&harness, TestParticipant::new("bob"), "S10").await;
    ann.settle().await;

    let stroke = json!({"points": [[0, 0], [10, 10]], "color": "#000"});
    bob.send(ClientMessage::UpdateWhiteboard {
        data: stroke.clone(),
    })
    .await;
    assert_eq!(
        ann.recv().await,
        ServerEvent::WhiteboardUpdated {
            connection_id: bob.id(),
            data: stroke
        }
    );

    bob.send(ClientMessage::ClearWhiteboard).await;
    ann.expect_kind("whiteboard_cleared").await;
}

#[tokio::test]
async fn test_malformed_and_unknown_frames() {
    let harness = TestHarness::new();
    let mut ann = joined(&harness, TestParticipant::new("ann"), "S11").await;

    ann.send_text("not json at all").await;
    ann.expect_error("invalid_request").await;

    ann.send_text(r#"{"type": "teleport"}"#).await;
    ann.expect_error("invalid_request").await;

    // Still usable afterwards
    ann.send_text(r#"{"type": "raiseHand"}"#).await;
    ann.assert_silent().await;
    assert!(
        harness
            .state("S11")
            .await
            .room_of(&ann.id())
            .is_some_and(|room| room.is_main())
    );
}
