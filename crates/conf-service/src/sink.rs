//! Session Event Sink.
//!
//! Emits participant join/leave and session summary records. The core never
//! waits on the sink: `record` must return promptly, so anything slow belongs
//! behind `ChannelEventSink` and a background forwarder.

use chrono::{DateTime, Utc};
use common::types::{ConferenceId, ConnectionId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why a participant left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Left,
    Disconnected,
    Removed,
    ConferenceEnded,
}

impl LeaveReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Left => "left",
            LeaveReason::Disconnected => "disconnected",
            LeaveReason::Removed => "removed",
            LeaveReason::ConferenceEnded => "conference_ended",
        }
    }
}

/// Totals for a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub conference_id: ConferenceId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_joined: u64,
    pub peak_concurrent: usize,
    pub chat_messages: u64,
    pub end_reason: String,
}

/// A session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined {
        conference_id: ConferenceId,
        connection_id: ConnectionId,
        user_id: Option<String>,
        display_name: String,
        at: DateTime<Utc>,
    },
    ParticipantLeft {
        conference_id: ConferenceId,
        connection_id: ConnectionId,
        reason: LeaveReason,
        at: DateTime<Utc>,
    },
    SessionEnded(SessionSummary),
}

/// Destination for session records.
pub trait SessionEventSink: Send + Sync {
    /// Record one event. Must not block.
    fn record(&self, event: SessionEvent);
}

/// Writes session records to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl SessionEventSink for LoggingEventSink {
    fn record(&self, event: SessionEvent) {
        match event {
            SessionEvent::ParticipantJoined {
                conference_id,
                connection_id,
                user_id,
                display_name,
                ..
            } => {
                info!(
                    target: "conf.sink",
                    conference_id = %conference_id,
                    connection_id = %connection_id,
                    user_id = ?user_id,
                    display_name = %display_name,
                    "Participant joined"
                );
            }
            SessionEvent::ParticipantLeft {
                conference_id,
                connection_id,
                reason,
                ..
            } => {
                info!(
                    target: "conf.sink",
                    conference_id = %conference_id,
                    connection_id = %connection_id,
                    reason = reason.as_str(),
                    "Participant left"
                );
            }
            SessionEvent::SessionEnded(summary) => {
                info!(
                    target: "conf.sink",
                    conference_id = %summary.conference_id,
                    started_at = %summary.started_at,
                    ended_at = %summary.ended_at,
                    total_joined = summary.total_joined,
                    peak_concurrent = summary.peak_concurrent,
                    chat_messages = summary.chat_messages,
                    end_reason = %summary.end_reason,
                    "Session ended"
                );
            }
        }
    }
}

/// Hands records to an unbounded channel so the caller never waits.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelEventSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl SessionEventSink for ChannelEventSink {
    fn record(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!(target: "conf.sink", "Session event receiver dropped");
        }
    }
}

/// Drain `receiver` into `sink` until the channel closes or `cancel` fires.
pub async fn forward_events(
    mut receiver: mpsc::UnboundedReceiver<SessionEvent>,
    sink: Arc<dyn SessionEventSink>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Some(event) => sink.record(event),
                    None => break,
                }
            }
            () = cancel.cancelled() => {
                // Flush what is already queued
                while let Ok(event) = receiver.try_recv() {
                    sink.record(event);
                }
                break;
            }
        }
    }
    debug!(target: "conf.sink", "Session event forwarder stopped");
}
