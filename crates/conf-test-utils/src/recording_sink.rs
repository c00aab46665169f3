//! Session event sink that records everything it is given.

use common::types::ConnectionId;
use conf_service::sink::{LeaveReason, SessionEvent, SessionEventSink, SessionSummary};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, cloneable record of session events.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Leave reasons recorded for one connection, in order.
    pub fn departures_of(&self, connection_id: &ConnectionId) -> Vec<LeaveReason> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::ParticipantLeft {
                    connection_id: id,
                    reason,
                    ..
                } if &id == connection_id => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// Every session summary recorded so far.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::SessionEnded(summary) => Some(summary),
                _ => None,
            })
            .collect()
    }

    /// Wait until a summary has been recorded.
    ///
    /// # Panics
    ///
    /// Panics if none arrives within two seconds.
    pub async fn wait_for_summary(&self) -> SessionSummary {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(summary) = self.summaries().into_iter().next() {
                return summary;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no session summary recorded"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl SessionEventSink for RecordingSink {
    fn record(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}
