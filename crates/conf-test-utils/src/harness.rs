//! Controller, catalog and sink wired together for scenario tests.

use crate::client::TestClient;
use crate::fixtures::{TestConference, TestParticipant};
use crate::recording_sink::RecordingSink;
use common::types::{ConferenceId, ConnectionId};
use conf_service::actors::{
    ActorMetrics, ConferenceControllerHandle, ConferenceLimits, ConferenceState, ControllerConfig,
};
use conf_service::catalog::InMemoryCatalog;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One coordinator instance with an in-memory catalog and a recording sink.
pub struct TestHarness {
    pub controller: ConferenceControllerHandle,
    pub catalog: Arc<InMemoryCatalog>,
    pub sink: RecordingSink,
    pub metrics: Arc<ActorMetrics>,
    next_connection: AtomicUsize,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Default limits, ad-hoc conferences allowed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ConferenceLimits::default())
    }

    #[must_use]
    pub fn with_limits(limits: ConferenceLimits) -> Self {
        Self::build(limits, true, 100)
    }

    /// Only conferences inserted via [`TestHarness::add_conference`] exist.
    #[must_use]
    pub fn catalog_only() -> Self {
        Self::build(ConferenceLimits::default(), false, 100)
    }

    #[must_use]
    pub fn build(limits: ConferenceLimits, allow_adhoc: bool, max_conferences: usize) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new(allow_adhoc));
        let sink = RecordingSink::new();
        let metrics = ActorMetrics::new();
        let controller = ConferenceControllerHandle::new(
            ControllerConfig {
                instance_id: "conf-test".to_string(),
                max_conferences,
                limits,
            },
            catalog.clone(),
            Arc::new(sink.clone()),
            Arc::clone(&metrics),
        );
        Self {
            controller,
            catalog,
            sink,
            metrics,
            next_connection: AtomicUsize::new(1),
        }
    }

    pub fn add_conference(&self, conference: &TestConference) {
        self.catalog
            .insert(conference.id.clone(), conference.settings());
    }

    /// Attach a client and consume its `participantConnecting` frame.
    pub async fn connect(&self, participant: TestParticipant) -> TestClient {
        let n = self.next_connection.fetch_add(1, Ordering::SeqCst);
        let connection_id =
            ConnectionId::new(format!("{}-{n}", participant.display_name.to_lowercase()));
        TestClient::attach(connection_id, participant, self.controller.clone()).await
    }

    /// Snapshot of a live conference.
    ///
    /// # Panics
    ///
    /// Panics if the conference is not live.
    pub async fn state(&self, conference_id: &str) -> ConferenceState {
        let handle = self
            .controller
            .get_or_create_conference(ConferenceId::new(conference_id))
            .await
            .expect("conference lookup failed");
        handle.get_state().await.expect("conference state")
    }
}
