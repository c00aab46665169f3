//! `ConferenceControllerActor` - singleton supervisor for conference actors.
//!
//! The `ConferenceControllerActor` is the top-level actor in the hierarchy:
//!
//! - Singleton per process
//! - Looks up the `ConferenceActor` for a conference id, spawning it on the
//!   first join after resolving the id through the catalog
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`) and drops
//!   finished conferences so a later join recreates them
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the controller:
//! 1. Stops admitting new conferences (`Draining`)
//! 2. Ends every live conference with reason `server_shutdown`
//! 3. Waits for the conference tasks up to the deadline
//! 4. Cancels the root token, which stops anything left over

use crate::catalog::ConferenceCatalog;
use crate::errors::ConfError;
use crate::sink::SessionEventSink;

use super::conference::{
    ConferenceActor, ConferenceActorHandle, ConferenceLimits, END_REASON_SHUTDOWN,
};
use super::messages::{ConferenceInfo, ControllerMessage, ControllerStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::{DateTime, Utc};
use common::types::ConferenceId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// How often finished conference actors are reaped while idle.
const REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Wait per conference when the root token is cancelled without a
/// `Shutdown` message.
const CONFERENCE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub instance_id: String,
    /// Live conference bound; further conferences get `CapacityExceeded`.
    pub max_conferences: usize,
    pub limits: ConferenceLimits,
}

/// Handle to the `ConferenceControllerActor`.
///
/// This is the public interface for interacting with the controller.
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct ConferenceControllerHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl ConferenceControllerHandle {
    /// Create a new `ConferenceControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        catalog: Arc<dyn ConferenceCatalog>,
        sink: Arc<dyn SessionEventSink>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Controller,
            config.instance_id.as_str(),
        ));

        let actor = ConferenceControllerActor::new(
            config,
            receiver,
            cancel_token.clone(),
            Arc::clone(&mailbox),
            catalog,
            sink,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    /// Get the live actor for a conference, spawning it if needed.
    pub async fn get_or_create_conference(
        &self,
        conference_id: ConferenceId,
    ) -> Result<ConferenceActorHandle, ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::GetOrCreateConference {
            conference_id,
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| ConfError::Draining)?
    }

    /// Get information about a live conference.
    pub async fn get_conference(
        &self,
        conference_id: ConferenceId,
    ) -> Result<ConferenceInfo, ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::GetConference {
            conference_id,
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| ConfError::Draining)?
    }

    /// End a conference for everyone.
    pub async fn end_conference(
        &self,
        conference_id: ConferenceId,
        reason: impl Into<String>,
    ) -> Result<(), ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::EndConference {
            conference_id,
            reason: reason.into(),
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| ConfError::Draining)?
    }

    /// Get the current controller status.
    pub async fn get_status(&self) -> Result<ControllerStatus, ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::GetStatus { respond_to: tx })
            .await?;

        rx.await.map_err(|_| ConfError::Draining)
    }

    /// Initiate graceful shutdown. Returns once every conference has ended
    /// or `deadline` has passed.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ControllerMessage::Shutdown {
            deadline,
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| ConfError::Draining)?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the controller.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: ControllerMessage) -> Result<(), ConfError> {
        // A gone controller only happens once shutdown has started.
        self.sender
            .send(message)
            .await
            .map_err(|_| ConfError::Draining)?;
        self.mailbox.record_enqueue();
        Ok(())
    }
}

/// Internal state for a managed conference.
struct ManagedConference {
    handle: ConferenceActorHandle,
    task_handle: JoinHandle<()>,
    created_at: DateTime<Utc>,
}

impl ManagedConference {
    fn is_live(&self) -> bool {
        !self.handle.is_cancelled() && !self.task_handle.is_finished()
    }
}

/// The `ConferenceControllerActor` implementation.
pub struct ConferenceControllerActor {
    config: ControllerConfig,
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    catalog: Arc<dyn ConferenceCatalog>,
    sink: Arc<dyn SessionEventSink>,
    conferences: HashMap<ConferenceId, ManagedConference>,
    /// Whether the controller is admitting new conferences.
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl ConferenceControllerActor {
    fn new(
        config: ControllerConfig,
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        mailbox: Arc<MailboxMonitor>,
        catalog: Arc<dyn ConferenceCatalog>,
        sink: Arc<dyn SessionEventSink>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        Self {
            config,
            receiver,
            cancel_token,
            catalog,
            sink,
            conferences: HashMap::new(),
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "conf.actor.controller", fields(instance_id = %self.config.instance_id))]
    async fn run(mut self) {
        info!(
            target: "conf.actor.controller",
            instance_id = %self.config.instance_id,
            "ConferenceControllerActor started"
        );

        let mut reap = tokio::time::interval(REAP_INTERVAL);

        loop {
            // Check for terminated conference actors
            self.check_conference_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "conf.actor.controller",
                        instance_id = %self.config.instance_id,
                        "ConferenceControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                _ = reap.tick() => {}

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "conf.actor.controller",
                                instance_id = %self.config.instance_id,
                                "ConferenceControllerActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "conf.actor.controller",
            instance_id = %self.config.instance_id,
            conferences_remaining = self.conferences.len(),
            messages_processed = self.mailbox.messages_processed(),
            "ConferenceControllerActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::GetOrCreateConference {
                conference_id,
                respond_to,
            } => {
                let result = self.get_or_create_conference(conference_id);
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetConference {
                conference_id,
                respond_to,
            } => {
                let result = self.get_conference(&conference_id).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::EndConference {
                conference_id,
                reason,
                respond_to,
            } => {
                let result = self.end_conference(&conference_id, reason).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline).await;
                let _ = respond_to.send(result);
            }
        }
    }

    /// Return the live conference actor, spawning one if there is none.
    fn get_or_create_conference(
        &mut self,
        conference_id: ConferenceId,
    ) -> Result<ConferenceActorHandle, ConfError> {
        if !self.accepting_new {
            return Err(ConfError::Draining);
        }

        if let Some(managed) = self.conferences.get(&conference_id) {
            if managed.is_live() {
                return Ok(managed.handle.clone());
            }
        }
        // An ended conference is replaced by a fresh one.
        if let Some(stale) = self.conferences.remove(&conference_id) {
            debug!(
                target: "conf.actor.controller",
                conference_id = %conference_id,
                "Replacing ended conference actor"
            );
            drop(stale.task_handle);
            self.metrics.conference_removed();
        }

        let settings = self
            .catalog
            .lookup(&conference_id)
            .ok_or_else(|| ConfError::ConferenceNotFound(conference_id.to_string()))?;

        if self.conferences.len() >= self.config.max_conferences {
            warn!(
                target: "conf.actor.controller",
                instance_id = %self.config.instance_id,
                conference_count = self.conferences.len(),
                "Conference capacity reached"
            );
            return Err(ConfError::CapacityExceeded);
        }

        let (handle, task_handle) = ConferenceActor::spawn(
            conference_id.clone(),
            settings,
            self.config.limits.clone(),
            self.cancel_token.child_token(),
            Arc::clone(&self.sink),
            Arc::clone(&self.metrics),
        );

        self.conferences.insert(
            conference_id.clone(),
            ManagedConference {
                handle: handle.clone(),
                task_handle,
                created_at: Utc::now(),
            },
        );
        self.metrics.conference_created();

        info!(
            target: "conf.actor.controller",
            instance_id = %self.config.instance_id,
            conference_id = %conference_id,
            total_conferences = self.conferences.len(),
            "Conference actor created"
        );

        Ok(handle)
    }

    /// Get information about a conference.
    async fn get_conference(
        &self,
        conference_id: &ConferenceId,
    ) -> Result<ConferenceInfo, ConfError> {
        let managed = self
            .conferences
            .get(conference_id)
            .filter(|m| m.is_live())
            .ok_or_else(|| ConfError::ConferenceNotFound(conference_id.to_string()))?;

        let state = managed.handle.get_state().await?;
        Ok(ConferenceInfo {
            conference_id: conference_id.clone(),
            participant_count: state.participant_count,
            created_at: managed.created_at,
        })
    }

    async fn end_conference(
        &mut self,
        conference_id: &ConferenceId,
        reason: String,
    ) -> Result<(), ConfError> {
        let managed = self
            .conferences
            .get(conference_id)
            .filter(|m| m.is_live())
            .ok_or_else(|| ConfError::ConferenceNotFound(conference_id.to_string()))?;

        info!(
            target: "conf.actor.controller",
            conference_id = %conference_id,
            reason = %reason,
            "Ending conference"
        );
        managed.handle.end(reason).await
    }

    /// Get current controller status.
    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            conference_count: self.conferences.values().filter(|m| m.is_live()).count(),
            connection_count: self.metrics.connection_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Stop admitting, end every conference, and wait for them up to
    /// `deadline`.
    async fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), ConfError> {
        info!(
            target: "conf.actor.controller",
            instance_id = %self.config.instance_id,
            conference_count = self.conferences.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;

        for (conference_id, managed) in &self.conferences {
            if managed.handle.end(END_REASON_SHUTDOWN).await.is_err() {
                debug!(
                    target: "conf.actor.controller",
                    conference_id = %conference_id,
                    "Conference already ended"
                );
            }
        }

        let tasks: Vec<(ConferenceId, JoinHandle<()>)> = self
            .conferences
            .drain()
            .map(|(id, managed)| (id, managed.task_handle))
            .collect();
        for _ in &tasks {
            self.metrics.conference_removed();
        }

        let wait_all = futures::future::join_all(tasks.into_iter().map(|(id, task)| async move {
            if let Err(e) = task.await {
                warn!(
                    target: "conf.actor.controller",
                    conference_id = %id,
                    error = ?e,
                    "Conference actor task failed during shutdown"
                );
            }
        }));

        if tokio::time::timeout(deadline, wait_all).await.is_err() {
            warn!(
                target: "conf.actor.controller",
                instance_id = %self.config.instance_id,
                "Shutdown deadline passed with conferences still running"
            );
        }

        // Cancel the root token (propagates to anything left over)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Perform graceful shutdown after cancellation.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "conf.actor.controller",
            instance_id = %self.config.instance_id,
            conference_count = self.conferences.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        // Conference tokens are children of ours, so each one ends itself.
        for (conference_id, managed) in self.conferences.drain() {
            match tokio::time::timeout(CONFERENCE_SHUTDOWN_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "conf.actor.controller",
                        conference_id = %conference_id,
                        "Conference actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "conf.actor.controller",
                        conference_id = %conference_id,
                        error = ?e,
                        "Conference actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "conf.actor.controller",
                        conference_id = %conference_id,
                        "Conference actor shutdown timed out"
                    );
                }
            }
            self.metrics.conference_removed();
        }
    }

    /// Check health of conference actors and remove finished ones.
    async fn check_conference_health(&mut self) {
        let finished: Vec<ConferenceId> = self
            .conferences
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for conference_id in finished {
            let Some(managed) = self.conferences.remove(&conference_id) else {
                continue;
            };
            self.metrics.conference_removed();

            match managed.task_handle.await {
                Ok(()) => {
                    debug!(
                        target: "conf.actor.controller",
                        conference_id = %conference_id,
                        "Conference actor exited"
                    );
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!(
                            target: "conf.actor.controller",
                            conference_id = %conference_id,
                            error = ?join_error,
                            "Conference actor panicked"
                        );
                        self.metrics.record_panic(ActorType::Conference);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::messages::JoinRequest;
    use crate::catalog::{ConferenceSettings, InMemoryCatalog};
    use crate::protocol::ServerEvent;
    use crate::registry::{Capabilities, Identity, Roles};
    use crate::sink::LoggingEventSink;
    use common::types::ConnectionId;

    fn controller(
        max_conferences: usize,
        allow_adhoc: bool,
    ) -> (ConferenceControllerHandle, Arc<InMemoryCatalog>) {
        let catalog = Arc::new(InMemoryCatalog::new(allow_adhoc));
        let handle = ConferenceControllerHandle::new(
            ControllerConfig {
                instance_id: "conf-test".to_string(),
                max_conferences,
                limits: ConferenceLimits::default(),
            },
            catalog.clone(),
            Arc::new(LoggingEventSink),
            ActorMetrics::new(),
        );
        (handle, catalog)
    }

    fn join_request(id: &str) -> (JoinRequest, mpsc::Receiver<ServerEvent>) {
        let (outbound, rx) = mpsc::channel(16);
        (
            JoinRequest {
                connection_id: ConnectionId::new(id),
                identity: Identity {
                    user_id: None,
                    display_name: id.to_string(),
                    email: None,
                    is_guest: true,
                },
                roles: Roles::default(),
                capabilities: Capabilities::participant(),
                password: None,
                outbound,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_actor() {
        let (controller, _) = controller(10, true);

        let first = controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        let second = controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();

        let (req, _rx) = join_request("a");
        first.join(req).await.unwrap();
        assert_eq!(second.get_state().await.unwrap().participant_count, 1);

        let status = controller.get_status().await.unwrap();
        assert_eq!(status.conference_count, 1);
        assert!(!status.is_draining);
    }

    #[tokio::test]
    async fn test_status_counts_queued_requests() {
        let (controller, _) = controller(10, true);

        // All requests are queued before the actor task gets to run.
        let statuses =
            futures::future::join_all((0..8).map(|_| controller.get_status())).await;
        let deepest = statuses
            .into_iter()
            .map(|status| status.unwrap().mailbox_depth)
            .max();
        assert_eq!(deepest, Some(8));

        assert_eq!(controller.get_status().await.unwrap().mailbox_depth, 1);
    }

    #[tokio::test]
    async fn test_unknown_conference_rejected_without_adhoc() {
        let (controller, catalog) = controller(10, false);
        let result = controller
            .get_or_create_conference(ConferenceId::new("nope"))
            .await;
        assert!(matches!(result, Err(ConfError::ConferenceNotFound(_))));

        catalog.insert(ConferenceId::new("known"), ConferenceSettings::default());
        assert!(controller
            .get_or_create_conference(ConferenceId::new("known"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_capacity_exceeded() {
        let (controller, _) = controller(1, true);
        controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        let result = controller
            .get_or_create_conference(ConferenceId::new("C2"))
            .await;
        assert!(matches!(result, Err(ConfError::CapacityExceeded)));
    }

    #[tokio::test]
    async fn test_ended_conference_is_recreated() {
        let (controller, _) = controller(10, true);
        let first = controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        let (req, _rx) = join_request("a");
        first.join(req).await.unwrap();

        controller
            .end_conference(ConferenceId::new("C1"), "admin")
            .await
            .unwrap();
        assert!(first.is_cancelled());

        let second = controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        assert!(!second.is_cancelled());
        assert_eq!(second.get_state().await.unwrap().participant_count, 0);
    }

    #[tokio::test]
    async fn test_get_conference_info() {
        let (controller, _) = controller(10, true);
        let conference = controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        let (req, _rx) = join_request("a");
        conference.join(req).await.unwrap();

        let info = controller
            .get_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        assert_eq!(info.participant_count, 1);

        let missing = controller.get_conference(ConferenceId::new("C9")).await;
        assert!(matches!(missing, Err(ConfError::ConferenceNotFound(_))));
    }

    #[tokio::test]
    async fn test_shutdown_ends_conferences_and_drains() {
        let (controller, _) = controller(10, true);
        let conference = controller
            .get_or_create_conference(ConferenceId::new("C1"))
            .await
            .unwrap();
        let (req, mut rx) = join_request("a");
        conference.join(req).await.unwrap();
        let _ = rx.recv().await.unwrap(); // conferenceJoined

        controller.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::ConferenceEnded {
                reason: END_REASON_SHUTDOWN.to_string()
            }
        );
        assert!(controller.is_cancelled());

        let result = controller
            .get_or_create_conference(ConferenceId::new("C2"))
            .await;
        assert!(matches!(result, Err(ConfError::Draining)));
    }
}
