//! `ConnectionActor` - per-connection outbound actor.
//!
//! Each `ConnectionActor`:
//! - Owns the ordered outbound mailbox for exactly one joined connection
//! - Forwards `ServerEvent`s to the transport writer in enqueue order
//! - Never blocks its parent: the `ConferenceActor` enqueues with `try_send`
//!
//! # Lifecycle
//!
//! 1. Spawned by the `ConferenceActor` when a join is accepted
//! 2. Runs until closed, the transport goes away, or the conference ends
//! 3. Cancellation via child token propagates from the `ConferenceActor`

use crate::protocol::ServerEvent;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{ConferenceId, ConnectionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long a single queued event may wait on the transport during a drain.
const DRAIN_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Why an event could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Mailbox at capacity; the event was dropped.
    Full,
    /// The actor has exited.
    Closed,
}

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Queue an event without waiting.
    ///
    /// A full mailbox drops the event and records the drop; other
    /// connections are unaffected.
    pub fn try_deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        let kind = event.kind_label();
        match self.sender.try_send(ConnectionMessage::Deliver { event }) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.mailbox.record_drop(kind);
                Err(DeliveryError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Ask the actor to flush what is queued and exit.
    ///
    /// Falls back to cancellation when the mailbox is full.
    pub fn close(&self, reason: impl Into<String>) {
        let message = ConnectionMessage::Close {
            reason: reason.into(),
        };
        match self.sender.try_send(message) {
            Ok(()) => self.mailbox.record_enqueue(),
            Err(_) => self.cancel_token.cancel(),
        }
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Events dropped because this connection fell behind.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.mailbox.messages_dropped()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    connection_id: ConnectionId,
    conference_id: ConferenceId,
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Transport writer queue.
    outbound: mpsc::Sender<ServerEvent>,
    /// Cancellation token (child of the conference's connection token).
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        conference_id: ConferenceId,
        outbound: mpsc::Sender<ServerEvent>,
        buffer: usize,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection_id.as_str(),
        ));

        let actor = Self {
            connection_id: connection_id.clone(),
            conference_id,
            receiver,
            outbound,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "conf.actor.connection",
        fields(
            connection_id = %self.connection_id,
            conference_id = %self.conference_id
        )
    )]
    async fn run(mut self) {
        debug!(
            target: "conf.actor.connection",
            connection_id = %self.connection_id,
            conference_id = %self.conference_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "conf.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    self.drain().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            let should_exit = self.handle_message(message).await;
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "conf.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "conf.actor.connection",
            connection_id = %self.connection_id,
            conference_id = %self.conference_id,
            messages_processed = self.mailbox.messages_processed(),
            messages_dropped = self.mailbox.messages_dropped(),
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Deliver { event } => !self.forward(event).await,

            ConnectionMessage::Close { reason } => {
                debug!(
                    target: "conf.actor.connection",
                    connection_id = %self.connection_id,
                    reason = %reason,
                    "Closing connection"
                );
                true
            }
        }
    }

    /// Hand an event to the transport writer. Returns false once the
    /// transport has gone away.
    async fn forward(&mut self, event: ServerEvent) -> bool {
        if self.outbound.send(event).await.is_err() {
            debug!(
                target: "conf.actor.connection",
                connection_id = %self.connection_id,
                "Transport writer gone, exiting"
            );
            return false;
        }
        true
    }

    /// Flush events that were queued before cancellation, bounded per event.
    async fn drain(&mut self) {
        let mut flushed = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            self.mailbox.record_dequeue();
            let ConnectionMessage::Deliver { event } = message else {
                continue;
            };
            match tokio::time::timeout(DRAIN_SEND_TIMEOUT, self.outbound.send(event)).await {
                Ok(Ok(())) => flushed += 1,
                Ok(Err(_)) => break,
                Err(_) => {
                    warn!(
                        target: "conf.actor.connection",
                        connection_id = %self.connection_id,
                        "Transport writer stalled during drain"
                    );
                    break;
                }
            }
        }

        if flushed > 0 {
            debug!(
                target: "conf.actor.connection",
                connection_id = %self.connection_id,
                flushed = flushed,
                "Flushed queued events on close"
            );
        }
    }
}
