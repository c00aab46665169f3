//! `ConferenceActor` - per-conference actor.
//!
//! Each `ConferenceActor`:
//! - Owns the connection registry, room directory, dispatcher, and host
//!   state for exactly one conference id
//! - Processes one mailbox message at a time, which is what linearizes
//!   join, leave, move, and breakout batch operations for that conference
//! - Spawns a `ConnectionActor` per joined connection and queues outbound
//!   events without waiting on any of them
//! - Reports joins, departures, and the final summary to the session sink
//!
//! # Lifecycle
//!
//! 1. Spawned by the controller on the first join for a conference id
//! 2. Runs until ended by a host, emptied past the idle timeout, or
//!    cancelled by the controller during shutdown
//! 3. Ending broadcasts `conferenceEnded`, removes every member, flushes the
//!    session summary, then cancels its own token (and so every child)

use crate::catalog::ConferenceSettings;
use crate::dispatch::Dispatcher;
use crate::errors::ConfError;
use crate::host::{self, Capability, HostControls};
use crate::protocol::{ChatMessage, ParticipantInfo, ServerEvent};
use crate::registry::{Capabilities, Connection, ConnectionRegistry, MediaStatePatch, Roles};
use crate::rooms::{RoomDirectory, RoomId};
use crate::signaling;
use crate::sink::{LeaveReason, SessionEvent, SessionEventSink, SessionSummary};

use super::connection::ConnectionActor;
use super::messages::{
    ConferenceAction, ConferenceMessage, ConferenceState, JoinOutcome, JoinRequest, RoomSnapshot,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::{DateTime, Utc};
use common::secret::passwords_match;
use common::types::{ConferenceId, ConnectionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the conference mailbox.
const CONFERENCE_CHANNEL_BUFFER: usize = 500;

/// How often finished connection actors are looked for while idle.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Per-connection wait during graceful shutdown.
const CONNECTION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Reason sent with `conferenceEnded` when the server stops.
pub const END_REASON_SHUTDOWN: &str = "server_shutdown";
/// Reason sent with `conferenceEnded` when a host ends the conference.
pub const END_REASON_HOST: &str = "ended_by_host";
/// Summary reason when the conference stayed empty past its timeout.
pub const END_REASON_EMPTY: &str = "empty";

const DEFAULT_REMOVE_REASON: &str = "removed_by_host";

/// Coordinator-wide bounds applied to every conference.
#[derive(Debug, Clone)]
pub struct ConferenceLimits {
    /// Conference-wide participant bound unless the catalog overrides it.
    pub max_participants: usize,
    pub breakout_room_capacity: usize,
    pub max_breakout_rooms: u32,
    /// In characters.
    pub max_chat_length: usize,
    /// Per-connection outbound mailbox size.
    pub connection_buffer: usize,
    /// How long an empty conference is kept before it ends itself.
    pub empty_timeout: Duration,
}

impl Default for ConferenceLimits {
    fn default() -> Self {
        Self {
            max_participants: 300,
            breakout_room_capacity: 50,
            max_breakout_rooms: 50,
            max_chat_length: 4000,
            connection_buffer: 256,
            empty_timeout: Duration::from_secs(60),
        }
    }
}

/// Handle to a `ConferenceActor`.
#[derive(Clone, Debug)]
pub struct ConferenceActorHandle {
    sender: mpsc::Sender<ConferenceMessage>,
    cancel_token: CancellationToken,
    conference_id: ConferenceId,
    mailbox: Arc<MailboxMonitor>,
}

impl ConferenceActorHandle {
    /// Get the conference ID.
    #[must_use]
    pub fn conference_id(&self) -> &ConferenceId {
        &self.conference_id
    }

    /// Admit a connection into the main room.
    pub async fn join(&self, request: JoinRequest) -> Result<JoinOutcome, ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ConferenceMessage::Join {
            request,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ConfError::ConferenceEnded)?
    }

    /// Voluntary leave.
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<(), ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ConferenceMessage::Leave {
            connection_id,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ConfError::ConferenceEnded)?
    }

    /// Transport went away. Idempotent and fire-and-forget.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if self
            .send(ConferenceMessage::Disconnect { connection_id })
            .await
            .is_err()
        {
            debug!(
                target: "conf.actor.conference",
                conference_id = %self.conference_id,
                "Disconnect after conference ended"
            );
        }
    }

    /// Run an in-conference operation on behalf of `connection_id`.
    pub async fn action(
        &self,
        connection_id: ConnectionId,
        action: ConferenceAction,
    ) -> Result<(), ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ConferenceMessage::Action {
            connection_id,
            action,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ConfError::ConferenceEnded)?
    }

    /// Get a state snapshot.
    pub async fn get_state(&self) -> Result<ConferenceState, ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ConferenceMessage::GetState { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ConfError::ConferenceEnded)
    }

    /// End the conference for everyone.
    pub async fn end(&self, reason: impl Into<String>) -> Result<(), ConfError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(ConferenceMessage::End {
            reason: reason.into(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ConfError::ConferenceEnded)?
    }

    /// Cancel the conference actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Messages waiting in the mailbox.
    #[must_use]
    pub fn mailbox_depth(&self) -> usize {
        self.mailbox.current_depth()
    }

    async fn send(&self, message: ConferenceMessage) -> Result<(), ConfError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ConfError::ConferenceEnded)?;
        self.mailbox.record_enqueue();
        Ok(())
    }
}

/// The `ConferenceActor` implementation.
pub struct ConferenceActor {
    conference_id: ConferenceId,
    receiver: mpsc::Receiver<ConferenceMessage>,
    /// Cancellation token (child of controller's token).
    cancel_token: CancellationToken,
    /// Parent of every connection actor's token. Cancelled only after the
    /// members were closed, so frames queued by `end` are still written.
    connections_token: CancellationToken,
    settings: Arc<ConferenceSettings>,
    limits: ConferenceLimits,
    registry: ConnectionRegistry,
    directory: RoomDirectory,
    dispatcher: Dispatcher,
    host: HostControls,
    /// Connection actor tasks for members, for supervision.
    tasks: HashMap<ConnectionId, JoinHandle<()>>,
    /// Per-member tokens handed to the joiner, cancelled on departure.
    memberships: HashMap<ConnectionId, CancellationToken>,
    /// Connection actor tasks released while ending, awaited on shutdown.
    closing: Vec<(ConnectionId, JoinHandle<()>)>,
    sink: Arc<dyn SessionEventSink>,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
    started_at: DateTime<Utc>,
    total_joined: u64,
    peak_concurrent: usize,
    chat_messages: u64,
    is_ending: bool,
    /// Set while the conference has no members.
    empty_deadline: Option<Instant>,
}

impl ConferenceActor {
    /// Spawn a new conference actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        conference_id: ConferenceId,
        settings: Arc<ConferenceSettings>,
        limits: ConferenceLimits,
        cancel_token: CancellationToken,
        sink: Arc<dyn SessionEventSink>,
        metrics: Arc<ActorMetrics>,
    ) -> (ConferenceActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONFERENCE_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Conference,
            conference_id.as_str(),
        ));
        let max_participants = settings
            .max_participants
            .unwrap_or(limits.max_participants);

        let actor = Self {
            conference_id: conference_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            connections_token: CancellationToken::new(),
            directory: RoomDirectory::new(max_participants, limits.breakout_room_capacity),
            dispatcher: Dispatcher::new(conference_id.clone()),
            registry: ConnectionRegistry::new(),
            host: HostControls::new(),
            tasks: HashMap::new(),
            memberships: HashMap::new(),
            closing: Vec::new(),
            empty_deadline: Some(Instant::now() + limits.empty_timeout),
            settings,
            limits,
            sink,
            metrics,
            mailbox: Arc::clone(&mailbox),
            started_at: Utc::now(),
            total_joined: 0,
            peak_concurrent: 0,
            chat_messages: 0,
            is_ending: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConferenceActorHandle {
            sender,
            cancel_token,
            conference_id,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "conf.actor.conference", fields(conference_id = %self.conference_id))]
    async fn run(mut self) {
        info!(
            target: "conf.actor.conference",
            conference_id = %self.conference_id,
            "ConferenceActor started"
        );

        let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);

        loop {
            // Check for terminated connection actors
            self.check_connection_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "conf.actor.conference",
                        conference_id = %self.conference_id,
                        "ConferenceActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                () = empty_timer(self.empty_deadline) => {
                    self.empty_deadline = None;
                    if self.directory.is_empty() {
                        info!(
                            target: "conf.actor.conference",
                            conference_id = %self.conference_id,
                            "Conference empty past timeout, ending"
                        );
                        self.end(END_REASON_EMPTY);
                    }
                }

                _ = health_check.tick() => {}

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            self.handle_message(message);
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "conf.actor.conference",
                                conference_id = %self.conference_id,
                                "ConferenceActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "conf.actor.conference",
            conference_id = %self.conference_id,
            total_joined = self.total_joined,
            peak_concurrent = self.peak_concurrent,
            messages_processed = self.mailbox.messages_processed(),
            "ConferenceActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: ConferenceMessage) {
        match message {
            ConferenceMessage::Join {
                request,
                respond_to,
            } => {
                let result = self.handle_join(request);
                let _ = respond_to.send(result);
            }

            ConferenceMessage::Leave {
                connection_id,
                respond_to,
            } => {
                let result = self
                    .depart(&connection_id, LeaveReason::Left, None)
                    .map(|_| ());
                let _ = respond_to.send(result);
            }

            ConferenceMessage::Disconnect { connection_id } => {
                // Second cleanup for the same connection finds it gone.
                if self.directory.room_of(&connection_id).is_some() {
                    let _ = self.depart(&connection_id, LeaveReason::Disconnected, None);
                }
            }

            ConferenceMessage::Action {
                connection_id,
                action,
                respond_to,
            } => {
                let result = if self.is_ending {
                    Err(ConfError::ConferenceEnded)
                } else {
                    self.handle_action(&connection_id, action)
                };
                let _ = respond_to.send(result);
            }

            ConferenceMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }

            ConferenceMessage::End { reason, respond_to } => {
                self.end(&reason);
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    /// Handle a new connection joining the main room.
    #[instrument(
        skip_all,
        fields(conference_id = %self.conference_id, connection_id = %request.connection_id)
    )]
    fn handle_join(&mut self, request: JoinRequest) -> Result<JoinOutcome, ConfError> {
        if self.is_ending {
            return Err(ConfError::ConferenceEnded);
        }

        if let Some(expected) = &self.settings.password {
            let supplied = request
                .password
                .as_ref()
                .is_some_and(|p| passwords_match(p, expected));
            if !supplied {
                return Err(ConfError::InvalidPassword);
            }
        }

        let mut roles = request.roles;
        roles.host |= self
            .settings
            .is_host(request.identity.user_id.as_deref());
        let capabilities = if roles.is_privileged() {
            Capabilities::all()
        } else {
            request.capabilities
        };

        self.host.admit(&roles)?;

        let connection_id = request.connection_id;
        self.registry.register(Connection::new(
            connection_id.clone(),
            request.identity,
            roles,
            capabilities,
        ))?;
        if let Err(e) = self.directory.join_main(&connection_id) {
            let _ = self.registry.unregister(&connection_id);
            return Err(e);
        }

        let (handle, task) = ConnectionActor::spawn(
            connection_id.clone(),
            self.conference_id.clone(),
            request.outbound,
            self.limits.connection_buffer,
            self.connections_token.child_token(),
            Arc::clone(&self.metrics),
        );
        self.dispatcher.attach(handle);
        self.tasks.insert(connection_id.clone(), task);
        let membership = CancellationToken::new();
        self.memberships
            .insert(connection_id.clone(), membership.clone());

        self.empty_deadline = None;
        self.total_joined += 1;
        let participant_count = self.directory.total_members();
        self.peak_concurrent = self.peak_concurrent.max(participant_count);
        self.metrics.connection_created();

        // Joiner gets its snapshot before anyone hears about it.
        let participants = self.participants_in(RoomId::Main);
        let _ = self.dispatcher.broadcast_to_connection(
            &connection_id,
            ServerEvent::ConferenceJoined {
                conference_id: self.conference_id.clone(),
                connection_id: connection_id.clone(),
                room: RoomId::Main,
                participants,
                is_locked: self.host.is_locked(),
                breakout_rooms: self.directory.breakouts(),
            },
        );

        let connection = self.registry.lookup(&connection_id)?;
        let joined = ServerEvent::ParticipantJoined {
            participant: ParticipantInfo::from_connection(connection, RoomId::Main),
        };
        self.dispatcher.broadcast_to_room(
            &self.directory,
            RoomId::Main,
            &joined,
            Some(&connection_id),
        );

        self.sink.record(SessionEvent::ParticipantJoined {
            conference_id: self.conference_id.clone(),
            connection_id: connection_id.clone(),
            user_id: connection.identity.user_id.clone(),
            display_name: connection.identity.display_name.clone(),
            at: Utc::now(),
        });

        info!(
            target: "conf.actor.conference",
            conference_id = %self.conference_id,
            connection_id = %connection_id,
            is_host = roles.host,
            participant_count = participant_count,
            "Participant joined"
        );

        Ok(JoinOutcome {
            connection_id,
            room: RoomId::Main,
            roles,
            participant_count,
            membership,
        })
    }

    /// Remove a connection from the conference and notify the room it left.
    ///
    /// Runs at most once per connection: a second call finds the connection
    /// absent and returns `NotInConference` without side effects.
    fn depart(
        &mut self,
        connection_id: &ConnectionId,
        reason: LeaveReason,
        removal_reason: Option<String>,
    ) -> Result<RoomId, ConfError> {
        let room = self.directory.leave(connection_id)?;
        if let Some(membership) = self.memberships.remove(connection_id) {
            membership.cancel();
        }
        let connection = self.registry.unregister(connection_id).map_err(|_| {
            error!(
                target: "conf.actor.conference",
                conference_id = %self.conference_id,
                connection_id = %connection_id,
                "Room member missing from registry"
            );
            ConfError::Internal(format!("registry missing {connection_id}"))
        })?;

        if let Some(task) = self.tasks.remove(connection_id) {
            if self.is_ending {
                self.closing.push((connection_id.clone(), task));
            }
        }
        if let Some(handle) = self.dispatcher.detach(connection_id) {
            if let Some(reason) = removal_reason {
                let _ = handle.try_deliver(ServerEvent::RemovedFromConference { reason });
            }
            handle.close(reason.as_str());
        }

        let departed_id = connection.id.clone();
        let display_name = connection.identity.display_name;
        let notice = match reason {
            LeaveReason::Left => Some(ServerEvent::ParticipantLeft {
                connection_id: departed_id,
                display_name,
            }),
            LeaveReason::Disconnected => Some(ServerEvent::ParticipantDisconnected {
                connection_id: departed_id,
                display_name,
            }),
            LeaveReason::Removed => Some(ServerEvent::ParticipantRemoved {
                connection_id: departed_id,
                display_name,
            }),
            // Everyone already got conferenceEnded.
            LeaveReason::ConferenceEnded => None,
        };
        if let Some(notice) = notice {
            self.dispatcher
                .broadcast_to_room(&self.directory, room, &notice, None);
        }

        self.sink.record(SessionEvent::ParticipantLeft {
            conference_id: self.conference_id.clone(),
            connection_id: connection_id.clone(),
            reason,
            at: Utc::now(),
        });
        self.metrics.connection_closed();

        debug!(
            target: "conf.actor.conference",
            conference_id = %self.conference_id,
            connection_id = %connection_id,
            room = %room,
            reason = reason.as_str(),
            remaining = self.directory.total_members(),
            "Participant departed"
        );

        if self.directory.is_empty() && !self.is_ending {
            self.empty_deadline = Some(Instant::now() + self.limits.empty_timeout);
        }

        Ok(room)
    }

    /// Dispatch an in-conference operation.
    fn handle_action(
        &mut self,
        connection_id: &ConnectionId,
        action: ConferenceAction,
    ) -> Result<(), ConfError> {
        let caller = self
            .registry
            .lookup(connection_id)
            .map_err(|_| ConfError::NotInConference)?
            .clone();
        let room = self
            .directory
            .room_of(connection_id)
            .ok_or(ConfError::NotInConference)?;

        match action {
            ConferenceAction::ToggleAudio { muted } => {
                self.apply_media(
                    &caller,
                    room,
                    MediaStatePatch {
                        audio_muted: Some(muted),
                        ..MediaStatePatch::default()
                    },
                    ServerEvent::ParticipantAudioToggled {
                        connection_id: caller.id.clone(),
                        muted,
                    },
                )
            }

            ConferenceAction::ToggleVideo { off } => self.apply_media(
                &caller,
                room,
                MediaStatePatch {
                    video_off: Some(off),
                    ..MediaStatePatch::default()
                },
                ServerEvent::ParticipantVideoToggled {
                    connection_id: caller.id.clone(),
                    off,
                },
            ),

            ConferenceAction::RaiseHand => self.apply_media(
                &caller,
                room,
                MediaStatePatch {
                    hand_raised: Some(true),
                    ..MediaStatePatch::default()
                },
                ServerEvent::HandRaised {
                    connection_id: caller.id.clone(),
                },
            ),

            ConferenceAction::LowerHand => self.apply_media(
                &caller,
                room,
                MediaStatePatch {
                    hand_raised: Some(false),
                    ..MediaStatePatch::default()
                },
                ServerEvent::HandLowered {
                    connection_id: caller.id.clone(),
                },
            ),

            ConferenceAction::StartScreenShare => {
                host::require_capability(&caller, Capability::ShareScreen)?;
                self.apply_media(
                    &caller,
                    room,
                    MediaStatePatch {
                        screen_sharing: Some(true),
                        ..MediaStatePatch::default()
                    },
                    ServerEvent::ScreenShareStarted {
                        connection_id: caller.id.clone(),
                    },
                )
            }

            ConferenceAction::StopScreenShare => self.apply_media(
                &caller,
                room,
                MediaStatePatch {
                    screen_sharing: Some(false),
                    ..MediaStatePatch::default()
                },
                ServerEvent::ScreenShareStopped {
                    connection_id: caller.id.clone(),
                },
            ),

            ConferenceAction::SendChat { message, recipient } => {
                self.handle_chat(&caller, room, message, recipient)
            }

            ConferenceAction::UpdateWhiteboard { data } => {
                host::require_capability(&caller, Capability::Whiteboard)?;
                let event = ServerEvent::WhiteboardUpdated {
                    connection_id: caller.id.clone(),
                    data,
                };
                self.dispatcher
                    .broadcast_to_room(&self.directory, room, &event, Some(&caller.id));
                Ok(())
            }

            ConferenceAction::ClearWhiteboard => {
                host::require_capability(&caller, Capability::Whiteboard)?;
                let event = ServerEvent::WhiteboardCleared {
                    connection_id: caller.id.clone(),
                };
                self.dispatcher
                    .broadcast_to_room(&self.directory, room, &event, Some(&caller.id));
                Ok(())
            }

            ConferenceAction::RecordingStarted => {
                host::require_privileged(&caller, "start recording")?;
                host::require_capability(&caller, Capability::Record)?;
                if self.host.start_recording() {
                    let event = ServerEvent::RecordingStarted {
                        connection_id: caller.id.clone(),
                    };
                    self.dispatcher
                        .broadcast_to_conference(&self.directory, &event, None);
                }
                Ok(())
            }

            ConferenceAction::RecordingStopped => {
                host::require_privileged(&caller, "stop recording")?;
                host::require_capability(&caller, Capability::Record)?;
                if self.host.stop_recording() {
                    let event = ServerEvent::RecordingStopped {
                        connection_id: caller.id.clone(),
                    };
                    self.dispatcher
                        .broadcast_to_conference(&self.directory, &event, None);
                }
                Ok(())
            }

            ConferenceAction::MuteAll => {
                host::require_privileged(&caller, "mute everyone")?;
                let targets = host::mute_all_targets(self.registry.iter());
                let event = ServerEvent::MuteAllRequested {
                    requested_by: caller.id.clone(),
                };
                self.dispatcher.deliver_each(&targets, &event);
                Ok(())
            }

            ConferenceAction::RequestUnmute { target } => {
                host::require_privileged(&caller, "ask participants to unmute")?;
                self.registry.lookup(&target)?;
                self.dispatcher.broadcast_to_connection(
                    &target,
                    ServerEvent::UnmuteRequested {
                        requested_by: caller.id.clone(),
                    },
                )
            }

            ConferenceAction::RemoveParticipant { target, reason } => {
                let target_connection = self.registry.lookup(&target)?;
                host::authorize_removal(&caller, target_connection)?;
                let reason = if reason.trim().is_empty() {
                    DEFAULT_REMOVE_REASON.to_string()
                } else {
                    reason
                };
                info!(
                    target: "conf.actor.conference",
                    conference_id = %self.conference_id,
                    connection_id = %target,
                    removed_by = %caller.id,
                    "Removing participant"
                );
                self.depart(&target, LeaveReason::Removed, Some(reason))
                    .map(|_| ())
            }

            ConferenceAction::LockMeeting => {
                host::require_privileged(&caller, "lock the meeting")?;
                if self.host.lock() {
                    let event = ServerEvent::MeetingLocked {
                        locked_by: caller.id.clone(),
                    };
                    self.dispatcher
                        .broadcast_to_conference(&self.directory, &event, None);
                }
                Ok(())
            }

            ConferenceAction::UnlockMeeting => {
                host::require_privileged(&caller, "unlock the meeting")?;
                if self.host.unlock() {
                    let event = ServerEvent::MeetingUnlocked {
                        unlocked_by: caller.id.clone(),
                    };
                    self.dispatcher
                        .broadcast_to_conference(&self.directory, &event, None);
                }
                Ok(())
            }

            ConferenceAction::CreateBreakoutRooms { count, auto_assign } => {
                self.create_breakouts(&caller, count, auto_assign)
            }

            ConferenceAction::AssignToBreakoutRoom {
                target,
                room_number,
            } => {
                host::authorize_move(&caller, &target)?;
                let from = self.directory.move_to_breakout(&target, room_number)?;
                if from != RoomId::Breakout(room_number) {
                    let room_name = self
                        .directory
                        .room_name(RoomId::Breakout(room_number))
                        .unwrap_or_default()
                        .to_string();
                    let _ = self.dispatcher.broadcast_to_connection(
                        &target,
                        ServerEvent::AssignedToBreakoutRoom {
                            room_number,
                            room_name,
                        },
                    );
                }
                Ok(())
            }

            ConferenceAction::ReturnToMainRoom { target } => {
                host::authorize_move(&caller, &target)?;
                let from = self.directory.return_to_main(&target)?;
                if !from.is_main() {
                    let _ = self
                        .dispatcher
                        .broadcast_to_connection(&target, ServerEvent::ReturnedToMainRoom);
                }
                Ok(())
            }

            ConferenceAction::CloseBreakoutRooms => {
                host::require_privileged(&caller, "close breakout rooms")?;
                if self.directory.breakouts().is_empty() {
                    return Err(ConfError::InvalidRequest(
                        "There are no breakout rooms to close".to_string(),
                    ));
                }
                let moved = self.directory.close_breakout_batch();
                self.dispatcher
                    .deliver_each(&moved, &ServerEvent::ReturnedToMainRoom);
                self.dispatcher.broadcast_to_room(
                    &self.directory,
                    RoomId::Main,
                    &ServerEvent::AllBreakoutRoomsClosed,
                    None,
                );
                info!(
                    target: "conf.actor.conference",
                    conference_id = %self.conference_id,
                    moved = moved.len(),
                    "Breakout rooms closed"
                );
                Ok(())
            }

            ConferenceAction::CloseBreakoutRoom { room_number } => {
                host::require_privileged(&caller, "close breakout rooms")?;
                let moved = self.directory.close_breakout(room_number)?;
                self.dispatcher
                    .deliver_each(&moved, &ServerEvent::ReturnedToMainRoom);
                self.dispatcher.broadcast_to_room(
                    &self.directory,
                    RoomId::Main,
                    &ServerEvent::BreakoutRoomClosed { room_number },
                    None,
                );
                Ok(())
            }

            ConferenceAction::UpdateConnectionQuality { quality } => {
                self.registry.update_quality(&caller.id, quality)?;
                let event = ServerEvent::ParticipantQualityUpdated {
                    connection_id: caller.id.clone(),
                    quality,
                };
                self.dispatcher
                    .broadcast_to_room(&self.directory, room, &event, Some(&caller.id));
                Ok(())
            }

            ConferenceAction::Relay {
                kind,
                target,
                payload,
            } => signaling::relay(
                &self.registry,
                &self.dispatcher,
                kind,
                &caller.id,
                &target,
                payload,
            ),

            ConferenceAction::UpdatePermissions {
                target,
                roles,
                capabilities,
            } => self.update_permissions(&caller, &target, roles, capabilities),

            ConferenceAction::EndConference => {
                host::require_privileged(&caller, "end the conference")?;
                self.end(END_REASON_HOST);
                Ok(())
            }

            ConferenceAction::GetParticipants => {
                let participants = self.participants_in(room);
                self.dispatcher.broadcast_to_connection(
                    &caller.id,
                    ServerEvent::ParticipantList { room, participants },
                )
            }
        }
    }

    /// Merge a media-state change and tell the rest of the caller's room.
    fn apply_media(
        &mut self,
        caller: &Connection,
        room: RoomId,
        patch: MediaStatePatch,
        event: ServerEvent,
    ) -> Result<(), ConfError> {
        self.registry.update_media_state(&caller.id, patch)?;
        self.dispatcher
            .broadcast_to_room(&self.directory, room, &event, Some(&caller.id));
        Ok(())
    }

    fn handle_chat(
        &mut self,
        caller: &Connection,
        room: RoomId,
        content: String,
        recipient: Option<ConnectionId>,
    ) -> Result<(), ConfError> {
        if content.trim().is_empty() {
            return Err(ConfError::InvalidRequest(
                "Message cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > self.limits.max_chat_length {
            return Err(ConfError::InvalidRequest(format!(
                "Message exceeds {} characters",
                self.limits.max_chat_length
            )));
        }

        match recipient {
            None => {
                let message = ChatMessage {
                    sender_id: caller.id.clone(),
                    sender_name: caller.identity.display_name.clone(),
                    recipient_id: None,
                    content,
                    sent_at: Utc::now(),
                };
                self.dispatcher.broadcast_to_room(
                    &self.directory,
                    room,
                    &ServerEvent::ChatMessageReceived { message },
                    None,
                );
            }
            Some(recipient_id) => {
                if recipient_id == caller.id {
                    return Err(ConfError::InvalidRequest(
                        "Cannot send a private message to yourself".to_string(),
                    ));
                }
                self.registry.lookup(&recipient_id)?;
                let message = ChatMessage {
                    sender_id: caller.id.clone(),
                    sender_name: caller.identity.display_name.clone(),
                    recipient_id: Some(recipient_id.clone()),
                    content,
                    sent_at: Utc::now(),
                };
                self.dispatcher.broadcast_to_connection(
                    &recipient_id,
                    ServerEvent::PrivateChatMessageReceived {
                        message: message.clone(),
                    },
                )?;
                self.dispatcher.broadcast_to_connection(
                    &caller.id,
                    ServerEvent::PrivateChatMessageSent { message },
                )?;
            }
        }

        self.chat_messages += 1;
        Ok(())
    }

    #[instrument(skip_all, fields(conference_id = %self.conference_id, count = count))]
    fn create_breakouts(
        &mut self,
        caller: &Connection,
        count: u32,
        auto_assign: bool,
    ) -> Result<(), ConfError> {
        host::require_privileged(caller, "create breakout rooms")?;
        if count > self.limits.max_breakout_rooms {
            return Err(ConfError::InvalidRequest(format!(
                "At most {} breakout rooms can be created",
                self.limits.max_breakout_rooms
            )));
        }

        self.directory.create_breakout_batch(count)?;
        self.dispatcher.broadcast_to_room(
            &self.directory,
            RoomId::Main,
            &ServerEvent::BreakoutRoomsCreated {
                rooms: self.directory.breakouts(),
            },
            None,
        );

        if auto_assign {
            let registry = &self.registry;
            let assignments = self.directory.auto_assign(|id| {
                registry
                    .lookup(id)
                    .is_ok_and(|c| !c.roles.is_privileged())
            });
            for (connection_id, room_number) in &assignments {
                let room_name = self
                    .directory
                    .room_name(RoomId::Breakout(*room_number))
                    .unwrap_or_default()
                    .to_string();
                let _ = self.dispatcher.broadcast_to_connection(
                    connection_id,
                    ServerEvent::AssignedToBreakoutRoom {
                        room_number: *room_number,
                        room_name,
                    },
                );
            }
            info!(
                target: "conf.actor.conference",
                conference_id = %self.conference_id,
                count = count,
                assigned = assignments.len(),
                "Breakout rooms created with auto-assignment"
            );
        }

        Ok(())
    }

    fn update_permissions(
        &mut self,
        caller: &Connection,
        target: &ConnectionId,
        roles: Option<Roles>,
        capabilities: Option<Capabilities>,
    ) -> Result<(), ConfError> {
        let target_connection = self.registry.lookup(target)?;
        let new_roles = roles.unwrap_or(target_connection.roles);
        let new_capabilities = capabilities.unwrap_or(target_connection.capabilities);
        host::authorize_permission_change(caller, target_connection, &new_roles)?;

        self.registry
            .update_permissions(target, new_roles, new_capabilities)?;

        let room = self
            .directory
            .room_of(target)
            .ok_or(ConfError::NotInConference)?;
        let event = ServerEvent::PermissionsUpdated {
            connection_id: target.clone(),
            roles: new_roles,
            capabilities: new_capabilities,
        };
        self.dispatcher
            .broadcast_to_room(&self.directory, room, &event, None);
        Ok(())
    }

    /// End the conference: notify everyone, remove every member, flush the
    /// summary, and cancel. Idempotent.
    fn end(&mut self, reason: &str) {
        if self.is_ending {
            return;
        }
        self.is_ending = true;
        self.empty_deadline = None;

        info!(
            target: "conf.actor.conference",
            conference_id = %self.conference_id,
            reason = %reason,
            participants = self.directory.total_members(),
            "Ending conference"
        );

        // Members must see their session as over before the event reaches them.
        for membership in self.memberships.values() {
            membership.cancel();
        }
        let event = ServerEvent::ConferenceEnded {
            reason: reason.to_string(),
        };
        self.dispatcher
            .broadcast_to_conference(&self.directory, &event, None);

        for connection_id in self.directory.all_members() {
            let _ = self.depart(&connection_id, LeaveReason::ConferenceEnded, None);
        }

        self.sink.record(SessionEvent::SessionEnded(SessionSummary {
            conference_id: self.conference_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            total_joined: self.total_joined,
            peak_concurrent: self.peak_concurrent,
            chat_messages: self.chat_messages,
            end_reason: reason.to_string(),
        }));

        self.cancel_token.cancel();
    }

    fn get_state(&self) -> ConferenceState {
        let rooms = self
            .directory
            .rooms()
            .into_iter()
            .map(|info| RoomSnapshot {
                members: self.directory.members_of(info.room),
                info,
            })
            .collect();

        ConferenceState {
            conference_id: self.conference_id.clone(),
            rooms,
            lock_state: self.host.lock_state(),
            is_recording: self.host.is_recording(),
            participant_count: self.directory.total_members(),
            total_joined: self.total_joined,
            peak_concurrent: self.peak_concurrent,
            chat_messages: self.chat_messages,
            started_at: self.started_at,
        }
    }

    fn participants_in(&self, room: RoomId) -> Vec<ParticipantInfo> {
        self.directory
            .members_of(room)
            .iter()
            .filter_map(|id| self.registry.lookup(id).ok())
            .map(|c| ParticipantInfo::from_connection(c, room))
            .collect()
    }

    /// Check health of connection actors. A finished actor whose connection
    /// is still a member is treated as a disconnect.
    async fn check_connection_health(&mut self) {
        let finished: Vec<ConnectionId> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for connection_id in finished {
            let Some(task) = self.tasks.remove(&connection_id) else {
                continue;
            };
            match task.await {
                Ok(()) => {
                    debug!(
                        target: "conf.actor.conference",
                        conference_id = %self.conference_id,
                        connection_id = %connection_id,
                        "Connection actor exited"
                    );
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!(
                            target: "conf.actor.conference",
                            conference_id = %self.conference_id,
                            connection_id = %connection_id,
                            error = ?join_error,
                            "Connection actor panicked"
                        );
                        self.metrics.record_panic(ActorType::Connection);
                    }
                }
            }

            if self.directory.room_of(&connection_id).is_some() {
                let _ = self.depart(&connection_id, LeaveReason::Disconnected, None);
            }
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        // Cancelled from above without an End message.
        if !self.is_ending {
            self.end(END_REASON_SHUTDOWN);
        }

        info!(
            target: "conf.actor.conference",
            conference_id = %self.conference_id,
            connections = self.closing.len(),
            "Performing graceful shutdown"
        );

        for (connection_id, task) in self.closing.drain(..) {
            match tokio::time::timeout(CONNECTION_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "conf.actor.conference",
                        conference_id = %self.conference_id,
                        connection_id = %connection_id,
                        error = ?e,
                        "Connection task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "conf.actor.conference",
                        conference_id = %self.conference_id,
                        connection_id = %connection_id,
                        "Connection shutdown timed out"
                    );
                }
            }
        }

        // Anything still running missed its close.
        self.connections_token.cancel();
    }
}

async fn empty_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::Identity;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<SessionEvent>>);

    impl SessionEventSink for Collect {
        fn record(&self, event: SessionEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        handle: ConferenceActorHandle,
        task: JoinHandle<()>,
        sink: Arc<Collect>,
    }

    fn spawn_with(settings: ConferenceSettings, limits: ConferenceLimits) -> Fixture {
        let sink = Arc::new(Collect::default());
        let (handle, task) = ConferenceActor::spawn(
            ConferenceId::new("C1"),
            Arc::new(settings),
            limits,
            CancellationToken::new(),
            sink.clone(),
            ActorMetrics::new(),
        );
        Fixture { handle, task, sink }
    }

    fn spawn_default() -> Fixture {
        spawn_with(ConferenceSettings::default(), ConferenceLimits::default())
    }

    fn request(
        id: &str,
        roles: Roles,
    ) -> (JoinRequest, mpsc::Receiver<ServerEvent>) {
        let (outbound, rx) = mpsc::channel(64);
        (
            JoinRequest {
                connection_id: ConnectionId::new(id),
                identity: Identity {
                    user_id: None,
                    display_name: id.to_uppercase(),
                    email: None,
                    is_guest: true,
                },
                roles,
                capabilities: Capabilities::participant(),
                password: None,
                outbound,
            },
            rx,
        )
    }

    const HOST: Roles = Roles {
        host: true,
        co_host: false,
    };

    async fn join(
        handle: &ConferenceActorHandle,
        id: &str,
        roles: Roles,
    ) -> mpsc::Receiver<ServerEvent> {
        let (req, mut rx) = request(id, roles);
        handle.join(req).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind_label(), "conference_joined");
        rx
    }

    #[tokio::test]
    async fn test_conference_actor_join_and_notify() {
        let fx = spawn_default();
        let mut a = join(&fx.handle, "a", HOST).await;
        let _b = join(&fx.handle, "b", Roles::default()).await;

        let event = a.recv().await.unwrap();
        let ServerEvent::ParticipantJoined { participant } = event else {
            unreachable!("expected participantJoined, got {event:?}");
        };
        assert_eq!(participant.connection_id, ConnectionId::new("b"));
        assert_eq!(participant.display_name, "B");

        let state = fx.handle.get_state().await.unwrap();
        assert_eq!(state.participant_count, 2);
        assert_eq!(state.total_joined, 2);
        assert_eq!(state.peak_concurrent, 2);
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected() {
        let fx = spawn_default();
        let _a = join(&fx.handle, "a", HOST).await;

        let (req, _rx) = request("a", HOST);
        let result = fx.handle.join(req).await;
        assert!(matches!(result, Err(ConfError::DuplicateConnection(_))));
    }

    #[tokio::test]
    async fn test_password_required() {
        let fx = spawn_with(
            ConferenceSettings {
                password: Some(common::secret::SecretString::from("hunter2")),
                ..ConferenceSettings::default()
            },
            ConferenceLimits::default(),
        );

        let (req, _rx) = request("a", Roles::default());
        assert!(matches!(
            fx.handle.join(req).await,
            Err(ConfError::InvalidPassword)
        ));

        let (mut req, _rx) = request("a", Roles::default());
        req.password = Some(common::secret::SecretString::from("hunter2"));
        assert!(fx.handle.join(req).await.is_ok());
    }

    #[tokio::test]
    async fn test_catalog_host_gets_host_role() {
        let fx = spawn_with(
            ConferenceSettings {
                host_user_ids: vec!["alice".to_string()],
                ..ConferenceSettings::default()
            },
            ConferenceLimits::default(),
        );

        let (mut req, _rx) = request("a", Roles::default());
        req.identity.user_id = Some("alice".to_string());
        let outcome = fx.handle.join(req).await.unwrap();
        assert!(outcome.roles.host);
    }

    #[tokio::test]
    async fn test_locked_meeting_rejects_participants() {
        let fx = spawn_default();
        let _a = join(&fx.handle, "a", HOST).await;
        fx.handle
            .action(ConnectionId::new("a"), ConferenceAction::LockMeeting)
            .await
            .unwrap();

        let (req, _rx) = request("b", Roles::default());
        assert!(matches!(
            fx.handle.join(req).await,
            Err(ConfError::MeetingLocked)
        ));

        let (req, _rx) = request("c", HOST);
        assert!(fx.handle.join(req).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_twice_one_departure() {
        let fx = spawn_default();
        let mut a = join(&fx.handle, "a", HOST).await;
        let _b = join(&fx.handle, "b", Roles::default()).await;
        let _ = a.recv().await.unwrap(); // participantJoined(b)

        fx.handle.disconnect(ConnectionId::new("b")).await;
        fx.handle.disconnect(ConnectionId::new("b")).await;
        // Round-trip to make sure both were processed.
        let state = fx.handle.get_state().await.unwrap();
        assert_eq!(state.participant_count, 1);

        let event = a.recv().await.unwrap();
        assert_eq!(event.kind_label(), "participant_disconnected");
        assert!(a.try_recv().is_err());

        let departures = fx
            .sink
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SessionEvent::ParticipantLeft { .. }))
            .count();
        assert_eq!(departures, 1);
    }

    #[tokio::test]
    async fn test_leave_after_leave_is_not_in_conference() {
        let fx = spawn_default();
        let _a = join(&fx.handle, "a", HOST).await;

        fx.handle.leave(ConnectionId::new("a")).await.unwrap();
        assert!(matches!(
            fx.handle.leave(ConnectionId::new("a")).await,
            Err(ConfError::NotInConference)
        ));
    }

    #[tokio::test]
    async fn test_host_only_actions_denied() {
        let fx = spawn_default();
        let _a = join(&fx.handle, "a", HOST).await;
        let _b = join(&fx.handle, "b", Roles::default()).await;

        for action in [
            ConferenceAction::MuteAll,
            ConferenceAction::LockMeeting,
            ConferenceAction::RecordingStarted,
            ConferenceAction::EndConference,
            ConferenceAction::CloseBreakoutRooms,
        ] {
            let result = fx.handle.action(ConnectionId::new("b"), action).await;
            assert!(matches!(result, Err(ConfError::PermissionDenied(_))));
        }
    }

    #[tokio::test]
    async fn test_actions_from_non_member() {
        let fx = spawn_default();
        let result = fx
            .handle
            .action(ConnectionId::new("ghost"), ConferenceAction::RaiseHand)
            .await;
        assert!(matches!(result, Err(ConfError::NotInConference)));
    }

    #[tokio::test]
    async fn test_end_conference_notifies_and_flushes_summary() {
        let fx = spawn_default();
        let mut a = join(&fx.handle, "a", HOST).await;
        let mut b = join(&fx.handle, "b", Roles::default()).await;
        let _ = a.recv().await.unwrap(); // participantJoined(b)

        fx.handle
            .action(ConnectionId::new("a"), ConferenceAction::EndConference)
            .await
            .unwrap();

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            assert_eq!(
                event,
                ServerEvent::ConferenceEnded {
                    reason: END_REASON_HOST.to_string()
                }
            );
        }

        tokio::time::timeout(Duration::from_secs(1), fx.task)
            .await
            .unwrap()
            .unwrap();
        assert!(fx.handle.is_cancelled());

        let events = fx.sink.0.lock().unwrap();
        let Some(SessionEvent::SessionEnded(summary)) = events.last() else {
            unreachable!("summary must be the last session event");
        };
        assert_eq!(summary.total_joined, 2);
        assert_eq!(summary.peak_concurrent, 2);
        assert_eq!(summary.end_reason, END_REASON_HOST);
    }

    #[tokio::test]
    async fn test_cancellation_ends_with_shutdown_reason() {
        let fx = spawn_default();
        let mut a = join(&fx.handle, "a", HOST).await;

        fx.handle.cancel();

        assert_eq!(
            a.recv().await.unwrap(),
            ServerEvent::ConferenceEnded {
                reason: END_REASON_SHUTDOWN.to_string()
            }
        );
        tokio::time::timeout(Duration::from_secs(1), fx.task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_conference_times_out() {
        let fx = spawn_with(
            ConferenceSettings::default(),
            ConferenceLimits {
                empty_timeout: Duration::from_secs(60),
                ..ConferenceLimits::default()
            },
        );
        let _a = join(&fx.handle, "a", HOST).await;
        fx.handle.leave(ConnectionId::new("a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!fx.handle.is_cancelled());

        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::time::timeout(Duration::from_secs(1), fx.task)
            .await
            .unwrap()
            .unwrap();

        let events = fx.sink.0.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionEnded(summary)) if summary.end_reason == END_REASON_EMPTY
        ));
    }

    #[tokio::test]
    async fn test_private_chat_reaches_only_recipient_and_sender() {
        let fx = spawn_default();
        let mut a = join(&fx.handle, "a", HOST).await;
        let mut b = join(&fx.handle, "b", Roles::default()).await;
        let mut c = join(&fx.handle, "c", Roles::default()).await;
        let _ = a.recv().await.unwrap(); // joined(b)
        let _ = a.recv().await.unwrap(); // joined(c)
        let _ = b.recv().await.unwrap(); // joined(c)

        fx.handle
            .action(
                ConnectionId::new("a"),
                ConferenceAction::SendChat {
                    message: "psst".to_string(),
                    recipient: Some(ConnectionId::new("b")),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            b.recv().await.unwrap().kind_label(),
            "private_chat_message_received"
        );
        assert_eq!(
            a.recv().await.unwrap().kind_label(),
            "private_chat_message_sent"
        );
        let _ = fx.handle.get_state().await.unwrap();
        assert!(c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_length_bounds() {
        let fx = spawn_with(
            ConferenceSettings::default(),
            ConferenceLimits {
                max_chat_length: 5,
                ..ConferenceLimits::default()
            },
        );
        let _a = join(&fx.handle, "a", HOST).await;

        for message in ["", "   ", "too long"] {
            let result = fx
                .handle
                .action(
                    ConnectionId::new("a"),
                    ConferenceAction::SendChat {
                        message: message.to_string(),
                        recipient: None,
                    },
                )
                .await;
            assert!(matches!(result, Err(ConfError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_remove_participant() {
        let fx = spawn_default();
        let mut a = join(&fx.handle, "a", HOST).await;
        let mut b = join(&fx.handle, "b", Roles::default()).await;
        let _ = a.recv().await.unwrap(); // joined(b)

        fx.handle
            .action(
                ConnectionId::new("a"),
                ConferenceAction::RemoveParticipant {
                    target: ConnectionId::new("b"),
                    reason: String::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            b.recv().await.unwrap(),
            ServerEvent::RemovedFromConference {
                reason: DEFAULT_REMOVE_REASON.to_string()
            }
        );
        assert_eq!(a.recv().await.unwrap().kind_label(), "participant_removed");

        // Host cannot remove itself
        let result = fx
            .handle
            .action(
                ConnectionId::new("a"),
                ConferenceAction::RemoveParticipant {
                    target: ConnectionId::new("a"),
                    reason: String::new(),
                },
            )
            .await;
        assert!(matches!(result, Err(ConfError::InvalidRequest(_))));
    }
}
