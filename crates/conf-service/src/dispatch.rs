//! Broadcast Dispatcher.
//!
//! Fans events out to a room, a single connection, or the whole conference.
//! Member lists are snapshotted from the room directory before fan-out, and
//! every delivery is a non-blocking enqueue into the target's
//! `ConnectionActor` mailbox, so one stalled client never delays the others
//! or the owning conference.

use crate::actors::connection::{ConnectionActorHandle, DeliveryError};
use crate::errors::ConfError;
use crate::protocol::ServerEvent;
use crate::rooms::{RoomDirectory, RoomId};

use common::types::{ConferenceId, ConnectionId};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Per-conference routing table from connection id to outbound mailbox.
#[derive(Debug)]
pub struct Dispatcher {
    conference_id: ConferenceId,
    routes: HashMap<ConnectionId, ConnectionActorHandle>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(conference_id: ConferenceId) -> Self {
        Self {
            conference_id,
            routes: HashMap::new(),
        }
    }

    /// Route events for `handle.connection_id()` to `handle`.
    pub fn attach(&mut self, handle: ConnectionActorHandle) {
        self.routes.insert(handle.connection_id().clone(), handle);
    }

    /// Stop routing to a connection, returning its handle.
    pub fn detach(&mut self, connection_id: &ConnectionId) -> Option<ConnectionActorHandle> {
        self.routes.remove(connection_id)
    }

    /// Deliver to every member of `room`, optionally excluding one.
    ///
    /// Returns how many connections accepted the event.
    pub fn broadcast_to_room(
        &self,
        directory: &RoomDirectory,
        room: RoomId,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let members = directory.members_of(room);
        trace!(
            target: "conf.dispatch",
            conference_id = %self.conference_id,
            room = %room,
            kind = event.kind_label(),
            recipients = members.len(),
            "Broadcasting to room"
        );
        self.deliver_each(members.iter().filter(|id| Some(*id) != exclude), event)
    }

    /// Deliver to exactly one connection.
    pub fn broadcast_to_connection(
        &self,
        connection_id: &ConnectionId,
        event: ServerEvent,
    ) -> Result<(), ConfError> {
        let handle = self
            .routes
            .get(connection_id)
            .ok_or_else(|| ConfError::TargetNotFound(connection_id.to_string()))?;

        match handle.try_deliver(event) {
            Ok(()) | Err(DeliveryError::Full) => Ok(()),
            Err(DeliveryError::Closed) => {
                debug!(
                    target: "conf.dispatch",
                    conference_id = %self.conference_id,
                    connection_id = %connection_id,
                    "Target mailbox closed"
                );
                Ok(())
            }
        }
    }

    /// Deliver to every member of every room, optionally excluding one.
    pub fn broadcast_to_conference(
        &self,
        directory: &RoomDirectory,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let members = directory.all_members();
        self.deliver_each(members.iter().filter(|id| Some(*id) != exclude), event)
    }

    /// Deliver a clone of `event` to each listed connection.
    pub fn deliver_each<'a, I>(&self, recipients: I, event: &ServerEvent) -> usize
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let mut delivered = 0;
        for connection_id in recipients {
            let Some(handle) = self.routes.get(connection_id) else {
                continue;
            };
            if handle.try_deliver(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
