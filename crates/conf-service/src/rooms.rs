//! Room Directory and Presence Manager for a single conference.
//!
//! Tracks the main room, the current breakout batch, and which room each
//! connection is in. The central invariant is that a connection id appears in
//! at most one room's member set at any instant; every mutation below keeps
//! the per-room member sets and the membership index in lockstep.
//!
//! The directory is a plain data structure. Serialization of concurrent
//! mutations comes from its owner: exactly one `ConferenceActor` holds it and
//! processes one message at a time.

use crate::errors::ConfError;

use common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A room within one conference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomId {
    /// The main conference room.
    Main,
    /// A numbered breakout room (numbers start at 1).
    Breakout(u32),
}

impl RoomId {
    #[must_use]
    pub fn is_main(&self) -> bool {
        matches!(self, RoomId::Main)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Main => f.write_str("main"),
            RoomId::Breakout(n) => write!(f, "breakout-{n}"),
        }
    }
}

/// Snapshot of one room, safe to hand out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room: RoomId,
    pub name: String,
    pub is_open: bool,
    pub capacity: usize,
    pub member_count: usize,
}

#[derive(Debug)]
struct Room {
    name: String,
    is_open: bool,
    capacity: usize,
    members: BTreeSet<ConnectionId>,
}

impl Room {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            is_open: true,
            capacity,
            members: BTreeSet::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    fn info(&self, room: RoomId) -> RoomInfo {
        RoomInfo {
            room,
            name: self.name.clone(),
            is_open: self.is_open,
            capacity: self.capacity,
            member_count: self.members.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Membership {
    room: RoomId,
    /// Arrival order in the conference, used for fair auto-assignment.
    seq: u64,
}

/// Room membership for one conference.
#[derive(Debug)]
pub struct RoomDirectory {
    main: Room,
    breakouts: BTreeMap<u32, Room>,
    membership: HashMap<ConnectionId, Membership>,
    max_participants: usize,
    breakout_capacity: usize,
    next_seq: u64,
}

impl RoomDirectory {
    /// Create the directory with an empty main room.
    ///
    /// `max_participants` bounds the whole conference (every room counted);
    /// `breakout_capacity` bounds each breakout room.
    #[must_use]
    pub fn new(max_participants: usize, breakout_capacity: usize) -> Self {
        Self {
            main: Room::new("Main Room".to_string(), max_participants),
            breakouts: BTreeMap::new(),
            membership: HashMap::new(),
            max_participants,
            breakout_capacity,
            next_seq: 0,
        }
    }

    /// Add a connection to the main room.
    pub fn join_main(&mut self, connection_id: &ConnectionId) -> Result<(), ConfError> {
        if self.membership.contains_key(connection_id) {
            return Err(ConfError::AlreadyInARoom);
        }
        if self.membership.len() >= self.max_participants {
            return Err(ConfError::RoomFull(RoomId::Main.to_string()));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.main.members.insert(connection_id.clone());
        self.membership.insert(
            connection_id.clone(),
            Membership {
                room: RoomId::Main,
                seq,
            },
        );
        Ok(())
    }

    /// Move a connection from wherever it is into a provisioned breakout room.
    ///
    /// Returns the room it came from. Moving into the room it is already in
    /// succeeds without changes. Breakout rooms are never created implicitly.
    pub fn move_to_breakout(
        &mut self,
        connection_id: &ConnectionId,
        number: u32,
    ) -> Result<RoomId, ConfError> {
        let current = self
            .membership
            .get(connection_id)
            .map(|m| m.room)
            .ok_or(ConfError::NotInConference)?;

        let target = RoomId::Breakout(number);
        let room = self
            .breakouts
            .get(&number)
            .filter(|r| r.is_open)
            .ok_or_else(|| ConfError::RoomClosed(target.to_string()))?;

        if current == target {
            return Ok(current);
        }
        if room.is_full() {
            return Err(ConfError::RoomFull(target.to_string()));
        }

        self.relocate(connection_id, current, target);
        Ok(current)
    }

    /// Move a connection back to the main room. Returns the room it came from.
    pub fn return_to_main(&mut self, connection_id: &ConnectionId) -> Result<RoomId, ConfError> {
        let current = self
            .membership
            .get(connection_id)
            .map(|m| m.room)
            .ok_or(ConfError::NotInConference)?;

        if current != RoomId::Main {
            self.relocate(connection_id, current, RoomId::Main);
        }
        Ok(current)
    }

    /// Remove a connection from whichever room holds it.
    ///
    /// Returns the room it left so the caller can notify that audience only.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> Result<RoomId, ConfError> {
        let membership = self
            .membership
            .remove(connection_id)
            .ok_or(ConfError::NotInConference)?;

        if let Some(room) = self.room_mut(membership.room) {
            room.members.remove(connection_id);
        }
        Ok(membership.room)
    }

    /// Snapshot of a room's members. Unknown rooms have no members.
    #[must_use]
    pub fn members_of(&self, room: RoomId) -> Vec<ConnectionId> {
        self.room(room)
            .map(|r| r.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every member in every room.
    #[must_use]
    pub fn all_members(&self) -> Vec<ConnectionId> {
        let mut members: Vec<(u64, ConnectionId)> = self
            .membership
            .iter()
            .map(|(id, m)| (m.seq, id.clone()))
            .collect();
        members.sort();
        members.into_iter().map(|(_, id)| id).collect()
    }

    /// Which room currently holds the connection.
    #[must_use]
    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        self.membership.get(connection_id).map(|m| m.room)
    }

    /// Provision a batch of `count` breakout rooms numbered `1..=count`.
    ///
    /// Rejected while any breakout room of the previous batch is still open;
    /// the caller must close the batch first.
    pub fn create_breakout_batch(&mut self, count: u32) -> Result<Vec<RoomId>, ConfError> {
        if count == 0 {
            return Err(ConfError::InvalidRequest(
                "Breakout room count must be at least 1".to_string(),
            ));
        }
        if self.has_open_breakouts() {
            return Err(ConfError::BreakoutsAlreadyOpen);
        }

        // Closed rooms are always empty; members are returned on close.
        self.breakouts.clear();
        for number in 1..=count {
            self.breakouts.insert(
                number,
                Room::new(format!("Breakout Room {number}"), self.breakout_capacity),
            );
        }

        Ok((1..=count).map(RoomId::Breakout).collect())
    }

    /// Distribute main-room members across the open breakout rooms in arrival
    /// order, round-robin, skipping full rooms. Members for which `eligible`
    /// returns false stay in the main room.
    ///
    /// Returns `(connection, room number)` for every connection moved.
    pub fn auto_assign<F>(&mut self, eligible: F) -> Vec<(ConnectionId, u32)>
    where
        F: Fn(&ConnectionId) -> bool,
    {
        let open_rooms: Vec<u32> = self
            .breakouts
            .iter()
            .filter(|(_, r)| r.is_open)
            .map(|(n, _)| *n)
            .collect();
        if open_rooms.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<(u64, ConnectionId)> = self
            .membership
            .iter()
            .filter(|(id, m)| m.room == RoomId::Main && eligible(id))
            .map(|(id, m)| (m.seq, id.clone()))
            .collect();
        candidates.sort();

        let mut assignments = Vec::with_capacity(candidates.len());
        let mut cursor = 0usize;
        for (_, connection_id) in candidates {
            // Try each room at most once, starting after the last assignment.
            let mut placed = None;
            for offset in 0..open_rooms.len() {
                let Some(&number) = open_rooms.get((cursor + offset) % open_rooms.len()) else {
                    continue;
                };
                if self.breakouts.get(&number).is_some_and(|r| !r.is_full()) {
                    placed = Some(number);
                    cursor = cursor + offset + 1;
                    break;
                }
            }

            let Some(number) = placed else {
                // Every room is full; the rest stay in main.
                break;
            };
            self.relocate(&connection_id, RoomId::Main, RoomId::Breakout(number));
            assignments.push((connection_id, number));
        }

        assignments
    }

    /// Close every breakout room, returning all of their members to main.
    ///
    /// Returns the ids that moved, ordered by room number then arrival.
    pub fn close_breakout_batch(&mut self) -> Vec<ConnectionId> {
        let numbers: Vec<u32> = self.breakouts.keys().copied().collect();
        let mut moved = Vec::new();
        for number in numbers {
            moved.extend(self.evacuate(number));
        }
        self.breakouts.clear();
        moved
    }

    /// Close a single breakout room, returning its members to main.
    pub fn close_breakout(&mut self, number: u32) -> Result<Vec<ConnectionId>, ConfError> {
        let is_open = self.breakouts.get(&number).is_some_and(|r| r.is_open);
        if !is_open {
            return Err(ConfError::RoomClosed(RoomId::Breakout(number).to_string()));
        }

        let moved = self.evacuate(number);
        if let Some(room) = self.breakouts.get_mut(&number) {
            room.is_open = false;
        }
        Ok(moved)
    }

    /// Whether any breakout room is open.
    #[must_use]
    pub fn has_open_breakouts(&self) -> bool {
        self.breakouts.values().any(|r| r.is_open)
    }

    /// Snapshot of the breakout rooms in the current batch.
    #[must_use]
    pub fn breakouts(&self) -> Vec<RoomInfo> {
        self.breakouts
            .iter()
            .map(|(n, r)| r.info(RoomId::Breakout(*n)))
            .collect()
    }

    /// Snapshot of every room, main first.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = vec![self.main.info(RoomId::Main)];
        rooms.extend(self.breakouts());
        rooms
    }

    /// Display name of a room, if it exists.
    #[must_use]
    pub fn room_name(&self, room: RoomId) -> Option<&str> {
        self.room(room).map(|r| r.name.as_str())
    }

    /// Number of connections across all rooms.
    #[must_use]
    pub fn total_members(&self) -> usize {
        self.membership.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    /// Check that the membership index and the room member sets agree and
    /// that no connection appears in two rooms.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = BTreeSet::new();
        let rooms = std::iter::once((RoomId::Main, &self.main)).chain(
            self.breakouts
                .iter()
                .map(|(n, r)| (RoomId::Breakout(*n), r)),
        );

        for (room_id, room) in rooms {
            for member in &room.members {
                if !seen.insert(member.clone()) {
                    return false;
                }
                if self.membership.get(member).map(|m| m.room) != Some(room_id) {
                    return false;
                }
            }
        }

        seen.len() == self.membership.len()
    }

    fn evacuate(&mut self, number: u32) -> Vec<ConnectionId> {
        let Some(room) = self.breakouts.get_mut(&number) else {
            return Vec::new();
        };
        let members = std::mem::take(&mut room.members);

        let mut ordered: Vec<(u64, ConnectionId)> = members
            .into_iter()
            .map(|id| {
                let seq = self.membership.get(&id).map_or(u64::MAX, |m| m.seq);
                (seq, id)
            })
            .collect();
        ordered.sort();

        let mut moved = Vec::with_capacity(ordered.len());
        for (_, id) in ordered {
            if let Some(m) = self.membership.get_mut(&id) {
                m.room = RoomId::Main;
            }
            self.main.members.insert(id.clone());
            moved.push(id);
        }
        moved
    }

    fn relocate(&mut self, connection_id: &ConnectionId, from: RoomId, to: RoomId) {
        if let Some(room) = self.room_mut(from) {
            room.members.remove(connection_id);
        }
        if let Some(room) = self.room_mut(to) {
            room.members.insert(connection_id.clone());
        }
        if let Some(m) = self.membership.get_mut(connection_id) {
            m.room = to;
        }
    }

    fn room(&self, room: RoomId) -> Option<&Room> {
        match room {
            RoomId::Main => Some(&self.main),
            RoomId::Breakout(n) => self.breakouts.get(&n),
        }
    }

    fn room_mut(&mut self, room: RoomId) -> Option<&mut Room> {
        match room {
            RoomId::Main => Some(&mut self.main),
            RoomId::Breakout(n) => self.breakouts.get_mut(&n),
        }
    }
}
