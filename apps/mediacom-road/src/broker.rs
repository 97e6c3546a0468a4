//! Room membership and message routing.
//!
//! The [`Broker`] is plain synchronous state. It is driven by a single task
//! (see [`crate::hub`]) so every mutation below runs to completion before
//! the next command is looked at.
//!
//! ```text
//! Connected(unjoined) --join-room--> Joined(room) --disconnect--> Gone
//!                                     |      ^
//!                                     +------+ join-room (implicit leave first)
//! ```

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::signaling::{
    ClientMessage, ConnectionId, JoinRoom, PresenceProfile, RoomSummary, ServerMessage,
};

/// Outbound queue of one connection
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Relay routing rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Only deliver `signal` when sender and target share a room
    pub same_room_only: bool,
}

struct Connection {
    tx: Outbound,
    room: Option<String>,
}

#[derive(Default)]
struct Room {
    /// Join order is preserved; rooms are small so lookups stay linear.
    roster: Vec<PresenceProfile>,
}

impl Room {
    fn position(&self, id: &ConnectionId) -> Option<usize> {
        self.roster.iter().position(|profile| &profile.id == id)
    }
}

/// Owner of the connection table and the room table
pub struct Broker {
    connections: HashMap<ConnectionId, Connection>,
    rooms: BTreeMap<String, Room>,
    policy: RelayPolicy,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(RelayPolicy::default())
    }
}

impl Broker {
    pub fn new(policy: RelayPolicy) -> Self {
        Self {
            connections: HashMap::new(),
            rooms: BTreeMap::new(),
            policy,
        }
    }

    /// Register a freshly accepted transport session
    pub fn connect(&mut self, tx: Outbound) -> ConnectionId {
        let id = ConnectionId::generate();
        let _ = tx.send(ServerMessage::Connected { id: id.clone() });
        self.connections
            .insert(id.clone(), Connection { tx, room: None });
        info!(connection = %id, "device connected");
        id
    }

    /// Dispatch one inbound message from `id`
    pub fn handle(&mut self, id: &ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::JoinRoom(join) => self.join_room(id, join),
            ClientMessage::Signal { to, signal } => self.relay_signal(id, &to, signal),
            ClientMessage::SpeakingStatus { is_speaking } => self.speaking_status(id, is_speaking),
            ClientMessage::Ping => self.send(id, ServerMessage::Pong),
        }
    }

    pub fn join_room(&mut self, id: &ConnectionId, join: JoinRoom) {
        let previous = match self.connections.get(id) {
            Some(conn) => conn.room.clone(),
            None => {
                debug!(connection = %id, "join-room from unknown connection ignored");
                return;
            }
        };

        if let Some(previous) = previous {
            debug!(connection = %id, room = %previous, "re-join, leaving previous room first");
            self.leave_room(id, &previous);
        }

        let profile = PresenceProfile {
            id: id.clone(),
            name: join.display_name(),
            role: join.resolved_role(),
            is_speaking: false,
        };
        let room_id = join.room_id;

        let room = self.rooms.entry(room_id.clone()).or_default();
        room.roster.push(profile.clone());
        let roster = room.roster.clone();

        if let Some(conn) = self.connections.get_mut(id) {
            conn.room = Some(room_id.clone());
        }

        info!(
            connection = %id,
            room = %room_id,
            name = %profile.name,
            role = ?profile.role,
            members = roster.len(),
            "user joined room"
        );

        self.broadcast_except(&room_id, id, ServerMessage::UserJoined(profile));
        self.send(id, ServerMessage::RoomUsers(roster));
    }

    /// Forward an opaque payload; unknown targets are dropped silently.
    pub fn relay_signal(
        &self,
        from: &ConnectionId,
        to: &ConnectionId,
        signal: serde_json::Value,
    ) {
        let Some(sender) = self.connections.get(from) else {
            return;
        };
        let Some(target) = self.connections.get(to) else {
            debug!(from = %from, to = %to, "signal target not connected, dropping");
            return;
        };

        if self.policy.same_room_only && (sender.room.is_none() || sender.room != target.room) {
            debug!(from = %from, to = %to, "signal crosses rooms, dropping");
            return;
        }

        trace!(from = %from, to = %to, "relaying signal");
        let _ = target.tx.send(ServerMessage::Signal {
            from: from.clone(),
            signal,
        });
    }

    /// Record the speaking flag and tell the rest of the room
    pub fn speaking_status(&mut self, id: &ConnectionId, is_speaking: bool) {
        let Some(room_id) = self.room_of(id).map(str::to_string) else {
            debug!(connection = %id, "speaking-status before join ignored");
            return;
        };

        if let Some(room) = self.rooms.get_mut(&room_id) {
            if let Some(index) = room.position(id) {
                room.roster[index].is_speaking = is_speaking;
            }
        }

        self.broadcast_except(
            &room_id,
            id,
            ServerMessage::UserSpeaking {
                id: id.clone(),
                is_speaking,
            },
        );
    }

    /// Tear down a connection. Returns `false` if it was already gone.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        let Some(conn) = self.connections.remove(id) else {
            return false;
        };

        if let Some(room_id) = conn.room {
            self.leave_room(id, &room_id);
        }
        info!(connection = %id, "device disconnected");
        true
    }

    /// Snapshot of every non-empty room, ordered by id
    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|(id, room)| RoomSummary {
                id: id.clone(),
                name: id.clone(),
                user_count: room.roster.len(),
            })
            .collect()
    }

    /// Current roster of a room in join order
    pub fn roster(&self, room_id: &str) -> Option<Vec<PresenceProfile>> {
        self.rooms.get(room_id).map(|room| room.roster.clone())
    }

    pub fn room_of(&self, id: &ConnectionId) -> Option<&str> {
        self.connections.get(id).and_then(|conn| conn.room.as_deref())
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn leave_room(&mut self, id: &ConnectionId, room_id: &str) {
        let mut now_empty = false;
        if let Some(room) = self.rooms.get_mut(room_id) {
            if let Some(index) = room.position(id) {
                room.roster.remove(index);
            }
            now_empty = room.roster.is_empty();
        }

        if now_empty {
            self.rooms.remove(room_id);
            debug!(room = %room_id, "room empty, removed");
        }

        if let Some(conn) = self.connections.get_mut(id) {
            conn.room = None;
        }

        self.broadcast_except(room_id, id, ServerMessage::UserLeft(id.clone()));
        info!(connection = %id, room = %room_id, "user left room");
    }

    fn send(&self, id: &ConnectionId, message: ServerMessage) {
        if let Some(conn) = self.connections.get(id) {
            let _ = conn.tx.send(message);
        }
    }

    /// Deliver to every member of `room_id` except `sender`
    fn broadcast_except(&self, room_id: &str, sender: &ConnectionId, message: ServerMessage) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        for profile in room.roster.iter().filter(|p| &p.id != sender) {
            self.send(&profile.id, message.clone());
        }
    }
}
