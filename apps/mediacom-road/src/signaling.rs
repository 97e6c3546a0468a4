use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Display name used when a client joins without one.
pub const UNKNOWN_USER: &str = "Unknown User";

/// Broker-assigned identifier of one live transport session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh identifier for a newly accepted connection
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a participant announces when joining a room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Director,
    #[default]
    Member,
}

impl Role {
    /// Anything that is not literally `director` is treated as a member.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("director") => Role::Director,
            _ => Role::Member,
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = lenient_text(deserializer)?;
        Ok(Role::from_wire(raw.as_deref()))
    }
}

/// Accept any JSON value, keeping only strings
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

/// Room keys are taken literally: `null` is `""`, other scalars are stringified.
fn room_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Public view of a room member as seen by its peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceProfile {
    pub id: ConnectionId,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub is_speaking: bool,
}

/// Payload of a `join-room` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    #[serde(default, deserialize_with = "room_key")]
    pub room_id: String,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl JoinRoom {
    pub fn new(room_id: impl Into<String>, user_name: impl Into<String>, role: Role) -> Self {
        Self {
            room_id: room_id.into(),
            user_name: Some(user_name.into()),
            role: Some(role),
        }
    }

    /// Name to publish for this member, falling back to [`UNKNOWN_USER`]
    pub fn display_name(&self) -> String {
        match self.user_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => UNKNOWN_USER.to_string(),
        }
    }

    pub fn resolved_role(&self) -> Role {
        self.role.unwrap_or_default()
    }
}

/// Messages sent from client to broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Enter a room, creating it if nobody is there yet
    JoinRoom(JoinRoom),
    /// Opaque SDP/ICE payload to forward to another connection
    Signal {
        to: ConnectionId,
        signal: serde_json::Value,
    },
    /// Push-to-talk state change
    #[serde(rename_all = "camelCase")]
    SpeakingStatus { is_speaking: bool },
    /// Keepalive
    Ping,
}

/// Messages sent from broker to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Handshake carrying the identifier the broker assigned to this connection
    Connected { id: ConnectionId },
    /// Full roster, sent to the member that just joined
    RoomUsers(Vec<PresenceProfile>),
    /// A new member arrived in the room
    UserJoined(PresenceProfile),
    /// A member left the room
    UserLeft(ConnectionId),
    /// Relayed payload from another connection
    Signal {
        from: ConnectionId,
        signal: serde_json::Value,
    },
    /// A member started or stopped talking
    #[serde(rename_all = "camelCase")]
    UserSpeaking { id: ConnectionId, is_speaking: bool },
    /// Response to ping
    Pong,
    /// The last frame could not be understood
    Error { message: String },
}

/// One entry of the `/status` room listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub user_count: usize,
}
