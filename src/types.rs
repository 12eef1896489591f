//! Core types for the change feed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Tenant (instance) that owns a channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub u64);

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a notification channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a change. Strictly increasing within one channel+room.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ChangeId(pub u64);

impl ChangeId {
    pub fn next(self) -> Self {
        ChangeId(self.0 + 1)
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.0)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// RFC 3339 rendering with microsecond precision, as sent on the wire.
    pub fn to_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp_micros(self.0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What happened to the object a change describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    #[default]
    Custom,
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Custom => "custom",
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

/// A channel as resolved by the routing layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Channel {
    pub id: ChannelId,
    pub tenant: TenantId,
}

impl Channel {
    pub fn new(tenant: TenantId, id: ChannelId) -> Self {
        Self { id, tenant }
    }
}

/// An immutable change event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Assigned by the write path.
    pub id: ChangeId,

    pub tenant: TenantId,

    pub channel: ChannelId,

    /// Partition within the channel (None = no room).
    pub room: Option<String>,

    pub action: ChangeAction,

    pub author: Map<String, Value>,

    pub metadata: Map<String, Value>,

    pub payload: Map<String, Value>,

    pub created_at: Timestamp,
}

/// Input for creating a new change (before id assigned).
#[derive(Clone, Debug, Default)]
pub struct ChangeInput {
    pub action: ChangeAction,
    pub author: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub payload: Map<String, Value>,
}

impl ChangeInput {
    pub fn new(action: ChangeAction) -> Self {
        Self {
            action,
            ..Default::default()
        }
    }

    /// Set the payload from a JSON value. Non-object values are wrapped
    /// under a `value` key.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = into_map(payload);
        self
    }

    pub fn with_author(mut self, author: Value) -> Self {
        self.author = into_map(author);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = into_map(metadata);
        self
    }

    /// Materialize into a change with the given identity.
    pub fn into_change(self, id: ChangeId, channel: Channel, room: Option<String>) -> Change {
        Change {
            id,
            tenant: channel.tenant,
            channel: channel.id,
            room,
            action: self.action,
            author: self.author,
            metadata: self.metadata,
            payload: self.payload,
            created_at: Timestamp::now(),
        }
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
