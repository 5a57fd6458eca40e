//! Core domain types for mixlite
//!
//! A [`Transaction`] is one queued unit of telemetry: either an event or a
//! profile update. It is persisted as a flat JSON object carrying its payload
//! fields plus the internal `_id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// String-keyed property mapping attached to events and profile updates.
pub type Properties = serde_json::Map<String, Value>;

/// Which endpoint a transaction is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Tracked event, delivered to the tracking endpoint
    Event,
    /// `$set` profile update, delivered to the engage endpoint
    ProfileUpdate,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Event => "event",
            TransactionKind::ProfileUpdate => "profile_update",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The analytics data a transaction delivers.
///
/// Serialized untagged: an event is `{"event", "properties"}`, a profile
/// update is `{"$token", "$distinct_id", "$set"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Event {
        event: String,
        properties: Properties,
    },
    ProfileUpdate {
        #[serde(rename = "$token")]
        token: String,
        #[serde(rename = "$distinct_id")]
        distinct_id: String,
        #[serde(rename = "$set")]
        set: Properties,
    },
}

impl Payload {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Payload::Event { .. } => TransactionKind::Event,
            Payload::ProfileUpdate { .. } => TransactionKind::ProfileUpdate,
        }
    }

    /// Event name, for event payloads.
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Payload::Event { event, .. } => Some(event),
            Payload::ProfileUpdate { .. } => None,
        }
    }

    /// Event properties or the `$set` mapping.
    pub fn properties(&self) -> &Properties {
        match self {
            Payload::Event { properties, .. } => properties,
            Payload::ProfileUpdate { set, .. } => set,
        }
    }
}

/// A queued transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Queue-unique id, `<process start millis>-<counter>`
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(flatten)]
    pub payload: Payload,

    /// Set during a drain cycle once the endpoint accepted this transaction.
    #[serde(skip)]
    pub completed: bool,
}

impl Transaction {
    pub fn new(id: String, payload: Payload) -> Self {
        Self {
            id,
            payload,
            completed: false,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.payload.kind()
    }

    pub fn event_name(&self) -> Option<&str> {
        self.payload.event_name()
    }

    pub fn properties(&self) -> &Properties {
        self.payload.properties()
    }

    /// Property lookup on the payload.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().get(name)
    }
}
