//! Transaction assembly
//!
//! Turns a tracking call into a [`Payload`] ready for the queue: session
//! properties and caller data are merged, metadata is stamped, and empty
//! values are stripped.

use chrono::Utc;
use serde_json::{json, Value};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::types::{Payload, Properties};

/// Build an event payload.
///
/// Caller data wins over session properties on key collisions.
pub fn build_event(
    event: &str,
    data: Option<&Properties>,
    session: &Properties,
    environment: &dyn Environment,
) -> Payload {
    let mut properties = session.clone();
    if let Some(data) = data {
        for (key, value) in data {
            properties.insert(key.clone(), value.clone());
        }
    }

    properties.insert("$insert_id".into(), json!(new_insert_id()));
    properties.insert("time".into(), json!(epoch_seconds()));

    strip_empty(&mut properties);

    if !environment.is_online() {
        properties.insert("offline".into(), Value::Bool(true));
    }

    let flags = environment.flags();
    for (name, set) in [
        ("automated", flags.automated),
        ("bot", flags.bot),
        ("development", flags.development),
    ] {
        if set {
            properties.insert(name.into(), Value::Bool(true));
        }
    }

    Payload::Event {
        event: event.to_string(),
        properties,
    }
}

/// Build a `$set` profile update for `distinct_id`.
pub fn build_profile_update(data: &Properties, token: &str, distinct_id: &str) -> Payload {
    let mut set = data.clone();
    strip_empty(&mut set);

    Payload::ProfileUpdate {
        token: token.to_string(),
        distinct_id: distinct_id.to_string(),
        set,
    }
}

/// Drop keys whose value is null or the empty string.
pub fn strip_empty(properties: &mut Properties) {
    properties.retain(|_, value| !is_empty_value(value));
}

pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Accept untyped caller data only when it is a JSON object.
pub fn properties_from_value(value: Value) -> Result<Properties> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Properties::new()),
        other => Err(Error::InvalidData(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn new_insert_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Seconds since the epoch with millisecond precision.
fn epoch_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
