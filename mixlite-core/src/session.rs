//! Session ("super") properties
//!
//! Memory-only mapping merged into every event. The device id is the one
//! value that outlives the process; it is kept under [`DEVICE_ID_KEY`] in
//! the durable store.

use serde_json::{json, Value};
use tracing::warn;

use crate::builder::is_empty_value;
use crate::config::InitOptions;
use crate::store::KeyValueStore;
use crate::types::Properties;

/// Store key holding the stable device id.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Current session state.
#[derive(Debug, Default)]
pub struct SessionStore {
    token: Option<String>,
    options: InitOptions,
    properties: Properties,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the baseline for `token`, with a fresh distinct id.
    pub fn init(
        &mut self,
        token: &str,
        options: InitOptions,
        device_id: &str,
        environment: Properties,
    ) {
        let mut properties = Properties::new();
        properties.insert("token".into(), json!(token));
        properties.insert("distinct_id".into(), json!(new_distinct_id()));
        properties.insert("$device_id".into(), json!(device_id));
        for (key, value) in environment {
            properties.entry(key).or_insert(value);
        }

        self.token = Some(token.to_string());
        self.options = options;
        self.properties = properties;
    }

    pub fn is_initialized(&self) -> bool {
        self.token.is_some()
    }

    /// Merge `data`; a null or empty value deletes the key.
    pub fn register(&mut self, data: &Properties) {
        for (key, value) in data {
            if is_empty_value(value) {
                self.properties.remove(key);
            } else {
                self.properties.insert(key.clone(), value.clone());
            }
        }
    }

    /// Switch to a known identity. Returns the previous distinct id.
    pub fn identify(&mut self, id: &str) -> Option<String> {
        let previous = self.distinct_id();
        self.properties.insert("distinct_id".into(), json!(id));
        self.properties.insert("$user_id".into(), json!(id));
        previous
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    pub fn distinct_id(&self) -> Option<String> {
        self.properties
            .get("distinct_id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Copy of the current properties.
    pub fn snapshot(&self) -> Properties {
        self.properties.clone()
    }
}

/// Read the persisted device id, creating and saving one if absent.
///
/// Never fails: an unreadable store yields a fresh id, and a failed write
/// is logged while the generated id is still used.
pub fn load_or_create_device_id(store: &dyn KeyValueStore) -> String {
    match store.get(DEVICE_ID_KEY) {
        Ok(Some(id)) if !id.is_empty() => return id,
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to read device id"),
    }

    let id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = store.set(DEVICE_ID_KEY, &id) {
        warn!(error = %e, "Failed to persist device id");
    }
    id
}

fn new_distinct_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
