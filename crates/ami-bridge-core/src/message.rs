//! Manager interface messages
//!
//! A message is a flat map of field names to string values. Outbound messages are
//! actions (they always carry `Action` and `ActionID`); inbound messages are either
//! responses to an action or asynchronous events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known field names and protocol literals
pub mod fields {
    pub const ACTION: &str = "Action";
    pub const ACTION_ID: &str = "ActionID";
    pub const RESPONSE: &str = "Response";
    pub const MESSAGE: &str = "Message";
    pub const EVENT: &str = "Event";
    pub const PRIVILEGE: &str = "Privilege";
    pub const USERNAME: &str = "Username";
    pub const SECRET: &str = "Secret";

    /// Synthetic field holding the body of a `Response: Follows` reply
    pub const COMMAND_RESPONSE: &str = "CommandResponse";

    /// Sentinel line terminating a command body
    pub const END_COMMAND: &str = "--END COMMAND--";

    // Enrichment fields added before an event enters the pipeline
    pub const TIMESTAMP: &str = "timestamp";
    pub const TIMESTAMP_FORMATTED: &str = "timestamp_formatted";
    pub const HOST_DEVICE_ID: &str = "host_device_id";
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// A single manager interface message
///
/// Serializes as a flat JSON object, which is also the body published downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: BTreeMap<String, String>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an action with its mandatory `Action` and `ActionID` fields
    pub fn action(name: &str, action_id: impl Into<String>) -> Self {
        Self::new()
            .with_field(fields::ACTION, name)
            .with_field(fields::ACTION_ID, action_id)
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field, returning the previous value if the key was present
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Name of the event, if this is an inbound event
    pub fn event_name(&self) -> Option<&str> {
        self.get(fields::EVENT)
    }

    /// Whether the message carries `Action` and `ActionID`
    pub fn is_action(&self) -> bool {
        self.contains_key(fields::ACTION) && self.contains_key(fields::ACTION_ID)
    }

    /// Append one body line to the synthetic `CommandResponse` field
    pub fn append_command_line(&mut self, line: &str) {
        match self.fields.get_mut(fields::COMMAND_RESPONSE) {
            Some(body) if !body.is_empty() => {
                body.push('\n');
                body.push_str(line);
            }
            _ => {
                self.fields
                    .insert(fields::COMMAND_RESPONSE.to_string(), line.to_string());
            }
        }
    }

    /// Serialize to the JSON object form used by publishers
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<K, V> FromIterator<(K, V)> for Message
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
