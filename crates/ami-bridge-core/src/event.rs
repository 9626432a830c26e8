//! Event enrichment applied before events enter the pipeline

use chrono::{DateTime, SecondsFormat, Utc};

use crate::message::{fields, Message};

/// Tag an inbound message with the current time and the bridge's device id
pub fn enrich(message: Message, host_device_id: &str) -> Message {
    enrich_at(message, host_device_id, Utc::now())
}

/// Same as [`enrich`] with an explicit timestamp
pub fn enrich_at(mut message: Message, host_device_id: &str, at: DateTime<Utc>) -> Message {
    // Out of range only past the year 2262
    let nanos = at.timestamp_nanos_opt().unwrap_or(i64::MAX);
    message.insert(fields::TIMESTAMP, nanos.to_string());
    message.insert(
        fields::TIMESTAMP_FORMATTED,
        at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    );
    message.insert(fields::HOST_DEVICE_ID, host_device_id);
    message
}
