//! Where accepted reports go.
//!
//! The processor hands every accepted report to an [`EventSink`] as one
//! [`EventBatch`]. Repeated records are passed through as-is; expanding a
//! repeat count is up to the consumer.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rps_shared::{Event, RepeatedEvent, SubReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportedEvent {
    Repeated(RepeatedEvent),
    Single(Event),
}

impl ReportedEvent {
    pub fn event(&self) -> &Event {
        match self {
            Self::Single(event) => event,
            Self::Repeated(repeated) => &repeated.event,
        }
    }

    /// How many occurrences the record stands for.
    pub fn count(&self) -> u32 {
        match self {
            Self::Single(_) => 1,
            Self::Repeated(repeated) => u32::from(repeated.repeat),
        }
    }
}

/// Everything decoded from one accepted report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch {
    pub username: String,
    pub events: Vec<ReportedEvent>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub software_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub software_version: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "hex_bytes"
    )]
    pub end_user: Option<Vec<u8>>,
}

impl EventBatch {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Fold one decoded subreport into the batch. Metadata overwrites any
    /// earlier value; events are appended in order.
    pub fn apply(&mut self, subreport: SubReport) {
        match subreport {
            SubReport::EndOfReport => {}
            SubReport::Ipv4Events(events) | SubReport::Ipv6Events(events) => {
                self.events
                    .extend(events.into_iter().map(ReportedEvent::Single));
            }
            SubReport::RepeatedIpv4Events(events) | SubReport::RepeatedIpv6Events(events) => {
                self.events
                    .extend(events.into_iter().map(ReportedEvent::Repeated));
            }
            SubReport::SoftwareName(name) => self.software_name = Some(name),
            SubReport::SoftwareVersion(version) => self.software_version = Some(version),
            SubReport::EndUser(end_user) => self.end_user = Some(end_user),
        }
    }
}

/// Receives accepted reports. Called once per report, possibly from several
/// listener tasks at the same time.
pub trait EventSink: Send + Sync {
    fn handle_events(&self, batch: EventBatch);
}

/// Logs each batch as one JSON line under the `rps_server::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle_events(&self, batch: EventBatch) {
        match serde_json::to_string(&batch) {
            Ok(json) => info!(target: "rps_server::events", "{json}"),
            Err(e) => warn!(user = %batch.username, error = %e, "Could not serialise batch"),
        }
    }
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<EventBatch>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        match self.batches.lock() {
            Ok(batches) => batches.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn handle_events(&self, batch: EventBatch) {
        match self.batches.lock() {
            Ok(mut batches) => batches.push(batch),
            Err(poisoned) => poisoned.into_inner().push(batch),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
