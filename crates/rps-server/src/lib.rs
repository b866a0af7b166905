//! # rps-server
//!
//! Aggregator side of the IP reputation reporting protocol: authenticates
//! inbound reports, rejects stale and replayed ones, decodes the rest and
//! passes the resulting event batches to an [`EventSink`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod listener;
pub mod processor;
pub mod replay;
pub mod sink;

pub use config::ServerConfig;
pub use credentials::{CredentialProvider, StaticCredentials};
pub use error::ServerError;
pub use listener::Listener;
pub use processor::{Discard, Outcome, ReportProcessor};
pub use replay::ReplayGuard;
pub use sink::{EventBatch, EventSink, MemorySink, ReportedEvent, TracingSink};
