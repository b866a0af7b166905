//! Server-side validation pipeline.
//!
//! Each inbound report runs through, in order: framing, version check,
//! credential lookup, HMAC verification, envelope parsing, freshness,
//! replay check and finally subreport decoding. Any stage can drop the
//! report; only a report that passes all of them reaches the sink. A
//! malformed known subreport drops the whole report, while subreports of
//! unknown formats are skipped.
//!
//! [`ReportProcessor::handle`] never blocks and never suspends, so it can
//! be called directly from any number of listener tasks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use rps_shared::clock::wire_delta;
use rps_shared::constants::{FRESHNESS_WINDOW_SECS, PROGRESS_LOG_INTERVAL, PROTOCOL_VERSION};
use rps_shared::{decode_subreports, Clock, DecodeError, FramingError, RawReport, SystemClock};

use crate::credentials::CredentialProvider;
use crate::replay::ReplayGuard;
use crate::sink::{EventBatch, EventSink};

/// Why a report was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Discard {
    #[error("Malformed framing: {0}")]
    Framing(#[from] FramingError),

    #[error("Unsupported protocol version {0}")]
    Version(u8),

    #[error("Unknown user")]
    UnknownUser,

    #[error("HMAC mismatch")]
    BadSignature,

    #[error("Report carries no subreports")]
    Empty,

    #[error("Timestamp {timestamp} is {skew}s away from now")]
    Stale { timestamp: u32, skew: i64 },

    #[error("Replayed report")]
    Replay,

    #[error("Malformed subreport: {0}")]
    Decode(#[from] DecodeError),
}

/// Result of handling one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered to the sink with this many event records.
    Accepted { events: usize },
    Discarded(Discard),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

pub struct ReportProcessor {
    credentials: Arc<dyn CredentialProvider>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    replay: ReplayGuard,
    freshness_window: u32,
    sweep_probability: f64,
    processed: AtomicU64,
}

impl ReportProcessor {
    pub fn new(credentials: Arc<dyn CredentialProvider>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            credentials,
            sink,
            clock: Arc::new(SystemClock),
            replay: ReplayGuard::new(),
            freshness_window: FRESHNESS_WINDOW_SECS,
            sweep_probability: 0.01,
            processed: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_freshness_window(mut self, secs: u32) -> Self {
        self.freshness_window = secs;
        self
    }

    /// Chance that handling a report also sweeps the replay guard.
    /// Clamped to `0.0..=1.0`.
    pub fn with_sweep_probability(mut self, probability: f64) -> Self {
        self.sweep_probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        self
    }

    /// Number of reports accepted so far.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    /// Evict replay entries that have left the freshness window.
    pub fn sweep(&self) -> usize {
        let removed = self
            .replay
            .sweep(self.clock.now_wire(), self.freshness_window);
        if removed > 0 {
            debug!(removed, remaining = self.replay.len(), "Swept replay guard");
        }
        removed
    }

    /// Validate one report received from `peer` and pass it to the sink.
    pub fn handle(&self, data: &[u8], peer: SocketAddr) -> Outcome {
        match self.process(data, peer) {
            Ok(events) => Outcome::Accepted { events },
            Err(reason) => Outcome::Discarded(reason),
        }
    }

    fn process(&self, data: &[u8], peer: SocketAddr) -> Result<usize, Discard> {
        let raw = RawReport::split(data).map_err(|e| {
            warn!(peer = %peer, len = data.len(), error = %e, "Discarding malformed report");
            Discard::from(e)
        })?;
        let user = raw.username;

        if raw.version != PROTOCOL_VERSION {
            warn!(peer = %peer, user, version = raw.version, "Discarding report with wrong version");
            return Err(Discard::Version(raw.version));
        }

        let Some(secret) = self.credentials.get_password(user) else {
            warn!(peer = %peer, user, "Discarding report from unknown user");
            return Err(Discard::UnknownUser);
        };

        if !raw.verify(&secret) {
            warn!(peer = %peer, user, "Discarding report with bad HMAC");
            return Err(Discard::BadSignature);
        }

        let envelope = raw.envelope().map_err(|e| {
            warn!(peer = %peer, user, error = %e, "Discarding truncated report");
            Discard::from(e)
        })?;
        if envelope.body.is_empty() {
            warn!(peer = %peer, user, "Discarding empty report");
            return Err(Discard::Empty);
        }

        let skew = wire_delta(self.clock.now_wire(), envelope.timestamp);
        if skew.abs() > i64::from(self.freshness_window) {
            warn!(peer = %peer, user, skew, "Discarding stale report");
            return Err(Discard::Stale {
                timestamp: envelope.timestamp,
                skew,
            });
        }

        if self
            .replay
            .seen_and_record(envelope.timestamp, envelope.nonce)
        {
            warn!(
                peer = %peer,
                user,
                nonce = %hex::encode(envelope.nonce),
                "Discarding replayed report"
            );
            return Err(Discard::Replay);
        }
        if self.sweep_probability > 0.0 && rand::random::<f64>() < self.sweep_probability {
            self.sweep();
        }

        let decoded = decode_subreports(envelope.body).map_err(|e| {
            warn!(
                peer = %peer,
                user,
                error = %e,
                body = %hex::encode(envelope.body),
                "Discarding report with malformed subreport"
            );
            Discard::from(e)
        })?;
        for (tag, length) in &decoded.skipped {
            debug!(peer = %peer, user, tag, length, "Skipped subreport of unknown format");
        }

        let mut batch = EventBatch::new(user);
        for subreport in decoded.subreports {
            batch.apply(subreport);
        }
        let events = batch.events.len();
        debug!(peer = %peer, user, events, "Accepted report");
        self.sink.handle_events(batch);

        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % PROGRESS_LOG_INTERVAL == 0 {
            info!(processed, "Progress: reports processed");
        }
        Ok(events)
    }
}
