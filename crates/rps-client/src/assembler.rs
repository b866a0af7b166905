//! Client-side batching of observations into signed reports.
//!
//! Events are buffered by [`ReportAssembler::record`] and sent by
//! [`ReportAssembler::flush`], split into as many reports as the carrier's
//! size cap requires. A small final report is held back until it reaches
//! the minimum size unless the flush is forced, and records leave the buffer
//! only once the transport confirms the report carrying them went out. Any
//! events still pending when the assembler is dropped are force-flushed.
//!
//! The assembler is not `Sync`; callers sharing one across threads must
//! serialise access themselves.

use std::net::IpAddr;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};

use rps_shared::constants::{
    IPV4_EVENT_WIDTH, IPV6_EVENT_WIDTH, MIN_REPORT_SIZE, PREAMBLE_SIZE, REPEATED_IPV4_EVENT_WIDTH,
    REPEATED_IPV6_EVENT_WIDTH, TAG_SIZE,
};
use rps_shared::crypto::generate_nonce;
use rps_shared::{
    encode_report, Clock, EligibilityOracle, Event, EventKind, GlobalUnicast, PolicyError,
    RepeatedEvent, ReportHeader, SubReport, SystemClock,
};

use crate::error::AssemblyError;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Single(Event),
    Repeated(RepeatedEvent),
}

/// What a call to [`ReportAssembler::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// The report was smaller than the minimum size and nothing was sent.
    Withheld { size: usize },
    /// `reports` reports totalling `size` bytes went out. A final report
    /// under the minimum size may have been withheld.
    Sent { reports: usize, size: usize },
    /// The transport failed or sent a short count on a report of `size`
    /// bytes; its events and any after them are kept.
    Deferred { size: usize },
}

pub struct ReportAssembler<T: Transport> {
    username: String,
    secret: Vec<u8>,
    software_name: Option<String>,
    software_version: Option<String>,
    end_user: Option<Vec<u8>>,
    min_report_size: usize,
    transport: T,
    oracle: Box<dyn EligibilityOracle>,
    rng: Box<dyn RngCore + Send>,
    clock: Box<dyn Clock>,
    pending: Vec<Pending>,
}

impl<T: Transport> ReportAssembler<T> {
    pub fn new(
        username: impl Into<String>,
        secret: impl Into<Vec<u8>>,
        transport: T,
    ) -> Result<Self, PolicyError> {
        let username = username.into();
        if username.len() > rps_shared::constants::MAX_USERNAME_LEN {
            return Err(PolicyError::UsernameTooLong(username.len()));
        }
        Ok(Self {
            username,
            secret: secret.into(),
            software_name: None,
            software_version: None,
            end_user: None,
            min_report_size: MIN_REPORT_SIZE,
            transport,
            oracle: Box::new(GlobalUnicast),
            rng: Box::new(OsRng),
            clock: Box::new(SystemClock),
            pending: Vec::new(),
        })
    }

    pub fn with_software_name(mut self, name: impl Into<String>) -> Self {
        self.software_name = Some(name.into());
        self
    }

    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = Some(version.into());
        self
    }

    pub fn with_end_user(mut self, end_user: impl Into<Vec<u8>>) -> Self {
        self.end_user = Some(end_user.into());
        self
    }

    pub fn with_min_report_size(mut self, size: usize) -> Self {
        self.min_report_size = size;
        self
    }

    pub fn with_oracle(mut self, oracle: impl EligibilityOracle + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    /// Replace the nonce source, e.g. with a fixed generator in tests.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Number of buffered records.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffer one observation.
    pub fn record(&mut self, address: IpAddr, kind: EventKind) -> Result<(), AssemblyError> {
        let event = self.event(address, kind)?;
        self.pending.push(Pending::Single(event));
        Ok(())
    }

    /// Buffer `repeat` occurrences of one observation. A repeat of one is
    /// stored as a plain event.
    pub fn record_repeated(
        &mut self,
        address: IpAddr,
        kind: EventKind,
        repeat: u8,
    ) -> Result<(), AssemblyError> {
        if repeat == 0 {
            return Err(PolicyError::InvalidRepeat(repeat).into());
        }
        let event = self.event(address, kind)?;
        let pending = if repeat == 1 {
            Pending::Single(event)
        } else {
            Pending::Repeated(RepeatedEvent::new(event, repeat)?)
        };
        self.pending.push(pending);
        Ok(())
    }

    fn event(&self, address: IpAddr, kind: EventKind) -> Result<Event, AssemblyError> {
        if kind == EventKind::Reserved {
            return Err(PolicyError::ReservedEvent.into());
        }
        Ok(Event::checked(address, kind, self.oracle.as_ref())?)
    }

    /// The subreport list for the whole buffer in one report, ignoring the
    /// carrier's size cap.
    pub fn subreports(&self) -> Result<Vec<SubReport>, PolicyError> {
        let mut subreports = grouped(&self.pending);
        subreports.extend(self.metadata()?);
        Ok(subreports)
    }

    /// Metadata subreports followed by EndOfReport. Every report carries them.
    fn metadata(&self) -> Result<Vec<SubReport>, PolicyError> {
        let mut metadata = Vec::new();
        if let Some(name) = &self.software_name {
            metadata.push(SubReport::software_name(name.as_str())?);
        }
        if let Some(version) = &self.software_version {
            metadata.push(SubReport::software_version(version.as_str())?);
        }
        if let Some(end_user) = &self.end_user {
            metadata.push(SubReport::end_user(end_user.as_slice())?);
        }
        metadata.push(SubReport::EndOfReport);
        Ok(metadata)
    }

    /// Send the buffer as one or more reports, each no larger than the
    /// transport allows.
    ///
    /// Every report drains exactly the records it carried. The last report
    /// is withheld when it is under the minimum size and `force` is unset,
    /// leaving its records buffered. A failed send stops the flush and keeps
    /// everything not yet delivered.
    pub fn flush(&mut self, force: bool) -> Result<Flush, AssemblyError> {
        let metadata = self.metadata()?;
        let fixed: usize = metadata.iter().map(SubReport::encoded_len).sum::<usize>() + TAG_SIZE;
        let max = self.transport.max_report_size();
        let mut reports = 0;
        let mut total = 0;

        loop {
            let nonce = generate_nonce(self.rng.as_mut());
            let header = ReportHeader::new(self.username.as_str(), nonce, self.clock.now_wire())?;
            let budget = max.saturating_sub(header.encoded_len() + fixed);
            let take = batch_len(&self.pending, budget);
            let last = take == self.pending.len();

            let mut subreports = grouped(&self.pending[..take]);
            subreports.extend(metadata.iter().cloned());
            let report = encode_report(&header, &subreports, &self.secret)?;
            let size = report.len();

            if last && !force && size < self.min_report_size {
                debug!(size, min = self.min_report_size, "Report too small, withholding");
                return Ok(if reports == 0 {
                    Flush::Withheld { size }
                } else {
                    Flush::Sent { reports, size: total }
                });
            }

            match self.transport.send(&report) {
                Ok(sent) if sent == size => {
                    info!(user = %self.username, size, events = take, "Report submitted");
                    self.pending.drain(..take);
                    reports += 1;
                    total += size;
                }
                Ok(sent) => {
                    warn!(sent, size, "Short send, keeping events for the next report");
                    return Ok(Flush::Deferred { size });
                }
                Err(e) => {
                    warn!(error = %e, "Unable to submit report");
                    return Ok(Flush::Deferred { size });
                }
            }

            if last {
                return Ok(Flush::Sent { reports, size: total });
            }
        }
    }
}

impl<T: Transport> Drop for ReportAssembler<T> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        match self.flush(true) {
            Ok(Flush::Sent { .. }) => {}
            Ok(_) => warn!(
                events = self.pending.len(),
                "Could not deliver pending events at shutdown"
            ),
            Err(e) => warn!(error = %e, "Could not build final report"),
        }
    }
}

/// Subreport group a record belongs to, in the order groups are encoded.
fn group_of(pending: &Pending) -> (usize, usize) {
    match pending {
        Pending::Single(event) if event.address.is_ipv4() => (0, IPV4_EVENT_WIDTH),
        Pending::Single(_) => (1, IPV6_EVENT_WIDTH),
        Pending::Repeated(r) if r.event.address.is_ipv4() => (2, REPEATED_IPV4_EVENT_WIDTH),
        Pending::Repeated(_) => (3, REPEATED_IPV6_EVENT_WIDTH),
    }
}

fn per_subreport(width: usize) -> usize {
    usize::from(u16::MAX) / width
}

/// How many leading records fit in `budget` body bytes, counting a preamble
/// each time a group opens a new subreport. Never less than one record when
/// any are pending, so an undersized budget still makes progress.
fn batch_len(pending: &[Pending], budget: usize) -> usize {
    let mut counts = [0usize; 4];
    let mut used = 0;
    for (taken, record) in pending.iter().enumerate() {
        let (group, width) = group_of(record);
        let mut cost = width;
        if counts[group] % per_subreport(width) == 0 {
            cost += PREAMBLE_SIZE;
        }
        if taken > 0 && used + cost > budget {
            return taken;
        }
        used += cost;
        counts[group] += 1;
    }
    pending.len()
}

/// Event subreports for `pending`, grouped by address family and repeat,
/// each group split so no payload outgrows its 16-bit length.
fn grouped(pending: &[Pending]) -> Vec<SubReport> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    let mut repeated_v4 = Vec::new();
    let mut repeated_v6 = Vec::new();
    for record in pending {
        match *record {
            Pending::Single(event) if event.address.is_ipv4() => v4.push(event),
            Pending::Single(event) => v6.push(event),
            Pending::Repeated(r) if r.event.address.is_ipv4() => repeated_v4.push(r),
            Pending::Repeated(r) => repeated_v6.push(r),
        }
    }

    let mut subreports = Vec::new();
    subreports.extend(chunked(v4, IPV4_EVENT_WIDTH, SubReport::Ipv4Events));
    subreports.extend(chunked(v6, IPV6_EVENT_WIDTH, SubReport::Ipv6Events));
    subreports.extend(chunked(
        repeated_v4,
        REPEATED_IPV4_EVENT_WIDTH,
        SubReport::RepeatedIpv4Events,
    ));
    subreports.extend(chunked(
        repeated_v6,
        REPEATED_IPV6_EVENT_WIDTH,
        SubReport::RepeatedIpv6Events,
    ));
    subreports
}

fn chunked<R>(records: Vec<R>, width: usize, wrap: fn(Vec<R>) -> SubReport) -> Vec<SubReport> {
    let mut out = Vec::new();
    let mut records = records.into_iter().peekable();
    while records.peek().is_some() {
        out.push(wrap(records.by_ref().take(per_subreport(width)).collect()));
    }
    out
}
