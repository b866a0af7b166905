//! # rps-shared
//!
//! Wire format of the IP reputation reporting protocol, shared by sensors
//! and the aggregator: event types, the reportable-address check, subreport
//! codecs and their registry, report framing and HMAC signing.
//!
//! Nothing in this crate performs I/O or blocks.

pub mod clock;
pub mod constants;
pub mod crypto;
pub mod eligibility;
pub mod error;
pub mod registry;
pub mod report;
pub mod subreport;
pub mod types;

pub use clock::{Clock, MockClock, SystemClock};
pub use eligibility::{is_reportable, EligibilityOracle, GlobalUnicast};
pub use error::{DecodeError, EligibilityError, FramingError, PolicyError};
pub use report::{decode_subreports, encode_report, DecodedBody, Envelope, RawReport, ReportHeader};
pub use subreport::SubReport;
pub use types::{Carrier, Event, EventKind, RepeatedEvent};
