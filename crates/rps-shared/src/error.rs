use std::net::IpAddr;

use thiserror::Error;

/// The address falls in a range that must never appear in a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Address {0} is not reportable")]
pub struct EligibilityError(pub IpAddr);

/// A client-side precondition was violated before any bytes were produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Username is {0} bytes (max {})", crate::constants::MAX_USERNAME_LEN)]
    UsernameTooLong(usize),

    #[error("{field} must be 1..={max} bytes, got {len}")]
    FieldLength {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Repeat count {0} outside 2..=255")]
    InvalidRepeat(u8),

    #[error("RESERVED event kind must never be reported")]
    ReservedEvent,

    #[error("Address {0} does not belong in a {1} subreport")]
    AddressFamily(IpAddr, &'static str),

    #[error("Too many records for one {0} subreport")]
    TooManyRecords(&'static str),

    #[error("SoftwareVersion requires a SoftwareName subreport")]
    VersionWithoutName,

    #[error("More than one SoftwareName subreport")]
    DuplicateSoftwareName,

    #[error("More than one SoftwareVersion subreport")]
    DuplicateSoftwareVersion,

    #[error("Report contains no subreports")]
    EmptyReport,

    #[error("Report must end with exactly one EndOfReport")]
    MisplacedEndOfReport,

    #[error("Shared secret cannot key HMAC-SHA1")]
    UnusableSecret,
}

/// The outer report framing is unusable. Never fatal to the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Report is {0} bytes, too short to carry a header and tag")]
    TooShort(usize),

    #[error("Username length {declared} overruns the {available} available bytes")]
    UsernameOverrun { declared: usize, available: usize },

    #[error("Username is not valid UTF-8")]
    UsernameEncoding,

    #[error("Only {0} bytes follow the username; nonce and timestamp need 12")]
    TruncatedEnvelope(usize),
}

/// A known subreport is malformed. The whole report is abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("Invalid length {length} for subreport format {tag}")]
    BadLength { tag: u8, length: usize },

    #[error("Unknown event index {0}")]
    UnknownEvent(u8),

    #[error("RESERVED event kind in report")]
    ReservedEvent,

    #[error("Repeat count {0} outside 2..=255")]
    InvalidRepeat(u8),

    #[error(transparent)]
    Ineligible(#[from] EligibilityError),

    #[error("Subreport format {0} is not valid UTF-8")]
    InvalidUtf8(u8),

    #[error("Subreport stream ended without EndOfReport")]
    MissingEndOfReport,

    #[error("{0} bytes follow EndOfReport")]
    TrailingBytes(usize),
}
