use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MIN_REPEAT;
use crate::eligibility::{EligibilityOracle, GlobalUnicast};
use crate::error::{EligibilityError, PolicyError};

/// Observation kinds. The discriminant is the wire value; new kinds may only
/// be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
#[repr(u8)]
pub enum EventKind {
    /// Never produced by a sensor
    Reserved = 0,
    Greylisted = 1,
    Ungreylisted = 2,
    AutoSpam = 3,
    HandSpam = 4,
    AutoHam = 5,
    HandHam = 6,
    ValidRecipient = 7,
    InvalidRecipient = 8,
    Virus = 9,
    Phish = 10,
    AuthFailed = 11,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        Self::Reserved,
        Self::Greylisted,
        Self::Ungreylisted,
        Self::AutoSpam,
        Self::HandSpam,
        Self::AutoHam,
        Self::HandHam,
        Self::ValidRecipient,
        Self::InvalidRecipient,
        Self::Virus,
        Self::Phish,
        Self::AuthFailed,
    ];

    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(usize::from(b)).copied()
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Greylisted => "GREYLISTED",
            Self::Ungreylisted => "UNGREYLISTED",
            Self::AutoSpam => "AUTO-SPAM",
            Self::HandSpam => "HAND-SPAM",
            Self::AutoHam => "AUTO-HAM",
            Self::HandHam => "HAND-HAM",
            Self::ValidRecipient => "VALID-RECIPIENT",
            Self::InvalidRecipient => "INVALID-RECIPIENT",
            Self::Virus => "VIRUS",
            Self::Phish => "PHISH",
            Self::AuthFailed => "AUTH-FAILED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

/// One observation about one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub address: IpAddr,
    pub kind: EventKind,
}

impl Event {
    /// Build an event, rejecting addresses that must never be reported.
    pub fn new(address: IpAddr, kind: EventKind) -> Result<Self, EligibilityError> {
        Self::checked(address, kind, &GlobalUnicast)
    }

    pub fn checked(
        address: IpAddr,
        kind: EventKind,
        oracle: &dyn EligibilityOracle,
    ) -> Result<Self, EligibilityError> {
        let address = oracle.check(address)?;
        Ok(Self { address, kind })
    }
}

/// `repeat` occurrences (2..=255) of the same observation, collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepeatedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub repeat: u8,
}

impl RepeatedEvent {
    pub fn new(event: Event, repeat: u8) -> Result<Self, PolicyError> {
        if repeat < MIN_REPEAT {
            return Err(PolicyError::InvalidRepeat(repeat));
        }
        Ok(Self { event, repeat })
    }
}

/// Socket type used to move reports: one datagram per report, or one TCP
/// connection per report closed by the sender after the last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Carrier {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for Carrier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("expected udp or tcp, got {other}")),
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => f.write_str("udp"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}
