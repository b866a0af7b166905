//! Whole-report framing.
//!
//! Report format:
//! `[1 version][1 username len][username][8 nonce][4 timestamp BE]`
//! `[subreports ... EndOfReport][10 byte HMAC-SHA1 tag]`
//!
//! The tag covers every byte before it. Encoding happens in one pass on the
//! sensor; decoding is split into stages so the aggregator can authenticate
//! before it trusts anything past the username.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::{
    MAX_USERNAME_LEN, NONCE_SIZE, PREAMBLE_SIZE, PROTOCOL_VERSION, TAG_SIZE, TIMESTAMP_SIZE,
};
use crate::crypto::{self, Nonce};
use crate::error::{DecodeError, FramingError, PolicyError};
use crate::registry;
use crate::subreport::SubReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub version: u8,
    pub username: String,
    pub nonce: Nonce,
    pub timestamp: u32,
}

impl ReportHeader {
    pub fn new(
        username: impl Into<String>,
        nonce: Nonce,
        timestamp: u32,
    ) -> Result<Self, PolicyError> {
        let username = username.into();
        if username.len() > MAX_USERNAME_LEN {
            return Err(PolicyError::UsernameTooLong(username.len()));
        }
        Ok(Self {
            version: PROTOCOL_VERSION,
            username,
            nonce,
            timestamp,
        })
    }

    pub fn encoded_len(&self) -> usize {
        2 + self.username.len() + NONCE_SIZE + TIMESTAMP_SIZE
    }

    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), PolicyError> {
        if self.username.len() > MAX_USERNAME_LEN {
            return Err(PolicyError::UsernameTooLong(self.username.len()));
        }
        buf.put_u8(self.version);
        buf.put_u8(self.username.len() as u8);
        buf.put_slice(self.username.as_bytes());
        buf.put_slice(&self.nonce);
        buf.put_u32(self.timestamp);
        Ok(())
    }
}

/// Check the list-level rules: non-empty, exactly one trailing
/// EndOfReport, at most one SoftwareName and SoftwareVersion, and no
/// version without a name.
pub fn validate_subreports(subreports: &[SubReport]) -> Result<(), PolicyError> {
    let Some((last, rest)) = subreports.split_last() else {
        return Err(PolicyError::EmptyReport);
    };
    if *last != SubReport::EndOfReport || rest.contains(&SubReport::EndOfReport) {
        return Err(PolicyError::MisplacedEndOfReport);
    }

    let names = rest
        .iter()
        .filter(|s| matches!(s, SubReport::SoftwareName(_)))
        .count();
    let versions = rest
        .iter()
        .filter(|s| matches!(s, SubReport::SoftwareVersion(_)))
        .count();

    if names > 1 {
        return Err(PolicyError::DuplicateSoftwareName);
    }
    if versions > 1 {
        return Err(PolicyError::DuplicateSoftwareVersion);
    }
    if versions == 1 && names == 0 {
        return Err(PolicyError::VersionWithoutName);
    }
    Ok(())
}

/// Build the signed byte stream for one report.
pub fn encode_report(
    header: &ReportHeader,
    subreports: &[SubReport],
    secret: &[u8],
) -> Result<Vec<u8>, PolicyError> {
    validate_subreports(subreports)?;

    let body_len: usize = subreports.iter().map(SubReport::encoded_len).sum();
    let mut buf = BytesMut::with_capacity(header.encoded_len() + body_len + TAG_SIZE);
    header.encode(&mut buf)?;
    for subreport in subreports {
        subreport.encode(&mut buf)?;
    }

    let tag = crypto::sign(secret, &buf).ok_or(PolicyError::UnusableSecret)?;
    buf.put_slice(&tag);
    Ok(buf.to_vec())
}

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

/// A report split into the parts needed before authentication.
#[derive(Debug, Clone, Copy)]
pub struct RawReport<'a> {
    pub version: u8,
    pub username: &'a str,
    /// Every byte covered by the tag.
    pub signed: &'a [u8],
    pub tag: &'a [u8],
    after_username: &'a [u8],
}

/// The authenticated remainder of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub nonce: Nonce,
    pub timestamp: u32,
    pub body: &'a [u8],
}

impl<'a> RawReport<'a> {
    pub fn split(data: &'a [u8]) -> Result<Self, FramingError> {
        if data.len() < TAG_SIZE + 2 {
            return Err(FramingError::TooShort(data.len()));
        }
        let (signed, tag) = data.split_at(data.len() - TAG_SIZE);

        let version = signed[0];
        let declared = usize::from(signed[1]);
        let available = signed.len() - 2;
        if declared > available {
            return Err(FramingError::UsernameOverrun {
                declared,
                available,
            });
        }
        let (username, after_username) = signed[2..].split_at(declared);
        let username =
            std::str::from_utf8(username).map_err(|_| FramingError::UsernameEncoding)?;

        Ok(Self {
            version,
            username,
            signed,
            tag,
            after_username,
        })
    }

    pub fn verify(&self, secret: &[u8]) -> bool {
        crypto::verify(secret, self.signed, self.tag)
    }

    /// Nonce, timestamp and subreport bytes. Only meaningful once the tag
    /// has been verified.
    pub fn envelope(&self) -> Result<Envelope<'a>, FramingError> {
        let mut buf = self.after_username;
        if buf.remaining() < NONCE_SIZE + TIMESTAMP_SIZE {
            return Err(FramingError::TruncatedEnvelope(buf.remaining()));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        buf.copy_to_slice(&mut nonce);
        let timestamp = buf.get_u32();
        Ok(Envelope {
            nonce,
            timestamp,
            body: buf,
        })
    }
}

/// Result of walking a subreport stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBody {
    /// Known subreports in stream order, without the terminator.
    pub subreports: Vec<SubReport>,
    /// `(tag, length)` of every subreport with an unknown format.
    pub skipped: Vec<(u8, usize)>,
}

/// Decode a subreport stream up to and including its EndOfReport.
///
/// Unknown formats are skipped by their declared length. Anything wrong with
/// a known format, a truncated stream, a missing terminator, or bytes after
/// the terminator fails the whole stream.
pub fn decode_subreports(body: &[u8]) -> Result<DecodedBody, DecodeError> {
    let mut decoded = DecodedBody::default();
    let mut buf = body;

    loop {
        let offset = body.len() - buf.remaining();
        if !buf.has_remaining() {
            return Err(DecodeError::MissingEndOfReport);
        }
        if buf[0] == SubReport::END_OF_REPORT {
            buf.advance(1);
            if buf.has_remaining() {
                return Err(DecodeError::TrailingBytes(buf.remaining()));
            }
            return Ok(decoded);
        }
        if buf.remaining() < PREAMBLE_SIZE {
            return Err(DecodeError::Truncated {
                offset,
                needed: PREAMBLE_SIZE,
                remaining: buf.remaining(),
            });
        }

        let tag = buf.get_u8();
        let length = usize::from(buf.get_u16());
        let format = registry::lookup(tag);
        if let Some(format) = format {
            format.check_length(length)?;
        }
        if buf.remaining() < length {
            return Err(DecodeError::Truncated {
                offset: offset + PREAMBLE_SIZE,
                needed: length,
                remaining: buf.remaining(),
            });
        }
        let (payload, rest) = buf.split_at(length);
        buf = rest;

        match format {
            Some(format) => decoded.subreports.push((format.decode)(payload)?),
            None => decoded.skipped.push((tag, length)),
        }
    }
}
