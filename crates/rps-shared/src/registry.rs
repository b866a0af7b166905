//! Format tag -> decoder table used when parsing a subreport stream.
//!
//! EndOfReport has no length field and is handled by the stream decoder
//! itself, so it has no entry here. A tag with no entry is not an error:
//! the caller skips its payload.

use crate::constants::{
    IPV4_EVENT_WIDTH, IPV6_EVENT_WIDTH, MAX_END_USER_LEN, MAX_SOFTWARE_NAME_LEN,
    MAX_SOFTWARE_VERSION_LEN, REPEATED_IPV4_EVENT_WIDTH, REPEATED_IPV6_EVENT_WIDTH,
};
use crate::error::DecodeError;
use crate::subreport::{self, SubReport};

pub type Decoder = fn(&[u8]) -> Result<SubReport, DecodeError>;

/// What a declared payload length must look like for a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
    /// A whole number of fixed-width records.
    Records(usize),
    /// A single string of 1..=max bytes.
    Bounded(usize),
}

pub struct Format {
    pub tag: u8,
    pub length: PayloadLength,
    pub decode: Decoder,
}

impl Format {
    pub fn check_length(&self, length: usize) -> Result<(), DecodeError> {
        let valid = match self.length {
            PayloadLength::Records(width) => length % width == 0,
            PayloadLength::Bounded(max) => (1..=max).contains(&length),
        };
        if valid {
            Ok(())
        } else {
            Err(DecodeError::BadLength {
                tag: self.tag,
                length,
            })
        }
    }
}

static FORMATS: [Format; 7] = [
    Format {
        tag: SubReport::IPV4_EVENTS,
        length: PayloadLength::Records(IPV4_EVENT_WIDTH),
        decode: subreport::decode_ipv4_events,
    },
    Format {
        tag: SubReport::IPV6_EVENTS,
        length: PayloadLength::Records(IPV6_EVENT_WIDTH),
        decode: subreport::decode_ipv6_events,
    },
    Format {
        tag: SubReport::REPEATED_IPV4_EVENTS,
        length: PayloadLength::Records(REPEATED_IPV4_EVENT_WIDTH),
        decode: subreport::decode_repeated_ipv4_events,
    },
    Format {
        tag: SubReport::REPEATED_IPV6_EVENTS,
        length: PayloadLength::Records(REPEATED_IPV6_EVENT_WIDTH),
        decode: subreport::decode_repeated_ipv6_events,
    },
    Format {
        tag: SubReport::SOFTWARE_NAME,
        length: PayloadLength::Bounded(MAX_SOFTWARE_NAME_LEN),
        decode: subreport::decode_software_name,
    },
    Format {
        tag: SubReport::SOFTWARE_VERSION,
        length: PayloadLength::Bounded(MAX_SOFTWARE_VERSION_LEN),
        decode: subreport::decode_software_version,
    },
    Format {
        tag: SubReport::END_USER,
        length: PayloadLength::Bounded(MAX_END_USER_LEN),
        decode: subreport::decode_end_user,
    },
];

pub fn lookup(tag: u8) -> Option<&'static Format> {
    FORMATS.iter().find(|format| format.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_tags() {
        for tag in [1u8, 2, 3, 4, 6, 7, 8] {
            assert_eq!(lookup(tag).map(|f| f.tag), Some(tag));
        }
    }

    #[test]
    fn test_lookup_unknown_tags() {
        // 0 is the terminator, 5 is unassigned
        for tag in [0u8, 5, 9, 200, 255] {
            assert!(lookup(tag).is_none());
        }
    }

    #[test]
    fn test_record_lengths_must_be_multiples() {
        let ipv4 = lookup(SubReport::IPV4_EVENTS).unwrap();
        assert!(ipv4.check_length(0).is_ok());
        assert!(ipv4.check_length(10).is_ok());
        assert_eq!(
            ipv4.check_length(11),
            Err(DecodeError::BadLength { tag: 1, length: 11 })
        );

        let repeated_v6 = lookup(SubReport::REPEATED_IPV6_EVENTS).unwrap();
        assert!(repeated_v6.check_length(36).is_ok());
        assert!(repeated_v6.check_length(34).is_err());
    }

    #[test]
    fn test_string_lengths_are_bounded() {
        let version = lookup(SubReport::SOFTWARE_VERSION).unwrap();
        assert!(version.check_length(0).is_err());
        assert!(version.check_length(31).is_ok());
        assert!(version.check_length(32).is_err());
    }
}
