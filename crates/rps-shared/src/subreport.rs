//! Subreport variants and their byte layouts.
//!
//! Every subreport except the terminator starts with a 3-byte preamble:
//! `[1 byte format][2 bytes payload length, big-endian]`. EndOfReport is the
//! single byte `0` with no length field.
//!
//! | Format | Variant            | Payload                                        |
//! |--------|--------------------|------------------------------------------------|
//! | 0      | EndOfReport        | none                                           |
//! | 1      | IPv4Events         | n x `[4 addr][1 event]`                        |
//! | 2      | IPv6Events         | n x `[16 addr][1 event]`                       |
//! | 3      | RepeatedIPv4Events | n x `[4 addr][1 event][1 repeat]`              |
//! | 4      | RepeatedIPv6Events | n x `[16 addr][1 event][1 repeat]`             |
//! | 6      | SoftwareName       | 1..=63 bytes UTF-8                             |
//! | 7      | SoftwareVersion    | 1..=31 bytes UTF-8                             |
//! | 8      | EndUser            | 1..=31 opaque bytes                            |

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::BufMut;

use crate::constants::{
    IPV4_EVENT_WIDTH, IPV6_EVENT_WIDTH, MAX_END_USER_LEN, MAX_SOFTWARE_NAME_LEN,
    MAX_SOFTWARE_VERSION_LEN, MIN_REPEAT, REPEATED_IPV4_EVENT_WIDTH,
    REPEATED_IPV6_EVENT_WIDTH,
};
use crate::error::{DecodeError, PolicyError};
use crate::types::{Event, EventKind, RepeatedEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubReport {
    EndOfReport,
    Ipv4Events(Vec<Event>),
    Ipv6Events(Vec<Event>),
    RepeatedIpv4Events(Vec<RepeatedEvent>),
    RepeatedIpv6Events(Vec<RepeatedEvent>),
    SoftwareName(String),
    SoftwareVersion(String),
    EndUser(Vec<u8>),
}

impl SubReport {
    pub const END_OF_REPORT: u8 = 0;
    pub const IPV4_EVENTS: u8 = 1;
    pub const IPV6_EVENTS: u8 = 2;
    pub const REPEATED_IPV4_EVENTS: u8 = 3;
    pub const REPEATED_IPV6_EVENTS: u8 = 4;
    pub const SOFTWARE_NAME: u8 = 6;
    pub const SOFTWARE_VERSION: u8 = 7;
    pub const END_USER: u8 = 8;

    pub fn software_name(name: impl Into<String>) -> Result<Self, PolicyError> {
        let name = name.into();
        check_field("SoftwareName", name.len(), MAX_SOFTWARE_NAME_LEN)?;
        Ok(Self::SoftwareName(name))
    }

    pub fn software_version(version: impl Into<String>) -> Result<Self, PolicyError> {
        let version = version.into();
        check_field("SoftwareVersion", version.len(), MAX_SOFTWARE_VERSION_LEN)?;
        Ok(Self::SoftwareVersion(version))
    }

    pub fn end_user(end_user: impl Into<Vec<u8>>) -> Result<Self, PolicyError> {
        let end_user = end_user.into();
        check_field("EndUser", end_user.len(), MAX_END_USER_LEN)?;
        Ok(Self::EndUser(end_user))
    }

    /// The format byte this variant is written with.
    pub fn tag(&self) -> u8 {
        match self {
            Self::EndOfReport => Self::END_OF_REPORT,
            Self::Ipv4Events(_) => Self::IPV4_EVENTS,
            Self::Ipv6Events(_) => Self::IPV6_EVENTS,
            Self::RepeatedIpv4Events(_) => Self::REPEATED_IPV4_EVENTS,
            Self::RepeatedIpv6Events(_) => Self::REPEATED_IPV6_EVENTS,
            Self::SoftwareName(_) => Self::SOFTWARE_NAME,
            Self::SoftwareVersion(_) => Self::SOFTWARE_VERSION,
            Self::EndUser(_) => Self::END_USER,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EndOfReport => "EndOfReport",
            Self::Ipv4Events(_) => "IPv4Events",
            Self::Ipv6Events(_) => "IPv6Events",
            Self::RepeatedIpv4Events(_) => "RepeatedIPv4Events",
            Self::RepeatedIpv6Events(_) => "RepeatedIPv6Events",
            Self::SoftwareName(_) => "SoftwareName",
            Self::SoftwareVersion(_) => "SoftwareVersion",
            Self::EndUser(_) => "EndUser",
        }
    }

    /// Append the wire encoding to `buf`, validating the variant's
    /// invariants first so nothing is written on failure.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), PolicyError> {
        match self {
            Self::EndOfReport => {
                buf.put_u8(Self::END_OF_REPORT);
                return Ok(());
            }
            Self::Ipv4Events(events) | Self::Ipv6Events(events) => {
                let v4 = matches!(self, Self::Ipv4Events(_));
                for event in events {
                    check_record(self.name(), &event.address, event.kind, v4)?;
                }
                let width = if v4 { IPV4_EVENT_WIDTH } else { IPV6_EVENT_WIDTH };
                let length = payload_length(self.name(), events.len() * width)?;
                buf.put_u8(self.tag());
                buf.put_u16(length);
                for event in events {
                    put_address(buf, &event.address);
                    buf.put_u8(event.kind.as_byte());
                }
            }
            Self::RepeatedIpv4Events(events) | Self::RepeatedIpv6Events(events) => {
                let v4 = matches!(self, Self::RepeatedIpv4Events(_));
                for repeated in events {
                    check_record(self.name(), &repeated.event.address, repeated.event.kind, v4)?;
                    if repeated.repeat < MIN_REPEAT {
                        return Err(PolicyError::InvalidRepeat(repeated.repeat));
                    }
                }
                let width = if v4 {
                    REPEATED_IPV4_EVENT_WIDTH
                } else {
                    REPEATED_IPV6_EVENT_WIDTH
                };
                let length = payload_length(self.name(), events.len() * width)?;
                buf.put_u8(self.tag());
                buf.put_u16(length);
                for repeated in events {
                    put_address(buf, &repeated.event.address);
                    buf.put_u8(repeated.event.kind.as_byte());
                    buf.put_u8(repeated.repeat);
                }
            }
            Self::SoftwareName(value) => {
                put_field(buf, self.tag(), self.name(), value.as_bytes(), MAX_SOFTWARE_NAME_LEN)?
            }
            Self::SoftwareVersion(value) => put_field(
                buf,
                self.tag(),
                self.name(),
                value.as_bytes(),
                MAX_SOFTWARE_VERSION_LEN,
            )?,
            Self::EndUser(value) => {
                put_field(buf, self.tag(), self.name(), value, MAX_END_USER_LEN)?
            }
        }
        Ok(())
    }

    /// Number of bytes `encode` writes.
    pub fn encoded_len(&self) -> usize {
        let payload = match self {
            Self::EndOfReport => return 1,
            Self::Ipv4Events(events) => events.len() * IPV4_EVENT_WIDTH,
            Self::Ipv6Events(events) => events.len() * IPV6_EVENT_WIDTH,
            Self::RepeatedIpv4Events(events) => events.len() * REPEATED_IPV4_EVENT_WIDTH,
            Self::RepeatedIpv6Events(events) => events.len() * REPEATED_IPV6_EVENT_WIDTH,
            Self::SoftwareName(value) | Self::SoftwareVersion(value) => value.len(),
            Self::EndUser(value) => value.len(),
        };
        crate::constants::PREAMBLE_SIZE + payload
    }
}

fn check_field(field: &'static str, len: usize, max: usize) -> Result<(), PolicyError> {
    if len == 0 || len > max {
        return Err(PolicyError::FieldLength { field, len, max });
    }
    Ok(())
}

fn check_record(
    subreport: &'static str,
    address: &IpAddr,
    kind: EventKind,
    v4: bool,
) -> Result<(), PolicyError> {
    if kind == EventKind::Reserved {
        return Err(PolicyError::ReservedEvent);
    }
    if address.is_ipv4() != v4 {
        return Err(PolicyError::AddressFamily(*address, subreport));
    }
    Ok(())
}

fn payload_length(subreport: &'static str, len: usize) -> Result<u16, PolicyError> {
    u16::try_from(len).map_err(|_| PolicyError::TooManyRecords(subreport))
}

fn put_address(buf: &mut impl BufMut, address: &IpAddr) {
    match address {
        IpAddr::V4(v4) => buf.put_slice(&v4.octets()),
        IpAddr::V6(v6) => buf.put_slice(&v6.octets()),
    }
}

fn put_field(
    buf: &mut impl BufMut,
    tag: u8,
    field: &'static str,
    value: &[u8],
    max: usize,
) -> Result<(), PolicyError> {
    check_field(field, value.len(), max)?;
    buf.put_u8(tag);
    // check_field bounds the length well below u16::MAX
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoders
//
// Each receives a payload whose length the registry has already checked.
// ---------------------------------------------------------------------------

pub(crate) fn decode_ipv4_events(payload: &[u8]) -> Result<SubReport, DecodeError> {
    let events = payload
        .chunks_exact(IPV4_EVENT_WIDTH)
        .map(|record| decode_event(ipv4_at(record), record[4]))
        .collect::<Result<_, _>>()?;
    Ok(SubReport::Ipv4Events(events))
}

pub(crate) fn decode_ipv6_events(payload: &[u8]) -> Result<SubReport, DecodeError> {
    let events = payload
        .chunks_exact(IPV6_EVENT_WIDTH)
        .map(|record| decode_event(ipv6_at(record), record[16]))
        .collect::<Result<_, _>>()?;
    Ok(SubReport::Ipv6Events(events))
}

pub(crate) fn decode_repeated_ipv4_events(payload: &[u8]) -> Result<SubReport, DecodeError> {
    let events = payload
        .chunks_exact(REPEATED_IPV4_EVENT_WIDTH)
        .map(|record| decode_repeated(ipv4_at(record), record[4], record[5]))
        .collect::<Result<_, _>>()?;
    Ok(SubReport::RepeatedIpv4Events(events))
}

pub(crate) fn decode_repeated_ipv6_events(payload: &[u8]) -> Result<SubReport, DecodeError> {
    let events = payload
        .chunks_exact(REPEATED_IPV6_EVENT_WIDTH)
        .map(|record| decode_repeated(ipv6_at(record), record[16], record[17]))
        .collect::<Result<_, _>>()?;
    Ok(SubReport::RepeatedIpv6Events(events))
}

pub(crate) fn decode_software_name(payload: &[u8]) -> Result<SubReport, DecodeError> {
    decode_utf8(SubReport::SOFTWARE_NAME, payload).map(SubReport::SoftwareName)
}

pub(crate) fn decode_software_version(payload: &[u8]) -> Result<SubReport, DecodeError> {
    decode_utf8(SubReport::SOFTWARE_VERSION, payload).map(SubReport::SoftwareVersion)
}

pub(crate) fn decode_end_user(payload: &[u8]) -> Result<SubReport, DecodeError> {
    Ok(SubReport::EndUser(payload.to_vec()))
}

fn ipv4_at(record: &[u8]) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(record[0], record[1], record[2], record[3]))
}

fn ipv6_at(record: &[u8]) -> IpAddr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&record[..16]);
    IpAddr::V6(Ipv6Addr::from(octets))
}

fn decode_kind(index: u8) -> Result<EventKind, DecodeError> {
    match EventKind::from_byte(index) {
        Some(EventKind::Reserved) => Err(DecodeError::ReservedEvent),
        Some(kind) => Ok(kind),
        None => Err(DecodeError::UnknownEvent(index)),
    }
}

fn decode_event(address: IpAddr, index: u8) -> Result<Event, DecodeError> {
    Ok(Event::new(address, decode_kind(index)?)?)
}

fn decode_repeated(address: IpAddr, index: u8, repeat: u8) -> Result<RepeatedEvent, DecodeError> {
    let event = decode_event(address, index)?;
    RepeatedEvent::new(event, repeat).map_err(|_| DecodeError::InvalidRepeat(repeat))
}

fn decode_utf8(tag: u8, payload: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(payload.to_vec()).map_err(|_| DecodeError::InvalidUtf8(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    fn event(addr: &str, kind: EventKind) -> Event {
        Event::new(addr.parse().unwrap(), kind).unwrap()
    }

    fn repeated(addr: &str, kind: EventKind, repeat: u8) -> RepeatedEvent {
        RepeatedEvent::new(event(addr, kind), repeat).unwrap()
    }

    fn encode(subreport: &SubReport) -> Vec<u8> {
        let mut buf = Vec::new();
        subreport.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), subreport.encoded_len());
        buf
    }

    /// Decode a single encoded subreport through the registry.
    fn decode(bytes: &[u8]) -> SubReport {
        let format = registry::lookup(bytes[0]).expect("known format");
        let length = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        format.check_length(length).unwrap();
        (format.decode)(&bytes[3..3 + length]).unwrap()
    }

    #[test]
    fn test_every_variant_roundtrips() {
        let variants = vec![
            SubReport::Ipv4Events(vec![
                event("5.79.73.204", EventKind::AutoSpam),
                event("95.211.160.147", EventKind::Greylisted),
            ]),
            SubReport::Ipv6Events(vec![event(
                "2606:2800:220:1:248:1893:25c8:1946",
                EventKind::ValidRecipient,
            )]),
            SubReport::RepeatedIpv4Events(vec![repeated(
                "93.184.216.34",
                EventKind::InvalidRecipient,
                3,
            )]),
            SubReport::RepeatedIpv6Events(vec![repeated(
                "2a00:1450:4001:82a::200e",
                EventKind::AuthFailed,
                255,
            )]),
            SubReport::software_name("MIMEDefang").unwrap(),
            SubReport::software_version("2.84").unwrap(),
            SubReport::end_user(vec![0u8, 1, 2, 0xff]).unwrap(),
        ];

        for variant in variants {
            assert_eq!(decode(&encode(&variant)), variant, "{}", variant.name());
        }
    }

    #[test]
    fn test_end_of_report_is_single_zero_byte() {
        assert_eq!(encode(&SubReport::EndOfReport), vec![0]);
    }

    #[test]
    fn test_ipv4_events_layout() {
        let bytes = encode(&SubReport::Ipv4Events(vec![event(
            "5.79.73.204",
            EventKind::AutoSpam,
        )]));
        assert_eq!(bytes, vec![1, 0, 5, 5, 79, 73, 204, 3]);
    }

    #[test]
    fn test_repeated_ipv4_layout_puts_event_before_repeat() {
        let bytes = encode(&SubReport::RepeatedIpv4Events(vec![repeated(
            "93.184.216.34",
            EventKind::InvalidRecipient,
            3,
        )]));
        assert_eq!(bytes, vec![3, 0, 6, 93, 184, 216, 34, 8, 3]);
    }

    #[test]
    fn test_repeated_ipv6_record_width_is_18() {
        let bytes = encode(&SubReport::RepeatedIpv6Events(vec![repeated(
            "2606:2800:220:1:248:1893:25c8:1946",
            EventKind::Virus,
            2,
        )]));
        assert_eq!(&bytes[..3], &[4, 0, 18]);
        assert_eq!(bytes.len(), 3 + 18);
    }

    #[test]
    fn test_encode_rejects_reserved_event() {
        let reserved = Event {
            address: "8.8.8.8".parse().unwrap(),
            kind: EventKind::Reserved,
        };
        let mut buf = Vec::new();
        assert_eq!(
            SubReport::Ipv4Events(vec![reserved]).encode(&mut buf),
            Err(PolicyError::ReservedEvent)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_wrong_address_family() {
        let v6 = event("2606:2800:220:1:248:1893:25c8:1946", EventKind::AutoHam);
        let mut buf = Vec::new();
        assert!(matches!(
            SubReport::Ipv4Events(vec![v6]).encode(&mut buf),
            Err(PolicyError::AddressFamily(_, "IPv4Events"))
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_event_list() {
        let events = vec![event("8.8.8.8", EventKind::AutoSpam); 13_108];
        let mut buf = Vec::new();
        assert_eq!(
            SubReport::Ipv4Events(events).encode(&mut buf),
            Err(PolicyError::TooManyRecords("IPv4Events"))
        );
    }

    #[test]
    fn test_string_field_bounds() {
        assert!(SubReport::software_name("").is_err());
        assert!(SubReport::software_name("n".repeat(63)).is_ok());
        assert!(SubReport::software_name("n".repeat(64)).is_err());
        assert!(SubReport::software_version("v".repeat(31)).is_ok());
        assert!(SubReport::software_version("v".repeat(32)).is_err());
        assert!(SubReport::end_user(vec![7u8; 32]).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_event_index() {
        assert_eq!(
            decode_ipv4_events(&[8, 8, 8, 8, 12]),
            Err(DecodeError::UnknownEvent(12))
        );
    }

    #[test]
    fn test_decode_rejects_reserved_event() {
        assert_eq!(
            decode_ipv4_events(&[8, 8, 8, 8, 0]),
            Err(DecodeError::ReservedEvent)
        );
    }

    #[test]
    fn test_decode_rejects_ineligible_address() {
        assert!(matches!(
            decode_ipv4_events(&[127, 0, 0, 1, 3]),
            Err(DecodeError::Ineligible(_))
        ));
    }

    #[test]
    fn test_decode_rejects_repeat_below_two() {
        assert_eq!(
            decode_repeated_ipv4_events(&[8, 8, 8, 8, 3, 1]),
            Err(DecodeError::InvalidRepeat(1))
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_name() {
        assert_eq!(
            decode_software_name(&[0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8(SubReport::SOFTWARE_NAME))
        );
        // EndUser is opaque
        assert_eq!(
            decode_end_user(&[0xff, 0xfe]),
            Ok(SubReport::EndUser(vec![0xff, 0xfe]))
        );
    }
}
