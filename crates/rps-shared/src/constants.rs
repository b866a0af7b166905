/// Protocol version carried in the first byte of every report
pub const PROTOCOL_VERSION: u8 = 2;

/// Default UDP (or TCP) port of the aggregator
pub const DEFAULT_PORT: u16 = 6568;

/// Per-report random value length in bytes
pub const NONCE_SIZE: usize = 8;

/// Big-endian unix timestamp length in bytes
pub const TIMESTAMP_SIZE: usize = 4;

/// Truncated HMAC-SHA1 tag length in bytes
pub const TAG_SIZE: usize = 10;

/// Maximum username length in bytes
pub const MAX_USERNAME_LEN: usize = 63;

/// Maximum SoftwareName payload in bytes
pub const MAX_SOFTWARE_NAME_LEN: usize = 63;

/// Maximum SoftwareVersion payload in bytes
pub const MAX_SOFTWARE_VERSION_LEN: usize = 31;

/// Maximum EndUser payload in bytes
pub const MAX_END_USER_LEN: usize = 31;

/// Subreport preamble: format tag + 16-bit payload length
pub const PREAMBLE_SIZE: usize = 3;

/// Reports whose timestamp is further than this from "now" are stale
pub const FRESHNESS_WINDOW_SECS: u32 = 120;

/// Reports smaller than this are withheld unless a flush is forced
pub const MIN_REPORT_SIZE: usize = 400;

/// Largest report the aggregator reads from a single datagram/stream
pub const MAX_REPORT_SIZE: usize = 320_000;

/// Largest report that fits in one UDP datagram over IPv4
pub const MAX_DATAGRAM_REPORT: usize = 65_507;

/// Emit a progress log line every this many processed reports
pub const PROGRESS_LOG_INTERVAL: u64 = 1000;

/// Smallest and largest legal repeat count of a RepeatedEvent
pub const MIN_REPEAT: u8 = 2;
pub const MAX_REPEAT: u8 = u8::MAX;

/// Fixed record widths of the event-bearing subreports
pub const IPV4_EVENT_WIDTH: usize = 5;
pub const IPV6_EVENT_WIDTH: usize = 17;
pub const REPEATED_IPV4_EVENT_WIDTH: usize = 6;
pub const REPEATED_IPV6_EVENT_WIDTH: usize = 18;
