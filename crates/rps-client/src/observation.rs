//! Textual observations as accepted by the `rps-report` tool.
//!
//! One observation is `IP,EVENT[,REPEAT]`; commas and whitespace both
//! separate fields, so `2001:db8::1 VIRUS 3` works too. Event names are the
//! wire names (`AUTO-SPAM`, `HAND-HAM`, ...) in any case.

use std::net::IpAddr;
use std::str::FromStr;

use rps_shared::EventKind;

use crate::assembler::ReportAssembler;
use crate::error::{AssemblyError, ClientError};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub address: IpAddr,
    pub kind: EventKind,
    pub repeat: u8,
}

impl Observation {
    pub fn record<T: Transport>(
        &self,
        assembler: &mut ReportAssembler<T>,
    ) -> Result<(), AssemblyError> {
        assembler.record_repeated(self.address, self.kind, self.repeat)
    }
}

impl FromStr for Observation {
    type Err = ClientError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ClientError::InvalidObservation {
            input: input.to_string(),
            reason,
        };

        let mut fields = input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty());

        let address = fields
            .next()
            .ok_or_else(|| invalid("empty".into()))?
            .parse::<IpAddr>()
            .map_err(|e| invalid(e.to_string()))?;
        let kind = fields
            .next()
            .ok_or_else(|| invalid("missing event type".into()))?
            .parse::<EventKind>()
            .map_err(invalid)?;
        let repeat = match fields.next() {
            Some(n) => n
                .parse::<u8>()
                .map_err(|e| invalid(format!("bad repeat count: {e}")))?,
            None => 1,
        };
        if let Some(extra) = fields.next() {
            return Err(invalid(format!("unexpected field {extra:?}")));
        }

        Ok(Self {
            address,
            kind,
            repeat,
        })
    }
}

/// Parse one line of input, returning `None` for blank lines and `#`
/// comments.
pub fn parse_line(line: &str) -> Option<Result<Observation, ClientError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.parse())
}
