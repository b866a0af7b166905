//! # rps-client
//!
//! Sensor side of the IP reputation reporting protocol. Observations are
//! buffered in a [`ReportAssembler`], packed into signed reports and handed
//! to a [`Transport`] (UDP datagram or short-lived TCP connection).
//!
//! All I/O here is blocking so that pending events can still be delivered
//! from `Drop`.

pub mod assembler;
pub mod config;
pub mod error;
pub mod observation;
pub mod transport;

pub use assembler::{Flush, ReportAssembler};
pub use config::ClientConfig;
pub use error::{AssemblyError, ClientError};
pub use observation::Observation;
pub use transport::{Carrier, TcpTransport, Transport, UdpTransport};
