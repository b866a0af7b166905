//! Network front end: receives raw reports and hands them to the
//! [`ReportProcessor`].
//!
//! Over UDP every datagram is one report. Over TCP every connection carries
//! one report, terminated by the sender closing its write half.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use rps_shared::Carrier;

use crate::error::ServerError;
use crate::processor::ReportProcessor;

/// How long a TCP sender gets to deliver its report.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65_535;

pub enum Listener {
    Udp(UdpSocket),
    Tcp(TcpListener),
}

impl Listener {
    pub async fn bind(carrier: Carrier, addr: SocketAddr) -> Result<Self, ServerError> {
        let bound = match carrier {
            Carrier::Udp => UdpSocket::bind(addr).await.map(Self::Udp),
            Carrier::Tcp => TcpListener::bind(addr).await.map(Self::Tcp),
        };
        bound.map_err(|source| ServerError::Bind { addr, source })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Udp(socket) => socket.local_addr(),
            Self::Tcp(listener) => listener.local_addr(),
        }
    }

    /// Receive reports until the socket fails.
    pub async fn serve(
        self,
        processor: Arc<ReportProcessor>,
        max_report_size: usize,
    ) -> io::Result<()> {
        let addr = self.local_addr()?;
        match self {
            Self::Udp(socket) => {
                info!(addr = %addr, "Listening for reports over UDP");
                serve_udp(socket, processor, max_report_size).await
            }
            Self::Tcp(listener) => {
                info!(addr = %addr, "Listening for reports over TCP");
                serve_tcp(listener, processor, max_report_size).await
            }
        }
    }
}

async fn serve_udp(
    socket: UdpSocket,
    processor: Arc<ReportProcessor>,
    max_report_size: usize,
) -> io::Result<()> {
    let mut buf = vec![0u8; max_report_size.min(MAX_DATAGRAM)];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                processor.handle(&buf[..len], peer);
            }
            // ICMP errors from earlier sends surface here on some platforms
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!(error = %e, "Ignoring reset on UDP socket");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn serve_tcp(
    listener: TcpListener,
    processor: Arc<ReportProcessor>,
    max_report_size: usize,
) -> io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };
        let processor = processor.clone();
        tokio::spawn(async move {
            match read_report(stream, max_report_size).await {
                Ok(report) => {
                    processor.handle(&report, peer);
                }
                Err(e) => warn!(peer = %peer, error = %e, "Failed to read report"),
            }
        });
    }
}

/// Read one report, giving up after [`READ_TIMEOUT`] or `max_report_size`
/// bytes.
async fn read_report(stream: TcpStream, max_report_size: usize) -> io::Result<Vec<u8>> {
    let mut report = Vec::new();
    let mut limited = stream.take(max_report_size as u64);
    tokio::time::timeout(READ_TIMEOUT, limited.read_to_end(&mut report))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "report not received in time"))??;
    Ok(report)
}
