//! Carriers that hand a finished report to the aggregator.
//!
//! The assembler only needs `send(bytes) -> bytes_sent`; a short count or an
//! error means the report is kept for the next flush. Each carrier also
//! caps how large a single report may be, and the assembler splits its
//! buffer to stay under that cap.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::debug;

use rps_shared::constants::{MAX_DATAGRAM_REPORT, MAX_REPORT_SIZE};
pub use rps_shared::Carrier;

pub trait Transport {
    /// Send one complete report, returning how many bytes went out.
    fn send(&mut self, report: &[u8]) -> io::Result<usize>;

    /// Largest report this carrier can deliver in one piece.
    fn max_report_size(&self) -> usize {
        MAX_DATAGRAM_REPORT
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, report: &[u8]) -> io::Result<usize> {
        (**self).send(report)
    }

    fn max_report_size(&self) -> usize {
        (**self).max_report_size()
    }
}

fn resolve(server: impl ToSocketAddrs) -> io::Result<SocketAddr> {
    server.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "server address did not resolve")
    })
}

/// One datagram per report.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    server: SocketAddr,
}

impl UdpTransport {
    pub fn connect(server: impl ToSocketAddrs, timeout: Duration) -> io::Result<Self> {
        let server = resolve(server)?;
        let local: SocketAddr = if server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(timeout))?;
        debug!(server = %server, "UDP transport ready");
        Ok(Self { socket, server })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, report: &[u8]) -> io::Result<usize> {
        self.socket.send_to(report, self.server)
    }
}

/// One short-lived connection per report; the write half is closed to mark
/// the end of the report.
#[derive(Debug)]
pub struct TcpTransport {
    server: SocketAddr,
    timeout: Duration,
}

impl TcpTransport {
    pub fn connect(server: impl ToSocketAddrs, timeout: Duration) -> io::Result<Self> {
        let server = resolve(server)?;
        Ok(Self { server, timeout })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, report: &[u8]) -> io::Result<usize> {
        let mut stream = TcpStream::connect_timeout(&self.server, self.timeout)?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(report)?;
        stream.shutdown(Shutdown::Write)?;
        Ok(report.len())
    }

    /// The aggregator stops reading a stream at this many bytes.
    fn max_report_size(&self) -> usize {
        MAX_REPORT_SIZE
    }
}

/// Open the configured carrier towards `server`.
pub fn open(
    carrier: Carrier,
    server: &str,
    timeout: Duration,
) -> io::Result<Box<dyn Transport + Send>> {
    Ok(match carrier {
        Carrier::Udp => Box::new(UdpTransport::connect(server, timeout)?),
        Carrier::Tcp => Box::new(TcpTransport::connect(server, timeout)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_carrier_parse() {
        assert_eq!("udp".parse(), Ok(Carrier::Udp));
        assert_eq!(" TCP ".parse(), Ok(Carrier::Tcp));
        assert!("sctp".parse::<Carrier>().is_err());
        assert_eq!(Carrier::Tcp.to_string(), "tcp");
    }

    #[test]
    fn test_udp_send_delivers_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let mut transport = UdpTransport::connect(addr, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.send(b"report").unwrap(), 6);

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"report");
    }

    #[test]
    fn test_tcp_send_closes_write_half() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            received
        });

        let mut transport = TcpTransport::connect(addr, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.send(b"tcp report").unwrap(), 10);
        assert_eq!(server.join().unwrap(), b"tcp report");
    }

    #[test]
    fn test_report_size_caps_follow_carrier() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();

        let udp = open(Carrier::Udp, &addr.to_string(), Duration::from_secs(1)).unwrap();
        let tcp = open(Carrier::Tcp, &addr.to_string(), Duration::from_secs(1)).unwrap();
        assert_eq!(udp.max_report_size(), MAX_DATAGRAM_REPORT);
        assert_eq!(tcp.max_report_size(), MAX_REPORT_SIZE);
    }

    #[test]
    fn test_tcp_send_fails_without_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = TcpTransport::connect(addr, Duration::from_millis(500)).unwrap();
        assert!(transport.send(b"lost").is_err());
    }
}
