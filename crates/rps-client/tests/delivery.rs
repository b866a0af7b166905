//! Reports built from a configuration reach a real socket intact.

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::time::Duration;

use rps_client::{Carrier, ClientConfig, Flush};
use rps_shared::{decode_subreports, EventKind, RawReport, SubReport};

fn config(server: String, carrier: Carrier) -> ClientConfig {
    let mut config = ClientConfig::new(server, "dfs", "foo");
    config.carrier = carrier;
    config.software_name = Some("rps-report".into());
    config
}

fn check_report(report: &[u8]) -> Vec<SubReport> {
    let raw = RawReport::split(report).unwrap();
    assert_eq!(raw.username, "dfs");
    assert!(raw.verify(b"foo"));
    decode_subreports(raw.envelope().unwrap().body)
        .unwrap()
        .subreports
}

#[test]
fn test_udp_delivery() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let server = receiver.local_addr().unwrap().to_string();

    let mut assembler = config(server, Carrier::Udp).connect().unwrap();
    assembler
        .record("5.79.73.204".parse().unwrap(), EventKind::AutoSpam)
        .unwrap();
    assembler
        .record_repeated("93.184.216.34".parse().unwrap(), EventKind::InvalidRecipient, 3)
        .unwrap();
    assert!(matches!(assembler.flush(true).unwrap(), Flush::Sent { .. }));

    let mut buf = [0u8; 2048];
    let (n, _) = receiver.recv_from(&mut buf).unwrap();
    let subreports = check_report(&buf[..n]);
    assert_eq!(subreports.len(), 3);
    assert_eq!(subreports[2], SubReport::SoftwareName("rps-report".into()));
}

#[test]
fn test_tcp_delivery_on_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server = listener.local_addr().unwrap().to_string();

    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut report = Vec::new();
        stream.read_to_end(&mut report).unwrap();
        report
    });

    {
        let mut assembler = config(server, Carrier::Tcp).connect().unwrap();
        assembler
            .record(
                "2606:2800:220:1:248:1893:25c8:1946".parse().unwrap(),
                EventKind::ValidRecipient,
            )
            .unwrap();
    }

    let subreports = check_report(&handle.join().unwrap());
    assert!(matches!(&subreports[0], SubReport::Ipv6Events(events) if events.len() == 1));
}
