use std::net::Ipv4Addr;
use std::time::Instant;

use super::*;

#[test]
fn test_unicast_loopback_round_trip() {
    let receiver =
        ReceiverTransport::bind(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::UNSPECIFIED).unwrap();
    let port = receiver.local_port().unwrap();

    let sender = SenderTransport::open(Ipv4Addr::LOCALHOST, port, DEFAULT_TTL).unwrap();
    assert_eq!(sender.destination().port(), port);

    let payload = [0x42u8; 300];
    assert_eq!(sender.send(&payload).unwrap(), 300);

    let mut buf = [0u8; 2048];
    let mut received = None;
    // The first recv may time out before the datagram lands.
    for _ in 0..20 {
        if let Some(n) = receiver.recv(&mut buf).unwrap() {
            received = Some(n);
            break;
        }
    }
    assert_eq!(received, Some(300));
    assert_eq!(&buf[..300], &payload[..]);
}

#[test]
fn test_recv_timeout_returns_none() {
    let receiver =
        ReceiverTransport::bind(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::UNSPECIFIED).unwrap();

    let start = Instant::now();
    let mut buf = [0u8; 64];
    assert!(receiver.recv(&mut buf).unwrap().is_none());
    // The poll timeout bounds the wait.
    assert!(start.elapsed().as_millis() >= 50);
    assert!(start.elapsed().as_millis() < 2000);
}

#[test]
fn test_multicast_destination_sets_ttl() {
    let sender = SenderTransport::open("239.69.1.1".parse().unwrap(), 5004, 4);
    assert!(sender.is_ok());
}

#[test]
fn test_try_clone_shares_port() {
    let receiver =
        ReceiverTransport::bind(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::UNSPECIFIED).unwrap();
    let clone = receiver.try_clone().unwrap();
    assert_eq!(
        receiver.local_port().unwrap(),
        clone.local_port().unwrap()
    );
}

#[test]
fn test_transient_classification() {
    use std::io::{Error, ErrorKind};

    assert!(is_transient(&Error::new(ErrorKind::WouldBlock, "eagain")));
    assert!(is_transient(&Error::new(ErrorKind::InvalidInput, "emsgsize")));
    assert!(!is_transient(&Error::new(
        ErrorKind::PermissionDenied,
        "eacces"
    )));
}
