use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::ManualSource;
use crate::net::ReceiverTransport;
use crate::protocol::rtp::RtpHeader;
use crate::state::SenderState;
use crate::types::{AudioFormat, SenderConfig};

use super::Sender;

/// Unicast loopback destination keeps pipeline tests off the network; the
/// transport only applies multicast options when the destination calls for
/// them.
fn loopback_config(port: u16) -> SenderConfig {
    SenderConfig {
        id: "tx0".to_string(),
        label: "Test".to_string(),
        multicast_ip: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    }
}

#[test]
fn test_new_validates_config() {
    let config = SenderConfig {
        payload_type: 0,
        ..Default::default()
    };
    assert!(Sender::new(config).is_err());
    assert!(Sender::new(SenderConfig::default()).is_ok());
}

#[test]
fn test_initialize_rejects_format_mismatch() {
    let sender = Sender::new(SenderConfig::default()).unwrap();
    // Config wants 48k/2/24; source delivers 44.1k/2/16.
    sender.set_audio_source(Box::new(ManualSource::new(AudioFormat::new(
        44_100, 2, 16,
    ))));
    assert!(sender.initialize().is_err());
}

#[test]
fn test_initialize_allocates_stable_identity() {
    let sender = Sender::new(SenderConfig::default()).unwrap();
    assert_eq!(sender.ssrc(), None);

    sender.initialize().unwrap();
    let ssrc = sender.ssrc().unwrap();
    sender.initialize().unwrap();
    assert_eq!(sender.ssrc(), Some(ssrc));
    assert_eq!(sender.state(), SenderState::Stopped);
}

#[test]
fn test_state_callback_fires_on_transitions() {
    let sender = Sender::new(SenderConfig::default()).unwrap();
    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&states);
    sender.set_state_callback(move |s| seen.lock().push(s));

    sender.initialize().unwrap();
    assert_eq!(
        states.lock().clone(),
        vec![SenderState::Initializing, SenderState::Stopped]
    );
}

#[test]
fn test_stop_is_idempotent() {
    let sender = Sender::new(SenderConfig::default()).unwrap();
    sender.stop();
    sender.stop();
    assert_eq!(sender.state(), SenderState::Stopped);
}

#[test]
fn test_generate_sdp_uses_config() {
    let sender = Sender::new(SenderConfig {
        label: "Main".to_string(),
        ..Default::default()
    })
    .unwrap();
    sender.set_origin_address("192.168.1.10");

    let sdp = sender.generate_sdp();
    assert!(sdp.contains("s=Main\r\n"));
    assert!(sdp.contains("c=IN IP4 239.69.1.1/32\r\n"));
    assert!(sdp.contains(&format!(
        "o=- {id} {id} IN IP4 192.168.1.10\r\n",
        id = sender.session_id()
    )));
}

#[test]
fn test_capture_to_wire_pipeline() {
    let receiver =
        ReceiverTransport::bind(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::UNSPECIFIED).unwrap();
    let port = receiver.local_port().unwrap();

    let sender = Sender::new(loopback_config(port)).unwrap();
    let source = ManualSource::new(AudioFormat::new(48_000, 2, 24));
    let handle = source.handle();
    sender.set_audio_source(Box::new(source));

    sender.start().unwrap();
    assert!(sender.is_running());
    assert!(sender.is_healthy());

    // Three packets' worth of capture data.
    handle.deliver(&vec![0u8; 288 * 3], Some(1_000_000_000));

    let stats = sender.statistics();
    assert_eq!(stats.packets_sent, 3);
    assert_eq!(stats.bytes_sent, 300 * 3);
    assert!(stats.last_send.is_some());

    sender.stop();
    assert_eq!(sender.state(), SenderState::Stopped);

    // Delivery after stop is ignored.
    handle.deliver(&vec![0u8; 288], None);
    assert_eq!(sender.statistics().packets_sent, 3);
}

#[test]
fn test_emitted_packets_are_contiguous() {
    let receiver =
        ReceiverTransport::bind(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::UNSPECIFIED).unwrap();
    let port = receiver.local_port().unwrap();

    let sender = Sender::new(loopback_config(port)).unwrap();
    let source = ManualSource::new(AudioFormat::new(48_000, 2, 24));
    let handle = source.handle();
    sender.set_audio_source(Box::new(source));
    sender.start().unwrap();

    handle.deliver(&vec![0u8; 288 * 5], Some(1_000_000_000));

    let mut buf = [0u8; 2048];
    let mut headers = Vec::new();
    for _ in 0..50 {
        if headers.len() == 5 {
            break;
        }
        if let Some(n) = receiver.recv(&mut buf).unwrap() {
            headers.push(RtpHeader::decode(&buf[..n]).unwrap());
        }
    }

    assert_eq!(headers.len(), 5);
    let ssrc = sender.ssrc().unwrap();
    for pair in headers.windows(2) {
        assert_eq!(pair[1].sequence, pair[0].sequence.wrapping_add(1));
        assert_eq!(pair[1].timestamp, pair[0].timestamp.wrapping_add(48));
    }
    assert!(headers.iter().all(|h| h.ssrc == ssrc));
    assert!(headers.iter().all(|h| h.payload_type == 97));

    sender.stop();
}

#[test]
fn test_little_endian_source_is_converted() {
    let receiver =
        ReceiverTransport::bind(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::UNSPECIFIED).unwrap();
    let port = receiver.local_port().unwrap();

    let mut config = loopback_config(port);
    config.bit_depth = 16;
    let sender = Sender::new(config).unwrap();

    let source = ManualSource::little_endian(AudioFormat::new(48_000, 2, 16));
    let handle = source.handle();
    sender.set_audio_source(Box::new(source));
    sender.start().unwrap();

    // One packet of identical samples: 0x0102 little-endian.
    let frame = [0x02u8, 0x01, 0x02, 0x01];
    let pcm: Vec<u8> = frame.iter().copied().cycle().take(48 * 4).collect();
    handle.deliver(&pcm, None);

    let mut buf = [0u8; 2048];
    let mut payload = None;
    for _ in 0..50 {
        if let Some(n) = receiver.recv(&mut buf).unwrap() {
            payload = Some(buf[RtpHeader::SIZE..n].to_vec());
            break;
        }
    }

    // On the wire: network order, 0x01 0x02.
    let payload = payload.unwrap();
    assert_eq!(payload.len(), 48 * 4);
    assert!(payload.chunks(2).all(|c| c == [0x01, 0x02]));

    sender.stop();
}
