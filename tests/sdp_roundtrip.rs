//! SDP emit/parse round-trip across the public API

use aes67::protocol::sdp;
use aes67::SenderConfig;

#[test]
fn emitted_sdp_parses_back_to_the_sender_config() {
    let config = SenderConfig {
        id: "tx0".to_string(),
        label: "Main".to_string(),
        multicast_ip: "239.69.1.1".to_string(),
        port: 5004,
        payload_type: 97,
        sample_rate: 48_000,
        channels: 2,
        bit_depth: 24,
        ..Default::default()
    };

    let sdp_text = sdp::generate(&config, 0x1122_3344_5566, "192.168.1.10");
    let info = sdp::parse(&sdp_text);

    assert!(info.is_valid);
    assert!(info.is_aes67());
    assert_eq!(info.source_ip, "239.69.1.1");
    assert_eq!(info.port, 5004);
    assert_eq!(info.payload_type, 97);
    assert_eq!(info.encoding, "L24");
    assert_eq!(info.format.sample_rate, 48_000);
    assert_eq!(info.format.channels, 2);
    assert_eq!(info.format.bit_depth, 24);
    assert_eq!(info.packet_time_us, 1000);
    assert_eq!(info.origin_address, "192.168.1.10");
    assert_eq!(info.session_name, "Main");
}

#[test]
fn round_trip_preserves_every_profile_combination() {
    for (rate, depth, encoding) in [
        (44_100u32, 16u8, "L16"),
        (48_000, 24, "L24"),
        (96_000, 32, "L32"),
    ] {
        let config = SenderConfig {
            label: "Combi".to_string(),
            sample_rate: rate,
            bit_depth: depth,
            channels: 8,
            ..Default::default()
        };
        let info = sdp::parse(&sdp::generate(&config, 7, "10.0.0.1"));

        assert!(info.is_aes67(), "{rate}/{depth}");
        assert_eq!(info.encoding, encoding);
        assert_eq!(info.format, config.format());
    }
}

#[test]
fn a_sender_publishes_what_a_receiver_accepts() {
    let sender = aes67::Sender::new(SenderConfig {
        id: "tx0".to_string(),
        label: "Desk".to_string(),
        ..Default::default()
    })
    .unwrap();
    sender.set_origin_address("192.168.1.10");

    let info = sdp::parse(&sender.generate_sdp());
    assert!(info.is_aes67());
    assert_eq!(info.session_id, sender.session_id().to_string());
}
