//! Full node loopback: Sender and Receiver wired through real UDP sockets

use std::time::{Duration, Instant};

use aes67::audio::{ManualSource, MemorySink};
use aes67::{
    AudioFormat, AudioProcessingConfig, Receiver, ReceiverConfig, ReceiverState, Sender,
    SenderConfig, SenderState,
};

const PORT: u16 = 46001;

fn stereo24() -> AudioFormat {
    AudioFormat::new(48_000, 2, 24)
}

#[test]
fn sender_to_receiver_over_loopback() {
    // Receiver side first, so no packet is missed.
    let mut receiver = Receiver::with_audio_config(
        ReceiverConfig {
            id: "rx0".to_string(),
            label: "Monitor".to_string(),
            ..Default::default()
        },
        AudioProcessingConfig {
            buffer_ms: 1.0,
            jitter_buffer_ms: 2.0,
            max_packets: 128,
        },
    );
    let sink = MemorySink::new();
    let sink_data = sink.data();
    receiver.set_audio_sink(Box::new(sink));
    receiver.connect_to("127.0.0.1", PORT, stereo24()).unwrap();
    receiver.start().unwrap();

    // Sender pointed at the same loopback port.
    let sender = Sender::new(SenderConfig {
        id: "tx0".to_string(),
        label: "Desk".to_string(),
        multicast_ip: "127.0.0.1".to_string(),
        port: PORT,
        ..Default::default()
    })
    .unwrap();
    let source = ManualSource::new(stereo24());
    let capture = source.handle();
    sender.set_audio_source(Box::new(source));
    sender.start().unwrap();

    // 20 ms of audio in two capture callbacks.
    let pcm: Vec<u8> = (0..480u32 * 6).map(|i| (i % 199) as u8).collect();
    capture.deliver(&pcm, Some(1_000_000_000));
    capture.deliver(&pcm, Some(1_010_000_000));

    assert_eq!(sender.statistics().packets_sent, 20);

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if receiver.statistics().packets_delivered >= 20 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = receiver.statistics();
    assert_eq!(stats.packets_received, 20);
    assert_eq!(stats.packets_delivered, 20);
    assert_eq!(stats.packets_lost, 0);
    assert_eq!(stats.packets_out_of_order, 0);
    assert!(!stats.ptp_synchronized); // no clock attached

    // Payload bytes arrive bit-exact and in order.
    let received = sink_data.lock().clone();
    let mut expected = pcm.clone();
    expected.extend_from_slice(&pcm);
    assert_eq!(received, expected);

    sender.stop();
    receiver.disconnect();
    assert_eq!(sender.state(), SenderState::Stopped);
    assert_eq!(receiver.state(), ReceiverState::Stopped);
}

#[test]
fn lifecycle_is_idempotent_and_recoverable() {
    let mut receiver = Receiver::new(ReceiverConfig {
        id: "rx1".to_string(),
        ..Default::default()
    });

    // disconnect() on a disconnected receiver is a no-op.
    receiver.disconnect();
    receiver.disconnect();
    assert_eq!(receiver.state(), ReceiverState::Stopped);

    receiver.connect_to("127.0.0.1", PORT + 10, stereo24()).unwrap();
    receiver.start().unwrap();
    receiver.recover().unwrap();
    assert_eq!(receiver.state(), ReceiverState::Receiving);
    receiver.disconnect();

    let sender = Sender::new(SenderConfig {
        id: "tx1".to_string(),
        multicast_ip: "127.0.0.1".to_string(),
        port: PORT + 10,
        ..Default::default()
    })
    .unwrap();
    sender.start().unwrap();
    // stop() twice is safe.
    sender.stop();
    sender.stop();
    assert_eq!(sender.state(), SenderState::Stopped);

    sender.recover().unwrap();
    assert_eq!(sender.state(), SenderState::Running);
    sender.stop();
}
