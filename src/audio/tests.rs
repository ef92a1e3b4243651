use super::*;

#[test]
fn test_manual_source_delivers_only_while_running() {
    let format = AudioFormat::new(48_000, 2, 16);
    let mut source = ManualSource::new(format);
    let handle = source.handle();

    let delivered = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&delivered);
    source.register(Box::new(move |buffer| {
        sink.lock().push((buffer.frames, buffer.capture_time_ns));
    }));

    // Stopped: silently ignored.
    handle.deliver(&[0u8; 8], None);
    assert!(delivered.lock().is_empty());
    assert!(!handle.is_running());

    source.start().unwrap();
    handle.deliver(&[0u8; 8], Some(42));
    source.stop();
    handle.deliver(&[0u8; 8], None);

    let seen = delivered.lock();
    assert_eq!(seen.as_slice(), &[(2usize, Some(42u64))]);
}

#[test]
fn test_memory_sink_partial_writes() {
    let mut sink = MemorySink::new();
    sink.max_chunk = 4;
    sink.open("test", AudioFormat::default()).unwrap();
    sink.start().unwrap();

    let payload = [7u8; 10];
    let mut written = 0;
    while written < payload.len() {
        let n = sink.write(&payload[written..]);
        assert!(n > 0);
        written += n;
    }

    assert_eq!(sink.data().lock().len(), 10);
    sink.stop();
    sink.close();
}

#[test]
fn test_memory_sink_rejects_invalid_format() {
    let mut sink = MemorySink::new();
    assert!(sink.open("test", AudioFormat::empty()).is_err());
    assert!(sink.start().is_err());
}

#[test]
fn test_null_sink_accepts_everything() {
    let mut sink = NullSink;
    sink.open("void", AudioFormat::default()).unwrap();
    sink.start().unwrap();
    assert_eq!(sink.write(&[0u8; 1234]), 1234);
}
