//! AES67 receiver session manager
//!
//! Owns the wire-to-playback pipeline: a receive thread ingests multicast
//! UDP and feeds the jitter buffer, a playout thread drains it to the
//! audio sink at the clock-aligned cadence. The two threads share only the
//! jitter buffer and the payload pool, each behind its own mutex with
//! copies kept outside the critical sections.

mod jitter_buffer;
mod pool;

#[cfg(test)]
mod tests;

pub use jitter_buffer::{
    DropReason, InsertOutcome, JitterBuffer, JitterBufferConfig, JitterBufferStats, JitterEntry,
};
pub use pool::PayloadPool;

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::AudioSink;
use crate::clock::PtpClock;
use crate::error::{Aes67Error, Result};
use crate::net::ReceiverTransport;
use crate::protocol::rtp::Depacketizer;
use crate::protocol::sdp::{self, SdpInfo};
use crate::state::{ReceiverState, ReceiverStateCallback};
use crate::stats::BitrateMeter;
use crate::types::{AudioFormat, AudioProcessingConfig, ReceiverConfig};

/// A running receiver is unhealthy after this long without a packet
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between stop and start during recovery
const RECOVER_DELAY: Duration = Duration::from_millis(100);

/// Sleep while the jitter buffer has nothing due
const PLAYOUT_IDLE: Duration = Duration::from_micros(500);

/// Receive scratch buffer, large enough for any UDP datagram
const RECV_BUF_BYTES: usize = 65536;

/// Extra pool slots beyond `max_packets` for buffers in flight between
/// pop and return
const POOL_HEADROOM: usize = 8;

/// Point-in-time view of a receiver's counters
#[derive(Debug, Clone)]
pub struct ReceiverStatistics {
    /// RTP packets accepted by the parser
    pub packets_received: u64,
    /// Packets lost, by sequence gap
    pub packets_lost: u64,
    /// Packets that arrived after a later sequence
    pub packets_out_of_order: u64,
    /// Packets handed to the audio sink
    pub packets_delivered: u64,
    /// Packets rejected as duplicate or too late, plus evictions
    pub packets_dropped: u64,
    /// Packets currently queued in the jitter buffer
    pub packets_buffered: usize,
    /// Wire bytes received
    pub bytes_received: u64,
    /// Datagrams rejected by the parser
    pub malformed: u64,
    /// Oldest entries evicted because the buffer was full
    pub overruns: u64,
    /// RFC 3550 interarrival jitter estimate in milliseconds
    pub jitter_ms: f64,
    /// Jitter buffer fill level in `[0, 1]`
    pub buffer_level: f64,
    /// Age of the head-of-queue packet in milliseconds
    pub latency_ms: f64,
    /// Receive bitrate, EMA over one-second windows, in kbit/s
    pub bitrate_kbps: f64,
    /// Whether the attached PTP clock is slaved to a master
    pub ptp_synchronized: bool,
    /// When the last packet arrived
    pub last_receive: Option<Instant>,
}

#[derive(Default)]
struct DepacketizerMirror {
    lost: u64,
    out_of_order: u64,
    malformed: u64,
    packets: u64,
    jitter_ms: f64,
}

struct ReceiverStats {
    bytes_received: AtomicU64,
    packets_delivered: AtomicU64,
    /// Nanoseconds since `epoch`; zero means never
    last_receive_ns: AtomicU64,
    depacketizer: Mutex<DepacketizerMirror>,
    bitrate: Mutex<BitrateMeter>,
}

struct Session {
    info: SdpInfo,
    transport: ReceiverTransport,
}

struct ReceiverInner {
    config: ReceiverConfig,
    audio_config: AudioProcessingConfig,
    state: Mutex<ReceiverState>,
    state_callback: Mutex<Option<ReceiverStateCallback>>,
    running: AtomicBool,
    session: Mutex<Option<Session>>,
    jitter: Mutex<JitterBuffer>,
    pool: Mutex<PayloadPool>,
    sink: Mutex<Option<Box<dyn AudioSink>>>,
    clock: Mutex<Option<Arc<PtpClock>>>,
    stats: ReceiverStats,
    epoch: Instant,
}

impl ReceiverInner {
    fn set_state(&self, new: ReceiverState) {
        {
            let mut state = self.state.lock();
            if *state == new {
                return;
            }
            *state = new;
        }
        if let Some(callback) = self.state_callback.lock().as_ref() {
            callback(new);
        }
    }

    fn mark_receive(&self, now: Instant) {
        let ns = now.duration_since(self.epoch).as_nanos() as u64;
        self.stats
            .last_receive_ns
            .store(ns.max(1), Ordering::Release);
    }

    fn last_receive(&self) -> Option<Instant> {
        match self.stats.last_receive_ns.load(Ordering::Acquire) {
            0 => None,
            ns => Some(self.epoch + Duration::from_nanos(ns)),
        }
    }
}

/// AES67 receiver: ingests multicast RTP, reorders, plays out
pub struct Receiver {
    inner: Arc<ReceiverInner>,
    receive_thread: Option<thread::JoinHandle<()>>,
    playout_thread: Option<thread::JoinHandle<()>>,
}

impl Receiver {
    /// Create a receiver with default audio processing
    #[must_use]
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_audio_config(config, AudioProcessingConfig::default())
    }

    /// Create a receiver with explicit audio processing parameters
    ///
    /// The jitter buffer delays map from the audio configuration the way
    /// the playout chain expects: target from `jitter_buffer_ms`, floor
    /// from `buffer_ms`, ceiling at five times the target.
    #[must_use]
    pub fn with_audio_config(config: ReceiverConfig, audio_config: AudioProcessingConfig) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jitter_config = JitterBufferConfig {
            target_delay_ms: audio_config.jitter_buffer_ms.max(0.0) as u32,
            min_delay_ms: audio_config.buffer_ms.max(0.0) as u32,
            max_delay_ms: (audio_config.jitter_buffer_ms.max(0.0) * 5.0) as u32,
            max_packets: audio_config.max_packets,
        };

        let epoch = Instant::now();
        Self {
            inner: Arc::new(ReceiverInner {
                config,
                audio_config,
                state: Mutex::new(ReceiverState::Stopped),
                state_callback: Mutex::new(None),
                running: AtomicBool::new(false),
                session: Mutex::new(None),
                jitter: Mutex::new(JitterBuffer::new(jitter_config)),
                pool: Mutex::new(PayloadPool::new(0, 0)),
                sink: Mutex::new(None),
                clock: Mutex::new(None),
                stats: ReceiverStats {
                    bytes_received: AtomicU64::new(0),
                    packets_delivered: AtomicU64::new(0),
                    last_receive_ns: AtomicU64::new(0),
                    depacketizer: Mutex::new(DepacketizerMirror::default()),
                    bitrate: Mutex::new(BitrateMeter::new(epoch)),
                },
                epoch,
            }),
            receive_thread: None,
            playout_thread: None,
        }
    }

    /// Attach the playback sink
    pub fn set_audio_sink(&self, sink: Box<dyn AudioSink>) {
        *self.inner.sink.lock() = Some(sink);
    }

    /// Attach the PTP clock, reported through statistics
    pub fn set_ptp_clock(&self, clock: Arc<PtpClock>) {
        *self.inner.clock.lock() = Some(clock);
    }

    /// Register a callback for lifecycle transitions
    pub fn set_state_callback<F>(&self, callback: F)
    where
        F: Fn(ReceiverState) + Send + Sync + 'static,
    {
        *self.inner.state_callback.lock() = Some(Box::new(callback));
    }

    /// Validate the configuration ahead of the first connect
    ///
    /// Idempotent; `connect` runs it implicitly.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` when the audio processing parameters are
    /// unusable.
    pub fn initialize(&self) -> Result<()> {
        if self.inner.audio_config.max_packets == 0 {
            return Err(Aes67Error::ConfigInvalid {
                name: "max_packets".to_string(),
                message: "jitter buffer needs at least one slot".to_string(),
            });
        }
        if self.inner.config.sample_rates.is_empty() || self.inner.config.bit_depths.is_empty() {
            return Err(Aes67Error::ConfigInvalid {
                name: "formats".to_string(),
                message: "receiver accepts no formats".to_string(),
            });
        }
        Ok(())
    }

    /// Connect from an SDP transport file
    ///
    /// # Errors
    ///
    /// Returns `ParseFailed` for unusable SDP, `FormatMismatch` when the
    /// described stream is outside the AES67 profile or this receiver's
    /// capabilities, `BindFailed` when the socket cannot be opened.
    pub fn connect_sdp(&self, sdp_text: &str) -> Result<()> {
        let info = sdp::parse(sdp_text);
        if !info.is_valid {
            return Err(Aes67Error::ParseFailed {
                message: "SDP lacks connection or format information".to_string(),
            });
        }
        if !info.is_aes67() {
            return Err(Aes67Error::FormatMismatch {
                message: format!(
                    "{} {} is outside the AES67 profile",
                    info.encoding, info.format
                ),
            });
        }
        if !self.inner.config.supports(info.format) {
            return Err(Aes67Error::FormatMismatch {
                message: format!(
                    "receiver {} does not support {}",
                    self.inner.config.id, info.format
                ),
            });
        }
        self.connect_session(info)
    }

    /// Connect from explicit transport parameters
    ///
    /// # Errors
    ///
    /// Returns `ParseFailed` for a bad address, `FormatMismatch` for an
    /// invalid format, `BindFailed` when the socket cannot be opened.
    pub fn connect_to(&self, source_ip: &str, port: u16, format: AudioFormat) -> Result<()> {
        if !format.is_valid() {
            return Err(Aes67Error::FormatMismatch {
                message: format!("{format} is not a valid stream format"),
            });
        }
        let info = SdpInfo {
            source_ip: source_ip.to_string(),
            port,
            format,
            encoding: format.encoding_name().unwrap_or_default().to_string(),
            is_valid: true,
            ..SdpInfo::default()
        };
        self.connect_session(info)
    }

    fn connect_session(&self, info: SdpInfo) -> Result<()> {
        self.initialize()?;
        if *self.inner.state.lock() == ReceiverState::Receiving {
            return Err(Aes67Error::InvalidState {
                message: "disconnect before connecting to a new stream".to_string(),
                current_state: ReceiverState::Receiving.to_string(),
            });
        }

        let ip: Ipv4Addr = info
            .source_ip
            .parse()
            .map_err(|_| Aes67Error::ParseFailed {
                message: format!("'{}' is not an IPv4 address", info.source_ip),
            })?;

        let transport = ReceiverTransport::bind(ip, info.port, Ipv4Addr::UNSPECIFIED)?;

        // Size the payload arena for the largest packet this stream can
        // legally carry (4 ms), so the receive path never allocates.
        let format = info.format;
        let max_payload = (format.sample_rate as usize * 4 / 1000 + 1) * format.bytes_per_frame();
        let max_packets = self.inner.audio_config.max_packets;
        *self.inner.pool.lock() = PayloadPool::new(max_packets + POOL_HEADROOM, max_payload);
        self.inner.jitter.lock().reset();

        info!(
            "receiver {} connected to {}:{} ({})",
            self.inner.config.id, info.source_ip, info.port, format
        );
        *self.inner.session.lock() = Some(Session { info, transport });
        self.inner.set_state(ReceiverState::Listening);
        Ok(())
    }

    /// Spawn the receive and playout threads
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` before `connect`, `AudioDevice` when the
    /// sink cannot start; failures leave the receiver in the Error state.
    pub fn start(&mut self) -> Result<()> {
        if *self.inner.state.lock() == ReceiverState::Receiving {
            return Ok(());
        }

        let result = self.start_inner();
        if result.is_err() {
            self.inner.set_state(ReceiverState::Error);
        }
        result
    }

    fn start_inner(&mut self) -> Result<()> {
        self.inner.set_state(ReceiverState::Initializing);

        let (transport, format) = {
            let session = self.inner.session.lock();
            let Some(session) = session.as_ref() else {
                return Err(Aes67Error::NotConnected);
            };
            (session.transport.try_clone()?, session.info.format)
        };

        {
            let mut sink = self.inner.sink.lock();
            if let Some(sink) = sink.as_mut() {
                sink.open(&self.inner.config.sink_device, format)?;
                sink.start()?;
            }
        }

        self.inner.running.store(true, Ordering::Release);
        self.inner.mark_receive(Instant::now());

        let inner = Arc::clone(&self.inner);
        self.receive_thread = Some(
            thread::Builder::new()
                .name(format!("aes67-rx-{}", self.inner.config.id))
                .spawn(move || run_receive_loop(&inner, &transport, format))
                .map_err(Aes67Error::Network)?,
        );

        let inner = Arc::clone(&self.inner);
        self.playout_thread = Some(
            thread::Builder::new()
                .name(format!("aes67-play-{}", self.inner.config.id))
                .spawn(move || run_playout_loop(&inner))
                .map_err(Aes67Error::Network)?,
        );

        self.inner.set_state(ReceiverState::Receiving);
        info!("receiver {} started", self.inner.config.id);
        Ok(())
    }

    /// Stop the threads and flush the jitter buffer
    ///
    /// The socket stays open; the receiver returns to Listening.
    pub fn stop(&mut self) {
        if *self.inner.state.lock() != ReceiverState::Receiving {
            return;
        }

        self.inner.running.store(false, Ordering::Release);
        if let Some(handle) = self.receive_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.playout_thread.take() {
            let _ = handle.join();
        }

        if let Some(sink) = self.inner.sink.lock().as_mut() {
            sink.stop();
        }

        // Return queued payloads to the arena before clearing.
        {
            let mut jitter = self.inner.jitter.lock();
            let mut pool = self.inner.pool.lock();
            for payload in jitter.drain_payloads() {
                pool.put(payload);
            }
            jitter.reset();
        }

        self.inner.set_state(ReceiverState::Listening);
        info!("receiver {} stopped", self.inner.config.id);
    }

    /// Close the socket and return to Stopped
    ///
    /// A no-op on a disconnected receiver.
    pub fn disconnect(&mut self) {
        self.stop();
        let had_session = self.inner.session.lock().take().is_some();
        if had_session {
            if let Some(sink) = self.inner.sink.lock().as_mut() {
                sink.close();
            }
            info!("receiver {} disconnected", self.inner.config.id);
        }
        self.inner.set_state(ReceiverState::Stopped);
    }

    /// Stop, pause briefly, start again
    ///
    /// # Errors
    ///
    /// Propagates the start failure when recovery does not succeed.
    pub fn recover(&mut self) -> Result<()> {
        info!("attempting to recover receiver {}", self.inner.config.id);
        self.stop();
        thread::sleep(RECOVER_DELAY);
        self.start()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ReceiverState {
        *self.inner.state.lock()
    }

    /// Whether the playout pipeline is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ReceiverState::Receiving
    }

    /// Whether a session is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    /// True while packets flow at a healthy rate
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if self.state() != ReceiverState::Receiving {
            return true;
        }
        self.inner
            .last_receive()
            .is_some_and(|t| t.elapsed() <= HEALTH_TIMEOUT)
    }

    /// Receiver identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    /// The receiver's configuration
    #[must_use]
    pub fn config(&self) -> &ReceiverConfig {
        &self.inner.config
    }

    /// Parsed session description of the current connection
    #[must_use]
    pub fn sdp_info(&self) -> Option<SdpInfo> {
        self.inner.session.lock().as_ref().map(|s| s.info.clone())
    }

    /// Point-in-time counters
    #[must_use]
    pub fn statistics(&self) -> ReceiverStatistics {
        let now = Instant::now();
        let (buffer_level, latency_ms, buffered, jitter_stats) = {
            let jitter = self.inner.jitter.lock();
            (
                jitter.level(),
                jitter.latency_ms(now),
                jitter.len(),
                jitter.stats().clone(),
            )
        };
        let mirror = self.inner.stats.depacketizer.lock();
        let ptp_synchronized = self
            .inner
            .clock
            .lock()
            .as_ref()
            .is_some_and(|c| c.is_synchronized());

        ReceiverStatistics {
            packets_received: mirror.packets,
            packets_lost: mirror.lost,
            packets_out_of_order: mirror.out_of_order,
            packets_delivered: self.inner.stats.packets_delivered.load(Ordering::Relaxed),
            packets_dropped: jitter_stats.duplicates + jitter_stats.dropped + jitter_stats.overruns,
            packets_buffered: buffered,
            bytes_received: self.inner.stats.bytes_received.load(Ordering::Relaxed),
            malformed: mirror.malformed,
            overruns: jitter_stats.overruns,
            jitter_ms: mirror.jitter_ms,
            buffer_level,
            latency_ms,
            bitrate_kbps: self.inner.stats.bitrate.lock().kbps(),
            ptp_synchronized,
            last_receive: self.inner.last_receive(),
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Receive I/O loop: socket to jitter buffer
fn run_receive_loop(inner: &ReceiverInner, transport: &ReceiverTransport, format: AudioFormat) {
    let mut depacketizer = Depacketizer::new(format);
    let mut buf = vec![0u8; RECV_BUF_BYTES];

    while inner.running.load(Ordering::Acquire) {
        match transport.recv(&mut buf) {
            Ok(Some(len)) => {
                let arrival = Instant::now();
                inner
                    .stats
                    .bytes_received
                    .fetch_add(len as u64, Ordering::Relaxed);
                inner.stats.bitrate.lock().record(len, arrival);
                inner.mark_receive(arrival);

                match depacketizer.parse_at(&buf[..len], arrival) {
                    Ok(packet) => {
                        // Copy outside the jitter lock, into an arena slot.
                        let mut payload = inner.pool.lock().take();
                        payload.extend_from_slice(packet.payload);

                        let outcome = inner.jitter.lock().insert(
                            payload,
                            packet.sequence,
                            packet.timestamp,
                            arrival,
                        );
                        match outcome {
                            InsertOutcome::Accepted => {}
                            InsertOutcome::Duplicate(buffer)
                            | InsertOutcome::Dropped(_, buffer) => {
                                inner.pool.lock().put(buffer);
                            }
                        }
                    }
                    Err(e) => {
                        // Counted, never surfaced.
                        debug!("malformed packet dropped: {e}");
                    }
                }

                let stats = depacketizer.stats();
                let mut mirror = inner.stats.depacketizer.lock();
                mirror.lost = stats.lost;
                mirror.out_of_order = stats.out_of_order;
                mirror.malformed = stats.malformed;
                mirror.packets = stats.packets;
                mirror.jitter_ms = stats.jitter_ms;
            }
            Ok(None) => {} // poll timeout, re-check the stop flag
            Err(e) => {
                warn!("receive socket error: {e}");
                break;
            }
        }
    }
    debug!("receive loop exited");
}

/// Playout loop: jitter buffer to sink
fn run_playout_loop(inner: &ReceiverInner) {
    while inner.running.load(Ordering::Acquire) {
        let entry = inner.jitter.lock().pop(Instant::now());

        match entry {
            Some(entry) => {
                {
                    let mut sink = inner.sink.lock();
                    if let Some(sink) = sink.as_mut() {
                        let mut written = 0;
                        while written < entry.payload.len() {
                            let n = sink.write(&entry.payload[written..]);
                            if n == 0 {
                                break;
                            }
                            written += n;
                        }
                    }
                }
                inner
                    .stats
                    .packets_delivered
                    .fetch_add(1, Ordering::Relaxed);
                inner.pool.lock().put(entry.payload);
            }
            None => thread::sleep(PLAYOUT_IDLE),
        }
    }
    debug!("playout loop exited");
}
