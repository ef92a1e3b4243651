//! AES67 sender session manager
//!
//! Owns the capture-to-wire pipeline: a registered audio source drives the
//! packetizer from its capture thread, each completed packet goes straight
//! to the transport, and lifecycle/statistics are readable from any
//! thread.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{pcm, AudioSource, CaptureBuffer, SampleByteOrder};
use crate::clock::{ptp_to_rtp_timestamp, PtpClock};
use crate::error::{Aes67Error, Result};
use crate::net::{self, SenderTransport};
use crate::protocol::rtp::Packetizer;
use crate::protocol::sdp;
use crate::state::{SenderState, SenderStateCallback};
use crate::stats::BitrateMeter;
use crate::types::{AudioFormat, PacketTime, SenderConfig};

#[cfg(test)]
mod tests;

/// A running sender is unhealthy after this long without a sent packet
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between stop and start during recovery
const RECOVER_DELAY: Duration = Duration::from_millis(100);

/// Point-in-time view of a sender's counters
#[derive(Debug, Clone)]
pub struct SenderStatistics {
    /// RTP packets handed to the socket
    pub packets_sent: u64,
    /// Wire bytes sent
    pub bytes_sent: u64,
    /// Sequence number of the next packet
    pub sequence: u16,
    /// Timestamp of the next packet
    pub timestamp: u32,
    /// Send bitrate, EMA over one-second windows, in kbit/s
    pub bitrate_kbps: f64,
    /// Capture data dropped by the packetizer residual bound
    pub underruns: u64,
    /// Transient send failures, counted and dropped
    pub send_errors: u64,
    /// When the last packet was sent
    pub last_send: Option<Instant>,
}

struct SenderStats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    underruns: AtomicU64,
    send_errors: AtomicU64,
    /// Nanoseconds since `epoch`; zero means never
    last_send_ns: AtomicU64,
    bitrate: Mutex<BitrateMeter>,
}

struct SenderInner {
    config: SenderConfig,
    session_id: u64,
    origin_address: Mutex<String>,
    state: Mutex<SenderState>,
    state_callback: Mutex<Option<SenderStateCallback>>,
    running: AtomicBool,
    packetizer: Mutex<Option<Packetizer>>,
    transport: Mutex<Option<SenderTransport>>,
    clock: Mutex<Option<Arc<PtpClock>>>,
    source: Mutex<Option<Box<dyn AudioSource>>>,
    stats: SenderStats,
    epoch: Instant,
}

impl SenderInner {
    fn set_state(&self, new: SenderState) {
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

    fn mark_send(&self, now: Instant) {
        let ns = now.duration_since(self.epoch).as_nanos() as u64;
        self.stats.last_send_ns.store(ns.max(1), Ordering::Release);
    }

    fn last_send(&self) -> Option<Instant> {
        match self.stats.last_send_ns.load(Ordering::Acquire) {
            0 => None,
            ns => Some(self.epoch + Duration::from_nanos(ns)),
        }
    }
}

/// AES67 sender: captures PCM, packetizes, transmits to multicast
pub struct Sender {
    inner: Arc<SenderInner>,
}

impl Sender {
    /// Create a sender from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` for any field outside the AES67 profile.
    pub fn new(config: SenderConfig) -> Result<Self> {
        config.validate()?;

        // Stable for the life of this instance, used in the SDP origin.
        let session_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros() as u64;

        let epoch = Instant::now();
        Ok(Self {
            inner: Arc::new(SenderInner {
                config,
                session_id,
                origin_address: Mutex::new("0.0.0.0".to_string()),
                state: Mutex::new(SenderState::Stopped),
                state_callback: Mutex::new(None),
                running: AtomicBool::new(false),
                packetizer: Mutex::new(None),
                transport: Mutex::new(None),
                clock: Mutex::new(None),
                source: Mutex::new(None),
                stats: SenderStats {
                    packets_sent: AtomicU64::new(0),
                    bytes_sent: AtomicU64::new(0),
                    underruns: AtomicU64::new(0),
                    send_errors: AtomicU64::new(0),
                    last_send_ns: AtomicU64::new(0),
                    bitrate: Mutex::new(BitrateMeter::new(epoch)),
                },
                epoch,
            }),
        })
    }

    /// Attach the capture source
    ///
    /// Must happen before [`Sender::initialize`]; the source's format has
    /// to match the configured stream format.
    pub fn set_audio_source(&self, source: Box<dyn AudioSource>) {
        *self.inner.source.lock() = Some(source);
    }

    /// Attach the PTP clock used for timestamping
    pub fn set_ptp_clock(&self, clock: Arc<PtpClock>) {
        *self.inner.clock.lock() = Some(clock);
    }

    /// Address written into the SDP origin line
    pub fn set_origin_address(&self, address: &str) {
        *self.inner.origin_address.lock() = address.to_string();
    }

    /// Register a callback for lifecycle transitions
    pub fn set_state_callback<F>(&self, callback: F)
    where
        F: Fn(SenderState) + Send + Sync + 'static,
    {
        *self.inner.state_callback.lock() = Some(Box::new(callback));
    }

    /// Allocate the stream identity and bind the capture callback
    ///
    /// Idempotent once successful.
    ///
    /// # Errors
    ///
    /// Returns `FormatMismatch` when the source's format differs from the
    /// configuration, or `ConfigInvalid` from packetizer construction.
    pub fn initialize(&self) -> Result<()> {
        if self.inner.packetizer.lock().is_some() {
            return Ok(());
        }
        self.inner.set_state(SenderState::Initializing);

        let config = &self.inner.config;
        let format = config.format();
        let packet_time = PacketTime::from_micros(config.packet_time_us)
            .unwrap_or_default();

        let mut source_guard = self.inner.source.lock();
        let byte_order = if let Some(source) = source_guard.as_ref() {
            if source.format() != format {
                self.inner.set_state(SenderState::Stopped);
                return Err(Aes67Error::FormatMismatch {
                    message: format!(
                        "source delivers {}, sender configured for {}",
                        source.format(),
                        format
                    ),
                });
            }
            source.byte_order()
        } else {
            SampleByteOrder::Network
        };

        let packetizer = Packetizer::new(format, packet_time, config.payload_type)?;
        info!(
            "sender {} initialized: {} -> {}:{}, ssrc {:#010x}",
            config.id,
            format,
            config.multicast_ip,
            config.port,
            packetizer.ssrc()
        );
        *self.inner.packetizer.lock() = Some(packetizer);

        if let Some(source) = source_guard.as_mut() {
            source.register(Self::capture_callback(
                Arc::clone(&self.inner),
                format,
                byte_order,
            ));
        }
        drop(source_guard);

        self.inner.set_state(SenderState::Stopped);
        Ok(())
    }

    /// The callback the audio subsystem invokes at capture cadence
    ///
    /// Runs on the capture thread: no allocation after the first buffer,
    /// and the only locks taken are owned by this path in steady state.
    fn capture_callback(
        inner: Arc<SenderInner>,
        format: AudioFormat,
        byte_order: SampleByteOrder,
    ) -> Box<dyn FnMut(CaptureBuffer<'_>) + Send> {
        let mut scratch: Vec<u8> = Vec::new();

        Box::new(move |capture: CaptureBuffer<'_>| {
            if !inner.running.load(Ordering::Acquire) {
                return;
            }

            let data: &[u8] = match byte_order {
                SampleByteOrder::Network => capture.data,
                SampleByteOrder::LittleEndian => {
                    scratch.clear();
                    scratch.extend_from_slice(capture.data);
                    pcm::to_network_order(format.bit_depth, &mut scratch);
                    &scratch
                }
            };

            // Clock query at the packet boundary: the capture instant when
            // the backend stamps one, the shared clock otherwise.
            let clock_ts = capture
                .capture_time_ns
                .map(|ns| ptp_to_rtp_timestamp(ns, format.sample_rate))
                .or_else(|| {
                    inner
                        .clock
                        .lock()
                        .as_ref()
                        .map(|c| c.rtp_timestamp(format.sample_rate))
                });

            let transport_guard = inner.transport.lock();
            let Some(transport) = transport_guard.as_ref() else {
                return;
            };
            let mut packetizer_guard = inner.packetizer.lock();
            let Some(packetizer) = packetizer_guard.as_mut() else {
                return;
            };

            let now = Instant::now();
            packetizer.push(data, clock_ts, |packet| match transport.send(packet) {
                Ok(sent) => {
                    inner.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                    inner
                        .stats
                        .bytes_sent
                        .fetch_add(sent as u64, Ordering::Relaxed);
                    inner.stats.bitrate.lock().record(sent, now);
                    inner.mark_send(now);
                }
                Err(e) if net::is_transient(&e) => {
                    inner.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("transient send error, packet dropped: {e}");
                }
                Err(e) => {
                    inner.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("send failed: {e}");
                }
            });
            inner
                .stats
                .underruns
                .store(packetizer.underruns(), Ordering::Relaxed);
        })
    }

    /// Open the transport and begin emitting
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` or `AudioDevice` on startup failure, leaving
    /// the sender in the Error state.
    pub fn start(&self) -> Result<()> {
        if *self.inner.state.lock() == SenderState::Running {
            return Ok(());
        }
        self.initialize()?;

        let result = self.start_inner();
        if result.is_err() {
            self.inner.set_state(SenderState::Error);
        }
        result
    }

    fn start_inner(&self) -> Result<()> {
        let config = &self.inner.config;
        // Validated in new(); parse cannot fail here.
        let dest: Ipv4Addr = config
            .multicast_ip
            .parse()
            .map_err(|_| Aes67Error::ConfigInvalid {
                name: "multicast_ip".to_string(),
                message: config.multicast_ip.clone(),
            })?;

        let transport = SenderTransport::open(dest, config.port, net::DEFAULT_TTL)?;
        *self.inner.transport.lock() = Some(transport);

        self.inner.running.store(true, Ordering::Release);
        self.inner.mark_send(Instant::now());

        if let Some(source) = self.inner.source.lock().as_mut() {
            source.start().map_err(|e| {
                self.inner.running.store(false, Ordering::Release);
                *self.inner.transport.lock() = None;
                e
            })?;
        }

        self.inner.set_state(SenderState::Running);
        info!("sender {} started", config.id);
        Ok(())
    }

    /// Stop emitting and close the socket
    ///
    /// Idempotent; safe to call in any state.
    pub fn stop(&self) {
        if *self.inner.state.lock() != SenderState::Running {
            return;
        }

        self.inner.running.store(false, Ordering::Release);
        if let Some(source) = self.inner.source.lock().as_mut() {
            source.stop();
        }
        *self.inner.transport.lock() = None;

        self.inner.set_state(SenderState::Stopped);
        info!("sender {} stopped", self.inner.config.id);
    }

    /// Stop, pause briefly, start again
    ///
    /// # Errors
    ///
    /// Propagates the start failure when recovery does not succeed.
    pub fn recover(&self) -> Result<()> {
        info!("attempting to recover sender {}", self.inner.config.id);
        self.stop();
        // Leave the Error state so start() runs again.
        self.inner.set_state(SenderState::Stopped);
        thread::sleep(RECOVER_DELAY);
        self.start()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SenderState {
        *self.inner.state.lock()
    }

    /// Whether the sender is emitting
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SenderState::Running
    }

    /// True while packets flow at a healthy rate
    ///
    /// A sender that is not running is trivially healthy; a running one
    /// must have sent within the last five seconds.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if self.state() != SenderState::Running {
            return true;
        }
        self.inner
            .last_send()
            .is_some_and(|t| t.elapsed() <= HEALTH_TIMEOUT)
    }

    /// Generate the SDP transport file for this stream
    #[must_use]
    pub fn generate_sdp(&self) -> String {
        sdp::generate(
            &self.inner.config,
            self.inner.session_id,
            &self.inner.origin_address.lock(),
        )
    }

    /// Sender identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    /// Stream SSRC, fixed after initialization
    #[must_use]
    pub fn ssrc(&self) -> Option<u32> {
        self.inner.packetizer.lock().as_ref().map(Packetizer::ssrc)
    }

    /// Configured multicast destination address
    #[must_use]
    pub fn multicast_ip(&self) -> &str {
        &self.inner.config.multicast_ip
    }

    /// Configured RTP port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Configured payload type
    #[must_use]
    pub fn payload_type(&self) -> u8 {
        self.inner.config.payload_type
    }

    /// Configured stream format
    #[must_use]
    pub fn format(&self) -> AudioFormat {
        self.inner.config.format()
    }

    /// The sender's configuration
    #[must_use]
    pub fn config(&self) -> &SenderConfig {
        &self.inner.config
    }

    /// Session identifier used in the SDP origin line
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    /// Point-in-time counters
    #[must_use]
    pub fn statistics(&self) -> SenderStatistics {
        let (sequence, timestamp) = self
            .inner
            .packetizer
            .lock()
            .as_ref()
            .map_or((0, 0), |p| (p.sequence(), p.timestamp()));

        SenderStatistics {
            packets_sent: self.inner.stats.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.inner.stats.bytes_sent.load(Ordering::Relaxed),
            sequence,
            timestamp,
            bitrate_kbps: self.inner.stats.bitrate.lock().kbps(),
            underruns: self.inner.stats.underruns.load(Ordering::Relaxed),
            send_errors: self.inner.stats.send_errors.load(Ordering::Relaxed),
            last_send: self.inner.last_send(),
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.stop();
    }
}
