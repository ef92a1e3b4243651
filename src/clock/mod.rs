//! PTP time source for RTP timestamping and playout scheduling
//!
//! The clock is a thin adapter over an external IEEE-1588 daemon: a
//! [`PtpSource`] supplies `{offset, path delay, state}` samples, a monitor
//! thread polls it every 100 ms, and readers obtain PTP-aligned nanoseconds
//! by subtracting the offset from the system wall clock. Without a source
//! the clock free-runs: absolute timestamps are not aligned across nodes,
//! but per-stream cadence is preserved.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info};


/// Monitor poll interval
const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Convert a PTP time in nanoseconds to a 32-bit RTP timestamp at `rate`
///
/// This is the formula both ends of an AES67 link must agree on:
/// `floor(ptp_ns * rate / 1e9) mod 2^32`. The product exceeds 64 bits for
/// epoch-scale nanosecond values, so it is taken at 128 bits.
#[must_use]
pub fn ptp_to_rtp_timestamp(ptp_ns: u64, sample_rate: u32) -> u32 {
    let ticks = u128::from(ptp_ns) * u128::from(sample_rate) / 1_000_000_000;
    #[allow(clippy::cast_possible_truncation)]
    {
        ticks as u32
    }
}

/// PTP port state as reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PtpState {
    /// Starting up
    Initializing = 0,
    /// Listening for announce messages
    Listening = 1,
    /// Master found but offset not yet stable
    Uncalibrated = 2,
    /// Synchronized to a master
    Slave = 3,
    /// Not the active port on this path
    Passive = 4,
    /// Fault detected
    Faulty = 5,
}

impl PtpState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Listening,
            2 => Self::Uncalibrated,
            3 => Self::Slave,
            4 => Self::Passive,
            5 => Self::Faulty,
            _ => Self::Initializing,
        }
    }

    /// Stable textual name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Listening => "Listening",
            Self::Uncalibrated => "Uncalibrated",
            Self::Slave => "Slave",
            Self::Passive => "Passive",
            Self::Faulty => "Faulty",
        }
    }
}

impl std::fmt::Display for PtpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status sample from the external PTP daemon
#[derive(Debug, Clone, Copy)]
pub struct PtpSample {
    /// Offset from the grandmaster in nanoseconds (local - master)
    pub offset_ns: i64,
    /// Mean network path delay in nanoseconds
    pub path_delay_ns: i64,
    /// Port state
    pub state: PtpState,
}

/// Adapter over an external PTP daemon
///
/// Implementations read the daemon's management interface (e.g. linuxptp's
/// `pmc` socket) and return the latest sample, or `None` when the daemon is
/// unreachable.
pub trait PtpSource: Send {
    /// Read the current daemon status
    fn sample(&mut self) -> Option<PtpSample>;
}

/// Snapshot of the clock's synchronization status
#[derive(Debug, Clone, Copy)]
pub struct PtpClockInfo {
    /// Offset from the grandmaster in nanoseconds
    pub offset_from_master_ns: i64,
    /// Mean path delay in nanoseconds
    pub path_delay_ns: i64,
    /// Current port state
    pub state: PtpState,
    /// Whether the clock is slaved to a master
    pub synchronized: bool,
}

type StateListener = Box<dyn Fn(PtpState) + Send + Sync>;

struct ClockShared {
    offset_ns: AtomicI64,
    path_delay_ns: AtomicI64,
    state: AtomicU8,
    listeners: Mutex<Vec<StateListener>>,
}

impl ClockShared {
    fn set_state(&self, new: PtpState) {
        let old = PtpState::from_u8(self.state.swap(new as u8, Ordering::Release));
        if old != new {
            info!("PTP state changed: {old} -> {new}");
            for listener in self.listeners.lock().iter() {
                listener(new);
            }
        }
    }
}

/// PTP-calibrated nanosecond time source
///
/// Cheap to share: readers go through atomics, only the monitor thread
/// writes. Construction never fails; an unknown interface or a missing
/// daemon leaves the clock Uncalibrated and free-running.
pub struct PtpClock {
    interface: String,
    domain: u8,
    shared: Arc<ClockShared>,
    running: Arc<AtomicBool>,
    monitor: Option<thread::JoinHandle<()>>,
}

impl PtpClock {
    /// Create a clock for the given network interface and PTP domain
    #[must_use]
    pub fn new(interface: &str, domain: u8) -> Self {
        Self {
            interface: interface.to_string(),
            domain,
            shared: Arc::new(ClockShared {
                offset_ns: AtomicI64::new(0),
                path_delay_ns: AtomicI64::new(0),
                state: AtomicU8::new(PtpState::Initializing as u8),
                listeners: Mutex::new(Vec::new()),
            }),
            running: Arc::new(AtomicBool::new(false)),
            monitor: None,
        }
    }

    /// Start monitoring a daemon source
    ///
    /// With `None` the clock immediately enters Uncalibrated with zero
    /// offset and no thread is spawned.
    pub fn start(&mut self, source: Option<Box<dyn PtpSource>>) {
        let Some(mut source) = source else {
            debug!(
                "no PTP source on {} domain {}, free-running",
                self.interface, self.domain
            );
            self.shared.set_state(PtpState::Uncalibrated);
            return;
        };

        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.set_state(PtpState::Listening);
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);

        self.monitor = Some(thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                match source.sample() {
                    Some(sample) => {
                        shared.offset_ns.store(sample.offset_ns, Ordering::Release);
                        shared
                            .path_delay_ns
                            .store(sample.path_delay_ns, Ordering::Release);
                        shared.set_state(sample.state);
                    }
                    None => {
                        // Daemon unreachable: fall back to free-running.
                        shared.offset_ns.store(0, Ordering::Release);
                        shared.set_state(PtpState::Uncalibrated);
                    }
                }
                thread::sleep(MONITOR_INTERVAL);
            }
        }));
        info!(
            "PTP monitor started on {} domain {}",
            self.interface, self.domain
        );
    }

    /// Stop the monitor thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }

    /// PTP-aligned time in nanoseconds since the Unix epoch
    ///
    /// When unsynchronized the offset is zero and this is plain wall time.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let offset = self.shared.offset_ns.load(Ordering::Acquire);
        let ns = i128::from(wall.as_nanos() as u64) - i128::from(offset);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            ns.max(0) as u64
        }
    }

    /// RTP timestamp for the current PTP time at `sample_rate`
    #[must_use]
    pub fn rtp_timestamp(&self, sample_rate: u32) -> u32 {
        ptp_to_rtp_timestamp(self.now_ns(), sample_rate)
    }

    /// Current port state
    #[must_use]
    pub fn state(&self) -> PtpState {
        PtpState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Offset from the grandmaster in nanoseconds
    #[must_use]
    pub fn offset_from_master_ns(&self) -> i64 {
        self.shared.offset_ns.load(Ordering::Acquire)
    }

    /// Whether the clock is slaved to a PTP master
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.state() == PtpState::Slave
    }

    /// Snapshot of the synchronization status
    #[must_use]
    pub fn clock_info(&self) -> PtpClockInfo {
        PtpClockInfo {
            offset_from_master_ns: self.offset_from_master_ns(),
            path_delay_ns: self.shared.path_delay_ns.load(Ordering::Acquire),
            state: self.state(),
            synchronized: self.is_synchronized(),
        }
    }

    /// Register a callback for state transitions
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(PtpState) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().push(Box::new(listener));
    }

    /// The network interface this clock was configured for
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Drop for PtpClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Steady-clock cache of a PTP instant
///
/// Playout loops query time often; this avoids a wall-clock syscall per
/// query by pinning `(ptp_ns, Instant)` once at calibration and advancing
/// with the monotonic clock from there.
#[derive(Debug, Clone)]
pub struct LocalClock {
    base_ptp_ns: u64,
    base_instant: Instant,
    calibrated: bool,
}

impl LocalClock {
    /// Create an uncalibrated local clock seeded from wall time
    #[must_use]
    pub fn new() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self {
            base_ptp_ns: wall.as_nanos() as u64,
            base_instant: Instant::now(),
            calibrated: false,
        }
    }

    /// Pin this clock to the PTP clock's current time
    ///
    /// A no-op while the PTP clock is unsynchronized.
    pub fn calibrate(&mut self, ptp: &PtpClock) {
        if !ptp.is_synchronized() {
            return;
        }
        self.base_ptp_ns = ptp.now_ns();
        self.base_instant = Instant::now();
        self.calibrated = true;
    }

    /// Whether `calibrate` has succeeded
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// PTP nanoseconds, advanced monotonically since calibration
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.base_ptp_ns + self.base_instant.elapsed().as_nanos() as u64
    }

    /// RTP timestamp for the current time at `sample_rate`
    #[must_use]
    pub fn rtp_timestamp(&self, sample_rate: u32) -> u32 {
        ptp_to_rtp_timestamp(self.now_ns(), sample_rate)
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}
