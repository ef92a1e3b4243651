//! Adaptive jitter buffer for AES67 receive streams
//!
//! Orders packets by RTP timestamp in a wrap-aware window, bounds memory to
//! a fixed packet count, and gates draining on a target delay so playout
//! runs at a smoothed cadence.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Jitter buffer configuration
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Target playout delay in milliseconds
    pub target_delay_ms: u32,
    /// Floor for the target delay
    pub min_delay_ms: u32,
    /// Upper bound used for sizing diagnostics
    pub max_delay_ms: u32,
    /// Hard cap on buffered packets
    pub max_packets: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            target_delay_ms: 10,
            min_delay_ms: 5,
            max_delay_ms: 50,
            max_packets: 1000,
        }
    }
}

/// Why an insert did not add a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Timestamp is older than audio already handed to the sink
    TooLate,
}

/// Outcome of [`JitterBuffer::insert`]
///
/// Rejections hand the payload buffer back so the caller can return it to
/// its pool.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Packet added in timestamp order
    Accepted,
    /// An entry with this timestamp is already buffered
    Duplicate(Vec<u8>),
    /// Packet rejected
    Dropped(DropReason, Vec<u8>),
}

/// A buffered packet
#[derive(Debug)]
pub struct JitterEntry {
    /// Payload bytes (owned, drawn from the receive pool)
    pub payload: Vec<u8>,
    /// RTP sequence number
    pub sequence: u16,
    /// RTP timestamp
    pub timestamp: u32,
    /// When the packet arrived
    pub arrival: Instant,
}

/// Counters maintained by the buffer
#[derive(Debug, Default, Clone)]
pub struct JitterBufferStats {
    /// Packets accepted
    pub inserted: u64,
    /// Packets handed to playout
    pub popped: u64,
    /// Duplicate timestamps rejected
    pub duplicates: u64,
    /// Packets rejected as too late
    pub dropped: u64,
    /// Oldest entries evicted because the buffer was full
    pub overruns: u64,
}

/// Timestamp-ordered bounded packet queue
///
/// Ordering interprets the difference of two 32-bit timestamps as signed,
/// so entries across a wrap still sort correctly as long as they fall
/// within half the timestamp space of each other.
pub struct JitterBuffer {
    entries: VecDeque<JitterEntry>,
    config: JitterBufferConfig,
    target_delay: Duration,
    last_popped: Option<u32>,
    stats: JitterBufferStats,
}

/// Wrap-aware "a is before b" for RTP timestamps
fn ts_before(a: u32, b: u32) -> bool {
    #[allow(clippy::cast_possible_wrap)]
    {
        (a.wrapping_sub(b) as i32) < 0
    }
}

impl JitterBuffer {
    /// Pressure-release threshold: with this many packets queued the head
    /// is released even before the target delay has elapsed
    const PRESSURE_PACKETS: usize = 3;

    /// Create a buffer with the given configuration
    #[must_use]
    pub fn new(config: JitterBufferConfig) -> Self {
        let target_ms = config.target_delay_ms.max(config.min_delay_ms);
        Self {
            entries: VecDeque::with_capacity(config.max_packets.min(4096)),
            target_delay: Duration::from_millis(u64::from(target_ms)),
            config,
            last_popped: None,
            stats: JitterBufferStats::default(),
        }
    }

    /// Insert a packet in timestamp order
    ///
    /// When the buffer is full the oldest entry is evicted first, counted
    /// as an overrun, so draining stays monotonic.
    pub fn insert(
        &mut self,
        payload: Vec<u8>,
        sequence: u16,
        timestamp: u32,
        arrival: Instant,
    ) -> InsertOutcome {
        if let Some(last) = self.last_popped {
            if !ts_before(last, timestamp) {
                self.stats.dropped += 1;
                return InsertOutcome::Dropped(DropReason::TooLate, payload);
            }
        }

        // Binary search into the ordered entries; equal timestamps are
        // duplicates regardless of sequence.
        let pos = self
            .entries
            .partition_point(|e| ts_before(e.timestamp, timestamp));
        if pos < self.entries.len() && self.entries[pos].timestamp == timestamp {
            self.stats.duplicates += 1;
            return InsertOutcome::Duplicate(payload);
        }

        let mut pos = pos;
        if self.entries.len() >= self.config.max_packets {
            self.entries.pop_front();
            // Everything after the evicted head shifted down by one.
            pos = pos.saturating_sub(1);
            self.stats.overruns += 1;
            tracing::debug!("jitter buffer full, evicted oldest packet");
        }

        self.entries.insert(
            pos,
            JitterEntry {
                payload,
                sequence,
                timestamp,
                arrival,
            },
        );
        self.stats.inserted += 1;
        InsertOutcome::Accepted
    }

    /// Take the head entry if it is due for playout
    ///
    /// The head is due once its arrival is at least the target delay in the
    /// past, or when enough packets are queued that holding them longer
    /// would only grow latency.
    pub fn pop(&mut self, now: Instant) -> Option<JitterEntry> {
        let head = self.entries.front()?;
        let due = now.duration_since(head.arrival) >= self.target_delay
            || self.entries.len() >= Self::PRESSURE_PACKETS;
        if !due {
            return None;
        }

        let entry = self.entries.pop_front()?;
        self.last_popped = Some(entry.timestamp);
        self.stats.popped += 1;
        Some(entry)
    }

    /// Number of buffered packets
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill level in `[0, 1]`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn level(&self) -> f64 {
        if self.config.max_packets == 0 {
            return 0.0;
        }
        self.entries.len() as f64 / self.config.max_packets as f64
    }

    /// Age of the head-of-queue packet in milliseconds
    #[must_use]
    pub fn latency_ms(&self, now: Instant) -> f64 {
        self.entries
            .front()
            .map_or(0.0, |e| now.duration_since(e.arrival).as_secs_f64() * 1000.0)
    }

    /// Buffer counters
    #[must_use]
    pub fn stats(&self) -> &JitterBufferStats {
        &self.stats
    }

    /// Oldest entries evicted because the buffer was full
    #[must_use]
    pub fn overruns(&self) -> u64 {
        self.stats.overruns
    }

    /// Drop all entries and forget the playout position
    pub fn reset(&mut self) {
        self.entries.clear();
        self.last_popped = None;
    }

    /// Drain every entry regardless of delay, returning their payload
    /// buffers for reuse
    pub fn drain_payloads(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.entries.drain(..).map(|e| e.payload)
    }
}
