//! Fixed-size payload buffer pool for the receive hot path
//!
//! The receive loop copies each payload into a pooled buffer before the
//! jitter buffer takes ownership; playout returns the buffer after the
//! sink write. Steady state therefore allocates nothing.

/// Pool of reusable payload buffers
pub struct PayloadPool {
    free: Vec<Vec<u8>>,
    slots: usize,
    slot_bytes: usize,
}

impl PayloadPool {
    /// Preallocate `slots` buffers of `slot_bytes` capacity each
    #[must_use]
    pub fn new(slots: usize, slot_bytes: usize) -> Self {
        Self {
            free: (0..slots).map(|_| Vec::with_capacity(slot_bytes)).collect(),
            slots,
            slot_bytes,
        }
    }

    /// Take an empty buffer
    ///
    /// Falls back to a fresh allocation when the pool is exhausted, which
    /// only happens if more buffers are in flight than the pool was sized
    /// for.
    pub fn take(&mut self) -> Vec<u8> {
        self.free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.slot_bytes))
    }

    /// Return a buffer for reuse
    ///
    /// Buffers beyond the configured slot count are dropped.
    pub fn put(&mut self, mut buffer: Vec<u8>) {
        if self.free.len() < self.slots {
            buffer.clear();
            self.free.push(buffer);
        }
    }

    /// Buffers currently available
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}
