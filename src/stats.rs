//! Shared statistics helpers

use std::time::{Duration, Instant};

/// Exponential moving average of a stream's bitrate over one-second
/// windows
pub(crate) struct BitrateMeter {
    window_start: Instant,
    window_bytes: u64,
    kbps: f64,
}

impl BitrateMeter {
    const WINDOW: Duration = Duration::from_secs(1);
    const ALPHA: f64 = 0.2;

    pub(crate) fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_bytes: 0,
            kbps: 0.0,
        }
    }

    /// Record a packet and fold completed windows into the average
    pub(crate) fn record(&mut self, bytes: usize, now: Instant) {
        self.window_bytes += bytes as u64;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= Self::WINDOW {
            #[allow(clippy::cast_precision_loss)]
            let instantaneous = (self.window_bytes * 8) as f64 / elapsed.as_secs_f64() / 1000.0;
            self.kbps = if self.kbps == 0.0 {
                instantaneous
            } else {
                (1.0 - Self::ALPHA) * self.kbps + Self::ALPHA * instantaneous
            };
            self.window_start = now;
            self.window_bytes = 0;
        }
    }

    pub(crate) fn kbps(&self) -> f64 {
        self.kbps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_over_one_window() {
        let start = Instant::now();
        let mut meter = BitrateMeter::new(start);

        // 125 packets of 1000 bytes over one second = 1 Mbit/s.
        for i in 0..125 {
            meter.record(1000, start + Duration::from_millis(i * 8));
        }
        meter.record(1000, start + Duration::from_secs(1));

        let kbps = meter.kbps();
        assert!((kbps - 1008.0).abs() < 20.0, "got {kbps}");
    }

    #[test]
    fn test_bitrate_smooths_across_windows() {
        let start = Instant::now();
        let mut meter = BitrateMeter::new(start);

        meter.record(125_000, start + Duration::from_secs(1)); // 1 Mbit/s window
        let first = meter.kbps();
        meter.record(0, start + Duration::from_secs(2)); // silent window
        let second = meter.kbps();

        assert!(first > 900.0);
        // EMA decays instead of dropping to zero.
        assert!(second < first);
        assert!(second > first * 0.5);
    }
}
