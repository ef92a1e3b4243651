//! Audio device boundary: capture sources and playback sinks
//!
//! Device backends (PipeWire, ALSA, ...) live outside the core; these
//! traits are the contract they implement. The in-memory implementations
//! here exist for tests and demos.

pub mod pcm;

#[cfg(test)]
mod tests;

use crate::error::{Aes67Error, Result};
use crate::types::AudioFormat;

/// Byte order of samples a capture source delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleByteOrder {
    /// Big-endian, as the wire wants it
    #[default]
    Network,
    /// Host little-endian; the sender converts per sample
    LittleEndian,
}

/// One capture callback's worth of audio
#[derive(Debug, Clone, Copy)]
pub struct CaptureBuffer<'a> {
    /// Interleaved PCM bytes
    pub data: &'a [u8],
    /// Number of frames in `data`
    pub frames: usize,
    /// Capture instant in PTP nanoseconds, when the backend knows it
    pub capture_time_ns: Option<u64>,
}

/// Callback invoked at capture cadence, on the audio subsystem's thread
pub type CaptureCallback = Box<dyn FnMut(CaptureBuffer<'_>) + Send>;

/// A capture device delivering PCM at its own cadence
pub trait AudioSource: Send {
    /// The format this source captures in
    fn format(&self) -> AudioFormat;

    /// Byte order of the delivered samples
    fn byte_order(&self) -> SampleByteOrder {
        SampleByteOrder::Network
    }

    /// Register the single consumer callback
    fn register(&mut self, callback: CaptureCallback);

    /// Start delivering capture callbacks
    ///
    /// # Errors
    ///
    /// Returns `AudioDevice` if the backend cannot start.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering capture callbacks
    fn stop(&mut self);
}

/// A playback device consuming PCM
///
/// `write` may accept fewer bytes than offered; callers loop. The sink
/// need not be clock-aligned, the jitter buffer compensates.
pub trait AudioSink: Send {
    /// Open the named device for the given format
    ///
    /// # Errors
    ///
    /// Returns `AudioDevice` if the device cannot be opened in `format`.
    fn open(&mut self, device: &str, format: AudioFormat) -> Result<()>;

    /// Begin playback
    ///
    /// # Errors
    ///
    /// Returns `AudioDevice` if the device cannot start.
    fn start(&mut self) -> Result<()>;

    /// Write PCM bytes, returning how many were accepted
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Stop playback
    fn stop(&mut self);

    /// Release the device
    fn close(&mut self);
}

struct ManualShared {
    callback: Option<CaptureCallback>,
    running: bool,
}

/// Test/demo source driven manually through a [`ManualSourceHandle`]
///
/// The handle stays with the test after the source itself is handed to a
/// sender, standing in for the audio subsystem's capture thread.
pub struct ManualSource {
    format: AudioFormat,
    byte_order: SampleByteOrder,
    shared: std::sync::Arc<parking_lot::Mutex<ManualShared>>,
}

/// Driving side of a [`ManualSource`]
#[derive(Clone)]
pub struct ManualSourceHandle {
    format: AudioFormat,
    shared: std::sync::Arc<parking_lot::Mutex<ManualShared>>,
}

impl ManualSource {
    /// Create a manual source in `format`
    #[must_use]
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            byte_order: SampleByteOrder::Network,
            shared: std::sync::Arc::new(parking_lot::Mutex::new(ManualShared {
                callback: None,
                running: false,
            })),
        }
    }

    /// Create a manual source that delivers little-endian samples
    #[must_use]
    pub fn little_endian(format: AudioFormat) -> Self {
        Self {
            byte_order: SampleByteOrder::LittleEndian,
            ..Self::new(format)
        }
    }

    /// Handle for delivering capture buffers
    #[must_use]
    pub fn handle(&self) -> ManualSourceHandle {
        ManualSourceHandle {
            format: self.format,
            shared: std::sync::Arc::clone(&self.shared),
        }
    }
}

impl ManualSourceHandle {
    /// Deliver one capture buffer to the registered callback
    ///
    /// Ignored while stopped or unregistered, as a real backend would.
    pub fn deliver(&self, data: &[u8], capture_time_ns: Option<u64>) {
        let frames = data.len() / self.format.bytes_per_frame().max(1);
        let mut shared = self.shared.lock();
        if !shared.running {
            return;
        }
        if let Some(callback) = shared.callback.as_mut() {
            callback(CaptureBuffer {
                data,
                frames,
                capture_time_ns,
            });
        }
    }

    /// Whether the source has been started
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

impl AudioSource for ManualSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn byte_order(&self) -> SampleByteOrder {
        self.byte_order
    }

    fn register(&mut self, callback: CaptureCallback) {
        self.shared.lock().callback = Some(callback);
    }

    fn start(&mut self) -> Result<()> {
        self.shared.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.lock().running = false;
    }
}

/// Sink that appends everything into memory, for tests and demos
#[derive(Default)]
pub struct MemorySink {
    data: std::sync::Arc<parking_lot::Mutex<Vec<u8>>>,
    open: bool,
    /// Accept at most this many bytes per `write`, to exercise partial
    /// writes; zero means unlimited
    pub max_chunk: usize,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the captured bytes
    #[must_use]
    pub fn data(&self) -> std::sync::Arc<parking_lot::Mutex<Vec<u8>>> {
        std::sync::Arc::clone(&self.data)
    }
}

impl AudioSink for MemorySink {
    fn open(&mut self, _device: &str, format: AudioFormat) -> Result<()> {
        if !format.is_valid() {
            return Err(Aes67Error::AudioDevice {
                message: format!("cannot open sink for {format}"),
            });
        }
        self.open = true;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.open {
            return Err(Aes67Error::AudioDevice {
                message: "sink not open".to_string(),
            });
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = if self.max_chunk == 0 {
            bytes.len()
        } else {
            bytes.len().min(self.max_chunk)
        };
        self.data.lock().extend_from_slice(&bytes[..n]);
        n
    }

    fn stop(&mut self) {}

    fn close(&mut self) {
        self.open = false;
    }
}

/// Sink that discards everything
#[derive(Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn open(&mut self, _device: &str, _format: AudioFormat) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        bytes.len()
    }

    fn stop(&mut self) {}

    fn close(&mut self) {}
}
