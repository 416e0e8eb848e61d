use std::sync::Arc;

use crate::models::audio_models::StreamFormat;
use crate::models::device::DeviceDescriptor;
use crate::models::error::EngineError;

/// What the engine asks a backend to open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// `None` lets the platform pick its default capture endpoint.
    pub input_device: Option<DeviceDescriptor>,
    /// `None` lets the platform pick its default playback endpoint.
    pub output_device: Option<DeviceDescriptor>,
    /// Requested rate; `None` = native rate of the output device.
    pub sample_rate: Option<u32>,
    /// Preferred frames per callback block.
    pub block_frames: usize,
    /// Capacity of the capture → render queue, in frames.
    pub capture_ring_frames: usize,
}

/// Fault reported by an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    /// The device went away (unplugged, Bluetooth dropped).
    Disconnected,
    /// Anything else the platform reported.
    Other(String),
}

/// Called from a platform thread when a stream faults. Must only enqueue.
pub type FaultCallback = Arc<dyn Fn(StreamFault) + Send + Sync + 'static>;

/// Real-time processing hook installed into a duplex stream.
///
/// `process` runs on the platform's audio thread: it must not block,
/// allocate or perform I/O.
pub trait AudioCallback: Send {
    /// Called once with the negotiated format before the first block.
    fn prepare(&mut self, format: &StreamFormat);

    /// Turn one block of mono capture into one block of mono output.
    ///
    /// `input` and `output` have the same length. Missing capture is
    /// zero-filled by the backend before the call.
    fn process(&mut self, input: &[f32], output: &mut [f32]);

    /// The backend had fewer captured frames than the block needed and
    /// zero-filled the rest.
    fn capture_underrun(&mut self, _missing_frames: usize) {}
}

/// Handle to an open capture + render pair.
///
/// Dropping the handle releases the platform streams.
pub trait DuplexStream: Send {
    /// Begin pulling audio. The callback may fire before this returns.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stop callbacks. Idempotent.
    fn stop(&mut self);

    fn format(&self) -> StreamFormat;
}

/// Platform audio I/O.
///
/// Implemented by:
/// - `CpalBackend` (voice-shift-cpal)
/// - in-memory fakes in tests
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open (but do not start) a duplex stream. The callback is moved to the
    /// audio thread; faults are reported through `on_fault`.
    fn open_duplex(
        &self,
        request: &StreamRequest,
        callback: Box<dyn AudioCallback>,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn DuplexStream>, EngineError>;
}
