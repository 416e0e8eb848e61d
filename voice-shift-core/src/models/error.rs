use thiserror::Error;

/// Errors surfaced by the voice engine.
///
/// Coordination calls (`start`, `restart`, recording control) return these
/// synchronously. Faults detected on the real-time path are never returned
/// from a callback; they arrive later as an `EngineNotification`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No usable device to open. The engine stays where it was.
    #[error("no usable audio device available")]
    DeviceUnavailable,

    /// The platform refused to open or start the capture/render streams.
    #[error("failed to open audio stream: {0}")]
    StreamOpenFailure(String),

    /// A previously open device disappeared while the engine was running.
    #[error("audio device disconnected")]
    TransientDeviceLoss,

    /// Every restart attempt allowed by the retry policy failed.
    #[error("could not resume audio after {attempts} attempt(s), please restart manually")]
    RestartExhausted { attempts: u32 },

    /// Writing the recording failed. Live processing is unaffected.
    #[error("recording I/O failure: {0}")]
    RecordingIoFailure(String),

    /// The requested operation is not valid in the current engine state.
    #[error("invalid engine state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    /// An unrecoverable fault reported by an open stream.
    #[error("audio stream fault: {0}")]
    StreamFault(String),
}
