use super::device::DeviceDescriptor;
use super::error::EngineError;
use super::recording_result::RecordingResult;
use super::state::EngineState;

/// Asynchronous outcomes delivered to the `EngineDelegate`.
///
/// Everything the real-time side detects ends up here rather than as a
/// returned error.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    StateChanged(EngineState),
    /// The open output device went away; the engine stopped itself.
    /// Carries `EngineError::TransientDeviceLoss`.
    DeviceLost(EngineError),
    /// A stream reported an unrecoverable fault; the engine is `Failed`.
    StreamFailed(EngineError),
    /// `restart()` gave up; the engine is `Stopped`.
    RestartExhausted(EngineError),
    /// The recording writer failed; the session was closed.
    RecordingFailed(EngineError),
    /// A session ended (explicitly, forced by stop, or after a failure).
    RecordingFinished(RecordingResult),
    /// The filtered device topology changed.
    DevicesChanged {
        inputs: Vec<DeviceDescriptor>,
        outputs: Vec<DeviceDescriptor>,
    },
}
