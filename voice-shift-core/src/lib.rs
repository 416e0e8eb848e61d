//! # voice-shift-core
//!
//! Platform-agnostic real-time voice engine.
//!
//! Captures the microphone, applies gain (or noise suppression) and a pitch
//! shift, plays the result back on the selected output and can tee it into
//! a WAV recording. Platform backends implement `AudioBackend` and
//! `DeviceEnumerator` and plug into the generic `AudioEngine`.
//!
//! Recordings are mono PCM16 WAV, not a compressed container. Any
//! `Write + Seek` target works (see `RecordingTarget`).
//!
//! ## Architecture
//!
//! ```text
//! voice-shift-core (this crate)
//! ├── traits/       ← AudioBackend, DeviceEnumerator, EngineDelegate, CommunicationRouter
//! ├── models/       ← EngineError, EngineState, EngineConfiguration, devices, parameters
//! ├── control/      ← ControlSurface (lock-free parameter hand-off to the audio thread)
//! ├── processing/   ← DspStage, PitchShifter, NoiseSuppressor, RingBuffer, WAV encoding, levels
//! ├── session/      ← AudioEngine (lifecycle + coordinator), RecordingSink
//! └── storage/      ← RecordingWriter, stored preferences
//! ```

pub mod control;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use control::control_surface::ControlSurface;
pub use models::audio_models::{AudioFrame, AudioLevels, EngineDiagnostics, StreamFormat};
pub use models::config::{EngineConfiguration, RetryPolicy};
pub use models::device::{DeviceClass, DeviceDescriptor, DeviceDirection, DeviceFilter, DeviceId};
pub use models::error::EngineError;
pub use models::notification::EngineNotification;
pub use models::parameters::{DspParameters, EngineParameters, GainMode};
pub use models::preferences::StoredPreferences;
pub use models::recording_result::{FinishedRecording, RecordingResult};
pub use models::state::EngineState;
pub use processing::dsp_stage::DspStage;
pub use processing::gain::NoiseSuppressor;
pub use processing::pitch_shifter::PitchShifter;
pub use processing::ring_buffer::RingBuffer;
pub use session::engine::{AudioEngine, RestartOutcome};
pub use storage::preferences::{load_preferences, save_preferences};
pub use storage::recording_writer::{RecordingTarget, RecordingWriter};
pub use traits::audio_backend::{AudioBackend, AudioCallback, DuplexStream, FaultCallback, StreamFault, StreamRequest};
pub use traits::communication_router::{CommunicationRouter, NoopRouter};
pub use traits::device_enumerator::{DeviceChangeCallback, DeviceEnumerator, SubscriberList, Subscription};
pub use traits::engine_delegate::EngineDelegate;
