//! cpal backend error types

use thiserror::Error;
use voice_shift_core::EngineError;

/// Errors raised while talking to the cpal host.
#[derive(Error, Debug)]
pub enum CpalBackendError {
    #[error("Audio host not available: {0}")]
    HostUnavailable(String),

    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(u32),

    #[error("Failed to get device config: {0}")]
    Config(String),

    #[error("Device does not support {rate} Hz for {direction}")]
    UnsupportedRate { rate: u32, direction: &'static str },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),

    #[error("Audio stream thread is gone")]
    StreamThreadGone,
}

pub type CpalResult<T> = Result<T, CpalBackendError>;

impl From<CpalBackendError> for EngineError {
    fn from(err: CpalBackendError) -> Self {
        match err {
            CpalBackendError::NoDevice(_) | CpalBackendError::DeviceNotFound(_) => EngineError::DeviceUnavailable,
            other => EngineError::StreamOpenFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_devices_map_to_unavailable() {
        assert_eq!(EngineError::from(CpalBackendError::NoDevice("output")), EngineError::DeviceUnavailable);
        assert_eq!(EngineError::from(CpalBackendError::DeviceNotFound(7)), EngineError::DeviceUnavailable);
    }

    #[test]
    fn other_errors_become_open_failures() {
        let err = EngineError::from(CpalBackendError::UnsupportedRate {
            rate: 8_000,
            direction: "input",
        });
        assert_eq!(
            err,
            EngineError::StreamOpenFailure("Device does not support 8000 Hz for input".into())
        );
    }
}
