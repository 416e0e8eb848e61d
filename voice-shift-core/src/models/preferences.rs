use serde::{Deserialize, Serialize};

use super::device::DeviceId;
use super::parameters::{
    clamp_gain, clamp_pitch, EngineParameters, GainMode, DEFAULT_GAIN_LEVEL, DEFAULT_PITCH_RATIO,
};

/// Mirror of the values the app persists between sessions.
///
/// Missing keys fall back to the app defaults, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredPreferences {
    pub pitch: f32,
    pub gain: i32,
    pub input_device_id: Option<DeviceId>,
    pub output_device_id: Option<DeviceId>,
    pub is_noise_cancellation_on: bool,
}

impl StoredPreferences {
    /// Initial engine parameters, clamped into bounds.
    pub fn to_parameters(&self) -> EngineParameters {
        EngineParameters {
            pitch_ratio: clamp_pitch(self.pitch),
            gain_level: clamp_gain(self.gain),
            gain_mode: if self.is_noise_cancellation_on {
                GainMode::NoiseCancellation
            } else {
                GainMode::Normal
            },
            input_device_id: self.input_device_id,
            output_device_id: self.output_device_id,
            sample_rate: None,
        }
    }

    /// Values worth persisting from the live parameters.
    pub fn from_parameters(params: &EngineParameters) -> Self {
        Self {
            pitch: params.pitch_ratio,
            gain: params.gain_level as i32,
            input_device_id: params.input_device_id,
            output_device_id: params.output_device_id,
            is_noise_cancellation_on: params.gain_mode == GainMode::NoiseCancellation,
        }
    }
}

impl Default for StoredPreferences {
    fn default() -> Self {
        Self {
            pitch: DEFAULT_PITCH_RATIO,
            gain: DEFAULT_GAIN_LEVEL as i32,
            input_device_id: None,
            output_device_id: None,
            is_noise_cancellation_on: false,
        }
    }
}
