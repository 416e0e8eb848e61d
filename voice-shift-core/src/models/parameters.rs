use serde::{Deserialize, Serialize};

use super::device::DeviceId;

pub const MIN_PITCH_RATIO: f32 = 0.5;
pub const MAX_PITCH_RATIO: f32 = 1.5;
pub const DEFAULT_PITCH_RATIO: f32 = 1.0;

pub const MIN_GAIN_LEVEL: u8 = 1;
pub const MAX_GAIN_LEVEL: u8 = 10;
pub const DEFAULT_GAIN_LEVEL: u8 = 3;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Makeup applied on top of the level in noise-cancellation mode, making up
/// for the loudness the expander and compressor take away.
pub const NOISE_CANCELLATION_MAKEUP_DB: f32 = 6.0;

/// Selects the formula mapping a gain level to a linear multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    #[default]
    Normal,
    NoiseCancellation,
}

impl GainMode {
    /// Map the integer mode used at the foreign boundary (1 = noise
    /// cancellation, anything else = normal).
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            Self::NoiseCancellation
        } else {
            Self::Normal
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::NoiseCancellation => 1,
        }
    }
}

/// Clamp a pitch ratio into bounds; non-finite input means "no shift".
pub fn clamp_pitch(ratio: f32) -> f32 {
    if ratio.is_finite() {
        ratio.clamp(MIN_PITCH_RATIO, MAX_PITCH_RATIO)
    } else {
        DEFAULT_PITCH_RATIO
    }
}

pub fn clamp_gain(level: i32) -> u8 {
    level.clamp(MIN_GAIN_LEVEL as i32, MAX_GAIN_LEVEL as i32) as u8
}

/// Clamp a sample rate; zero or negative means "derive from the output device".
pub fn clamp_sample_rate(rate: i32) -> Option<u32> {
    if rate <= 0 {
        None
    } else {
        Some((rate as u32).clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE))
    }
}

/// Parameters the real-time thread reads at the start of every block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DspParameters {
    pub pitch_ratio: f32,
    pub gain_level: u8,
    pub gain_mode: GainMode,
}

impl DspParameters {
    /// Linear gain multiplier for the current level and mode.
    pub fn gain_multiplier(&self) -> f32 {
        let level = self.gain_level as f32;
        match self.gain_mode {
            GainMode::Normal => level,
            GainMode::NoiseCancellation => level * db_to_linear(NOISE_CANCELLATION_MAKEUP_DB),
        }
    }

    pub fn is_pitch_neutral(&self) -> bool {
        (self.pitch_ratio - 1.0).abs() < 1e-4
    }
}

impl Default for DspParameters {
    fn default() -> Self {
        Self {
            pitch_ratio: DEFAULT_PITCH_RATIO,
            gain_level: DEFAULT_GAIN_LEVEL,
            gain_mode: GainMode::Normal,
        }
    }
}

/// Full parameter set owned by the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineParameters {
    pub pitch_ratio: f32,
    pub gain_level: u8,
    pub gain_mode: GainMode,
    /// `None` = auto resolution.
    pub input_device_id: Option<DeviceId>,
    /// `None` = auto resolution.
    pub output_device_id: Option<DeviceId>,
    /// `None` = use the output device's native rate.
    pub sample_rate: Option<u32>,
}

impl EngineParameters {
    /// Return a copy with every value forced into its declared bounds.
    pub fn clamped(&self) -> Self {
        Self {
            pitch_ratio: clamp_pitch(self.pitch_ratio),
            gain_level: clamp_gain(self.gain_level as i32),
            gain_mode: self.gain_mode,
            input_device_id: self.input_device_id,
            output_device_id: self.output_device_id,
            sample_rate: self.sample_rate.and_then(|r| clamp_sample_rate(r.min(i32::MAX as u32) as i32)),
        }
    }

    pub fn dsp(&self) -> DspParameters {
        DspParameters {
            pitch_ratio: self.pitch_ratio,
            gain_level: self.gain_level,
            gain_mode: self.gain_mode,
        }
    }
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            pitch_ratio: DEFAULT_PITCH_RATIO,
            gain_level: DEFAULT_GAIN_LEVEL,
            gain_mode: GainMode::Normal,
            input_device_id: None,
            output_device_id: None,
            sample_rate: None,
        }
    }
}

pub fn db_to_linear(db: f32) -> f32 {
    (db * 0.115_129_25).exp() // ln(10) / 20
}
