use std::sync::atomic::{AtomicU32, Ordering};

use crate::models::audio_models::AudioLevels;

/// Compute RMS level of samples (0.0–1.0 range for normalized audio).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Compute peak absolute level of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Lock-free publisher of the latest block levels.
///
/// Written by the render callback once per block, read by anyone.
#[derive(Debug, Default)]
pub struct LevelMeter {
    input_rms: AtomicU32,
    input_peak: AtomicU32,
    output_rms: AtomicU32,
    output_peak: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, input: &[f32], output: &[f32]) {
        store(&self.input_rms, rms_level(input));
        store(&self.input_peak, peak_level(input));
        store(&self.output_rms, rms_level(output));
        store(&self.output_peak, peak_level(output));
    }

    pub fn clear(&self) {
        for cell in [&self.input_rms, &self.input_peak, &self.output_rms, &self.output_peak] {
            store(cell, 0.0);
        }
    }

    pub fn levels(&self) -> AudioLevels {
        AudioLevels {
            input_level: load(&self.input_rms),
            output_level: load(&self.output_rms),
            peak_input_level: load(&self.input_peak),
            peak_output_level: load(&self.output_peak),
        }
    }
}

fn store(cell: &AtomicU32, value: f32) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

fn load(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}
