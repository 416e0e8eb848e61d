use crate::models::audio_models::AudioFrame;
use crate::models::parameters::{DspParameters, GainMode};
use crate::processing::gain::{apply_gain, NoiseSuppressor};
use crate::processing::pitch_shifter::PitchShifter;

/// The per-block processing chain:
///
/// ```text
/// input → [noise suppressor | plain gain] → pitch shifter → saturate(±1) → output
/// ```
///
/// Owned by exactly one real-time callback. Everything is sized in
/// [`DspStage::prepare`]; [`DspStage::process`] never allocates.
#[derive(Debug, Clone)]
pub struct DspStage {
    suppressor: NoiseSuppressor,
    shifter: PitchShifter,
    last_mode: GainMode,
    sample_rate: u32,
}

impl DspStage {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            suppressor: NoiseSuppressor::new(sample_rate),
            shifter: PitchShifter::new(sample_rate),
            last_mode: GainMode::Normal,
            sample_rate,
        }
    }

    /// Re-size internal state for a (possibly new) stream format.
    pub fn prepare(&mut self, sample_rate: u32) {
        self.suppressor.set_sample_rate(sample_rate);
        self.suppressor.reset();
        self.shifter.prepare(sample_rate);
        self.sample_rate = sample_rate;
    }

    pub fn reset(&mut self) {
        self.suppressor.reset();
        self.shifter.reset();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Process one mono block. `input` and `output` must be the same length;
    /// a shorter output is filled and the rest of the input is ignored.
    pub fn process(&mut self, input: &[f32], params: &DspParameters, output: &mut [f32]) {
        let len = input.len().min(output.len());
        let (input, output) = (&input[..len], &mut output[..len]);
        let multiplier = params.gain_multiplier();

        match params.gain_mode {
            GainMode::NoiseCancellation => {
                if self.last_mode != GainMode::NoiseCancellation {
                    // Stale envelope from an earlier session would gate the first syllable.
                    self.suppressor.reset();
                }
                for (out, &x) in output.iter_mut().zip(input) {
                    *out = self.suppressor.process(x, multiplier);
                }
            }
            GainMode::Normal => {
                for (out, &x) in output.iter_mut().zip(input) {
                    *out = apply_gain(x, multiplier);
                }
            }
        }
        self.last_mode = params.gain_mode;

        self.shifter.process(output, params.pitch_ratio);
    }

    /// Offline variant for owned frames. Multi-channel input is downmixed.
    pub fn process_frame(&mut self, frame: &AudioFrame, params: &DspParameters) -> AudioFrame {
        if frame.sample_rate != self.sample_rate {
            self.prepare(frame.sample_rate);
        }
        let mono = crate::processing::wav_format::downmix_to_mono(&frame.samples, frame.channels as usize);
        let mut output = vec![0.0; mono.len()];
        self.process(&mono, params, &mut output);
        AudioFrame::new(output, frame.sample_rate, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(pitch_ratio: f32, gain_level: u8, gain_mode: GainMode) -> DspParameters {
        DspParameters {
            pitch_ratio,
            gain_level,
            gain_mode,
        }
    }

    #[test]
    fn silence_in_silence_out_at_unity_pitch() {
        let mut stage = DspStage::new(48_000);
        let input = vec![0.0; 512];
        let mut output = vec![1.0; 512];
        for mode in [GainMode::Normal, GainMode::NoiseCancellation] {
            stage.process(&input, &params(1.0, 10, mode), &mut output);
            assert!(output.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn normal_mode_applies_linear_gain() {
        let mut stage = DspStage::new(48_000);
        let input = [0.01, -0.02, 0.05];
        let mut output = [0.0; 3];
        stage.process(&input, &params(1.0, 4, GainMode::Normal), &mut output);
        assert_relative_eq!(output[0], 0.04, epsilon = 1e-6);
        assert_relative_eq!(output[1], -0.08, epsilon = 1e-6);
        assert_relative_eq!(output[2], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn output_is_saturated_for_all_parameters() {
        let input: Vec<f32> = (0..2048).map(|i| if i % 2 == 0 { 0.9 } else { -0.9 }).collect();
        let mut output = vec![0.0; input.len()];
        for mode in [GainMode::Normal, GainMode::NoiseCancellation] {
            for pitch in [0.5, 1.0, 1.5] {
                let mut stage = DspStage::new(44_100);
                stage.process(&input, &params(pitch, 10, mode), &mut output);
                assert!(output.iter().all(|s| s.abs() <= 1.0));
            }
        }
    }

    #[test]
    fn deterministic_for_identical_state() {
        let input: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.013).sin() * 0.3).collect();
        let p = params(1.25, 5, GainMode::NoiseCancellation);

        let run = || {
            let mut stage = DspStage::new(32_000);
            let mut out = vec![0.0; input.len()];
            for (i, o) in input.chunks(250).zip(out.chunks_mut(250)) {
                stage.process(i, &p, o);
            }
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn process_frame_downmixes_and_keeps_length() {
        let mut stage = DspStage::new(48_000);
        let frame = AudioFrame::new(vec![0.1, 0.3, 0.1, 0.3], 16_000, 2);
        let out = stage.process_frame(&frame, &params(1.0, 2, GainMode::Normal));
        assert_eq!(stage.sample_rate(), 16_000);
        assert_eq!(out.channels, 1);
        assert_eq!(out.frame_count(), 2);
        assert_relative_eq!(out.samples[0], 0.4, epsilon = 1e-6);
    }
}
