use crate::models::parameters::db_to_linear;

/// Output ceiling shared by every gain path.
pub const OUTPUT_LIMIT: f32 = 1.0;

/// Plain linear gain with hard saturation. Used in normal mode.
#[inline]
pub fn apply_gain(sample: f32, multiplier: f32) -> f32 {
    (sample * multiplier).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
}

/// Second-order high-pass (RBJ cookbook), transposed direct form II.
#[derive(Debug, Clone, Default)]
struct HighPass {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl HighPass {
    fn design(&mut self, cutoff_hz: f32, q: f32, sample_rate: f32) {
        let w0 = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate;
        let (sin_w, cos_w) = w0.sin_cos();
        let alpha = sin_w / (2.0 * q);

        let a0 = 1.0 + alpha;
        self.b0 = (1.0 + cos_w) / 2.0 / a0;
        self.b1 = -(1.0 + cos_w) / a0;
        self.b2 = (1.0 + cos_w) / 2.0 / a0;
        self.a1 = -2.0 * cos_w / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Speech-tuned noise suppressor used in noise-cancellation mode.
///
/// ```text
/// x → [80 Hz high-pass] → [envelope] → expander (< -40 dB, 2:1, ≤ 15 dB)
///                                    → compressor (> -20 dB, 4:1)
///   → × makeup → limiter (±1.0)
/// ```
///
/// Sample-by-sample with no look-ahead, so it adds no latency.
#[derive(Debug, Clone)]
pub struct NoiseSuppressor {
    sample_rate: f32,
    high_pass: HighPass,
    envelope: f32,
    attack: f32,
    release: f32,
}

impl NoiseSuppressor {
    const HIGH_PASS_HZ: f32 = 80.0;
    const HIGH_PASS_Q: f32 = 0.707;
    const ATTACK_MS: f32 = 5.0;
    const RELEASE_MS: f32 = 100.0;

    const EXPANDER_THRESHOLD_DB: f32 = -40.0;
    const EXPANDER_RATIO: f32 = 2.0;
    const EXPANDER_MAX_REDUCTION_DB: f32 = 15.0;

    const COMPRESSOR_THRESHOLD_DB: f32 = -20.0;
    const COMPRESSOR_RATIO: f32 = 4.0;

    pub fn new(sample_rate: u32) -> Self {
        let mut suppressor = Self {
            sample_rate: 0.0,
            high_pass: HighPass::default(),
            envelope: 0.0,
            attack: 0.0,
            release: 0.0,
        };
        suppressor.set_sample_rate(sample_rate);
        suppressor
    }

    /// Recompute coefficients. Filter and envelope state are kept.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1) as f32;
        self.high_pass
            .design(Self::HIGH_PASS_HZ, Self::HIGH_PASS_Q, self.sample_rate);
        self.attack = self.smoothing_coefficient(Self::ATTACK_MS);
        self.release = self.smoothing_coefficient(Self::RELEASE_MS);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    pub fn reset(&mut self) {
        self.high_pass.reset();
        self.envelope = 0.0;
    }

    /// Current envelope level in dBFS.
    pub fn envelope_db(&self) -> f32 {
        20.0 * (self.envelope + 1e-9).log10()
    }

    #[inline]
    pub fn process(&mut self, sample: f32, makeup: f32) -> f32 {
        let x = self.high_pass.process(sample);

        let magnitude = x.abs() + 1e-9;
        let coefficient = if magnitude > self.envelope {
            self.attack
        } else {
            self.release
        };
        self.envelope = coefficient * self.envelope + (1.0 - coefficient) * magnitude;

        let level_db = 20.0 * self.envelope.log10();
        let mut gain = 1.0;

        if level_db < Self::EXPANDER_THRESHOLD_DB {
            let reduction = ((Self::EXPANDER_THRESHOLD_DB - level_db) * (1.0 - 1.0 / Self::EXPANDER_RATIO))
                .min(Self::EXPANDER_MAX_REDUCTION_DB);
            gain *= db_to_linear(-reduction);
        }
        if level_db > Self::COMPRESSOR_THRESHOLD_DB {
            let reduction = (level_db - Self::COMPRESSOR_THRESHOLD_DB) * (1.0 - 1.0 / Self::COMPRESSOR_RATIO);
            gain *= db_to_linear(-reduction);
        }

        (x * gain * makeup).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
    }

    fn smoothing_coefficient(&self, ms: f32) -> f32 {
        (-1.0 / (0.001 * ms * self.sample_rate)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn plain_gain_scales_and_saturates() {
        assert_relative_eq!(apply_gain(0.1, 3.0), 0.3, epsilon = 1e-6);
        assert_eq!(apply_gain(0.5, 10.0), 1.0);
        assert_eq!(apply_gain(-0.5, 10.0), -1.0);
        assert_eq!(apply_gain(0.0, 10.0), 0.0);
    }

    #[test]
    fn high_pass_removes_dc() {
        let mut ns = NoiseSuppressor::new(48_000);
        let mut last = 1.0;
        for _ in 0..48_000 {
            last = ns.process(0.5, 1.0);
        }
        assert!(last.abs() < 1e-3, "dc leaked: {last}");
    }

    #[test]
    fn quiet_noise_is_attenuated_more_than_speech_level() {
        let sample_rate = 48_000;
        let quiet = sine(1_000.0, 0.001, sample_rate, sample_rate as usize);
        let loud = sine(1_000.0, 0.05, sample_rate, sample_rate as usize);

        let mut ns = NoiseSuppressor::new(sample_rate);
        let quiet_out: Vec<f32> = quiet.iter().map(|&x| ns.process(x, 1.0)).collect();
        ns.reset();
        let loud_out: Vec<f32> = loud.iter().map(|&x| ns.process(x, 1.0)).collect();

        let tail = sample_rate as usize / 2;
        let quiet_ratio = rms(&quiet_out[tail..]) / rms(&quiet[tail..]);
        let loud_ratio = rms(&loud_out[tail..]) / rms(&loud[tail..]);
        assert!(quiet_ratio < 0.5, "expander inactive: {quiet_ratio}");
        assert!(loud_ratio > 0.9, "speech level attenuated: {loud_ratio}");
    }

    #[test]
    fn loud_input_is_compressed_and_limited() {
        let sample_rate = 48_000;
        let input = sine(440.0, 0.9, sample_rate, sample_rate as usize);
        let mut ns = NoiseSuppressor::new(sample_rate);
        let compressed: Vec<f32> = input.iter().map(|&x| ns.process(x, 1.0)).collect();
        let tail = sample_rate as usize / 2;
        // 4:1 above -20 dBFS pulls a ~-4 dB envelope down by about 12 dB.
        assert!(rms(&compressed[tail..]) < rms(&input[tail..]) * 0.5);

        ns.reset();
        assert!(input.iter().all(|&x| ns.process(x, 20.0).abs() <= 1.0));
    }

    #[test]
    fn silence_stays_silent() {
        let mut ns = NoiseSuppressor::new(44_100);
        assert!((0..1024).all(|_| ns.process(0.0, 10.0) == 0.0));
    }

    #[test]
    fn envelope_reset() {
        let mut ns = NoiseSuppressor::new(16_000);
        for x in sine(300.0, 0.5, 16_000, 1600) {
            ns.process(x, 1.0);
        }
        assert!(ns.envelope_db() > -20.0);
        ns.reset();
        assert!(ns.envelope_db() < -150.0);
    }
}
