use std::f32::consts::PI;

/// Grain length of the crossfaded delay taps.
pub const WINDOW_MS: f32 = 30.0;

/// Smallest delay a tap ever reads at, in samples.
const MIN_DELAY: f32 = 2.0;

/// Time-domain pitch shifter built on a modulated delay line.
///
/// Two read taps sweep through a ~30 ms window half a period apart. The
/// delay of each tap changes at `1 - ratio` samples per sample, so each tap
/// replays the input at `ratio` speed. When a tap reaches the end of the
/// window it jumps back; its weight is zero at that point, so the jump is
/// inaudible:
///
/// ```text
/// tap A weight: sin²(π·phase)     tap B weight: cos²(π·phase)   (sum = 1)
/// ```
///
/// Block length is preserved and the output is never louder than the
/// loudest input sample still in the delay line. A ratio of exactly 1.0
/// copies input to output untouched.
///
/// All memory is allocated in [`PitchShifter::new`] / [`PitchShifter::prepare`];
/// [`PitchShifter::process`] is allocation-free.
#[derive(Debug, Clone)]
pub struct PitchShifter {
    history: Vec<f32>,
    mask: usize,
    write_pos: usize,
    window: f32,
    phase: f32,
    sample_rate: u32,
}

impl PitchShifter {
    pub fn new(sample_rate: u32) -> Self {
        let mut shifter = Self {
            history: Vec::new(),
            mask: 0,
            write_pos: 0,
            window: 0.0,
            phase: 0.0,
            sample_rate: 0,
        };
        shifter.prepare(sample_rate);
        shifter
    }

    /// Size the delay line for `sample_rate` and clear all state.
    pub fn prepare(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        self.window = (sample_rate as f32 * WINDOW_MS / 1000.0).max(8.0);
        let needed = (self.window + MIN_DELAY) as usize + 4;
        let capacity = needed.next_power_of_two();
        self.history = vec![0.0; capacity];
        self.mask = capacity - 1;
        self.sample_rate = sample_rate;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.phase = 0.0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Window length in samples.
    pub fn window_len(&self) -> usize {
        self.window as usize
    }

    /// Shift `samples` in place by `ratio` (< 1 lowers, > 1 raises pitch).
    pub fn process(&mut self, samples: &mut [f32], ratio: f32) {
        if is_neutral(ratio) {
            // Keep the history warm so leaving bypass doesn't read stale audio.
            for &sample in samples.iter() {
                self.push(sample);
            }
            return;
        }
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample, ratio);
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) {
        self.history[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) & self.mask;
    }

    #[inline]
    fn process_sample(&mut self, input: f32, ratio: f32) -> f32 {
        self.push(input);

        let phase_b = (self.phase + 0.5).fract();
        let weight_a = (PI * self.phase).sin().powi(2);
        let weight_b = 1.0 - weight_a;

        let a = self.read_delayed(MIN_DELAY + self.phase * self.window);
        let b = self.read_delayed(MIN_DELAY + phase_b * self.window);

        self.phase = (self.phase + (1.0 - ratio) / self.window).rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
        if self.phase >= 1.0 {
            self.phase = 0.0;
        }

        (a * weight_a + b * weight_b).clamp(-1.0, 1.0)
    }

    /// Linearly interpolated read `delay` samples behind the newest sample.
    #[inline]
    fn read_delayed(&self, delay: f32) -> f32 {
        let newest = self.write_pos.wrapping_sub(1);
        let whole = delay.floor();
        let frac = delay - whole;
        let index = newest.wrapping_sub(whole as usize);
        let near = self.history[index & self.mask];
        let far = self.history[index.wrapping_sub(1) & self.mask];
        near + (far - near) * frac
    }
}

fn is_neutral(ratio: f32) -> bool {
    (ratio - 1.0).abs() < 1e-4
}
