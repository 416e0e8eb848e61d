use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::device::DeviceId;
use crate::models::parameters::{
    clamp_gain, clamp_pitch, clamp_sample_rate, DspParameters, EngineParameters, GainMode,
};

/// Parameter store shared between the coordination side and the real-time thread.
///
/// Pitch, gain level and gain mode live in a single `AtomicU64`:
///
/// ```text
/// bits  0..32  pitch ratio (f32 bits)
/// bits 32..40  gain level
/// bits 40..48  gain mode code
/// ```
///
/// so the render callback reads a consistent [`DspParameters`] with one load.
/// Device ids and the sample rate are only read when streams are (re)opened
/// and sit behind a plain lock.
#[derive(Debug)]
pub struct ControlSurface {
    dsp: AtomicU64,
    routing: Mutex<Routing>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Routing {
    input_device_id: Option<DeviceId>,
    output_device_id: Option<DeviceId>,
    sample_rate: Option<u32>,
}

fn pack(params: &DspParameters) -> u64 {
    params.pitch_ratio.to_bits() as u64 | (params.gain_level as u64) << 32 | (params.gain_mode.code() as u64) << 40
}

fn unpack(word: u64) -> DspParameters {
    DspParameters {
        pitch_ratio: f32::from_bits(word as u32),
        gain_level: (word >> 32) as u8,
        gain_mode: GainMode::from_code(((word >> 40) & 0xff) as i32),
    }
}

impl ControlSurface {
    pub fn new(initial: &EngineParameters) -> Self {
        let initial = initial.clamped();
        Self {
            dsp: AtomicU64::new(pack(&initial.dsp())),
            routing: Mutex::new(Routing {
                input_device_id: initial.input_device_id,
                output_device_id: initial.output_device_id,
                sample_rate: initial.sample_rate,
            }),
        }
    }

    /// Snapshot for one processing block. Lock-free; safe on the real-time thread.
    pub fn dsp_snapshot(&self) -> DspParameters {
        unpack(self.dsp.load(Ordering::Acquire))
    }

    fn update_dsp(&self, f: impl Fn(DspParameters) -> DspParameters) {
        // The closure always returns Some, so fetch_update cannot fail.
        let _ = self
            .dsp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| Some(pack(&f(unpack(word)))));
    }

    pub fn set_pitch(&self, ratio: f32) {
        let pitch_ratio = clamp_pitch(ratio);
        self.update_dsp(|p| DspParameters { pitch_ratio, ..p });
    }

    pub fn set_gain(&self, level: i32) {
        let gain_level = clamp_gain(level);
        self.update_dsp(|p| DspParameters { gain_level, ..p });
    }

    /// Flip the gain mode. The effective multiplier is derived from level and
    /// mode together, so the real-time side never sees a half-applied change.
    pub fn set_gain_mode(&self, gain_mode: GainMode) {
        self.update_dsp(|p| DspParameters { gain_mode, ..p });
    }

    pub fn set_gain_with_mode(&self, level: i32, gain_mode: GainMode) {
        let gain_level = clamp_gain(level);
        self.update_dsp(|p| DspParameters {
            gain_level,
            gain_mode,
            ..p
        });
    }

    pub fn set_noise_cancellation(&self, enabled: bool) {
        self.set_gain_mode(if enabled {
            GainMode::NoiseCancellation
        } else {
            GainMode::Normal
        });
    }

    pub fn set_input_device_id(&self, id: Option<DeviceId>) {
        self.routing.lock().input_device_id = id;
    }

    pub fn set_output_device_id(&self, id: Option<DeviceId>) {
        self.routing.lock().output_device_id = id;
    }

    /// `rate <= 0` clears the override (native output rate).
    pub fn set_sample_rate(&self, rate: i32) {
        self.routing.lock().sample_rate = clamp_sample_rate(rate);
    }

    pub fn input_device_id(&self) -> Option<DeviceId> {
        self.routing.lock().input_device_id
    }

    pub fn output_device_id(&self) -> Option<DeviceId> {
        self.routing.lock().output_device_id
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.routing.lock().sample_rate
    }

    /// Full parameter set.
    pub fn parameters(&self) -> EngineParameters {
        let dsp = self.dsp_snapshot();
        let routing = *self.routing.lock();
        EngineParameters {
            pitch_ratio: dsp.pitch_ratio,
            gain_level: dsp.gain_level,
            gain_mode: dsp.gain_mode,
            input_device_id: routing.input_device_id,
            output_device_id: routing.output_device_id,
            sample_rate: routing.sample_rate,
        }
    }
}

impl Default for ControlSurface {
    fn default() -> Self {
        Self::new(&EngineParameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_from_clamped_initial_values() {
        let surface = ControlSurface::new(&EngineParameters {
            pitch_ratio: 7.0,
            gain_level: 0,
            ..Default::default()
        });
        let dsp = surface.dsp_snapshot();
        assert_eq!(dsp.pitch_ratio, 1.5);
        assert_eq!(dsp.gain_level, 1);
        assert_eq!(dsp.gain_mode, GainMode::Normal);
    }

    #[test]
    fn setters_clamp() {
        let surface = ControlSurface::default();
        surface.set_gain(15);
        surface.set_pitch(0.2);
        let dsp = surface.dsp_snapshot();
        assert_eq!(dsp.gain_level, 10);
        assert_eq!(dsp.pitch_ratio, 0.5);

        surface.set_pitch(f32::NAN);
        assert_eq!(surface.dsp_snapshot().pitch_ratio, 1.0);
    }

    #[test]
    fn mode_change_keeps_level_and_pitch() {
        let surface = ControlSurface::default();
        surface.set_pitch(1.2);
        surface.set_gain(6);
        surface.set_noise_cancellation(true);

        let dsp = surface.dsp_snapshot();
        assert_eq!(dsp.gain_mode, GainMode::NoiseCancellation);
        assert_eq!(dsp.gain_level, 6);
        assert!((dsp.pitch_ratio - 1.2).abs() < 1e-6);
    }

    #[test]
    fn gain_and_mode_update_together() {
        let surface = ControlSurface::default();
        surface.set_gain_with_mode(9, GainMode::NoiseCancellation);
        let dsp = surface.dsp_snapshot();
        assert_eq!((dsp.gain_level, dsp.gain_mode), (9, GainMode::NoiseCancellation));
    }

    #[test]
    fn routing_values_round_trip() {
        let surface = ControlSurface::default();
        surface.set_input_device_id(Some(4));
        surface.set_output_device_id(Some(9));
        surface.set_sample_rate(44_100);

        let params = surface.parameters();
        assert_eq!(params.input_device_id, Some(4));
        assert_eq!(params.output_device_id, Some(9));
        assert_eq!(params.sample_rate, Some(44_100));

        surface.set_output_device_id(None);
        surface.set_sample_rate(0);
        assert_eq!(surface.output_device_id(), None);
        assert_eq!(surface.sample_rate(), None);
    }

    #[test]
    fn concurrent_writers_never_tear_snapshots() {
        let surface = Arc::new(ControlSurface::default());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let surface = Arc::clone(&surface);
                thread::spawn(move || {
                    for n in 0..1_000 {
                        surface.set_gain(1 + ((n + i) % 10));
                        surface.set_pitch(0.5 + ((n % 10) as f32) / 10.0);
                    }
                })
            })
            .collect();

        for _ in 0..10_000 {
            let dsp = surface.dsp_snapshot();
            assert!((1..=10).contains(&dsp.gain_level));
            assert!((0.5..=1.5).contains(&dsp.pitch_ratio));
        }
        for w in writers {
            w.join().unwrap();
        }
    }
}
