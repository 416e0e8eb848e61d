use serde::{Deserialize, Serialize};

/// Format negotiated for an open duplex stream.
///
/// The engine processes mono internally; backends downmix capture and fan
/// the processed signal out to every output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per processing block.
    pub block_frames: usize,
}

impl StreamFormat {
    /// Duration of one block in seconds.
    pub fn block_duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.block_frames as f64 / self.sample_rate as f64
    }
}

/// An owned block of interleaved f32 samples.
///
/// Used where allocation is acceptable (offline processing, tests). The
/// real-time path hands the same data around as borrowed slices.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// A block of `frames` zero samples.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Real-time audio level metering (RMS and peak, 0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevels {
    pub input_level: f32,
    pub output_level: f32,
    pub peak_input_level: f32,
    pub peak_output_level: f32,
}

/// Counters for debugging a running engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineDiagnostics {
    pub blocks_processed: u64,
    /// Render callbacks that found fewer captured frames than requested.
    pub capture_underruns: u64,
    /// Processed samples the recording ring had no room for.
    pub recording_overruns: u64,
    pub stream_opens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_respects_channels() {
        let frame = AudioFrame::new(vec![0.0; 96], 48_000, 2);
        assert_eq!(frame.frame_count(), 48);
        assert!((frame.duration_secs() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn zero_channels_are_treated_as_mono() {
        let frame = AudioFrame::new(vec![0.0; 10], 48_000, 0);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.frame_count(), 10);
    }

    #[test]
    fn block_duration() {
        let format = StreamFormat {
            sample_rate: 48_000,
            channels: 1,
            block_frames: 480,
        };
        assert!((format.block_duration_secs() - 0.01).abs() < 1e-9);
    }
}
