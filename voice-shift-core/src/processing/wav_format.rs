//! RIFF/WAVE helpers and sample-format conversion for recordings.
//!
//! Recordings are 16-bit PCM, mono, little-endian, behind the canonical
//! 44-byte header.

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Bit depth of every recording.
pub const RECORDING_BIT_DEPTH: u16 = 16;

/// Channel count of every recording (the engine processes mono).
pub const RECORDING_CHANNELS: u16 = 1;

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// RIFF chunk size (offset 4) and data size (offset 40) for a finished
/// payload of `data_size` bytes. Sizes past 4 GiB saturate.
pub fn final_sizes(data_size: u64) -> (u32, u32) {
    let data = data_size.min(u32::MAX as u64 - 36) as u32;
    (36 + data, data)
}

/// Convert one f32 sample in [-1.0, 1.0] to signed 16-bit. Out-of-range
/// input saturates.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Append the little-endian PCM16 encoding of `samples` to `out`.
///
/// `out` is reused between calls by the writer thread.
pub fn encode_pcm16(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&f32_to_pcm16(sample).to_le_bytes());
    }
}

/// Average interleaved frames into `out` (one sample per frame). Returns the
/// number of frames written. Allocation-free; used on the capture callback.
pub fn downmix_into(samples: &[f32], channels: usize, out: &mut [f32]) -> usize {
    if channels <= 1 {
        let n = samples.len().min(out.len());
        out[..n].copy_from_slice(&samples[..n]);
        return n;
    }
    let scale = 1.0 / channels as f32;
    let mut frames = 0;
    for (slot, frame) in out.iter_mut().zip(samples.chunks_exact(channels)) {
        *slot = frame.iter().sum::<f32>() * scale;
        frames += 1;
    }
    frames
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let mut mono = vec![0.0; samples.len() / channels];
    downmix_into(samples, channels, &mut mono);
    mono
}

/// Copy each mono sample to every channel of an interleaved output buffer.
/// Frames past the end of `mono` are zero-filled.
pub fn fan_out(mono: &[f32], channels: usize, out: &mut [f32]) {
    let channels = channels.max(1);
    for (i, frame) in out.chunks_mut(channels).enumerate() {
        frame.fill(mono.get(i).copied().unwrap_or(0.0));
    }
}
