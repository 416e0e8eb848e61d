use std::io::{Seek, SeekFrom, Write};

use sha2::{Digest, Sha256};

use crate::models::error::EngineError;
use crate::processing::wav_format::{self, RECORDING_BIT_DEPTH, RECORDING_CHANNELS};

/// Where a recording is written. Usually a `File`; anything seekable works.
pub trait RecordingTarget: Write + Seek + Send {}

impl<T: Write + Seek + Send> RecordingTarget for T {}

/// Streaming WAV (PCM16, mono) writer.
///
/// Recordings are stored as uncompressed PCM rather than a compressed
/// container: the file stays sample-accurate, is decodable everywhere and
/// needs no encoder on the writer thread.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, sizes patched on finish]
/// [raw 16-bit PCM data...]
/// ```
///
/// A SHA-256 of the PCM payload is accumulated as data is written, so
/// finishing never has to read the file back.
pub struct RecordingWriter<W: Write + Seek> {
    sink: W,
    sample_rate: u32,
    hasher: Sha256,
    data_bytes: u64,
    scratch: Vec<u8>,
}

impl<W: Write + Seek> RecordingWriter<W> {
    /// Write the initial header (sizes zero until [`finish`](Self::finish)).
    pub fn create(mut sink: W, sample_rate: u32) -> Result<Self, EngineError> {
        let header = wav_format::generate_wav_header(sample_rate, RECORDING_BIT_DEPTH, RECORDING_CHANNELS, 0);
        sink.seek(SeekFrom::Start(0)).map_err(io_error)?;
        sink.write_all(&header).map_err(io_error)?;
        Ok(Self {
            sink,
            sample_rate,
            hasher: Sha256::new(),
            data_bytes: 0,
            scratch: Vec::new(),
        })
    }

    /// Encode and append processed samples.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        if samples.is_empty() {
            return Ok(());
        }
        self.scratch.clear();
        wav_format::encode_pcm16(samples, &mut self.scratch);
        self.sink.write_all(&self.scratch).map_err(io_error)?;
        self.hasher.update(&self.scratch);
        self.data_bytes += self.scratch.len() as u64;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.data_bytes / (RECORDING_BIT_DEPTH as u64 / 8 * RECORDING_CHANNELS as u64)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Patch the header sizes, flush and hand the sink back along with the
    /// frame count and the hex payload checksum.
    pub fn finish(mut self) -> Result<(W, u64, String), EngineError> {
        let (riff_size, data_size) = wav_format::final_sizes(self.data_bytes);

        self.sink.seek(SeekFrom::Start(4)).map_err(io_error)?;
        self.sink.write_all(&riff_size.to_le_bytes()).map_err(io_error)?;
        self.sink.seek(SeekFrom::Start(40)).map_err(io_error)?;
        self.sink.write_all(&data_size.to_le_bytes()).map_err(io_error)?;
        self.sink.seek(SeekFrom::End(0)).map_err(io_error)?;
        self.sink.flush().map_err(io_error)?;

        let frames = self.frames_written();
        let checksum = hex_encode(&self.hasher.finalize());
        Ok((self.sink, frames, checksum))
    }
}

fn io_error(e: std::io::Error) -> EngineError {
    EngineError::RecordingIoFailure(e.to_string())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
