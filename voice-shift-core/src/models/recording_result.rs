use serde::{Deserialize, Serialize};

use crate::storage::recording_writer::RecordingTarget;

/// Summary of a finished recording session.
///
/// Serializable for handing to the orchestration layer as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingResult {
    pub id: String,
    /// RFC 3339 wall-clock time the session started.
    pub started_at: String,
    pub frames_written: u64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// SHA-256 of the PCM payload (header excluded), hex encoded.
    pub checksum: String,
    /// Samples lost because the writer fell behind the real-time thread.
    pub dropped_samples: u64,
    /// Set when the session ended because of a write failure.
    pub error: Option<String>,
}

impl RecordingResult {
    pub fn new(
        started_at: chrono::DateTime<chrono::Utc>,
        frames_written: u64,
        sample_rate: u32,
        channels: u16,
        checksum: String,
        dropped_samples: u64,
    ) -> Self {
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            frames_written as f64 / sample_rate as f64
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: started_at.to_rfc3339(),
            frames_written,
            duration_secs,
            sample_rate,
            channels,
            checksum,
            dropped_samples,
            error: None,
        }
    }
}

/// A completed session: the file handle goes back to the caller.
pub struct FinishedRecording {
    pub file: Box<dyn RecordingTarget>,
    pub result: RecordingResult,
}

impl std::fmt::Debug for FinishedRecording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishedRecording").field("result", &self.result).finish()
    }
}
