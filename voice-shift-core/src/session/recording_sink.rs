use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::error::EngineError;
use crate::models::recording_result::{FinishedRecording, RecordingResult};
use crate::processing::ring_buffer::{RingConsumer, RingProducer};
use crate::processing::wav_format::RECORDING_CHANNELS;
use crate::storage::recording_writer::{RecordingTarget, RecordingWriter};

/// Real-time side of the recording path.
///
/// The render callback owns the producer half of the recording ring and only
/// pushes while `active` is set. When the ring is full the block is cut short
/// and the shortfall is counted, never waited on.
#[derive(Debug)]
pub struct RecordingTap {
    producer: RingProducer,
    flags: Arc<TapFlags>,
}

/// State shared between the tap and its sink.
#[derive(Debug, Default)]
pub struct TapFlags {
    active: AtomicBool,
    dropped: AtomicU64,
}

impl TapFlags {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl RecordingTap {
    pub fn new(producer: RingProducer, flags: Arc<TapFlags>) -> Self {
        Self { producer, flags }
    }

    /// Offer one processed block. Returns the number of samples dropped.
    #[inline]
    pub fn push(&mut self, block: &[f32]) -> usize {
        if !self.flags.is_active() {
            return 0;
        }
        let written = self.producer.write(block);
        let dropped = block.len() - written;
        if dropped > 0 {
            self.flags.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        dropped
    }
}

/// Called from the writer thread when a write fails: `(session_id, error)`.
pub type RecordingFailureCallback = Box<dyn Fn(u64, EngineError) + Send + 'static>;

struct ActiveSession {
    id: u64,
    started_at: DateTime<Utc>,
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<WriterOutcome>,
}

struct WriterOutcome {
    consumer: RingConsumer,
    writer: RecordingWriter<Box<dyn RecordingTarget>>,
    error: Option<EngineError>,
}

/// Coordination side of the recording path for one open stream.
///
/// ```text
/// render callback ─push→ [recording ring] ─drain every flush interval→ writer thread → WAV file
/// ```
///
/// At most one session at a time. The consumer half of the ring outlives
/// sessions and is handed to each session's writer thread in turn.
pub struct RecordingSink {
    flags: Arc<TapFlags>,
    consumer: Option<RingConsumer>,
    sample_rate: u32,
    flush_interval: Duration,
    session: Option<ActiveSession>,
    next_session_id: u64,
}

impl RecordingSink {
    pub fn new(consumer: RingConsumer, flags: Arc<TapFlags>, sample_rate: u32, flush_interval: Duration) -> Self {
        Self {
            flags,
            consumer: Some(consumer),
            sample_rate,
            flush_interval,
            session: None,
            next_session_id: 1,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Begin writing processed audio to `file`. Returns the session id.
    pub fn start(&mut self, file: Box<dyn RecordingTarget>, on_failure: RecordingFailureCallback) -> Result<u64, EngineError> {
        if let Some(session) = &self.session {
            log::debug!("Recording session {} already active", session.id);
            return Ok(session.id);
        }
        let mut consumer = self
            .consumer
            .take()
            .ok_or_else(|| EngineError::InvalidState("recording ring unavailable".into()))?;

        let writer = match RecordingWriter::create(file, self.sample_rate) {
            Ok(writer) => writer,
            Err(e) => {
                self.consumer = Some(consumer);
                return Err(e);
            }
        };

        let id = self.next_session_id;
        self.next_session_id += 1;

        // Leftovers from an earlier session must not leak into this file.
        consumer.clear();
        self.flags.dropped.store(0, Ordering::Relaxed);
        self.flags.active.store(true, Ordering::Release);

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let flags = Arc::clone(&self.flags);
        let flush_interval = self.flush_interval;

        let spawned = thread::Builder::new()
            .name("recording-writer".into())
            .spawn(move || {
                write_loop(id, consumer, writer, &flags, &thread_running, flush_interval, on_failure)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The consumer moved into the failed closure; the ring is lost
                // for this stream, so later sessions report InvalidState.
                self.flags.active.store(false, Ordering::Release);
                return Err(EngineError::RecordingIoFailure(format!("failed to spawn writer: {}", e)));
            }
        };

        log::info!("Recording session {} started at {} Hz", id, self.sample_rate);
        self.session = Some(ActiveSession {
            id,
            started_at: Utc::now(),
            running,
            handle,
        });
        Ok(id)
    }

    /// Stop the active session: quiesce the tap, drain, patch the header.
    ///
    /// `Ok(None)` when nothing was recording. A session that already failed
    /// reports its write error here.
    pub fn finish(&mut self) -> Result<Option<FinishedRecording>, EngineError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };

        self.flags.active.store(false, Ordering::Release);
        session.running.store(false, Ordering::Release);

        let outcome = session
            .handle
            .join()
            .map_err(|_| EngineError::RecordingIoFailure("recording writer panicked".into()))?;
        self.consumer = Some(outcome.consumer);

        if let Some(error) = outcome.error {
            log::error!("Recording session {} failed: {}", session.id, error);
            return Err(error);
        }

        let (file, frames, checksum) = outcome.writer.finish()?;
        let result = RecordingResult::new(
            session.started_at,
            frames,
            self.sample_rate,
            RECORDING_CHANNELS,
            checksum,
            self.flags.dropped(),
        );
        log::info!(
            "Recording session {} finished: {} frames ({:.2}s), {} dropped",
            session.id,
            result.frames_written,
            result.duration_secs,
            result.dropped_samples
        );
        Ok(Some(FinishedRecording { file, result }))
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.finish() {
                log::warn!("Recording closed with error during teardown: {}", e);
            }
        }
    }
}

fn write_loop(
    id: u64,
    mut consumer: RingConsumer,
    mut writer: RecordingWriter<Box<dyn RecordingTarget>>,
    flags: &TapFlags,
    running: &AtomicBool,
    flush_interval: Duration,
    on_failure: RecordingFailureCallback,
) -> WriterOutcome {
    let mut chunk = vec![0.0f32; consumer.capacity().min(16_384)];
    loop {
        // Read the flag before draining so the last pass sees everything
        // pushed before the tap was deactivated.
        let keep_going = running.load(Ordering::Acquire);

        if let Err(error) = drain(&mut consumer, &mut writer, &mut chunk) {
            flags.active.store(false, Ordering::Release);
            on_failure(id, error.clone());
            return WriterOutcome {
                consumer,
                writer,
                error: Some(error),
            };
        }
        if !keep_going {
            break;
        }
        thread::sleep(flush_interval);
    }
    WriterOutcome {
        consumer,
        writer,
        error: None,
    }
}

fn drain(
    consumer: &mut RingConsumer,
    writer: &mut RecordingWriter<Box<dyn RecordingTarget>>,
    chunk: &mut [f32]) -> Result<(), EngineError> {
    loop {
        let n = consumer.read_into(chunk);
        if n == 0 {
            return Ok(());
        }
        writer.write_samples(&chunk[..n])?;
    }
}
