use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::control::control_surface::ControlSurface;
use crate::models::audio_models::{AudioLevels, EngineDiagnostics, StreamFormat};
use crate::models::config::EngineConfiguration;
use crate::models::device::{resolve_device, DeviceClass, DeviceDescriptor, DeviceId, INPUT_PREFERENCE, OUTPUT_PREFERENCE};
use crate::models::error::EngineError;
use crate::models::notification::EngineNotification;
use crate::models::parameters::{EngineParameters, GainMode};
use crate::models::recording_result::FinishedRecording;
use crate::models::state::EngineState;
use crate::processing::dsp_stage::DspStage;
use crate::processing::levels::LevelMeter;
use crate::processing::ring_buffer::RingBuffer;
use crate::session::recording_sink::{RecordingSink, RecordingTap, TapFlags};
use crate::storage::recording_writer::RecordingTarget;
use crate::traits::audio_backend::{AudioBackend, AudioCallback, DuplexStream, FaultCallback, StreamFault, StreamRequest};
use crate::traits::communication_router::CommunicationRouter;
use crate::traits::device_enumerator::{DeviceEnumerator, Subscription};
use crate::traits::engine_delegate::EngineDelegate;

/// What a call to [`AudioEngine::restart`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Streams were closed and re-opened.
    Restarted,
    /// Another restart was already in flight; nothing was done.
    Skipped,
    /// The engine wasn't running, so there was nothing to restart.
    NotRunning,
    /// A `start()` or `stop()` from another caller landed while the restart
    /// was settling; the restart stepped aside and left that result alone.
    Superseded,
}

/// Events funnelled into the coordinator thread.
enum CoordinatorEvent {
    TopologyChanged {
        inputs: Vec<DeviceDescriptor>,
        outputs: Vec<DeviceDescriptor>,
    },
    StreamFault {
        generation: u64,
        fault: StreamFault,
    },
    RecordingFailed {
        session: u64,
        error: EngineError,
    },
    Shutdown,
}

#[derive(Debug, Default)]
struct EngineCounters {
    blocks_processed: AtomicU64,
    capture_underruns: AtomicU64,
    recording_overruns: AtomicU64,
    stream_opens: AtomicU64,
}

/// Everything that exists only while streams are open.
#[derive(Default)]
struct Lifecycle {
    stream: Option<Box<dyn DuplexStream>>,
    generation: Option<u64>,
    format: Option<StreamFormat>,
    input: Option<DeviceDescriptor>,
    output: Option<DeviceDescriptor>,
    routed: bool,
    sink: Option<RecordingSink>,
    /// Bumped by every external `start()`/`stop()`. A restart only acts
    /// while the epoch it observed is still current.
    epoch: u64,
}

/// The real-time processor installed into each duplex stream.
struct EngineProcessor {
    dsp: DspStage,
    control: Arc<ControlSurface>,
    meter: Arc<LevelMeter>,
    counters: Arc<EngineCounters>,
    tap: RecordingTap,
    first_block: Arc<AtomicBool>,
    first_block_seen: bool,
}

impl AudioCallback for EngineProcessor {
    fn prepare(&mut self, format: &StreamFormat) {
        self.dsp.prepare(format.sample_rate);
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let params = self.control.dsp_snapshot();
        self.dsp.process(input, &params, output);
        self.meter.publish(input, output);

        let dropped = self.tap.push(output);
        if dropped > 0 {
            self.counters
                .recording_overruns
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }

        self.counters.blocks_processed.fetch_add(1, Ordering::Relaxed);
        if !self.first_block_seen {
            self.first_block_seen = true;
            self.first_block.store(true, Ordering::Release);
        }
    }

    fn capture_underrun(&mut self, _missing_frames: usize) {
        self.counters.capture_underruns.fetch_add(1, Ordering::Relaxed);
    }
}

struct EngineInner {
    config: EngineConfiguration,
    backend: Arc<dyn AudioBackend>,
    enumerator: Arc<dyn DeviceEnumerator>,
    router: Arc<dyn CommunicationRouter>,
    delegate: Mutex<Option<Arc<dyn EngineDelegate>>>,
    control: Arc<ControlSurface>,
    meter: Arc<LevelMeter>,
    counters: Arc<EngineCounters>,
    state: Mutex<EngineState>,
    lifecycle: Mutex<Lifecycle>,
    restart_gate: Mutex<()>,
    next_generation: AtomicU64,
    events: Sender<CoordinatorEvent>,
}

/// Real-time voice engine: capture → noise suppression / gain → pitch → playback,
/// with an optional tee to a WAV recording.
///
/// Lifecycle:
/// ```text
/// stopped → starting → running → stopping → stopped
///              ↓          ↓ (restart: stopping → starting)
///            failed ← ────┘ (unrecoverable stream fault)
/// ```
///
/// Coordination calls (`start`, `stop`, `restart`, recording control) are
/// serialised on one lock. Device-topology changes and stream faults are
/// handled on a dedicated coordinator thread, one event at a time.
///
/// Delegate callbacks run on the thread that caused them (the coordinator or
/// the caller of a coordination method). They must not call coordination
/// methods synchronously.
pub struct AudioEngine {
    inner: Arc<EngineInner>,
    coordinator: Option<thread::JoinHandle<()>>,
    _subscription: Subscription,
}

impl AudioEngine {
    pub fn new(
        config: EngineConfiguration,
        backend: Arc<dyn AudioBackend>,
        enumerator: Arc<dyn DeviceEnumerator>,
        router: Arc<dyn CommunicationRouter>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::ConfigurationFailed)?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let inner = Arc::new(EngineInner {
            control: Arc::new(ControlSurface::new(&config.initial_parameters)),
            config,
            backend,
            enumerator: Arc::clone(&enumerator),
            router,
            delegate: Mutex::new(None),
            meter: Arc::new(LevelMeter::new()),
            counters: Arc::new(EngineCounters::default()),
            state: Mutex::new(EngineState::Stopped),
            lifecycle: Mutex::new(Lifecycle::default()),
            restart_gate: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            events: tx.clone(),
        });

        let topology_tx = tx;
        let subscription = enumerator.subscribe(Arc::new(move |inputs: &[DeviceDescriptor], outputs: &[DeviceDescriptor]| {
            let _ = topology_tx.send(CoordinatorEvent::TopologyChanged {
                inputs: inputs.to_vec(),
                outputs: outputs.to_vec(),
            });
        }));

        let worker_inner = Arc::clone(&inner);
        let coordinator = thread::Builder::new()
            .name("engine-coordinator".into())
            .spawn(move || worker_inner.run_coordinator(rx))
            .map_err(|e| EngineError::ConfigurationFailed(format!("failed to spawn coordinator: {}", e)))?;

        log::info!("Audio engine created on backend '{}'", inner.backend.name());
        Ok(Self {
            inner,
            coordinator: Some(coordinator),
            _subscription: subscription,
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn EngineDelegate>) {
        *self.inner.delegate.lock() = Some(delegate);
    }

    // --- Lifecycle ---

    /// Open and start the duplex stream on the resolved devices.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut lc = self.inner.lifecycle.lock();
        lc.epoch += 1;
        self.inner.start_locked(&mut lc)
    }

    /// Boolean form of [`start`](Self::start) for foreign callers.
    pub fn start_ok(&self) -> bool {
        match self.start() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to start engine: {}", e);
                false
            }
        }
    }

    /// Stop and release everything. No-op when already stopped.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Stop, let the device settle, start again (with retries).
    pub fn restart(&self) -> Result<RestartOutcome, EngineError> {
        self.inner.restart()
    }

    pub fn state(&self) -> EngineState {
        self.inner.state()
    }

    // --- Parameters (take effect on the next block or the next open) ---

    pub fn set_pitch(&self, ratio: f32) {
        self.inner.control.set_pitch(ratio);
    }

    pub fn set_gain(&self, level: i32) {
        self.inner.control.set_gain(level);
    }

    /// 1 = noise cancellation, anything else = normal.
    pub fn set_gain_type(&self, mode: i32) {
        self.inner.control.set_gain_mode(GainMode::from_code(mode));
    }

    pub fn set_gain_mode(&self, mode: GainMode) {
        self.inner.control.set_gain_mode(mode);
    }

    pub fn set_input_device_id(&self, id: DeviceId) {
        self.inner.control.set_input_device_id(Some(id));
    }

    pub fn reset_input_device_id(&self) {
        self.inner.control.set_input_device_id(None);
    }

    pub fn set_output_device_id(&self, id: DeviceId) {
        self.inner.control.set_output_device_id(Some(id));
    }

    pub fn reset_output_device_id(&self) {
        self.inner.control.set_output_device_id(None);
    }

    /// `rate <= 0` means "use the output device's native rate".
    pub fn set_sample_rate(&self, rate: i32) {
        self.inner.control.set_sample_rate(rate);
    }

    pub fn parameters(&self) -> EngineParameters {
        self.inner.control.parameters()
    }

    // --- Recording ---

    /// Tee processed output into `file` (WAV, PCM16 mono). Only while running;
    /// a no-op if a session is already active.
    pub fn start_recording(&self, file: impl RecordingTarget + 'static) -> Result<(), EngineError> {
        self.inner.start_recording(Box::new(file))
    }

    /// Finish the active session. `Ok(None)` when nothing was recording.
    pub fn stop_recording(&self) -> Result<Option<FinishedRecording>, EngineError> {
        self.inner.stop_recording()
    }

    pub fn is_recording(&self) -> bool {
        self.inner
            .lifecycle
            .lock()
            .sink
            .as_ref()
            .map(RecordingSink::is_recording)
            .unwrap_or(false)
    }

    // --- Observation ---

    pub fn levels(&self) -> AudioLevels {
        self.inner.meter.levels()
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        let c = &self.inner.counters;
        EngineDiagnostics {
            blocks_processed: c.blocks_processed.load(Ordering::Relaxed),
            capture_underruns: c.capture_underruns.load(Ordering::Relaxed),
            recording_overruns: c.recording_overruns.load(Ordering::Relaxed),
            stream_opens: c.stream_opens.load(Ordering::Relaxed),
        }
    }

    /// Format of the open stream, if any.
    pub fn stream_format(&self) -> Option<StreamFormat> {
        self.inner.lifecycle.lock().format
    }

    /// Devices the open stream was resolved to (`None` = platform default).
    pub fn open_devices(&self) -> (Option<DeviceDescriptor>, Option<DeviceDescriptor>) {
        let lc = self.inner.lifecycle.lock();
        (lc.input.clone(), lc.output.clone())
    }

    pub fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        self.inner.enumerator.list_input_devices()
    }

    pub fn list_output_devices(&self) -> Vec<DeviceDescriptor> {
        self.inner.enumerator.list_output_devices()
    }

    /// The currently listed input with this id, if any.
    pub fn find_input_device(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.inner.enumerator.find_input(id)
    }

    pub fn find_output_device(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.inner.enumerator.find_output(id)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.inner.stop();
        let _ = self.inner.events.send(CoordinatorEvent::Shutdown);
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
    }
}

impl EngineInner {
    fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    fn set_state(&self, new_state: EngineState) {
        let previous = {
            let mut s = self.state.lock();
            std::mem::replace(&mut *s, new_state.clone())
        };
        if previous != new_state {
            log::info!("Engine state: {} → {}", previous.name(), new_state.name());
            self.notify(EngineNotification::StateChanged(new_state));
        }
    }

    fn notify(&self, notification: EngineNotification) {
        let delegate = self.delegate.lock().clone();
        if let Some(delegate) = delegate {
            delegate.on_notification(&notification);
        }
    }

    fn start_locked(&self, lc: &mut Lifecycle) -> Result<(), EngineError> {
        let state = self.state();
        if !state.can_start() {
            return Err(EngineError::InvalidState(format!("cannot start while {}", state.name())));
        }

        let outputs = self.enumerator.list_output_devices();
        if outputs.is_empty() {
            log::warn!("No output devices available, not starting");
            return Err(EngineError::DeviceUnavailable);
        }
        let inputs = self.enumerator.list_input_devices();

        // Leftovers from a failure are released before trying again.
        self.teardown(lc);
        self.set_state(EngineState::Starting);

        match self.open_streams(lc, &inputs, &outputs) {
            Ok(()) => {
                self.set_state(EngineState::Running);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start audio: {}", e);
                self.teardown(lc);
                self.set_state(EngineState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    fn open_streams(
        &self,
        lc: &mut Lifecycle,
        inputs: &[DeviceDescriptor],
        outputs: &[DeviceDescriptor],
    ) -> Result<(), EngineError> {
        let input = resolve_device(self.control.input_device_id(), inputs, &INPUT_PREFERENCE);
        let output = resolve_device(self.control.output_device_id(), outputs, &OUTPUT_PREFERENCE);

        if let Some(out) = output.as_ref().filter(|d| d.class == DeviceClass::BluetoothSco) {
            self.router.route_to(out)?;
            lc.routed = true;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let request = StreamRequest {
            input_device: input.clone(),
            output_device: output.clone(),
            sample_rate: self.control.sample_rate(),
            block_frames: self.config.block_frames,
            capture_ring_frames: self.config.capture_ring_frames,
        };

        let (producer, consumer) = RingBuffer::with_capacity(self.config.recording_ring_frames).split();
        let tap_flags = Arc::new(TapFlags::default());
        let first_block = Arc::new(AtomicBool::new(false));
        let processor = EngineProcessor {
            dsp: DspStage::new(request.sample_rate.unwrap_or(48_000)),
            control: Arc::clone(&self.control),
            meter: Arc::clone(&self.meter),
            counters: Arc::clone(&self.counters),
            tap: RecordingTap::new(producer, Arc::clone(&tap_flags)),
            first_block: Arc::clone(&first_block),
            first_block_seen: false,
        };

        let fault_tx = self.events.clone();
        let on_fault: FaultCallback = Arc::new(move |fault| {
            let _ = fault_tx.send(CoordinatorEvent::StreamFault { generation, fault });
        });

        log::info!(
            "Opening streams: input={}, output={}",
            describe(&input),
            describe(&output)
        );
        let stream = self.backend.open_duplex(&request, Box::new(processor), on_fault)?;
        self.counters.stream_opens.fetch_add(1, Ordering::Relaxed);

        let format = stream.format();
        lc.stream = Some(stream);
        lc.generation = Some(generation);
        lc.format = Some(format);
        lc.input = input;
        lc.output = output;
        lc.sink = Some(RecordingSink::new(
            consumer,
            tap_flags,
            format.sample_rate,
            self.config.recording_flush_interval,
        ));

        if let Some(stream) = lc.stream.as_mut() {
            stream.start()?;
        }

        if !wait_for_flag(&first_block, self.config.first_block_timeout) {
            return Err(EngineError::StreamOpenFailure(format!(
                "no audio processed within {} ms",
                self.config.first_block_timeout.as_millis()
            )));
        }
        log::info!(
            "Audio running at {} Hz, {} channel(s), {} frames per block",
            format.sample_rate,
            format.channels,
            format.block_frames
        );
        Ok(())
    }

    /// Release the stream, the recording session and any voice route.
    fn teardown(&self, lc: &mut Lifecycle) {
        if let Some(mut sink) = lc.sink.take() {
            match sink.finish() {
                Ok(Some(finished)) => self.notify(EngineNotification::RecordingFinished(finished.result)),
                Ok(None) => {}
                Err(e) => self.notify(EngineNotification::RecordingFailed(e)),
            }
        }
        if let Some(mut stream) = lc.stream.take() {
            stream.stop();
        }
        if lc.routed {
            self.router.clear_route();
            lc.routed = false;
        }
        lc.generation = None;
        lc.format = None;
        lc.input = None;
        lc.output = None;
        self.meter.clear();
    }

    fn stop(&self) {
        let mut lc = self.lifecycle.lock();
        lc.epoch += 1;
        self.stop_locked(&mut lc);
    }

    fn stop_locked(&self, lc: &mut Lifecycle) {
        match self.state() {
            EngineState::Stopped => {}
            EngineState::Failed(_) => {
                self.teardown(lc);
                self.set_state(EngineState::Stopped);
            }
            _ => {
                self.set_state(EngineState::Stopping);
                self.teardown(lc);
                self.set_state(EngineState::Stopped);
            }
        }
    }

    fn restart(&self) -> Result<RestartOutcome, EngineError> {
        let Some(_gate) = self.restart_gate.try_lock() else {
            log::info!("Restart already in progress, skipping");
            return Ok(RestartOutcome::Skipped);
        };

        let epoch = {
            let mut lc = self.lifecycle.lock();
            if !self.state().is_running() {
                return Ok(RestartOutcome::NotRunning);
            }
            log::info!("Restarting audio");
            self.stop_locked(&mut lc);
            lc.epoch
        };

        let policy = self.config.retry_policy.clone();
        thread::sleep(policy.settle_delay);

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                thread::sleep(policy.retry_delay);
            }
            let mut lc = self.lifecycle.lock();
            if lc.epoch != epoch {
                log::info!("Restart superseded by {} while settling", self.state().name());
                return Ok(RestartOutcome::Superseded);
            }
            match self.start_locked(&mut lc) {
                Ok(()) => {
                    log::info!("Audio restarted (attempt {})", attempt);
                    return Ok(RestartOutcome::Restarted);
                }
                Err(e) => log::warn!("Restart attempt {}/{} failed: {}", attempt, policy.max_attempts, e),
            }
        }

        {
            let mut lc = self.lifecycle.lock();
            if lc.epoch != epoch {
                log::info!("Restart superseded by {} after its last attempt", self.state().name());
                return Ok(RestartOutcome::Superseded);
            }
            self.stop_locked(&mut lc);
        }
        let error = EngineError::RestartExhausted {
            attempts: policy.max_attempts,
        };
        log::error!("{}", error);
        self.notify(EngineNotification::RestartExhausted(error.clone()));
        Err(error)
    }

    fn start_recording(&self, file: Box<dyn RecordingTarget>) -> Result<(), EngineError> {
        let mut lc = self.lifecycle.lock();
        if !self.state().is_running() {
            return Err(EngineError::InvalidState("recording requires a running engine".into()));
        }
        let sink = lc
            .sink
            .as_mut()
            .ok_or_else(|| EngineError::InvalidState("no open stream".into()))?;

        let tx = self.events.clone();
        sink.start(
            file,
            Box::new(move |session, error| {
                let _ = tx.send(CoordinatorEvent::RecordingFailed { session, error });
            }),
        )?;
        Ok(())
    }

    fn stop_recording(&self) -> Result<Option<FinishedRecording>, EngineError> {
        let mut lc = self.lifecycle.lock();
        let Some(sink) = lc.sink.as_mut() else {
            return Ok(None);
        };
        let finished = sink.finish()?;
        if let Some(finished) = &finished {
            self.notify(EngineNotification::RecordingFinished(finished.result.clone()));
        }
        Ok(finished)
    }

    // --- Coordinator ---

    fn run_coordinator(&self, rx: Receiver<CoordinatorEvent>) {
        for event in rx.iter() {
            match event {
                CoordinatorEvent::TopologyChanged { inputs, outputs } => self.on_topology_changed(inputs, outputs),
                CoordinatorEvent::StreamFault { generation, fault } => self.on_stream_fault(generation, fault),
                CoordinatorEvent::RecordingFailed { session, error } => self.on_recording_failed(session, error),
                CoordinatorEvent::Shutdown => break,
            }
        }
        log::debug!("Engine coordinator exiting");
    }

    fn on_topology_changed(&self, inputs: Vec<DeviceDescriptor>, outputs: Vec<DeviceDescriptor>) {
        log::info!("Audio devices changed: {} input(s), {} output(s)", inputs.len(), outputs.len());
        self.notify(EngineNotification::DevicesChanged {
            inputs: inputs.clone(),
            outputs: outputs.clone(),
        });

        let needs_restart = {
            let mut lc = self.lifecycle.lock();
            if !self.state().is_running() {
                return;
            }

            let configured_output = self.control.output_device_id();
            let explicit_output_lost = match (&lc.output, configured_output) {
                (Some(open), Some(id)) => open.id == id && !outputs.iter().any(|d| d.id == id),
                _ => false,
            };

            if outputs.is_empty() || explicit_output_lost {
                log::warn!("Output device lost, stopping audio");
                self.stop_locked(&mut lc);
                self.notify(EngineNotification::DeviceLost(EngineError::TransientDeviceLoss));
                return;
            }

            let input = resolve_device(self.control.input_device_id(), &inputs, &INPUT_PREFERENCE);
            let output = resolve_device(configured_output, &outputs, &OUTPUT_PREFERENCE);
            ids(&input) != ids(&lc.input) || ids(&output) != ids(&lc.output)
        };

        if needs_restart {
            if let Err(e) = self.restart() {
                log::error!("Failed to follow device change: {}", e);
            }
        }
    }

    fn on_stream_fault(&self, generation: u64, fault: StreamFault) {
        let mut lc = self.lifecycle.lock();
        if lc.generation != Some(generation) {
            log::debug!("Ignoring fault from stale stream generation {}", generation);
            return;
        }

        match fault {
            StreamFault::Disconnected => {
                log::warn!("Audio device disconnected");
                self.stop_locked(&mut lc);
                self.notify(EngineNotification::DeviceLost(EngineError::TransientDeviceLoss));
            }
            StreamFault::Other(message) => {
                log::error!("Audio stream fault: {}", message);
                let error = EngineError::StreamFault(message);
                self.teardown(&mut lc);
                self.set_state(EngineState::Failed(error.clone()));
                self.notify(EngineNotification::StreamFailed(error));
            }
        }
    }

    fn on_recording_failed(&self, session: u64, error: EngineError) {
        let mut lc = self.lifecycle.lock();
        let Some(sink) = lc.sink.as_mut() else {
            return;
        };
        if sink.session_id() != Some(session) {
            return;
        }
        // The writer already stopped; finishing collects its error.
        match sink.finish() {
            Err(e) => self.notify(EngineNotification::RecordingFailed(e)),
            Ok(_) => self.notify(EngineNotification::RecordingFailed(error)),
        }
    }
}

fn ids(device: &Option<DeviceDescriptor>) -> Option<DeviceId> {
    device.as_ref().map(|d| d.id)
}

fn describe(device: &Option<DeviceDescriptor>) -> String {
    device
        .as_ref()
        .map(DeviceDescriptor::display_name)
        .unwrap_or_else(|| "platform default".into())
}

fn wait_for_flag(flag: &AtomicBool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if flag.load(Ordering::Acquire) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
