//! In-memory stand-ins for the platform seams, used by unit tests.

use std::f32::consts::PI;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::audio_models::StreamFormat;
use crate::models::device::{DeviceClass, DeviceDescriptor, DeviceDirection, DeviceId};
use crate::models::error::EngineError;
use crate::models::notification::EngineNotification;
use crate::traits::audio_backend::{AudioBackend, AudioCallback, DuplexStream, FaultCallback, StreamFault, StreamRequest};
use crate::traits::communication_router::CommunicationRouter;
use crate::traits::device_enumerator::{DeviceChangeCallback, DeviceEnumerator, SubscriberList, Subscription};
use crate::traits::engine_delegate::EngineDelegate;

pub fn mic(id: DeviceId) -> DeviceDescriptor {
    DeviceDescriptor::new(id, DeviceDirection::Input, DeviceClass::BuiltinMic, "Mic")
}

pub fn headphones(id: DeviceId) -> DeviceDescriptor {
    DeviceDescriptor::new(id, DeviceDirection::Output, DeviceClass::WiredHeadphones, "Headphones")
}

pub fn sco(id: DeviceId) -> DeviceDescriptor {
    DeviceDescriptor::new(id, DeviceDirection::Output, DeviceClass::BluetoothSco, "Buds")
}

pub fn a2dp(id: DeviceId) -> DeviceDescriptor {
    DeviceDescriptor::new(id, DeviceDirection::Output, DeviceClass::BluetoothA2dp, "Speaker")
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// --- Backend ---

struct FakeStreamShared {
    callback: Mutex<Box<dyn AudioCallback>>,
    on_fault: FaultCallback,
    format: StreamFormat,
    running: AtomicBool,
    phase: Mutex<f32>,
    request: StreamRequest,
}

impl FakeStreamShared {
    /// Run one block of a 440 Hz tone through the callback.
    fn pump(&self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let frames = self.format.block_frames;
        let mut input = vec![0.0f32; frames];
        {
            let mut phase = self.phase.lock();
            let step = 2.0 * PI * 440.0 / self.format.sample_rate as f32;
            for sample in input.iter_mut() {
                *sample = 0.1 * phase.sin();
                *phase = (*phase + step) % (2.0 * PI);
            }
        }
        let mut output = vec![0.0f32; frames];
        self.callback.lock().process(&input, &mut output);
    }
}

struct FakeStream {
    shared: Arc<FakeStreamShared>,
    deliver_on_start: bool,
}

impl DuplexStream for FakeStream {
    fn start(&mut self) -> Result<(), EngineError> {
        self.shared.running.store(true, Ordering::Release);
        if self.deliver_on_start {
            self.shared.pump();
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }

    fn format(&self) -> StreamFormat {
        self.shared.format
    }
}

/// Backend whose streams only produce audio when pumped.
///
/// `start()` runs one block synchronously so the engine sees its first block.
pub struct FakeBackend {
    native_rate: u32,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    deliver_on_start: AtomicBool,
    streams: Mutex<Vec<Arc<FakeStreamShared>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            native_rate: 48_000,
            opens: AtomicUsize::new(0),
            failing_opens: AtomicUsize::new(0),
            deliver_on_start: AtomicBool::new(true),
            streams: Mutex::new(Vec::new()),
        })
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// When false, started streams stay silent until pumped.
    pub fn set_deliver_on_start(&self, deliver: bool) {
        self.deliver_on_start.store(deliver, Ordering::SeqCst);
    }

    /// Run `blocks` blocks through the most recent stream.
    pub fn pump(&self, blocks: usize) {
        let latest = self.streams.lock().last().cloned();
        if let Some(stream) = latest {
            for _ in 0..blocks {
                stream.pump();
            }
        }
    }

    /// Report a fault from the stream opened `index`-th (0-based).
    pub fn fault(&self, index: usize, fault: StreamFault) {
        let stream = self.streams.lock().get(index).cloned();
        if let Some(stream) = stream {
            (stream.on_fault)(fault);
        }
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.streams.lock().last().map(|s| s.request.clone())
    }

    pub fn latest_running(&self) -> bool {
        self.streams
            .lock()
            .last()
            .map(|s| s.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

impl AudioBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn open_duplex(
        &self,
        request: &StreamRequest,
        mut callback: Box<dyn AudioCallback>,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn DuplexStream>, EngineError> {
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(EngineError::StreamOpenFailure("device busy".into()));
        }

        let format = StreamFormat {
            sample_rate: request.sample_rate.unwrap_or(self.native_rate),
            channels: 1,
            block_frames: request.block_frames,
        };
        callback.prepare(&format);

        let shared = Arc::new(FakeStreamShared {
            callback: Mutex::new(callback),
            on_fault,
            format,
            running: AtomicBool::new(false),
            phase: Mutex::new(0.0),
            request: request.clone(),
        });
        self.streams.lock().push(Arc::clone(&shared));
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeStream {
            shared,
            deliver_on_start: self.deliver_on_start.load(Ordering::SeqCst),
        }))
    }
}

// --- Enumerator ---

pub struct FakeEnumerator {
    inputs: Mutex<Vec<DeviceDescriptor>>,
    outputs: Mutex<Vec<DeviceDescriptor>>,
    subscribers: Arc<SubscriberList>,
}

impl FakeEnumerator {
    pub fn new(inputs: Vec<DeviceDescriptor>, outputs: Vec<DeviceDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            inputs: Mutex::new(inputs),
            outputs: Mutex::new(outputs),
            subscribers: SubscriberList::new(),
        })
    }

    /// Replace the output set and emit a change event.
    pub fn set_outputs(&self, outputs: Vec<DeviceDescriptor>) {
        *self.outputs.lock() = outputs;
        self.emit();
    }

    pub fn set_inputs(&self, inputs: Vec<DeviceDescriptor>) {
        *self.inputs.lock() = inputs;
        self.emit();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn emit(&self) {
        let inputs = self.inputs.lock().clone();
        let outputs = self.outputs.lock().clone();
        self.subscribers.notify(&inputs, &outputs);
    }
}

impl DeviceEnumerator for FakeEnumerator {
    fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        self.inputs.lock().clone()
    }

    fn list_output_devices(&self) -> Vec<DeviceDescriptor> {
        self.outputs.lock().clone()
    }

    fn subscribe(&self, callback: DeviceChangeCallback) -> Subscription {
        self.subscribers.add(callback)
    }
}

// --- Router / delegate ---

#[derive(Default)]
pub struct RecordingRouter {
    pub routes: Mutex<Vec<DeviceId>>,
    pub clears: AtomicUsize,
}

impl CommunicationRouter for RecordingRouter {
    fn route_to(&self, device: &DeviceDescriptor) -> Result<(), EngineError> {
        self.routes.lock().push(device.id);
        Ok(())
    }

    fn clear_route(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Delegate that keeps every notification it receives.
#[derive(Default)]
pub struct CollectingDelegate {
    events: Mutex<Vec<EngineNotification>>,
}

impl CollectingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EngineNotification> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineNotification) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&EngineNotification) -> bool) -> bool {
        wait_until(timeout, || self.count(&predicate) > 0)
    }
}

impl EngineDelegate for CollectingDelegate {
    fn on_notification(&self, notification: &EngineNotification) {
        self.events.lock().push(notification.clone());
    }
}

// --- Recording ---

/// In-memory recording target that starts refusing writes on demand.
/// Clones share the same buffer and switch.
#[derive(Clone, Default)]
pub struct FailingTarget {
    buffer: Arc<Mutex<Cursor<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl FailingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_from_now(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn bytes_written(&self) -> usize {
        self.buffer.lock().get_ref().len()
    }
}

impl Write for FailingTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.buffer.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FailingTarget {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.lock().seek(pos)
    }
}
