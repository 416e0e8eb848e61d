//! cpal implementation of [`AudioBackend`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  write()  ┌──────────────────┐  read_into()  ┌───────────────┐
//! │ Input stream │──────────►│   Capture ring   │──────────────►│ Output stream │
//! │  (downmix)   │           │ (lock-free SPSC) │               │ (owns engine  │
//! └──────────────┘           └──────────────────┘               │  callback)    │
//!                                                               └───────────────┘
//! ```
//!
//! The output callback pulls one block at a time, zero-fills whatever the
//! capture side has not delivered yet, runs the engine callback and fans the
//! mono result out to every device channel.
//!
//! `cpal::Stream` is not `Send` on every host, so both streams are built,
//! played and dropped on one dedicated thread. The handle returned to the
//! engine only holds a command channel to it.

use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig, StreamError,
    SupportedBufferSize, SupportedStreamConfig,
};
use crossbeam_channel::{Receiver, Sender};

use voice_shift_core::models::device::DeviceDirection;
use voice_shift_core::processing::ring_buffer::{RingConsumer, RingProducer};
use voice_shift_core::processing::wav_format::{downmix_into, fan_out};
use voice_shift_core::{
    AudioBackend, AudioCallback, DuplexStream, EngineError, FaultCallback, RingBuffer, StreamFault, StreamFormat,
    StreamRequest,
};

use crate::config::CpalBackendConfig;
use crate::device_enumerator::{find_device, select_host};
use crate::error::{CpalBackendError, CpalResult};

/// Frames converted per pass in the capture callback.
const CAPTURE_CHUNK_FRAMES: usize = 1024;

/// Backlog (in blocks) above which stale capture is discarded.
const MAX_BACKLOG_BLOCKS: usize = 4;

/// Opens duplex streams on a cpal host.
pub struct CpalBackend {
    config: CpalBackendConfig,
}

impl CpalBackend {
    pub fn new(config: CpalBackendConfig) -> Self {
        Self { config }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_duplex(
        &self,
        request: &StreamRequest,
        callback: Box<dyn AudioCallback>,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn DuplexStream>, EngineError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<CpalResult<StreamFormat>>(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<StreamCommand>();
        let request = request.clone();
        let host = self.config.host.clone();

        let host_thread = thread::Builder::new()
            .name("cpal-streams".into())
            .spawn(move || {
                let streams = match build_streams(host.as_deref(), &request, callback, on_fault) {
                    Ok((streams, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        streams
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_stream_host(streams, command_rx);
            })
            .map_err(|e| EngineError::StreamOpenFailure(format!("failed to spawn stream thread: {}", e)))?;

        let format = match ready_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = host_thread.join();
                return Err(e.into());
            }
            Err(_) => {
                // The thread may still finish building; closing the channel
                // makes it drop whatever it built.
                drop(command_tx);
                return Err(EngineError::StreamOpenFailure(format!(
                    "device did not open within {} ms",
                    self.config.open_timeout.as_millis()
                )));
            }
        };

        Ok(Box::new(CpalDuplexStream {
            commands: command_tx,
            host_thread: Some(host_thread),
            format,
            playing: false,
            timeout: self.config.open_timeout,
        }))
    }
}

enum StreamCommand {
    Play(Sender<CpalResult<()>>),
    Pause,
    Close,
}

struct Streams {
    input: Stream,
    output: Stream,
}

impl Streams {
    fn play(&self) -> CpalResult<()> {
        // Capture first so the first render block has something to pull.
        self.input
            .play()
            .map_err(|e| CpalBackendError::StreamPlay(format!("input: {}", e)))?;
        self.output
            .play()
            .map_err(|e| CpalBackendError::StreamPlay(format!("output: {}", e)))
    }

    fn pause(&self) {
        if let Err(e) = self.output.pause() {
            log::warn!("Failed to pause output stream: {}", e);
        }
        if let Err(e) = self.input.pause() {
            log::warn!("Failed to pause input stream: {}", e);
        }
    }
}

fn run_stream_host(streams: Streams, commands: Receiver<StreamCommand>) {
    for command in commands.iter() {
        match command {
            StreamCommand::Play(ack) => {
                let _ = ack.send(streams.play());
            }
            StreamCommand::Pause => streams.pause(),
            StreamCommand::Close => break,
        }
    }
    streams.pause();
    log::debug!("cpal streams closed");
}

/// Handle to a pair of streams living on their host thread.
struct CpalDuplexStream {
    commands: Sender<StreamCommand>,
    host_thread: Option<thread::JoinHandle<()>>,
    format: StreamFormat,
    playing: bool,
    timeout: Duration,
}

impl DuplexStream for CpalDuplexStream {
    fn start(&mut self) -> Result<(), EngineError> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(StreamCommand::Play(ack_tx))
            .map_err(|_| EngineError::from(CpalBackendError::StreamThreadGone))?;
        match ack_rx.recv_timeout(self.timeout) {
            Ok(result) => result?,
            Err(_) => return Err(CpalBackendError::StreamThreadGone.into()),
        }
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.playing {
            let _ = self.commands.send(StreamCommand::Pause);
            self.playing = false;
        }
    }

    fn format(&self) -> StreamFormat {
        self.format
    }
}

impl Drop for CpalDuplexStream {
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Close);
        if let Some(handle) = self.host_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Resolve both devices, negotiate one sample rate and build the streams.
fn build_streams(
    host_name: Option<&str>,
    request: &StreamRequest,
    mut callback: Box<dyn AudioCallback>,
    on_fault: FaultCallback,
) -> CpalResult<(Streams, StreamFormat)> {
    let host = select_host(host_name)?;

    let output_device = match &request.output_device {
        Some(d) => find_device(&host, DeviceDirection::Output, d.id)?,
        None => host.default_output_device().ok_or(CpalBackendError::NoDevice("output"))?,
    };
    let input_device = match &request.input_device {
        Some(d) => find_device(&host, DeviceDirection::Input, d.id)?,
        None => host.default_input_device().ok_or(CpalBackendError::NoDevice("input"))?,
    };

    let output_supported = match pick_config(&output_device, DeviceDirection::Output, request.sample_rate) {
        Ok(c) => c,
        Err(CpalBackendError::UnsupportedRate { rate, .. }) => {
            log::warn!("Output device doesn't support {} Hz, using its native rate", rate);
            pick_config(&output_device, DeviceDirection::Output, None)?
        }
        Err(e) => return Err(e),
    };
    let rate = output_supported.sample_rate().0;
    // No resampling between capture and render: the input must run at the output rate.
    let input_supported = pick_config(&input_device, DeviceDirection::Input, Some(rate))?;

    let block = request.block_frames.max(1);
    let output_config = stream_config(&output_supported, block);
    let input_config = stream_config(&input_supported, block);

    let format = StreamFormat {
        sample_rate: rate,
        channels: 1,
        block_frames: block,
    };
    callback.prepare(&format);

    let capacity = request.capture_ring_frames.max(block * 2);
    let (producer, consumer) = RingBuffer::with_capacity(capacity).split();

    let capturer = Capturer::new(producer, input_config.channels as usize);
    let input = match input_supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&input_device, &input_config, capturer, on_fault.clone()),
        SampleFormat::I16 => build_input::<i16>(&input_device, &input_config, capturer, on_fault.clone()),
        SampleFormat::U16 => build_input::<u16>(&input_device, &input_config, capturer, on_fault.clone()),
        other => Err(CpalBackendError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    let renderer = Renderer::new(consumer, callback, output_config.channels as usize, block);
    let output = match output_supported.sample_format() {
        SampleFormat::F32 => build_output::<f32>(&output_device, &output_config, renderer, on_fault),
        SampleFormat::I16 => build_output::<i16>(&output_device, &output_config, renderer, on_fault),
        SampleFormat::U16 => build_output::<u16>(&output_device, &output_config, renderer, on_fault),
        other => Err(CpalBackendError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    log::info!(
        "cpal streams: {} Hz, input {} ch {:?}, output {} ch {:?}, {} frames per block",
        rate,
        input_config.channels,
        input_supported.sample_format(),
        output_config.channels,
        output_supported.sample_format(),
        block
    );

    Ok((Streams { input, output }, format))
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

/// Pick a device configuration: the device default when `rate` is `None`,
/// otherwise a config whose range contains `rate` (f32 preferred).
fn pick_config(device: &cpal::Device, direction: DeviceDirection, rate: Option<u32>) -> CpalResult<SupportedStreamConfig> {
    let direction_name = match direction {
        DeviceDirection::Input => "input",
        DeviceDirection::Output => "output",
    };

    let Some(rate) = rate else {
        let default = match direction {
            DeviceDirection::Input => device.default_input_config(),
            DeviceDirection::Output => device.default_output_config(),
        };
        return default.map_err(|e| CpalBackendError::Config(format!("{}: {}", direction_name, e)));
    };

    let ranges: Vec<_> = match direction {
        DeviceDirection::Input => device
            .supported_input_configs()
            .map_err(|e| CpalBackendError::Config(e.to_string()))?
            .collect(),
        DeviceDirection::Output => device
            .supported_output_configs()
            .map_err(|e| CpalBackendError::Config(e.to_string()))?
            .collect(),
    };

    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        is_supported_format(c.sample_format()) && rate >= c.min_sample_rate().0 && rate <= c.max_sample_rate().0
    };
    ranges
        .iter()
        .filter(in_range)
        .find(|c| c.sample_format() == SampleFormat::F32)
        .or_else(|| ranges.iter().find(in_range))
        .map(|c| c.clone().with_sample_rate(SampleRate(rate)))
        .ok_or(CpalBackendError::UnsupportedRate {
            rate,
            direction: direction_name,
        })
}

fn stream_config(supported: &SupportedStreamConfig, block_frames: usize) -> StreamConfig {
    StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: buffer_size_for(supported.buffer_size(), block_frames),
    }
}

/// Ask for `block_frames` when the device advertises it, else let the host decide.
fn buffer_size_for(supported: &SupportedBufferSize, block_frames: usize) -> BufferSize {
    let frames = block_frames as u32;
    match supported {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => BufferSize::Fixed(frames),
        _ => BufferSize::Default,
    }
}

fn fault_handler(on_fault: FaultCallback, side: &'static str) -> impl FnMut(StreamError) + Send + 'static {
    move |err| {
        let fault = match err {
            StreamError::DeviceNotAvailable => StreamFault::Disconnected,
            other => StreamFault::Other(format!("{} stream: {}", side, other)),
        };
        on_fault(fault);
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut capturer: Capturer,
    on_fault: FaultCallback,
) -> CpalResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| capturer.capture(data),
            fault_handler(on_fault, "input"),
            None,
        )
        .map_err(|e| CpalBackendError::StreamBuild(format!("input: {}", e)))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: Renderer,
    on_fault: FaultCallback,
) -> CpalResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| renderer.render(data),
            fault_handler(on_fault, "output"),
            None,
        )
        .map_err(|e| CpalBackendError::StreamBuild(format!("output: {}", e)))
}

/// Capture side: device samples → mono f32 → capture ring.
struct Capturer {
    producer: RingProducer,
    channels: usize,
    interleaved: Vec<f32>,
    mono: Vec<f32>,
}

impl Capturer {
    fn new(producer: RingProducer, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            producer,
            channels,
            interleaved: vec![0.0; CAPTURE_CHUNK_FRAMES * channels],
            mono: vec![0.0; CAPTURE_CHUNK_FRAMES],
        }
    }

    fn capture<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        for chunk in data.chunks(self.interleaved.len()) {
            let scratch = &mut self.interleaved[..chunk.len()];
            for (dst, &s) in scratch.iter_mut().zip(chunk) {
                *dst = f32::from_sample(s);
            }
            let frames = downmix_into(scratch, self.channels, &mut self.mono);
            // A full ring drops the newest capture; render catches up on its own.
            self.producer.write(&self.mono[..frames]);
        }
    }
}

/// Render side: capture ring → engine callback → every device channel.
struct Renderer {
    consumer: RingConsumer,
    callback: Box<dyn AudioCallback>,
    channels: usize,
    block: usize,
    captured: Vec<f32>,
    processed: Vec<f32>,
    interleaved: Vec<f32>,
}

impl Renderer {
    fn new(consumer: RingConsumer, callback: Box<dyn AudioCallback>, channels: usize, block: usize) -> Self {
        let channels = channels.max(1);
        Self {
            consumer,
            callback,
            channels,
            block,
            captured: vec![0.0; block],
            processed: vec![0.0; block],
            interleaved: vec![0.0; block * channels],
        }
    }

    fn render<T>(&mut self, data: &mut [T])
    where
        T: Sample + FromSample<f32>,
    {
        self.trim_backlog();
        for chunk in data.chunks_mut(self.block * self.channels) {
            let frames = chunk.len() / self.channels;
            let got = self.consumer.read_into(&mut self.captured[..frames]);
            if got < frames {
                self.captured[got..frames].fill(0.0);
                self.callback.capture_underrun(frames - got);
            }
            self.callback
                .process(&self.captured[..frames], &mut self.processed[..frames]);

            let interleaved = &mut self.interleaved[..chunk.len()];
            fan_out(&self.processed[..frames], self.channels, interleaved);
            for (dst, &s) in chunk.iter_mut().zip(interleaved.iter()) {
                *dst = T::from_sample(s);
            }
        }
    }

    /// Keep capture-to-render latency bounded when the input clock runs ahead.
    fn trim_backlog(&mut self) {
        let limit = self.block * MAX_BACKLOG_BLOCKS;
        let mut excess = self.consumer.count().saturating_sub(limit);
        while excess > 0 {
            let n = excess.min(self.captured.len());
            let read = self.consumer.read_into(&mut self.captured[..n]);
            if read == 0 {
                break;
            }
            excess -= read;
        }
    }
}
