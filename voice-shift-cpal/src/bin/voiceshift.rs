//! voiceshift - live pitch/gain voice monitor
//!
//! Captures the microphone, shifts its pitch, applies gain (or noise
//! suppression) and plays it back on headphones. Optionally records the
//! processed signal to a WAV file.
//!
//! With `--seconds 0` the driver reads commands from stdin:
//!
//! ```text
//! pitch <0.5..1.5>   gain <1..10>   nc on|off   rate <hz|0>
//! in <id|auto>       out <id|auto>  restart     levels
//! rec <path>         stoprec        devices     quit
//! ```

use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use voice_shift_core::{
    load_preferences, save_preferences, AudioEngine, DeviceDescriptor, DeviceDirection, DeviceEnumerator, DeviceId,
    EngineConfiguration, EngineNotification, GainMode, StoredPreferences,
};
use voice_shift_cpal::{available_host_names, CpalBackend, CpalBackendConfig, CpalDeviceEnumerator};

#[derive(Parser, Debug)]
#[command(name = "voiceshift", version, about = "Live pitch/gain voice monitor")]
struct Args {
    /// List audio devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Audio host ("ALSA", "JACK", "WASAPI", "CoreAudio"...). Defaults to the platform host.
    #[arg(long)]
    host: Option<String>,

    /// Hide built-in speakers and unclassified devices (mobile voice policy).
    #[arg(long)]
    voice_policy: bool,

    /// Pitch ratio, 0.5 to 1.5.
    #[arg(long)]
    pitch: Option<f32>,

    /// Gain level, 1 to 10.
    #[arg(long)]
    gain: Option<i32>,

    /// Enable noise suppression.
    #[arg(long)]
    noise_cancellation: bool,

    /// Input device id (see --list-devices).
    #[arg(long)]
    input: Option<u32>,

    /// Output device id (see --list-devices).
    #[arg(long)]
    output: Option<u32>,

    /// Sample rate in Hz; 0 uses the output device's native rate.
    #[arg(long, default_value_t = 0)]
    sample_rate: i32,

    /// Frames per processing block.
    #[arg(long, default_value_t = 256)]
    block_frames: usize,

    /// Record the processed signal to this WAV file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Run for this many seconds; 0 reads commands from stdin until `quit`.
    #[arg(long, default_value_t = 0)]
    seconds: u64,

    /// Load preferences from this JSON file and save them back on exit.
    #[arg(long)]
    prefs: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let mut backend_config = if args.voice_policy {
        CpalBackendConfig::default()
    } else {
        CpalBackendConfig::desktop()
    };
    backend_config.host = args.host.clone();

    let enumerator = Arc::new(CpalDeviceEnumerator::new(backend_config.clone()).with_context(|| {
        format!(
            "failed to open audio host (available: {})",
            available_host_names().join(", ")
        )
    })?);

    if args.list_devices {
        print_devices(&enumerator.list_input_devices(), &enumerator.list_output_devices());
        return Ok(());
    }

    let preferences = match &args.prefs {
        Some(path) => load_preferences(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => StoredPreferences::default(),
    };

    let config = EngineConfiguration {
        initial_parameters: preferences.to_parameters(),
        block_frames: args.block_frames,
        ..Default::default()
    };
    let engine = AudioEngine::new(
        config,
        Arc::new(CpalBackend::new(backend_config)),
        enumerator,
        Arc::new(voice_shift_core::NoopRouter),
    )
    .context("invalid engine configuration")?;
    engine.set_delegate(Arc::new(report));

    apply_args(&engine, &args);
    engine.start().context("failed to start audio")?;

    if let Some(path) = &args.record {
        start_recording(&engine, path)?;
    }

    if args.seconds > 0 {
        std::thread::sleep(Duration::from_secs(args.seconds));
    } else {
        run_commands(&engine)?;
    }

    finish_recording(&engine);
    engine.stop();

    if let Some(path) = &args.prefs {
        save_preferences(&StoredPreferences::from_parameters(&engine.parameters()), path)
            .with_context(|| format!("failed to save {}", path.display()))?;
    }

    let diagnostics = engine.diagnostics();
    log::info!(
        "Processed {} blocks ({} capture underruns, {} recording overruns, {} stream opens)",
        diagnostics.blocks_processed,
        diagnostics.capture_underruns,
        diagnostics.recording_overruns,
        diagnostics.stream_opens
    );
    Ok(())
}

fn apply_args(engine: &AudioEngine, args: &Args) {
    if let Some(pitch) = args.pitch {
        engine.set_pitch(pitch);
    }
    if let Some(gain) = args.gain {
        engine.set_gain(gain);
    }
    if args.noise_cancellation {
        engine.set_gain_mode(GainMode::NoiseCancellation);
    }
    if let Some(id) = args.input {
        select_device(engine, DeviceDirection::Input, id);
    }
    if let Some(id) = args.output {
        select_device(engine, DeviceDirection::Output, id);
    }
    engine.set_sample_rate(args.sample_rate);
}

fn select_device(engine: &AudioEngine, direction: DeviceDirection, id: DeviceId) {
    let found = match direction {
        DeviceDirection::Input => engine.find_input_device(id),
        DeviceDirection::Output => engine.find_output_device(id),
    };
    match found {
        Some(device) => println!("Selected {}", device.display_name()),
        None => println!("Device {} is not connected; it will be used once it appears.", id),
    }
    match direction {
        DeviceDirection::Input => engine.set_input_device_id(id),
        DeviceDirection::Output => engine.set_output_device_id(id),
    }
}

fn report(notification: &EngineNotification) {
    match notification {
        EngineNotification::StateChanged(state) => log::debug!("state: {}", state.name()),
        EngineNotification::DeviceLost(e) => println!("{}; audio stopped.", e),
        EngineNotification::StreamFailed(e) => println!("Audio failed: {}", e),
        EngineNotification::RestartExhausted(e) => println!("Could not reopen audio: {}", e),
        EngineNotification::RecordingFailed(e) => println!("Recording failed: {}", e),
        EngineNotification::RecordingFinished(r) => println!(
            "Recorded {:.1} s ({} frames, {} dropped), sha256 {}",
            r.duration_secs, r.frames_written, r.dropped_samples, r.checksum
        ),
        EngineNotification::DevicesChanged { inputs, outputs } => {
            println!("Devices changed:");
            print_devices(inputs, outputs);
        }
    }
}

fn print_devices(inputs: &[DeviceDescriptor], outputs: &[DeviceDescriptor]) {
    let print = |title: &str, devices: &[DeviceDescriptor]| {
        println!("{}:", title);
        if devices.is_empty() {
            println!("  (none)");
        }
        for d in devices {
            println!("  {}{}", d.display_name(), if d.is_default { " [default]" } else { "" });
        }
    };
    print("Inputs", inputs);
    print("Outputs", outputs);
}

fn start_recording(engine: &AudioEngine, path: &Path) -> Result<()> {
    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    engine
        .start_recording(file)
        .with_context(|| format!("failed to start recording to {}", path.display()))?;
    println!("Recording to {}", path.display());
    Ok(())
}

fn finish_recording(engine: &AudioEngine) {
    if let Err(e) = engine.stop_recording() {
        println!("Recording failed: {}", e);
    }
}

fn run_commands(engine: &AudioEngine) -> Result<()> {
    println!("Running. Type `quit` to stop.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let arg = words.next();
        match execute(engine, command, arg) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => println!("{:#}", e),
        }
    }
    Ok(())
}

/// Run one interactive command. `Ok(true)` means quit.
fn execute(engine: &AudioEngine, command: &str, arg: Option<&str>) -> Result<bool> {
    let value = || arg.context("missing argument");
    match command {
        "quit" | "exit" | "q" => return Ok(true),
        "pitch" => engine.set_pitch(value()?.parse().context("pitch must be a number")?),
        "gain" => engine.set_gain(value()?.parse().context("gain must be an integer")?),
        "nc" => match value()? {
            "on" => engine.set_gain_mode(GainMode::NoiseCancellation),
            "off" => engine.set_gain_mode(GainMode::Normal),
            other => bail!("expected on|off, got {}", other),
        },
        "rate" => {
            engine.set_sample_rate(value()?.parse().context("rate must be an integer")?);
            println!("Takes effect on the next restart.");
        }
        "in" => match value()? {
            "auto" => engine.reset_input_device_id(),
            id => select_device(engine, DeviceDirection::Input, id.parse().context("device id must be an integer")?),
        },
        "out" => match value()? {
            "auto" => engine.reset_output_device_id(),
            id => select_device(engine, DeviceDirection::Output, id.parse().context("device id must be an integer")?),
        },
        "restart" => {
            let outcome = engine.restart()?;
            println!("{:?}", outcome);
        }
        "start" => engine.start()?,
        "stop" => engine.stop(),
        "levels" => {
            let l = engine.levels();
            println!(
                "in {:.3} (peak {:.3})  out {:.3} (peak {:.3})",
                l.input_level, l.peak_input_level, l.output_level, l.peak_output_level
            );
        }
        "rec" => start_recording(engine, Path::new(value()?))?,
        "stoprec" => {
            if engine.stop_recording()?.is_none() {
                println!("Not recording.");
            }
        }
        "devices" => print_devices(&engine.list_input_devices(), &engine.list_output_devices()),
        "status" => {
            let p = engine.parameters();
            println!(
                "{}  pitch {:.2}  gain {}  {:?}  rate {:?}  recording {}",
                engine.state().name(),
                p.pitch_ratio,
                p.gain_level,
                p.gain_mode,
                p.sample_rate,
                engine.is_recording()
            );
        }
        other => bail!("unknown command: {}", other),
    }
    Ok(false)
}
