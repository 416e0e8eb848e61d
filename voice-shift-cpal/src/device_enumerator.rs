//! Device discovery on top of cpal.
//!
//! cpal has no hot-plug notifications, so a background thread re-scans the
//! host every `poll_interval` and notifies subscribers when the filtered
//! device set changes. Device ids are derived from the device name so they
//! stay stable across scans and across runs (stored preferences keep them).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use voice_shift_core::{
    DeviceChangeCallback, DeviceClass, DeviceDescriptor, DeviceDirection, DeviceEnumerator, DeviceId, SubscriberList,
    Subscription,
};

use crate::config::CpalBackendConfig;
use crate::error::{CpalBackendError, CpalResult};

/// Human-readable name for a host id.
pub fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// The configured host, or the platform default.
pub(crate) fn select_host(name: Option<&str>) -> CpalResult<Host> {
    let Some(name) = name else {
        return Ok(cpal::default_host());
    };
    let host_id = cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id).eq_ignore_ascii_case(name))
        .ok_or_else(|| CpalBackendError::HostUnavailable(name.to_string()))?;
    cpal::host_from_id(host_id).map_err(|e| CpalBackendError::HostUnavailable(format!("{}: {}", name, e)))
}

/// Stable id for a device name. Inputs and outputs with the same name get
/// different ids.
pub fn device_id(direction: DeviceDirection, name: &str) -> DeviceId {
    let mut hasher = Sha256::new();
    hasher.update(match direction {
        DeviceDirection::Input => b"in:".as_slice(),
        DeviceDirection::Output => b"out:".as_slice(),
    });
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Guess the device class from its name.
pub fn classify(direction: DeviceDirection, name: &str) -> DeviceClass {
    let n = name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| n.contains(needle));

    if has(&["hands-free", "handsfree", "hfp", "hsp", "sco"]) {
        return DeviceClass::BluetoothSco;
    }
    if has(&["bluetooth", "a2dp", "airpods", "bluez"]) {
        return DeviceClass::BluetoothA2dp;
    }
    if has(&["usb"]) {
        return DeviceClass::Usb;
    }
    if has(&["headphone"]) {
        return DeviceClass::WiredHeadphones;
    }
    if has(&["headset"]) {
        return DeviceClass::WiredHeadset;
    }
    match direction {
        DeviceDirection::Input if has(&["microphone", "mic", "built-in", "internal"]) => DeviceClass::BuiltinMic,
        DeviceDirection::Output if has(&["speaker", "built-in", "internal"]) => DeviceClass::BuiltinSpeaker,
        _ => DeviceClass::Other,
    }
}

/// Enumerate one direction of `host`, unfiltered, paired with the cpal handle.
///
/// Duplicate names are suffixed ("name #2") before hashing so every
/// endpoint gets its own id.
pub(crate) fn scan(host: &Host, direction: DeviceDirection) -> Vec<(DeviceDescriptor, cpal::Device)> {
    let (devices, default_name) = match direction {
        DeviceDirection::Input => (
            host.input_devices().map(|d| d.collect::<Vec<_>>()),
            host.default_input_device().and_then(|d| d.name().ok()),
        ),
        DeviceDirection::Output => (
            host.output_devices().map(|d| d.collect::<Vec<_>>()),
            host.default_output_device().and_then(|d| d.name().ok()),
        ),
    };
    let devices = match devices {
        Ok(d) => d,
        Err(e) => {
            log::debug!("Could not enumerate {:?} devices: {}", direction, e);
            return Vec::new();
        }
    };

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(devices.len());
    for device in devices {
        let Ok(name) = device.name() else {
            continue;
        };
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        let unique = if *count == 1 {
            name.clone()
        } else {
            format!("{} #{}", name, count)
        };

        let mut descriptor = DeviceDescriptor::new(
            device_id(direction, &unique),
            direction,
            classify(direction, &name),
            unique,
        );
        descriptor.is_default = default_name.as_deref() == Some(name.as_str()) && *count == 1;
        result.push((descriptor, device));
    }
    result
}

/// Look up the cpal device behind a descriptor id.
pub(crate) fn find_device(host: &Host, direction: DeviceDirection, id: DeviceId) -> CpalResult<cpal::Device> {
    scan(host, direction)
        .into_iter()
        .find(|(d, _)| d.id == id)
        .map(|(_, device)| device)
        .ok_or(CpalBackendError::DeviceNotFound(id))
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Snapshot {
    inputs: Vec<DeviceDescriptor>,
    outputs: Vec<DeviceDescriptor>,
}

struct Shared {
    config: CpalBackendConfig,
    subscribers: Arc<SubscriberList>,
    /// Last delivered snapshot. Held for a whole poll (scan, compare and
    /// notify) so concurrent polls deliver in scan order.
    last: Mutex<Snapshot>,
}

impl Shared {
    fn snapshot(&self) -> Snapshot {
        let host = match select_host(self.config.host.as_deref()) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("{}", e);
                return Snapshot::default();
            }
        };
        let filter = &self.config.filter;
        let strip = |v: Vec<(DeviceDescriptor, cpal::Device)>| filter.apply(v.into_iter().map(|(d, _)| d).collect());
        Snapshot {
            inputs: strip(scan(&host, DeviceDirection::Input)),
            outputs: strip(scan(&host, DeviceDirection::Output)),
        }
    }

    /// Re-scan and notify subscribers if anything changed.
    fn poll(&self) {
        self.poll_with(|| self.snapshot());
    }

    fn poll_with(&self, scan: impl FnOnce() -> Snapshot) {
        let mut last = self.last.lock();
        let current = scan();
        if *last == current {
            return;
        }
        log::debug!(
            "Device set changed: {} input(s), {} output(s)",
            current.inputs.len(),
            current.outputs.len()
        );
        // Subscribers must not poll from inside the callback.
        self.subscribers.notify(&current.inputs, &current.outputs);
        *last = current;
    }
}

/// [`DeviceEnumerator`] backed by a cpal host.
pub struct CpalDeviceEnumerator {
    shared: Arc<Shared>,
    shutdown: Option<Sender<()>>,
    monitor: Option<thread::JoinHandle<()>>,
}

impl CpalDeviceEnumerator {
    /// Take an initial snapshot and start the polling thread.
    pub fn new(config: CpalBackendConfig) -> CpalResult<Self> {
        let poll_interval = config.poll_interval;
        let shared = Arc::new(Shared {
            config,
            subscribers: SubscriberList::new(),
            last: Mutex::new(Snapshot::default()),
        });
        *shared.last.lock() = shared.snapshot();

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let worker = Arc::clone(&shared);
        let monitor = thread::Builder::new()
            .name("device-monitor".into())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(poll_interval) {
                    Err(RecvTimeoutError::Timeout) => worker.poll(),
                    _ => break,
                }
            })
            .map_err(|e| CpalBackendError::Config(format!("failed to spawn device monitor: {}", e)))?;

        Ok(Self {
            shared,
            shutdown: Some(shutdown_tx),
            monitor: Some(monitor),
        })
    }

    /// Force a re-scan now instead of waiting for the next poll.
    pub fn refresh(&self) {
        self.shared.poll();
    }
}

impl DeviceEnumerator for CpalDeviceEnumerator {
    fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        self.shared.snapshot().inputs
    }

    fn list_output_devices(&self) -> Vec<DeviceDescriptor> {
        self.shared.snapshot().outputs
    }

    fn subscribe(&self, callback: DeviceChangeCallback) -> Subscription {
        self.shared.subscribers.add(callback)
    }
}

impl Drop for CpalDeviceEnumerator {
    fn drop(&mut self) {
        // Dropping the sender wakes the monitor with `Disconnected`.
        self.shutdown.take();
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_direction_specific() {
        let a = device_id(DeviceDirection::Output, "USB Audio CODEC");
        let b = device_id(DeviceDirection::Output, "USB Audio CODEC");
        let c = device_id(DeviceDirection::Input, "USB Audio CODEC");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, device_id(DeviceDirection::Output, "USB Audio CODEC #2"));
    }

    #[test]
    fn classifies_common_names() {
        use DeviceDirection::*;
        assert_eq!(classify(Output, "WH-1000XM4 Hands-Free AG Audio"), DeviceClass::BluetoothSco);
        assert_eq!(classify(Output, "bluez_sink.A0_B1.a2dp_sink"), DeviceClass::BluetoothA2dp);
        assert_eq!(classify(Output, "AirPods Pro"), DeviceClass::BluetoothA2dp);
        assert_eq!(classify(Output, "USB Audio CODEC"), DeviceClass::Usb);
        assert_eq!(classify(Output, "Headphones (Realtek Audio)"), DeviceClass::WiredHeadphones);
        assert_eq!(classify(Input, "Headset Microphone"), DeviceClass::WiredHeadset);
        assert_eq!(classify(Input, "MacBook Pro Microphone"), DeviceClass::BuiltinMic);
        assert_eq!(classify(Output, "MacBook Pro Speakers"), DeviceClass::BuiltinSpeaker);
        assert_eq!(classify(Output, "pipewire"), DeviceClass::Other);
    }

    #[test]
    fn builtin_class_follows_direction() {
        assert_eq!(classify(DeviceDirection::Output, "Internal Microphone"), DeviceClass::BuiltinSpeaker);
        assert_eq!(classify(DeviceDirection::Input, "Internal Microphone"), DeviceClass::BuiltinMic);
    }

    fn outputs(names: &[&str]) -> Snapshot {
        Snapshot {
            inputs: Vec::new(),
            outputs: names
                .iter()
                .map(|n| {
                    DeviceDescriptor::new(
                        device_id(DeviceDirection::Output, n),
                        DeviceDirection::Output,
                        classify(DeviceDirection::Output, n),
                        *n,
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn overlapping_polls_deliver_in_scan_order() {
        let shared = Arc::new(Shared {
            config: CpalBackendConfig::default(),
            subscribers: SubscriberList::new(),
            last: Mutex::new(Snapshot::default()),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = shared
            .subscribers
            .add(Arc::new(move |_: &[DeviceDescriptor], outputs: &[DeviceDescriptor]| {
                sink.lock().push(outputs.len());
            }));

        let slow = Arc::clone(&shared);
        let first = thread::spawn(move || {
            slow.poll_with(|| {
                thread::sleep(std::time::Duration::from_millis(100));
                outputs(&["Speakers"])
            })
        });
        thread::sleep(std::time::Duration::from_millis(20));
        shared.poll_with(|| outputs(&["Speakers", "USB Headphones"]));
        first.join().unwrap();

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(shared.last.lock().outputs.len(), 2);
    }

    #[test]
    fn unchanged_scan_is_not_delivered() {
        let shared = Shared {
            config: CpalBackendConfig::default(),
            subscribers: SubscriberList::new(),
            last: Mutex::new(outputs(&["Speakers"])),
        };
        let _sub = shared
            .subscribers
            .add(Arc::new(|_: &[DeviceDescriptor], _: &[DeviceDescriptor]| panic!("no change expected")));
        shared.poll_with(|| outputs(&["Speakers"]));
    }

    #[test]
    fn unknown_host_is_an_error() {
        assert!(matches!(
            select_host(Some("no-such-host")),
            Err(CpalBackendError::HostUnavailable(_))
        ));
    }
}
