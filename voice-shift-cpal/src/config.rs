use std::time::Duration;

use voice_shift_core::DeviceFilter;

/// Settings for the cpal backend and device enumerator.
#[derive(Debug, Clone)]
pub struct CpalBackendConfig {
    /// Host to use by name ("ALSA", "JACK", "WASAPI", "CoreAudio" ...).
    /// `None` = the platform default host.
    pub host: Option<String>,

    /// How often the enumerator re-scans devices (default: 1 s).
    pub poll_interval: Duration,

    /// Which device classes are surfaced.
    pub filter: DeviceFilter,

    /// How long `open_duplex` waits for the stream thread to build streams
    /// (default: 5 s).
    pub open_timeout: Duration,
}

impl Default for CpalBackendConfig {
    fn default() -> Self {
        Self {
            host: None,
            poll_interval: Duration::from_secs(1),
            filter: DeviceFilter::default(),
            open_timeout: Duration::from_secs(5),
        }
    }
}

impl CpalBackendConfig {
    /// Desktop-friendly: built-in speakers and unclassified devices are shown.
    pub fn desktop() -> Self {
        Self {
            filter: DeviceFilter::permissive(),
            ..Self::default()
        }
    }
}
