//! # voice-shift-cpal
//!
//! Cross-platform backend for `voice-shift-core` built on cpal.
//!
//! ```text
//! voice-shift-cpal
//! ├── backend            ← CpalBackend (AudioBackend): input + output stream pair
//! ├── device_enumerator  ← CpalDeviceEnumerator (DeviceEnumerator): polling hot-plug
//! ├── config             ← CpalBackendConfig
//! └── error              ← CpalBackendError
//! ```

pub mod backend;
pub mod config;
pub mod device_enumerator;
pub mod error;

pub use backend::CpalBackend;
pub use config::CpalBackendConfig;
pub use device_enumerator::{host_name, CpalDeviceEnumerator};
pub use error::{CpalBackendError, CpalResult};

/// Names of the hosts cpal can use on this machine.
pub fn available_host_names() -> Vec<String> {
    cpal::available_hosts().into_iter().map(host_name).collect()
}
