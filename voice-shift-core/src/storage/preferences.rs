use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::models::error::EngineError;
use crate::models::preferences::StoredPreferences;

/// Read stored preferences from a JSON file.
///
/// A missing file yields the defaults; a malformed one is an error.
pub fn load_preferences(path: &Path) -> Result<StoredPreferences, EngineError> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No preferences at {}, using defaults", path.display());
            return Ok(StoredPreferences::default());
        }
        Err(e) => {
            return Err(EngineError::ConfigurationFailed(format!(
                "failed to read preferences: {}",
                e
            )))
        }
    };
    serde_json::from_str(&json)
        .map_err(|e| EngineError::ConfigurationFailed(format!("failed to parse preferences: {}", e)))
}

/// Write preferences as pretty-printed JSON, creating parent directories.
pub fn save_preferences(preferences: &StoredPreferences, path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::ConfigurationFailed(format!("failed to create directory: {}", e)))?;
    }
    let json = serde_json::to_string_pretty(preferences)
        .map_err(|e| EngineError::ConfigurationFailed(format!("failed to serialize preferences: {}", e)))?;
    fs::write(path, json)
        .map_err(|e| EngineError::ConfigurationFailed(format!("failed to write preferences: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("voice_shift_prefs_{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let prefs = load_preferences(&temp_path("absent.json")).unwrap();
        assert_eq!(prefs, StoredPreferences::default());
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("saved.json");
        let prefs = StoredPreferences {
            pitch: 1.3,
            gain: 7,
            output_device_id: Some(12),
            is_noise_cancellation_on: true,
            ..Default::default()
        };
        save_preferences(&prefs, &path).unwrap();
        assert_eq!(load_preferences(&path).unwrap(), prefs);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = temp_path("broken.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_preferences(&path), Err(EngineError::ConfigurationFailed(_))));
        fs::remove_file(&path).ok();
    }
}
