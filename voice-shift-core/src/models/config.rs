use std::time::Duration;

use super::parameters::EngineParameters;

/// How `restart()` re-opens the device after stopping.
///
/// ```text
/// stop → sleep(settle_delay) → start ─ok→ done
///                                 └fail→ sleep(retry_delay) → start ... (max_attempts)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Start attempts after the stop, including the first one (>= 1).
    pub max_attempts: u32,
    /// Pause between closing the device and the first re-open.
    pub settle_delay: Duration,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no delays. Handy for tests and offline drivers.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 1,
            settle_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            settle_delay: Duration::from_millis(500),
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Configuration for an engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfiguration {
    /// Initial parameter values (normally restored from stored preferences).
    pub initial_parameters: EngineParameters,

    /// Preferred frames per processing block (default: 256).
    pub block_frames: usize,

    /// Capacity of the capture → render queue, in frames (default: 8192).
    pub capture_ring_frames: usize,

    /// Capacity of the processed → recording queue, in frames (default: 2 s at 48 kHz).
    pub recording_ring_frames: usize,

    pub retry_policy: RetryPolicy,

    /// How long `start()` waits for the first processed block (default: 2 s).
    pub first_block_timeout: Duration,

    /// Period of the recording writer's drain loop (default: 20 ms).
    pub recording_flush_interval: Duration,
}

impl EngineConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_frames == 0 || self.block_frames > 8192 {
            return Err(format!("unsupported block size: {}", self.block_frames));
        }
        if self.capture_ring_frames < self.block_frames * 2 {
            return Err("capture ring must hold at least two blocks".into());
        }
        if self.recording_ring_frames < self.block_frames * 2 {
            return Err("recording ring must hold at least two blocks".into());
        }
        if self.retry_policy.max_attempts == 0 {
            return Err("retry policy needs at least one attempt".into());
        }
        if self.recording_flush_interval.is_zero() {
            return Err("recording flush interval must be positive".into());
        }
        Ok(())
    }
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            initial_parameters: EngineParameters::default(),
            block_frames: 256,
            capture_ring_frames: 8192,
            recording_ring_frames: 96_000,
            retry_policy: RetryPolicy::default(),
            first_block_timeout: Duration::from_secs(2),
            recording_flush_interval: Duration::from_millis(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        assert!(EngineConfiguration::default().validate().is_ok());
    }

    #[test]
    fn default_retry_policy_matches_two_half_second_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.settle_delay, Duration::from_millis(500));
        assert_eq!(policy.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn rejects_zero_attempts() {
        let config = EngineConfiguration {
            retry_policy: RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::immediate()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_undersized_rings() {
        let config = EngineConfiguration {
            block_frames: 1024,
            capture_ring_frames: 1500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
