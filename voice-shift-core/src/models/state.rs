use super::error::EngineError;

/// Engine lifecycle state machine.
///
/// State transitions:
/// ```text
/// stopped → starting → running → stopping → stopped
///              ↓          ↓ (restart: stopping → starting)
///            failed ← ────┘ (unrecoverable stream fault)
/// failed → starting (explicit start) | stopped (explicit stop)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed(EngineError),
}

impl EngineState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether `start()` may be attempted from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// Whether this is a resting state (no transition in flight).
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Stopped | Self::Running | Self::Failed(_))
    }

    /// Short lowercase name, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_stopped() {
        assert!(EngineState::default().is_stopped());
    }

    #[test]
    fn only_resting_non_running_states_can_start() {
        assert!(EngineState::Stopped.can_start());
        assert!(EngineState::Failed(EngineError::DeviceUnavailable).can_start());
        assert!(!EngineState::Starting.can_start());
        assert!(!EngineState::Running.can_start());
        assert!(!EngineState::Stopping.can_start());
    }

    #[test]
    fn transitional_states_are_not_settled() {
        assert!(!EngineState::Starting.is_settled());
        assert!(!EngineState::Stopping.is_settled());
        assert!(EngineState::Running.is_settled());
    }
}
