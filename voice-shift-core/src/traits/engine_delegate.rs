use crate::models::notification::EngineNotification;

/// Receives asynchronous engine outcomes.
///
/// Called from the engine's coordinator thread or from the thread running
/// the coordination call, never from the audio callback. Implementations
/// should marshal to a UI thread if they need one.
pub trait EngineDelegate: Send + Sync {
    fn on_notification(&self, notification: &EngineNotification);
}

impl<F> EngineDelegate for F
where
    F: Fn(&EngineNotification) + Send + Sync,
{
    fn on_notification(&self, notification: &EngineNotification) {
        self(notification)
    }
}
