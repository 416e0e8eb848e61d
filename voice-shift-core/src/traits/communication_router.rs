use crate::models::device::DeviceDescriptor;
use crate::models::error::EngineError;

/// Establishes the platform's voice-call route to a low-latency Bluetooth
/// device before streams to it are opened.
pub trait CommunicationRouter: Send + Sync {
    fn route_to(&self, device: &DeviceDescriptor) -> Result<(), EngineError>;

    /// Tear down whatever `route_to` set up. Idempotent.
    fn clear_route(&self);
}

/// Router for platforms where the audio stack handles Bluetooth routing itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRouter;

impl CommunicationRouter for NoopRouter {
    fn route_to(&self, device: &DeviceDescriptor) -> Result<(), EngineError> {
        log::debug!("No communication routing needed for {}", device.display_name());
        Ok(())
    }

    fn clear_route(&self) {}
}
