pub mod audio_backend;
pub mod communication_router;
pub mod device_enumerator;
pub mod engine_delegate;
