pub mod audio_models;
pub mod config;
pub mod device;
pub mod error;
pub mod notification;
pub mod parameters;
pub mod preferences;
pub mod recording_result;
pub mod state;
