pub mod engine;
pub mod recording_sink;
