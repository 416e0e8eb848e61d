pub mod preferences;
pub mod recording_writer;
