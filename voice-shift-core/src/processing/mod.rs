pub mod dsp_stage;
pub mod gain;
pub mod levels;
pub mod pitch_shifter;
pub mod ring_buffer;
pub mod wav_format;
