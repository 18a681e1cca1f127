pub mod audio_graph;
pub mod classifier;
pub mod config;
pub mod console_display;
pub mod data_logger;
pub mod dsp;
pub mod encoder;
pub mod error;
pub mod estimator;
pub mod history;
pub mod microphone;
pub mod notes;
pub mod pattern;
pub mod pitch_loop;
pub mod playback;
pub mod recorder;
pub mod render;
pub mod session;
pub mod synth;
pub mod timeline;
pub mod types;
pub mod wav_source;

#[cfg(feature = "audio")]
pub mod audio_input;
#[cfg(feature = "audio")]
pub mod audio_output;
