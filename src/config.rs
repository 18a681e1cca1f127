//! Engine tuning knobs that are safe to change per installation.
//!
//! The visual scale, time window, playhead position, history cap and hit
//! threshold are fixed constants in their own modules; only rates, sizes and
//! estimator sensitivity live here.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target renderer frame rate (Hz)
    pub fps: u32,
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// Samples the estimator analyses per request
    pub analysis_window: usize,
    /// RMS below this is treated as silence
    pub amplitude_threshold: f32,
    /// Estimates outside this range are reported as "no pitch"
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// Sample rate for simulated sources and guide-tone synthesis
    pub sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            canvas_width: 600.0,
            canvas_height: 200.0,
            analysis_window: 2048,
            amplitude_threshold: 0.01,
            min_frequency_hz: 50.0,
            max_frequency_hz: 2000.0,
            sample_rate: 44100,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Falls back to defaults if absent or malformed.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) => {
                warn!("Config {:?} not readable ({}), using defaults", path, e);
                return Self::default();
            }
        };
        match serde_json::from_str(&data) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                c
            }
            Err(e) => {
                warn!("Failed to parse config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// Interval between renderer frames.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let cfg = EngineConfig {
            fps: 30,
            amplitude_threshold: 0.02,
            ..EngineConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path), cfg);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "fps": 24 }"#).unwrap();
        let cfg = EngineConfig::load(&path);
        assert_eq!(cfg.fps, 24);
        assert_eq!(cfg.analysis_window, 2048);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = EngineConfig::load(Path::new("/definitely/not/here.json"));
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_frame_interval() {
        let cfg = EngineConfig::default();
        let ms = cfg.frame_interval().as_secs_f64() * 1000.0;
        assert!((ms - 16.667).abs() < 0.01);
    }
}
