use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the engine
///
/// Every field has a default, so a JSON file only needs to name the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preferred output rate; the headless driver always uses it
    pub sample_rate: u32,
    pub command_queue_capacity: usize,
    pub event_queue_capacity: usize,
    /// Node slots reserved in the render graph up front
    pub max_nodes: usize,
    /// How far ahead of the clock the metronome schedules ticks
    pub lookahead_secs: f64,
    /// Interval the host should call `AudioEngine::poll` at
    pub poll_interval_ms: u64,
    /// Extra time after a note's hard end before its oscillator is reclaimed
    pub cleanup_grace_secs: f64,
    /// Analyser window for level metering
    pub meter_window_frames: usize,
    pub default_bpm: f64,
    /// Ramp length for track and master gain changes
    pub gain_smoothing_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            command_queue_capacity: 4096,
            event_queue_capacity: 1024,
            max_nodes: 4096,
            lookahead_secs: 0.2,
            poll_interval_ms: 25,
            cleanup_grace_secs: 0.05,
            meter_window_frames: 2048,
            default_bpm: 120.0,
            gain_smoothing_secs: 0.01,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config from a JSON file on disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "lookahead_secs": 0.1, "default_bpm": 90 }"#)
            .unwrap();

        assert_eq!(config.lookahead_secs, 0.1);
        assert_eq!(config.default_bpm, 90.0);
        assert_eq!(config.poll_interval_ms, 25);
        assert_eq!(config.meter_window_frames, 2048);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = EngineConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Config(_)));
    }
}
