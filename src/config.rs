//! Transcriber configuration: notation header, layout and octave bounds,
//! tick periods and render options.
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below. CLI flags in `main` override individual fields afterwards.

use crate::error::ConfigError;
use crate::types::{RenderOptions, DEFAULT_HEADER, REST_SYMBOL};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Header template: `X:`, `T:`, `M:`, `L:`, `K:` fields, one per line
    pub header: String,
    /// Maximum number of note lines kept on screen (header excluded)
    pub max_lines: usize,
    pub beats_per_measure: u32,
    pub measures_per_line: u32,
    /// Highest allowed count of `'` marks (inclusive)
    pub max_octave_marks_high: u32,
    /// Highest allowed count of `,` marks (inclusive)
    pub max_octave_marks_low: u32,
    pub rest_symbol: String,
    /// Live readout period
    pub fast_tick_ms: u64,
    /// Transcript append period
    pub slow_tick_ms: u64,
    pub render: RenderOptions,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER.to_string(),
            max_lines: 7,
            beats_per_measure: 4,
            measures_per_line: 5,
            max_octave_marks_high: 2,
            max_octave_marks_low: 2,
            rest_symbol: REST_SYMBOL.to_string(),
            fast_tick_ms: 50,
            slow_tick_ms: 1000,
            render: RenderOptions::default(),
        }
    }
}

impl TranscriptConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lines == 0 {
            return Err(ConfigError::Invalid("max_lines must be at least 1".into()));
        }
        if self.beats_per_measure == 0 || self.measures_per_line == 0 {
            return Err(ConfigError::Invalid(
                "beats_per_measure and measures_per_line must be at least 1".into(),
            ));
        }
        if self.fast_tick_ms == 0 || self.slow_tick_ms == 0 {
            return Err(ConfigError::Invalid("tick periods must be non-zero".into()));
        }
        if self.rest_symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("rest_symbol must not be blank".into()));
        }
        if !(self.render.scale.is_finite() && self.render.scale > 0.0) {
            return Err(ConfigError::Invalid("render.scale must be positive".into()));
        }
        Ok(())
    }

    /// Beats per display line.
    pub fn beats_per_line(&self) -> u64 {
        self.beats_per_measure as u64 * self.measures_per_line as u64
    }
}
