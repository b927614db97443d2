//! Runtime configuration. Loaded from JSON; every field has a default so a
//! partial file (or none at all) is valid.

use crate::error::ConfigError;
use crate::speed_mapper::SpeedBandTable;
use crate::types::PitchMode;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audio resource handed to the engine on first load
    pub base_audio_resource: String,
    /// Speed at which the source audio plays at its natural pitch (rate 1.0)
    pub base_speed: f64,
    pub window_duration_ms: u64,
    pub min_sample_count: usize,
    pub smoothing_factor: f64,
    /// Explicit step table; `None` uses the standard table anchored at `base_speed`
    pub speed_table: Option<SpeedBandTable>,
    /// Activity at which the visual bar reads 100%
    pub visual_max_activity: f64,
    /// Ramp for steady-state parameter updates, seconds
    pub ramp_seconds: f64,
    /// Ramp for the parameter apply right before starting, seconds
    pub initial_ramp_seconds: f64,
    /// Minimum speed difference before the speed control is rewritten
    pub display_deadband: f64,
    pub pitch_mode: PitchMode,
    pub tick_hz: u32,
    pub load_timeout_ms: u64,
    pub loop_playback: bool,
    /// Hold motion input until a permission result arrives
    pub require_motion_permission: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_audio_resource: "kanon_1.10x.wav".to_string(),
            base_speed: 1.10,
            window_duration_ms: 2000,
            min_sample_count: 10,
            smoothing_factor: 0.05,
            speed_table: None,
            visual_max_activity: 12.0,
            ramp_seconds: 0.05,
            initial_ramp_seconds: 0.0,
            display_deadband: 0.01,
            pitch_mode: PitchMode::PitchCorrection,
            tick_hz: 60,
            load_timeout_ms: 5000,
            loop_playback: true,
            require_motion_permission: false,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)?;
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

    /// The explicit table if configured, otherwise the anchored default.
    pub fn speed_table(&self) -> SpeedBandTable {
        self.speed_table
            .clone()
            .unwrap_or_else(|| SpeedBandTable::anchored(self.base_speed))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_speed.is_finite() && self.base_speed > 0.0) {
            return Err(invalid("base_speed", format!("{} is not positive", self.base_speed)));
        }
        if self.window_duration_ms == 0 {
            return Err(invalid("window_duration_ms", "must be non-zero".into()));
        }
        if self.min_sample_count == 0 {
            return Err(invalid("min_sample_count", "must be non-zero".into()));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(invalid(
                "smoothing_factor",
                format!("{} is outside (0, 1]", self.smoothing_factor),
            ));
        }
        if !(self.visual_max_activity > 0.0) {
            return Err(invalid("visual_max_activity", "must be positive".into()));
        }
        if ![self.ramp_seconds, self.initial_ramp_seconds].iter().all(|r| r.is_finite() && *r >= 0.0) {
            return Err(invalid("ramp_seconds", "ramps must be finite and non-negative".into()));
        }
        if !(self.display_deadband.is_finite() && self.display_deadband >= 0.0) {
            return Err(invalid("display_deadband", "must be finite and non-negative".into()));
        }
        if self.tick_hz == 0 {
            return Err(invalid("tick_hz", "must be non-zero".into()));
        }
        self.speed_table()
            .validate()
            .map_err(|reason| invalid("speed_table", reason))
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
