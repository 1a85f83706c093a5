//! Scheduler settings.
//!
//! Read from YAML with kebab-case keys. Every key is optional:
//!
//! ```yaml
//! count-in-bars: 1
//! lookahead-ms: 100
//! strum-spread-ms: 12
//! accent-velocity: 1.0
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Metronome bars played before the song starts.
    pub count_in_bars: u32,
    /// How far ahead of the audio clock the transport is started.
    pub lookahead_ms: f64,
    /// Delay between neighbouring strings of a strum.
    pub strum_spread_ms: f64,
    pub velocity: f32,
    /// Velocity of emphasized strums.
    pub accent_velocity: f32,
    pub percussion_velocity: f32,
    /// Length of a percussive strum.
    pub percussion_ms: f64,
    pub metronome_velocity: f32,
    /// Click on the first beat of a bar.
    pub metronome_high: u8,
    pub metronome_low: u8,
    pub click_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            count_in_bars: 1,
            lookahead_ms: 100.0,
            strum_spread_ms: 15.0,
            velocity: 0.7,
            accent_velocity: 1.0,
            percussion_velocity: 0.4,
            percussion_ms: 40.0,
            metronome_velocity: 0.6,
            metronome_high: 84,
            metronome_low: 77,
            click_ms: 50.0,
        }
    }
}

impl SchedulerConfig {
    pub fn from_yaml(text: &str) -> Result<Self, EngineError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SchedulerConfig =
            serde_yaml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    fn check(&self) -> Result<(), EngineError> {
        let velocities = [
            ("velocity", self.velocity),
            ("accent-velocity", self.accent_velocity),
            ("percussion-velocity", self.percussion_velocity),
            ("metronome-velocity", self.metronome_velocity),
        ];
        for (name, v) in velocities {
            if !(0.0..=1.0).contains(&v) {
                return Err(EngineError::Config(format!("{} must be within 0..1, got {}", name, v)));
            }
        }
        let durations = [
            ("lookahead-ms", self.lookahead_ms),
            ("strum-spread-ms", self.strum_spread_ms),
            ("percussion-ms", self.percussion_ms),
            ("click-ms", self.click_ms),
        ];
        for (name, ms) in durations {
            if ms < 0.0 {
                return Err(EngineError::Config(format!("{} must not be negative", name)));
            }
        }
        if self.metronome_high > 127 || self.metronome_low > 127 {
            return Err(EngineError::Config("metronome pitch must be a MIDI note".to_string()));
        }
        Ok(())
    }

    pub(crate) fn lookahead(&self) -> f64 {
        self.lookahead_ms / 1000.0
    }

    pub(crate) fn strum_spread(&self) -> f64 {
        self.strum_spread_ms / 1000.0
    }

    pub(crate) fn percussion_secs(&self) -> f64 {
        self.percussion_ms / 1000.0
    }

    pub(crate) fn click_secs(&self) -> f64 {
        self.click_ms / 1000.0
    }
}
