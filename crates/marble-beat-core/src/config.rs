//! Sandbox configuration loaded from JSON.
//!
//! Every section has defaults, so an empty object (`{}`) is a valid config.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::beat_index::SnapConfig;
use crate::marble::MarbleSettings;
use crate::physics::PhysicsProfile;
use crate::player::PlayerSettings;
use crate::trajectory::{BeatGrid, TrajectorySettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatSettings {
    pub bpm: f64,
    /// Fraction of a beat between markers, in (0, 1].
    pub beat_division: f64,
}

impl Default for BeatSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beat_division: 1.0,
        }
    }
}

impl BeatSettings {
    pub fn grid(&self) -> BeatGrid {
        BeatGrid::new(self.bpm, self.beat_division)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub physics: PhysicsProfile,
    pub trajectory: TrajectorySettings,
    pub player: PlayerSettings,
    pub marble: MarbleSettings,
    pub beat: BeatSettings,
    pub snap: SnapConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {value}")))
    }
}

impl SandboxConfig {
    /// Loads and validates a configuration from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to JSON string.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("beat.bpm", self.beat.bpm)?;
        if !(self.beat.beat_division > 0.0 && self.beat.beat_division <= 1.0) {
            return Err(invalid(
                "beat.beat_division",
                format!("must be in (0, 1], got {}", self.beat.beat_division),
            ));
        }

        positive("physics.radius", f64::from(self.physics.radius))?;
        if !(0.0..=1.0).contains(&self.physics.bounciness) {
            return Err(invalid("physics.bounciness", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.physics.friction) {
            return Err(invalid("physics.friction", "must be in [0, 1]"));
        }

        positive("trajectory.dt", self.trajectory.dt)?;
        if !(self.trajectory.max_duration.is_finite() && self.trajectory.max_duration >= 0.0) {
            return Err(invalid("trajectory.max_duration", "must be non-negative"));
        }
        if self.trajectory.path_sample_every == 0 {
            return Err(invalid("trajectory.path_sample_every", "must be at least 1"));
        }

        positive("player.tick_dt", self.player.tick_dt)?;
        if self.player.min_volume > self.player.max_volume {
            return Err(invalid("player.min_volume", "must not exceed max_volume"));
        }

        positive("marble.lifetime", self.marble.lifetime)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = SandboxConfig::from_json("{}").expect("defaults");
        assert_eq!(config, SandboxConfig::default());
        assert!((config.physics.bounciness - 0.95).abs() < f32::EPSILON);
        assert!((config.beat.grid().interval() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config =
            SandboxConfig::from_json(r#"{ "beat": { "bpm": 90.0 }, "player": { "hit_cooldown": 0.2 } }"#)
                .expect("partial");
        assert!((config.beat.bpm - 90.0).abs() < f64::EPSILON);
        assert!((config.beat.beat_division - 1.0).abs() < f64::EPSILON);
        assert!((config.player.hit_cooldown - 0.2).abs() < f64::EPSILON);
        assert!((config.player.min_audible_speed - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_roundtrip() {
        let config = SandboxConfig::default();
        let json = config.to_json().expect("serialize");
        assert_eq!(SandboxConfig::from_json(&json).expect("parse"), config);
    }

    #[test]
    fn test_rejects_invalid_division() {
        let err = SandboxConfig::from_json(r#"{ "beat": { "beat_division": 1.5 } }"#)
            .expect_err("division above one");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "beat.beat_division",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_bpm() {
        let err = SandboxConfig::from_json(r#"{ "beat": { "bpm": 0.0 } }"#).expect_err("zero bpm");
        assert!(matches!(err, ConfigError::Invalid { field: "beat.bpm", .. }));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = SandboxConfig::from_json("{ not json").expect_err("garbage");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
