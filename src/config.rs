//! Threshold configuration for the classifier and region builder.
//!
//! Every field carries the same default and accepted range as the
//! visualizer's sidebar controls. A config can be read from a JSON file;
//! missing fields fall back to their defaults:
//!
//! ```json
//! {
//!   "activation": { "speed": 45.0, "occupancy": 25.0 },
//!   "deactivation": { "speed": 52.0, "occupancy": 20.0 },
//!   "activation_logic": "AND",
//!   "deactivation_logic": "OR",
//!   "consecutive_intervals": 4
//! }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SPEED_THRESHOLD_RANGE: (f64, f64) = (0.0, 80.0);
pub const OCCUPANCY_THRESHOLD_RANGE: (f64, f64) = (0.0, 50.0);
pub const ANIMATION_SECONDS_RANGE: (f64, f64) = (0.1, 5.0);

/// A speed (km/h) and occupancy (%) threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub speed: f64,
    pub occupancy: f64,
}

impl ThresholdPair {
    pub const fn new(speed: f64, occupancy: f64) -> Self {
        Self { speed, occupancy }
    }
}

/// How the speed and occupancy predicates of one direction are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicMode {
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl LogicMode {
    pub fn combine(self, speed_holds: bool, occupancy_holds: bool) -> bool {
        match self {
            LogicMode::And => speed_holds && occupancy_holds,
            LogicMode::Or => speed_holds || occupancy_holds,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogicMode::And => "AND",
            LogicMode::Or => "OR",
        }
    }
}

impl fmt::Display for LogicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(LogicMode::And),
            "OR" => Ok(LogicMode::Or),
            _ => Err(ConfigError::UnknownLogic(s.to_string())),
        }
    }
}

fn default_activation() -> ThresholdPair {
    ThresholdPair::new(45.0, 25.0)
}

fn default_deactivation() -> ThresholdPair {
    ThresholdPair::new(52.0, 20.0)
}

fn default_activation_logic() -> LogicMode {
    LogicMode::And
}

fn default_deactivation_logic() -> LogicMode {
    LogicMode::Or
}

fn default_consecutive_intervals() -> u32 {
    4
}

/// Thresholds, logic modes and run length used for one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_activation")]
    pub activation: ThresholdPair,
    #[serde(default = "default_deactivation")]
    pub deactivation: ThresholdPair,
    #[serde(default = "default_activation_logic")]
    pub activation_logic: LogicMode,
    #[serde(default = "default_deactivation_logic")]
    pub deactivation_logic: LogicMode,
    #[serde(default = "default_consecutive_intervals")]
    pub consecutive_intervals: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            activation: default_activation(),
            deactivation: default_deactivation(),
            activation_logic: default_activation_logic(),
            deactivation_logic: default_deactivation_logic(),
            consecutive_intervals: default_consecutive_intervals(),
        }
    }
}

impl ClassifierConfig {
    /// Loads a config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config: ClassifierConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file '{path}'"))?;
        Ok(config)
    }

    /// Checks every value against the range offered by the controls.
    ///
    /// Inverted or overlapping activation/deactivation thresholds are
    /// accepted; only the individual bounds are enforced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "activation speed",
            SPEED_THRESHOLD_RANGE,
            self.activation.speed,
        )?;
        check_range(
            "activation occupancy",
            OCCUPANCY_THRESHOLD_RANGE,
            self.activation.occupancy,
        )?;
        check_range(
            "deactivation speed",
            SPEED_THRESHOLD_RANGE,
            self.deactivation.speed,
        )?;
        check_range(
            "deactivation occupancy",
            OCCUPANCY_THRESHOLD_RANGE,
            self.deactivation.occupancy,
        )?;
        if self.consecutive_intervals < 1 {
            return Err(ConfigError::ConsecutiveIntervals(self.consecutive_intervals));
        }
        Ok(())
    }
}

fn check_range(name: &'static str, (min, max): (f64, f64), value: f64) -> Result<(), ConfigError> {
    // NaN fails both comparisons, so test for containment rather than exclusion
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(name, min, max, value))
    }
}

/// Delay between animation frames, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationSpeed(f64);

impl AnimationSpeed {
    pub fn new(seconds: f64) -> Result<Self, ConfigError> {
        check_range("animation speed", ANIMATION_SECONDS_RANGE, seconds)?;
        Ok(Self(seconds))
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn delay(self) -> Duration {
        Duration::from_secs_f64(self.0)
    }
}

impl Default for AnimationSpeed {
    fn default() -> Self {
        Self(0.5)
    }
}
