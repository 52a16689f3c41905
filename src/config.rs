//! Timing wheel configuration, loadable from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CmlError, CmlResult};

/// How a fired timer's callback is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackMode {
    /// Run on the wheel's own advancer thread, inline with the tick. Cheap
    /// callbacks only: a slow one delays every other timer due that tick.
    Inline,
    /// Hand off to a fresh thread per callback. Safe for slow or blocking
    /// callbacks at the cost of a spawn per firing.
    Spawned,
}

impl Default for CallbackMode {
    fn default() -> Self {
        CallbackMode::Inline
    }
}

/// One level of the hierarchical wheel: `slots` buckets, each spanning one
/// tick of its parent level's granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub slots: usize,
}

/// Construction parameters for a [`crate::wheel::TimingWheel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Duration of one tick at the innermost level.
    pub tick: Duration,
    /// Slot counts from innermost to outermost level. Slot counts must be
    /// powers of two so index derivation can use shifts and masks.
    pub levels: Vec<LevelConfig>,
    pub callback_mode: CallbackMode,
}

impl Default for WheelConfig {
    fn default() -> Self {
        WheelConfig {
            tick: Duration::from_millis(1),
            levels: vec![
                LevelConfig { slots: 256 },
                LevelConfig { slots: 64 },
                LevelConfig { slots: 64 },
                LevelConfig { slots: 64 },
            ],
            callback_mode: CallbackMode::Inline,
        }
    }
}

impl WheelConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml(s: &str) -> CmlResult<Self> {
        let cfg: WheelConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CmlResult<()> {
        if self.tick.is_zero() {
            return Err(CmlError::InvalidWheelConfig(
                "tick duration must be positive".to_string(),
            ));
        }
        if self.levels.is_empty() {
            return Err(CmlError::InvalidWheelConfig(
                "at least one level is required".to_string(),
            ));
        }
        for level in &self.levels {
            if level.slots == 0 || !level.slots.is_power_of_two() {
                return Err(CmlError::InvalidWheelConfig(format!(
                    "level slot count must be a positive power of two, got {}",
                    level.slots
                )));
            }
        }
        Ok(())
    }
}
