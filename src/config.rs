//! Engine configuration
//!
//! Defaults for every tunable plus JSON loading for hosts that keep the
//! thresholds in a remote config document.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Claim validation thresholds
///
/// Supplied at session start and fixed for the lifetime of that session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// Minimum number of path points for a valid claim
    pub min_points: usize,
    /// Minimum walked distance (meters)
    pub min_total_distance_m: f64,
    /// Minimum enclosed area (m²)
    pub min_area_sq_m: f64,
    /// Start/end distance at or below which the loop counts as closed (meters)
    pub closure_distance_m: f64,
    /// Advisory speed ceiling (km/h)
    pub speed_warn_kmh: f64,
    /// Hard speed ceiling; exceeding it aborts the session (km/h)
    pub speed_abort_kmh: f64,
    /// Minimum spacing between consecutive path points (meters)
    pub min_sample_spacing_m: f64,
    /// Larger steps are treated as GPS jumps (meters)
    pub max_jump_m: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_points: 10,
            min_total_distance_m: 50.0,
            min_area_sq_m: 100.0,
            closure_distance_m: 30.0,
            speed_warn_kmh: 15.0,
            speed_abort_kmh: 30.0,
            min_sample_spacing_m: 3.0,
            max_jump_m: 100.0,
        }
    }
}

impl ValidationThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("min_total_distance_m", self.min_total_distance_m)?;
        positive("min_area_sq_m", self.min_area_sq_m)?;
        positive("closure_distance_m", self.closure_distance_m)?;
        positive("speed_warn_kmh", self.speed_warn_kmh)?;
        positive("speed_abort_kmh", self.speed_abort_kmh)?;
        non_negative("min_sample_spacing_m", self.min_sample_spacing_m)?;
        positive("max_jump_m", self.max_jump_m)?;

        if self.min_points < 3 {
            return Err(ConfigError::Invalid(format!(
                "min_points must be at least 3 (got {})",
                self.min_points
            )));
        }
        if self.speed_warn_kmh > self.speed_abort_kmh {
            return Err(ConfigError::Invalid(format!(
                "speed_warn_kmh {} exceeds speed_abort_kmh {}",
                self.speed_warn_kmh, self.speed_abort_kmh
            )));
        }
        if self.max_jump_m <= self.min_sample_spacing_m {
            return Err(ConfigError::Invalid(format!(
                "max_jump_m {} must exceed min_sample_spacing_m {}",
                self.max_jump_m, self.min_sample_spacing_m
            )));
        }
        Ok(())
    }
}

/// Sample filter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Fixes with worse horizontal accuracy are dropped (meters)
    pub accuracy_ceiling_m: f64,
    /// Number of recent fixes averaged
    pub window: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            accuracy_ceiling_m: 10.0,
            window: 5,
        }
    }
}

/// Speed guard configuration not covered by the session thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedGuardConfig {
    /// Minimum time between two speed warnings (milliseconds)
    pub warn_cooldown_ms: u64,
    /// Fixes less accurate than this are not speed-checked (meters)
    pub max_accuracy_m: f64,
}

impl Default for SpeedGuardConfig {
    fn default() -> Self {
        Self {
            warn_cooldown_ms: 5_000,
            max_accuracy_m: 50.0,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ValidationThresholds,
    pub filter: FilterConfig,
    pub speed: SpeedGuardConfig,
    /// Include the claimant's own territories in proximity advisories
    pub proximity_include_own: bool,
    /// Upper bound on the persistence round trip (milliseconds)
    pub persistence_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ValidationThresholds::default(),
            filter: FilterConfig::default(),
            speed: SpeedGuardConfig::default(),
            proximity_include_own: false,
            persistence_timeout_ms: 3_000,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config document
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        positive("filter.accuracy_ceiling_m", self.filter.accuracy_ceiling_m)?;
        positive("speed.max_accuracy_m", self.speed.max_accuracy_m)?;
        if self.filter.window == 0 {
            return Err(ConfigError::Invalid("filter.window must be non-zero".into()));
        }
        if self.persistence_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "persistence_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    // NaN fails the comparison
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be positive (got {})", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be non-negative (got {})", name, value)))
    }
}
