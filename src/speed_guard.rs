//! Per-sample speed check
//!
//! Aborts a claim when the claimant moves faster than walking/running pace
//! allows and raises rate-limited advisories for sustained moderate speed.

use log::{debug, warn};

use crate::config::SpeedGuardConfig;
use crate::fix::Fix;
use crate::geometry::distance_m;

/// m/s to km/h
pub const MPS_TO_KMH: f64 = 3.6;

/// Outcome of checking one filtered fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedVerdict {
    /// Fix not evaluated (accuracy unknown or too poor, speed unknown)
    Skipped,
    /// Within limits
    Ok { speed_kmh: f64 },
    /// Above the warn ceiling; advisory only
    Warn { speed_kmh: f64 },
    /// Above the warn ceiling, but a warning was raised recently
    WarnSuppressed { speed_kmh: f64 },
    /// Above the abort ceiling; the session must end
    Abort { speed_kmh: f64 },
}

impl SpeedVerdict {
    pub fn is_abort(&self) -> bool {
        matches!(self, SpeedVerdict::Abort { .. })
    }
}

/// Speed anti-cheat state
#[derive(Debug, Clone)]
pub struct SpeedGuard {
    warn_kmh: f64,
    abort_kmh: f64,
    config: SpeedGuardConfig,
    last_warning_ms: Option<u64>,
    /// Previous evaluated fix, for implied speed when the receiver has none
    prev: Option<Fix>,
}

impl SpeedGuard {
    pub fn new(warn_kmh: f64, abort_kmh: f64, config: SpeedGuardConfig) -> Self {
        Self {
            warn_kmh,
            abort_kmh,
            config,
            last_warning_ms: None,
            prev: None,
        }
    }

    /// Evaluate one filtered fix
    pub fn check(&mut self, fix: &Fix) -> SpeedVerdict {
        if !fix.has_accuracy() || fix.horizontal_accuracy_m > self.config.max_accuracy_m {
            return SpeedVerdict::Skipped;
        }

        let speed_mps = if fix.has_speed() {
            Some(fix.speed_mps)
        } else {
            self.implied_speed(fix)
        };
        self.prev = Some(*fix);

        let Some(speed_mps) = speed_mps else {
            return SpeedVerdict::Skipped;
        };
        let speed_kmh = speed_mps * MPS_TO_KMH;

        if speed_kmh > self.abort_kmh {
            warn!(
                "speed guard: {:.1} km/h exceeds abort ceiling {:.1} km/h",
                speed_kmh, self.abort_kmh
            );
            return SpeedVerdict::Abort { speed_kmh };
        }

        if speed_kmh > self.warn_kmh {
            let cooled = self.last_warning_ms.is_none_or(|last| {
                fix.timestamp_ms.saturating_sub(last) >= self.config.warn_cooldown_ms
            });
            if !cooled {
                return SpeedVerdict::WarnSuppressed { speed_kmh };
            }
            self.last_warning_ms = Some(fix.timestamp_ms);
            debug!("speed guard: warning at {:.1} km/h", speed_kmh);
            return SpeedVerdict::Warn { speed_kmh };
        }

        SpeedVerdict::Ok { speed_kmh }
    }

    /// Speed from displacement since the previous evaluated fix
    fn implied_speed(&self, fix: &Fix) -> Option<f64> {
        let prev = self.prev?;
        let dt_ms = fix.timestamp_ms.checked_sub(prev.timestamp_ms)?;
        if dt_ms == 0 {
            return None;
        }
        Some(distance_m(prev.point, fix.point) / (dt_ms as f64 / 1000.0))
    }

    pub fn reset(&mut self) {
        self.last_warning_ms = None;
        self.prev = None;
    }
}
