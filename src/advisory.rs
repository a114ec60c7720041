//! Non-fatal advisories
//!
//! Observational output for the notification/log collaborator: speed
//! warnings, proximity tier changes and rejection reasons. Nothing in the
//! engine depends on what a sink does with them.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::collision::ProximityTier;
use crate::tracker::RejectReason;

/// One advisory message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Advisory {
    /// Moderate speed above the warn ceiling
    SpeedWarning { speed_kmh: f64 },
    /// Nearest territory moved into a different distance tier
    Proximity {
        tier: ProximityTier,
        distance_m: f64,
        is_own: bool,
    },
    /// A closure attempt failed
    Rejected { reason: RejectReason, detail: String },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::SpeedWarning { speed_kmh } => {
                write!(f, "slow down: moving at {:.1} km/h", speed_kmh)
            }
            Advisory::Proximity {
                tier,
                distance_m,
                is_own,
            } => write!(
                f,
                "{}: {} territory {:.0} m away",
                tier.as_str(),
                if *is_own { "own" } else { "rival" },
                distance_m
            ),
            Advisory::Rejected { reason, detail } => {
                write!(f, "claim rejected ({}): {}", reason.code(), detail)
            }
        }
    }
}

/// Receiver for advisories
pub trait AdvisorySink: Send + Sync {
    fn advise(&self, advisory: &Advisory);
}

/// Forwards advisories to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AdvisorySink for LogSink {
    fn advise(&self, advisory: &Advisory) {
        match advisory {
            Advisory::Proximity { .. } => info!("advisory: {}", advisory),
            Advisory::SpeedWarning { .. } | Advisory::Rejected { .. } => {
                warn!("advisory: {}", advisory)
            }
        }
    }
}

/// Keeps every advisory in memory (host UIs polling, tests)
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Advisory>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything received so far
    pub fn take(&self) -> Vec<Advisory> {
        match self.received.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }
}

impl AdvisorySink for RecordingSink {
    fn advise(&self, advisory: &Advisory) {
        if let Ok(mut guard) = self.received.lock() {
            guard.push(advisory.clone());
        }
    }
}
