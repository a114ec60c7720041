//! Position sample filtering
//!
//! Smooths a noisy stream of fixes with an inverse-variance weighted
//! average over a short window of recent accepted samples.

use std::collections::VecDeque;

use log::debug;

use crate::config::FilterConfig;
use crate::fix::{Fix, GeoPoint};

/// Sliding-window accuracy-weighted position filter
///
/// Fixes worse than the accuracy ceiling (or with unknown accuracy) are
/// dropped and leave the estimate untouched. Each accepted fix enters a
/// ring buffer; the estimate is the weighted mean of the buffer with
/// weight `1 / max(accuracy, 1)^2`.
///
/// Call [`SampleFilter::reset`] at the start of every claim session.
#[derive(Debug, Clone)]
pub struct SampleFilter {
    config: FilterConfig,
    buffer: VecDeque<Fix>,
    estimate: Option<Fix>,
}

impl SampleFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            buffer: VecDeque::with_capacity(config.window.max(1)),
            config,
            estimate: None,
        }
    }

    /// Would `fix` be accepted into the window?
    pub fn accepts(&self, fix: &Fix) -> bool {
        fix.has_accuracy() && fix.horizontal_accuracy_m <= self.config.accuracy_ceiling_m
    }

    /// Feed one raw fix
    ///
    /// # Returns
    /// The new filtered estimate, or the previous estimate unchanged when
    /// the fix is rejected (`None` until a first fix is accepted).
    pub fn add_sample(&mut self, fix: Fix) -> Option<Fix> {
        if !self.accepts(&fix) {
            debug!(
                "filter: dropped fix with accuracy {:.1}m (ceiling {:.1}m)",
                fix.horizontal_accuracy_m, self.config.accuracy_ceiling_m
            );
            return self.estimate;
        }

        if self.buffer.len() >= self.config.window.max(1) {
            self.buffer.pop_front();
        }
        self.buffer.push_back(fix);

        self.estimate = self.weighted_estimate();
        self.estimate
    }

    /// Current filtered estimate
    pub fn estimate(&self) -> Option<Fix> {
        self.estimate
    }

    /// Number of buffered raw fixes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered samples and the estimate
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.estimate = None;
    }

    /// Weighted mean of the buffer
    ///
    /// Averages offsets from the newest fix rather than absolute values, so
    /// a window of identical fixes reproduces that fix exactly.
    fn weighted_estimate(&self) -> Option<Fix> {
        let newest = *self.buffer.back()?;

        let mut weight_sum = 0.0;
        let mut dlat = 0.0;
        let mut dlon = 0.0;
        let mut dalt = 0.0;
        let mut speed_weight = 0.0;
        let mut speed_sum = 0.0;
        let mut best_accuracy = f64::INFINITY;
        let mut latest_ts = newest.timestamp_ms;

        for fix in &self.buffer {
            let w = inverse_variance_weight(fix.horizontal_accuracy_m);
            weight_sum += w;
            dlat += w * (fix.point.latitude - newest.point.latitude);
            dlon += w * (fix.point.longitude - newest.point.longitude);
            dalt += w * (fix.altitude_m - newest.altitude_m);

            if fix.has_speed() {
                speed_weight += w;
                speed_sum += w * fix.speed_mps;
            }

            best_accuracy = best_accuracy.min(fix.horizontal_accuracy_m);
            latest_ts = latest_ts.max(fix.timestamp_ms);
        }

        let speed_mps = if speed_weight > 0.0 {
            speed_sum / speed_weight
        } else {
            -1.0
        };

        Some(Fix {
            point: GeoPoint::new(
                newest.point.latitude + dlat / weight_sum,
                newest.point.longitude + dlon / weight_sum,
            ),
            altitude_m: newest.altitude_m + dalt / weight_sum,
            horizontal_accuracy_m: best_accuracy,
            speed_mps,
            timestamp_ms: latest_ts,
        })
    }
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

/// Weight for a fix with the given 1-sigma accuracy
///
/// Accuracies below 1m are clamped so a single overconfident receiver
/// cannot dominate the window.
pub fn inverse_variance_weight(accuracy_m: f64) -> f64 {
    let sigma = accuracy_m.max(1.0);
    1.0 / (sigma * sigma)
}
