//! Claim tracker with loop-closure detection
//!
//! Turns a stream of position fixes into an accepted or rejected land
//! claim. One tracker serves one claimant; fixes must arrive serially.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --start--> Tracking --closure--> Closed --+--> Accepted
//!  ^                 ^                           |
//!  |                 +-------re-arm-------+      +--> Rejected
//!  +--------stop / clear (any state)------+-------------+
//! ```
//!
//! Per fix: sample filter, speed guard, spacing and GPS-jump checks, append,
//! then (with at least five points) a closure test against the start point.
//! A closed loop runs the validation pipeline synchronously: point count,
//! walked distance, self-intersection, enclosed area, overlap with existing
//! territories. The first failing check names the rejection.
//!
//! A rejected attempt does not discard the path. Walking more than 50m from
//! the start, or appending a point while still inside closure range,
//! re-arms the tracker for another attempt. Overspeed rejections are final.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use territory_engine::{ClaimTracker, CollisionIndex, EngineConfig, OwnerId};
//!
//! let index = Arc::new(CollisionIndex::new());
//! let mut tracker = ClaimTracker::new(EngineConfig::default(), index)?;
//! tracker.start(OwnerId::new("alice"), Default::default())?;
//!
//! // For every fix from the location source:
//! let report = tracker.ingest(fix)?;
//! if let Some(ClosureOutcome::Accepted(claim)) = report.closure {
//!     // persist, celebrate
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::advisory::{Advisory, AdvisorySink};
use crate::collision::{CollisionIndex, CrossingKind, OwnerId, ProximityTier, TerritoryId};
use crate::config::{EngineConfig, ValidationThresholds};
use crate::error::ConfigError;
use crate::error::{Result, SessionError};
use crate::filter::SampleFilter;
use crate::fix::{Fix, GeoPoint};
use crate::geometry::{distance_m, has_self_intersection, path_length_m, polygon_area_sq_meters};
use crate::persistence::{store_with_timeout, ClaimStore};
use crate::speed_guard::{SpeedGuard, SpeedVerdict};

/// Closure is only tested once the path has this many points
pub const MIN_POINTS_FOR_CLOSURE: usize = 5;

/// Walking this far from the start after a rejection re-arms closure (meters)
pub const REARM_DISTANCE_M: f64 = 50.0;

/// Implied speed above which a low-accuracy step counts as a GPS jump (m/s)
pub const JUMP_IMPLIED_SPEED_MPS: f64 = 15.0;

/// Accuracy above which the implied-speed jump test applies (meters)
pub const JUMP_ACCURACY_M: f64 = 20.0;

/// Why a closure attempt (or the whole session) was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InsufficientPoints,
    InsufficientDistance,
    SelfIntersection,
    InsufficientArea,
    Overlap {
        territory: TerritoryId,
        kind: CrossingKind,
    },
    /// Anti-cheat abort; ends the session
    Overspeed,
    /// A collaborator (index, persistence) could not answer
    ValidationUnavailable,
}

impl RejectReason {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InsufficientPoints => "insufficient points",
            RejectReason::InsufficientDistance => "insufficient distance",
            RejectReason::SelfIntersection => "self-intersection",
            RejectReason::InsufficientArea => "insufficient area",
            RejectReason::Overlap { .. } => "overlap",
            RejectReason::Overspeed => "overspeed",
            RejectReason::ValidationUnavailable => "validation_unavailable",
        }
    }

    /// Can further walking re-arm closure after this rejection?
    pub fn is_rearmable(&self) -> bool {
        !matches!(self, RejectReason::Overspeed)
    }
}

/// A rejection with its human-readable detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// A claim that passed every validation check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedClaim {
    pub owner: OwnerId,
    /// Walked path, implicitly closed
    pub polygon: Vec<GeoPoint>,
    pub area_sq_m: f64,
    pub distance_m: f64,
    /// Timestamp of the first path point
    pub started_at_ms: u64,
    /// Timestamp of the fix that closed the loop
    pub closed_at_ms: u64,
}

impl AcceptedClaim {
    /// Idempotency key for stores
    ///
    /// Owner plus start time identifies one walked session. A claim that is
    /// re-armed and accepted again after a failed store keeps its key.
    pub fn claim_key(&self) -> String {
        format!("{}@{}", self.owner, self.started_at_ms)
    }
}

/// Session state
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimState {
    /// No session
    Idle,
    /// Collecting path points
    Tracking,
    /// Loop closed, validation running
    Closed,
    /// Terminal: claim validated
    Accepted(AcceptedClaim),
    /// Terminal: last closure attempt failed (re-armable unless overspeed)
    Rejected(Rejection),
}

impl ClaimState {
    pub fn name(&self) -> &'static str {
        match self {
            ClaimState::Idle => "idle",
            ClaimState::Tracking => "tracking",
            ClaimState::Closed => "closed",
            ClaimState::Accepted(_) => "accepted",
            ClaimState::Rejected(_) => "rejected",
        }
    }
}

/// What happened to one ingested fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleDisposition {
    /// Dropped by the sample filter
    Filtered,
    /// Speed guard aborted the session
    Overspeed { speed_kmh: f64 },
    /// Too close to the previous point
    BelowSpacing { distance_m: f64 },
    /// Implausible step from the previous point
    GpsJump { distance_m: f64 },
    /// Added to the path
    Appended,
}

/// Result of a closure attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureOutcome {
    Accepted(AcceptedClaim),
    Rejected(Rejection),
}

/// Everything one `ingest` call produced
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub disposition: SampleDisposition,
    /// Set when this fix closed the loop (or aborted the session)
    pub closure: Option<ClosureOutcome>,
    pub advisories: Vec<Advisory>,
}

impl IngestReport {
    fn new(disposition: SampleDisposition) -> Self {
        Self {
            disposition,
            closure: None,
            advisories: Vec::new(),
        }
    }
}

/// Outcome of handing an accepted claim to the store
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    Stored(TerritoryId),
    /// Store failed or timed out; the session is now rejected
    Unavailable(Rejection),
}

/// Live session figures for UIs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Progress {
    pub points: usize,
    pub distance_m: f64,
    /// Distance from the latest point back to the start
    pub distance_to_start_m: Option<f64>,
    pub closure_attempts: u32,
}

/// Cancellation flag shared with other threads
///
/// Cancelling makes the current session abandon work at the next pipeline
/// step and return to idle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ordered walking path for the in-progress claim
#[derive(Debug, Clone, Default)]
struct PathBuffer {
    points: Vec<GeoPoint>,
    started_at_ms: u64,
    last_ts: u64,
    distance_m: f64,
}

impl PathBuffer {
    fn push(&mut self, p: GeoPoint, ts: u64) {
        match self.points.last() {
            Some(&last) => self.distance_m += distance_m(last, p),
            None => self.started_at_ms = ts,
        }
        self.points.push(p);
        self.last_ts = ts;
    }

    fn distance_to_start(&self) -> Option<f64> {
        match (self.points.first(), self.points.last()) {
            (Some(&first), Some(&last)) => Some(distance_m(first, last)),
            _ => None,
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Territory claim session for one claimant
pub struct ClaimTracker {
    config: EngineConfig,
    index: Arc<CollisionIndex>,
    owner: Option<OwnerId>,
    thresholds: ValidationThresholds,
    state: ClaimState,
    path: PathBuffer,
    filter: SampleFilter,
    speed: SpeedGuard,
    proximity: ProximityTier,
    closure_attempts: u32,
    cancel: CancelToken,
    sinks: Vec<Arc<dyn AdvisorySink>>,
}

impl ClaimTracker {
    /// Create an idle tracker validating against `index`
    ///
    /// Fails when `config` does not pass [`EngineConfig::validate`].
    pub fn new(config: EngineConfig, index: Arc<CollisionIndex>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            filter: SampleFilter::new(config.filter),
            speed: SpeedGuard::new(
                config.thresholds.speed_warn_kmh,
                config.thresholds.speed_abort_kmh,
                config.speed,
            ),
            thresholds: config.thresholds,
            config,
            index,
            owner: None,
            state: ClaimState::Idle,
            path: PathBuffer::default(),
            proximity: ProximityTier::Safe,
            closure_attempts: 0,
            cancel: CancelToken::default(),
            sinks: Vec::new(),
        })
    }

    /// Register an advisory observer
    pub fn add_sink(&mut self, sink: Arc<dyn AdvisorySink>) {
        self.sinks.push(sink);
    }

    pub fn state(&self) -> &ClaimState {
        &self.state
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    /// Thresholds of the current (or last) session
    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    /// Path points accepted so far, in walking order
    pub fn path(&self) -> &[GeoPoint] {
        &self.path.points
    }

    pub fn progress(&self) -> Progress {
        Progress {
            points: self.path.points.len(),
            distance_m: self.path.distance_m,
            distance_to_start_m: self.path.distance_to_start(),
            closure_attempts: self.closure_attempts,
        }
    }

    /// Cancellation handle for the current session
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Begin a new session
    pub fn start(&mut self, owner: OwnerId, thresholds: ValidationThresholds) -> Result<()> {
        if self.state != ClaimState::Idle {
            return Err(SessionError::AlreadyTracking {
                state: self.state.name(),
            });
        }
        thresholds.validate()?;

        self.reset_session();
        self.thresholds = thresholds;
        self.speed = SpeedGuard::new(
            thresholds.speed_warn_kmh,
            thresholds.speed_abort_kmh,
            self.config.speed,
        );
        info!(
            "claim session started for {} (min {} pts, {:.0} m, {:.0} m², closure {:.0} m)",
            owner,
            thresholds.min_points,
            thresholds.min_total_distance_m,
            thresholds.min_area_sq_m,
            thresholds.closure_distance_m
        );
        self.owner = Some(owner);
        self.state = ClaimState::Tracking;
        Ok(())
    }

    /// End the session from any state; no claim is emitted
    pub fn stop(&mut self) {
        if self.state != ClaimState::Idle {
            info!(
                "claim session stopped in state {} with {} points",
                self.state.name(),
                self.path.points.len()
            );
        }
        self.reset_session();
        self.owner = None;
        self.state = ClaimState::Idle;
    }

    /// Alias for [`ClaimTracker::stop`]
    pub fn clear(&mut self) {
        self.stop();
    }

    /// Feed one raw fix
    ///
    /// Valid while tracking, and after a re-armable rejection.
    pub fn ingest(&mut self, fix: Fix) -> Result<IngestReport> {
        self.check_cancelled()?;

        let rearming = match &self.state {
            ClaimState::Tracking => false,
            ClaimState::Rejected(r) if r.reason.is_rearmable() => true,
            other => {
                return Err(SessionError::NotTracking {
                    state: other.name(),
                })
            }
        };

        self.process_fix(fix, rearming)
    }

    /// Persist the accepted claim, waiting at most the configured timeout
    ///
    /// On store failure the session becomes `Rejected(validation_unavailable)`
    /// and can be re-armed by walking on.
    pub fn persist(&mut self, store: &Arc<dyn ClaimStore>) -> Result<PersistOutcome> {
        self.check_cancelled()?;

        let ClaimState::Accepted(claim) = &self.state else {
            return Err(SessionError::NotAccepted {
                state: self.state.name(),
            });
        };

        let timeout = Duration::from_millis(self.config.persistence_timeout_ms);
        let result = store_with_timeout(store, claim, timeout);

        // stop() cannot interleave (&mut self); a token cancel can
        self.check_cancelled()?;

        match result {
            Ok(id) => {
                info!("claim stored as {:?}", id);
                Ok(PersistOutcome::Stored(id))
            }
            Err(err) => {
                warn!("claim persistence failed: {}", err);
                let rejection = Rejection::new(
                    RejectReason::ValidationUnavailable,
                    format!("persistence unavailable: {}", err),
                );
                self.state = ClaimState::Rejected(rejection.clone());
                self.advise(&Advisory::Rejected {
                    reason: rejection.reason,
                    detail: rejection.detail.clone(),
                });
                Ok(PersistOutcome::Unavailable(rejection))
            }
        }
    }

    fn process_fix(&mut self, fix: Fix, rearming: bool) -> Result<IngestReport> {
        // 1. Sample filter
        if !self.filter.accepts(&fix) {
            debug!(
                "tracker: fix dropped by filter (accuracy {:.1} m)",
                fix.horizontal_accuracy_m
            );
            return Ok(IngestReport::new(SampleDisposition::Filtered));
        }
        let Some(filtered) = self.filter.add_sample(fix) else {
            return Ok(IngestReport::new(SampleDisposition::Filtered));
        };

        // 2. Speed guard
        let mut advisories = Vec::new();
        match self.speed.check(&filtered) {
            SpeedVerdict::Abort { speed_kmh } => {
                let rejection = Rejection::new(
                    RejectReason::Overspeed,
                    format!(
                        "speed {:.1} km/h > limit {:.1} km/h",
                        speed_kmh, self.thresholds.speed_abort_kmh
                    ),
                );
                warn!("claim aborted: {}", rejection.detail);
                self.state = ClaimState::Rejected(rejection.clone());

                let mut report = IngestReport::new(SampleDisposition::Overspeed { speed_kmh });
                self.emit(
                    &mut report.advisories,
                    Advisory::Rejected {
                        reason: rejection.reason,
                        detail: rejection.detail.clone(),
                    },
                );
                report.closure = Some(ClosureOutcome::Rejected(rejection));
                return Ok(report);
            }
            SpeedVerdict::Warn { speed_kmh } => {
                self.emit(&mut advisories, Advisory::SpeedWarning { speed_kmh });
            }
            SpeedVerdict::Skipped | SpeedVerdict::Ok { .. } | SpeedVerdict::WarnSuppressed { .. } => {}
        }

        // 3. Spacing and GPS-jump checks
        if let Some(disposition) = self.step_rejection(&filtered) {
            let mut report = IngestReport::new(disposition);
            report.advisories = advisories;
            return Ok(report);
        }

        // 4. Append
        self.path.push(filtered.point, filtered.timestamp_ms);
        let mut report = IngestReport::new(SampleDisposition::Appended);
        report.advisories = advisories;
        if let Some(advisory) = self.proximity_advisory(filtered.point) {
            self.emit(&mut report.advisories, advisory);
        }

        // 5. Closure
        let Some(to_start) = self.path.distance_to_start() else {
            return Ok(report);
        };
        let closure_distance = self.thresholds.closure_distance_m;

        // Re-arming falls through to the closure test: with a closure
        // distance above 50m the re-arming point may itself close the loop
        if rearming {
            if to_start > REARM_DISTANCE_M {
                info!("claim re-armed: {:.0} m from start", to_start);
            } else if to_start <= closure_distance {
                info!("claim re-armed: new point inside closure range");
            } else {
                return Ok(report);
            }
            self.state = ClaimState::Tracking;
        }

        if self.path.points.len() >= MIN_POINTS_FOR_CLOSURE && to_start <= closure_distance {
            let outcome = self.close_and_validate(filtered.timestamp_ms)?;
            if let ClosureOutcome::Rejected(rejection) = &outcome {
                let advisory = Advisory::Rejected {
                    reason: rejection.reason,
                    detail: rejection.detail.clone(),
                };
                self.emit(&mut report.advisories, advisory);
            }
            report.closure = Some(outcome);
        }

        Ok(report)
    }

    /// Spacing / jump check against the previous path point
    fn step_rejection(&self, fix: &Fix) -> Option<SampleDisposition> {
        let &last = self.path.points.last()?;
        let step = distance_m(last, fix.point);

        if step < self.thresholds.min_sample_spacing_m {
            debug!("tracker: {:.2} m step below spacing", step);
            return Some(SampleDisposition::BelowSpacing { distance_m: step });
        }
        if step > self.thresholds.max_jump_m {
            debug!("tracker: {:.0} m step discarded as GPS jump", step);
            return Some(SampleDisposition::GpsJump { distance_m: step });
        }

        let dt_ms = fix.timestamp_ms.saturating_sub(self.path.last_ts);
        if dt_ms > 0 && fix.horizontal_accuracy_m > JUMP_ACCURACY_M {
            let implied_mps = step / (dt_ms as f64 / 1000.0);
            if implied_mps > JUMP_IMPLIED_SPEED_MPS {
                debug!(
                    "tracker: {:.0} m step at {:.1} m/s with {:.0} m accuracy discarded",
                    step, implied_mps, fix.horizontal_accuracy_m
                );
                return Some(SampleDisposition::GpsJump { distance_m: step });
            }
        }

        None
    }

    /// Tier-change advisory for the nearest territory
    fn proximity_advisory(&mut self, p: GeoPoint) -> Option<Advisory> {
        let owner = self.owner.as_ref()?;
        let nearest = match self
            .index
            .min_distance_to_any(p, owner, self.config.proximity_include_own)
        {
            Ok(nearest) => nearest,
            Err(err) => {
                debug!("tracker: proximity check skipped: {}", err);
                return None;
            }
        };

        let tier = nearest.map_or(ProximityTier::Safe, |n| n.tier());
        if tier == self.proximity {
            return None;
        }
        self.proximity = tier;

        // Moving back out of range is reported with an infinite distance
        let (distance_m, is_own) = nearest.map_or((f64::INFINITY, false), |n| (n.distance_m, n.is_own));
        Some(Advisory::Proximity {
            tier,
            distance_m,
            is_own,
        })
    }

    fn close_and_validate(&mut self, closed_at_ms: u64) -> Result<ClosureOutcome> {
        self.state = ClaimState::Closed;
        self.closure_attempts += 1;
        info!(
            "loop closed with {} points (attempt {})",
            self.path.points.len(),
            self.closure_attempts
        );

        let outcome = match self.run_pipeline(closed_at_ms)? {
            Ok(claim) => {
                info!(
                    "claim accepted: {:.0} m², {:.0} m walked, {} points",
                    claim.area_sq_m,
                    claim.distance_m,
                    claim.polygon.len()
                );
                self.state = ClaimState::Accepted(claim.clone());
                ClosureOutcome::Accepted(claim)
            }
            Err(rejection) => {
                info!("claim rejected ({}): {}", rejection.reason.code(), rejection.detail);
                self.state = ClaimState::Rejected(rejection.clone());
                ClosureOutcome::Rejected(rejection)
            }
        };
        Ok(outcome)
    }

    /// The five validation checks, in order
    ///
    /// Outer `Err` is cancellation; inner `Err` is a rejection.
    fn run_pipeline(&mut self, closed_at_ms: u64) -> Result<std::result::Result<AcceptedClaim, Rejection>> {
        let t = self.thresholds;
        let path = &self.path.points;

        if path.len() < t.min_points {
            return Ok(Err(Rejection::new(
                RejectReason::InsufficientPoints,
                format!("{} points < required {}", path.len(), t.min_points),
            )));
        }
        self.check_cancelled()?;

        let path = &self.path.points;
        let distance = path_length_m(path);
        if distance < t.min_total_distance_m {
            return Ok(Err(Rejection::new(
                RejectReason::InsufficientDistance,
                format!(
                    "distance {:.0} m < required {:.0} m",
                    distance, t.min_total_distance_m
                ),
            )));
        }
        self.check_cancelled()?;

        let path = &self.path.points;
        if has_self_intersection(path) {
            return Ok(Err(Rejection::new(
                RejectReason::SelfIntersection,
                "path crosses itself",
            )));
        }
        self.check_cancelled()?;

        let path = &self.path.points;
        let area = polygon_area_sq_meters(path);
        if area < t.min_area_sq_m {
            return Ok(Err(Rejection::new(
                RejectReason::InsufficientArea,
                format!("area {:.0} m² < required {:.0} m²", area, t.min_area_sq_m),
            )));
        }
        self.check_cancelled()?;

        // Own territories are included: re-claiming over them is rejected too
        let path = &self.path.points;
        match self.index.path_crosses_any(path, None) {
            Ok(Some(crossing)) => {
                return Ok(Err(Rejection::new(
                    RejectReason::Overlap {
                        territory: crossing.territory,
                        kind: crossing.kind,
                    },
                    format!(
                        "overlaps territory {} ({})",
                        crossing.territory.0,
                        crossing.kind.as_str()
                    ),
                )));
            }
            Ok(None) => {}
            Err(err) => {
                warn!("overlap check unavailable: {}", err);
                return Ok(Err(Rejection::new(
                    RejectReason::ValidationUnavailable,
                    err.to_string(),
                )));
            }
        }
        self.check_cancelled()?;

        let Some(owner) = self.owner.clone() else {
            return Err(SessionError::NotTracking {
                state: self.state.name(),
            });
        };

        Ok(Ok(AcceptedClaim {
            owner,
            polygon: self.path.points.clone(),
            area_sq_m: area,
            distance_m: distance,
            started_at_ms: self.path.started_at_ms,
            closed_at_ms,
        }))
    }

    /// Abandon the session if its token was cancelled
    fn check_cancelled(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("claim session cancelled in state {}", self.state.name());
            self.stop();
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    fn reset_session(&mut self) {
        self.path.clear();
        self.filter.reset();
        self.speed.reset();
        self.proximity = ProximityTier::Safe;
        self.closure_attempts = 0;
        self.cancel = CancelToken::default();
    }

    fn advise(&self, advisory: &Advisory) {
        for sink in &self.sinks {
            sink.advise(advisory);
        }
    }

    /// Hand an advisory to the sinks now and keep it for the report
    ///
    /// Sinks run before the rest of the pipeline step, so a sink may
    /// cancel the session mid-ingest.
    fn emit(&self, advisories: &mut Vec<Advisory>, advisory: Advisory) {
        self.advise(&advisory);
        advisories.push(advisory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::RecordingSink;
    use crate::collision::FinalizedTerritory;
    use crate::config::FilterConfig;
    use crate::error::CollaboratorError;
    use crate::persistence::MemoryStore;

    // ========================================================================
    // Helpers
    // ========================================================================
    // Shapes are laid out in local meters (east, north) around a fixed
    // origin and converted with GeoPoint::offset_m. Fixes are 2s apart at
    // walking speed with 5m accuracy; the filter window is 1 so each fix
    // lands exactly where it was placed.

    const STEP_MS: u64 = 2_000;

    fn origin() -> GeoPoint {
        GeoPoint::new(37.7749, -122.4194)
    }

    fn at(east: f64, north: f64) -> GeoPoint {
        origin().offset_m(east, north)
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            filter: FilterConfig {
                window: 1,
                ..FilterConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn scenario_thresholds() -> ValidationThresholds {
        ValidationThresholds {
            min_points: 10,
            min_total_distance_m: 50.0,
            min_area_sq_m: 100.0,
            closure_distance_m: 30.0,
            min_sample_spacing_m: 0.5,
            max_jump_m: 100.0,
            ..ValidationThresholds::default()
        }
    }

    fn tracker_with(index: Arc<CollisionIndex>) -> ClaimTracker {
        ClaimTracker::new(test_config(), index).unwrap()
    }

    fn started_tracker() -> ClaimTracker {
        let mut tracker = tracker_with(Arc::new(CollisionIndex::new()));
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();
        tracker
    }

    fn walk_fix(east: f64, north: f64, ts: u64) -> Fix {
        Fix::new(at(east, north), 5.0, 1.4, ts)
    }

    /// Feed every point, stopping at the first error; returns the last report
    fn walk(tracker: &mut ClaimTracker, points: &[(f64, f64)]) -> Option<IngestReport> {
        let mut last = None;
        for (i, &(e, n)) in points.iter().enumerate() {
            let report = tracker.ingest(walk_fix(e, n, i as u64 * STEP_MS)).ok()?;
            last = Some(report);
        }
        last
    }

    /// 80m x 5m rectangle, 12 points, last point 5m from the first
    ///
    /// Every point before the last stays more than 30m from the start, so
    /// the loop closes exactly once, on the final fix.
    fn long_rectangle() -> Vec<(f64, f64)> {
        vec![
            (0.0, 0.0),
            (16.0, 0.0),
            (32.0, 0.0),
            (48.0, 0.0),
            (64.0, 0.0),
            (80.0, 0.0),
            (80.0, 5.0),
            (70.0, 5.0),
            (60.0, 5.0),
            (50.0, 5.0),
            (40.0, 5.0),
            (0.0, 5.0),
        ]
    }

    fn rejection_reason(tracker: &ClaimTracker) -> Option<RejectReason> {
        match tracker.state() {
            ClaimState::Rejected(r) => Some(r.reason),
            _ => None,
        }
    }

    // ========================================================================
    // Session protocol
    // ========================================================================

    #[test]
    fn test_initial_state_idle() {
        let tracker = tracker_with(Arc::new(CollisionIndex::new()));
        assert_eq!(*tracker.state(), ClaimState::Idle);
        assert!(tracker.path().is_empty());
        assert!(tracker.owner().is_none());
    }

    #[test]
    fn test_start_twice_fails() {
        let mut tracker = started_tracker();
        let err = tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyTracking { state: "tracking" });
    }

    #[test]
    fn test_ingest_while_idle_fails() {
        let mut tracker = tracker_with(Arc::new(CollisionIndex::new()));
        let err = tracker.ingest(walk_fix(0.0, 0.0, 0)).unwrap_err();
        assert_eq!(err, SessionError::NotTracking { state: "idle" });
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut tracker = tracker_with(Arc::new(CollisionIndex::new()));
        let bad = ValidationThresholds {
            closure_distance_m: -1.0,
            ..scenario_thresholds()
        };
        assert!(matches!(
            tracker.start(OwnerId::new("alice"), bad),
            Err(SessionError::InvalidThresholds(_))
        ));
        assert_eq!(*tracker.state(), ClaimState::Idle);
    }

    #[test]
    fn test_stop_returns_to_idle_and_discards_path() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &[(0.0, 0.0), (10.0, 0.0)]);
        assert_eq!(tracker.path().len(), 2);

        tracker.stop();
        assert_eq!(*tracker.state(), ClaimState::Idle);
        assert!(tracker.path().is_empty());

        // A fresh session can start
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();
        assert_eq!(*tracker.state(), ClaimState::Tracking);
    }

    #[test]
    fn test_terminal_state_requires_reset() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &long_rectangle());
        assert!(matches!(tracker.state(), ClaimState::Accepted(_)));

        assert!(tracker.ingest(walk_fix(0.0, 0.0, 100_000)).is_err());
        assert!(tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .is_err());

        tracker.clear();
        assert!(tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .is_ok());
    }

    // ========================================================================
    // Per-fix pipeline
    // ========================================================================

    #[test]
    fn test_inaccurate_fix_filtered() {
        let mut tracker = started_tracker();
        let report = tracker
            .ingest(Fix::new(at(0.0, 0.0), 25.0, 1.4, 0))
            .unwrap();
        assert_eq!(report.disposition, SampleDisposition::Filtered);
        assert!(tracker.path().is_empty());
    }

    #[test]
    fn test_below_spacing_discarded() {
        let mut tracker = started_tracker();
        tracker.ingest(walk_fix(0.0, 0.0, 0)).unwrap();
        let report = tracker.ingest(walk_fix(0.3, 0.0, STEP_MS)).unwrap();
        assert!(matches!(
            report.disposition,
            SampleDisposition::BelowSpacing { .. }
        ));
        assert_eq!(tracker.path().len(), 1);
    }

    #[test]
    fn test_gps_jump_discarded() {
        let mut tracker = started_tracker();
        tracker.ingest(walk_fix(0.0, 0.0, 0)).unwrap();
        let report = tracker.ingest(walk_fix(150.0, 0.0, STEP_MS)).unwrap();
        assert!(matches!(report.disposition, SampleDisposition::GpsJump { .. }));
        assert_eq!(tracker.path().len(), 1);
        assert_eq!(*tracker.state(), ClaimState::Tracking);
    }

    #[test]
    fn test_fast_low_accuracy_step_discarded() {
        let config = EngineConfig {
            filter: FilterConfig {
                window: 1,
                accuracy_ceiling_m: 30.0,
            },
            ..EngineConfig::default()
        };
        let mut tracker = ClaimTracker::new(config, Arc::new(CollisionIndex::new())).unwrap();
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        tracker.ingest(Fix::new(at(0.0, 0.0), 25.0, 1.4, 0)).unwrap();
        // 40m in 2s = 20 m/s with 25m accuracy
        let report = tracker
            .ingest(Fix::new(at(40.0, 0.0), 25.0, 1.4, STEP_MS))
            .unwrap();
        assert!(matches!(report.disposition, SampleDisposition::GpsJump { .. }));

        // Same step with good accuracy is kept
        let report = tracker.ingest(walk_fix(40.0, 0.0, 2 * STEP_MS)).unwrap();
        assert_eq!(report.disposition, SampleDisposition::Appended);
    }

    #[test]
    fn test_progress_tracks_distance() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let progress = tracker.progress();
        assert_eq!(progress.points, 3);
        assert!((progress.distance_m - 20.0).abs() < 0.01);
        let to_start = progress.distance_to_start_m.unwrap();
        assert!((to_start - 200.0_f64.sqrt()).abs() < 0.01);
        assert_eq!(progress.closure_attempts, 0);
    }

    // ========================================================================
    // Speed guard
    // ========================================================================

    #[test]
    fn test_overspeed_aborts_and_stops_appending() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &[(0.0, 0.0), (3.0, 0.0), (6.0, 0.0)]);
        assert_eq!(tracker.path().len(), 3);

        // 12 m/s = 43.2 km/h
        let report = tracker
            .ingest(Fix::new(at(30.0, 0.0), 5.0, 12.0, 3 * STEP_MS))
            .unwrap();
        assert!(matches!(report.disposition, SampleDisposition::Overspeed { .. }));
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::Overspeed));
        assert_eq!(tracker.path().len(), 3, "Aborting fix must not be appended");

        let err = tracker.ingest(walk_fix(9.0, 0.0, 4 * STEP_MS)).unwrap_err();
        assert_eq!(err, SessionError::NotTracking { state: "rejected" });
        assert_eq!(tracker.path().len(), 3);
    }

    #[test]
    fn test_overspeed_from_implied_speed() {
        let mut tracker = started_tracker();
        tracker
            .ingest(Fix::new(at(0.0, 0.0), 5.0, -1.0, 0))
            .unwrap();
        // 25m in 2s with no receiver speed: 45 km/h
        let report = tracker
            .ingest(Fix::new(at(25.0, 0.0), 5.0, -1.0, STEP_MS))
            .unwrap();
        assert!(matches!(report.disposition, SampleDisposition::Overspeed { .. }));
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::Overspeed));
    }

    #[test]
    fn test_speed_warning_is_advisory_only() {
        let mut tracker = started_tracker();
        let sink = RecordingSink::new();
        tracker.add_sink(Arc::new(sink.clone()));

        // 5 m/s = 18 km/h
        let report = tracker
            .ingest(Fix::new(at(0.0, 0.0), 5.0, 5.0, 0))
            .unwrap();
        assert_eq!(report.disposition, SampleDisposition::Appended);
        assert!(matches!(
            report.advisories.as_slice(),
            [Advisory::SpeedWarning { .. }]
        ));
        assert_eq!(*tracker.state(), ClaimState::Tracking);
        assert_eq!(sink.take().len(), 1);
    }

    // ========================================================================
    // Closure detection
    // ========================================================================

    #[test]
    fn test_closure_boundary() {
        let mut tracker = started_tracker();
        walk(
            &mut tracker,
            &[(0.0, 0.0), (40.0, 0.0), (40.0, 40.0), (0.0, 40.0), (0.0, 30.5)],
        );
        assert_eq!(*tracker.state(), ClaimState::Tracking);
        assert_eq!(tracker.progress().closure_attempts, 0);

        let report = tracker.ingest(walk_fix(0.0, 29.5, 5 * STEP_MS)).unwrap();
        assert!(report.closure.is_some());
        assert_eq!(tracker.progress().closure_attempts, 1);
    }

    #[test]
    fn test_closure_needs_five_points() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert_eq!(*tracker.state(), ClaimState::Tracking);
        assert_eq!(tracker.progress().closure_attempts, 0);
    }

    // ========================================================================
    // End-to-end scenarios
    // ========================================================================

    #[test]
    fn test_convex_loop_accepted() {
        let mut tracker = started_tracker();
        let report = walk(&mut tracker, &long_rectangle()).unwrap();

        let Some(ClosureOutcome::Accepted(claim)) = report.closure else {
            panic!("Expected acceptance, got {:?}", tracker.state());
        };
        assert!(
            (claim.area_sq_m - 400.0).abs() / 400.0 < 0.01,
            "Expected ~400 m², got {}",
            claim.area_sq_m
        );
        assert_eq!(claim.polygon.len(), 12);
        assert_eq!(claim.owner, OwnerId::new("alice"));
        assert_eq!(claim.started_at_ms, 0);
        assert_eq!(claim.closed_at_ms, 11 * STEP_MS);
        assert!((claim.distance_m - 165.0).abs() < 0.1);
        assert_eq!(tracker.progress().closure_attempts, 1);
    }

    #[test]
    fn test_six_points_insufficient() {
        let mut tracker = started_tracker();
        walk(
            &mut tracker,
            &[
                (0.0, 0.0),
                (10.0, 0.0),
                (20.0, 0.0),
                (20.0, 10.0),
                (20.0, 20.0),
                (10.0, 20.0),
            ],
        );
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::InsufficientPoints));
        assert_eq!(tracker.path().len(), 6);
        // Closed at the fifth point, re-armed and retried at the sixth
        assert_eq!(tracker.progress().closure_attempts, 2);
    }

    #[test]
    fn test_small_area_rejected() {
        let mut tracker = started_tracker();
        // 40m x 1m
        let report = walk(
            &mut tracker,
            &[
                (0.0, 0.0),
                (8.0, 0.0),
                (16.0, 0.0),
                (24.0, 0.0),
                (32.0, 0.0),
                (40.0, 0.0),
                (40.0, 1.0),
                (32.0, 1.0),
                (24.0, 1.0),
                (16.0, 1.0),
                (8.0, 1.0),
                (0.0, 1.0),
            ],
        )
        .unwrap();

        assert_eq!(rejection_reason(&tracker), Some(RejectReason::InsufficientArea));
        let Some(ClosureOutcome::Rejected(rejection)) = report.closure else {
            panic!("Expected rejection");
        };
        assert!(rejection.detail.starts_with("area 40 m²"), "{}", rejection.detail);
        assert!(report
            .advisories
            .iter()
            .any(|a| matches!(a, Advisory::Rejected { .. })));
    }

    #[test]
    fn test_self_crossing_rejected() {
        let mut tracker = started_tracker();
        // Bow tie: diagonal out, down the far side, diagonal back across
        walk(
            &mut tracker,
            &[
                (0.0, 0.0),
                (12.0, 6.0),
                (24.0, 12.0),
                (36.0, 18.0),
                (48.0, 24.0),
                (60.0, 30.0),
                (60.0, 15.0),
                (60.0, 0.0),
                (48.0, 6.0),
                (36.0, 12.0),
                (24.0, 18.0),
                (12.0, 24.0),
                (0.0, 30.0),
                (0.0, 5.0),
            ],
        );
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::SelfIntersection));
        assert_eq!(tracker.path().len(), 14);
    }

    #[test]
    fn test_overlap_with_rival_rejected() {
        let rival = FinalizedTerritory::new(
            TerritoryId(42),
            OwnerId::new("bob"),
            vec![at(30.0, -10.0), at(45.0, -10.0), at(45.0, 2.0), at(30.0, 2.0)],
        );
        let index = Arc::new(CollisionIndex::with_territories(vec![rival]));
        let mut tracker = tracker_with(index);
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        walk(&mut tracker, &long_rectangle());
        assert_eq!(
            rejection_reason(&tracker),
            Some(RejectReason::Overlap {
                territory: TerritoryId(42),
                kind: CrossingKind::BoundaryCrossed,
            })
        );
    }

    #[test]
    fn test_overlap_with_own_claim_rejected() {
        let own = FinalizedTerritory::new(
            TerritoryId(7),
            OwnerId::new("alice"),
            vec![at(30.0, -10.0), at(45.0, -10.0), at(45.0, 2.0), at(30.0, 2.0)],
        );
        let index = Arc::new(CollisionIndex::with_territories(vec![own]));
        let mut tracker = tracker_with(index);
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        walk(&mut tracker, &long_rectangle());
        assert!(matches!(
            rejection_reason(&tracker),
            Some(RejectReason::Overlap { .. })
        ));
    }

    #[test]
    fn test_index_change_between_fixes_observed() {
        let index = Arc::new(CollisionIndex::new());
        let mut tracker = tracker_with(Arc::clone(&index));
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        let path = long_rectangle();
        walk(&mut tracker, &path[..11]);

        // Rival territory lands mid-walk
        index
            .insert(FinalizedTerritory::new(
                TerritoryId(9),
                OwnerId::new("bob"),
                vec![at(10.0, 2.0), at(20.0, 2.0), at(20.0, 8.0), at(10.0, 8.0)],
            ))
            .unwrap();

        tracker.ingest(walk_fix(0.0, 5.0, 11 * STEP_MS)).unwrap();
        assert!(matches!(
            rejection_reason(&tracker),
            Some(RejectReason::Overlap { .. })
        ));
    }

    // ========================================================================
    // Re-arming
    // ========================================================================

    #[test]
    fn test_rearm_after_walking_away() {
        let mut tracker = started_tracker();
        walk(
            &mut tracker,
            &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (20.0, 10.0), (10.0, 10.0)],
        );
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::InsufficientPoints));

        // 30-50m from start: still rejected, but the point is kept
        tracker.ingest(walk_fix(10.0, 35.0, 5 * STEP_MS)).unwrap();
        assert!(rejection_reason(&tracker).is_some());
        assert_eq!(tracker.path().len(), 6);

        // Beyond 50m: re-armed
        tracker.ingest(walk_fix(10.0, 60.0, 6 * STEP_MS)).unwrap();
        assert_eq!(*tracker.state(), ClaimState::Tracking);
        assert_eq!(tracker.path().len(), 7);
        assert_eq!(tracker.progress().closure_attempts, 1);
    }

    #[test]
    fn test_rearmed_path_can_be_accepted() {
        let mut tracker = started_tracker();
        // Early closure near the start fails on point count, then the
        // claimant walks a large loop and returns
        walk(
            &mut tracker,
            &[
                (0.0, 0.0),
                (10.0, 0.0),
                (10.0, 10.0),
                (0.0, 10.0),
                (-5.0, 5.0),
                (-20.0, 40.0),
                (-20.0, 80.0),
                (20.0, 80.0),
                (60.0, 80.0),
                (60.0, 40.0),
                (60.0, -20.0),
                (20.0, -20.0),
                (5.0, -10.0),
            ],
        );
        let ClaimState::Accepted(claim) = tracker.state() else {
            panic!("Expected acceptance, got {:?}", tracker.state());
        };
        assert_eq!(claim.polygon.len(), 13);
        assert!(tracker.progress().closure_attempts >= 2);
    }

    #[test]
    fn test_rearm_far_from_start_still_tests_closure() {
        let mut tracker = tracker_with(Arc::new(CollisionIndex::new()));
        let wide = ValidationThresholds {
            closure_distance_m: 60.0,
            ..scenario_thresholds()
        };
        tracker.start(OwnerId::new("alice"), wide).unwrap();

        walk(
            &mut tracker,
            &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (20.0, 10.0), (10.0, 10.0)],
        );
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::InsufficientPoints));

        // 55.9m from start: beyond the re-arm distance and inside closure range
        let report = tracker.ingest(walk_fix(10.0, 55.0, 5 * STEP_MS)).unwrap();
        assert!(
            report.closure.is_some(),
            "Re-arming point inside closure range must attempt closure"
        );
        assert_eq!(tracker.progress().closure_attempts, 2);
        assert_eq!(rejection_reason(&tracker), Some(RejectReason::InsufficientPoints));
    }

    #[test]
    fn test_compact_loop_closes_before_walk_completes() {
        // 32.8m x 12.2m rectangle: area 400 m², perimeter 90m, 12 points with
        // the last 5m from the first. The whole shape lies within ~35m of the
        // start, so closure fires as soon as a point comes back inside 30m.
        let mut tracker = started_tracker();
        let points = [
            (0.0, 0.0),
            (8.0, 0.0),
            (16.0, 0.0),
            (24.0, 0.0),
            (32.8, 0.0),
            (32.8, 6.0),
            (32.8, 12.2),
            (24.0, 12.2),
            (16.0, 12.2),
            (8.0, 12.2),
            (0.0, 12.2),
            (0.0, 5.0),
        ];

        let mut outcomes = Vec::new();
        for (i, &(e, n)) in points[..10].iter().enumerate() {
            let report = tracker.ingest(walk_fix(e, n, i as u64 * STEP_MS)).unwrap();
            outcomes.push(report.closure);
        }

        // Points 8 and 9 close the loop with too few points
        assert!(outcomes[..7].iter().all(Option::is_none));
        assert!(matches!(
            &outcomes[7],
            Some(ClosureOutcome::Rejected(r)) if r.reason == RejectReason::InsufficientPoints
        ));
        assert!(matches!(
            &outcomes[8],
            Some(ClosureOutcome::Rejected(r)) if r.reason == RejectReason::InsufficientPoints
        ));

        // Point 10 reaches min_points and is accepted, cutting the last corner
        let Some(ClosureOutcome::Accepted(claim)) = &outcomes[9] else {
            panic!("Expected acceptance at the tenth point, got {:?}", outcomes[9]);
        };
        let expected = 32.8 * 12.2 - 0.5 * 8.0 * 12.2;
        assert!(
            (claim.area_sq_m - expected).abs() / expected < 0.01,
            "Expected ~{:.1} m², got {:.1}",
            expected,
            claim.area_sq_m
        );
        assert_eq!(claim.polygon.len(), 10);
        assert_eq!(tracker.progress().closure_attempts, 3);

        // Remaining fixes are refused
        for (i, &(e, n)) in points[10..].iter().enumerate() {
            let err = tracker
                .ingest(walk_fix(e, n, (10 + i) as u64 * STEP_MS))
                .unwrap_err();
            assert_eq!(err, SessionError::NotTracking { state: "accepted" });
        }
    }

    // ========================================================================
    // Advisories, cancellation, persistence
    // ========================================================================

    #[test]
    fn test_proximity_tier_change_reported_once() {
        let rival = FinalizedTerritory::new(
            TerritoryId(1),
            OwnerId::new("bob"),
            vec![at(0.0, 40.0), at(10.0, 40.0), at(10.0, 50.0), at(0.0, 50.0)],
        );
        let index = Arc::new(CollisionIndex::with_territories(vec![rival]));
        let mut tracker = tracker_with(index);
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        let first = tracker.ingest(walk_fix(0.0, 0.0, 0)).unwrap();
        assert!(matches!(
            first.advisories.as_slice(),
            [Advisory::Proximity {
                tier: ProximityTier::Warning,
                is_own: false,
                ..
            }]
        ));

        // Same tier: nothing new
        let second = tracker.ingest(walk_fix(3.0, 0.0, STEP_MS)).unwrap();
        assert!(second.advisories.is_empty());

        let third = tracker.ingest(walk_fix(3.0, 20.0, 2 * STEP_MS)).unwrap();
        assert!(matches!(
            third.advisories.as_slice(),
            [Advisory::Proximity {
                tier: ProximityTier::Danger,
                ..
            }]
        ));
    }

    #[test]
    fn test_own_territory_ignored_for_proximity_by_default() {
        let own = FinalizedTerritory::new(
            TerritoryId(1),
            OwnerId::new("alice"),
            vec![at(0.0, 10.0), at(10.0, 10.0), at(10.0, 20.0), at(0.0, 20.0)],
        );
        let index = Arc::new(CollisionIndex::with_territories(vec![own]));
        let mut tracker = tracker_with(index);
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        let report = tracker.ingest(walk_fix(0.0, 0.0, 0)).unwrap();
        assert!(report.advisories.is_empty());
    }

    #[test]
    fn test_cancel_token_returns_to_idle() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &[(0.0, 0.0), (10.0, 0.0)]);

        let token = tracker.cancel_token();
        std::thread::spawn(move || token.cancel()).join().unwrap();

        let err = tracker.ingest(walk_fix(20.0, 0.0, 2 * STEP_MS)).unwrap_err();
        assert_eq!(err, SessionError::Cancelled);
        assert_eq!(*tracker.state(), ClaimState::Idle);
        assert!(tracker.path().is_empty());

        // New session gets a fresh token
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();
        assert!(tracker.ingest(walk_fix(0.0, 0.0, 0)).is_ok());
    }

    /// Cancels its session on the first proximity advisory
    struct CancelOnProximity(CancelToken);

    impl AdvisorySink for CancelOnProximity {
        fn advise(&self, advisory: &Advisory) {
            if matches!(advisory, Advisory::Proximity { .. }) {
                self.0.cancel();
            }
        }
    }

    #[test]
    fn test_cancel_during_validation_returns_to_idle() {
        // Rival plot west of the start: danger at both ends of the walk,
        // safe at the far end, so the tier changes again on the closing fix
        let rival = FinalizedTerritory::new(
            TerritoryId(3),
            OwnerId::new("bob"),
            vec![at(-25.0, 10.0), at(-20.0, 10.0), at(-20.0, 15.0), at(-25.0, 15.0)],
        );
        let index = Arc::new(CollisionIndex::with_territories(vec![rival]));
        let mut tracker = tracker_with(index);
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        let path = long_rectangle();
        walk(&mut tracker, &path[..11]);
        assert_eq!(*tracker.state(), ClaimState::Tracking);

        // Fires after the append, before the pipeline's later steps
        let token = tracker.cancel_token();
        tracker.add_sink(Arc::new(CancelOnProximity(token)));
        let err = tracker.ingest(walk_fix(0.0, 5.0, 11 * STEP_MS)).unwrap_err();

        assert_eq!(err, SessionError::Cancelled);
        assert_eq!(*tracker.state(), ClaimState::Idle);
        assert!(tracker.path().is_empty());
        assert_eq!(tracker.progress().closure_attempts, 0);
    }

    #[test]
    fn test_unavailable_index_rejects_as_validation_unavailable() {
        let index = Arc::new(CollisionIndex::new());
        let mut tracker = tracker_with(Arc::clone(&index));
        tracker
            .start(OwnerId::new("alice"), scenario_thresholds())
            .unwrap();

        let path = long_rectangle();
        walk(&mut tracker, &path[..11]);
        index.poison();

        let report = tracker.ingest(walk_fix(0.0, 5.0, 11 * STEP_MS)).unwrap();
        assert_eq!(
            rejection_reason(&tracker),
            Some(RejectReason::ValidationUnavailable)
        );
        assert!(matches!(
            report.closure,
            Some(ClosureOutcome::Rejected(Rejection {
                reason: RejectReason::ValidationUnavailable,
                ..
            }))
        ));
        assert!(RejectReason::ValidationUnavailable.is_rearmable());
    }

    #[test]
    fn test_invalid_engine_config_refused() {
        let config = EngineConfig {
            persistence_timeout_ms: 0,
            ..test_config()
        };
        assert!(matches!(
            ClaimTracker::new(config, Arc::new(CollisionIndex::new())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_persist_accepted_claim() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &long_rectangle());

        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn ClaimStore> = memory.clone();
        let outcome = tracker.persist(&store).unwrap();
        assert_eq!(outcome, PersistOutcome::Stored(TerritoryId(1)));
        assert_eq!(memory.claims().len(), 1);
        assert!(matches!(tracker.state(), ClaimState::Accepted(_)));
    }

    #[test]
    fn test_persist_requires_acceptance() {
        let mut tracker = started_tracker();
        let store: Arc<dyn ClaimStore> = Arc::new(MemoryStore::new());
        assert_eq!(
            tracker.persist(&store).unwrap_err(),
            SessionError::NotAccepted { state: "tracking" }
        );
    }

    struct DownStore;

    impl ClaimStore for DownStore {
        fn store(&self, _: &AcceptedClaim) -> std::result::Result<TerritoryId, CollaboratorError> {
            Err(CollaboratorError::Failed("503".into()))
        }
    }

    #[test]
    fn test_persist_failure_is_validation_unavailable() {
        let mut tracker = started_tracker();
        walk(&mut tracker, &long_rectangle());

        let store: Arc<dyn ClaimStore> = Arc::new(DownStore);
        let outcome = tracker.persist(&store).unwrap();
        assert!(matches!(outcome, PersistOutcome::Unavailable(_)));
        assert_eq!(
            rejection_reason(&tracker),
            Some(RejectReason::ValidationUnavailable)
        );

        // Retry by appending another point inside closure range
        let report = tracker.ingest(walk_fix(0.0, 2.0, 12 * STEP_MS)).unwrap();
        assert!(matches!(report.closure, Some(ClosureOutcome::Accepted(_))));
    }

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::InsufficientPoints.code(), "insufficient points");
        assert_eq!(RejectReason::SelfIntersection.code(), "self-intersection");
        assert_eq!(RejectReason::InsufficientArea.code(), "insufficient area");
        assert_eq!(RejectReason::Overspeed.code(), "overspeed");
        assert_eq!(
            RejectReason::ValidationUnavailable.code(),
            "validation_unavailable"
        );
        assert!(!RejectReason::Overspeed.is_rearmable());
        assert!(RejectReason::InsufficientArea.is_rearmable());
    }
}
