//! Territory Claim Engine
//!
//! Geometry and anti-cheat validation for walk-to-claim territory games.
//! A claimant walks a closed loop; the engine filters the location stream,
//! detects when the loop closes, and decides whether the enclosed area
//! becomes a territory.
//!
//! ## Features
//!
//! - **Sample Filtering**: Accuracy gate plus inverse-variance weighted averaging
//! - **Speed Anti-Cheat**: Rate-limited warnings, hard abort above running pace
//! - **Loop Closure**: Re-armable closure detection against the start point
//! - **Validation Pipeline**: Point count, distance, self-intersection, area, overlap
//! - **Collision Index**: Concurrent snapshot index of finalized territories
//! - **Advisories**: Speed and proximity notifications through pluggable sinks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  ClaimTracker (session state machine)       │
//! ├──────────────┬──────────────┬───────────────┤
//! │ SampleFilter │  SpeedGuard  │ CollisionIndex│
//! ├──────────────┴──────────────┴───────────────┤
//! │  Geometry (haversine, rings, area)          │
//! └─────────────────────────────────────────────┘
//!        │ advisories            │ accepted claims
//!        ▼                       ▼
//!   AdvisorySink            ClaimStore
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use territory_engine::{
//!     ClaimTracker, CollisionIndex, EngineConfig, Fix, GeoPoint, LogSink, OwnerId,
//! };
//!
//! let index = Arc::new(CollisionIndex::new());
//! let mut tracker = ClaimTracker::new(EngineConfig::default(), index).expect("valid config");
//! tracker.add_sink(Arc::new(LogSink));
//! tracker
//!     .start(OwnerId::new("alice"), Default::default())
//!     .expect("idle tracker");
//!
//! let fix = Fix::new(GeoPoint::new(37.7749, -122.4194), 5.0, 1.4, 0);
//! let report = tracker.ingest(fix).expect("tracking");
//! println!("{:?} -> {}", report.disposition, tracker.state().name());
//! ```
//!
//! ## Modules
//!
//! - [`fix`] - Coordinates and location fixes
//! - [`geometry`] - Pure geodesic and polygon helpers
//! - [`filter`] - Location sample filter
//! - [`speed_guard`] - Speed anti-cheat
//! - [`collision`] - Territory index and overlap/proximity queries
//! - [`tracker`] - Claim session state machine and validation pipeline
//! - [`advisory`] - Advisory messages and sinks
//! - [`persistence`] - Claim store collaborator
//! - [`config`] - Thresholds and engine configuration
//! - [`error`] - Error types

pub mod advisory;
pub mod collision;
pub mod config;
pub mod error;
pub mod filter;
pub mod fix;
pub mod geometry;
pub mod persistence;
pub mod speed_guard;
pub mod tracker;

// Re-export commonly used types
pub use advisory::{Advisory, AdvisorySink, LogSink, RecordingSink};
pub use collision::{
    CollisionIndex, Crossing, CrossingKind, FinalizedTerritory, OwnerId, Proximity, ProximityTier,
    TerritoryEvent, TerritoryId, TerritorySnapshot,
};
pub use config::{EngineConfig, FilterConfig, SpeedGuardConfig, ValidationThresholds};
pub use error::{CollaboratorError, ConfigError, IndexError, SessionError};
pub use filter::SampleFilter;
pub use fix::{Fix, GeoPoint};
pub use persistence::{ClaimStore, MemoryStore};
pub use speed_guard::{SpeedGuard, SpeedVerdict};
pub use tracker::{
    AcceptedClaim, CancelToken, ClaimState, ClaimTracker, ClosureOutcome, IngestReport,
    PersistOutcome, Progress, RejectReason, Rejection, SampleDisposition,
};
