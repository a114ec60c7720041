//! Simulates a claimant walking territory loops through the engine
//!
//! Three sessions against one shared index:
//! 1. A clean 60m x 40m loop that is accepted and stored
//! 2. A bow-tie walk that crosses itself
//! 3. A walk that turns into a bike ride and is aborted
//!
//! GPS noise is added to every fix; the sample filter smooths it out.
//!
//! Run with: RUST_LOG=info cargo run --example walk_sim

use std::sync::Arc;

use territory_engine::{
    ClaimState, ClaimStore, ClaimTracker, CollisionIndex, EngineConfig, FinalizedTerritory, Fix,
    GeoPoint, LogSink, MemoryStore, OwnerId, PersistOutcome, TerritoryEvent, ValidationThresholds,
};

const STEP_MS: u64 = 2_000;
const WALK_MPS: f64 = 1.4;

/// Simple pseudo-random noise generator (deterministic for reproducibility)
struct NoiseGen {
    state: u32,
}

impl NoiseGen {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Returns noise in range [-amplitude, +amplitude]
    fn next(&mut self, amplitude: f64) -> f64 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345);
        let normalized = (self.state as f64 / u32::MAX as f64) * 2.0 - 1.0;
        normalized * amplitude
    }
}

/// Densify corner points into ~3m walking steps
fn walk_route(corners: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut route = Vec::new();
    for pair in corners.windows(2) {
        let (e0, n0) = pair[0];
        let (e1, n1) = pair[1];
        let len = ((e1 - e0).powi(2) + (n1 - n0).powi(2)).sqrt();
        let steps = (len / 3.0).ceil().max(1.0) as usize;
        for s in 0..steps {
            let t = s as f64 / steps as f64;
            route.push((e0 + (e1 - e0) * t, n0 + (n1 - n0) * t));
        }
    }
    if let Some(&last) = corners.last() {
        route.push(last);
    }
    route
}

fn run_session(
    tracker: &mut ClaimTracker,
    origin: GeoPoint,
    route: &[(f64, f64)],
    speed_at: impl Fn(usize) -> f64,
    noise: &mut NoiseGen,
) {
    for (i, &(east, north)) in route.iter().enumerate() {
        let point = origin.offset_m(east + noise.next(1.0), north + noise.next(1.0));
        let accuracy = 4.0 + noise.next(2.0).abs();
        let fix = Fix::new(point, accuracy, speed_at(i), i as u64 * STEP_MS);

        let report = match tracker.ingest(fix) {
            Ok(report) => report,
            Err(e) => {
                println!("  fix {:>3}: ingest refused ({})", i, e);
                break;
            }
        };
        for advisory in &report.advisories {
            println!("  fix {:>3}: {}", i, advisory);
        }
        if report.closure.is_some() {
            println!(
                "  fix {:>3}: loop closed -> {}",
                i,
                tracker.state().name()
            );
        }
        if matches!(tracker.state(), ClaimState::Accepted(_)) {
            break;
        }
    }

    let progress = tracker.progress();
    println!(
        "  {} points, {:.0} m walked, {} closure attempt(s)",
        progress.points, progress.distance_m, progress.closure_attempts
    );
}

fn main() {
    env_logger::init();

    let origin = GeoPoint::new(51.5007, -0.1246);
    let index = Arc::new(CollisionIndex::new());
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn ClaimStore> = memory.clone();
    let mut noise = NoiseGen::new(42);

    // A rival already holds a plot east of the walk
    index
        .insert(FinalizedTerritory::new(
            territory_engine::TerritoryId(1000),
            OwnerId::new("bob"),
            vec![
                origin.offset_m(90.0, 0.0),
                origin.offset_m(130.0, 0.0),
                origin.offset_m(130.0, 40.0),
                origin.offset_m(90.0, 40.0),
            ],
        ))
        .expect("fresh index");

    let mut tracker =
        ClaimTracker::new(EngineConfig::default(), Arc::clone(&index)).expect("default config");
    tracker.add_sink(Arc::new(LogSink));
    let thresholds = ValidationThresholds::default();

    println!("=== Territory Claim Simulation ===\n");

    // Session 1: clean loop
    println!("Session 1: 60m x 40m loop at walking pace");
    tracker
        .start(OwnerId::new("alice"), thresholds)
        .expect("idle tracker");
    let loop_route = walk_route(&[(0.0, 0.0), (60.0, 0.0), (60.0, 40.0), (0.0, 40.0), (0.0, 8.0)]);
    run_session(&mut tracker, origin, &loop_route, |_| WALK_MPS, &mut noise);

    if let ClaimState::Accepted(claim) = tracker.state() {
        println!("  accepted: {:.0} m²", claim.area_sq_m);
        let owner = claim.owner.clone();
        let polygon = claim.polygon.clone();
        match tracker.persist(&store) {
            Ok(PersistOutcome::Stored(id)) => {
                println!("  stored as territory {}", id.0);
                index
                    .apply(TerritoryEvent::Added(FinalizedTerritory::new(id, owner, polygon)))
                    .expect("index available");
            }
            Ok(PersistOutcome::Unavailable(r)) => println!("  not stored: {}", r.detail),
            Err(e) => println!("  persist refused: {}", e),
        }
    }
    tracker.stop();

    // Session 2: bow tie
    println!("\nSession 2: figure-eight walk north of the first claim");
    let north = origin.offset_m(0.0, 120.0);
    tracker
        .start(OwnerId::new("alice"), thresholds)
        .expect("idle tracker");
    let bow_tie = walk_route(&[(0.0, 0.0), (60.0, 40.0), (60.0, 0.0), (0.0, 40.0), (0.0, 10.0)]);
    run_session(&mut tracker, north, &bow_tie, |_| WALK_MPS, &mut noise);
    if let ClaimState::Rejected(r) = tracker.state() {
        println!("  rejected ({}): {}", r.reason.code(), r.detail);
    }
    tracker.stop();

    // Session 3: speeding up
    println!("\nSession 3: walk that turns into a bike ride");
    let south = origin.offset_m(0.0, -150.0);
    tracker
        .start(OwnerId::new("alice"), thresholds)
        .expect("idle tracker");
    let straight = walk_route(&[(0.0, 0.0), (200.0, 0.0)]);
    run_session(
        &mut tracker,
        south,
        &straight,
        |i| if i < 20 { WALK_MPS } else { 1.4 + (i - 20) as f64 * 1.5 },
        &mut noise,
    );
    if let ClaimState::Rejected(r) = tracker.state() {
        println!("  rejected ({}): {}", r.reason.code(), r.detail);
    }
    tracker.stop();

    println!("\nStored territories: {}", memory.claims().len());
    println!(
        "Index now holds {} territories",
        index.len().expect("index available")
    );
}
