//! Existing-territory index
//!
//! Holds every finalized territory (the claimant's own and everyone
//! else's) and answers the overlap and proximity queries the claim
//! tracker needs.
//!
//! ## Concurrency
//!
//! The territory list lives behind `RwLock<Arc<Vec<_>>>`. Readers take the
//! lock only long enough to clone the `Arc` and then query an immutable
//! [`TerritorySnapshot`]; writers build a new vector and swap it in. A
//! query therefore sees either the whole of an insert or none of it, and
//! catalog events may arrive on another thread between any two ingest
//! calls.

use std::sync::{Arc, RwLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::fix::GeoPoint;
use crate::geometry::{
    bounding_box, distance_m, point_in_polygon, polygon_area_sq_meters, segments_intersect,
    BoundingBox,
};

/// Stable territory identifier assigned by the persistence collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TerritoryId(pub u64);

/// Claimant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, stored claim
///
/// Immutable once built. The ring is implicitly closed; an explicit
/// closing vertex equal to the first one is dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedTerritory {
    pub id: TerritoryId,
    pub owner: OwnerId,
    pub polygon: Vec<GeoPoint>,
    pub area_sq_m: f64,
    pub bbox: BoundingBox,
}

impl FinalizedTerritory {
    pub fn new(id: TerritoryId, owner: OwnerId, mut polygon: Vec<GeoPoint>) -> Self {
        if polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }
        let area_sq_m = polygon_area_sq_meters(&polygon);
        let bbox = bounding_box(&polygon);
        Self {
            id,
            owner,
            polygon,
            area_sq_m,
            bbox,
        }
    }

    /// Ring edges, closing edge included
    fn edges(&self) -> impl Iterator<Item = (GeoPoint, GeoPoint)> + '_ {
        ring_edges(&self.polygon)
    }
}

/// How a candidate ring overlaps an existing territory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingKind {
    /// A candidate edge crosses the territory boundary
    BoundaryCrossed,
    /// The candidate's last point lies inside the territory
    InteriorEntered,
}

impl CrossingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossingKind::BoundaryCrossed => "boundary crossed",
            CrossingKind::InteriorEntered => "interior entered",
        }
    }
}

/// First overlap found against the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossing {
    pub territory: TerritoryId,
    pub kind: CrossingKind,
}

/// Advisory distance tiers to the nearest territory vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProximityTier {
    /// Under 25m
    Danger,
    /// 25-50m
    Warning,
    /// 50-100m
    Caution,
    /// Over 100m (or nothing nearby)
    Safe,
}

pub const PROXIMITY_DANGER_M: f64 = 25.0;
pub const PROXIMITY_WARNING_M: f64 = 50.0;
pub const PROXIMITY_CAUTION_M: f64 = 100.0;

impl ProximityTier {
    pub fn from_distance(distance_m: f64) -> Self {
        if distance_m < PROXIMITY_DANGER_M {
            ProximityTier::Danger
        } else if distance_m < PROXIMITY_WARNING_M {
            ProximityTier::Warning
        } else if distance_m <= PROXIMITY_CAUTION_M {
            ProximityTier::Caution
        } else {
            ProximityTier::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProximityTier::Danger => "danger",
            ProximityTier::Warning => "warning",
            ProximityTier::Caution => "caution",
            ProximityTier::Safe => "safe",
        }
    }
}

/// Nearest territory vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub distance_m: f64,
    pub is_own: bool,
}

impl Proximity {
    pub fn tier(&self) -> ProximityTier {
        ProximityTier::from_distance(self.distance_m)
    }
}

/// Catalog change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TerritoryEvent {
    Added(FinalizedTerritory),
    Removed(TerritoryId),
}

/// Immutable view of the index at one instant
#[derive(Debug, Clone, Default)]
pub struct TerritorySnapshot {
    territories: Arc<Vec<FinalizedTerritory>>,
}

impl TerritorySnapshot {
    pub fn len(&self) -> usize {
        self.territories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FinalizedTerritory> {
        self.territories.iter()
    }

    fn candidates<'a>(
        &'a self,
        exclude_owner: Option<&'a OwnerId>,
    ) -> impl Iterator<Item = &'a FinalizedTerritory> + 'a {
        self.territories
            .iter()
            .filter(move |t| exclude_owner.is_none_or(|owner| &t.owner != owner))
    }

    /// First territory containing `p`
    pub fn point_in_any_territory(
        &self,
        p: GeoPoint,
        exclude_owner: Option<&OwnerId>,
    ) -> Option<TerritoryId> {
        self.candidates(exclude_owner)
            .find(|t| t.bbox.contains(p) && point_in_polygon(p, &t.polygon))
            .map(|t| t.id)
    }

    /// First overlap between the closed ring of `path` and any territory
    ///
    /// Every path edge, including the implicit closing edge, is tested
    /// against every territory edge; then the path's last point is tested
    /// for containment. Territories whose bounds miss the path's bounds are
    /// skipped, which cannot change the answer.
    pub fn path_crosses_any(
        &self,
        path: &[GeoPoint],
        exclude_owner: Option<&OwnerId>,
    ) -> Option<Crossing> {
        let last = *path.last()?;
        let path_bbox = bounding_box(path);

        for territory in self.candidates(exclude_owner) {
            if !path_bbox.intersects(&territory.bbox) {
                continue;
            }

            let crossed = ring_edges(path).any(|(a1, a2)| {
                territory
                    .edges()
                    .any(|(b1, b2)| segments_intersect(a1, a2, b1, b2))
            });
            if crossed {
                debug!("collision: path crosses boundary of {:?}", territory.id);
                return Some(Crossing {
                    territory: territory.id,
                    kind: CrossingKind::BoundaryCrossed,
                });
            }

            if point_in_polygon(last, &territory.polygon) {
                debug!("collision: path ends inside {:?}", territory.id);
                return Some(Crossing {
                    territory: territory.id,
                    kind: CrossingKind::InteriorEntered,
                });
            }
        }

        None
    }

    /// Distance from `p` to the nearest vertex of any territory
    ///
    /// With `include_own == false` the owner's territories are ignored.
    /// `None` when no territory qualifies.
    pub fn min_distance_to_any(
        &self,
        p: GeoPoint,
        owner: &OwnerId,
        include_own: bool,
    ) -> Option<Proximity> {
        let exclude = if include_own { None } else { Some(owner) };

        let mut best: Option<Proximity> = None;
        for territory in self.candidates(exclude) {
            let is_own = &territory.owner == owner;
            for &vertex in &territory.polygon {
                let d = distance_m(p, vertex);
                if best.is_none_or(|b| d < b.distance_m) {
                    best = Some(Proximity {
                        distance_m: d,
                        is_own,
                    });
                }
            }
        }
        best
    }
}

/// Thread-safe territory index
#[derive(Debug, Default)]
pub struct CollisionIndex {
    territories: RwLock<Arc<Vec<FinalizedTerritory>>>,
}

impl CollisionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index seeded from the catalog's initial contents
    pub fn with_territories(territories: Vec<FinalizedTerritory>) -> Self {
        Self {
            territories: RwLock::new(Arc::new(territories)),
        }
    }

    /// Current contents as an immutable snapshot
    pub fn snapshot(&self) -> Result<TerritorySnapshot, IndexError> {
        let guard = match self.territories.read() {
            Ok(g) => g,
            Err(_) => {
                warn!("collision index lock poisoned");
                return Err(IndexError::Unavailable);
            }
        };
        Ok(TerritorySnapshot {
            territories: Arc::clone(&guard),
        })
    }

    /// Add or replace a territory (matched by id)
    pub fn insert(&self, territory: FinalizedTerritory) -> Result<(), IndexError> {
        self.update(|list| {
            list.retain(|t| t.id != territory.id);
            list.push(territory);
        })
    }

    /// Remove a territory; returns whether it was present
    pub fn remove(&self, id: TerritoryId) -> Result<bool, IndexError> {
        let mut removed = false;
        self.update(|list| {
            let before = list.len();
            list.retain(|t| t.id != id);
            removed = list.len() != before;
        })?;
        Ok(removed)
    }

    /// Apply one catalog event
    pub fn apply(&self, event: TerritoryEvent) -> Result<(), IndexError> {
        match event {
            TerritoryEvent::Added(territory) => self.insert(territory),
            TerritoryEvent::Removed(id) => self.remove(id).map(|_| ()),
        }
    }

    pub fn len(&self) -> Result<usize, IndexError> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.snapshot()?.is_empty())
    }

    pub fn get(&self, id: TerritoryId) -> Result<Option<FinalizedTerritory>, IndexError> {
        Ok(self.snapshot()?.iter().find(|t| t.id == id).cloned())
    }

    /// All territories held by `owner`
    pub fn territories_of(&self, owner: &OwnerId) -> Result<Vec<FinalizedTerritory>, IndexError> {
        Ok(self
            .snapshot()?
            .iter()
            .filter(|t| &t.owner == owner)
            .cloned()
            .collect())
    }

    pub fn point_in_any_territory(
        &self,
        p: GeoPoint,
        exclude_owner: Option<&OwnerId>,
    ) -> Result<Option<TerritoryId>, IndexError> {
        Ok(self.snapshot()?.point_in_any_territory(p, exclude_owner))
    }

    pub fn path_crosses_any(
        &self,
        path: &[GeoPoint],
        exclude_owner: Option<&OwnerId>,
    ) -> Result<Option<Crossing>, IndexError> {
        Ok(self.snapshot()?.path_crosses_any(path, exclude_owner))
    }

    pub fn min_distance_to_any(
        &self,
        p: GeoPoint,
        owner: &OwnerId,
        include_own: bool,
    ) -> Result<Option<Proximity>, IndexError> {
        Ok(self.snapshot()?.min_distance_to_any(p, owner, include_own))
    }

    /// Poison the lock the way a panicking catalog writer would
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        std::thread::scope(|s| {
            let writer = s.spawn(|| {
                let _guard = self.territories.write();
                panic!("catalog writer died mid-update");
            });
            assert!(writer.join().is_err());
        });
    }

    /// Copy-and-swap under the write lock
    fn update(&self, f: impl FnOnce(&mut Vec<FinalizedTerritory>)) -> Result<(), IndexError> {
        let mut guard = self
            .territories
            .write()
            .map_err(|_| IndexError::Unavailable)?;
        let mut next = Vec::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
        Ok(())
    }
}

/// Edges of an implicitly closed ring
fn ring_edges(ring: &[GeoPoint]) -> impl Iterator<Item = (GeoPoint, GeoPoint)> + '_ {
    let n = ring.len();
    // Two points form a single edge; repeating it as a closing edge adds nothing
    let count = match n {
        0 | 1 => 0,
        2 => 1,
        _ => n,
    };
    (0..count).map(move |i| (ring[i], ring[(i + 1) % n]))
}
