// src/analysis/ground_contact.rs
//
// Per-identity, per-side ground-contact resolution.
//
// Each side walks an ordered fallback chain (heel → toe → ankle → knee) and
// takes the first landmark above the confidence floor as this frame's raw
// sample. The last N raw samples are averaged to suppress single-frame
// jitter. An operator-supplied manual point wins over every automatic
// source, bypasses smoothing, and stays until cleared.
//
// A side with no qualifying source and no manual point is reported as
// unavailable for the frame. It is never filled in from stale history.

use crate::types::{ContactConfig, ContactSource, GroundContactPoint, IdentityId, LandmarkMap, Point, Side};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Fallback chain, highest priority first. The landmark name is
/// `<side>_<suffix>` in the pose collaborator's naming.
const FALLBACK_CHAIN: [(ContactSource, &str); 4] = [
    (ContactSource::Heel, "heel"),
    (ContactSource::Toe, "foot_index"),
    (ContactSource::Ankle, "ankle"),
    (ContactSource::Knee, "knee"),
];

fn landmark_name(side: Side, suffix: &str) -> String {
    format!("{}_{}", side.as_str(), suffix)
}

// ============================================================================
// MANUAL OVERRIDES
// ============================================================================

/// Operator foot corrections, keyed by identity and side. Owned by the
/// pipeline and only changed through control commands at frame boundaries.
#[derive(Debug, Clone, Default)]
pub struct ManualOverrides {
    points: HashMap<(IdentityId, Side), Point>,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: IdentityId, side: Side, point: Point) {
        self.points.insert((id, side), point);
    }

    /// Returns true when an override was present.
    pub fn clear(&mut self, id: IdentityId, side: Side) -> bool {
        self.points.remove(&(id, side)).is_some()
    }

    pub fn clear_identity(&mut self, id: IdentityId) {
        self.points.retain(|(pid, _), _| *pid != id);
    }

    pub fn get(&self, id: IdentityId, side: Side) -> Option<Point> {
        self.points.get(&(id, side)).copied()
    }

    pub fn clear_all(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Contact result for one side on one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactReading {
    Resolved(GroundContactPoint),
    Unavailable,
}

impl ContactReading {
    pub fn point(&self) -> Option<&GroundContactPoint> {
        match self {
            Self::Resolved(p) => Some(p),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct RawSample {
    position: Point,
    confidence: f32,
}

pub struct GroundContactResolver {
    config: ContactConfig,
    history: HashMap<(IdentityId, Side), VecDeque<RawSample>>,
}

impl GroundContactResolver {
    pub fn new(config: ContactConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Resolve both sides for one identity. Index with `Side::index()`.
    pub fn resolve(
        &mut self,
        id: IdentityId,
        landmarks: &LandmarkMap,
        overrides: &ManualOverrides,
    ) -> [ContactReading; 2] {
        [
            self.resolve_side(id, Side::Left, landmarks, overrides),
            self.resolve_side(id, Side::Right, landmarks, overrides),
        ]
    }

    pub fn resolve_side(
        &mut self,
        id: IdentityId,
        side: Side,
        landmarks: &LandmarkMap,
        overrides: &ManualOverrides,
    ) -> ContactReading {
        if let Some(position) = overrides.get(id, side) {
            return ContactReading::Resolved(GroundContactPoint {
                side,
                position,
                confidence: 1.0,
                source: ContactSource::Manual,
            });
        }

        let Some((source, sample)) = self.select_source(side, landmarks) else {
            debug!("P{} {} foot: no landmark above {:.2}", id, side.as_str(), self.config.min_confidence);
            return ContactReading::Unavailable;
        };

        let window = self.config.smoothing_window;
        let history = self
            .history
            .entry((id, side))
            .or_insert_with(|| VecDeque::with_capacity(window));
        history.push_back(sample);
        while history.len() > window {
            history.pop_front();
        }

        let n = history.len() as f32;
        let sum_x: f32 = history.iter().map(|s| s.position.x).sum();
        let sum_y: f32 = history.iter().map(|s| s.position.y).sum();
        let confidence = history.iter().map(|s| s.confidence).sum::<f32>() / n;

        ContactReading::Resolved(GroundContactPoint {
            side,
            position: Point::new(sum_x / n, sum_y / n),
            confidence,
            source,
        })
    }

    fn select_source(&self, side: Side, landmarks: &LandmarkMap) -> Option<(ContactSource, RawSample)> {
        FALLBACK_CHAIN.iter().find_map(|(source, suffix)| {
            landmarks
                .get(&landmark_name(side, suffix))
                .filter(|lm| {
                    lm.confidence > self.config.min_confidence && lm.x.is_finite() && lm.y.is_finite()
                })
                .map(|lm| {
                    (
                        *source,
                        RawSample {
                            position: Point::new(lm.x, lm.y),
                            confidence: lm.confidence,
                        },
                    )
                })
        })
    }

    /// Drop smoothing history for a purged identity.
    pub fn forget(&mut self, id: IdentityId) {
        self.history.retain(|(pid, _), _| *pid != id);
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self, id: IdentityId, side: Side) -> usize {
        self.history.get(&(id, side)).map(|h| h.len()).unwrap_or(0)
    }
}
