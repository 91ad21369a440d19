// src/analysis/identity_tracker.rs
//
// Resolves raw per-frame detections into persistent identities.
//
// Matching cascade (each phase only sees what earlier phases left over):
//   1. Detector track id already bound to a live identity → keep binding
//   2. Distance from the predicted centroid ≤ max_match_distance,
//      greedy nearest-first
//   3. IoU against the box moved to the predicted centroid, above
//      iou_threshold, greedy highest-first
//   4. Create a new identity (auto_create) or leave unassigned until an
//      operator binds it
//
// Detections are ranked by descending confidence (ties by input order) and
// that rank breaks ties inside each greedy phase, so the same input always
// yields the same assignment and no identity is claimed twice per frame.
//
// Every identity carries a constant-velocity motion model that is advanced
// once per frame, seen or not, so fast movers and short gaps keep their ids.
//
// Operator bindings persist through the same cascade: a bound identity keeps
// its detector track id (phase 1) when there is one and otherwise keeps
// matching by predicted position and overlap like any other identity.
//
// Staleness: an identity missing for more than max_frames_missing frames
// goes LOST and stops matching. After purge_grace_frames more it is purged.
// Ids come from a monotonic counter that never rewinds (not even on reset),
// so a subject returning after a purge gets a fresh id and a zero count.

use super::motion::MotionModel;
use super::violation_state::{FootState, SideSample, SideTransition, ViolationStateMachine};
use crate::types::{
    bbox_area, Detection, IdentityId, IdentityStatus, Point, Side, TrackerConfig,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};

// ============================================================================
// TYPES
// ============================================================================

/// Persistent handle for one physical subject.
#[derive(Debug, Clone)]
pub struct Identity {
    pub(crate) id: IdentityId,
    pub(crate) created_frame: u64,
    pub(crate) last_seen_frame: u64,
    pub(crate) status: IdentityStatus,
    pub(crate) violations: u32,
    pub(crate) feet: [FootState; 2],
    pub(crate) bbox: [f32; 4],
    pub(crate) centroid: Point,
    pub(crate) history: VecDeque<Point>,
    history_len: usize,
    pub(crate) detector_track_id: Option<u32>,
    pub(crate) frames_missing: u32,
    pub(crate) manually_bound: bool,
    pub(crate) last_confidence: f32,
    motion: MotionModel,
}

impl Identity {
    pub(crate) fn new(
        id: IdentityId,
        frame_index: u64,
        det: &Detection,
        config: &TrackerConfig,
        manually_bound: bool,
    ) -> Self {
        let history_len = config.history_len;
        let centroid = det.center();
        let mut history = VecDeque::with_capacity(history_len);
        history.push_back(centroid);
        Self {
            id,
            created_frame: frame_index,
            last_seen_frame: frame_index,
            status: IdentityStatus::Active,
            violations: 0,
            feet: [FootState::default(); 2],
            bbox: det.bbox,
            centroid,
            history,
            history_len: history_len.max(1),
            detector_track_id: det.track_id,
            frames_missing: 0,
            manually_bound,
            last_confidence: det.confidence,
            motion: MotionModel::new(centroid, config.process_noise, config.measurement_noise),
        }
    }

    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn status(&self) -> IdentityStatus {
        self.status
    }

    pub fn violations(&self) -> u32 {
        self.violations
    }

    pub fn created_frame(&self) -> u64 {
        self.created_frame
    }

    pub fn last_seen_frame(&self) -> u64 {
        self.last_seen_frame
    }

    pub fn bbox(&self) -> [f32; 4] {
        self.bbox
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn history(&self) -> &VecDeque<Point> {
        &self.history
    }

    pub fn foot(&self, side: Side) -> &FootState {
        &self.feet[side.index()]
    }

    pub fn frames_missing(&self) -> u32 {
        self.frames_missing
    }

    pub fn is_manually_bound(&self) -> bool {
        self.manually_bound
    }

    pub fn detector_track_id(&self) -> Option<u32> {
        self.detector_track_id
    }

    pub fn last_confidence(&self) -> f32 {
        self.last_confidence
    }

    /// Where the motion model expects the centroid on the current frame.
    pub fn predicted_centroid(&self) -> Point {
        self.motion.position()
    }

    /// Last box translated to the predicted centroid.
    pub fn predicted_bbox(&self) -> [f32; 4] {
        let p = self.motion.position();
        let (dx, dy) = (p.x - self.centroid.x, p.y - self.centroid.y);
        [self.bbox[0] + dx, self.bbox[1] + dy, self.bbox[2] + dx, self.bbox[3] + dy]
    }

    fn observe(&mut self, det: &Detection, frame_index: u64) {
        self.bbox = det.bbox;
        self.centroid = det.center();
        self.last_confidence = det.confidence;
        self.last_seen_frame = frame_index;
        self.frames_missing = 0;
        self.motion.correct(self.centroid);
        if det.track_id.is_some() {
            self.detector_track_id = det.track_id;
        }
        self.history.push_back(self.centroid);
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }
    }
}

/// How a detection ended up with its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    TrackId,
    Centroid,
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Matched { id: IdentityId, rule: MatchRule },
    Created(IdentityId),
    /// Automatic creation disabled and no manual binding
    Unassigned,
}

impl Assignment {
    pub fn identity(&self) -> Option<IdentityId> {
        match self {
            Self::Matched { id, .. } | Self::Created(id) => Some(*id),
            Self::Unassigned => None,
        }
    }
}

/// Result of one `update`. `assignments` is index-aligned with the input.
#[derive(Debug, Clone, Default)]
pub struct TrackerUpdate {
    pub assignments: Vec<Assignment>,
    pub created: Vec<IdentityId>,
    pub lost: Vec<IdentityId>,
    pub purged: Vec<IdentityId>,
    /// Detections that had more than one identity within match distance
    pub ambiguous: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound { id: IdentityId, created: bool },
    NoDetectionNearby,
    UnknownIdentity(IdentityId),
}

// ============================================================================
// IoU COMPUTATION
// ============================================================================

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let union = bbox_area(a) + bbox_area(b) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

// ============================================================================
// MAIN TRACKER
// ============================================================================

pub struct IdentityTracker {
    config: TrackerConfig,
    identities: BTreeMap<IdentityId, Identity>,
    /// detector track id → identity
    track_bindings: HashMap<u32, IdentityId>,
    next_id: IdentityId,
    /// Last frame's unassigned detections, candidates for manual binding
    pending: Vec<Detection>,
    last_frame: u64,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            identities: BTreeMap::new(),
            track_bindings: HashMap::new(),
            next_id: 1,
            pending: Vec::new(),
            last_frame: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn is_matchable(&self, identity: &Identity) -> bool {
        match identity.status {
            IdentityStatus::Active => true,
            IdentityStatus::Lost => false,
            IdentityStatus::Out => identity.frames_missing <= self.config.max_frames_missing,
        }
    }

    fn allocate_id(&mut self) -> IdentityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bind_track_id(&mut self, id: IdentityId, track_id: Option<u32>) {
        if let Some(tid) = track_id {
            self.track_bindings.retain(|_, bound| *bound != id);
            self.track_bindings.insert(tid, id);
        }
    }

    /// Process one frame of detections.
    pub fn update(&mut self, detections: &[Detection], frame_index: u64) -> TrackerUpdate {
        self.last_frame = frame_index;
        self.pending.clear();

        let mut update = TrackerUpdate {
            assignments: vec![Assignment::Unassigned; detections.len()],
            ..Default::default()
        };

        for identity in self.identities.values_mut() {
            identity.motion.predict();
        }

        // Deterministic processing order: confidence desc (NaN last), then input order
        let confidence = |i: usize| {
            let c = detections[i].confidence;
            if c.is_nan() {
                f32::NEG_INFINITY
            } else {
                c
            }
        };
        let mut order: Vec<usize> = (0..detections.len())
            .filter(|&i| detections[i].bbox.iter().all(|v| v.is_finite()))
            .collect();
        order.sort_by(|&a, &b| confidence(b).total_cmp(&confidence(a)).then(a.cmp(&b)));
        let mut rank = vec![usize::MAX; detections.len()];
        for (r, &di) in order.iter().enumerate() {
            rank[di] = r;
        }

        let candidates: Vec<IdentityId> = self
            .identities
            .values()
            .filter(|i| self.is_matchable(i))
            .map(|i| i.id)
            .collect();
        let mut claimed: HashMap<IdentityId, usize> = HashMap::new();
        let mut matched_det = vec![false; detections.len()];

        // ════════════════════════════════════════════════════════════════════
        // PHASE 1: DETECTOR TRACK ID
        // ════════════════════════════════════════════════════════════════════
        for &di in &order {
            let Some(tid) = detections[di].track_id else { continue };
            let Some(&id) = self.track_bindings.get(&tid) else { continue };
            if !candidates.contains(&id) || claimed.contains_key(&id) {
                continue;
            }
            claimed.insert(id, di);
            matched_det[di] = true;
            update.assignments[di] = Assignment::Matched {
                id,
                rule: MatchRule::TrackId,
            };
        }

        // ════════════════════════════════════════════════════════════════════
        // PHASE 2: PREDICTED CENTROID DISTANCE, NEAREST FIRST
        // ════════════════════════════════════════════════════════════════════
        let max_dist = self.config.max_match_distance;
        let mut centroid_pairs: Vec<(usize, IdentityId, f32)> = Vec::new();
        for &di in &order {
            if matched_det[di] {
                continue;
            }
            let center = detections[di].center();
            let before = centroid_pairs.len();
            for &id in &candidates {
                if claimed.contains_key(&id) {
                    continue;
                }
                let dist = self.identities[&id].predicted_centroid().distance(&center);
                if dist <= max_dist {
                    centroid_pairs.push((di, id, dist));
                }
            }
            if centroid_pairs.len() - before > 1 {
                update.ambiguous += 1;
                debug!(
                    "Ambiguous detection #{} at ({:.0}, {:.0}): {} identities within {:.0}px",
                    di,
                    center.x,
                    center.y,
                    centroid_pairs.len() - before,
                    max_dist
                );
            }
        }
        centroid_pairs.sort_by(|a, b| {
            a.2.total_cmp(&b.2)
                .then(rank[a.0].cmp(&rank[b.0]))
                .then(a.1.cmp(&b.1))
        });
        for (di, id, _dist) in &centroid_pairs {
            if matched_det[*di] || claimed.contains_key(id) {
                continue;
            }
            claimed.insert(*id, *di);
            matched_det[*di] = true;
            update.assignments[*di] = Assignment::Matched {
                id: *id,
                rule: MatchRule::Centroid,
            };
        }

        // ════════════════════════════════════════════════════════════════════
        // PHASE 3: BOUNDING-BOX OVERLAP
        // ════════════════════════════════════════════════════════════════════
        let mut iou_pairs: Vec<(usize, IdentityId, f32)> = Vec::new();
        for &di in &order {
            if matched_det[di] {
                continue;
            }
            for &id in &candidates {
                if claimed.contains_key(&id) {
                    continue;
                }
                let score = iou(&self.identities[&id].predicted_bbox(), &detections[di].bbox);
                if score > self.config.iou_threshold {
                    iou_pairs.push((di, id, score));
                }
            }
        }
        iou_pairs.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then(rank[a.0].cmp(&rank[b.0]))
                .then(a.1.cmp(&b.1))
        });
        for (di, id, score) in &iou_pairs {
            if matched_det[*di] || claimed.contains_key(id) {
                continue;
            }
            debug!("🔗 Overlap rescue: P{} ↔ det #{} (IoU={:.2})", id, di, score);
            claimed.insert(*id, *di);
            matched_det[*di] = true;
            update.assignments[*di] = Assignment::Matched {
                id: *id,
                rule: MatchRule::Overlap,
            };
        }

        // Apply observations to matched identities
        for (&id, &di) in &claimed {
            let det = &detections[di];
            if let Some(identity) = self.identities.get_mut(&id) {
                identity.observe(det, frame_index);
            }
            self.bind_track_id(id, det.track_id);
        }

        // ════════════════════════════════════════════════════════════════════
        // PHASE 4: NEW IDENTITIES / UNASSIGNED
        // ════════════════════════════════════════════════════════════════════
        for &di in &order {
            if matched_det[di] {
                continue;
            }
            let det = &detections[di];
            if self.config.auto_create {
                let id = self.allocate_id();
                let identity = Identity::new(id, frame_index, det, &self.config, false);
                info!(
                    "🆕 New identity P{} at ({:.0}, {:.0}) conf={:.2} track={:?}",
                    id, identity.centroid.x, identity.centroid.y, det.confidence, det.track_id
                );
                self.identities.insert(id, identity);
                self.bind_track_id(id, det.track_id);
                update.assignments[di] = Assignment::Created(id);
                update.created.push(id);
                claimed.insert(id, di);
            } else {
                self.pending.push(det.clone());
            }
        }

        // ════════════════════════════════════════════════════════════════════
        // AGEING: LOST / PURGE
        // ════════════════════════════════════════════════════════════════════
        let lost_after = self.config.max_frames_missing;
        let purge_after = self.config.max_frames_missing + self.config.purge_grace_frames;
        for identity in self.identities.values_mut() {
            if claimed.contains_key(&identity.id) {
                continue;
            }
            identity.frames_missing += 1;
            if identity.status == IdentityStatus::Active && identity.frames_missing > lost_after {
                identity.status = IdentityStatus::Lost;
                info!(
                    "👻 P{} LOST after {} missed frames (violations={})",
                    identity.id, identity.frames_missing, identity.violations
                );
                update.lost.push(identity.id);
            }
            if identity.frames_missing > purge_after {
                update.purged.push(identity.id);
            }
        }
        for id in &update.purged {
            self.identities.remove(id);
            self.track_bindings.retain(|_, bound| bound != id);
            info!("🗑️  P{} purged", id);
        }

        update
    }

    /// Bind the unassigned detection nearest to `click` (within bind_radius)
    /// to `target`, or to a new identity when `target` is None.
    pub fn bind(&mut self, click: Point, target: Option<IdentityId>) -> BindOutcome {
        if let Some(id) = target {
            if !self.identities.contains_key(&id) {
                warn!("Manual bind rejected: P{} does not exist", id);
                return BindOutcome::UnknownIdentity(id);
            }
        }

        let radius = self.config.bind_radius;
        let nearest = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, d)| (i, d.center().distance(&click)))
            .filter(|(_, dist)| *dist <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let Some((idx, dist)) = nearest else {
            debug!(
                "Manual bind at ({:.0}, {:.0}): no unassigned detection within {:.0}px",
                click.x, click.y, radius
            );
            return BindOutcome::NoDetectionNearby;
        };
        let det = self.pending.remove(idx);
        let frame_index = self.last_frame;

        let (id, created) = match target {
            Some(id) => {
                if let Some(identity) = self.identities.get_mut(&id) {
                    identity.observe(&det, frame_index);
                    identity.manually_bound = true;
                    if identity.status == IdentityStatus::Lost {
                        identity.status = IdentityStatus::Active;
                    }
                }
                (id, false)
            }
            None => {
                let id = self.allocate_id();
                let identity = Identity::new(id, frame_index, &det, &self.config, true);
                self.identities.insert(id, identity);
                (id, true)
            }
        };
        self.bind_track_id(id, det.track_id);

        info!(
            "🖱️  Manual bind: P{} ← detection at ({:.0}, {:.0}) ({:.0}px from click){}",
            id,
            det.center().x,
            det.center().y,
            dist,
            if created { " [new]" } else { "" }
        );
        BindOutcome::Bound { id, created }
    }

    /// Run one side of one identity through the violation state machine.
    pub fn step_side(
        &mut self,
        id: IdentityId,
        side: Side,
        sample: Option<SideSample>,
        machine: &ViolationStateMachine,
    ) -> SideTransition {
        match self.identities.get_mut(&id) {
            Some(identity) => machine.step(identity, side, sample),
            None => SideTransition::Skipped,
        }
    }

    pub fn get(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    /// All identities in id order.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn violation_counts(&self) -> BTreeMap<IdentityId, u32> {
        self.identities
            .values()
            .map(|i| (i.id, i.violations))
            .collect()
    }

    pub fn status(&self, id: IdentityId) -> Option<IdentityStatus> {
        self.identities.get(&id).map(|i| i.status)
    }

    pub fn pending_detections(&self) -> &[Detection] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Drop every identity. The id counter is kept so ids stay unique.
    pub fn reset(&mut self) -> Vec<IdentityId> {
        let removed: Vec<IdentityId> = self.identities.keys().copied().collect();
        self.identities.clear();
        self.track_bindings.clear();
        self.pending.clear();
        removed
    }
}

// ============================================================================
// TESTS
// ============================================================================
