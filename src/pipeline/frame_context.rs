// src/pipeline/frame_context.rs
//
// Everything the pipeline decided about one frame, as a plain snapshot.
// Renderers and drivers read this instead of the live tracker.

use crate::analysis::identity_tracker::{Assignment, Identity};
use crate::analysis::violation_state::FootPhase;
use crate::boundary::BoundaryEvaluation;
use crate::types::{GroundContactPoint, IdentityId, IdentityStatus, Side, ViolationEvent};

/// Per-side display state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideView {
    pub contact: Option<GroundContactPoint>,
    pub evaluation: Option<BoundaryEvaluation>,
    /// VIOLATING whenever the live predicate holds
    pub phase: FootPhase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityView {
    pub id: IdentityId,
    pub status: IdentityStatus,
    pub violations: u32,
    pub bbox: [f32; 4],
    pub manually_bound: bool,
    pub sides: [SideView; 2],
}

impl IdentityView {
    pub(crate) fn new(identity: &Identity, sides: [SideView; 2]) -> Self {
        Self {
            id: identity.id(),
            status: identity.status(),
            violations: identity.violations(),
            bbox: identity.bbox(),
            manually_bound: identity.is_manually_bound(),
            sides,
        }
    }

    pub fn side(&self, side: Side) -> &SideView {
        &self.sides[side.index()]
    }

    pub fn is_out(&self) -> bool {
        self.status == IdentityStatus::Out
    }
}

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub session_time_s: f64,

    /// Index-aligned with the frame's observations
    pub assignments: Vec<Assignment>,
    /// Identities matched on this frame, in id order
    pub identities: Vec<IdentityView>,

    pub violations: Vec<ViolationEvent>,
    pub eliminated: Vec<IdentityId>,
    pub lost: Vec<IdentityId>,
    pub purged: Vec<IdentityId>,
}

impl FrameContext {
    pub fn new(frame_index: u64, timestamp_ms: f64, session_time_s: f64) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            session_time_s,
            assignments: Vec::new(),
            identities: Vec::new(),
            violations: Vec::new(),
            eliminated: Vec::new(),
            lost: Vec::new(),
            purged: Vec::new(),
        }
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn identity(&self, id: IdentityId) -> Option<&IdentityView> {
        self.identities.iter().find(|v| v.id == id)
    }

    /// Identity assigned to the observation at `index`, if any.
    pub fn identity_for(&self, index: usize) -> Option<IdentityId> {
        self.assignments.get(index).and_then(|a| a.identity())
    }
}
