// src/analysis/mod.rs
//
// Per-frame analysis stages.
//
// Signal flow:
//   Detections → identity_tracker ──────────┐
//   Landmarks  → ground_contact ─→ boundary ─┼→ violation_state → ViolationEvent
//   Operator   → ManualOverrides ────────────┘
//
// Orchestrated by pipeline::orchestrator::ViolationPipeline.

pub mod ground_contact;
pub mod identity_tracker;
pub mod motion;
pub mod violation_state;

pub use ground_contact::{ContactReading, GroundContactResolver, ManualOverrides};
pub use identity_tracker::{
    Assignment, BindOutcome, Identity, IdentityTracker, MatchRule, TrackerUpdate,
};
pub use motion::MotionModel;
pub use violation_state::{FootPhase, FootState, SideSample, SideTransition, ViolationStateMachine};
