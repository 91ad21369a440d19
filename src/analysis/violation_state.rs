// src/analysis/violation_state.rs
//
// Per-identity, per-side violation hysteresis.
//
//   CLEAR ──(predicate true)──▶ VIOLATING ──▶ COOLDOWN ──(timer expired
//     ▲                         emit event,             AND predicate false)──┐
//     └──────────────────────── count +1 ─────────────────────────────────────┘
//
// VIOLATING lasts for the crossing frame only: the event is emitted, the
// counter incremented, and the side parked in COOLDOWN in the same step, so
// a sustained crossing produces exactly one event. Re-arming is
// edge-triggered: after the timer expires the predicate must read false
// before the side returns to CLEAR and can fire again.
//
// The visual `violating` flag always tracks the live predicate, independent
// of the logging phase.
//
// Once an identity reaches `out_threshold` it becomes OUT. OUT is terminal:
// no further events on any side. Cooldowns still run out so open evidence
// episodes can close.
//
// A side whose contact point is unavailable is skipped entirely; it can
// neither start a violation nor end a cooldown.

use super::identity_tracker::Identity;
use crate::boundary::BoundaryEvaluation;
use crate::types::{GroundContactPoint, IdentityStatus, Side, ViolationConfig, ViolationEvent};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Logging phase of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FootPhase {
    Clear,
    Violating,
    Cooldown,
}

impl FootPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::Violating => "VIOLATING",
            Self::Cooldown => "COOLDOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootState {
    phase: FootPhase,
    cooldown_started_s: Option<f64>,
    violating: bool,
    last_contact: Option<GroundContactPoint>,
}

impl Default for FootState {
    fn default() -> Self {
        Self {
            phase: FootPhase::Clear,
            cooldown_started_s: None,
            violating: false,
            last_contact: None,
        }
    }
}

impl FootState {
    /// Stored logging phase: CLEAR or COOLDOWN between frames.
    pub fn phase(&self) -> FootPhase {
        self.phase
    }

    /// Phase for display: VIOLATING whenever the live predicate holds.
    pub fn display_phase(&self) -> FootPhase {
        if self.violating {
            FootPhase::Violating
        } else {
            self.phase
        }
    }

    pub fn is_violating(&self) -> bool {
        self.violating
    }

    pub fn cooldown_started_s(&self) -> Option<f64> {
        self.cooldown_started_s
    }

    pub fn last_contact(&self) -> Option<&GroundContactPoint> {
        self.last_contact.as_ref()
    }
}

/// Everything the state machine needs about one side on one frame.
#[derive(Debug, Clone, Copy)]
pub struct SideSample {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    /// Session clock (seconds) used for the cooldown timer
    pub now_s: f64,
    pub contact: GroundContactPoint,
    pub evaluation: BoundaryEvaluation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideTransition {
    /// No contact point this frame; state untouched
    Skipped,
    /// Nothing logged
    Unchanged,
    /// CLEAR → VIOLATING → COOLDOWN. `eliminated` is set when this event
    /// moved the identity to OUT.
    Violated {
        event: ViolationEvent,
        eliminated: bool,
    },
    /// COOLDOWN → CLEAR; closes the evidence episode for this side
    Rearmed,
}

pub struct ViolationStateMachine {
    config: ViolationConfig,
}

impl ViolationStateMachine {
    pub fn new(config: ViolationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ViolationConfig {
        &self.config
    }

    pub fn step(&self, identity: &mut Identity, side: Side, sample: Option<SideSample>) -> SideTransition {
        let Some(sample) = sample else {
            return SideTransition::Skipped;
        };

        let predicate = sample.evaluation.violates;
        let id = identity.id;
        let status = identity.status;
        let foot = &mut identity.feet[side.index()];
        foot.last_contact = Some(sample.contact);
        foot.violating = predicate;

        match foot.phase {
            FootPhase::Clear | FootPhase::Violating => {
                if !predicate {
                    foot.phase = FootPhase::Clear;
                    return SideTransition::Unchanged;
                }
                if status == IdentityStatus::Out {
                    return SideTransition::Unchanged;
                }

                foot.phase = FootPhase::Cooldown;
                foot.cooldown_started_s = Some(sample.now_s);

                identity.violations += 1;
                let violation_number = identity.violations;

                let eliminated = violation_number >= self.config.out_threshold;
                if eliminated {
                    identity.status = IdentityStatus::Out;
                }

                info!(
                    "🚨 VIOLATION: P{} {} foot ({}) at ({:.0}, {:.0}) margin={:.1}px frame={} → {}/{}",
                    id,
                    side.as_str(),
                    sample.contact.source.as_str(),
                    sample.contact.position.x,
                    sample.contact.position.y,
                    sample.evaluation.margin,
                    sample.frame_index,
                    violation_number,
                    self.config.out_threshold,
                );
                if eliminated {
                    warn!("⛔ P{} is OUT after {} violations", id, violation_number);
                }

                SideTransition::Violated {
                    event: ViolationEvent {
                        identity_id: id,
                        side,
                        frame_index: sample.frame_index,
                        timestamp_ms: sample.timestamp_ms,
                        session_time_s: sample.now_s,
                        position: sample.contact.position,
                        source: sample.contact.source,
                        violation_number,
                        evidence: None,
                    },
                    eliminated,
                }
            }
            FootPhase::Cooldown => {
                let started = foot.cooldown_started_s.unwrap_or(sample.now_s);
                let expired = sample.now_s - started >= self.config.cooldown_seconds;
                if expired && !predicate {
                    foot.phase = FootPhase::Clear;
                    foot.cooldown_started_s = None;
                    debug!("P{} {} foot re-armed", id, side.as_str());
                    SideTransition::Rearmed
                } else {
                    SideTransition::Unchanged
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactSource, Detection, Point, TrackerConfig};

    const FPS: f64 = 30.0;

    fn identity() -> Identity {
        let config = TrackerConfig {
            history_len: 10,
            ..TrackerConfig::default()
        };
        Identity::new(1, 0, &Detection::new([0.0, 0.0, 50.0, 100.0], 0.9, None), &config, false)
    }

    fn sample(frame: u64, violates: bool) -> Option<SideSample> {
        Some(SideSample {
            frame_index: frame,
            timestamp_ms: frame as f64 * 1000.0 / FPS,
            now_s: frame as f64 / FPS,
            contact: GroundContactPoint {
                side: Side::Left,
                position: Point::new(100.0, if violates { 500.0 } else { 300.0 }),
                confidence: 0.9,
                source: ContactSource::Heel,
            },
            evaluation: BoundaryEvaluation {
                boundary_y: 400.0,
                margin: if violates { 90.0 } else { -110.0 },
                violates,
            },
        })
    }

    fn machine() -> ViolationStateMachine {
        ViolationStateMachine::new(ViolationConfig::default())
    }

    fn is_violation(t: &SideTransition) -> bool {
        matches!(t, SideTransition::Violated { .. })
    }

    #[test]
    fn test_crossing_emits_one_event_and_enters_cooldown() {
        let m = machine();
        let mut id = identity();
        let t = m.step(&mut id, Side::Left, sample(0, true));
        match &t {
            SideTransition::Violated { event, eliminated } => {
                assert_eq!(event.identity_id, 1);
                assert_eq!(event.side, Side::Left);
                assert_eq!(event.violation_number, 1);
                assert!(!eliminated);
            }
            other => panic!("expected violation, got {:?}", other),
        }
        assert_eq!(id.foot(Side::Left).phase(), FootPhase::Cooldown);
        assert_eq!(id.foot(Side::Left).display_phase(), FootPhase::Violating);
        assert_eq!(id.violations(), 1);
    }

    #[test]
    fn test_sustained_crossing_does_not_repeat() {
        let m = machine();
        let mut id = identity();
        let mut events = 0;
        // Below the line continuously for 5 seconds
        for frame in 0..150 {
            if is_violation(&m.step(&mut id, Side::Left, sample(frame, true))) {
                events += 1;
            }
        }
        assert_eq!(events, 1);
        // Cooldown long expired but predicate still true: stays gated, shows violating
        assert_eq!(id.foot(Side::Left).phase(), FootPhase::Cooldown);
        assert!(id.foot(Side::Left).is_violating());
    }

    #[test]
    fn test_cooldown_then_new_crossing() {
        let m = machine();
        let mut id = identity();
        assert!(is_violation(&m.step(&mut id, Side::Left, sample(0, true))));
        // t=1s still below: nothing
        assert!(!is_violation(&m.step(&mut id, Side::Left, sample(30, true))));
        // t=2.2s above the line: cooldown over, re-arms
        assert_eq!(m.step(&mut id, Side::Left, sample(66, false)), SideTransition::Rearmed);
        // t=2.5s crossing again: new event
        assert!(is_violation(&m.step(&mut id, Side::Left, sample(75, true))));
        assert_eq!(id.violations(), 2);
    }

    #[test]
    fn test_clearing_inside_cooldown_does_not_rearm() {
        let m = machine();
        let mut id = identity();
        m.step(&mut id, Side::Left, sample(0, true));
        // Out at t=1s, back in at t=1.5s: still cooling down
        assert_eq!(m.step(&mut id, Side::Left, sample(30, false)), SideTransition::Unchanged);
        assert!(!is_violation(&m.step(&mut id, Side::Left, sample(45, true))));
        // Timer expires while predicate true: must go false first
        assert!(!is_violation(&m.step(&mut id, Side::Left, sample(70, true))));
        assert_eq!(m.step(&mut id, Side::Left, sample(71, false)), SideTransition::Rearmed);
        assert!(is_violation(&m.step(&mut id, Side::Left, sample(72, true))));
    }

    #[test]
    fn test_sides_are_independent() {
        let m = machine();
        let mut id = identity();
        assert!(is_violation(&m.step(&mut id, Side::Left, sample(0, true))));
        assert!(is_violation(&m.step(&mut id, Side::Right, sample(1, true))));
        assert_eq!(id.violations(), 2);
        assert_eq!(id.foot(Side::Right).phase(), FootPhase::Cooldown);
    }

    #[test]
    fn test_unavailable_side_is_skipped() {
        let m = machine();
        let mut id = identity();
        m.step(&mut id, Side::Left, sample(0, true));
        // Long gap with no contact point: no re-arm
        for _ in 1..200 {
            assert_eq!(m.step(&mut id, Side::Left, None), SideTransition::Skipped);
        }
        assert_eq!(id.foot(Side::Left).phase(), FootPhase::Cooldown);
        assert_eq!(id.violations(), 1);
        // First real reading after the gap re-arms
        assert_eq!(m.step(&mut id, Side::Left, sample(200, false)), SideTransition::Rearmed);
    }

    #[test]
    fn test_out_is_terminal_at_threshold() {
        let m = machine();
        let mut id = identity();
        let mut frame = 0;
        let mut eliminated_at = None;
        for n in 1..=3 {
            match m.step(&mut id, Side::Left, sample(frame, true)) {
                SideTransition::Violated { eliminated, .. } => {
                    if eliminated {
                        eliminated_at = Some(n);
                    }
                }
                other => panic!("expected violation {}, got {:?}", n, other),
            }
            frame += 70;
            assert_eq!(m.step(&mut id, Side::Left, sample(frame, false)), SideTransition::Rearmed);
            frame += 1;
        }
        assert_eq!(eliminated_at, Some(3));
        assert_eq!(id.status(), IdentityStatus::Out);
        assert_eq!(id.violations(), 3);

        // Further crossings on either side are not counted
        for _ in 0..5 {
            frame += 100;
            assert!(!is_violation(&m.step(&mut id, Side::Left, sample(frame, true))));
            assert!(!is_violation(&m.step(&mut id, Side::Right, sample(frame, true))));
            m.step(&mut id, Side::Left, sample(frame + 1, false));
        }
        assert_eq!(id.violations(), 3);
        assert_eq!(id.status(), IdentityStatus::Out);
        // Still visually flagged
        m.step(&mut id, Side::Right, sample(frame + 2, true));
        assert!(id.foot(Side::Right).is_violating());
    }

    #[test]
    fn test_both_sides_same_frame_at_threshold() {
        let m = ViolationStateMachine::new(ViolationConfig {
            cooldown_seconds: 2.0,
            out_threshold: 1,
        });
        let mut id = identity();
        assert!(is_violation(&m.step(&mut id, Side::Left, sample(0, true))));
        assert!(!is_violation(&m.step(&mut id, Side::Right, sample(0, true))));
        assert_eq!(id.violations(), 1);
    }
}
