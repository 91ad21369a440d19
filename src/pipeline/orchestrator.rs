// src/pipeline/orchestrator.rs
//
// Wires identity tracking, ground-contact resolution, the boundary model and
// the violation state machine into one synchronous per-frame pipeline.
//
// Single entry point: call process_frame() once per frame, in frame order.
// Each frame is fully processed before the next, so identity mutations and
// emitted events have a total order.
//
// Operator controls (bind, manual foot, reset) are queued and applied at the
// start of the next frame, never mid-frame. apply_pending_controls() applies
// them right away when the caller is between frames.
//
// Evidence is handed to the recorder without waiting; a missing recorder
// just means no stills, clips or log.

use crate::analysis::ground_contact::{ContactReading, GroundContactResolver, ManualOverrides};
use crate::analysis::identity_tracker::{
    Assignment, BindOutcome, Identity, IdentityTracker, MatchRule,
};
use crate::analysis::violation_state::{
    FootPhase, SideSample, SideTransition, ViolationStateMachine,
};
use crate::boundary::BoundaryModel;
use crate::error::Result;
use crate::evidence::event_log::LogRecord;
use crate::evidence::recorder::{EpisodeEndReason, EvidenceRecorder};
use crate::pipeline::clock::SessionClock;
use crate::pipeline::event_bus::{EventBus, PipelineEvent};
use crate::pipeline::frame_context::{FrameContext, IdentityView, SideView};
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{
    Config, Detection, Frame, IdentityId, IdentityStatus, LandmarkMap, Observation, Point, Side,
};
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const EVENT_BUS_CAPACITY: usize = 1024;

// ============================================================================
// INPUT / CONTROL
// ============================================================================

pub struct FrameInput {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    /// Detector boxes with the pose landmarks computed on each crop
    pub observations: Vec<Observation>,
    /// Decoded image, needed only for evidence capture
    pub frame: Option<Arc<Frame>>,
}

impl FrameInput {
    pub fn new(frame_index: u64, timestamp_ms: f64, observations: Vec<Observation>) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            observations,
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: Arc<Frame>) -> Self {
        self.frame = Some(frame);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Bind the unassigned detection nearest `click` to `target` (new identity if None)
    Bind {
        click: Point,
        target: Option<IdentityId>,
    },
    SetManualFoot {
        id: IdentityId,
        side: Side,
        point: Point,
    },
    ClearManualFoot {
        id: IdentityId,
        side: Side,
    },
    Reset,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct ViolationPipeline {
    tracker: IdentityTracker,
    resolver: GroundContactResolver,
    boundary: BoundaryModel,
    machine: ViolationStateMachine,
    overrides: ManualOverrides,
    clock: SessionClock,
    bus: EventBus,
    metrics: PipelineMetrics,
    recorder: Option<EvidenceRecorder>,
    controls: VecDeque<ControlCommand>,
    shutdown_timeout: Duration,
    last_frame_index: u64,
}

impl ViolationPipeline {
    pub fn new(config: &Config, boundary: BoundaryModel) -> Self {
        Self::with_metrics(config, boundary, PipelineMetrics::new())
    }

    pub fn with_metrics(config: &Config, boundary: BoundaryModel, metrics: PipelineMetrics) -> Self {
        info!(
            "✓ Pipeline ready: match≤{:.0}px, lost after {} frames, cooldown={:.1}s, OUT at {}",
            config.tracker.max_match_distance,
            config.tracker.max_frames_missing,
            config.violation.cooldown_seconds,
            config.violation.out_threshold
        );
        Self {
            tracker: IdentityTracker::new(config.tracker.clone()),
            resolver: GroundContactResolver::new(config.contact.clone()),
            boundary,
            machine: ViolationStateMachine::new(config.violation.clone()),
            overrides: ManualOverrides::new(),
            clock: SessionClock::from_config(&config.session),
            bus: EventBus::new(EVENT_BUS_CAPACITY),
            metrics,
            recorder: None,
            controls: VecDeque::new(),
            shutdown_timeout: Duration::from_millis(config.evidence.shutdown_timeout_ms),
            last_frame_index: 0,
        }
    }

    pub fn with_recorder(mut self, recorder: EvidenceRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    // ════════════════════════════════════════════════════════════════════════
    // CONTROL SURFACE
    // ════════════════════════════════════════════════════════════════════════

    pub fn bind(&mut self, click: Point, target: Option<IdentityId>) {
        self.controls.push_back(ControlCommand::Bind { click, target });
    }

    pub fn set_manual_foot(&mut self, id: IdentityId, side: Side, point: Point) {
        self.controls
            .push_back(ControlCommand::SetManualFoot { id, side, point });
    }

    pub fn clear_manual_foot(&mut self, id: IdentityId, side: Side) {
        self.controls.push_back(ControlCommand::ClearManualFoot { id, side });
    }

    pub fn reset(&mut self) {
        self.controls.push_back(ControlCommand::Reset);
    }

    pub fn pending_controls(&self) -> usize {
        self.controls.len()
    }

    /// Apply queued controls now. Returns how many were applied.
    pub fn apply_pending_controls(&mut self) -> usize {
        let mut applied = 0;
        while let Some(cmd) = self.controls.pop_front() {
            self.apply_control(cmd);
            applied += 1;
        }
        applied
    }

    fn apply_control(&mut self, cmd: ControlCommand) {
        let frame_index = self.last_frame_index;
        match cmd {
            ControlCommand::Bind { click, target } => match self.tracker.bind(click, target) {
                BindOutcome::Bound { id, created } => {
                    if created {
                        self.metrics.inc(&self.metrics.identities_created);
                    }
                    self.bus.publish(PipelineEvent::IdentityBound {
                        id,
                        created,
                        frame_index,
                    });
                }
                other => debug!("Bind at ({:.0}, {:.0}) not applied: {:?}", click.x, click.y, other),
            },
            ControlCommand::SetManualFoot { id, side, point } => {
                if self.tracker.get(id).is_none() {
                    warn!("Manual foot for unknown P{} ignored", id);
                    return;
                }
                info!(
                    "🦶 Manual {} foot for P{} at ({:.0}, {:.0})",
                    side.as_str(),
                    id,
                    point.x,
                    point.y
                );
                self.overrides.set(id, side, point);
            }
            ControlCommand::ClearManualFoot { id, side } => {
                if self.overrides.clear(id, side) {
                    info!("🦶 Manual {} foot cleared for P{}", side.as_str(), id);
                }
            }
            ControlCommand::Reset => {
                let removed = self.tracker.reset();
                self.resolver.reset();
                self.overrides.clear_all();
                for id in &removed {
                    if let Some(recorder) = &self.recorder {
                        recorder.identity_gone(*id, EpisodeEndReason::IdentityRemoved);
                    }
                    self.bus.publish(PipelineEvent::IdentityPurged {
                        id: *id,
                        frame_index,
                    });
                }
                info!("🔄 Session reset: {} identities cleared", removed.len());
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // PER-FRAME PROCESSING
    // ════════════════════════════════════════════════════════════════════════

    pub fn process_frame(&mut self, input: FrameInput) -> FrameContext {
        let started = Instant::now();
        self.apply_pending_controls();
        self.last_frame_index = input.frame_index;

        let frame_index = input.frame_index;
        let now_s = self.clock.now_s(frame_index);
        let mut ctx = FrameContext::new(frame_index, input.timestamp_ms, now_s);

        self.metrics.inc(&self.metrics.total_frames);
        self.metrics
            .add(&self.metrics.detections_seen, input.observations.len() as u64);
        if input.observations.is_empty() {
            self.metrics.inc(&self.metrics.frames_without_detections);
        }

        // ── 1. Identity assignment ─────────────────────────────────────────
        let detections: Vec<Detection> = input
            .observations
            .iter()
            .map(|o| o.detection.clone())
            .collect();
        let update = self.tracker.update(&detections, frame_index);

        self.metrics
            .add(&self.metrics.ambiguous_matches, update.ambiguous as u64);
        for id in &update.created {
            self.metrics.inc(&self.metrics.identities_created);
            self.bus.publish(PipelineEvent::IdentityCreated {
                id: *id,
                frame_index,
            });
        }
        for assignment in &update.assignments {
            if let Assignment::Matched { id, rule } = assignment {
                if *rule != MatchRule::TrackId {
                    self.bus.publish(PipelineEvent::IdentityRecovered {
                        id: *id,
                        rule: *rule,
                        frame_index,
                    });
                }
            }
        }
        for id in &update.lost {
            self.metrics.inc(&self.metrics.identities_lost);
            let violations = self.tracker.get(*id).map(|i| i.violations()).unwrap_or(0);
            if let Some(recorder) = &self.recorder {
                recorder.identity_gone(*id, EpisodeEndReason::IdentityLost);
            }
            self.bus.publish(PipelineEvent::IdentityLost {
                id: *id,
                frame_index,
                violations,
            });
        }
        for id in &update.purged {
            self.metrics.inc(&self.metrics.identities_purged);
            self.resolver.forget(*id);
            self.overrides.clear_identity(*id);
            if let Some(recorder) = &self.recorder {
                recorder.identity_gone(*id, EpisodeEndReason::IdentityRemoved);
            }
            self.bus.publish(PipelineEvent::IdentityPurged {
                id: *id,
                frame_index,
            });
        }

        // Visible identities in id order, paired with their observation
        let mut visible: Vec<(IdentityId, usize)> = update
            .assignments
            .iter()
            .enumerate()
            .filter_map(|(idx, a)| a.identity().map(|id| (id, idx)))
            .collect();
        visible.sort_unstable();

        // ── 2. Evidence pre-roll ───────────────────────────────────────────
        if let (Some(recorder), Some(frame)) = (&self.recorder, &input.frame) {
            recorder.push_frame(Arc::clone(frame), visible.iter().map(|(id, _)| *id).collect());
        }

        // ── 3. Contact → boundary → state, per identity and side ───────────
        for (id, obs_idx) in &visible {
            let landmarks: &LandmarkMap = &input.observations[*obs_idx].landmarks;
            let readings = self.resolver.resolve(*id, landmarks, &self.overrides);
            let mut sides = [SideView {
                contact: None,
                evaluation: None,
                phase: FootPhase::Clear,
            }; 2];

            for side in Side::BOTH {
                let sample = match readings[side.index()] {
                    ContactReading::Resolved(contact) => {
                        let evaluation = self.boundary.evaluate(contact.position);
                        sides[side.index()].contact = Some(contact);
                        sides[side.index()].evaluation = Some(evaluation);
                        Some(SideSample {
                            frame_index,
                            timestamp_ms: input.timestamp_ms,
                            now_s,
                            contact,
                            evaluation,
                        })
                    }
                    ContactReading::Unavailable => {
                        self.metrics.inc(&self.metrics.sides_unavailable);
                        None
                    }
                };

                let transition = self.tracker.step_side(*id, side, sample, &self.machine);
                self.handle_transition(*id, side, transition, input.frame.as_ref(), &mut ctx);
            }

            if let Some(identity) = self.tracker.get(*id) {
                for side in Side::BOTH {
                    sides[side.index()].phase = identity.foot(side).display_phase();
                }
                ctx.identities.push(IdentityView::new(identity, sides));
            }
        }

        ctx.assignments = update.assignments;
        ctx.lost = update.lost;
        ctx.purged = update.purged;

        self.metrics.set_timing(
            &self.metrics.frame_time_us,
            started.elapsed().as_micros() as u64,
        );
        ctx
    }

    fn handle_transition(
        &mut self,
        id: IdentityId,
        side: Side,
        transition: SideTransition,
        frame: Option<&Arc<Frame>>,
        ctx: &mut FrameContext,
    ) {
        match transition {
            SideTransition::Skipped | SideTransition::Unchanged => {}
            SideTransition::Violated { event, eliminated } => {
                self.metrics.inc(&self.metrics.violations_logged);
                let event = match &self.recorder {
                    Some(recorder) => recorder.on_violation(event, frame),
                    None => event,
                };
                let violations = event.violation_number;
                self.bus.publish(PipelineEvent::ViolationLogged(event.clone()));
                ctx.violations.push(event.clone());

                if eliminated {
                    self.metrics.inc(&self.metrics.identities_eliminated);
                    if let Some(recorder) = &self.recorder {
                        recorder.record(LogRecord::IdentityOut {
                            logged_at: Utc::now(),
                            identity_id: id,
                            violations,
                            frame_index: event.frame_index,
                            timestamp_ms: event.timestamp_ms,
                        });
                    }
                    self.bus.publish(PipelineEvent::IdentityEliminated {
                        id,
                        frame_index: event.frame_index,
                        violations,
                    });
                    ctx.eliminated.push(id);
                }
            }
            SideTransition::Rearmed => {
                if let Some(recorder) = &self.recorder {
                    recorder.end_episode(id, side);
                }
                self.bus.publish(PipelineEvent::EpisodeEnded {
                    id,
                    side,
                    frame_index: ctx.frame_index,
                });
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // QUERY SURFACE
    // ════════════════════════════════════════════════════════════════════════

    /// Every identity the tracker currently holds (ACTIVE, LOST and OUT), in id order.
    pub fn current_identities(&self) -> Vec<&Identity> {
        self.tracker.identities().collect()
    }

    pub fn violation_counts(&self) -> BTreeMap<IdentityId, u32> {
        self.tracker.violation_counts()
    }

    pub fn identity_status(&self, id: IdentityId) -> Option<IdentityStatus> {
        self.tracker.status(id)
    }

    pub fn manual_overrides(&self) -> &ManualOverrides {
        &self.overrides
    }

    pub fn boundary(&self) -> &BoundaryModel {
        &self.boundary
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        self.bus.drain()
    }

    /// Stop the recorder, letting it flush within the configured timeout.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.recorder.take() {
            Some(recorder) => recorder.shutdown(self.shutdown_timeout).await,
            None => Ok(()),
        }
    }
}
