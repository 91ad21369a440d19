// src/pipeline/metrics.rs
//
// Session counters shared between the frame pipeline and the evidence
// recorder. Cloning shares the underlying atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_without_detections: Arc<AtomicU64>,
    pub detections_seen: Arc<AtomicU64>,
    pub identities_created: Arc<AtomicU64>,
    pub identities_lost: Arc<AtomicU64>,
    pub identities_purged: Arc<AtomicU64>,
    pub ambiguous_matches: Arc<AtomicU64>,
    pub sides_unavailable: Arc<AtomicU64>,
    pub violations_logged: Arc<AtomicU64>,
    pub identities_eliminated: Arc<AtomicU64>,
    pub evidence_stills: Arc<AtomicU64>,
    pub evidence_clips: Arc<AtomicU64>,
    pub evidence_failures: Arc<AtomicU64>,
    pub handoff_dropped: Arc<AtomicU64>,
    pub incomplete_evidence: Arc<AtomicU64>,
    pub frame_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_without_detections: Arc::new(AtomicU64::new(0)),
            detections_seen: Arc::new(AtomicU64::new(0)),
            identities_created: Arc::new(AtomicU64::new(0)),
            identities_lost: Arc::new(AtomicU64::new(0)),
            identities_purged: Arc::new(AtomicU64::new(0)),
            ambiguous_matches: Arc::new(AtomicU64::new(0)),
            sides_unavailable: Arc::new(AtomicU64::new(0)),
            violations_logged: Arc::new(AtomicU64::new(0)),
            identities_eliminated: Arc::new(AtomicU64::new(0)),
            evidence_stills: Arc::new(AtomicU64::new(0)),
            evidence_clips: Arc::new(AtomicU64::new(0)),
            evidence_failures: Arc::new(AtomicU64::new(0)),
            handoff_dropped: Arc::new(AtomicU64::new(0)),
            incomplete_evidence: Arc::new(AtomicU64::new(0)),
            frame_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSummary {
            total_frames: load(&self.total_frames),
            fps: self.fps(),
            frames_without_detections: load(&self.frames_without_detections),
            detections_seen: load(&self.detections_seen),
            identities_created: load(&self.identities_created),
            identities_lost: load(&self.identities_lost),
            identities_purged: load(&self.identities_purged),
            ambiguous_matches: load(&self.ambiguous_matches),
            sides_unavailable: load(&self.sides_unavailable),
            violations_logged: load(&self.violations_logged),
            identities_eliminated: load(&self.identities_eliminated),
            evidence_stills: load(&self.evidence_stills),
            evidence_clips: load(&self.evidence_clips),
            evidence_failures: load(&self.evidence_failures),
            handoff_dropped: load(&self.handoff_dropped),
            incomplete_evidence: load(&self.incomplete_evidence),
            last_frame_us: load(&self.frame_time_us),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_without_detections: u64,
    pub detections_seen: u64,
    pub identities_created: u64,
    pub identities_lost: u64,
    pub identities_purged: u64,
    pub ambiguous_matches: u64,
    pub sides_unavailable: u64,
    pub violations_logged: u64,
    pub identities_eliminated: u64,
    pub evidence_stills: u64,
    pub evidence_clips: u64,
    pub evidence_failures: u64,
    pub handoff_dropped: u64,
    pub incomplete_evidence: u64,
    pub last_frame_us: u64,
    pub elapsed_secs: f64,
}
