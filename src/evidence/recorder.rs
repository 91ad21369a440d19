// src/evidence/recorder.rs
//
// Asynchronous evidence capture.
//
// The pipeline holds an `EvidenceRecorder` handle whose methods never block:
// they snapshot what they need (frame `Arc`s, event copies) and push a
// command onto the bounded hand-off queue. A tokio worker drains the queue,
// keeps the per-identity pre-roll rings, runs capture episodes, and does all
// disk and encode work on the blocking pool.
//
// Two pieces are synchronous. On a violation the handle encodes the current
// frame to JPEG in memory before returning, so the still shows exactly the
// crossing frame even if later frames are dropped. Violation and OUT records
// are appended to the log by the handle itself, so they never wait behind
// clip I/O and survive a shutdown timeout. Only evidence buffers can be lost.

use crate::error::{Result, WatchError};
use crate::evidence::event_log::{EventLog, LogRecord};
use crate::evidence::frame_ring::{Episode, PrerollRings};
use crate::evidence::handoff::Handoff;
use crate::evidence::sink::{artifact_stem, encode_jpeg, ClipManifest, EvidenceSink};
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{EvidenceConfig, EvidenceRefs, Frame, IdentityId, Side, ViolationEvent};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a capture episode was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeEndReason {
    /// Side went back to CLEAR
    Rearmed,
    /// Capture cap reached
    MaxDuration,
    /// Identity went LOST
    IdentityLost,
    /// Identity purged or session reset
    IdentityRemoved,
    /// Recorder shutting down
    Shutdown,
}

enum RecorderCommand {
    Frame {
        frame: Arc<Frame>,
        visible: Vec<IdentityId>,
    },
    Violation {
        event: ViolationEvent,
        still: Option<Vec<u8>>,
    },
    EndEpisode {
        id: IdentityId,
        side: Side,
    },
    IdentityGone {
        id: IdentityId,
        reason: EpisodeEndReason,
    },
}

fn is_frame(cmd: &RecorderCommand) -> bool {
    matches!(cmd, RecorderCommand::Frame { .. })
}

/// Violations whose evidence has not yet been accounted for in the log,
/// keyed by (identity, side, violation number).
type PendingEvidence = BTreeMap<(IdentityId, Side, u32), ViolationEvent>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn append_record(log: &Mutex<EventLog>, record: &LogRecord, metrics: &PipelineMetrics) {
    if let Err(e) = lock(log).append(record) {
        metrics.inc(&metrics.evidence_failures);
        warn!("⚠️  Violation log write failed: {}", e);
    }
}

fn discarded_record(event: &ViolationEvent) -> Option<LogRecord> {
    let refs = event.evidence.clone()?;
    Some(LogRecord::Evidence {
        logged_at: Utc::now(),
        identity_id: event.identity_id,
        side: event.side,
        violation_number: event.violation_number,
        start_timestamp_ms: None,
        end_timestamp_ms: None,
        frame_count: 0,
        still_path: refs.still_path,
        clip_path: refs.clip_path,
        end_reason: EpisodeEndReason::Shutdown,
        truncated: false,
        complete: false,
    })
}

// ============================================================================
// HANDLE
// ============================================================================

pub struct EvidenceRecorder {
    queue: Arc<Handoff<RecorderCommand>>,
    worker: Option<JoinHandle<()>>,
    log: Arc<Mutex<EventLog>>,
    pending: Arc<Mutex<PendingEvidence>>,
    config: EvidenceConfig,
    output_dir: PathBuf,
    metrics: PipelineMetrics,
}

impl EvidenceRecorder {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(
        config: EvidenceConfig,
        sink: Arc<dyn EvidenceSink>,
        log: EventLog,
        metrics: PipelineMetrics,
    ) -> Self {
        let queue = Arc::new(Handoff::new(config.queue_depth, is_frame));
        let output_dir = PathBuf::from(&config.output_dir);
        let log = Arc::new(Mutex::new(log));
        let pending = Arc::new(Mutex::new(PendingEvidence::new()));
        let worker = RecorderWorker {
            queue: Arc::clone(&queue),
            sink,
            log: Arc::clone(&log),
            pending: Arc::clone(&pending),
            rings: PrerollRings::new(config.preroll_frames),
            episodes: BTreeMap::new(),
            max_capture_frames: config.max_capture_frames,
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(worker.run());
        info!(
            "🎥 Evidence recorder started: dir={}, preroll={} frames, cap={} frames, queue={}",
            output_dir.display(),
            config.preroll_frames,
            config.max_capture_frames,
            config.queue_depth
        );
        Self {
            queue,
            worker: Some(handle),
            log,
            pending,
            config,
            output_dir,
            metrics,
        }
    }

    fn send(&self, cmd: RecorderCommand) {
        if let Some(dropped) = self.queue.push(cmd) {
            self.metrics.inc(&self.metrics.handoff_dropped);
            match dropped {
                RecorderCommand::Frame { frame, .. } => {
                    debug!("Hand-off full, dropped frame {}", frame.index)
                }
                _ => warn!("Hand-off full or closed, dropped a recorder command"),
            }
        }
    }

    pub fn capture_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Feed one frame and the identities visible on it.
    pub fn push_frame(&self, frame: Arc<Frame>, visible: Vec<IdentityId>) {
        if !self.config.enabled {
            return;
        }
        self.send(RecorderCommand::Frame { frame, visible });
    }

    /// Register a violation. Encodes the still from `frame` immediately, fixes
    /// the artifact paths, appends the violation record, and returns the event
    /// with its evidence references (None when capture is off or no frame is
    /// available).
    pub fn on_violation(&self, mut event: ViolationEvent, frame: Option<&Arc<Frame>>) -> ViolationEvent {
        let mut still = None;
        if let (true, Some(frame)) = (self.config.enabled, frame) {
            let stem = artifact_stem(&event, Utc::now());
            event.evidence = Some(EvidenceRefs {
                still_path: self.output_dir.join(format!("{}.jpg", stem)),
                clip_path: self.output_dir.join(format!("{}_clip", stem)),
            });
            match encode_jpeg(frame, self.config.jpeg_quality) {
                Ok(jpeg) => still = Some(jpeg),
                Err(e) => {
                    self.metrics.inc(&self.metrics.evidence_failures);
                    warn!("⚠️  Still capture failed for P{}: {}", event.identity_id, e);
                }
            }
        }
        append_record(
            &self.log,
            &LogRecord::Violation {
                logged_at: Utc::now(),
                event: event.clone(),
            },
            &self.metrics,
        );
        if event.evidence.is_some() {
            lock(&self.pending).insert(
                (event.identity_id, event.side, event.violation_number),
                event.clone(),
            );
            self.send(RecorderCommand::Violation {
                event: event.clone(),
                still,
            });
        }
        event
    }

    /// Side re-armed: close its capture episode.
    pub fn end_episode(&self, id: IdentityId, side: Side) {
        self.send(RecorderCommand::EndEpisode { id, side });
    }

    /// Identity LOST, purged or reset: flush its episodes and release its ring.
    pub fn identity_gone(&self, id: IdentityId, reason: EpisodeEndReason) {
        self.send(RecorderCommand::IdentityGone { id, reason });
    }

    /// Append a record to the violation log right away.
    pub fn record(&self, record: LogRecord) {
        append_record(&self.log, &record, &self.metrics);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Drain and flush everything in flight, bounded by `timeout`. On timeout
    /// the worker is aborted; every episode it had not finished is logged as
    /// an incomplete `evidence` record.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<()> {
        self.queue.close();
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => {
                info!("🎥 Evidence recorder drained");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Evidence recorder task failed: {}", e);
                Err(WatchError::RecorderClosed)
            }
            Err(_) => {
                worker.abort();
                let unprocessed = self.queue.len();
                let discarded: Vec<ViolationEvent> =
                    std::mem::take(&mut *lock(&self.pending)).into_values().collect();
                warn!(
                    "⚠️  INCOMPLETE EVIDENCE: recorder did not drain within {:?} ({} commands unprocessed, {} episodes discarded)",
                    timeout,
                    unprocessed,
                    discarded.len()
                );
                if discarded.is_empty() {
                    self.metrics.inc(&self.metrics.incomplete_evidence);
                }
                for event in &discarded {
                    self.metrics.inc(&self.metrics.incomplete_evidence);
                    warn!(
                        "⚠️  Evidence discarded: P{} {} violation #{} (frame {})",
                        event.identity_id,
                        event.side.as_str(),
                        event.violation_number,
                        event.frame_index
                    );
                    if let Some(record) = discarded_record(event) {
                        append_record(&self.log, &record, &self.metrics);
                    }
                }
                Ok(())
            }
        }
    }
}

impl Drop for EvidenceRecorder {
    fn drop(&mut self) {
        self.queue.close();
    }
}

// ============================================================================
// WORKER
// ============================================================================

struct RecorderWorker {
    queue: Arc<Handoff<RecorderCommand>>,
    sink: Arc<dyn EvidenceSink>,
    log: Arc<Mutex<EventLog>>,
    pending: Arc<Mutex<PendingEvidence>>,
    rings: PrerollRings,
    episodes: BTreeMap<(IdentityId, Side), Episode>,
    max_capture_frames: usize,
    metrics: PipelineMetrics,
}

impl RecorderWorker {
    async fn run(mut self) {
        while let Some(batch) = self.queue.next_batch().await {
            for cmd in batch {
                self.handle(cmd).await;
            }
        }
        let open: Vec<(IdentityId, Side)> = self.episodes.keys().copied().collect();
        for key in open {
            self.close_episode(key, EpisodeEndReason::Shutdown).await;
        }
        debug!("Recorder worker exiting ({} log records written)", lock(&self.log).written());
    }

    async fn handle(&mut self, cmd: RecorderCommand) {
        match cmd {
            RecorderCommand::Frame { frame, visible } => {
                self.rings.push(&frame, &visible);
                let mut full = Vec::new();
                for (key, episode) in self.episodes.iter_mut() {
                    if episode.push(&frame) {
                        full.push(*key);
                    }
                }
                for key in full {
                    self.close_episode(key, EpisodeEndReason::MaxDuration).await;
                }
            }
            RecorderCommand::Violation { event, still } => {
                let Some(refs) = event.evidence.clone() else {
                    return;
                };
                if let Some(jpeg) = still {
                    self.write_still(refs.still_path.clone(), jpeg).await;
                }
                let key = (event.identity_id, event.side);
                if self.episodes.contains_key(&key) {
                    self.close_episode(key, EpisodeEndReason::Rearmed).await;
                }
                let preroll = self.rings.snapshot(event.identity_id);
                debug!(
                    "Episode opened for P{} {} with {} pre-roll frames",
                    event.identity_id,
                    event.side.as_str(),
                    preroll.len()
                );
                let episode = Episode::open(event, refs, preroll, self.max_capture_frames);
                self.episodes.insert(key, episode);
            }
            RecorderCommand::EndEpisode { id, side } => {
                self.close_episode((id, side), EpisodeEndReason::Rearmed).await;
            }
            RecorderCommand::IdentityGone { id, reason } => {
                for side in Side::BOTH {
                    self.close_episode((id, side), reason).await;
                }
                self.rings.release(id);
            }
        }
    }

    async fn write_still(&mut self, path: PathBuf, jpeg: Vec<u8>) {
        let sink = Arc::clone(&self.sink);
        let task_path = path.clone();
        let result = tokio::task::spawn_blocking(move || sink.write_still(&task_path, &jpeg)).await;
        match result {
            Ok(Ok(())) => {
                self.metrics.inc(&self.metrics.evidence_stills);
                info!("📸 Still saved: {}", path.display());
            }
            Ok(Err(e)) => {
                self.metrics.inc(&self.metrics.evidence_failures);
                warn!("⚠️  Still write failed ({}): {}", path.display(), e);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.evidence_failures);
                warn!("⚠️  Still write task failed: {}", e);
            }
        }
    }

    async fn close_episode(&mut self, key: (IdentityId, Side), reason: EpisodeEndReason) {
        let Some(episode) = self.episodes.remove(&key) else {
            return;
        };
        let truncated = reason == EpisodeEndReason::MaxDuration;
        let event = episode.event.clone();
        let refs = episode.refs.clone();
        let start_ts = episode.first_timestamp_ms();
        let end_ts = episode.last_timestamp_ms();
        let frames = episode.into_frames();
        let frame_count = frames.len();

        let complete = if frames.is_empty() {
            self.metrics.inc(&self.metrics.incomplete_evidence);
            warn!(
                "⚠️  INCOMPLETE EVIDENCE: P{} {} episode ended ({:?}) with no frames",
                key.0,
                key.1.as_str(),
                reason
            );
            false
        } else {
            let manifest = ClipManifest {
                identity_id: event.identity_id,
                side: event.side,
                violation_number: event.violation_number,
                trigger_frame: event.frame_index,
                first_frame: frames.first().map(|f| f.index).unwrap_or(event.frame_index),
                last_frame: frames.last().map(|f| f.index).unwrap_or(event.frame_index),
                start_timestamp_ms: start_ts.unwrap_or(event.timestamp_ms),
                end_timestamp_ms: end_ts.unwrap_or(event.timestamp_ms),
                frame_count,
                truncated,
            };
            let sink = Arc::clone(&self.sink);
            let clip_path = refs.clip_path.clone();
            let result =
                tokio::task::spawn_blocking(move || sink.write_clip(&clip_path, &frames, &manifest)).await;
            match result {
                Ok(Ok(written)) => {
                    self.metrics.inc(&self.metrics.evidence_clips);
                    info!(
                        "🎬 Clip saved: {} ({} frames, {:?})",
                        refs.clip_path.display(),
                        written,
                        reason
                    );
                    true
                }
                Ok(Err(e)) => {
                    self.metrics.inc(&self.metrics.evidence_failures);
                    warn!("⚠️  Clip write failed ({}): {}. Buffer discarded", refs.clip_path.display(), e);
                    false
                }
                Err(e) => {
                    self.metrics.inc(&self.metrics.evidence_failures);
                    warn!("⚠️  Clip write task failed: {}. Buffer discarded", e);
                    false
                }
            }
        };

        let record = LogRecord::Evidence {
            logged_at: Utc::now(),
            identity_id: event.identity_id,
            side: event.side,
            violation_number: event.violation_number,
            start_timestamp_ms: start_ts,
            end_timestamp_ms: end_ts,
            frame_count,
            still_path: refs.still_path,
            clip_path: refs.clip_path,
            end_reason: reason,
            truncated,
            complete,
        };
        append_record(&self.log, &record, &self.metrics);
        lock(&self.pending).remove(&(event.identity_id, event.side, event.violation_number));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactSource, Point};
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    fn frame(index: u64) -> Arc<Frame> {
        Arc::new(Frame {
            index,
            timestamp_ms: index as f64 * 100.0 / 3.0,
            width: 4,
            height: 4,
            rgb: vec![200; 4 * 4 * 3],
        })
    }

    fn event(id: IdentityId, side: Side, frame_index: u64, n: u32) -> ViolationEvent {
        ViolationEvent {
            identity_id: id,
            side,
            frame_index,
            timestamp_ms: frame_index as f64 * 100.0 / 3.0,
            session_time_s: frame_index as f64 / 30.0,
            position: Point::new(50.0, 400.0),
            source: ContactSource::Heel,
            violation_number: n,
            evidence: None,
        }
    }

    /// Records what would have been written instead of touching disk.
    #[derive(Default)]
    struct MemorySink {
        stills: Mutex<Vec<PathBuf>>,
        clips: Mutex<Vec<ClipManifest>>,
        fail_clips: bool,
        clip_delay: Option<Duration>,
    }

    impl EvidenceSink for MemorySink {
        fn write_still(&self, path: &Path, _jpeg: &[u8]) -> Result<()> {
            self.stills.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn write_clip(&self, _path: &Path, frames: &[Arc<Frame>], manifest: &ClipManifest) -> Result<usize> {
            if let Some(delay) = self.clip_delay {
                std::thread::sleep(delay);
            }
            if self.fail_clips {
                return Err(WatchError::evidence("disk full"));
            }
            self.clips.lock().unwrap().push(manifest.clone());
            Ok(frames.len())
        }
    }

    fn config(dir: &Path) -> EvidenceConfig {
        EvidenceConfig {
            output_dir: dir.join("violations").to_string_lossy().into_owned(),
            preroll_frames: 5,
            max_capture_frames: 10,
            ..EvidenceConfig::default()
        }
    }

    fn spawn(dir: &Path, sink: Arc<MemorySink>) -> (EvidenceRecorder, PathBuf, PipelineMetrics) {
        let log_path = dir.join("violations.jsonl");
        let metrics = PipelineMetrics::new();
        let recorder = EvidenceRecorder::spawn(
            config(dir),
            sink,
            EventLog::open(&log_path).unwrap(),
            metrics.clone(),
        );
        (recorder, log_path, metrics)
    }

    #[tokio::test]
    async fn test_episode_includes_preroll_and_ends_on_rearm() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let (rec, log_path, metrics) = spawn(dir.path(), sink.clone());

        for i in 0..8 {
            rec.push_frame(frame(i), vec![1]);
        }
        let logged = rec.on_violation(event(1, Side::Left, 7, 1), Some(&frame(7)));
        let refs = logged.evidence.clone().unwrap();
        assert!(refs.still_path.to_string_lossy().contains("P1_left_v1_f000007"));

        for i in 8..11 {
            rec.push_frame(frame(i), vec![1]);
        }
        rec.end_episode(1, Side::Left);
        rec.shutdown(Duration::from_secs(5)).await.unwrap();

        let clips = sink.clips.lock().unwrap().clone();
        assert_eq!(clips.len(), 1);
        // Pre-roll of 5 (frames 3..=7) plus 3 after the trigger
        assert_eq!(clips[0].first_frame, 3);
        assert_eq!(clips[0].last_frame, 10);
        assert_eq!(clips[0].frame_count, 8);
        assert!(!clips[0].truncated);
        assert_eq!(sink.stills.lock().unwrap().as_slice(), &[refs.still_path.clone()]);

        let records = EventLog::read_all(&log_path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], LogRecord::Violation { event, .. } if *event == logged));
        assert!(matches!(
            &records[1],
            LogRecord::Evidence { end_reason: EpisodeEndReason::Rearmed, complete: true, .. }
        ));
        assert_eq!(metrics.evidence_clips.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_capture_cap_flushes_truncated_clip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let (rec, _log, _metrics) = spawn(dir.path(), sink.clone());

        rec.push_frame(frame(0), vec![3]);
        rec.on_violation(event(3, Side::Right, 0, 1), Some(&frame(0)));
        for i in 1..40 {
            rec.push_frame(frame(i), vec![3]);
        }
        rec.shutdown(Duration::from_secs(5)).await.unwrap();

        let clips = sink.clips.lock().unwrap().clone();
        assert_eq!(clips.len(), 1);
        assert!(clips[0].truncated);
        assert_eq!(clips[0].frame_count, 11);
    }

    #[tokio::test]
    async fn test_identity_gone_flushes_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let (rec, log_path, _metrics) = spawn(dir.path(), sink.clone());

        rec.push_frame(frame(0), vec![2]);
        rec.on_violation(event(2, Side::Left, 0, 1), Some(&frame(0)));
        rec.on_violation(event(2, Side::Right, 0, 2), Some(&frame(0)));
        rec.identity_gone(2, EpisodeEndReason::IdentityLost);
        rec.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(sink.clips.lock().unwrap().len(), 2);
        let ends: Vec<EpisodeEndReason> = EventLog::read_all(&log_path)
            .unwrap()
            .into_iter()
            .filter_map(|r| match r {
                LogRecord::Evidence { end_reason, .. } => Some(end_reason),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec![EpisodeEndReason::IdentityLost; 2]);
    }

    #[tokio::test]
    async fn test_write_failure_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink {
            fail_clips: true,
            ..MemorySink::default()
        });
        let (rec, log_path, metrics) = spawn(dir.path(), sink);

        rec.push_frame(frame(0), vec![1]);
        rec.on_violation(event(1, Side::Left, 0, 1), Some(&frame(0)));
        rec.end_episode(1, Side::Left);
        // Recorder keeps working after the failure
        rec.on_violation(event(1, Side::Left, 90, 2), None);
        rec.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(metrics.evidence_failures.load(Ordering::Relaxed), 1);
        // Violation records are written by the handle, ahead of the clip outcome
        let records = EventLog::read_all(&log_path).unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(&records[1], LogRecord::Violation { event, .. } if event.evidence.is_none()));
        assert!(matches!(&records[2], LogRecord::Evidence { complete: false, .. }));
    }

    #[tokio::test]
    async fn test_open_episode_flushed_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let (rec, _log, _metrics) = spawn(dir.path(), sink.clone());

        rec.push_frame(frame(0), vec![5]);
        rec.on_violation(event(5, Side::Left, 0, 1), Some(&frame(0)));
        rec.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(sink.clips.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_capture_still_logs_violation() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("violations.jsonl");
        let sink = Arc::new(MemorySink::default());
        let rec = EvidenceRecorder::spawn(
            EvidenceConfig {
                enabled: false,
                ..config(dir.path())
            },
            sink.clone(),
            EventLog::open(&log_path).unwrap(),
            PipelineMetrics::new(),
        );
        rec.push_frame(frame(0), vec![1]);
        let logged = rec.on_violation(event(1, Side::Left, 0, 1), Some(&frame(0)));
        assert!(logged.evidence.is_none());
        rec.shutdown(Duration::from_secs(5)).await.unwrap();

        assert!(sink.stills.lock().unwrap().is_empty());
        assert_eq!(EventLog::read_all(&log_path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_keeps_violations_and_logs_discarded_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink {
            clip_delay: Some(Duration::from_millis(800)),
            ..MemorySink::default()
        });
        let (rec, log_path, metrics) = spawn(dir.path(), sink.clone());

        rec.push_frame(frame(0), vec![1, 2]);
        rec.on_violation(event(1, Side::Left, 0, 1), Some(&frame(0)));
        rec.end_episode(1, Side::Left);
        rec.on_violation(event(2, Side::Right, 1, 1), Some(&frame(1)));
        rec.shutdown(Duration::from_millis(200)).await.unwrap();

        assert_eq!(metrics.incomplete_evidence.load(Ordering::Relaxed), 2);
        let records = EventLog::read_all(&log_path).unwrap();
        let violations: Vec<IdentityId> = records
            .iter()
            .filter_map(|r| match r {
                LogRecord::Violation { event, .. } => Some(event.identity_id),
                _ => None,
            })
            .collect();
        assert_eq!(violations, vec![1, 2]);

        let mut discarded: Vec<IdentityId> = records
            .iter()
            .filter_map(|r| match r {
                LogRecord::Evidence {
                    identity_id,
                    end_reason: EpisodeEndReason::Shutdown,
                    complete: false,
                    ..
                } => Some(*identity_id),
                _ => None,
            })
            .collect();
        discarded.sort();
        assert_eq!(discarded, vec![1, 2]);
    }
}
