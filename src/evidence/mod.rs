// src/evidence/mod.rs
//
// Violation evidence: stills, clips and the append-only log.
//
//   pipeline ──push (never blocks)──▶ handoff ──▶ recorder worker
//      │                                            ├─ frame_ring (pre-roll + episodes)
//      │                                            ├─ sink (JPEG still / clip dir)
//      │                                            └─ event_log: evidence records
//      └─ event_log: violation and identity_out records, written directly

pub mod event_log;
pub mod frame_ring;
pub mod handoff;
pub mod recorder;
pub mod sink;

pub use event_log::{EventLog, LogRecord};
pub use recorder::{EpisodeEndReason, EvidenceRecorder};
pub use sink::{EvidenceSink, FsEvidenceSink};
