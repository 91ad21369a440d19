// src/evidence/event_log.rs
//
// Append-only JSONL violation log. One record per line, flushed on write.

use crate::error::Result;
use crate::evidence::recorder::EpisodeEndReason;
use crate::types::{IdentityId, Side, ViolationEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    /// One boundary crossing, written when the event is created
    Violation {
        logged_at: DateTime<Utc>,
        event: ViolationEvent,
    },
    /// Identity reached the violation limit
    IdentityOut {
        logged_at: DateTime<Utc>,
        identity_id: IdentityId,
        violations: u32,
        frame_index: u64,
        timestamp_ms: f64,
    },
    /// A capture episode was flushed (or failed to flush)
    Evidence {
        logged_at: DateTime<Utc>,
        identity_id: IdentityId,
        side: Side,
        violation_number: u32,
        start_timestamp_ms: Option<f64>,
        end_timestamp_ms: Option<f64>,
        frame_count: usize,
        still_path: PathBuf,
        clip_path: PathBuf,
        end_reason: EpisodeEndReason,
        truncated: bool,
        complete: bool,
    },
}

impl LogRecord {
    pub fn identity_id(&self) -> IdentityId {
        match self {
            Self::Violation { event, .. } => event.identity_id,
            Self::IdentityOut { identity_id, .. } | Self::Evidence { identity_id, .. } => *identity_id,
        }
    }
}

pub struct EventLog {
    path: PathBuf,
    file: File,
    written: u64,
}

impl EventLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("📝 Violation log: {}", path.display());
        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let json_line = serde_json::to_string(record)?;
        writeln!(self.file, "{}", json_line)?;
        self.file.flush()?;
        self.written += 1;
        debug!("💾 Log record appended for P{}", record.identity_id());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Read back every record. Blank lines are skipped; a malformed line is an error.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<LogRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactSource, EvidenceRefs, Point};

    fn violation(n: u32) -> LogRecord {
        LogRecord::Violation {
            logged_at: Utc::now(),
            event: ViolationEvent {
                identity_id: 2,
                side: Side::Left,
                frame_index: 100 + n as u64,
                timestamp_ms: 3333.0,
                session_time_s: 3.3,
                position: Point::new(120.0, 480.5),
                source: ContactSource::Heel,
                violation_number: n,
                evidence: Some(EvidenceRefs {
                    still_path: PathBuf::from("violations/P2_left.jpg"),
                    clip_path: PathBuf::from("violations/P2_left_clip"),
                }),
            },
        }
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("violations.jsonl");
        let records = vec![
            violation(1),
            violation(2),
            LogRecord::IdentityOut {
                logged_at: Utc::now(),
                identity_id: 2,
                violations: 3,
                frame_index: 400,
                timestamp_ms: 13333.0,
            },
        ];
        {
            let mut log = EventLog::open(&path).unwrap();
            for r in &records {
                log.append(r).unwrap();
            }
            assert_eq!(log.written(), 3);
        }
        assert_eq!(EventLog::read_all(&path).unwrap(), records);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("violations.jsonl");
        EventLog::open(&path).unwrap().append(&violation(1)).unwrap();
        EventLog::open(&path).unwrap().append(&violation(2)).unwrap();
        let read = EventLog::read_all(&path).unwrap();
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn test_record_tag_is_snake_case() {
        let line = serde_json::to_string(&LogRecord::IdentityOut {
            logged_at: Utc::now(),
            identity_id: 7,
            violations: 3,
            frame_index: 1,
            timestamp_ms: 0.0,
        })
        .unwrap();
        assert!(line.contains(r#""record":"identity_out""#));
    }

    #[test]
    fn test_fractional_timestamps_read_back_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("violations.jsonl");
        let timestamp_ms = 7.0 * 100.0 / 3.0;
        let record = LogRecord::IdentityOut {
            logged_at: Utc::now(),
            identity_id: 4,
            violations: 3,
            frame_index: 7,
            timestamp_ms,
        };
        EventLog::open(&path).unwrap().append(&record).unwrap();
        match &EventLog::read_all(&path).unwrap()[0] {
            LogRecord::IdentityOut { timestamp_ms: read, .. } => {
                assert_eq!(read.to_bits(), timestamp_ms.to_bits())
            }
            other => panic!("unexpected record {:?}", other),
        }
    }
}
