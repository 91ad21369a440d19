// src/evidence/sink.rs
//
// Evidence persistence. Stills are single JPEGs; clips are a directory of
// numbered JPEG frames plus a manifest.json describing the episode.

use crate::error::{Result, WatchError};
use crate::types::{Frame, IdentityId, Side, ViolationEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// JPEG ENCODING HELPER
// ============================================================================

/// Encode a decoded RGB frame as JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    use image::{ImageBuffer, RgbImage};

    let img: RgbImage = ImageBuffer::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or_else(|| {
            WatchError::evidence(format!(
                "frame {} buffer is {} bytes, expected {}x{}x3",
                frame.index,
                frame.rgb.len(),
                frame.width,
                frame.height
            ))
        })?;

    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    img.write_with_encoder(encoder)?;

    Ok(buf.into_inner())
}

// ============================================================================
// FILE NAMING
// ============================================================================

/// Artifact base name: identity, side, violation number, frame and wall time.
pub fn artifact_stem(event: &ViolationEvent, created_at: DateTime<Utc>) -> String {
    format!(
        "P{}_{}_v{}_f{:06}_{}",
        event.identity_id,
        event.side.as_str(),
        event.violation_number,
        event.frame_index,
        created_at.format("%Y%m%dT%H%M%S%3f")
    )
}

/// Written next to the clip frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipManifest {
    pub identity_id: IdentityId,
    pub side: Side,
    pub violation_number: u32,
    pub trigger_frame: u64,
    pub first_frame: u64,
    pub last_frame: u64,
    pub start_timestamp_ms: f64,
    pub end_timestamp_ms: f64,
    pub frame_count: usize,
    pub truncated: bool,
}

// ============================================================================
// SINK
// ============================================================================

pub trait EvidenceSink: Send + Sync + 'static {
    fn write_still(&self, path: &Path, jpeg: &[u8]) -> Result<()>;

    /// Persist a clip. Returns the number of frames written.
    fn write_clip(&self, path: &Path, frames: &[Arc<Frame>], manifest: &ClipManifest) -> Result<usize>;
}

pub struct FsEvidenceSink {
    jpeg_quality: u8,
}

impl FsEvidenceSink {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl EvidenceSink for FsEvidenceSink {
    fn write_still(&self, path: &Path, jpeg: &[u8]) -> Result<()> {
        ensure_parent(path)?;
        fs::write(path, jpeg)?;
        debug!("Still written: {}", path.display());
        Ok(())
    }

    fn write_clip(&self, path: &Path, frames: &[Arc<Frame>], manifest: &ClipManifest) -> Result<usize> {
        if frames.is_empty() {
            return Err(WatchError::evidence(format!(
                "clip {} has no frames",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;
        for (i, frame) in frames.iter().enumerate() {
            let jpeg = encode_jpeg(frame, self.jpeg_quality)?;
            fs::write(frame_path(path, i), jpeg)?;
        }
        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(path.join("manifest.json"), manifest_json)?;
        debug!("Clip written: {} ({} frames)", path.display(), frames.len());
        Ok(frames.len())
    }
}

pub fn frame_path(clip_dir: &Path, position: usize) -> PathBuf {
    clip_dir.join(format!("frame_{:05}.jpg", position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactSource, Point};
    use chrono::TimeZone;

    fn frame(index: u64) -> Arc<Frame> {
        Arc::new(Frame {
            index,
            timestamp_ms: index as f64 * 40.0,
            width: 8,
            height: 6,
            rgb: vec![128; 8 * 6 * 3],
        })
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let jpeg = encode_jpeg(&frame(0), 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let bad = Frame {
            index: 3,
            timestamp_ms: 0.0,
            width: 10,
            height: 10,
            rgb: vec![0; 5],
        };
        assert!(matches!(encode_jpeg(&bad, 85), Err(WatchError::EvidenceWrite(_))));
    }

    #[test]
    fn test_stem_encodes_identity_side_and_time() {
        let event = ViolationEvent {
            identity_id: 12,
            side: Side::Left,
            frame_index: 345,
            timestamp_ms: 11500.0,
            session_time_s: 11.5,
            position: Point::new(0.0, 0.0),
            source: ContactSource::Toe,
            violation_number: 2,
            evidence: None,
        };
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 14, 5, 9).unwrap();
        assert_eq!(artifact_stem(&event, at), "P12_left_v2_f000345_20260301T140509000");
    }

    #[test]
    fn test_clip_written_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("P1_left_clip");
        let frames: Vec<Arc<Frame>> = (0..3).map(frame).collect();
        let manifest = ClipManifest {
            identity_id: 1,
            side: Side::Left,
            violation_number: 1,
            trigger_frame: 1,
            first_frame: 0,
            last_frame: 2,
            start_timestamp_ms: 0.0,
            end_timestamp_ms: 80.0,
            frame_count: 3,
            truncated: false,
        };
        let sink = FsEvidenceSink::new(80);
        assert_eq!(sink.write_clip(&clip, &frames, &manifest).unwrap(), 3);
        assert!(frame_path(&clip, 2).exists());
        let read: ClipManifest =
            serde_json::from_str(&fs::read_to_string(clip.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(read, manifest);

        assert!(sink.write_clip(&dir.path().join("empty"), &[], &manifest).is_err());
    }
}
