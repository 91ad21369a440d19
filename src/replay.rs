// src/replay.rs
//
// Offline input for the replay driver: per-frame detector + pose output as
// JSONL, and optionally the decoded frames from an image directory.
//
// One line per frame:
//   {"frame_index": 0, "timestamp_ms": 0.0, "observations": [
//       {"bbox": [x1, y1, x2, y2], "confidence": 0.9, "track_id": 3,
//        "landmarks": {"left_heel": {"x": 10, "y": 20, "confidence": 0.8}}}]}

use crate::types::{Frame, Observation};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservations {
    pub frame_index: u64,
    /// Defaults to frame_index / fps when absent
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl FrameObservations {
    pub fn timestamp_ms_or(&self, fps: f64) -> f64 {
        self.timestamp_ms
            .unwrap_or(self.frame_index as f64 * 1000.0 / fps)
    }
}

/// Read every frame record, in file order. Blank lines are skipped.
pub fn read_observations<P: AsRef<Path>>(path: P) -> Result<Vec<FrameObservations>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut frames = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameObservations = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed frame record", path.display(), line_no + 1))?;
        frames.push(record);
    }

    let out_of_order = frames
        .windows(2)
        .filter(|w| w[1].frame_index <= w[0].frame_index)
        .count();
    if out_of_order > 0 {
        warn!(
            "{} frame records are not in increasing frame order; sorting",
            out_of_order
        );
        frames.sort_by_key(|f| f.frame_index);
    }

    info!("Loaded {} frame records from {}", frames.len(), path.display());
    Ok(frames)
}

/// Image files under `dir`, sorted by path so they pair with frame order.
pub fn find_frame_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        anyhow::bail!("frame directory {} does not exist", dir.display());
    }

    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();

    info!("Found {} frame images in {}", images.len(), dir.display());
    Ok(images)
}

pub fn load_frame<P: AsRef<Path>>(path: P, index: u64, timestamp_ms: f64) -> Result<Frame> {
    let path = path.as_ref();
    let rgb = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame {
        index,
        timestamp_ms,
        width,
        height,
        rgb: rgb.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_frames_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"frame_index": 0, "observations": [{"bbox": [0, 0, 10, 20], "confidence": 0.9, "track_id": 1, "landmarks": {"left_heel": {"x": 5, "y": 20, "confidence": 0.8}}}]}"#,
                "\n\n",
                r#"{"frame_index": 1, "timestamp_ms": 40.0}"#,
                "\n"
            ),
        )
        .unwrap();

        let frames = read_observations(&path).unwrap();
        assert_eq!(frames.len(), 2);
        let obs = &frames[0].observations[0];
        assert_eq!(obs.detection.track_id, Some(1));
        assert_eq!(obs.landmarks["left_heel"].y, 20.0);
        assert_eq!(frames[0].timestamp_ms_or(25.0), 0.0);
        assert_eq!(frames[1].timestamp_ms_or(25.0), 40.0);
        assert!(frames[1].observations.is_empty());
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.jsonl");
        fs::write(&path, "{\"frame_index\": 0}\nnot json\n").unwrap();
        let err = read_observations(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("obs.jsonl:2"));
    }

    #[test]
    fn test_frame_images_sorted_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_002.png", "frame_001.png", "notes.txt"] {
            let path = dir.path().join(name);
            if name.ends_with(".png") {
                image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]))
                    .save(&path)
                    .unwrap();
            } else {
                fs::write(&path, "x").unwrap();
            }
        }
        let images = find_frame_images(dir.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].ends_with("frame_001.png"));

        let frame = load_frame(&images[0], 0, 0.0).unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert_eq!(frame.rgb.len(), 4 * 3 * 3);
        assert_eq!(&frame.rgb[..3], &[10, 20, 30]);
    }
}
