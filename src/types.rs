// src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub tracker: TrackerConfig,
    pub contact: ContactConfig,
    pub violation: ViolationConfig,
    pub evidence: EvidenceConfig,
    pub logging: LoggingConfig,
}

/// How session time is derived for cooldown and capture timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// frame_index / fps. Deterministic; used for replay-from-file
    Frame,
    /// Monotonic wall clock since session start, for live capture
    Wall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub clock: ClockMode,
    pub fps: f64,
    pub boundary_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::Frame,
            fps: 30.0,
            boundary_path: "config.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum centroid distance (px) for position matching
    pub max_match_distance: f32,
    /// Minimum IoU for the overlap fallback
    pub iou_threshold: f32,
    /// Consecutive missed frames tolerated before an identity goes LOST
    pub max_frames_missing: u32,
    /// Extra missed frames after LOST before the identity is purged
    pub purge_grace_frames: u32,
    /// Create identities for unmatched detections automatically
    pub auto_create: bool,
    /// Radius (px) around an operator click to search for a detection
    pub bind_radius: f32,
    /// Bounded centroid history per identity
    pub history_len: usize,
    /// Motion model process noise (per state component, per frame)
    pub process_noise: f32,
    /// Motion model measurement noise (per axis)
    pub measurement_noise: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 150.0,
            iou_threshold: 0.3,
            max_frames_missing: 60,
            purge_grace_frames: 90,
            auto_create: true,
            bind_radius: 80.0,
            history_len: 30,
            process_noise: 0.03,
            measurement_noise: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactConfig {
    /// A landmark must exceed this confidence to be used as a contact sample
    pub min_confidence: f32,
    /// Raw samples averaged per side
    pub smoothing_window: usize,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            smoothing_window: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationConfig {
    pub cooldown_seconds: f64,
    pub out_threshold: u32,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 2.0,
            out_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub enabled: bool,
    pub output_dir: String,
    /// Frames of leading context kept per identity (~5s at 30fps)
    pub preroll_frames: usize,
    /// Cap on frames captured after the trigger
    pub max_capture_frames: usize,
    /// Hand-off queue depth; oldest frames are dropped beyond this
    pub queue_depth: usize,
    pub jpeg_quality: u8,
    pub shutdown_timeout_ms: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: "violations".to_string(),
            preroll_frames: 150,
            max_capture_frames: 300,
            queue_depth: 512,
            jpeg_quality: 85,
            shutdown_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "boundary_watch=info".to_string(),
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

pub type IdentityId = u32;

/// Pixel position. The y axis grows downward (image convention).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

pub fn bbox_center(bbox: &[f32; 4]) -> Point {
    Point::new((bbox[0] + bbox[2]) * 0.5, (bbox[1] + bbox[3]) * 0.5)
}

pub fn bbox_area(bbox: &[f32; 4]) -> f32 {
    (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0)
}

// ============================================================================
// COLLABORATOR INPUTS
// ============================================================================

/// Raw per-frame observation from the external detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] pixels
    pub confidence: f32,
    /// Detector-local track id, not stable across detector re-initialisation
    #[serde(default)]
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, track_id: Option<u32>) -> Self {
        Self {
            bbox,
            confidence,
            track_id,
        }
    }

    pub fn center(&self) -> Point {
        bbox_center(&self.bbox)
    }

    pub fn area(&self) -> f32 {
        bbox_area(&self.bbox)
    }
}

/// One pose landmark in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Landmark name (e.g. "left_heel") to position. Any subset may be absent.
pub type LandmarkMap = HashMap<String, Landmark>;

/// A detection together with the pose estimate computed on its crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(default)]
    pub landmarks: LandmarkMap,
}

/// Decoded RGB frame handed to the evidence recorder.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// Which landmark produced a ground-contact sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactSource {
    Heel,
    Toe,
    Ankle,
    Knee,
    Manual,
}

impl ContactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heel => "heel",
            Self::Toe => "toe",
            Self::Ankle => "ankle",
            Self::Knee => "knee",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundContactPoint {
    pub side: Side,
    pub position: Point,
    pub confidence: f32,
    pub source: ContactSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentityStatus {
    Active,
    Lost,
    Out,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Lost => "LOST",
            Self::Out => "OUT",
        }
    }
}

/// Evidence artifact locations, fixed when the event is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRefs {
    pub still_path: PathBuf,
    pub clip_path: PathBuf,
}

/// One logged boundary crossing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub identity_id: IdentityId,
    pub side: Side,
    pub frame_index: u64,
    pub timestamp_ms: f64,
    /// Session clock reading used for cooldown gating
    pub session_time_s: f64,
    pub position: Point,
    pub source: ContactSource,
    /// Counter value after this event (1-based)
    pub violation_number: u32,
    pub evidence: Option<EvidenceRefs>,
}
