// src/boundary.rs
//
// Polyline boundary with a violation margin.
//
// Sign convention: image coordinates, y grows DOWNWARD. A contact point is
// "below the line" when its y is larger than the line's y at the same x.
// A violation is a point more than `threshold` pixels below the line:
//
//     point.y > boundary_y(point.x) + threshold
//
// The signed margin reported with every evaluation is
// `point.y - (boundary_y + threshold)`; positive means violating.

use crate::error::{Result, WatchError};
use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_THRESHOLD_PX: f32 = 10.0;

/// How the boundary vertices were produced by the drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundaryMethod {
    TwoPoints,
    Hough,
    Polyline,
}

impl BoundaryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwoPoints => "TWO_POINTS",
            Self::Hough => "HOUGH",
            Self::Polyline => "POLYLINE",
        }
    }
}

fn default_method() -> BoundaryMethod {
    BoundaryMethod::TwoPoints
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD_PX
}

/// On-disk boundary description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub boundary_points: Vec<[f32; 2]>,
    #[serde(default = "default_method")]
    pub method: BoundaryMethod,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

/// Result of checking one point against the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryEvaluation {
    pub boundary_y: f32,
    pub margin: f32,
    pub violates: bool,
}

/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryModel {
    vertices: Vec<Point>,
    threshold: f32,
    method: BoundaryMethod,
}

impl BoundaryModel {
    pub fn new(vertices: Vec<Point>, threshold: f32, method: BoundaryMethod) -> Result<Self> {
        if vertices.len() < 2 {
            return Err(WatchError::boundary(format!(
                "need at least 2 vertices, got {}",
                vertices.len()
            )));
        }
        if let Some(bad) = vertices.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(WatchError::boundary(format!(
                "non-finite vertex ({}, {})",
                bad.x, bad.y
            )));
        }
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(WatchError::boundary(format!(
                "threshold must be a non-negative number, got {}",
                threshold
            )));
        }

        let mut vertices = vertices;
        // Stable sort keeps the drawn order of vertices sharing an x.
        vertices.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));

        Ok(Self {
            vertices,
            threshold,
            method,
        })
    }

    pub fn from_config(config: &BoundaryConfig) -> Result<Self> {
        let vertices = config
            .boundary_points
            .iter()
            .map(|p| Point::new(p[0], p[1]))
            .collect();
        Self::new(vertices, config.threshold, config.method)
    }

    pub fn to_config(&self) -> BoundaryConfig {
        BoundaryConfig {
            boundary_points: self.vertices.iter().map(|p| [p.x, p.y]).collect(),
            method: self.method,
            threshold: self.threshold,
        }
    }

    /// Load the session boundary. Any failure here is fatal for the session.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            WatchError::boundary(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: BoundaryConfig = serde_json::from_str(&contents)
            .map_err(|e| WatchError::boundary(format!("{}: {}", path.display(), e)))?;
        let model = Self::from_config(&config)?;
        info!(
            "✓ Boundary loaded: {} vertices, method={}, threshold={:.1}px",
            model.vertices.len(),
            model.method.as_str(),
            model.threshold
        );
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_config())?;
        fs::write(path.as_ref(), json)?;
        debug!("Boundary saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn method(&self) -> BoundaryMethod {
        self.method
    }

    /// Index of the segment used for `x`. Inside the polyline's x-range this
    /// is the first segment whose closed range contains x, so a shared vertex
    /// always resolves to the lower-indexed segment. Outside the range the
    /// nearest edge segment is used for extrapolation.
    fn segment_for(&self, x: f32) -> usize {
        let last = self.vertices.len() - 2;
        if x < self.vertices[0].x {
            return 0;
        }
        if x > self.vertices[last + 1].x {
            return last;
        }
        self.vertices
            .windows(2)
            .position(|w| w[0].x <= x && x <= w[1].x)
            .unwrap_or(last)
    }

    /// Line y at `x`, interpolated on the bracketing segment or extrapolated
    /// along the nearest edge segment's slope.
    pub fn boundary_y(&self, x: f32) -> f32 {
        let seg = self.segment_for(x);
        let a = self.vertices[seg];
        let b = self.vertices[seg + 1];
        let dx = b.x - a.x;
        if dx.abs() <= f32::EPSILON {
            // Vertical segment: no usable slope.
            return if x > b.x { b.y } else { a.y };
        }
        a.y + (b.y - a.y) * (x - a.x) / dx
    }

    pub fn evaluate(&self, point: Point) -> BoundaryEvaluation {
        let boundary_y = self.boundary_y(point.x);
        let margin = point.y - (boundary_y + self.threshold);
        BoundaryEvaluation {
            boundary_y,
            margin,
            violates: margin > 0.0,
        }
    }

    pub fn violates(&self, point: Point) -> bool {
        self.evaluate(point).violates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(points: &[(f32, f32)], threshold: f32) -> BoundaryModel {
        BoundaryModel::new(
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            threshold,
            BoundaryMethod::TwoPoints,
        )
        .unwrap()
    }

    #[test]
    fn test_interpolation_and_threshold() {
        let m = model(&[(0.0, 100.0), (100.0, 200.0)], 10.0);

        let on_margin = m.evaluate(Point::new(50.0, 150.0));
        assert_eq!(on_margin.boundary_y, 150.0);
        assert!(!on_margin.violates, "150 > 160 is false");
        assert_eq!(on_margin.margin, -10.0);

        let below = m.evaluate(Point::new(50.0, 170.0));
        assert_eq!(below.boundary_y, 150.0);
        assert!(below.violates, "170 > 160 is true");
        assert_eq!(below.margin, 10.0);
    }

    #[test]
    fn test_exact_threshold_is_not_violation() {
        let m = model(&[(0.0, 100.0), (100.0, 100.0)], 10.0);
        assert!(!m.violates(Point::new(20.0, 110.0)));
        assert!(m.violates(Point::new(20.0, 110.5)));
    }

    #[test]
    fn test_vertices_sorted_before_evaluation() {
        let unsorted = model(&[(100.0, 200.0), (0.0, 100.0), (50.0, 120.0)], 0.0);
        let xs: Vec<f32> = unsorted.vertices().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 50.0, 100.0]);
        assert_eq!(unsorted.boundary_y(25.0), 110.0);
        assert_eq!(unsorted.boundary_y(75.0), 160.0);
    }

    #[test]
    fn test_extrapolates_along_edge_slope() {
        let m = model(&[(0.0, 100.0), (100.0, 200.0), (200.0, 200.0)], 0.0);
        // Left of the polyline: slope of the first segment (1.0)
        assert_eq!(m.boundary_y(-50.0), 50.0);
        // Right of the polyline: slope of the last segment (0.0)
        assert_eq!(m.boundary_y(300.0), 200.0);
    }

    #[test]
    fn test_shared_vertex_is_stable() {
        let m = model(&[(0.0, 0.0), (100.0, 100.0), (200.0, 0.0)], 0.0);
        assert_eq!(m.segment_for(100.0), 0);
        let first = m.boundary_y(100.0);
        for _ in 0..10 {
            assert_eq!(m.boundary_y(100.0), first);
        }
        assert_eq!(first, 100.0);
    }

    #[test]
    fn test_vertical_segment_does_not_divide_by_zero() {
        let m = model(&[(50.0, 100.0), (50.0, 200.0), (150.0, 200.0)], 0.0);
        let y = m.boundary_y(50.0);
        assert!(y.is_finite());
        assert_eq!(m.boundary_y(100.0), 200.0);
    }

    #[test]
    fn test_rejects_degenerate_boundaries() {
        assert!(matches!(
            BoundaryModel::new(vec![Point::new(0.0, 0.0)], 10.0, BoundaryMethod::Hough),
            Err(WatchError::BoundaryInvalid(_))
        ));
        assert!(BoundaryModel::new(
            vec![Point::new(0.0, 0.0), Point::new(f32::NAN, 1.0)],
            10.0,
            BoundaryMethod::Hough
        )
        .is_err());
        assert!(BoundaryModel::new(
            vec![Point::new(0.0, 0.0), Point::new(10.0, 1.0)],
            -1.0,
            BoundaryMethod::Hough
        )
        .is_err());
    }

    #[test]
    fn test_save_load_round_trip_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.json");
        let original = model(
            &[(13.7, 401.3), (250.25, 388.9), (640.0, 412.6), (1279.5, 377.1)],
            12.5,
        );
        original.save(&path).unwrap();
        let reloaded = BoundaryModel::load(&path).unwrap();

        assert_eq!(reloaded, original);
        for x in [-40.0, 0.0, 13.7, 100.0, 250.25, 333.3, 640.0, 999.9, 1279.5, 1500.0] {
            assert_eq!(reloaded.boundary_y(x), original.boundary_y(x), "x={}", x);
        }
    }

    #[test]
    fn test_load_accepts_drawing_tool_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"boundary_points": [[100, 400], [500, 420]], "method": "HOUGH"}"#)
            .unwrap();
        let m = BoundaryModel::load(&path).unwrap();
        assert_eq!(m.method(), BoundaryMethod::Hough);
        assert_eq!(m.threshold(), DEFAULT_THRESHOLD_PX);
    }

    #[test]
    fn test_load_malformed_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"points": []}"#).unwrap();
        assert!(matches!(
            BoundaryModel::load(&path),
            Err(WatchError::BoundaryInvalid(_))
        ));
        assert!(BoundaryModel::load(dir.path().join("missing.json")).is_err());
    }
}
