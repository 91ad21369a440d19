// src/analysis/motion.rs
//
// Constant-velocity Kalman filter over an identity's centroid.
// State is [x, y, vx, vy] in pixels and pixels/frame; the measurement is [x, y].
// The tracker predicts once per frame for every identity and corrects with
// the matched detection, so position matching compares against where the
// subject should be now rather than where it was last seen.

use crate::types::Point;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MotionModel {
    x: Vector4<f32>,
    p: Matrix4<f32>,
    f: Matrix4<f32>,
    h: Matrix2x4<f32>,
    q: Matrix4<f32>,
    r: Matrix2<f32>,
}

impl MotionModel {
    pub fn new(initial: Point, process_noise: f32, measurement_noise: f32) -> Self {
        #[rustfmt::skip]
        let f = Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        #[rustfmt::skip]
        let h = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );
        Self {
            x: Vector4::new(initial.x, initial.y, 0.0, 0.0),
            p: Matrix4::identity(),
            f,
            h,
            q: Matrix4::identity() * process_noise,
            r: Matrix2::identity() * measurement_noise,
        }
    }

    /// Advance one frame.
    pub fn predict(&mut self) {
        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;
    }

    /// Correct with an observed centroid.
    pub fn correct(&mut self, measured: Point) {
        let z = Vector2::new(measured.x, measured.y);
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            // Degenerate covariance: restart from the measurement
            debug!("Motion model reset at ({:.0}, {:.0})", measured.x, measured.y);
            self.x = Vector4::new(measured.x, measured.y, 0.0, 0.0);
            self.p = Matrix4::identity();
            return;
        };
        let k = self.p * self.h.transpose() * s_inv;
        self.x += k * y;
        self.p = (Matrix4::identity() - k * self.h) * self.p;
    }

    pub fn position(&self) -> Point {
        Point::new(self.x[0], self.x[1])
    }

    /// Estimated velocity in pixels per frame.
    pub fn velocity(&self) -> Point {
        Point::new(self.x[2], self.x[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learns_constant_velocity() {
        let mut m = MotionModel::new(Point::new(0.0, 100.0), 0.03, 0.1);
        for k in 1..10 {
            m.predict();
            m.correct(Point::new(k as f32 * 200.0, 100.0));
        }
        assert!((m.velocity().x - 200.0).abs() < 5.0);
        assert!(m.velocity().y.abs() < 1.0);

        m.predict();
        assert!((m.position().x - 2000.0).abs() < 10.0);
    }

    #[test]
    fn test_stationary_subject_stays_put() {
        let mut m = MotionModel::new(Point::new(320.0, 240.0), 0.03, 0.1);
        for _ in 0..5 {
            m.predict();
            m.correct(Point::new(320.0, 240.0));
        }
        m.predict();
        assert!(m.position().distance(&Point::new(320.0, 240.0)) < 0.5);
    }
}
