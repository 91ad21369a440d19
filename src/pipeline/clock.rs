// src/pipeline/clock.rs
//
// Session time for cooldown timers. Fixed for the whole session.

use crate::types::{ClockMode, SessionConfig};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SessionClock {
    mode: ClockMode,
    fps: f64,
    started: Instant,
}

impl SessionClock {
    pub fn new(mode: ClockMode, fps: f64) -> Self {
        Self {
            mode,
            fps,
            started: Instant::now(),
        }
    }

    pub fn from_config(session: &SessionConfig) -> Self {
        Self::new(session.clock, session.fps)
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Seconds since session start for the given frame.
    pub fn now_s(&self, frame_index: u64) -> f64 {
        match self.mode {
            ClockMode::Frame => frame_index as f64 / self.fps,
            ClockMode::Wall => self.started.elapsed().as_secs_f64(),
        }
    }
}
