// src/evidence/frame_ring.rs
//
// Frame retention for evidence clips.
//
// Every frame on which an identity is visible is kept in that identity's
// pre-roll ring whether or not anything is happening, so a clip opened on a
// crossing already has leading context. Frames are shared (`Arc`) between
// rings and episodes; nothing is copied per identity.

use crate::types::{EvidenceRefs, Frame, IdentityId, Side, ViolationEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

// ============================================================================
// PRE-ROLL RINGS
// ============================================================================

pub struct PrerollRings {
    capacity: usize,
    rings: HashMap<IdentityId, VecDeque<Arc<Frame>>>,
}

impl PrerollRings {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: HashMap::new(),
        }
    }

    pub fn push(&mut self, frame: &Arc<Frame>, visible: &[IdentityId]) {
        for id in visible {
            let ring = self
                .rings
                .entry(*id)
                .or_insert_with(|| VecDeque::with_capacity(self.capacity));
            ring.push_back(Arc::clone(frame));
            while ring.len() > self.capacity {
                ring.pop_front();
            }
        }
    }

    pub fn snapshot(&self, id: IdentityId) -> Vec<Arc<Frame>> {
        self.rings
            .get(&id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn release(&mut self, id: IdentityId) {
        self.rings.remove(&id);
    }

    pub fn clear(&mut self) {
        self.rings.clear();
    }

    pub fn len(&self, id: IdentityId) -> usize {
        self.rings.get(&id).map(|r| r.len()).unwrap_or(0)
    }
}

// ============================================================================
// CAPTURE EPISODE
// ============================================================================

/// One open clip: pre-roll plus everything after the trigger until the side
/// re-arms, the identity disappears, or the capture cap is hit.
pub struct Episode {
    pub event: ViolationEvent,
    pub refs: EvidenceRefs,
    frames: Vec<Arc<Frame>>,
    trigger_index: u64,
    after_trigger: usize,
    max_after_trigger: usize,
}

impl Episode {
    pub fn open(
        event: ViolationEvent,
        refs: EvidenceRefs,
        preroll: Vec<Arc<Frame>>,
        max_after_trigger: usize,
    ) -> Self {
        let trigger_index = event.frame_index;
        let after_trigger = preroll.iter().filter(|f| f.index > trigger_index).count();
        Self {
            event,
            refs,
            frames: preroll,
            trigger_index,
            after_trigger,
            max_after_trigger: max_after_trigger.max(1),
        }
    }

    pub fn key(&self) -> (IdentityId, Side) {
        (self.event.identity_id, self.event.side)
    }

    /// Append a frame. Returns true once the capture cap has been reached.
    pub fn push(&mut self, frame: &Arc<Frame>) -> bool {
        if self.is_full() {
            return true;
        }
        if self.frames.last().map(|f| f.index >= frame.index).unwrap_or(false) {
            // Already holding this frame from the pre-roll snapshot
            return false;
        }
        self.frames.push(Arc::clone(frame));
        if frame.index > self.trigger_index {
            self.after_trigger += 1;
        }
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.after_trigger >= self.max_after_trigger
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Arc<Frame>> {
        self.frames
    }

    pub fn first_timestamp_ms(&self) -> Option<f64> {
        self.frames.first().map(|f| f.timestamp_ms)
    }

    pub fn last_timestamp_ms(&self) -> Option<f64> {
        self.frames.last().map(|f| f.timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactSource, Point};
    use std::path::PathBuf;

    fn frame(index: u64) -> Arc<Frame> {
        Arc::new(Frame {
            index,
            timestamp_ms: index as f64 * 33.0,
            width: 2,
            height: 2,
            rgb: vec![0; 12],
        })
    }

    fn event(frame_index: u64) -> ViolationEvent {
        ViolationEvent {
            identity_id: 4,
            side: Side::Right,
            frame_index,
            timestamp_ms: frame_index as f64 * 33.0,
            session_time_s: frame_index as f64 / 30.0,
            position: Point::new(10.0, 20.0),
            source: ContactSource::Heel,
            violation_number: 1,
            evidence: None,
        }
    }

    fn refs() -> EvidenceRefs {
        EvidenceRefs {
            still_path: PathBuf::from("still.jpg"),
            clip_path: PathBuf::from("clip"),
        }
    }

    #[test]
    fn test_ring_keeps_only_visible_frames_up_to_capacity() {
        let mut rings = PrerollRings::new(3);
        for i in 0..5 {
            let visible: &[IdentityId] = if i == 2 { &[1] } else { &[1, 2] };
            rings.push(&frame(i), visible);
        }
        let ids: Vec<u64> = rings.snapshot(1).iter().map(|f| f.index).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        let ids: Vec<u64> = rings.snapshot(2).iter().map(|f| f.index).collect();
        assert_eq!(ids, vec![1, 3, 4]);

        rings.release(1);
        assert!(rings.snapshot(1).is_empty());
        assert_eq!(rings.len(2), 3);
    }

    #[test]
    fn test_episode_starts_with_preroll_and_caps_after_trigger() {
        let preroll: Vec<Arc<Frame>> = (8..=10).map(frame).collect();
        let mut ep = Episode::open(event(10), refs(), preroll, 2);
        assert_eq!(ep.frames().len(), 3);

        // Trigger frame arriving again is not duplicated
        assert!(!ep.push(&frame(10)));
        assert_eq!(ep.frames().len(), 3);

        assert!(!ep.push(&frame(11)));
        assert!(ep.push(&frame(12)));
        assert!(ep.push(&frame(13)));
        let ids: Vec<u64> = ep.frames().iter().map(|f| f.index).collect();
        assert_eq!(ids, vec![8, 9, 10, 11, 12]);
        assert_eq!(ep.first_timestamp_ms(), Some(8.0 * 33.0));
    }
}
