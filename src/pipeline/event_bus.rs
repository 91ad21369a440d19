// src/pipeline/event_bus.rs
//
// Decoupled event system. The pipeline publishes what happened on each
// frame; the driver (CLI, UI) drains and reacts without reaching into
// pipeline state.

use crate::analysis::identity_tracker::MatchRule;
use crate::types::{IdentityId, Side, ViolationEvent};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    IdentityCreated {
        id: IdentityId,
        frame_index: u64,
    },

    IdentityBound {
        id: IdentityId,
        created: bool,
        frame_index: u64,
    },

    IdentityLost {
        id: IdentityId,
        frame_index: u64,
        violations: u32,
    },

    IdentityPurged {
        id: IdentityId,
        frame_index: u64,
    },

    ViolationLogged(ViolationEvent),

    IdentityEliminated {
        id: IdentityId,
        frame_index: u64,
        violations: u32,
    },

    /// A side re-armed after its cooldown
    EpisodeEnded {
        id: IdentityId,
        side: Side,
        frame_index: u64,
    },

    /// A detection was matched by a fallback rule rather than its track id
    IdentityRecovered {
        id: IdentityId,
        rule: MatchRule,
        frame_index: u64,
    },
}

pub struct EventBus {
    events: VecDeque<PipelineEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending: max_pending.max(1),
        }
    }

    pub fn publish(&mut self, event: PipelineEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}
