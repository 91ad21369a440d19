// src/evidence/handoff.rs
//
// Bounded hand-off between the synchronous frame pipeline and the recorder
// worker. The producer never blocks and never fails: when the queue is at
// depth, the oldest evictable item is discarded to make room (oldest item of
// any kind if nothing is evictable). The consumer drains in batches.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct Handoff<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    depth: usize,
    evictable: fn(&T) -> bool,
}

impl<T> Handoff<T> {
    pub fn new(depth: usize, evictable: fn(&T) -> bool) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(depth.max(1)),
                closed: false,
            }),
            notify: Notify::new(),
            depth: depth.max(1),
            evictable,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue without blocking. Returns the item evicted to make room, or
    /// the rejected item itself once the queue has been closed.
    pub fn push(&self, item: T) -> Option<T> {
        let dropped = {
            let mut state = self.lock();
            if state.closed {
                return Some(item);
            }
            let dropped = if state.items.len() >= self.depth {
                let evict_at = state
                    .items
                    .iter()
                    .position(|queued| (self.evictable)(queued))
                    .unwrap_or(0);
                state.items.remove(evict_at)
            } else {
                None
            };
            state.items.push_back(item);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Wait for at least one item and take everything queued.
    /// Returns None once closed and empty.
    pub async fn next_batch(&self) -> Option<Vec<T>> {
        loop {
            {
                let mut state = self.lock();
                if !state.items.is_empty() {
                    return Some(state.items.drain(..).collect());
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting items. Already-queued items are still delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
