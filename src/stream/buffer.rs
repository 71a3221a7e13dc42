//! Bounded, newest-first buffer of live-feed events.

use std::collections::VecDeque;

use crate::types::Event;

/// A bounded buffer of recent events, newest at the front.
///
/// When a push exceeds capacity the oldest event (the tail) is evicted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        EventBuffer {
            events: VecDeque::with_capacity(capacity.min(1024) + 1),
            capacity,
        }
    }

    /// Prepend an event, returning the evicted one if the buffer was full.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        self.events.push_front(event);
        if self.events.len() > self.capacity {
            self.events.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently received event
    pub fn newest(&self) -> Option<&Event> {
        self.events.front()
    }

    /// Events newest first
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Owned copy, newest first
    pub fn to_vec(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}
