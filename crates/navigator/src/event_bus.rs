use std::collections::VecDeque;

use foundation::{FeatureId, LevelId};
use serde::Serialize;

/// Oldest events are dropped past this many undrained entries.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Opened,
    Selected,
    Leaf,
    Back,
    Home,
    Resolution,
    Failed,
    Orphans,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationEvent {
    pub seq: u64,
    pub kind: EventKind,
    pub level: LevelId,
    pub feature: Option<FeatureId>,
    pub message: String,
}

/// Sequence-numbered trace of what the controller did.
#[derive(Debug)]
pub struct EventBus {
    next_seq: u64,
    capacity: usize,
    events: VecDeque<NavigationEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            capacity: capacity.max(1),
            events: VecDeque::new(),
        }
    }

    pub fn emit(
        &mut self,
        kind: EventKind,
        level: &LevelId,
        feature: Option<&FeatureId>,
        message: impl Into<String>,
    ) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(NavigationEvent {
            seq: self.next_seq,
            kind,
            level: level.clone(),
            feature: feature.cloned(),
            message: message.into(),
        });
        self.next_seq += 1;
    }

    pub fn events(&self) -> impl Iterator<Item = &NavigationEvent> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&NavigationEvent> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<NavigationEvent> {
        self.events.drain(..).collect()
    }
}
