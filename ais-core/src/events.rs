//! Outbound change events and the bounded queues that carry them.
//!
//! Both the event queue and the hub's raw-message ring drop their oldest
//! entry to admit a new one; producers never wait on consumers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

use crate::contacts::{ContactView, IdentificationRecord, OwnPosition, RemarkEntry};
use crate::types::Mmsi;

/// Default capacity of the outbound event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Change events (output)
// ---------------------------------------------------------------------------

/// Events for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// Contact became visible.
    Insert(ContactView),
    /// Visible contact changed.
    Update(ContactView),
    /// Contact has not been heard for the grey threshold.
    Old { mmsi: Mmsi, distance: Option<f64> },
    /// Contact evicted.
    Remove { mmsi: Mmsi },
    OwnPosition(OwnPosition),
    /// Response to an explicit lookup.
    Query(ContactView),
    #[serde(rename = "remarkdict")]
    RemarkDict { remarks: BTreeMap<Mmsi, RemarkEntry> },
    #[serde(rename = "iddb")]
    IdDb { records: Vec<IdentificationRecord> },
    Error { message: String },
}

impl ChangeEvent {
    /// MMSI the event concerns, if any.
    pub fn mmsi(&self) -> Option<Mmsi> {
        match self {
            ChangeEvent::Insert(c) | ChangeEvent::Update(c) | ChangeEvent::Query(c) => {
                Some(c.mmsi)
            }
            ChangeEvent::Old { mmsi, .. } | ChangeEvent::Remove { mmsi } => Some(*mmsi),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Bounded drop-oldest queue
// ---------------------------------------------------------------------------

/// FIFO with a fixed capacity that evicts its oldest entry when full.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BoundedQueue {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append `item`. Returns true if the oldest entry was evicted to make room.
    pub fn push(&mut self, item: T) -> bool {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.dropped += 1;
            true
        } else {
            false
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// ---------------------------------------------------------------------------
// Event dispatcher
// ---------------------------------------------------------------------------

/// Shared outbound queue between the contact store and one consumer.
#[derive(Debug)]
pub struct EventDispatcher {
    queue: Mutex<BoundedQueue<ChangeEvent>>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        EventDispatcher {
            queue: Mutex::new(BoundedQueue::new(capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoundedQueue<ChangeEvent>> {
        // A panicking holder cannot leave the queue half-updated.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an event, dropping the oldest pending one if full.
    pub fn emit(&self, event: ChangeEvent) {
        self.lock().push(event);
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        let mut queue = self.lock();
        for event in events {
            queue.push(event);
        }
    }

    /// Atomically take everything queued.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.lock().drain()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        EventDispatcher::new(EVENT_QUEUE_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
