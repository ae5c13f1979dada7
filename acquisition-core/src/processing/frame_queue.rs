use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::frame::Frame;

/// Fixed-capacity circular buffer of frames.
///
/// Overflow behavior: drops the oldest frame. Not synchronized; `FrameQueue`
/// wraps it for cross-thread access.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<Option<Frame>>,
    write_index: usize,
    read_index: usize,
    available: usize,
    dropped: u64,
}

impl FrameRing {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            write_index: 0,
            read_index: 0,
            available: 0,
            dropped: 0,
        }
    }

    /// Append a frame, returning the oldest frame if it had to be dropped.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let capacity = self.capacity();
        let mut evicted = None;
        if self.available == capacity {
            evicted = self.slots[self.read_index].take();
            self.read_index = (self.read_index + 1) % capacity;
            self.available -= 1;
            self.dropped += 1;
        }

        self.slots[self.write_index] = Some(frame);
        self.write_index = (self.write_index + 1) % capacity;
        self.available += 1;
        evicted
    }

    /// Remove and return the oldest frame.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.available == 0 {
            return None;
        }
        let frame = self.slots[self.read_index].take();
        self.read_index = (self.read_index + 1) % self.capacity();
        self.available -= 1;
        frame
    }

    /// Change the capacity, keeping the newest frames.
    ///
    /// Returns the frames that no longer fit, oldest first.
    pub fn resize(&mut self, capacity: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(self.available);
        while let Some(frame) = self.pop() {
            frames.push(frame);
        }

        let dropped = self.dropped;
        *self = Self::new(capacity);

        let overflow = frames.len().saturating_sub(self.capacity());
        let kept = frames.split_off(overflow);
        for frame in kept {
            self.push(frame);
        }
        self.dropped = dropped + overflow as u64;
        frames
    }

    /// Number of frames currently queued.
    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn is_full(&self) -> bool {
        self.available == self.capacity()
    }

    /// Total number of frames dropped on overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Bounded, drop-oldest frame queue shared between a capture thread and
/// its consumers.
pub struct FrameQueue {
    ring: Mutex<FrameRing>,
    not_empty: Condvar,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(FrameRing::new(capacity)),
            not_empty: Condvar::new(),
        }
    }

    /// Queue a frame. Returns true if the oldest frame was dropped to make room.
    pub fn push(&self, frame: Frame) -> bool {
        let evicted = self.ring.lock().push(frame);
        self.not_empty.notify_one();
        if let Some(old) = &evicted {
            log::debug!(
                "frame queue full, dropped frame {}",
                old.sequence_number()
            );
        }
        evicted.is_some()
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.ring.lock().pop()
    }

    /// Pop the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.ring.lock();
        loop {
            if let Some(frame) = ring.pop() {
                return Some(frame);
            }
            if self.not_empty.wait_until(&mut ring, deadline).timed_out() {
                return ring.pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    /// Resize the queue; frames that no longer fit are dropped oldest first.
    pub fn set_capacity(&self, capacity: usize) -> usize {
        let dropped = self.ring.lock().resize(capacity);
        dropped.len()
    }

    pub fn dropped(&self) -> u64 {
        self.ring.lock().dropped()
    }

    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}
