use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::config::{validate_queue_limits, DropBehavior};
use crate::models::error::AcquisitionError;
use crate::models::pipeline_result::PipelineResult;

/// Capacity limits of the worker output queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Absolute capacity.
    pub hard: usize,
    /// Above this usage results are released in arrival order.
    pub soft: usize,
}

/// What happened to a result handed to `ResultQueue::push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest results.
    QueuedAfterEviction,
    /// Rejected because the queue is shutting down.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    pub evicted: u64,
    /// Results released after a higher sequence number had already gone out.
    pub out_of_order: u64,
}

struct Entry {
    arrival: u64,
    result: PipelineResult,
}

struct Inner {
    entries: VecDeque<Entry>,
    // sequence number -> frames with that number still being processed
    in_flight: BTreeMap<u64, usize>,
    limits: QueueLimits,
    drop_behavior: DropBehavior,
    keep_out_of_sequence: bool,
    highest_released: Option<u64>,
    next_arrival: u64,
    counters: QueueCounters,
    closed: bool,
}

impl Inner {
    fn in_arrival_order(&self) -> bool {
        let used = self.entries.len();
        self.keep_out_of_sequence || used > self.limits.soft || used >= self.limits.hard
    }

    /// Index of the entry that may be released now, if any.
    fn candidate(&self) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        if self.in_arrival_order() {
            return Some(0);
        }

        let (index, entry) = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| (entry.result.sequence_number(), entry.arrival))?;

        // a lower sequence number is still being processed
        let sequence_number = entry.result.sequence_number();
        if self.in_flight.range(..sequence_number).next().is_some() {
            return None;
        }
        Some(index)
    }

    fn release(&mut self, index: usize) -> Option<PipelineResult> {
        let entry = self.entries.remove(index)?;
        let sequence_number = entry.result.sequence_number();

        match self.highest_released {
            Some(highest) if sequence_number < highest => {
                log::debug!(
                    "released result {} after {}",
                    sequence_number,
                    highest
                );
                self.counters.out_of_order += 1;
            }
            _ => self.highest_released = Some(sequence_number),
        }
        Some(entry.result)
    }

    fn finish_in_flight(&mut self, sequence_number: u64) {
        if let Some(count) = self.in_flight.get_mut(&sequence_number) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&sequence_number);
            }
        }
    }
}

/// Bounded output queue of the worker.
///
/// All state lives behind one lock. Producers register the sequence number
/// of a frame with `claim` when they take it from the source, then hand the
/// finished result to `push` (or call `abandon`). While usage stays at or
/// below the soft limit a result is only released once no lower sequence
/// number is still in flight, so delivery is non-decreasing. Above it results
/// leave in arrival order. Nothing is ever dropped except by `DropOldest`
/// eviction.
pub struct ResultQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    not_full: Condvar,
}

impl ResultQueue {
    pub fn new(
        limits: QueueLimits,
        drop_behavior: DropBehavior,
        keep_out_of_sequence: bool,
    ) -> Result<Self, AcquisitionError> {
        validate_queue_limits(limits.hard, limits.soft).map_err(AcquisitionError::ConfigurationFailed)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(limits.hard),
                in_flight: BTreeMap::new(),
                limits,
                drop_behavior,
                keep_out_of_sequence,
                highest_released: None,
                next_arrival: 0,
                counters: QueueCounters::default(),
                closed: false,
            }),
            ready: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Take an item with `take` and mark its sequence number in flight, under
    /// the queue lock so no result can be released past it in between.
    pub fn claim<T>(
        &self,
        take: impl FnOnce() -> Option<T>,
        sequence_number: impl FnOnce(&T) -> u64,
    ) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let item = take()?;
        *inner.in_flight.entry(sequence_number(&item)).or_insert(0) += 1;
        Some(item)
    }

    /// Forget a claimed sequence number that will never produce a result.
    pub fn abandon(&self, sequence_number: u64) {
        self.inner.lock().finish_in_flight(sequence_number);
        self.ready.notify_all();
    }

    /// Queue a finished result.
    ///
    /// When the queue is at its hard limit this evicts the oldest results
    /// until there is room (`DropOldest`) or blocks until the caller drains
    /// one (`Block`).
    pub fn push(&self, result: PipelineResult) -> PushOutcome {
        let sequence_number = result.sequence_number();
        let mut inner = self.inner.lock();

        let outcome = loop {
            if inner.closed {
                break PushOutcome::Closed;
            }
            if inner.entries.len() < inner.limits.hard {
                break PushOutcome::Queued;
            }
            if inner.drop_behavior.can_drop() {
                // a lowered hard limit can leave more than one result over
                while inner.entries.len() >= inner.limits.hard {
                    let Some(evicted) = inner.entries.pop_front() else {
                        break;
                    };
                    log::debug!(
                        "result queue full, evicted result {}",
                        evicted.result.sequence_number()
                    );
                    inner.counters.evicted += 1;
                }
                break PushOutcome::QueuedAfterEviction;
            }
            self.not_full.wait(&mut inner);
        };

        inner.finish_in_flight(sequence_number);
        if matches!(outcome, PushOutcome::Queued | PushOutcome::QueuedAfterEviction) {
            let arrival = inner.next_arrival;
            inner.next_arrival += 1;
            inner.entries.push_back(Entry { arrival, result });
        }
        drop(inner);

        self.ready.notify_all();
        outcome
    }

    /// Whether `pop` would return a result right now.
    pub fn has_next(&self) -> bool {
        self.inner.lock().candidate().is_some()
    }

    /// Non-blocking pop of the next releasable result.
    pub fn pop(&self) -> Option<PipelineResult> {
        let result = {
            let mut inner = self.inner.lock();
            let index = inner.candidate()?;
            inner.release(index)
        };
        self.not_full.notify_all();
        result
    }

    /// Pop the next releasable result, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or once the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PipelineResult> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        let result = loop {
            if let Some(index) = inner.candidate() {
                break inner.release(index);
            }
            if inner.closed {
                break None;
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                break inner.candidate().and_then(|index| inner.release(index));
            }
        };
        drop(inner);

        if result.is_some() {
            self.not_full.notify_all();
        }
        result
    }

    /// Number of results currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Number of claimed frames that have not produced a result yet.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.values().sum()
    }

    pub fn limits(&self) -> QueueLimits {
        self.inner.lock().limits
    }

    /// Replace the limits. Results already queued are kept until the next
    /// push, which evicts down to the new hard limit under `DropOldest`.
    pub fn set_limits(&self, limits: QueueLimits) -> Result<(), AcquisitionError> {
        validate_queue_limits(limits.hard, limits.soft).map_err(AcquisitionError::ConfigurationFailed)?;
        self.inner.lock().limits = limits;
        self.not_full.notify_all();
        self.ready.notify_all();
        Ok(())
    }

    pub fn drop_behavior(&self) -> DropBehavior {
        self.inner.lock().drop_behavior
    }

    pub fn set_drop_behavior(&self, drop_behavior: DropBehavior) {
        self.inner.lock().drop_behavior = drop_behavior;
        self.not_full.notify_all();
    }

    pub fn counters(&self) -> QueueCounters {
        self.inner.lock().counters
    }

    /// Reject further results and wake every blocked producer and consumer.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_full.notify_all();
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::models::frame::Frame;

    fn queue(hard: usize, soft: usize, drop: DropBehavior, keep: bool) -> ResultQueue {
        ResultQueue::new(QueueLimits { hard, soft }, drop, keep).unwrap()
    }

    fn result(seq: u64) -> PipelineResult {
        PipelineResult::completed(Frame::new(seq, vec![]), None)
    }

    fn claim(queue: &ResultQueue, seq: u64) {
        assert_eq!(queue.claim(|| Some(seq), |s| *s), Some(seq));
    }

    fn drain(queue: &ResultQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.pop())
            .map(|r| r.sequence_number())
            .collect()
    }

    #[test]
    fn invalid_limits_are_rejected() {
        let err = ResultQueue::new(QueueLimits { hard: 3, soft: 4 }, DropBehavior::Block, false)
            .err()
            .unwrap();
        assert!(matches!(err, AcquisitionError::ConfigurationFailed(_)));

        let queue = queue(5, 3, DropBehavior::Block, false);
        assert!(queue.set_limits(QueueLimits { hard: 0, soft: 0 }).is_err());
        assert_eq!(queue.limits(), QueueLimits { hard: 5, soft: 3 });
    }

    #[test]
    fn empty_pop_is_benign() {
        let queue = queue(5, 3, DropBehavior::Block, false);
        assert!(!queue.has_next());
        assert!(queue.pop().is_none());
        assert!(queue.pop().is_none());
        assert_eq!(queue.counters(), QueueCounters::default());
    }

    #[test]
    fn reorders_below_soft_limit() {
        let queue = queue(10, 8, DropBehavior::Block, false);
        for seq in [1, 2, 3] {
            claim(&queue, seq);
        }

        queue.push(result(3));
        queue.push(result(2));
        // 1 is still in flight, nothing may overtake it
        assert!(!queue.has_next());

        queue.push(result(1));
        assert_eq!(drain(&queue), vec![1, 2, 3]);
    }

    #[test]
    fn abandoned_claim_unblocks_release() {
        let queue = queue(10, 8, DropBehavior::Block, false);
        claim(&queue, 1);
        claim(&queue, 2);
        queue.push(result(2));
        assert!(queue.pop().is_none());

        queue.abandon(1);
        assert_eq!(drain(&queue), vec![2]);
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn late_lower_sequence_is_still_delivered() {
        let queue = queue(10, 8, DropBehavior::Block, false);
        queue.push(result(5));
        assert_eq!(drain(&queue), vec![5]);

        assert_eq!(queue.push(result(4)), PushOutcome::Queued);
        assert_eq!(queue.push(result(6)), PushOutcome::Queued);
        assert_eq!(drain(&queue), vec![4, 6]);
        assert_eq!(queue.counters().out_of_order, 1);
    }

    #[test]
    fn keep_out_of_sequence_delivers_arrival_order() {
        let queue = queue(10, 8, DropBehavior::Block, true);
        claim(&queue, 1);
        for seq in [4, 2, 3] {
            queue.push(result(seq));
        }
        queue.push(result(1));

        assert_eq!(drain(&queue), vec![4, 2, 3, 1]);
        assert_eq!(queue.counters().out_of_order, 3);
    }

    #[test]
    fn above_soft_limit_releases_in_arrival_order() {
        let queue = queue(10, 2, DropBehavior::Block, false);
        claim(&queue, 1);
        for seq in [4, 3, 2] {
            queue.push(result(seq));
        }

        // usage 3 > soft 2: the oldest arrival goes first despite 1 in flight
        assert_eq!(queue.pop().map(|r| r.sequence_number()), Some(4));
        // back at the soft limit, the rest wait for 1
        assert!(!queue.has_next());

        // 1 lifts usage over soft again, so 3 leaves first
        queue.push(result(1));
        assert_eq!(drain(&queue), vec![3, 1, 2]);
        assert_eq!(queue.counters().out_of_order, 3);
        assert_eq!(queue.counters().evicted, 0);
    }

    #[test]
    fn drop_oldest_caps_at_hard_limit() {
        let queue = queue(5, 3, DropBehavior::DropOldest, false);
        for seq in 0..10 {
            let outcome = queue.push(result(seq));
            assert!(queue.len() <= 5);
            if seq >= 5 {
                assert_eq!(outcome, PushOutcome::QueuedAfterEviction);
            }
        }

        assert_eq!(queue.len(), 5);
        assert_eq!(queue.counters().evicted, 5);
        assert_eq!(drain(&queue), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn shrinking_hard_limit_evicts_on_next_push() {
        let queue = queue(6, 6, DropBehavior::DropOldest, true);
        for seq in 0..6 {
            queue.push(result(seq));
        }

        queue.set_limits(QueueLimits { hard: 3, soft: 3 }).unwrap();
        assert_eq!(queue.len(), 6);

        assert_eq!(queue.push(result(6)), PushOutcome::QueuedAfterEviction);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.counters().evicted, 4);

        for seq in 7..50 {
            queue.push(result(seq));
            assert!(queue.len() <= 3);
        }
        assert_eq!(drain(&queue), vec![47, 48, 49]);
    }

    #[test]
    fn shrinking_hard_limit_blocks_until_below() {
        let queue = Arc::new(queue(4, 4, DropBehavior::Block, true));
        for seq in 0..4 {
            queue.push(result(seq));
        }
        queue.set_limits(QueueLimits { hard: 2, soft: 2 }).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(result(4)))
        };
        queue.pop();
        queue.pop();
        thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished());

        queue.pop();
        assert_eq!(producer.join().unwrap(), PushOutcome::Queued);
        assert_eq!(drain(&queue), vec![3, 4]);
    }

    #[test]
    fn blocking_queue_delivers_everything_out_of_order() {
        let queue = queue(10, 2, DropBehavior::Block, false);
        for seq in [4, 3, 2] {
            queue.push(result(seq));
        }

        let mut drained = drain(&queue);
        assert_eq!(drained.len(), 3);
        drained.sort_unstable();
        assert_eq!(drained, vec![2, 3, 4]);
        assert_eq!(queue.counters().evicted, 0);
    }

    #[test]
    fn block_waits_for_drain() {
        let queue = Arc::new(queue(2, 2, DropBehavior::Block, false));
        queue.push(result(0));
        queue.push(result(1));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(result(2)))
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().map(|r| r.sequence_number()), Some(0));
        assert_eq!(producer.join().unwrap(), PushOutcome::Queued);
        assert_eq!(drain(&queue), vec![1, 2]);
        assert_eq!(queue.counters().evicted, 0);
    }

    #[test]
    fn switching_to_drop_unblocks_producer() {
        let queue = Arc::new(queue(1, 1, DropBehavior::Block, false));
        queue.push(result(0));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(result(1)))
        };
        thread::sleep(Duration::from_millis(20));

        queue.set_drop_behavior(DropBehavior::DropOldest);
        assert_eq!(producer.join().unwrap(), PushOutcome::QueuedAfterEviction);
        assert_eq!(drain(&queue), vec![1]);
    }

    #[test]
    fn close_releases_blocked_producer() {
        let queue = Arc::new(queue(1, 1, DropBehavior::Block, false));
        queue.push(result(0));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(result(1)))
        };
        thread::sleep(Duration::from_millis(20));

        queue.close();
        assert_eq!(producer.join().unwrap(), PushOutcome::Closed);
        assert!(queue.claim(|| Some(5u64), |s| *s).is_none());
    }

    #[test]
    fn pop_timeout_waits_for_push() {
        let queue = Arc::new(queue(4, 4, DropBehavior::Block, false));
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(result(7));
            })
        };

        let popped = queue.pop_timeout(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(popped.map(|r| r.sequence_number()), Some(7));
    }

    #[test]
    fn concurrent_producers_never_exceed_hard_limit() {
        let queue = Arc::new(queue(5, 3, DropBehavior::DropOldest, true));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..50 {
                        queue.push(result(p * 1000 + i));
                        assert!(queue.len() <= 5);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.counters().evicted, 195);
    }
}
