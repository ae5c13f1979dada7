use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::AcquisitionError;
use crate::models::frame::Frame;
use crate::models::parameter::{ParameterKey, ParameterValue};
use crate::models::pipeline_result::ReplayProgress;
use crate::models::recording::{RecordedFrame, Recording};
use crate::models::state::{ComponentInfo, HardwareState};
use crate::traits::hardware_link::HardwareLink;

struct Cursor {
    position: usize,
    pass: u64,
}

/// Hardware link that plays back a recording as if it were a live camera.
///
/// Dropped placeholders are skipped. With `looping` the recording restarts
/// after its last frame and sequence numbers keep increasing across passes.
/// Parameter writes are accepted and ignored.
pub struct ReplayLink {
    frames: Vec<Frame>,
    span: u64,
    looping: bool,
    cursor: Mutex<Cursor>,
}

impl ReplayLink {
    pub fn new(recording: Recording, looping: bool) -> Self {
        let span = recording.sequence_span();
        let frames = recording
            .frames
            .into_iter()
            .filter_map(|entry| match entry {
                RecordedFrame::Captured(frame) => Some(frame),
                RecordedFrame::Dropped { .. } => None,
            })
            .collect();
        Self {
            frames,
            span,
            looping,
            cursor: Mutex::new(Cursor { position: 0, pass: 0 }),
        }
    }

    /// Whether `acquire` would return a frame.
    pub fn has_remaining(&self) -> bool {
        let cursor = self.cursor.lock();
        !self.frames.is_empty() && (self.looping || cursor.position < self.frames.len())
    }

    pub fn rewind(&self) {
        *self.cursor.lock() = Cursor { position: 0, pass: 0 };
    }
}

impl HardwareLink for ReplayLink {
    fn state(&self) -> HardwareState {
        HardwareState::Online
    }

    fn component_count(&self) -> usize {
        1
    }

    fn component_info(&self, id: usize) -> Result<ComponentInfo, AcquisitionError> {
        if id != 0 {
            return Err(AcquisitionError::ComponentNotFound(id));
        }
        Ok(ComponentInfo {
            display_name: "replay".into(),
            sensor_info: "recorded session".into(),
            user_field: String::new(),
            pixel_format: String::new(),
        })
    }

    fn component_online(&self, id: usize) -> Result<bool, AcquisitionError> {
        if id != 0 {
            return Err(AcquisitionError::ComponentNotFound(id));
        }
        Ok(true)
    }

    fn write_parameter(&self, _key: ParameterKey, _value: ParameterValue) -> Result<(), AcquisitionError> {
        Ok(())
    }

    fn acquire(&self) -> Result<Option<Frame>, AcquisitionError> {
        let mut cursor = self.cursor.lock();
        if self.frames.is_empty() {
            return Ok(None);
        }
        if cursor.position >= self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            cursor.position = 0;
            cursor.pass += 1;
        }

        let mut frame = self.frames[cursor.position].clone();
        cursor.position += 1;
        frame.metadata.id = uuid::Uuid::new_v4();
        frame.metadata.sequence_number += cursor.pass * self.span;
        Ok(Some(frame))
    }
}

/// State of one bulk replay running on a worker.
pub(crate) struct ReplayJob {
    entries: Mutex<std::vec::IntoIter<RecordedFrame>>,
    total: usize,
    delivered: Mutex<usize>,
    finished: Condvar,
    cancelled: AtomicBool,
}

impl ReplayJob {
    pub(crate) fn new(recording: Recording, skip_dropped: bool) -> Self {
        let entries: Vec<RecordedFrame> = recording
            .frames
            .into_iter()
            .filter(|entry| !(skip_dropped && entry.is_dropped()))
            .collect();
        Self {
            total: entries.len(),
            entries: Mutex::new(entries.into_iter()),
            delivered: Mutex::new(0),
            finished: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Next entry to feed through the pipeline.
    pub(crate) fn take(&self) -> Option<RecordedFrame> {
        if self.is_cancelled() {
            return None;
        }
        self.entries.lock().next()
    }

    pub(crate) fn record_delivery(&self) {
        let mut delivered = self.delivered.lock();
        *delivered += 1;
        if *delivered >= self.total {
            self.finished.notify_all();
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _delivered = self.delivered.lock();
        self.finished.notify_all();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.is_cancelled() || *self.delivered.lock() >= self.total
    }

    pub(crate) fn progress(&self) -> ReplayProgress {
        ReplayProgress {
            frames_delivered: *self.delivered.lock(),
            frames_total: self.total,
        }
    }

    /// Wait until every entry is delivered or the job is cancelled.
    fn wait_until(&self, deadline: Option<Instant>) -> Result<usize, AcquisitionError> {
        let mut delivered = self.delivered.lock();
        loop {
            if *delivered >= self.total {
                return Ok(*delivered);
            }
            if self.is_cancelled() {
                return Err(AcquisitionError::Cancelled);
            }
            match deadline {
                Some(deadline) => {
                    if self.finished.wait_until(&mut delivered, deadline).timed_out() {
                        if *delivered >= self.total {
                            return Ok(*delivered);
                        }
                        return Err(AcquisitionError::Timeout);
                    }
                }
                None => self.finished.wait(&mut delivered),
            }
        }
    }
}

/// Future-like handle to a replay started with `Worker::replay_session`.
#[derive(Clone)]
pub struct ReplayHandle {
    job: Arc<ReplayJob>,
}

impl ReplayHandle {
    pub(crate) fn new(job: Arc<ReplayJob>) -> Self {
        Self { job }
    }

    /// Block until the replay completes, returning the number of frames
    /// delivered. A cancelled replay yields `Cancelled`.
    pub fn wait(&self) -> Result<usize, AcquisitionError> {
        self.job.wait_until(None)
    }

    /// Like `wait`, giving up with `Timeout` after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<usize, AcquisitionError> {
        self.job.wait_until(Some(Instant::now() + timeout))
    }

    pub fn progress(&self) -> ReplayProgress {
        self.job.progress()
    }

    pub fn is_finished(&self) -> bool {
        self.job.is_finished()
    }

    pub fn cancel(&self) {
        self.job.cancel();
    }
}
