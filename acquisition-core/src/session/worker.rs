use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::models::config::{DropBehavior, WorkerConfig};
use crate::models::error::AcquisitionError;
use crate::models::pipeline_result::{PipelineResult, ReplayProgress, WorkerDiagnostics};
use crate::models::recording::{RecordedFrame, Recording};
use crate::models::state::HardwareState;
use crate::processing::result_queue::{PushOutcome, QueueLimits, ResultQueue};
use crate::session::replay::{ReplayHandle, ReplayJob};
use crate::traits::export_sink::ExportSink;
use crate::traits::frame_source::FrameSource;
use crate::traits::processing_stage::{ProcessingStage, ViewGenerator};

/// Callback for push delivery of worker results.
///
/// Invoked on a worker-owned thread, up to the registered concurrency at once.
pub type ResultCallback = Arc<dyn Fn(PipelineResult) + Send + Sync + 'static>;

/// Snapshot of the swappable stages, taken once per frame.
#[derive(Clone, Default)]
struct Stages {
    source: Option<Arc<dyn FrameSource>>,
    processing: Option<Arc<dyn ProcessingStage>>,
    exporter: Option<Arc<dyn ExportSink>>,
    viewer: Option<Arc<dyn ViewGenerator>>,
}

struct WorkItem {
    entry: RecordedFrame,
    replay: Option<Arc<ReplayJob>>,
}

struct WorkerShared {
    config: WorkerConfig,
    running: AtomicBool,
    stages: RwLock<Stages>,
    results: ResultQueue,
    replay: Mutex<Option<Arc<ReplayJob>>>,
    diagnostics: Mutex<WorkerDiagnostics>,
    push_active: AtomicBool,
    // last link state the source reported while it had nothing to deliver
    idle_link_state: Mutex<Option<HardwareState>>,
}

impl WorkerShared {
    /// Next frame to process: the running replay first, then the source.
    fn take_next(&self) -> Option<WorkItem> {
        {
            let mut replay = self.replay.lock();
            if let Some(job) = replay.as_ref() {
                if let Some(entry) = job.take() {
                    return Some(WorkItem {
                        entry,
                        replay: Some(Arc::clone(job)),
                    });
                }
                if job.is_finished() {
                    *replay = None;
                }
            }
        }

        let source = self.stages.read().source.clone()?;
        if !source.has_next() {
            self.note_idle_link_state(source.link_state());
            return None;
        }
        source.next().map(|frame| WorkItem {
            entry: RecordedFrame::Captured(frame),
            replay: None,
        })
    }

    fn note_idle_link_state(&self, state: HardwareState) {
        let mut last = self.idle_link_state.lock();
        if *last == Some(state) {
            return;
        }
        match state {
            HardwareState::Online => log::info!("source idle, link online"),
            HardwareState::PartiallyOnline => log::warn!("source idle, link partially online"),
            HardwareState::Offline => log::warn!("source idle, link offline"),
        }
        *last = Some(state);
    }

    /// Take one frame, run it through the stages and queue the result.
    ///
    /// Returns false when there was nothing to do.
    fn poll_once(&self) -> bool {
        let Some(item) = self
            .results
            .claim(|| self.take_next(), |item: &WorkItem| item.entry.sequence_number())
        else {
            return false;
        };

        let sequence_number = item.entry.sequence_number();
        let result = self.run_stages(item.entry);
        match self.results.push(result) {
            PushOutcome::Closed => {
                log::debug!("worker stopping, result {} dropped", sequence_number);
            }
            PushOutcome::Queued | PushOutcome::QueuedAfterEviction => {}
        }
        if let Some(job) = item.replay {
            job.record_delivery();
            if job.is_finished() && !job.is_cancelled() {
                log::info!("replay finished, {} frames delivered", job.progress().frames_delivered);
            }
        }
        true
    }

    fn run_stages(&self, entry: RecordedFrame) -> PipelineResult {
        let frame = match entry {
            RecordedFrame::Captured(frame) => frame,
            RecordedFrame::Dropped { sequence_number } => {
                return PipelineResult::failed(sequence_number, AcquisitionError::FrameDropped(sequence_number));
            }
        };
        let sequence_number = frame.sequence_number();
        let stages = self.stages.read().clone();

        let frame = match &stages.processing {
            Some(stage) => match stage.apply(frame) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("processing failed for frame {}: {}", sequence_number, err);
                    self.diagnostics.lock().processing_failures += 1;
                    return PipelineResult::failed(sequence_number, err);
                }
            },
            None => frame,
        };

        let frame = match &stages.exporter {
            Some(sink) => match sink.apply(frame) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("export failed for frame {}: {}", sequence_number, err);
                    self.diagnostics.lock().export_failures += 1;
                    return PipelineResult::failed(sequence_number, err);
                }
            },
            None => frame,
        };

        let view = stages.viewer.as_ref().and_then(|viewer| match viewer.render(&frame) {
            Ok(view) => Some(view),
            Err(err) => {
                log::warn!("no view for frame {}: {}", sequence_number, err);
                None
            }
        });

        self.diagnostics.lock().frames_processed += 1;
        log::debug!("frame {} processed", sequence_number);
        PipelineResult::completed(frame, view)
    }
}

#[derive(Default)]
struct HandoffState {
    pending: Option<PipelineResult>,
    idle: usize,
    stopping: bool,
}

/// Single-slot handoff between the dispatcher and the invocation threads.
///
/// The dispatcher only pops the next result once an invoker has taken the
/// previous one, so invocations start in release order.
#[derive(Default)]
struct Handoff {
    state: Mutex<HandoffState>,
    changed: Condvar,
}

impl Handoff {
    fn stop(&self) {
        self.state.lock().stopping = true;
        self.changed.notify_all();
    }
}

struct CallbackDispatcher {
    running: Arc<AtomicBool>,
    handoff: Arc<Handoff>,
    dispatcher: Option<thread::JoinHandle<()>>,
    invokers: Vec<thread::JoinHandle<()>>,
}

impl CallbackDispatcher {
    fn spawn(shared: &Arc<WorkerShared>, callback: ResultCallback, concurrency: usize) -> Result<Self, AcquisitionError> {
        let mut dispatcher = Self {
            running: Arc::new(AtomicBool::new(true)),
            handoff: Arc::new(Handoff::default()),
            dispatcher: None,
            invokers: Vec::with_capacity(concurrency),
        };

        for index in 0..concurrency {
            let handoff = Arc::clone(&dispatcher.handoff);
            let callback = Arc::clone(&callback);
            let spawned = thread::Builder::new()
                .name(format!("acq-callback-{}", index))
                .spawn(move || invoke_loop(&handoff, &callback));
            match spawned {
                Ok(handle) => dispatcher.invokers.push(handle),
                Err(e) => {
                    dispatcher.shutdown();
                    return Err(AcquisitionError::ThreadSpawn(e.to_string()));
                }
            }
        }

        let shared = Arc::clone(shared);
        let handoff = Arc::clone(&dispatcher.handoff);
        let running = Arc::clone(&dispatcher.running);
        let spawned = thread::Builder::new()
            .name("acq-dispatch".into())
            .spawn(move || dispatch_loop(&shared, &running, &handoff));
        match spawned {
            Ok(handle) => dispatcher.dispatcher = Some(handle),
            Err(e) => {
                dispatcher.shutdown();
                return Err(AcquisitionError::ThreadSpawn(e.to_string()));
            }
        }
        Ok(dispatcher)
    }

    /// Stop dispatching, then wait for every running invocation.
    fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.handoff.changed.notify_all();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        self.handoff.stop();
        for handle in self.invokers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Pipeline coordinator.
///
/// ```text
/// [FrameSource / replay] → poll threads → ProcessingStage → ExportSink
///                                   → ViewGenerator → [ResultQueue] → caller
/// ```
///
/// `worker_count` poll threads share the stages; each frame sees one
/// consistent snapshot of them even if they are swapped meanwhile. Results
/// are drained either by polling (`get_next_result`) or by a registered
/// callback, never both at once. Dropping the worker stops and joins every
/// thread it owns.
pub struct Worker {
    shared: Arc<WorkerShared>,
    poll_threads: Vec<thread::JoinHandle<()>>,
    dispatcher: Mutex<Option<CallbackDispatcher>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Result<Self, AcquisitionError> {
        config.validate().map_err(AcquisitionError::ConfigurationFailed)?;

        let results = ResultQueue::new(
            QueueLimits {
                hard: config.queue_hard_limit,
                soft: config.queue_soft_limit,
            },
            config.drop_behavior(),
            config.keep_out_of_sequence,
        )?;
        let thread_count = config.effective_worker_count();
        let shared = Arc::new(WorkerShared {
            config,
            running: AtomicBool::new(true),
            stages: RwLock::new(Stages::default()),
            results,
            replay: Mutex::new(None),
            diagnostics: Mutex::new(WorkerDiagnostics::default()),
            push_active: AtomicBool::new(false),
            idle_link_state: Mutex::new(None),
        });

        let mut worker = Self {
            shared,
            poll_threads: Vec::with_capacity(thread_count),
            dispatcher: Mutex::new(None),
        };
        for index in 0..thread_count {
            let shared = Arc::clone(&worker.shared);
            let handle = thread::Builder::new()
                .name(format!("acq-worker-{}", index))
                .spawn(move || {
                    let interval = shared.config.poll_interval();
                    while shared.running.load(Ordering::SeqCst) {
                        if !shared.poll_once() {
                            thread::sleep(interval);
                        }
                    }
                })
                .map_err(|e| AcquisitionError::ThreadSpawn(e.to_string()))?;
            worker.poll_threads.push(handle);
        }

        log::info!("worker started with {} poll threads", thread_count);
        Ok(worker)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    pub fn set_source(&self, source: Arc<dyn FrameSource>) {
        self.shared.stages.write().source = Some(source);
    }

    pub fn clear_source(&self) {
        self.shared.stages.write().source = None;
    }

    pub fn set_processing_stage(&self, stage: Arc<dyn ProcessingStage>) {
        self.shared.stages.write().processing = Some(stage);
    }

    pub fn clear_processing_stage(&self) {
        self.shared.stages.write().processing = None;
    }

    pub fn set_exporter(&self, exporter: Arc<dyn ExportSink>) {
        self.shared.stages.write().exporter = Some(exporter);
    }

    pub fn clear_exporter(&self) {
        self.shared.stages.write().exporter = None;
    }

    pub fn set_view_generator(&self, viewer: Arc<dyn ViewGenerator>) {
        self.shared.stages.write().viewer = Some(viewer);
    }

    pub fn clear_view_generator(&self) {
        self.shared.stages.write().viewer = None;
    }

    /// Whether `get_next_result` would return a result now. Always false
    /// while a callback is registered.
    pub fn has_next_result(&self) -> bool {
        !self.shared.push_active.load(Ordering::SeqCst) && self.shared.results.has_next()
    }

    /// Non-blocking pop. `None` is the benign empty read.
    pub fn get_next_result(&self) -> Option<PipelineResult> {
        if self.shared.push_active.load(Ordering::SeqCst) {
            return None;
        }
        self.shared.results.pop()
    }

    /// Results currently held in the output queue.
    pub fn queue_used(&self) -> usize {
        self.shared.results.len()
    }

    pub fn queue_limits(&self) -> QueueLimits {
        self.shared.results.limits()
    }

    /// Change the queue limits for results queued from now on.
    pub fn set_queue_limits(&self, hard: usize, soft: usize) -> Result<(), AcquisitionError> {
        self.shared.results.set_limits(QueueLimits { hard, soft })
    }

    pub fn drop_behavior(&self) -> DropBehavior {
        self.shared.results.drop_behavior()
    }

    pub fn set_drop_behavior(&self, drop_behavior: DropBehavior) {
        self.shared.results.set_drop_behavior(drop_behavior);
    }

    pub fn diagnostics(&self) -> WorkerDiagnostics {
        let counters = self.shared.results.counters();
        WorkerDiagnostics {
            results_evicted: counters.evicted,
            out_of_sequence_delivered: counters.out_of_order,
            ..self.shared.diagnostics.lock().clone()
        }
    }

    /// Link state the source last reported while it had no frame ready.
    pub fn source_link_state(&self) -> Option<HardwareState> {
        *self.shared.idle_link_state.lock()
    }

    /// Switch to push delivery: results are handed to `callback` with up to
    /// `concurrency` invocations in flight, started in release order.
    /// Replaces any previous callback.
    pub fn register_callback(&self, callback: ResultCallback, concurrency: usize) -> Result<(), AcquisitionError> {
        if concurrency == 0 {
            return Err(AcquisitionError::ConfigurationFailed(
                "callback concurrency must be at least 1".into(),
            ));
        }
        self.reset_callback();

        let mut dispatcher = self.dispatcher.lock();
        *dispatcher = Some(CallbackDispatcher::spawn(&self.shared, callback, concurrency)?);
        self.shared.push_active.store(true, Ordering::SeqCst);
        log::info!("result callback registered (concurrency {})", concurrency);
        Ok(())
    }

    /// Remove the callback and return to pull delivery.
    ///
    /// Returns after every in-flight invocation has finished.
    pub fn reset_callback(&self) {
        let Some(dispatcher) = self.dispatcher.lock().take() else {
            return;
        };
        dispatcher.shutdown();
        self.shared.push_active.store(false, Ordering::SeqCst);
        log::info!("result callback removed");
    }

    /// Feed `recording` through the pipeline ahead of the live source.
    ///
    /// With `skip_dropped_frames` the placeholders of dropped frames are
    /// omitted; otherwise each one yields a `FrameDropped` error result and
    /// counts as delivered.
    pub fn replay_session(&self, recording: Recording, skip_dropped_frames: bool) -> Result<ReplayHandle, AcquisitionError> {
        let mut replay = self.shared.replay.lock();
        if replay.as_ref().is_some_and(|job| !job.is_finished()) {
            return Err(AcquisitionError::ConfigurationFailed(
                "a replay is already running".into(),
            ));
        }

        let name = recording.name.clone();
        let job = Arc::new(ReplayJob::new(recording, skip_dropped_frames));
        log::info!(
            "replaying '{}' ({} frames, skip dropped: {})",
            name,
            job.progress().frames_total,
            skip_dropped_frames
        );
        *replay = Some(Arc::clone(&job));
        Ok(ReplayHandle::new(job))
    }

    /// Progress of the current (or last) replay.
    pub fn query_replay_progress(&self) -> Option<ReplayProgress> {
        self.shared.replay.lock().as_ref().map(|job| job.progress())
    }

    /// Stop feeding the current replay. Frames already taken still finish.
    pub fn cancel_replay(&self) {
        if let Some(job) = self.shared.replay.lock().take() {
            job.cancel();
            log::info!("replay cancelled");
        }
    }
}

fn dispatch_loop(shared: &WorkerShared, running: &AtomicBool, handoff: &Handoff) {
    let interval = shared.config.poll_interval();

    while running.load(Ordering::SeqCst) {
        {
            let mut state = handoff.state.lock();
            if state.idle == 0 {
                handoff.changed.wait_for(&mut state, interval);
                continue;
            }
        }

        let Some(result) = shared.results.pop_timeout(interval) else {
            continue;
        };
        shared.diagnostics.lock().callbacks_dispatched += 1;

        let mut state = handoff.state.lock();
        state.pending = Some(result);
        handoff.changed.notify_all();
        // an idle invoker always takes it
        while state.pending.is_some() {
            handoff.changed.wait(&mut state);
        }
    }
}

fn invoke_loop(handoff: &Handoff, callback: &ResultCallback) {
    let mut state = handoff.state.lock();
    state.idle += 1;
    loop {
        if let Some(result) = state.pending.take() {
            state.idle -= 1;
            handoff.changed.notify_all();
            drop(state);

            if panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
                log::warn!("result callback panicked");
            }

            state = handoff.state.lock();
            state.idle += 1;
            handoff.changed.notify_all();
            continue;
        }
        if state.stopping {
            return;
        }
        handoff.changed.wait(&mut state);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.cancel_replay();
        self.shared.results.close();
        for handle in self.poll_threads.drain(..) {
            let _ = handle.join();
        }
        self.reset_callback();
        log::info!("worker stopped");
    }
}
