use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::command::async_handle::AsyncHandle;
use crate::command::executor::{CommandExecutor, CommandKind};
use crate::models::config::AcquisitionConfig;
use crate::models::error::AcquisitionError;
use crate::models::frame::{Frame, SessionInfo};
use crate::models::parameter::{default_value, OperationMode, ParameterKey, ParameterType, ParameterValue, Setting};
use crate::models::recording::Recording;
use crate::models::state::{ComponentInfo, ComponentState, HardwareSnapshot, HardwareState};
use crate::processing::frame_queue::FrameQueue;
use crate::session::replay::ReplayLink;
use crate::traits::frame_source::FrameSource;
use crate::traits::hardware_link::HardwareLink;
use crate::traits::settable::Settable;
use crate::traits::state_source::StateSource;

/// State shared between the context and its background threads.
struct ContextShared<L> {
    link: L,
    config: AcquisitionConfig,
    frames: FrameQueue,
    parameters: Mutex<HashMap<ParameterKey, ParameterValue>>,
    session: Mutex<Option<SessionInfo>>,
}

impl<L: HardwareLink> ContextShared<L> {
    fn parameter(&self, key: ParameterKey) -> ParameterValue {
        self.parameters
            .lock()
            .get(&key)
            .copied()
            .unwrap_or_else(|| default_value(key))
    }

    /// One blocking capture from the link, stamped with the session info.
    fn acquire(&self) -> Result<Option<Frame>, AcquisitionError> {
        if !self.link.state().can_capture() {
            return Err(AcquisitionError::DeviceNotAvailable);
        }
        let Some(mut frame) = self.link.acquire()? else {
            return Ok(None);
        };
        if let Some(session) = self.session.lock().as_ref() {
            frame.metadata.session = session.clone();
        }
        Ok(Some(frame))
    }

    fn frame_period(&self) -> Duration {
        match f64::from_value(self.parameter(ParameterKey::Fps)) {
            Some(fps) if fps > 0.0 => Duration::from_secs_f64(1.0 / fps),
            _ => self.config.idle_interval,
        }
    }
}

/// Sleep for `duration` in slices of at most `slice`, returning early once
/// `running` is cleared.
fn sleep_while_running(running: &AtomicBool, duration: Duration, slice: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(slice));
    }
}

struct ContinuousCapture {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Owns the link to the capture hardware (or a replayed recording).
///
/// ```text
/// caller ──set_async/capture──→ [command thread] ──→ HardwareLink
///                                                       │
/// [continuous thread] ──acquire──→ [FrameQueue] ←───────┘ capture_queue
///        │
///        └──→ get_next_measurement / FrameSource::next
/// ```
///
/// Hardware writes and captures never run on the caller's thread. Dropping
/// the context stops continuous capture and joins every thread it owns.
pub struct AcquisitionContext<L: HardwareLink + 'static> {
    shared: Arc<ContextShared<L>>,
    executor: CommandExecutor,
    continuous: Mutex<Option<ContinuousCapture>>,
}

impl<L: HardwareLink + 'static> AcquisitionContext<L> {
    pub fn new(link: L, config: AcquisitionConfig) -> Result<Self, AcquisitionError> {
        config.validate().map_err(AcquisitionError::ConfigurationFailed)?;
        let executor = CommandExecutor::spawn("acq-commands")?;
        Ok(Self {
            shared: Arc::new(ContextShared {
                link,
                frames: FrameQueue::new(config.queue_size),
                config,
                parameters: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
            }),
            executor,
            continuous: Mutex::new(None),
        })
    }

    /// The underlying hardware link.
    pub fn link(&self) -> &L {
        &self.shared.link
    }

    pub fn state(&self) -> HardwareState {
        self.shared.link.state()
    }

    pub fn component_count(&self) -> usize {
        self.shared.link.component_count()
    }

    fn check_component(&self, id: usize) -> Result<(), AcquisitionError> {
        if id >= self.component_count() {
            return Err(AcquisitionError::ComponentNotFound(id));
        }
        Ok(())
    }

    pub fn component_info(&self, id: usize) -> Result<ComponentInfo, AcquisitionError> {
        self.check_component(id)?;
        self.shared.link.component_info(id)
    }

    pub fn component_online(&self, id: usize) -> Result<bool, AcquisitionError> {
        self.check_component(id)?;
        self.shared.link.component_online(id)
    }

    /// Stamp every subsequently emitted frame with `session`.
    pub fn set_session_info(&self, session: SessionInfo) {
        *self.shared.session.lock() = Some(session);
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.shared.session.lock().clone()
    }

    pub fn set_integration_time(&self, millis: f64) -> AsyncHandle<()> {
        self.set_async(Setting::INTEGRATION_TIME, millis)
    }

    pub fn integration_time(&self) -> f64 {
        self.get(Setting::INTEGRATION_TIME)
    }

    pub fn set_fps(&self, fps: f64) -> AsyncHandle<()> {
        self.set_async(Setting::FPS, fps)
    }

    pub fn fps(&self) -> f64 {
        self.get(Setting::FPS)
    }

    pub fn set_operation_mode(&self, mode: OperationMode) -> AsyncHandle<()> {
        self.set_async(Setting::OPERATION_MODE, mode)
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.get(Setting::OPERATION_MODE)
    }

    /// Single-shot capture. The frame is carried by the handle.
    pub fn capture(&self) -> AsyncHandle<Frame> {
        let shared = Arc::clone(&self.shared);
        self.executor.submit(CommandKind::Capture, move || {
            shared
                .acquire()?
                .ok_or_else(|| AcquisitionError::Hardware("link produced no frame".into()))
        })
    }

    /// Single-shot capture whose frame is pushed into the internal queue.
    pub fn capture_queue(&self) -> AsyncHandle<()> {
        let shared = Arc::clone(&self.shared);
        self.executor.submit(CommandKind::CaptureToQueue, move || {
            let frame = shared
                .acquire()?
                .ok_or_else(|| AcquisitionError::Hardware("link produced no frame".into()))?;
            shared.frames.push(frame);
            Ok(())
        })
    }

    /// Start streaming frames into the internal queue, paced by the fps
    /// parameter. Idempotent.
    pub fn capture_continuous_start(&self) -> Result<(), AcquisitionError> {
        let mut continuous = self.continuous.lock();
        if continuous.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let shared = Arc::clone(&self.shared);

        let handle = thread::Builder::new()
            .name("acq-continuous".into())
            .spawn(move || {
                let idle = shared.config.idle_interval;
                while flag.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    match shared.acquire() {
                        Ok(Some(frame)) => {
                            shared.frames.push(frame);
                        }
                        Ok(None) | Err(AcquisitionError::DeviceNotAvailable) => {
                            sleep_while_running(&flag, idle, idle);
                            continue;
                        }
                        Err(err) => {
                            log::warn!("continuous capture failed: {}", err);
                            sleep_while_running(&flag, idle, idle);
                            continue;
                        }
                    }
                    let remaining = shared.frame_period().saturating_sub(started.elapsed());
                    sleep_while_running(&flag, remaining, idle);
                }
            })
            .map_err(|e| AcquisitionError::ThreadSpawn(e.to_string()))?;

        *continuous = Some(ContinuousCapture { running, handle });
        log::info!("continuous capture started");
        Ok(())
    }

    /// Stop streaming. Frames already queued stay available. Idempotent.
    pub fn capture_continuous_stop(&self) {
        let Some(capture) = self.continuous.lock().take() else {
            return;
        };
        capture.running.store(false, Ordering::SeqCst);
        let _ = capture.handle.join();
        log::info!("continuous capture stopped");
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous.lock().is_some()
    }

    /// Pop one frame from the internal queue, waiting up to `timeout`.
    ///
    /// `None` on timeout is not a failure.
    pub fn get_next_measurement(&self, timeout: Duration) -> Option<Frame> {
        self.shared.frames.pop_timeout(timeout)
    }

    pub fn has_next_measurement(&self) -> bool {
        !self.shared.frames.is_empty()
    }

    /// Capacity of the internal frame queue.
    pub fn queue_size(&self) -> usize {
        self.shared.frames.capacity()
    }

    /// Resize the internal frame queue, dropping the oldest frames that no
    /// longer fit.
    pub fn set_queue_size(&self, size: usize) -> Result<(), AcquisitionError> {
        if size == 0 {
            return Err(AcquisitionError::ConfigurationFailed(
                "queue size must be at least 1".into(),
            ));
        }
        let dropped = self.shared.frames.set_capacity(size);
        if dropped > 0 {
            log::debug!("queue resized to {}, dropped {} frames", size, dropped);
        }
        Ok(())
    }

    /// Frames currently in the internal queue. Equal to `queue_size()` when
    /// the queue has overflowed and is dropping the oldest frames.
    pub fn queue_used(&self) -> usize {
        self.shared.frames.len()
    }

    /// Frames dropped on overflow since creation.
    pub fn frames_dropped(&self) -> u64 {
        self.shared.frames.dropped()
    }
}

impl AcquisitionContext<ReplayLink> {
    /// A context that plays back `recording` instead of talking to hardware.
    pub fn replay(recording: Recording, looping: bool, config: AcquisitionConfig) -> Result<Self, AcquisitionError> {
        Self::new(ReplayLink::new(recording, looping), config)
    }
}

impl<L: HardwareLink + 'static, T: ParameterType> Settable<T> for AcquisitionContext<L> {
    fn get(&self, setting: Setting<T>) -> T {
        T::from_value(self.shared.parameter(setting.key())).unwrap_or_default()
    }

    fn set_async(&self, setting: Setting<T>, value: T) -> AsyncHandle<()> {
        let key = setting.key();
        if let Some(id) = key.component() {
            if let Err(err) = self.check_component(id) {
                return AsyncHandle::resolved(Err(err));
            }
        }

        let shared = Arc::clone(&self.shared);
        let value = value.into_value();
        self.executor.submit(CommandKind::Set(key), move || {
            shared.link.write_parameter(key, value)?;
            shared.parameters.lock().insert(key, value);
            Ok(())
        })
    }
}

impl<L: HardwareLink + 'static> FrameSource for AcquisitionContext<L> {
    fn has_next(&self) -> bool {
        self.has_next_measurement()
    }

    fn next(&self) -> Option<Frame> {
        self.shared.frames.try_pop()
    }

    fn link_state(&self) -> HardwareState {
        self.state()
    }
}

impl<L: HardwareLink + 'static> StateSource for AcquisitionContext<L> {
    fn snapshot(&self) -> Result<HardwareSnapshot, AcquisitionError> {
        let link = &self.shared.link;
        let components = (0..link.component_count())
            .map(|id| {
                Ok(ComponentState {
                    display_name: link.component_info(id)?.display_name,
                    is_online: link.component_online(id)?,
                })
            })
            .collect::<Result<Vec<_>, AcquisitionError>>()?;
        Ok(HardwareSnapshot {
            state: link.state(),
            components,
        })
    }
}

impl<L: HardwareLink + 'static> Drop for AcquisitionContext<L> {
    fn drop(&mut self) {
        self.capture_continuous_stop();
        self.executor.shutdown();
    }
}
