use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::error::AcquisitionError;
use crate::models::state::HardwareSnapshot;
use crate::traits::state_source::{StateCallback, StateSource};

/// Default interval between two state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep up to `timeout`; true if stopped meanwhile.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

struct ObserverThread {
    stop: Arc<StopSignal>,
    handle: thread::JoinHandle<()>,
}

/// Watches a `StateSource` and invokes a callback once per distinct change
/// of the hardware state or any component state.
///
/// The first snapshot is the baseline; it is only reported when
/// `emit_initial` is requested. `reset` stops and joins the watcher thread,
/// so no callback runs after it returns.
pub struct StateObserver {
    poll_interval: Duration,
    thread: Mutex<Option<ObserverThread>>,
}

impl StateObserver {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            thread: Mutex::new(None),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start watching `source`, replacing any previous registration.
    pub fn register(
        &self,
        source: Arc<dyn StateSource>,
        callback: StateCallback,
        emit_initial: bool,
    ) -> Result<(), AcquisitionError> {
        self.reset();

        let mut slot = self.thread.lock();
        // baseline is taken before returning so no later change can hide in it
        let baseline = match source.snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!("initial state poll failed: {}", err);
                None
            }
        };
        let stop = Arc::new(StopSignal::new());
        let signal = Arc::clone(&stop);
        let interval = self.poll_interval;

        let handle = thread::Builder::new()
            .name("acq-state-observer".into())
            .spawn(move || {
                observe(source.as_ref(), &callback, &signal, interval, baseline, emit_initial)
            })
            .map_err(|e| AcquisitionError::ThreadSpawn(e.to_string()))?;

        *slot = Some(ObserverThread { stop, handle });
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Stop watching. Synchronous unless called from the callback itself.
    pub fn reset(&self) {
        let Some(observer) = self.thread.lock().take() else {
            return;
        };
        observer.stop.stop();
        if observer.handle.thread().id() == thread::current().id() {
            return;
        }
        let _ = observer.handle.join();
    }
}

impl Default for StateObserver {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Drop for StateObserver {
    fn drop(&mut self) {
        self.reset();
    }
}

fn observe(
    source: &dyn StateSource,
    callback: &StateCallback,
    stop: &StopSignal,
    interval: Duration,
    baseline: Option<HardwareSnapshot>,
    emit_initial: bool,
) {
    let mut last = baseline;
    if emit_initial {
        if let Some(snapshot) = &last {
            callback(snapshot);
        }
    }

    while !stop.wait(interval) {
        let snapshot = match source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("state poll failed: {}", err);
                continue;
            }
        };
        if last.as_ref() == Some(&snapshot) {
            continue;
        }
        if stop.is_stopped() {
            break;
        }
        log::debug!("hardware state changed to {:?}", snapshot.state);
        callback(&snapshot);
        last = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::models::state::{ComponentState, HardwareState};

    const INTERVAL: Duration = Duration::from_millis(2);

    /// State source whose snapshot is set by the test.
    struct ScriptedSource {
        snapshot: Mutex<HardwareSnapshot>,
    }

    impl ScriptedSource {
        fn new(state: HardwareState) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(snapshot(state, true)),
            })
        }

        fn set(&self, state: HardwareState, component_online: bool) {
            *self.snapshot.lock() = snapshot(state, component_online);
        }
    }

    impl StateSource for ScriptedSource {
        fn snapshot(&self) -> Result<HardwareSnapshot, AcquisitionError> {
            Ok(self.snapshot.lock().clone())
        }
    }

    fn snapshot(state: HardwareState, component_online: bool) -> HardwareSnapshot {
        HardwareSnapshot {
            state,
            components: vec![ComponentState {
                display_name: "sensor".into(),
                is_online: component_online,
            }],
        }
    }

    fn recorder() -> (StateCallback, Arc<Mutex<Vec<HardwareSnapshot>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: StateCallback = Arc::new(move |snapshot: &HardwareSnapshot| {
            sink.lock().push(snapshot.clone());
        });
        (callback, events)
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn reports_each_change_once() {
        let source = ScriptedSource::new(HardwareState::Online);
        let observer = StateObserver::new(INTERVAL);
        let (callback, events) = recorder();
        observer.register(source.clone(), callback, false).unwrap();

        thread::sleep(INTERVAL * 10);
        assert!(events.lock().is_empty());

        source.set(HardwareState::PartiallyOnline, false);
        assert!(wait_for(|| events.lock().len() == 1));
        thread::sleep(INTERVAL * 10);
        assert_eq!(events.lock().len(), 1);

        source.set(HardwareState::Online, true);
        assert!(wait_for(|| events.lock().len() == 2));

        observer.reset();
        let events = events.lock();
        assert_eq!(events[0].state, HardwareState::PartiallyOnline);
        assert!(!events[0].components[0].is_online);
        assert_eq!(events[1].state, HardwareState::Online);
    }

    #[test]
    fn component_change_alone_is_reported() {
        let source = ScriptedSource::new(HardwareState::Online);
        let observer = StateObserver::new(INTERVAL);
        let (callback, events) = recorder();
        observer.register(source.clone(), callback, false).unwrap();

        source.set(HardwareState::Online, false);

        assert!(wait_for(|| events.lock().len() == 1));
        observer.reset();
        assert!(!events.lock()[0].components[0].is_online);
    }

    #[test]
    fn change_right_after_register_is_reported() {
        for _ in 0..20 {
            let source = ScriptedSource::new(HardwareState::Online);
            let observer = StateObserver::new(INTERVAL);
            let (callback, events) = recorder();

            observer.register(source.clone(), callback, false).unwrap();
            source.set(HardwareState::Offline, false);

            assert!(wait_for(|| events.lock().len() == 1));
            observer.reset();
            assert_eq!(events.lock()[0].state, HardwareState::Offline);
        }
    }

    #[test]
    fn initial_event_on_request() {
        let source = ScriptedSource::new(HardwareState::Offline);
        let observer = StateObserver::new(INTERVAL);
        let (callback, events) = recorder();

        observer.register(source, callback, true).unwrap();

        assert!(wait_for(|| events.lock().len() == 1));
        observer.reset();
        assert_eq!(events.lock()[0].state, HardwareState::Offline);
    }

    #[test]
    fn no_callback_after_reset() {
        let source = ScriptedSource::new(HardwareState::Online);
        let observer = StateObserver::new(Duration::from_micros(100));
        let calls = Arc::new(AtomicUsize::new(0));
        let reset_done = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicUsize::new(0));

        for round in 0..50 {
            reset_done.store(false, Ordering::SeqCst);
            let (calls, flag, late) = (Arc::clone(&calls), Arc::clone(&reset_done), Arc::clone(&late));
            observer
                .register(
                    source.clone(),
                    Arc::new(move |_: &HardwareSnapshot| {
                        if flag.load(Ordering::SeqCst) {
                            late.fetch_add(1, Ordering::SeqCst);
                        }
                        calls.fetch_add(1, Ordering::SeqCst);
                    }),
                    true,
                )
                .unwrap();

            let flip = if round % 2 == 0 {
                HardwareState::PartiallyOnline
            } else {
                HardwareState::Online
            };
            source.set(flip, round % 2 == 1);
            thread::sleep(Duration::from_micros(300));

            observer.reset();
            reset_done.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_micros(300));
        }

        assert!(!observer.is_registered());
        assert!(calls.load(Ordering::SeqCst) >= 50);
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_replaces_previous_watch() {
        let first = ScriptedSource::new(HardwareState::Online);
        let second = ScriptedSource::new(HardwareState::Online);
        let observer = StateObserver::new(INTERVAL);
        let (cb1, events1) = recorder();
        let (cb2, events2) = recorder();

        observer.register(first.clone(), cb1, false).unwrap();
        observer.register(second.clone(), cb2, false).unwrap();

        first.set(HardwareState::Offline, false);
        second.set(HardwareState::Offline, false);

        assert!(wait_for(|| events2.lock().len() == 1));
        thread::sleep(INTERVAL * 10);
        assert!(events1.lock().is_empty());
    }
}
