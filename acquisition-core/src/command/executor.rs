use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use super::async_handle::{AsyncHandle, PendingCommand};
use crate::models::error::AcquisitionError;
use crate::models::parameter::ParameterKey;

/// Mailbox key: commands of the same kind overwrite each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Set(ParameterKey),
    Capture,
    CaptureToQueue,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs hardware commands one at a time on a dedicated thread.
///
/// Each `CommandKind` has a single-slot mailbox. Submitting a command while
/// an older one of the same kind is unresolved marks the older handle
/// `Overwritten`; a queued overwritten command is skipped and never reaches
/// the hardware.
pub struct CommandExecutor {
    mailbox: Mutex<HashMap<CommandKind, Arc<dyn PendingCommand>>>,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CommandExecutor {
    pub fn spawn(name: &str) -> Result<Self, AcquisitionError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .map_err(|e| AcquisitionError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            mailbox: Mutex::new(HashMap::new()),
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `work` and return a handle to its outcome immediately.
    pub fn submit<T, F>(&self, kind: CommandKind, work: F) -> AsyncHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AcquisitionError> + Send + 'static,
    {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return AsyncHandle::resolved(Err(AcquisitionError::Cancelled));
        };

        let (handle, completer) = AsyncHandle::pending();
        if let Some(previous) = self.mailbox.lock().insert(kind, handle.as_pending()) {
            if previous.supersede() {
                log::debug!("{:?} command overwritten by a newer one", kind);
            }
        }

        let job: Job = Box::new(move || {
            if !completer.begin() {
                return;
            }
            completer.resolve(work());
        });
        if sender.send(job).is_err() {
            log::warn!("command thread is gone, {:?} command dropped", kind);
            handle.as_pending().cancel();
        }
        handle
    }

    /// Cancel queued commands and join the command thread.
    ///
    /// A command the hardware is already executing runs to completion.
    /// Idempotent.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        for pending in self.mailbox.lock().values() {
            pending.cancel();
        }
        drop(sender);

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CommandExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;
    use crate::models::state::AsyncOutcome;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn runs_commands_off_the_calling_thread() {
        let executor = CommandExecutor::spawn("test-commands").unwrap();
        let caller = thread::current().id();

        let handle = executor.submit(CommandKind::Capture, move || Ok(thread::current().id() != caller));

        assert_eq!(handle.wait(WAIT), Ok(true));
    }

    #[test]
    fn newer_command_overwrites_pending_one() {
        let executor = CommandExecutor::spawn("test-commands").unwrap();
        let (release, gate) = channel::<()>();

        // occupy the thread so the next commands stay queued
        let blocker = executor.submit(CommandKind::Capture, move || {
            gate.recv().ok();
            Ok(())
        });

        let key = CommandKind::Set(ParameterKey::IntegrationTime);
        let first = executor.submit(key, || Ok(50.0));
        let second = executor.submit(key, || Ok(80.0));
        assert_eq!(first.poll(Duration::ZERO), Ok(AsyncOutcome::Overwritten));
        assert_eq!(second.poll(Duration::ZERO), Ok(AsyncOutcome::Deferred));

        release.send(()).unwrap();
        assert_eq!(blocker.poll(WAIT), Ok(AsyncOutcome::Done));
        assert_eq!(second.wait(WAIT), Ok(80.0));
        assert_eq!(first.poll(Duration::ZERO), Ok(AsyncOutcome::Overwritten));
        assert_eq!(first.value(), None);
    }

    #[test]
    fn different_kinds_do_not_overwrite() {
        let executor = CommandExecutor::spawn("test-commands").unwrap();

        let fps = executor.submit(CommandKind::Set(ParameterKey::Fps), || Ok(()));
        let exposure = executor.submit(CommandKind::Set(ParameterKey::IntegrationTime), || Ok(()));

        assert_eq!(fps.poll(WAIT), Ok(AsyncOutcome::Done));
        assert_eq!(exposure.poll(WAIT), Ok(AsyncOutcome::Done));
    }

    #[test]
    fn shutdown_cancels_queued_commands() {
        let executor = CommandExecutor::spawn("test-commands").unwrap();
        let (release, gate) = channel::<()>();
        let running = executor.submit(CommandKind::Capture, move || {
            gate.recv().ok();
            Ok(())
        });
        while running.poll(Duration::ZERO) == Ok(AsyncOutcome::Deferred) {
            thread::yield_now();
        }
        let queued = executor.submit(CommandKind::Set(ParameterKey::Fps), || Ok(()));

        release.send(()).unwrap();
        executor.shutdown();

        assert_eq!(running.poll(Duration::ZERO), Ok(AsyncOutcome::Done));
        assert!(matches!(
            queued.poll(Duration::ZERO),
            Ok(AsyncOutcome::Done) | Err(AcquisitionError::Cancelled)
        ));

        let late = executor.submit(CommandKind::Capture, || Ok(()));
        assert_eq!(late.poll(Duration::ZERO), Err(AcquisitionError::Cancelled));
    }
}
