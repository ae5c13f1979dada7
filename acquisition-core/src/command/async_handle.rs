use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::AcquisitionError;
use crate::models::state::AsyncOutcome;

enum Slot<T> {
    Queued,
    Executing,
    Done(T),
    Failed(AcquisitionError),
    Overwritten,
}

impl<T> Slot<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Executing)
    }

    /// `None` while the command is still pending.
    fn terminal(&self) -> Option<Result<AsyncOutcome, AcquisitionError>> {
        match self {
            Self::Queued | Self::Executing => None,
            Self::Done(_) => Some(Ok(AsyncOutcome::Done)),
            Self::Overwritten => Some(Ok(AsyncOutcome::Overwritten)),
            Self::Failed(err) => Some(Err(err.clone())),
        }
    }
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

impl<T> Shared<T> {
    /// Move a pending slot to `next`. Resolved slots never change again.
    fn settle(&self, next: Slot<T>) -> bool {
        let mut slot = self.slot.lock();
        if !slot.is_pending() {
            return false;
        }
        *slot = next;
        drop(slot);
        self.changed.notify_all();
        true
    }
}

/// Type-erased view of a pending command, kept in the per-kind mailbox.
pub(crate) trait PendingCommand: Send + Sync {
    /// Resolve to `Overwritten` if still pending.
    fn supersede(&self) -> bool;

    /// Resolve to `Cancelled` if not handed to the hardware yet.
    fn cancel(&self) -> bool;
}

impl<T: Send> PendingCommand for Shared<T> {
    fn supersede(&self) -> bool {
        self.settle(Slot::Overwritten)
    }

    fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Queued) {
            return false;
        }
        *slot = Slot::Failed(AcquisitionError::Cancelled);
        drop(slot);
        self.changed.notify_all();
        true
    }
}

/// Pollable handle for one asynchronous hardware command.
///
/// Cloning shares the same command. Only the executor writes the state, any
/// number of clones may poll it.
pub struct AsyncHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> AsyncHandle<T> {
    /// A queued command and the completer the executor resolves it with.
    pub(crate) fn pending() -> (Self, Completer<T>) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Queued),
            changed: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Completer { shared },
        )
    }

    /// A handle that is already resolved.
    pub fn resolved(result: Result<T, AcquisitionError>) -> Self {
        let slot = match result {
            Ok(value) => Slot::Done(value),
            Err(err) => Slot::Failed(err),
        };
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(slot),
                changed: Condvar::new(),
            }),
        }
    }

    pub(crate) fn as_pending(&self) -> Arc<dyn PendingCommand> {
        self.shared.clone()
    }
}

impl<T> AsyncHandle<T> {
    /// Poll the command, waiting up to `timeout` for it to resolve.
    ///
    /// A zero timeout never blocks. While pending this yields `Deferred` if
    /// the command has not reached the hardware yet and `Timeout` if the
    /// hardware is still executing it. A failed command yields its error,
    /// every time it is polled.
    pub fn poll(&self, timeout: Duration) -> Result<AsyncOutcome, AcquisitionError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = slot.terminal() {
                return outcome;
            }
            if Instant::now() >= deadline {
                return Ok(match *slot {
                    Slot::Queued => AsyncOutcome::Deferred,
                    _ => AsyncOutcome::Timeout,
                });
            }
            self.shared.changed.wait_until(&mut slot, deadline);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.slot.lock().is_pending()
    }
}

impl<T: Clone> AsyncHandle<T> {
    /// The value of a completed command.
    pub fn value(&self) -> Option<T> {
        match &*self.shared.slot.lock() {
            Slot::Done(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Wait up to `timeout` and return the value.
    ///
    /// A still-pending command yields `Timeout`, an overwritten one `Cancelled`.
    pub fn wait(&self, timeout: Duration) -> Result<T, AcquisitionError> {
        match self.poll(timeout)? {
            AsyncOutcome::Done => self.value().ok_or(AcquisitionError::Cancelled),
            AsyncOutcome::Overwritten => Err(AcquisitionError::Cancelled),
            AsyncOutcome::Timeout | AsyncOutcome::Deferred => Err(AcquisitionError::Timeout),
        }
    }
}

/// Write side of an `AsyncHandle`, owned by the job that runs the command.
pub(crate) struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Completer<T> {
    /// Mark the command as handed to the hardware.
    ///
    /// Returns false if it was overwritten or cancelled while queued, in
    /// which case it must not run.
    pub(crate) fn begin(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, Slot::Queued) {
            return false;
        }
        *slot = Slot::Executing;
        drop(slot);
        self.shared.changed.notify_all();
        true
    }

    /// Store the hardware's answer unless the command was overwritten meanwhile.
    pub(crate) fn resolve(self, result: Result<T, AcquisitionError>) -> bool {
        self.shared.settle(match result {
            Ok(value) => Slot::Done(value),
            Err(err) => Slot::Failed(err),
        })
    }
}
