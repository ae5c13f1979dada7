use std::sync::Arc;

use crate::models::error::AcquisitionError;
use crate::models::state::HardwareSnapshot;

/// Callback invoked by the `StateObserver` with the new hardware snapshot.
///
/// Runs on the observer thread, not the caller's thread.
pub type StateCallback = Arc<dyn Fn(&HardwareSnapshot) + Send + Sync + 'static>;

/// Anything whose hardware and component state can be sampled.
pub trait StateSource: Send + Sync {
    fn snapshot(&self) -> Result<HardwareSnapshot, AcquisitionError>;
}
