use crate::models::error::AcquisitionError;
use crate::models::frame::Frame;
use crate::models::parameter::{ParameterKey, ParameterValue};
use crate::models::state::{ComponentInfo, HardwareState};

/// Interface to the capture hardware behind an `AcquisitionContext`.
///
/// Implemented by:
/// - `ReplayLink` (this crate): frames from a recorded session
/// - `SimulatedCamera` (`acquisition-sim`): synthetic live camera
///
/// Every method may block. The context only calls `write_parameter` and
/// `acquire` from its own background threads, never from the caller's.
pub trait HardwareLink: Send + Sync {
    /// Current link state.
    fn state(&self) -> HardwareState;

    /// Number of sub-components. Fixed for the lifetime of the link.
    fn component_count(&self) -> usize;

    /// Static description of one component.
    fn component_info(&self, id: usize) -> Result<ComponentInfo, AcquisitionError>;

    /// Whether one component currently responds.
    fn component_online(&self, id: usize) -> Result<bool, AcquisitionError>;

    /// Write one parameter to the hardware and wait for the acknowledgement.
    fn write_parameter(&self, key: ParameterKey, value: ParameterValue) -> Result<(), AcquisitionError>;

    /// Capture one frame.
    ///
    /// Returns `Ok(None)` when the link has nothing to emit right now (for
    /// example an exhausted recording); this is not a failure.
    fn acquire(&self) -> Result<Option<Frame>, AcquisitionError>;
}
