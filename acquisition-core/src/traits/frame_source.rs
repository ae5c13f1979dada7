use crate::models::frame::Frame;
use crate::models::state::HardwareState;

/// The narrow contract the worker consumes from an acquisition source.
///
/// Both calls are non-blocking. `next` may return `None` even right after
/// `has_next` returned true when several worker threads race for a frame.
pub trait FrameSource: Send + Sync {
    fn has_next(&self) -> bool;

    fn next(&self) -> Option<Frame>;

    /// Link state, checked by the worker when `has_next` is false so an
    /// idle source can be told apart from a disconnected one.
    fn link_state(&self) -> HardwareState {
        HardwareState::Online
    }
}
