use std::sync::Arc;

use crate::models::error::AcquisitionError;
use crate::models::frame::Frame;

/// Persists or forwards a processed frame.
///
/// Synchronous; a sink may stamp `metadata.export_path` on success. A failure
/// only affects the frame being exported.
pub trait ExportSink: Send + Sync {
    fn apply(&self, frame: Frame) -> Result<Frame, AcquisitionError>;
}

impl<F> ExportSink for F
where
    F: Fn(Frame) -> Result<Frame, AcquisitionError> + Send + Sync,
{
    fn apply(&self, frame: Frame) -> Result<Frame, AcquisitionError> {
        self(frame)
    }
}

/// Wrap a closure as a shareable export sink.
pub fn export_fn<F>(f: F) -> Arc<dyn ExportSink>
where
    F: Fn(Frame) -> Result<Frame, AcquisitionError> + Send + Sync + 'static,
{
    Arc::new(f)
}
