use std::sync::Arc;

use crate::models::error::AcquisitionError;
use crate::models::frame::{Frame, View};

/// Transforms a captured frame (dark subtraction, reflectance, ...).
///
/// Opaque to the pipeline: synchronous, no hidden queueing.
pub trait ProcessingStage: Send + Sync {
    fn apply(&self, frame: Frame) -> Result<Frame, AcquisitionError>;
}

impl<F> ProcessingStage for F
where
    F: Fn(Frame) -> Result<Frame, AcquisitionError> + Send + Sync,
{
    fn apply(&self, frame: Frame) -> Result<Frame, AcquisitionError> {
        self(frame)
    }
}

/// Wrap a closure as a shareable processing stage.
pub fn processing_fn<F>(f: F) -> Arc<dyn ProcessingStage>
where
    F: Fn(Frame) -> Result<Frame, AcquisitionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Renders a secondary view of a processed frame.
pub trait ViewGenerator: Send + Sync {
    fn render(&self, frame: &Frame) -> Result<View, AcquisitionError>;
}

impl<F> ViewGenerator for F
where
    F: Fn(&Frame) -> Result<View, AcquisitionError> + Send + Sync,
{
    fn render(&self, frame: &Frame) -> Result<View, AcquisitionError> {
        self(frame)
    }
}

/// Wrap a closure as a shareable view generator.
pub fn view_fn<F>(f: F) -> Arc<dyn ViewGenerator>
where
    F: Fn(&Frame) -> Result<View, AcquisitionError> + Send + Sync + 'static,
{
    Arc::new(f)
}
