use thiserror::Error;

/// Errors raised by the acquisition pipeline.
///
/// Per-frame failures (`Processing`, `Export`, `FrameDropped`) travel inside a
/// `PipelineResult` and never stop the worker. Link failures (`Hardware`) are
/// reported to the caller of the operation that hit them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("hardware error: {0}")]
    Hardware(String),

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("component {0} not found")]
    ComponentNotFound(usize),

    #[error("processing failed: {0}")]
    Processing(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("frame {0} was dropped during recording")]
    FrameDropped(u64),

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(String),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl AcquisitionError {
    /// Whether this error belongs to a single frame rather than the link.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            Self::Processing(_) | Self::Export(_) | Self::FrameDropped(_)
        )
    }
}
