//! # acquisition-core
//!
//! Platform-agnostic streaming acquisition pipeline.
//!
//! Provides the asynchronous command model for talking to capture hardware,
//! bounded frame and result queues, the pipeline worker, hardware state
//! observation, session replay and file export. Hardware backends implement
//! the `HardwareLink` trait and plug into the generic `AcquisitionContext`.
//!
//! ## Architecture
//!
//! ```text
//! acquisition-core (this crate)
//! ├── traits/       ← HardwareLink, FrameSource, ProcessingStage, ExportSink, Settable, StateSource
//! ├── models/       ← AcquisitionError, Frame, HardwareState, WorkerConfig, PipelineResult, etc.
//! ├── command/      ← AsyncHandle, CommandExecutor (per-parameter mailbox)
//! ├── processing/   ← FrameQueue (drop-oldest), ResultQueue (limits, ordering)
//! ├── session/      ← AcquisitionContext, Worker, StateObserver, replay
//! └── storage/      ← FileExporter, metadata sidecars, recording I/O
//! ```

pub mod command;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use command::async_handle::AsyncHandle;
pub use models::config::{AcquisitionConfig, DropBehavior, ExportSettings, WorkerConfig};
pub use models::error::AcquisitionError;
pub use models::frame::{Frame, FrameFlags, FrameMetadata, ProcessingMode, SessionInfo, View};
pub use models::parameter::{OperationMode, ParameterKey, ParameterType, ParameterValue, Setting};
pub use models::pipeline_result::{PipelineResult, ReplayProgress, WorkerDiagnostics};
pub use models::recording::{RecordedFrame, Recording};
pub use models::state::{AsyncOutcome, ComponentInfo, ComponentState, HardwareSnapshot, HardwareState};
pub use processing::result_queue::QueueLimits;
pub use session::acquisition::AcquisitionContext;
pub use session::observer::StateObserver;
pub use session::replay::{ReplayHandle, ReplayLink};
pub use session::worker::{ResultCallback, Worker};
pub use storage::file_exporter::FileExporter;
pub use storage::recording::{load_recording, save_recording};
pub use traits::export_sink::{export_fn, ExportSink};
pub use traits::frame_source::FrameSource;
pub use traits::hardware_link::HardwareLink;
pub use traits::processing_stage::{processing_fn, view_fn, ProcessingStage, ViewGenerator};
pub use traits::settable::Settable;
pub use traits::state_source::{StateCallback, StateSource};
