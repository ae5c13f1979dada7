//! # acquisition-sim
//!
//! Simulated hardware backend for acquisition-core.
//!
//! Provides:
//! - `SimulatedCamera`: a `HardwareLink` producing synthetic 12-bit frames
//! - `DarkSubtraction` / `PreviewViewer`: example processing and view stages
//! - `generate_recording`: synthetic session recordings for replay
//!
//! The `replay-session` binary drives a full pipeline from a recording.
//!
//! ## Usage
//! ```ignore
//! use acquisition_core::{AcquisitionConfig, AcquisitionContext};
//! use acquisition_sim::{SimulatedCamera, SimulatedCameraConfig};
//!
//! let camera = SimulatedCamera::new(SimulatedCameraConfig::default())?;
//! let context = AcquisitionContext::new(camera, AcquisitionConfig::default())?;
//! let frame = context.capture().wait(std::time::Duration::from_secs(1))?;
//! ```

pub mod generator;
pub mod processing;
pub mod simulated_camera;

pub use generator::{generate_recording, GeneratorSettings};
pub use processing::{DarkSubtraction, PreviewViewer};
pub use simulated_camera::{SimulatedCamera, SimulatedCameraConfig};
