//! Synthetic session recordings for replay demos and tests.

use chrono::{Duration as ChronoDuration, Utc};

use acquisition_core::models::error::AcquisitionError;
use acquisition_core::models::frame::SessionInfo;
use acquisition_core::models::parameter::{ParameterKey, ParameterValue};
use acquisition_core::models::recording::Recording;
use acquisition_core::traits::hardware_link::HardwareLink;

use crate::simulated_camera::{SimulatedCamera, SimulatedCameraConfig};

/// How a synthetic recording is generated.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub name: String,
    pub frame_count: usize,
    pub fps: f64,
    pub integration_time_ms: f64,
    /// Every n-th slot becomes a dropped placeholder (0 = none).
    pub drop_every: usize,
    pub camera: SimulatedCameraConfig,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            name: "synthetic".into(),
            frame_count: 20,
            fps: 10.0,
            integration_time_ms: 20.0,
            drop_every: 0,
            camera: SimulatedCameraConfig {
                write_latency: std::time::Duration::ZERO,
                ..Default::default()
            },
        }
    }
}

/// Record `frame_count` frames from a fresh simulated camera.
///
/// Capture timestamps are spaced `1 / fps` apart starting now, so replays
/// carry a realistic cadence regardless of how fast generation ran.
pub fn generate_recording(settings: &GeneratorSettings) -> Result<Recording, AcquisitionError> {
    if settings.fps <= 0.0 {
        return Err(AcquisitionError::ConfigurationFailed(
            "fps must be positive".into(),
        ));
    }

    let camera = SimulatedCamera::new(settings.camera.clone())?;
    camera.write_parameter(
        ParameterKey::IntegrationTime,
        ParameterValue::Float(settings.integration_time_ms),
    )?;

    let session = SessionInfo {
        name: settings.name.clone(),
        session_number: 1,
    };
    let spacing = ChronoDuration::microseconds((1_000_000.0 / settings.fps) as i64);
    let start = Utc::now();

    let mut recording = Recording::new(settings.name.clone());
    for slot in 0..settings.frame_count {
        let Some(mut frame) = camera.acquire()? else {
            break;
        };
        if settings.drop_every > 0 && (slot + 1) % settings.drop_every == 0 {
            recording.push_dropped(frame.sequence_number());
            continue;
        }
        frame.metadata.session = session.clone();
        frame.metadata.capture_timestamp = start + spacing * slot as i32;
        recording.push_frame(frame);
    }

    log::info!(
        "generated recording '{}' with {} frames ({} dropped)",
        recording.name,
        recording.len(),
        recording.dropped_count()
    );
    Ok(recording)
}
