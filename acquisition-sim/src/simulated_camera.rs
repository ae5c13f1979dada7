//! Simulated hyperspectral camera.
//!
//! Produces synthetic frames whose pixel level follows the integration time
//! and gain, so parameter writes have a visible effect. Components can be
//! switched offline and captures can be made to fail for testing link loss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use acquisition_core::models::error::AcquisitionError;
use acquisition_core::models::frame::{Frame, FrameFlags, ProcessingMode};
use acquisition_core::models::parameter::{default_value, ParameterKey, ParameterType, ParameterValue};
use acquisition_core::models::state::{ComponentInfo, HardwareState};
use acquisition_core::traits::hardware_link::HardwareLink;

/// Largest value a 12-bit sensor pixel can hold.
pub const SATURATION: u16 = 4095;

/// Shape and timing of a simulated camera.
#[derive(Debug, Clone)]
pub struct SimulatedCameraConfig {
    pub components: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    /// Time the camera takes to acknowledge a parameter write.
    pub write_latency: Duration,
    /// Time one capture takes on top of the integration time scaling.
    pub capture_latency: Duration,
}

impl SimulatedCameraConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.components.is_empty() {
            return Err("camera needs at least one component".into());
        }
        if self.width == 0 || self.height == 0 || self.bands == 0 {
            return Err("frame dimensions must be positive".into());
        }
        Ok(())
    }

    fn pixel_count(&self) -> usize {
        (self.width * self.height * self.bands) as usize
    }
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            components: vec!["Spectral sensor".into(), "Pan sensor".into()],
            width: 16,
            height: 8,
            bands: 4,
            write_latency: Duration::from_millis(2),
            capture_latency: Duration::ZERO,
        }
    }
}

/// A `HardwareLink` backed by a synthetic image generator.
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    online: Mutex<Vec<bool>>,
    applied: Mutex<HashMap<ParameterKey, ParameterValue>>,
    next_sequence: AtomicU64,
    failing_captures: AtomicUsize,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig) -> Result<Self, AcquisitionError> {
        config.validate().map_err(AcquisitionError::ConfigurationFailed)?;
        let online = vec![true; config.components.len()];
        Ok(Self {
            config,
            online: Mutex::new(online),
            applied: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            failing_captures: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &SimulatedCameraConfig {
        &self.config
    }

    pub fn set_component_online(&self, id: usize, online: bool) -> Result<(), AcquisitionError> {
        let mut components = self.online.lock();
        let slot = components
            .get_mut(id)
            .ok_or(AcquisitionError::ComponentNotFound(id))?;
        if *slot != online {
            log::info!(
                "simulated component {} is now {}",
                id,
                if online { "online" } else { "offline" }
            );
        }
        *slot = online;
        Ok(())
    }

    /// Make the next `count` captures fail with a hardware error.
    pub fn fail_next_captures(&self, count: usize) {
        self.failing_captures.store(count, Ordering::SeqCst);
    }

    fn applied<T: ParameterType>(&self, key: ParameterKey) -> T {
        let value = self
            .applied
            .lock()
            .get(&key)
            .copied()
            .unwrap_or_else(|| default_value(key));
        T::from_value(value).unwrap_or_default()
    }

    /// Reject values the physical camera would refuse.
    fn check_value(key: ParameterKey, value: ParameterValue) -> Result<(), AcquisitionError> {
        let valid = match (key, value) {
            (ParameterKey::IntegrationTime, ParameterValue::Float(ms)) => ms > 0.0 && ms <= 10_000.0,
            (ParameterKey::Fps, ParameterValue::Float(fps)) => fps > 0.0 && fps <= 1_000.0,
            (ParameterKey::Average, ParameterValue::Int(n)) => n >= 1,
            (ParameterKey::Bandwidth, ParameterValue::Int(n)) => n >= 0,
            (
                ParameterKey::Gain | ParameterKey::ComponentGain(_) | ParameterKey::ComponentIntegrationFactor(_),
                ParameterValue::Float(v),
            ) => v > 0.0,
            (ParameterKey::OperationMode, ParameterValue::Mode(_)) => true,
            (
                ParameterKey::AutoExposure | ParameterKey::PreviewMode | ParameterKey::Continuous,
                ParameterValue::Bool(_),
            ) => true,
            _ => false,
        };
        if !valid {
            return Err(AcquisitionError::Hardware(format!(
                "camera rejected {:?} = {:?}",
                key, value
            )));
        }
        Ok(())
    }

    /// Synthetic 12-bit payload, little-endian `u16` per pixel in
    /// band-interleaved order.
    fn render(&self, integration_time_ms: f64) -> (Vec<u8>, FrameFlags) {
        let gain: f64 = self.applied(ParameterKey::Gain);
        let factor: f64 = self.applied(ParameterKey::ComponentIntegrationFactor(0));
        let level = integration_time_ms * gain * factor * 10.0;

        let mut flags = FrameFlags::NONE;
        let mut data = Vec::with_capacity(self.config.pixel_count() * 2);
        for y in 0..self.config.height {
            for x in 0..self.config.width {
                for band in 0..self.config.bands {
                    let pattern = f64::from((x + y + band * 3) % 32);
                    let raw = level + pattern * 4.0;
                    let pixel = if raw >= f64::from(SATURATION) {
                        flags.insert(FrameFlags::OVERILLUMINATED);
                        SATURATION
                    } else {
                        raw as u16
                    };
                    data.extend_from_slice(&pixel.to_le_bytes());
                }
            }
        }
        (data, flags)
    }
}

impl HardwareLink for SimulatedCamera {
    fn state(&self) -> HardwareState {
        HardwareState::from_components(self.online.lock().iter().copied())
    }

    fn component_count(&self) -> usize {
        self.config.components.len()
    }

    fn component_info(&self, id: usize) -> Result<ComponentInfo, AcquisitionError> {
        let name = self
            .config
            .components
            .get(id)
            .ok_or(AcquisitionError::ComponentNotFound(id))?;
        Ok(ComponentInfo {
            display_name: name.clone(),
            sensor_info: format!(
                "simulated {}x{}x{}",
                self.config.width, self.config.height, self.config.bands
            ),
            user_field: String::new(),
            pixel_format: "Mono12".into(),
        })
    }

    fn component_online(&self, id: usize) -> Result<bool, AcquisitionError> {
        self.online
            .lock()
            .get(id)
            .copied()
            .ok_or(AcquisitionError::ComponentNotFound(id))
    }

    fn write_parameter(&self, key: ParameterKey, value: ParameterValue) -> Result<(), AcquisitionError> {
        if self.state().is_offline() {
            return Err(AcquisitionError::DeviceNotAvailable);
        }
        Self::check_value(key, value)?;
        thread::sleep(self.config.write_latency);
        self.applied.lock().insert(key, value);
        log::debug!("simulated camera applied {:?} = {:?}", key, value);
        Ok(())
    }

    fn acquire(&self) -> Result<Option<Frame>, AcquisitionError> {
        let failing = self.failing_captures.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_captures.store(failing - 1, Ordering::SeqCst);
            return Err(AcquisitionError::Hardware("capture timed out on the sensor".into()));
        }

        thread::sleep(self.config.capture_latency);
        let integration_time_ms: f64 = self.applied(ParameterKey::IntegrationTime);
        let (data, flags) = self.render(integration_time_ms);

        let sequence_number = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let mut frame = Frame::new(sequence_number, data).with_dimensions(
            self.config.width,
            self.config.height,
            self.config.bands,
        );
        frame.metadata.integration_time_ms = integration_time_ms;
        frame.metadata.processing_mode = ProcessingMode::Raw;
        frame.metadata.flags = flags;
        Ok(Some(frame))
    }
}

/// Decode a payload rendered by the simulated camera into pixel values.
pub fn decode_pixels(data: &[u8]) -> Result<Vec<u16>, AcquisitionError> {
    if data.len() % 2 != 0 {
        return Err(AcquisitionError::Processing(format!(
            "payload of {} bytes is not 16-bit aligned",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
