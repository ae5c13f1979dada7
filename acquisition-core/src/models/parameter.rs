use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Trigger mode of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationMode {
    #[default]
    Software,
    Internal,
    External,
}

/// Identifies one settable hardware parameter.
///
/// Component-scoped parameters carry the component index, so gain on
/// component 0 and gain on component 1 are independent mailboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    IntegrationTime,
    Fps,
    OperationMode,
    Average,
    Gain,
    AutoExposure,
    PreviewMode,
    Bandwidth,
    Continuous,
    ComponentGain(usize),
    ComponentIntegrationFactor(usize),
}

impl ParameterKey {
    pub fn component(&self) -> Option<usize> {
        match self {
            Self::ComponentGain(id) | Self::ComponentIntegrationFactor(id) => Some(*id),
            _ => None,
        }
    }
}

/// Untyped parameter value as written to the hardware link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Mode(OperationMode),
}

/// A Rust type that can be stored in a parameter slot.
pub trait ParameterType: Copy + Default + Send + Sync + 'static {
    fn into_value(self) -> ParameterValue;
    fn from_value(value: ParameterValue) -> Option<Self>;
}

impl ParameterType for f64 {
    fn into_value(self) -> ParameterValue {
        ParameterValue::Float(self)
    }

    fn from_value(value: ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Float(v) => Some(v),
            ParameterValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl ParameterType for i64 {
    fn into_value(self) -> ParameterValue {
        ParameterValue::Int(self)
    }

    fn from_value(value: ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl ParameterType for bool {
    fn into_value(self) -> ParameterValue {
        ParameterValue::Bool(self)
    }

    fn from_value(value: ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl ParameterType for OperationMode {
    fn into_value(self) -> ParameterValue {
        ParameterValue::Mode(self)
    }

    fn from_value(value: ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Mode(v) => Some(v),
            _ => None,
        }
    }
}

/// Typed handle to one settable parameter.
///
/// `Setting<f64>` can only be read as `f64` and written with an `f64`, so the
/// table of parameters stays uniform without per-field accessor pairs.
#[derive(Debug, PartialEq, Eq)]
pub struct Setting<T> {
    key: ParameterKey,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Setting<T> {}

impl<T: ParameterType> Setting<T> {
    const fn new(key: ParameterKey) -> Self {
        Self {
            key,
            _value: PhantomData,
        }
    }

    pub fn key(&self) -> ParameterKey {
        self.key
    }
}

impl Setting<f64> {
    /// Integration (exposure) time in milliseconds.
    pub const INTEGRATION_TIME: Self = Self::new(ParameterKey::IntegrationTime);
    /// Target frames per second for continuous capture.
    pub const FPS: Self = Self::new(ParameterKey::Fps);
    /// Global sensor gain.
    pub const GAIN: Self = Self::new(ParameterKey::Gain);

    pub const fn component_gain(component: usize) -> Self {
        Self::new(ParameterKey::ComponentGain(component))
    }

    pub const fn component_integration_factor(component: usize) -> Self {
        Self::new(ParameterKey::ComponentIntegrationFactor(component))
    }
}

impl Setting<i64> {
    /// Number of exposures averaged into one frame.
    pub const AVERAGE: Self = Self::new(ParameterKey::Average);
    pub const BANDWIDTH: Self = Self::new(ParameterKey::Bandwidth);
}

impl Setting<bool> {
    pub const AUTO_EXPOSURE: Self = Self::new(ParameterKey::AutoExposure);
    pub const PREVIEW_MODE: Self = Self::new(ParameterKey::PreviewMode);
    pub const CONTINUOUS: Self = Self::new(ParameterKey::Continuous);
}

impl Setting<OperationMode> {
    pub const OPERATION_MODE: Self = Self::new(ParameterKey::OperationMode);
}

/// Value a parameter holds before the hardware reports anything.
pub fn default_value(key: ParameterKey) -> ParameterValue {
    match key {
        ParameterKey::IntegrationTime => ParameterValue::Float(100.0),
        ParameterKey::Fps => ParameterValue::Float(10.0),
        ParameterKey::OperationMode => ParameterValue::Mode(OperationMode::Software),
        ParameterKey::Average => ParameterValue::Int(1),
        ParameterKey::AutoExposure | ParameterKey::PreviewMode | ParameterKey::Continuous => {
            ParameterValue::Bool(false)
        }
        ParameterKey::Bandwidth => ParameterValue::Int(0),
        ParameterKey::Gain
        | ParameterKey::ComponentGain(_)
        | ParameterKey::ComponentIntegrationFactor(_) => {
            ParameterValue::Float(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_roundtrip_through_value() {
        assert_eq!(f64::from_value(42.5f64.into_value()), Some(42.5));
        assert_eq!(bool::from_value(true.into_value()), Some(true));
        assert_eq!(
            OperationMode::from_value(OperationMode::Internal.into_value()),
            Some(OperationMode::Internal)
        );
    }

    #[test]
    fn mismatched_value_is_rejected() {
        assert_eq!(bool::from_value(ParameterValue::Float(1.0)), None);
        assert_eq!(i64::from_value(ParameterValue::Bool(true)), None);
        // integers widen into float parameters
        assert_eq!(f64::from_value(ParameterValue::Int(3)), Some(3.0));
    }

    #[test]
    fn component_settings_are_distinct() {
        assert_ne!(
            Setting::component_gain(0).key(),
            Setting::component_gain(1).key()
        );
        assert_eq!(Setting::component_gain(2).key().component(), Some(2));
        assert_eq!(Setting::FPS.key().component(), None);
    }

    #[test]
    fn defaults_match_types() {
        assert!(f64::from_value(default_value(ParameterKey::IntegrationTime)).is_some());
        assert!(i64::from_value(default_value(ParameterKey::Average)).is_some());
        assert!(OperationMode::from_value(default_value(ParameterKey::OperationMode)).is_some());
    }
}
