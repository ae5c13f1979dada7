use serde::{Deserialize, Serialize};

/// Link state of the capture hardware.
///
/// Transitions are driven by the hardware and only ever observed:
/// ```text
/// offline ⇄ partially online ⇄ online
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HardwareState {
    #[default]
    Offline,
    PartiallyOnline,
    Online,
}

impl HardwareState {
    /// Derive the aggregate state from per-component online flags.
    pub fn from_components(online: impl IntoIterator<Item = bool>) -> Self {
        let (mut total, mut up) = (0usize, 0usize);
        for is_online in online {
            total += 1;
            if is_online {
                up += 1;
            }
        }
        match (up, total) {
            (0, _) => Self::Offline,
            (up, total) if up == total => Self::Online,
            _ => Self::PartiallyOnline,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }

    /// Whether frames can be captured at all.
    pub fn can_capture(&self) -> bool {
        !self.is_offline()
    }
}

/// Static description of a hardware sub-component (sensor, shutter, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub display_name: String,
    pub sensor_info: String,
    pub user_field: String,
    pub pixel_format: String,
}

impl ComponentInfo {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            sensor_info: String::new(),
            user_field: String::new(),
            pixel_format: String::new(),
        }
    }
}

/// Observed state of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub display_name: String,
    pub is_online: bool,
}

/// Hardware state plus every component's state, taken at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub state: HardwareState,
    pub components: Vec<ComponentState>,
}

/// Outcome of polling an asynchronous hardware command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncOutcome {
    /// The command completed.
    Done,
    /// The hardware is executing the command but it did not finish in time.
    Timeout,
    /// The command has not reached the hardware yet; retry later.
    Deferred,
    /// A newer command for the same parameter replaced this one.
    Overwritten,
}

impl AsyncOutcome {
    /// Terminal outcomes never change on subsequent polls.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Overwritten)
    }
}
