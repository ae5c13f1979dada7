use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the payload of a frame has been transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessingMode {
    Preview,
    #[default]
    Raw,
    DarkSubtract,
    Reflectance,
    SpectralRadiance,
}

/// Quality flags attached to a frame.
///
/// Stored as a bitset so it serializes as a single integer in sidecars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameFlags(u32);

impl FrameFlags {
    pub const NONE: Self = Self(0);
    pub const OVERILLUMINATED: Self = Self(1 << 0);
    pub const POOR_REFERENCE: Self = Self(1 << 1);
    pub const POOR_WHITE_BALANCING: Self = Self(1 << 2);
    pub const DARK_INTTIME: Self = Self(1 << 3);
    pub const DARK_TEMP: Self = Self(1 << 4);
    pub const WHITE_INTTIME: Self = Self(1 << 5);
    pub const WHITE_TEMP: Self = Self(1 << 6);
    pub const WHITEDARK_INTTIME: Self = Self(1 << 7);
    pub const WHITEDARK_TEMP: Self = Self(1 << 8);

    const NAMES: [(Self, &'static str); 9] = [
        (Self::OVERILLUMINATED, "OVERILLUMINATED"),
        (Self::POOR_REFERENCE, "POOR_REFERENCE"),
        (Self::POOR_WHITE_BALANCING, "POOR_WHITE_BALANCING"),
        (Self::DARK_INTTIME, "DARK_INTTIME"),
        (Self::DARK_TEMP, "DARK_TEMP"),
        (Self::WHITE_INTTIME, "WHITE_INTTIME"),
        (Self::WHITE_TEMP, "WHITE_TEMP"),
        (Self::WHITEDARK_INTTIME, "WHITEDARK_INTTIME"),
        (Self::WHITEDARK_TEMP, "WHITEDARK_TEMP"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "FrameFlags({})", names.join(" | "))
    }
}

/// Session a frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub session_number: u32,
}

/// Everything known about a frame apart from its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub id: uuid::Uuid,
    pub sequence_number: u64,
    pub session: SessionInfo,
    pub capture_timestamp: DateTime<Utc>,
    pub processing_mode: ProcessingMode,
    pub flags: FrameFlags,
    /// Integration time the frame was captured with, in milliseconds.
    pub integration_time_ms: f64,
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    /// Set by an export sink once the frame has been persisted.
    pub export_path: Option<PathBuf>,
}

/// One captured (or replayed) hyperspectral image plus metadata.
///
/// The payload is opaque to the pipeline. Processing and export stages take
/// the frame by value and hand it back, stamping metadata on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub metadata: FrameMetadata,
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a raw frame stamped with the current time.
    pub fn new(sequence_number: u64, data: Vec<u8>) -> Self {
        Self {
            metadata: FrameMetadata {
                id: uuid::Uuid::new_v4(),
                sequence_number,
                session: SessionInfo::default(),
                capture_timestamp: Utc::now(),
                processing_mode: ProcessingMode::Raw,
                flags: FrameFlags::NONE,
                integration_time_ms: 0.0,
                width: 0,
                height: 0,
                bands: 0,
                export_path: None,
            },
            data,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32, bands: u32) -> Self {
        self.metadata.width = width;
        self.metadata.height = height;
        self.metadata.bands = bands;
        self
    }

    pub fn sequence_number(&self) -> u64 {
        self.metadata.sequence_number
    }
}

/// Rendered view of a frame produced by an optional view generator.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_insert_and_contains() {
        let mut flags = FrameFlags::NONE;
        assert!(flags.is_empty());

        flags.insert(FrameFlags::OVERILLUMINATED);
        flags.insert(FrameFlags::DARK_TEMP);

        assert!(flags.contains(FrameFlags::OVERILLUMINATED));
        assert!(flags.contains(FrameFlags::OVERILLUMINATED | FrameFlags::DARK_TEMP));
        assert!(!flags.contains(FrameFlags::POOR_REFERENCE));

        flags.remove(FrameFlags::DARK_TEMP);
        assert_eq!(flags, FrameFlags::OVERILLUMINATED);
    }

    #[test]
    fn flags_debug_lists_names() {
        let flags = FrameFlags::POOR_REFERENCE | FrameFlags::WHITE_TEMP;
        assert_eq!(format!("{:?}", flags), "FrameFlags(POOR_REFERENCE | WHITE_TEMP)");
    }

    #[test]
    fn metadata_serializes_flags_as_integer() {
        let mut frame = Frame::new(7, vec![1, 2, 3]).with_dimensions(4, 2, 8);
        frame.metadata.flags = FrameFlags::OVERILLUMINATED;

        let json = serde_json::to_value(&frame.metadata).unwrap();

        assert_eq!(json["sequence_number"], 7);
        assert_eq!(json["flags"], 1);
        assert_eq!(json["processing_mode"], "Raw");
        assert_eq!(json["bands"], 8);
    }
}
