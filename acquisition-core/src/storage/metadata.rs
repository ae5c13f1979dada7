use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::error::AcquisitionError;
use crate::models::frame::FrameMetadata;

/// Contents of the JSON sidecar written next to an exported frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSidecar {
    pub metadata: FrameMetadata,
    /// SHA-256 hex digest of the payload file.
    pub sha256: String,
    pub payload_bytes: u64,
}

/// Path of the sidecar belonging to `payload_path`.
pub fn sidecar_path(payload_path: &Path) -> PathBuf {
    payload_path.with_extension("metadata.json")
}

/// Write frame metadata as a JSON sidecar file.
///
/// Creates `{payload}.metadata.json` alongside the payload.
pub fn write_sidecar(sidecar: &FrameSidecar, payload_path: &Path) -> Result<PathBuf, AcquisitionError> {
    let path = sidecar_path(payload_path);
    let json = serde_json::to_string_pretty(sidecar)
        .map_err(|e| AcquisitionError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json)
        .map_err(|e| AcquisitionError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read frame metadata from a JSON sidecar file.
pub fn read_sidecar(payload_path: &Path) -> Result<FrameSidecar, AcquisitionError> {
    let json = fs::read_to_string(sidecar_path(payload_path))
        .map_err(|e| AcquisitionError::StorageError(format!("failed to read metadata: {}", e)))?;
    let sidecar: FrameSidecar = serde_json::from_str(&json)
        .map_err(|e| AcquisitionError::StorageError(format!("failed to parse metadata: {}", e)))?;
    Ok(sidecar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::{Frame, FrameFlags};

    #[test]
    fn sidecar_survives_disk() {
        let payload = std::env::temp_dir().join("acquisition_test_sidecar.bin");
        let mut frame = Frame::new(4, vec![0; 8]).with_dimensions(2, 2, 2);
        frame.metadata.flags = FrameFlags::POOR_REFERENCE;
        let sidecar = FrameSidecar {
            metadata: frame.metadata.clone(),
            sha256: "abc".into(),
            payload_bytes: 8,
        };

        let path = write_sidecar(&sidecar, &payload).unwrap();
        assert!(path.to_string_lossy().ends_with(".metadata.json"));

        let read = read_sidecar(&payload).unwrap();
        assert_eq!(read, sidecar);
        assert!(read.metadata.flags.contains(FrameFlags::POOR_REFERENCE));

        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_sidecar_is_storage_error() {
        let payload = std::env::temp_dir().join("acquisition_test_no_such_payload.bin");
        let err = read_sidecar(&payload).unwrap_err();
        assert!(matches!(err, AcquisitionError::StorageError(_)));
    }
}
