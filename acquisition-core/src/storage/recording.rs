use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::error::AcquisitionError;
use crate::models::frame::{Frame, FrameMetadata};
use crate::models::recording::{RecordedFrame, Recording};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ManifestEntry {
    Captured { file: String, metadata: FrameMetadata },
    Dropped { sequence_number: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    frames: Vec<ManifestEntry>,
}

fn storage_err(action: &str, path: &Path, e: impl std::fmt::Display) -> AcquisitionError {
    AcquisitionError::StorageError(format!("failed to {} {}: {}", action, path.display(), e))
}

/// Save a recording as a directory holding `manifest.json` and one payload
/// file per captured frame.
///
/// ```text
/// {dir}/manifest.json
/// {dir}/00000000.bin
/// {dir}/00000001.bin
/// ```
pub fn save_recording(recording: &Recording, dir: &Path) -> Result<PathBuf, AcquisitionError> {
    fs::create_dir_all(dir).map_err(|e| storage_err("create", dir, e))?;

    let mut entries = Vec::with_capacity(recording.len());
    for (index, entry) in recording.frames.iter().enumerate() {
        match entry {
            RecordedFrame::Captured(frame) => {
                let file = format!("{:08}.bin", index);
                let path = dir.join(&file);
                fs::write(&path, &frame.data).map_err(|e| storage_err("write", &path, e))?;
                entries.push(ManifestEntry::Captured {
                    file,
                    metadata: frame.metadata.clone(),
                });
            }
            RecordedFrame::Dropped { sequence_number } => {
                entries.push(ManifestEntry::Dropped {
                    sequence_number: *sequence_number,
                });
            }
        }
    }

    let manifest = Manifest {
        name: recording.name.clone(),
        frames: entries,
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| AcquisitionError::StorageError(format!("failed to serialize manifest: {}", e)))?;
    fs::write(&manifest_path, json).map_err(|e| storage_err("write", &manifest_path, e))?;

    log::info!(
        "saved recording '{}' ({} entries) to {}",
        recording.name,
        recording.len(),
        dir.display()
    );
    Ok(manifest_path)
}

/// Load a recording written by `save_recording`.
pub fn load_recording(dir: &Path) -> Result<Recording, AcquisitionError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = fs::read_to_string(&manifest_path).map_err(|e| storage_err("read", &manifest_path, e))?;
    let manifest: Manifest = serde_json::from_str(&json)
        .map_err(|e| AcquisitionError::StorageError(format!("failed to parse manifest: {}", e)))?;

    let mut recording = Recording::new(manifest.name);
    for entry in manifest.frames {
        match entry {
            ManifestEntry::Captured { file, metadata } => {
                let path = dir.join(&file);
                let data = fs::read(&path).map_err(|e| storage_err("read", &path, e))?;
                recording.push_frame(Frame { metadata, data });
            }
            ManifestEntry::Dropped { sequence_number } => recording.push_dropped(sequence_number),
        }
    }
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("acquisition_recording_test_{}", name));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn recording_survives_disk() {
        let dir = temp_dir("roundtrip");
        let mut recording = Recording::new("walkthrough");
        recording.push_frame(Frame::new(0, vec![1, 2]).with_dimensions(1, 1, 2));
        recording.push_dropped(1);
        recording.push_frame(Frame::new(2, vec![3, 4]));

        save_recording(&recording, &dir).unwrap();
        let loaded = load_recording(&dir).unwrap();

        assert_eq!(loaded, recording);
        assert!(dir.join("00000000.bin").exists());
        assert!(!dir.join("00000001.bin").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_payload_is_storage_error() {
        let dir = temp_dir("missing_payload");
        let mut recording = Recording::new("broken");
        recording.push_frame(Frame::new(0, vec![1]));
        save_recording(&recording, &dir).unwrap();
        fs::remove_file(dir.join("00000000.bin")).unwrap();

        let err = load_recording(&dir).unwrap_err();
        assert!(matches!(err, AcquisitionError::StorageError(_)));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_manifest_is_storage_error() {
        let err = load_recording(&temp_dir("no_manifest")).unwrap_err();
        assert!(matches!(err, AcquisitionError::StorageError(_)));
    }
}
