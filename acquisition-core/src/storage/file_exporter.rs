use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::models::config::ExportSettings;
use crate::models::error::AcquisitionError;
use crate::models::frame::Frame;
use crate::storage::metadata::{write_sidecar, FrameSidecar};
use crate::traits::export_sink::ExportSink;

/// Export sink that writes each frame to its own file.
///
/// ## Layout
///
/// ```text
/// {export_dir}/{session}_{session_number:04}_{sequence:08}.bin
/// {export_dir}/{session}_{session_number:04}_{sequence:08}.metadata.json
/// ```
///
/// The sidecar carries the frame metadata and the SHA-256 of the payload.
/// `metadata.export_path` is stamped with the payload path on success.
pub struct FileExporter {
    settings: ExportSettings,
    frames_written: AtomicU64,
}

impl FileExporter {
    pub fn new(settings: ExportSettings) -> Result<Self, AcquisitionError> {
        fs::create_dir_all(&settings.export_dir).map_err(|e| {
            AcquisitionError::ConfigurationFailed(format!(
                "failed to create export directory {}: {}",
                settings.export_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            settings,
            frames_written: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Number of frames exported successfully.
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Destination of the payload for `frame`.
    pub fn payload_path(&self, frame: &Frame) -> PathBuf {
        let session = &frame.metadata.session;
        let prefix = if session.name.is_empty() {
            "frame"
        } else {
            session.name.as_str()
        };
        self.settings.export_dir.join(format!(
            "{}_{:04}_{:08}.bin",
            prefix,
            session.session_number,
            frame.sequence_number()
        ))
    }

    fn write_payload(&self, path: &Path, data: &[u8]) -> Result<(), AcquisitionError> {
        if path.exists() && !self.settings.allow_overwrite {
            return Err(AcquisitionError::Export(format!(
                "{} already exists",
                path.display()
            )));
        }

        let mut file = File::create(path)
            .map_err(|e| AcquisitionError::Export(format!("failed to create {}: {}", path.display(), e)))?;
        file.write_all(data)
            .map_err(|e| AcquisitionError::Export(format!("write failed: {}", e)))?;
        file.flush()
            .map_err(|e| AcquisitionError::Export(format!("flush failed: {}", e)))?;
        Ok(())
    }
}

impl ExportSink for FileExporter {
    fn apply(&self, mut frame: Frame) -> Result<Frame, AcquisitionError> {
        let path = self.payload_path(&frame);
        if let Err(err) = self.write_payload(&path, &frame.data) {
            log::error!("frame {} not exported: {}", frame.sequence_number(), err);
            return Err(err);
        }

        frame.metadata.export_path = Some(path.clone());
        if self.settings.write_sidecar {
            let sidecar = FrameSidecar {
                metadata: frame.metadata.clone(),
                sha256: sha256_hex(&frame.data),
                payload_bytes: frame.data.len() as u64,
            };
            write_sidecar(&sidecar, &path)
                .map_err(|e| AcquisitionError::Export(e.to_string()))?;
        }

        self.frames_written.fetch_add(1, Ordering::Relaxed);
        log::debug!("exported frame {} to {}", frame.sequence_number(), path.display());
        Ok(frame)
    }
}

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, AcquisitionError> {
    let data = fs::read(path)
        .map_err(|e| AcquisitionError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(sha256_hex(&data))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::SessionInfo;
    use crate::storage::metadata::read_sidecar;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("acquisition_export_test_{}", name));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    fn settings(dir: &Path) -> ExportSettings {
        ExportSettings {
            export_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn writes_payload_and_sidecar() {
        let dir = temp_dir("payload");
        let exporter = FileExporter::new(settings(&dir)).unwrap();
        let mut frame = Frame::new(12, vec![1, 2, 3, 4]);
        frame.metadata.session = SessionInfo {
            name: "leaf".into(),
            session_number: 3,
        };

        let exported = exporter.apply(frame).unwrap();

        let path = exported.metadata.export_path.clone().unwrap();
        assert_eq!(path, dir.join("leaf_0003_00000012.bin"));
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3, 4]);

        let sidecar = read_sidecar(&path).unwrap();
        assert_eq!(sidecar.payload_bytes, 4);
        assert_eq!(sidecar.sha256, sha256_file(&path).unwrap());
        assert_eq!(sidecar.metadata.export_path, Some(path));
        assert_eq!(exporter.frames_written(), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn refuses_to_overwrite_by_default() {
        let dir = temp_dir("no_overwrite");
        let exporter = FileExporter::new(settings(&dir)).unwrap();

        exporter.apply(Frame::new(1, vec![0])).unwrap();
        let err = exporter.apply(Frame::new(1, vec![9])).unwrap_err();

        assert!(matches!(err, AcquisitionError::Export(_)));
        assert_eq!(fs::read(dir.join("frame_0000_00000001.bin")).unwrap(), vec![0]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn overwrite_when_allowed() {
        let dir = temp_dir("overwrite");
        let exporter = FileExporter::new(ExportSettings {
            allow_overwrite: true,
            write_sidecar: false,
            ..settings(&dir)
        })
        .unwrap();

        exporter.apply(Frame::new(1, vec![0])).unwrap();
        let frame = exporter.apply(Frame::new(1, vec![9])).unwrap();

        let path = frame.metadata.export_path.unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![9]);
        assert!(read_sidecar(&path).is_err());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
