pub mod file_exporter;
pub mod metadata;
pub mod recording;
