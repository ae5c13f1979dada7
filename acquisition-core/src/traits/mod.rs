pub mod export_sink;
pub mod frame_source;
pub mod hardware_link;
pub mod processing_stage;
pub mod settable;
pub mod state_source;
