pub mod config;
pub mod error;
pub mod frame;
pub mod parameter;
pub mod pipeline_result;
pub mod recording;
pub mod state;
