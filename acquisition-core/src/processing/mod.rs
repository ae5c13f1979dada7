pub mod frame_queue;
pub mod result_queue;
