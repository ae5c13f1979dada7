pub mod async_handle;
pub mod executor;
