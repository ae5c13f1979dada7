use crate::command::async_handle::AsyncHandle;
use crate::models::parameter::{ParameterType, Setting};

/// Typed access to the hardware parameter table.
///
/// `get` returns the last value the hardware acknowledged (or the default
/// before any write). `set_async` returns immediately; the write happens on
/// a background thread and a newer write to the same setting overwrites a
/// pending one.
pub trait Settable<T: ParameterType> {
    fn get(&self, setting: Setting<T>) -> T;

    fn set_async(&self, setting: Setting<T>, value: T) -> AsyncHandle<()>;
}
