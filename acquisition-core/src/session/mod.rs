pub mod acquisition;
pub mod observer;
pub mod replay;
pub mod worker;
