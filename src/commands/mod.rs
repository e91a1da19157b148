pub mod log;
pub mod sync;
