mod error;
pub mod time;
pub mod tracing_setup;

pub use crate::error::{Error, ErrorKind, ResultExt};
