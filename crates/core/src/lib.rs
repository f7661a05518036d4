pub mod config;
pub mod error;

pub use config::{LoopConfig, PanicPolicy};
pub use error::*;
