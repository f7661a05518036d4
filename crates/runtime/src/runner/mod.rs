//! Event loop runner -- owns the loop's lifecycle and the dispatch cycle.
//!
//! Split into focused submodules:
//! - `core`: EventLoop struct, constructor, lifecycle and accessor methods
//! - `execution`: the drain-and-dispatch cycle and callback failure policy

mod core;
mod execution;

pub use self::core::EventLoop;
