//! Scoped stack allocator used for temporary native buffers.
//!
//! Allocations move a pointer downwards through a fixed region. A frame
//! saves the pointer and restores it on pop, releasing everything allocated
//! since. Each thread owns one allocator, created on first use.

mod config;
mod error;
mod frame;
mod stack;
pub mod thread;

pub use config::AllocatorConfig;
pub use error::AllocError;
pub use frame::CallSite;
pub use stack::{Frame, ScopedAllocator};
pub use thread::{push_frame, ThreadFrame};
