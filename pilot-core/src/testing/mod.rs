//! In-process doubles for the external collaborators.
//!
//! - [`MemoryDirectory`]: a pod directory that rejects stale writes
//! - [`StaticSentinel`]: a sentinel whose answer is set by the test

mod memory;
mod sentinel;

pub use memory::MemoryDirectory;
pub use sentinel::StaticSentinel;
