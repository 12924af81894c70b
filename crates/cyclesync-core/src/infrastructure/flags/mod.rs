//! Durable flag store implementations

pub mod file;
pub mod memory;

pub use file::FileFlagStore;
pub use memory::MemoryFlagStore;
