//! Storage effect handlers

mod file;
mod memory;

pub use file::FileChainStorage;
pub use memory::MemoryChainStorage;
