//! Context building: token estimation and the memory manager.

pub mod memory;
pub mod token;

pub use memory::MemoryManager;
