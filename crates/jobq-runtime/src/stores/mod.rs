//! Store implementations of [`crate::backend::QueueBackend`].

pub mod memory;

pub use memory::MemoryQueueStore;
