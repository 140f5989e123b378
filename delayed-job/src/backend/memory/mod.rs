//! In-process store with the same semantics as the Redis layout

mod storage;

pub use storage::MemoryBackend;
