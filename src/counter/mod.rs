//! Durable per-credential counters.

pub mod file;

pub use file::FileCounterStore;

/// Value reported by [`CounterStore::get`] for keys never written.
pub const INITIAL_COUNTER: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
}

/// Key-value contract for monotonic counters. Callers serialize the
/// read-modify-write themselves; implementations only need `put` to be
/// crash-consistent.
pub trait CounterStore: Send {
    fn get(&self, key: &str) -> Result<u32, CounterError>;
    fn put(&mut self, key: &str, value: u32) -> Result<(), CounterError>;
}
