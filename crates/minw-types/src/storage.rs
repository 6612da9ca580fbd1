//! Storage adapter contract

/// Key-value callbacks supplied by the surrounding protocol.
///
/// The engine only ever hands keys across this boundary; values and their
/// encoding belong to the host. Implementations must be safe to call from
/// multiple worker threads.
pub trait StorageAdapter: Send + Sync {
    /// Invoked when a vertex executes its reads
    fn on_read(&self, keys: &[&str]);

    /// Invoked when a vertex executes its writes
    fn on_write(&self, keys: &[&str]);
}

/// Adapter that ignores all accesses, for tests and benchmarks
#[derive(Debug, Default)]
pub struct NoopStorage;

impl StorageAdapter for NoopStorage {
    fn on_read(&self, _keys: &[&str]) {}
    fn on_write(&self, _keys: &[&str]) {}
}
