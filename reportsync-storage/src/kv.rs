use crate::error::StorageResult;
use std::sync::Arc;

/// A durable key-value medium that works without network access.
///
/// Implementations must make `write` all-or-nothing: a reader sees either the
/// previous value or the new one, never a mix.
pub trait KvStore: Send + Sync {
    /// Returns the value under `key`, or `None` if it was never written.
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value under `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        (**self).write(key, bytes)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key)
    }
}
