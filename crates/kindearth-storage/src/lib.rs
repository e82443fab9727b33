//! Key/value storage for the KindEarth storefront client.
//!
//! Two backends cover the two persistence scopes of a signed-in user:
//! - **Durable**: a JSON file that survives restarts ([`FileStorage`])
//! - **Ephemeral**: process memory, gone when the client exits ([`MemoryStorage`])

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::KeyValueStore;

use std::path::PathBuf;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the durable store backed by the given file.
pub fn create_durable_storage(path: PathBuf) -> Box<dyn KeyValueStore> {
    Box::new(FileStorage::new(path))
}

/// Create an empty ephemeral store.
pub fn create_ephemeral_storage() -> Box<dyn KeyValueStore> {
    Box::new(MemoryStorage::new())
}
