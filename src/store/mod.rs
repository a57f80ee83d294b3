//! Opaque roster persistence.
use std::sync::Mutex;
use thiserror::Error;

pub mod file;
pub mod record;

pub use file::FileStore;
pub use record::{RosterRecord, ServiceRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
    #[error("Roster is not valid UTF-8: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),
}

/// Where the roster lives between sessions.
pub trait PersistentStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&self, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Keeps the roster in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes)),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        *self
            .bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(bytes.to_vec());
        Ok(())
    }
}
