//! Key-value store port
//!
//! Small string-keyed store shared by every client instance on a machine,
//! the way browser tabs share local storage. Writers never see their own
//! change events; everybody else does.

use tokio::sync::broadcast;

use crate::error::StorageError;

/// A change made by some other handle on the same store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// Handle that made the change
    pub origin: u64,
}

/// Receives change events from other handles
pub struct StorageSubscription {
    rx: broadcast::Receiver<StorageEvent>,
    origin: u64,
}

impl StorageSubscription {
    pub fn new(rx: broadcast::Receiver<StorageEvent>, origin: u64) -> Self {
        Self { rx, origin }
    }

    /// Next foreign change, or `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.origin => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Storage subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// String key-value store with change notifications
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Subscribe to changes made through other handles.
    fn subscribe(&self) -> StorageSubscription;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }

    fn subscribe(&self) -> StorageSubscription {
        (**self).subscribe()
    }
}
