//! Local key-value store
//!
//! Either an in-memory map or a directory holding one file per key, so
//! several processes can share a store without overwriting each other's
//! keys. Every handle created with [`LocalStore::handle`] shares the same
//! backend and change channel but has its own origin id, so a write is
//! announced to every other handle and never echoed back to the writer.
//!
//! Directory stores also watch their key files. Changes written by another
//! process are announced with [`EXTERNAL_ORIGIN`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;

use crate::domain::ports::{KeyValueStore, StorageEvent, StorageSubscription};
use crate::error::StorageError;

const EVENT_CAPACITY: usize = 64;

const KEYS_DIR: &str = "keys";
const TMP_DIR: &str = "tmp";

/// Origin reported for changes made by another process
pub const EXTERNAL_ORIGIN: u64 = u64::MAX;

/// Last value this process wrote or announced, per key
type Known = Arc<Mutex<HashMap<String, Option<String>>>>;

struct KeyDir {
    keys: PathBuf,
    tmp: PathBuf,
    known: Known,
    _watcher: Option<Mutex<RecommendedWatcher>>,
}

enum Backend {
    Memory(RwLock<BTreeMap<String, String>>),
    Directory(KeyDir),
}

struct Inner {
    backend: Backend,
    events: broadcast::Sender<StorageEvent>,
    next_origin: AtomicU64,
}

pub struct LocalStore {
    inner: Arc<Inner>,
    origin: u64,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::from_backend(Backend::Memory(RwLock::new(BTreeMap::new())), events)
    }

    /// Open a directory-backed store, creating it as needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        let keys = dir.join(KEYS_DIR);
        let tmp = dir.join(TMP_DIR);
        std::fs::create_dir_all(&keys)?;
        std::fs::create_dir_all(&tmp)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let known = Known::default();
        let watcher = match watch_keys(&keys, events.clone(), known.clone()) {
            Ok(watcher) => Some(Mutex::new(watcher)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %keys.display(),
                    "Store watcher unavailable, changes from other processes go unannounced"
                );
                None
            }
        };

        let backend = Backend::Directory(KeyDir {
            keys,
            tmp,
            known,
            _watcher: watcher,
        });
        Ok(Self::from_backend(backend, events))
    }

    fn from_backend(backend: Backend, events: broadcast::Sender<StorageEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                events,
                next_origin: AtomicU64::new(1),
            }),
            origin: 0,
        }
    }

    /// Another handle on the same store, as a second browser tab would have.
    pub fn handle(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            origin: self.inner.next_origin.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn announce(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: self.origin,
        });
    }
}

fn poisoned() -> StorageError {
    StorageError::Corrupt("store lock poisoned".into())
}

/// File name for `key`. A leading dot is escaped so `.` and `..` stay keys.
fn encode_key(key: &str) -> Result<String, StorageError> {
    if key.is_empty() {
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty store key",
        )));
    }
    let encoded = urlencoding::encode(key).into_owned();
    if encoded.starts_with('.') {
        Ok(format!("%2E{}", &encoded[1..]))
    } else {
        Ok(encoded)
    }
}

fn decode_key(file_name: &str) -> Option<String> {
    urlencoding::decode(file_name).ok().map(|key| key.into_owned())
}

fn read_value(path: &Path) -> Result<Option<String>, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| StorageError::Corrupt(format!("{} is not UTF-8", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn watch_keys(
    keys: &Path,
    events: broadcast::Sender<StorageEvent>,
    known: Known,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    for path in &event.paths {
                        announce_external(path, &events, &known);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Store watch error"),
        },
        notify::Config::default(),
    )?;
    watcher.watch(keys, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Announce the current value of a key file unless this process already
/// knows it, which filters out the echo of our own writes.
fn announce_external(path: &Path, events: &broadcast::Sender<StorageEvent>, known: &Known) {
    let Some(key) = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(decode_key)
    else {
        return;
    };
    let Ok(mut known) = known.lock() else {
        return;
    };
    let current = match read_value(path) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "Unreadable key file");
            return;
        }
    };
    if known.get(&key) == Some(&current) {
        return;
    }

    tracing::debug!(key = %key, "Store key changed by another process");
    known.insert(key.clone(), current.clone());
    let _ = events.send(StorageEvent {
        key,
        new_value: current,
        origin: EXTERNAL_ORIGIN,
    });
}

impl KeyDir {
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.keys.join(encode_key(key)?))
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        read_value(&self.path_for(key)?)
    }

    /// Write through a temp file so readers never see a partial value.
    /// `known` is only updated once the rename has landed.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let encoded = encode_key(key)?;
        let target = self.keys.join(&encoded);
        let tmp = self.tmp.join(format!("{}.{}", encoded, std::process::id()));

        let mut known = self.known.lock().map_err(|_| poisoned())?;
        std::fs::write(&tmp, value)?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        known.insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    /// Returns whether a value was removed.
    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let target = self.path_for(key)?;
        let mut known = self.known.lock().map_err(|_| poisoned())?;
        match std::fs::remove_file(&target) {
            Ok(()) => {
                known.insert(key.to_string(), None);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.keys)? {
            let entry = entry?;
            if let Some(key) = entry.file_name().to_str().and_then(decode_key) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match &self.inner.backend {
            Backend::Memory(entries) => {
                Ok(entries.read().map_err(|_| poisoned())?.get(key).cloned())
            }
            Backend::Directory(dir) => dir.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        match &self.inner.backend {
            Backend::Memory(entries) => {
                entries
                    .write()
                    .map_err(|_| poisoned())?
                    .insert(key.to_string(), value.to_string());
            }
            Backend::Directory(dir) => dir.set(key, value)?,
        }
        self.announce(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = match &self.inner.backend {
            Backend::Memory(entries) => entries
                .write()
                .map_err(|_| poisoned())?
                .remove(key)
                .is_some(),
            Backend::Directory(dir) => dir.remove(key)?,
        };
        if removed {
            self.announce(key, None);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        match &self.inner.backend {
            Backend::Memory(entries) => {
                Ok(entries.read().map_err(|_| poisoned())?.keys().cloned().collect())
            }
            Backend::Directory(dir) => dir.keys(),
        }
    }

    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription::new(self.inner.events.subscribe(), self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn set_get_remove() {
        let store = LocalStore::in_memory();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store.remove("a").unwrap();
    }

    #[test]
    fn handles_share_entries() {
        let tab_a = LocalStore::in_memory();
        let tab_b = tab_a.handle();
        tab_a.set("theme", "dark").unwrap();
        assert_eq!(tab_b.get("theme").unwrap(), Some("dark".to_string()));
        assert_eq!(tab_b.keys().unwrap(), vec!["theme".to_string()]);
    }

    #[tokio::test]
    async fn events_skip_the_writer() {
        let tab_a = LocalStore::in_memory();
        let tab_b = tab_a.handle();
        let mut sub_a = tab_a.subscribe();
        let mut sub_b = tab_b.subscribe();

        tab_a.set("k", "v").unwrap();
        tab_b.remove("k").unwrap();

        let seen_by_b = sub_b.recv().await.unwrap();
        assert_eq!(seen_by_b.key, "k");
        assert_eq!(seen_by_b.new_value, Some("v".to_string()));

        let seen_by_a = sub_a.recv().await.unwrap();
        assert_eq!(seen_by_a.key, "k");
        assert_eq!(seen_by_a.new_value, None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store");

        let store = LocalStore::open(&path).unwrap();
        store.set("api-cache-version", "42").unwrap();
        store.set("..", "dots").unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("api-cache-version").unwrap(),
            Some("42".to_string())
        );
        assert_eq!(reopened.get("..").unwrap(), Some("dots".to_string()));
        assert_eq!(reopened.keys().unwrap(), vec!["..", "api-cache-version"]);
    }

    #[test]
    fn stores_on_one_directory_keep_each_others_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cli = LocalStore::open(dir.path()).unwrap();
        let watcher = LocalStore::open(dir.path()).unwrap();

        cli.set("offline_mutation_queue", "[{\"id\":\"1\"}]").unwrap();
        watcher.set("focus_paused_state", "{\"mode\":\"focus\"}").unwrap();
        assert_eq!(
            watcher.get("offline_mutation_queue").unwrap(),
            Some("[{\"id\":\"1\"}]".to_string())
        );

        drop(cli);
        drop(watcher);
        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.keys().unwrap(),
            vec!["focus_paused_state", "offline_mutation_queue"]
        );
    }

    #[tokio::test]
    async fn other_process_changes_are_announced() {
        let dir = tempfile::tempdir().unwrap();
        let watching = LocalStore::open(dir.path()).unwrap();
        let mut sub = watching.subscribe();
        let other = LocalStore::open(dir.path()).unwrap();

        other.set("focus_paused_state", "{\"mode\":\"focus\"}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key, "focus_paused_state");
        assert_eq!(event.new_value, Some("{\"mode\":\"focus\"}".to_string()));
        assert_eq!(event.origin, EXTERNAL_ORIGIN);
    }

    #[tokio::test]
    async fn own_file_writes_are_announced_once() {
        let dir = tempfile::tempdir().unwrap();
        let tab_a = LocalStore::open(dir.path()).unwrap();
        let tab_b = tab_a.handle();
        let mut sub_b = tab_b.subscribe();

        tab_a.set("theme", "dark").unwrap();

        let event = sub_b.recv().await.unwrap();
        assert_ne!(event.origin, EXTERNAL_ORIGIN);
        let echo = tokio::time::timeout(Duration::from_millis(300), sub_b.recv()).await;
        assert!(echo.is_err());
    }

    #[tokio::test]
    async fn failed_write_leaves_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let other = store.handle();
        let mut sub = other.subscribe();
        store.set("k", "1").unwrap();
        assert_eq!(sub.recv().await.unwrap().new_value, Some("1".to_string()));

        // A directory where the temp file should go makes the write fail
        let blocker = dir
            .path()
            .join(TMP_DIR)
            .join(format!("k.{}", std::process::id()));
        std::fs::create_dir(&blocker).unwrap();

        assert!(store.set("k", "2").is_err());
        assert_eq!(store.get("k").unwrap(), Some("1".to_string()));
        let event = tokio::time::timeout(Duration::from_millis(300), sub.recv()).await;
        assert!(event.is_err());
    }

    #[test]
    fn non_utf8_value_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join(KEYS_DIR).join("k"), [0xff, 0xfe]).unwrap();
        assert!(matches!(store.get("k"), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.set("", "v").is_err());
    }
}
