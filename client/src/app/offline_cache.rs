//! Offline response cache
//!
//! Network-first caching for `GET /api/...` requests. Successful responses
//! are stored; when the network fails the last stored response is served,
//! however old, or a synthetic 503 when there is none. Entries older than
//! the TTL are served marked `x-cache-status: stale`.
//!
//! The cache itself is owned by a single worker task. Callers talk to it
//! through a cloneable [`CacheHandle`]: commands go over an mpsc channel and
//! replies come back on oneshot channels. A persistent worker mirrors its
//! entries into the key-value store so they outlive the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::domain::ports::{ApiRequest, ApiResponse, ApiTransport, KeyValueStore, Method};
use crate::error::{ApiError, ClientError, StorageError, SyncError};

pub const CACHE_NAME: &str = "ignition-cache-v1";

/// Store key holding the last seen server cache version
pub const CACHE_VERSION_KEY: &str = "api-cache-version";

pub const CACHE_VERSION_HEADER: &str = "x-cache-version";

/// Set on responses served from the cache: `hit` or `stale`
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

const OFFLINE_BODY: &str = "Offline - No cached data available";

const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age after which an entry counts as stale
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: ApiResponse,
    pub stale: bool,
}

struct CacheEntry {
    response: ApiResponse,
    stored_at: DateTime<Utc>,
    hits: u64,
}

/// On-disk form of one entry; the body is base64.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    status: u16,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: String,
    stored_at: DateTime<Utc>,
    #[serde(default)]
    hits: u64,
}

/// Capacity-bounded map with least-hits eviction
pub struct MemoryCache {
    entries: HashMap<String, CacheEntry>,
    config: CacheConfig,
    hits: u64,
    stale_hits: u64,
    misses: u64,
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            hits: 0,
            stale_hits: 0,
            misses: 0,
        }
    }

    /// Stale entries are still returned; only the caller decides whether
    /// an old response beats none.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheHit> {
        let Some(entry) = self.entries.get_mut(key) else {
            self.misses += 1;
            return None;
        };

        let age = (now - entry.stored_at).to_std().unwrap_or(Duration::ZERO);
        let stale = age > self.config.ttl;
        entry.hits += 1;
        self.hits += 1;
        if stale {
            self.stale_hits += 1;
        }
        Some(CacheHit {
            response: entry.response.clone(),
            stale,
        })
    }

    pub fn insert(&mut self, key: String, response: ApiResponse, now: DateTime<Utc>) {
        self.insert_entry(
            key,
            CacheEntry {
                response,
                stored_at: now,
                hits: 0,
            },
        );
    }

    fn insert_entry(&mut self, key: String, entry: CacheEntry) {
        if self.config.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.evict_one();
        }
        self.entries.insert(key, entry);
    }

    /// Least hits first; oldest among equals.
    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.hits, entry.stored_at))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            tracing::debug!(key = %key, "Evicting cache entry");
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn invalidate_matching(&mut self, pattern: &Regex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.is_match(key));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.config.capacity,
            hits: self.hits,
            stale_hits: self.stale_hits,
            misses: self.misses,
        }
    }

    fn to_stored(&self) -> Vec<StoredEntry> {
        let mut stored: Vec<StoredEntry> = self
            .entries
            .iter()
            .map(|(key, entry)| StoredEntry {
                key: key.clone(),
                status: entry.response.status,
                status_text: entry.response.status_text.clone(),
                headers: entry.response.headers.clone(),
                body: STANDARD.encode(&entry.response.body),
                stored_at: entry.stored_at,
                hits: entry.hits,
            })
            .collect();
        stored.sort_by(|a, b| a.stored_at.cmp(&b.stored_at));
        stored
    }

    fn restore(config: CacheConfig, stored: Vec<StoredEntry>) -> Self {
        let mut cache = Self::new(config);
        for entry in stored {
            let Ok(body) = STANDARD.decode(&entry.body) else {
                tracing::debug!(key = %entry.key, "Skipping cache entry with bad body");
                continue;
            };
            let response = ApiResponse {
                status: entry.status,
                status_text: entry.status_text,
                headers: entry.headers,
                body,
            };
            cache.insert_entry(
                entry.key,
                CacheEntry {
                    response,
                    stored_at: entry.stored_at,
                    hits: entry.hits,
                },
            );
        }
        cache
    }
}

enum CacheCommand {
    Lookup {
        key: String,
        reply: oneshot::Sender<Option<CacheHit>>,
    },
    Store {
        key: String,
        response: ApiResponse,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    GetVersion {
        reply: oneshot::Sender<&'static str>,
    },
    InvalidateMatching {
        pattern: Regex,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<CacheStats>,
    },
}

pub struct CacheWorker {
    commands: mpsc::Receiver<CacheCommand>,
    cache: MemoryCache,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl CacheWorker {
    /// Start an in-memory worker. It stops once every handle is dropped.
    pub fn spawn(config: CacheConfig) -> (CacheHandle, JoinHandle<()>) {
        Self::start(MemoryCache::new(config), None)
    }

    /// Start a worker whose entries live in `store` under [`CACHE_NAME`].
    /// Unreadable saved entries are discarded.
    pub fn spawn_persistent(
        config: CacheConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> (CacheHandle, JoinHandle<()>) {
        let cache = match load_entries(&*store) {
            Ok(stored) => MemoryCache::restore(config, stored),
            Err(e) => {
                tracing::warn!(error = %e, cache = CACHE_NAME, "Discarding saved cache");
                MemoryCache::new(config)
            }
        };
        tracing::debug!(cache = CACHE_NAME, entries = cache.len(), "Cache loaded");
        Self::start(cache, Some(store))
    }

    fn start(
        cache: MemoryCache,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> (CacheHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let worker = CacheWorker {
            commands: rx,
            cache,
            store,
        };
        let task = tokio::spawn(worker.run());
        (CacheHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        tracing::debug!(cache = CACHE_NAME, "Cache worker stopped");
    }

    fn handle(&mut self, command: CacheCommand) {
        // A dropped reply receiver only means the caller gave up waiting
        match command {
            CacheCommand::Lookup { key, reply } => {
                let _ = reply.send(self.cache.get(&key, Utc::now()));
            }
            CacheCommand::Store { key, response } => {
                tracing::debug!(key = %key, "Caching API response");
                self.cache.insert(key, response, Utc::now());
                self.save();
            }
            CacheCommand::Clear { reply } => {
                let removed = self.cache.clear();
                tracing::info!(cache = CACHE_NAME, removed, "Cache cleared");
                self.save();
                let _ = reply.send(removed);
            }
            CacheCommand::GetVersion { reply } => {
                let _ = reply.send(CACHE_NAME);
            }
            CacheCommand::InvalidateMatching { pattern, reply } => {
                let removed = self.cache.invalidate_matching(&pattern);
                tracing::debug!(pattern = %pattern, removed, "Cache entries invalidated");
                if removed > 0 {
                    self.save();
                }
                let _ = reply.send(removed);
            }
            CacheCommand::Stats { reply } => {
                let _ = reply.send(self.cache.stats());
            }
        }
    }

    /// Hit counts reach the store with the next write.
    fn save(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_string(&self.cache.to_stored())
            .map_err(StorageError::from)
            .and_then(|json| store.set(CACHE_NAME, &json));
        if let Err(e) = result {
            tracing::warn!(error = %e, cache = CACHE_NAME, "Failed to save cache");
        }
    }
}

fn load_entries(store: &dyn KeyValueStore) -> Result<Vec<StoredEntry>, StorageError> {
    match store.get(CACHE_NAME)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// Cloneable address of a [`CacheWorker`]
#[derive(Clone)]
pub struct CacheHandle {
    commands: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
    async fn call<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> CacheCommand,
    ) -> Result<R, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    pub async fn lookup(&self, key: &str) -> Result<Option<CacheHit>, SyncError> {
        let key = key.to_string();
        self.call(|reply| CacheCommand::Lookup { key, reply }).await
    }

    pub async fn store(&self, key: &str, response: ApiResponse) -> Result<(), SyncError> {
        self.commands
            .send(CacheCommand::Store {
                key: key.to_string(),
                response,
            })
            .await
            .map_err(|_| SyncError::Closed)
    }

    /// Drop every entry; returns how many were removed.
    pub async fn clear(&self) -> Result<usize, SyncError> {
        self.call(|reply| CacheCommand::Clear { reply }).await
    }

    pub async fn version(&self) -> Result<&'static str, SyncError> {
        self.call(|reply| CacheCommand::GetVersion { reply }).await
    }

    /// Drop entries whose key matches `pattern`.
    pub async fn invalidate_matching(&self, pattern: Regex) -> Result<usize, SyncError> {
        self.call(|reply| CacheCommand::InvalidateMatching { pattern, reply })
            .await
    }

    pub async fn stats(&self) -> Result<CacheStats, SyncError> {
        self.call(|reply| CacheCommand::Stats { reply }).await
    }
}

/// Transport decorator applying the network-first policy
pub struct CachingTransport<T> {
    inner: T,
    cache: CacheHandle,
    origin: Option<String>,
}

impl<T: ApiTransport> CachingTransport<T> {
    pub fn new(inner: T, cache: CacheHandle) -> Self {
        Self {
            inner,
            cache,
            origin: None,
        }
    }

    /// Absolute URLs are only cached when they start with `origin`.
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.trim_end_matches('/').to_string());
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    fn is_cacheable(&self, request: &ApiRequest) -> bool {
        if request.method != Method::Get || !request.pathname().starts_with("/api/") {
            return false;
        }
        let lower = request.path.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return self
                .origin
                .as_deref()
                .is_some_and(|origin| lower.starts_with(&origin.to_ascii_lowercase()));
        }
        true
    }
}

pub fn offline_response() -> ApiResponse {
    ApiResponse::new(503, OFFLINE_BODY)
        .with_header("content-type", "text/plain")
        .with_status_text("Service Unavailable")
}

#[async_trait]
impl<T: ApiTransport> ApiTransport for CachingTransport<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if !self.is_cacheable(&request) {
            return self.inner.send(request).await;
        }

        let key = request.cache_key();
        match self.inner.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    if let Err(e) = self.cache.store(&key, response.clone()).await {
                        tracing::warn!(error = %e, "Cache worker unavailable");
                    }
                }
                Ok(response)
            }
            Err(e) if e.is_network() => {
                tracing::info!(key = %key, error = %e, "Network failed, using cache");
                match self.cache.lookup(&key).await {
                    Ok(Some(hit)) => {
                        if hit.stale {
                            tracing::debug!(key = %key, "Serving stale cached response");
                        }
                        let status = if hit.stale { "stale" } else { "hit" };
                        Ok(hit.response.with_header(CACHE_STATUS_HEADER, status))
                    }
                    Ok(None) => Ok(offline_response()),
                    Err(worker) => {
                        tracing::warn!(error = %worker, "Cache worker unavailable");
                        Ok(offline_response())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Unchanged,
    Invalidated {
        previous: Option<String>,
        current: String,
        removed: usize,
    },
    /// Server unreachable or no version header; cache left alone
    Unavailable,
}

/// Clears the cache when the server's `X-Cache-Version` changes
pub struct CacheVersionGuard<T> {
    transport: T,
    cache: CacheHandle,
    store: Arc<dyn KeyValueStore>,
}

impl<T: ApiTransport> CacheVersionGuard<T> {
    /// `transport` must bypass the cache.
    pub fn new(transport: T, cache: CacheHandle, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            transport,
            cache,
            store,
        }
    }

    pub async fn check_and_invalidate(&self) -> Result<VersionCheck, ClientError> {
        let request = ApiRequest::get("/api/").header("Cache-Control", "no-cache");
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Could not check cache version");
                return Ok(VersionCheck::Unavailable);
            }
        };

        let Some(current) = response.header(CACHE_VERSION_HEADER).map(str::to_string) else {
            return Ok(VersionCheck::Unavailable);
        };
        let previous = self.store.get(CACHE_VERSION_KEY)?;
        if previous.as_deref() == Some(current.as_str()) {
            tracing::debug!(version = %current, "Cache version matches");
            return Ok(VersionCheck::Unchanged);
        }

        tracing::info!(
            server = %current,
            stored = previous.as_deref().unwrap_or("none"),
            "Cache version mismatch, clearing cache"
        );
        let removed = self.cache.clear().await?;
        self.store.set(CACHE_VERSION_KEY, &current)?;

        Ok(VersionCheck::Invalidated {
            previous,
            current,
            removed,
        })
    }
}
