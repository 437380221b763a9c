//! C6: two-tier artifact storage for rendered PDFs. A memory tier backed by
//! [`crate::lru::LruCache`] holds bytes; a disk tier backed by the same
//! container holds pointers into an [`object_store::ObjectStore`] backend
//! (local filesystem, S3, or in-memory, selected at construction). Both
//! tiers key on certificate id and answer freshness queries against a
//! caller-supplied timestamp: an entry is usable when its own timestamp is
//! at or after the one requested (§4.4).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use crate::error::{Error, Result};
use crate::lru::{Cacheable, LruCache};
use crate::safe_cache::SafeCache;

#[derive(Clone)]
struct MemEntry {
    timestamp: DateTime<Utc>,
    bytes: Arc<Vec<u8>>,
}
impl Cacheable for MemEntry {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Clone)]
struct DiskEntry {
    timestamp: DateTime<Utc>,
    location: ObjectPath,
}
impl Cacheable for DiskEntry {
    fn size(&self) -> u64 {
        1
    }
}

/// `is_fresh_for(requested)` is true when this entry can satisfy a query for
/// `requested`: the cached artifact is the same age or newer.
fn is_fresh(cached: DateTime<Utc>, requested: DateTime<Utc>) -> bool {
    cached >= requested
}

/// `is_stale_for(requested)` is true when this entry is the same age or
/// older than `requested` and so should be evicted by a delete at that time.
fn is_stale(cached: DateTime<Utc>, requested: DateTime<Utc>) -> bool {
    cached <= requested
}

/// The fixed textual timestamp form of §6.5 — nanosecond precision,
/// space-separated, explicit zone — always rendered against UTC, so the
/// numeric offset is always `+0000` and the zone name is always `UTC`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f %z UTC";

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::StorageIo(anyhow::anyhow!("malformed timestamp in object name {text:?}: {e}")))
}

/// Object store keys can't reliably carry raw spaces, colons or pluses
/// across every backend (`file`/`s3`/`memory`), so the §6.5 textual form is
/// percent-encoded for the three characters it actually contains before
/// being embedded in an object name.
fn encode_timestamp_for_name(timestamp: DateTime<Utc>) -> String {
    format_timestamp(timestamp)
        .replace(' ', "%20")
        .replace(':', "%3A")
        .replace('+', "%2B")
}

fn decode_timestamp_from_name(encoded: &str) -> Result<DateTime<Utc>> {
    let text = encoded.replace("%2B", "+").replace("%3A", ":").replace("%20", " ");
    parse_timestamp(&text)
}

pub struct ArtifactStorage {
    store: Arc<dyn ObjectStore>,
    base_path: ObjectPath,
    mem_cache: SafeCache<String, MemEntry>,
    disk_cache: SafeCache<String, DiskEntry>,
}

impl ArtifactStorage {
    /// `backend` is one of `file`, `memory`, or `s3`; `base_path` is a
    /// prefix under which every artifact is stored (for `file`, an absolute
    /// directory; for `s3`, a key prefix within the configured bucket).
    pub fn new(backend: &str, base_path: &str) -> Result<Self> {
        match backend {
            // `LocalFileSystem::new_with_prefix` already roots the store at
            // `base_path`, so the in-store prefix passed to `with_store` must
            // be empty — otherwise every object path would nest `base_path`
            // twice (`<base_path>/<base_path>/<id>_<ts>.pdf`).
            "file" => {
                std::fs::create_dir_all(base_path).map_err(|e| Error::StorageIo(e.into()))?;
                let store = Arc::new(
                    LocalFileSystem::new_with_prefix(base_path)
                        .map_err(|e| Error::StorageIo(e.into()))?,
                );
                Ok(Self::with_store(store, ""))
            }
            "memory" => Ok(Self::with_store(Arc::new(InMemory::new()), base_path)),
            "s3" => Err(Error::StorageIo(anyhow::anyhow!(
                "s3 backend must be constructed via object_store::aws::AmazonS3Builder \
                 and passed to ArtifactStorage::with_store — bucket/region/credentials \
                 are environment-specific and not captured by this constructor"
            ))),
            other => Err(Error::StorageIo(anyhow::anyhow!("unknown storage backend: {other}"))),
        }
    }

    pub fn with_store(store: Arc<dyn ObjectStore>, base_path: &str) -> Self {
        let disk_store = store.clone();
        let on_eviction: crate::lru::EvictionCallback<String, DiskEntry> =
            Box::new(move |_id, entry| {
                let store = disk_store.clone();
                let location = entry.location.clone();
                // Eviction runs synchronously under the cache's write lock, so the
                // backing delete is handed off to the runtime rather than awaited
                // here. Best-effort: a failed delete just leaves an orphaned object.
                tokio::spawn(async move {
                    let _ = store.delete(&location).await;
                });
            });

        Self {
            store,
            base_path: ObjectPath::from(base_path.trim_matches('/')),
            mem_cache: SafeCache::new(Box::new(LruCache::new(0, None).unwrap())),
            disk_cache: SafeCache::new(Box::new(LruCache::new(0, Some(on_eviction)).unwrap())),
        }
    }

    fn object_path(&self, id: &str, timestamp: DateTime<Utc>) -> ObjectPath {
        self.base_path.child(format!("{id}_{}.pdf", encode_timestamp_for_name(timestamp)))
    }

    pub async fn add(&self, id: &str, timestamp: DateTime<Utc>, bytes: Vec<u8>) -> Result<()> {
        if let Some(entry) = self.disk_cache.peek(&id.to_string()) {
            if is_fresh(entry.timestamp, timestamp) {
                return Ok(());
            }
        }
        let location = self.object_path(id, timestamp);
        self.store
            .put(&location, PutPayload::from(bytes))
            .await
            .map_err(|e| Error::StorageIo(e.into()))?;
        self.disk_cache.add(id.to_string(), DiskEntry { timestamp, location });
        Ok(())
    }

    pub async fn get(&self, id: &str, timestamp: DateTime<Utc>) -> Result<Vec<u8>> {
        if let Some(entry) = self.mem_cache.peek(&id.to_string()) {
            if is_fresh(entry.timestamp, timestamp) {
                self.mem_cache.touch(&id.to_string());
                return Ok((*entry.bytes).clone());
            }
        }
        if let Some(entry) = self.disk_cache.peek(&id.to_string()) {
            if is_fresh(entry.timestamp, timestamp) {
                let bytes = self
                    .store
                    .get(&entry.location)
                    .await
                    .map_err(|e| Error::StorageIo(e.into()))?
                    .bytes()
                    .await
                    .map_err(|e| Error::StorageIo(e.into()))?
                    .to_vec();
                self.disk_cache.touch(&id.to_string());
                self.mem_cache.add(
                    id.to_string(),
                    MemEntry {
                        timestamp: entry.timestamp,
                        bytes: Arc::new(bytes.clone()),
                    },
                );
                return Ok(bytes);
            }
        }
        Err(Error::NotFound(format!(
            "no certificate artifact for id {id} at or after {timestamp}"
        )))
    }

    pub fn contains(&self, id: &str, timestamp: DateTime<Utc>) -> bool {
        if let Some(entry) = self.mem_cache.peek(&id.to_string()) {
            if is_fresh(entry.timestamp, timestamp) {
                return true;
            }
        }
        if let Some(entry) = self.disk_cache.peek(&id.to_string()) {
            if is_fresh(entry.timestamp, timestamp) {
                return true;
            }
        }
        false
    }

    pub fn delete(&self, id: &str, timestamp: DateTime<Utc>) {
        if let Some(entry) = self.mem_cache.peek(&id.to_string()) {
            if is_stale(entry.timestamp, timestamp) {
                self.mem_cache.remove(&id.to_string());
            }
        }
        if let Some(entry) = self.disk_cache.peek(&id.to_string()) {
            if is_stale(entry.timestamp, timestamp) {
                self.disk_cache.remove(&id.to_string());
            }
        }
    }

    /// Repopulates the disk cache index from whatever already exists under
    /// `base_path` in the backing store, so a restarted process doesn't treat
    /// every previously rendered certificate as a cache miss. Object keys
    /// encode `{id}_{timestamp}.pdf` per §6.5; a name that doesn't even have
    /// the `_`/`.pdf` shape isn't one of ours and is ignored, but once a
    /// timestamp component is found, it must parse per §6.5 — a mismatch
    /// there surfaces as `StorageIo` rather than being dropped silently.
    pub async fn load(&self) -> Result<()> {
        use futures_util::StreamExt;

        let mut listing = self.store.list(Some(&self.base_path));
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| Error::StorageIo(e.into()))?;
            let Some(filename) = meta.location.filename() else {
                continue;
            };
            let Some(stem) = filename.strip_suffix(".pdf") else {
                continue;
            };
            let Some((id, encoded_timestamp)) = stem.rsplit_once('_') else {
                continue;
            };
            let timestamp = decode_timestamp_from_name(encoded_timestamp)?;
            self.disk_cache.add(
                id.to_string(),
                DiskEntry {
                    timestamp,
                    location: meta.location,
                },
            );
        }
        Ok(())
    }
}
