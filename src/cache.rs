//! Content-addressable cache of step results
//!
//! Cache keys are chained across a task's steps: the root key fingerprints the
//! repository revision and workspace path, and the key after step `i` hashes
//! the key before it together with step `i`'s canonical definition. Changing
//! a step therefore invalidates it and every later step while earlier prefixes
//! keep their keys.
//!
//! An entry stored under the key for step `i` holds the results of steps
//! `1..=i`, so a single hit restores a whole prefix.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::batch_spec::Step;
use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::step::StepResult;

/// Fingerprint of a task's step prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Hex-encoded blake3 hash
    pub hash: String,
    /// Number of steps covered; 0 for the revision-only root
    pub steps: usize,
}

impl CacheKey {
    /// Root key: repository revision and workspace path only
    pub fn root(repo: &Repository, path: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"revision\0");
        hasher.update(repo.id.as_bytes());
        hasher.update(b"\0");
        hasher.update(repo.revision.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        Self {
            hash: hasher.finalize().to_hex().to_string(),
            steps: 0,
        }
    }

    /// Key covering one more step
    pub fn next(&self, step: &Step) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"step\0");
        hasher.update(self.hash.as_bytes());
        hasher.update(b"\0");
        hasher.update(&step.canonical_bytes());
        Self {
            hash: hasher.finalize().to_hex().to_string(),
            steps: self.steps + 1,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hash)
    }
}

/// All keys for one task, root first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyChain {
    keys: Vec<CacheKey>,
}

impl CacheKeyChain {
    pub fn new(repo: &Repository, path: &str, steps: &[Step]) -> Self {
        let mut keys = Vec::with_capacity(steps.len() + 1);
        keys.push(CacheKey::root(repo, path));
        for step in steps {
            let next = keys[keys.len() - 1].next(step);
            keys.push(next);
        }
        Self { keys }
    }

    pub fn root(&self) -> &CacheKey {
        &self.keys[0]
    }

    /// Key covering steps `1..=steps`
    pub fn key(&self, steps: usize) -> &CacheKey {
        &self.keys[steps]
    }

    /// Key covering every step
    pub fn full(&self) -> &CacheKey {
        &self.keys[self.keys.len() - 1]
    }

    /// Number of steps in the chain
    pub fn step_count(&self) -> usize {
        self.keys.len() - 1
    }
}

/// Stored results for a cached step prefix. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Results of steps `1..=key.steps`, in order
    pub results: Vec<StepResult>,
}

impl CacheEntry {
    fn is_consistent_with(&self, key: &CacheKey) -> bool {
        &self.key == key && self.results.len() == key.steps
    }
}

/// Concurrency-safe key-value store for cache entries
pub trait ExecutionCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store an entry. Storing identical content again is a no-op; an
    /// existing key is never overwritten.
    fn set(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove every entry, returning how many were removed
    fn clear(&self) -> Result<usize>;
}

/// Result of a longest-prefix lookup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheLookup {
    /// Number of leading steps restored from cache
    pub cached_steps: usize,
    pub results: Vec<StepResult>,
}

/// Find the longest cached prefix of a chain.
///
/// Tries the full chain first and walks back towards the root. Read errors
/// and malformed entries count as misses.
pub fn lookup_longest_prefix(cache: &dyn ExecutionCache, chain: &CacheKeyChain) -> CacheLookup {
    for steps in (1..=chain.step_count()).rev() {
        let key = chain.key(steps);
        match cache.get(key) {
            Ok(Some(entry)) if entry.is_consistent_with(key) => {
                debug!("Cache hit for {} covering {} step(s)", key, steps);
                return CacheLookup {
                    cached_steps: steps,
                    results: entry.results,
                };
            }
            Ok(Some(_)) => warn!("Ignoring inconsistent cache entry {}", key),
            Ok(None) => {}
            Err(e) => warn!("Cache read failed, treating as miss: {}", e),
        }
    }
    CacheLookup::default()
}

/// On-disk cache, one JSON file per key
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.hash))
    }

    /// Keys and sizes of all stored entries, sorted by key
    pub fn list(&self) -> Result<Vec<(String, u64)>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push((stem.to_string(), fs::metadata(&path)?.len()));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn cache_io(key: &CacheKey, error: impl std::fmt::Display) -> Error {
    Error::CacheIo {
        key: key.hash.clone(),
        message: error.to_string(),
    }
}

impl ExecutionCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_io(key, e)),
        };
        let entry = serde_json::from_slice(&data).map_err(|e| cache_io(key, e))?;
        Ok(Some(entry))
    }

    fn set(&self, entry: &CacheEntry) -> Result<()> {
        let key = &entry.key;
        let path = self.entry_path(key);
        let data = serde_json::to_vec_pretty(entry).map_err(|e| cache_io(key, e))?;

        if let Ok(existing) = fs::read(&path) {
            if existing != data {
                warn!("Cache entry {} already exists with different content, keeping it", key);
            }
            return Ok(());
        }

        fs::create_dir_all(&self.root).map_err(|e| cache_io(key, e))?;
        let mut file = tempfile::NamedTempFile::new_in(&self.root).map_err(|e| cache_io(key, e))?;
        file.write_all(&data).map_err(|e| cache_io(key, e))?;
        match file.persist_noclobber(&path) {
            Ok(_) => Ok(()),
            // Lost a race against another writer of the same key
            Err(_) if path.exists() => Ok(()),
            Err(e) => Err(cache_io(key, e.error)),
        }
    }

    fn clear(&self) -> Result<usize> {
        let entries = self.list()?;
        for (hash, _) in &entries {
            fs::remove_file(self.root.join(format!("{}.json", hash)))?;
        }
        Ok(entries.len())
    }
}

/// In-process cache, mainly for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| lock_poisoned())?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn lock_poisoned() -> Error {
    Error::LockPoisoned {
        context: "memory cache".to_string(),
    }
}

impl ExecutionCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        entries
            .entry(entry.key.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(|_| lock_poisoned())?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}
