//! File-backed response cache with per-collection versioning.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use protocol::envelope::{collections, keys, version_hints};
use protocol::{CacheError, CacheKey, ClientId, CollectionName, FileMode, IndexLimit, Payload, VersionToken};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{fingerprint, store};

/// Collection → (key → entry byte size).
pub type CacheIndex = BTreeMap<CollectionName, BTreeMap<CacheKey, u64>>;

/// Collection → last known version token.
pub type VersionTable = BTreeMap<CollectionName, VersionToken>;

/// The collection whose version changes cascade to every `*.settings` collection.
const ADMIN_SETTINGS: &str = "admin.settings";

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Configuration for the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Directory holding every cache file.
    pub path: PathBuf,
    /// Permission bits applied to each written file.
    #[serde(default)]
    pub write_perms: FileMode,
    /// Maximum number of entries indexed per collection.
    #[serde(default)]
    pub index_limit: IndexLimit,
}

impl CacheConfig {
    /// Configuration with default permissions and index limit.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_perms: FileMode::default(),
            index_limit: IndexLimit::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Response cache for one client identity.
///
/// The index and version table are loaded on first access, held resident, and
/// persisted on every mutation.
#[derive(Debug)]
pub struct Cache {
    client_id: ClientId,
    config: CacheConfig,
    versions: Option<VersionTable>,
    index: Option<CacheIndex>,
}

impl Cache {
    /// Creates a cache. No file is touched until the first operation.
    pub fn new(client_id: ClientId, config: CacheConfig) -> Self {
        Self {
            client_id,
            config,
            versions: None,
            index: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Computes the key for a request. See [`fingerprint`].
    pub fn key(&self, url: &str, data: &Value) -> CacheKey {
        fingerprint(url, data)
    }

    /// Looks up a cached result.
    ///
    /// A hit requires the entry file to decode and the key to still be indexed
    /// under the result's collections. Anything else is a miss, and any
    /// dangling index references (plus the orphaned entry file) are purged.
    ///
    /// # Errors
    ///
    /// Only when purging has to rewrite the index and that write fails.
    pub fn get(&mut self, url: &str, data: &Value) -> Result<Option<Payload>, CacheError> {
        let key = self.key(url, data);
        let entry_path = self.entry_path(&key);
        let Some(bytes) = store::read(&entry_path) else {
            debug!(url, key = %key, "cache miss");
            return Ok(None);
        };

        let result = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(result)) => result,
            _ => {
                warn!(path = %entry_path.display(), "corrupt cache entry; discarding");
                store::remove(&entry_path);
                return Ok(None);
            }
        };

        if self.is_indexed(&result, &key) {
            debug!(url, key = %key, "cache hit");
            return Ok(Some(result));
        }

        warn!(url, key = %key, "cache entry not indexed; purging");
        store::remove(&entry_path);
        let dangling: Vec<CollectionName> = collections(&result)
            .into_iter()
            .filter(|c| self.index_mut().get(c).is_some_and(|keys| keys.contains_key(&key)))
            .collect();
        if !dangling.is_empty() {
            for collection in &dangling {
                if let Some(keys) = self.index_mut().get_mut(collection) {
                    keys.remove(&key);
                }
            }
            self.write_index()?;
        }
        Ok(None)
    }

    /// Stores a read result and indexes it under its versioned collections.
    ///
    /// A collection with neither a version hint in `result` nor a recorded
    /// version is not cacheable and is skipped.
    ///
    /// # Errors
    ///
    /// Any persistence failure. Callers treat it as fatal.
    pub fn put(&mut self, url: &str, data: &Value, result: &Payload) -> Result<(), CacheError> {
        let mut content = result.clone();
        content.entry(keys::DATA).or_insert(Value::Null);
        content.insert(keys::CACHED.to_string(), Value::Bool(true));

        let key = self.key(url, data);
        let bytes = serde_json::to_vec(&content)?;
        let size = store::write_atomic(
            &self.config.path,
            &self.entry_path(&key),
            &bytes,
            self.config.write_perms,
        )?;

        let hints = version_hints(result);
        for collection in collections(result) {
            let hint = hints.get(&collection).filter(|v| v.is_set()).cloned();
            if hint.is_none() && !self.versions_mut().contains_key(&collection) {
                debug!(%collection, "collection not cacheable");
                continue;
            }
            self.put_index(&collection, &key, size)?;
            if let Some(version) = hint {
                self.put_version(&collection, version)?;
            }
        }
        debug!(url, key = %key, size, "cached result");
        Ok(())
    }

    /// Registers `key` under `collection`, evicting first when the collection
    /// is full.
    ///
    /// The evicted entry is the one with the smallest recorded size. Ties are
    /// broken by key order, which is unrelated to insertion order.
    pub fn put_index(
        &mut self,
        collection: &CollectionName,
        key: &CacheKey,
        size: u64,
    ) -> Result<(), CacheError> {
        let limit = self.config.index_limit.get();
        let evicted = {
            let entries = self.index_mut().entry(collection.clone()).or_default();
            let evicted = if entries.len() >= limit && !entries.contains_key(key) {
                let smallest = entries
                    .iter()
                    .min_by_key(|(_, size)| **size)
                    .map(|(k, _)| k.clone());
                if let Some(smallest) = &smallest {
                    entries.remove(smallest);
                }
                smallest
            } else {
                None
            };
            entries.insert(key.clone(), size);
            evicted
        };
        if let Some(evicted) = evicted {
            debug!(%collection, key = %evicted, "evicted smallest entry");
            store::remove(&self.entry_path(&evicted));
        }
        self.write_index()
    }

    /// Records a collection's version. Unset tokens are ignored.
    pub fn put_version(
        &mut self,
        collection: &CollectionName,
        version: VersionToken,
    ) -> Result<(), CacheError> {
        if !version.is_set() {
            return Ok(());
        }
        self.versions_mut().insert(collection.clone(), version);
        self.write_versions()
    }

    /// Deletes a single entry regardless of collections. Used for ad hoc
    /// values that are not tied to a collection.
    pub fn remove(&mut self, url: &str, data: &Value) {
        let key = self.key(url, data);
        store::remove(&self.entry_path(&key));
    }

    /// Reconciles server version hints with the local table.
    ///
    /// Every collection whose version is new or different gets its version
    /// recorded and all of its entries purged. A change to `admin.settings`
    /// also purges every known `*.settings` collection.
    pub fn clear(&mut self, result: &Payload) -> Result<(), CacheError> {
        let hints = version_hints(result);
        if hints.is_empty() {
            return Ok(());
        }

        let mut invalid = BTreeSet::new();
        for (collection, version) in hints {
            if self.versions_mut().get(&collection) == Some(&version) {
                continue;
            }
            self.put_version(&collection, version)?;
            if collection.as_str() == ADMIN_SETTINGS {
                invalid.extend(
                    self.versions_mut()
                        .keys()
                        .filter(|c| c.is_settings())
                        .cloned(),
                );
            }
            invalid.insert(collection);
        }

        if invalid.is_empty() {
            return Ok(());
        }
        info!(collections = ?invalid, "invalidating collections");
        self.clear_collections(&invalid)
    }

    /// Purges every entry indexed under `invalid` and drops their index.
    pub fn clear_collections(
        &mut self,
        invalid: &BTreeSet<CollectionName>,
    ) -> Result<(), CacheError> {
        let mut purged = Vec::new();
        for collection in invalid {
            if let Some(entries) = self.index_mut().remove(collection) {
                purged.extend(entries.into_keys());
            }
        }
        for key in &purged {
            store::remove(&self.entry_path(key));
        }
        debug!(purged = purged.len(), "purged cache entries");
        self.write_index()
    }

    /// The local version table, loaded on first access.
    pub fn versions(&mut self) -> &VersionTable {
        self.versions_mut()
    }

    /// The version table as a `$cached` payload value.
    pub fn version_table(&mut self) -> Payload {
        self.versions_mut()
            .iter()
            .map(|(c, v)| (c.to_string(), v.as_value().clone()))
            .collect()
    }

    /// The collection index, loaded on first access.
    pub fn index(&mut self) -> &CacheIndex {
        self.index_mut()
    }

    // -----------------------------------------------------------------------
    // internals
    // -----------------------------------------------------------------------

    fn is_indexed(&mut self, result: &Payload, key: &CacheKey) -> bool {
        let Some(primary) = result
            .get(keys::COLLECTION)
            .and_then(Value::as_str)
            .and_then(CollectionName::new)
        else {
            return false;
        };
        let versioned: Vec<CollectionName> = collections(result)
            .into_iter()
            .filter(|c| *c == primary || self.versions_mut().contains_key(c))
            .collect();
        let index = self.index_mut();
        versioned
            .iter()
            .all(|c| index.get(c).is_some_and(|keys| keys.contains_key(key)))
    }

    fn versions_mut(&mut self) -> &mut VersionTable {
        if self.versions.is_none() {
            let path = self.file_path("versions");
            self.versions = Some(load(&path));
        }
        self.versions.get_or_insert_with(BTreeMap::new)
    }

    fn index_mut(&mut self) -> &mut CacheIndex {
        if self.index.is_none() {
            let path = self.file_path("index");
            self.index = Some(load(&path));
        }
        self.index.get_or_insert_with(BTreeMap::new)
    }

    fn write_index(&mut self) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(self.index_mut())?;
        store::write_atomic(
            &self.config.path,
            &self.file_path("index"),
            &bytes,
            self.config.write_perms,
        )?;
        Ok(())
    }

    fn write_versions(&mut self) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(self.versions_mut())?;
        store::write_atomic(
            &self.config.path,
            &self.file_path("versions"),
            &bytes,
            self.config.write_perms,
        )?;
        Ok(())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.file_path(&format!("{key}.result"))
    }

    fn file_path(&self, suffix: &str) -> PathBuf {
        self.config
            .path
            .join(format!("client.{}.{suffix}", self.client_id))
    }
}

fn load<T: DeserializeOwned + Default>(path: &std::path::Path) -> T {
    let Some(bytes) = store::read(path) else {
        return T::default();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "corrupt cache file; starting empty");
        T::default()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
