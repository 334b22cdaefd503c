use crate::{
    Result, error,
    paths::{FileMode, write_atomic},
    resolver::Resolver,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

/// How long a cache entry may be reused without recomputing the hierarchy
/// hash. Repeated completion keystrokes land in this window, where rehashing
/// every config file would dominate latency.
pub const FAST_VALIDATION_TTL: Duration = Duration::from_secs(2);

/// Marker stored in the command map for functions, so completion can
/// distinguish them from aliases.
pub const FUNCTION_SENTINEL_PREFIX: &str = "__dirvana_function__";

/// One cached export result for a working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub app_version: String,

    /// Colon-joined SHA-256 of every config file in the active chain, in
    /// root-to-leaf order.
    pub hierarchy_hash: String,

    /// alias/function name -> command (functions use the sentinel form).
    /// `None` only occurs in entries written by a defective or foreign
    /// producer; such entries never validate.
    pub merged_command_map: Option<BTreeMap<String, String>>,

    /// alias -> tool whose completion protocol serves it.
    #[serde(default)]
    pub merged_completion_map: BTreeMap<String, String>,

    #[serde(default)]
    pub local_only: bool,

    /// The active chain directories, kept for cleanup diffing.
    #[serde(default)]
    pub chain: Vec<PathBuf>,

    /// The emitted shell code, reusable verbatim on a cache hit.
    #[serde(default)]
    pub shell_code: String,

    /// The shell family `shell_code` was rendered for. Switching shells
    /// forces a re-render even when the hierarchy is unchanged.
    #[serde(default)]
    pub shell: String,

    /// Environment variable names contributed by this entry, for cleanup.
    #[serde(default)]
    pub env_names: Vec<String>,
}

impl CacheEntry {
    pub fn is_function(command: &str) -> bool {
        command.starts_with(FUNCTION_SENTINEL_PREFIX)
    }

    pub fn function_sentinel(name: &str) -> String {
        format!("{FUNCTION_SENTINEL_PREFIX}{name}")
    }
}

/// Disk-backed cache of export results, one entry per working directory.
///
/// The whole map persists to a single JSON file. Read failures mean "not
/// found"; a corrupt file loads as an empty cache with a warning; write
/// failures surface as [`crate::error::Error`] values the caller logs, while the
/// in-memory state stays authoritative for the rest of the invocation.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cache file is corrupt; starting from an empty cache"
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, dir: &Path) -> Option<CacheEntry> {
        let key = crate::auth::normalize_dir(dir);
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(&key)
            .cloned()
    }

    /// Insert an entry and persist the whole cache atomically. The entry is
    /// visible in memory even when the persist fails.
    pub fn set(&self, entry: CacheEntry) -> Result<()> {
        let key = crate::auth::normalize_dir(&entry.path);
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(key, entry);
        self.persist()
    }

    /// Cheap validity check used on the completion hot path: correct app
    /// version, a command map present, a non-empty hierarchy hash, and an
    /// entry younger than [`FAST_VALIDATION_TTL`].
    pub fn is_valid_fast(entry: &CacheEntry, app_version: &str) -> bool {
        if entry.app_version != app_version {
            return false;
        }
        if entry.merged_command_map.is_none() {
            return false;
        }
        if entry.hierarchy_hash.is_empty() {
            return false;
        }

        let age = Utc::now()
            .signed_duration_since(entry.timestamp)
            .to_std()
            .unwrap_or(Duration::MAX);
        age < FAST_VALIDATION_TTL
    }

    /// Full validity check: recompute the active chain (discovery plus
    /// authorization gating) and compare the composite hash. Any byte change
    /// in any file of the chain, or a chain reshape, invalidates.
    pub fn validate_full(
        &self,
        entry: &CacheEntry,
        dir: &Path,
        resolver: &Resolver<'_>,
        app_version: &str,
    ) -> bool {
        if entry.app_version != app_version || entry.merged_command_map.is_none() {
            return false;
        }

        match resolver.hierarchy_hash_for(dir) {
            Ok(hash) => !hash.is_empty() && hash == entry.hierarchy_hash,
            Err(e) => {
                tracing::debug!(error = %e, "hierarchy rehash failed; treating entry as stale");
                false
            }
        }
    }

    pub fn clear(&self, dir: &Path) -> Result<()> {
        let key = crate::auth::normalize_dir(dir);
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(&key);
        self.persist()
    }

    /// Remove the entry for `dir` plus every descendant and ancestor entry.
    /// Walking down into, or up out of, a subtree invalidates every cached
    /// definition that could have contributed to it; unrelated siblings stay.
    pub fn clear_hierarchy(&self, dir: &Path) -> Result<()> {
        let target = PathBuf::from(crate::auth::normalize_dir(dir));
        self.entries
            .write()
            .expect("cache lock poisoned")
            .retain(|key, _| {
                let entry_path = Path::new(key);
                !(entry_path.starts_with(&target) || target.starts_with(entry_path))
            });
        self.persist()
    }

    pub fn clear_all(&self) -> Result<()> {
        self.entries.write().expect("cache lock poisoned").clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<()> {
        let json = {
            let entries = self.entries.read().expect("cache lock poisoned");
            serde_json::to_string_pretty(&*entries).context(error::CacheSerializeSnafu)?
        };

        write_atomic(&self.path, json.as_bytes(), FileMode::Shared).map_err(|e| {
            error::Error::CacheIo {
                path: self.path.clone(),
                source: std::io::Error::other(e.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> (CacheStore, tempfile::TempDir) {
        crate::logging::init_test_logging();
        let temp = tempfile::tempdir().unwrap();
        (CacheStore::open(temp.path().join("cache.json")), temp)
    }

    fn entry_for(dir: &str) -> CacheEntry {
        CacheEntry {
            path: PathBuf::from(dir),
            timestamp: Utc::now(),
            app_version: "1.0.0".to_string(),
            hierarchy_hash: "abc:def".to_string(),
            merged_command_map: Some(BTreeMap::from([(
                "ll".to_string(),
                "ls -la".to_string(),
            )])),
            merged_completion_map: BTreeMap::new(),
            local_only: false,
            chain: vec![PathBuf::from(dir)],
            shell_code: "alias ll='ls -la'".to_string(),
            shell: "bash".to_string(),
            env_names: Vec::new(),
        }
    }

    mod fast_validation {
        use super::*;

        #[test]
        fn fresh_entry_is_valid() {
            let entry = entry_for("/p");
            assert!(CacheStore::is_valid_fast(&entry, "1.0.0"));
        }

        #[test]
        fn version_mismatch_invalidates() {
            let entry = entry_for("/p");
            assert!(!CacheStore::is_valid_fast(&entry, "2.0.0"));
        }

        #[test]
        fn missing_command_map_invalidates() {
            let mut entry = entry_for("/p");
            entry.merged_command_map = None;
            assert!(!CacheStore::is_valid_fast(&entry, "1.0.0"));
        }

        #[test]
        fn empty_hierarchy_hash_invalidates() {
            let mut entry = entry_for("/p");
            entry.hierarchy_hash = String::new();
            assert!(!CacheStore::is_valid_fast(&entry, "1.0.0"));
        }

        #[test]
        fn old_entry_invalidates() {
            let mut entry = entry_for("/p");
            entry.timestamp = Utc::now() - chrono::Duration::seconds(10);
            assert!(!CacheStore::is_valid_fast(&entry, "1.0.0"));
        }
    }

    mod store_operations {
        use super::*;

        #[test]
        fn set_then_get() {
            let (cache, _temp) = test_cache();

            cache.set(entry_for("/proj")).unwrap();
            let entry = cache.get(Path::new("/proj")).unwrap();
            assert_eq!(entry.shell_code, "alias ll='ls -la'");
        }

        #[test]
        fn get_normalizes_trailing_separator() {
            let (cache, _temp) = test_cache();

            cache.set(entry_for("/proj")).unwrap();
            assert!(cache.get(Path::new("/proj/")).is_some());
        }

        #[test]
        fn round_trips_through_disk() {
            let temp = tempfile::tempdir().unwrap();
            let path = temp.path().join("cache.json");

            {
                let cache = CacheStore::open(path.clone());
                cache.set(entry_for("/proj")).unwrap();
            }

            let reopened = CacheStore::open(path);
            assert!(reopened.get(Path::new("/proj")).is_some());
        }

        #[test]
        fn corrupt_file_loads_as_empty() {
            let temp = tempfile::tempdir().unwrap();
            let path = temp.path().join("cache.json");
            std::fs::write(&path, "{{{ not json").unwrap();

            let cache = CacheStore::open(path);
            assert!(cache.is_empty());
        }

        #[test]
        fn missing_file_loads_as_empty() {
            let temp = tempfile::tempdir().unwrap();
            let cache = CacheStore::open(temp.path().join("never-written.json"));
            assert!(cache.is_empty());
        }

        #[test]
        fn clear_removes_single_entry() {
            let (cache, _temp) = test_cache();
            cache.set(entry_for("/a")).unwrap();
            cache.set(entry_for("/b")).unwrap();

            cache.clear(Path::new("/a")).unwrap();
            assert!(cache.get(Path::new("/a")).is_none());
            assert!(cache.get(Path::new("/b")).is_some());
        }
    }

    mod hierarchy_clearing {
        use super::*;

        #[test]
        fn removes_self_descendants_and_ancestors() {
            let (cache, _temp) = test_cache();
            cache.set(entry_for("/a")).unwrap();
            cache.set(entry_for("/a/b")).unwrap();
            cache.set(entry_for("/a/b/c")).unwrap();

            cache.clear_hierarchy(Path::new("/a/b")).unwrap();

            assert!(cache.get(Path::new("/a")).is_none(), "ancestor must be cleared");
            assert!(cache.get(Path::new("/a/b")).is_none());
            assert!(
                cache.get(Path::new("/a/b/c")).is_none(),
                "descendant must be cleared"
            );
        }

        #[test]
        fn siblings_survive() {
            let (cache, _temp) = test_cache();
            cache.set(entry_for("/a/b")).unwrap();
            cache.set(entry_for("/a/sibling")).unwrap();
            cache.set(entry_for("/unrelated")).unwrap();

            cache.clear_hierarchy(Path::new("/a/b")).unwrap();

            assert!(cache.get(Path::new("/a/sibling")).is_some());
            assert!(cache.get(Path::new("/unrelated")).is_some());
        }

        #[test]
        fn clear_all_empties_the_store() {
            let (cache, _temp) = test_cache();
            cache.set(entry_for("/a")).unwrap();
            cache.set(entry_for("/b")).unwrap();

            cache.clear_all().unwrap();
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn function_sentinel_round_trip() {
        let sentinel = CacheEntry::function_sentinel("deploy");
        assert_eq!(sentinel, "__dirvana_function__deploy");
        assert!(CacheEntry::is_function(&sentinel));
        assert!(!CacheEntry::is_function("kubectl get pods"));
    }
}
