//! Keyed JSON cache for external fetches.
//!
//! A value is reused only when the stored envelope carries the same version and
//! the same key as the request, and is younger than the key's `max_age` when
//! one is set. Anything else counts as a miss and is refetched.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::PipelineError;

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    namespace: String,
    parts: Vec<String>,
    max_age: Option<Duration>,
}

impl CacheKey {
    pub fn new<I, S>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.to_string(),
            parts: parts.into_iter().map(Into::into).collect(),
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn id(&self) -> String {
        let mut id = self.namespace.clone();
        for part in &self.parts {
            id.push('|');
            id.push_str(part);
        }
        id
    }

    fn file_name(&self) -> String {
        let digest = Sha256::digest(self.id().as_bytes());
        let hex = digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        format!("{}_{hex}.json", self.namespace)
    }
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub hit: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    key: String,
    created_at: u64,
    payload: T,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    offline: bool,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            offline: false,
        }
    }

    /// A cache that never calls its fetcher; a miss is a missing-input error.
    pub fn offline(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            offline: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    pub fn get_or_fetch<T, F>(&self, key: &CacheKey, fetch: F) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let path = self.path_for(key);
        if let Some(value) = self.load_fresh::<T>(&path, key) {
            debug!(key = %key.id(), path = %path.display(), "cache hit");
            return Ok(Cached { value, hit: true });
        }

        if self.offline {
            return Err(PipelineError::missing_input(
                path,
                format!("no cached entry for {} and running offline", key.id()),
            )
            .into());
        }

        info!(key = %key.id(), "cache miss, fetching");
        let value = fetch()?;
        self.store(&path, key, &value)?;
        Ok(Cached { value, hit: false })
    }

    fn load_fresh<T: DeserializeOwned>(&self, path: &Path, key: &CacheKey) -> Option<T> {
        let raw = fs::read_to_string(path).ok()?;
        let envelope = serde_json::from_str::<Envelope<T>>(&raw).ok()?;
        if envelope.version != CACHE_VERSION || envelope.key != key.id() {
            return None;
        }
        if let Some(max_age) = key.max_age {
            let now = system_time_to_secs(SystemTime::now())?;
            if now.saturating_sub(envelope.created_at) > max_age.as_secs() {
                return None;
            }
        }
        Some(envelope.payload)
    }

    fn store<T: Serialize>(&self, path: &Path, key: &CacheKey, value: &T) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create cache dir {}", self.root.display()))?;
        let envelope = Envelope {
            version: CACHE_VERSION,
            key: key.id(),
            created_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
            payload: value,
        };
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&envelope).context("serialize cache entry")?;
        fs::write(&tmp, json).context("write cache entry")?;
        fs::rename(&tmp, path).context("swap cache entry")?;
        Ok(())
    }
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;

    use super::{CacheKey, FileCache};
    use crate::error::PipelineError;

    #[test]
    fn second_lookup_is_a_hit_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = CacheKey::new("totals", ["2025-09-05"]);
        let calls = Cell::new(0);

        let first = cache
            .get_or_fetch(&key, || {
                calls.set(calls.get() + 1);
                Ok(vec![1.5_f64, 2.5])
            })
            .unwrap();
        let second = cache
            .get_or_fetch::<Vec<f64>, _>(&key, || {
                calls.set(calls.get() + 1);
                Ok(vec![])
            })
            .unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(second.value, vec![1.5, 2.5]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn foreign_key_in_same_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = CacheKey::new("weather", ["KC"]);
        let path = cache.path_for(&key);
        fs::write(
            &path,
            r#"{"version":1,"key":"weather|BUF","created_at":0,"payload":[9.0]}"#,
        )
        .unwrap();

        let got = cache.get_or_fetch(&key, || Ok(vec![1.0_f64])).unwrap();
        assert!(!got.hit);
        assert_eq!(got.value, vec![1.0]);
    }

    #[test]
    fn expired_entry_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key =
            CacheKey::new("forecast", ["x"]).with_max_age(std::time::Duration::from_secs(60));
        fs::write(
            cache.path_for(&key),
            r#"{"version":1,"key":"forecast|x","created_at":0,"payload":"old"}"#,
        )
        .unwrap();

        let got = cache
            .get_or_fetch(&key, || Ok("new".to_string()))
            .unwrap();
        assert!(!got.hit);
        assert_eq!(got.value, "new");
    }

    #[test]
    fn offline_miss_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::offline(dir.path());
        let key = CacheKey::new("totals", ["2025-09-05"]);
        let err = cache
            .get_or_fetch::<Vec<f64>, _>(&key, || panic!("offline cache must not fetch"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput { .. })
        ));
    }
}
