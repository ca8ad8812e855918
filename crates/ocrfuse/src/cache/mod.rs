//! Content-addressed result cache.
//!
//! One JSON file per key under the cache root, named by the key. Entries are
//! immutable once written: the key covers the full image bytes and the
//! processing parameters that affect the result, so the same key always
//! implies the same inputs. Concurrent writers for the same key are harmless
//! (last write wins, entries are equivalent).
//!
//! Caching is best-effort throughout: a malformed or unreadable entry is
//! treated as absent, and write failures never propagate to the extraction
//! path.

use crate::error::{FusionError, Result};
use crate::types::OcrResult;
use sha2::{Digest, Sha256};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Cache key: SHA-256 of the image bytes plus a 64-bit fingerprint of the
/// processing parameters.
///
/// The content half makes collisions between different images negligible;
/// the parameter half keeps results produced under different thresholds or
/// preprocessing flags in independent entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(image_bytes: &[u8], params: &[(&str, String)]) -> Self {
        let content_hash = hex::encode(Sha256::digest(image_bytes));
        Self(format!(
            "{}-{:016x}",
            content_hash,
            params_fingerprint(params)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministic 64-bit fingerprint over sorted key=value parameter pairs.
fn params_fingerprint(params: &[(&str, String)]) -> u64 {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(k, _)| *k);

    let mut hasher = ahash::AHasher::default();
    for (key, value) in &sorted {
        key.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    hasher.finish()
}

/// File-backed store of prior [`OcrResult`]s.
pub struct ResultCache {
    cache_dir: PathBuf,
}

impl ResultCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| {
            FusionError::cache_with_source(
                format!("failed to create cache directory {}", cache_dir.display()),
                e,
            )
        })?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key.as_str()))
    }

    /// Look up a prior result. Never fails: corruption is treated as absence.
    pub fn get(&self, key: &CacheKey) -> Option<OcrResult> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!("cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<OcrResult>(&bytes) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::debug!("discarding malformed cache entry {}: {}", path.display(), e);
                if let Err(e) = fs::remove_file(&path) {
                    tracing::debug!("failed to remove malformed cache entry: {}", e);
                }
                None
            }
        }
    }

    /// Store a result. Best-effort: failures are logged, never surfaced.
    pub fn put(&self, key: &CacheKey, result: &OcrResult) {
        let path = self.entry_path(key);
        let json = match serde_json::to_vec_pretty(result) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("failed to serialize cache entry: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&path, json) {
            tracing::warn!("cache write failed for {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OcrMethod;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn sample_result() -> OcrResult {
        let mut metadata = HashMap::new();
        metadata.insert("word_count".to_string(), serde_json::json!(12));
        OcrResult {
            text: "hello".to_string(),
            confidence: 0.9,
            method: OcrMethod::PrimaryVision,
            layout: None,
            metadata,
        }
    }

    #[test]
    fn test_key_deterministic() {
        let params = [("preprocess", "true".to_string())];
        let a = CacheKey::compute(b"image bytes", &params);
        let b = CacheKey::compute(b"image bytes", &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_sensitive_to_content() {
        let params = [("preprocess", "true".to_string())];
        let a = CacheKey::compute(b"image bytes", &params);
        let b = CacheKey::compute(b"image byteZ", &params);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_sensitive_to_params() {
        let a = CacheKey::compute(b"image", &[("threshold", "0.8".to_string())]);
        let b = CacheKey::compute(b"image", &[("threshold", "0.9".to_string())]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_param_order_irrelevant() {
        let a = CacheKey::compute(
            b"image",
            &[
                ("preprocess", "true".to_string()),
                ("threshold", "0.8".to_string()),
            ],
        );
        let b = CacheKey::compute(
            b"image",
            &[
                ("threshold", "0.8".to_string()),
                ("preprocess", "true".to_string()),
            ],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_get_put_round_trip() {
        let dir = tempdir().unwrap();
        let cache = ResultCache::new(dir.path()).unwrap();
        let key = CacheKey::compute(b"img", &[]);
        let result = sample_result();

        assert!(cache.get(&key).is_none());
        cache.put(&key, &result);
        assert_eq!(cache.get(&key), Some(result));
    }

    #[test]
    fn test_malformed_entry_treated_as_absent() {
        let dir = tempdir().unwrap();
        let cache = ResultCache::new(dir.path()).unwrap();
        let key = CacheKey::compute(b"img", &[]);

        let path = cache.entry_path(&key);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"{ not json").unwrap();
        drop(file);

        assert!(cache.get(&key).is_none());
        // The malformed file is cleaned up so the next write starts fresh.
        assert!(!path.exists());
    }

    #[test]
    fn test_put_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("sub")).unwrap();
        fs::remove_dir_all(cache.cache_dir()).unwrap();

        // Directory is gone; put must not panic or error.
        cache.put(&CacheKey::compute(b"img", &[]), &sample_result());
    }

    #[test]
    fn test_new_creates_nested_dirs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = ResultCache::new(&nested).unwrap();
        assert!(cache.cache_dir().exists());
    }
}
