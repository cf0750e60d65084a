#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;
use tp_io::{IoError, LoadOptions, LoadReport};
use tp_table::Table;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("dataset cache lock was poisoned by a panicking caller")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] IoError),
}

/// A loaded, immutable dataset plus the clean-step report from its load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataset {
    pub table: Table,
    pub report: LoadReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    options_fingerprint: u64,
}

impl CacheKey {
    fn new(path: &Path, options: &LoadOptions) -> Self {
        // Canonicalize so different spellings of one file share an entry;
        // fall back to the given path for sources that don't exist yet
        // (the load will surface the IO error).
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let mut hasher = DefaultHasher::new();
        options.hash(&mut hasher);

        Self {
            path,
            options_fingerprint: hasher.finish(),
        }
    }
}

/// Memoization of the load step, keyed on source identity (path plus
/// load options). Loading the same source again returns the same `Arc`.
///
/// The cache is an optimization only: it is keyed on the load step and
/// never on filter state, and it must be created (or fetched via
/// [`DatasetCache::global`]) explicitly. `reset` is the teardown hook
/// for tests.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: Mutex<HashMap<CacheKey, Arc<LoadedDataset>>>,
}

impl DatasetCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache instance. Explicitly initialized on first use;
    /// callers that want isolation construct their own cache instead.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<DatasetCache> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Load a CSV source, reusing the cached dataset when the same path
    /// and options were loaded before. The lock is held across the load
    /// so concurrent callers of the same source share one instance.
    pub fn load_csv(
        &self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<Arc<LoadedDataset>, CacheError> {
        let key = CacheKey::new(path.as_ref(), options);

        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        if let Some(dataset) = entries.get(&key) {
            return Ok(Arc::clone(dataset));
        }

        let (table, report) = tp_io::read_csv_path(path, options)?;
        let dataset = Arc::new(LoadedDataset { table, report });
        entries.insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.lock().map_err(|_| CacheError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Drop every cached dataset. Teardown hook for tests and for
    /// callers that know the underlying sources changed.
    pub fn reset(&self) -> Result<(), CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use tp_io::{LoadOptions, TextEncoding};

    use super::DatasetCache;

    fn fixture_csv(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tp-cache-test-{name}.csv"));
        fs::write(&path, "Category,Sales\nA,10\nB,5\n").expect("fixture written");
        path
    }

    #[test]
    fn same_source_and_options_share_one_instance() {
        let cache = DatasetCache::new();
        let path = fixture_csv("share");

        let first = cache.load_csv(&path, &LoadOptions::default()).expect("first");
        let second = cache.load_csv(&path, &LoadOptions::default()).expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().expect("len"), 1);
    }

    #[test]
    fn different_options_key_different_entries() {
        let cache = DatasetCache::new();
        let path = fixture_csv("options");

        let utf8 = cache.load_csv(&path, &LoadOptions::default()).expect("utf8");
        let latin1 = cache
            .load_csv(
                &path,
                &LoadOptions::default().with_encoding(TextEncoding::Latin1),
            )
            .expect("latin1");

        assert!(!Arc::ptr_eq(&utf8, &latin1));
        assert_eq!(cache.len().expect("len"), 2);
    }

    #[test]
    fn reset_forgets_cached_loads() {
        let cache = DatasetCache::new();
        let path = fixture_csv("reset");

        let first = cache.load_csv(&path, &LoadOptions::default()).expect("first");
        cache.reset().expect("reset");
        assert!(cache.is_empty().expect("is_empty"));

        let reloaded = cache.load_csv(&path, &LoadOptions::default()).expect("reload");
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(first.table, reloaded.table);
    }

    #[test]
    fn missing_sources_surface_io_errors() {
        let cache = DatasetCache::new();
        let err = cache
            .load_csv("/nonexistent/tp-cache-test.csv", &LoadOptions::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("No such file"));
    }
}
