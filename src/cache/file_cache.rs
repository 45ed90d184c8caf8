//! Local File Cache
//!
//! Stores fetched responses on local disk, one file per cache key.
//! Freshness is judged from the file's modification time against a
//! caller-supplied maximum age; nothing about an entry is kept in memory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::errors::CacheError;
use super::util::latest_modification;

/// Suffix of in-progress writes; leftovers are removed by [`FileCache::cleanup`]
const TEMP_SUFFIX: &str = ".part";

/// Temp files younger than this may belong to a write still in progress
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const SECONDS_PER_DAY: f64 = 60.0 * 60.0 * 24.0;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// Entry content, if the entry exists
    pub content: Option<Vec<u8>>,
    /// Whether the entry is missing or older than the requested maximum age
    pub stale: bool,
}

impl CacheLookup {
    /// Content of a fresh entry, or None if the caller must refetch
    pub fn fresh(self) -> Option<Vec<u8>> {
        if self.stale {
            None
        } else {
            self.content
        }
    }
}

/// Whether an entry of `age_days` exceeds `max_age_days`
pub fn is_stale(age_days: f64, max_age_days: f64) -> bool {
    age_days > max_age_days
}

/// Local disk cache for fetched responses
#[derive(Debug, Clone)]
pub struct FileCache {
    /// Root directory for cached files
    cache_dir: PathBuf,
}

impl FileCache {
    /// Open the cache in the platform cache directory
    pub fn new() -> Result<Self, CacheError> {
        Self::open(default_cache_dir())
    }

    /// Open a cache rooted at `cache_dir`
    ///
    /// Creates the directory if needed and removes temp files left behind by
    /// interrupted writes. Temp files younger than [`STALE_TEMP_AGE`] are
    /// kept, since another process may still be writing them.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| CacheError::from_io(&cache_dir, e))?;

        let cache = Self { cache_dir };
        cache.cleanup();

        info!(cache_dir = %cache.cache_dir.display(), "File cache initialized");
        Ok(cache)
    }

    /// Look up `key`, judging staleness against `max_age_days`
    ///
    /// A missing entry is reported as `content: None, stale: true` so callers
    /// treat a miss and an outdated entry the same way.
    pub fn lookup(&self, key: &str, max_age_days: f64) -> Result<CacheLookup, CacheError> {
        let age = match self.age_in_days(key) {
            Ok(age) => age,
            Err(CacheError::NotFound(_)) => {
                debug!(key = key, "File cache MISS");
                return Ok(CacheLookup {
                    content: None,
                    stale: true,
                });
            }
            Err(e) => return Err(e),
        };

        let content = match self.read(key) {
            Ok(content) => content,
            // Removed between the stat and the read
            Err(CacheError::NotFound(_)) => {
                return Ok(CacheLookup {
                    content: None,
                    stale: true,
                })
            }
            Err(e) => return Err(e),
        };

        let stale = is_stale(age, max_age_days);
        debug!(
            key = key,
            age_days = age,
            max_age_days = max_age_days,
            stale = stale,
            "File cache HIT"
        );

        Ok(CacheLookup {
            content: Some(content),
            stale,
        })
    }

    /// Read the raw content stored under `key`
    pub fn read(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let local_path = self.path_for(key);
        fs::read(&local_path).map_err(|e| CacheError::from_io(&local_path, e))
    }

    /// Age of the entry in days, from its filesystem modification time
    ///
    /// An entry modified in the future has a negative age.
    pub fn age_in_days(&self, key: &str) -> Result<f64, CacheError> {
        let local_path = self.path_for(key);
        let modified = fs::metadata(&local_path)
            .and_then(|m| m.modified())
            .map_err(|e| CacheError::from_io(&local_path, e))?;

        let age = age_in_days_since(modified, SystemTime::now());
        debug!(path = %local_path.display(), age_days = age, "Cache entry age");
        Ok(age)
    }

    /// Store `data` under `key`, replacing any previous entry
    ///
    /// # Returns
    /// Path to the stored file
    pub fn store(&self, key: &str, data: &[u8]) -> Result<PathBuf, CacheError> {
        let mut entry = self.begin_write(key)?;
        entry
            .write_all(data)
            .map_err(|e| CacheError::from_io(entry.target(), e))?;
        entry.commit()
    }

    /// Start a streaming write for `key`
    ///
    /// Nothing is visible at the key's path until [`PendingEntry::commit`];
    /// dropping the entry discards what was written.
    pub fn begin_write(&self, key: &str) -> Result<PendingEntry, CacheError> {
        let local_path = self.path_for(key);

        // Ensure parent directory exists
        let parent = local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cache_dir.clone());
        fs::create_dir_all(&parent).map_err(|e| CacheError::from_io(&parent, e))?;

        let tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&parent)
            .map_err(|e| CacheError::from_io(&parent, e))?;

        Ok(PendingEntry {
            tmp,
            target: local_path,
            written: 0,
        })
    }

    /// Remove the entry for `key`
    ///
    /// # Returns
    /// Whether a file was removed
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let local_path = self.path_for(key);
        match fs::remove_file(&local_path) {
            Ok(()) => {
                debug!(path = %local_path.display(), "Removed cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::from_io(&local_path, e)),
        }
    }

    /// Clean up temp files from interrupted writes, anywhere below the root
    ///
    /// Only temp files older than [`STALE_TEMP_AGE`] are removed.
    pub fn cleanup(&self) {
        let cutoff = SystemTime::now()
            .checked_sub(STALE_TEMP_AGE)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        remove_stale_temp_files(&self.cache_dir, cutoff);
    }

    /// Most recent modification of any entry, searched recursively
    pub fn latest_modification(&self) -> Option<SystemTime> {
        latest_modification(&self.cache_dir)
    }

    /// Convert a cache key to its local path
    pub fn path_for(&self, key: &str) -> PathBuf {
        // Replace characters some filesystems reject
        let safe_key = key.replace(':', "_");
        self.cache_dir.join(safe_key)
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// A cache entry being written; see [`FileCache::begin_write`]
#[derive(Debug)]
pub struct PendingEntry {
    tmp: NamedTempFile,
    target: PathBuf,
    written: u64,
}

impl PendingEntry {
    /// Path the entry will occupy once committed
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Read back everything written so far
    pub fn contents(&mut self) -> Result<Vec<u8>, CacheError> {
        self.tmp
            .flush()
            .map_err(|e| CacheError::from_io(self.tmp.path(), e))?;
        fs::read(self.tmp.path()).map_err(|e| CacheError::from_io(self.tmp.path(), e))
    }

    /// Atomically publish the entry at its target path
    pub fn commit(self) -> Result<PathBuf, CacheError> {
        let PendingEntry {
            tmp,
            target,
            written,
        } = self;

        tmp.persist(&target)
            .map_err(|e| CacheError::from_io(&target, e.error))?;

        debug!(local = %target.display(), size = written, "Stored file in cache");
        Ok(target)
    }
}

impl Write for PendingEntry {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.tmp.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

/// Default cache root: `<platform cache dir>/overpass-fetch`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("overpass-fetch")
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
}

fn remove_stale_temp_files(dir: &Path, older_than: SystemTime) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            remove_stale_temp_files(&path, older_than);
            continue;
        }
        if !is_temp_file(&path) {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        match modified {
            Ok(modified) if modified < older_than => {
                debug!(path = %path.display(), "Removing stale temp file");
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale temp file");
                }
            }
            Ok(_) => debug!(path = %path.display(), "Keeping recent temp file"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to stat temp file"),
        }
    }
}

fn age_in_days_since(modified: SystemTime, now: SystemTime) -> f64 {
    match now.duration_since(modified) {
        Ok(age) => age.as_secs_f64() / SECONDS_PER_DAY,
        Err(e) => -e.duration().as_secs_f64() / SECONDS_PER_DAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn create_test_cache() -> (FileCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = FileCache::open(temp_dir.path()).expect("Failed to open cache");
        (cache, temp_dir)
    }

    fn backdate(cache: &FileCache, key: &str, by: Duration) {
        let file = fs::File::options()
            .write(true)
            .open(cache.path_for(key))
            .expect("open cache file");
        file.set_modified(SystemTime::now() - by)
            .expect("set modification time");
    }

    #[test]
    fn test_lookup_missing_key_is_stale_without_content() {
        let (cache, _temp_dir) = create_test_cache();

        let lookup = cache.lookup("never_written.osm", 30.0).unwrap();

        assert_eq!(lookup.content, None);
        assert!(lookup.stale);
    }

    #[test]
    fn test_store_then_lookup_is_fresh() {
        let (cache, _temp_dir) = create_test_cache();

        cache.store("fresh.osm", b"<osm/>").unwrap();
        let lookup = cache.lookup("fresh.osm", 7.0).unwrap();

        assert_eq!(lookup.content.as_deref(), Some(&b"<osm/>"[..]));
        assert!(!lookup.stale);
    }

    #[test]
    fn test_lookup_old_entry_is_stale_but_returns_content() {
        let (cache, _temp_dir) = create_test_cache();
        cache.store("old.osm", b"old").unwrap();
        backdate(&cache, "old.osm", DAY * 2);

        let stale = cache.lookup("old.osm", 1.0).unwrap();
        assert!(stale.stale);
        assert_eq!(stale.content.as_deref(), Some(&b"old"[..]));

        let fresh = cache.lookup("old.osm", 3.0).unwrap();
        assert!(!fresh.stale);
        assert_eq!(fresh.fresh().as_deref(), Some(&b"old"[..]));
    }

    #[test]
    fn test_staleness_boundary() {
        assert!(!is_stale(2.0, 2.0));
        assert!(is_stale(2.0 + 1e-9, 2.0));
        assert!(!is_stale(0.0, 0.0));
        assert!(is_stale(0.5, 0.0));
    }

    #[test]
    fn test_age_in_days_reflects_modification_time() {
        let (cache, _temp_dir) = create_test_cache();
        cache.store("aged.csv", b"a,b").unwrap();
        backdate(&cache, "aged.csv", DAY * 3);

        let age = cache.age_in_days("aged.csv").unwrap();

        assert!(age >= 3.0 && age < 3.01, "age was {age}");
    }

    #[test]
    fn test_age_in_days_missing_key_is_not_found() {
        let (cache, _temp_dir) = create_test_cache();

        let err = cache.age_in_days("missing.csv").unwrap_err();

        assert!(err.is_not_found());
    }

    #[test]
    fn test_age_of_future_modification_is_negative() {
        let now = SystemTime::now();
        let age = age_in_days_since(now + DAY, now);
        assert!((age + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let (cache, temp_dir) = create_test_cache();

        cache.store("nested/deeper/entry.html", b"<html/>").unwrap();

        assert!(temp_dir.path().join("nested/deeper/entry.html").exists());
    }

    #[test]
    fn test_store_overwrites_existing_entry() {
        let (cache, _temp_dir) = create_test_cache();

        cache.store("entry.json", b"first").unwrap();
        cache.store("entry.json", b"second").unwrap();

        assert_eq!(cache.read("entry.json").unwrap(), b"second");
    }

    #[test]
    fn test_binary_content_survives_unchanged() {
        let (cache, _temp_dir) = create_test_cache();
        let data: Vec<u8> = (0..=255u8).chain([0xff, 0xfe, 0x00]).collect();

        cache.store("blob.bin", &data).unwrap();

        assert_eq!(cache.read("blob.bin").unwrap(), data);
    }

    #[test]
    fn test_dropped_pending_entry_leaves_nothing_behind() {
        let (cache, temp_dir) = create_test_cache();

        {
            let mut entry = cache.begin_write("partial.osm").unwrap();
            entry.write_all(b"<osm><node").unwrap();
        }

        assert!(!cache.path_for("partial.osm").exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_pending_entry_commit_publishes_content() {
        let (cache, _temp_dir) = create_test_cache();

        let mut entry = cache.begin_write("streamed.osm").unwrap();
        entry.write_all(b"<osm>").unwrap();
        entry.write_all(b"</osm>").unwrap();
        assert_eq!(entry.written(), 11);
        assert_eq!(entry.contents().unwrap(), b"<osm></osm>");
        assert!(!cache.path_for("streamed.osm").exists());
        let path = entry.commit().unwrap();

        assert_eq!(path, cache.path_for("streamed.osm"));
        assert_eq!(fs::read(path).unwrap(), b"<osm></osm>");
    }

    #[test]
    fn test_remove_entry() {
        let (cache, _temp_dir) = create_test_cache();
        cache.store("gone.osm", b"x").unwrap();

        assert!(cache.remove("gone.osm").unwrap());
        assert!(!cache.remove("gone.osm").unwrap());
        assert!(cache.lookup("gone.osm", 30.0).unwrap().stale);
    }

    fn write_aged(path: &Path, content: &[u8], age: Duration) {
        fs::write(path, content).unwrap();
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
    }

    #[test]
    fn test_open_cleans_up_stale_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let leftover = temp_dir.path().join(".abc123.part");
        let keeper = temp_dir.path().join("keep.osm");
        write_aged(&leftover, b"half", DAY * 2);
        fs::write(&keeper, b"whole").unwrap();

        FileCache::open(temp_dir.path()).unwrap();

        assert!(!leftover.exists());
        assert!(keeper.exists());
    }

    #[test]
    fn test_open_cleans_up_stale_temp_files_in_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("deeper");
        fs::create_dir_all(&nested).unwrap();
        let leftover = nested.join(".page.html123.part");
        let keeper = nested.join("page.html");
        write_aged(&leftover, b"<ht", DAY * 2);
        write_aged(&keeper, b"<html/>", DAY * 2);

        FileCache::open(temp_dir.path()).unwrap();

        assert!(!leftover.exists());
        assert!(keeper.exists());
    }

    #[test]
    fn test_open_keeps_recent_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let recent = temp_dir.path().join(".xyz789.part");
        fs::write(&recent, b"in progress").unwrap();

        FileCache::open(temp_dir.path()).unwrap();

        assert!(recent.exists());
    }

    #[test]
    fn test_pending_write_survives_concurrent_open() {
        let (cache, temp_dir) = create_test_cache();
        let mut entry = cache.begin_write("nested/big.osm").unwrap();
        entry.write_all(b"<osm>").unwrap();

        // Another process opening the same cache mid-download
        FileCache::open(temp_dir.path()).unwrap();

        entry.write_all(b"</osm>").unwrap();
        let path = entry.commit().unwrap();
        assert_eq!(fs::read(path).unwrap(), b"<osm></osm>");
    }

    #[test]
    fn test_path_for_replaces_colons() {
        let (cache, temp_dir) = create_test_cache();
        assert_eq!(
            cache.path_for("http:cache.osm"),
            temp_dir.path().join("http_cache.osm")
        );
    }

    #[test]
    fn test_open_creates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("a").join("b");

        let cache = FileCache::open(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(cache.cache_dir(), root.as_path());
    }
}
