//! Response cache
//!
//! Disk-backed key → content store with age-based staleness.
//! Entries are plain files; their modification time is their only metadata.

pub mod errors;
pub mod file_cache;
pub mod util;

pub use errors::CacheError;
pub use file_cache::{default_cache_dir, is_stale, CacheLookup, FileCache, PendingEntry, STALE_TEMP_AGE};
pub use util::{latest_modification, sanitize_filename};
