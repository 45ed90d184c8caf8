//! Overpass Fetch - polite, cached downloads for OpenStreetMap import tooling
//!
//! Downloads go through a paced client that pauses every few requests and
//! retries transient failures with linear backoff. Responses are kept in a
//! file cache and reused until they grow older than a caller-chosen age.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod http;
pub mod overpass;

pub use cache::{CacheError, FileCache};
pub use config::{ConfigError, FetchConfig};
pub use fetch::{CachedFetchError, CachedFetcher, Fetched};
pub use http::{FetchError, PacedClient, Request};
pub use overpass::{OverpassClient, OverpassError, SearchArea};
