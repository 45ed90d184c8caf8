//! Overpass API client
//!
//! Runs XML queries against an Overpass interpreter endpoint through the paced
//! client, caching each response on disk under a name derived from the query.

use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::info;

use super::query::{build_xml_query, QueryError, SearchArea};
use crate::fetch::{CachedFetchError, CachedFetcher};
use crate::http::{FetchError, HttpTransport, Request, Transport};

/// Public Overpass interpreter
pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Default maximum age of cached query responses, in days
pub const DEFAULT_QUERY_MAX_AGE_DAYS: f64 = 7.0;

/// Errors from running an Overpass query
#[derive(Debug, thiserror::Error)]
pub enum OverpassError {
    #[error("Overpass request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Overpass query failed: {0}")]
    CachedFetch(#[from] CachedFetchError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Overpass response is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Cache key for a query: `cache_<sha1 of query>.osm`
pub fn default_cache_key(xml: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(xml.as_bytes());
    format!("cache_{:x}.osm", hasher.finalize())
}

fn into_text(body: Vec<u8>) -> Result<String, OverpassError> {
    String::from_utf8(body).map_err(|e| OverpassError::Encoding(e.utf8_error()))
}

/// Overpass interpreter client with an on-disk response cache
pub struct OverpassClient<T: Transport = HttpTransport> {
    fetcher: CachedFetcher<T>,
    endpoint: String,
}

impl<T: Transport> OverpassClient<T> {
    /// Client for the public Overpass instance
    pub fn new(fetcher: CachedFetcher<T>) -> Self {
        Self::with_endpoint(fetcher, DEFAULT_ENDPOINT)
    }

    /// Client for a specific interpreter endpoint
    pub fn with_endpoint(fetcher: CachedFetcher<T>, endpoint: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
        }
    }

    /// Interpreter endpoint queries are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, xml: &str) -> Request {
        Request::post_form(
            self.endpoint.as_str(),
            format!("data={}", urlencoding::encode(xml)),
        )
    }

    /// Run `xml` against the interpreter, bypassing the cache
    pub async fn query(&self, xml: &str) -> Result<String, OverpassError> {
        let body = self
            .fetcher
            .client()
            .download(&self.request(xml), || Ok(Vec::new()))
            .await?;
        into_text(body)
    }

    /// Run `xml`, reusing a cached response younger than `max_age_days`
    ///
    /// # Arguments
    /// * `xml` - Overpass XML query
    /// * `max_age_days` - Maximum age of a reusable cached response
    /// * `cache_key` - Cache entry name; defaults to [`default_cache_key`]
    pub async fn query_cached(
        &self,
        xml: &str,
        max_age_days: f64,
        cache_key: Option<&str>,
    ) -> Result<String, OverpassError> {
        let cache_key = cache_key
            .map(str::to_string)
            .unwrap_or_else(|| default_cache_key(xml));

        // A body that is not text is never written to the cache
        let fetched = self
            .fetcher
            .fetch_validated(&self.request(xml), &cache_key, max_age_days, |body| {
                std::str::from_utf8(body)
                    .map(|_| ())
                    .map_err(OverpassError::from)
            })
            .await?;

        let path = self.fetcher.cache().path_for(&cache_key);
        if fetched.from_cache {
            info!(
                path = %path.display(),
                "Using stored Overpass response; delete this file for an updated version"
            );
        } else {
            info!(path = %path.display(), "Overpass response stored");
        }
        into_text(fetched.content)
    }

    /// Build a query from `template_path` for `area` and run it cached
    pub async fn query_template(
        &self,
        template_path: &Path,
        area: &SearchArea,
        recurse: bool,
        max_age_days: f64,
        cache_key: Option<&str>,
    ) -> Result<String, OverpassError> {
        let xml = build_xml_query(template_path, area, recurse)?;
        self.query_cached(&xml, max_age_days, cache_key).await
    }
}
