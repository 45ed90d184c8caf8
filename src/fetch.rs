//! Cached Fetch
//!
//! Consults the file cache before touching the network. On a miss or a stale
//! entry the request goes out through the paced client, streaming straight
//! into a pending cache entry that is only published once the download succeeds.

use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, FileCache, PendingEntry};
use crate::http::{FetchError, HttpTransport, PacedClient, Request, Transport};

/// Default maximum age of plain downloads, in days
pub const DEFAULT_MAX_AGE_DAYS: f64 = 30.0;

/// Failure of a cached fetch
#[derive(Debug, thiserror::Error)]
pub enum CachedFetchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Content returned by [`CachedFetcher::fetch_validated`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: Vec<u8>,
    /// Whether the content was served from the cache without a request
    pub from_cache: bool,
}

/// Paced client and file cache working together
pub struct CachedFetcher<T: Transport = HttpTransport> {
    client: PacedClient<T>,
    cache: FileCache,
}

impl<T: Transport> Clone for CachedFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Transport> CachedFetcher<T> {
    pub fn new(client: PacedClient<T>, cache: FileCache) -> Self {
        Self { client, cache }
    }

    /// The underlying paced client
    pub fn client(&self) -> &PacedClient<T> {
        &self.client
    }

    /// The underlying file cache
    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Fetch `request`, reusing the entry under `cache_key` while it is fresh
    ///
    /// On failure nothing new is published under `cache_key`; any earlier
    /// entry is left as it was. Errors propagate to the caller.
    pub async fn fetch_cached(
        &self,
        request: &Request,
        cache_key: &str,
        max_age_days: f64,
    ) -> Result<Vec<u8>, CachedFetchError> {
        let fetched = self
            .fetch_validated(request, cache_key, max_age_days, |_| {
                Ok::<(), CachedFetchError>(())
            })
            .await?;
        Ok(fetched.content)
    }

    /// Like [`Self::fetch_cached`], but only keeps content `validate` accepts
    ///
    /// A downloaded body that fails validation is discarded before it reaches
    /// the cache and the validation error is returned. A fresh cached entry
    /// that fails validation is treated as a miss.
    pub async fn fetch_validated<V, E>(
        &self,
        request: &Request,
        cache_key: &str,
        max_age_days: f64,
        validate: V,
    ) -> Result<Fetched, E>
    where
        V: Fn(&[u8]) -> Result<(), E>,
        E: From<CachedFetchError>,
    {
        let lookup = self
            .cache
            .lookup(cache_key, max_age_days)
            .map_err(CachedFetchError::from)?;
        if let Some(content) = lookup.fresh() {
            if validate(&content).is_ok() {
                debug!(key = cache_key, "Returning cached response");
                return Ok(Fetched {
                    content,
                    from_cache: true,
                });
            }
            warn!(key = cache_key, "Cached response failed validation, fetching again");
        }

        let cache = &self.cache;
        let mut entry: PendingEntry = self
            .client
            .download(request, || {
                cache
                    .begin_write(cache_key)
                    .map_err(|e| FetchError::Io(cache_error_to_io(e)))
            })
            .await
            .map_err(CachedFetchError::from)?;

        let content = entry.contents().map_err(CachedFetchError::from)?;
        // Dropping the entry discards the temp file
        validate(&content)?;

        let path = entry.commit().map_err(CachedFetchError::from)?;
        info!(url = %request.url, path = %path.display(), "Response stored in cache");

        Ok(Fetched {
            content,
            from_cache: false,
        })
    }

    /// Cached GET of `url`
    ///
    /// Failures are logged and reported as None so batch callers can skip
    /// one item. A failed download leaves no file at the cache path.
    pub async fn get_cached(&self, url: &str, cache_key: &str, max_age_days: f64) -> Option<Vec<u8>> {
        self.plain_fetch(&Request::get(url), cache_key, max_age_days)
            .await
    }

    /// Cached form POST of `body` to `url`, with the same failure handling as [`Self::get_cached`]
    pub async fn post_cached(
        &self,
        url: &str,
        body: &str,
        cache_key: &str,
        max_age_days: f64,
    ) -> Option<Vec<u8>> {
        self.plain_fetch(&Request::post_form(url, body), cache_key, max_age_days)
            .await
    }

    async fn plain_fetch(&self, request: &Request, cache_key: &str, max_age_days: f64) -> Option<Vec<u8>> {
        match self.fetch_cached(request, cache_key, max_age_days).await {
            Ok(content) => Some(content),
            Err(e) => {
                // Never leave an outdated or partial file behind a failed download
                if let Err(remove_err) = self.cache.remove(cache_key) {
                    warn!(
                        key = cache_key,
                        error = %remove_err,
                        "Failed to remove cache entry after failed download"
                    );
                }
                error!(url = %request.url, error = %e, "Failure downloading");
                None
            }
        }
    }
}

fn cache_error_to_io(err: CacheError) -> std::io::Error {
    match err {
        CacheError::Io { source, .. } => source,
        not_found @ CacheError::NotFound(_) => {
            std::io::Error::new(std::io::ErrorKind::NotFound, not_found)
        }
    }
}
