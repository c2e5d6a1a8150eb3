//! Cache store for persisting fetched payloads to disk
//!
//! Provides a `CacheStore` that writes raw response bodies to files named by
//! a digest of the URL and local user, and reads them back while they are
//! within the configured maximum age.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::document::{self, Document};
use crate::fetch::Candidate;

/// Prefix for every cache file name
const FILE_PREFIX: &str = "jqurl_";

/// Errors raised by cache I/O
///
/// None of these are fatal to a run; callers log them and carry on as if
/// caching were disabled.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An entry could not be written
    #[error("Failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the cache participates in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Whether the cache is consulted and written at all
    pub enabled: bool,
    /// Ignore existing entries; successful fetches are still written
    pub flush: bool,
    /// Entries older than this are stale
    pub max_age: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            flush: false,
            max_age: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// A fresh, decodable entry found while scanning the candidate URLs
#[derive(Debug)]
pub struct CacheHit {
    /// Position of the URL in the candidate list
    pub url_index: usize,
    /// File the entry was read from
    pub path: PathBuf,
    /// The decoded document
    pub document: Document,
}

/// Computes the cache key for a URL and user.
///
/// The key is the hex SHA-256 digest of the exact URL string followed by the
/// user name, so the same URL cached by different users never collides.
///
/// # Arguments
///
/// * `url` - The URL exactly as given on the command line
/// * `user` - The current user name
///
/// # Returns
///
/// A 64-character lowercase hex string, used as the entry's file name
pub fn cache_key(url: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(user.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns whether an entry last modified at `modified` is still fresh at `now`.
///
/// An age bound too large to represent never expires.
pub fn is_fresh(modified: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return true;
    };
    modified
        .checked_add_signed(max_age)
        .map_or(true, |expires_at| now <= expires_at)
}

/// Reads and writes cache entries in a single directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// Local user identity mixed into every key
    user: String,
    policy: CachePolicy,
}

impl CacheStore {
    /// Creates a store for the given directory, user and policy
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        user: impl Into<String>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            user: user.into(),
            policy,
        }
    }

    /// Creates a store keyed by the invoking login name
    pub fn for_current_user(cache_dir: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self::new(cache_dir, whoami::username(), policy)
    }

    /// Whether caching is turned on for this run
    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    /// Returns the path of the cache file for a URL
    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}{}", FILE_PREFIX, cache_key(url, &self.user)))
    }

    /// Reads a fresh entry for the URL.
    ///
    /// Returns `None` when caching is disabled, the flush override is set,
    /// the entry is missing or stale, or it cannot be read. A miss is a
    /// normal outcome and never an error.
    pub fn lookup(&self, url: &str) -> Option<Vec<u8>> {
        self.lookup_at(url, Utc::now())
    }

    /// Same as [`CacheStore::lookup`], judged against an explicit clock
    pub fn lookup_at(&self, url: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        if !self.policy.enabled || self.policy.flush {
            return None;
        }

        let path = self.entry_path(url);
        let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => {
                debug!(url, path = %path.display(), "cache miss");
                return None;
            }
        };

        if !is_fresh(modified, self.policy.max_age, now) {
            debug!(url, path = %path.display(), %modified, "cache entry is stale");
            return None;
        }

        match fs::read(&path) {
            Ok(payload) => {
                debug!(url, path = %path.display(), "found cache");
                Some(payload)
            }
            Err(err) => {
                debug!(url, path = %path.display(), error = %err, "cannot read cache entry");
                None
            }
        }
    }

    /// Scans the candidate URLs in order for a cached document.
    ///
    /// The scan stops at the first fresh, readable entry. Later URLs are
    /// never consulted, even if they also hold fresh entries; when that
    /// first entry does not decode as a JSON object the result is a miss.
    ///
    /// # Arguments
    /// * `urls` - Candidate URLs in command-line order
    ///
    /// # Returns
    /// The decoded hit, or `None` when the documents must be fetched
    pub fn scan(&self, urls: &[Candidate]) -> Option<CacheHit> {
        if !self.policy.enabled || self.policy.flush {
            return None;
        }

        let (url_index, candidate, payload) = urls
            .iter()
            .enumerate()
            .find_map(|(i, candidate)| Some((i, candidate, self.lookup(candidate.as_str())?)))?;

        match document::decode(&payload) {
            Ok(document) => Some(CacheHit {
                url_index,
                path: self.entry_path(candidate.as_str()),
                document,
            }),
            Err(err) => {
                debug!(url = %candidate, error = %err, "cached payload is not a JSON object");
                None
            }
        }
    }

    /// Writes the payload for a URL, logging instead of failing.
    ///
    /// Caching is an optimization; a failed write leaves the run unaffected.
    pub fn store(&self, url: &str, payload: &[u8]) {
        if let Err(err) = self.try_store(url, payload) {
            debug!(url, error = %err, "error writing cache file");
        }
    }

    /// Writes the payload for a URL, overwriting any previous entry.
    ///
    /// Does nothing when caching is disabled.
    pub fn try_store(&self, url: &str, payload: &[u8]) -> Result<(), CacheError> {
        if !self.policy.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::CreateDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        let path = self.entry_path(url);
        debug!(url, path = %path.display(), "writing out cache file");
        fs::write(&path, payload).map_err(|source| CacheError::Write { path, source })
    }
}
