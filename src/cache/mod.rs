//! Cache module for storing fetched documents to disk
//!
//! Each candidate URL maps, together with the invoking user, to one file in a
//! shared cache directory. The file holds the verbatim body of the last
//! successful fetch and its modification time decides freshness. Entries are
//! only ever overwritten, never deleted.

mod store;

pub use store::{cache_key, is_fresh, CacheError, CacheHit, CachePolicy, CacheStore};
