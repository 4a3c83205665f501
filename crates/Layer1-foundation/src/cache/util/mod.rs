//! Cache utilities
//!
//! - `LruCache`: byte-bounded LRU with lazy TTL
//! - hashing and canonical JSON signatures for cache keys
//! - string similarity for fuzzy key matching

mod hash;
mod lru;
mod similarity;

pub use hash::{canonical_json, compute_hash, hash_json};
pub use lru::{InsertOutcome, Lookup, LruCache, LruCacheConfig};
pub use similarity::{levenshtein, max_possible_similarity, similarity};
