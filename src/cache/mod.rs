//! Hot route cache
//!
//! A Redis-style store behind a small trait, and the cached-routes
//! repository that keys winning routes by (chain, direction, pair, USD
//! bucket) with refresh-ahead semantics.

pub mod routes;
pub mod store;

pub use routes::{CacheLookup, CachedRoutesRepository};
pub use store::{CacheStore, InspectValue, MemoryStore, RedisStore};
