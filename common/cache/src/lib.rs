//! Read-through cache layered over the shared Redis client.
//!
//! This crate provides the access pattern used by every cached query in the
//! campaigns service:
//!
//! - Redis-backed positive caching with a per-call TTL
//! - Function-based producer API (no trait implementations required)
//! - User-defined error types; producer errors propagate uncached
//! - Rich return types for observability
//! - Cache corruption handling and graceful Redis degradation
//!
//! # Example
//!
//! ```rust,ignore
//! use common_cache::{CacheSource, ReadThroughCache};
//!
//! let cache = ReadThroughCache::new(redis_client);
//!
//! let result = cache
//!     .get_with_fallback(&key, 300, || async { load_from_source().await })
//!     .await?;
//!
//! match result.source {
//!     CacheSource::PositiveCache => println!("Cache hit!"),
//!     CacheSource::LoaderCacheMiss => println!("Loaded from source"),
//!     _ => {}
//! }
//! ```

pub mod read_through;
pub mod types;

pub use read_through::ReadThroughCache;
pub use types::{CacheResult, CacheSource};
