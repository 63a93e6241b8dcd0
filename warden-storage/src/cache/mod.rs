//! Cache layer: read-through point and query caches, write-triggered
//! invalidation, and the provider registry that ties them together.
//!
//! Every cache decorator registers itself with a [`CacheRegistry`] on
//! construction and deregisters on [`Registration::release`] or drop. Writers
//! never know which caches exist; they broadcast through the registry.
//!
//! Expiry is coarse: each cache clears itself entirely once its configured
//! maximum age has elapsed since the last clear, or once it holds more than
//! its maximum number of entries.

pub mod config;
pub mod point;
pub mod query_cache;
pub mod read;
pub mod registry;
pub mod sweep;
pub mod traits;
pub mod writer;

pub use config::CacheConfig;
pub use point::CachedReader;
pub use query_cache::CachedSearch;
pub use read::CacheRead;
pub use registry::{CacheRegistry, ProviderId, Registration};
pub use sweep::TtlSweep;
pub use traits::{CacheProvider, CacheStats};
pub use writer::InvalidatingWriter;
